//! Child process execution for the generation bridge.
//!
//! One call, one child. The prompt write runs concurrently with the
//! stdout/stderr drain and the exit wait, all inside one future raced
//! against the configured timeout and the caller's cancellation token.
//! Draining both pipes keeps a chatty generator from deadlocking, and
//! racing the write keeps a generator that never reads stdin from
//! stalling past the wall clock once the prompt outgrows the pipe buffer.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BridgeError, GeneratorConfig};

enum DrainOutcome {
    Finished(std::io::Result<(String, String, std::process::ExitStatus)>),
    TimedOut,
    Cancelled,
}

/// Run one generation attempt and return the child's stdout.
pub(super) async fn run_generator(
    cfg: &GeneratorConfig,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<String, BridgeError> {
    let mut child = Command::new(&cfg.binary)
        .arg("run")
        .arg(&cfg.model)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| super::spawn_error(&cfg.binary, e))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| BridgeError::Io(std::io::Error::other("generator stdin not captured")))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::Io(std::io::Error::other("generator stdout not captured")))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::Io(std::io::Error::other("generator stderr not captured")))?;

    let drain = async {
        let mut out = String::new();
        let mut err = String::new();
        let (wrote, read_out, read_err, status) = tokio::join!(
            write_prompt(stdin, prompt),
            stdout.read_to_string(&mut out),
            stderr.read_to_string(&mut err),
            child.wait(),
        );
        match wrote {
            // A child that exited before reading gives EPIPE here; its exit
            // status and stderr carry the real failure.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("generator closed stdin early");
            }
            other => other?,
        }
        read_out?;
        read_err?;
        Ok::<_, std::io::Error>((out, err, status?))
    };

    let outcome = tokio::select! {
        res = timeout(cfg.timeout, drain) => match res {
            Ok(inner) => DrainOutcome::Finished(inner),
            Err(_) => DrainOutcome::TimedOut,
        },
        () = cancel.cancelled() => DrainOutcome::Cancelled,
    };

    match outcome {
        DrainOutcome::Finished(Ok((out, err, status))) => {
            if status.success() {
                Ok(out)
            } else {
                Err(BridgeError::non_zero_exit(&status, &err))
            }
        }
        DrainOutcome::Finished(Err(e)) => Err(BridgeError::Io(e)),
        DrainOutcome::TimedOut => {
            warn!(
                seconds = cfg.timeout.as_secs_f64(),
                "generation timed out, terminating generator"
            );
            terminate(&mut child, cfg.grace).await;
            Err(BridgeError::Timeout {
                seconds: cfg.timeout.as_secs_f64(),
            })
        }
        DrainOutcome::Cancelled => {
            debug!("generation cancelled, terminating generator");
            terminate(&mut child, cfg.grace).await;
            Err(BridgeError::Cancelled)
        }
    }
}

/// Write the full prompt and close stdin. Taking `stdin` by value makes the
/// close unconditional: the child sees EOF when this future resolves or is
/// dropped by the race.
async fn write_prompt(mut stdin: ChildStdin, prompt: &str) -> std::io::Result<()> {
    stdin.write_all(prompt.as_bytes()).await?;
    stdin.shutdown().await?;
    Ok(())
}

/// Two-phase termination: SIGTERM, a grace period, then a hard kill.
pub(super) async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            warn!(pid, "generator ignored SIGTERM, killing");
        }
    }
    #[cfg(not(unix))]
    let _ = grace;
    let _ = child.kill().await;
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn config(binary: &str) -> GeneratorConfig {
        GeneratorConfig {
            binary: binary.to_string(),
            model: "test-model".to_string(),
            max_retries: 1,
            timeout: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(1),
            grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn captures_stdout_of_a_successful_child() {
        // echo ignores stdin, which also exercises the EPIPE tolerance
        let cfg = config("echo");
        let out = run_generator(&cfg, "prompt", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.trim(), "run test-model");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_with_a_fallback_message() {
        let cfg = config("false");
        let err = run_generator(&cfg, "prompt", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            BridgeError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "unknown error");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_maps_to_not_installed() {
        let cfg = config("definitely-not-a-real-generator-binary");
        let err = run_generator(&cfg, "prompt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotInstalled { .. }));
    }
}
