//! Resilient bridge to an external text generator.
//!
//! A request moves through validation (binary on PATH, model pulled), then
//! execution, then either success or a retryable failure. Generator-side
//! failures (missing binary, missing model, non-zero exit, timeout) are
//! retried up to the configured attempt cap with capped exponential backoff
//! plus jitter; attempts are strictly sequential, and the child of one
//! attempt is fully reclaimed before the next spawns. Cancellation is
//! honored between attempts and mid-attempt, and is never retried.

mod exec;

use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything one bridge needs to talk to its generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Generator executable, resolved via PATH.
    pub binary: String,
    /// Model name as the generator knows it, tag optional.
    pub model: String,
    /// Total attempt cap, counting the first try.
    pub max_retries: u32,
    /// Wall-clock bound for a single attempt.
    pub timeout: Duration,
    /// Ceiling for the exponential backoff between attempts.
    pub backoff_cap: Duration,
    /// How long a terminated child gets before a hard kill.
    pub grace: Duration,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("generator binary not found: {binary} (is it installed and on PATH?)")]
    NotInstalled { binary: String },
    #[error("model not available: {model} (pull it with `{binary} pull {model}`)")]
    ModelMissing { model: String, binary: String },
    #[error("generator exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("generation timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },
    #[error("generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    fn non_zero_exit(status: &std::process::ExitStatus, stderr: &str) -> Self {
        let trimmed = stderr.trim();
        BridgeError::NonZeroExit {
            code: status.code().unwrap_or(-1),
            stderr: if trimmed.is_empty() {
                "unknown error".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, BridgeError::Cancelled)
    }
}

fn spawn_error(binary: &str, err: std::io::Error) -> BridgeError {
    if err.kind() == std::io::ErrorKind::NotFound {
        BridgeError::NotInstalled {
            binary: binary.to_string(),
        }
    } else {
        BridgeError::Io(err)
    }
}

/// Handle to the external generator.
pub struct GenerationBridge {
    config: GeneratorConfig,
}

impl GenerationBridge {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate text for a prompt.
    ///
    /// Each attempt re-validates the generator before running, so a model
    /// pulled mid-retry-loop is picked up without restarting the request.
    /// Returns the last observed error once attempts are exhausted.
    pub async fn generate(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, BridgeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(attempt, max = self.config.max_retries, "generation attempt");
            match self.attempt(prompt, cancel).await {
                Ok(out) => return Ok(out),
                Err(err) if attempt < self.config.max_retries && err.is_retryable() => {
                    let delay = backoff_delay(attempt, self.config.backoff_cap);
                    warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "generation attempt failed, retrying"
                    );
                    tokio::select! {
                        () = sleep(delay) => {}
                        () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, BridgeError> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        self.ensure_model_available(cancel).await?;
        exec::run_generator(&self.config, prompt, cancel).await
    }

    /// `<binary> list` must name the configured model, tag or no tag.
    async fn ensure_model_available(&self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        let cfg = &self.config;
        let child = Command::new(&cfg.binary)
            .arg("list")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&cfg.binary, e))?;

        let output = tokio::select! {
            res = timeout(cfg.timeout, child.wait_with_output()) => match res {
                Ok(out) => out?,
                Err(_) => {
                    return Err(BridgeError::Timeout {
                        seconds: cfg.timeout.as_secs_f64(),
                    })
                }
            },
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
        };

        if !output.status.success() {
            return Err(BridgeError::non_zero_exit(
                &output.status,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        if model_listed(&listing, &cfg.model) {
            Ok(())
        } else {
            Err(BridgeError::ModelMissing {
                model: cfg.model.clone(),
                binary: cfg.binary.clone(),
            })
        }
    }
}

/// `min(cap, 2^(attempt-1))` seconds plus up to half a second of jitter.
fn backoff_delay(failed_attempt: u32, cap: Duration) -> Duration {
    let exp = 1u64 << failed_attempt.saturating_sub(1).min(16);
    let secs = exp.min(cap.as_secs().max(1));
    let jitter = rand::thread_rng().gen_range(0..500);
    Duration::from_secs(secs) + Duration::from_millis(jitter)
}

/// Match the model against the first column of the listing, accepting a
/// `:tag` suffix but not an arbitrary longer name.
fn model_listed(listing: &str, model: &str) -> bool {
    listing.lines().any(|line| {
        line.split_whitespace().next().is_some_and(|name| {
            name == model
                || name
                    .strip_prefix(model)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
    })
}
