//! End-to-end pipeline tests: fake generator, real files, real patching.

#![cfg(unix)]

use std::path::{Path, PathBuf};

use swift_augment::patch::CommentStyle;
use swift_augment::pipeline::{ItemStatus, Pipeline, RunOptions};
use swift_augment::ToolConfig;
use tokio_util::sync::CancellationToken;

const FIXTURE: &str = r#"import Foundation

func alpha(x: Int) -> Int {
    x
}

func beta() -> String {
    "b"
}

struct Gamma {
}
"#;

const LIST_BRANCH: &str = "if [ \"$1\" = \"list\" ]; then\n\
                           \x20 echo \"test-model:latest abc123 1.0GB now\"\n\
                           \x20 exit 0\n\
                           fi\n";

fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-generator");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Generator that answers every `run` invocation with the content of
/// `reply`, whatever the prompt.
fn replying_script(dir: &Path, reply: &str) -> PathBuf {
    let reply_path = dir.join("reply.txt");
    std::fs::write(&reply_path, reply).unwrap();
    write_script(
        dir,
        &format!(
            "{LIST_BRANCH}cat > /dev/null\ncat \"{}\"\n",
            reply_path.display()
        ),
    )
}

fn test_config(script: &Path) -> ToolConfig {
    let mut config = ToolConfig::default();
    config.generator.binary = script.to_string_lossy().into_owned();
    config.generator.model = "test-model".to_string();
    config.generator.max_retries = 2;
    config.generator.timeout_seconds = 10.0;
    config.generator.backoff_cap_seconds = 1;
    config.generator.grace_seconds = 0.2;
    config
}

fn write_fixture(dir: &Path) -> PathBuf {
    let file = dir.join("Example.swift");
    std::fs::write(&file, FIXTURE).unwrap();
    file
}

#[tokio::test]
async fn whole_file_documentation_patches_every_declaration() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(
        dir.path(),
        "Docs for alpha.\n---DECL---\nDocs for beta.\n---DECL---\nNO_CONTENT\n",
    );

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions::default();
    let report = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.skipped, 1);
    assert!(report.written);
    assert!(!report.used_fallback);

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("/// Docs for alpha.\nfunc alpha(x: Int) -> Int {"));
    assert!(patched.contains("/// Docs for beta.\nfunc beta() -> String {"));
    // the struct got the sentinel and stayed bare
    assert!(patched.contains("\nstruct Gamma {"));
    assert!(!patched.contains("/// NO_CONTENT"));
}

#[tokio::test]
async fn a_fence_only_block_is_reported_as_no_content() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    // beta's block carries nothing but a code fence pair
    let script = replying_script(
        dir.path(),
        "Docs for alpha.\n---DECL---\n```\n```\n---DECL---\nNO_CONTENT\n",
    );

    let pipeline = Pipeline::new(test_config(&script));
    let report = pipeline
        .run_comments(
            &file,
            CommentStyle::Documentation,
            &RunOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.skipped, 2);
    // the reported status agrees with the counts: nothing was applied to beta
    assert_eq!(report.outcomes[1].name, "beta");
    assert_eq!(report.outcomes[1].status, ItemStatus::NoContent);

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("/// Docs for alpha.\nfunc alpha(x: Int) -> Int {"));
    assert!(patched.contains("\nfunc beta() -> String {"));
    assert!(!patched.contains("```"));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(
        dir.path(),
        "Docs for alpha.\n---DECL---\nDocs for beta.\n---DECL---\nNO_CONTENT\n",
    );

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let report = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.written);
    assert!(report.new_source.contains("/// Docs for alpha."));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), FIXTURE);
}

#[tokio::test]
async fn skip_existing_makes_a_second_run_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(
        dir.path(),
        "Docs for alpha.\n---DECL---\nDocs for beta.\n---DECL---\nNO_CONTENT\n",
    );

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions {
        skip_existing: true,
        ..RunOptions::default()
    };

    let first = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.stats.processed, 2);
    let after_first = std::fs::read_to_string(&file).unwrap();

    let second = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.stats.processed, 0);
    assert_eq!(second.stats.skipped, 3);
    assert!(!second.written);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), after_first);
}

#[tokio::test]
async fn targeted_documentation_touches_only_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(dir.path(), "Docs for beta only.\n");

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions {
        targets: vec!["beta".to_string()],
        ..RunOptions::default()
    };
    let report = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.processed, 1);

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("/// Docs for beta only.\nfunc beta() -> String {"));
    assert!(patched.contains("\nfunc alpha(x: Int) -> Int {"));
    assert!(!patched.contains("/// Docs for beta only.\nfunc alpha"));
}

#[tokio::test]
async fn an_unknown_target_fails_with_suggestions() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(dir.path(), "irrelevant\n");

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions {
        targets: vec!["betta".to_string()],
        ..RunOptions::default()
    };
    let err = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("betta"));
    assert!(msg.contains("beta"));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), FIXTURE);
}

#[tokio::test]
async fn review_comments_use_the_review_marker() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(dir.path(), "Consider a clearer name.\n");

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions {
        targets: vec!["alpha".to_string()],
        ..RunOptions::default()
    };
    pipeline
        .run_comments(&file, CommentStyle::Review, &opts, &CancellationToken::new())
        .await
        .unwrap();

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("// REVIEW: Consider a clearer name.\nfunc alpha"));
}

#[tokio::test]
async fn count_mismatch_falls_back_to_whole_file_regeneration() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());

    // same declarations, same order, documentation added
    let fallback = "import Foundation\n\n\
                    /// Docs for alpha.\n\
                    func alpha(x: Int) -> Int {\n    x\n}\n\n\
                    /// Docs for beta.\n\
                    func beta() -> String {\n    \"b\"\n}\n\n\
                    /// Docs for Gamma.\n\
                    struct Gamma {\n}\n";
    let fallback_path = dir.path().join("fallback.swift");
    std::fs::write(&fallback_path, fallback).unwrap();

    let marker = dir.path().join("runs");
    // first run call: one block for three declarations; second: the full file
    let body = format!(
        "{LIST_BRANCH}cat > /dev/null\n\
         echo x >> \"{marker}\"\n\
         n=$(wc -l < \"{marker}\")\n\
         if [ \"$n\" -eq 1 ]; then\n\
         \x20 echo \"just one block\"\n\
         else\n\
         \x20 cat \"{fallback}\"\n\
         fi\n",
        marker = marker.display(),
        fallback = fallback_path.display()
    );
    let script = write_script(dir.path(), &body);

    let pipeline = Pipeline::new(test_config(&script));
    let opts = RunOptions::default();
    let report = pipeline
        .run_comments(&file, CommentStyle::Documentation, &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.used_fallback);
    assert!(report.written);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), fallback);
}

#[tokio::test]
async fn a_fallback_that_drops_declarations_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());

    // beta is missing from the regenerated file
    let bad_fallback = "import Foundation\n\n\
                        /// Docs.\n\
                        func alpha(x: Int) -> Int {\n    x\n}\n\n\
                        struct Gamma {\n}\n";
    let fallback_path = dir.path().join("fallback.swift");
    std::fs::write(&fallback_path, bad_fallback).unwrap();

    let marker = dir.path().join("runs");
    let body = format!(
        "{LIST_BRANCH}cat > /dev/null\n\
         echo x >> \"{marker}\"\n\
         n=$(wc -l < \"{marker}\")\n\
         if [ \"$n\" -eq 1 ]; then\n\
         \x20 echo \"just one block\"\n\
         else\n\
         \x20 cat \"{fallback}\"\n\
         fi\n",
        marker = marker.display(),
        fallback = fallback_path.display()
    );
    let script = write_script(dir.path(), &body);

    let pipeline = Pipeline::new(test_config(&script));
    let err = pipeline
        .run_comments(
            &file,
            CommentStyle::Documentation,
            &RunOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("no changes written"));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), FIXTURE);
}

#[tokio::test]
async fn rewrite_replaces_the_declaration_body() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(
        dir.path(),
        "func alpha(x: Int) -> Int {\n    x * 2\n}\n",
    );

    let pipeline = Pipeline::new(test_config(&script));
    let report = pipeline
        .run_rewrite(
            &file,
            "alpha",
            "double the result",
            &RunOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, ItemStatus::Applied);

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("func alpha(x: Int) -> Int {\n    x * 2\n}"));
    assert!(patched.contains("func beta() -> String {\n    \"b\"\n}"));
}

#[tokio::test]
async fn an_invalid_replacement_is_skipped_and_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path());
    let script = replying_script(dir.path(), "let x = 1\n");

    let pipeline = Pipeline::new(test_config(&script));
    let report = pipeline
        .run_rewrite(
            &file,
            "alpha",
            "double it",
            &RunOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.stats.processed, 0);
    assert_eq!(report.stats.skipped, 1);
    assert!(!report.written);
    assert!(matches!(
        report.outcomes[0].status,
        ItemStatus::SkippedInvalid(_)
    ));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), FIXTURE);
}

#[tokio::test]
async fn an_ambiguous_rewrite_target_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = "func dup(x: Int) -> Int { x }\n\nfunc dup(_ y: String) -> String { y }\n";
    let file = dir.path().join("Dup.swift");
    std::fs::write(&file, source).unwrap();
    let script = replying_script(dir.path(), "irrelevant\n");

    let pipeline = Pipeline::new(test_config(&script));
    let err = pipeline
        .run_rewrite(
            &file,
            "dup",
            "whatever",
            &RunOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("dup"));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), source);
}
