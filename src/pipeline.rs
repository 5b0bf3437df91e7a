//! Command pipelines.
//!
//! Every command runs the same shape: read file → parse and collect →
//! generate → align → patch → one atomic write. The pipeline is the only
//! layer that writes files; everything below it transforms strings. A failed
//! or partial run never writes.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::align::{self, AlignError, PatchOutcome};
use crate::bridge::GenerationBridge;
use crate::config::ToolConfig;
use crate::patch::{
    self, edit::write_atomic, CommentDecision, CommentStyle, PatchStats, ReplaceOutcome,
};
use crate::prompt;
use crate::swift::{
    collect, lookup_required, lookup_unique, CollectOptions, DeclKind, Declaration, SwiftParser,
};

/// Flags shared by the generating commands.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Signature or bare-name targets; empty means every configured kind.
    pub targets: Vec<String>,
    pub top_level_only: bool,
    pub skip_existing: bool,
    pub dry_run: bool,
}

/// What one run did, declaration by declaration.
#[derive(Debug)]
pub struct RunReport {
    pub stats: PatchStats,
    pub outcomes: Vec<ItemOutcome>,
    pub original_source: String,
    pub new_source: String,
    pub written: bool,
    pub used_fallback: bool,
}

#[derive(Debug)]
pub struct ItemOutcome {
    pub name: String,
    pub line: usize,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    SkippedExisting,
    NoContent,
    SkippedIdentical,
    SkippedInvalid(String),
}

pub struct Pipeline {
    config: ToolConfig,
    bridge: GenerationBridge,
}

impl Pipeline {
    pub fn new(config: ToolConfig) -> Self {
        let bridge = GenerationBridge::new(config.generator_config());
        Self { config, bridge }
    }

    pub fn model(&self) -> &str {
        self.bridge.model()
    }

    /// Insert generated comments (documentation or review) into one file.
    pub async fn run_comments(
        &self,
        file: &Path,
        style: CommentStyle,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let source = read_source(file)?;
        let mut parser = SwiftParser::new()?;
        let parsed = parser.parse_with_source(&source)?;
        let context = self.load_context()?;

        let (jobs, used_fallback_source) = if opts.targets.is_empty() {
            let collect_opts = CollectOptions {
                kinds: self.config.documentation_kinds(),
                top_level_only: opts.top_level_only,
            };
            let decls = collect(&parsed, &collect_opts)?;
            if decls.is_empty() {
                info!(file = %file.display(), "no declarations of the configured kinds");
                return Ok(empty_report(source));
            }
            self.generate_batch(style, &source, decls, &collect_opts, context.as_deref(), cancel)
                .await?
        } else {
            let collect_opts = CollectOptions {
                kinds: DeclKind::ALL.to_vec(),
                top_level_only: opts.top_level_only,
            };
            let decls = collect(&parsed, &collect_opts)?;
            let chosen = resolve_targets(&decls, &opts.targets)?;
            let paired = self
                .generate_targeted(style, &source, &chosen, context.as_deref(), cancel)
                .await?;
            (paired, None)
        };

        let (new_source, stats, outcomes, used_fallback) = match used_fallback_source {
            Some(fallback_source) => {
                let count = jobs.len();
                let outcomes = jobs
                    .iter()
                    .map(|(decl, _)| ItemOutcome {
                        name: decl.name.clone(),
                        line: decl.line,
                        status: ItemStatus::Applied,
                    })
                    .collect();
                (
                    fallback_source,
                    PatchStats {
                        processed: count,
                        skipped: 0,
                    },
                    outcomes,
                    true,
                )
            }
            None => {
                let job_refs: Vec<(&Declaration, PatchOutcome)> = jobs
                    .iter()
                    .map(|(decl, outcome)| (decl, outcome.clone()))
                    .collect();
                let (new_source, stats) =
                    patch::insert_comments(&source, &job_refs, style, opts.skip_existing)?;
                let outcomes = describe_comment_outcomes(&source, &job_refs, style, opts.skip_existing);
                (new_source, stats, outcomes, false)
            }
        };

        self.finish(file, source, new_source, stats, outcomes, used_fallback, opts.dry_run)
    }

    /// Replace one declaration's full text with generated code.
    pub async fn run_rewrite(
        &self,
        file: &Path,
        target: &str,
        instructions: &str,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let source = read_source(file)?;
        let mut parser = SwiftParser::new()?;
        let parsed = parser.parse_with_source(&source)?;
        let context = self.load_context()?;

        let collect_opts = CollectOptions {
            kinds: DeclKind::ALL.to_vec(),
            top_level_only: opts.top_level_only,
        };
        let decls = collect(&parsed, &collect_opts)?;
        let decl = lookup_unique(&decls, target)?.clone();

        let request = prompt::rewrite_prompt(decl.text(&source), instructions, context.as_deref());
        let request = prompt::enforce_length(request, self.config.prompt.max_length);
        let response = self.bridge.generate(&request, cancel).await?;

        let (new_source, stats, outcome) =
            patch::replace_declaration(&source, &decl, &response, &mut parser)?;

        let status = match outcome {
            ReplaceOutcome::Applied => ItemStatus::Applied,
            ReplaceOutcome::SkippedIdentical => ItemStatus::SkippedIdentical,
            ReplaceOutcome::SkippedInvalid { reason } => ItemStatus::SkippedInvalid(reason),
        };
        let outcomes = vec![ItemOutcome {
            name: decl.name.clone(),
            line: decl.line,
            status,
        }];

        self.finish(file, source, new_source, stats, outcomes, false, opts.dry_run)
    }

    /// Whole-file pass: one batch call, ordinal alignment, whole-file
    /// regeneration when the block count disagrees.
    async fn generate_batch(
        &self,
        style: CommentStyle,
        source: &str,
        decls: Vec<Declaration>,
        collect_opts: &CollectOptions,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<(Declaration, PatchOutcome)>, Option<String>)> {
        let texts: Vec<&str> = decls.iter().map(|d| d.text(source)).collect();
        let request = prompt::comment_batch_prompt(style, &texts, context);
        let request = prompt::enforce_length(request, self.config.prompt.max_length);
        let raw = self.bridge.generate(&request, cancel).await?;

        match align::align_ordinal(&decls, &raw) {
            Ok(paired) => {
                let owned = paired
                    .into_iter()
                    .map(|(decl, outcome)| (decl.clone(), outcome))
                    .collect();
                Ok((owned, None))
            }
            Err(AlignError::CountMismatch {
                declarations,
                blocks,
            }) => {
                warn!(
                    declarations,
                    blocks, "block alignment failed, regenerating the whole file"
                );
                let fallback = self
                    .regenerate_whole_file(style, source, &decls, collect_opts, cancel)
                    .await?;
                let placeholder = decls
                    .into_iter()
                    .map(|decl| (decl, PatchOutcome::Skip))
                    .collect();
                Ok((placeholder, Some(fallback)))
            }
        }
    }

    /// Targeted pass: one call per declaration, signature-keyed alignment.
    async fn generate_targeted(
        &self,
        style: CommentStyle,
        source: &str,
        chosen: &[Declaration],
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(Declaration, PatchOutcome)>> {
        let mut blocks: HashMap<String, String> = HashMap::new();
        for decl in chosen {
            debug!(name = %decl.name, line = decl.line, "generating for declaration");
            let request = prompt::comment_single_prompt(style, decl.text(source), context);
            let request = prompt::enforce_length(request, self.config.prompt.max_length);
            let response = self.bridge.generate(&request, cancel).await?;
            blocks.insert(decl.canonical_signature.clone(), response.trim().to_string());
        }

        Ok(align::align_keyed(chosen, &blocks)
            .into_iter()
            .map(|(decl, outcome)| (decl.clone(), outcome))
            .collect())
    }

    /// The fallback result is accepted only when it parses cleanly and keeps
    /// the exact ordered declaration set; otherwise the run fails with no
    /// changes written.
    async fn regenerate_whole_file(
        &self,
        style: CommentStyle,
        source: &str,
        decls: &[Declaration],
        collect_opts: &CollectOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = prompt::regenerate_file_prompt(style, source);
        let request = prompt::enforce_length(request, self.config.prompt.max_length);
        let raw = self.bridge.generate(&request, cancel).await?;
        let candidate = patch::strip_code_fences(&raw);

        let mut parser = SwiftParser::new()?;
        let parsed = parser.parse_with_source(&candidate)?;
        if parsed.has_errors() {
            bail!("whole-file fallback output does not parse; no changes written");
        }

        let regenerated = collect(&parsed, collect_opts)?;
        let old_keys: Vec<&str> = decls.iter().map(|d| d.canonical_signature.as_str()).collect();
        let new_keys: Vec<&str> = regenerated
            .iter()
            .map(|d| d.canonical_signature.as_str())
            .collect();
        if old_keys != new_keys {
            bail!(
                "whole-file fallback altered the declaration set \
                 ({} before, {} after); no changes written",
                old_keys.len(),
                new_keys.len()
            );
        }

        Ok(candidate)
    }

    fn load_context(&self) -> Result<Option<String>> {
        match &self.config.prompt.context_dir {
            Some(dir) => {
                let ctx = prompt::load_context(dir).with_context(|| {
                    format!("failed to read context directory {}", dir.display())
                })?;
                Ok(Some(ctx))
            }
            None => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        file: &Path,
        original_source: String,
        new_source: String,
        stats: PatchStats,
        outcomes: Vec<ItemOutcome>,
        used_fallback: bool,
        dry_run: bool,
    ) -> Result<RunReport> {
        let changed = new_source != original_source;
        let written = changed && !dry_run;
        if written {
            write_atomic(file, &new_source)
                .with_context(|| format!("failed to write {}", file.display()))?;
            info!(file = %file.display(), processed = stats.processed, skipped = stats.skipped, "file updated");
        } else if changed {
            info!(file = %file.display(), "dry run, not writing");
        } else {
            info!(file = %file.display(), "nothing changed");
        }

        Ok(RunReport {
            stats,
            outcomes,
            original_source,
            new_source,
            written,
            used_fallback,
        })
    }
}

/// Collect, parse, and describe the declarations of one file without
/// generating anything.
pub fn list_declarations(file: &Path, top_level_only: bool) -> Result<Vec<Declaration>> {
    let source = read_source(file)?;
    let mut parser = SwiftParser::new()?;
    let parsed = parser.parse_with_source(&source)?;
    let opts = CollectOptions {
        kinds: DeclKind::ALL.to_vec(),
        top_level_only,
    };
    Ok(collect(&parsed, &opts)?)
}

fn read_source(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

/// Resolve every target, in source order, deduplicated. Bare names may fan
/// out to several overloads; that is fine for comment insertion.
fn resolve_targets(decls: &[Declaration], targets: &[String]) -> Result<Vec<Declaration>> {
    let mut chosen: Vec<Declaration> = Vec::new();
    for target in targets {
        let found = lookup_required(decls, target)?;
        chosen.extend(found.into_iter().cloned());
    }
    chosen.sort_by_key(|d| d.source_order_index);
    chosen.dedup_by_key(|d| d.source_order_index);
    Ok(chosen)
}

fn empty_report(source: String) -> RunReport {
    RunReport {
        stats: PatchStats::default(),
        outcomes: Vec::new(),
        new_source: source.clone(),
        original_source: source,
        written: false,
        used_fallback: false,
    }
}

/// Per-declaration statuses for display, taken from the same decision
/// [`patch::insert_comments`] acts on.
fn describe_comment_outcomes(
    source: &str,
    jobs: &[(&Declaration, PatchOutcome)],
    style: CommentStyle,
    skip_existing: bool,
) -> Vec<ItemOutcome> {
    jobs.iter()
        .map(|(decl, outcome)| {
            let status = match patch::comment_decision(source, decl, outcome, style, skip_existing)
            {
                CommentDecision::Insert(_) => ItemStatus::Applied,
                CommentDecision::AlreadyAnnotated | CommentDecision::Untouched => {
                    ItemStatus::SkippedExisting
                }
                CommentDecision::NoContent => ItemStatus::NoContent,
            };
            ItemOutcome {
                name: decl.name.clone(),
                line: decl.line,
                status,
            }
        })
        .collect()
}
