use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use similar::{ChangeTag, TextDiff};
use swift_augment::config::{self, ToolConfig};
use swift_augment::patch::CommentStyle;
use swift_augment::pipeline::{list_declarations, ItemStatus, Pipeline, RunOptions, RunReport};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swift-augment")]
#[command(about = "AI-assisted documentation, review, and rewrites for Swift sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a config file (default: ./swift-augment.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert documentation comments above declarations
    Document {
        /// Swift source file to patch
        file: PathBuf,

        /// Target declaration, by bare name or signature (repeatable;
        /// default: every declaration of the configured kinds)
        #[arg(short, long = "target")]
        target: Vec<String>,

        /// Only consider top-level declarations
        #[arg(long)]
        top_level: bool,

        /// Leave declarations that already have documentation untouched
        #[arg(short, long)]
        skip_existing: bool,

        /// Dry run - run the full pipeline without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Insert review comments above declarations
    Review {
        /// Swift source file to patch
        file: PathBuf,

        /// Target declaration, by bare name or signature (repeatable)
        #[arg(short, long = "target")]
        target: Vec<String>,

        /// Only consider top-level declarations
        #[arg(long)]
        top_level: bool,

        /// Leave declarations that already have review comments untouched
        #[arg(short, long)]
        skip_existing: bool,

        /// Dry run - run the full pipeline without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Replace one declaration with rewritten code
    Rewrite {
        /// Swift source file to patch
        file: PathBuf,

        /// Target declaration, by unambiguous name or signature
        #[arg(short, long)]
        target: String,

        /// What the rewrite should change
        #[arg(short, long)]
        instructions: String,

        /// Only consider top-level declarations
        #[arg(long)]
        top_level: bool,

        /// Dry run - run the full pipeline without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List the declarations found in a file
    List {
        /// Swift source file to inspect
        file: PathBuf,

        /// Only consider top-level declarations
        #[arg(long)]
        top_level: bool,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Interrupted, shutting down...".yellow());
            signal_cancel.cancel();
        }
    });

    let config = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Document {
            file,
            target,
            top_level,
            skip_existing,
            dry_run,
            diff,
            model,
        } => {
            let config = override_model(config, model);
            let opts = RunOptions {
                targets: target,
                top_level_only: top_level,
                skip_existing,
                dry_run,
            };
            cmd_comments(config, &file, CommentStyle::Documentation, opts, diff, &cancel).await
        }

        Commands::Review {
            file,
            target,
            top_level,
            skip_existing,
            dry_run,
            diff,
            model,
        } => {
            let config = override_model(config, model);
            let opts = RunOptions {
                targets: target,
                top_level_only: top_level,
                skip_existing,
                dry_run,
            };
            cmd_comments(config, &file, CommentStyle::Review, opts, diff, &cancel).await
        }

        Commands::Rewrite {
            file,
            target,
            instructions,
            top_level,
            dry_run,
            diff,
            model,
        } => {
            let config = override_model(config, model);
            let opts = RunOptions {
                targets: Vec::new(),
                top_level_only: top_level,
                skip_existing: false,
                dry_run,
            };
            cmd_rewrite(config, &file, &target, &instructions, opts, diff, &cancel).await
        }

        Commands::List {
            file,
            top_level,
            json,
        } => cmd_list(&file, top_level, json),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn override_model(mut config: ToolConfig, model: Option<String>) -> ToolConfig {
    if let Some(model) = model {
        config.generator.model = model;
    }
    config
}

async fn cmd_comments(
    config: ToolConfig,
    file: &Path,
    style: CommentStyle,
    opts: RunOptions,
    show_diff: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let dry_run = opts.dry_run;
    let pipeline = Pipeline::new(config);

    let spinner = start_spinner(format!(
        "Generating {} comments with {}...",
        style.label(),
        pipeline.model()
    ));
    let result = pipeline.run_comments(file, style, &opts, cancel).await;
    spinner.finish_and_clear();

    render_report(file, &result?, dry_run, show_diff)
}

async fn cmd_rewrite(
    config: ToolConfig,
    file: &Path,
    target: &str,
    instructions: &str,
    opts: RunOptions,
    show_diff: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let dry_run = opts.dry_run;
    let pipeline = Pipeline::new(config);

    let spinner = start_spinner(format!("Rewriting {} with {}...", target, pipeline.model()));
    let result = pipeline
        .run_rewrite(file, target, instructions, &opts, cancel)
        .await;
    spinner.finish_and_clear();

    render_report(file, &result?, dry_run, show_diff)
}

fn cmd_list(file: &Path, top_level_only: bool, json: bool) -> Result<()> {
    let decls = list_declarations(file, top_level_only)?;

    if json {
        let items: Vec<serde_json::Value> = decls
            .iter()
            .map(|d| {
                serde_json::json!({
                    "kind": d.kind,
                    "name": d.name,
                    "line": d.line,
                    "signature": d.canonical_signature,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if decls.is_empty() {
        println!("{}", "No declarations found".yellow());
        return Ok(());
    }
    for d in &decls {
        println!(
            "{:>5}  {:<11} {}",
            d.line,
            d.kind.label(),
            d.canonical_signature
        );
    }
    Ok(())
}

fn start_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn render_report(file: &Path, report: &RunReport, dry_run: bool, show_diff: bool) -> Result<()> {
    let mut failed = 0;
    for item in &report.outcomes {
        match &item.status {
            ItemStatus::Applied => {
                let verb = if dry_run { "would apply" } else { "applied" };
                println!("{} {} (line {}): {}", "✓".green(), item.name, item.line, verb);
            }
            ItemStatus::SkippedExisting => {
                println!(
                    "{} {} (line {}): already annotated, skipped",
                    "⊙".yellow(),
                    item.name,
                    item.line
                );
            }
            ItemStatus::NoContent => {
                println!(
                    "{} {} (line {}): generator chose no content",
                    "⊘".cyan(),
                    item.name,
                    item.line
                );
            }
            ItemStatus::SkippedIdentical => {
                println!(
                    "{} {} (line {}): replacement identical, skipped",
                    "⊙".yellow(),
                    item.name,
                    item.line
                );
            }
            ItemStatus::SkippedInvalid(reason) => {
                eprintln!(
                    "{} {} (line {}): {}",
                    "✗".red(),
                    item.name,
                    item.line,
                    reason
                );
                failed += 1;
            }
        }
    }

    if report.used_fallback {
        println!(
            "{}",
            "Note: block alignment failed; the whole file was regenerated and re-validated"
                .yellow()
        );
    }

    if show_diff && report.new_source != report.original_source {
        display_diff(file, &report.original_source, &report.new_source);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} processed", format!("{}", report.stats.processed).green());
    println!("  {} skipped", format!("{}", report.stats.skipped).yellow());
    if report.written {
        println!("  Wrote {}", file.display());
    } else if dry_run && report.new_source != report.original_source {
        println!("{}", "  [DRY RUN - no files were written]".cyan());
    } else {
        println!("  Nothing changed");
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}
