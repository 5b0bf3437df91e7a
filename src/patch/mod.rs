//! Source patching.
//!
//! The patcher is a pure transform: given the original source and aligned
//! (declaration, outcome) pairs, it produces new source text plus counts,
//! touching nothing outside the targeted spans. Callers decide what to do
//! with the result; the only file write happens once, at the end of a
//! successful pipeline run, through [`edit::write_atomic`].

pub mod edit;

use crate::align::PatchOutcome;
use crate::swift::{collect, CollectOptions, Declaration, SwiftParser};
use edit::{apply_edits, EditError, SpanEdit};
use thiserror::Error;
use tracing::debug;

/// Comment insertion kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `///` documentation comments.
    Documentation,
    /// `// REVIEW:` inline review comments.
    Review,
}

impl CommentStyle {
    fn prefix(&self) -> &'static str {
        match self {
            CommentStyle::Documentation => "/// ",
            CommentStyle::Review => "// REVIEW: ",
        }
    }

    /// Prefix for blank comment lines, without trailing space.
    fn bare_prefix(&self) -> &'static str {
        match self {
            CommentStyle::Documentation => "///",
            CommentStyle::Review => "//",
        }
    }

    /// Does this line already carry an annotation of this style?
    fn annotates(&self, line: &str) -> bool {
        let t = line.trim_start();
        match self {
            CommentStyle::Documentation => t.starts_with("///") || t.starts_with("/**"),
            CommentStyle::Review => t.starts_with("// REVIEW"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommentStyle::Documentation => "documentation",
            CommentStyle::Review => "review",
        }
    }
}

/// Processed/skipped counts for one patch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// How a single declaration replacement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied,
    /// Replacement normalizes to the original; treated as a no-op.
    SkippedIdentical,
    /// Replacement did not re-parse to exactly one matching declaration.
    SkippedInvalid { reason: String },
}

/// Does the declaration's existing leading comment block already carry a
/// comment of this style?
pub fn has_annotation(decl: &Declaration, source: &str, style: CommentStyle) -> bool {
    decl.leading_comments(source)
        .lines()
        .any(|line| style.annotates(line))
}

/// What [`insert_comments`] decided for one declaration. Display layers map
/// these to user-facing statuses so reporting can never disagree with the
/// counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentDecision {
    /// Insert this formatted comment block at the declaration's trivia start.
    Insert(String),
    /// `skip_existing` and the declaration already carries this style.
    AlreadyAnnotated,
    /// The generator produced nothing usable: the no-content sentinel, or
    /// content that was only fences and markers.
    NoContent,
    /// Alignment marked the declaration skipped; leave it in place.
    Untouched,
}

/// The single per-declaration decision behind [`insert_comments`].
pub fn comment_decision(
    source: &str,
    decl: &Declaration,
    outcome: &PatchOutcome,
    style: CommentStyle,
    skip_existing: bool,
) -> CommentDecision {
    match outcome {
        PatchOutcome::Apply(text) => {
            if skip_existing && has_annotation(decl, source, style) {
                return CommentDecision::AlreadyAnnotated;
            }
            let block = format_comment_block(text, style, &decl.indent, !decl.starts_line);
            if block.is_empty() {
                CommentDecision::NoContent
            } else {
                CommentDecision::Insert(block)
            }
        }
        PatchOutcome::NoContent => CommentDecision::NoContent,
        PatchOutcome::Skip => CommentDecision::Untouched,
    }
}

/// Insert generated comment blocks as leading trivia.
///
/// Pure with respect to the filesystem: returns the rewritten source and
/// counts. Existing leading documentation stays in place after the inserted
/// block. With `skip_existing`, declarations already annotated in this style
/// are counted as skipped instead; without it, insertion is not idempotent
/// and a second run will stack a second block.
pub fn insert_comments(
    source: &str,
    jobs: &[(&Declaration, PatchOutcome)],
    style: CommentStyle,
    skip_existing: bool,
) -> Result<(String, PatchStats), PatchError> {
    let mut edits = Vec::new();
    let mut stats = PatchStats::default();

    for (decl, outcome) in jobs {
        match comment_decision(source, decl, outcome, style, skip_existing) {
            CommentDecision::Insert(block) => {
                edits.push(SpanEdit::insert(decl.trivia_start, block));
                stats.processed += 1;
            }
            CommentDecision::AlreadyAnnotated => {
                debug!(name = %decl.name, "skipping declaration with existing annotation");
                stats.skipped += 1;
            }
            CommentDecision::NoContent | CommentDecision::Untouched => {
                stats.skipped += 1;
            }
        }
    }

    let new_source = apply_edits(source, edits)?;
    Ok((new_source, stats))
}

/// Replace one declaration with re-parsed and validated generated code.
///
/// The replacement must parse cleanly standalone and contain exactly one
/// top-level declaration of the target's kind, with the target's name.
/// Failing that, the original is returned unchanged and the failure is
/// counted, not raised: one bad replacement does not poison a batch.
pub fn replace_declaration(
    source: &str,
    decl: &Declaration,
    replacement_raw: &str,
    parser: &mut SwiftParser,
) -> Result<(String, PatchStats, ReplaceOutcome), PatchError> {
    let cleaned = strip_code_fences(replacement_raw);

    let extracted = match extract_matching_declaration(&cleaned, decl, parser) {
        Ok(text) => text,
        Err(reason) => {
            debug!(name = %decl.name, %reason, "replacement rejected");
            return Ok((
                source.to_string(),
                PatchStats { processed: 0, skipped: 1 },
                ReplaceOutcome::SkippedInvalid { reason },
            ));
        }
    };

    // Idempotence guard: whitespace/line-ending-collapsed equality is a no-op
    if normalize_ws(&extracted) == normalize_ws(decl.text(source)) {
        return Ok((
            source.to_string(),
            PatchStats { processed: 0, skipped: 1 },
            ReplaceOutcome::SkippedIdentical,
        ));
    }

    // Surrounding trivia stays in the file; only the declaration node's span
    // is spliced, with the original indentation carried onto the new lines.
    let indented = reindent(&extracted, &decl.indent);
    let edit = SpanEdit::new(decl.byte_start, decl.byte_end, indented, decl.text(source));
    let new_source = apply_edits(source, vec![edit])?;

    Ok((
        new_source,
        PatchStats { processed: 1, skipped: 0 },
        ReplaceOutcome::Applied,
    ))
}

fn extract_matching_declaration(
    snippet: &str,
    expected: &Declaration,
    parser: &mut SwiftParser,
) -> Result<String, String> {
    let parsed = parser
        .parse_with_source(snippet)
        .map_err(|e| e.to_string())?;
    if parsed.has_errors() {
        return Err(format!("replacement does not parse: {}", parsed.syntax_error()));
    }

    let opts = CollectOptions {
        kinds: vec![expected.kind],
        top_level_only: true,
    };
    let decls = collect(&parsed, &opts).map_err(|e| e.to_string())?;

    match decls.as_slice() {
        [] => Err(format!(
            "replacement contains no {} declaration",
            expected.kind
        )),
        [only] => {
            if only.name == expected.name {
                Ok(only.text(snippet).to_string())
            } else {
                Err(format!(
                    "replacement declares {:?}, expected {:?}",
                    only.name, expected.name
                ))
            }
        }
        many => Err(format!(
            "replacement contains {} {} declarations, expected exactly 1",
            many.len(),
            expected.kind
        )),
    }
}

/// Re-emit generated comment content with this style's prefix, dropping any
/// comment markers or code fences the generator echoed back.
fn format_comment_block(text: &str, style: CommentStyle, indent: &str, inline: bool) -> String {
    let mut lines: Vec<String> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(strip_comment_markers)
        .collect();

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    if lines.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    if inline {
        // declaration shares its line with other code; move it down one line
        out.push('\n');
    }
    for line in &lines {
        out.push_str(indent);
        if line.is_empty() {
            out.push_str(style.bare_prefix());
        } else {
            out.push_str(style.prefix());
            out.push_str(line);
        }
        out.push('\n');
    }
    if inline {
        out.push_str(indent);
    }
    out
}

/// Strip comment markers a generator may have echoed: `///`, `//`, block
/// comment delimiters, and an already-present review prefix.
fn strip_comment_markers(line: &str) -> String {
    let mut t = line.trim();
    loop {
        let before = t;
        for marker in ["///", "//!", "/**", "/*", "*/", "//"] {
            if let Some(rest) = t.strip_prefix(marker) {
                t = rest.trim_start();
                break;
            }
        }
        if let Some(rest) = t.strip_prefix("REVIEW:") {
            t = rest.trim_start();
        }
        if t == before {
            break;
        }
    }
    t.trim_end_matches("*/").trim().to_string()
}

pub(crate) fn strip_code_fences(raw: &str) -> String {
    let mut out = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    if raw.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Collapse all whitespace runs, including line endings, to single spaces.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prefix continuation lines with the original declaration's indentation.
fn reindent(decl_text: &str, indent: &str) -> String {
    if indent.is_empty() {
        return decl_text.to_string();
    }
    let mut lines = decl_text.lines();
    let mut out = String::new();
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(indent);
            out.push_str(line);
        }
    }
    out
}
