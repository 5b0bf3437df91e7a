//! Prompt assembly.
//!
//! Every prompt that expects block-structured output embeds the same
//! delimiter and sentinel constants the alignment layer parses with, so the
//! instructions and the parser cannot drift apart.

use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::align::{BLOCK_DELIMITER, NO_CONTENT_SENTINEL};
use crate::patch::CommentStyle;

fn task_description(style: CommentStyle) -> &'static str {
    match style {
        CommentStyle::Documentation => {
            "Write a documentation comment for each Swift declaration below. \
             Describe what it does, its parameters, and its return value where relevant."
        }
        CommentStyle::Review => {
            "Write a short code review note for each Swift declaration below. \
             Point out naming, correctness, or API design concerns."
        }
    }
}

/// One comment per declaration, delimiter-separated, in input order.
pub fn comment_batch_prompt(
    style: CommentStyle,
    decl_texts: &[&str],
    context: Option<&str>,
) -> String {
    let mut prompt = String::new();
    push_context(&mut prompt, context);
    prompt.push_str(task_description(style));
    prompt.push_str(&format!(
        "\n\nRespond with one block per declaration, in the same order, \
         separated by lines containing exactly:\n{BLOCK_DELIMITER}\n\
         Return comment text only: no comment markers, no code fences. \
         If a declaration needs no comment, its block must be exactly \
         {NO_CONTENT_SENTINEL}.\n\nDeclarations:\n"
    ));
    for (i, text) in decl_texts.iter().enumerate() {
        if i > 0 {
            prompt.push_str(BLOCK_DELIMITER);
            prompt.push('\n');
        }
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt
}

/// A comment for a single declaration; the response is the comment text
/// alone, or the no-content sentinel.
pub fn comment_single_prompt(
    style: CommentStyle,
    decl_text: &str,
    context: Option<&str>,
) -> String {
    let mut prompt = String::new();
    push_context(&mut prompt, context);
    prompt.push_str(task_description(style));
    prompt.push_str(&format!(
        "\n\nRespond with the comment text only: no comment markers, no code \
         fences. If the declaration needs no comment, respond with exactly \
         {NO_CONTENT_SENTINEL}.\n\nDeclaration:\n{decl_text}\n"
    ));
    prompt
}

/// A full-body rewrite of one declaration under caller instructions.
pub fn rewrite_prompt(decl_text: &str, instructions: &str, context: Option<&str>) -> String {
    let mut prompt = String::new();
    push_context(&mut prompt, context);
    prompt.push_str(&format!(
        "Rewrite the Swift declaration below according to these instructions:\n\
         {instructions}\n\n\
         Respond with the complete rewritten declaration only. Keep its kind \
         and name unchanged. No commentary, no code fences.\n\n\
         Declaration:\n{decl_text}\n"
    ));
    prompt
}

/// Whole-file fallback: the generator returns the entire file rewritten,
/// used when per-declaration block alignment failed.
pub fn regenerate_file_prompt(style: CommentStyle, source: &str) -> String {
    let task = match style {
        CommentStyle::Documentation => "add a documentation comment above each declaration",
        CommentStyle::Review => "add a review comment above each declaration",
    };
    format!(
        "Return the complete Swift file below, unchanged except to {task}. \
         Every declaration must be preserved exactly as written, in the same \
         order. Respond with the file content only, no code fences.\n\n{source}"
    )
}

/// Concatenate every `.swift` file under `dir`, sorted by path, each
/// prefixed with a file banner.
pub fn load_context(dir: &Path) -> std::io::Result<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("swift")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();

    let mut context = String::new();
    for path in files {
        let content = std::fs::read_to_string(&path)?;
        context.push_str(&format!("// File: {}\n{content}\n", path.display()));
    }
    Ok(context)
}

/// Cut the prompt down to `max_len` bytes on a char boundary.
pub fn enforce_length(mut prompt: String, max_len: usize) -> String {
    if prompt.len() <= max_len {
        return prompt;
    }
    let mut cut = max_len;
    while !prompt.is_char_boundary(cut) {
        cut -= 1;
    }
    warn!(
        original = prompt.len(),
        max = max_len,
        "prompt exceeds configured length, truncating"
    );
    prompt.truncate(cut);
    prompt
}

fn push_context(prompt: &mut String, context: Option<&str>) {
    if let Some(ctx) = context {
        if !ctx.is_empty() {
            prompt.push_str("Project context:\n");
            prompt.push_str(ctx);
            prompt.push_str("\n\n");
        }
    }
}
