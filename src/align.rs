//! Alignment of generated text blocks with source declarations.
//!
//! Whole-file generation asks for one block per declaration, separated by a
//! delimiter line, in source order. Getting the pairing wrong would attach a
//! comment to the wrong declaration, so ordinal alignment insists on exact
//! count equality and fails as a unit otherwise. Targeted generation keys
//! blocks by canonical signature instead and needs no counting.

use crate::swift::Declaration;
use std::collections::HashMap;
use thiserror::Error;

/// Line the generator is instructed to emit between blocks.
pub const BLOCK_DELIMITER: &str = "---DECL---";

/// Block value meaning "this declaration needs no content". Recognized during
/// alignment and turned into [`PatchOutcome::NoContent`]; nothing downstream
/// compares against the string.
pub const NO_CONTENT_SENTINEL: &str = "NO_CONTENT";

/// What should happen to one declaration after alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Insert or substitute this generated text.
    Apply(String),
    /// Leave the declaration untouched and count it as skipped.
    Skip,
    /// The generator decided no content is needed; also counted as skipped.
    NoContent,
}

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("generated {blocks} block(s) for {declarations} declaration(s)")]
    CountMismatch { declarations: usize, blocks: usize },
}

/// Split raw generator output into blocks on delimiter lines. Blocks are
/// trimmed; empty blocks (stray leading/trailing delimiters) are dropped.
pub fn split_blocks(raw: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        if line.trim() == BLOCK_DELIMITER {
            push_block(&mut blocks, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_block(&mut blocks, &mut current);

    blocks
}

fn push_block(blocks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
    current.clear();
}

/// Sentinel-aware classification of one generated block.
pub fn classify(block: String) -> PatchOutcome {
    if block.trim() == NO_CONTENT_SENTINEL {
        PatchOutcome::NoContent
    } else {
        PatchOutcome::Apply(block)
    }
}

/// Pair blocks with declarations by strict source-order position.
///
/// The declaration slice must already be in source order (as produced by the
/// collector). Counts must match exactly; on mismatch nothing is paired and
/// the caller falls back to whole-file regeneration.
pub fn align_ordinal<'a>(
    decls: &'a [Declaration],
    raw: &str,
) -> Result<Vec<(&'a Declaration, PatchOutcome)>, AlignError> {
    let blocks = split_blocks(raw);
    if blocks.len() != decls.len() {
        return Err(AlignError::CountMismatch {
            declarations: decls.len(),
            blocks: blocks.len(),
        });
    }

    Ok(decls
        .iter()
        .zip(blocks.into_iter().map(classify))
        .collect())
}

/// Pair blocks with declarations by canonical signature key. Declarations
/// without a block are left untouched and do not appear in the result.
pub fn align_keyed<'a>(
    decls: &'a [Declaration],
    blocks: &HashMap<String, String>,
) -> Vec<(&'a Declaration, PatchOutcome)> {
    decls
        .iter()
        .filter_map(|decl| {
            blocks
                .get(&decl.canonical_signature)
                .map(|block| (decl, classify(block.clone())))
        })
        .collect()
}
