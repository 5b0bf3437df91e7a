//! Swift Augment: AI-assisted documentation, review, and rewrites for Swift
//!
//! A declaration-matching and source-patching engine built on byte-span
//! replacement primitives, with tree-sitter for structural discovery and a
//! resilient bridge to an out-of-process text generator.
//!
//! # Architecture
//!
//! Every rewrite compiles down to a single primitive: [`patch::edit::SpanEdit`],
//! a verified byte-span replacement. Intelligence lives in span acquisition
//! (tree-sitter declaration collection, canonical signature matching,
//! generated-block alignment), not in the application logic.
//!
//! # Safety
//!
//! - Edits verify expected before-text (or a hash of it) before applying
//! - Atomic file writes (tempfile + fsync + rename)
//! - Generated replacements re-parse to exactly one matching declaration
//! - UTF-8 validation after every splice
//! - Identical-content patches are skipped, not re-applied
//!
//! # Example
//!
//! ```no_run
//! use swift_augment::swift::{collect, CollectOptions, SwiftParser};
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = "func greet(name: String) -> String { \"hi \" + name }";
//! let mut parser = SwiftParser::new()?;
//! let parsed = parser.parse_with_source(source)?;
//! for decl in collect(&parsed, &CollectOptions::default())? {
//!     println!("{} {}", decl.kind, decl.canonical_signature);
//! }
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod bridge;
pub mod config;
pub mod patch;
pub mod pipeline;
pub mod prompt;
pub mod sig;
pub mod swift;

// Re-exports
pub use align::{align_keyed, align_ordinal, AlignError, PatchOutcome};
pub use bridge::{BridgeError, GenerationBridge, GeneratorConfig};
pub use config::{load_from_path, load_from_str, load_or_default, ConfigError, ToolConfig};
pub use patch::edit::{apply_edits, write_atomic, EditError, EditVerification, SpanEdit};
pub use patch::{CommentStyle, PatchError, PatchStats, ReplaceOutcome};
pub use sig::{canonicalize, looks_like_signature};
pub use swift::{
    collect, lookup, lookup_required, lookup_unique, CollectOptions, DeclKind, Declaration,
    LookupError, ParseError, SwiftParser,
};
