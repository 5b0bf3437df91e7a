//! Swift source parsing and declaration collection.

pub mod collector;
pub mod decl;
pub mod errors;
pub mod parser;

pub use collector::{collect, lookup, lookup_required, lookup_unique, CollectOptions};
pub use decl::{DeclKind, Declaration};
pub use errors::{LookupError, ParseError};
pub use parser::{ErrorNode, ParsedSource, SwiftParser};
