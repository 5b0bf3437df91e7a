use crate::sig::{self, Tok};
use serde::Serialize;
use std::fmt;

/// The closed set of declaration kinds the tool operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Function,
    Initializer,
    Type,
    Protocol,
    Extension,
}

impl DeclKind {
    /// Parse a configuration kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(DeclKind::Function),
            "initializer" => Some(DeclKind::Initializer),
            "type" => Some(DeclKind::Type),
            "protocol" => Some(DeclKind::Protocol),
            "extension" => Some(DeclKind::Extension),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeclKind::Function => "function",
            DeclKind::Initializer => "initializer",
            DeclKind::Type => "type",
            DeclKind::Protocol => "protocol",
            DeclKind::Extension => "extension",
        }
    }

    pub const ALL: [DeclKind; 5] = [
        DeclKind::Function,
        DeclKind::Initializer,
        DeclKind::Type,
        DeclKind::Protocol,
        DeclKind::Extension,
    ];
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A read-only view over one declaration in a parsed file.
///
/// Byte offsets index into the source text the declaration was collected
/// from; they stay valid because the source is never mutated before the final
/// write. The patcher consumes these spans, it never re-parses.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    pub canonical_signature: String,
    /// Position of first appearance, counted over all collected declarations.
    pub source_order_index: usize,
    /// 1-based line of the declaration keyword, for display.
    pub line: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Byte offset of the start of the line the declaration begins on.
    pub line_start: usize,
    /// Insertion point for generated comments: start of the declaration's
    /// leading comment block, or `line_start` when there is none.
    pub trivia_start: usize,
    /// Whitespace prefix of the declaration's line, replicated onto inserted
    /// comment lines.
    pub indent: String,
    /// False when other code precedes the declaration on its own line.
    pub starts_line: bool,
}

impl Declaration {
    /// The declaration's full text, leading attributes included.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.byte_start..self.byte_end]
    }

    /// The leading comment block the declaration already carries, if any.
    pub fn leading_comments<'a>(&self, source: &'a str) -> &'a str {
        &source[self.trivia_start..self.line_start.max(self.trivia_start)]
    }
}

/// Derive kind and name from a canonical signature. Returns `None` for
/// headers that canonicalize to something outside the supported kind set
/// (properties, typealiases, subscripts).
pub(crate) fn classify_canonical(canonical: &str) -> Option<(DeclKind, String)> {
    let toks = sig::tokenize(canonical);
    let first = toks.first()?;
    let Tok::Word(keyword) = first else {
        return None;
    };

    match keyword.as_str() {
        "func" => {
            // operator functions have a punctuation token where the name goes
            let name = toks.get(1).map(|t| t.text().to_string())?;
            Some((DeclKind::Function, name))
        }
        "init" => Some((DeclKind::Initializer, "init".to_string())),
        "protocol" => {
            let name = next_word(&toks, 1)?;
            Some((DeclKind::Protocol, name))
        }
        "class" | "struct" | "enum" | "actor" => {
            let name = next_word(&toks, 1)?;
            Some((DeclKind::Type, name))
        }
        "extension" => {
            let name = dotted_name(&toks, 1)?;
            Some((DeclKind::Extension, name))
        }
        _ => None,
    }
}

fn next_word(toks: &[Tok], at: usize) -> Option<String> {
    match toks.get(at) {
        Some(Tok::Word(w)) => Some(w.clone()),
        _ => None,
    }
}

/// Extensions may extend a nested type: `extension Foo.Bar`.
fn dotted_name(toks: &[Tok], at: usize) -> Option<String> {
    let mut name = next_word(toks, at)?;
    let mut i = at + 1;
    while toks.get(i).map(|t| t.text()) == Some(".") {
        let Some(part) = next_word(toks, i + 1) else {
            break;
        };
        name.push('.');
        name.push_str(&part);
        i += 2;
    }
    Some(name)
}
