//! Signature canonicalization.
//!
//! Declarations parsed from source and targets typed by a user must agree on a
//! single textual identity before they can be compared. `canonicalize` reduces
//! any signature-like string (a full declaration header, a hand-typed target,
//! a truncated prefix) to one fixed spelling: attributes and parameter
//! defaults stripped, leading modifiers dropped, whitespace collapsed to a
//! canonical convention. The transform is pure and idempotent; both sides of
//! every comparison run through it.

/// Declaration modifiers dropped from canonical form. `class` is handled
/// separately since it doubles as a type introducer.
const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "internal",
    "fileprivate",
    "open",
    "package",
    "static",
    "final",
    "override",
    "mutating",
    "nonmutating",
    "required",
    "convenience",
    "dynamic",
    "indirect",
    "nonisolated",
    "distributed",
    "prefix",
    "postfix",
    "infix",
    "lazy",
    "weak",
    "unowned",
    "optional",
];

/// One lexical unit of a signature. The tokenizer is whitespace-agnostic, so
/// any two spellings of the same signature produce the same token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    Word(String),
    Str(String),
    Punct(String),
}

impl Tok {
    pub(crate) fn text(&self) -> &str {
        match self {
            Tok::Word(s) | Tok::Str(s) | Tok::Punct(s) => s,
        }
    }

    fn punct(&self) -> Option<&str> {
        match self {
            Tok::Punct(s) => Some(s),
            _ => None,
        }
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self, Tok::Word(s) if s == w)
    }
}

/// Normalize a signature-like string to its canonical comparison key.
///
/// Anything from the body brace onward is ignored, so a whole declaration can
/// be passed as-is. Idempotent: `canonicalize(canonicalize(x)) ==
/// canonicalize(x)`.
pub fn canonicalize(signature_like: &str) -> String {
    let header = declaration_header(signature_like);
    let toks = tokenize(header);
    let toks = strip_attributes(toks);
    let toks = strip_defaults(toks);
    let toks = strip_leading_modifiers(toks);
    render(&toks)
}

/// Classify a free-form target string: signature-like strings are matched by
/// canonical key, anything else is treated as a bare declaration name.
pub fn looks_like_signature(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.contains('(') || trimmed.contains('<') || trimmed.contains("->") {
        return true;
    }
    let words: Vec<&str> = trimmed
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    // A leading introducer keyword is decisive. Extensions in particular have
    // no parameter list, so "extension Foo" must still count as a signature.
    if matches!(
        words.first(),
        Some(&"func")
            | Some(&"init")
            | Some(&"protocol")
            | Some(&"extension")
            | Some(&"struct")
            | Some(&"class")
            | Some(&"enum")
            | Some(&"actor")
    ) {
        return true;
    }
    words
        .iter()
        .any(|w| matches!(*w, "async" | "throws" | "rethrows" | "where"))
}

/// Slice off the declaration header: everything before the first body brace
/// that is not nested inside parentheses, brackets, or a string literal.
pub fn declaration_header(source: &str) -> &str {
    let mut paren = 0usize;
    let mut bracket = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in source.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' => paren += 1,
            ')' => paren = paren.saturating_sub(1),
            '[' => bracket += 1,
            ']' => bracket = bracket.saturating_sub(1),
            '{' if paren == 0 && bracket == 0 => return source[..i].trim_end(),
            _ => {}
        }
    }

    source.trim_end()
}

pub(crate) fn tokenize(input: &str) -> Vec<Tok> {
    let mut toks = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }

        if ch.is_alphanumeric() || ch == '_' {
            let mut end = start + ch.len_utf8();
            while let Some(&(i, c)) = chars.peek() {
                let continues = if c == '.' {
                    // keep "1.5" together but leave "1..." to the punct lexer
                    ch.is_ascii_digit() && !input[i + 1..].starts_with('.')
                } else {
                    c.is_alphanumeric() || c == '_'
                };
                if !continues {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            toks.push(Tok::Word(input[start..end].to_string()));
            continue;
        }

        if ch == '`' {
            // backtick-quoted identifier, kept verbatim including backticks
            let mut end = start + ch.len_utf8();
            for (i, c) in chars.by_ref() {
                end = i + c.len_utf8();
                if c == '`' {
                    break;
                }
            }
            toks.push(Tok::Word(input[start..end].to_string()));
            continue;
        }

        if ch == '"' {
            let mut end = start + ch.len_utf8();
            let mut escaped = false;
            for (i, c) in chars.by_ref() {
                end = i + c.len_utf8();
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                }
            }
            toks.push(Tok::Str(input[start..end].to_string()));
            continue;
        }

        let rest = &input[start..];
        let punct = if rest.starts_with("->") {
            "->"
        } else if rest.starts_with("...") {
            "..."
        } else if rest.starts_with("==") {
            "=="
        } else {
            &input[start..start + ch.len_utf8()]
        };
        for _ in 0..punct.chars().count() - 1 {
            chars.next();
        }
        toks.push(Tok::Punct(punct.to_string()));
    }

    toks
}

/// Drop `@attribute` markers. A balanced paren group after the attribute name
/// is consumed as the attribute's arguments (`@available(iOS 15, *)`) unless
/// `->` follows the group, in which case the parens are a function type the
/// attribute merely prefixes (`@escaping () -> Void`) and must stay.
fn strip_attributes(toks: Vec<Tok>) -> Vec<Tok> {
    let mut out = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        if toks[i].punct() == Some("@") {
            i += 1;
            if matches!(toks.get(i), Some(Tok::Word(_))) {
                i += 1;
            }
            if toks.get(i).and_then(Tok::punct) == Some("(") {
                if let Some(close) = group_end(&toks, i) {
                    if toks.get(close + 1).and_then(Tok::punct) != Some("->") {
                        i = close + 1;
                    }
                }
            }
            continue;
        }
        out.push(toks[i].clone());
        i += 1;
    }
    out
}

/// Index of the `)` closing the group opened at `open`, which must hold `(`.
/// `None` for an unbalanced group, which is then left in place.
fn group_end(toks: &[Tok], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in toks.iter().enumerate().skip(open) {
        match tok.punct() {
            Some("(") => depth += 1,
            Some(")") => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop parameter default values: every `= expr` at parameter-list depth, up
/// to the parameter's closing comma or the list's closing parenthesis.
fn strip_defaults(toks: Vec<Tok>) -> Vec<Tok> {
    let Some(list_start) = toks.iter().position(|t| t.punct() == Some("(")) else {
        return toks;
    };

    let mut out: Vec<Tok> = toks[..list_start].to_vec();
    let mut paren = 0usize;
    let mut bracket = 0usize;
    let mut brace = 0usize;
    let mut skipping = false;

    for tok in &toks[list_start..] {
        let closes_list = tok.punct() == Some(")") && paren == 1;
        let param_comma =
            tok.punct() == Some(",") && paren == 1 && bracket == 0 && brace == 0;

        match tok.punct() {
            Some("(") => paren += 1,
            Some(")") => paren = paren.saturating_sub(1),
            Some("[") => bracket += 1,
            Some("]") => bracket = bracket.saturating_sub(1),
            Some("{") => brace += 1,
            Some("}") => brace = brace.saturating_sub(1),
            _ => {}
        }

        if skipping {
            if closes_list || param_comma {
                skipping = false;
                out.push(tok.clone());
            }
            continue;
        }

        if tok.punct() == Some("=") && paren == 1 && bracket == 0 && brace == 0 {
            skipping = true;
            continue;
        }

        out.push(tok.clone());
    }

    out
}

/// Drop modifiers before the introducer keyword. `class` is a modifier only
/// when a member introducer follows it; otherwise it introduces a class type.
fn strip_leading_modifiers(mut toks: Vec<Tok>) -> Vec<Tok> {
    let mut i = 0;
    while i < toks.len() {
        let Tok::Word(w) = &toks[i] else { break };
        if w == "class" {
            let mut j = i + 1;
            while matches!(toks.get(j), Some(Tok::Word(m)) if MODIFIERS.contains(&m.as_str())) {
                j += 1;
            }
            let member = matches!(toks.get(j), Some(t) if t.is_word("func")
                || t.is_word("init")
                || t.is_word("var")
                || t.is_word("subscript"));
            if member {
                i += 1;
                continue;
            }
            break;
        }
        if MODIFIERS.contains(&w.as_str()) {
            i += 1;
            continue;
        }
        break;
    }
    toks.split_off(i)
}

/// Render tokens with one fixed spacing convention. The convention is chosen
/// so the output re-tokenizes to the same sequence, which is what makes
/// `canonicalize` idempotent.
fn render(toks: &[Tok]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Tok> = None;
    for tok in toks {
        if let Some(p) = prev {
            if needs_space(p, tok) {
                out.push(' ');
            }
        }
        out.push_str(tok.text());
        prev = Some(tok);
    }
    out
}

fn needs_space(prev: &Tok, cur: &Tok) -> bool {
    if let Some(p) = prev.punct() {
        if matches!(p, "." | "@" | "(" | "[" | "<") {
            return false;
        }
    }
    match cur.punct() {
        Some(")") | Some("]") | Some(",") | Some(":") | Some(";") | Some("?") | Some("!")
        | Some(".") | Some(">") | Some("...") => false,
        Some("(") => {
            !matches!(prev, Tok::Word(_))
                && !matches!(prev.punct(), Some(")") | Some(">") | Some("]") | Some("?") | Some("!"))
        }
        Some("<") => !matches!(prev, Tok::Word(_)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            canonicalize("func  foo( x :  Int ) ->  Int"),
            "func foo(x: Int) -> Int"
        );
        assert_eq!(
            canonicalize("func foo(\n    x: Int,\n    y: String\n) -> Bool"),
            "func foo(x: Int, y: String) -> Bool"
        );
    }

    #[test]
    fn strips_parameter_defaults() {
        assert_eq!(
            canonicalize("func foo(_ x: Int, y: String = \"d\") -> String"),
            "func foo(_ x: Int, y: String) -> String"
        );
        assert_eq!(
            canonicalize("func f(limit: Int = 10, handler: () -> Void = {})"),
            "func f(limit: Int, handler: () -> Void)"
        );
        // default containing a comma inside brackets must not end the skip early
        assert_eq!(
            canonicalize("func g(map: [String: Int] = [\"a\": 1, \"b\": 2], z: Int)"),
            "func g(map: [String: Int], z: Int)"
        );
    }

    #[test]
    fn strips_attributes_and_modifiers() {
        assert_eq!(
            canonicalize("@discardableResult public func run() -> Int"),
            "func run() -> Int"
        );
        assert_eq!(
            canonicalize("@available(iOS 15, *)\npublic static func make() -> Self"),
            "func make() -> Self"
        );
        assert_eq!(
            canonicalize("func f(cb: @escaping () -> Void)"),
            "func f(cb: () -> Void)"
        );
    }

    #[test]
    fn attribute_arguments_stay_distinct_from_function_type_parens() {
        // the group after an argument-taking attribute goes with it
        assert_eq!(
            canonicalize("@objc(makeWithValue:) func make(value: Int)"),
            "func make(value: Int)"
        );
        // a bare type attribute keeps the function type it prefixes
        assert_eq!(
            canonicalize("func store(make: @autoclosure () -> Int, then: @escaping (Int) -> Void)"),
            "func store(make: () -> Int, then: (Int) -> Void)"
        );
        assert_eq!(
            canonicalize("func handler() -> @MainActor () -> Void"),
            "func handler() -> () -> Void"
        );
    }

    #[test]
    fn class_keyword_disambiguation() {
        // `class` before `func` is a modifier; standalone it introduces a type
        assert_eq!(canonicalize("class func shared() -> Self"), "func shared() -> Self");
        assert_eq!(canonicalize("public final class Engine"), "class Engine");
    }

    #[test]
    fn preserves_effects_and_generics() {
        assert_eq!(
            canonicalize("func load<T: Decodable>(from url: URL) async throws -> T where T: Sendable"),
            "func load<T: Decodable>(from url: URL) async throws -> T where T: Sendable"
        );
        assert_eq!(
            canonicalize("init?(rawValue : String)"),
            "init?(rawValue: String)"
        );
    }

    #[test]
    fn cuts_at_body_brace() {
        assert_eq!(
            canonicalize("func foo(x: Int) -> Int { x * 2 }"),
            "func foo(x: Int) -> Int"
        );
        // closure default's brace is inside parens, not the body brace
        assert_eq!(
            canonicalize("func f(h: () -> Void = {}) -> Int { 1 }"),
            "func f(h: () -> Void) -> Int"
        );
    }

    #[test]
    fn parameter_order_is_significant() {
        assert_ne!(
            canonicalize("func f(a: Int, b: String)"),
            canonicalize("func f(b: String, a: Int)")
        );
    }

    #[test]
    fn classifies_targets() {
        assert!(looks_like_signature("func foo(x: Int) -> Int"));
        assert!(looks_like_signature("foo(x:)"));
        assert!(looks_like_signature("init(rawValue: String)"));
        assert!(looks_like_signature("load async throws"));
        assert!(looks_like_signature("func foo"));
        assert!(looks_like_signature("extension Point"));
        assert!(looks_like_signature("struct Point"));
        assert!(!looks_like_signature("foo"));
        assert!(!looks_like_signature("asyncHandler"));
        assert!(!looks_like_signature("somewhere"));
    }

    #[test]
    fn idempotent_on_samples() {
        let samples = [
            "func foo(x: Int) -> Int",
            "@discardableResult public func run(with input: String = \"x\") async throws -> [Int]",
            "init?(rawValue: String)",
            "extension Collection where Element: Equatable",
            "public protocol Cache: AnyObject",
            "func == (lhs: Self, rhs: Self) -> Bool",
        ];
        for s in samples {
            let once = canonicalize(s);
            assert_eq!(canonicalize(&once), once, "not idempotent for {s:?}");
        }
    }

    /// Re-spell a canonical signature with arbitrary extra whitespace between
    /// its tokens.
    fn respace(canonical: &str, gaps: &[usize]) -> String {
        let toks = tokenize(canonical);
        let pads = [" ", "  ", "\n", "\t ", "\n    "];
        let mut out = String::new();
        for (i, tok) in toks.iter().enumerate() {
            if i > 0 {
                out.push_str(pads[gaps.get(i).copied().unwrap_or(0) % pads.len()]);
            }
            out.push_str(tok.text());
        }
        out
    }

    proptest! {
        #[test]
        fn whitespace_never_changes_the_key(gaps in proptest::collection::vec(0usize..5, 0..40)) {
            let samples = [
                "func transform(_ input: [String], limit: Int) throws -> [String]",
                "func fetch<T: Decodable>(from url: URL) async throws -> T",
                "init(rawValue: String)",
            ];
            for s in samples {
                let key = canonicalize(s);
                let respaced = respace(&key, &gaps);
                prop_assert_eq!(canonicalize(&respaced), key.clone());
            }
        }

        #[test]
        fn canonicalize_is_idempotent(gaps in proptest::collection::vec(0usize..5, 0..40)) {
            let respaced = respace("func foo(x: Int, y: [String: Int]) async -> Bool", &gaps);
            let once = canonicalize(&respaced);
            prop_assert_eq!(canonicalize(&once), once);
        }
    }
}
