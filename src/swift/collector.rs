use crate::sig;
use crate::swift::decl::{classify_canonical, DeclKind, Declaration};
use crate::swift::errors::{LookupError, ParseError};
use crate::swift::parser::ParsedSource;
use tree_sitter::Node;

/// Node kinds that may hold a declaration we care about. The list is wider
/// than any one grammar revision emits; classification happens on the header
/// text, so an unmatched kind string costs nothing.
const CANDIDATE_KINDS: &[&str] = &[
    "function_declaration",
    "protocol_function_declaration",
    "init_declaration",
    "protocol_declaration",
    "class_declaration",
    "struct_declaration",
    "enum_declaration",
    "actor_declaration",
    "extension_declaration",
];

/// Container kinds that make everything beneath them nested for the purposes
/// of top-level-only collection.
const BOUNDARY_KINDS: &[&str] = &[
    "protocol_declaration",
    "class_declaration",
    "struct_declaration",
    "enum_declaration",
    "actor_declaration",
    "extension_declaration",
];

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub kinds: Vec<DeclKind>,
    pub top_level_only: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            kinds: DeclKind::ALL.to_vec(),
            top_level_only: false,
        }
    }
}

/// Collect declarations of the configured kinds, in textual order.
///
/// Fails when the source does not parse cleanly; no recovery is attempted
/// here since patching against a broken tree would splice at wrong offsets.
pub fn collect(parsed: &ParsedSource<'_>, opts: &CollectOptions) -> Result<Vec<Declaration>, ParseError> {
    if parsed.has_errors() {
        return Err(parsed.syntax_error());
    }

    let mut decls = Vec::new();
    walk(parsed.root_node(), parsed, opts, &mut decls);

    for (index, decl) in decls.iter_mut().enumerate() {
        decl.source_order_index = index;
    }

    Ok(decls)
}

fn walk(node: Node<'_>, parsed: &ParsedSource<'_>, opts: &CollectOptions, out: &mut Vec<Declaration>) {
    if CANDIDATE_KINDS.contains(&node.kind()) {
        if let Some(decl) = build_declaration(parsed, node) {
            let wanted = opts.kinds.contains(&decl.kind);
            let visible = !opts.top_level_only || !nested_in_type(node);
            if wanted && visible {
                out.push(decl);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, parsed, opts, out);
    }
}

/// Walk parent links until the file root or a type boundary.
fn nested_in_type(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if BOUNDARY_KINDS.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn build_declaration(parsed: &ParsedSource<'_>, node: Node<'_>) -> Option<Declaration> {
    let text = parsed.node_text(node);
    let canonical = sig::canonicalize(text);
    let (kind, name) = classify_canonical(&canonical)?;

    let byte_start = node.start_byte();
    let source = parsed.source;
    let line_start = source[..byte_start].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &source[line_start..byte_start];
    let starts_line = prefix.chars().all(|c| c == ' ' || c == '\t');
    let indent: String = prefix
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();
    let trivia_start = if starts_line {
        leading_trivia_start(source, line_start)
    } else {
        byte_start
    };

    Some(Declaration {
        kind,
        name,
        canonical_signature: canonical,
        source_order_index: 0,
        line: node.start_position().row + 1,
        byte_start,
        byte_end: node.end_byte(),
        line_start,
        trivia_start,
        indent,
        starts_line,
    })
}

/// Scan upward over whole comment lines to find where the declaration's
/// leading comment block begins.
fn leading_trivia_start(source: &str, line_start: usize) -> usize {
    let mut cur = line_start;
    while cur > 0 {
        let prev_start = source[..cur - 1].rfind('\n').map_or(0, |i| i + 1);
        let line = source[prev_start..cur].trim();
        if line.starts_with("//") || line.starts_with("/*") || line.starts_with('*') {
            cur = prev_start;
        } else {
            break;
        }
    }
    cur
}

/// Two-tier target lookup.
///
/// Bare names match by verbatim name equality and may hit several overloads.
/// Signature-like targets match by canonical key, falling back to a prefix
/// match so a truncated header still resolves.
pub fn lookup<'a>(decls: &'a [Declaration], target: &str) -> Vec<&'a Declaration> {
    if sig::looks_like_signature(target) {
        let key = sig::canonicalize(target);
        let exact: Vec<&Declaration> = decls
            .iter()
            .filter(|d| d.canonical_signature == key)
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        decls
            .iter()
            .filter(|d| d.canonical_signature.starts_with(&key))
            .collect()
    } else {
        decls.iter().filter(|d| d.name == target).collect()
    }
}

/// Lookup that treats an empty result as an error, with near-miss
/// suggestions attached.
pub fn lookup_required<'a>(
    decls: &'a [Declaration],
    target: &str,
) -> Result<Vec<&'a Declaration>, LookupError> {
    let found = lookup(decls, target);
    if found.is_empty() {
        return Err(LookupError::NotFound {
            target: target.to_string(),
            suggestions: suggest(decls, target),
        });
    }
    Ok(found)
}

/// Lookup for operations that need exactly one declaration.
pub fn lookup_unique<'a>(
    decls: &'a [Declaration],
    target: &str,
) -> Result<&'a Declaration, LookupError> {
    let found = lookup_required(decls, target)?;
    if found.len() > 1 {
        return Err(LookupError::Ambiguous {
            target: target.to_string(),
            count: found.len(),
        });
    }
    Ok(found[0])
}

fn suggest(decls: &[Declaration], target: &str) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = decls
        .iter()
        .map(|d| (strsim::normalized_levenshtein(&d.name, target), d.name.as_str()))
        .filter(|(score, _)| *score > 0.5)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.dedup_by(|a, b| a.1 == b.1);

    scored.into_iter().take(3).map(|(_, name)| name.to_string()).collect()
}
