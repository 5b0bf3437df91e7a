use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("source has {count} syntax error(s), first at line {first_line}")]
    SyntaxErrors {
        count: usize,
        first_byte: usize,
        first_line: usize,
    },
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("target not found: {target}{}", suggestion_hint(.suggestions))]
    NotFound {
        target: String,
        /// Closest declaration names, for "did you mean" output.
        suggestions: Vec<String>,
    },

    #[error("target {target:?} matches {count} declarations, expected exactly 1")]
    Ambiguous { target: String, count: usize },
}

fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}
