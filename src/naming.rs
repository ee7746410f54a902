//! Identifier conventions for emitted code.

use convert_case::{Case, Casing};

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while",
    "async", "await", "dyn", "abstract", "become", "box", "do", "final", "macro", "override",
    "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// `self` and friends can't be raw identifiers.
const RESERVED: &[&str] = &["self", "Self", "super", "crate"];

pub fn escape_keyword(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{}_", name)
    } else if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Field name for a catalog column.
pub fn field_ident(column: &str) -> String {
    escape_keyword(&snake(column))
}

/// Record type name for a catalog table: `line_items` -> `LineItem`.
pub fn type_ident(table: &str) -> String {
    singular(&snake(table)).to_case(Case::Pascal)
}

/// Stem of method, module and field names. Names that are already snake
/// case pass through untouched so `oauth2` keeps its digit attached.
pub fn snake(name: &str) -> String {
    if name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        name.to_string()
    } else {
        name.to_case(Case::Snake)
    }
}

pub fn const_ident(column: &str) -> String {
    snake(column).to_ascii_uppercase()
}

pub fn singular(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

pub fn plural(word: &str) -> String {
    let word = singular(word);
    let lower = word.to_ascii_lowercase();
    let consonant_y = lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'));
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "sh", "ch", "x", "z"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}
