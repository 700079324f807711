//! Property text handling.
//!
//! The generator answers with a fenced `ltl` block holding Spin syntax, e.g.
//! `ltl mission { [](temp > 30 -> <>done) }`. Spin gets that text verbatim; the
//! automaton translator gets the bare formula with every atomic proposition that is
//! not a plain identifier double-quoted.

use crate::util::extract_code_block;

/// Temporal operators written as words.
const WORD_OPERATORS: [&str; 5] = ["U", "V", "W", "R", "X"];

/// Pull the fenced `ltl` block out of a generator answer.
pub fn extract_property(answer: &str) -> Option<String> {
    extract_code_block(answer, "ltl").map(|block| block.trim().to_string())
}

/// Drop the `ltl <name> { ... }` wrapper, leaving the formula.
///
/// Text without a wrapper is returned trimmed.
pub fn strip_property_wrapper(property: &str) -> &str {
    let trimmed = property.trim();
    let Some(rest) = trimmed.strip_prefix("ltl") else {
        return trimmed;
    };
    let (Some(open), Some(close)) = (rest.find('{'), rest.rfind('}')) else {
        return trimmed;
    };
    let name = rest[..open].trim();
    let name_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if open > close || !name_ok || !rest.starts_with(|c: char| c.is_whitespace() || c == '{') {
        return trimmed;
    }
    rest[open + 1..close].trim()
}

/// Rewrite a Spin formula into translator syntax.
///
/// Symbolic operators are kept; runs of text between them are atomic propositions and
/// are quoted unless they are identifiers or the constants `true`/`false`.
pub fn to_translator_syntax(formula: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut atom = String::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match operator_at(&chars, i) {
            Some(op) => {
                flush_atom(&mut atom, &mut tokens);
                tokens.push(op.to_string());
                i += op.len();
            }
            None => {
                atom.push(chars[i]);
                i += 1;
            }
        }
    }
    flush_atom(&mut atom, &mut tokens);

    tokens.join(" ")
}

/// Formula handed to the translator, optionally conjoined with an initial-state clause.
pub fn translator_formula(property: &str, initial: Option<&str>) -> String {
    let formula = to_translator_syntax(strip_property_wrapper(property));
    match initial.map(str::trim).filter(|s| !s.is_empty()) {
        Some(initial) => format!("({}) && ({})", to_translator_syntax(initial), formula),
        None => formula,
    }
}

fn operator_at(chars: &[char], i: usize) -> Option<&'static str> {
    let next = |k: usize| chars.get(i + k).copied();
    match (chars[i], next(1), next(2)) {
        ('<', Some('-'), Some('>')) => Some("<->"),
        ('<', Some('>'), _) => Some("<>"),
        ('[', Some(']'), _) => Some("[]"),
        ('-', Some('>'), _) => Some("->"),
        ('&', Some('&'), _) => Some("&&"),
        ('|', Some('|'), _) => Some("||"),
        ('!', next, _) if next != Some('=') => Some("!"),
        ('(', _, _) => Some("("),
        (')', _, _) => Some(")"),
        _ => None,
    }
}

/// Split pending atom text around word operators and push the pieces.
fn flush_atom(atom: &mut String, tokens: &mut Vec<String>) {
    let mut piece: Vec<&str> = Vec::new();
    for word in atom.split_whitespace() {
        if WORD_OPERATORS.contains(&word) {
            push_proposition(&piece, tokens);
            piece.clear();
            tokens.push(word.to_string());
        } else {
            piece.push(word);
        }
    }
    push_proposition(&piece, tokens);
    atom.clear();
}

fn push_proposition(words: &[&str], tokens: &mut Vec<String>) {
    if words.is_empty() {
        return;
    }
    let text = words.join(" ");
    if is_plain(&text) {
        tokens.push(text);
    } else {
        tokens.push(format!("\"{}\"", text.replace('"', "")));
    }
}

fn is_plain(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
