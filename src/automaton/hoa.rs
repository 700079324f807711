//! Reader for the Hanoi Omega-Automata format, restricted to what `ltl2tgba -B -H` emits:
//! state-based acceptance, explicit edge labels, one initial state.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{Automaton, Edge};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HoaError {
    #[error("missing HOA header field {0}")]
    MissingHeader(&'static str),

    #[error("missing --BODY-- section")]
    MissingBody,

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Parse HOA text into an [`Automaton`], rendering labels over proposition names.
pub fn parse_hoa(text: &str) -> Result<Automaton, HoaError> {
    let mut states = None;
    let mut initial = None;
    let mut propositions: Vec<String> = Vec::new();
    let mut lines = text.lines().enumerate();

    let mut in_body = false;
    for (n, raw) in lines.by_ref() {
        let line = raw.trim();
        if line == "--BODY--" {
            in_body = true;
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "States" => states = Some(parse_number(value, n)?),
            "Start" => {
                if initial.is_some() {
                    return Err(malformed(n, "more than one initial state"));
                }
                initial = Some(parse_number(value, n)?);
            }
            "AP" => propositions = parse_propositions(value, n)?,
            _ => {}
        }
    }
    if !in_body {
        return Err(HoaError::MissingBody);
    }

    let states = states.ok_or(HoaError::MissingHeader("States"))?;
    let initial = initial.ok_or(HoaError::MissingHeader("Start"))?;
    if initial >= states {
        return Err(HoaError::Malformed {
            line: 0,
            reason: format!("initial state {} out of range", initial),
        });
    }

    let mut accepting = BTreeSet::new();
    let mut edges = Vec::new();
    let mut current: Option<usize> = None;

    for (n, raw) in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line == "--END--" {
            break;
        }
        if let Some(rest) = line.strip_prefix("State:") {
            let (state, acc) = parse_state_line(rest, n)?;
            if state >= states {
                return Err(malformed(n, format!("state {} out of range", state)));
            }
            if acc {
                accepting.insert(state);
            }
            current = Some(state);
            continue;
        }

        let src = current.ok_or_else(|| malformed(n, "edge before any State:"))?;
        let rest = line
            .strip_prefix('[')
            .ok_or_else(|| malformed(n, "expected explicit edge label"))?;
        let (label, dst) = rest
            .split_once(']')
            .ok_or_else(|| malformed(n, "unterminated edge label"))?;
        let dst = dst
            .split_whitespace()
            .next()
            .ok_or_else(|| malformed(n, "edge without destination"))?;
        let dst = parse_number(dst, n)?;
        if dst >= states {
            return Err(malformed(n, format!("destination {} out of range", dst)));
        }
        edges.push(Edge {
            src,
            dst,
            label: render_label(label, &propositions, n)?,
        });
    }

    Ok(Automaton {
        states,
        initial,
        accepting,
        edges,
        atomic_propositions: propositions,
    })
}

fn malformed(line: usize, reason: impl Into<String>) -> HoaError {
    HoaError::Malformed {
        line: line + 1,
        reason: reason.into(),
    }
}

fn parse_number(value: &str, line: usize) -> Result<usize, HoaError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(line, format!("expected a number, got '{}'", value)))
}

/// `AP: 2 "a" "temp > 30"`
fn parse_propositions(value: &str, line: usize) -> Result<Vec<String>, HoaError> {
    let (count, rest) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
    let count = parse_number(count, line)?;
    let names: Vec<String> = rest
        .split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect();
    if names.len() != count {
        return Err(malformed(
            line,
            format!("AP declares {} propositions but lists {}", count, names.len()),
        ));
    }
    Ok(names)
}

/// `State: 1 "name" {0}` → (1, true)
fn parse_state_line(rest: &str, line: usize) -> Result<(usize, bool), HoaError> {
    let rest = rest.trim();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let state = parse_number(&rest[..end], line)?;
    let accepting = rest[end..]
        .rfind('{')
        .map(|i| !rest[end + i..].trim_matches(|c| c == '{' || c == '}').trim().is_empty())
        .unwrap_or(false);
    Ok((state, accepting))
}

/// Replace proposition indices by names; `t` and `f` become `1` and `0`.
fn render_label(label: &str, propositions: &[String], line: usize) -> Result<String, HoaError> {
    let mut out = String::new();
    let mut chars = label.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '0'..='9' => {
                let mut digits = c.to_string();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                let index = parse_number(&digits, line)?;
                let name = propositions
                    .get(index)
                    .ok_or_else(|| malformed(line, format!("unknown proposition {}", index)))?;
                out.push_str(&quote_proposition(name));
            }
            't' => out.push('1'),
            'f' => out.push('0'),
            '&' => out.push_str(" & "),
            '|' => out.push_str(" | "),
            '!' | '(' | ')' => out.push(c),
            c if c.is_whitespace() => {}
            other => return Err(malformed(line, format!("unexpected '{}' in label", other))),
        }
    }
    Ok(out)
}

fn quote_proposition(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `ltl2tgba -B -H -f '[]("temp > 30" -> <>done)'`
    pub(crate) const RESPONSE_AUTOMATON: &str = r#"HOA: v1
name: "G(\"temp > 30\" -> Fdone)"
States: 2
Start: 0
AP: 2 "temp > 30" "done"
acc-name: Buchi
Acceptance: 1 Inf(0)
properties: trans-labels explicit-labels state-acc complete
properties: stutter-invariant
--BODY--
State: 0 {0}
[!0 | 1] 0
[0&!1] 1
State: 1
[1] 0
[!1] 1
--END--
"#;

    #[test]
    fn test_parse_response_automaton() {
        let automaton = parse_hoa(RESPONSE_AUTOMATON).unwrap();
        assert_eq!(automaton.states, 2);
        assert_eq!(automaton.initial, 0);
        assert_eq!(automaton.accepting, BTreeSet::from([0]));
        assert_eq!(automaton.atomic_propositions, vec!["temp > 30", "done"]);
        assert_eq!(automaton.edges.len(), 4);
        assert_eq!(automaton.edges[0].label, "!\"temp > 30\" | done");
        assert_eq!(automaton.edges[1].label, "\"temp > 30\" & !done");
        assert_eq!(automaton.edges[1].dst, 1);
        assert_eq!(automaton.edges[2].src, 1);
        assert_eq!(automaton.transition_count(), 2);
    }

    #[test]
    fn test_true_label() {
        let text = "HOA: v1\nStates: 2\nStart: 0\nAP: 1 \"p\"\n--BODY--\nState: 0\n[0] 1\nState: 1 \"goal\" {0}\n[t] 1\n--END--\n";
        let automaton = parse_hoa(text).unwrap();
        assert_eq!(automaton.edges[1].label, "1");
        assert!(automaton.is_accepting(1));
        assert!(!automaton.is_accepting(0));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_hoa("HOA: v1\nStates: 1\n"), Err(HoaError::MissingBody));
        assert_eq!(
            parse_hoa("HOA: v1\nStates: 1\nAP: 0\n--BODY--\n--END--\n"),
            Err(HoaError::MissingHeader("Start"))
        );
        assert!(matches!(
            parse_hoa("HOA: v1\nStates: 1\nStart: 0\nAP: 0\n--BODY--\nState: 0\n[0] 0\n--END--\n"),
            Err(HoaError::Malformed { .. })
        ));
        assert!(matches!(
            parse_hoa("HOA: v1\nStates: 1\nStart: 0\nAP: 0\n--BODY--\nState: 0\n[t] 3\n--END--\n"),
            Err(HoaError::Malformed { .. })
        ));
    }
}
