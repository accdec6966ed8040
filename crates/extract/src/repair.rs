//! Best-effort repair of model answers that are almost JSON.
//!
//! Chat models wrap JSON in markdown fences, surround it with prose, use
//! Python literals and single quotes, leave trailing commas, or stop halfway
//! through. [`repair`] rewrites such text into a candidate that
//! [`parse`] can read; it never fails, it only gives its best guess.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap());

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object or array found in model output")]
    NoJson,
    #[error("invalid JSON after repair: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Rewrite `text` into candidate JSON text. Returns an empty string when the
/// text holds no object or array at all.
pub fn repair(text: &str) -> String {
    let body = strip_fences(text);

    // Objects are the expected answer; only fall back to arrays without one
    let start = body.find('{').or_else(|| body.find('['));
    match start {
        Some(start) => repair_structure(&body[start..]).0,
        None => String::new(),
    }
}

/// Parse candidate text produced by [`repair`].
pub fn parse(candidate: &str) -> Result<Value, ParseError> {
    if candidate.trim().is_empty() {
        return Err(ParseError::NoJson);
    }
    Ok(serde_json::from_str(candidate)?)
}

/// Strict parse first, repair only when that fails.
///
/// Answers often quote single entity objects while reasoning before they
/// give the final `{sentence, entities}` object, so the last object carrying
/// both keys wins. Without one, the first value [`repair`] finds is used.
pub fn parse_model_output(raw: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }
    if let Some(answer) = objects_in(raw).into_iter().rev().find(is_answer) {
        return Ok(answer);
    }
    parse(&repair(raw))
}

fn is_answer(value: &Value) -> bool {
    value.get("sentence").is_some() && value.get("entities").is_some()
}

/// Every top-level object in `text` that parses after repair, in order.
/// Objects nested in an earlier one are not listed separately.
fn objects_in(text: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('{') {
        let (candidate, consumed) = repair_structure(&rest[start..]);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                objects.push(value);
                rest = &rest[start + consumed..];
            }
            Err(_) => rest = &rest[start + 1..],
        }
    }
    objects
}

fn strip_fences(text: &str) -> &str {
    FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|inner| inner.contains('{') || inner.contains('['))
        .unwrap_or(text)
}

/// Returns the candidate text and how many bytes of `src` it covers.
fn repair_structure(src: &str) -> (String, usize) {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 8);
    // Closers still owed, innermost last
    let mut stack: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' | '[' => {
                if ends_with_value(&out) {
                    out.push(',');
                }
                stack.push(if c == '{' { '}' } else { ']' });
                out.push(c);
                i += 1;
            }
            '}' | ']' => {
                trim_dangling(&mut out);
                match stack.pop() {
                    Some(closer) => out.push(closer),
                    None => return (out, byte_offset(src, i)),
                }
                if stack.is_empty() {
                    // Top-level value complete, anything after is prose
                    return (out, byte_offset(src, i + 1));
                }
                i += 1;
            }
            '"' | '\'' => {
                if ends_with_value(&out) {
                    out.push(',');
                }
                i = read_string(&chars, i, &mut out);
            }
            ',' | ':' => {
                out.push(c);
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            _ => {
                let end = scan_bare(&chars, i);
                let token: String = chars[i..end].iter().collect();
                let token = token.trim();
                if !token.is_empty() {
                    if ends_with_value(&out) {
                        out.push(',');
                    }
                    out.push_str(&bare_literal(token));
                }
                i = end.max(i + 1);
            }
        }
    }

    // Truncated answer: close whatever is still open
    while let Some(closer) = stack.pop() {
        trim_dangling(&mut out);
        out.push(closer);
    }
    (out, src.len())
}

fn byte_offset(src: &str, char_index: usize) -> usize {
    src.char_indices()
        .nth(char_index)
        .map_or(src.len(), |(offset, _)| offset)
}

/// Copy one quoted string starting at `start` into `out` as a valid JSON
/// string. Returns the index just past the closing quote.
fn read_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push('"');
    let mut j = start + 1;

    while j < chars.len() {
        let ch = chars[j];
        match ch {
            '\\' => {
                match chars.get(j + 1) {
                    Some('\'') => out.push('\''),
                    Some(&next) if "\"\\/bfnrtu".contains(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    Some(&next) => {
                        out.push_str("\\\\");
                        out.push(next);
                    }
                    None => out.push_str("\\\\"),
                }
                j += 2;
                continue;
            }
            ch if ch == quote => {
                if closes_string(chars, j + 1) {
                    out.push('"');
                    return j + 1;
                }
                // A stray quote inside the text
                if quote == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push('\'');
                }
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", ch as u32)),
            ch => out.push(ch),
        }
        j += 1;
    }

    // Unterminated string
    out.push('"');
    j
}

/// A quote ends its string when what follows can only be structure.
fn closes_string(chars: &[char], from: usize) -> bool {
    let mut saw_newline = false;
    for &ch in &chars[from.min(chars.len())..] {
        if ch == '\n' {
            saw_newline = true;
        }
        if ch.is_whitespace() {
            continue;
        }
        return saw_newline || matches!(ch, ',' | ':' | '}' | ']');
    }
    true
}

fn scan_bare(chars: &[char], start: usize) -> usize {
    let mut j = start;
    while j < chars.len() {
        if matches!(chars[j], ',' | ':' | '}' | ']' | '{' | '[' | '"' | '\'' | '\n') {
            break;
        }
        j += 1;
    }
    j
}

fn bare_literal(token: &str) -> String {
    match token {
        "true" | "True" => "true".to_string(),
        "false" | "False" => "false".to_string(),
        "null" | "None" | "none" | "undefined" => "null".to_string(),
        _ => match serde_json::from_str::<Value>(token) {
            Ok(number @ Value::Number(_)) => number.to_string(),
            _ => Value::String(token.to_string()).to_string(),
        },
    }
}

fn ends_with_value(out: &str) -> bool {
    out.trim_end()
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '}' | ']' | '"') || c.is_ascii_alphanumeric())
}

/// Drop trailing commas, and give a dangling key a null value.
fn trim_dangling(out: &mut String) {
    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
}
