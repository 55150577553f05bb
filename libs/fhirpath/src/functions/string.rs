//! String manipulation functions.
//!
//! Every function here takes a single string input: empty input yields empty,
//! more than one item or a non-string item is an invalid argument. A
//! string-typed element without a value behaves like empty input.
//!
//! Positions and lengths count characters, not bytes.

use base64::engine::general_purpose;
use base64::Engine as _;

use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::node::Node;

use super::{boolean, empty, integer_arg, string_arg, string_input};

fn string_result(value: impl Into<String>) -> Result<Collection> {
    Ok(Collection::singleton(Node::string(value.into())))
}

fn integer_result(value: usize) -> Result<Collection> {
    let value = i64::try_from(value)
        .map_err(|_| Error::EvaluationError("string position overflow".into()))?;
    Ok(Collection::singleton(Node::integer(value)))
}

/// Input and one string argument; `None` when either is empty.
fn with_arg(input: &Collection, arg: &Collection, function: &str) -> Result<Option<(String, String)>> {
    let Some(s) = string_input(input, function)? else {
        return Ok(None);
    };
    Ok(string_arg(arg, function)?.map(|a| (s, a)))
}

pub fn index_of(input: &Collection, substring: &Collection) -> Result<Collection> {
    let Some((s, sub)) = with_arg(input, substring, "indexOf")? else {
        return empty();
    };
    match s.find(&sub) {
        Some(byte) => integer_result(s[..byte].chars().count()),
        None => Ok(Collection::singleton(Node::integer(-1))),
    }
}

pub fn last_index_of(input: &Collection, substring: &Collection) -> Result<Collection> {
    let Some((s, sub)) = with_arg(input, substring, "lastIndexOf")? else {
        return empty();
    };
    match s.rfind(&sub) {
        Some(byte) => integer_result(s[..byte].chars().count()),
        None => Ok(Collection::singleton(Node::integer(-1))),
    }
}

/// Characters from `start`, optionally limited to `length`. A start outside
/// the string yields empty.
pub fn substring(input: &Collection, start: &Collection, length: Option<&Collection>) -> Result<Collection> {
    let Some(s) = string_input(input, "substring")? else {
        return empty();
    };
    let Some(start) = integer_arg(start, "substring")? else {
        return empty();
    };
    let char_count = s.chars().count();
    let Ok(start) = usize::try_from(start) else {
        return empty();
    };
    if start >= char_count {
        return empty();
    }

    let length = match length {
        Some(arg) => integer_arg(arg, "substring")?,
        None => None,
    };
    let taken: String = match length {
        Some(n) if n <= 0 => String::new(),
        Some(n) => s
            .chars()
            .skip(start)
            .take(usize::try_from(n).unwrap_or(usize::MAX))
            .collect(),
        None => s.chars().skip(start).collect(),
    };
    string_result(taken)
}

pub fn starts_with(input: &Collection, prefix: &Collection) -> Result<Collection> {
    match with_arg(input, prefix, "startsWith")? {
        Some((s, prefix)) => boolean(s.starts_with(&prefix)),
        None => empty(),
    }
}

pub fn ends_with(input: &Collection, suffix: &Collection) -> Result<Collection> {
    match with_arg(input, suffix, "endsWith")? {
        Some((s, suffix)) => boolean(s.ends_with(&suffix)),
        None => empty(),
    }
}

pub fn contains(input: &Collection, substring: &Collection) -> Result<Collection> {
    match with_arg(input, substring, "contains")? {
        Some((s, sub)) => boolean(s.contains(&sub)),
        None => empty(),
    }
}

pub fn upper(input: &Collection) -> Result<Collection> {
    match string_input(input, "upper")? {
        Some(s) => string_result(s.to_uppercase()),
        None => empty(),
    }
}

pub fn lower(input: &Collection) -> Result<Collection> {
    match string_input(input, "lower")? {
        Some(s) => string_result(s.to_lowercase()),
        None => empty(),
    }
}

/// Literal replacement. An empty pattern inserts the substitution around
/// every character.
pub fn replace(input: &Collection, pattern: &Collection, substitution: &Collection) -> Result<Collection> {
    let Some((s, pattern)) = with_arg(input, pattern, "replace")? else {
        return empty();
    };
    let Some(substitution) = string_arg(substitution, "replace")? else {
        return empty();
    };
    string_result(s.replace(&pattern, &substitution))
}

/// `matches()` finds the pattern anywhere; `matchesFull()` anchors it.
pub fn matches(
    ctx: &mut EvaluationContext,
    input: &Collection,
    pattern: &Collection,
    full: bool,
) -> Result<Collection> {
    let function = if full { "matchesFull" } else { "matches" };
    let Some((s, pattern)) = with_arg(input, pattern, function)? else {
        return empty();
    };
    let pattern = if full {
        format!("(?s)^(?:{})$", pattern)
    } else {
        format!("(?s){}", pattern)
    };
    let regex = ctx.regex(&pattern)?;
    boolean(regex.is_match(&s))
}

pub fn replace_matches(
    ctx: &mut EvaluationContext,
    input: &Collection,
    pattern: &Collection,
    substitution: &Collection,
) -> Result<Collection> {
    let Some((s, pattern)) = with_arg(input, pattern, "replaceMatches")? else {
        return empty();
    };
    let Some(substitution) = string_arg(substitution, "replaceMatches")? else {
        return empty();
    };
    if pattern.is_empty() {
        return string_result(s);
    }
    let regex = ctx.regex(&format!("(?s){}", pattern))?;
    string_result(regex.replace_all(&s, substitution.as_str()).into_owned())
}

pub fn length(input: &Collection) -> Result<Collection> {
    match string_input(input, "length")? {
        Some(s) => integer_result(s.chars().count()),
        None => empty(),
    }
}

pub fn to_chars(input: &Collection) -> Result<Collection> {
    match string_input(input, "toChars")? {
        Some(s) => Ok(s.chars().map(|c| Node::string(c.to_string())).collect()),
        None => empty(),
    }
}

pub fn trim(input: &Collection) -> Result<Collection> {
    match string_input(input, "trim")? {
        Some(s) => string_result(s.trim()),
        None => empty(),
    }
}

pub fn split(input: &Collection, separator: &Collection) -> Result<Collection> {
    let Some((s, separator)) = with_arg(input, separator, "split")? else {
        return empty();
    };
    Ok(s.split(separator.as_str()).map(|part| Node::string(part)).collect())
}

/// Join a collection of strings. Unlike the other functions here the input
/// may hold any number of items.
pub fn join(input: &Collection, separator: Option<&Collection>) -> Result<Collection> {
    if input.is_empty() {
        return empty();
    }
    let separator = match separator {
        Some(arg) => string_arg(arg, "join")?.unwrap_or_default(),
        None => String::new(),
    };
    let parts = input
        .iter()
        .map(|node| {
            node.system_value()
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "join: expected a collection of strings, found {}",
                        node.type_()
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    string_result(parts.join(&separator))
}

/// `hex`, `base64` or `urlbase64`; unknown formats yield empty.
pub fn encode(input: &Collection, format: &Collection) -> Result<Collection> {
    let Some((s, format)) = with_arg(input, format, "encode")? else {
        return empty();
    };
    let bytes = s.as_bytes();
    match format.as_str() {
        "hex" => string_result(hex::encode(bytes)),
        "base64" => string_result(general_purpose::STANDARD.encode(bytes)),
        "urlbase64" => string_result(general_purpose::URL_SAFE.encode(bytes)),
        _ => empty(),
    }
}

/// Inverse of [`encode`]. Malformed input or non-UTF-8 content yields empty.
pub fn decode(input: &Collection, format: &Collection) -> Result<Collection> {
    let Some((s, format)) = with_arg(input, format, "decode")? else {
        return empty();
    };
    let decoded = match format.as_str() {
        "hex" => hex::decode(&s).ok(),
        "base64" => general_purpose::STANDARD.decode(&s).ok(),
        "urlbase64" => general_purpose::URL_SAFE.decode(&s).ok(),
        _ => None,
    };
    match decoded.and_then(|bytes| String::from_utf8(bytes).ok()) {
        Some(text) => string_result(text),
        None => empty(),
    }
}

/// `html`, `json`, `xml` or `url`; unknown targets yield empty.
pub fn escape(input: &Collection, target: &Collection) -> Result<Collection> {
    let Some((s, target)) = with_arg(input, target, "escape")? else {
        return empty();
    };
    match target.as_str() {
        "html" => string_result(html_escape::encode_double_quoted_attribute(&s)),
        "xml" => string_result(html_escape::encode_text(&s)),
        "url" => string_result(urlencoding::encode(&s)),
        "json" => {
            let quoted = serde_json::to_string(&s)
                .map_err(|e| Error::EvaluationError(format!("escape: {}", e)))?;
            string_result(&quoted[1..quoted.len() - 1])
        }
        _ => empty(),
    }
}

pub fn unescape(input: &Collection, target: &Collection) -> Result<Collection> {
    let Some((s, target)) = with_arg(input, target, "unescape")? else {
        return empty();
    };
    match target.as_str() {
        "html" | "xml" => string_result(html_escape::decode_html_entities(&s)),
        "url" => match urlencoding::decode(&s) {
            Ok(decoded) => string_result(decoded),
            Err(_) => empty(),
        },
        "json" => {
            let quoted = format!("\"{}\"", s.replace('"', "\\\""));
            match serde_json::from_str::<String>(&quoted) {
                Ok(decoded) => string_result(decoded),
                Err(_) => string_result(s),
            }
        }
        _ => empty(),
    }
}
