use crate::event::{FieldValue, Fields};
use regex::Regex;
use std::sync::OnceLock;

/// Header of a babeltrace text line: timestamp, optional delta, optional host, event name
fn header_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^\[(?P<ts>[0-9][0-9:.]*)\]\s+(?:\(\+?[-0-9.?]+\)\s+)?(?:(?P<host>\S+)\s+)?(?P<name>[^\s:{}]+):\s*(?P<body>.*)$",
            )
            .ok()
        })
        .as_ref()
}

/// Timestamp as written in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    /// `HH:MM:SS.fraction`, nanoseconds since midnight
    ClockOfDay(u64),
    /// `seconds.fraction`, nanoseconds since an arbitrary origin
    Absolute(u64),
}

/// A syntactically valid line, before typing
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub timestamp: RawTimestamp,
    pub name: String,
    /// Field groups before the payload (packet and stream context)
    pub context: Fields,
    /// Last field group
    pub payload: Fields,
}

/// Outcome of scanning one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Event(RawLine),
    /// Blank or comment line
    Ignored,
    Malformed(&'static str),
}

/// Scan one trace line
pub fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return LineOutcome::Ignored;
    }

    let Some(caps) = header_pattern().and_then(|re| re.captures(line)) else {
        return LineOutcome::Malformed("header does not match");
    };

    let Some(timestamp) = parse_timestamp(&caps["ts"]) else {
        return LineOutcome::Malformed("invalid timestamp");
    };

    let mut groups = match split_groups(&caps["body"]) {
        Ok(groups) => groups,
        Err(reason) => return LineOutcome::Malformed(reason),
    };

    let payload_text = groups.pop();
    let mut context = Fields::new();
    for group in groups {
        parse_group(group, &mut context);
    }
    let mut payload = Fields::new();
    if let Some(text) = payload_text {
        parse_group(text, &mut payload);
    }

    LineOutcome::Event(RawLine {
        timestamp,
        name: caps["name"].to_string(),
        context,
        payload,
    })
}

/// Parse `HH:MM:SS.fraction` or `seconds.fraction` into nanoseconds
pub fn parse_timestamp(text: &str) -> Option<RawTimestamp> {
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    let nanos = parse_fraction(fraction)?;

    let parts: Vec<&str> = whole.split(':').collect();
    match parts.as_slice() {
        [secs] => {
            let secs: u64 = secs.parse().ok()?;
            Some(RawTimestamp::Absolute(
                secs.checked_mul(1_000_000_000)?.checked_add(nanos)?,
            ))
        }
        [h, m, s] => {
            let h: u64 = h.parse().ok()?;
            let m: u64 = m.parse().ok()?;
            let s: u64 = s.parse().ok()?;
            if m >= 60 || s >= 61 {
                return None;
            }
            let secs = h.checked_mul(3600)?.checked_add(m * 60 + s)?;
            Some(RawTimestamp::ClockOfDay(
                secs.checked_mul(1_000_000_000)?.checked_add(nanos)?,
            ))
        }
        _ => None,
    }
}

/// Fractional seconds to nanoseconds; digits past the ninth are truncated
fn parse_fraction(fraction: &str) -> Option<u64> {
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: String = fraction.chars().take(9).collect();
    let padded = format!("{:0<9}", digits);
    padded.parse().ok()
}

/// Split the body into top-level `{ ... }` group contents
fn split_groups(body: &str) -> Result<Vec<&str>, &'static str> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if depth > 0 => in_quote = Some(c),
            '{' => {
                if depth == 0 {
                    start = Some(i + 1);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err("unbalanced braces");
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        groups.push(&body[s..i]);
                    }
                }
            }
            ',' | ' ' | '\t' if depth == 0 => {}
            _ if depth == 0 => return Err("text outside field groups"),
            _ => {}
        }
    }

    if in_quote.is_some() {
        return Err("unterminated string");
    }
    if depth != 0 {
        return Err("truncated field group");
    }
    Ok(groups)
}

/// Parse `key = value, ...` items of one group into `out`
fn parse_group(group: &str, out: &mut Fields) {
    for item in split_top_level(group) {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !is_identifier(key) {
            continue;
        }
        out.insert(key.to_string(), normalize_value(value.trim()));
    }
}

/// Split on commas outside quotes and nested brackets
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_quote = Some(c),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[start..]);
    items.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalize a raw value: quoted string, hexadecimal, integer, float, or raw text
pub fn normalize_value(raw: &str) -> FieldValue {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return FieldValue::Str(raw[1..raw.len() - 1].replace("\\\"", "\""));
        }
    }

    if let Some(hex) = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
    {
        if let Ok(v) = u64::from_str_radix(hex, 16) {
            // Pointer-sized values wrap; AT_FDCWD and friends stay recognisable
            return FieldValue::Int(v as i64);
        }
    }

    if let Ok(v) = raw.parse::<i64>() {
        return FieldValue::Int(v);
    }

    if raw.contains('.') {
        if let Ok(v) = raw.parse::<f64>() {
            return FieldValue::Float(v);
        }
    }

    FieldValue::Str(raw.to_string())
}
