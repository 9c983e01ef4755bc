//! Literal decoding for python syntax nodes
//!
//! Only plain literals are recognised: strings without interpolation, ints,
//! floats, booleans, `None` and negated numbers. Everything else is `None`.

use serde_json::{Number, Value};
use tree_sitter::Node;

/// Decode a node as a literal value
pub(crate) fn literal_value(node: Node<'_>, src: &[u8]) -> Option<Value> {
    match node.kind() {
        "string" => string_literal(node, src).map(Value::String),
        "integer" => parse_int(node.utf8_text(src).ok()?).map(Value::from),
        "float" => parse_float(node.utf8_text(src).ok()?).map(Value::Number),
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "none" => Some(Value::Null),
        "unary_operator" => {
            let operator = node.child_by_field_name("operator")?.utf8_text(src).ok()?;
            let argument = node.child_by_field_name("argument")?;
            let value = literal_value(argument, src)?;
            match operator {
                "-" => negate(&value),
                "+" if value.is_number() => Some(value),
                _ => None,
            }
        }
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let mut inner = node.named_children(&mut cursor).filter(|n| n.kind() != "comment");
            let first = inner.next()?;
            if inner.next().is_some() {
                return None;
            }
            literal_value(first, src)
        }
        _ => None,
    }
}

/// Decode a string node without interpolation or bytes prefix
pub(crate) fn string_literal(node: Node<'_>, src: &[u8]) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();

    if children.iter().any(|c| c.kind() == "interpolation") {
        return None;
    }
    let start = children.iter().find(|c| c.kind() == "string_start")?;
    let end = children.iter().rev().find(|c| c.kind() == "string_end")?;

    let prefix: String = start
        .utf8_text(src)
        .ok()?
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if prefix.contains('b') {
        return None;
    }

    let body = std::str::from_utf8(src.get(start.end_byte()..end.start_byte())?).ok()?;
    if prefix.contains('r') {
        Some(body.to_string())
    } else {
        Some(unescape(body))
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') => {}
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some(q @ ('\\' | '\'' | '"')) => out.push(q),
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.by_ref().take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&digits);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "").to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = cleaned.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = cleaned.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = cleaned.strip_prefix("0b") {
        (rest, 2)
    } else {
        (cleaned.as_str(), 10)
    };
    i64::from_str_radix(digits, radix).ok()
}

fn parse_float(text: &str) -> Option<Number> {
    let cleaned = text.replace('_', "");
    if cleaned.ends_with(['j', 'J']) {
        return None;
    }
    cleaned.parse::<f64>().ok().and_then(Number::from_f64)
}

fn negate(value: &Value) -> Option<Value> {
    let number = value.as_number()?;
    if let Some(i) = number.as_i64() {
        return i.checked_neg().map(Value::from);
    }
    number.as_f64().and_then(|f| Number::from_f64(-f)).map(Value::Number)
}
