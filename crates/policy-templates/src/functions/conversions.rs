//! Permissive numeric and boolean coercion
//!
//! These are the only functions that swallow malformed input: they return
//! the zero value instead of an error. `atoi` and `toBool` still require a
//! string argument.

use super::{FunctionRegistry, expect_args, string_arg};
use crate::engine::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("toInt", |args: &[Value]| {
        let args = expect_args("toInt", args, 1)?;
        Ok(Value::Int(to_int(&args[0])))
    });

    registry.register("atoi", |args: &[Value]| {
        let args = expect_args("atoi", args, 1)?;
        Ok(Value::Int(atoi(string_arg("atoi", args, 0)?)))
    });

    registry.register("toBool", |args: &[Value]| {
        let args = expect_args("toBool", args, 1)?;
        Ok(Value::Bool(to_bool(string_arg("toBool", args, 0)?)))
    });
}

/// Cast-like conversion; anything unparsable is 0
fn to_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) => f.trunc() as i64,
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => parse_int(s).unwrap_or_default(),
        Value::Nil | Value::List(_) | Value::Map(_) => 0,
    }
}

/// Integer text read the way Go's `strconv.ParseInt(s, 0, 64)` reads it:
/// optional sign, `0x`/`0o`/`0b` prefixes, a bare leading `0` meaning octal
/// (`"010"` is 8) and `_` separators between digits. Float text is
/// truncated when its fractional part is zero.
fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let text = match text.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => text,
    };

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if !underscores_separate_digits(digits) {
        return None;
    }

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };

    let body: String = body.chars().filter(|c| *c != '_').collect();
    // from_str_radix would accept a second sign
    if !body.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let magnitude = i128::from(u64::from_str_radix(&body, radix).ok()?);
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// `_` is only allowed between digits, or right after a base prefix
fn underscores_separate_digits(digits: &str) -> bool {
    let bytes = digits.as_bytes();
    let mut i = 0;
    let mut hex = false;
    // '^' start, '0' digit or prefix, '_' underscore, '!' other
    let mut saw = b'^';

    if bytes.len() >= 2 && bytes[0] == b'0' {
        let base = bytes[1].to_ascii_lowercase();
        if matches!(base, b'b' | b'o' | b'x') {
            i = 2;
            saw = b'0';
            hex = base == b'x';
        }
    }

    for &b in &bytes[i..] {
        if b.is_ascii_digit() || (hex && b.is_ascii_hexdigit()) {
            saw = b'0';
        } else if b == b'_' {
            if saw != b'0' {
                return false;
            }
            saw = b'_';
        } else {
            if saw == b'_' {
                return false;
            }
            saw = b'!';
        }
    }
    saw != b'_'
}

/// Decimal parse; malformed input is 0
fn atoi(text: &str) -> i64 {
    text.parse().unwrap_or_default()
}

fn to_bool(text: &str) -> bool {
    matches!(text, "1" | "t" | "T" | "TRUE" | "true" | "True")
}
