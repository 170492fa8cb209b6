//! Built-in template functions
//!
//! The comparison, logic, collection and printing functions every template
//! can use regardless of the resolver's function registry:
//! - and, or, not
//! - eq, ne, lt, le, gt, ge
//! - len, index
//! - print, printf, println
//!
//! `and` and `or` short-circuit, so the renderer evaluates them itself.

use std::cmp::Ordering;

use super::types::Value;
use crate::error::{TemplateError, TemplateResult};

const BUILTINS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print", "printf",
    "println",
];

/// Whether `name` is a built-in function
pub(super) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a built-in function other than `and`/`or`
pub(super) fn call(name: &str, args: &[Value]) -> TemplateResult<Value> {
    match name {
        "not" => {
            let [value] = args else {
                return Err(arity(name, 1, args.len()));
            };
            Ok(Value::Bool(!value.is_truthy()))
        }
        "eq" => eq(args).map(Value::Bool),
        "ne" => {
            let [a, b] = args else {
                return Err(arity(name, 2, args.len()));
            };
            Ok(Value::Bool(!equal(name, a, b)?))
        }
        "lt" => ordered(name, args, |o| o == Ordering::Less),
        "le" => ordered(name, args, |o| o != Ordering::Greater),
        "gt" => ordered(name, args, |o| o == Ordering::Greater),
        "ge" => ordered(name, args, |o| o != Ordering::Less),
        "len" => len(args),
        "index" => index(args),
        "print" => Ok(Value::String(sprint(args))),
        "println" => {
            let mut out = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
            out.push('\n');
            Ok(Value::String(out))
        }
        "printf" => {
            let Some((format, rest)) = args.split_first() else {
                return Err(arity(name, 1, 0));
            };
            let Value::String(format) = format else {
                return Err(TemplateError::function(
                    name,
                    format!("format must be a string, got {}", format.type_name()),
                ));
            };
            Ok(Value::String(sprintf(format, rest)))
        }
        other => Err(TemplateError::function(other, "not a built-in function")),
    }
}

fn arity(name: &str, want: usize, got: usize) -> TemplateError {
    TemplateError::function(name, format!("wrong number of args: want {} got {}", want, got))
}

fn eq(args: &[Value]) -> TemplateResult<bool> {
    let Some((first, rest)) = args.split_first() else {
        return Err(TemplateError::function("eq", "missing argument for comparison"));
    };
    if rest.is_empty() {
        return Err(TemplateError::function("eq", "missing argument for comparison"));
    }
    for other in rest {
        if equal("eq", first, other)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn equal(name: &str, a: &Value, b: &Value) -> TemplateResult<bool> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Nil, _) | (_, Value::Nil) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Float(x), Value::Float(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::List(_), _) | (Value::Map(_), _) | (_, Value::List(_)) | (_, Value::Map(_)) => {
            Err(TemplateError::function(name, "non-comparable type"))
        }
        _ => Err(TemplateError::function(name, "incompatible types for comparison")),
    }
}

fn ordered(name: &str, args: &[Value], accept: fn(Ordering) -> bool) -> TemplateResult<Value> {
    let [a, b] = args else {
        return Err(arity(name, 2, args.len()));
    };
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| TemplateError::function(name, "invalid type for comparison"))?,
        (
            Value::Int(_) | Value::Float(_) | Value::String(_),
            Value::Int(_) | Value::Float(_) | Value::String(_),
        ) => {
            return Err(TemplateError::function(name, "incompatible types for comparison"));
        }
        _ => return Err(TemplateError::function(name, "invalid type for comparison")),
    };
    Ok(Value::Bool(accept(ordering)))
}

fn len(args: &[Value]) -> TemplateResult<Value> {
    let [value] = args else {
        return Err(arity("len", 1, args.len()));
    };
    let n = match value {
        Value::String(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(TemplateError::function(
                "len",
                format!("len of type {}", other.type_name()),
            ));
        }
    };
    Ok(Value::Int(n as i64))
}

fn index(args: &[Value]) -> TemplateResult<Value> {
    let Some((item, indexes)) = args.split_first() else {
        return Err(arity("index", 1, 0));
    };

    let mut current = item.clone();
    for idx in indexes {
        current = match (&current, idx) {
            (Value::List(items), Value::Int(i)) => {
                let position = usize::try_from(*i).ok().filter(|p| *p < items.len());
                match position {
                    Some(p) => items[p].clone(),
                    None => {
                        return Err(TemplateError::function(
                            "index",
                            format!("index out of range: {}", i),
                        ));
                    }
                }
            }
            (Value::String(s), Value::Int(i)) => {
                let position = usize::try_from(*i).ok().filter(|p| *p < s.len());
                match position {
                    Some(p) => Value::Int(i64::from(s.as_bytes()[p])),
                    None => {
                        return Err(TemplateError::function(
                            "index",
                            format!("index out of range: {}", i),
                        ));
                    }
                }
            }
            (Value::Map(map), Value::String(key)) => map.get(key).cloned().unwrap_or_default(),
            (Value::Nil, _) => {
                return Err(TemplateError::function("index", "index of untyped nil"));
            }
            (container, idx) => {
                return Err(TemplateError::function(
                    "index",
                    format!(
                        "cannot index {} with {}",
                        container.type_name(),
                        idx.type_name()
                    ),
                ));
            }
        };
    }
    Ok(current)
}

/// Operands are separated by a space when neither side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            let prev_is_string = matches!(args[i - 1], Value::String(_));
            if !prev_is_string && !matches!(arg, Value::String(_)) {
                out.push(' ');
            }
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut next_arg = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = digits.parse().ok().or(Some(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;
        out.push_str(&format_verb(verb, precision, arg));
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|a| format!("{}={}", a.type_name(), a))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn format_verb(verb: char, precision: Option<usize>, arg: &Value) -> String {
    let bad = || format!("%!{}({}={})", verb, arg.type_name(), arg);
    match (verb, arg) {
        ('v', _) => arg.to_string(),
        ('s', Value::String(s)) => s.clone(),
        ('s', Value::List(_) | Value::Map(_)) => arg.to_string(),
        ('d', Value::Int(i)) => i.to_string(),
        ('t', Value::Bool(b)) => b.to_string(),
        ('q', Value::String(s)) => format!("{:?}", s),
        ('f', Value::Float(f)) => format!("{:.*}", precision.unwrap_or(6), f),
        ('g', Value::Float(_)) if precision.is_none() => arg.to_string(),
        ('x', Value::Int(i)) => format!("{:x}", i),
        ('x', Value::String(s)) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
        _ => bad(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_eq_any_of() {
        assert_eq!(call("eq", &[s("b"), s("a"), s("b")]).unwrap(), Value::Bool(true));
        assert_eq!(call("eq", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Bool(false));
        assert!(call("eq", &[Value::Int(1), s("1")]).is_err());
    }

    #[test]
    fn test_ordering() {
        assert_eq!(call("lt", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Bool(true));
        assert_eq!(call("ge", &[s("a"), s("b")]).unwrap(), Value::Bool(false));
        assert!(call("lt", &[Value::Bool(true), Value::Bool(false)]).is_err());
    }

    #[test]
    fn test_len_and_index() {
        let list = Value::List(vec![s("a"), s("b")]);
        assert_eq!(call("len", &[list.clone()]).unwrap(), Value::Int(2));
        assert_eq!(call("index", &[list.clone(), Value::Int(1)]).unwrap(), s("b"));
        assert!(call("index", &[list, Value::Int(5)]).is_err());

        let map = Value::from(serde_json::json!({"data": {"key": "v"}}));
        assert_eq!(call("index", &[map.clone(), s("data"), s("key")]).unwrap(), s("v"));
        assert_eq!(call("index", &[map, s("missing")]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_print_family() {
        assert_eq!(call("print", &[s("a"), s("b")]).unwrap(), s("ab"));
        assert_eq!(call("print", &[Value::Int(1), Value::Int(2)]).unwrap(), s("1 2"));
        assert_eq!(call("println", &[s("a"), s("b")]).unwrap(), s("a b\n"));
        assert_eq!(
            call(
                "printf",
                &[
                    s("%s-%d-%q-%.2f-%%"),
                    s("x"),
                    Value::Int(3),
                    s("y"),
                    Value::Float(1.5),
                ],
            )
            .unwrap(),
            s("x-3-\"y\"-1.50-%")
        );
    }

    #[test]
    fn test_printf_float_verbs() {
        assert_eq!(call("printf", &[s("%v"), Value::Float(1e21)]).unwrap(), s("1e+21"));
        assert_eq!(call("printf", &[s("%g"), Value::Float(2.5)]).unwrap(), s("2.5"));
        assert_eq!(call("print", &[Value::Float(4.0)]).unwrap(), s("4"));
    }

    #[test]
    fn test_printf_bad_and_missing_args() {
        assert_eq!(call("printf", &[s("%d"), s("x")]).unwrap(), s("%!d(string=x)"));
        assert_eq!(call("printf", &[s("%s %s"), s("x")]).unwrap(), s("x %!s(MISSING)"));
        assert_eq!(
            call("printf", &[s("%s"), s("x"), Value::Int(1)]).unwrap(),
            s("x%!(EXTRA int=1)")
        );
    }

    #[test]
    fn test_not() {
        assert_eq!(call("not", &[s("")]).unwrap(), Value::Bool(true));
        assert!(call("not", &[]).is_err());
    }
}
