//! Encoding and indentation functions

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::{FunctionRegistry, expect_args, string_arg};
use crate::engine::Value;
use crate::error::{TemplateError, TemplateResult};

pub(super) fn register(registry: &mut FunctionRegistry, additional_indentation: u32) {
    registry.register("base64enc", |args: &[Value]| {
        let args = expect_args("base64enc", args, 1)?;
        Ok(Value::String(STANDARD.encode(string_arg("base64enc", args, 0)?)))
    });

    registry.register("base64dec", |args: &[Value]| {
        let args = expect_args("base64dec", args, 1)?;
        base64_decode(string_arg("base64dec", args, 0)?).map(Value::String)
    });

    registry.register("indent", move |args: &[Value]| {
        let args = expect_args("indent", args, 2)?;
        let spaces = match &args[0] {
            Value::Int(n) => *n,
            other => {
                return Err(TemplateError::function(
                    "indent",
                    format!("wrong type for value; expected int; got {}", other.type_name()),
                ));
            }
        };
        let text = string_arg("indent", args, 1)?;
        indent(spaces, additional_indentation, text).map(Value::String)
    });

    registry.register("autoindent", |_: &[Value]| {
        Err(TemplateError::function(
            "autoindent",
            "an unexpected error occurred where autoindent could not be processed",
        ))
    });
}

fn base64_decode(encoded: &str) -> TemplateResult<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| TemplateError::function("base64dec", e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|_| TemplateError::function("base64dec", "decoded value is not valid UTF-8"))
}

/// Pad every line after the first by `spaces + additional` and trim the
/// result, so the expression can sit after a YAML key on the first line.
fn indent(spaces: i64, additional: u32, text: &str) -> TemplateResult<String> {
    let width = spaces + i64::from(additional);
    let width = usize::try_from(width).map_err(|_| {
        TemplateError::function("indent", format!("negative indentation width {}", width))
    })?;

    let pad = " ".repeat(width);
    let padded = format!("\n{}{}", pad, text.replace('\n', &format!("\n{}", pad)));
    Ok(padded.trim().to_string())
}
