//! Template renderer
//!
//! Executes a parsed template against an execution context. Field access on
//! the root context is strict: a field the caller did not supply is an error.
//! Maps produced during evaluation (for example by `lookup`) are lenient and
//! yield nil for missing keys.

use super::builtins;
use super::types::*;
use crate::error::{TemplateError, TemplateResult};
use crate::functions::FunctionRegistry;

/// The value `.` refers to
#[derive(Debug, Clone)]
struct Dot {
    value: Value,
    /// Missing fields are errors rather than nil
    strict: bool,
}

pub(super) struct Renderer<'a> {
    functions: &'a FunctionRegistry,
    root: Value,
    vars: Vec<(String, Value)>,
    line: usize,
}

impl<'a> Renderer<'a> {
    pub(super) fn new(functions: &'a FunctionRegistry, root: Value) -> Self {
        let vars = vec![("$".to_string(), root.clone())];
        Self {
            functions,
            root,
            vars,
            line: 1,
        }
    }

    /// Render the node list into a string
    pub(super) fn render(mut self, nodes: &[Node]) -> TemplateResult<String> {
        let mut out = String::new();
        let dot = Dot {
            value: self.root.clone(),
            strict: true,
        };
        self.render_nodes(nodes, &dot, &mut out)?;
        Ok(out)
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::execution(self.line, message)
    }

    fn render_nodes(&mut self, nodes: &[Node], dot: &Dot, out: &mut String) -> TemplateResult<()> {
        for node in nodes {
            self.render_node(node, dot, out)?;
        }
        Ok(())
    }

    /// Render a body in its own variable scope
    fn render_scoped(&mut self, nodes: &[Node], dot: &Dot, out: &mut String) -> TemplateResult<()> {
        let scope = self.vars.len();
        let result = self.render_nodes(nodes, dot, out);
        self.vars.truncate(scope);
        result
    }

    fn render_node(&mut self, node: &Node, dot: &Dot, out: &mut String) -> TemplateResult<()> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action { line, pipeline } => {
                self.line = *line;
                let value = self.eval_pipeline(pipeline, dot)?;
                if pipeline.decl.is_empty() {
                    out.push_str(&value.to_string());
                }
            }
            Node::If {
                line,
                branches,
                otherwise,
            } => {
                let scope = self.vars.len();
                let mut taken = false;
                for (condition, body) in branches {
                    self.line = *line;
                    if self.eval_pipeline(condition, dot)?.is_truthy() {
                        self.render_scoped(body, dot, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(body) = otherwise {
                        self.render_scoped(body, dot, out)?;
                    }
                }
                self.vars.truncate(scope);
            }
            Node::With {
                line,
                pipeline,
                body,
                otherwise,
            } => {
                self.line = *line;
                let scope = self.vars.len();
                let value = self.eval_pipeline(pipeline, dot)?;
                if value.is_truthy() {
                    let inner = Dot {
                        value,
                        strict: false,
                    };
                    self.render_scoped(body, &inner, out)?;
                } else if let Some(body) = otherwise {
                    self.render_scoped(body, dot, out)?;
                }
                self.vars.truncate(scope);
            }
            Node::Range {
                line,
                pipeline,
                body,
                otherwise,
            } => {
                self.line = *line;
                self.render_range(pipeline, body, otherwise.as_deref(), dot, out)?;
            }
        }
        Ok(())
    }

    fn render_range(
        &mut self,
        pipeline: &Pipeline,
        body: &[Node],
        otherwise: Option<&[Node]>,
        dot: &Dot,
        out: &mut String,
    ) -> TemplateResult<()> {
        let value = self.eval_commands(pipeline, dot)?;
        let entries: Vec<(Value, Value)> = match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v))
                .collect(),
            Value::Map(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            Value::Int(n) => (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))).collect(),
            Value::Nil => Vec::new(),
            other => {
                return Err(self.error(format!(
                    "range can't iterate over a value of type {}",
                    other.type_name()
                )));
            }
        };

        if entries.is_empty() {
            if let Some(body) = otherwise {
                self.render_scoped(body, dot, out)?;
            }
            return Ok(());
        }

        for (key, element) in entries {
            let scope = self.vars.len();
            match pipeline.decl.as_slice() {
                [] => {}
                [value_var] => self.bind(value_var, element.clone(), pipeline.is_assign),
                [key_var, value_var] => {
                    self.bind(key_var, key, pipeline.is_assign);
                    self.bind(value_var, element.clone(), pipeline.is_assign);
                }
                _ => return Err(self.error("too many declarations in range")),
            }
            let inner = Dot {
                value: element,
                strict: false,
            };
            let result = self.render_nodes(body, &inner, out);
            self.vars.truncate(scope);
            result?;
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value, is_assign: bool) {
        if is_assign {
            if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.vars.push((name.to_string(), value));
    }

    /// Evaluate a pipeline and bind its declared variable, if any
    fn eval_pipeline(&mut self, pipeline: &Pipeline, dot: &Dot) -> TemplateResult<Value> {
        let value = self.eval_commands(pipeline, dot)?;
        for name in &pipeline.decl {
            self.bind(name, value.clone(), pipeline.is_assign);
        }
        Ok(value)
    }

    /// Evaluate the commands of a pipeline, feeding each result to the next
    fn eval_commands(&mut self, pipeline: &Pipeline, dot: &Dot) -> TemplateResult<Value> {
        let mut value: Option<Value> = None;
        for command in &pipeline.commands {
            value = Some(self.eval_command(command, dot, value)?);
        }
        Ok(value.unwrap_or_default())
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Dot,
        last: Option<Value>,
    ) -> TemplateResult<Value> {
        let Some((first, rest)) = command.args.split_first() else {
            return Err(self.error("empty command"));
        };

        if let Operand::Function(name) = first {
            return self.call_function(name, rest, dot, last);
        }

        if !rest.is_empty() || last.is_some() {
            return Err(self.error(format!(
                "can't give argument to non-function {}",
                describe_operand(first)
            )));
        }
        self.eval_operand(first, dot)
    }

    fn call_function(
        &mut self,
        name: &str,
        operands: &[Operand],
        dot: &Dot,
        last: Option<Value>,
    ) -> TemplateResult<Value> {
        if name == "and" || name == "or" {
            return self.short_circuit(name == "and", operands, dot, last);
        }

        let mut args = Vec::with_capacity(operands.len() + 1);
        for operand in operands {
            args.push(self.eval_operand(operand, dot)?);
        }
        args.extend(last);

        if let Some(function) = self.functions.get(name) {
            tracing::trace!(function = name, args = args.len(), "calling template function");
            return function(&args);
        }
        builtins::call(name, &args)
    }

    /// `and` returns the first falsy argument or the last; `or` the first
    /// truthy argument or the last.
    fn short_circuit(
        &mut self,
        is_and: bool,
        operands: &[Operand],
        dot: &Dot,
        last: Option<Value>,
    ) -> TemplateResult<Value> {
        if operands.is_empty() && last.is_none() {
            return Err(self.error(format!(
                "wrong number of args for {}: want at least 1 got 0",
                if is_and { "and" } else { "or" }
            )));
        }

        let mut value = Value::Nil;
        for operand in operands {
            value = self.eval_operand(operand, dot)?;
            if value.is_truthy() != is_and {
                return Ok(value);
            }
        }
        Ok(last.unwrap_or(value))
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Dot) -> TemplateResult<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Dot => Ok(dot.value.clone()),
            Operand::Field(chain) => self.resolve_chain(dot.value.clone(), chain, dot.strict),
            Operand::Variable(name, chain) => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| self.error(format!("undefined variable: {}", name)))?;
                self.resolve_chain(value, chain, name == "$")
            }
            Operand::Function(name) => self.call_function(name, &[], dot, None),
            Operand::Pipeline(pipeline, chain) => {
                let scope = self.vars.len();
                let result = self.eval_pipeline(pipeline, dot);
                self.vars.truncate(scope);
                self.resolve_chain(result?, chain, false)
            }
        }
    }

    /// Follow `.A.B` from `value`. `strict` applies to the first hop only.
    fn resolve_chain(&self, value: Value, chain: &[String], strict: bool) -> TemplateResult<Value> {
        let mut current = value;
        for (i, field) in chain.iter().enumerate() {
            current = match current {
                Value::Map(mut map) => match map.remove(field) {
                    Some(v) => v,
                    None if strict && i == 0 => {
                        return Err(self.error(format!(
                            "can't evaluate field {} in the execution context",
                            field
                        )));
                    }
                    None => Value::Nil,
                },
                Value::Nil => {
                    return Err(self.error(format!("nil pointer evaluating {}", field)));
                }
                other => {
                    return Err(self.error(format!(
                        "can't evaluate field {} in type {}",
                        field,
                        other.type_name()
                    )));
                }
            };
        }
        Ok(current)
    }
}

/// Names an operand for an error message. Literals are named by type only:
/// after the decrypt pass their text may be plaintext.
fn describe_operand(operand: &Operand) -> String {
    match operand {
        Operand::Literal(value) => format!("{} constant", value.type_name()),
        Operand::Dot => ".".to_string(),
        Operand::Field(chain) => format!(".{}", chain.join(".")),
        Operand::Variable(name, chain) if chain.is_empty() => name.clone(),
        Operand::Variable(name, chain) => format!("{}.{}", name, chain.join(".")),
        Operand::Function(name) => name.clone(),
        Operand::Pipeline(..) => "(pipeline)".to_string(),
    }
}
