//! Expression engine
//!
//! Evaluates the expression language embedded in policy documents:
//! - Field access on the execution context: `{{ .ClusterName }}`
//! - Pipelines, where each result becomes the last argument of the next
//!   command: `{{ "6" | toInt }}`
//! - Variables: `{{ $ns := "default" }}`, `{{ $ns }}`, `{{ $.Field }}`
//! - Control actions: `if`/`else if`/`else`, `with`, `range`, `end`
//! - Trim markers (`{{- ` and ` -}}`) and comments (`{{/* ... */}}`)
//!
//! Function names are resolved against a [`FunctionRegistry`] plus the
//! built-in comparison and printing functions.
//!
//! # Example
//!
//! ```rust,ignore
//! use policy_templates::engine::Template;
//!
//! let template = Template::parse("name: {{ .ClusterName }}", &delims, &registry)?;
//! let text = template.render(&context)?;
//! ```

mod builtins;
mod lexer;
mod parser;
mod renderer;
mod types;

use crate::config::Delimiters;
use crate::context::ExecutionContext;
use crate::error::TemplateResult;
use crate::functions::FunctionRegistry;

pub use types::{Command, Node, Operand, Pipeline, Value};

/// A parsed template, bound to the functions it was parsed against
#[derive(Clone)]
pub struct Template {
    nodes: Vec<Node>,
    functions: FunctionRegistry,
}

impl Template {
    /// Parse template text using the given delimiters and functions
    pub fn parse(
        text: &str,
        delims: &Delimiters,
        functions: &FunctionRegistry,
    ) -> TemplateResult<Self> {
        let tokens = lexer::tokenize(text, delims)?;
        let nodes = parser::TemplateParser::new(tokens, functions).parse()?;
        Ok(Self {
            nodes,
            functions: functions.clone(),
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Execute the template with `context` as the root value
    pub fn render(&self, context: &ExecutionContext) -> TemplateResult<String> {
        let root = Value::Map(
            context
                .fields()
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );
        renderer::Renderer::new(&self.functions, root).render(&self.nodes)
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
