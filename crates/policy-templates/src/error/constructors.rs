//! Constructor methods for TemplateError

use super::types::{Stage, TemplateError};

impl TemplateError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a context validation error
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }

    /// Create a conversion error for the given stage
    pub fn conversion(stage: Stage, message: impl Into<String>) -> Self {
        Self::Conversion {
            stage,
            message: message.into(),
        }
    }

    /// Create a parse error at a line of the template text
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            line,
            template: None,
        }
    }

    /// Create an execution error at a line of the template text
    pub fn execution(line: usize, message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            line,
        }
    }

    /// Create a template function error
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
        }
    }

    /// Create an IO error for a path
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Attach the offending template text.
    ///
    /// Parse errors record it in place; evaluation-stage errors are wrapped in
    /// [`TemplateError::Evaluation`]. Other errors are returned unchanged.
    pub fn with_template(self, template: impl Into<String>) -> Self {
        match self {
            Self::Parse { message, line, .. } => Self::Parse {
                message,
                line,
                template: Some(template.into()),
            },
            err @ (Self::Lookup { .. }
            | Self::Function { .. }
            | Self::ProtectNotEnabled
            | Self::Execution { .. }) => Self::Evaluation {
                template: Some(template.into()),
                source: Box::new(err),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for TemplateError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_carries_template() {
        let err = TemplateError::parse(3, "unexpected \"}\"").with_template("{\"a\":\"{{ }\"}");
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("{\"a\":\"{{ }\"}"));
        assert_eq!(err.stage(), Some(Stage::Parse));
    }

    #[test]
    fn test_function_error_wrapped_as_evaluation() {
        let err = TemplateError::ProtectNotEnabled.with_template("doc");
        assert_eq!(err.error_code(), "TEMPLATE_EVALUATION");
        assert!(matches!(err.root_cause(), TemplateError::ProtectNotEnabled));
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_conversion_names_stage() {
        let err = TemplateError::conversion(Stage::ConvertToYaml, "EOF while parsing");
        assert_eq!(
            err.to_string(),
            "failed to convert the policy template to YAML: EOF while parsing"
        );
    }

    #[test]
    fn test_config_errors_have_no_stage() {
        assert_eq!(TemplateError::AesKeyNotSet.stage(), None);
        assert_eq!(TemplateError::InvalidIv { len: 3 }.stage(), None);
    }
}
