//! Template function registry
//!
//! The registry is composed fresh for every resolve call:
//! 1. the base set (lookups, base64, indentation and coercion helpers),
//! 2. overrides for the active encryption mode,
//! 3. removal of every disabled name, regardless of mode.

mod conversions;
mod formatting;
mod lookups;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::EncryptionMode;
use crate::crypto::Protector;
use crate::engine::Value;
use crate::error::{TemplateError, TemplateResult};
use crate::lookup::NamespacedLookup;

/// A callable template function
pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> TemplateResult<Value> + Send + Sync>;

/// Collaborators the registry's functions close over
#[derive(Clone)]
pub(crate) struct RegistryContext {
    pub lookup: NamespacedLookup,
    /// Present in the encrypting and decrypting modes
    pub protector: Option<Protector>,
    pub additional_indentation: u32,
}

/// Named template functions available to a template
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, TemplateFunction>,
}

impl FunctionRegistry {
    /// Compose the registry for `mode`, then remove `disabled` names
    pub(crate) fn build(ctx: &RegistryContext, mode: EncryptionMode, disabled: &[String]) -> Self {
        let mut registry = Self::default();

        lookups::register(&mut registry, ctx);
        formatting::register(&mut registry, ctx.additional_indentation);
        conversions::register(&mut registry);

        match (mode, &ctx.protector) {
            (EncryptionMode::Encrypting, Some(protector)) => {
                lookups::register_protected(&mut registry, ctx, protector);
            }
            _ => registry.register("protect", |_: &[Value]| Err(TemplateError::ProtectNotEnabled)),
        }

        for name in disabled {
            if registry.functions.remove(name).is_some() {
                tracing::debug!("Disabled template function {}", name);
            }
        }

        tracing::debug!(
            "Built function registry: mode={}, functions={}",
            mode,
            registry.functions.len()
        );
        registry
    }

    /// Register or replace a function
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> TemplateResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Check the argument count of a call
fn expect_args<'a>(function: &str, args: &'a [Value], want: usize) -> TemplateResult<&'a [Value]> {
    if args.len() != want {
        return Err(TemplateError::function(
            function,
            format!("wrong number of args: want {} got {}", want, args.len()),
        ));
    }
    Ok(args)
}

/// A string argument; other types are rejected as Go templates do
fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> TemplateResult<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(TemplateError::function(
            function,
            format!(
                "wrong type for value; expected string; got {}",
                other.type_name()
            ),
        )),
        None => Err(TemplateError::function(function, "missing argument")),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;
    use crate::crypto::test_support::protector;

    fn call(registry: &FunctionRegistry, name: &str, args: &[Value]) -> TemplateResult<Value> {
        let function = registry.get(name).expect("function registered");
        function(args)
    }

    #[test]
    fn test_base_set() {
        let registry =
            FunctionRegistry::build(&context(None, None, 0), EncryptionMode::Disabled, &[]);
        assert_eq!(
            registry.names(),
            vec![
                "atoi",
                "autoindent",
                "base64dec",
                "base64enc",
                "fromClusterClaim",
                "fromConfigMap",
                "fromSecret",
                "indent",
                "lookup",
                "protect",
                "toBool",
                "toInt",
            ]
        );
    }

    #[test]
    fn test_protect_not_enabled_outside_encrypting() {
        for mode in [EncryptionMode::Disabled, EncryptionMode::Decrypting] {
            let registry = FunctionRegistry::build(&context(Some(protector()), None, 0), mode, &[]);
            let err = call(&registry, "protect", &[Value::from("x")]).unwrap_err();
            assert!(matches!(err, TemplateError::ProtectNotEnabled));
        }
    }

    #[test]
    fn test_encrypting_overrides() {
        let protector = protector();
        let registry = FunctionRegistry::build(
            &context(Some(protector.clone()), None, 0),
            EncryptionMode::Encrypting,
            &[],
        );

        let protected = call(&registry, "protect", &[Value::from("hello")]).unwrap();
        let protected = protected.as_str().unwrap();
        assert!(protected.starts_with(crate::crypto::PROTECTED_PREFIX));
        assert_eq!(call(&registry, "protect", &[Value::from("")]).unwrap(), Value::from(""));

        let secret = call(
            &registry,
            "fromSecret",
            &[Value::from("default"), Value::from("creds"), Value::from("password")],
        )
        .unwrap();
        let payload = &secret.as_str().unwrap()[crate::crypto::PROTECTED_PREFIX.len()..];
        assert_eq!(protector.decrypt_base64(payload).unwrap(), "aHVudGVyMg==");
    }

    #[test]
    fn test_disabled_names_removed_in_every_mode() {
        let disabled = vec!["fromSecret".to_string(), "protect".to_string(), "nosuch".to_string()];
        for mode in [
            EncryptionMode::Disabled,
            EncryptionMode::Encrypting,
            EncryptionMode::Decrypting,
        ] {
            let registry =
                FunctionRegistry::build(&context(Some(protector()), None, 0), mode, &disabled);
            assert!(!registry.contains("fromSecret"));
            assert!(!registry.contains("protect"));
            assert!(registry.contains("fromConfigMap"));
        }
    }

    #[test]
    fn test_string_arguments_are_strict() {
        let registry =
            FunctionRegistry::build(&context(None, None, 0), EncryptionMode::Disabled, &[]);
        let err = call(&registry, "base64enc", &[Value::Int(1)]).unwrap_err();
        assert!(err.to_string().contains("expected string; got int"));

        let err = call(&registry, "base64enc", &[]).unwrap_err();
        assert!(err.to_string().contains("wrong number of args"));
    }
}
