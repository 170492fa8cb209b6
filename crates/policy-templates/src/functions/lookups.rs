//! Cluster lookup functions
//!
//! `fromSecret`, `fromConfigMap`, `fromClusterClaim` and `lookup` delegate to
//! the caller's [`ClusterLookup`](crate::lookup::ClusterLookup) through the
//! namespace restriction. In the encrypting mode `fromSecret` returns the
//! protected form of the value and `protect` becomes available.

use super::{FunctionRegistry, RegistryContext, expect_args, string_arg};
use crate::crypto::Protector;
use crate::engine::Value;
use crate::error::{TemplateError, TemplateResult};
use crate::lookup::{LookupError, NamespacedLookup};

pub(super) fn register(registry: &mut FunctionRegistry, ctx: &RegistryContext) {
    let lookup = ctx.lookup.clone();
    registry.register(
        "fromSecret",
        move |args: &[Value]| from_secret(&lookup, args).map(Value::String),
    );

    let lookup = ctx.lookup.clone();
    registry.register("fromConfigMap", move |args: &[Value]| {
        let args = expect_args("fromConfigMap", args, 3)?;
        let namespace = string_arg("fromConfigMap", args, 0)?;
        let name = string_arg("fromConfigMap", args, 1)?;
        let key = string_arg("fromConfigMap", args, 2)?;
        lookup
            .config_map(namespace, name, key)
            .map(Value::String)
            .map_err(|e| lookup_error("fromConfigMap", e))
    });

    let lookup = ctx.lookup.clone();
    registry.register("fromClusterClaim", move |args: &[Value]| {
        let args = expect_args("fromClusterClaim", args, 1)?;
        let name = string_arg("fromClusterClaim", args, 0)?;
        lookup
            .cluster_claim(name)
            .map(Value::String)
            .map_err(|e| lookup_error("fromClusterClaim", e))
    });

    let lookup = ctx.lookup.clone();
    registry.register("lookup", move |args: &[Value]| {
        let args = expect_args("lookup", args, 4)?;
        let api_version = string_arg("lookup", args, 0)?;
        let kind = string_arg("lookup", args, 1)?;
        let namespace = string_arg("lookup", args, 2)?;
        let name = string_arg("lookup", args, 3)?;
        match lookup.resource(api_version, kind, namespace, name) {
            Ok(resource) => Ok(Value::from(resource)),
            // A missing resource is an empty map so templates can test for it
            Err(LookupError::NotFound { .. }) => Ok(Value::Map(Default::default())),
            Err(e) => Err(lookup_error("lookup", e)),
        }
    });
}

/// Encrypting-mode overrides
pub(super) fn register_protected(
    registry: &mut FunctionRegistry,
    ctx: &RegistryContext,
    protector: &Protector,
) {
    let lookup = ctx.lookup.clone();
    let secret_protector = protector.clone();
    registry.register("fromSecret", move |args: &[Value]| {
        let value = from_secret(&lookup, args)?;
        protect(&secret_protector, "fromSecret", &value)
    });

    let protector = protector.clone();
    registry.register("protect", move |args: &[Value]| {
        let args = expect_args("protect", args, 1)?;
        let value = string_arg("protect", args, 0)?;
        protect(&protector, "protect", value)
    });
}

fn from_secret(lookup: &NamespacedLookup, args: &[Value]) -> TemplateResult<String> {
    let args = expect_args("fromSecret", args, 3)?;
    let namespace = string_arg("fromSecret", args, 0)?;
    let name = string_arg("fromSecret", args, 1)?;
    let key = string_arg("fromSecret", args, 2)?;
    lookup
        .secret(namespace, name, key)
        .map_err(|e| lookup_error("fromSecret", e))
}

fn protect(protector: &Protector, function: &str, value: &str) -> TemplateResult<Value> {
    protector
        .protect(value)
        .map(Value::String)
        .map_err(|e| TemplateError::function(function, e.to_string()))
}

fn lookup_error(function: &str, source: LookupError) -> TemplateError {
    TemplateError::Lookup {
        function: function.to_string(),
        source,
    }
}
