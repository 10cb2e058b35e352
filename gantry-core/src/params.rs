// Parameter bindings and request-time argument resolution

use crate::adapter::HttpAdapter;
use crate::http::RequestContext;
use crate::Error;
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::warn;

/// Where a handler argument is extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Query,
    Param,
    Body,
}

/// Which part of the source feeds the argument: a single named field, or
/// the entire source object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKey {
    Full,
    Named(String),
}

/// Declared argument type, driving coercion of textual transport values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclaredType {
    /// Pass the extracted value through untouched
    #[default]
    Raw,
    /// Textual argument, no coercion applied
    Text,
    /// Numeric argument; textual values are parsed
    Number,
}

/// What a failed numeric coercion produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercionPolicy {
    /// Substitute the null sentinel and continue; the handler decides
    #[default]
    Lenient,
    /// Fail the request with a 400-mapped error
    Strict,
}

/// One handler-argument binding: source, key, declared type and position
#[derive(Debug, Clone)]
pub struct ParamBinding {
    pub source: ParamSource,
    pub key: ParamKey,
    pub declared: DeclaredType,
    pub index: usize,
    pub default: Option<Value>,
}

impl ParamBinding {
    pub fn new(source: ParamSource, key: ParamKey, declared: DeclaredType, index: usize) -> Self {
        Self {
            source,
            key,
            declared,
            index,
            default: None,
        }
    }

    pub fn or_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Builds the positional argument vector for a matched route from the live
/// request context, using the transport adapter's accessors.
#[derive(Debug, Clone, Default)]
pub struct ParamResolver {
    policy: CoercionPolicy,
}

impl ParamResolver {
    pub fn new(policy: CoercionPolicy) -> Self {
        Self { policy }
    }

    pub fn resolve(
        &self,
        bindings: &[ParamBinding],
        ctx: &RequestContext,
        adapter: &dyn HttpAdapter,
    ) -> Result<Vec<Value>, Error> {
        bindings
            .iter()
            .map(|binding| self.resolve_one(binding, ctx, adapter))
            .collect()
    }

    fn resolve_one(
        &self,
        binding: &ParamBinding,
        ctx: &RequestContext,
        adapter: &dyn HttpAdapter,
    ) -> Result<Value, Error> {
        let raw = match (&binding.source, &binding.key) {
            (ParamSource::Query, ParamKey::Full) => {
                Some(map_to_value(adapter.get_request_query(ctx)))
            }
            (ParamSource::Param, ParamKey::Full) => {
                Some(map_to_value(adapter.get_request_params(ctx)))
            }
            (ParamSource::Body, ParamKey::Full) => Some(adapter.get_request_body(ctx)),
            (ParamSource::Query, ParamKey::Named(key)) => adapter
                .get_request_query(ctx)
                .remove(key)
                .map(Value::String),
            (ParamSource::Param, ParamKey::Named(key)) => adapter
                .get_request_params(ctx)
                .remove(key)
                .map(Value::String),
            (ParamSource::Body, ParamKey::Named(key)) => {
                adapter.get_request_body(ctx).get(key).cloned()
            }
        };

        let value = match raw {
            Some(value) => self.coerce(binding, value)?,
            None => match &binding.default {
                Some(default) => default.clone(),
                None => Value::Null,
            },
        };
        Ok(value)
    }

    fn coerce(&self, binding: &ParamBinding, value: Value) -> Result<Value, Error> {
        if binding.declared != DeclaredType::Number {
            return Ok(value);
        }
        match value {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(parsed) => Ok(number_value(parsed)),
                Err(_) => self.coercion_failure(binding, &s),
            },
            other => {
                let rendered = other.to_string();
                self.coercion_failure(binding, &rendered)
            }
        }
    }

    fn coercion_failure(&self, binding: &ParamBinding, raw: &str) -> Result<Value, Error> {
        match self.policy {
            CoercionPolicy::Lenient => {
                warn!(
                    index = binding.index,
                    raw, "numeric coercion failed, substituting null"
                );
                Ok(Value::Null)
            }
            CoercionPolicy::Strict => Err(Error::InvalidArgument(format!(
                "expected a numeric value at parameter {}, got {:?}",
                binding.index, raw
            ))),
        }
    }
}

fn map_to_value(map: HashMap<String, String>) -> Value {
    Value::Object(
        map.into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

fn number_value(parsed: f64) -> Value {
    if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() <= i64::MAX as f64 {
        Value::Number(Number::from(parsed as i64))
    } else {
        Number::from_f64(parsed)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
