//! Operation configuration and outcome model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EntityKey;

/// Immutable configuration of one requested operation.
///
/// Two configs describe the same logical operation when they compare equal;
/// the derived equality is structural over every field, with `keys` compared
/// in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Apply the operation to the view before it is confirmed.
    pub optimistic: bool,
    /// Launch even if an equal request is active or cached.
    pub force: bool,
    /// Entity payload, a single entity or a list of them.
    pub data: Value,
    /// Opaque executor parameters.
    pub params: Value,
    /// Target keys for update and delete operations.
    pub keys: Vec<EntityKey>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            optimistic: false,
            force: false,
            data: Value::Object(Default::default()),
            params: Value::Object(Default::default()),
            keys: Vec::new(),
        }
    }
}

impl OperationConfig {
    /// Overlays `input` on top of `self`, field by field.
    pub fn merged(&self, input: OperationInput) -> Self {
        Self {
            optimistic: input.optimistic.unwrap_or(self.optimistic),
            force: input.force.unwrap_or(self.force),
            data: input.data.unwrap_or_else(|| self.data.clone()),
            params: input.params.unwrap_or_else(|| self.params.clone()),
            keys: input.keys.unwrap_or_else(|| self.keys.clone()),
        }
    }
}

/// Partial configuration supplied by a caller; unset fields fall back to the
/// collection's action defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationInput {
    /// Overrides [`OperationConfig::optimistic`].
    pub optimistic: Option<bool>,
    /// Overrides [`OperationConfig::force`].
    pub force: Option<bool>,
    /// Overrides [`OperationConfig::data`].
    pub data: Option<Value>,
    /// Overrides [`OperationConfig::params`].
    pub params: Option<Value>,
    /// Overrides [`OperationConfig::keys`].
    pub keys: Option<Vec<EntityKey>>,
}

impl OperationInput {
    /// Input that overrides nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides `optimistic`.
    pub fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = Some(optimistic);
        self
    }

    /// Overrides `force`.
    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    /// Overrides `data`.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Overrides `params`.
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Keys of the entities an update or delete targets.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKey>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// The executor resolved with a payload (`null` when there was nothing to do).
    Success(Value),
    /// The executor rejected with an error value.
    Failure(Value),
}

impl Outcome {
    /// True for [`Outcome::Failure`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Error of a failure.
    pub fn error(&self) -> Option<&Value> {
        match self {
            Self::Failure(err) => Some(err),
            Self::Success(_) => None,
        }
    }

    /// Payload of a success.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(res) => Some(res),
            Self::Failure(_) => None,
        }
    }
}

impl From<Result<Value, Value>> for Outcome {
    fn from(value: Result<Value, Value>) -> Self {
        match value {
            Ok(res) => Self::Success(res),
            Err(err) => Self::Failure(err),
        }
    }
}

/// Views a payload as a list of items: `-one` payloads become a one-element
/// list, arrays are used as-is, and `null` yields nothing.
pub(crate) fn normalize(payload: &Value, single: bool) -> &[Value] {
    match payload {
        Value::Null => &[],
        Value::Array(items) if !single => items.as_slice(),
        _ if single => std::slice::from_ref(payload),
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn input_overrides_only_set_fields() {
        let defaults = OperationConfig {
            optimistic: true,
            params: json!({"page": 1}),
            ..OperationConfig::default()
        };
        let cfg = defaults.merged(OperationInput::new().force(true).keys(["7"]));
        assert!(cfg.optimistic);
        assert!(cfg.force);
        assert_eq!(cfg.params, json!({"page": 1}));
        assert_eq!(cfg.keys, vec!["7".to_string()]);
    }

    #[test]
    fn equality_is_structural_and_key_order_sensitive() {
        let a = OperationConfig::default().merged(
            OperationInput::new()
                .data(json!({"a": 1, "b": [1, 2]}))
                .keys(["1", "2"]),
        );
        let b = OperationConfig::default().merged(
            OperationInput::new()
                .data(json!({"b": [1, 2], "a": 1}))
                .keys(["1", "2"]),
        );
        let c = OperationConfig::default().merged(
            OperationInput::new()
                .data(json!({"a": 1, "b": [1, 2]}))
                .keys(["2", "1"]),
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn normalize_wraps_single_payloads() {
        let one = json!({"id": 1});
        assert_eq!(normalize(&one, true), &[json!({"id": 1})]);
        let many = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(normalize(&many, false).len(), 2);
        assert!(normalize(&Value::Null, true).is_empty());
        assert!(normalize(&one, false).is_empty());
    }
}
