//! Typed plugin configuration
//!
//! Each plugin declares its own configuration struct as the default value of
//! its registration. Overrides from the startup configuration arrive as JSON
//! and are merged onto a copy of that default with [`merge_shallow`]:
//! top-level fields present in the override replace the default's, absent
//! fields keep the default, and unknown fields are rejected.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Configuration value owned by a registration
///
/// Implemented for every `Serialize + DeserializeOwned + Clone` type, so a
/// plugin only has to derive serde on its config struct.
pub trait PluginConfig: Any + Send + Sync + fmt::Debug {
    /// Merge an override onto this value in place
    fn merge_override(&mut self, overrides: &Value) -> Result<(), String>;

    /// Snapshot as JSON, for introspection
    fn to_value(&self) -> Result<Value, String>;

    fn clone_box(&self) -> Box<dyn PluginConfig>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> PluginConfig for T
where
    T: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn merge_override(&mut self, overrides: &Value) -> Result<(), String> {
        *self = merge_shallow(self, overrides)?;
        Ok(())
    }

    fn to_value(&self) -> Result<Value, String> {
        serde_json::to_value(self).map_err(|e| e.to_string())
    }

    fn clone_box(&self) -> Box<dyn PluginConfig> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn PluginConfig> {
    fn clone(&self) -> Self {
        self.as_ref().clone_box()
    }
}

/// Merge a JSON object override onto `default`, returning a new value
///
/// The override must be an object whose keys all name fields of the
/// default's serialized form. Field values are replaced whole; nested
/// objects are not merged recursively.
pub fn merge_shallow<T>(default: &T, overrides: &Value) -> Result<T, String>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(fields) = overrides else {
        return Err(format!("override must be an object, found {}", kind(overrides)));
    };

    let mut merged: Map<String, Value> = match serde_json::to_value(default) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(format!(
                "default configuration is {}, not an object",
                kind(&other)
            ))
        }
        Err(e) => return Err(format!("failed to serialize default configuration: {}", e)),
    };

    for (name, value) in fields {
        match merged.get_mut(name) {
            Some(slot) => *slot = value.clone(),
            None => return Err(format!("unknown field `{}`", name)),
        }
    }

    serde_json::from_value(Value::Object(merged)).map_err(|e| e.to_string())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PublicConfig {
        public: String,
        listing: bool,
    }

    fn default_config() -> PublicConfig {
        PublicConfig {
            public: "/var/www/default".to_string(),
            listing: false,
        }
    }

    #[test]
    fn test_override_replaces_matching_field() {
        let merged = merge_shallow(&default_config(), &json!({ "public": "/srv/www" })).unwrap();
        assert_eq!(
            merged,
            PublicConfig {
                public: "/srv/www".to_string(),
                listing: false,
            }
        );
    }

    #[test]
    fn test_empty_override_keeps_default() {
        let merged = merge_shallow(&default_config(), &json!({})).unwrap();
        assert_eq!(merged, default_config());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = merge_shallow(&default_config(), &json!({ "color": "blue" })).unwrap_err();
        assert_eq!(err, "unknown field `color`");
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        assert!(merge_shallow(&default_config(), &json!({ "listing": "yes" })).is_err());
    }

    #[test]
    fn test_non_object_override_is_rejected() {
        let err = merge_shallow(&default_config(), &json!("/srv/www")).unwrap_err();
        assert!(err.contains("a string"));
    }

    #[test]
    fn test_boxed_merge_does_not_touch_the_original() {
        let default: Box<dyn PluginConfig> = Box::new(default_config());
        let mut copy = default.clone();

        copy.merge_override(&json!({ "listing": true })).unwrap();

        let original = default.as_any().downcast_ref::<PublicConfig>().unwrap();
        let merged = copy.as_any().downcast_ref::<PublicConfig>().unwrap();
        assert!(!original.listing);
        assert!(merged.listing);
        assert_eq!(copy.to_value().unwrap()["listing"], json!(true));
    }
}
