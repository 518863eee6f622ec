//! Typed accessors over free-form configuration maps.
//!
//! Components receive an opaque `ConfigMap` at creation time and validate
//! the keys they recognize eagerly, failing with
//! `StageError::InvalidConfiguration`. Unknown keys are ignored.

use crate::error::StageError;
use crate::value::Value;
use std::collections::HashMap;

/// Free-form key→value configuration, interpreted per component.
pub type ConfigMap = HashMap<String, Value>;

/// Get a required string key or fail.
pub fn require_str<'a>(config: &'a ConfigMap, key: &str) -> Result<&'a str, StageError> {
    match config.get(key) {
        Some(value) => value.as_str().ok_or_else(|| {
            StageError::InvalidConfiguration(format!("'{}' must be a string", key))
        }),
        None => Err(StageError::InvalidConfiguration(format!(
            "missing required key '{}'",
            key
        ))),
    }
}

/// Get an optional string key, failing only on a wrong type.
pub fn optional_str<'a>(config: &'a ConfigMap, key: &str) -> Result<Option<&'a str>, StageError> {
    match config.get(key) {
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| StageError::InvalidConfiguration(format!("'{}' must be a string", key))),
        None => Ok(None),
    }
}

/// Get an integer key with a default, failing on a wrong type.
pub fn u64_or(config: &ConfigMap, key: &str, default: u64) -> Result<u64, StageError> {
    match config.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            StageError::InvalidConfiguration(format!("'{}' must be a non-negative integer", key))
        }),
        None => Ok(default),
    }
}

/// Get a boolean key with a default, failing on a wrong type.
pub fn bool_or(config: &ConfigMap, key: &str, default: bool) -> Result<bool, StageError> {
    match config.get(key) {
        Some(value) => value
            .as_bool()
            .ok_or_else(|| StageError::InvalidConfiguration(format!("'{}' must be a boolean", key))),
        None => Ok(default),
    }
}

/// Get an optional nested object key.
pub fn optional_object<'a>(
    config: &'a ConfigMap,
    key: &str,
) -> Result<Option<&'a HashMap<String, Value>>, StageError> {
    match config.get(key) {
        Some(value) => value
            .as_object()
            .map(Some)
            .ok_or_else(|| StageError::InvalidConfiguration(format!("'{}' must be an object", key))),
        None => Ok(None),
    }
}
