pub mod invalid_descriptor_error;
pub mod method;

use crate::key::canonical_json;
use getset::{CopyGetters, Getters};
use invalid_descriptor_error::InvalidDescriptorError;
use method::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use url::form_urlencoded;

/// Everything that identifies a request: method, endpoint path and optional body.
///
/// Descriptors are cheap to build and are only checked when they reach the cache,
/// see [`RequestDescriptor::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct RequestDescriptor {
    #[getset(get_copy = "pub")]
    method: Method,
    #[getset(get = "pub")]
    path: String,
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Attach a body. `null` clears it.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = match body {
            Value::Null => None,
            body => Some(body),
        };
        self
    }

    /// Build a validated descriptor from loosely typed parts.
    pub fn parse(method: &str, path: &str, body: Value) -> Result<Self, InvalidDescriptorError> {
        let method = Method::from_str(method)
            .map_err(|_| InvalidDescriptorError::UnsupportedMethod(method.to_string()))?;
        let descriptor = Self::new(method, path).with_body(body);
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), InvalidDescriptorError> {
        if self.path.is_empty() {
            return Err(InvalidDescriptorError::EmptyPath);
        }
        if self.path.chars().any(char::is_whitespace) {
            return Err(InvalidDescriptorError::InvalidPath(self.path.clone()));
        }
        match &self.body {
            None | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(InvalidDescriptorError::BodyNotAnObject(json_type(other))),
        }
    }

    /// Query parameters derived from the body for methods that carry no payload.
    ///
    /// Nulls are skipped, arrays repeat their key and nested objects are sent as
    /// canonical JSON.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(Value::Object(body)) = &self.body else {
            return vec![];
        };
        if self.method.carries_body() {
            return vec![];
        }

        let mut fields: Vec<_> = body.iter().collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut pairs = vec![];
        for (name, value) in fields {
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Some(item) = query_value(item) {
                            pairs.push((name.clone(), item));
                        }
                    }
                }
                value => {
                    if let Some(value) = query_value(value) {
                        pairs.push((name.clone(), value));
                    }
                }
            }
        }
        pairs
    }

    /// `?a=1&b=2`, or an empty string when there is nothing to encode.
    pub fn query_string(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("?{}", encoded)
    }

    /// The effective request target: path plus query string.
    pub fn target(&self) -> String {
        format!("{}{}", self.path, self.query_string())
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(canonical_json(value)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
