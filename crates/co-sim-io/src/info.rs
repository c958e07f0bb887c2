//! Typed key/value bag used as settings input and status output of every operation

use crate::error::CoSimError;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A single value stored in an [`Info`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl InfoValue {
    /// Name of the stored type, as used in error messages and `Display`
    pub fn type_name(&self) -> &'static str {
        match self {
            InfoValue::String(_) => "string",
            InfoValue::Int(_) => "int",
            InfoValue::Double(_) => "double",
            InfoValue::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::String(v) => write!(f, "{v}"),
            InfoValue::Int(v) => write!(f, "{v}"),
            InfoValue::Double(v) => write!(f, "{v}"),
            InfoValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for InfoValue {
    fn from(value: String) -> Self {
        InfoValue::String(value)
    }
}

impl From<&str> for InfoValue {
    fn from(value: &str) -> Self {
        InfoValue::String(value.to_string())
    }
}

impl From<i64> for InfoValue {
    fn from(value: i64) -> Self {
        InfoValue::Int(value)
    }
}

impl From<i32> for InfoValue {
    fn from(value: i32) -> Self {
        InfoValue::Int(i64::from(value))
    }
}

impl From<f64> for InfoValue {
    fn from(value: f64) -> Self {
        InfoValue::Double(value)
    }
}

impl From<bool> for InfoValue {
    fn from(value: bool) -> Self {
        InfoValue::Bool(value)
    }
}

/// Heterogeneous settings/result bag
///
/// Reading a missing key is an error, as is reading a key with the wrong
/// type. `Info` is a plain value: cloning produces an independent bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    entries: BTreeMap<String, InfoValue>,
}

impl Info {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value of any supported type
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, InfoValue::String(value.into()))
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.set(key, InfoValue::Int(value))
    }

    pub fn set_double(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.set(key, InfoValue::Double(value))
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.set(key, InfoValue::Bool(value))
    }

    /// Builder-style variant of [`Info::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw access to the stored value
    pub fn get(&self, key: &str) -> Result<&InfoValue> {
        self.entries
            .get(key)
            .ok_or_else(|| CoSimError::KeyNotFound(key.to_string()))
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            InfoValue::String(v) => Ok(v.clone()),
            other => Err(mismatch(key, "string", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            InfoValue::Int(v) => Ok(*v),
            other => Err(mismatch(key, "int", other)),
        }
    }

    pub fn get_double(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            InfoValue::Double(v) => Ok(*v),
            other => Err(mismatch(key, "double", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            InfoValue::Bool(v) => Ok(*v),
            other => Err(mismatch(key, "bool", other)),
        }
    }

    /// Like [`Info::get_string`] but falls back to `default` when the key is absent.
    /// A present key of the wrong type is still an error.
    pub fn get_string_or(&self, key: &str, default: &str) -> Result<String> {
        if self.has(key) {
            self.get_string(key)
        } else {
            Ok(default.to_string())
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64> {
        if self.has(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_double_or(&self, key: &str, default: f64) -> Result<f64> {
        if self.has(key) {
            self.get_double(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        if self.has(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }

    /// Remove a key; removing an absent key is not an error
    pub fn erase(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Info {
    /// Parse a flat JSON object of strings, integers, doubles and booleans
    ///
    /// Integral numbers become `int`, all other numbers `double`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| CoSimError::InvalidArgument(format!("Invalid settings: {e}")))?;

        let mut info = Info::new();
        for (key, value) in object {
            let value = match value {
                Value::String(v) => InfoValue::String(v),
                Value::Bool(v) => InfoValue::Bool(v),
                Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(v), _) => InfoValue::Int(v),
                    (None, Some(v)) => InfoValue::Double(v),
                    (None, None) => {
                        return Err(CoSimError::InvalidArgument(format!(
                            "Setting \"{key}\" is not a representable number"
                        )))
                    }
                },
                other => {
                    return Err(CoSimError::InvalidArgument(format!(
                        "Setting \"{key}\" must be a string, number or bool, got {other}"
                    )))
                }
            };
            info.entries.insert(key, value);
        }
        Ok(info)
    }

    /// Read a settings file in the format of [`Info::from_json_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| match e {
            CoSimError::InvalidArgument(reason) => {
                CoSimError::InvalidArgument(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }
}

fn mismatch(key: &str, expected: &'static str, actual: &InfoValue) -> CoSimError {
    CoSimError::TypeMismatch {
        key: key.to_string(),
        expected,
        actual: actual.type_name(),
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Info; containing {} entries", self.len())?;
        for (key, value) in self.iter() {
            writeln!(
                f,
                "  name: {} | value: {} | type: {}",
                key,
                value,
                value.type_name()
            )?;
        }
        Ok(())
    }
}
