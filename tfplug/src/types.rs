//! Core type system for tfplug
//!
//! This module provides the value model shared by configuration, plan and
//! state data, plus the diagnostic type every callback reports through.

use crate::error::{Result, TfplugError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dynamic represents Terraform values that can be of any type
/// This is the core type for all configuration and state data
/// Objects are ordered by attribute name so encodings are deterministic
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// Explicit null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Number value (all numbers are f64 to match Terraform)
    Number(f64),
    /// String value
    String(String),
    /// List or set of values
    List(Vec<Dynamic>),
    /// Objects and maps, keyed by attribute name
    Map(BTreeMap<String, Dynamic>),
    /// Value not yet known (during planning)
    Unknown,
}

const UNKNOWN_SENTINEL: &str = "__unknown__";

impl Dynamic {
    /// Empty object, the starting point for building state
    pub fn object() -> Self {
        Dynamic::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Dynamic::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dynamic::Unknown)
    }

    pub fn as_string(&self) -> Option<&String> {
        match self {
            Dynamic::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Dynamic::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dynamic::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Dynamic>> {
        match self {
            Dynamic::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Dynamic>> {
        match self {
            Dynamic::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Attribute lookup on an object; anything else has no attributes
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.as_map().and_then(|m| m.get(name))
    }

    /// Name of the value's kind, used in type mismatch messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::Number(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
            Dynamic::Unknown => "unknown",
        }
    }

    /// True when the value or any nested value is unknown
    pub fn contains_unknown(&self) -> bool {
        match self {
            Dynamic::Unknown => true,
            Dynamic::List(items) => items.iter().any(Dynamic::contains_unknown),
            Dynamic::Map(fields) => fields.values().any(Dynamic::contains_unknown),
            _ => false,
        }
    }

    /// Replace every unknown, at any depth, with null.
    /// Terraform rejects unknown values in applied or refreshed state.
    pub fn unknowns_to_null(self) -> Self {
        match self {
            Dynamic::Unknown => Dynamic::Null,
            Dynamic::List(items) => {
                Dynamic::List(items.into_iter().map(Dynamic::unknowns_to_null).collect())
            }
            Dynamic::Map(fields) => Dynamic::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.unknowns_to_null()))
                    .collect(),
            ),
            other => other,
        }
    }
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::String(value.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(value: String) -> Self {
        Dynamic::String(value)
    }
}

impl From<bool> for Dynamic {
    fn from(value: bool) -> Self {
        Dynamic::Bool(value)
    }
}

impl From<f64> for Dynamic {
    fn from(value: f64) -> Self {
        Dynamic::Number(value)
    }
}

impl From<i64> for Dynamic {
    fn from(value: i64) -> Self {
        Dynamic::Number(value as f64)
    }
}

impl Serialize for Dynamic {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Dynamic::Null => serializer.serialize_unit(),
            Dynamic::Bool(b) => serializer.serialize_bool(*b),
            Dynamic::Number(n) => serializer.serialize_f64(*n),
            Dynamic::String(s) => serializer.serialize_str(s),
            Dynamic::List(l) => l.serialize(serializer),
            Dynamic::Map(m) => m.serialize(serializer),
            Dynamic::Unknown => serializer.serialize_str(UNKNOWN_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        use std::fmt;

        struct DynamicVisitor;

        impl<'de> Visitor<'de> for DynamicVisitor {
            type Value = Dynamic;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a terraform value")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Null)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Null)
            }

            fn visit_some<D2>(self, deserializer: D2) -> std::result::Result<Dynamic, D2::Error>
            where
                D2: serde::Deserializer<'de>,
            {
                Dynamic::deserialize(deserializer)
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Bool(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Dynamic, E> {
                if value == UNKNOWN_SENTINEL {
                    Ok(Dynamic::Unknown)
                } else {
                    Ok(Dynamic::String(value.to_string()))
                }
            }

            fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Dynamic, E> {
                if value == UNKNOWN_SENTINEL {
                    Ok(Dynamic::Unknown)
                } else {
                    Ok(Dynamic::String(value))
                }
            }

            fn visit_seq<V>(self, mut seq: V) -> std::result::Result<Dynamic, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(elem) = seq.next_element()? {
                    items.push(elem);
                }
                Ok(Dynamic::List(items))
            }

            fn visit_map<V>(self, mut map: V) -> std::result::Result<Dynamic, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut fields = BTreeMap::new();
                while let Some((key, value)) = map.next_entry()? {
                    fields.insert(key, value);
                }
                Ok(Dynamic::Map(fields))
            }
        }

        deserializer.deserialize_any(DynamicVisitor)
    }
}

/// DynamicValue wraps Dynamic and provides encoding/decoding capabilities
/// This is what gets passed between Terraform and the provider
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicValue {
    pub value: Dynamic,
}

impl DynamicValue {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn null() -> Self {
        Self {
            value: Dynamic::Null,
        }
    }

    pub fn object() -> Self {
        Self {
            value: Dynamic::object(),
        }
    }

    /// Terraform exchanges state as msgpack; an empty payload is null
    pub fn encode_msgpack(&self) -> Result<Vec<u8>> {
        if self.value.is_null() {
            return Ok(vec![]);
        }
        rmp_serde::encode::to_vec(&self.value)
            .map_err(|e| TfplugError::EncodingError(format!("msgpack encoding failed: {}", e)))
    }

    pub fn decode_msgpack(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::null());
        }
        let value = rmp_serde::decode::from_slice::<Dynamic>(data)
            .map_err(|e| TfplugError::DecodingError(format!("msgpack decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    pub fn encode_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.value)
            .map_err(|e| TfplugError::EncodingError(format!("json encoding failed: {}", e)))
    }

    pub fn decode_json(data: &[u8]) -> Result<Self> {
        let value = serde_json::from_slice(data)
            .map_err(|e| TfplugError::DecodingError(format!("json decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    /// Type-safe accessors - use these instead of pattern matching
    pub fn get_string(&self, path: &AttributePath) -> Result<String> {
        match self.navigate_path(path)? {
            Dynamic::String(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }

    pub fn get_number(&self, path: &AttributePath) -> Result<f64> {
        match self.navigate_path(path)? {
            Dynamic::Number(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        }
    }

    pub fn get_bool(&self, path: &AttributePath) -> Result<bool> {
        match self.navigate_path(path)? {
            Dynamic::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn get_list(&self, path: &AttributePath) -> Result<Vec<Dynamic>> {
        match self.navigate_path(path)? {
            Dynamic::List(l) => Ok(l.clone()),
            other => Err(mismatch("list", other)),
        }
    }

    /// Raw value at a path; missing attributes read as null
    pub fn get(&self, path: &AttributePath) -> Dynamic {
        self.navigate_path(path).cloned().unwrap_or(Dynamic::Null)
    }

    pub fn set_string(&mut self, path: &AttributePath, value: String) -> Result<()> {
        self.set_value(path, Dynamic::String(value))
    }

    pub fn set_number(&mut self, path: &AttributePath, value: f64) -> Result<()> {
        self.set_value(path, Dynamic::Number(value))
    }

    pub fn set_bool(&mut self, path: &AttributePath, value: bool) -> Result<()> {
        self.set_value(path, Dynamic::Bool(value))
    }

    pub fn set_list(&mut self, path: &AttributePath, value: Vec<Dynamic>) -> Result<()> {
        self.set_value(path, Dynamic::List(value))
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn is_unknown(&self) -> bool {
        self.value.is_unknown()
    }

    /// Mark computed values as unknown during planning
    pub fn mark_unknown(&mut self, path: &AttributePath) -> Result<()> {
        self.set_value(path, Dynamic::Unknown)
    }

    fn navigate_path<'a>(&'a self, path: &AttributePath) -> Result<&'a Dynamic> {
        let mut current = &self.value;

        for step in &path.steps {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .get(name)
                    .ok_or_else(|| TfplugError::AttributeNotFound(name.clone()))?,
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => {
                    l.get(*idx as usize).ok_or_else(|| {
                        TfplugError::InvalidPath(format!("list index {} out of bounds", idx))
                    })?
                }
                (value, step) => {
                    return Err(TfplugError::InvalidPath(format!(
                        "cannot apply {:?} to {}",
                        step,
                        value.kind_name()
                    )))
                }
            };
        }

        Ok(current)
    }

    pub fn set_value(&mut self, path: &AttributePath, new_value: Dynamic) -> Result<()> {
        let Some((last, parents)) = path.steps.split_last() else {
            self.value = new_value;
            return Ok(());
        };

        if !matches!(self.value, Dynamic::Map(_)) {
            self.value = Dynamic::object();
        }

        let mut current = &mut self.value;
        for (idx, step) in parents.iter().enumerate() {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                    let next = &path.steps[idx + 1];
                    let slot = m.entry(name.clone()).or_insert(Dynamic::Null);
                    if slot.is_null() {
                        *slot = match next {
                            AttributePathStep::ElementKeyInt(_) => Dynamic::List(Vec::new()),
                            _ => Dynamic::object(),
                        };
                    }
                    slot
                }
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(i)) => {
                    let len = l.len();
                    l.get_mut(*i as usize).ok_or_else(|| {
                        TfplugError::InvalidPath(format!(
                            "list index {} out of bounds (len {})",
                            i, len
                        ))
                    })?
                }
                (value, step) => {
                    return Err(TfplugError::InvalidPath(format!(
                        "cannot apply {:?} to {}",
                        step,
                        value.kind_name()
                    )))
                }
            };
        }

        match (current, last) {
            (Dynamic::Map(m), AttributePathStep::AttributeName(name))
            | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                m.insert(name.clone(), new_value);
                Ok(())
            }
            (Dynamic::List(l), AttributePathStep::ElementKeyInt(i)) => {
                let len = l.len();
                let slot = l.get_mut(*i as usize).ok_or_else(|| {
                    TfplugError::InvalidPath(format!("list index {} out of bounds (len {})", i, len))
                })?;
                *slot = new_value;
                Ok(())
            }
            (value, step) => Err(TfplugError::InvalidPath(format!(
                "cannot apply {:?} to {}",
                step,
                value.kind_name()
            ))),
        }
    }
}

fn mismatch(expected: &str, actual: &Dynamic) -> TfplugError {
    TfplugError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.kind_name().to_string(),
    }
}

impl From<Dynamic> for DynamicValue {
    fn from(value: Dynamic) -> Self {
        Self::new(value)
    }
}

/// AttributePath represents a path to an attribute within a DynamicValue
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub steps: Vec<AttributePathStep>,
}

impl AttributePath {
    pub fn new(name: &str) -> Self {
        Self {
            steps: vec![AttributePathStep::AttributeName(name.to_string())],
        }
    }

    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.steps
            .push(AttributePathStep::AttributeName(name.to_string()));
        self
    }

    pub fn index(mut self, idx: i64) -> Self {
        self.steps.push(AttributePathStep::ElementKeyInt(idx));
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.steps
            .push(AttributePathStep::ElementKeyString(key.to_string()));
        self
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                AttributePathStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                AttributePathStep::AttributeName(name) => write!(f, ".{}", name)?,
                AttributePathStep::ElementKeyString(key) => write!(f, "[{:?}]", key)?,
                AttributePathStep::ElementKeyInt(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// Individual step in an AttributePath
#[derive(Debug, Clone, PartialEq)]
pub enum AttributePathStep {
    /// Access attribute by name in object/map
    AttributeName(String),
    /// Access element by string key (for maps)
    ElementKeyString(String),
    /// Access element by integer index (for lists)
    ElementKeyInt(i64),
}

/// Diagnostic represents a warning or error from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = Some(path);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// True when any diagnostic in the slice is an error
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Config represents configuration values
pub type Config = DynamicValue;

/// State represents resource state values
pub type State = DynamicValue;
