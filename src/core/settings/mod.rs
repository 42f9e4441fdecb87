//! Typed, namespaced, access-controlled settings registry.
//!
//! Every subsystem registers its settings at startup under a namespace;
//! afterwards all reads and writes go through [`SettingsRegistry`]'s
//! accessor API. A mutation carries a requester [`AccessLevel`] that is
//! checked before the candidate value is validated, so a denial never
//! leaks whether the value would have been accepted.

pub mod builtin;
pub mod error;

pub use error::SettingsError;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Shared handle used across the session. Writes are serialized behind the
/// lock; completion queries only ever take the read side.
pub type SharedSettings = Arc<RwLock<SettingsRegistry>>;

pub fn shared(registry: SettingsRegistry) -> SharedSettings {
    Arc::new(RwLock::new(registry))
}

/// Ordered permission scale. A mutation succeeds only when the requester's
/// level is at or above the setting's required level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    ReadOnly,
    User,
    Advanced,
    System,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::ReadOnly => "read-only",
            AccessLevel::User => "user",
            AccessLevel::Advanced => "advanced",
            AccessLevel::System => "system",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value shapes a setting can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    /// One of the legal values declared on the setting descriptor.
    Enum(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Str,
    Int,
    Float,
    Bool,
    Path,
    Enum,
    List,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::Str => "string",
            SettingKind::Int => "integer",
            SettingKind::Float => "float",
            SettingKind::Bool => "boolean",
            SettingKind::Path => "path",
            SettingKind::Enum => "enum",
            SettingKind::List => "list",
        }
    }
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Str(_) => SettingKind::Str,
            SettingValue::Int(_) => SettingKind::Int,
            SettingValue::Float(_) => SettingKind::Float,
            SettingValue::Bool(_) => SettingKind::Bool,
            SettingValue::Path(_) => SettingKind::Path,
            SettingValue::Enum(_) => SettingKind::Enum,
            SettingValue::List(_) => SettingKind::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) | SettingValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            SettingValue::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Parse raw operator text into a value of the given kind.
    pub fn parse(kind: SettingKind, raw: &str) -> Result<SettingValue, String> {
        match kind {
            SettingKind::Str => Ok(SettingValue::Str(raw.to_string())),
            SettingKind::Enum => Ok(SettingValue::Enum(raw.to_string())),
            SettingKind::Path => Ok(SettingValue::Path(PathBuf::from(raw))),
            SettingKind::Int => raw
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|_| format!("'{raw}' is not an integer")),
            SettingKind::Float => raw
                .parse::<f64>()
                .map(SettingValue::Float)
                .map_err(|_| format!("'{raw}' is not a number")),
            SettingKind::Bool => parse_bool(raw)
                .map(SettingValue::Bool)
                .ok_or_else(|| format!("'{raw}' is not a boolean (use on/off, true/false, yes/no)")),
            SettingKind::List => Ok(SettingValue::List(
                raw.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            )),
        }
    }

    /// Convert to the representation stored in the persisted document.
    pub fn to_toml(&self) -> toml::Value {
        match self {
            SettingValue::Str(s) | SettingValue::Enum(s) => toml::Value::String(s.clone()),
            SettingValue::Int(v) => toml::Value::Integer(*v),
            SettingValue::Float(v) => toml::Value::Float(*v),
            SettingValue::Bool(v) => toml::Value::Boolean(*v),
            SettingValue::Path(p) => toml::Value::String(p.to_string_lossy().into_owned()),
            SettingValue::List(items) => toml::Value::Array(
                items
                    .iter()
                    .map(|item| toml::Value::String(item.clone()))
                    .collect(),
            ),
        }
    }

    /// Read back a persisted value, shaped by the descriptor's kind.
    pub fn from_toml(kind: SettingKind, value: &toml::Value) -> Option<SettingValue> {
        match (kind, value) {
            (SettingKind::Str, toml::Value::String(s)) => Some(SettingValue::Str(s.clone())),
            (SettingKind::Enum, toml::Value::String(s)) => Some(SettingValue::Enum(s.clone())),
            (SettingKind::Path, toml::Value::String(s)) => {
                Some(SettingValue::Path(PathBuf::from(s)))
            }
            (SettingKind::Int, toml::Value::Integer(v)) => Some(SettingValue::Int(*v)),
            (SettingKind::Float, toml::Value::Float(v)) => Some(SettingValue::Float(*v)),
            (SettingKind::Float, toml::Value::Integer(v)) => Some(SettingValue::Float(*v as f64)),
            (SettingKind::Bool, toml::Value::Boolean(v)) => Some(SettingValue::Bool(*v)),
            (SettingKind::List, toml::Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => out.push(s.clone()),
                        _ => return None,
                    }
                }
                Some(SettingValue::List(out))
            }
            _ => None,
        }
    }
}

// Display is used for status messages and `/settings` output.
impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Str(s) | SettingValue::Enum(s) => f.write_str(s),
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Bool(v) => f.write_str(if *v { "on" } else { "off" }),
            SettingValue::Path(p) => f.write_str(&p.to_string_lossy()),
            SettingValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Pure predicate over a candidate value.
pub type Validator = Arc<dyn Fn(&SettingValue) -> Result<(), String> + Send + Sync>;

/// A single named, typed configuration value with default, validator, and
/// required access level. The stored value always satisfies the validator.
#[derive(Clone)]
pub struct Setting {
    key: String,
    kind: SettingKind,
    value: SettingValue,
    default: SettingValue,
    access_level: AccessLevel,
    choices: Vec<String>,
    validator: Option<Validator>,
    description: String,
}

impl Setting {
    pub fn new(
        key: &str,
        default: SettingValue,
        access_level: AccessLevel,
        description: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            kind: default.kind(),
            value: default.clone(),
            default,
            access_level,
            choices: Vec::new(),
            validator: None,
            description: description.to_string(),
        }
    }

    /// Declare the legal values for an enum setting.
    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&SettingValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    pub fn value(&self) -> &SettingValue {
        &self.value
    }

    pub fn default_value(&self) -> &SettingValue {
        &self.default
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn check(&self, candidate: &SettingValue) -> Result<(), String> {
        if candidate.kind() != self.kind {
            return Err(format!(
                "expected a {} value, got {}",
                self.kind.as_str(),
                candidate.kind().as_str()
            ));
        }
        if self.kind == SettingKind::Enum {
            let raw = candidate.as_str().unwrap_or_default();
            if !self.choices.iter().any(|c| c == raw) {
                return Err(format!(
                    "'{}' is not one of: {}",
                    raw,
                    self.choices.join(", ")
                ));
            }
        }
        if let Some(validator) = &self.validator {
            validator(candidate)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("default", &self.default)
            .field("access_level", &self.access_level)
            .finish_non_exhaustive()
    }
}

/// Emitted to subscribers after a value is committed.
#[derive(Debug, Clone)]
pub struct SettingChange {
    pub namespace: String,
    pub key: String,
    pub previous: SettingValue,
    pub current: SettingValue,
}

pub type ChangeListener = Box<dyn Fn(&SettingChange) + Send + Sync>;

/// Central registry owning all namespaces and settings. External code only
/// reads and writes through this API; no direct mutable references escape.
#[derive(Default)]
pub struct SettingsRegistry {
    namespaces: BTreeMap<String, BTreeMap<String, Setting>>,
    listeners: Vec<ChangeListener>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a setting under a namespace. Name collisions are a
    /// programming error surfaced at startup.
    pub fn register(&mut self, namespace: &str, setting: Setting) -> Result<(), SettingsError> {
        let entries = self.namespaces.entry(namespace.to_string()).or_default();
        if entries.contains_key(setting.key()) {
            return Err(SettingsError::DuplicateKey {
                namespace: namespace.to_string(),
                key: setting.key().to_string(),
            });
        }
        entries.insert(setting.key().to_string(), setting);
        Ok(())
    }

    /// Observe committed changes, e.g. to invalidate a cached client
    /// connection when a backend setting moves.
    pub fn subscribe(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    pub fn get(&self, namespace: &str, key: &str) -> Result<&SettingValue, SettingsError> {
        self.describe(namespace, key).map(|setting| setting.value())
    }

    /// Full descriptor access for display and completion.
    pub fn describe(&self, namespace: &str, key: &str) -> Result<&Setting, SettingsError> {
        self.namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .ok_or_else(|| SettingsError::UnknownSetting {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// Replace a value after the permission check and validation both pass.
    /// Returns the previous value. The swap is atomic per key: a rejected
    /// candidate never partially commits.
    pub fn set(
        &mut self,
        namespace: &str,
        key: &str,
        candidate: SettingValue,
        requester: AccessLevel,
    ) -> Result<SettingValue, SettingsError> {
        let setting = self
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.get_mut(key))
            .ok_or_else(|| SettingsError::UnknownSetting {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })?;

        // Permission before validation, so a denial reveals nothing about
        // whether the candidate would have been accepted.
        if requester < setting.access_level {
            return Err(SettingsError::PermissionDenied {
                namespace: namespace.to_string(),
                key: key.to_string(),
                required: setting.access_level,
                requester,
            });
        }
        setting
            .check(&candidate)
            .map_err(|reason| SettingsError::Validation {
                namespace: namespace.to_string(),
                key: key.to_string(),
                reason,
            })?;

        let previous = std::mem::replace(&mut setting.value, candidate.clone());
        debug!(
            "setting '{namespace}:{key}' changed from '{previous}' to '{candidate}'"
        );
        let change = SettingChange {
            namespace: namespace.to_string(),
            key: key.to_string(),
            previous: previous.clone(),
            current: candidate,
        };
        for listener in &self.listeners {
            listener(&change);
        }
        Ok(previous)
    }

    /// Parse raw operator text against the setting's kind, then `set`.
    pub fn set_text(
        &mut self,
        namespace: &str,
        key: &str,
        raw: &str,
        requester: AccessLevel,
    ) -> Result<SettingValue, SettingsError> {
        let kind = self.describe(namespace, key)?.kind();
        let candidate =
            SettingValue::parse(kind, raw).map_err(|reason| SettingsError::Validation {
                namespace: namespace.to_string(),
                key: key.to_string(),
                reason,
            })?;
        self.set(namespace, key, candidate, requester)
    }

    /// Restore the default value. Same permission check as `set`.
    pub fn reset(
        &mut self,
        namespace: &str,
        key: &str,
        requester: AccessLevel,
    ) -> Result<SettingValue, SettingsError> {
        let default = self.describe(namespace, key)?.default_value().clone();
        self.set(namespace, key, default, requester)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(|ns| ns.as_str())
    }

    /// All settings in sorted namespace and key order, as
    /// (namespace, setting) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.namespaces.iter().flat_map(|(namespace, entries)| {
            entries
                .values()
                .map(move |setting| (namespace.as_str(), setting))
        })
    }

    /// `namespace:key` forms for completion.
    pub fn setting_keys(&self) -> Vec<String> {
        self.iter()
            .map(|(namespace, setting)| format!("{namespace}:{}", setting.key()))
            .collect()
    }
}
