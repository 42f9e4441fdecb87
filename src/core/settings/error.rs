//! Error types for settings registry operations.

use std::fmt;

use super::AccessLevel;

/// Errors that can occur when registering or mutating settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// A setting with the same (namespace, key) pair is already registered.
    DuplicateKey { namespace: String, key: String },
    /// The requested (namespace, key) pair is not registered.
    UnknownSetting { namespace: String, key: String },
    /// The requester's access level is below the setting's required level.
    PermissionDenied {
        namespace: String,
        key: String,
        required: AccessLevel,
        requester: AccessLevel,
    },
    /// The candidate value was rejected by the setting's validator.
    Validation {
        namespace: String,
        key: String,
        reason: String,
    },
}

impl SettingsError {
    /// The `namespace:key` form used in events and messages.
    pub fn setting_key(&self) -> String {
        match self {
            SettingsError::DuplicateKey { namespace, key }
            | SettingsError::UnknownSetting { namespace, key }
            | SettingsError::PermissionDenied { namespace, key, .. }
            | SettingsError::Validation { namespace, key, .. } => {
                format!("{namespace}:{key}")
            }
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::DuplicateKey { namespace, key } => {
                write!(f, "setting '{namespace}:{key}' is already registered")
            }
            SettingsError::UnknownSetting { namespace, key } => {
                write!(f, "unknown setting '{namespace}:{key}'")
            }
            SettingsError::PermissionDenied {
                namespace,
                key,
                required,
                requester,
            } => write!(
                f,
                "permission denied for '{namespace}:{key}': requires {required}, requester is {requester}"
            ),
            SettingsError::Validation {
                namespace,
                key,
                reason,
            } => write!(f, "invalid value for '{namespace}:{key}': {reason}"),
        }
    }
}

impl std::error::Error for SettingsError {}
