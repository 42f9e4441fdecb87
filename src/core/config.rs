//! Persisted settings document and environment overrides.
//!
//! The document is a TOML table mapping namespace → key → value with a
//! schema version marker. Loading is partial-failure tolerant: unknown
//! keys are ignored with a warning, values that no longer validate fall
//! back to the setting's default, and the rest of the document still
//! applies. System-level settings never come from the file; they are
//! seeded from the environment only.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::settings::{AccessLevel, SettingValue, SettingsRegistry};

pub const SETTINGS_VERSION: u32 = 1;

/// Environment variables that may seed settings before the persisted file
/// is applied. File values win afterwards, except for System-level
/// settings, which are env-only.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("PALAVER_API_KEY", "llm", "api_key"),
    ("PALAVER_BASE_URL", "llm", "base_url"),
    ("PALAVER_MODEL", "llm", "model"),
    ("PALAVER_PROVIDER", "llm", "provider"),
    ("PALAVER_DATA_DIR", "paths", "data_dir"),
];

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsDocument {
    pub version: u32,
    #[serde(flatten)]
    pub namespaces: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            namespaces: BTreeMap::new(),
        }
    }
}

/// Outcome of applying a document, per key.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub applied: Vec<String>,
    /// Keys whose persisted value no longer validates; reverted to default.
    pub defaulted: Vec<(String, String)>,
    pub unknown: Vec<String>,
    /// System-level keys present in the file and ignored.
    pub skipped: Vec<String>,
}

/// Produce a persistable snapshot of all non-System settings.
pub fn snapshot(registry: &SettingsRegistry) -> SettingsDocument {
    let mut doc = SettingsDocument::default();
    for (namespace, setting) in registry.iter() {
        if setting.access_level() == AccessLevel::System {
            continue;
        }
        doc.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(setting.key().to_string(), setting.value().to_toml());
    }
    doc
}

/// Apply a document from a trusted source. Validators still run; access
/// levels are bypassed except that System settings are env-only and any
/// file value for them is ignored.
pub fn apply_document(registry: &mut SettingsRegistry, doc: &SettingsDocument) -> LoadReport {
    let mut report = LoadReport::default();
    if doc.version > SETTINGS_VERSION {
        warn!(
            "settings document version {} is newer than supported {}; loading best-effort",
            doc.version, SETTINGS_VERSION
        );
    }
    for (namespace, entries) in &doc.namespaces {
        for (key, raw) in entries {
            let qualified = format!("{namespace}:{key}");
            let (kind, level) = match registry.describe(namespace, key) {
                Ok(setting) => (setting.kind(), setting.access_level()),
                Err(_) => {
                    warn!("ignoring unknown persisted setting '{qualified}'");
                    report.unknown.push(qualified);
                    continue;
                }
            };
            if level == AccessLevel::System {
                warn!("ignoring file value for env-only setting '{qualified}'");
                report.skipped.push(qualified);
                continue;
            }
            let candidate = SettingValue::from_toml(kind, raw);
            let result = match candidate {
                Some(value) => registry.set(namespace, key, value, AccessLevel::System),
                None => Err(crate::core::settings::SettingsError::Validation {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    reason: format!("persisted value has the wrong shape for a {} setting", kind.as_str()),
                }),
            };
            match result {
                Ok(_) => report.applied.push(qualified),
                Err(err) => {
                    warn!("persisted value for '{qualified}' rejected ({err}); using default");
                    // Default values always validate, so this cannot fail.
                    let _ = registry.reset(namespace, key, AccessLevel::System);
                    report.defaulted.push((qualified, err.to_string()));
                }
            }
        }
    }
    report
}

/// Seed settings from the environment, before the persisted file.
pub fn apply_env_overrides(registry: &mut SettingsRegistry) {
    apply_env_overrides_from(registry, |name| std::env::var(name).ok());
}

pub fn apply_env_overrides_from(
    registry: &mut SettingsRegistry,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for (var, namespace, key) in ENV_OVERRIDES {
        let Some(raw) = lookup(var) else { continue };
        if let Err(err) = registry.set_text(namespace, key, &raw, AccessLevel::System) {
            warn!("ignoring {var}: {err}");
        }
    }
}

/// Owns the location of the persisted settings file.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn at_default_location() -> Result<Self, Box<dyn Error>> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "palaver")
            .ok_or("could not determine a configuration directory")?;
        Ok(Self {
            path: proj_dirs.config_dir().join("settings.toml"),
        })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read the document, or `None` when no file exists yet. A document
    /// that fails to parse is an error the bootstrap treats as fatal.
    pub fn load(&self) -> Result<Option<SettingsDocument>, Box<dyn Error>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let doc: SettingsDocument = toml::from_str(&contents)?;
        Ok(Some(doc))
    }

    pub fn save(&self, doc: &SettingsDocument) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(doc)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::builtin::{register_builtin_settings, NS_LLM, NS_UI};
    use tempfile::TempDir;

    fn builtin_registry() -> SettingsRegistry {
        let mut registry = SettingsRegistry::new();
        register_builtin_settings(&mut registry).unwrap();
        registry
    }

    #[test]
    fn snapshot_load_round_trip_reproduces_values() {
        let mut registry = builtin_registry();
        registry
            .set_text(NS_LLM, "model", "llama3", AccessLevel::User)
            .unwrap();
        registry
            .set_text(NS_UI, "history_limit", "50", AccessLevel::User)
            .unwrap();

        let doc = snapshot(&registry);
        let mut fresh = builtin_registry();
        let report = apply_document(&mut fresh, &doc);
        assert!(report.defaulted.is_empty());
        assert!(report.unknown.is_empty());

        for (namespace, setting) in registry.iter() {
            assert_eq!(
                fresh.get(namespace, setting.key()).unwrap(),
                setting.value(),
                "{namespace}:{}",
                setting.key()
            );
        }
    }

    #[test]
    fn snapshot_excludes_system_settings() {
        let mut registry = builtin_registry();
        registry
            .set_text(NS_LLM, "api_key", "sk-secret", AccessLevel::System)
            .unwrap();
        let doc = snapshot(&registry);
        assert!(!doc.namespaces["llm"].contains_key("api_key"));
    }

    #[test]
    fn load_falls_back_to_default_on_invalid_value_and_continues() {
        let mut doc = SettingsDocument::default();
        let llm = doc.namespaces.entry("llm".into()).or_default();
        llm.insert("base_url".into(), toml::Value::String("not-a-url".into()));
        llm.insert("model".into(), toml::Value::String("llama3".into()));

        let mut registry = builtin_registry();
        let report = apply_document(&mut registry, &doc);

        assert_eq!(report.applied, vec!["llm:model".to_string()]);
        assert_eq!(report.defaulted.len(), 1);
        assert_eq!(report.defaulted[0].0, "llm:base_url");
        assert_eq!(
            registry.get(NS_LLM, "base_url").unwrap(),
            &SettingValue::Str("https://api.openai.com/v1".into())
        );
        assert_eq!(
            registry.get(NS_LLM, "model").unwrap(),
            &SettingValue::Str("llama3".into())
        );
    }

    #[test]
    fn load_ignores_unknown_keys_with_a_report_entry() {
        let mut doc = SettingsDocument::default();
        doc.namespaces
            .entry("llm".into())
            .or_default()
            .insert("warp_factor".into(), toml::Value::Integer(9));

        let mut registry = builtin_registry();
        let report = apply_document(&mut registry, &doc);
        assert_eq!(report.unknown, vec!["llm:warp_factor".to_string()]);
    }

    #[test]
    fn file_never_overrides_system_settings() {
        let mut doc = SettingsDocument::default();
        doc.namespaces
            .entry("llm".into())
            .or_default()
            .insert("api_key".into(), toml::Value::String("sk-evil".into()));

        let mut registry = builtin_registry();
        let report = apply_document(&mut registry, &doc);
        assert_eq!(report.skipped, vec!["llm:api_key".to_string()]);
        assert_eq!(
            registry.get(NS_LLM, "api_key").unwrap(),
            &SettingValue::Str(String::new())
        );
    }

    #[test]
    fn env_overrides_seed_before_file_and_file_wins() {
        let mut registry = builtin_registry();
        apply_env_overrides_from(&mut registry, |name| match name {
            "PALAVER_MODEL" => Some("env-model".to_string()),
            "PALAVER_API_KEY" => Some("sk-env".to_string()),
            _ => None,
        });
        assert_eq!(
            registry.get(NS_LLM, "model").unwrap(),
            &SettingValue::Str("env-model".into())
        );
        assert_eq!(
            registry.get(NS_LLM, "api_key").unwrap(),
            &SettingValue::Str("sk-env".into())
        );

        // The persisted file takes precedence for non-System settings and
        // is ignored for the env-only api_key.
        let mut doc = SettingsDocument::default();
        let llm = doc.namespaces.entry("llm".into()).or_default();
        llm.insert("model".into(), toml::Value::String("file-model".into()));
        llm.insert("api_key".into(), toml::Value::String("sk-file".into()));
        apply_document(&mut registry, &doc);
        assert_eq!(
            registry.get(NS_LLM, "model").unwrap(),
            &SettingValue::Str("file-model".into())
        );
        assert_eq!(
            registry.get(NS_LLM, "api_key").unwrap(),
            &SettingValue::Str("sk-env".into())
        );
    }

    #[test]
    fn invalid_env_values_are_skipped() {
        let mut registry = builtin_registry();
        apply_env_overrides_from(&mut registry, |name| match name {
            "PALAVER_PROVIDER" => Some("carrier-pigeon".to_string()),
            _ => None,
        });
        assert_eq!(
            registry.get(NS_LLM, "provider").unwrap(),
            &SettingValue::Enum("openai".into())
        );
    }

    #[test]
    fn store_save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = SettingsStore::at_path(temp_dir.path().join("settings.toml"));
        assert!(store.load().unwrap().is_none());

        let registry = builtin_registry();
        let doc = snapshot(&registry);
        store.save(&doc).unwrap();

        let loaded = store.load().unwrap().expect("document");
        assert_eq!(loaded.version, SETTINGS_VERSION);
        assert_eq!(loaded.namespaces, doc.namespaces);
    }

    #[test]
    fn corrupt_document_is_a_load_error() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "version = [this is not toml").unwrap();
        let store = SettingsStore::at_path(path);
        assert!(store.load().is_err());
    }
}
