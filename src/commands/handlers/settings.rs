//! Settings commands: inspect, mutate, persist.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use super::{effective_level, report_settings_error, require_str};
use crate::commands::args::{ArgKind, ArgSpec, BoundArgs};
use crate::commands::error::CommandError;
use crate::commands::registry::{CommandDescriptor, CommandHandler, CommandUsage};
use crate::commands::{CommandOutcome, ExecutionContext};
use crate::core::config::{self, SettingsStore};
use crate::core::settings::{AccessLevel, SettingKind, SettingValue, SettingsError};
use crate::ui::events::ResultKind;

pub fn commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            name: "set",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/set <namespace:key> <value> [--force]",
                description: "Change a setting",
            }],
            args: SET_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(SetCommand),
        },
        CommandDescriptor {
            name: "get",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/get <namespace:key>",
                description: "Show one setting with its type and access level",
            }],
            args: KEY_ONLY_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(GetCommand),
        },
        CommandDescriptor {
            name: "settings",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/settings [filter]",
                description: "List settings, filtered by key, namespace, or substring",
            }],
            args: LIST_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ListCommand),
        },
        CommandDescriptor {
            name: "reset",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/reset <namespace:key> [--force]",
                description: "Restore a setting to its default",
            }],
            args: RESET_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ResetCommand),
        },
        CommandDescriptor {
            name: "save",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/save [file]",
                description: "Persist current settings to the configuration file",
            }],
            args: SAVE_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(SaveCommand),
        },
        CommandDescriptor {
            name: "export",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/export <file>",
                description: "Write current settings to a TOML file",
            }],
            args: FILE_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ExportCommand),
        },
        CommandDescriptor {
            name: "import",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/import <file> [--force]",
                description: "Apply settings from a TOML file, honoring access levels",
            }],
            args: IMPORT_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ImportCommand),
        },
    ]
}

const SET_ARGS: &[ArgSpec] = &[
    ArgSpec::required("key", ArgKind::SettingKey, "setting to change"),
    ArgSpec::required("value", ArgKind::Str, "new value"),
    ArgSpec::optional("force", ArgKind::Bool, "escalate this operation to advanced"),
];

const KEY_ONLY_ARGS: &[ArgSpec] = &[ArgSpec::required("key", ArgKind::SettingKey, "setting to show")];

const LIST_ARGS: &[ArgSpec] = &[ArgSpec::optional(
    "filter",
    ArgKind::Str,
    "exact key, namespace, or substring",
)];

const SAVE_ARGS: &[ArgSpec] = &[ArgSpec::optional("file", ArgKind::Path, "alternate target file")];

const RESET_ARGS: &[ArgSpec] = &[
    ArgSpec::required("key", ArgKind::SettingKey, "setting to reset"),
    ArgSpec::optional("force", ArgKind::Bool, "escalate this operation to advanced"),
];

const FILE_ARGS: &[ArgSpec] = &[ArgSpec::required("file", ArgKind::Path, "target file")];

const IMPORT_ARGS: &[ArgSpec] = &[
    ArgSpec::required("file", ArgKind::Path, "source file"),
    ArgSpec::optional("force", ArgKind::Bool, "escalate this operation to advanced"),
];

/// Split a coerced `namespace:key` argument. Coercion already rejected
/// malformed keys.
fn split_key(qualified: &str) -> Result<(&str, &str), CommandError> {
    qualified
        .split_once(':')
        .ok_or_else(|| CommandError::Argument {
            name: "key".into(),
            reason: format!("'{qualified}' is not a setting key (expected namespace:key)"),
        })
}

struct SetCommand;

#[async_trait::async_trait]
impl CommandHandler for SetCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let qualified = require_str(&args, "key")?.to_string();
        let raw = require_str(&args, "value")?.to_string();
        let (namespace, key) = split_key(&qualified)?;
        let requester = effective_level(ctx.requester, args.get_flag("force"));

        let result = {
            let mut registry = ctx.settings.write().expect("settings lock poisoned");
            registry.set_text(namespace, key, &raw, requester)
        };
        match result {
            Ok(previous) => Ok(CommandOutcome::Message(format!(
                "{qualified} = {raw} (was {previous})"
            ))),
            Err(err) => {
                report_settings_error(ctx.events, err)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}

struct GetCommand;

#[async_trait::async_trait]
impl CommandHandler for GetCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let qualified = require_str(&args, "key")?.to_string();
        let (namespace, key) = split_key(&qualified)?;

        let registry = ctx.settings.read().expect("settings lock poisoned");
        let setting = registry
            .describe(namespace, key)
            .map_err(|err| CommandError::Execution(err.to_string()))?;
        Ok(CommandOutcome::Message(format!(
            "{qualified} = {} ({}, {} access) - {}",
            setting.value(),
            setting.kind().as_str(),
            setting.access_level(),
            setting.description(),
        )))
    }
}

/// How a `/settings` filter matched: an exact `namespace:key` first, then
/// a whole namespace, then a substring over qualified keys.
enum ListFilter {
    All,
    Exact(String),
    Namespace(String),
    Substring(String),
}

impl ListFilter {
    fn matches(&self, namespace: &str, key: &str) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Exact(wanted) => format!("{namespace}:{key}") == *wanted,
            ListFilter::Namespace(wanted) => namespace == wanted,
            ListFilter::Substring(needle) => {
                format!("{namespace}:{key}").contains(needle.as_str())
            }
        }
    }
}

struct ListCommand;

#[async_trait::async_trait]
impl CommandHandler for ListCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        // Collect under the read guard, emit after it drops; the sink
        // may itself read settings.
        let (lines, data) = {
            let registry = ctx.settings.read().expect("settings lock poisoned");

            let filter = match args.get_str("filter") {
                None => ListFilter::All,
                Some(raw) => {
                    let exact = raw
                        .split_once(':')
                        .is_some_and(|(ns, key)| registry.describe(ns, key).is_ok());
                    if exact {
                        ListFilter::Exact(raw.to_string())
                    } else if registry.namespaces().any(|ns| ns == raw) {
                        ListFilter::Namespace(raw.to_string())
                    } else {
                        ListFilter::Substring(raw.to_string())
                    }
                }
            };

            let mut lines = Vec::new();
            let mut data = serde_json::Map::new();
            for (namespace, setting) in registry.iter() {
                if !filter.matches(namespace, setting.key()) {
                    continue;
                }
                lines.push(format!(
                    "{namespace}:{} = {} ({}, {} access)",
                    setting.key(),
                    setting.value(),
                    setting.kind().as_str(),
                    setting.access_level(),
                ));
                let entry = data.entry(namespace.to_string()).or_insert_with(|| json!({}));
                if let Some(table) = entry.as_object_mut() {
                    table.insert(
                        setting.key().to_string(),
                        json!(setting.value().to_string()),
                    );
                }
            }
            (lines, data)
        };
        if lines.is_empty() {
            let wanted = args.get_str("filter").unwrap_or_default();
            return Err(CommandError::Execution(format!(
                "no settings match '{wanted}'"
            )));
        }
        ctx.events.on_command_result(
            ResultKind::Info,
            &lines.join("\n"),
            Some(&serde_json::Value::Object(data)),
        );
        Ok(CommandOutcome::Done)
    }
}

struct ResetCommand;

#[async_trait::async_trait]
impl CommandHandler for ResetCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let qualified = require_str(&args, "key")?.to_string();
        let (namespace, key) = split_key(&qualified)?;
        let requester = effective_level(ctx.requester, args.get_flag("force"));

        let result = {
            let mut registry = ctx.settings.write().expect("settings lock poisoned");
            registry.reset(namespace, key, requester)
        };
        match result {
            Ok(_) => {
                let registry = ctx.settings.read().expect("settings lock poisoned");
                let current = registry
                    .get(namespace, key)
                    .map(SettingValue::to_string)
                    .unwrap_or_default();
                Ok(CommandOutcome::Message(format!(
                    "{qualified} reset to {current}"
                )))
            }
            Err(err) => {
                report_settings_error(ctx.events, err)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}

struct SaveCommand;

#[async_trait::async_trait]
impl CommandHandler for SaveCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let doc = {
            let registry = ctx.settings.read().expect("settings lock poisoned");
            config::snapshot(&registry)
        };
        let path = match args.get_path("file") {
            Some(file) => file.clone(),
            None => ctx.store.path().clone(),
        };
        SettingsStore::at_path(path.clone())
            .save(&doc)
            .map_err(|err| CommandError::Execution(format!("could not save settings: {err}")))?;
        Ok(CommandOutcome::Message(format!(
            "settings saved to {}",
            path.display()
        )))
    }
}

struct ExportCommand;

#[async_trait::async_trait]
impl CommandHandler for ExportCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let file: PathBuf = args
            .get_path("file")
            .cloned()
            .ok_or_else(|| CommandError::Argument {
                name: "file".into(),
                reason: "required argument is missing".into(),
            })?;
        let doc = {
            let registry = ctx.settings.read().expect("settings lock poisoned");
            config::snapshot(&registry)
        };
        SettingsStore::at_path(file.clone())
            .save(&doc)
            .map_err(|err| CommandError::Execution(format!("could not export settings: {err}")))?;
        Ok(CommandOutcome::Message(format!(
            "settings exported to {}",
            file.display()
        )))
    }
}

/// What happened to one key during an `/import`, recorded under the
/// write guard and reported after it drops.
enum ImportStep {
    Applied,
    UnknownKey,
    WrongShape(SettingKind),
    Rejected(SettingsError),
}

struct ImportCommand;

#[async_trait::async_trait]
impl CommandHandler for ImportCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let file: PathBuf = args
            .get_path("file")
            .cloned()
            .ok_or_else(|| CommandError::Argument {
                name: "file".into(),
                reason: "required argument is missing".into(),
            })?;
        let requester = effective_level(ctx.requester, args.get_flag("force"));

        let doc = SettingsStore::at_path(file.clone())
            .load()
            .map_err(|err| CommandError::Execution(format!("could not read {}: {err}", file.display())))?
            .ok_or_else(|| {
                CommandError::Execution(format!("no such file: {}", file.display()))
            })?;

        // Unlike the startup load, an import runs at the session's access
        // level: every key goes through the same checks as a /set.
        let mut applied = 0usize;
        let mut skipped = 0usize;
        for (namespace, entries) in &doc.namespaces {
            for (key, raw) in entries {
                let qualified = format!("{namespace}:{key}");
                // The sink may itself read settings; the guard must be
                // gone before any event fires.
                let step = {
                    let mut registry = ctx.settings.write().expect("settings lock poisoned");
                    match registry.describe(namespace, key).map(|setting| setting.kind()) {
                        Err(_) => ImportStep::UnknownKey,
                        Ok(kind) => match SettingValue::from_toml(kind, raw) {
                            None => ImportStep::WrongShape(kind),
                            Some(candidate) => {
                                match registry.set(namespace, key, candidate, requester) {
                                    Ok(_) => ImportStep::Applied,
                                    Err(err) => ImportStep::Rejected(err),
                                }
                            }
                        },
                    }
                };
                match step {
                    ImportStep::Applied => applied += 1,
                    ImportStep::UnknownKey => {
                        skipped += 1;
                        ctx.events.on_command_result(
                            ResultKind::Info,
                            &format!("skipping unknown setting '{qualified}'"),
                            None,
                        );
                    }
                    ImportStep::WrongShape(kind) => {
                        skipped += 1;
                        ctx.events.on_validation_error(
                            &qualified,
                            &format!("value has the wrong shape for a {} setting", kind.as_str()),
                        );
                    }
                    ImportStep::Rejected(err) => {
                        skipped += 1;
                        report_settings_error(ctx.events, err)?;
                    }
                }
            }
        }
        Ok(CommandOutcome::Message(format!(
            "imported {applied} setting(s) from {} ({skipped} skipped)",
            file.display()
        )))
    }
}
