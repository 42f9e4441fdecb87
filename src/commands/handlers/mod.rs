//! Builtin command groups.
//!
//! Each submodule contributes one group of descriptors; [`register_all`]
//! wires them into a catalog at startup.

pub mod core;
pub mod model;
pub mod packages;
pub mod settings;
pub mod tools;

use super::error::CommandError;
use super::registry::{CommandCatalog, DuplicateCommand};
use crate::core::settings::{AccessLevel, SettingsError};
use crate::ui::events::EventSink;

pub fn register_all(catalog: &mut CommandCatalog) -> Result<(), DuplicateCommand> {
    catalog.register_group(settings::commands())?;
    catalog.register_group(model::commands())?;
    catalog.register_group(tools::commands())?;
    catalog.register_group(packages::commands())?;
    catalog.register_group(core::commands())?;
    Ok(())
}

/// The effective access level for one settings mutation: `--force`
/// escalates a single operation to Advanced, never beyond.
fn effective_level(base: AccessLevel, force: bool) -> AccessLevel {
    if force {
        base.max(AccessLevel::Advanced)
    } else {
        base
    }
}

/// Map a registry failure onto the event interface. Denials and
/// validation failures have dedicated events; anything else bubbles up
/// as a command error.
fn report_settings_error(
    events: &dyn EventSink,
    err: SettingsError,
) -> Result<(), CommandError> {
    match err {
        SettingsError::PermissionDenied { .. } => {
            events.on_permission_denied(&err.setting_key());
            Ok(())
        }
        SettingsError::Validation { ref reason, .. } => {
            events.on_validation_error(&err.setting_key(), reason);
            Ok(())
        }
        other => Err(CommandError::Execution(other.to_string())),
    }
}

/// Pull a required string argument; binding guarantees presence, this
/// guards the invariant without panicking.
fn require_str<'a>(
    args: &'a super::args::BoundArgs,
    name: &'static str,
) -> Result<&'a str, CommandError> {
    args.get_str(name).ok_or_else(|| CommandError::Argument {
        name: name.to_string(),
        reason: "required argument is missing".into(),
    })
}
