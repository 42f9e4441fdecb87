//! Argument schemas and binding.
//!
//! Tokens after the command name are mapped to the command's schema:
//! `--name value` and `name=value` forms bind by name, everything else
//! binds positionally in schema order. Required arguments and type
//! coercion are checked here, before a handler ever runs.

use std::collections::HashMap;
use std::path::PathBuf;

use super::error::CommandError;
use super::lexer::{Token, TokenKind};
use crate::core::settings::parse_bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
    /// Presence-style flag (`--force`) or explicit on/off value.
    Bool,
    Path,
    /// A `namespace:key` reference into the settings registry.
    SettingKey,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub default: Option<&'static str>,
    pub description: &'static str,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    pub const fn with_default(
        name: &'static str,
        kind: ArgKind,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Path(PathBuf),
}

/// Arguments after binding and coercion. Handlers look values up by the
/// schema name; anything required is guaranteed present.
#[derive(Debug, Default)]
pub struct BoundArgs {
    values: HashMap<&'static str, ArgValue>,
}

impl BoundArgs {
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Boolean arguments default to false when absent.
    pub fn get_flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ArgValue::Bool(true)))
    }

    pub fn get_path(&self, name: &str) -> Option<&PathBuf> {
        match self.values.get(name) {
            Some(ArgValue::Path(p)) => Some(p),
            _ => None,
        }
    }
}

/// Bind lexed tokens against a schema.
pub fn bind(specs: &[ArgSpec], tokens: &[Token]) -> Result<BoundArgs, CommandError> {
    let mut bound = BoundArgs::default();
    let mut positional: Vec<&Token> = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];
        if let Some(name) = flag_name(token) {
            let spec = find_spec(specs, name).ok_or_else(|| CommandError::Argument {
                name: name.to_string(),
                reason: "unknown flag".into(),
            })?;
            if spec.kind == ArgKind::Bool {
                bound.values.insert(spec.name, ArgValue::Bool(true));
                idx += 1;
                continue;
            }
            let value = tokens.get(idx + 1).ok_or_else(|| CommandError::Argument {
                name: spec.name.to_string(),
                reason: "missing value".into(),
            })?;
            let coerced = coerce(spec, &value.value)?;
            bound.values.insert(spec.name, coerced);
            idx += 2;
            continue;
        }
        if let Some((name, raw)) = named_pair(specs, token) {
            let spec = find_spec(specs, name).expect("named_pair only matches schema names");
            let coerced = coerce(spec, raw)?;
            bound.values.insert(spec.name, coerced);
            idx += 1;
            continue;
        }
        positional.push(token);
        idx += 1;
    }

    // Unmatched tokens map positionally in schema order. Bool specs are
    // presence flags and bind only by name, so a stray token can never
    // turn one on.
    let mut remaining = positional.into_iter();
    for spec in specs {
        if spec.kind == ArgKind::Bool || bound.values.contains_key(spec.name) {
            continue;
        }
        if let Some(token) = remaining.next() {
            let coerced = coerce(spec, &token.value)?;
            bound.values.insert(spec.name, coerced);
        }
    }
    if let Some(extra) = remaining.next() {
        return Err(CommandError::Argument {
            name: extra.value.clone(),
            reason: "unexpected argument".into(),
        });
    }

    for spec in specs {
        if bound.values.contains_key(spec.name) {
            continue;
        }
        if let Some(default) = spec.default {
            let coerced = coerce(spec, default)?;
            bound.values.insert(spec.name, coerced);
        } else if spec.required {
            return Err(CommandError::Argument {
                name: spec.name.to_string(),
                reason: "required argument is missing".into(),
            });
        }
    }

    Ok(bound)
}

fn flag_name(token: &Token) -> Option<&str> {
    if token.kind != TokenKind::Bare {
        return None;
    }
    token
        .value
        .strip_prefix("--")
        .filter(|rest| !rest.is_empty() && !rest.contains('='))
}

/// `name=value`, only when `name` is actually in the schema; otherwise the
/// token stays positional so values containing '=' pass through.
fn named_pair<'t>(specs: &[ArgSpec], token: &'t Token) -> Option<(&'t str, &'t str)> {
    if token.kind != TokenKind::Bare {
        return None;
    }
    let (name, raw) = token.value.split_once('=')?;
    specs.iter().any(|spec| spec.name == name).then_some((name, raw))
}

fn find_spec<'s>(specs: &'s [ArgSpec], name: &str) -> Option<&'s ArgSpec> {
    specs.iter().find(|spec| spec.name == name)
}

fn coerce(spec: &ArgSpec, raw: &str) -> Result<ArgValue, CommandError> {
    let fail = |reason: String| CommandError::Argument {
        name: spec.name.to_string(),
        reason,
    };
    match spec.kind {
        ArgKind::Str => Ok(ArgValue::Str(raw.to_string())),
        ArgKind::Path => Ok(ArgValue::Path(PathBuf::from(raw))),
        ArgKind::Int => raw
            .parse::<i64>()
            .map(ArgValue::Int)
            .map_err(|_| fail(format!("'{raw}' is not an integer"))),
        ArgKind::Bool => parse_bool(raw)
            .map(ArgValue::Bool)
            .ok_or_else(|| fail(format!("'{raw}' is not a boolean (use on/off)"))),
        ArgKind::SettingKey => match raw.split_once(':') {
            Some((namespace, key)) if !namespace.is_empty() && !key.is_empty() => {
                Ok(ArgValue::Str(raw.to_string()))
            }
            _ => Err(fail(format!(
                "'{raw}' is not a setting key (expected namespace:key)"
            ))),
        },
        ArgKind::Enum(choices) => {
            let lowered = raw.to_ascii_lowercase();
            if choices.contains(&lowered.as_str()) {
                Ok(ArgValue::Str(lowered))
            } else {
                Err(fail(format!(
                    "'{raw}' is not one of: {}",
                    choices.join(", ")
                )))
            }
        }
    }
}
