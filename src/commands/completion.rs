//! Context-aware completion over the command catalog and settings
//! registry.
//!
//! Completion re-lexes the line up to the cursor (tolerating an open
//! quote), then proposes command names for the first token and flag
//! names, setting keys, or enum values for later tokens. It never fails
//! and never mutates anything; no match is simply an empty candidate
//! list.

use super::args::{ArgKind, ArgSpec};
use super::lexer::{tokenize_prefix, Token};
use super::registry::CommandCatalog;
use super::COMMAND_SIGIL;
use crate::core::settings::SettingsRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completions {
    /// Ranked, deduplicated candidate strings.
    pub candidates: Vec<String>,
    /// Byte span of the line the candidates would replace.
    pub replace_start: usize,
    pub replace_end: usize,
}

impl Completions {
    fn empty(at: usize) -> Self {
        Self {
            candidates: Vec::new(),
            replace_start: at,
            replace_end: at,
        }
    }
}

pub fn complete(
    line: &str,
    cursor: usize,
    catalog: &CommandCatalog,
    settings: &SettingsRegistry,
) -> Completions {
    let mut cursor = cursor.min(line.len());
    while cursor > 0 && !line.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let before = &line[..cursor];
    let tokens = tokenize_prefix(before);

    // The cursor sits inside the last token when that token runs up to
    // it; otherwise the operator is starting a fresh token.
    let touching = tokens
        .last()
        .map(|token| token.end == before.len())
        .unwrap_or(false);

    if tokens.is_empty() || (tokens.len() == 1 && touching) {
        return complete_command_name(cursor, tokens.first(), catalog);
    }

    let (prefix, span) = match tokens.last() {
        Some(token) if touching => (token.value.as_str(), (token.start, cursor)),
        _ => ("", (cursor, cursor)),
    };

    let command_token = &tokens[0];
    let command_name = command_token
        .value
        .strip_prefix(COMMAND_SIGIL)
        .unwrap_or(&command_token.value);
    let Ok(descriptor) = catalog.resolve(command_name) else {
        return Completions::empty(cursor);
    };

    let arg_end = if touching { tokens.len() - 1 } else { tokens.len() };
    let prior = &tokens[1..arg_end];

    let candidates = if prefix.starts_with('-') {
        flag_candidates(descriptor.args, prefix)
    } else {
        value_candidates(descriptor.args, prior, prefix, settings)
    };

    Completions {
        candidates: rank(candidates, prefix),
        replace_start: span.0,
        replace_end: span.1,
    }
}

fn complete_command_name(
    cursor: usize,
    token: Option<&Token>,
    catalog: &CommandCatalog,
) -> Completions {
    let (raw, start) = match token {
        Some(token) => (token.value.as_str(), token.start),
        None => ("", cursor),
    };
    let (prefix, start) = match raw.strip_prefix(COMMAND_SIGIL) {
        Some(rest) => (rest, start + COMMAND_SIGIL.len_utf8()),
        None => (raw, start),
    };

    let candidates = catalog
        .completion_names()
        .into_iter()
        .filter(|name| starts_with_ignore_case(name, prefix))
        .map(|name| name.to_string())
        .collect();
    Completions {
        candidates: rank(candidates, prefix),
        replace_start: start,
        replace_end: cursor,
    }
}

fn flag_candidates(specs: &[ArgSpec], prefix: &str) -> Vec<String> {
    specs
        .iter()
        .map(|spec| format!("--{}", spec.name))
        .filter(|flag| starts_with_ignore_case(flag, prefix))
        .collect()
}

fn value_candidates(
    specs: &[ArgSpec],
    prior: &[Token],
    prefix: &str,
    settings: &SettingsRegistry,
) -> Vec<String> {
    let Some(spec) = expected_spec(specs, prior) else {
        return Vec::new();
    };
    let pool: Vec<String> = match spec.kind {
        ArgKind::SettingKey => settings.setting_keys(),
        ArgKind::Enum(choices) => choices.iter().map(|c| c.to_string()).collect(),
        ArgKind::Bool => vec!["on".to_string(), "off".to_string()],
        _ => Vec::new(),
    };
    pool.into_iter()
        .filter(|candidate| starts_with_ignore_case(candidate, prefix))
        .collect()
}

/// Which schema entry the token under the cursor is a value for.
fn expected_spec<'s>(specs: &'s [ArgSpec], prior: &[Token]) -> Option<&'s ArgSpec> {
    // A trailing `--name` flag of a value-taking argument claims the
    // cursor position.
    if let Some(last) = prior.last() {
        if let Some(name) = last.value.strip_prefix("--") {
            if let Some(spec) = specs.iter().find(|spec| spec.name == name) {
                if spec.kind != ArgKind::Bool {
                    return Some(spec);
                }
            }
        }
    }

    // Otherwise count prior positional tokens, skipping flags, their
    // values, and name=value pairs already bound by name.
    let mut named: Vec<&str> = Vec::new();
    let mut positional = 0usize;
    let mut idx = 0;
    while idx < prior.len() {
        let value = prior[idx].value.as_str();
        if let Some(name) = value.strip_prefix("--") {
            if let Some(spec) = specs.iter().find(|spec| spec.name == name) {
                named.push(spec.name);
                if spec.kind != ArgKind::Bool {
                    idx += 1; // skip the flag's value
                }
            }
            idx += 1;
            continue;
        }
        if let Some((name, _)) = value.split_once('=') {
            if let Some(spec) = specs.iter().find(|spec| spec.name == name) {
                named.push(spec.name);
                idx += 1;
                continue;
            }
        }
        positional += 1;
        idx += 1;
    }

    specs
        .iter()
        .filter(|spec| !named.contains(&spec.name))
        .nth(positional)
}

fn starts_with_ignore_case(candidate: &str, prefix: &str) -> bool {
    candidate.len() >= prefix.len()
        && candidate
            .chars()
            .zip(prefix.chars())
            .all(|(c, p)| c.eq_ignore_ascii_case(&p))
}

/// Exact match first, then alphabetical; deduplicated.
fn rank(mut candidates: Vec<String>, prefix: &str) -> Vec<String> {
    candidates.sort_by(|a, b| {
        let a_exact = a.eq_ignore_ascii_case(prefix);
        let b_exact = b.eq_ignore_ascii_case(prefix);
        b_exact.cmp(&a_exact).then_with(|| a.cmp(b))
    });
    candidates.dedup();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::args::{ArgKind, ArgSpec};
    use crate::commands::registry::{
        CommandCatalog, CommandDescriptor, CommandHandler,
    };
    use crate::commands::{CommandError, CommandOutcome, ExecutionContext};
    use crate::core::settings::builtin::register_builtin_settings;
    use crate::core::settings::{AccessLevel, SettingsRegistry};
    use std::sync::Arc;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl CommandHandler for NoopHandler {
        async fn execute(
            &self,
            _args: crate::commands::args::BoundArgs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<CommandOutcome, CommandError> {
            Ok(CommandOutcome::Done)
        }
    }

    const SET_ARGS: &[ArgSpec] = &[
        ArgSpec::required("key", ArgKind::SettingKey, "setting to change"),
        ArgSpec::required("value", ArgKind::Str, "new value"),
        ArgSpec::optional("force", ArgKind::Bool, "escalate access"),
    ];

    const SERVER_ARGS: &[ArgSpec] = &[
        ArgSpec::required(
            "action",
            ArgKind::Enum(&["connect", "disconnect", "status"]),
            "what to do",
        ),
        ArgSpec::optional("name", ArgKind::Str, "server name"),
    ];

    fn descriptor(
        name: &'static str,
        args: &'static [ArgSpec],
    ) -> CommandDescriptor {
        CommandDescriptor {
            name,
            aliases: &[],
            usages: &[],
            args,
            required_level: AccessLevel::User,
            handler: Arc::new(NoopHandler),
        }
    }

    fn fixture() -> (CommandCatalog, SettingsRegistry) {
        let mut catalog = CommandCatalog::new();
        catalog
            .register_group(vec![
                descriptor("settings", &[]),
                descriptor("model", &[]),
                descriptor("set-path", &[]),
                descriptor("set", SET_ARGS),
                descriptor("server", SERVER_ARGS),
            ])
            .unwrap();
        let mut settings = SettingsRegistry::new();
        register_builtin_settings(&mut settings).unwrap();
        (catalog, settings)
    }

    #[test]
    fn first_token_completes_command_names_by_prefix() {
        let (catalog, settings) = fixture();
        let line = "/sett";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(result.candidates, vec!["settings"]);
        // The span excludes the sigil.
        assert_eq!((result.replace_start, result.replace_end), (1, 5));
    }

    #[test]
    fn exact_command_match_ranks_first() {
        let (catalog, settings) = fixture();
        let line = "/set";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(result.candidates, vec!["set", "set-path", "settings"]);
    }

    #[test]
    fn command_completion_is_case_insensitive() {
        let (catalog, settings) = fixture();
        let line = "/SET";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(result.candidates, vec!["set", "set-path", "settings"]);
    }

    #[test]
    fn empty_line_offers_all_commands() {
        let (catalog, settings) = fixture();
        let result = complete("", 0, &catalog, &settings);
        assert_eq!(result.candidates.len(), 5);
        assert_eq!(result.candidates[0], "model");
    }

    #[test]
    fn setting_key_argument_completes_from_the_registry() {
        let (catalog, settings) = fixture();
        let line = "/set llm:";
        let result = complete(line, line.len(), &catalog, &settings);
        assert!(result.candidates.contains(&"llm:model".to_string()));
        assert!(result.candidates.contains(&"llm:base_url".to_string()));
        assert!(result.candidates.iter().all(|c| c.starts_with("llm:")));
        assert_eq!((result.replace_start, result.replace_end), (5, 9));
    }

    #[test]
    fn enum_argument_completes_its_choices() {
        let (catalog, settings) = fixture();
        let line = "/server con";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(result.candidates, vec!["connect"]);
    }

    #[test]
    fn fresh_token_after_space_completes_the_next_argument() {
        let (catalog, settings) = fixture();
        let line = "/server ";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(
            result.candidates,
            vec!["connect", "disconnect", "status"]
        );
        assert_eq!((result.replace_start, result.replace_end), (8, 8));
    }

    #[test]
    fn dash_prefix_completes_flag_names() {
        let (catalog, settings) = fixture();
        let line = "/set llm:model gpt --f";
        let result = complete(line, line.len(), &catalog, &settings);
        assert_eq!(result.candidates, vec!["--force"]);
    }

    #[test]
    fn no_match_yields_an_empty_list_not_an_error() {
        let (catalog, settings) = fixture();
        let line = "/zzz";
        let result = complete(line, line.len(), &catalog, &settings);
        assert!(result.candidates.is_empty());

        let line = "/server warp";
        let result = complete(line, line.len(), &catalog, &settings);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn cursor_in_the_middle_of_a_token_replaces_that_span() {
        let (catalog, settings) = fixture();
        let line = "/settings extra";
        // Cursor right after "/sett".
        let result = complete(line, 5, &catalog, &settings);
        assert_eq!(result.candidates, vec!["settings"]);
        assert_eq!((result.replace_start, result.replace_end), (1, 5));
    }

    #[test]
    fn completion_does_not_mutate_the_registry() {
        let (catalog, mut settings) = fixture();
        let before: Vec<String> = settings.setting_keys();
        let line = "/set llm:m";
        let _ = complete(line, line.len(), &catalog, &settings);
        let _ = complete(line, line.len(), &catalog, &settings);
        assert_eq!(settings.setting_keys(), before);
        // Still writable afterwards; completion took no locks or state.
        settings
            .set_text("llm", "model", "gpt-4o-mini", AccessLevel::User)
            .unwrap();
    }

    #[test]
    fn completion_after_open_quote_is_tolerant() {
        let (catalog, settings) = fixture();
        let line = "/set \"llm:mo";
        let result = complete(line, line.len(), &catalog, &settings);
        assert!(result.candidates.contains(&"llm:model".to_string()));
    }
}
