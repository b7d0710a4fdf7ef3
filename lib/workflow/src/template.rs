//! `{placeholder}` template resolution against the execution context.
//!
//! Placeholders are dotted context paths in single braces, e.g.
//! `"Hi {lead.first_name}, re: {node_draft_output}"`. Resolution is strict
//! by default: an unresolvable placeholder is an error. Nodes opt into
//! best-effort mode per config, which leaves the raw placeholder in place
//! and logs a warning.

use crate::context::ExecutionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;

/// How unresolvable placeholders are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// Unresolvable placeholders fail the node.
    #[default]
    Strict,
    /// Unresolvable placeholders pass through verbatim, with a warning.
    BestEffort,
}

/// Template resolution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A placeholder path did not resolve in strict mode.
    MissingKey {
        /// The unresolved path.
        key: String,
    },
    /// A `{` with no matching `}`.
    UnclosedPlaceholder {
        /// The template text.
        template: String,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { key } => {
                write!(f, "template placeholder does not resolve: {{{key}}}")
            }
            Self::UnclosedPlaceholder { template } => {
                write!(f, "unclosed placeholder in template: {template:?}")
            }
        }
    }
}

impl Error for TemplateError {}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolves every placeholder in `template` against the context.
pub fn resolve(
    template: &str,
    ctx: &ExecutionContext,
    mode: TemplateMode,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            return Err(TemplateError::UnclosedPlaceholder {
                template: template.to_string(),
            });
        };
        let key = &after_open[..close];
        match ctx.lookup_path(key) {
            Some(value) => out.push_str(&render(value)),
            None => match mode {
                TemplateMode::Strict => {
                    return Err(TemplateError::MissingKey {
                        key: key.to_string(),
                    });
                }
                TemplateMode::BestEffort => {
                    tracing::warn!(placeholder = key, "leaving unresolved template placeholder");
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            },
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Recursively resolves template strings inside a JSON value.
///
/// Strings are templated; objects and arrays are walked; other values pass
/// through unchanged.
pub fn resolve_value(
    value: &JsonValue,
    ctx: &ExecutionContext,
    mode: TemplateMode,
) -> Result<JsonValue, TemplateError> {
    match value {
        JsonValue::String(s) => Ok(JsonValue::String(resolve(s, ctx, mode)?)),
        JsonValue::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_value(entry, ctx, mode)?);
            }
            Ok(JsonValue::Object(resolved))
        }
        JsonValue::Array(items) => {
            let resolved: Result<Vec<JsonValue>, TemplateError> = items
                .iter()
                .map(|item| resolve_value(item, ctx, mode))
                .collect();
            Ok(JsonValue::Array(resolved?))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycrm_core::{ExecutionId, WorkflowId};
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::seed(
            json!({"lead": {"first_name": "Ada", "score": 72}}),
            "tenant_acme",
            ExecutionId::new(),
            WorkflowId::new(),
        );
        ctx.insert("greeting", json!("Hello"));
        ctx
    }

    #[test]
    fn resolves_dotted_paths() {
        let resolved = resolve("{greeting} {lead.first_name}!", &ctx(), TemplateMode::Strict)
            .expect("resolve");
        assert_eq!(resolved, "Hello Ada!");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let resolved =
            resolve("score={lead.score}", &ctx(), TemplateMode::Strict).expect("resolve");
        assert_eq!(resolved, "score=72");
    }

    #[test]
    fn strict_mode_fails_on_missing_key() {
        let result = resolve("Hi {nobody}", &ctx(), TemplateMode::Strict);
        assert_eq!(
            result,
            Err(TemplateError::MissingKey {
                key: "nobody".to_string()
            })
        );
    }

    #[test]
    fn best_effort_leaves_placeholder_verbatim() {
        let resolved = resolve("Hi {nobody}!", &ctx(), TemplateMode::BestEffort).expect("resolve");
        assert_eq!(resolved, "Hi {nobody}!");
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        let result = resolve("Hi {oops", &ctx(), TemplateMode::Strict);
        assert!(matches!(result, Err(TemplateError::UnclosedPlaceholder { .. })));
    }

    #[test]
    fn template_without_placeholders_passes_through() {
        let resolved = resolve("plain text", &ctx(), TemplateMode::Strict).expect("resolve");
        assert_eq!(resolved, "plain text");
    }

    #[test]
    fn resolve_value_walks_nested_structures() {
        let resolved = resolve_value(
            &json!({
                "to": "{lead.first_name}",
                "tags": ["{greeting}", 42],
                "flag": true
            }),
            &ctx(),
            TemplateMode::Strict,
        )
        .expect("resolve");

        assert_eq!(
            resolved,
            json!({"to": "Ada", "tags": ["Hello", 42], "flag": true})
        );
    }
}
