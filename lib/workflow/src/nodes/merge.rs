//! Merge-data node: combines values from paths, literals, and templates.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

/// Where a merge input comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MergeSource {
    /// A dotted context path.
    Path(String),
    /// A literal value, possibly containing template strings.
    Literal {
        /// The value.
        literal: JsonValue,
    },
}

/// How sources fold together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Shallow object merge, later sources win on key clash.
    #[default]
    Combine,
    /// The last non-null source replaces everything before it.
    Override,
    /// Arrays concatenate; non-arrays are wrapped first.
    AppendLists,
    /// Shallow object merge, earlier sources win on key clash.
    PreserveExisting,
    /// Recursive merge: objects merge deep, arrays concatenate,
    /// scalars last-wins.
    NestedMerge,
}

#[derive(Debug, Deserialize)]
struct MergeConfig {
    sources: Vec<MergeSource>,
    #[serde(default)]
    strategy: MergeStrategy,
    /// Extra top-level context key to store the merged value under.
    #[serde(default)]
    output_key: Option<String>,
    #[serde(default)]
    template_mode: TemplateMode,
}

fn shallow_merge(into: &mut Map<String, JsonValue>, from: JsonValue, overwrite: bool) {
    if let JsonValue::Object(map) = from {
        for (key, value) in map {
            if overwrite || !into.contains_key(&key) {
                into.insert(key, value);
            }
        }
    }
}

fn nested_merge(into: JsonValue, from: JsonValue) -> JsonValue {
    match (into, from) {
        (JsonValue::Object(mut a), JsonValue::Object(b)) => {
            for (key, value) in b {
                let merged = match a.remove(&key) {
                    Some(existing) => nested_merge(existing, value),
                    None => value,
                };
                a.insert(key, merged);
            }
            JsonValue::Object(a)
        }
        (JsonValue::Array(mut a), JsonValue::Array(b)) => {
            a.extend(b);
            JsonValue::Array(a)
        }
        (_, from) => from,
    }
}

fn as_list(value: JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items,
        JsonValue::Null => Vec::new(),
        other => vec![other],
    }
}

/// Processor for [`crate::node::NodeType::MergeData`].
#[derive(Debug, Default)]
pub struct MergeDataProcessor;

impl MergeDataProcessor {
    fn resolve_sources(
        config: &MergeConfig,
        ctx: &ExecutionContext,
    ) -> Result<Vec<JsonValue>, ProcessorError> {
        config
            .sources
            .iter()
            .map(|source| match source {
                MergeSource::Path(path) => {
                    Ok(ctx.lookup_path(path).cloned().unwrap_or(JsonValue::Null))
                }
                MergeSource::Literal { literal } => {
                    template::resolve_value(literal, ctx, config.template_mode)
                        .map_err(|e| ProcessorError::validation(e.to_string()))
                }
            })
            .collect()
    }

    fn fold(strategy: MergeStrategy, resolved: Vec<JsonValue>) -> JsonValue {
        match strategy {
            MergeStrategy::Combine => {
                let mut merged = Map::new();
                for value in resolved {
                    shallow_merge(&mut merged, value, true);
                }
                JsonValue::Object(merged)
            }
            MergeStrategy::PreserveExisting => {
                let mut merged = Map::new();
                for value in resolved {
                    shallow_merge(&mut merged, value, false);
                }
                JsonValue::Object(merged)
            }
            MergeStrategy::Override => resolved
                .into_iter()
                .filter(|v| !v.is_null())
                .next_back()
                .unwrap_or(JsonValue::Null),
            MergeStrategy::AppendLists => {
                let mut merged = Vec::new();
                for value in resolved {
                    merged.extend(as_list(value));
                }
                JsonValue::Array(merged)
            }
            MergeStrategy::NestedMerge => {
                let mut merged = JsonValue::Object(Map::new());
                for value in resolved {
                    merged = nested_merge(merged, value);
                }
                merged
            }
        }
    }
}

#[async_trait]
impl NodeProcessor for MergeDataProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: MergeConfig = parse_config(node)?;
        let resolved = Self::resolve_sources(&config, ctx)?;
        let merged = Self::fold(config.strategy, resolved);

        if let Some(key) = &config.output_key {
            ctx.insert(key.clone(), merged.clone());
        }
        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "merged": merged,
        })))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: MergeConfig = parse_config(node)?;
        if config.sources.is_empty() {
            return Err(ProcessorError::validation("merge requires at least one source"));
        }
        Ok(())
    }
}
