//! The execution context: shared state flowing through a workflow run.
//!
//! The context starts from the trigger payload plus engine-reserved keys
//! and accumulates node outputs as the traversal proceeds. Each completed
//! node writes its full result under `node_{id}` and, when the result has
//! an `output` field, a convenience copy under `node_{id}_output`.

use crate::node::NodeId;
use relaycrm_core::{ExecutionId, WorkflowId};
use serde_json::{Map, Value as JsonValue};

/// Looks up a dotted path inside a JSON value.
///
/// Path segments index into objects by key; a segment that parses as an
/// integer also indexes into arrays.
#[must_use]
pub fn path_lookup<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable state shared by all nodes of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    values: Map<String, JsonValue>,
}

impl ExecutionContext {
    /// Seeds a fresh context from the trigger payload.
    ///
    /// Object payloads are flattened into top-level keys; anything else is
    /// stored under `trigger_data`. Engine-reserved keys are written last
    /// so a trigger payload cannot shadow them.
    #[must_use]
    pub fn seed(
        trigger_data: JsonValue,
        tenant_schema: &str,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
    ) -> Self {
        let mut values = match trigger_data {
            JsonValue::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("trigger_data".to_string(), other);
                map
            }
        };
        values.insert(
            "tenant_schema".to_string(),
            JsonValue::String(tenant_schema.to_string()),
        );
        values.insert(
            "execution_id".to_string(),
            JsonValue::String(execution_id.to_string()),
        );
        values.insert(
            "workflow_id".to_string(),
            JsonValue::String(workflow_id.to_string()),
        );
        Self { values }
    }

    /// Restores a context from a persisted snapshot.
    ///
    /// Non-object snapshots (which the engine never writes) yield an empty
    /// context rather than corrupting state.
    #[must_use]
    pub fn from_snapshot(snapshot: JsonValue) -> Self {
        match snapshot {
            JsonValue::Object(values) => Self { values },
            _ => Self { values: Map::new() },
        }
    }

    /// Returns the value stored under a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// Resolves a dotted path against the context.
    #[must_use]
    pub fn lookup_path(&self, path: &str) -> Option<&JsonValue> {
        match path.split_once('.') {
            None => self.values.get(path),
            Some((head, rest)) => path_lookup(self.values.get(head)?, rest),
        }
    }

    /// Sets a top-level key.
    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.values.insert(key.into(), value);
    }

    /// Records a completed node's result under the namespaced keys.
    pub fn insert_node_output(&mut self, node_id: &NodeId, result: JsonValue) {
        if let Some(output) = result.get("output") {
            self.values
                .insert(format!("node_{node_id}_output"), output.clone());
        }
        self.values.insert(format!("node_{node_id}"), result);
    }

    /// Merges an object's entries into the context, overwriting on clash.
    ///
    /// Non-object values are ignored.
    pub fn merge(&mut self, patch: JsonValue) {
        if let JsonValue::Object(map) = patch {
            for (key, value) in map {
                self.values.insert(key, value);
            }
        }
    }

    /// Snapshot of the whole context for persistence.
    #[must_use]
    pub fn snapshot(&self) -> JsonValue {
        JsonValue::Object(self.values.clone())
    }

    /// Snapshot without the namespaced node outputs.
    ///
    /// Used where the context is shown to humans (approval requests) and
    /// for default webhook payloads.
    #[must_use]
    pub fn sanitized(&self) -> JsonValue {
        let trimmed: Map<String, JsonValue> = self
            .values
            .iter()
            .filter(|(key, _)| !key.starts_with("node_"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        JsonValue::Object(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded(trigger: JsonValue) -> ExecutionContext {
        ExecutionContext::seed(trigger, "tenant_acme", ExecutionId::new(), WorkflowId::new())
    }

    #[test]
    fn object_trigger_data_is_flattened() {
        let ctx = seeded(json!({"lead_email": "lead@example.com", "score": 72}));
        assert_eq!(ctx.get("lead_email"), Some(&json!("lead@example.com")));
        assert_eq!(ctx.get("score"), Some(&json!(72)));
    }

    #[test]
    fn scalar_trigger_data_is_wrapped() {
        let ctx = seeded(json!("ping"));
        assert_eq!(ctx.get("trigger_data"), Some(&json!("ping")));
    }

    #[test]
    fn trigger_payload_cannot_shadow_reserved_keys() {
        let ctx = seeded(json!({"tenant_schema": "evil"}));
        assert_eq!(ctx.get("tenant_schema"), Some(&json!("tenant_acme")));
    }

    #[test]
    fn node_output_is_namespaced() {
        let mut ctx = seeded(json!({}));
        ctx.insert_node_output(
            &NodeId::new("draft"),
            json!({"success": true, "output": "Hello!"}),
        );

        assert_eq!(
            ctx.get("node_draft"),
            Some(&json!({"success": true, "output": "Hello!"}))
        );
        assert_eq!(ctx.get("node_draft_output"), Some(&json!("Hello!")));
    }

    #[test]
    fn results_without_output_field_skip_the_convenience_key() {
        let mut ctx = seeded(json!({}));
        ctx.insert_node_output(&NodeId::new("n"), json!({"success": true}));
        assert!(ctx.get("node_n_output").is_none());
    }

    #[test]
    fn dotted_path_traverses_objects_and_arrays() {
        let mut ctx = seeded(json!({}));
        ctx.insert("lead", json!({"emails": [{"address": "a@b.c"}]}));

        assert_eq!(
            ctx.lookup_path("lead.emails.0.address"),
            Some(&json!("a@b.c"))
        );
        assert!(ctx.lookup_path("lead.emails.5.address").is_none());
        assert!(ctx.lookup_path("lead.missing").is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let mut ctx = seeded(json!({"a": 1}));
        ctx.insert_node_output(&NodeId::new("x"), json!({"output": 2}));

        let restored = ExecutionContext::from_snapshot(ctx.snapshot());
        assert_eq!(restored, ctx);
    }

    #[test]
    fn sanitized_drops_node_outputs() {
        let mut ctx = seeded(json!({"lead_email": "lead@example.com"}));
        ctx.insert_node_output(&NodeId::new("x"), json!({"output": "secret draft"}));

        let clean = ctx.sanitized();
        assert!(clean.get("node_x").is_none());
        assert!(clean.get("node_x_output").is_none());
        assert_eq!(clean.get("lead_email"), Some(&json!("lead@example.com")));
    }
}
