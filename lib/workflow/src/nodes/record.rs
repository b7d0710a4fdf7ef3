//! Record CRUD nodes and the CRM record store seam.
//!
//! Records are schemaless JSON objects keyed by `(record_type, id)`; the
//! store guarantees every record carries its `id` field.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use ulid::Ulid;

/// Record store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// No record with the given type and ID.
    NotFound {
        /// The record type.
        record_type: String,
        /// The missing ID.
        id: String,
    },
    /// The backing storage failed.
    Storage {
        /// What the storage reported.
        message: String,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { record_type, id } => {
                write!(f, "{record_type} record not found: {id}")
            }
            Self::Storage { message } => write!(f, "record storage failure: {message}"),
        }
    }
}

impl Error for RecordError {}

fn map_record_error(error: RecordError) -> ProcessorError {
    match error {
        RecordError::NotFound { .. } => ProcessorError::validation(error.to_string()),
        RecordError::Storage { message } => ProcessorError::provider(message),
    }
}

/// CRM record persistence seam.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates a record, returning it with its assigned `id`.
    async fn create(&self, record_type: &str, fields: JsonValue) -> Result<JsonValue, RecordError>;

    /// Applies field updates to a record, returning the updated record.
    async fn update(
        &self,
        record_type: &str,
        id: &str,
        fields: JsonValue,
    ) -> Result<JsonValue, RecordError>;

    /// Deletes a record.
    async fn delete(&self, record_type: &str, id: &str) -> Result<(), RecordError>;

    /// Finds records whose fields equal every entry of `filter`.
    async fn find(
        &self,
        record_type: &str,
        filter: JsonValue,
    ) -> Result<Vec<JsonValue>, RecordError>;
}

/// In-memory `RecordStore` used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(String, String), JsonValue>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record_type: &str, fields: JsonValue) -> Result<JsonValue, RecordError> {
        let id = Ulid::new().to_string();
        let mut record = match fields {
            JsonValue::Object(map) => map,
            other => {
                return Err(RecordError::Storage {
                    message: format!("record fields must be an object, got {other}"),
                });
            }
        };
        record.insert("id".to_string(), json!(id));
        let record = JsonValue::Object(record);
        self.records
            .lock()
            .expect("record lock poisoned")
            .insert((record_type.to_string(), id), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record_type: &str,
        id: &str,
        fields: JsonValue,
    ) -> Result<JsonValue, RecordError> {
        let mut records = self.records.lock().expect("record lock poisoned");
        let key = (record_type.to_string(), id.to_string());
        let Some(record) = records.get_mut(&key) else {
            return Err(RecordError::NotFound {
                record_type: record_type.to_string(),
                id: id.to_string(),
            });
        };
        if let (JsonValue::Object(existing), JsonValue::Object(updates)) = (record, fields) {
            for (field, value) in updates {
                if field != "id" {
                    existing.insert(field, value);
                }
            }
        }
        Ok(records[&key].clone())
    }

    async fn delete(&self, record_type: &str, id: &str) -> Result<(), RecordError> {
        let removed = self
            .records
            .lock()
            .expect("record lock poisoned")
            .remove(&(record_type.to_string(), id.to_string()));
        if removed.is_none() {
            return Err(RecordError::NotFound {
                record_type: record_type.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find(
        &self,
        record_type: &str,
        filter: JsonValue,
    ) -> Result<Vec<JsonValue>, RecordError> {
        let records = self.records.lock().expect("record lock poisoned");
        let empty = serde_json::Map::new();
        let filter = filter.as_object().unwrap_or(&empty);
        Ok(records
            .iter()
            .filter(|((rt, _), _)| rt == record_type)
            .filter(|(_, record)| {
                filter
                    .iter()
                    .all(|(field, expected)| record.get(field) == Some(expected))
            })
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RecordCreateConfig {
    record_type: String,
    fields: JsonValue,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::RecordCreate`].
pub struct RecordCreateProcessor {
    records: Arc<dyn RecordStore>,
}

impl RecordCreateProcessor {
    /// Creates the processor.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NodeProcessor for RecordCreateProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: RecordCreateConfig = parse_config(node)?;
        let fields = template::resolve_value(&config.fields, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let record = self
            .records
            .create(&config.record_type, fields)
            .await
            .map_err(map_record_error)?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "record": record,
            "record_type": config.record_type,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct RecordUpdateConfig {
    record_type: String,
    /// Templated; typically points at an upstream output like
    /// `{node_find_output.id}`.
    record_id: String,
    fields: JsonValue,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::RecordUpdate`].
pub struct RecordUpdateProcessor {
    records: Arc<dyn RecordStore>,
}

impl RecordUpdateProcessor {
    /// Creates the processor.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NodeProcessor for RecordUpdateProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: RecordUpdateConfig = parse_config(node)?;
        let id = template::resolve(&config.record_id, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let fields = template::resolve_value(&config.fields, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let record = self
            .records
            .update(&config.record_type, &id, fields)
            .await
            .map_err(map_record_error)?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "record": record,
            "record_type": config.record_type,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct RecordDeleteConfig {
    record_type: String,
    record_id: String,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::RecordDelete`].
pub struct RecordDeleteProcessor {
    records: Arc<dyn RecordStore>,
}

impl RecordDeleteProcessor {
    /// Creates the processor.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NodeProcessor for RecordDeleteProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: RecordDeleteConfig = parse_config(node)?;
        let id = template::resolve(&config.record_id, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        self.records
            .delete(&config.record_type, &id)
            .await
            .map_err(map_record_error)?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "deleted_id": id,
            "record_type": config.record_type,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct RecordFindConfig {
    record_type: String,
    #[serde(default)]
    filter: JsonValue,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::RecordFind`].
pub struct RecordFindProcessor {
    records: Arc<dyn RecordStore>,
}

impl RecordFindProcessor {
    /// Creates the processor.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NodeProcessor for RecordFindProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: RecordFindConfig = parse_config(node)?;
        let filter = template::resolve_value(&config.filter, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let found = self
            .records
            .find(&config.record_type, filter)
            .await
            .map_err(map_record_error)?;

        // First match doubles as `output` so downstream templates can use
        // `{node_x_output.id}` without indexing.
        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "count": found.len(),
            "records": found,
            "output": found.first().cloned().unwrap_or(JsonValue::Null),
        })))
    }

    fn supports_replay(&self) -> bool {
        true
    }
}
