use async_trait::async_trait;
use pipecore::config::{self, ConfigMap};
use pipecore::{OutputSink, ProcessedRecord, Row, StageContext, StageError, Value};
use piperuntime::OutputFactory;
use std::sync::Arc;

pub const STORE_LINK_OUTPUT_CLASS: &str = "output.store_link";

/// Output sink that persists each processed record through a store write
/// query, linking the result back to its originating record by id.
///
/// The query receives `entry_id` (the record id) and `annotated` (the
/// processing result) as parameters. One write call per record, each in
/// its own transaction.
pub struct StoreLinkOutput {
    query: String,
}

impl StoreLinkOutput {
    pub fn from_config(cfg: &ConfigMap) -> Result<Self, StageError> {
        let query = config::require_str(cfg, "query")?.trim().to_string();
        if query.is_empty() {
            return Err(StageError::InvalidConfiguration(
                "'query' must not be empty".to_string(),
            ));
        }
        Ok(Self { query })
    }
}

#[async_trait]
impl OutputSink for StoreLinkOutput {
    fn class_name(&self) -> &str {
        STORE_LINK_OUTPUT_CLASS
    }

    async fn write(&self, record: ProcessedRecord, ctx: &StageContext) -> Result<(), StageError> {
        let mut params = Row::new();
        params.insert("entry_id".to_string(), Value::String(record.id.clone()));
        params.insert("annotated".to_string(), record.result);
        let written = ctx.store.write(&self.query, &params).await?;
        if written == 0 {
            return Err(StageError::Record(format!(
                "no entities written for record {}",
                record.id
            )));
        }
        Ok(())
    }
}

pub struct StoreLinkOutputFactory;

impl OutputFactory for StoreLinkOutputFactory {
    fn class_name(&self) -> &str {
        STORE_LINK_OUTPUT_CLASS
    }

    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn OutputSink>, StageError> {
        Ok(Arc::new(StoreLinkOutput::from_config(config)?))
    }
}
