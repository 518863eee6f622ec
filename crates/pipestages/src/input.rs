use async_trait::async_trait;
use futures::StreamExt;
use pipecore::config::{self, ConfigMap};
use pipecore::{
    GraphStore, InputSource, Record, RecordStream, Row, StageContext, StageError, Value,
};
use piperuntime::InputFactory;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

pub const QUERY_INPUT_CLASS: &str = "input.query";

/// Input source that pages through a store read query.
///
/// Records are produced lazily, one batch at a time, so processing can
/// begin before the result set is exhausted and no total count is assumed
/// up front.
pub struct QueryInput {
    query: String,
    batch_size: usize,
}

impl QueryInput {
    pub fn from_config(config: &ConfigMap) -> Result<Self, StageError> {
        let query = config::require_str(config, "query")?.trim().to_string();
        if query.is_empty() {
            return Err(StageError::InvalidConfiguration(
                "'query' must not be empty".to_string(),
            ));
        }
        let batch_size = config::u64_or(config, "batch_size", 100)?;
        if batch_size == 0 {
            return Err(StageError::InvalidConfiguration(
                "'batch_size' must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            query,
            batch_size: batch_size as usize,
        })
    }
}

struct PageState {
    store: Arc<dyn GraphStore>,
    query: String,
    batch: usize,
    skip: usize,
    seen: HashSet<String>,
    buffer: VecDeque<Result<Record, StageError>>,
    done: bool,
}

/// Map one row into a record: `id` becomes the record id, the remaining
/// columns become the payload object.
fn record_from_row(row: Row) -> Option<Record> {
    let id = match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => (*id as u64).to_string(),
        _ => {
            tracing::warn!("skipping row without an id column");
            return None;
        }
    };
    let payload: std::collections::HashMap<String, Value> =
        row.into_iter().filter(|(key, _)| key != "id").collect();
    Some(Record::new(id, Value::Object(payload)))
}

impl PageState {
    /// Fetch the next page into the buffer.
    ///
    /// Queries whose predicate excludes already-linked records shrink as
    /// the output stage writes, so fetches restart at the current skip
    /// offset and already-emitted ids are filtered out; the offset only
    /// advances past pages made entirely of records emitted earlier
    /// (failed records keep matching and would otherwise pin the page).
    async fn fetch(&mut self) {
        let mut params = Row::new();
        params.insert("skip".to_string(), Value::from(self.skip as u64));
        params.insert("limit".to_string(), Value::from(self.batch as u64));
        match self.store.read(&self.query, &params).await {
            Err(error) => {
                self.done = true;
                self.buffer
                    .push_back(Err(StageError::Systemic(error.to_string())));
            }
            Ok(rows) => {
                if rows.is_empty() {
                    self.done = true;
                    return;
                }
                let total = rows.len();
                let mut fresh = 0usize;
                for row in rows {
                    if let Some(record) = record_from_row(row) {
                        if self.seen.insert(record.id.clone()) {
                            fresh += 1;
                            self.buffer.push_back(Ok(record));
                        }
                    }
                }
                if fresh == 0 {
                    self.skip += total;
                }
            }
        }
    }
}

#[async_trait]
impl InputSource for QueryInput {
    fn class_name(&self) -> &str {
        QUERY_INPUT_CLASS
    }

    async fn open(&self, ctx: StageContext) -> Result<RecordStream, StageError> {
        // Probe with limit 0 so an unopenable query fails here, as a
        // systemic fault, instead of mid-stream.
        let mut probe = Row::new();
        probe.insert("limit".to_string(), Value::from(0u64));
        ctx.store
            .read(&self.query, &probe)
            .await
            .map_err(|e| StageError::Systemic(e.to_string()))?;
        ctx.events
            .message(format!("query input opened, batch size {}", self.batch_size));

        let state = PageState {
            store: ctx.store.clone(),
            query: self.query.clone(),
            batch: self.batch_size,
            skip: 0,
            seen: HashSet::new(),
            buffer: VecDeque::new(),
            done: false,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                state.fetch().await;
            }
        });
        Ok(stream.boxed())
    }
}

pub struct QueryInputFactory;

impl InputFactory for QueryInputFactory {
    fn class_name(&self) -> &str {
        QUERY_INPUT_CLASS
    }

    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn InputSource>, StageError> {
        Ok(Arc::new(QueryInput::from_config(config)?))
    }
}
