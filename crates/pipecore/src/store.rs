use crate::error::StoreError;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;

/// One row returned by a store query, column name → value.
pub type Row = HashMap<String, Value>;

/// External transactional store accessed by input and output stages.
///
/// Each call is scoped to its own transaction, so one record's failure
/// cannot roll back another record's success. Query strings are opaque to
/// the engine and interpreted by the store implementation.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a read query and return the matching rows.
    async fn read(&self, query: &str, params: &Row) -> Result<Vec<Row>, StoreError>;

    /// Run a write query and return the number of entities written.
    async fn write(&self, query: &str, params: &Row) -> Result<u64, StoreError>;
}
