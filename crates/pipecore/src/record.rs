use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One unit of work flowing from an input through a processor to an output.
///
/// The id is application-defined (typically the originating node id in the
/// backing store) and is the only identity a record carries within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub payload: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

/// Result of processing one record, still keyed by the originating id so
/// the output stage can link it back regardless of completion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedRecord {
    pub id: String,
    pub result: Value,
}

impl ProcessedRecord {
    pub fn new(id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
        }
    }
}
