use async_trait::async_trait;
use pipecore::{GraphStore, Row, StoreError, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-process property graph implementing the [`GraphStore`] collaborator.
///
/// The real deployment target is an external transactional graph store;
/// this stand-in gives tests and demos the same contract with a small
/// query form:
///
/// - read:  `nodes:<Label> [unlinked:<REL_TYPE>]` with optional `skip` /
///   `limit` number parameters; rows carry `id` plus the node properties.
/// - write: `link:<REL_TYPE> [label:<Label>]` with parameters `entry_id`
///   (required) and `annotated`; creates a result node and links the
///   entry node to it.
///
/// Every call takes the store lock once, which is the transaction scope:
/// one record's failure cannot roll back another's success.
pub struct MemoryGraph {
    inner: RwLock<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    nodes: BTreeMap<u64, NodeRecord>,
    rels: Vec<RelRecord>,
    next_id: u64,
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: u64,
    pub labels: Vec<String>,
    pub props: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct RelRecord {
    from: u64,
    to: u64,
    rel_type: String,
}

struct ReadQuery {
    label: String,
    unlinked: Option<String>,
}

impl ReadQuery {
    fn parse(query: &str) -> Result<Self, StoreError> {
        let mut label = None;
        let mut unlinked = None;
        for clause in query.split_whitespace() {
            match clause.split_once(':') {
                Some(("nodes", value)) if !value.is_empty() => label = Some(value.to_string()),
                Some(("unlinked", value)) if !value.is_empty() => {
                    unlinked = Some(value.to_string())
                }
                _ => {
                    return Err(StoreError::QuerySyntax(format!(
                        "unrecognized read clause '{}'",
                        clause
                    )))
                }
            }
        }
        let label = label
            .ok_or_else(|| StoreError::QuerySyntax("read query requires 'nodes:<Label>'".into()))?;
        Ok(Self { label, unlinked })
    }
}

struct WriteQuery {
    rel_type: String,
    label: String,
}

impl WriteQuery {
    fn parse(query: &str) -> Result<Self, StoreError> {
        let mut rel_type = None;
        let mut label = None;
        for clause in query.split_whitespace() {
            match clause.split_once(':') {
                Some(("link", value)) if !value.is_empty() => rel_type = Some(value.to_string()),
                Some(("label", value)) if !value.is_empty() => label = Some(value.to_string()),
                _ => {
                    return Err(StoreError::QuerySyntax(format!(
                        "unrecognized write clause '{}'",
                        clause
                    )))
                }
            }
        }
        let rel_type = rel_type
            .ok_or_else(|| StoreError::QuerySyntax("write query requires 'link:<REL>'".into()))?;
        Ok(Self {
            rel_type,
            label: label.unwrap_or_else(|| "Result".to_string()),
        })
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Add a node and return its id
    pub async fn add_node(&self, labels: &[&str], props: HashMap<String, Value>) -> u64 {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.nodes.insert(
            id,
            NodeRecord {
                id,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                props,
            },
        );
        id
    }

    pub async fn node(&self, id: u64) -> Option<NodeRecord> {
        self.inner.read().await.nodes.get(&id).cloned()
    }

    pub async fn node_count(&self, label: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .nodes
            .values()
            .filter(|n| n.labels.iter().any(|l| l == label))
            .count()
    }

    /// All (from, to) pairs for a relationship type, creation order
    pub async fn relationships(&self, rel_type: &str) -> Vec<(u64, u64)> {
        let inner = self.inner.read().await;
        inner
            .rels
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .map(|r| (r.from, r.to))
            .collect()
    }

    pub async fn relationship_count(&self, rel_type: &str) -> usize {
        self.relationships(rel_type).await.len()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn usize_param(params: &Row, key: &str) -> Result<Option<usize>, StoreError> {
    match params.get(key) {
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| StoreError::QuerySyntax(format!("'{}' must be a number", key))),
        None => Ok(None),
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn read(&self, query: &str, params: &Row) -> Result<Vec<Row>, StoreError> {
        let parsed = ReadQuery::parse(query)?;
        let skip = usize_param(params, "skip")?.unwrap_or(0);
        let limit = usize_param(params, "limit")?;

        let inner = self.inner.read().await;
        let rows = inner
            .nodes
            .values()
            .filter(|n| n.labels.iter().any(|l| l == &parsed.label))
            .filter(|n| match &parsed.unlinked {
                Some(rel_type) => !inner
                    .rels
                    .iter()
                    .any(|r| r.from == n.id && &r.rel_type == rel_type),
                None => true,
            })
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .map(|n| {
                let mut row: Row = n.props.clone();
                row.insert("id".to_string(), Value::String(n.id.to_string()));
                row
            })
            .collect();
        Ok(rows)
    }

    async fn write(&self, query: &str, params: &Row) -> Result<u64, StoreError> {
        let parsed = WriteQuery::parse(query)?;
        let entry_id = params
            .get("entry_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::MissingParameter("entry_id".to_string()))?;
        let entry: u64 = entry_id
            .parse()
            .map_err(|_| StoreError::NotFound(format!("entry node '{}'", entry_id)))?;

        let mut inner = self.inner.write().await;
        if !inner.nodes.contains_key(&entry) {
            return Err(StoreError::NotFound(format!("entry node '{}'", entry_id)));
        }

        let mut props = HashMap::new();
        if let Some(annotated) = params.get("annotated") {
            props.insert("annotated".to_string(), annotated.clone());
        }
        let result_id = inner.next_id;
        inner.next_id += 1;
        inner.nodes.insert(
            result_id,
            NodeRecord {
                id: result_id,
                labels: vec![parsed.label.clone()],
                props,
            },
        );
        inner.rels.push(RelRecord {
            from: entry,
            to: result_id,
            rel_type: parsed.rel_type.clone(),
        });
        Ok(1)
    }
}
