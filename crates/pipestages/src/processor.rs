use async_trait::async_trait;
use pipecore::config::{self, ConfigMap};
use pipecore::{ProcessedRecord, Processor, Record, StageContext, StageError, Value};
use piperuntime::ProcessorFactory;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const ANNOTATION_PROCESSOR_CLASS: &str = "processor.annotation";

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

#[derive(Debug, Clone, Copy)]
struct Steps {
    tokenize: bool,
    dependency: bool,
}

/// Processor that annotates text records.
///
/// Recognized configuration: `pipeline` (label recorded on the result,
/// default "tokenizer"), `thread_number` (bounds the internal worker
/// pool, 1..=64, default 4), `stop_words` (comma list; a leading "+"
/// element extends the defaults instead of replacing them),
/// `processing_steps` (object of step name → bool; `tokenize` defaults
/// on, `dependency` off).
///
/// Enabled steps for one record fan out across the worker pool; results
/// are reassembled in a fixed step order, so each record surfaces exactly
/// one deterministic result regardless of completion order.
pub struct AnnotationProcessor {
    pipeline: String,
    stop_words: Arc<HashSet<String>>,
    steps: Steps,
    workers: Arc<Semaphore>,
}

impl AnnotationProcessor {
    pub fn from_config(cfg: &ConfigMap) -> Result<Self, StageError> {
        let pipeline = config::optional_str(cfg, "pipeline")?
            .unwrap_or("tokenizer")
            .to_string();

        let thread_number = config::u64_or(cfg, "thread_number", 4)?;
        if !(1..=64).contains(&thread_number) {
            return Err(StageError::InvalidConfiguration(
                "'thread_number' must be between 1 and 64".to_string(),
            ));
        }

        let stop_words = parse_stop_words(config::optional_str(cfg, "stop_words")?);

        let steps = match config::optional_object(cfg, "processing_steps")? {
            Some(map) => Steps {
                tokenize: config::bool_or(map, "tokenize", true)?,
                dependency: config::bool_or(map, "dependency", false)?,
            },
            None => Steps {
                tokenize: true,
                dependency: false,
            },
        };

        Ok(Self {
            pipeline,
            stop_words: Arc::new(stop_words),
            steps,
            workers: Arc::new(Semaphore::new(thread_number as usize)),
        })
    }
}

/// A leading "+" element extends the default set; otherwise the list
/// replaces it.
fn parse_stop_words(spec: Option<&str>) -> HashSet<String> {
    let mut words: HashSet<String> = HashSet::new();
    let mut extend_defaults = spec.is_none();
    if let Some(spec) = spec {
        for (position, raw) in spec.split(',').enumerate() {
            let word = raw.trim().to_lowercase();
            if position == 0 && word == "+" {
                extend_defaults = true;
                continue;
            }
            if !word.is_empty() {
                words.insert(word);
            }
        }
    }
    if extend_defaults {
        words.extend(DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()));
    }
    words
}

fn clean_token(raw: &str) -> Option<String> {
    let token: String = raw
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn tokenize(text: &str, stop_words: &HashSet<String>) -> Value {
    let tokens = text
        .split_whitespace()
        .filter_map(clean_token)
        .filter(|token| !stop_words.contains(token))
        .map(Value::String)
        .collect();
    Value::Array(tokens)
}

/// Naive chain dependencies over the raw token sequence
fn dependencies(text: &str) -> Value {
    let tokens: Vec<String> = text.split_whitespace().filter_map(clean_token).collect();
    let pairs = tokens
        .windows(2)
        .map(|pair| {
            let mut dep = HashMap::new();
            dep.insert("head".to_string(), Value::String(pair[0].clone()));
            dep.insert("dependent".to_string(), Value::String(pair[1].clone()));
            Value::Object(dep)
        })
        .collect();
    Value::Array(pairs)
}

#[async_trait]
impl Processor for AnnotationProcessor {
    fn class_name(&self) -> &str {
        ANNOTATION_PROCESSOR_CLASS
    }

    async fn process(
        &self,
        record: Record,
        _ctx: &StageContext,
    ) -> Result<ProcessedRecord, StageError> {
        let text = record
            .payload
            .as_object()
            .and_then(|payload| payload.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StageError::Record(format!("record {} has no text payload", record.id))
            })?
            .to_string();

        let mut jobs: Vec<(&'static str, JoinHandle<Value>)> = Vec::new();
        if self.steps.tokenize {
            let permit = acquire_worker(&self.workers).await?;
            let text = text.clone();
            let stop_words = self.stop_words.clone();
            jobs.push((
                "tokens",
                tokio::spawn(async move {
                    let value = tokenize(&text, &stop_words);
                    drop(permit);
                    value
                }),
            ));
        }
        if self.steps.dependency {
            let permit = acquire_worker(&self.workers).await?;
            let text = text.clone();
            jobs.push((
                "dependencies",
                tokio::spawn(async move {
                    let value = dependencies(&text);
                    drop(permit);
                    value
                }),
            ));
        }

        let mut annotation = HashMap::new();
        annotation.insert("pipeline".to_string(), Value::String(self.pipeline.clone()));
        for (step, job) in jobs {
            let value = job
                .await
                .map_err(|e| StageError::Record(format!("step '{}' aborted: {}", step, e)))?;
            annotation.insert(step.to_string(), value);
        }
        Ok(ProcessedRecord::new(record.id, Value::Object(annotation)))
    }
}

async fn acquire_worker(
    workers: &Arc<Semaphore>,
) -> Result<tokio::sync::OwnedSemaphorePermit, StageError> {
    workers
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| StageError::Systemic("worker pool closed".to_string()))
}

pub struct AnnotationProcessorFactory;

impl ProcessorFactory for AnnotationProcessorFactory {
    fn class_name(&self) -> &str {
        ANNOTATION_PROCESSOR_CLASS
    }

    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn Processor>, StageError> {
        Ok(Arc::new(AnnotationProcessor::from_config(config)?))
    }
}
