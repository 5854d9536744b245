//! Update pipeline: interceptors wrapped around a terminal handler.
//!
//! A [`Pipeline`] owns an ordered list of [`Middleware`] and one
//! [`UpdateHandler`]. Each middleware receives the update together with a
//! [`Next`] continuation and decides what happens around it; the first
//! middleware added is the outermost.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use teloxide::types::{Update, UpdateKind};
use tracing::{info, warn};

use crate::metrics::Metrics;

pub type HandlerResult = anyhow::Result<()>;

/// Terminal step of the pipeline.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: &Update) -> HandlerResult;
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, update: &Update, next: Next<'_>) -> HandlerResult;
}

/// The rest of the chain, as seen from inside a middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn UpdateHandler,
}

impl<'a> Next<'a> {
    pub fn run(self, update: &'a Update) -> BoxFuture<'a, HandlerResult> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    chain: rest,
                    endpoint: self.endpoint,
                };
                middleware.handle(update, next)
            }
            None => self.endpoint.handle(update),
        }
    }
}

pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn UpdateHandler>,
}

impl Pipeline {
    pub fn new(endpoint: Arc<dyn UpdateHandler>) -> Self {
        Self {
            middleware: Vec::new(),
            endpoint,
        }
    }

    pub fn add_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub async fn dispatch(&self, update: &Update) -> HandlerResult {
        Next {
            chain: &self.middleware,
            endpoint: self.endpoint.as_ref(),
        }
        .run(update)
        .await
    }
}

pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// JSON form of an update with every unset field dropped, plus the
/// event-type label it was received under.
#[derive(Debug, Clone)]
pub struct UpdateDump {
    pub event_type: String,
    pub json: String,
}

impl UpdateDump {
    pub fn capture(update: &Update) -> Self {
        let value = match &update.kind {
            // teloxide keeps updates it could not parse as raw JSON; dump
            // those as received instead of the bare `update_id`.
            UpdateKind::Error(raw) => {
                let mut fields = raw.as_object().cloned().unwrap_or_default();
                fields.insert("update_id".to_string(), Value::from(update.id.0));
                strip_unset(Value::Object(fields))
            }
            _ => match serde_json::to_value(update) {
                Ok(value) => strip_unset(value),
                Err(e) => {
                    warn!(update_id = update.id.0, "Failed to serialize update: {}", e);
                    Value::Null
                }
            },
        };
        Self {
            event_type: event_type(&value),
            json: value.to_string(),
        }
    }
}

/// The update category is the one top-level key besides `update_id`.
fn event_type(value: &Value) -> String {
    value
        .as_object()
        .and_then(|fields| fields.keys().find(|k| k.as_str() != "update_id"))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string())
}

fn strip_unset(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_unset(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_unset).collect()),
        other => other,
    }
}

/// Times every update by event type and logs it as JSON once the rest of
/// the chain has succeeded.
pub struct UpdatesDumper {
    metrics: Metrics,
}

impl UpdatesDumper {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for UpdatesDumper {
    async fn handle(&self, update: &Update, next: Next<'_>) -> HandlerResult {
        let started = Instant::now();
        let dump = UpdateDump::capture(update);
        let _timer = self
            .metrics
            .request_time()
            .start_timer_at(&dump.event_type, started);

        next.run(update).await?;
        info!("{}", dump.json);
        Ok(())
    }
}
