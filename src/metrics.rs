//! Prometheus metrics for the update pipeline.
//!
//! The registry is owned by [`Metrics`] and handed to whoever records or
//! exposes samples; nothing here is global.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType, Summary};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const REQUEST_TIME_NAME: &str = "request_processing_seconds";
pub const REQUEST_TIME_HELP: &str = "Time spent processing request";
pub const EVENT_TYPE_LABEL: &str = "event_type";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummarySnapshot {
    pub count: u64,
    pub sum: f64,
}

/// A summary (count + sum, no quantiles) partitioned by a single label.
#[derive(Clone)]
pub struct SummaryVec {
    desc: Desc,
    label: String,
    series: Arc<Mutex<BTreeMap<String, SummarySnapshot>>>,
}

impl SummaryVec {
    pub fn new(name: &str, help: &str, label: &str) -> prometheus::Result<Self> {
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            vec![label.to_string()],
            HashMap::new(),
        )?;
        Ok(Self {
            desc,
            label: label.to_string(),
            series: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    pub fn observe(&self, label_value: &str, seconds: f64) {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = series.entry(label_value.to_string()).or_default();
        entry.count += 1;
        entry.sum += seconds;
    }

    /// Timer measuring from `started` that records into `label_value` when
    /// dropped.
    pub fn start_timer_at(&self, label_value: &str, started: Instant) -> SummaryTimer {
        SummaryTimer {
            summary: self.clone(),
            label_value: label_value.to_string(),
            started,
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self, label_value: &str) -> SummarySnapshot {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.get(label_value).copied().unwrap_or_default()
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        if series.is_empty() {
            return Vec::new();
        }

        let metrics: Vec<Metric> = series
            .iter()
            .map(|(value, snapshot)| {
                let mut pair = LabelPair::default();
                pair.set_name(self.label.clone());
                pair.set_value(value.clone());

                let mut summary = Summary::default();
                summary.set_sample_count(snapshot.count);
                summary.set_sample_sum(snapshot.sum);

                let mut metric = Metric::default();
                metric.set_label(vec![pair].into());
                metric.set_summary(summary);
                metric
            })
            .collect();

        let mut family = MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.set_metric(metrics.into());
        vec![family]
    }
}

/// Records the elapsed wall-clock time on drop, including when the timed
/// future errors or is cancelled.
pub struct SummaryTimer {
    summary: SummaryVec,
    label_value: String,
    started: Instant,
}

impl Drop for SummaryTimer {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.summary.observe(&self.label_value, elapsed);
    }
}

/// Shared handle to the process metric registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    request_time: SummaryVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let request_time = SummaryVec::new(REQUEST_TIME_NAME, REQUEST_TIME_HELP, EVENT_TYPE_LABEL)?;
        registry.register(Box::new(request_time.clone()))?;
        Ok(Self {
            registry,
            request_time,
        })
    }

    pub fn request_time(&self) -> &SummaryVec {
        &self.request_time
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }
}

async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    let body = match metrics.gather() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to gather metrics: {:#}", e);
            String::new()
        }
    };
    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body)
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Any path other than `/health` serves the exposition.
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .fallback(metrics_handler)
        .with_state(metrics)
}

/// Bind the metrics endpoint and serve it on a background task.
///
/// Returns the bound address, which differs from `addr` when port 0 was
/// requested.
pub async fn start_metrics_server(
    metrics: Metrics,
    addr: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read metrics endpoint address")?;

    info!(addr = %local_addr, "Starting metrics server");

    let app = router(metrics);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    Ok((local_addr, handle))
}
