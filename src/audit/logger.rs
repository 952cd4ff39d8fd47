//! Queue-backed audit writer.

use axum::http::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::AuditConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{AuditRecord, AuditRepository};

/// Hands audit records to background writers without ever waiting.
///
/// When the queue is full the new record is dropped (DROP-NEW), logged at
/// warn and counted in `gateway_audit_dropped_total`.
#[derive(Clone)]
pub struct AuditLogger {
    tx: Option<mpsc::Sender<AuditRecord>>,
}

impl AuditLogger {
    /// Spawn `config.workers` writers. Returns a disabled logger when
    /// auditing is off.
    pub fn start(
        repository: Arc<dyn AuditRepository>,
        config: &AuditConfig,
        shutdown: &Shutdown,
    ) -> (Self, Vec<JoinHandle<()>>) {
        if !config.enabled {
            tracing::info!("Audit logging disabled");
            return (Self::disabled(), Vec::new());
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    rx.clone(),
                    repository.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Audit logger started"
        );
        (Self { tx: Some(tx) }, handles)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueue without blocking. Returns `false` if the record was dropped.
    pub fn record(&self, record: AuditRecord) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                tracing::warn!(request_id = %record.request_id, "Audit queue full, dropping record");
                metrics::record_audit_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                tracing::warn!(request_id = %record.request_id, "Audit writers stopped, dropping record");
                metrics::record_audit_dropped();
                false
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<AuditRecord>>>,
    repository: Arc<dyn AuditRepository>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                record = rx.recv() => record,
                _ = shutdown.recv() => {
                    let mut drained = 0usize;
                    while let Ok(record) = rx.try_recv() {
                        persist(repository.as_ref(), &record).await;
                        drained += 1;
                    }
                    tracing::info!(worker, drained, "Audit worker received shutdown signal, exiting loop");
                    return;
                }
            }
        };

        match next {
            Some(record) => persist(repository.as_ref(), &record).await,
            None => break,
        }
    }
}

async fn persist(repository: &dyn AuditRepository, record: &AuditRecord) {
    if let Err(e) = repository.save_audit_record(record).await {
        tracing::error!(request_id = %record.request_id, error = %e, "Failed to persist audit record");
    }
}

/// Serialize headers as `{"name": ["v1", "v2"]}` with names in sorted order.
pub fn headers_to_json(headers: &HeaderMap) -> String {
    let mut map: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}
