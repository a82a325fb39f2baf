use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use serde_json::Value;
use starchart_logging::chart_debug;
use thiserror::Error;

use crate::normalize::normalize_dataset;
use crate::CanonicalDataset;

pub type RequestId = u64;

/// Message posted to the background worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    Normalize { id: RequestId, payload: Value },
}

/// Per-request answer from the background worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Success {
        id: RequestId,
        payload: CanonicalDataset,
    },
    Error {
        id: RequestId,
        error: String,
    },
}

impl WorkerReply {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerReply::Success { id, .. } | WorkerReply::Error { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Reply(WorkerReply),
    /// Channel-level failure: the worker will not answer any outstanding request.
    Fault(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("background worker unavailable: {0}")]
    Unavailable(String),
    #[error("background worker channel closed")]
    Disconnected,
}

/// Where a worker reports replies and faults.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<WorkerEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// Returns false once nobody is listening any more.
    pub fn emit(&self, event: WorkerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// A running background execution context.
pub trait Worker: Send {
    fn post(&self, request: WorkerRequest) -> Result<(), WorkerError>;
}

/// Starts background workers; an environment without one returns `Unavailable`.
pub trait WorkerFactory: Send + Sync {
    fn start(&self, events: EventSink) -> Result<Box<dyn Worker>, WorkerError>;
}

/// Runs normalization on a dedicated OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadWorkerFactory;

impl WorkerFactory for ThreadWorkerFactory {
    fn start(&self, events: EventSink) -> Result<Box<dyn Worker>, WorkerError> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>();
        thread::Builder::new()
            .name("starchart-normalizer".into())
            .spawn(move || {
                while let Ok(request) = request_rx.recv() {
                    if !events.emit(WorkerEvent::Reply(handle_request(request))) {
                        break;
                    }
                }
                chart_debug!("Normalizer worker thread exiting");
            })
            .map_err(|err| WorkerError::Unavailable(err.to_string()))?;
        Ok(Box::new(ThreadWorker { request_tx }))
    }
}

struct ThreadWorker {
    request_tx: mpsc::Sender<WorkerRequest>,
}

impl Worker for ThreadWorker {
    fn post(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.request_tx
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }
}

fn handle_request(request: WorkerRequest) -> WorkerReply {
    match request {
        WorkerRequest::Normalize { id, payload } => {
            match panic::catch_unwind(AssertUnwindSafe(|| normalize_dataset(&payload))) {
                Ok(payload) => WorkerReply::Success { id, payload },
                Err(_) => WorkerReply::Error {
                    id,
                    error: "normalization panicked".to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_worker_replies_with_normalized_payload() {
        let (tx, rx) = mpsc::channel();
        let worker = ThreadWorkerFactory.start(EventSink::new(tx)).unwrap();
        let payload = json!({ "systems": { "sol": {} }, "system_pixels": { "sol": [3, 4] } });

        worker
            .post(WorkerRequest::Normalize {
                id: 9,
                payload: payload.clone(),
            })
            .unwrap();

        let event = rx.recv().unwrap();
        assert_eq!(
            event,
            WorkerEvent::Reply(WorkerReply::Success {
                id: 9,
                payload: normalize_dataset(&payload),
            })
        );
    }
}
