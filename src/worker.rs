use crate::hash::{ContentHash, hash_reader};
use crate::ingest::ByteSource;
use crate::ingest::images::{BatchId, HashJob, RecordId, UploadJob};
use crate::upload::{ObjectStore, UploadError, UploadRequest, UploadedObject};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub enum IngestJob {
    Hash(HashJob),
    Upload(UploadJob),
}

#[derive(Debug)]
pub enum WorkerEvent {
    Hashed {
        id: RecordId,
        result: Result<ContentHash, String>,
    },
    Uploaded {
        id: RecordId,
        batch: BatchId,
        result: Result<UploadedObject, UploadError>,
    },
}

/// Where the session sends blocking work, and where it polls for results.
pub trait JobDispatcher {
    fn dispatch(&self, job: IngestJob);
    fn try_recv_event(&self) -> Option<WorkerEvent>;
}

/// Runs one job to completion on the calling thread.
pub fn run_job(job: IngestJob, store: &dyn ObjectStore) -> WorkerEvent {
    match job {
        IngestJob::Hash(HashJob { id, source }) => WorkerEvent::Hashed {
            id,
            result: hash_source(&source),
        },
        IngestJob::Upload(job) => {
            let result = job
                .source
                .read_all()
                .map_err(|err| UploadError::Read(err.to_string()))
                .and_then(|bytes| {
                    store.upload(&UploadRequest {
                        file_name: job.file_name.clone(),
                        bytes,
                        public_id: job.public_id.clone(),
                    })
                });
            WorkerEvent::Uploaded {
                id: job.id,
                batch: job.batch,
                result,
            }
        }
    }
}

fn hash_source(source: &ByteSource) -> Result<ContentHash, String> {
    source
        .open()
        .and_then(hash_reader)
        .map_err(|err| err.to_string())
}

/// Spawns a thread per job and funnels results back over one channel.
pub struct IngestWorker {
    store: Arc<dyn ObjectStore>,
    event_tx: Sender<WorkerEvent>,
    event_rx: Receiver<WorkerEvent>,
}

impl IngestWorker {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            store,
            event_tx,
            event_rx,
        }
    }
}

impl JobDispatcher for IngestWorker {
    fn dispatch(&self, job: IngestJob) {
        let store = Arc::clone(&self.store);
        let event_tx = self.event_tx.clone();
        trace!(?job, "dispatching ingest job");
        thread::spawn(move || {
            let event = run_job(job, store.as_ref());
            if event_tx.send(event).is_err() {
                debug!("ingest result dropped; receiver gone");
            }
        });
    }

    fn try_recv_event(&self) -> Option<WorkerEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Runs each job synchronously at dispatch time and queues its result.
pub struct InlineDispatcher {
    store: Arc<dyn ObjectStore>,
    events: RefCell<VecDeque<WorkerEvent>>,
}

impl InlineDispatcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            events: RefCell::new(VecDeque::new()),
        }
    }
}

impl JobDispatcher for InlineDispatcher {
    fn dispatch(&self, job: IngestJob) {
        let event = run_job(job, self.store.as_ref());
        self.events.borrow_mut().push_back(event);
    }

    fn try_recv_event(&self) -> Option<WorkerEvent> {
        self.events.borrow_mut().pop_front()
    }
}
