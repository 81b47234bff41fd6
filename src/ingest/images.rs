//! Multi-file image intake.
//!
//! Records live in an arena keyed by [`RecordId`] and are only ever updated by
//! building a new record and swapping it in. Hash and upload results arrive as
//! messages carrying the record id (and, for uploads, the [`BatchId`]), so a
//! result for a removed record or a superseded batch is simply dropped.

use super::{
    AcceptPolicy, ByteSource, DroppedFile, MediaAsset, Rejection, RejectionList, SubmitError,
    file_stem, same_file_name,
};
use crate::hash::ContentHash;
use crate::model::ImageSourceMap;
use crate::upload::{UploadError, UploadedObject, format_public_id};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashState {
    Pending,
    Ready(ContentHash),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    InFlight { batch: BatchId },
    Uploaded { url: String },
    Failed { error: UploadError },
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub asset: MediaAsset,
    pub hash: HashState,
    pub upload: UploadState,
}

impl ImageRecord {
    pub fn logical_name(&self) -> &str {
        file_stem(&self.asset.name)
    }

    fn with_hash(&self, hash: HashState) -> Self {
        Self {
            hash,
            ..self.clone()
        }
    }

    fn with_upload(&self, upload: UploadState) -> Self {
        Self {
            upload,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HashJob {
    pub id: RecordId,
    pub source: ByteSource,
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: RecordId,
    pub batch: BatchId,
    pub file_name: String,
    pub source: ByteSource,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub file_name: String,
    pub error: UploadError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Complete,
    Partial,
    Failed,
}

/// Settled result of one submit: every submitted file that was not removed
/// in the meantime appears in exactly one of the two lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch: BatchId,
    pub succeeded: Vec<UploadedImage>,
    pub failed: Vec<FailedUpload>,
    pub withdrawn: usize,
}

impl BatchReport {
    pub fn outcome(&self) -> BatchOutcome {
        if self.failed.is_empty() {
            BatchOutcome::Complete
        } else if self.succeeded.is_empty() {
            BatchOutcome::Failed
        } else {
            BatchOutcome::Partial
        }
    }

    pub fn retryable_failures(&self) -> usize {
        self.failed
            .iter()
            .filter(|failure| failure.error.is_retryable())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub batch: BatchId,
    pub jobs: Vec<UploadJob>,
}

#[derive(Debug, Clone)]
struct BatchState {
    id: BatchId,
    outstanding: BTreeSet<RecordId>,
    succeeded: Vec<UploadedImage>,
    failed: Vec<FailedUpload>,
    withdrawn: usize,
}

impl BatchState {
    fn settle(self) -> BatchReport {
        BatchReport {
            batch: self.id,
            succeeded: self.succeeded,
            failed: self.failed,
            withdrawn: self.withdrawn,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageIntake {
    policy: AcceptPolicy,
    records: BTreeMap<RecordId, ImageRecord>,
    rejected: RejectionList,
    sources: ImageSourceMap,
    batch: Option<BatchState>,
    next_record: u64,
    next_batch: u64,
}

impl ImageIntake {
    pub fn new(policy: AcceptPolicy) -> Self {
        Self {
            policy,
            records: BTreeMap::new(),
            rejected: RejectionList::default(),
            sources: ImageSourceMap::default(),
            batch: None,
            next_record: 1,
            next_batch: 1,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = (RecordId, &ImageRecord)> + '_ {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn record(&self, id: RecordId) -> Option<&ImageRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejected(&self) -> &RejectionList {
        &self.rejected
    }

    pub fn sources(&self) -> &ImageSourceMap {
        &self.sources
    }

    pub fn in_flight(&self) -> Option<BatchId> {
        self.batch.as_ref().map(|batch| batch.id)
    }

    fn find(&self, name: &str) -> Option<RecordId> {
        self.records
            .iter()
            .find(|(_, record)| same_file_name(&record.asset.name, name))
            .map(|(id, _)| *id)
    }

    /// Appends accepted files not already held and returns the hash work
    /// for them. A second drop of an existing filename is ignored.
    pub fn on_drop(&mut self, files: Vec<DroppedFile>) -> Vec<HashJob> {
        let outcome = self.policy.classify(files);
        if !outcome.rejected.is_empty() {
            self.rejected.extend(outcome.rejected);
        }

        let mut jobs = Vec::new();
        for file in outcome.accepted {
            if self.find(&file.name).is_some() {
                debug!(file = %file.name, "duplicate image name ignored");
                continue;
            }
            let id = RecordId(self.next_record);
            self.next_record += 1;

            let asset = MediaAsset::from(file);
            jobs.push(HashJob {
                id,
                source: asset.source.clone(),
            });
            self.records.insert(
                id,
                ImageRecord {
                    asset,
                    hash: HashState::Pending,
                    upload: UploadState::Idle,
                },
            );
        }
        jobs
    }

    /// Hash results for unknown records (removed since) are ignored.
    pub fn on_hash_complete(&mut self, id: RecordId, result: Result<ContentHash, String>) {
        let Some(record) = self.records.get(&id) else {
            debug!(?id, "hash result for removed image ignored");
            return;
        };
        let next = match result {
            Ok(hash) => {
                debug!(file = %record.asset.name, %hash, "image hashed");
                record.with_hash(HashState::Ready(hash))
            }
            Err(err) => {
                warn!(file = %record.asset.name, "image hash failed: {err}");
                record.with_hash(HashState::Failed(err))
            }
        };
        self.records.insert(id, next);
    }

    /// Starts a batch over every held image. A batch still in flight is
    /// superseded and its late results are ignored.
    pub fn submit(&mut self) -> Result<Submission, SubmitError> {
        let ids: Vec<_> = self.records.keys().copied().collect();
        self.start_batch(ids)
    }

    /// Starts a batch over the images whose last upload failed retryably.
    /// Refused while a batch is still in flight.
    pub fn retry_failed(&mut self) -> Result<Submission, SubmitError> {
        if let Some(batch) = &self.batch {
            debug!(
                batch = batch.id.0,
                outstanding = batch.outstanding.len(),
                "retry refused while batch in flight"
            );
            return Err(SubmitError::UploadInProgress);
        }
        let ids: Vec<_> = self
            .records
            .iter()
            .filter(|(_, record)| {
                matches!(&record.upload, UploadState::Failed { error } if error.is_retryable())
            })
            .map(|(id, _)| *id)
            .collect();
        self.start_batch(ids)
    }

    fn start_batch(&mut self, ids: Vec<RecordId>) -> Result<Submission, SubmitError> {
        if ids.is_empty() {
            return Err(SubmitError::NothingToSubmit);
        }
        if let Some(previous) = self.batch.take() {
            warn!(
                batch = previous.id.0,
                outstanding = previous.outstanding.len(),
                "superseding unsettled upload batch"
            );
        }

        let batch = BatchId(self.next_batch);
        self.next_batch += 1;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            let hash = match &record.hash {
                HashState::Ready(hash) => Some(hash),
                _ => None,
            };
            jobs.push(UploadJob {
                id: *id,
                batch,
                file_name: record.asset.name.clone(),
                source: record.asset.source.clone(),
                public_id: format_public_id(record.logical_name(), hash),
            });
            let next = record.with_upload(UploadState::InFlight { batch });
            self.records.insert(*id, next);
        }

        info!(batch = batch.0, files = jobs.len(), "image upload batch started");
        self.batch = Some(BatchState {
            id: batch,
            outstanding: jobs.iter().map(|job| job.id).collect(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            withdrawn: 0,
        });
        Ok(Submission { batch, jobs })
    }

    /// Applies one upload result. Returns the batch report exactly once, on
    /// the result that settles the batch.
    pub fn on_upload_complete(
        &mut self,
        id: RecordId,
        batch: BatchId,
        result: Result<UploadedObject, UploadError>,
    ) -> Option<BatchReport> {
        let Some(state) = self.batch.as_mut().filter(|state| state.id == batch) else {
            debug!(?id, batch = batch.0, "upload result for stale batch ignored");
            return None;
        };
        if !state.outstanding.remove(&id) {
            debug!(?id, batch = batch.0, "upload result for settled record ignored");
            return None;
        }
        let record = self.records.get(&id)?;

        let next = match result {
            Ok(uploaded) => {
                let name = record.logical_name().to_string();
                if !self.sources.insert_resolved(&name, &uploaded.secure_url) {
                    warn!(
                        %name,
                        url = %uploaded.secure_url,
                        "image name already resolved; keeping first url"
                    );
                }
                state.succeeded.push(UploadedImage {
                    name,
                    url: uploaded.secure_url.clone(),
                });
                let mut next = record.with_upload(UploadState::Uploaded {
                    url: uploaded.secure_url.clone(),
                });
                next.asset.preview = uploaded.secure_url;
                next
            }
            Err(error) => {
                warn!(
                    file = %record.asset.name,
                    code = error.code(),
                    retryable = error.is_retryable(),
                    "image upload failed: {error}"
                );
                state.failed.push(FailedUpload {
                    file_name: record.asset.name.clone(),
                    error: error.clone(),
                });
                record.with_upload(UploadState::Failed { error })
            }
        };
        self.records.insert(id, next);
        self.settle_if_done()
    }

    fn settle_if_done(&mut self) -> Option<BatchReport> {
        if !self
            .batch
            .as_ref()
            .is_some_and(|state| state.outstanding.is_empty())
        {
            return None;
        }
        let report = self.batch.take()?.settle();
        info!(
            batch = report.batch.0,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            withdrawn = report.withdrawn,
            "image upload batch settled"
        );
        Some(report)
    }

    /// Removes an image. If it was the last outstanding upload of the
    /// current batch, the batch settles and its report is returned.
    pub fn remove(&mut self, name: &str) -> Option<BatchReport> {
        let id = self.find(name)?;
        let record = self.records.remove(&id)?;
        debug!(file = name, "image removed");
        self.forget_source(&record);

        let state = self.batch.as_mut()?;
        if state.outstanding.remove(&id) {
            state.withdrawn += 1;
            return self.settle_if_done();
        }
        None
    }

    /// Drops the resolved url a removed record published. Another held
    /// record with the same logical name takes over its own url, if any.
    fn forget_source(&mut self, removed: &ImageRecord) {
        let UploadState::Uploaded { url } = &removed.upload else {
            return;
        };
        let name = removed.logical_name();
        if self.sources.get(name) != Some(url.as_str()) {
            return;
        }
        self.sources.remove(name);

        let survivor = self.records.values().find_map(|record| match &record.upload {
            UploadState::Uploaded { url } if record.logical_name() == name => Some(url.clone()),
            _ => None,
        });
        if let Some(url) = survivor {
            self.sources.insert_resolved(name, &url);
        }
        debug!(%name, "resolved image url dropped");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Drops every image, every rejection, every resolved url and any
    /// unsettled batch.
    pub fn remove_all(&mut self) {
        self.records.clear();
        self.rejected.clear();
        self.sources.clear();
        self.batch = None;
    }

    pub fn remove_rejected(&mut self, name: &str) -> bool {
        self.rejected.remove(name)
    }

    pub fn push_rejections(&mut self, rejections: Vec<Rejection>) {
        self.rejected.extend(rejections);
    }
}
