//! The session is the single owner of everything the viewer holds: the three
//! intake flows, the submitted content, navigation, the resolver and the
//! background. Blocking work goes out through a [`JobDispatcher`] and comes
//! back as [`WorkerEvent`]s applied on the caller's thread.

use crate::color::{self, BackgroundSurface, ColorSynchronizer, Rgb};
use crate::config::Settings;
use crate::ingest::audio::AudioLyricsIntake;
use crate::ingest::breakdown::BreakdownIntake;
use crate::ingest::images::{BatchOutcome, BatchReport, ImageIntake};
use crate::ingest::{DroppedFile, Rejection, SubmitError, expand_drop};
use crate::lyrics::LyricsDocument;
use crate::model::{AudioSources, BreakdownMap, BreakdownSegment, ImageSourceMap, Pane, Slide};
use crate::navigation::{self, NavEvent, Navigator};
use crate::playback::{DisplayScale, PlaybackWidget};
use crate::resolver::BreakdownResolver;
use crate::worker::{IngestJob, JobDispatcher, WorkerEvent};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info, warn};

pub const SEEK_STEP_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Audio,
    Images,
    Breakdown,
}

impl FromStr for Flow {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "audio" | "lyrics" => Ok(Self::Audio),
            "images" | "image" => Ok(Self::Images),
            "breakdown" => Ok(Self::Breakdown),
            other => Err(format!("unknown flow {other:?} (audio, images, breakdown)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Markdown(String),
    Image { name: String, url: Option<String> },
}

/// Segment content in display order: markdown first when `mBelow` is set,
/// images first otherwise.
pub fn content_blocks(segment: &BreakdownSegment, images: &ImageSourceMap) -> Vec<ContentBlock> {
    let markdown = segment
        .markdown_blocks()
        .iter()
        .map(|block| ContentBlock::Markdown(block.clone()));
    let pictures = segment.image_names().iter().map(|name| ContentBlock::Image {
        name: name.clone(),
        url: images.get(name).map(str::to_string),
    });
    if segment.markdown_first() {
        markdown.chain(pictures).collect()
    } else {
        pictures.chain(markdown).collect()
    }
}

pub struct LyrixSession {
    audio_intake: AudioLyricsIntake,
    image_intake: ImageIntake,
    breakdown_intake: BreakdownIntake,
    sources: AudioSources,
    lyrics: Option<LyricsDocument>,
    breakdown: BreakdownMap,
    images: ImageSourceMap,
    images_loaded: bool,
    last_batch: Option<BatchReport>,
    navigator: Navigator,
    resolver: BreakdownResolver,
    colors: ColorSynchronizer,
    background: BackgroundSurface,
    first_entry_armed: bool,
    player: Box<dyn PlaybackWidget>,
    dispatcher: Box<dyn JobDispatcher>,
    scale: DisplayScale,
    pub status: String,
    pub dirty: bool,
}

impl LyrixSession {
    pub fn new(
        settings: &Settings,
        player: Box<dyn PlaybackWidget>,
        dispatcher: Box<dyn JobDispatcher>,
    ) -> Self {
        let (colors, background) = color::channel(color::default_background());
        Self {
            audio_intake: AudioLyricsIntake::new(settings.audio_policy()),
            image_intake: ImageIntake::new(settings.image_policy()),
            breakdown_intake: BreakdownIntake::new(settings.breakdown_policy()),
            sources: AudioSources::default(),
            lyrics: None,
            breakdown: BreakdownMap::default(),
            images: ImageSourceMap::default(),
            images_loaded: false,
            last_batch: None,
            navigator: Navigator::default(),
            resolver: BreakdownResolver::default(),
            colors,
            background,
            first_entry_armed: true,
            player,
            dispatcher,
            scale: DisplayScale::default(),
            status: String::from("Drop audio, lyrics, images and a breakdown to begin"),
            dirty: true,
        }
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
        self.dirty = true;
    }

    pub fn mount_surface(&mut self) {
        self.background.mount();
    }

    pub fn unmount_surface(&mut self) {
        self.background.unmount();
    }

    pub fn drop_paths(&mut self, flow: Flow, paths: &[PathBuf]) {
        let (files, unreadable) = expand_drop(paths);
        self.drop_files(flow, files, unreadable);
    }

    pub fn drop_files(&mut self, flow: Flow, files: Vec<DroppedFile>, unreadable: Vec<Rejection>) {
        let dropped = files.len() + unreadable.len();
        match flow {
            Flow::Audio => {
                self.audio_intake.on_drop(files);
                self.audio_intake.push_rejections(unreadable);
            }
            Flow::Breakdown => {
                self.breakdown_intake.on_drop(files);
                self.breakdown_intake.push_rejections(unreadable);
            }
            Flow::Images => {
                let jobs = self.image_intake.on_drop(files);
                self.image_intake.push_rejections(unreadable);
                for job in jobs {
                    self.dispatcher.dispatch(IngestJob::Hash(job));
                }
            }
        }
        let rejected = self.rejected_count(flow);
        self.set_status(&format!(
            "{dropped} file(s) dropped on {flow:?}; {rejected} rejected"
        ));
    }

    fn rejected_count(&self, flow: Flow) -> usize {
        match flow {
            Flow::Audio => self.audio_intake.rejected().len(),
            Flow::Images => self.image_intake.rejected().len(),
            Flow::Breakdown => self.breakdown_intake.rejected().len(),
        }
    }

    pub fn submit(&mut self, flow: Flow) {
        match flow {
            Flow::Audio => self.submit_audio(),
            Flow::Images => self.submit_images(),
            Flow::Breakdown => self.submit_breakdown(),
        }
    }

    fn submit_audio(&mut self) {
        let submission = match self.audio_intake.submit() {
            Ok(submission) => submission,
            Err(err) => {
                warn!(code = err.code(), "audio submit refused: {err}");
                self.set_status(&format!("Audio not submitted: {err}"));
                return;
            }
        };

        if let Err(err) = self
            .player
            .load(submission.lyrics.clone(), &submission.audio, self.scale)
        {
            error!("playback load failed: {err:#}");
            self.set_status(&format!("Audio could not be played: {err:#}"));
            return;
        }

        self.sources = AudioSources {
            title: submission.title.clone(),
            audio_url: submission.audio.preview.clone(),
            lyrics: submission.lyrics.text().to_string(),
        };
        self.lyrics = Some(submission.lyrics);
        self.set_status(&format!("Loaded \"{}\"", submission.title));
    }

    fn submit_images(&mut self) {
        match self.image_intake.submit() {
            Ok(submission) => {
                let count = submission.jobs.len();
                for job in submission.jobs {
                    self.dispatcher.dispatch(IngestJob::Upload(job));
                }
                self.set_status(&format!("Uploading {count} image(s)"));
            }
            Err(err) => self.set_status(&format!("Images not submitted: {err}")),
        }
    }

    fn submit_breakdown(&mut self) {
        match self.breakdown_intake.submit() {
            Ok(map) => {
                info!(segments = map.len(), "breakdown submitted");
                let segments = map.len();
                self.breakdown = map;
                self.resolver.reset();
                self.first_entry_armed = true;
                self.set_status(&format!("Breakdown loaded ({segments} segments)"));
                if self.navigator.pane() != Pane::Intro {
                    self.enter_presentation();
                }
            }
            Err(err) => self.set_status(&format!("Breakdown not submitted: {err}")),
        }
    }

    /// Re-uploads images whose last attempt failed retryably.
    pub fn retry(&mut self) {
        match self.image_intake.retry_failed() {
            Ok(submission) => {
                let count = submission.jobs.len();
                for job in submission.jobs {
                    self.dispatcher.dispatch(IngestJob::Upload(job));
                }
                self.set_status(&format!("Retrying {count} image upload(s)"));
            }
            Err(SubmitError::UploadInProgress) => {
                self.set_status("Uploads still in flight; retry once they settle")
            }
            Err(_) => self.set_status("No failed uploads to retry"),
        }
    }

    pub fn remove(&mut self, flow: Flow, name: &str) {
        let removed = match flow {
            Flow::Audio => self.audio_intake.remove(name),
            Flow::Breakdown => self.breakdown_intake.remove(name),
            Flow::Images => {
                let held = self.image_intake.contains(name);
                if let Some(report) = self.image_intake.remove(name) {
                    self.apply_batch_report(report);
                }
                self.images = self.image_intake.sources().clone();
                held
            }
        };
        if removed {
            self.set_status(&format!("Removed {name}"));
        } else {
            self.set_status(&format!("No file named {name}"));
        }
    }

    pub fn dismiss(&mut self, flow: Flow, name: &str) {
        let dismissed = match flow {
            Flow::Audio => self.audio_intake.remove_rejected(name),
            Flow::Images => self.image_intake.remove_rejected(name),
            Flow::Breakdown => self.breakdown_intake.remove_rejected(name),
        };
        if dismissed {
            self.set_status(&format!("Dismissed {name}"));
        } else {
            self.set_status(&format!("No rejected file named {name}"));
        }
    }

    /// Removes every image and every image rejection.
    pub fn clear_images(&mut self) {
        self.image_intake.remove_all();
        self.images = self.image_intake.sources().clone();
        self.images_loaded = false;
        self.set_status("Images cleared");
    }

    pub fn pump_worker(&mut self) {
        while let Some(event) = self.dispatcher.try_recv_event() {
            self.apply_worker_event(event);
        }
    }

    pub fn apply_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Hashed { id, result } => {
                self.image_intake.on_hash_complete(id, result);
                self.dirty = true;
            }
            WorkerEvent::Uploaded { id, batch, result } => {
                let report = self.image_intake.on_upload_complete(id, batch, result);
                self.dirty = true;
                if let Some(report) = report {
                    self.apply_batch_report(report);
                }
            }
        }
    }

    fn apply_batch_report(&mut self, report: BatchReport) {
        self.images = self.image_intake.sources().clone();
        let status = match report.outcome() {
            BatchOutcome::Complete if report.succeeded.is_empty() => {
                info!(withdrawn = report.withdrawn, "upload batch withdrawn");
                format!("Upload withdrawn ({} file(s) removed)", report.withdrawn)
            }
            BatchOutcome::Complete => {
                self.images_loaded = true;
                let missing = self.unresolved_images();
                if missing > 0 {
                    warn!(missing, "breakdown references images that were not uploaded");
                }
                format!(
                    "Images ready ({} uploaded, {missing} referenced but missing)",
                    report.succeeded.len()
                )
            }
            BatchOutcome::Partial => format!(
                "{} of {} images uploaded; {} retryable (:retry)",
                report.succeeded.len(),
                report.succeeded.len() + report.failed.len(),
                report.retryable_failures()
            ),
            BatchOutcome::Failed => format!(
                "Image upload failed for {} file(s); {} retryable",
                report.failed.len(),
                report.retryable_failures()
            ),
        };
        self.last_batch = Some(report);
        self.set_status(&status);
    }

    /// Image names the breakdown references that have no resolved URL.
    pub fn unresolved_images(&self) -> usize {
        self.breakdown
            .image_references()
            .filter(|name| self.images.get(name).is_none())
            .count()
    }

    pub fn is_ready(&self) -> bool {
        navigation::is_ready(&self.sources, &self.breakdown)
    }

    pub fn slide(&mut self, slide: Slide, now_ms: u64) {
        let ready = self.is_ready();
        let Some(request) = self.navigator.request(slide, ready, now_ms) else {
            if self.navigator.pane() == Pane::Intro && slide == Slide::Right && !ready {
                self.set_status("Load audio, lyrics and a breakdown first");
            }
            return;
        };

        if request.to == Pane::Content {
            self.enter_presentation();
        }
        self.dirty = true;
    }

    /// Line changes are not followed outside the presentation pane, so the
    /// resolver catches up with the player here. The active segment's colour
    /// is sent when the segment moved or the first-entry colour is armed.
    fn enter_presentation(&mut self) {
        let mut moved = false;
        if self.lyrics.is_some() {
            let line = self.player.current_line();
            match self.resolver.on_line_change(line, &self.breakdown) {
                Ok(next) => moved = next.is_some(),
                Err(err) => self.set_status(&format!("Breakdown error: {err}")),
            }
        }
        if (moved || self.first_entry_armed)
            && self.colors.apply_segment(&self.breakdown, self.resolver.active())
        {
            self.first_entry_armed = false;
        }
    }

    /// Feeds one line-change notification through the resolver.
    pub fn on_line_change(&mut self, line: i64) {
        match self.resolver.on_line_change(line, &self.breakdown) {
            Ok(Some(index)) => {
                self.colors.apply_segment(&self.breakdown, index);
                self.dirty = true;
            }
            Ok(None) => {}
            Err(err) => self.set_status(&format!("Breakdown error: {err}")),
        }
    }

    /// Advances every time-driven part of the session to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        self.pump_worker();

        for event in self.navigator.tick(now_ms) {
            if let NavEvent::Committed { to, .. } = event {
                self.status = format!("{} pane", to.label());
            }
            self.dirty = true;
        }

        if self.navigator.pane() != Pane::Intro
            && let Some(line) = self.player.poll_line_change()
        {
            self.on_line_change(line);
            self.dirty = true;
        }

        if self.background.pump(now_ms).is_some() || self.background.is_fading(now_ms) {
            self.dirty = true;
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.lyrics.is_none() {
            return;
        }
        let paused = self.player.toggle_pause();
        self.set_status(if paused { "Paused" } else { "Playing" });
    }

    pub fn seek_by(&mut self, delta_ms: i64) {
        if self.lyrics.is_none() {
            return;
        }
        if let Err(err) = self.player.seek_by(delta_ms) {
            self.set_status(&format!("Seek failed: {err:#}"));
        } else {
            self.dirty = true;
        }
    }

    pub fn pane(&self) -> Pane {
        self.navigator.pane()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn sources(&self) -> &AudioSources {
        &self.sources
    }

    pub fn lyrics(&self) -> Option<&LyricsDocument> {
        self.lyrics.as_ref()
    }

    pub fn breakdown(&self) -> &BreakdownMap {
        &self.breakdown
    }

    pub fn images(&self) -> &ImageSourceMap {
        &self.images
    }

    pub fn audio_intake(&self) -> &AudioLyricsIntake {
        &self.audio_intake
    }

    pub fn image_intake(&self) -> &ImageIntake {
        &self.image_intake
    }

    pub fn breakdown_intake(&self) -> &BreakdownIntake {
        &self.breakdown_intake
    }

    pub fn last_batch(&self) -> Option<&BatchReport> {
        self.last_batch.as_ref()
    }

    pub fn player(&self) -> &dyn PlaybackWidget {
        self.player.as_ref()
    }

    pub fn active_index(&self) -> u32 {
        self.resolver.active()
    }

    pub fn active_segment(&self) -> Option<&BreakdownSegment> {
        self.breakdown.get(self.resolver.active())
    }

    pub fn active_blocks(&self) -> Vec<ContentBlock> {
        self.active_segment()
            .map(|segment| content_blocks(segment, &self.images))
            .unwrap_or_default()
    }

    pub fn background_color(&self, now_ms: u64) -> Rgb {
        self.background.color_at(now_ms)
    }

    pub fn images_loaded(&self) -> bool {
        self.images_loaded
    }

    pub fn audio_loaded(&self) -> bool {
        self.sources.is_loaded()
    }

    pub fn breakdown_loaded(&self) -> bool {
        !self.breakdown.is_default_placeholder()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.navigator.next_deadline()
    }
}
