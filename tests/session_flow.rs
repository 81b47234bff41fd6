use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lyrix::audio::SilentAudioEngine;
use lyrix::color::Rgb;
use lyrix::config::Settings;
use lyrix::ingest::DroppedFile;
use lyrix::ingest::images::BatchOutcome;
use lyrix::model::{Pane, Slide};
use lyrix::playback::LyricsPlayer;
use lyrix::session::{ContentBlock, Flow, LyrixSession};
use lyrix::upload::{ObjectStore, UploadError, UploadRequest, UploadedObject};
use lyrix::worker::InlineDispatcher;

const LYRICS: &str = "[00:00.00]\n[01:00.00]first verse\n[02:00.00]chorus\n[03:00.00]outro";
const BREAKDOWN: &str = r##"{
    "0": {"color": "#112233", "markdown": ["intro notes"]},
    "2": {"color": "#ff0000", "image": ["cover"], "markdown": ["chorus notes"], "mBelow": true}
}"##;

struct CdnStore;

impl ObjectStore for CdnStore {
    fn upload(&self, request: &UploadRequest) -> Result<UploadedObject, UploadError> {
        let public_id = request
            .public_id
            .clone()
            .unwrap_or_else(|| request.file_name.clone());
        Ok(UploadedObject {
            secure_url: format!("https://cdn.test/{public_id}"),
            public_id,
        })
    }
}

/// Fails the first upload of `flaky.png` with a 503, then behaves.
struct FlakyStore {
    failed_once: AtomicBool,
}

impl ObjectStore for FlakyStore {
    fn upload(&self, request: &UploadRequest) -> Result<UploadedObject, UploadError> {
        if request.file_name == "flaky.png" && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(UploadError::Status {
                code: 503,
                body: String::from("busy"),
            });
        }
        CdnStore.upload(request)
    }
}

fn session_with(store: Arc<dyn ObjectStore>) -> LyrixSession {
    let mut session = LyrixSession::new(
        &Settings::default(),
        Box::new(LyricsPlayer::new(Box::new(SilentAudioEngine::new()))),
        Box::new(InlineDispatcher::new(store)),
    );
    session.mount_surface();
    session
}

fn load_audio_and_breakdown(session: &mut LyrixSession) {
    session.drop_files(
        Flow::Audio,
        vec![DroppedFile::from_bytes("Mural.mp3", vec![0_u8; 32])],
        Vec::new(),
    );
    session.drop_files(
        Flow::Audio,
        vec![DroppedFile::from_bytes("Mural.lrc", LYRICS.as_bytes().to_vec())],
        Vec::new(),
    );
    session.submit(Flow::Audio);
    assert_eq!(session.sources().title, "Mural");

    session.drop_files(
        Flow::Breakdown,
        vec![DroppedFile::from_bytes("mural.bkdn", BREAKDOWN.as_bytes().to_vec())],
        Vec::new(),
    );
    session.submit(Flow::Breakdown);
    assert!(session.breakdown_loaded());
}

#[test]
fn full_session_reaches_content_and_follows_lyrics() {
    let mut session = session_with(Arc::new(CdnStore));
    assert!(!session.is_ready());

    load_audio_and_breakdown(&mut session);
    assert!(session.is_ready());

    session.drop_files(
        Flow::Images,
        vec![DroppedFile::from_bytes("cover.png", b"png-bytes".to_vec())],
        Vec::new(),
    );
    session.pump_worker();
    session.submit(Flow::Images);
    session.pump_worker();

    assert!(session.images_loaded());
    assert_eq!(session.unresolved_images(), 0);
    let url = session.images().get("cover").expect("cover resolved");
    assert!(url.starts_with("https://cdn.test/cover~"));

    session.slide(Slide::Right, 1_000);
    session.tick(1_000);
    assert_eq!(session.pane(), Pane::Intro);
    session.tick(1_300);
    assert_eq!(session.pane(), Pane::Content);
    assert_eq!(session.background_color(2_000), Rgb::new(0x11, 0x22, 0x33));

    session.on_line_change(2);
    assert_eq!(session.active_index(), 2);
    session.tick(3_000);
    assert_eq!(session.background_color(3_700), Rgb::new(0xff, 0, 0));

    let blocks = session.active_blocks();
    assert_eq!(blocks[0], ContentBlock::Markdown(String::from("chorus notes")));
    assert!(matches!(&blocks[1], ContentBlock::Image { name, url: Some(_) } if name == "cover"));

    // A line before the first key keeps the current segment.
    session.on_line_change(-1);
    assert_eq!(session.active_index(), 2);
    session.on_line_change(1);
    assert_eq!(session.active_index(), 0);
}

#[test]
fn first_entry_colour_is_applied_once() {
    let mut session = session_with(Arc::new(CdnStore));
    load_audio_and_breakdown(&mut session);

    session.slide(Slide::Right, 0);
    session.tick(0);
    session.tick(1_000);
    assert_eq!(session.pane(), Pane::Content);
    assert_eq!(session.background_color(1_000), Rgb::new(0x11, 0x22, 0x33));

    session.on_line_change(2);
    session.tick(2_000);
    assert_eq!(session.background_color(3_000), Rgb::new(0xff, 0, 0));

    session.slide(Slide::Left, 4_000);
    session.tick(5_000);
    assert_eq!(session.pane(), Pane::Intro);
    session.slide(Slide::Right, 6_000);
    session.tick(7_000);
    assert_eq!(session.pane(), Pane::Content);
    assert_eq!(session.background_color(8_000), Rgb::new(0xff, 0, 0));
}

#[test]
fn retry_completes_a_partial_batch() {
    let mut session = session_with(Arc::new(FlakyStore {
        failed_once: AtomicBool::new(false),
    }));
    session.drop_files(
        Flow::Images,
        vec![
            DroppedFile::from_bytes("steady.png", b"a".to_vec()),
            DroppedFile::from_bytes("flaky.png", b"b".to_vec()),
        ],
        Vec::new(),
    );
    session.pump_worker();
    session.submit(Flow::Images);
    session.pump_worker();

    let report = session.last_batch().expect("first batch settled");
    assert_eq!(report.outcome(), BatchOutcome::Partial);
    assert_eq!(report.retryable_failures(), 1);
    assert!(!session.images_loaded());
    assert!(session.status.contains(":retry"));
    assert!(session.images().get("steady").is_some());
    assert!(session.images().get("flaky").is_none());

    session.retry();
    session.pump_worker();

    let report = session.last_batch().expect("retry settled");
    assert_eq!(report.outcome(), BatchOutcome::Complete);
    assert!(session.images_loaded());
    assert!(session.images().get("steady").is_some());
    assert!(session.images().get("flaky").is_some());
}

#[test]
fn removing_the_last_outstanding_image_settles_the_batch() {
    struct NeverStore;
    impl ObjectStore for NeverStore {
        fn upload(&self, _request: &UploadRequest) -> Result<UploadedObject, UploadError> {
            Err(UploadError::Network(String::from("offline")))
        }
    }

    let mut session = session_with(Arc::new(NeverStore));
    session.drop_files(
        Flow::Images,
        vec![DroppedFile::from_bytes("only.png", b"x".to_vec())],
        Vec::new(),
    );
    session.submit(Flow::Images);
    session.remove(Flow::Images, "only.png");

    let report = session.last_batch().expect("settled by removal");
    assert_eq!(report.withdrawn, 1);
    assert_eq!(report.outcome(), BatchOutcome::Complete);
    assert!(!session.images_loaded());

    // The queued network failure belongs to a settled batch.
    session.pump_worker();
    assert_eq!(session.last_batch().map(|report| report.withdrawn), Some(1));
}

#[test]
fn removed_images_stop_resolving_and_can_be_replaced() {
    let mut session = session_with(Arc::new(CdnStore));
    load_audio_and_breakdown(&mut session);
    session.drop_files(
        Flow::Images,
        vec![DroppedFile::from_bytes("cover.png", b"first".to_vec())],
        Vec::new(),
    );
    session.pump_worker();
    session.submit(Flow::Images);
    session.pump_worker();
    let first = session.images().get("cover").expect("uploaded").to_string();

    session.remove(Flow::Images, "cover.png");
    assert!(session.images().get("cover").is_none());
    assert_eq!(session.unresolved_images(), 1);

    session.drop_files(
        Flow::Images,
        vec![DroppedFile::from_bytes("cover.png", b"second".to_vec())],
        Vec::new(),
    );
    session.pump_worker();
    session.submit(Flow::Images);
    session.pump_worker();
    let second = session.images().get("cover").expect("re-uploaded");
    assert_ne!(second, first);

    session.clear_images();
    assert!(session.images().is_empty());
    assert!(!session.images_loaded());
}

#[test]
fn rejections_are_listed_and_dismissable() {
    let mut session = session_with(Arc::new(CdnStore));
    session.drop_files(
        Flow::Images,
        vec![DroppedFile::from_bytes("notes.txt", b"x".to_vec())],
        Vec::new(),
    );
    let codes: Vec<_> = session
        .image_intake()
        .rejected()
        .iter()
        .flat_map(|entry| entry.codes())
        .collect();
    assert_eq!(codes, vec!["file-invalid-type"]);

    session.dismiss(Flow::Images, "notes.txt");
    assert!(session.image_intake().rejected().is_empty());
}
