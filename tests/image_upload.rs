use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use lyrix::ingest::images::{BatchOutcome, ImageIntake, UploadJob};
use lyrix::ingest::{AcceptPolicy, DroppedFile};
use lyrix::upload::{HttpObjectStore, UploadError};
use lyrix::worker::{IngestJob, IngestWorker, JobDispatcher, WorkerEvent};

/// Serves exactly one HTTP request with a canned reply and hands back the
/// raw request it received.
fn serve_once(status_line: &'static str, body: &'static str) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let request = read_request(&mut stream);
        let reply = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes());
        let _ = stream.flush();
        let _ = tx.send(request);
    });

    (format!("http://{addr}/v1_1/demo"), rx)
}

fn read_request(stream: &mut impl Read) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let Ok(read) = stream.read(&mut chunk) else {
            break;
        };
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            });
        let body_len = raw.len() - (header_end + 4);
        let done = match content_length {
            Some(expected) => body_len >= expected,
            None => text.trim_end().ends_with("--"),
        };
        if done {
            break;
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}

fn wait_for_upload(worker: &IngestWorker) -> WorkerEvent {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Some(event @ WorkerEvent::Uploaded { .. }) = worker.try_recv_event() {
            return event;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("no upload result before deadline");
}

fn single_image_job(intake: &mut ImageIntake) -> UploadJob {
    intake.on_drop(vec![DroppedFile::from_bytes(
        "cover.png",
        b"\x89PNG-test-bytes".to_vec(),
    )]);
    intake.submit().expect("submit").jobs.remove(0)
}

#[test]
fn multipart_upload_resolves_image_url() {
    let (base, requests) = serve_once(
        "200 OK",
        r#"{"public_id":"cover","secure_url":"https://cdn.test/cover.png"}"#,
    );
    let store = HttpObjectStore::new(&base, Some(String::from("lyrix-preset")), Duration::from_secs(5))
        .expect("store");
    let worker = IngestWorker::new(Arc::new(store));

    let mut intake = ImageIntake::new(AcceptPolicy::images(1.9));
    let job = single_image_job(&mut intake);
    worker.dispatch(IngestJob::Upload(job));

    let WorkerEvent::Uploaded { id, batch, result } = wait_for_upload(&worker) else {
        unreachable!();
    };
    let uploaded = result.expect("upload ok");
    assert_eq!(uploaded.secure_url, "https://cdn.test/cover.png");

    let report = intake
        .on_upload_complete(id, batch, Ok(uploaded))
        .expect("batch settled");
    assert_eq!(report.outcome(), BatchOutcome::Complete);
    assert_eq!(intake.sources().get("cover"), Some("https://cdn.test/cover.png"));

    let request = requests
        .recv_timeout(Duration::from_secs(5))
        .expect("request captured");
    assert!(request.starts_with("POST /v1_1/demo/image/upload "));
    assert!(request.contains("name=\"file\"; filename=\"cover.png\""));
    assert!(request.contains("name=\"upload_preset\""));
    assert!(request.contains("lyrix-preset"));
}

#[test]
fn server_error_is_retryable() {
    let (base, _requests) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#);
    let store = HttpObjectStore::new(&base, None, Duration::from_secs(5)).expect("store");
    let worker = IngestWorker::new(Arc::new(store));

    let mut intake = ImageIntake::new(AcceptPolicy::images(1.9));
    worker.dispatch(IngestJob::Upload(single_image_job(&mut intake)));

    let WorkerEvent::Uploaded { id, batch, result } = wait_for_upload(&worker) else {
        unreachable!();
    };
    let err = result.expect_err("503");
    assert!(matches!(err, UploadError::Status { code: 503, .. }));
    assert!(err.is_retryable());

    let report = intake
        .on_upload_complete(id, batch, Err(err))
        .expect("batch settled");
    assert_eq!(report.outcome(), BatchOutcome::Failed);
    assert_eq!(report.retryable_failures(), 1);
    assert!(intake.retry_failed().is_ok());
}

#[test]
fn malformed_reply_is_not_retryable() {
    let (base, _requests) = serve_once("200 OK", r#"{"public_id":"cover"}"#);
    let store = HttpObjectStore::new(&base, None, Duration::from_secs(5)).expect("store");
    let worker = IngestWorker::new(Arc::new(store));

    let mut intake = ImageIntake::new(AcceptPolicy::images(1.9));
    worker.dispatch(IngestJob::Upload(single_image_job(&mut intake)));

    let WorkerEvent::Uploaded { result, .. } = wait_for_upload(&worker) else {
        unreachable!();
    };
    let err = result.expect_err("missing secure_url");
    assert_eq!(err.code(), "upload-invalid-response");
    assert!(!err.is_retryable());
}
