mod support;

use image_pipeline::{
    client::{OptimizationApiClient, PredictionApi, ProcessingClient, ReplicateApi},
    config::Config,
    error::ProcessingError,
    file::WorkingFile,
    schema::OptimizeParams,
    storage::{FileStore, ResultStore},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use support::{bypass_proxy_for_loopback, serve_once};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00";

fn store_in(dir: &Path) -> FileStore {
    bypass_proxy_for_loopback();
    let mut cfg = Config::default();
    cfg.paths.upload_dir = dir.join("uploads").display().to_string();
    cfg.intake.max_file_bytes = 64;
    FileStore::new(&cfg).unwrap()
}

fn write_inputs(dir: &Path, files: &[(&str, &[u8])]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, bytes)| {
            let p = dir.join(name);
            std::fs::write(&p, bytes).unwrap();
            p
        })
        .collect()
}

fn stored_name(file: &WorkingFile) -> String {
    file.location.file_name().unwrap().to_str().unwrap().to_string()
}

#[test]
fn intake_keeps_images_and_drops_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    let mut oversized = PNG.to_vec();
    oversized.resize(128, 0);
    let mut inputs = write_inputs(
        dir.path(),
        &[
            ("ok.png", PNG),
            ("readme.png", &b"not an image at all"[..]),
            ("anim.gif", GIF),
            ("big.png", oversized.as_slice()),
        ],
    );
    inputs.push(dir.path().join("missing.png"));

    let accepted = store.intake(&inputs);
    let names: Vec<&str> = accepted.iter().map(|f| f.original_name.as_str()).collect();
    assert_eq!(names, vec!["ok.png", "anim.gif"]);

    assert_eq!(accepted[0].mime_type, "image/png");
    assert_eq!(accepted[1].mime_type, "image/gif");
    for f in &accepted {
        assert!(f.location.starts_with(store.upload_dir()));
        let stored = stored_name(f);
        assert!(stored.starts_with("upload_"), "{stored}");
    }
    assert!(accepted[0].location.to_string_lossy().ends_with(".png"));
}

#[test]
fn intake_report_names_each_rejected_upload() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let inputs = write_inputs(
        dir.path(),
        &[("ok.png", PNG), ("notes.txt", &b"plain words, no magic"[..])],
    );

    let report = store.intake_report(&inputs);
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].name, "notes.txt");
    assert!(
        report.rejected[0].reason.contains("unrecognized file type"),
        "{}",
        report.rejected[0].reason
    );
}

#[test]
fn mime_whitelist_is_configurable() {
    bypass_proxy_for_loopback();
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.paths.upload_dir = dir.path().join("uploads").display().to_string();
    cfg.intake.allowed_mime_types = vec!["image/png".to_string()];
    let store = FileStore::new(&cfg).unwrap();

    let gif = write_inputs(dir.path(), &[("a.gif", GIF)]);
    assert!(store.intake(&gif).is_empty());
}

#[test]
fn delete_refuses_paths() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let victim = dir.path().join("x");
    std::fs::write(&victim, b"keep").unwrap();

    assert!(!store.delete_file("../x"));
    assert!(!store.delete_file(".."));
    assert!(victim.exists());
}

#[test]
fn delete_removes_stored_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let inputs = write_inputs(dir.path(), &[("p.png", PNG)]);
    let file = store.intake(&inputs).pop().expect("accepted");
    let name = stored_name(&file);

    assert!(store.delete_file(&name));
    assert!(!file.location.exists());
    // Already gone still counts as deleted.
    assert!(store.delete_file(&name));
}

#[test]
fn cleanup_respects_age_and_dotfiles() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let inputs = write_inputs(dir.path(), &[("a.png", PNG), ("b.png", PNG)]);
    assert_eq!(store.intake(&inputs).len(), 2);
    std::fs::write(store.upload_dir().join(".gitkeep"), b"").unwrap();

    let fresh = store.cleanup_old_files(Duration::from_secs(3600)).unwrap();
    assert_eq!(fresh.deleted, 0);

    std::thread::sleep(Duration::from_millis(20));
    let stale = store.cleanup_old_files(Duration::ZERO).unwrap();
    assert_eq!(stale.deleted, 2);
    assert_eq!(stale.errors, 0);
    assert!(store.upload_dir().join(".gitkeep").exists());
}

#[test]
fn persist_refuses_non_http_urls() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    assert!(store.persist("file:///etc/hosts", "bg_removed", "hosts.png").is_none());
    assert!(store.persist("not a url", "bg_removed", "x.png").is_none());
    assert_eq!(std::fs::read_dir(store.upload_dir()).unwrap().count(), 0);
}

#[test]
fn persist_refuses_an_empty_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let (base, server) = serve_once(200, "image/png", b"");

    assert!(store.persist(&format!("{base}/out/empty.png"), "optimize", "a.png").is_none());
    server.join().unwrap();
    assert_eq!(std::fs::read_dir(store.upload_dir()).unwrap().count(), 0);
}

#[test]
fn persist_refuses_an_error_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let (base, server) = serve_once(404, "text/plain", b"gone");

    assert!(store.persist(&format!("{base}/out/gone.png"), "optimize", "a.png").is_none());
    server.join().unwrap();
}

#[test]
fn persist_names_the_file_after_the_url_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let (base, server) = serve_once(200, "image/png", PNG);

    let file = store
        .persist(&format!("{base}/x/cat.png"), "bg_removed", "cat_bgremoved.png")
        .expect("persisted");
    let request = server.join().unwrap();

    assert!(request.starts_with("GET /x/cat.png "), "{request}");
    let name = stored_name(&file);
    assert!(name.starts_with("bg_removed_"), "{name}");
    assert!(name.ends_with(".png"), "{name}");
    assert_eq!(file.original_name, "cat_bgremoved.png");
    assert_eq!(file.mime_type, "image/png");
    assert_eq!(std::fs::read(&file.location).unwrap(), PNG);
}

#[test]
fn persist_adds_tmp_when_the_url_has_no_extension() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let (base, server) = serve_once(200, "application/octet-stream", PNG);

    let file = store
        .persist(&format!("{base}/out/result"), "optimize", "a.png")
        .expect("persisted");
    server.join().unwrap();
    let name = stored_name(&file);
    assert!(name.ends_with(".tmp"), "{name}");
}

#[test]
fn prediction_api_error_status_is_a_transport_error() {
    bypass_proxy_for_loopback();
    let (base, server) = serve_once(500, "application/json", br#"{"detail":"boom"}"#);
    let api = ReplicateApi::new(&base, "v1", "tok", Duration::from_secs(5)).unwrap();

    let err = api
        .submit("data:image/png;base64,AAAA")
        .expect_err("500 must fail");
    let request = server.join().unwrap().to_ascii_lowercase();

    match err {
        ProcessingError::Transport(msg) => {
            assert!(msg.contains("500"), "{msg}");
            assert!(msg.contains("boom"), "{msg}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(request.starts_with("post /predictions "), "{request}");
    assert!(request.contains("authorization: token tok"), "{request}");
}

#[test]
fn prediction_api_requires_a_token() {
    assert!(ReplicateApi::new("http://127.0.0.1:9", "v1", "", Duration::from_secs(1)).is_err());
}

#[test]
fn optimizer_posts_multipart_and_persists_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(dir.path()));
    let (download_base, download) = serve_once(200, "image/png", PNG);
    let reply = format!(
        r#"{{"status":"success","output_url":"{download_base}/files/result.png"}}"#
    );
    let (api_base, api) = serve_once(200, "application/json", reply.as_bytes());

    let inputs = write_inputs(dir.path(), &[("cat.png", PNG)]);
    let input = store.intake(&inputs).pop().expect("accepted");
    let client =
        OptimizationApiClient::new(&api_base, "key", Duration::from_secs(5), store.clone()).unwrap();
    let params = OptimizeParams {
        quality: Some(80.0),
        ..Default::default()
    };

    let out = client.optimize(&input, &params).expect("optimized");
    let api_request = api.join().unwrap().to_ascii_lowercase();
    let download_request = download.join().unwrap();

    assert!(api_request.starts_with("post /optimize "), "{api_request}");
    assert!(api_request.contains("x-api-key: key"), "{api_request}");
    assert!(api_request.contains("name=\"quality\""), "{api_request}");
    assert!(api_request.contains("name=\"image\""), "{api_request}");
    assert!(download_request.starts_with("GET /files/result.png "), "{download_request}");

    assert_eq!(out.original_name, "cat.png");
    assert!(stored_name(&out).starts_with("optimize_"));
    assert!(out.location.starts_with(store.upload_dir()));
}

#[test]
fn optimizer_error_reply_is_a_processing_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(dir.path()));
    let (api_base, api) = serve_once(
        200,
        "application/json",
        br#"{"status":"error","message":"unsupported input"}"#,
    );

    let inputs = write_inputs(dir.path(), &[("cat.png", PNG)]);
    let input = store.intake(&inputs).pop().expect("accepted");
    let client =
        OptimizationApiClient::new(&api_base, "key", Duration::from_secs(5), store.clone()).unwrap();

    let err = client
        .optimize(&input, &OptimizeParams::default())
        .expect_err("error reply");
    api.join().unwrap();
    match err {
        ProcessingError::Failed(msg) => assert!(msg.contains("unsupported input"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
