#![allow(dead_code)]

use image_pipeline::{
    client::ProcessingClient,
    error::ProcessingError,
    file::WorkingFile,
    schema::{ConvertParams, OptimizeParams, ResizeParams},
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory client: every call succeeds unless the file's original name is listed.
pub struct MockClient {
    calls: AtomicUsize,
    fail_names: Vec<String>,
    fail_with: ProcessingError,
}

impl MockClient {
    pub fn new() -> Self {
        Self::failing(&[], ProcessingError::failed("unused"))
    }

    pub fn failing(names: &[&str], err: ProcessingError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_names: names.iter().map(|s| s.to_string()).collect(),
            fail_with: err,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn process(&self, op: &str, file: &WorkingFile) -> Result<WorkingFile, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_names.iter().any(|n| n == &file.original_name) {
            return Err(self.fail_with.clone());
        }
        Ok(WorkingFile::new(
            file.original_name.clone(),
            format!("{}.{op}", file.location.display()),
            file.size_bytes,
            file.mime_type.clone(),
        ))
    }
}

impl ProcessingClient for MockClient {
    fn optimize(
        &self,
        file: &WorkingFile,
        _params: &OptimizeParams,
    ) -> Result<WorkingFile, ProcessingError> {
        self.process("optimize", file)
    }

    fn resize(
        &self,
        file: &WorkingFile,
        _params: &ResizeParams,
    ) -> Result<WorkingFile, ProcessingError> {
        self.process("resize", file)
    }

    fn convert(
        &self,
        file: &WorkingFile,
        _params: &ConvertParams,
    ) -> Result<WorkingFile, ProcessingError> {
        self.process("convert", file)
    }

    fn remove_background(&self, file: &WorkingFile) -> Result<WorkingFile, ProcessingError> {
        self.process("remove_background", file)
    }
}

/// `img1.png` .. `imgN.png`, never touched on disk.
pub fn files(n: usize) -> Vec<WorkingFile> {
    (1..=n)
        .map(|i| {
            WorkingFile::new(
                format!("img{i}.png"),
                format!("/virtual/in/img{i}.png"),
                1024,
                "image/png",
            )
        })
        .collect()
}

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Serves exactly one HTTP response on 127.0.0.1 and hands back the raw request it saw.
pub fn serve_once(
    status: u16,
    content_type: &str,
    body: &[u8],
) -> (String, std::thread::JoinHandle<String>) {
    use std::io::{Read, Write};

    bypass_proxy_for_loopback();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let content_type = content_type.to_string();
    let body = body.to_vec();

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut buf).expect("read request");
            assert!(n > 0, "connection closed before headers");
            raw.extend_from_slice(&buf[..n]);
            if let Some(i) = find(&raw, b"\r\n\r\n") {
                break i + 4;
            }
        };
        let head = String::from_utf8_lossy(&raw[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        let chunked = head.contains("transfer-encoding: chunked");
        loop {
            let done = match content_length {
                Some(len) => raw.len() >= header_end + len,
                None if chunked => raw.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if done {
                break;
            }
            let n = stream.read(&mut buf).expect("read body");
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }

        let head = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).expect("write head");
        stream.write_all(&body).expect("write body");
        stream.flush().expect("flush");
        String::from_utf8_lossy(&raw).into_owned()
    });

    (base_url, handle)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn bypass_proxy_for_loopback() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        // SAFETY: every test that builds an HTTP client calls this first, and `Once` makes
        // the other callers wait until the variables are set.
        unsafe {
            std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
            std::env::set_var("no_proxy", "127.0.0.1,localhost");
        }
    });
}
