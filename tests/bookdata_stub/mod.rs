#![allow(dead_code)]

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// openBD knows it; NDL supplies the cover.
pub const TITAN_1: &str = "9784063842760";
/// openBD knows it and points at a cover that 404s.
pub const TITAN_3: &str = "9784063842777";
/// openBD knows it, cover included.
pub const WITH_COVER: &str = "9784091270009";
/// Only NDL has a thumbnail.
pub const NDL_ONLY: &str = "9784088826417";
/// openBD answers 500 for it.
pub const BROKEN: &str = "9784000000000";
/// Nobody knows it.
pub const UNKNOWN: &str = "9780000000002";

/// Size of the body served at `/covers/huge.jpg`.
pub const HUGE_COVER_LEN: usize = 64 * 1024;

pub static JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub struct BookDataStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BookDataStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start book data stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let log = Arc::clone(&requests);
        let cover_base = base_url.clone();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                log.lock().unwrap().push(url.clone());
                let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
                let isbn = query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("isbn="))
                    .unwrap_or("")
                    .to_string();

                let (status, content_type, body) = match path {
                    "/openbd/v1/get" => openbd(&isbn, &cover_base),
                    "/ndl/api/opensearch" => ndl(&isbn, &cover_base),
                    "/covers/titan-1.jpg" | "/covers/with-cover.jpg" => {
                        (200, "image/jpeg", JPEG.to_vec())
                    }
                    "/covers/huge.jpg" => (200, "image/jpeg", vec![0xaa; HUGE_COVER_LEN]),
                    _ => (404, "text/plain", b"not found".to_vec()),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                        .expect("build header");
                let response = tiny_http::Response::from_data(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn openbd_url(&self) -> String {
        format!("{}/openbd", self.base_url)
    }

    pub fn ndl_url(&self) -> String {
        format!("{}/ndl", self.base_url)
    }

    /// Request paths (with query) seen so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Env vars pointing the resolver at this stub.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("COMICSHELF_OPENBD_URL", self.openbd_url()),
            ("COMICSHELF_NDL_URL", self.ndl_url()),
            ("COMICSHELF_IMPORT_DELAY_MS", "0".to_string()),
        ]
    }
}

impl Drop for BookDataStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn openbd(isbn: &str, base: &str) -> (i32, &'static str, Vec<u8>) {
    let book = match isbn {
        TITAN_1 => serde_json::json!({
            "summary": {
                "isbn": TITAN_1,
                "title": "進撃の巨人 第1巻",
                "author": "諫山創",
                "publisher": "講談社",
                "series": "進撃の巨人",
                "cover": "",
                "pubdate": "20100317"
            }
        }),
        TITAN_3 => serde_json::json!({
            "summary": {
                "isbn": TITAN_3,
                "title": "進撃の巨人 第3巻",
                "publisher": "講談社",
                "series": "進撃の巨人",
                "cover": format!("{base}/covers/missing.jpg")
            }
        }),
        WITH_COVER => serde_json::json!({
            "summary": {
                "isbn": WITH_COVER,
                "title": "ワンピース (5)",
                "series": "ワンピース",
                "cover": format!("{base}/covers/with-cover.jpg")
            }
        }),
        BROKEN => return (500, "text/plain", b"internal error".to_vec()),
        _ => serde_json::Value::Null,
    };
    let body = serde_json::Value::Array(vec![book]).to_string();
    (200, "application/json", body.into_bytes())
}

fn ndl(isbn: &str, base: &str) -> (i32, &'static str, Vec<u8>) {
    let item = match isbn {
        TITAN_1 => format!(
            r#"<item><title>進撃の巨人</title><link rel="thumbnail" type="image/jpeg" href="{base}/covers/titan-1.jpg"/></item>"#
        ),
        NDL_ONLY => format!(
            r#"<item><title>?</title><link rel="thumbnail" type="image/jpeg" href="{base}/covers/ndl-only.jpg"/></item>"#
        ),
        _ => String::new(),
    };
    let body = format!(r#"<?xml version="1.0"?><rss><channel>{item}</channel></rss>"#);
    (200, "application/rss+xml", body.into_bytes())
}
