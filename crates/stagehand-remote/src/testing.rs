//! A scripted HTTP server for tests.
//!
//! Binds `127.0.0.1:0`, answers every request through a caller-supplied
//! router, and counts hits per path. Dropping the server stops it.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Header, Response, Server, StatusCode};

/// What the router answers for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(value.to_string()).with_header("Content-Type", "application/json")
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: code,
            ..Self::ok(Vec::new())
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302).with_header("Location", location)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Router = dyn Fn(&str) -> Reply + Send + Sync;

pub struct TestServer {
    pub url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server; `router` receives the request path including any query.
    pub fn start(router: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let router: Arc<Router> = Arc::new(router);

        let srv = Arc::clone(&server);
        let hit_log = Arc::clone(&hits);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                let router = Arc::clone(&router);
                let hit_log = Arc::clone(&hit_log);
                std::thread::spawn(move || {
                    let full = request.url().to_owned();
                    let path = full.split('?').next().unwrap_or_default().to_owned();
                    *hit_log.lock().expect("hit log").entry(path).or_insert(0) += 1;
                    let reply = router(&full);
                    if let Some(delay) = reply.delay {
                        std::thread::sleep(delay);
                    }
                    let mut response: Response<Cursor<Vec<u8>>> =
                        Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
                    for (name, value) in &reply.headers {
                        if let Ok(h) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                            response.add_header(h);
                        }
                    }
                    let _ = request.respond(response);
                });
            }
        });

        Self {
            url,
            hits,
            server,
            handle: Some(handle),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Requests seen for `path` (query string ignored).
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hit log")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().expect("hit log").values().sum()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
