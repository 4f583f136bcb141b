use crate::RemoteError;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use url::Url;

const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Extra request headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpec<'a> {
    pub accept: Option<&'a str>,
    /// Sent as `Authorization: Bearer`, only while the request stays on the
    /// original host.
    pub bearer: Option<&'a str>,
}

/// A fully read, decoded response.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL after redirects.
    pub url: String,
    pub content_type: Option<String>,
    pub link: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP client that follows redirects itself so the chain length is bounded.
///
/// The underlying agent never follows redirects and never turns status codes
/// into errors; every hop is inspected here.
pub struct HttpClient {
    agent: ureq::Agent,
    user_agent: String,
    max_redirects: u32,
}

type HttpResponse = ureq::http::Response<ureq::Body>;

impl HttpClient {
    pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

    pub fn new(user_agent: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .max_redirects(0)
            .max_redirects_will_error(false)
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            user_agent: user_agent.to_owned(),
            max_redirects: Self::DEFAULT_MAX_REDIRECTS,
        }
    }

    #[must_use]
    pub fn with_max_redirects(mut self, limit: u32) -> Self {
        self.max_redirects = limit;
        self
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    fn open(&self, url: &str, spec: RequestSpec<'_>) -> Result<(String, HttpResponse), RemoteError> {
        let mut current =
            Url::parse(url).map_err(|e| RemoteError::Http(format!("invalid URL {url}: {e}")))?;
        let origin_host = current.host_str().map(str::to_owned);

        for hop in 0..=self.max_redirects {
            let mut req = self
                .agent
                .get(current.as_str())
                .header("User-Agent", &self.user_agent);
            if let Some(accept) = spec.accept {
                req = req.header("Accept", accept);
            }
            if let Some(token) = spec.bearer {
                if current.host_str() == origin_host.as_deref() {
                    req = req.header("Authorization", &format!("Bearer {token}"));
                }
            }
            let resp = req
                .call()
                .map_err(|e| RemoteError::Http(format!("GET {current}: {e}")))?;
            let code = resp.status().as_u16();

            if REDIRECT_CODES.contains(&code) {
                let location = resp
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RemoteError::MissingLocation(current.to_string()))?;
                let next = current
                    .join(location)
                    .map_err(|e| RemoteError::Http(format!("bad redirect {location}: {e}")))?;
                debug!("redirect #{}: {current} -> {next}", hop + 1);
                current = next;
                continue;
            }
            if code == 404 {
                return Err(RemoteError::NotFound(current.to_string()));
            }
            if !(200..300).contains(&code) {
                return Err(RemoteError::Status {
                    code,
                    url: current.to_string(),
                });
            }
            return Ok((current.to_string(), resp));
        }

        Err(RemoteError::TooManyRedirects {
            url: url.to_owned(),
            limit: self.max_redirects,
        })
    }

    pub fn get_bytes(&self, url: &str, spec: RequestSpec<'_>) -> Result<Fetched, RemoteError> {
        debug!("GET {url}");
        let (final_url, resp) = self.open(url, spec)?;
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let content_type = header("content-type");
        let content_encoding = header("content-encoding");
        let link = header("link");

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        Ok(Fetched {
            url: final_url,
            content_type,
            link,
            body: decode_body(content_encoding.as_deref(), body),
        })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        spec: RequestSpec<'_>,
    ) -> Result<(T, Fetched), RemoteError> {
        let fetched = self.get_bytes(url, spec)?;
        let value = serde_json::from_slice(&fetched.body)?;
        Ok((value, fetched))
    }

    /// Stream `url` into `dest`, reporting `(downloaded, total)` after each chunk.
    ///
    /// On any failure the partial file is removed.
    pub fn download_to_file(
        &self,
        url: &str,
        spec: RequestSpec<'_>,
        dest: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, RemoteError> {
        debug!("download {url} -> {}", dest.display());
        let (_, resp) = self.open(url, spec)?;
        let total = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let reader = resp.into_body().into_reader();
        match stream_to_file(reader, dest, total, on_progress) {
            Ok(n) => {
                debug!("downloaded {n} bytes from {url}");
                Ok(n)
            }
            Err(e) => {
                let _ = fs::remove_file(dest);
                Err(e)
            }
        }
    }
}

fn stream_to_file(
    mut reader: impl Read,
    dest: &Path,
    total: Option<u64>,
    on_progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<u64, RemoteError> {
    let mut file = File::create(dest)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut downloaded = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        downloaded += n as u64;
        on_progress(downloaded, total);
    }
    file.sync_all()?;
    Ok(downloaded)
}

fn read_all(mut r: impl Read) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    r.read_to_end(&mut out).ok()?;
    Some(out)
}

/// Undo `gzip` or `deflate` content encoding; undecodable bodies pass through.
pub fn decode_body(encoding: Option<&str>, body: Vec<u8>) -> Vec<u8> {
    let enc = encoding.unwrap_or_default().to_ascii_lowercase();
    let decoded = if enc.contains("gzip") && body.starts_with(&[0x1f, 0x8b]) {
        read_all(GzDecoder::new(body.as_slice()))
    } else if enc.contains("deflate") {
        read_all(ZlibDecoder::new(body.as_slice()))
            .or_else(|| read_all(DeflateDecoder::new(body.as_slice())))
    } else {
        None
    };
    decoded.unwrap_or(body)
}
