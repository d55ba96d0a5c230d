use std::io::{BufWriter, Write};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::error::BatchError;
use crate::fs_util;

pub trait HttpDownloader: Send + Sync {
    fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), BatchError>;
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, BatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mothur-batch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BatchError::Http(err.to_string()))?,
        );
        // Large read files take a while; only connecting is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| BatchError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<Response, BatchError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        attempt += 1;
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        attempt += 1;
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Err(BatchError::Http(err.to_string()));
                }
            }
        }
    }
}

impl HttpDownloader for HttpClient {
    fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), BatchError> {
        info!("Downloading {url} to {destination}");
        let mut response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(BatchError::HttpStatus { status, message });
        }
        let mut out = BufWriter::new(fs_util::create(destination)?);
        let bytes = response
            .copy_to(&mut out)
            .map_err(|err| BatchError::Http(err.to_string()))?;
        out.flush()
            .map_err(|err| BatchError::Filesystem(format!("write {destination}: {err}")))?;
        info!("Downloaded {bytes} bytes");
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
