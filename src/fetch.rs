// src/fetch.rs

//! HTTP download support for the fallback controller
//!
//! A thin blocking client with a timeout and bounded retries, streaming
//! responses to disk in fixed-size chunks. Hash verification of downloaded
//! artifacts stays with the caller: the transport retries transport
//! failures only, never integrity failures.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts per download
const MAX_RETRIES: u32 = 3;

/// Delay between attempts
const RETRY_DELAY_MS: u64 = 1000;

/// Streaming copy chunk size
const STREAM_BUFFER_SIZE: usize = 8192;

/// Something that can materialise a URL as a local file. The apply
/// controller takes this as an injected collaborator so tests (and
/// embedders with their own transport) can substitute the network.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP fetcher with retry support
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::io(
                    "http client",
                    std::io::Error::other(format!("failed to build http client: {e}")),
                )
            })?;
        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Stream a response body to `dest` in fixed-size chunks
    fn stream_to_file(&self, mut response: reqwest::blocking::Response, dest: &Path) -> Result<u64> {
        let mut file = File::create(dest).map_err(|e| Error::io(dest, e))?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::io(dest, std::io::Error::other(format!("read body: {e}"))))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).map_err(|e| Error::io(dest, e))?;
            downloaded += n as u64;
        }

        file.sync_all().map_err(|e| Error::io(dest, e))?;
        Ok(downloaded)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut last_err = None;

        for attempt in 1..=self.max_retries {
            match self.client.get(url).send() {
                Ok(response) => {
                    // A definitive server answer is not a transport failure:
                    // a 404 stays a 404 no matter how often it is asked.
                    if !response.status().is_success() {
                        return Err(Error::io(
                            dest,
                            std::io::Error::other(format!(
                                "GET {url}: HTTP {}",
                                response.status()
                            )),
                        ));
                    }
                    let bytes = self.stream_to_file(response, dest)?;
                    debug!("downloaded {url} ({bytes} bytes)");
                    return Ok(());
                }
                Err(e) => {
                    warn!("download attempt {attempt}/{} failed: {e}", self.max_retries);
                    last_err = Some(Error::io(
                        dest,
                        std::io::Error::other(format!("GET {url}: {e}")),
                    ));
                    if attempt < self.max_retries {
                        std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::io(dest, std::io::Error::other("download failed with no attempts"))
        }))
    }
}
