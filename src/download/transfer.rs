//! Buffered streaming of one HTTP response body into one file

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use log::{debug, info};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::progress::ProgressSink;

const USER_AGENT: &str = concat!("release-fetch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum byte distance between progress reports
pub const PROGRESS_INTERVAL: u64 = 256 * 1024;
const LOG_INTERVAL: u64 = 10 * 1024 * 1024;

/// HTTP client shared by catalog lookups and transfers
///
/// No overall request timeout: long transfers are bounded by the batch
/// deadline instead. A proxy given as bare `host:port` is treated as SOCKS5.
pub fn http_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT);

    if let Some(proxy) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
        let proxy_url = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("socks5://{proxy}")
        };
        debug!("Routing HTTP traffic through {proxy_url}");
        builder = builder.proxy(reqwest::Proxy::all(&proxy_url)?);
    }

    Ok(builder.build()?)
}

/// Download `url` into `dest` through a `buffer_size` write buffer
///
/// Overwrites `dest`. A non-2xx status is terminal. On any read or write
/// error the partial file is left in place. Cancellation is observed between
/// chunks. Returns the number of bytes written.
pub async fn transfer(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    buffer_size: usize,
    progress: Option<&dyn ProgressSink>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let label = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string());
    debug!(
        "Downloading {url} to {} (buffer {buffer_size} bytes)",
        dest.display()
    );

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        response = client.get(url).send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    // Progress is only meaningful against a declared length
    let sink = match (progress, response.content_length()) {
        (Some(sink), Some(total)) => {
            sink.begin(&label, total);
            Some(sink)
        }
        _ => None,
    };

    let file = File::create(dest)
        .await
        .map_err(|e| FetchError::io("failed to create", dest, e))?;
    let mut writer = BufWriter::with_capacity(buffer_size.max(1), file);

    let started = Instant::now();
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_progress: u64 = 0;
    let mut last_log: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            next = stream.next() => match next {
                Some(chunk) => chunk?,
                None => break,
            },
        };

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io("failed to write", dest, e))?;
        downloaded += chunk.len() as u64;

        if let Some(sink) = sink
            && downloaded - last_progress >= PROGRESS_INTERVAL
        {
            sink.advance(&label, downloaded);
            last_progress = downloaded;
        }

        if downloaded - last_log >= LOG_INTERVAL {
            debug!(
                "{label}: {downloaded} bytes after {:.1}s",
                started.elapsed().as_secs_f64()
            );
            last_log = downloaded;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io("failed to flush", dest, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| FetchError::io("failed to sync", dest, e))?;

    if let Some(sink) = sink {
        if last_progress != downloaded {
            sink.advance(&label, downloaded);
        }
        sink.finish(&label);
    }

    let elapsed = started.elapsed();
    let speed = downloaded as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / 1_048_576.0;
    info!(
        "Downloaded {label} ({downloaded} bytes in {:.2}s, {speed:.2} MiB/s)",
        elapsed.as_secs_f64()
    );

    Ok(downloaded)
}
