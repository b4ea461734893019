mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use tracing::debug;

use crate::error::{PipelineError, Result};

/// GETs `url` and buffers the body chunk by chunk.
///
/// `chunk_size` only seeds the buffer capacity when the response carries no
/// content length; chunk boundaries come from the connection.
///
/// # Errors
///
/// Returns [`PipelineError::Transport`] if the URL is invalid, the request
/// fails, or the response status is not a success.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let url: reqwest::Url = url
        .parse()
        .map_err(|e| PipelineError::Transport(format!("invalid url '{url}': {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let mut resp = client.execute(req).await?.error_for_status()?;

    let capacity = resp
        .content_length()
        .map(|len| len as usize)
        .unwrap_or(chunk_size);
    let mut buffer = Vec::with_capacity(capacity);
    let mut chunks = 0usize;
    while let Some(chunk) = resp.chunk().await? {
        buffer.extend_from_slice(&chunk);
        chunks += 1;
    }

    debug!(bytes = buffer.len(), chunks, "Response body buffered");
    Ok(buffer)
}
