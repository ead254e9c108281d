use std::time::Duration;

use reqwest::Client;

/// Maximum bytes read from a non-streaming error body before truncation.
pub const MAX_ERROR_BODY_BYTES: usize = 1024;

pub const HEADERS_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the single `reqwest::Client` shared by every HTTP-based peer call. Built once
/// in the composition root and cloned cheaply (an `Arc` under the hood) into every
/// client wrapper, never rebuilt per request.
pub fn build_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
}

/// Read a response body up to `max_bytes`, returning whatever was read even on a
/// mid-stream I/O error. Used only for non-streaming error bodies.
pub async fn read_body_capped(
    response: &mut reqwest::Response,
    max_bytes: usize,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(max_bytes.min(64 * 1024));
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = max_bytes.saturating_sub(body.len());
                let to_copy = chunk.len().min(remaining);
                body.extend_from_slice(&chunk[..to_copy]);
                if body.len() >= max_bytes {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    body
}
