//! HTTP plumbing shared by the vendor adapters

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::LlmError;

/// Default wait when a 429 carries no usable `retry-after`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Send a request and map transport failures and non-success statuses
pub(super) async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response, LlmError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            debug!("send: request timed out");
            LlmError::Timeout(timeout)
        } else {
            debug!(error = %e, "send: network error");
            LlmError::Network(e)
        }
    })?;

    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        debug!("send: rate limited (429)");
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        return Err(LlmError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        });
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "send: API error");
        return Err(LlmError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Configuration error for a provider whose key variable is unset
pub(super) fn missing_key(provider: &str, env: &str) -> LlmError {
    LlmError::Configuration {
        provider: provider.to_string(),
        message: format!("API key not found. Set the {} environment variable.", env),
    }
}

/// Build a reqwest client with the adapter's timeout
pub(super) fn build_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(LlmError::Network)
}

/// One-shot local HTTP server for exercising the adapters end to end
#[cfg(test)]
pub(super) mod test_server {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Raw HTTP/1.1 response with a body and extra headers
    pub fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut raw = format!(
            "HTTP/1.1 {}\r\ncontent-length: {}\r\ncontent-type: application/json\r\nconnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in headers {
            raw.push_str(&format!("{}: {}\r\n", name, value));
        }
        raw.push_str("\r\n");
        raw.push_str(body);
        raw
    }

    /// Accept one connection, answer it with `response` after `delay`
    ///
    /// Returns the base URL and a handle resolving to the lowercased request.
    pub async fn serve_once(response: String, delay: Duration) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            tokio::time::sleep(delay).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (format!("http://{}", addr), handle)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_lowercase()
    }
}
