/// `reload/source.rs` — where mod text comes from
///
/// `materialize` is the only place that touches the filesystem or the network.
/// It never retries; the caller decides whether to try again.
use std::fmt;
use std::path::PathBuf;

use futures_util::StreamExt;
use serde::Serialize;

use crate::error::RunnerError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CodeSource {
    Literal(String),
    LocalFile(PathBuf),
    RemoteUrl(String),
}

impl CodeSource {
    /// Sources that can change behind the runner's back.
    pub fn is_watchable(&self) -> bool {
        !matches!(self, CodeSource::Literal(_))
    }

    /// Chunk name handed to the interpreter, shows up in Lua error messages.
    pub fn chunk_name(&self) -> String {
        match self {
            CodeSource::Literal(_) => "=mod".to_string(),
            CodeSource::LocalFile(path) => format!("@{}", path.display()),
            CodeSource::RemoteUrl(url) => format!("@{url}"),
        }
    }

    pub async fn materialize(&self, http: &reqwest::Client) -> Result<String, RunnerError> {
        match self {
            CodeSource::Literal(text) => Ok(text.clone()),
            CodeSource::LocalFile(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| RunnerError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            CodeSource::RemoteUrl(url) => fetch_text(http, url).await,
        }
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSource::Literal(text) => write!(f, "string ({} bytes)", text.len()),
            CodeSource::LocalFile(path) => write!(f, "file {}", path.display()),
            CodeSource::RemoteUrl(url) => write!(f, "url {url}"),
        }
    }
}

/// Client used for remote sources: redirects are not followed, so a 3xx
/// surfaces as a `Fetch` error like any other non-2xx answer.
pub fn build_http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("HTTP client builder failed ({e}), using defaults");
            reqwest::Client::new()
        })
}

/// GET `url` and accumulate the body as UTF-8 text.
async fn fetch_text(http: &reqwest::Client, url: &str) -> Result<String, RunnerError> {
    let network = |source: reqwest::Error| RunnerError::Network {
        url: url.to_string(),
        source,
    };

    let resp = http.get(url).send().await.map_err(network)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(RunnerError::Fetch {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut body = Vec::new();
    let mut chunks = resp.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk.map_err(network)?);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status` + `body` to every connection on a throwaway port.
    pub(crate) async fn serve(status: &'static str, body: &'static str) -> String {
        serve_after(Duration::ZERO, status, body).await
    }

    /// Like `serve`, but each answer is held back for `delay`.
    pub(crate) async fn serve_after(
        delay: Duration,
        status: &'static str,
        body: &'static str,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/mod.lua")
    }

    fn client() -> reqwest::Client {
        build_http_client(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn literal_returns_stored_text() {
        let source = CodeSource::Literal("tick = nil".into());
        assert_eq!(source.materialize(&client()).await.unwrap(), "tick = nil");
        assert!(!source.is_watchable());
    }

    #[tokio::test]
    async fn local_file_is_read_as_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "print('hi')").unwrap();
        let source = CodeSource::LocalFile(file.path().to_path_buf());
        assert_eq!(source.materialize(&client()).await.unwrap(), "print('hi')");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CodeSource::LocalFile(dir.path().join("nope.lua"));
        let err = source.materialize(&client()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Io { .. }));
    }

    #[tokio::test]
    async fn remote_body_is_returned_on_2xx() {
        let url = serve("200 OK", "options = { map_size = 30 }").await;
        let text = CodeSource::RemoteUrl(url)
            .materialize(&client())
            .await
            .unwrap();
        assert_eq!(text, "options = { map_size = 30 }");
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_fetch_error() {
        let url = serve("404 Not Found", "missing").await;
        let err = CodeSource::RemoteUrl(url)
            .materialize(&client())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let url = serve("302 Found", "").await;
        let err = CodeSource::RemoteUrl(url)
            .materialize(&client())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(302));
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = CodeSource::RemoteUrl(format!("http://{addr}/mod.lua"))
            .materialize(&client())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Network { .. }));
    }
}
