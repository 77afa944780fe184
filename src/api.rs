use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOP_K: u32 = 8;

/// Failure shape shared by every call the client makes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("request aborted")]
    Aborted,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status(status.as_u16())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    question: &'a str,
    top_k: u32,
    use_llm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: String,
}

#[derive(Clone)]
pub struct LegalAiClient {
    client: Client,
    base_url: String,
}

impl LegalAiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn search_and_answer(
        &self,
        question: &str,
        top_k: u32,
        use_llm: bool,
    ) -> Result<Answer, ApiError> {
        let url = format!("{}/api/search", self.base_url);

        let request = SearchRequest {
            question,
            top_k,
            use_llm,
        };

        tracing::info!(top_k, use_llm, "dispatching question to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("search request failed: {}", e);
                ApiError::from(e)
            })?;

        if !response.status().is_success() {
            tracing::warn!("search request returned status {}", response.status());
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let answer: Answer = response.json().await?;
        Ok(answer)
    }

    /// Lightweight reachability probe. Never fails, only reports.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("health probe failed: {}", e);
                false
            }
        }
    }

    /// Fetch a static JSON document (the service directory) as text.
    pub async fn fetch_document(&self, url: &str) -> Result<String, ApiError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP response on an ephemeral port.
    /// The join handle yields the raw request that was received.
    pub async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{}", addr), handle)
    }

    /// An address nothing is listening on.
    pub async fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{serve_once, unreachable_url};
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn search_returns_answer_and_sources() {
        let (url, server) =
            serve_once("200 OK", r#"{"answer":"Rights are listed.","sources":"Art. 16-46"}"#).await;
        let client = LegalAiClient::new(&url);

        let answer = client
            .search_and_answer("What are the fundamental rights?", DEFAULT_TOP_K, true)
            .await
            .unwrap();

        assert_eq!(
            answer,
            Answer {
                answer: "Rights are listed.".to_string(),
                sources: "Art. 16-46".to_string(),
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/search "));
        assert!(request.ends_with(
            r#"{"question":"What are the fundamental rights?","top_k":8,"use_llm":true}"#
        ));
    }

    #[tokio::test]
    async fn missing_sources_default_to_empty() {
        let (url, _server) = serve_once("200 OK", r#"{"answer":"ok"}"#).await;
        let client = LegalAiClient::new(&url);

        let answer = client.search_and_answer("q", 3, false).await.unwrap();
        assert_eq!(answer.sources, "");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _server) = serve_once("500 Internal Server Error", "{}").await;
        let client = LegalAiClient::new(&url);

        let err = client.search_and_answer("q", 8, true).await.unwrap_err();
        assert_eq!(err, ApiError::Status(500));
        assert_eq!(err.to_string(), "HTTP error! status: 500");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = LegalAiClient::new(&unreachable_url().await);

        let err = client.search_and_answer("q", 8, true).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "got {:?}", err);
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (url, _server) = serve_once("200 OK", "not json").await;
        let client = LegalAiClient::new(&url);

        let err = client.search_and_answer("q", 8, true).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn health_reports_reachability() {
        let (url, server) = serve_once("200 OK", r#"{"status":"healthy"}"#).await;
        assert!(LegalAiClient::new(&url).check_health().await);
        assert!(server.await.unwrap().starts_with("GET /health "));

        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        assert!(!LegalAiClient::new(&url).check_health().await);

        assert!(!LegalAiClient::new(&unreachable_url().await).check_health().await);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = LegalAiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
