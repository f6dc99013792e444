//! Public code minting.
//!
//! Every dishwasher gets a short public code from a [`CodeMinter`]. In
//! production that is a URL shortening service ([`BitlyMinter`]): the service
//! shortens the dishwasher's canonical URL and the short link's token becomes
//! the code. [`LocalMinter`] generates random tokens for development setups
//! without shortening-service credentials.

use crate::config::{BitlyConfig, LocalMinterConfig, MinterConfig};
use async_trait::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum MintError {
    /// Connection failure, timeout, or other transport-level problem
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered successfully but the code could not be extracted
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Produces a short, unique public code for a resource URL.
#[async_trait]
pub trait CodeMinter: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    async fn mint(&self, long_url: &Url) -> Result<String, MintError>;
}

/// Build a minter from configuration.
pub fn from_config(config: &MinterConfig) -> anyhow::Result<Arc<dyn CodeMinter>> {
    Ok(match config {
        MinterConfig::Bitly(bitly) => Arc::new(BitlyMinter::new(bitly)?),
        MinterConfig::Local(local) => Arc::new(LocalMinter::new(local)),
    })
}

/// Makes sure a url has a trailing slash, so that `join` appends instead of
/// replacing the last path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

/// Canonical URL of a dishwasher, as handed to the minter.
pub fn resource_url(public_url: &Url, id: i64) -> Result<Url, url::ParseError> {
    ensure_slash(public_url).join(&format!("api/v1/dishwashers/{id}"))
}

#[derive(Debug, Serialize)]
struct ShortenRequest<'a> {
    long_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    link: Option<String>,
    id: Option<String>,
}

impl ShortenResponse {
    /// The token is the last path segment of the short link, e.g. `ab12xy`
    /// for `https://bit.ly/ab12xy`.
    fn token(&self) -> Option<String> {
        let from_link = self
            .link
            .as_deref()
            .and_then(|link| Url::parse(link).ok())
            .and_then(|link| link.path_segments().and_then(|mut s| s.next_back().map(str::to_string)));

        let from_id = || {
            self.id
                .as_deref()
                .and_then(|id| id.rsplit('/').next())
                .map(str::to_string)
        };

        from_link.filter(|t| !t.is_empty()).or_else(from_id).filter(|t| !t.is_empty())
    }
}

/// Mints codes through the Bitly v4 `shorten` API.
pub struct BitlyMinter {
    client: Client,
    shorten_url: Url,
    access_token: String,
    domain: Option<String>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl BitlyMinter {
    pub fn new(config: &BitlyConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let shorten_url = ensure_slash(&config.api_url).join("shorten")?;
        let access_token = config
            .access_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("bitly minter requires an access token"))?;

        Ok(Self {
            client,
            shorten_url,
            access_token,
            domain: config.domain.clone(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    async fn shorten_once(&self, long_url: &Url) -> Result<String, MintError> {
        let body = ShortenRequest {
            long_url: long_url.as_str(),
            domain: self.domain.as_deref(),
        };

        let response = self
            .client
            .post(self.shorten_url.clone())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MintError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body_text = response.text().await?;
        debug!("Shorten API response body: {}", body_text);

        let parsed: ShortenResponse =
            serde_json::from_str(&body_text).map_err(|e| MintError::MalformedResponse(format!("error decoding response body: {e}")))?;

        parsed
            .token()
            .ok_or_else(|| MintError::MalformedResponse("response has neither a usable link nor id".to_string()))
    }
}

#[async_trait]
impl CodeMinter for BitlyMinter {
    fn name(&self) -> &'static str {
        "bitly"
    }

    #[instrument(skip(self), fields(long_url = %long_url))]
    async fn mint(&self, long_url: &Url) -> Result<String, MintError> {
        let mut attempt = 0;
        loop {
            let error = match self.shorten_once(long_url).await {
                Ok(code) => return Ok(code),
                Err(e) => e,
            };

            let retryable = match &error {
                MintError::Transport(_) => true,
                MintError::Status { status, .. } => StatusCode::from_u16(*status).map(Self::is_retryable).unwrap_or(false),
                MintError::MalformedResponse(_) => false,
            };

            if !retryable || attempt >= self.max_retries {
                return Err(error);
            }

            let delay = self.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt));
            warn!(attempt = attempt + 1, max_retries = self.max_retries, ?delay, "Shorten request failed, retrying: {}", error);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Mints random alphanumeric codes without any network call.
pub struct LocalMinter {
    length: usize,
}

impl LocalMinter {
    pub fn new(config: &LocalMinterConfig) -> Self {
        Self { length: config.length }
    }
}

#[async_trait]
impl CodeMinter for LocalMinter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn mint(&self, _long_url: &Url) -> Result<String, MintError> {
        Ok(rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bitly_config(server: &MockServer) -> BitlyConfig {
        BitlyConfig {
            api_url: format!("{}/v4", server.uri()).parse().unwrap(),
            access_token: Some("test-token".to_string()),
            domain: Some("bit.ly".to_string()),
            timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_base_delay_ms: 1,
        }
    }

    fn long_url() -> Url {
        "http://dishwashers.test/api/v1/dishwashers/7".parse().unwrap()
    }

    #[test]
    fn resource_url_handles_trailing_slashes() {
        let with_path: Url = "https://example.com/app".parse().unwrap();
        assert_eq!(
            resource_url(&with_path, 3).unwrap().as_str(),
            "https://example.com/app/api/v1/dishwashers/3"
        );

        let bare: Url = "https://example.com/".parse().unwrap();
        assert_eq!(resource_url(&bare, 12).unwrap().as_str(), "https://example.com/api/v1/dishwashers/12");
    }

    #[test]
    fn token_extraction() {
        let response = ShortenResponse {
            link: Some("https://bit.ly/ab12xy".to_string()),
            id: Some("bit.ly/ignored".to_string()),
        };
        assert_eq!(response.token().as_deref(), Some("ab12xy"));

        let response = ShortenResponse {
            link: None,
            id: Some("bit.ly/fromid".to_string()),
        };
        assert_eq!(response.token().as_deref(), Some("fromid"));

        let response = ShortenResponse {
            link: Some("https://bit.ly/".to_string()),
            id: None,
        };
        assert_eq!(response.token(), None);
    }

    #[tokio::test]
    async fn test_bitly_mint_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({
                "long_url": "http://dishwashers.test/api/v1/dishwashers/7",
                "domain": "bit.ly",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "link": "https://bit.ly/ab12xy",
                "id": "bit.ly/ab12xy",
                "long_url": "http://dishwashers.test/api/v1/dishwashers/7",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let minter = BitlyMinter::new(&bitly_config(&server)).unwrap();
        let code = minter.mint(&long_url()).await.unwrap();
        assert_eq!(code, "ab12xy");
    }

    #[tokio::test]
    async fn test_bitly_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"link": "https://bit.ly/third"})))
            .expect(1)
            .mount(&server)
            .await;

        let minter = BitlyMinter::new(&bitly_config(&server)).unwrap();
        assert_eq!(minter.mint(&long_url()).await.unwrap(), "third");
    }

    #[tokio::test]
    async fn test_bitly_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let minter = BitlyMinter::new(&bitly_config(&server)).unwrap();
        match minter.mint(&long_url()).await {
            Err(MintError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bitly_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "FORBIDDEN"})))
            .expect(1)
            .mount(&server)
            .await;

        let minter = BitlyMinter::new(&bitly_config(&server)).unwrap();
        assert!(matches!(
            minter.mint(&long_url()).await,
            Err(MintError::Status { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_bitly_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let minter = BitlyMinter::new(&bitly_config(&server)).unwrap();
        assert!(matches!(
            minter.mint(&long_url()).await,
            Err(MintError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_bitly_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/shorten"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"link": "https://bit.ly/late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut config = bitly_config(&server);
        config.timeout = Duration::from_millis(50);
        config.max_retries = 0;

        let minter = BitlyMinter::new(&config).unwrap();
        match minter.mint(&long_url()).await {
            Err(MintError::Transport(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn bitly_requires_token() {
        let config = BitlyConfig {
            access_token: None,
            ..BitlyConfig::default()
        };
        assert!(BitlyMinter::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_local_minter_generates_codes_of_configured_length() {
        let minter = LocalMinter::new(&LocalMinterConfig { length: 8 });
        let first = minter.mint(&long_url()).await.unwrap();
        let second = minter.mint(&long_url()).await.unwrap();

        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }
}
