use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;

use crate::api::models::{ActivityPage, ErrorResponse};
use crate::entity::{ActivityError, ActivityResult, RecordSource};

/// Backend source of truth for the user's transaction history
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch one page, starting after `cursor` (first page when `None`)
    async fn fetch_page(&self, cursor: Option<&str>, limit: u32) -> ActivityResult<ActivityPage>;
}

/// `ActivitySource` over the wallet backend REST API
pub struct RestActivitySource {
    http_client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RestActivitySource {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> ActivityResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActivityError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn error_from_body(status: u16, body: &str) -> ActivityError {
        let message = match serde_json::from_str::<ErrorResponse>(body) {
            Ok(ErrorResponse { error }) => error,
            Err(_) if body.is_empty() => "Unknown error".to_string(),
            Err(_) => body.to_string(),
        };
        ActivityError::Backend { status, message }
    }
}

#[async_trait]
impl ActivitySource for RestActivitySource {
    async fn fetch_page(&self, cursor: Option<&str>, limit: u32) -> ActivityResult<ActivityPage> {
        let url = format!("{}/activity", self.base_url);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        debug!("Fetching activity page (cursor: {:?}, limit: {})", cursor, limit);

        let mut request = self.http_client.get(&url).query(&query);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!("Activity request failed: {}", e);
            ActivityError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Activity API error [{}]: {}", status, body);
            return Err(Self::error_from_body(status.as_u16(), &body));
        }

        let body = response.text().await?;
        let mut page: ActivityPage = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse activity page: {}", e);
            ActivityError::Decode(e.to_string())
        })?;

        for item in &mut page.items {
            item.source = RecordSource::Backend;
        }

        debug!(
            "Received {} transactions, next cursor: {:?}",
            page.items.len(),
            page.next_cursor
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{TxStatus, TxType};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> RestActivitySource {
        RestActivitySource::new(server.uri(), Some("secret".to_string()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn fetches_and_decodes_a_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/activity"))
            .and(query_param("limit", "2"))
            .and(query_param("cursor", "abc"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "items": [
                        {"clientTxId": "a", "status": "confirmed", "type": "deposit",
                         "timestamp": "2026-03-10T09:00:00Z", "amount": "100", "symbol": "USDC",
                         "source": "optimistic"},
                        {"clientTxId": "b", "status": "pending", "type": "bridge",
                         "timestamp": "2026-03-10T10:00:00Z"}
                    ],
                    "nextCursor": "def"
                }"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let page = source(&server).fetch_page(Some("abc"), 2).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].status, TxStatus::Confirmed);
        assert_eq!(page.items[1].tx_type, TxType::Bridge);
        assert!(page.items.iter().all(|i| i.source == RecordSource::Backend));
        assert_eq!(page.next_cursor.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn surfaces_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/activity"))
            .respond_with(
                ResponseTemplate::new(503).set_body_raw(r#"{"error":"maintenance"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let err = source(&server).fetch_page(None, 50).await.unwrap_err();
        assert_eq!(
            err,
            ActivityError::Backend {
                status: 503,
                message: "maintenance".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/activity"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
            .mount(&server)
            .await;

        let err = source(&server).fetch_page(None, 50).await.unwrap_err();
        assert!(matches!(err, ActivityError::Decode(_)));
    }
}
