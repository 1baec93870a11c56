use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use super::{error_for_status, normalize_endpoint, transport_error, ListedRecord, RemoteVault};
use crate::auth::Session;
use crate::crypto::Codec;
use crate::error::{Error, Result};
use crate::models::LockBox;

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: i64,
}

/// `RemoteVault` over the lock box HTTP API.
#[derive(Clone)]
pub struct HttpVaultClient {
    base_url: String,
    client: Client,
    codec: Codec,
}

impl fmt::Debug for HttpVaultClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpVaultClient")
            .field("base_url", &self.base_url)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl HttpVaultClient {
    pub fn new(base_url: impl Into<String>, codec: Codec, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Self::with_client(base_url, codec, client)
    }

    pub fn with_client(base_url: impl Into<String>, codec: Codec, client: Client) -> Result<Self> {
        Ok(Self {
            base_url: normalize_endpoint(base_url.into())?,
            client,
            codec,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/lock_boxes/{path}", self.base_url)
    }

    fn named_url(&self, name: &str) -> String {
        self.url(&urlencoding::encode(name))
    }

    async fn send(&self, session: &Session, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(session.token())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }
}

fn not_found_as(name: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |error| match error {
        Error::NotFound(_) => Error::NotFound(name.to_string()),
        other => other,
    }
}

#[async_trait]
impl RemoteVault for HttpVaultClient {
    async fn create(&self, session: &Session, record: &LockBox) -> Result<i64> {
        let payload = self.codec.encrypt_fields(record)?;
        let response = self
            .send(session, self.client.post(self.url("create")).json(&payload))
            .await
            .map_err(|error| match error {
                Error::AlreadyExists(_) => Error::AlreadyExists(record.name.clone()),
                other => other,
            })?;
        let body = response.json::<IdResponse>().await.map_err(transport_error)?;
        Ok(body.id)
    }

    async fn get(&self, session: &Session, name: &str) -> Result<LockBox> {
        let response = self
            .send(session, self.client.get(self.named_url(name)))
            .await
            .map_err(not_found_as(name))?;
        let record = response.json::<LockBox>().await.map_err(transport_error)?;
        self.codec.decrypt_fields(&record)
    }

    async fn list_all(&self, session: &Session) -> Result<Vec<ListedRecord>> {
        let response = self.send(session, self.client.get(self.url(""))).await?;
        let records = response
            .json::<Vec<LockBox>>()
            .await
            .map_err(transport_error)?;
        Ok(records
            .iter()
            .map(|record| ListedRecord {
                name: record.name.clone(),
                record: self.codec.decrypt_fields(record),
            })
            .collect())
    }

    async fn update(&self, session: &Session, record: &LockBox) -> Result<()> {
        let payload = self.codec.encrypt_fields(record)?;
        self.send(session, self.client.put(self.url("")).json(&payload))
            .await
            .map_err(not_found_as(&record.name))?;
        Ok(())
    }

    async fn delete(&self, session: &Session, name: &str) -> Result<()> {
        self.send(session, self.client.delete(self.named_url(name)))
            .await
            .map_err(not_found_as(name))?;
        Ok(())
    }

    async fn upsert(&self, session: &Session, record: &LockBox) -> Result<i64> {
        let payload = self.codec.encrypt_fields(record)?;
        let response = self
            .send(
                session,
                self.client.post(self.url("create/update")).json(&payload),
            )
            .await?;
        let body = response.json::<IdResponse>().await.map_err(transport_error)?;
        Ok(body.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::test_codec;
    use pretty_assertions::assert_eq;

    fn client(base_url: &str) -> HttpVaultClient {
        HttpVaultClient::new(base_url, test_codec(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn urls_are_rooted_under_api_prefix() {
        let client = client("http://vault.local:8080/");
        assert_eq!(client.base_url(), "http://vault.local:8080");
        assert_eq!(
            client.url("create/update"),
            "http://vault.local:8080/api/lock_boxes/create/update"
        );
        assert_eq!(
            client.named_url("my vault/1"),
            "http://vault.local:8080/api/lock_boxes/my%20vault%2F1"
        );
    }

    #[test]
    fn debug_does_not_expose_key() {
        let debug = format!("{:?}", client("http://vault.local"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_is_remote_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(&format!("http://{addr}"));
        let session = Session::new("u1", "token").unwrap();
        let result = client.list_all(&session).await;
        assert!(matches!(result, Err(Error::RemoteUnavailable { .. })));
    }
}
