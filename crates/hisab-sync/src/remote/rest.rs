//! # PostgREST Remote Store
//!
//! HTTP client for the remote canonical store.
//!
//! ## Request Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET {url}/rest/v1/products?select=*&company_id=eq.7                    │
//! │                            &status=eq.active&order=created_at.desc      │
//! │                                                                         │
//! │  Headers on every request:                                             │
//! │    apikey: <key>                                                       │
//! │    Authorization: Bearer <key>                                         │
//! │  Headers on writes:                                                    │
//! │    Prefer: return=representation   (server echoes the stored row)      │
//! │                                                                         │
//! │  Responses are JSON arrays, even for single-row writes.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use hisab_core::{without_id, Record, TenantScope};

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::reachability::Probe;

/// Shared HTTP client for every table on one remote store.
#[derive(Debug, Clone)]
pub struct RestClient {
    inner: Arc<RestInner>,
}

#[derive(Debug)]
struct RestInner {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    timeout_secs: u64,
}

impl RestClient {
    /// Builds a client from the `[remote]` settings.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let raw_url = settings
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(SyncError::RemoteNotConfigured)?;
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(SyncError::RemoteNotConfigured)?;

        let mut base = Url::parse(raw_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        debug!(url = %base, "Remote store client created");

        Ok(RestClient {
            inner: Arc::new(RestInner {
                http,
                base,
                api_key,
                timeout_secs: settings.request_timeout_secs,
            }),
        })
    }

    /// Typed store for one record type.
    pub fn store<T: Record>(&self) -> RestRemoteStore<T> {
        RestRemoteStore {
            client: self.clone(),
            _record: PhantomData,
        }
    }

    fn endpoint(&self, path: &str) -> RemoteResult<Url> {
        self.inner
            .base
            .join(path)
            .map_err(|e| RemoteError::Decode(format!("bad endpoint {}: {}", path, e)))
    }

    fn table_url(&self, table: &str) -> RemoteResult<Url> {
        self.endpoint(&format!("rest/v1/{}", table))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(&self.inner.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, self.inner.timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: error_message(&body, status.canonical_reason()),
        })
    }
}

#[async_trait]
impl Probe for RestClient {
    /// Any HTTP answer, even an error status, proves the link works.
    async fn probe(&self) -> bool {
        let Ok(url) = self.endpoint("rest/v1/") else {
            return false;
        };
        match self.request(Method::GET, url).send().await {
            Ok(response) => {
                trace!(status = %response.status(), "Remote probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Remote probe failed");
                false
            }
        }
    }
}

// =============================================================================
// Typed Table Access
// =============================================================================

/// PostgREST table for one record type.
#[derive(Debug, Clone)]
pub struct RestRemoteStore<T> {
    client: RestClient,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RestRemoteStore<T> {
    fn url(&self) -> RemoteResult<Url> {
        self.client.table_url(T::KIND.table())
    }

    fn row_url(&self, id: i64) -> RemoteResult<Url> {
        let mut url = self.url()?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id));
        Ok(url)
    }

    async fn rows(response: Response) -> RemoteResult<Vec<T>> {
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn body(record: &T) -> RemoteResult<Value> {
        without_id(record).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl<T: Record> RemoteStore<T> for RestRemoteStore<T> {
    async fn list(&self, scope: TenantScope, include_archived: bool) -> RemoteResult<Vec<T>> {
        let url = list_url(self.url()?, T::KIND, scope, include_archived);
        let response = self.client.send(self.client.request(Method::GET, url)).await?;
        let rows = Self::rows(response).await?;
        debug!(entity = %T::KIND, %scope, count = rows.len(), "Remote list");
        Ok(rows)
    }

    async fn get(&self, id: i64) -> RemoteResult<Option<T>> {
        let mut url = self.row_url(id)?;
        url.query_pairs_mut().append_pair("select", "*");
        let response = self.client.send(self.client.request(Method::GET, url)).await?;
        Ok(Self::rows(response).await?.into_iter().next())
    }

    async fn create(&self, record: &T) -> RemoteResult<T> {
        let builder = self
            .client
            .request(Method::POST, self.url()?)
            .header("Prefer", "return=representation")
            .json(&Self::body(record)?);
        let response = self.client.send(builder).await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("create returned no rows".into()))
    }

    async fn update(&self, id: i64, record: &T) -> RemoteResult<T> {
        let builder = self
            .client
            .request(Method::PATCH, self.row_url(id)?)
            .header("Prefer", "return=representation")
            .json(&Self::body(record)?);
        let response = self.client.send(builder).await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or(RemoteError::NotFound { kind: T::KIND, id })
    }

    async fn delete(&self, id: i64) -> RemoteResult<()> {
        let url = self.row_url(id)?;
        self.client
            .send(self.client.request(Method::DELETE, url))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Builds the query string for a listing.
fn list_url(
    mut url: Url,
    kind: hisab_core::EntityKind,
    scope: TenantScope,
    include_archived: bool,
) -> Url {
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("select", "*");
        if let TenantScope::Company(company_id) = scope {
            query.append_pair("company_id", &format!("eq.{}", company_id));
        }
        if !include_archived {
            if let Some((column, value)) = kind.live_filter() {
                query.append_pair(column, &format!("eq.{}", value));
            }
        }
        query.append_pair("order", &format!("{}.desc", kind.order_column()));
    }
    url
}

fn transport_error(err: reqwest::Error, timeout_secs: u64) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(timeout_secs)
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Unreachable(err.to_string())
    }
}

/// PostgREST errors carry a JSON body with a `message` field.
fn error_message(body: &str, reason: Option<&str>) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| reason.unwrap_or("unknown error").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hisab_core::{EntityKind, Product};

    fn settings(url: &str) -> RemoteSettings {
        RemoteSettings {
            url: Some(url.to_string()),
            api_key: Some("anon".into()),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_client_requires_url_and_key() {
        let missing = RemoteSettings::default();
        assert!(matches!(
            RestClient::new(&missing),
            Err(SyncError::RemoteNotConfigured)
        ));

        assert!(matches!(
            RestClient::new(&settings("not a url")),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_table_url_keeps_base_path() {
        let client = RestClient::new(&settings("https://example.com/api")).unwrap();
        let url = client.table_url("products").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/rest/v1/products");
    }

    #[test]
    fn test_list_url_for_company_scope() {
        let client = RestClient::new(&settings("https://example.com")).unwrap();
        let url = list_url(
            client.table_url("products").unwrap(),
            EntityKind::Product,
            TenantScope::Company(7),
            false,
        );
        assert_eq!(
            url.query(),
            Some("select=*&company_id=eq.7&status=eq.active&order=created_at.desc")
        );
    }

    #[test]
    fn test_list_url_unscoped_with_archived() {
        let client = RestClient::new(&settings("https://example.com")).unwrap();
        let url = list_url(
            client.table_url("user_devices").unwrap(),
            EntityKind::Device,
            TenantScope::Unscoped,
            true,
        );
        assert_eq!(url.query(), Some("select=*&order=last_accessed.desc"));
    }

    #[test]
    fn test_row_url() {
        let client = RestClient::new(&settings("https://example.com")).unwrap();
        let store = client.store::<Product>();
        assert_eq!(
            store.row_url(41).unwrap().as_str(),
            "https://example.com/rest/v1/products?id=eq.41"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"code":"23505","message":"duplicate key"}"#, Some("Conflict")),
            "duplicate key"
        );
        assert_eq!(error_message("plain text", None), "plain text");
        assert_eq!(error_message("", Some("Conflict")), "Conflict");
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_unreachable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = RestClient::new(&settings("http://127.0.0.1:9")).unwrap();
        assert!(!client.probe().await);

        let err = client
            .store::<Product>()
            .list(TenantScope::Company(1), false)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
