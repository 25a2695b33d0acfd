//! HTTP fetch layer.
//!
//! [`HttpClient`] is the seam tests and auth wrappers plug into;
//! [`BasicClient`] is the plain reqwest-backed implementation, and
//! [`SubscriptionKey`] decorates any client with the API-gateway
//! subscription header the realtime endpoints require.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderName, HeaderValue};

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response>;
}

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}

/// An [`HttpClient`] wrapper that injects a subscription key as an HTTP
/// header (e.g. `Ocp-Apim-Subscription-Key` for Azure API Management
/// gateways).
pub struct SubscriptionKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> SubscriptionKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        Ok(Self {
            inner,
            header_name: header_name.parse()?,
            key: key.parse()?,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for SubscriptionKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
        self.inner.execute(req).await
    }
}

/// Performs a GET against `url` and returns the response body as bytes.
/// Non-2xx statuses are errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let mut req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    req.headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_key_rejects_invalid_header_names() {
        assert!(SubscriptionKey::new(BasicClient::new(), "not a header", "key").is_err());
    }

    #[test]
    fn subscription_key_accepts_gateway_header() {
        assert!(
            SubscriptionKey::new(BasicClient::new(), "Ocp-Apim-Subscription-Key", "abc123").is_ok()
        );
    }
}
