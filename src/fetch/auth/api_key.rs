use crate::fetch::FetchError;
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sends a credential in a request header.
///
/// The header is validated when the wrapper is built, so a bad token fails
/// the run up front instead of on every request.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, value: &str) -> Result<Self, FetchError> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
        let mut value =
            HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(inner: C, token: &str) -> Result<Self, FetchError> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
