//! Cloud API HTTP client.

use serde_json::Value;
use tracing::debug;
use url::Url;

use heimlink_protocol::Mac;

use crate::CloudError;
use crate::models::{AccessToken, SiteInfo, parse_sites};

/// Client for the vendor cloud REST API.
///
/// Holds a `reqwest::Client` and the API root; every method is a single
/// request-response round trip. Authorization is a bearer token obtained
/// from [`fetch_token`](Self::fetch_token) and passed explicitly, so one
/// client can serve several accounts.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CloudClient {
    /// Creates a client for the given API root.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Creates a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchanges account email/password for a bearer token.
    ///
    /// `POST /auth/token` with an OpenID-style password grant form.
    pub async fn fetch_token(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccessToken, CloudError> {
        let url = self.api_url("auth/token")?;
        debug!("requesting access token");
        let resp = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("username", email),
                ("password", password),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CloudError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(CloudError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Lists the account's sites.
    ///
    /// `GET /sites`, tolerant of the known payload nestings.
    pub async fn list_sites(&self, token: &str) -> Result<Vec<SiteInfo>, CloudError> {
        let url = self.api_url("sites")?;
        debug!("listing sites");
        let value: Value = self.get_json(url, token).await?;
        parse_sites(&value)
    }

    /// Fetches the per-gateway connection secret.
    ///
    /// `GET /gateways/{mac}/password`, keyed by the normalized hardware
    /// address. The payload is either `{"password": "..."}` or a bare
    /// JSON string.
    pub async fn gateway_password(&self, token: &str, mac: &Mac) -> Result<String, CloudError> {
        let url = self.api_url(&format!("gateways/{mac}/password"))?;
        debug!(mac = %mac, "fetching gateway password");
        let value: Value = self.get_json(url, token).await?;
        match &value {
            Value::String(password) => Ok(password.clone()),
            Value::Object(map) => map
                .get("password")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CloudError::Parse("no password in response".into())),
            _ => Err(CloudError::Parse("unexpected password payload".into())),
        }
    }

    fn api_url(&self, path: &str) -> Result<Url, CloudError> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json(&self, url: Url, token: &str) -> Result<Value, CloudError> {
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CloudError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(CloudError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }
}
