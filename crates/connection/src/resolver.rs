//! Credential and site resolution.
//!
//! Turns a connect request into gateway credentials: figure out *which*
//! gateway (explicit override, stored selection, or the cloud account's
//! sites), then find the secret that authorizes talking to it (local store,
//! or a cloud fetch persisted for next time).

use futures_util::future::BoxFuture;
use tracing::{debug, info};

use heimlink_cloud::{CloudClient, CloudError, SiteInfo};
use heimlink_protocol::Mac;
use heimlink_store::{CloudAccount, GatewayCredentials, Vault};

use crate::error::ResolveError;

/// What the caller knows when asking for a connection.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Explicit gateway override; skips site resolution entirely.
    pub mac: Option<Mac>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Explicit site choice when the account has several.
    pub site_index: Option<usize>,
    /// Restrict resolution to locally stored data; never talk to the cloud.
    pub stored_only: bool,
}

/// Injected site-selection strategy.
///
/// Given the account's sites, answers with the chosen index, or `None` when
/// the user dismissed the choice. UI behavior, so it is a callback rather
/// than anything this crate decides.
pub type SiteSelector =
    Box<dyn Fn(Vec<SiteInfo>) -> BoxFuture<'static, Option<usize>> + Send + Sync>;

/// The slice of the cloud API the resolver needs.
#[allow(async_fn_in_trait)]
pub trait CloudApi {
    async fn fetch_token(&self, email: &str, password: &str) -> Result<String, CloudError>;
    async fn list_sites(&self, token: &str) -> Result<Vec<SiteInfo>, CloudError>;
    async fn gateway_password(&self, token: &str, mac: &Mac) -> Result<String, CloudError>;
}

impl CloudApi for CloudClient {
    async fn fetch_token(&self, email: &str, password: &str) -> Result<String, CloudError> {
        Ok(CloudClient::fetch_token(self, email, password)
            .await?
            .access_token)
    }

    async fn list_sites(&self, token: &str) -> Result<Vec<SiteInfo>, CloudError> {
        CloudClient::list_sites(self, token).await
    }

    async fn gateway_password(&self, token: &str, mac: &Mac) -> Result<String, CloudError> {
        CloudClient::gateway_password(self, token, mac).await
    }
}

/// Resolves gateway identity and credentials against the vault and cloud.
pub struct Resolver<'a, C> {
    vault: &'a Vault,
    cloud: &'a C,
}

impl<'a, C: CloudApi> Resolver<'a, C> {
    pub fn new(vault: &'a Vault, cloud: &'a C) -> Self {
        Self { vault, cloud }
    }

    /// Resolves credentials for the target gateway.
    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        selector: Option<&SiteSelector>,
    ) -> Result<GatewayCredentials, ResolveError> {
        let mut token = None;
        let mac = self.resolve_mac(request, selector, &mut token).await?;

        if let Some(credentials) = self.vault.credentials.get(&mac) {
            debug!(mac = %mac, "gateway credentials found in store");
            return Ok(credentials);
        }
        if request.stored_only {
            return Err(ResolveError::MissingGatewayCredentials);
        }

        let token = self.ensure_token(request, &mut token).await?;
        let secret = self.cloud.gateway_password(&token, &mac).await?;
        let credentials = GatewayCredentials::new(mac.clone(), secret);
        self.vault.credentials.save(credentials.clone())?;
        info!(mac = %mac, "gateway credentials fetched from cloud");
        Ok(credentials)
    }

    /// Resolves the target hardware address: explicit override, then the
    /// stored selection (stored-only policy), then the cloud site flow.
    async fn resolve_mac(
        &self,
        request: &ResolveRequest,
        selector: Option<&SiteSelector>,
        token: &mut Option<String>,
    ) -> Result<Mac, ResolveError> {
        if let Some(mac) = &request.mac {
            self.vault.selection.save(mac)?;
            return Ok(mac.clone());
        }
        if request.stored_only {
            return self
                .vault
                .selection
                .get()
                .ok_or(ResolveError::MissingGatewayMac);
        }

        let token = self.ensure_token(request, token).await?;
        let sites = self.cloud.list_sites(&token).await?;
        if sites.is_empty() {
            return Err(ResolveError::NoSites);
        }

        let site = self.pick_site(&sites, request, selector).await?;
        let gateway = site.gateways.first().ok_or(ResolveError::MissingGateway)?;
        self.vault.selection.save(&gateway.mac)?;
        debug!(site = %site.name, mac = %gateway.mac, "site resolved");
        Ok(gateway.mac.clone())
    }

    /// Picks a site: automatic when there is exactly one, otherwise the
    /// explicit index, otherwise the injected selector.
    async fn pick_site<'s>(
        &self,
        sites: &'s [SiteInfo],
        request: &ResolveRequest,
        selector: Option<&SiteSelector>,
    ) -> Result<&'s SiteInfo, ResolveError> {
        if sites.len() == 1 {
            return Ok(&sites[0]);
        }
        let index = match (request.site_index, selector) {
            (Some(index), _) => index,
            (None, Some(selector)) => selector(sites.to_vec())
                .await
                .ok_or(ResolveError::MissingSiteSelection)?,
            (None, None) => return Err(ResolveError::MissingSiteSelection),
        };
        sites.get(index).ok_or(ResolveError::InvalidSiteIndex {
            index,
            count: sites.len(),
        })
    }

    /// Returns a cached token or performs the password grant, persisting
    /// the account that worked.
    async fn ensure_token(
        &self,
        request: &ResolveRequest,
        token: &mut Option<String>,
    ) -> Result<String, ResolveError> {
        if let Some(token) = token {
            return Ok(token.clone());
        }
        let account = match (&request.email, &request.password) {
            (Some(email), Some(password)) => CloudAccount {
                email: email.clone(),
                password: password.clone(),
            },
            _ => self
                .vault
                .account
                .get()
                .ok_or(ResolveError::MissingCloudCredentials)?,
        };
        let fresh = self
            .cloud
            .fetch_token(&account.email, &account.password)
            .await?;
        self.vault.account.save(&account)?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }
}
