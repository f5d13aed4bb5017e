//! An authenticated account: client, discovered principal, store and resolver.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use url::Url;

use calsched_core::config::{AccountConfig, SchedulingPolicy};
use calsched_core::{Principal, SchedulingCoordinator};

use crate::caldav::{DavClient, create_caldav_client};
use crate::discovery::{DavAddressResolver, discover_principal, supports_scheduling};
use crate::store::DavStore;

/// A connected CalDAV account.
pub struct Session {
    client: Arc<DavClient>,
    principal: Principal,
}

impl Session {
    /// Connect with the account's credentials and discover its principal.
    pub async fn connect(account: &AccountConfig) -> Result<Self> {
        let url = Url::parse(&account.url)
            .with_context(|| format!("Invalid account URL: {}", account.url))?;
        let password = account.password.as_deref().with_context(|| {
            format!(
                "No password configured for {}. Set it in the config file or via CALSCHED__ACCOUNTS__<NAME>__PASSWORD",
                account.username
            )
        })?;

        debug!(url = %url, username = %account.username, "connecting");
        let client = Arc::new(create_caldav_client(url.as_str(), &account.username, password)?);
        let principal = discover_principal(&client).await?;
        info!(principal = %principal.href, address = %principal.address, "connected");

        Ok(Session { client, principal })
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn store(&self) -> DavStore {
        DavStore::new(self.client.clone())
    }

    pub fn resolver(&self) -> DavAddressResolver {
        DavAddressResolver::new(self.client.clone())
    }

    /// Whether the server behind the account URL supports implicit scheduling.
    pub async fn supports_scheduling(&self) -> Result<bool> {
        let base = self.client.base_url().path().to_string();
        supports_scheduling(&self.client, &base)
            .await
            .context("Failed to check scheduling support")
    }

    /// A coordinator acting as this account's principal.
    pub fn coordinator(&self, policy: SchedulingPolicy) -> SchedulingCoordinator {
        SchedulingCoordinator::new(
            Arc::new(self.store()),
            self.principal.clone(),
            Arc::new(self.resolver()),
        )
        .with_policy(policy)
    }
}
