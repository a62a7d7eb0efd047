//! In-cluster IPAM backend.

use anyhow::Context;
use async_trait::async_trait;
use kube::api::Api;
use kube::Client;

use super::{claim_addresses, release_claims, AddressBackend, ClaimOutcome, ClaimRequest, ClaimedAddress};
use crate::crd::{AddressPool, PoolRef};
use crate::wait::WaitConfig;

/// Claims addresses from the IPAM controller running in the management
/// cluster.
///
/// This is the backend for runs against real infrastructure, where the pool
/// models an actual routable network and therefore tracks a gateway.
pub struct IpamBackend {
    client: Client,
    /// Namespace the pool and its claims live in.
    namespace: String,
    /// Pool serving this test suite.
    pool_name: String,
    wait: WaitConfig,
}

impl IpamBackend {
    /// Create a backend claiming from `pool_name` in `namespace`.
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        pool_name: impl Into<String>,
        wait: WaitConfig,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            pool_name: pool_name.into(),
            wait,
        }
    }

    fn pool_ref(&self) -> PoolRef {
        PoolRef {
            kind: "AddressPool".to_string(),
            name: self.pool_name.clone(),
        }
    }
}

impl std::fmt::Debug for IpamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpamBackend")
            .field("namespace", &self.namespace)
            .field("pool_name", &self.pool_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AddressBackend for IpamBackend {
    async fn claim(&self, request: &ClaimRequest) -> anyhow::Result<ClaimOutcome> {
        let mut outcome = claim_addresses(
            &self.client,
            &self.namespace,
            &self.pool_ref(),
            self.wait,
            request,
        )
        .await?;

        if let Some(gateway_variable) = &request.gateway_variable {
            let pools: Api<AddressPool> = Api::namespaced(self.client.clone(), &self.namespace);
            let pool = pools
                .get(&self.pool_name)
                .await
                .with_context(|| format!("reading address pool {}", self.pool_name))?;
            let gateway = pool.spec.gateway.with_context(|| {
                format!("address pool {} does not track a gateway", self.pool_name)
            })?;
            outcome.variables.insert(gateway_variable.clone(), gateway);
        }

        Ok(outcome)
    }

    async fn cleanup(&self, claims: &[ClaimedAddress]) -> anyhow::Result<()> {
        release_claims(&self.client, claims).await
    }
}
