//! Simulator-allocator backend.

use async_trait::async_trait;
use kube::Client;
use tracing::debug;

use super::{claim_addresses, release_claims, AddressBackend, ClaimOutcome, ClaimRequest, ClaimedAddress};
use crate::crd::PoolRef;
use crate::wait::WaitConfig;

/// Claims addresses from the pool the simulator controller serves.
///
/// The claim/release mechanics are identical to the in-cluster IPAM path;
/// only the pool differs. Simulated networks route everything, so gateway
/// requests are skipped on this backend.
pub struct SimulatorBackend {
    client: Client,
    /// Namespace the simulator's pool and its claims live in.
    namespace: String,
    /// Pool the simulator controller allocates from.
    pool_name: String,
    wait: WaitConfig,
}

impl SimulatorBackend {
    /// Create a backend claiming from the simulator's `pool_name` in
    /// `namespace`.
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

impl std::fmt::Debug for SimulatorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorBackend")
            .field("namespace", &self.namespace)
            .field("pool_name", &self.pool_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AddressBackend for SimulatorBackend {
    async fn claim(&self, request: &ClaimRequest) -> anyhow::Result<ClaimOutcome> {
        if let Some(gateway_variable) = &request.gateway_variable {
            debug!("Skipping gateway variable {gateway_variable}: simulated networks have no gateway");
        }

        claim_addresses(
            &self.client,
            &self.namespace,
            &self.pool_ref(),
            self.wait,
            request,
        )
        .await
    }

    async fn cleanup(&self, claims: &[ClaimedAddress]) -> anyhow::Result<()> {
        release_claims(&self.client, claims).await
    }
}
