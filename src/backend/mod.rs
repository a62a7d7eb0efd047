//! # Address Claim Backends
//!
//! Pluggable sources of exclusively-allocated network addresses.
//!
//! Two interchangeable backends implement the same claim/release contract:
//! [`ipam::IpamBackend`] claims against the in-cluster IPAM controller and
//! [`simulator::SimulatorBackend`] against the simulator controller's
//! allocator. The harness selects one per process based on the run target;
//! call sites only see the [`AddressBackend`] trait.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::{error, info, warn};

use crate::constants::CONTROL_PLANE_ENDPOINT_VARIABLE;
use crate::crd::{AddressClaim, AddressClaimSpec, ObjectRef, PoolRef};
use crate::wait::{wait_for, WaitConfig};

pub mod ipam;
pub mod simulator;

pub use ipam::IpamBackend;
pub use simulator::SimulatorBackend;

/// One allocated address, tied to the test case that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedAddress {
    /// Identity of the claim object in the cluster.
    pub claim: ObjectRef,
    /// Variable name the claim's address feeds.
    pub variable: String,
}

/// What a test case asks a backend to allocate.
#[derive(Debug, Clone, Default)]
pub struct ClaimRequest {
    /// Test case the claims belong to; claim names derive from it so that
    /// concurrent test cases never collide.
    pub test_name: String,
    /// Caller-declared variables, one extra address each.
    pub extra_variables: Vec<String>,
    /// Variable receiving the pool gateway, on backends that track one.
    pub gateway_variable: Option<String>,
}

/// Claims plus the variables they resolved to.
#[derive(Debug, Clone, Default)]
pub struct ClaimOutcome {
    /// Allocated claims, control-plane endpoint first.
    pub claims: Vec<ClaimedAddress>,
    /// Resolved variable values, one per claim (plus the gateway when
    /// requested).
    pub variables: BTreeMap<String, String>,
}

/// Source of exclusively-allocated addresses for one test case.
#[async_trait]
pub trait AddressBackend: Send + Sync {
    /// Allocate one address per requested variable.
    ///
    /// An address for [`CONTROL_PLANE_ENDPOINT_VARIABLE`] is always claimed
    /// in addition to the request's extra variables, and it is the FIRST
    /// claim in the returned list. Callers rely on that ordering.
    async fn claim(&self, request: &ClaimRequest) -> anyhow::Result<ClaimOutcome>;

    /// Release the given claims.
    ///
    /// Called exactly once per test case, with exactly the claims returned by
    /// the matching [`AddressBackend::claim`] call. A claim that cannot be
    /// released is an address leak and must surface as an error.
    async fn cleanup(&self, claims: &[ClaimedAddress]) -> anyhow::Result<()>;
}

/// Derive a claim object name from the test case and variable it feeds.
///
/// Lowercased and restricted to DNS-1123 label characters so the name is
/// accepted by the API server regardless of how the variable is spelled.
pub(crate) fn claim_object_name(test_name: &str, variable: &str) -> String {
    let raw = format!("{test_name}-{variable}");
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '_' | ' ' | '.' | '/' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' => c,
            _ => '-',
        })
        .collect();
    while name.contains("--") {
        name = name.replace("--", "-");
    }
    name.trim_matches('-').to_string()
}

/// Create one claim per variable against `pool` and wait for each allocation.
pub(crate) async fn claim_addresses(
    client: &Client,
    namespace: &str,
    pool: &PoolRef,
    wait: WaitConfig,
    request: &ClaimRequest,
) -> anyhow::Result<ClaimOutcome> {
    let mut variables = Vec::with_capacity(request.extra_variables.len() + 1);
    variables.push(CONTROL_PLANE_ENDPOINT_VARIABLE.to_string());
    variables.extend(request.extra_variables.iter().cloned());

    info!("Getting IP for {}", variables.join(","));

    let claims: Api<AddressClaim> = Api::namespaced(client.clone(), namespace);
    let mut outcome = ClaimOutcome::default();
    for variable in &variables {
        let name = claim_object_name(&request.test_name, variable);
        let claim = AddressClaim::new(
            &name,
            AddressClaimSpec {
                pool_ref: pool.clone(),
            },
        );
        claims
            .create(&PostParams::default(), &claim)
            .await
            .with_context(|| format!("creating address claim {namespace}/{name}"))?;

        let resolved = wait_for(
            wait,
            &format!("AddressClaim {namespace}/{name}"),
            || async { Ok(claims.get(&name).await?) },
            |claim: &AddressClaim| {
                claim
                    .status
                    .as_ref()
                    .is_some_and(|status| status.address.is_some())
            },
        )
        .await?;

        let address = resolved
            .status
            .and_then(|status| status.address)
            .unwrap_or_default();
        info!("Allocated {address} for {variable}");

        outcome.variables.insert(variable.clone(), address);
        outcome.claims.push(ClaimedAddress {
            claim: ObjectRef::new(namespace, &name),
            variable: variable.clone(),
        });
    }

    Ok(outcome)
}

/// Delete the given claims, reporting every one that could not be released.
pub(crate) async fn release_claims(
    client: &Client,
    claims: &[ClaimedAddress],
) -> anyhow::Result<()> {
    let mut leaked = Vec::new();
    for claimed in claims {
        let api: Api<AddressClaim> = Api::namespaced(client.clone(), &claimed.claim.namespace);
        match api.delete(&claimed.claim.name, &DeleteParams::default()).await {
            Ok(_) => info!("Released address claim {}", claimed.claim),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                warn!("Address claim {} was already gone", claimed.claim);
            }
            Err(err) => {
                error!("Failed to release address claim {}: {err}", claimed.claim);
                leaked.push(claimed.claim.to_string());
            }
        }
    }

    if leaked.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("leaked address claims: {}", leaked.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_names_are_dns_safe() {
        assert_eq!(
            claim_object_name("quick-start", "CONTROL_PLANE_ENDPOINT_IP"),
            "quick-start-control-plane-endpoint-ip"
        );
        assert_eq!(
            claim_object_name("MD Rollout", "NODE_VIP"),
            "md-rollout-node-vip"
        );
    }

    #[test]
    fn claim_names_collapse_repeated_dashes() {
        assert_eq!(claim_object_name("a--b", "_X__Y_"), "a-b-x-y");
    }

    #[test]
    fn claim_requests_default_to_endpoint_only() {
        let request = ClaimRequest {
            test_name: "quick-start".to_string(),
            ..ClaimRequest::default()
        };
        assert!(request.extra_variables.is_empty());
        assert!(request.gateway_variable.is_none());
    }
}
