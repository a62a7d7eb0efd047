//! Address pool and claim resources served by the allocation controllers.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the pool a claim is served from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolRef {
    pub kind: String,
    pub name: String,
}

/// A request for one exclusively-allocated address.
///
/// The pool's controller resolves the claim by writing the allocated address
/// into the status. A claim belongs to exactly one test case and is deleted
/// by that test case's teardown.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ipam.testenv.io",
    version = "v1alpha1",
    kind = "AddressClaim",
    namespaced,
    status = "AddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AddressClaimSpec {
    /// Pool the address is drawn from.
    pub pool_ref: PoolRef,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressClaimStatus {
    /// Address allocated by the pool controller; unset until allocation.
    #[serde(default)]
    pub address: Option<String>,
}

/// A range of addresses a controller allocates claims from.
///
/// The harness never creates or mutates pools; it reads them to resolve the
/// network gateway for tests that ask for it.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ipam.testenv.io",
    version = "v1alpha1",
    kind = "AddressPool",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressPoolSpec {
    /// CIDR the pool allocates from.
    pub subnet: String,
    /// Gateway of the pool's network, when the pool tracks one.
    #[serde(default)]
    pub gateway: Option<String>,
}
