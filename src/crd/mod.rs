//! # Resource Types
//!
//! Custom resource definitions the harness creates and watches.
//!
//! The harness is a client of two controller-owned APIs:
//!
//! - `ipam.testenv.io`: address pools and the claims allocated from them
//! - `simulator.testenv.io`: the simulator singleton and the per-test /
//!   per-namespace dependency objects it resolves
//!
//! All status fields here are populated by external controllers; the harness
//! only creates the objects and polls them for readiness.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod claim;
pub mod simulator;

pub use claim::{AddressClaim, AddressClaimSpec, AddressClaimStatus, AddressPool, AddressPoolSpec, PoolRef};
pub use simulator::{
    NamespaceDependencies, NamespaceDependenciesSpec, NamespaceDependenciesStatus, Simulator,
    SimulatorSpec, SimulatorStatus, TestEnvironment, TestEnvironmentSpec, TestEnvironmentStatus,
};

/// Namespace + name reference to another object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    /// Create a reference from a namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ref_displays_as_namespace_slash_name() {
        let reference = ObjectRef::new("e2e-ipam", "quick-start-control-plane-endpoint-ip");
        assert_eq!(
            reference.to_string(),
            "e2e-ipam/quick-start-control-plane-endpoint-ip"
        );
    }
}
