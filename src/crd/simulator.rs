//! Simulator-owned resources: the singleton instance and the dependency
//! objects it resolves for tests.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ObjectRef;

/// A simulated infrastructure instance.
///
/// Exactly one `Simulator` is expected to exist per management cluster; it is
/// established by the suite bootstrap before any test case runs. The harness
/// only reads it.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "simulator.testenv.io",
    version = "v1alpha1",
    kind = "Simulator",
    namespaced,
    status = "SimulatorStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSpec {
    /// Number of simulated failure domains exposed to workload clusters.
    #[serde(default)]
    pub failure_domains: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorStatus {
    /// True once the simulated infrastructure API is serving.
    #[serde(default)]
    pub ready: bool,
    /// Host the simulated infrastructure API listens on.
    #[serde(default)]
    pub host: Option<String>,
}

/// Per-test environment derived from the simulator.
///
/// The simulator controller resolves this into the variable set a test needs
/// to talk to the simulated infrastructure (endpoints, credentials,
/// datacenter paths). The variables must not be read before the status map
/// is observed non-empty.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "simulator.testenv.io",
    version = "v1alpha1",
    kind = "TestEnvironment",
    namespaced,
    status = "TestEnvironmentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TestEnvironmentSpec {
    /// Simulator instance the variables are derived from.
    pub simulator_ref: ObjectRef,
    /// Address claim holding the workload cluster's control-plane endpoint.
    pub control_plane_endpoint_ref: ObjectRef,
    /// Namespace-scoped dependency set, when one already exists. Unset lets
    /// the controller fall back to its default dependency configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_dependencies_ref: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestEnvironmentStatus {
    /// Variables resolved by the simulator controller. Empty until reconciled.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Namespace-scoped dependency set for workload clusters.
///
/// Created once a test's workload namespace exists; the simulator controller
/// reports readiness after the namespace's prerequisites (content libraries,
/// default dependency configuration) are in place.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "simulator.testenv.io",
    version = "v1alpha1",
    kind = "NamespaceDependencies",
    namespaced,
    status = "NamespaceDependenciesStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDependenciesSpec {
    /// Simulator instance the dependencies are materialized from.
    pub simulator_ref: ObjectRef,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDependenciesStatus {
    /// True once every namespace-scoped prerequisite is resolved.
    #[serde(default)]
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_variables_default_to_empty() {
        let status: TestEnvironmentStatus =
            serde_yaml::from_str("{}").expect("empty status parses");
        assert!(status.variables.is_empty());
    }

    #[test]
    fn test_environment_spec_uses_camel_case_refs() {
        let spec = TestEnvironmentSpec {
            simulator_ref: ObjectRef::new("default", "simulator"),
            control_plane_endpoint_ref: ObjectRef::new("e2e-ipam", "quick-start-endpoint"),
            namespace_dependencies_ref: None,
        };
        let yaml = serde_yaml::to_string(&spec).expect("spec serializes");
        assert!(yaml.contains("simulatorRef"));
        assert!(yaml.contains("controlPlaneEndpointRef"));
        assert!(!yaml.contains("namespaceDependenciesRef"));
    }

    #[test]
    fn namespace_dependencies_report_not_ready_by_default() {
        let status: NamespaceDependenciesStatus =
            serde_yaml::from_str("{}").expect("empty status parses");
        assert!(!status.ready);
    }
}
