//! # Constants
//!
//! Shared constants used throughout the test environment harness.
//!
//! These values represent the suite-wide conventions; the timing values can be
//! overridden per harness via [`crate::wait::WaitConfig`].

use std::time::Duration;

/// Variable that always receives the first allocated address.
///
/// Every setup allocates an address for the workload cluster's control-plane
/// endpoint, even when the test declares no extra addresses.
pub const CONTROL_PLANE_ENDPOINT_VARIABLE: &str = "CONTROL_PLANE_ENDPOINT_IP";

/// Variable rewritten with the mode suffix when running in managed mode.
pub const CLUSTER_CLASS_VARIABLE: &str = "CLUSTER_CLASS_NAME";

/// Prefix of provider variables resolved by the simulator controller.
///
/// CI environments carry real provider credentials under the same names; any
/// ambient variable with this prefix is cleared before a simulated value for
/// it is adopted.
pub const SIMULATOR_ENV_PREFIX: &str = "SIM_";

/// Resolved variables the test body sets itself.
///
/// A stale simulated value for one of these would silently override the
/// test's own choice, so they are dropped from every resolved variable set.
pub const TEST_OWNED_VARIABLES: [&str; 6] = [
    "NAMESPACE",
    "CLUSTER_NAME",
    "KUBERNETES_VERSION",
    "CONTROL_PLANE_MACHINE_COUNT",
    "WORKER_MACHINE_COUNT",
    "SIM_SSH_AUTHORIZED_KEY",
];

/// Suffix appended to flavor names and the cluster class in managed mode.
pub const MANAGED_FLAVOR_SUFFIX: &str = "-managed";

/// Flavor provisioned in managed mode when the test asks for the empty flavor.
pub const DEFAULT_MANAGED_FLAVOR: &str = "managed";

/// Fixed name of the `NamespaceDependencies` object created per workload namespace.
pub const NAMESPACE_DEPENDENCIES_NAME: &str = "simulator";

/// Namespace `TestEnvironment` objects are created in.
pub const DEFAULT_ENVIRONMENT_NAMESPACE: &str = "default";

/// Default poll interval for readiness waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall budget for readiness waits.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);
