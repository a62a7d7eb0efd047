//! # Simulator Dependencies
//!
//! Provisioning of the derived objects a test needs when running against the
//! simulator, and the variables they resolve.
//!
//! Both provisioning flows follow the same reconciliation handshake with the
//! simulator controller: look up the singleton [`Simulator`] instance, create
//! a dependency object referencing it, and poll until the controller reports
//! it resolved. The controller's side of the handshake is outside this crate.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use tracing::{info, warn};

use crate::backend::ClaimedAddress;
use crate::constants::{
    DEFAULT_ENVIRONMENT_NAMESPACE, NAMESPACE_DEPENDENCIES_NAME, SIMULATOR_ENV_PREFIX,
    TEST_OWNED_VARIABLES,
};
use crate::crd::{
    NamespaceDependencies, NamespaceDependenciesSpec, ObjectRef, Simulator, TestEnvironment,
    TestEnvironmentSpec,
};
use crate::error::{Error, Result};
use crate::wait::{wait_for, WaitConfig};

/// Creates backend-specific dependent resources for a test case and resolves
/// the variables they produce.
#[async_trait]
pub trait DependencyProvisioner: Send + Sync {
    /// Provision dependencies for the test case and return the variables
    /// they resolved. `claims` are the claims returned by the address
    /// backend, control-plane endpoint first.
    async fn provision(
        &self,
        test_name: &str,
        claims: &[ClaimedAddress],
    ) -> Result<BTreeMap<String, String>>;
}

/// Materializes namespace-scoped dependencies once a test's workload
/// namespace exists.
#[async_trait]
pub trait NamespaceHook: Send + Sync {
    /// Create the namespace-scoped dependency set and block until it is
    /// ready. Produces no variables; the side effect is the resource
    /// existing before the test body uses the namespace.
    async fn on_namespace_created(&self, namespace: &str) -> Result<()>;
}

/// Resolve the singleton [`Simulator`] instance.
///
/// The simulator is established by the suite bootstrap before any test case
/// starts; its absence is a setup precondition failure, not a race to wait
/// out.
pub async fn find_simulator(client: &Client) -> Result<Simulator> {
    let simulators: Api<Simulator> = Api::all(client.clone());
    let list = simulators.list(&ListParams::default()).await?;

    let mut items = list.items;
    if items.len() > 1 {
        warn!(
            "Found {} Simulator instances, using the first one",
            items.len()
        );
    }
    if items.is_empty() {
        return Err(Error::dependency_not_found("Simulator"));
    }
    Ok(items.remove(0))
}

fn simulator_ref(simulator: &Simulator) -> ObjectRef {
    ObjectRef::new(
        simulator.metadata.namespace.clone().unwrap_or_default(),
        simulator.metadata.name.clone().unwrap_or_default(),
    )
}

/// Provisions a per-test [`TestEnvironment`] and returns the variables the
/// simulator controller resolves for it.
pub struct SimulatorEnvironment {
    client: Client,
    /// Namespace `TestEnvironment` objects are created in.
    namespace: String,
    wait: WaitConfig,
}

impl SimulatorEnvironment {
    /// Create a provisioner writing environments into the default namespace.
    pub fn new(client: Client, wait: WaitConfig) -> Self {
        Self {
            client,
            namespace: DEFAULT_ENVIRONMENT_NAMESPACE.to_string(),
            wait,
        }
    }
}

impl std::fmt::Debug for SimulatorEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorEnvironment")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DependencyProvisioner for SimulatorEnvironment {
    async fn provision(
        &self,
        test_name: &str,
        claims: &[ClaimedAddress],
    ) -> Result<BTreeMap<String, String>> {
        let simulator = find_simulator(&self.client).await?;
        let endpoint = claims
            .first()
            .ok_or_else(|| Error::dependency_not_found("control-plane endpoint claim"))?;

        info!("Creating TestEnvironment {}/{test_name}", self.namespace);
        let environment = TestEnvironment::new(
            test_name,
            TestEnvironmentSpec {
                simulator_ref: simulator_ref(&simulator),
                control_plane_endpoint_ref: endpoint.claim.clone(),
                // The namespace dependencies are created later by the
                // namespace hook; the controller's default dependency
                // configuration covers the gap.
                namespace_dependencies_ref: None,
            },
        );
        let environments: Api<TestEnvironment> =
            Api::namespaced(self.client.clone(), &self.namespace);
        environments
            .create(&PostParams::default(), &environment)
            .await?;

        let resolved = wait_for(
            self.wait,
            &format!("TestEnvironment {}/{test_name}", self.namespace),
            || async { Ok(environments.get(test_name).await?) },
            |environment: &TestEnvironment| {
                environment
                    .status
                    .as_ref()
                    .is_some_and(|status| !status.variables.is_empty())
            },
        )
        .await?;

        let variables = resolved
            .status
            .map(|status| status.variables)
            .unwrap_or_default();
        info!(
            "Setting {} resolved variables for {test_name}",
            variables.len()
        );
        Ok(scrub_resolved_variables(variables))
    }
}

/// Drop variables the test sets itself and clear ambient provider settings
/// that would shadow the simulated values.
fn scrub_resolved_variables(variables: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut kept = BTreeMap::new();
    for (key, value) in variables {
        if TEST_OWNED_VARIABLES.contains(&key.as_str()) {
            continue;
        }
        // In CI the process environment carries real provider credentials
        // under the same names; downstream tooling prefers the environment
        // over the config file, so the ambient value has to go.
        if key.starts_with(SIMULATOR_ENV_PREFIX) && std::env::var_os(&key).is_some() {
            std::env::remove_var(&key);
        }
        kept.insert(key, value);
    }
    kept
}

/// Creates the fixed-name [`NamespaceDependencies`] object in each workload
/// namespace and waits for the simulator controller to resolve it.
pub struct SimulatorNamespaceHook {
    client: Client,
    wait: WaitConfig,
}

impl SimulatorNamespaceHook {
    /// Create the hook.
    pub fn new(client: Client, wait: WaitConfig) -> Self {
        Self { client, wait }
    }
}

impl std::fmt::Debug for SimulatorNamespaceHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorNamespaceHook").finish_non_exhaustive()
    }
}

#[async_trait]
impl NamespaceHook for SimulatorNamespaceHook {
    async fn on_namespace_created(&self, namespace: &str) -> Result<()> {
        let simulator = find_simulator(&self.client).await?;

        info!("Creating NamespaceDependencies {namespace}/{NAMESPACE_DEPENDENCIES_NAME}");
        let dependencies = NamespaceDependencies::new(
            NAMESPACE_DEPENDENCIES_NAME,
            NamespaceDependenciesSpec {
                simulator_ref: simulator_ref(&simulator),
            },
        );
        let api: Api<NamespaceDependencies> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), &dependencies).await?;

        wait_for(
            self.wait,
            &format!("NamespaceDependencies {namespace}/{NAMESPACE_DEPENDENCIES_NAME}"),
            || async { Ok(api.get(NAMESPACE_DEPENDENCIES_NAME).await?) },
            |dependencies: &NamespaceDependencies| {
                dependencies
                    .status
                    .as_ref()
                    .is_some_and(|status| status.ready)
            },
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_owned_variables_are_dropped() {
        let scrubbed = scrub_resolved_variables(resolved(&[
            ("NAMESPACE", "stale"),
            ("CLUSTER_NAME", "stale"),
            ("KUBERNETES_VERSION", "v1.99.0"),
            ("CONTROL_PLANE_MACHINE_COUNT", "42"),
            ("WORKER_MACHINE_COUNT", "42"),
            ("SIM_SSH_AUTHORIZED_KEY", "ssh-rsa stale"),
            ("SIM_SERVER", "sim.invalid"),
        ]));

        assert_eq!(scrubbed, resolved(&[("SIM_SERVER", "sim.invalid")]));
    }

    #[test]
    fn ambient_provider_variables_are_cleared() {
        // Unique name so concurrently running tests cannot interfere.
        let key = "SIM_SCRUB_AMBIENT_TOKEN";
        std::env::set_var(key, "from-ci");

        let scrubbed = scrub_resolved_variables(resolved(&[(key, "from-simulator")]));

        assert_eq!(std::env::var_os(key), None);
        assert_eq!(scrubbed.get(key).map(String::as_str), Some("from-simulator"));
    }

    #[test]
    fn unprefixed_variables_leave_the_environment_alone() {
        let key = "E2E_TESTENV_UNPREFIXED_TOKEN";
        std::env::set_var(key, "ambient");

        let scrubbed = scrub_resolved_variables(resolved(&[(key, "resolved")]));

        assert_eq!(std::env::var(key).as_deref(), Ok("ambient"));
        assert_eq!(scrubbed.get(key).map(String::as_str), Some("resolved"));
        std::env::remove_var(key);
    }
}
