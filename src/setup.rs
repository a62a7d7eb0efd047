//! # Test Context Setup
//!
//! The per-test lifecycle driver.
//!
//! [`TestEnv`] is built once per process and sequences every test case
//! through the same states: claim addresses, provision simulator
//! dependencies (simulator target only), write the per-test config overlay,
//! run the test body, release the claims. Claims are released on success,
//! failure, and panic alike - an unreleased claim starves every test case
//! that runs after it.
//!
//! ## Run selection
//!
//! The address backend and the dependency ports are selected exactly once,
//! when the environment is built, driven by [`RunTarget`] and [`RunMode`].
//! Call sites never branch on the target themselves.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use kube::Client;
use serde_yaml::Value;
use tracing::{error, info};

use crate::backend::{
    AddressBackend, ClaimOutcome, ClaimRequest, ClaimedAddress, IpamBackend, SimulatorBackend,
};
use crate::config::{amend_config, read_config, test_config_path};
use crate::constants::{CLUSTER_CLASS_VARIABLE, DEFAULT_MANAGED_FLAVOR, MANAGED_FLAVOR_SUFFIX};
use crate::environment::{
    DependencyProvisioner, NamespaceHook, SimulatorEnvironment, SimulatorNamespaceHook,
};
use crate::error::{Error, Result};
use crate::wait::WaitConfig;

/// Which allocator the suite runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunTarget {
    /// Real infrastructure with the in-cluster IPAM controller.
    InCluster,
    /// The simulator controller and its allocator.
    Simulator,
}

impl RunTarget {
    /// Read the target from the `E2E_TARGET` environment variable.
    /// Anything other than `simulator` selects the in-cluster target.
    pub fn from_env() -> Self {
        match std::env::var("E2E_TARGET").as_deref() {
            Ok("simulator") => Self::Simulator,
            _ => Self::InCluster,
        }
    }
}

/// Which provisioning mode the suite exercises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Clusters are provisioned directly.
    Standard,
    /// Clusters are provisioned through the managed control plane; flavors
    /// carry the managed suffix and workload namespaces need the
    /// namespace-scoped dependency set.
    Managed,
}

impl RunMode {
    /// Read the mode from the `E2E_MODE` environment variable.
    /// Anything other than `managed` selects the standard mode.
    pub fn from_env() -> Self {
        match std::env::var("E2E_MODE").as_deref() {
            Ok("managed") => Self::Managed,
            _ => Self::Standard,
        }
    }
}

/// What a cleanup failure does to the rest of the suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Fail the test case that leaked; later test cases still run.
    FailTest,
    /// Fail the test case that leaked and refuse to start any later test
    /// case, so the leak is investigated before it cascades.
    Halt,
}

/// Per-test configuration options.
#[derive(Clone, Debug, Default)]
pub struct SetupOptions {
    extra_ip_variables: Vec<String>,
    gateway_variable: Option<String>,
}

impl SetupOptions {
    /// Options requesting only the implicit control-plane endpoint address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate another address and store it into `variable`.
    ///
    /// An address for the control-plane endpoint is always allocated, even
    /// without any `with_ip` calls.
    #[must_use]
    pub fn with_ip(mut self, variable: impl Into<String>) -> Self {
        self.extra_ip_variables.push(variable.into());
        self
    }

    /// Store the address pool's gateway into `variable` (in-cluster target
    /// only).
    #[must_use]
    pub fn with_gateway(mut self, variable: impl Into<String>) -> Self {
        self.gateway_variable = Some(variable.into());
        self
    }
}

/// Immutable settings handed to the test body.
#[derive(Clone)]
pub struct TestSettings {
    /// Per-test config overlay with every resolved variable merged in.
    pub config_path: PathBuf,
    /// Present only in managed mode: invoke once the workload namespace
    /// exists, before workloads are created in it.
    pub post_namespace_created: Option<Arc<dyn NamespaceHook>>,
    mode: RunMode,
}

impl TestSettings {
    /// Map a flavor name to the one the current mode provisions.
    ///
    /// Managed-mode flavors are the corresponding standard flavors with the
    /// managed suffix; the empty flavor maps to the default managed flavor.
    /// In standard mode this is the identity function.
    pub fn flavor_for_mode(&self, flavor: &str) -> String {
        match self.mode {
            RunMode::Managed => {
                if flavor.is_empty() {
                    DEFAULT_MANAGED_FLAVOR.to_string()
                } else {
                    format!("{flavor}{MANAGED_FLAVOR_SUFFIX}")
                }
            }
            RunMode::Standard => flavor.to_string(),
        }
    }
}

impl std::fmt::Debug for TestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSettings")
            .field("config_path", &self.config_path)
            .field(
                "post_namespace_created",
                &self.post_namespace_created.is_some(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

enum BodyOutcome {
    Completed(Result<()>),
    Panicked(Box<dyn std::any::Any + Send + 'static>),
}

/// The process-wide test environment driver.
///
/// Built once by [`TestEnvBuilder`]; each test case then runs through
/// [`TestEnv::run_test`].
pub struct TestEnv {
    backend: Arc<dyn AddressBackend>,
    provisioner: Option<Arc<dyn DependencyProvisioner>>,
    namespace_hook: Option<Arc<dyn NamespaceHook>>,
    mode: RunMode,
    base_config: PathBuf,
    cleanup_policy: CleanupPolicy,
    halted: AtomicBool,
}

impl std::fmt::Debug for TestEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnv")
            .field("mode", &self.mode)
            .field("base_config", &self.base_config)
            .field("cleanup_policy", &self.cleanup_policy)
            .finish_non_exhaustive()
    }
}

impl TestEnv {
    /// Provision an isolated environment for `test_name`, run `body` against
    /// it, and tear the environment down again.
    ///
    /// Teardown releases exactly the claims obtained during setup and runs
    /// regardless of whether the body succeeded, failed, or panicked. A
    /// panic is re-raised after the claims are released.
    pub async fn run_test<F, Fut>(
        &self,
        test_name: &str,
        options: SetupOptions,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(TestSettings) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if self.halted.load(Ordering::SeqCst) {
            return Err(Error::Halted);
        }

        info!("Setting up test env for {test_name}");

        let request = ClaimRequest {
            test_name: test_name.to_string(),
            extra_variables: options.extra_ip_variables,
            gateway_variable: options.gateway_variable,
        };
        // Allocation failures are not transient; abort before anything that
        // would need tearing down.
        let ClaimOutcome { claims, variables } =
            self.backend
                .claim(&request)
                .await
                .map_err(|source| Error::Allocation {
                    test_name: test_name.to_string(),
                    source,
                })?;

        let body_outcome = self
            .prepare_and_run(test_name, &claims, variables, body)
            .await;

        info!("Cleaning up test env for {test_name}");
        let cleanup_result = self
            .backend
            .cleanup(&claims)
            .await
            .map_err(|source| Error::Cleanup {
                test_name: test_name.to_string(),
                source,
            });

        if let Err(cleanup_error) = &cleanup_result {
            error!("{cleanup_error}");
            if self.cleanup_policy == CleanupPolicy::Halt {
                self.halted.store(true, Ordering::SeqCst);
            }
        }

        match (body_outcome, cleanup_result) {
            // The panic carries the original assertion failure; cleanup
            // errors were logged above before re-raising it.
            (BodyOutcome::Panicked(payload), _) => std::panic::resume_unwind(payload),
            (BodyOutcome::Completed(Ok(())), Ok(())) => Ok(()),
            (BodyOutcome::Completed(Ok(())), Err(cleanup_error)) => Err(cleanup_error),
            (BodyOutcome::Completed(Err(failure)), Ok(())) => Err(failure),
            (BodyOutcome::Completed(Err(failure)), Err(cleanup_error)) => {
                Err(Error::CleanupAfterFailure {
                    failure: Box::new(failure),
                    cleanup: anyhow::Error::new(cleanup_error),
                })
            }
        }
    }

    async fn prepare_and_run<F, Fut>(
        &self,
        test_name: &str,
        claims: &[ClaimedAddress],
        mut variables: BTreeMap<String, String>,
        body: F,
    ) -> BodyOutcome
    where
        F: FnOnce(TestSettings) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if let Some(provisioner) = &self.provisioner {
            match provisioner.provision(test_name, claims).await {
                // Resolved variables override same-named claim variables.
                Ok(resolved) => variables.extend(resolved),
                Err(err) => return BodyOutcome::Completed(Err(err)),
            }
        }

        if self.mode == RunMode::Managed {
            if let Err(err) = self.suffix_cluster_class(&mut variables) {
                return BodyOutcome::Completed(Err(err));
            }
        }

        let config_path = test_config_path(&self.base_config, test_name);
        info!("Writing test config to {}", config_path.display());
        if let Err(err) = amend_config(&self.base_config, &config_path, &variables) {
            return BodyOutcome::Completed(Err(err));
        }

        let settings = TestSettings {
            config_path,
            post_namespace_created: self.namespace_hook.clone(),
            mode: self.mode,
        };

        match AssertUnwindSafe(body(settings)).catch_unwind().await {
            Ok(Ok(())) => BodyOutcome::Completed(Ok(())),
            Ok(Err(err)) => BodyOutcome::Completed(Err(Error::Body(err))),
            Err(payload) => BodyOutcome::Panicked(payload),
        }
    }

    /// Managed-mode clusters are provisioned from the managed variant of the
    /// suite's cluster class, so the variable is rewritten with the mode
    /// suffix wherever it is declared.
    fn suffix_cluster_class(&self, variables: &mut BTreeMap<String, String>) -> Result<()> {
        let current = match variables.get(CLUSTER_CLASS_VARIABLE) {
            Some(value) => Some(value.clone()),
            None => read_config(&self.base_config)?
                .get(CLUSTER_CLASS_VARIABLE)
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        if let Some(value) = current {
            variables.insert(
                CLUSTER_CLASS_VARIABLE.to_string(),
                format!("{value}{MANAGED_FLAVOR_SUFFIX}"),
            );
        }
        Ok(())
    }
}

/// Builder wiring a [`TestEnv`] for the selected target and mode.
///
/// Production callers pass a client and let the builder select the concrete
/// backend and dependency ports; tests can substitute any of the three ports
/// directly.
pub struct TestEnvBuilder {
    base_config: PathBuf,
    target: RunTarget,
    mode: RunMode,
    wait: WaitConfig,
    cleanup_policy: CleanupPolicy,
    claim_namespace: String,
    pool_name: String,
    client: Option<Client>,
    backend: Option<Arc<dyn AddressBackend>>,
    provisioner: Option<Arc<dyn DependencyProvisioner>>,
    namespace_hook: Option<Arc<dyn NamespaceHook>>,
}

impl std::fmt::Debug for TestEnvBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnvBuilder")
            .field("base_config", &self.base_config)
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("cleanup_policy", &self.cleanup_policy)
            .finish_non_exhaustive()
    }
}

impl TestEnvBuilder {
    /// Start building an environment around the given base config.
    pub fn new(base_config: impl Into<PathBuf>) -> Self {
        Self {
            base_config: base_config.into(),
            target: RunTarget::InCluster,
            mode: RunMode::Standard,
            wait: WaitConfig::default(),
            cleanup_policy: CleanupPolicy::FailTest,
            claim_namespace: "e2e-ipam".to_string(),
            pool_name: "e2e-default".to_string(),
            client: None,
            backend: None,
            provisioner: None,
            namespace_hook: None,
        }
    }

    /// Select the allocator the suite runs against.
    #[must_use]
    pub fn target(mut self, target: RunTarget) -> Self {
        self.target = target;
        self
    }

    /// Select the provisioning mode the suite exercises.
    #[must_use]
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the poll interval and budget used for readiness waits.
    #[must_use]
    pub fn wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Choose what a cleanup failure does to the rest of the suite.
    #[must_use]
    pub fn cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup_policy = policy;
        self
    }

    /// Namespace address claims are created in.
    #[must_use]
    pub fn claim_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.claim_namespace = namespace.into();
        self
    }

    /// Pool addresses are drawn from.
    #[must_use]
    pub fn pool_name(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    /// Client used by the concrete backend and dependency ports.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Substitute the address backend.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn AddressBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Substitute the dependency provisioner (normally wired only for the
    /// simulator target).
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn DependencyProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Substitute the namespace hook (normally wired only in managed mode).
    #[must_use]
    pub fn namespace_hook(mut self, hook: Arc<dyn NamespaceHook>) -> Self {
        self.namespace_hook = Some(hook);
        self
    }

    /// Wire the environment.
    ///
    /// A client is required unless every port the selected target and mode
    /// need has been substituted.
    pub fn build(self) -> anyhow::Result<TestEnv> {
        let backend: Arc<dyn AddressBackend> = match self.backend {
            Some(backend) => backend,
            None => {
                let client = self
                    .client
                    .clone()
                    .context("a kube client is required unless a backend is substituted")?;
                match self.target {
                    RunTarget::InCluster => Arc::new(IpamBackend::new(
                        client,
                        &self.claim_namespace,
                        &self.pool_name,
                        self.wait,
                    )),
                    RunTarget::Simulator => Arc::new(SimulatorBackend::new(
                        client,
                        &self.claim_namespace,
                        &self.pool_name,
                        self.wait,
                    )),
                }
            }
        };

        let provisioner: Option<Arc<dyn DependencyProvisioner>> =
            match (self.provisioner, self.target) {
                (Some(provisioner), _) => Some(provisioner),
                (None, RunTarget::Simulator) => {
                    let client = self
                        .client
                        .clone()
                        .context("a kube client is required for the simulator target")?;
                    Some(Arc::new(SimulatorEnvironment::new(client, self.wait)))
                }
                (None, RunTarget::InCluster) => None,
            };

        let namespace_hook: Option<Arc<dyn NamespaceHook>> = match self.mode {
            RunMode::Managed => match self.namespace_hook {
                Some(hook) => Some(hook),
                None => {
                    let client = self
                        .client
                        .context("a kube client is required for managed mode")?;
                    Some(Arc::new(SimulatorNamespaceHook::new(client, self.wait)))
                }
            },
            RunMode::Standard => None,
        };

        Ok(TestEnv {
            backend,
            provisioner,
            namespace_hook,
            mode: self.mode,
            base_config: self.base_config,
            cleanup_policy: self.cleanup_policy,
            halted: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: RunMode) -> TestSettings {
        TestSettings {
            config_path: PathBuf::from("/tmp/e2e/config-test.yaml"),
            post_namespace_created: None,
            mode,
        }
    }

    #[test]
    fn managed_mode_suffixes_flavors() {
        let settings = settings(RunMode::Managed);
        assert_eq!(settings.flavor_for_mode(""), "managed");
        assert_eq!(settings.flavor_for_mode("topology"), "topology-managed");
    }

    #[test]
    fn standard_mode_keeps_flavors_unchanged() {
        let settings = settings(RunMode::Standard);
        assert_eq!(settings.flavor_for_mode(""), "");
        assert_eq!(settings.flavor_for_mode("topology"), "topology");
    }

    #[test]
    fn setup_options_accumulate_ip_variables() {
        let options = SetupOptions::new()
            .with_ip("NODE_VIP")
            .with_ip("SECOND_VIP")
            .with_gateway("GATEWAY_IP");
        assert_eq!(options.extra_ip_variables, ["NODE_VIP", "SECOND_VIP"]);
        assert_eq!(options.gateway_variable.as_deref(), Some("GATEWAY_IP"));
    }

    #[test]
    fn run_target_defaults_to_in_cluster() {
        std::env::remove_var("E2E_TARGET");
        assert_eq!(RunTarget::from_env(), RunTarget::InCluster);

        std::env::set_var("E2E_TARGET", "simulator");
        assert_eq!(RunTarget::from_env(), RunTarget::Simulator);
        std::env::remove_var("E2E_TARGET");
    }

    #[test]
    fn run_mode_defaults_to_standard() {
        std::env::remove_var("E2E_MODE");
        assert_eq!(RunMode::from_env(), RunMode::Standard);

        std::env::set_var("E2E_MODE", "managed");
        assert_eq!(RunMode::from_env(), RunMode::Managed);
        std::env::remove_var("E2E_MODE");
    }
}
