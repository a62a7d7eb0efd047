//! # e2e-testenv
//!
//! Per-test environment provisioning for cluster-provisioning integration tests.
//!
//! ## Overview
//!
//! Every test case in the e2e suite needs its own slice of the shared test
//! infrastructure:
//!
//! 1. **Address claims** - one or more uniquely-allocated network addresses,
//!    drawn either from the in-cluster IPAM controller or from the simulator
//!    controller's allocator
//! 2. **Simulator dependencies** - on the simulator target, a `TestEnvironment`
//!    object that the simulator controller resolves into a concrete variable set
//! 3. **Config overlay** - a private copy of the shared base configuration with
//!    the resolved variables merged in, written to a per-test path
//!
//! [`setup::TestEnv`] drives the full lifecycle around the test body and
//! guarantees that claimed addresses are released on success, failure, and
//! panic alike.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use e2e_testenv::setup::{RunMode, RunTarget, SetupOptions, TestEnvBuilder};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let env = TestEnvBuilder::new("/tmp/e2e/clusterctl-config.yaml")
//!     .target(RunTarget::from_env())
//!     .mode(RunMode::from_env())
//!     .client(client)
//!     .build()?;
//!
//! env.run_test("quick-start", SetupOptions::new().with_ip("WORKLOAD_VIP"), |settings| async move {
//!     // The per-test config overlay is ready for downstream tooling.
//!     println!("config at {}", settings.config_path.display());
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod crd;
pub mod environment;
pub mod error;
pub mod setup;
pub mod telemetry;
pub mod wait;

pub use backend::{AddressBackend, ClaimOutcome, ClaimRequest, ClaimedAddress};
pub use error::{Error, Result};
pub use setup::{CleanupPolicy, RunMode, RunTarget, SetupOptions, TestEnv, TestEnvBuilder, TestSettings};
pub use wait::{wait_for, WaitConfig};
