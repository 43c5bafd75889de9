// Neutron Harness: Resource tracking and teardown for Neutron test topologies
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Lifecycle of a single test.
//!
//! Every test passes through the phases [`Phase::Init`], [`Phase::Provisioning`],
//! [`Phase::Running`], [`Phase::Teardown`] and [`Phase::Done`]. During provisioning, the guards of
//! the test are evaluated before anything is created; if a guard asks to skip, the body never runs
//! and the test moves straight to the teardown (which has nothing to do). Otherwise, the baseline
//! topology is created (if the suite asks for it), and the body runs. The teardown always runs,
//! whether the body passed, failed, returned an error, panicked, or skipped itself. Only after the
//! teardown has finished is the outcome returned.
//!
//! ```ignore
//! let suite = Suite::prepare("firewall", &client, &topology, &client, SuiteConfig::from_config())?;
//! suite
//!     .run(
//!         TestCase::new("block_icmp", |ctx| {
//!             let net = ctx.registrar().create_network(&NetworkSpec::new("net"))?;
//!             ensure!(net.get("admin_state_up").is_some(), "network is down");
//!             Ok(())
//!         })
//!         .require_extension("fwaas_v2"),
//!     )
//!     .check();
//! ```

use std::{
    fmt::{Display, Formatter},
    panic::{catch_unwind, AssertUnwindSafe},
};

use neutron_api::{ClientError, ControlPlane, TopologyProvider, VmProvisioner};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    baseline::Baseline,
    config::{BaselineConfig, Config, CONFIG},
    guard::{
        self, CapabilityMap, Guard, GuardContext, GuardError, RequireExtension, RequireFeature,
        RequireHosts, SkipReason,
    },
    outcome::{Status, SuiteSummary, TestOutcome},
    install_panic_hook, panic_message,
    registrar::Registrar,
    take_backtrace,
    teardown::TeardownCoordinator,
    HarnessError,
};

/// Return early from a test body with [`TestError::Assertion`] if the condition does not hold.
#[macro_export]
macro_rules! ensure {
    ($cond:expr $(,)?) => {
        if !$cond {
            return Err($crate::lifecycle::TestError::Assertion(
                concat!("assertion failed: ", stringify!($cond)).to_string(),
            ));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::lifecycle::TestError::Assertion(format!($($arg)+)));
        }
    };
}

/// Phase of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    /// Evaluating the guards and creating the baseline.
    Provisioning,
    /// The body is running.
    Running,
    /// All registered resources are deleted.
    Teardown,
    Done,
}

impl Phase {
    /// Check whether the test may move from `self` to `next`.
    pub fn can_enter(&self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Init, Phase::Provisioning)
                | (Phase::Provisioning, Phase::Running)
                | (Phase::Provisioning, Phase::Teardown)
                | (Phase::Running, Phase::Teardown)
                | (Phase::Teardown, Phase::Done)
        )
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Provisioning => "provisioning",
            Phase::Running => "running",
            Phase::Teardown => "teardown",
            Phase::Done => "done",
        })
    }
}

/// Error returned by a test body.
#[derive(Debug, Error)]
pub enum TestError {
    /// An assertion of the body failed.
    #[error("{0}")]
    Assertion(String),
    /// The body decided that the test cannot run in this environment.
    #[error("skipped: {0}")]
    Skip(SkipReason),
    /// A guard could not be evaluated.
    #[error("Cannot evaluate the preconditions: {0}")]
    Guard(#[from] GuardError),
    /// Error of the harness (including errors of the control plane).
    #[error("{0}")]
    Harness(#[from] HarnessError),
    /// The body panicked.
    #[error("panicked: {0}")]
    Panic(String),
    /// Any other error.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TestError {
    /// Skip the test from within the body.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(SkipReason::new(reason))
    }
}

impl From<ClientError> for TestError {
    fn from(e: ClientError) -> Self {
        Self::Harness(e.into())
    }
}

/// Settings shared by all tests of a suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    /// Tenant attached to all created resources.
    pub tenant: Option<String>,
    /// If set, the baseline is created before every test.
    pub baseline: Option<BaselineConfig>,
    /// Log level of failures during the teardown.
    pub failure_level: log::Level,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            tenant: None,
            baseline: None,
            failure_level: log::Level::Error,
        }
    }
}

impl From<&Config> for SuiteConfig {
    fn from(config: &Config) -> Self {
        Self {
            tenant: config.tenant.id.clone(),
            baseline: config
                .baseline
                .enabled
                .then(|| config.baseline.topology.clone()),
            failure_level: config.teardown.failure_level.into(),
        }
    }
}

impl SuiteConfig {
    /// Settings from the global configuration file.
    pub fn from_config() -> Self {
        Self::from(&*CONFIG)
    }

    /// Create the baseline before every test.
    pub fn with_baseline(mut self, baseline: BaselineConfig) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Attach a tenant to all created resources.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Everything the body of a test has access to.
pub struct TestContext<'a> {
    registrar: Registrar<'a>,
    baseline: Option<Baseline>,
    capabilities: &'a CapabilityMap,
    topology: &'a dyn TopologyProvider,
    vms: &'a dyn VmProvisioner,
}

impl<'a> TestContext<'a> {
    /// The registrar used to create (and delete) resources.
    pub fn registrar(&mut self) -> &mut Registrar<'a> {
        &mut self.registrar
    }

    /// The baseline topology, if the suite creates one.
    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Extensions supported by the control plane.
    pub fn capabilities(&self) -> &CapabilityMap {
        self.capabilities
    }

    /// The test topology.
    pub fn topology(&self) -> &dyn TopologyProvider {
        self.topology
    }

    /// The control-plane client.
    pub fn client(&self) -> &dyn ControlPlane {
        self.registrar.client()
    }

    /// The VM provisioner.
    pub fn vms(&self) -> &dyn VmProvisioner {
        self.vms
    }
}

type TestBody<'b> = Box<dyn FnOnce(&mut TestContext<'_>) -> Result<(), TestError> + 'b>;

/// A single test: its name, its guards, and its body.
pub struct TestCase<'b> {
    name: String,
    guards: Vec<Box<dyn Guard + 'b>>,
    expected_failure: Option<String>,
    body: TestBody<'b>,
}

impl<'b> std::fmt::Debug for TestCase<'b> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("guards", &self.guards)
            .field("expected_failure", &self.expected_failure)
            .finish()
    }
}

impl<'b> TestCase<'b> {
    /// Create a new test case without any guards.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&mut TestContext<'_>) -> Result<(), TestError> + 'b,
    {
        Self {
            name: name.into(),
            guards: Vec::new(),
            expected_failure: None,
            body: Box::new(body),
        }
    }

    /// Name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a guard. Guards are evaluated in the order in which they are added.
    pub fn guard(mut self, guard: impl Guard + 'b) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// Skip the test unless the control plane supports the extension.
    pub fn require_extension(self, alias: impl Into<String>) -> Self {
        self.guard(RequireExtension(alias.into()))
    }

    /// Skip the test unless the topology feature is truthy.
    pub fn require_feature(self, name: impl Into<String>) -> Self {
        self.guard(RequireFeature::truthy(name))
    }

    /// Skip the test unless all hosts are part of the topology.
    pub fn require_hosts<S: Into<String>>(self, hosts: impl IntoIterator<Item = S>) -> Self {
        self.guard(RequireHosts(hosts.into_iter().map(Into::into).collect()))
    }

    /// Mark the test as expected to fail, because of the given issue.
    pub fn expected_failure(mut self, issue: impl Into<String>) -> Self {
        self.expected_failure = Some(issue.into());
        self
    }
}

/// A suite of tests sharing the same collaborators, configuration, and capability map.
pub struct Suite<'a> {
    name: String,
    client: &'a dyn ControlPlane,
    topology: &'a dyn TopologyProvider,
    vms: &'a dyn VmProvisioner,
    config: SuiteConfig,
    capabilities: CapabilityMap,
}

impl<'a> Suite<'a> {
    /// Prepare a suite. This fetches the extensions of the control plane exactly once.
    pub fn prepare(
        name: impl Into<String>,
        client: &'a dyn ControlPlane,
        topology: &'a dyn TopologyProvider,
        vms: &'a dyn VmProvisioner,
        config: SuiteConfig,
    ) -> Result<Self, HarnessError> {
        let name = name.into();
        let capabilities = CapabilityMap::fetch(client)?;
        install_panic_hook();
        log::debug!("[suite] {name}: prepared with {config:?}");
        Ok(Self {
            name,
            client,
            topology,
            vms,
            config,
            capabilities,
        })
    }

    /// Name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extensions supported by the control plane.
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    /// Run all tests in order, and summarize their outcomes.
    pub fn run_all<'b>(&self, cases: impl IntoIterator<Item = TestCase<'b>>) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for case in cases {
            summary.record(self.run(case));
        }
        log::info!("[suite] {}: {summary}", self.name);
        summary
    }

    /// Run a single test, including its teardown.
    pub fn run(&self, case: TestCase<'_>) -> TestOutcome {
        let TestCase {
            name,
            guards,
            expected_failure,
            body,
        } = case;
        let id = format!("{}::{name}", self.name);

        let start = now();
        log::info!("[suite] {id} started at {}", timestamp(start));
        let mut phase = Phase::Init;

        let mut ctx = TestContext {
            registrar: Registrar::new(self.client, self.vms).with_tenant(self.config.tenant.clone()),
            baseline: None,
            capabilities: &self.capabilities,
            topology: self.topology,
            vms: self.vms,
        };

        enter(&id, &mut phase, Phase::Provisioning);
        let mut traceback = None;
        let guard_ctx = GuardContext {
            capabilities: &self.capabilities,
            topology: self.topology,
        };
        let result = match guard::evaluate(&guards, &guard_ctx) {
            Err(e) => Err(TestError::Guard(e)),
            Ok(Some(reason)) => Err(TestError::Skip(reason)),
            Ok(None) => match self.provision(&mut ctx) {
                Err(e) => Err(TestError::Harness(e)),
                Ok(()) => {
                    enter(&id, &mut phase, Phase::Running);
                    take_backtrace();
                    catch_unwind(AssertUnwindSafe(|| body(&mut ctx))).unwrap_or_else(|panic| {
                        traceback = take_backtrace();
                        Err(TestError::Panic(panic_message(panic.as_ref())))
                    })
                }
            },
        };

        enter(&id, &mut phase, Phase::Teardown);
        let coordinator = TeardownCoordinator::new(self.client, self.vms)
            .failure_level(self.config.failure_level);
        let teardown = ctx.registrar.teardown(&coordinator);
        enter(&id, &mut phase, Phase::Done);

        let (status, message) = classify(result, expected_failure);
        let stop = now();
        let outcome = TestOutcome {
            name,
            status,
            message,
            traceback,
            start,
            stop,
            teardown,
        };
        log::info!("[suite] {id} stopped at {}", timestamp(stop));
        if status.is_ok() {
            log::info!("[suite] {outcome}");
        } else {
            log::error!("[suite] {outcome}");
        }
        outcome
    }

    /// Create the baseline, if the suite asks for it.
    fn provision(&self, ctx: &mut TestContext<'_>) -> Result<(), HarnessError> {
        if let Some(config) = self.config.baseline.as_ref() {
            ctx.baseline = Some(Baseline::provision(&mut ctx.registrar, config)?);
        }
        Ok(())
    }
}

/// Move to the next phase.
fn enter(id: &str, phase: &mut Phase, next: Phase) {
    debug_assert!(phase.can_enter(next), "cannot move from {phase} to {next}");
    log::trace!("[suite] {id}: {phase} -> {next}");
    *phase = next;
}

/// Decide on the status and the message of a test, given the result of its body.
fn classify(
    result: Result<(), TestError>,
    expected_failure: Option<String>,
) -> (Status, Option<String>) {
    match (result, expected_failure) {
        (Err(TestError::Skip(reason)), _) => (Status::Skipped, Some(reason.to_string())),
        (Err(e @ TestError::Guard(_)), _) => (Status::Error, Some(e.to_string())),
        (Ok(()), None) => (Status::Passed, None),
        (Ok(()), Some(issue)) => (
            Status::UnexpectedSuccess,
            Some(format!("expected to fail because of {issue}")),
        ),
        (Err(e), Some(issue)) => (Status::ExpectedFailure, Some(format!("{issue}: {e}"))),
        (Err(e @ (TestError::Assertion(_) | TestError::Panic(_))), None) => {
            (Status::Failed, Some(e.to_string()))
        }
        (Err(e), None) => (Status::Error, Some(crate::error_chain(&e))),
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local()
        .ok()
        .unwrap_or_else(OffsetDateTime::now_utc)
}

fn timestamp(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}
