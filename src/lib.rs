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

//! This library is the core of an integration test suite for a control plane exposing a
//! Neutron-compatible networking API. It tracks every resource a test creates, and deletes all of
//! them again once the test is done, in an order that respects the dependencies between them. Tests
//! can declare preconditions that decide whether they run at all.
//!
//! # Components
//!
//! - [`registry::ResourceRegistry`]: one ordered registry per resource kind, containing everything
//!   that was created and not yet deleted.
//! - [`registrar::Registrar`]: typed `create_*` and `delete_*` operations for every resource kind,
//!   which keep the registry up to date. A resource is only registered once the control plane has
//!   created it.
//! - [`teardown::TeardownCoordinator`]: deletes everything in the registry in a fixed dependency
//!   order. A single deletion that fails is logged and reported, but never stops the teardown.
//! - [`guard`]: preconditions on the extensions of the control plane, on features of the test
//!   topology, and on available hosts.
//! - [`lifecycle::Suite`]: runs test cases. Each test evaluates its guards, creates the baseline
//!   topology (if configured), runs its body, and tears everything down, no matter how the body
//!   ended.
//!
//! The collaborators (the control-plane client, the topology, and the VM provisioner) are defined
//! in the `neutron-api` crate. Enable its `mock` feature to get in-memory implementations.
//!
//! # Configuration
//!
//! The configuration is read from `config.toml` in the directory stored in the environment variable
//! `NEUTRON_HARNESS_CONFIG`. See [`config::Config`] for its content.
//!
//! # Logging
//!
//! All components log using the `log` crate. Call [`init_logging`] to print the log to stderr
//! (configured with `RUST_LOG`). Failures during teardown are logged at level `error` (or `warn`,
//! see [`config::FailureLevel`]).

use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    error::Error as StdError,
    sync::Once,
};

use neutron_api::ClientError;
use thiserror::Error;

pub mod baseline;
pub mod config;
pub mod guard;
pub mod lifecycle;
pub mod outcome;
pub mod registrar;
pub mod registry;
pub mod teardown;

#[cfg(test)]
mod test;

pub use guard::{CapabilityMap, Guard, RequireExtension, RequireFeature, RequireHosts};
pub use lifecycle::{Suite, SuiteConfig, TestCase, TestContext, TestError};
pub use outcome::{Status, SuiteSummary, TestOutcome};
pub use registrar::Registrar;
pub use registry::{ResourceKind, ResourceRegistry, Tracked};
pub use teardown::{TeardownCoordinator, TeardownReport};

/// Initialize the logger (with timestamps). Calling it more than once has no effect.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init_timed();
}

/// Error type of the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Error returned by the control plane or the VM provisioner
    #[error("{0}")]
    Client(#[from] ClientError),
    /// Error while registering or deregistering a resource
    #[error("Registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    /// Error while evaluating a precondition
    #[error("Guard error: {0}")]
    Guard(#[from] guard::GuardError),
    /// Error while reading the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Format an error together with all of its sources. Sources whose message is already part of the
/// formatted error are omitted.
pub(crate) fn error_chain(e: &dyn StdError) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !msg.ends_with(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }
    msg
}

/// Extract the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = RefCell::new(None);
}

static PANIC_HOOK: Once = Once::new();

/// Install a panic hook that remembers the backtrace of the last panic on each thread, and then
/// calls the previously installed hook. Installing it more than once has no effect.
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|last| *last.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Take the backtrace of the last panic on this thread, if any.
pub(crate) fn take_backtrace() -> Option<String> {
    LAST_BACKTRACE.with(|last| last.borrow_mut().take())
}
