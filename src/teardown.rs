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

//! Teardown of all resources registered during a test.
//!
//! Teardown processes the registries in the fixed order given by [`TEARDOWN_ORDER`], and the
//! entries of each registry in creation order. The order ensures that no resource is deleted while
//! another resource still depends on it:
//!
//! - VMs are unplugged and terminated before their ports are deleted,
//! - floating IPs are released before the ports they are bound to,
//! - associations (firewall policy rules, BGP speaker peers) are removed before the rules, peers,
//!   policies and speakers they join,
//! - L2 gateway connections go before L2 gateways, which go before gateway devices,
//! - routes are cleared before router interfaces are removed, which happens before routers are
//!   deleted,
//! - ports are deleted before security groups, subnets and networks, and subnets before networks.
//!
//! A failure to delete a single entry is logged and collected in the [`TeardownReport`], but it
//! never stops the teardown. Thus, [`TeardownCoordinator::run`] never fails.

use std::{
    fmt::{Display, Formatter},
    panic::{catch_unwind, AssertUnwindSafe},
};

use neutron_api::{ClientError, Collection, ControlPlane, ResourceId, VmProvisioner};
use serde::Serialize;
use serde_json::json;

use crate::{
    error_chain, panic_message,
    registry::{ResourceKind, ResourceRegistry, Tracked},
};

/// A single step of the teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownStep {
    /// Clear the routes of every registered router. The router registry is not drained by this
    /// step.
    ClearRoutes,
    /// Delete (or dissociate) every entry of a registry, and drain it.
    Delete(ResourceKind),
}

impl Display for TeardownStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownStep::ClearRoutes => f.write_str("clear routes of router"),
            TeardownStep::Delete(kind) => write!(f, "delete {kind}"),
        }
    }
}

/// The order in which registries are processed during teardown.
pub const TEARDOWN_ORDER: [TeardownStep; 23] = [
    TeardownStep::Delete(ResourceKind::VmPort),
    TeardownStep::Delete(ResourceKind::FloatingIp),
    TeardownStep::Delete(ResourceKind::FirewallLog),
    TeardownStep::Delete(ResourceKind::LoggingResource),
    TeardownStep::Delete(ResourceKind::Firewall),
    TeardownStep::Delete(ResourceKind::FirewallPolicyRule),
    TeardownStep::Delete(ResourceKind::FirewallRule),
    TeardownStep::Delete(ResourceKind::FirewallPolicy),
    TeardownStep::Delete(ResourceKind::BgpSpeakerPeer),
    TeardownStep::Delete(ResourceKind::BgpPeer),
    TeardownStep::Delete(ResourceKind::BgpSpeaker),
    TeardownStep::Delete(ResourceKind::L2GatewayConnection),
    TeardownStep::Delete(ResourceKind::L2Gateway),
    TeardownStep::Delete(ResourceKind::RemoteMacEntry),
    TeardownStep::Delete(ResourceKind::GatewayDevice),
    TeardownStep::ClearRoutes,
    TeardownStep::Delete(ResourceKind::RouterInterface),
    TeardownStep::Delete(ResourceKind::Router),
    TeardownStep::Delete(ResourceKind::Port),
    TeardownStep::Delete(ResourceKind::SecurityGroupRule),
    TeardownStep::Delete(ResourceKind::SecurityGroup),
    TeardownStep::Delete(ResourceKind::Subnet),
    TeardownStep::Delete(ResourceKind::Network),
];

/// A deletion that failed during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// The step during which the failure happened
    pub step: TeardownStep,
    /// The entry that could not be deleted (and which is probably leaked)
    pub entry: Tracked,
    /// The error, including all of its causes.
    pub message: String,
}

/// Summary of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Number of deletions attempted (including clearing routes).
    pub attempted: usize,
    /// All deletions that failed, in order.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Returns `true` if every deletion succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deletes all registered resources in dependency order.
pub struct TeardownCoordinator<'a> {
    client: &'a dyn ControlPlane,
    vms: &'a dyn VmProvisioner,
    failure_level: log::Level,
}

impl<'a> TeardownCoordinator<'a> {
    /// Create a new coordinator. Failures are logged at level `Error`.
    pub fn new(client: &'a dyn ControlPlane, vms: &'a dyn VmProvisioner) -> Self {
        Self {
            client,
            vms,
            failure_level: log::Level::Error,
        }
    }

    /// Set the log level used to report failed deletions.
    pub fn failure_level(mut self, level: log::Level) -> Self {
        self.failure_level = level;
        self
    }

    /// Delete every registered resource, and drain all registries. Errors are logged and collected
    /// in the returned report.
    pub fn run(&self, registry: &mut ResourceRegistry) -> TeardownReport {
        let mut report = TeardownReport::default();
        log::debug!("[teardown] removing {} resources", registry.len());

        for step in TEARDOWN_ORDER {
            match step {
                TeardownStep::ClearRoutes => {
                    for entry in registry.entries(ResourceKind::Router) {
                        if let Tracked::Router(router) = entry {
                            self.attempt(&mut report, step, entry, || {
                                clear_routes(self.client, router)
                            });
                        }
                    }
                }
                TeardownStep::Delete(kind) => {
                    for entry in registry.drain(kind) {
                        self.attempt(&mut report, step, &entry, || {
                            destroy(self.client, self.vms, &entry)
                        });
                    }
                }
            }
        }

        if report.is_clean() {
            log::debug!("[teardown] done ({} operations)", report.attempted);
        } else {
            log::log!(
                self.failure_level,
                "[teardown] done with {} of {} operations failed. Resources may have leaked!",
                report.failures.len(),
                report.attempted
            );
        }
        report
    }

    /// Perform a single deletion, catching both errors and panics.
    fn attempt<F>(&self, report: &mut TeardownReport, step: TeardownStep, entry: &Tracked, f: F)
    where
        F: FnOnce() -> Result<(), ClientError>,
    {
        report.attempted += 1;
        let message = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {
                log::trace!("[teardown] {step} {entry}");
                return;
            }
            Ok(Err(e)) => error_chain(&e),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        log::log!(
            self.failure_level,
            "[teardown] cannot {step} {entry}: {message}"
        );
        report.failures.push(TeardownFailure {
            step,
            entry: entry.clone(),
            message,
        });
    }
}

/// Remove all static routes of a router.
pub(crate) fn clear_routes(
    client: &dyn ControlPlane,
    router: &ResourceId,
) -> Result<(), ClientError> {
    client
        .update(Collection::Routers, None, router, json!({"routes": []}))
        .map(|_| ())
}

/// Delete (or dissociate) a single entry.
pub(crate) fn destroy(
    client: &dyn ControlPlane,
    vms: &dyn VmProvisioner,
    entry: &Tracked,
) -> Result<(), ClientError> {
    match entry {
        Tracked::Network(id) => client.delete(Collection::Networks, None, id),
        Tracked::Subnet(id) => client.delete(Collection::Subnets, None, id),
        Tracked::Router(id) => client.delete(Collection::Routers, None, id),
        Tracked::RouterInterface { router, subnet } => {
            client.remove_router_interface(router, subnet)
        }
        Tracked::Port(id) => client.delete(Collection::Ports, None, id),
        Tracked::SecurityGroup(id) => client.delete(Collection::SecurityGroups, None, id),
        Tracked::SecurityGroupRule(id) => client.delete(Collection::SecurityGroupRules, None, id),
        Tracked::Firewall(id) => client.delete(Collection::Firewalls, None, id),
        Tracked::FirewallPolicy(id) => client.delete(Collection::FirewallPolicies, None, id),
        Tracked::FirewallRule(id) => client.delete(Collection::FirewallRules, None, id),
        Tracked::FirewallPolicyRule { policy, rule } => client.remove_firewall_rule(policy, rule),
        Tracked::LoggingResource(id) => client.delete(Collection::LoggingResources, None, id),
        Tracked::FirewallLog {
            logging_resource,
            log,
        } => client.delete(Collection::FirewallLogs, Some(logging_resource), log),
        Tracked::FloatingIp(id) => client.delete(Collection::FloatingIps, None, id),
        Tracked::BgpSpeaker(id) => client.delete(Collection::BgpSpeakers, None, id),
        Tracked::BgpPeer(id) => client.delete(Collection::BgpPeers, None, id),
        Tracked::BgpSpeakerPeer { speaker, peer } => client.remove_bgp_peer(speaker, peer),
        Tracked::RemoteMacEntry {
            gateway_device,
            entry,
        } => client.delete(Collection::RemoteMacEntries, Some(gateway_device), entry),
        Tracked::L2Gateway(id) => client.delete(Collection::L2Gateways, None, id),
        Tracked::L2GatewayConnection(id) => {
            client.delete(Collection::L2GatewayConnections, None, id)
        }
        Tracked::GatewayDevice(id) => client.delete(Collection::GatewayDevices, None, id),
        Tracked::VmPort { vm, port } => {
            // terminate the VM even if the port cannot be unplugged
            let unplugged = vms.unplug_port(vm, port);
            let terminated = vms.terminate(vm);
            unplugged.and(terminated)
        }
    }
}
