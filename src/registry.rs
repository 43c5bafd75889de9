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

//! Per-kind registries of all resources created during a test.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use neutron_api::ResourceId;
use serde::Serialize;
use thiserror::Error;

/// The kind of a tracked resource. Each kind has exactly one registry and one deletion operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Router,
    RouterInterface,
    Port,
    SecurityGroup,
    SecurityGroupRule,
    Firewall,
    FirewallPolicy,
    FirewallRule,
    /// A firewall rule inserted into a firewall policy.
    FirewallPolicyRule,
    LoggingResource,
    FirewallLog,
    FloatingIp,
    BgpSpeaker,
    BgpPeer,
    /// A BGP peer added to a BGP speaker.
    BgpSpeakerPeer,
    RemoteMacEntry,
    L2Gateway,
    L2GatewayConnection,
    GatewayDevice,
    /// A port plugged into a virtual machine.
    VmPort,
}

impl ResourceKind {
    /// All resource kinds.
    pub const ALL: [ResourceKind; 22] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::Router,
        ResourceKind::RouterInterface,
        ResourceKind::Port,
        ResourceKind::SecurityGroup,
        ResourceKind::SecurityGroupRule,
        ResourceKind::Firewall,
        ResourceKind::FirewallPolicy,
        ResourceKind::FirewallRule,
        ResourceKind::FirewallPolicyRule,
        ResourceKind::LoggingResource,
        ResourceKind::FirewallLog,
        ResourceKind::FloatingIp,
        ResourceKind::BgpSpeaker,
        ResourceKind::BgpPeer,
        ResourceKind::BgpSpeakerPeer,
        ResourceKind::RemoteMacEntry,
        ResourceKind::L2Gateway,
        ResourceKind::L2GatewayConnection,
        ResourceKind::GatewayDevice,
        ResourceKind::VmPort,
    ];

    /// Human-readable name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Router => "router",
            ResourceKind::RouterInterface => "router interface",
            ResourceKind::Port => "port",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::SecurityGroupRule => "security group rule",
            ResourceKind::Firewall => "firewall",
            ResourceKind::FirewallPolicy => "firewall policy",
            ResourceKind::FirewallRule => "firewall rule",
            ResourceKind::FirewallPolicyRule => "firewall policy association",
            ResourceKind::LoggingResource => "logging resource",
            ResourceKind::FirewallLog => "firewall log",
            ResourceKind::FloatingIp => "floating IP",
            ResourceKind::BgpSpeaker => "BGP speaker",
            ResourceKind::BgpPeer => "BGP peer",
            ResourceKind::BgpSpeakerPeer => "BGP speaker-peer association",
            ResourceKind::RemoteMacEntry => "remote MAC entry",
            ResourceKind::L2Gateway => "L2 gateway",
            ResourceKind::L2GatewayConnection => "L2 gateway connection",
            ResourceKind::GatewayDevice => "gateway device",
            ResourceKind::VmPort => "VM port",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A registry entry. Each variant carries exactly the identifiers needed to delete (or dissociate)
/// the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum Tracked {
    Network(ResourceId),
    Subnet(ResourceId),
    Router(ResourceId),
    RouterInterface {
        router: ResourceId,
        subnet: ResourceId,
    },
    Port(ResourceId),
    SecurityGroup(ResourceId),
    SecurityGroupRule(ResourceId),
    Firewall(ResourceId),
    FirewallPolicy(ResourceId),
    FirewallRule(ResourceId),
    FirewallPolicyRule {
        policy: ResourceId,
        rule: ResourceId,
    },
    LoggingResource(ResourceId),
    FirewallLog {
        logging_resource: ResourceId,
        log: ResourceId,
    },
    FloatingIp(ResourceId),
    BgpSpeaker(ResourceId),
    BgpPeer(ResourceId),
    BgpSpeakerPeer {
        speaker: ResourceId,
        peer: ResourceId,
    },
    RemoteMacEntry {
        gateway_device: ResourceId,
        entry: ResourceId,
    },
    L2Gateway(ResourceId),
    L2GatewayConnection(ResourceId),
    GatewayDevice(ResourceId),
    VmPort {
        vm: ResourceId,
        port: ResourceId,
    },
}

impl Tracked {
    /// The kind of the entry, and thus the registry it belongs to.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Tracked::Network(_) => ResourceKind::Network,
            Tracked::Subnet(_) => ResourceKind::Subnet,
            Tracked::Router(_) => ResourceKind::Router,
            Tracked::RouterInterface { .. } => ResourceKind::RouterInterface,
            Tracked::Port(_) => ResourceKind::Port,
            Tracked::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Tracked::SecurityGroupRule(_) => ResourceKind::SecurityGroupRule,
            Tracked::Firewall(_) => ResourceKind::Firewall,
            Tracked::FirewallPolicy(_) => ResourceKind::FirewallPolicy,
            Tracked::FirewallRule(_) => ResourceKind::FirewallRule,
            Tracked::FirewallPolicyRule { .. } => ResourceKind::FirewallPolicyRule,
            Tracked::LoggingResource(_) => ResourceKind::LoggingResource,
            Tracked::FirewallLog { .. } => ResourceKind::FirewallLog,
            Tracked::FloatingIp(_) => ResourceKind::FloatingIp,
            Tracked::BgpSpeaker(_) => ResourceKind::BgpSpeaker,
            Tracked::BgpPeer(_) => ResourceKind::BgpPeer,
            Tracked::BgpSpeakerPeer { .. } => ResourceKind::BgpSpeakerPeer,
            Tracked::RemoteMacEntry { .. } => ResourceKind::RemoteMacEntry,
            Tracked::L2Gateway(_) => ResourceKind::L2Gateway,
            Tracked::L2GatewayConnection(_) => ResourceKind::L2GatewayConnection,
            Tracked::GatewayDevice(_) => ResourceKind::GatewayDevice,
            Tracked::VmPort { .. } => ResourceKind::VmPort,
        }
    }
}

impl Display for Tracked {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Tracked::Network(id)
            | Tracked::Subnet(id)
            | Tracked::Router(id)
            | Tracked::Port(id)
            | Tracked::SecurityGroup(id)
            | Tracked::SecurityGroupRule(id)
            | Tracked::Firewall(id)
            | Tracked::FirewallPolicy(id)
            | Tracked::FirewallRule(id)
            | Tracked::LoggingResource(id)
            | Tracked::FloatingIp(id)
            | Tracked::BgpSpeaker(id)
            | Tracked::BgpPeer(id)
            | Tracked::L2Gateway(id)
            | Tracked::L2GatewayConnection(id)
            | Tracked::GatewayDevice(id) => write!(f, "{id}"),
            Tracked::RouterInterface { router: a, subnet: b }
            | Tracked::FirewallPolicyRule { policy: a, rule: b }
            | Tracked::FirewallLog {
                logging_resource: a,
                log: b,
            }
            | Tracked::BgpSpeakerPeer { speaker: a, peer: b }
            | Tracked::RemoteMacEntry {
                gateway_device: a,
                entry: b,
            }
            | Tracked::VmPort { vm: a, port: b } => write!(f, "{a}/{b}"),
        }
    }
}

/// The registries of one test run: one ordered sequence of entries per [`ResourceKind`]. Entries
/// are appended in creation order, and removed either by an explicit deletion or when the registry
/// is drained during teardown.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: BTreeMap<ResourceKind, Vec<Tracked>>,
}

impl ResourceRegistry {
    /// Create empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the registry of its kind. Returns an error if the entry is already
    /// registered.
    pub fn register(&mut self, entry: Tracked) -> Result<(), RegistryError> {
        let registry = self.entries.entry(entry.kind()).or_default();
        if registry.contains(&entry) {
            return Err(RegistryError::AlreadyRegistered(entry));
        }
        log::trace!("[registry] register {} {}", entry.kind(), entry);
        registry.push(entry);
        Ok(())
    }

    /// Remove an entry from the registry of its kind. Returns an error if the entry is not
    /// registered, which indicates either a double delete or a bookkeeping bug.
    pub fn deregister(&mut self, entry: &Tracked) -> Result<(), RegistryError> {
        let registry = self.entries.entry(entry.kind()).or_default();
        match registry.iter().position(|e| e == entry) {
            Some(pos) => {
                log::trace!("[registry] deregister {} {}", entry.kind(), entry);
                registry.remove(pos);
                Ok(())
            }
            None => Err(RegistryError::NotRegistered(entry.clone())),
        }
    }

    /// Check if the entry is registered.
    pub fn contains(&self, entry: &Tracked) -> bool {
        self.entries(entry.kind()).contains(entry)
    }

    /// Get all entries of a kind, in creation order.
    pub fn entries(&self, kind: ResourceKind) -> &[Tracked] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of entries over all kinds.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if all registries are empty.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Iterate over all non-empty registries.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &[Tracked])> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (*k, v.as_slice()))
    }

    /// Take all entries of a kind out of the registry, leaving it empty.
    pub(crate) fn drain(&mut self, kind: ResourceKind) -> Vec<Tracked> {
        self.entries
            .get_mut(&kind)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

/// Bookkeeping errors of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The entry is already registered.
    #[error("{} {0} is already registered", .0.kind())]
    AlreadyRegistered(Tracked),
    /// The entry is not registered (double delete?).
    #[error("{} {0} is not registered (deleted twice?)", .0.kind())]
    NotRegistered(Tracked),
}
