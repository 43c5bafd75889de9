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

//! The control-plane client interface.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::Value;

use crate::{ApiObject, ClientError, ResourceId};

/// A collection of resources on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Networks,
    Subnets,
    Routers,
    Ports,
    SecurityGroups,
    SecurityGroupRules,
    Firewalls,
    FirewallPolicies,
    FirewallRules,
    LoggingResources,
    /// Nested below [`Collection::LoggingResources`]
    FirewallLogs,
    FloatingIps,
    BgpSpeakers,
    BgpPeers,
    L2Gateways,
    L2GatewayConnections,
    GatewayDevices,
    /// Nested below [`Collection::GatewayDevices`]
    RemoteMacEntries,
}

impl Collection {
    /// All collections known to the harness.
    pub const ALL: [Collection; 18] = [
        Collection::Networks,
        Collection::Subnets,
        Collection::Routers,
        Collection::Ports,
        Collection::SecurityGroups,
        Collection::SecurityGroupRules,
        Collection::Firewalls,
        Collection::FirewallPolicies,
        Collection::FirewallRules,
        Collection::LoggingResources,
        Collection::FirewallLogs,
        Collection::FloatingIps,
        Collection::BgpSpeakers,
        Collection::BgpPeers,
        Collection::L2Gateways,
        Collection::L2GatewayConnections,
        Collection::GatewayDevices,
        Collection::RemoteMacEntries,
    ];

    /// Name of a single resource in that collection, as used for the key wrapping the request body.
    pub fn resource_name(&self) -> &'static str {
        match self {
            Collection::Networks => "network",
            Collection::Subnets => "subnet",
            Collection::Routers => "router",
            Collection::Ports => "port",
            Collection::SecurityGroups => "security_group",
            Collection::SecurityGroupRules => "security_group_rule",
            Collection::Firewalls => "firewall",
            Collection::FirewallPolicies => "firewall_policy",
            Collection::FirewallRules => "firewall_rule",
            Collection::LoggingResources => "logging_resource",
            Collection::FirewallLogs => "firewall_log",
            Collection::FloatingIps => "floatingip",
            Collection::BgpSpeakers => "bgp_speaker",
            Collection::BgpPeers => "bgp_peer",
            Collection::L2Gateways => "l2_gateway",
            Collection::L2GatewayConnections => "l2_gateway_connection",
            Collection::GatewayDevices => "gateway_device",
            Collection::RemoteMacEntries => "remote_mac_entry",
        }
    }

    /// URL path of the collection, relative to the API root. Nested collections contain the
    /// placeholder `{}` for the parent id.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Networks => "networks",
            Collection::Subnets => "subnets",
            Collection::Routers => "routers",
            Collection::Ports => "ports",
            Collection::SecurityGroups => "security-groups",
            Collection::SecurityGroupRules => "security-group-rules",
            Collection::Firewalls => "fw/firewalls",
            Collection::FirewallPolicies => "fw/firewall_policies",
            Collection::FirewallRules => "fw/firewall_rules",
            Collection::LoggingResources => "logging/logging_resources",
            Collection::FirewallLogs => "logging/logging_resources/{}/firewall_logs",
            Collection::FloatingIps => "floatingips",
            Collection::BgpSpeakers => "bgp-speakers",
            Collection::BgpPeers => "bgp-peers",
            Collection::L2Gateways => "l2-gateways",
            Collection::L2GatewayConnections => "l2-gateway-connections",
            Collection::GatewayDevices => "gw/gateway_devices",
            Collection::RemoteMacEntries => "gw/gateway_devices/{}/remote_mac_entries",
        }
    }

    /// The parent collection, if this collection is nested below another one.
    pub fn parent(&self) -> Option<Collection> {
        match self {
            Collection::FirewallLogs => Some(Collection::LoggingResources),
            Collection::RemoteMacEntries => Some(Collection::GatewayDevices),
            _ => None,
        }
    }

    /// Compute the path of the collection, replacing the parent placeholder with the given parent
    /// id. Returns an error if the collection is nested but no parent is given.
    pub fn resolve_path(&self, parent: Option<&ResourceId>) -> Result<String, ClientError> {
        match (self.parent(), parent) {
            (None, _) => Ok(self.path().to_string()),
            (Some(_), Some(p)) => Ok(self.path().replace("{}", p.as_str())),
            (Some(_), None) => Err(ClientError::MissingParent(*self)),
        }
    }

    /// Whether objects in this collection are owned by a tenant (and thus accept a `tenant_id`).
    pub fn is_tenant_owned(&self) -> bool {
        !matches!(
            self,
            Collection::FirewallLogs | Collection::RemoteMacEntries | Collection::BgpPeers
        )
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Interface of the client used to talk to the networking control plane. All operations are
/// blocking. The `parent` argument is only used for nested collections (see
/// [`Collection::parent`]), and is ignored otherwise.
///
/// The body of `create` and `update` is the unwrapped resource (i.e., the fields of the network,
/// not `{"network": {...}}`). Wrapping the body into the resource key is up to the client.
pub trait ControlPlane {
    /// List all API extensions. Each returned object contains the field `alias`.
    fn list_extensions(&self) -> Result<Vec<ApiObject>, ClientError>;

    /// Create a new resource and return the created object.
    fn create(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        body: Value,
    ) -> Result<ApiObject, ClientError>;

    /// Get a single resource.
    fn show(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<ApiObject, ClientError>;

    /// List all resources of a collection.
    fn list(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
    ) -> Result<Vec<ApiObject>, ClientError>;

    /// Update some fields of a resource and return the updated object.
    fn update(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
        body: Value,
    ) -> Result<ApiObject, ClientError>;

    /// Delete a resource.
    fn delete(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<(), ClientError>;

    /// Attach a subnet to a router, creating a router interface.
    fn add_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<ApiObject, ClientError>;

    /// Detach a subnet from a router.
    fn remove_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<(), ClientError>;

    /// Insert a firewall rule into a firewall policy.
    fn insert_firewall_rule(
        &self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<ApiObject, ClientError>;

    /// Remove a firewall rule from a firewall policy.
    fn remove_firewall_rule(&self, policy: &ResourceId, rule: &ResourceId)
        -> Result<(), ClientError>;

    /// Add a BGP peer to a BGP speaker.
    fn add_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError>;

    /// Remove a BGP peer from a BGP speaker.
    fn remove_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError>;
}
