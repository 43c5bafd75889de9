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

//! Typed request specifications for every resource kind. Each specification serializes into the
//! body of the create request (see [`ResourceSpec::to_body`]).

use std::net::IpAddr;

use ipnet::IpNet;
use serde::Serialize;
use serde_json::Value;

use crate::{client::Collection, ClientError, ResourceId};

/// A specification that can be sent to the control plane to create a resource.
pub trait ResourceSpec: Serialize {
    /// The collection in which the resource is created.
    const COLLECTION: Collection;

    /// The parent resource, for nested collections.
    fn parent(&self) -> Option<&ResourceId> {
        None
    }

    /// Generate the request body.
    fn to_body(&self) -> Result<Value, ClientError> {
        Ok(serde_json::to_value(self)?)
    }
}

macro_rules! resource_spec {
    ($($spec:ty => $collection:expr,)*) => {
        $(
            impl ResourceSpec for $spec {
                const COLLECTION: Collection = $collection;
            }
        )*
    };
}

resource_spec! {
    NetworkSpec => Collection::Networks,
    SubnetSpec => Collection::Subnets,
    RouterSpec => Collection::Routers,
    PortSpec => Collection::Ports,
    SecurityGroupSpec => Collection::SecurityGroups,
    SecurityGroupRuleSpec => Collection::SecurityGroupRules,
    FirewallSpec => Collection::Firewalls,
    FirewallPolicySpec => Collection::FirewallPolicies,
    FirewallRuleSpec => Collection::FirewallRules,
    LoggingResourceSpec => Collection::LoggingResources,
    FloatingIpSpec => Collection::FloatingIps,
    BgpSpeakerSpec => Collection::BgpSpeakers,
    BgpPeerSpec => Collection::BgpPeers,
    L2GatewaySpec => Collection::L2Gateways,
    L2GatewayConnectionSpec => Collection::L2GatewayConnections,
    GatewayDeviceSpec => Collection::GatewayDevices,
}

impl ResourceSpec for FirewallLogSpec {
    const COLLECTION: Collection = Collection::FirewallLogs;

    fn parent(&self) -> Option<&ResourceId> {
        Some(&self.logging_resource_id)
    }
}

impl ResourceSpec for RemoteMacEntrySpec {
    const COLLECTION: Collection = Collection::RemoteMacEntries;

    fn parent(&self) -> Option<&ResourceId> {
        Some(&self.gateway_device_id)
    }
}

/// Specification of a network.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    /// Whether the network is an external (public) network.
    #[serde(rename = "router:external", skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_security_enabled: Option<bool>,
}

impl NetworkSpec {
    /// Create a new, internal network.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin_state_up: Some(true),
            ..Default::default()
        }
    }

    /// Create a new external network.
    pub fn external(name: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::new(name)
        }
    }
}

/// Specification of a subnet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetSpec {
    pub network_id: ResourceId,
    pub cidr: IpNet,
    pub ip_version: u8,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
}

impl SubnetSpec {
    /// Create a new subnet on the given network. The IP version is derived from the CIDR.
    pub fn new(network_id: ResourceId, cidr: IpNet) -> Self {
        let ip_version = match cidr {
            IpNet::V4(_) => 4,
            IpNet::V6(_) => 6,
        };
        Self {
            network_id,
            cidr,
            ip_version,
            name: String::new(),
            gateway_ip: None,
            enable_dhcp: None,
        }
    }

    /// Set the name of the subnet.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// The external gateway of a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalGateway {
    pub network_id: ResourceId,
}

/// Specification of a router. The subnets listed in `subnets` are not part of the request body;
/// they are attached to the router (one router interface each) once it is created.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RouterSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<ExternalGateway>,
    #[serde(skip)]
    pub subnets: Vec<ResourceId>,
}

impl RouterSpec {
    /// Create a new router without gateway and without interfaces.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin_state_up: Some(true),
            ..Default::default()
        }
    }

    /// Set the external gateway network.
    pub fn with_gateway(mut self, network_id: ResourceId) -> Self {
        self.external_gateway_info = Some(ExternalGateway { network_id });
        self
    }

    /// Set the subnets to attach after creation.
    pub fn with_subnets(mut self, subnets: impl IntoIterator<Item = ResourceId>) -> Self {
        self.subnets = subnets.into_iter().collect();
        self
    }
}

/// A static route on a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: IpNet,
    pub nexthop: IpAddr,
}

/// A fixed IP of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedIp {
    pub subnet_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
}

/// Specification of a port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSpec {
    pub network_id: ResourceId,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<ResourceId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_security_enabled: Option<bool>,
    /// Host to which the port is bound.
    #[serde(rename = "binding:host_id", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl PortSpec {
    /// Create a new port on the given network.
    pub fn new(network_id: ResourceId) -> Self {
        Self {
            network_id,
            name: String::new(),
            fixed_ips: Vec::new(),
            security_groups: None,
            port_security_enabled: None,
            host: None,
        }
    }
}

/// Specification of a security group.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Direction of a security group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

/// Ethertype of a security group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EtherType {
    IPv4,
    IPv6,
}

/// Specification of a security group rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupRuleSpec {
    pub security_group_id: ResourceId,
    pub direction: Direction,
    pub ethertype: EtherType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip_prefix: Option<IpNet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<ResourceId>,
}

impl SecurityGroupRuleSpec {
    /// Create a rule allowing all IPv4 traffic in the given direction.
    pub fn new(security_group_id: ResourceId, direction: Direction) -> Self {
        Self {
            security_group_id,
            direction,
            ethertype: EtherType::IPv4,
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: None,
            remote_group_id: None,
        }
    }
}

/// Action of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Allow,
    Deny,
    Reject,
}

/// Specification of a firewall rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirewallRuleSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub action: FirewallAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip_address: Option<IpNet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip_address: Option<IpNet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl FirewallRuleSpec {
    /// Create a rule matching all traffic with the given action.
    pub fn new(action: FirewallAction) -> Self {
        Self {
            name: String::new(),
            action,
            protocol: None,
            source_ip_address: None,
            destination_ip_address: None,
            destination_port: None,
            enabled: None,
        }
    }
}

/// Specification of a firewall policy. Rules listed here are inserted into the policy on creation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FirewallPolicySpec {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub firewall_rules: Vec<ResourceId>,
}

/// Specification of a firewall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirewallSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub firewall_policy_id: ResourceId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub router_ids: Vec<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
}

impl FirewallSpec {
    /// Create a firewall enforcing the given policy on the given routers.
    pub fn new(firewall_policy_id: ResourceId, router_ids: Vec<ResourceId>) -> Self {
        Self {
            name: String::new(),
            firewall_policy_id,
            router_ids,
            admin_state_up: Some(true),
        }
    }
}

/// Specification of a logging resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LoggingResourceSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Which firewall events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FirewallEvent {
    All,
    Accept,
    Drop,
}

/// Specification of a firewall log, nested below a logging resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirewallLogSpec {
    #[serde(skip)]
    pub logging_resource_id: ResourceId,
    pub firewall_id: ResourceId,
    pub fw_event: FirewallEvent,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Specification of a floating IP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloatingIpSpec {
    pub floating_network_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_ip_address: Option<IpAddr>,
}

impl FloatingIpSpec {
    /// Allocate a floating IP on the given external network, optionally bound to a port.
    pub fn new(floating_network_id: ResourceId, port_id: Option<ResourceId>) -> Self {
        Self {
            floating_network_id,
            port_id,
            fixed_ip_address: None,
        }
    }
}

/// Specification of a BGP speaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgpSpeakerSpec {
    pub name: String,
    pub local_as: u32,
    pub ip_version: u8,
    /// Router on which the speaker runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_router: Option<ResourceId>,
}

/// Specification of a BGP peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgpPeerSpec {
    pub name: String,
    pub peer_ip: IpAddr,
    pub remote_as: u32,
    pub auth_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl BgpPeerSpec {
    /// Create a peer without authentication.
    pub fn new(name: impl Into<String>, peer_ip: IpAddr, remote_as: u32) -> Self {
        Self {
            name: name.into(),
            peer_ip,
            remote_as,
            auth_type: "none".to_string(),
            password: None,
        }
    }
}

/// A device (and its interface) that is part of an L2 gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct L2GatewayDevice {
    pub device_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation_id: Option<u32>,
}

/// Specification of an L2 gateway.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct L2GatewaySpec {
    pub name: String,
    pub devices: Vec<L2GatewayDevice>,
}

/// Specification of an L2 gateway connection, joining an L2 gateway with a network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct L2GatewayConnectionSpec {
    pub l2_gateway_id: ResourceId,
    pub network_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation_id: Option<u32>,
}

/// Type of a gateway device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayDeviceType {
    RouterVtep,
    HwVtep,
    NetworkVlan,
}

/// Specification of a gateway device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayDeviceSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: GatewayDeviceType,
    /// The resource backing the device (e.g., the router of a `router_vtep`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tunnel_ips: Vec<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_port: Option<u16>,
}

impl GatewayDeviceSpec {
    /// Create a `router_vtep` gateway device backed by the given router.
    pub fn router_vtep(router: ResourceId, tunnel_ips: Vec<IpAddr>) -> Self {
        Self {
            name: String::new(),
            device_type: GatewayDeviceType::RouterVtep,
            resource_id: Some(router),
            tunnel_ips,
            management_ip: None,
            management_port: None,
        }
    }
}

/// Specification of a remote MAC entry, nested below a gateway device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteMacEntrySpec {
    #[serde(skip)]
    pub gateway_device_id: ResourceId,
    pub mac_address: String,
    pub vtep_address: IpAddr,
    pub segmentation_id: u32,
}
