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

//! Typed create and delete operations that keep the [`ResourceRegistry`] up to date.
//!
//! Every `create_*` operation sends the request to the control plane, and registers the new
//! resource only once the control plane has accepted it. If the request fails, the error is
//! returned and nothing is registered. Every `delete_*` operation first removes the entry from the
//! registry (failing with [`RegistryError::NotRegistered`] if it was never registered, or was
//! already deleted), and only then deletes the resource.
//!
//! Associations (router interfaces, rules inserted into a firewall policy, peers added to a BGP
//! speaker, and ports plugged into a VM) are registered as separate entries, such that the teardown
//! can dissociate them before deleting either member.
//!
//! [`RegistryError::NotRegistered`]: crate::registry::RegistryError::NotRegistered

use neutron_api::{
    spec::{
        BgpPeerSpec, BgpSpeakerSpec, FirewallLogSpec, FirewallPolicySpec, FirewallRuleSpec,
        FirewallSpec, FloatingIpSpec, GatewayDeviceSpec, L2GatewayConnectionSpec, L2GatewaySpec,
        LoggingResourceSpec, NetworkSpec, PortSpec, RemoteMacEntrySpec, ResourceSpec, Route,
        RouterSpec, SecurityGroupRuleSpec, SecurityGroupSpec, SubnetSpec,
    },
    ApiObject, Collection, ControlPlane, ResourceId, VmProvisioner, VmSpec,
};
use serde_json::{json, Value};

use crate::{
    registry::{ResourceRegistry, Tracked},
    teardown::{self, TeardownCoordinator, TeardownReport},
    HarnessError,
};

/// A virtual machine together with the port plugged into it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVm {
    /// Identifier of the VM, as returned by the provisioner
    pub vm: ResourceId,
    /// The port plugged into the VM
    pub port: ApiObject,
}

/// Creates and deletes resources on the control plane while tracking them in a registry.
pub struct Registrar<'a> {
    client: &'a dyn ControlPlane,
    vms: &'a dyn VmProvisioner,
    tenant: Option<String>,
    registry: ResourceRegistry,
}

impl<'a> std::fmt::Debug for Registrar<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("tenant", &self.tenant)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<'a> Registrar<'a> {
    /// Create a new registrar with an empty registry.
    pub fn new(client: &'a dyn ControlPlane, vms: &'a dyn VmProvisioner) -> Self {
        Self {
            client,
            vms,
            tenant: None,
            registry: ResourceRegistry::new(),
        }
    }

    /// Attach the tenant id to every created resource that is owned by a tenant (unless the request
    /// already names a tenant).
    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    /// The registry of all resources created (and not yet deleted) through this registrar.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The control-plane client, for requests that do not create or delete anything.
    pub fn client(&self) -> &'a dyn ControlPlane {
        self.client
    }

    /// Delete everything that is registered, using the given coordinator.
    pub fn teardown(&mut self, coordinator: &TeardownCoordinator<'_>) -> TeardownReport {
        coordinator.run(&mut self.registry)
    }

    /// Send the create request of a spec, adding the tenant id if necessary.
    fn send<S: ResourceSpec>(&self, spec: &S) -> Result<ApiObject, HarnessError> {
        let mut body = spec.to_body()?;
        if let (Some(tenant), Value::Object(fields)) = (&self.tenant, &mut body) {
            if S::COLLECTION.is_tenant_owned() {
                fields
                    .entry("tenant_id")
                    .or_insert_with(|| json!(tenant));
            }
        }
        Ok(self.client.create(S::COLLECTION, spec.parent(), body)?)
    }

    /// Create the resource and register it with the entry built by `track`.
    fn create_tracked<S, F>(&mut self, spec: &S, track: F) -> Result<ApiObject, HarnessError>
    where
        S: ResourceSpec,
        F: FnOnce(ResourceId) -> Tracked,
    {
        let obj = self.send(spec)?;
        let entry = track(obj.id()?);
        log::debug!("[registrar] created {} {entry}", entry.kind());
        self.registry.register(entry)?;
        Ok(obj)
    }

    /// Register an association that was established on the control plane.
    fn associate(&mut self, entry: Tracked) -> Result<(), HarnessError> {
        log::debug!("[registrar] associated {} {entry}", entry.kind());
        self.registry.register(entry)?;
        Ok(())
    }

    /// Deregister the entry, and delete (or dissociate) it afterwards.
    fn remove(&mut self, entry: Tracked) -> Result<(), HarnessError> {
        self.registry.deregister(&entry)?;
        log::debug!("[registrar] delete {} {entry}", entry.kind());
        teardown::destroy(self.client, self.vms, &entry)?;
        Ok(())
    }

    /// Update the fields of any resource. Updates never change the registry.
    pub fn update(
        &self,
        collection: Collection,
        id: &ResourceId,
        body: Value,
    ) -> Result<ApiObject, HarnessError> {
        log::debug!("[registrar] update {} {id}", collection.resource_name());
        Ok(self.client.update(collection, None, id, body)?)
    }

    /// Create a router, and attach one interface per subnet listed in the request. The router is
    /// registered before any interface is attached. If attaching an interface fails, the interfaces
    /// attached before remain registered, and the error is returned.
    pub fn create_router(&mut self, spec: &RouterSpec) -> Result<ApiObject, HarnessError> {
        let router = self.create_tracked(spec, Tracked::Router)?;
        let router_id = router.id()?;
        for subnet in spec.subnets.iter() {
            self.add_router_interface(&router_id, subnet)?;
        }
        Ok(router)
    }

    /// Attach a subnet to a router.
    pub fn add_router_interface(
        &mut self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<ApiObject, HarnessError> {
        let obj = self.client.add_router_interface(router, subnet)?;
        self.associate(Tracked::RouterInterface {
            router: router.clone(),
            subnet: subnet.clone(),
        })?;
        Ok(obj)
    }

    /// Detach a subnet from a router.
    pub fn remove_router_interface(
        &mut self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.remove(Tracked::RouterInterface {
            router: router.clone(),
            subnet: subnet.clone(),
        })
    }

    /// Replace the static routes of a router. Routes are cleared automatically during teardown.
    pub fn set_router_routes(
        &self,
        router: &ResourceId,
        routes: &[Route],
    ) -> Result<ApiObject, HarnessError> {
        self.update(Collection::Routers, router, json!({ "routes": routes }))
    }

    /// Remove all static routes of a router.
    pub fn clear_router_routes(&self, router: &ResourceId) -> Result<(), HarnessError> {
        Ok(teardown::clear_routes(self.client, router)?)
    }

    /// Create a firewall policy. Every rule listed in the request is registered as a policy rule
    /// association, such that the rules are removed from the policy before the policy is deleted.
    pub fn create_firewall_policy(
        &mut self,
        spec: &FirewallPolicySpec,
    ) -> Result<ApiObject, HarnessError> {
        let policy = self.create_tracked(spec, Tracked::FirewallPolicy)?;
        let policy_id = policy.id()?;
        for rule in spec.firewall_rules.iter() {
            self.associate(Tracked::FirewallPolicyRule {
                policy: policy_id.clone(),
                rule: rule.clone(),
            })?;
        }
        Ok(policy)
    }

    /// Insert a firewall rule into a policy. Returns the updated policy.
    pub fn insert_firewall_rule(
        &mut self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<ApiObject, HarnessError> {
        let obj = self.client.insert_firewall_rule(policy, rule)?;
        self.associate(Tracked::FirewallPolicyRule {
            policy: policy.clone(),
            rule: rule.clone(),
        })?;
        Ok(obj)
    }

    /// Remove a firewall rule from a policy.
    pub fn remove_firewall_rule_from_policy(
        &mut self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.remove(Tracked::FirewallPolicyRule {
            policy: policy.clone(),
            rule: rule.clone(),
        })
    }

    /// Create a firewall log below its logging resource.
    pub fn create_firewall_log(&mut self, spec: &FirewallLogSpec) -> Result<ApiObject, HarnessError> {
        let logging_resource = spec.logging_resource_id.clone();
        self.create_tracked(spec, |log| Tracked::FirewallLog {
            logging_resource,
            log,
        })
    }

    /// Delete a firewall log.
    pub fn delete_firewall_log(
        &mut self,
        logging_resource: &ResourceId,
        log: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.remove(Tracked::FirewallLog {
            logging_resource: logging_resource.clone(),
            log: log.clone(),
        })
    }

    /// Add a BGP peer to a speaker.
    pub fn add_bgp_peer_to_speaker(
        &mut self,
        speaker: &ResourceId,
        peer: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.client.add_bgp_peer(speaker, peer)?;
        self.associate(Tracked::BgpSpeakerPeer {
            speaker: speaker.clone(),
            peer: peer.clone(),
        })
    }

    /// Remove a BGP peer from a speaker.
    pub fn remove_bgp_peer_from_speaker(
        &mut self,
        speaker: &ResourceId,
        peer: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.remove(Tracked::BgpSpeakerPeer {
            speaker: speaker.clone(),
            peer: peer.clone(),
        })
    }

    /// Create a remote MAC entry below its gateway device.
    pub fn create_remote_mac_entry(
        &mut self,
        spec: &RemoteMacEntrySpec,
    ) -> Result<ApiObject, HarnessError> {
        let gateway_device = spec.gateway_device_id.clone();
        self.create_tracked(spec, |entry| Tracked::RemoteMacEntry {
            gateway_device,
            entry,
        })
    }

    /// Delete a remote MAC entry.
    pub fn delete_remote_mac_entry(
        &mut self,
        gateway_device: &ResourceId,
        entry: &ResourceId,
    ) -> Result<(), HarnessError> {
        self.remove(Tracked::RemoteMacEntry {
            gateway_device: gateway_device.clone(),
            entry: entry.clone(),
        })
    }

    /// Create a port, spawn a VM, and plug the port into the VM. If the port does not name a host,
    /// it is bound to the host of the VM.
    ///
    /// The port is registered as soon as it exists, and the VM together with the port as soon as
    /// the VM exists. During teardown, the port is unplugged and the VM is terminated before the
    /// port is deleted.
    pub fn create_vm(&mut self, vm: &VmSpec, port: &PortSpec) -> Result<BoundVm, HarnessError> {
        let mut port_spec = port.clone();
        port_spec.host.get_or_insert_with(|| vm.host.clone());
        let port = self.create_port(&port_spec)?;
        let port_id = port.id()?;

        let vm_id = self.vms.create_vm(vm)?;
        self.associate(Tracked::VmPort {
            vm: vm_id.clone(),
            port: port_id.clone(),
        })?;
        self.vms.plug_port(&vm_id, &vm.iface, &port_id)?;
        log::debug!(
            "[registrar] spawned vm {} ({vm_id}) on {} with port {port_id}",
            vm.name,
            vm.host
        );

        Ok(BoundVm { vm: vm_id, port })
    }

    /// Unplug the port from the VM and terminate the VM. The port itself remains registered.
    pub fn unbind_vm_port(&mut self, vm: &ResourceId, port: &ResourceId) -> Result<(), HarnessError> {
        self.remove(Tracked::VmPort {
            vm: vm.clone(),
            port: port.clone(),
        })
    }
}

/// Generate `create_*` and `delete_*` for resources identified by a single id.
macro_rules! single_id_resources {
    ($($name:literal: $create:ident, $delete:ident, $spec:ty => $variant:ident;)*) => {
        impl<'a> Registrar<'a> {
            $(
                #[doc = concat!("Create a ", $name, " and register it.")]
                pub fn $create(&mut self, spec: &$spec) -> Result<ApiObject, HarnessError> {
                    self.create_tracked(spec, Tracked::$variant)
                }

                #[doc = concat!("Deregister and delete a ", $name, ".")]
                pub fn $delete(&mut self, id: &ResourceId) -> Result<(), HarnessError> {
                    self.remove(Tracked::$variant(id.clone()))
                }
            )*
        }
    };
}

single_id_resources! {
    "network": create_network, delete_network, NetworkSpec => Network;
    "subnet": create_subnet, delete_subnet, SubnetSpec => Subnet;
    "port": create_port, delete_port, PortSpec => Port;
    "security group": create_security_group, delete_security_group, SecurityGroupSpec => SecurityGroup;
    "security group rule": create_security_group_rule, delete_security_group_rule, SecurityGroupRuleSpec => SecurityGroupRule;
    "firewall": create_firewall, delete_firewall, FirewallSpec => Firewall;
    "firewall rule": create_firewall_rule, delete_firewall_rule, FirewallRuleSpec => FirewallRule;
    "logging resource": create_logging_resource, delete_logging_resource, LoggingResourceSpec => LoggingResource;
    "floating IP": create_floating_ip, delete_floating_ip, FloatingIpSpec => FloatingIp;
    "BGP speaker": create_bgp_speaker, delete_bgp_speaker, BgpSpeakerSpec => BgpSpeaker;
    "BGP peer": create_bgp_peer, delete_bgp_peer, BgpPeerSpec => BgpPeer;
    "L2 gateway": create_l2_gateway, delete_l2_gateway, L2GatewaySpec => L2Gateway;
    "L2 gateway connection": create_l2_gateway_connection, delete_l2_gateway_connection, L2GatewayConnectionSpec => L2GatewayConnection;
    "gateway device": create_gateway_device, delete_gateway_device, GatewayDeviceSpec => GatewayDevice;
}

impl<'a> Registrar<'a> {
    /// Deregister and delete a router. Its interfaces must be removed before.
    pub fn delete_router(&mut self, id: &ResourceId) -> Result<(), HarnessError> {
        self.remove(Tracked::Router(id.clone()))
    }

    /// Deregister and delete a firewall policy. Its rules must be removed before.
    pub fn delete_firewall_policy(&mut self, id: &ResourceId) -> Result<(), HarnessError> {
        self.remove(Tracked::FirewallPolicy(id.clone()))
    }
}

/// Generate `update_*` for resources that can be modified.
macro_rules! updatable_resources {
    ($($update:ident => $collection:ident,)*) => {
        impl<'a> Registrar<'a> {
            $(
                #[doc = concat!("Update the fields of a resource in `", stringify!($collection), "`.")]
                pub fn $update(&self, id: &ResourceId, body: Value) -> Result<ApiObject, HarnessError> {
                    self.update(Collection::$collection, id, body)
                }
            )*
        }
    };
}

updatable_resources! {
    update_network => Networks,
    update_subnet => Subnets,
    update_router => Routers,
    update_port => Ports,
    update_security_group => SecurityGroups,
    update_firewall => Firewalls,
    update_firewall_policy => FirewallPolicies,
    update_firewall_rule => FirewallRules,
    update_floating_ip => FloatingIps,
}
