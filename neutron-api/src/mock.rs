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

//! In-memory implementations of the collaborators, used to test the harness without a control
//! plane.
//!
//! [`MockControlPlane`] implements both [`ControlPlane`] and [`VmProvisioner`] and records every
//! call (including failed ones) in a single log, such that the order of operations across both
//! interfaces can be checked. It refuses to delete resources that are still referenced by another
//! resource, a router interface, or a VM, just like the real control plane would. Deleting a
//! security group also deletes its rules.

use std::{cell::RefCell, collections::BTreeMap};

use serde_json::{json, Value};

use crate::{
    client::{Collection, ControlPlane},
    topology::{Host, TopologyProvider, VmProvisioner, VmSpec},
    ApiObject, ClientError, ResourceId,
};

/// A single call made to the mock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListExtensions,
    Create(Collection),
    Show(Collection, ResourceId),
    List(Collection),
    Update(Collection, ResourceId),
    Delete(Collection, ResourceId),
    /// `(router, subnet)`
    AddRouterInterface(ResourceId, ResourceId),
    /// `(router, subnet)`
    RemoveRouterInterface(ResourceId, ResourceId),
    /// `(policy, rule)`
    InsertFirewallRule(ResourceId, ResourceId),
    /// `(policy, rule)`
    RemoveFirewallRule(ResourceId, ResourceId),
    /// `(speaker, peer)`
    AddBgpPeer(ResourceId, ResourceId),
    /// `(speaker, peer)`
    RemoveBgpPeer(ResourceId, ResourceId),
    /// VM name
    CreateVm(String),
    /// `(vm, port)`
    PlugPort(ResourceId, ResourceId),
    /// `(vm, port)`
    UnplugPort(ResourceId, ResourceId),
    TerminateVm(ResourceId),
}

#[derive(Debug, Default)]
struct State {
    extensions: Vec<String>,
    objects: BTreeMap<(Collection, ResourceId), ApiObject>,
    counters: BTreeMap<&'static str, usize>,
    /// `(router, subnet)` pairs
    interfaces: Vec<(ResourceId, ResourceId)>,
    /// plugged ports of each VM
    vms: BTreeMap<ResourceId, Vec<ResourceId>>,
    calls: Vec<Call>,
    failures: Vec<Call>,
    unreachable: bool,
}

/// In-memory control plane and VM provisioner. Identifiers are generated deterministically as
/// `<resource name>-<n>` with a counter per resource name, starting at 1 (e.g., `network-1`,
/// `router-2`, `vm-1`).
#[derive(Debug, Default)]
pub struct MockControlPlane {
    state: RefCell<State>,
}

impl MockControlPlane {
    /// Create an empty control plane without any extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty control plane supporting the given extensions.
    pub fn with_extensions<S: Into<String>>(aliases: impl IntoIterator<Item = S>) -> Self {
        let mock = Self::new();
        mock.state.borrow_mut().extensions = aliases.into_iter().map(Into::into).collect();
        mock
    }

    /// Make every future call equal to `call` fail.
    pub fn fail_on(&self, call: Call) {
        self.state.borrow_mut().failures.push(call);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// If set, every call fails with [`ClientError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.borrow_mut().unreachable = unreachable;
    }

    /// Get all calls made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Forget all calls made so far.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Identifiers of all existing resources in the collection, in creation order.
    pub fn live(&self, collection: Collection) -> Vec<ResourceId> {
        let state = self.state.borrow();
        let mut ids: Vec<(usize, ResourceId)> = state
            .objects
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, id)| (sequence_number(id), id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Get a copy of an existing object.
    pub fn object(&self, collection: Collection, id: &ResourceId) -> Option<ApiObject> {
        self.state
            .borrow()
            .objects
            .get(&(collection, id.clone()))
            .cloned()
    }

    /// All router interfaces as `(router, subnet)` pairs.
    pub fn router_interfaces(&self) -> Vec<(ResourceId, ResourceId)> {
        self.state.borrow().interfaces.clone()
    }

    /// All running VMs.
    pub fn vms(&self) -> Vec<ResourceId> {
        self.state.borrow().vms.keys().cloned().collect()
    }

    /// Returns `true` if no resource, router interface or VM exists.
    pub fn is_clean(&self) -> bool {
        let state = self.state.borrow();
        state.objects.is_empty() && state.interfaces.is_empty() && state.vms.is_empty()
    }
}

/// Extract the counter of a generated id, such that `port-10` sorts after `port-9`.
fn sequence_number(id: &ResourceId) -> usize {
    id.as_str()
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Check if the value (or any value nested in it) is the string `id`.
fn mentions(value: &Value, id: &ResourceId) -> bool {
    match value {
        Value::String(s) => s == id.as_str(),
        Value::Array(values) => values.iter().any(|v| mentions(v, id)),
        Value::Object(fields) => fields.values().any(|v| mentions(v, id)),
        _ => false,
    }
}

impl State {
    /// Record the call and decide whether it fails.
    fn record(&mut self, call: Call) -> Result<(), ClientError> {
        self.calls.push(call.clone());
        if self.unreachable {
            return Err(ClientError::Unreachable("mock control plane is offline".to_string()));
        }
        if self.failures.contains(&call) {
            log::trace!("[mock] injected failure on {call:?}");
            return Err(ClientError::Rejected(format!("injected failure on {call:?}")));
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &'static str) -> ResourceId {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        ResourceId::new(format!("{prefix}-{counter}"))
    }

    fn get(&self, collection: Collection, id: &ResourceId) -> Result<&ApiObject, ClientError> {
        self.objects
            .get(&(collection, id.clone()))
            .ok_or_else(|| ClientError::NotFound {
                collection,
                id: id.clone(),
            })
    }

    fn get_mut(
        &mut self,
        collection: Collection,
        id: &ResourceId,
    ) -> Result<&mut ApiObject, ClientError> {
        self.objects
            .get_mut(&(collection, id.clone()))
            .ok_or_else(|| ClientError::NotFound {
                collection,
                id: id.clone(),
            })
    }

    /// Describe the first thing that still references `id`, if any. Objects in `ignore` are not
    /// considered.
    fn referenced_by(&self, id: &ResourceId, ignore: &[ResourceId]) -> Option<String> {
        if let Some((router, subnet)) = self
            .interfaces
            .iter()
            .find(|(router, subnet)| router == id || subnet == id)
        {
            return Some(format!("router interface {router}/{subnet}"));
        }
        if let Some((vm, _)) = self.vms.iter().find(|(_, ports)| ports.contains(id)) {
            return Some(format!("vm {vm}"));
        }
        self.objects
            .iter()
            .filter(|((_, other), _)| other != id && !ignore.contains(other))
            .find(|(_, obj)| {
                obj.fields()
                    .iter()
                    .filter(|(k, _)| k.as_str() != "id")
                    .any(|(_, v)| mentions(v, id))
            })
            .map(|((c, other), _)| format!("{} {other}", c.resource_name()))
    }

    /// Append `item` to the array field `key` of an object.
    fn push_to(
        &mut self,
        collection: Collection,
        id: &ResourceId,
        key: &str,
        item: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        let obj = self.get_mut(collection, id)?;
        let list = obj
            .fields_mut()
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        match list {
            Value::Array(items) if items.iter().any(|v| mentions(v, item)) => {
                Err(ClientError::BadRequest {
                    collection,
                    message: format!("{item} is already part of {id}"),
                })
            }
            Value::Array(items) => {
                items.push(json!(item));
                Ok(obj.clone())
            }
            _ => Err(ClientError::InvalidField(key.to_string())),
        }
    }

    /// Remove `item` from the array field `key` of an object.
    fn remove_from(
        &mut self,
        collection: Collection,
        id: &ResourceId,
        key: &str,
        item: &ResourceId,
    ) -> Result<(), ClientError> {
        let obj = self.get_mut(collection, id)?;
        match obj.fields_mut().get_mut(key) {
            Some(Value::Array(items)) if items.iter().any(|v| mentions(v, item)) => {
                items.retain(|v| !mentions(v, item));
                Ok(())
            }
            _ => Err(ClientError::BadRequest {
                collection,
                message: format!("{item} is not part of {id}"),
            }),
        }
    }
}

impl ControlPlane for MockControlPlane {
    fn list_extensions(&self) -> Result<Vec<ApiObject>, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ListExtensions)?;
        state
            .extensions
            .iter()
            .map(|alias| ApiObject::from_value(json!({"alias": alias, "name": alias})))
            .collect()
    }

    fn create(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        body: Value,
    ) -> Result<ApiObject, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Create(collection))?;

        let mut obj = ApiObject::from_value(body).map_err(|e| ClientError::BadRequest {
            collection,
            message: e.to_string(),
        })?;

        if let Some(parent_collection) = collection.parent() {
            let parent = parent.ok_or(ClientError::MissingParent(collection))?;
            state.get(parent_collection, parent)?;
            obj.fields_mut().insert(
                format!("{}_id", parent_collection.resource_name()),
                json!(parent),
            );
        }

        let defaults: &[&str] = match collection {
            Collection::Routers => &["routes"],
            Collection::FirewallPolicies => &["firewall_rules"],
            Collection::BgpSpeakers => &["peers"],
            _ => &[],
        };
        for key in defaults {
            obj.fields_mut()
                .entry(*key)
                .or_insert_with(|| Value::Array(Vec::new()));
        }

        let id = state.next_id(collection.resource_name());
        obj.fields_mut().insert("id".to_string(), json!(id));
        state.objects.insert((collection, id), obj.clone());
        Ok(obj)
    }

    fn show(
        &self,
        collection: Collection,
        _parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Show(collection, id.clone()))?;
        state.get(collection, id).cloned()
    }

    fn list(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
    ) -> Result<Vec<ApiObject>, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::List(collection))?;
        let parent_key = collection
            .parent()
            .map(|c| format!("{}_id", c.resource_name()));
        Ok(state
            .objects
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .filter(|(_, obj)| match (&parent_key, parent) {
                (Some(key), Some(parent)) => obj.get(key) == Some(&json!(parent)),
                _ => true,
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    fn update(
        &self,
        collection: Collection,
        _parent: Option<&ResourceId>,
        id: &ResourceId,
        body: Value,
    ) -> Result<ApiObject, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Update(collection, id.clone()))?;
        let Value::Object(fields) = body else {
            return Err(ClientError::BadRequest {
                collection,
                message: "update body must be an object".to_string(),
            });
        };
        let obj = state.get_mut(collection, id)?;
        for (key, value) in fields {
            if key != "id" {
                obj.fields_mut().insert(key, value);
            }
        }
        Ok(obj.clone())
    }

    fn delete(
        &self,
        collection: Collection,
        _parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Delete(collection, id.clone()))?;
        state.get(collection, id)?;
        // deleting a group deletes its rules
        let cascade: Vec<ResourceId> = if collection == Collection::SecurityGroups {
            state
                .objects
                .iter()
                .filter(|((c, _), obj)| {
                    *c == Collection::SecurityGroupRules
                        && obj.get("security_group_id") == Some(&json!(id))
                })
                .map(|((_, rule), _)| rule.clone())
                .collect()
        } else {
            Vec::new()
        };
        if let Some(reason) = state.referenced_by(id, &cascade) {
            return Err(ClientError::InUse {
                collection,
                id: id.clone(),
                reason,
            });
        }
        for rule in cascade {
            state.objects.remove(&(Collection::SecurityGroupRules, rule));
        }
        state.objects.remove(&(collection, id.clone()));
        Ok(())
    }

    fn add_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::AddRouterInterface(router.clone(), subnet.clone()))?;
        state.get(Collection::Routers, router)?;
        state.get(Collection::Subnets, subnet)?;
        let pair = (router.clone(), subnet.clone());
        if state.interfaces.contains(&pair) {
            return Err(ClientError::BadRequest {
                collection: Collection::Routers,
                message: format!("subnet {subnet} is already attached to router {router}"),
            });
        }
        state.interfaces.push(pair);
        ApiObject::from_value(json!({"id": router, "subnet_id": subnet}))
    }

    fn remove_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::RemoveRouterInterface(router.clone(), subnet.clone()))?;
        let has_routes = match state.get(Collection::Routers, router)?.get("routes") {
            Some(Value::Array(routes)) => !routes.is_empty(),
            _ => false,
        };
        if has_routes {
            return Err(ClientError::InUse {
                collection: Collection::Routers,
                id: router.clone(),
                reason: "interface is required by routes".to_string(),
            });
        }
        let pair = (router.clone(), subnet.clone());
        let len = state.interfaces.len();
        state.interfaces.retain(|x| x != &pair);
        if state.interfaces.len() == len {
            return Err(ClientError::BadRequest {
                collection: Collection::Routers,
                message: format!("subnet {subnet} is not attached to router {router}"),
            });
        }
        Ok(())
    }

    fn insert_firewall_rule(
        &self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::InsertFirewallRule(policy.clone(), rule.clone()))?;
        state.get(Collection::FirewallRules, rule)?;
        state.push_to(Collection::FirewallPolicies, policy, "firewall_rules", rule)
    }

    fn remove_firewall_rule(
        &self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::RemoveFirewallRule(policy.clone(), rule.clone()))?;
        state.remove_from(Collection::FirewallPolicies, policy, "firewall_rules", rule)
    }

    fn add_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::AddBgpPeer(speaker.clone(), peer.clone()))?;
        state.get(Collection::BgpPeers, peer)?;
        state
            .push_to(Collection::BgpSpeakers, speaker, "peers", peer)
            .map(|_| ())
    }

    fn remove_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::RemoveBgpPeer(speaker.clone(), peer.clone()))?;
        state.remove_from(Collection::BgpSpeakers, speaker, "peers", peer)
    }
}

impl VmProvisioner for MockControlPlane {
    fn create_vm(&self, spec: &VmSpec) -> Result<ResourceId, ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateVm(spec.name.clone()))?;
        let id = state.next_id("vm");
        state.vms.insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn plug_port(
        &self,
        vm: &ResourceId,
        _iface: &str,
        port: &ResourceId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::PlugPort(vm.clone(), port.clone()))?;
        state.get(Collection::Ports, port)?;
        let ports = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| ClientError::Provision(format!("vm {vm} does not exist")))?;
        if !ports.contains(port) {
            ports.push(port.clone());
        }
        Ok(())
    }

    fn unplug_port(&self, vm: &ResourceId, port: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::UnplugPort(vm.clone(), port.clone()))?;
        let ports = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| ClientError::Provision(format!("vm {vm} does not exist")))?;
        let len = ports.len();
        ports.retain(|p| p != port);
        if ports.len() == len {
            return Err(ClientError::Provision(format!(
                "port {port} is not plugged into vm {vm}"
            )));
        }
        Ok(())
    }

    fn terminate(&self, vm: &ResourceId) -> Result<(), ClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::TerminateVm(vm.clone()))?;
        state
            .vms
            .remove(vm)
            .map(|_| ())
            .ok_or_else(|| ClientError::Provision(format!("vm {vm} does not exist")))
    }
}

/// In-memory topology with a fixed set of features and hosts.
#[derive(Debug, Clone, Default)]
pub struct MockTopology {
    features: BTreeMap<String, Value>,
    hosts: BTreeMap<String, Host>,
}

impl MockTopology {
    /// Create a topology without any features or hosts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a feature.
    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    /// Add a compute host.
    pub fn with_host(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.hosts.insert(
            name.clone(),
            Host {
                name,
                address: None,
                compute: true,
            },
        );
        self
    }

    /// Change the value of a feature.
    pub fn set_feature(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.features.insert(name.into(), value.into());
    }
}

impl TopologyProvider for MockTopology {
    fn get_topology_feature(&self, name: &str) -> Option<Value> {
        self.features.get(name).cloned()
    }

    fn hosts(&self) -> &BTreeMap<String, Host> {
        &self.hosts
    }
}
