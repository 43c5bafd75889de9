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

//! Interfaces of the test environment: the topology provider (which hosts exist and which features
//! the environment has) and the provisioner of virtual machines.

use std::{collections::BTreeMap, net::IpAddr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientError, ResourceId};

/// A host of the physical (or virtual) test topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Name of the host, as used by the test cases.
    pub name: String,
    /// Management address of the host.
    pub address: Option<IpAddr>,
    /// Whether the host can run virtual machines.
    pub compute: bool,
}

/// Description of the test environment. The topology is never modified by the harness.
pub trait TopologyProvider {
    /// Get the current value of a topology feature, or `None` if the topology does not have that
    /// feature.
    fn get_topology_feature(&self, name: &str) -> Option<Value>;

    /// All known hosts, indexed by their name.
    fn hosts(&self) -> &BTreeMap<String, Host>;
}

/// Request to spawn a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmSpec {
    /// Name of the VM
    pub name: String,
    /// Host on which the VM is spawned.
    pub host: String,
    /// Name of the interface inside the VM to which the port is plugged.
    pub iface: String,
}

impl VmSpec {
    /// Create a VM with a single interface `eth0`.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            iface: "eth0".to_string(),
        }
    }
}

/// Provisioner of virtual machines. VMs are addressed by the id returned from
/// [`VmProvisioner::create_vm`].
pub trait VmProvisioner {
    /// Spawn a new virtual machine.
    fn create_vm(&self, spec: &VmSpec) -> Result<ResourceId, ClientError>;

    /// Plug a port into an interface of the VM.
    fn plug_port(&self, vm: &ResourceId, iface: &str, port: &ResourceId)
        -> Result<(), ClientError>;

    /// Unplug a port from the VM.
    fn unplug_port(&self, vm: &ResourceId, port: &ResourceId) -> Result<(), ClientError>;

    /// Terminate the VM.
    fn terminate(&self, vm: &ResourceId) -> Result<(), ClientError>;
}
