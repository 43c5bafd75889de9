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

//! This library describes the collaborators of the Neutron test harness: the control-plane client
//! that creates and deletes resources, the topology provider that knows about hosts and features of
//! the test environment, and the provisioner that spawns virtual machines.
//!
//! # Resources
//!
//! Every resource of the control plane is addressed through a [`Collection`] and identified by a
//! [`ResourceId`]. Objects returned by the control plane are represented as an [`ApiObject`], which
//! is a JSON object with at least an `id` field. Requests are built from the typed specifications
//! in [`spec`], which serialize into the body of a create request.
//!
//! Some collections are nested below a parent resource (firewall logs live below a logging
//! resource, and remote MAC entries below a gateway device). For those, every operation requires
//! the id of the parent.
//!
//! # Mock Implementations
//!
//! Enabling the feature `mock` exposes the module `mock`, which contains an in-memory control plane
//! (which also acts as VM provisioner) and an in-memory topology. The control plane records every
//! call in order, enforces that resources still referenced by others cannot be deleted, and allows
//! injecting failures for specific calls.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod client;
pub mod spec;
pub mod topology;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod test;

pub use client::{Collection, ControlPlane};
pub use topology::{Host, TopologyProvider, VmProvisioner, VmSpec};

/// Opaque identifier of a resource created on the control plane (or of a virtual machine created by
/// the provisioner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An object returned by the control plane. It is a JSON object that contains at least the field
/// `id` (except for extensions, which are identified by their `alias`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiObject(Map<String, Value>);

impl ApiObject {
    /// Create an object from its fields.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Create an object from a JSON value. Returns an error if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ClientError::NotAnObject(other.to_string())),
        }
    }

    /// Get the `id` field of the object.
    pub fn id(&self) -> Result<ResourceId, ClientError> {
        self.str_field("id").map(ResourceId::from)
    }

    /// Get a string field of the object.
    pub fn str_field(&self, key: &str) -> Result<&str, ClientError> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ClientError::InvalidField(key.to_string())),
            None => Err(ClientError::MissingField(key.to_string())),
        }
    }

    /// Get any field of the object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get all fields of the object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Get a mutable reference to all fields of the object.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Transform the object into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Error returned by the control plane, the topology, or the VM provisioner.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The resource does not exist.
    #[error("{} {id} not found", .collection.resource_name())]
    NotFound {
        /// Collection of the resource
        collection: Collection,
        /// Identifier that was looked up
        id: ResourceId,
    },
    /// The resource cannot be modified or deleted, as it is still in use.
    #[error("{} {id} is in use: {reason}", .collection.resource_name())]
    InUse {
        /// Collection of the resource
        collection: Collection,
        /// Identifier of the resource in use
        id: ResourceId,
        /// Which resource still references it
        reason: String,
    },
    /// The request was rejected.
    #[error("Bad request on {}: {message}", .collection.path())]
    BadRequest {
        /// Collection on which the request was sent
        collection: Collection,
        /// Message returned by the control plane
        message: String,
    },
    /// The collection is nested and requires the id of the parent resource.
    #[error("{} requires the id of a parent resource", .0.resource_name())]
    MissingParent(Collection),
    /// The control plane cannot be reached.
    #[error("Control plane is unreachable: {0}")]
    Unreachable(String),
    /// An object has no field with the given name.
    #[error("Object has no field `{0}`")]
    MissingField(String),
    /// A field of an object has an unexpected type.
    #[error("Field `{0}` has an unexpected type")]
    InvalidField(String),
    /// The control plane returned something else than an object.
    #[error("Expected a JSON object, but got {0}")]
    NotAnObject(String),
    /// Cannot encode the request body.
    #[error("Cannot encode request: {0}")]
    Encode(#[from] serde_json::Error),
    /// The request was rejected for a reason not covered by the other variants.
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// Error while managing a virtual machine.
    #[error("VM provisioner error: {0}")]
    Provision(String),
}
