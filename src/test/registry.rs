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

use pretty_assertions::assert_eq;
use serde_json::json;

use super::id;
use crate::registry::{RegistryError, ResourceKind, ResourceRegistry, Tracked};

#[test]
fn entries_keep_creation_order() {
    let mut reg = ResourceRegistry::new();
    reg.register(Tracked::Network(id("n2"))).unwrap();
    reg.register(Tracked::Subnet(id("s1"))).unwrap();
    reg.register(Tracked::Network(id("n1"))).unwrap();

    assert_eq!(
        reg.entries(ResourceKind::Network),
        &[Tracked::Network(id("n2")), Tracked::Network(id("n1"))]
    );
    assert_eq!(reg.entries(ResourceKind::Subnet), &[Tracked::Subnet(id("s1"))]);
    assert!(reg.entries(ResourceKind::Router).is_empty());
    assert_eq!(reg.len(), 3);
    assert_eq!(
        reg.iter().map(|(k, e)| (k, e.len())).collect::<Vec<_>>(),
        vec![(ResourceKind::Network, 2), (ResourceKind::Subnet, 1)]
    );
}

#[test]
fn register_twice() {
    let mut reg = ResourceRegistry::new();
    let entry = Tracked::RouterInterface {
        router: id("r"),
        subnet: id("s"),
    };
    reg.register(entry.clone()).unwrap();
    assert_eq!(
        reg.register(entry.clone()),
        Err(RegistryError::AlreadyRegistered(entry))
    );
    assert_eq!(reg.len(), 1);
}

#[test]
fn deregister() {
    let mut reg = ResourceRegistry::new();
    reg.register(Tracked::Port(id("p1"))).unwrap();
    reg.register(Tracked::Port(id("p2"))).unwrap();
    reg.register(Tracked::Port(id("p3"))).unwrap();

    reg.deregister(&Tracked::Port(id("p2"))).unwrap();
    assert_eq!(
        reg.entries(ResourceKind::Port),
        &[Tracked::Port(id("p1")), Tracked::Port(id("p3"))]
    );
    assert!(!reg.contains(&Tracked::Port(id("p2"))));

    assert_eq!(
        reg.deregister(&Tracked::Port(id("p2"))),
        Err(RegistryError::NotRegistered(Tracked::Port(id("p2"))))
    );
    // same id, but a different kind
    assert_eq!(
        reg.deregister(&Tracked::Network(id("p1"))),
        Err(RegistryError::NotRegistered(Tracked::Network(id("p1"))))
    );
}

#[test]
fn drain() {
    let mut reg = ResourceRegistry::new();
    reg.register(Tracked::FloatingIp(id("f1"))).unwrap();
    reg.register(Tracked::FloatingIp(id("f2"))).unwrap();
    reg.register(Tracked::Port(id("p1"))).unwrap();

    assert_eq!(
        reg.drain(ResourceKind::FloatingIp),
        vec![Tracked::FloatingIp(id("f1")), Tracked::FloatingIp(id("f2"))]
    );
    assert!(reg.drain(ResourceKind::FloatingIp).is_empty());
    assert!(reg.drain(ResourceKind::Network).is_empty());
    assert_eq!(reg.len(), 1);
    assert!(!reg.is_empty());
}

#[test]
fn every_kind_has_its_entry() {
    let entries = [
        Tracked::Network(id("x")),
        Tracked::RouterInterface {
            router: id("r"),
            subnet: id("s"),
        },
        Tracked::FirewallLog {
            logging_resource: id("l"),
            log: id("x"),
        },
        Tracked::VmPort {
            vm: id("vm"),
            port: id("p"),
        },
    ];
    let kinds = entries.iter().map(Tracked::kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Network,
            ResourceKind::RouterInterface,
            ResourceKind::FirewallLog,
            ResourceKind::VmPort
        ]
    );
    assert_eq!(ResourceKind::ALL.len(), 22);
}

#[test]
fn display_and_serialize() {
    let entry = Tracked::BgpSpeakerPeer {
        speaker: id("speaker-1"),
        peer: id("peer-1"),
    };
    assert_eq!(entry.to_string(), "speaker-1/peer-1");
    assert_eq!(
        serde_json::to_value(&entry).unwrap(),
        json!({"kind": "bgp-speaker-peer", "id": {"speaker": "speaker-1", "peer": "peer-1"}})
    );
    assert_eq!(
        serde_json::to_value(Tracked::Subnet(id("s"))).unwrap(),
        json!({"kind": "subnet", "id": "s"})
    );
}
