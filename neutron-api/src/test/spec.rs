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

use crate::{
    spec::{
        BgpPeerSpec, FirewallLogSpec, FirewallEvent, NetworkSpec, PortSpec, ResourceSpec,
        RouterSpec, SecurityGroupRuleSpec, Direction, SubnetSpec,
    },
    Collection, ResourceId,
};

#[test]
fn network_body() {
    let body = NetworkSpec::new("net").to_body().unwrap();
    assert_eq!(body, json!({"name": "net", "admin_state_up": true}));

    let body = NetworkSpec::external("public").to_body().unwrap();
    assert_eq!(
        body,
        json!({"name": "public", "admin_state_up": true, "router:external": true})
    );
}

#[test]
fn subnet_ip_version() -> Result<(), Box<dyn std::error::Error>> {
    let v4 = SubnetSpec::new("network-1".into(), "10.0.0.0/24".parse()?);
    assert_eq!(v4.ip_version, 4);
    let v6 = SubnetSpec::new("network-1".into(), "2001:db8::/64".parse()?).named("v6");
    assert_eq!(
        v6.to_body()?,
        json!({"network_id": "network-1", "cidr": "2001:db8::/64", "ip_version": 6, "name": "v6"})
    );
    Ok(())
}

#[test]
fn router_subnets_not_in_body() {
    let spec = RouterSpec::new("r")
        .with_gateway("network-2".into())
        .with_subnets(vec![ResourceId::from("subnet-1")]);
    assert_eq!(
        spec.to_body().unwrap(),
        json!({
            "name": "r",
            "admin_state_up": true,
            "external_gateway_info": {"network_id": "network-2"}
        })
    );
    assert_eq!(spec.subnets, vec![ResourceId::from("subnet-1")]);
}

#[test]
fn port_binding_host() {
    let mut spec = PortSpec::new("network-1".into());
    spec.host = Some("cmp1".to_string());
    assert_eq!(
        spec.to_body().unwrap(),
        json!({"network_id": "network-1", "binding:host_id": "cmp1"})
    );
}

#[test]
fn security_group_rule_body() {
    let mut spec = SecurityGroupRuleSpec::new("security_group-1".into(), Direction::Ingress);
    spec.protocol = Some("tcp".to_string());
    spec.port_range_min = Some(22);
    spec.port_range_max = Some(22);
    assert_eq!(
        spec.to_body().unwrap(),
        json!({
            "security_group_id": "security_group-1",
            "direction": "ingress",
            "ethertype": "IPv4",
            "protocol": "tcp",
            "port_range_min": 22,
            "port_range_max": 22,
        })
    );
}

#[test]
fn nested_specs_have_parent() {
    let spec = FirewallLogSpec {
        logging_resource_id: "logging_resource-1".into(),
        firewall_id: "firewall-1".into(),
        fw_event: FirewallEvent::Drop,
        description: String::new(),
    };
    assert_eq!(spec.parent(), Some(&ResourceId::from("logging_resource-1")));
    assert_eq!(
        spec.to_body().unwrap(),
        json!({"firewall_id": "firewall-1", "fw_event": "DROP"})
    );
    assert_eq!(FirewallLogSpec::COLLECTION, Collection::FirewallLogs);

    let peer = BgpPeerSpec::new("peer", "10.0.0.2".parse().unwrap(), 64512);
    assert_eq!(peer.parent(), None);
}

#[test]
fn collection_paths() {
    assert_eq!(Collection::Networks.resolve_path(None).unwrap(), "networks");
    assert_eq!(
        Collection::RemoteMacEntries
            .resolve_path(Some(&"gateway_device-1".into()))
            .unwrap(),
        "gw/gateway_devices/gateway_device-1/remote_mac_entries"
    );
    assert!(Collection::FirewallLogs.resolve_path(None).is_err());
    for c in Collection::ALL {
        assert_eq!(c.path().contains("{}"), c.parent().is_some());
    }
}
