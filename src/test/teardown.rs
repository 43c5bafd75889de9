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

use neutron_api::{
    mock::{Call, MockControlPlane},
    spec::{
        BgpPeerSpec, BgpSpeakerSpec, Direction, FirewallAction, FirewallEvent, FirewallLogSpec,
        FirewallPolicySpec, FirewallRuleSpec, FirewallSpec, FloatingIpSpec, GatewayDeviceSpec,
        L2GatewayConnectionSpec, L2GatewayDevice, L2GatewaySpec, LoggingResourceSpec, NetworkSpec,
        PortSpec, RemoteMacEntrySpec, Route, RouterSpec, SecurityGroupRuleSpec, SecurityGroupSpec,
        SubnetSpec,
    },
    ApiObject, ClientError, Collection, ControlPlane, ResourceId, VmSpec,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use test_log::test;

use super::id;
use crate::{
    registrar::Registrar,
    registry::{ResourceKind, Tracked},
    teardown::{TeardownCoordinator, TeardownStep, TEARDOWN_ORDER},
};

fn count(calls: &[Call], call: &Call) -> usize {
    calls.iter().filter(|c| *c == call).count()
}

fn position(calls: &[Call], call: &Call) -> usize {
    calls.iter().position(|c| c == call).unwrap()
}

#[test]
fn order_covers_every_kind_once() {
    for kind in ResourceKind::ALL {
        assert_eq!(
            TEARDOWN_ORDER
                .iter()
                .filter(|s| **s == TeardownStep::Delete(kind))
                .count(),
            1,
            "{kind}"
        );
    }
    let pos = |step: TeardownStep| TEARDOWN_ORDER.iter().position(|s| *s == step).unwrap();
    let delete = |kind| pos(TeardownStep::Delete(kind));
    assert!(pos(TeardownStep::ClearRoutes) < delete(ResourceKind::RouterInterface));
    assert!(delete(ResourceKind::RouterInterface) < delete(ResourceKind::Router));
    assert!(delete(ResourceKind::FloatingIp) < delete(ResourceKind::Port));
    assert!(delete(ResourceKind::VmPort) < delete(ResourceKind::Port));
    assert!(delete(ResourceKind::L2GatewayConnection) < delete(ResourceKind::L2Gateway));
    assert!(delete(ResourceKind::L2Gateway) < delete(ResourceKind::GatewayDevice));
    assert!(delete(ResourceKind::FirewallPolicyRule) < delete(ResourceKind::FirewallRule));
    assert!(delete(ResourceKind::FirewallPolicyRule) < delete(ResourceKind::FirewallPolicy));
    assert!(delete(ResourceKind::BgpSpeakerPeer) < delete(ResourceKind::BgpPeer));
    assert!(delete(ResourceKind::SecurityGroupRule) < delete(ResourceKind::SecurityGroup));
    assert!(delete(ResourceKind::Subnet) < delete(ResourceKind::Network));
    assert_eq!(TeardownStep::ClearRoutes.to_string(), "clear routes of router");
}

#[test]
fn router_topology() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    let net = reg.create_network(&NetworkSpec::new("n")).unwrap().id().unwrap();
    let subnet = reg
        .create_subnet(&SubnetSpec::new(net, "10.0.0.0/24".parse().unwrap()))
        .unwrap()
        .id()
        .unwrap();
    reg.create_router(&RouterSpec::new("r").with_subnets([subnet]))
        .unwrap();

    assert_eq!(
        reg.registry().iter().collect::<Vec<_>>(),
        vec![
            (ResourceKind::Network, &[Tracked::Network(id("network-1"))][..]),
            (ResourceKind::Subnet, &[Tracked::Subnet(id("subnet-1"))][..]),
            (ResourceKind::Router, &[Tracked::Router(id("router-1"))][..]),
            (
                ResourceKind::RouterInterface,
                &[Tracked::RouterInterface {
                    router: id("router-1"),
                    subnet: id("subnet-1")
                }][..]
            ),
        ]
    );

    mock.clear_calls();
    let report = reg.teardown(&TeardownCoordinator::new(&mock, &mock));

    assert_eq!(
        mock.calls(),
        vec![
            Call::Update(Collection::Routers, id("router-1")),
            Call::RemoveRouterInterface(id("router-1"), id("subnet-1")),
            Call::Delete(Collection::Routers, id("router-1")),
            Call::Delete(Collection::Subnets, id("subnet-1")),
            Call::Delete(Collection::Networks, id("network-1")),
        ]
    );
    assert!(report.is_clean());
    assert_eq!(report.attempted, 5);
    assert!(reg.registry().is_empty());
    assert!(mock.is_clean());
}

#[test]
fn routes_are_cleared_before_interfaces() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    let net = reg.create_network(&NetworkSpec::new("n")).unwrap().id().unwrap();
    reg.create_subnet(&SubnetSpec::new(net, "10.0.0.0/24".parse().unwrap()))
        .unwrap();
    reg.create_router(&RouterSpec::new("r").with_subnets([id("subnet-1")]))
        .unwrap();
    reg.set_router_routes(
        &id("router-1"),
        &[Route {
            destination: "10.1.0.0/16".parse().unwrap(),
            nexthop: "10.0.0.2".parse().unwrap(),
        }],
    )
    .unwrap();

    let report = reg.teardown(&TeardownCoordinator::new(&mock, &mock));
    assert!(report.is_clean(), "{report:?}");
    assert!(mock.is_clean());
}

#[test]
fn failure_does_not_stop_teardown() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    let sg = reg
        .create_security_group(&SecurityGroupSpec {
            name: "sg".to_string(),
            description: String::new(),
        })
        .unwrap()
        .id()
        .unwrap();
    for _ in 0..2 {
        reg.create_security_group_rule(&SecurityGroupRuleSpec::new(
            sg.clone(),
            Direction::Ingress,
        ))
        .unwrap();
    }
    mock.fail_on(Call::Delete(
        Collection::SecurityGroupRules,
        id("security_group_rule-1"),
    ));
    mock.clear_calls();

    let report = reg.teardown(&TeardownCoordinator::new(&mock, &mock));

    let calls = mock.calls();
    assert_eq!(
        calls,
        vec![
            Call::Delete(Collection::SecurityGroupRules, id("security_group_rule-1")),
            Call::Delete(Collection::SecurityGroupRules, id("security_group_rule-2")),
            Call::Delete(Collection::SecurityGroups, id("security_group-1")),
        ]
    );
    assert_eq!(
        count(&calls, &Call::Delete(Collection::SecurityGroups, sg)),
        1
    );
    assert_eq!(report.attempted, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].step,
        TeardownStep::Delete(ResourceKind::SecurityGroupRule)
    );
    assert_eq!(
        report.failures[0].entry,
        Tracked::SecurityGroupRule(id("security_group_rule-1"))
    );
    assert!(report.failures[0].message.contains("injected failure"));
    assert!(reg.registry().is_empty());
    assert!(mock.is_clean());
}

#[test]
fn floating_ip_before_port() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    let net = reg.create_network(&NetworkSpec::new("n")).unwrap().id().unwrap();
    let public = reg
        .create_network(&NetworkSpec::external("public"))
        .unwrap()
        .id()
        .unwrap();
    let port = reg.create_port(&PortSpec::new(net)).unwrap().id().unwrap();
    let fip = reg
        .create_floating_ip(&FloatingIpSpec::new(public, Some(port.clone())))
        .unwrap()
        .id()
        .unwrap();

    let report = reg.teardown(&TeardownCoordinator::new(&mock, &mock));
    let calls = mock.calls();
    assert!(
        position(&calls, &Call::Delete(Collection::FloatingIps, fip))
            < position(&calls, &Call::Delete(Collection::Ports, port))
    );
    assert!(report.is_clean());
    assert!(mock.is_clean());
}

/// Create one resource of every kind, with all dependencies between them.
fn full_topology(reg: &mut Registrar<'_>) {
    let net = reg.create_network(&NetworkSpec::new("n")).unwrap().id().unwrap();
    let subnet = reg
        .create_subnet(&SubnetSpec::new(net.clone(), "10.0.0.0/24".parse().unwrap()))
        .unwrap()
        .id()
        .unwrap();
    let public = reg
        .create_network(&NetworkSpec::external("public"))
        .unwrap()
        .id()
        .unwrap();
    reg.create_subnet(&SubnetSpec::new(public.clone(), "200.0.0.0/16".parse().unwrap()))
        .unwrap();
    let router = reg
        .create_router(
            &RouterSpec::new("r")
                .with_gateway(public.clone())
                .with_subnets([subnet]),
        )
        .unwrap()
        .id()
        .unwrap();
    reg.set_router_routes(
        &router,
        &[Route {
            destination: "10.1.0.0/16".parse().unwrap(),
            nexthop: "10.0.0.2".parse().unwrap(),
        }],
    )
    .unwrap();

    let sg = reg
        .create_security_group(&SecurityGroupSpec {
            name: "sg".to_string(),
            description: String::new(),
        })
        .unwrap()
        .id()
        .unwrap();
    reg.create_security_group_rule(&SecurityGroupRuleSpec::new(sg.clone(), Direction::Egress))
        .unwrap();
    let mut port = PortSpec::new(net.clone());
    port.security_groups = Some(vec![sg]);
    let port = reg.create_port(&port).unwrap().id().unwrap();
    reg.create_floating_ip(&FloatingIpSpec::new(public, Some(port)))
        .unwrap();
    reg.create_vm(&VmSpec::new("vm", "compute-1"), &PortSpec::new(net.clone()))
        .unwrap();

    let rule = reg
        .create_firewall_rule(&FirewallRuleSpec::new(FirewallAction::Deny))
        .unwrap()
        .id()
        .unwrap();
    let policy = reg
        .create_firewall_policy(&FirewallPolicySpec {
            name: "p".to_string(),
            firewall_rules: vec![rule],
        })
        .unwrap()
        .id()
        .unwrap();
    let extra_rule = reg
        .create_firewall_rule(&FirewallRuleSpec::new(FirewallAction::Allow))
        .unwrap()
        .id()
        .unwrap();
    reg.insert_firewall_rule(&policy, &extra_rule).unwrap();
    let firewall = reg
        .create_firewall(&FirewallSpec::new(policy, vec![router.clone()]))
        .unwrap()
        .id()
        .unwrap();
    let logging = reg
        .create_logging_resource(&LoggingResourceSpec {
            name: "logging".to_string(),
            ..Default::default()
        })
        .unwrap()
        .id()
        .unwrap();
    reg.create_firewall_log(&FirewallLogSpec {
        logging_resource_id: logging,
        firewall_id: firewall,
        fw_event: FirewallEvent::Drop,
        description: String::new(),
    })
    .unwrap();

    let speaker = reg
        .create_bgp_speaker(&BgpSpeakerSpec {
            name: "speaker".to_string(),
            local_as: 65000,
            ip_version: 4,
            logical_router: Some(router.clone()),
        })
        .unwrap()
        .id()
        .unwrap();
    let peer = reg
        .create_bgp_peer(&BgpPeerSpec::new("peer", "10.0.0.1".parse().unwrap(), 65001))
        .unwrap()
        .id()
        .unwrap();
    reg.add_bgp_peer_to_speaker(&speaker, &peer).unwrap();

    let device = reg
        .create_gateway_device(&GatewayDeviceSpec::router_vtep(
            router,
            vec!["10.0.0.5".parse().unwrap()],
        ))
        .unwrap()
        .id()
        .unwrap();
    reg.create_remote_mac_entry(&RemoteMacEntrySpec {
        gateway_device_id: device.clone(),
        mac_address: "fa:16:3e:00:00:01".to_string(),
        vtep_address: "10.0.0.6".parse().unwrap(),
        segmentation_id: 100,
    })
    .unwrap();
    let l2gw = reg
        .create_l2_gateway(&L2GatewaySpec {
            name: "l2gw".to_string(),
            devices: vec![L2GatewayDevice {
                device_id: device,
                segmentation_id: None,
            }],
        })
        .unwrap()
        .id()
        .unwrap();
    reg.create_l2_gateway_connection(&L2GatewayConnectionSpec {
        l2_gateway_id: l2gw,
        network_id: net,
        segmentation_id: Some(100),
    })
    .unwrap();
}

#[test]
fn teardown_removes_everything() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    full_topology(&mut reg);
    assert_eq!(reg.registry().iter().count(), ResourceKind::ALL.len());

    let report = reg.teardown(&TeardownCoordinator::new(&mock, &mock));
    assert!(report.is_clean(), "{report:#?}");
    assert!(reg.registry().is_empty());
    assert!(mock.is_clean());
}

#[test]
fn unreachable_control_plane() {
    let mock = MockControlPlane::new();
    let mut reg = Registrar::new(&mock, &mock);
    full_topology(&mut reg);
    let total = reg.registry().len();
    let num_routers = reg.registry().entries(ResourceKind::Router).len();
    mock.set_unreachable(true);

    let report = reg
        .teardown(&TeardownCoordinator::new(&mock, &mock).failure_level(log::Level::Warn));

    assert_eq!(report.attempted, total + num_routers);
    assert_eq!(report.failures.len(), report.attempted);
    assert!(report
        .failures
        .iter()
        .all(|f| f.message.contains("unreachable")));
    assert!(reg.registry().is_empty());
}

/// Control plane that panics when deleting a specific resource.
struct PanicOnDelete<'a> {
    inner: &'a MockControlPlane,
    target: ResourceId,
}

impl<'a> ControlPlane for PanicOnDelete<'a> {
    fn list_extensions(&self) -> Result<Vec<ApiObject>, ClientError> {
        self.inner.list_extensions()
    }

    fn create(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        body: Value,
    ) -> Result<ApiObject, ClientError> {
        self.inner.create(collection, parent, body)
    }

    fn show(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        self.inner.show(collection, parent, id)
    }

    fn list(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
    ) -> Result<Vec<ApiObject>, ClientError> {
        self.inner.list(collection, parent)
    }

    fn update(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
        body: Value,
    ) -> Result<ApiObject, ClientError> {
        self.inner.update(collection, parent, id, body)
    }

    fn delete(
        &self,
        collection: Collection,
        parent: Option<&ResourceId>,
        id: &ResourceId,
    ) -> Result<(), ClientError> {
        if id == &self.target {
            panic!("connection reset while deleting {id}");
        }
        self.inner.delete(collection, parent, id)
    }

    fn add_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        self.inner.add_router_interface(router, subnet)
    }

    fn remove_router_interface(
        &self,
        router: &ResourceId,
        subnet: &ResourceId,
    ) -> Result<(), ClientError> {
        self.inner.remove_router_interface(router, subnet)
    }

    fn insert_firewall_rule(
        &self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<ApiObject, ClientError> {
        self.inner.insert_firewall_rule(policy, rule)
    }

    fn remove_firewall_rule(
        &self,
        policy: &ResourceId,
        rule: &ResourceId,
    ) -> Result<(), ClientError> {
        self.inner.remove_firewall_rule(policy, rule)
    }

    fn add_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError> {
        self.inner.add_bgp_peer(speaker, peer)
    }

    fn remove_bgp_peer(&self, speaker: &ResourceId, peer: &ResourceId) -> Result<(), ClientError> {
        self.inner.remove_bgp_peer(speaker, peer)
    }
}

#[test]
fn panic_during_teardown_is_contained() {
    let mock = MockControlPlane::new();
    let client = PanicOnDelete {
        inner: &mock,
        target: id("port-1"),
    };
    let mut reg = Registrar::new(&client, &mock);
    let net = reg.create_network(&NetworkSpec::new("n")).unwrap().id().unwrap();
    reg.create_port(&PortSpec::new(net.clone())).unwrap();
    reg.create_port(&PortSpec::new(net)).unwrap();

    let report = reg.teardown(&TeardownCoordinator::new(&client, &mock));

    assert_eq!(report.attempted, 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].entry, Tracked::Port(id("port-1")));
    assert!(report.failures[0].message.contains("connection reset"));
    // the network is still used by the port that could not be deleted
    assert_eq!(report.failures[1].entry, Tracked::Network(id("network-1")));
    assert_eq!(mock.live(Collection::Ports), vec![id("port-1")]);
    assert!(reg.registry().is_empty());
}
