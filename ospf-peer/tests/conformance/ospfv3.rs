//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use const_addrs::ip4;
use ospf_peer::neighbor::nsm;
use ospf_peer::packet::lsa::{LsaKey, LsaType};
use ospf_peer::peer::{LinkType, ism};
use ospf_peer::version::Ospfv3;

use crate::network::{Network, RouterCfg};

fn router_lsa_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaType(0x2001), router_id, Ipv4Addr::UNSPECIFIED)
}

// Test description: two OSPFv3 routers on a point-to-point link become fully
// adjacent and learn each other's Interface ID.
#[tokio::test]
async fn p2p_adjacency() {
    let mut network = Network::<Ospfv3>::new(
        LinkType::PointToPoint,
        &[
            RouterCfg::new("1.1.1.1", "fe80::1", 64).iface_id(1),
            RouterCfg::new("2.2.2.2", "fe80::2", 64).iface_id(2),
        ],
    );
    network.converge();

    let rt1 = network.router("1.1.1.1");
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt1.ism_state(), ism::State::PointToPoint);
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    assert_eq!(rt2.nbr_state(ip4!("1.1.1.1")), nsm::State::Full);
    assert_eq!(rt1.nbr(ip4!("2.2.2.2")).iface_id, 2);
    assert_eq!(rt2.nbr(ip4!("1.1.1.1")).iface_id, 1);

    assert_eq!(rt1.lsdb_summary(), rt2.lsdb_summary());
    for router_id in [ip4!("1.1.1.1"), ip4!("2.2.2.2")] {
        assert!(rt1.lsa(&router_lsa_key(router_id)).is_some());
    }
    assert!(rt1.nbr(ip4!("2.2.2.2")).lists.ls_rxmt.is_empty());
}

// Test description: OSPFv3 routers are identified by their Router IDs in the
// DR election.
#[tokio::test]
async fn broadcast_election() {
    let mut network = Network::<Ospfv3>::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("1.1.1.1", "fe80::1", 64).iface_id(1),
            RouterCfg::new("2.2.2.2", "fe80::2", 64).iface_id(2),
            RouterCfg::new("3.3.3.3", "fe80::3", 64).iface_id(3),
        ],
    );
    network.converge();

    for rt in &network.routers {
        assert_eq!(rt.peer().state.dr, Some(ip4!("3.3.3.3")));
        assert_eq!(rt.peer().state.bdr, Some(ip4!("2.2.2.2")));
    }
    assert_eq!(network.router("3.3.3.3").ism_state(), ism::State::Dr);
    assert_eq!(network.router("2.2.2.2").ism_state(), ism::State::Backup);
    assert_eq!(network.router("1.1.1.1").ism_state(), ism::State::DrOther);

    // The Network-LSA is identified by the DR's Interface ID.
    let key = LsaKey::new(LsaType(0x2002), ip4!("3.3.3.3"), ip4!("0.0.0.3"));
    for rt in &network.routers {
        assert!(rt.lsa(&key).is_some());
    }
}
