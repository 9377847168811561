//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::rc::Rc;

use bytes::Bytes;
use const_addrs::ip4;
use ospf_peer::lsdb::{LSA_INIT_SEQ_NO, LSA_MAX_AGE};
use ospf_peer::neighbor::nsm;
use ospf_peer::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};
use ospf_peer::packet::{
    DbDesc, DbDescFlags, LsUpdate, Options, Packet, PacketHdr, PacketType,
    ospfv2_update_cksum,
};
use ospf_peer::peer::{LinkType, PeerVersion, ism};
use ospf_peer::tasks::messages::ProtocolInputMsg;
use ospf_peer::tasks::messages::input::RxmtPacketType;
use ospf_peer::version::Ospfv2;

use crate::network::{BACKBONE, Network, RouterCfg, decode_sent};

//
// Helper functions.
//

fn p2p_network() -> Network<Ospfv2> {
    Network::new(
        LinkType::PointToPoint,
        &[
            RouterCfg::new("1.1.1.1", "10.0.0.1", 30),
            RouterCfg::new("2.2.2.2", "10.0.0.2", 30),
        ],
    )
}

fn broadcast_network() -> Network<Ospfv2> {
    Network::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("10.0.0.1", "10.0.0.1", 24),
            RouterCfg::new("10.0.0.2", "10.0.0.2", 24),
            RouterCfg::new("10.0.0.3", "10.0.0.3", 24),
            RouterCfg::new("10.0.0.4", "10.0.0.4", 24),
        ],
    )
}

fn router_lsa_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaType(1), router_id, router_id)
}

fn encode(packet: &Packet) -> Bytes {
    let mut buf = packet.encode::<Ospfv2>();
    ospfv2_update_cksum(&mut buf);
    buf.freeze()
}

fn dbdesc(
    router_id: Ipv4Addr,
    options: Options,
    dd_flags: DbDescFlags,
    dd_seq_no: u32,
    lsa_hdrs: Vec<LsaHdr>,
) -> Bytes {
    encode(&Packet::DbDesc(DbDesc {
        hdr: PacketHdr::new(PacketType::DbDesc, router_id, BACKBONE, 0),
        mtu: 1500,
        options,
        dd_flags,
        dd_seq_no,
        lsa_hdrs,
    }))
}

fn lsupd(router_id: Ipv4Addr, lsas: Vec<Lsa>) -> Bytes {
    encode(&Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr::new(PacketType::LsUpdate, router_id, BACKBONE, 0),
        lsas,
    }))
}

//
// Tests.
//

// Test description: two routers on a point-to-point link become fully
// adjacent and end up with identical databases.
#[tokio::test]
async fn p2p_adjacency() {
    let mut network = p2p_network();

    // First Hello: each router sees the other one, but not itself listed.
    network.hello_interval();
    let rt1 = network.router("1.1.1.1");
    assert_eq!(rt1.ism_state(), ism::State::PointToPoint);
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Init);

    // Second Hello: bidirectional communication and database exchange.
    network.hello_interval();
    for (rt, nbr) in [("1.1.1.1", "2.2.2.2"), ("2.2.2.2", "1.1.1.1")] {
        let rt = network.router(rt);
        let nbr = rt.nbr(nbr.parse().unwrap());
        assert_eq!(nbr.state, nsm::State::Full);
        assert!(nbr.lists.ls_request.is_empty());
        assert!(nbr.uptime.is_some());
    }

    // The router with the highest Router ID is the master.
    let rt1 = network.router("1.1.1.1");
    assert!(!rt1.nbr(ip4!("2.2.2.2")).is_master());
    let rt2 = network.router("2.2.2.2");
    assert!(rt2.nbr(ip4!("1.1.1.1")).is_master());

    // Database synchronization.
    network.delayed_ack();
    let rt1 = network.router("1.1.1.1");
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt1.lsdb_summary(), rt2.lsdb_summary());
    assert!(rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).is_some());
    assert!(rt1.lsa(&router_lsa_key(ip4!("2.2.2.2"))).is_some());
    for (rt, nbr) in [(rt1, ip4!("2.2.2.2")), (rt2, ip4!("1.1.1.1"))] {
        assert!(rt.nbr(nbr).lists.ls_rxmt.is_empty());
        assert!(rt.lsdb().iter().all(|lsa| lsa.pending_acks_empty()));
    }

    // Management queries.
    let pm = &network.router("1.1.1.1").pm;
    let peer_id = network.router("1.1.1.1").peer_id;
    assert_eq!(
        pm.get_attached_routers(peer_id, BACKBONE).unwrap(),
        vec![ip4!("2.2.2.2")]
    );
    assert!(!pm.neighbours_exchange_or_loading(BACKBONE));
    assert!(pm.neighbour_at_least_two_way(BACKBONE, ip4!("2.2.2.2")));
    assert!(!pm.neighbour_at_least_two_way(BACKBONE, ip4!("3.3.3.3")));
    let nbrs = pm.get_neighbor_list();
    assert_eq!(nbrs.len(), 1);
    assert_eq!(nbrs[0].router_id, ip4!("2.2.2.2"));
    assert!(nbrs[0].adjacent);
}

// Test description: DR and BDR election on a broadcast segment with four
// routers of equal priority.
#[tokio::test]
async fn broadcast_election() {
    let mut network = broadcast_network();

    // No election happens before the wait timer expires.
    network.hello_interval();
    network.hello_interval();
    for rt in &network.routers {
        assert_eq!(rt.ism_state(), ism::State::Waiting);
        assert_eq!(rt.peer().state.dr, None);
    }

    network.wait_timer();
    network.settle();

    for rt in &network.routers {
        assert_eq!(rt.peer().state.dr, Some(ip4!("10.0.0.4")));
        assert_eq!(rt.peer().state.bdr, Some(ip4!("10.0.0.3")));
    }
    assert_eq!(network.router("10.0.0.4").ism_state(), ism::State::Dr);
    assert_eq!(network.router("10.0.0.3").ism_state(), ism::State::Backup);
    assert_eq!(network.router("10.0.0.2").ism_state(), ism::State::DrOther);
    assert_eq!(network.router("10.0.0.1").ism_state(), ism::State::DrOther);

    // DROthers are only adjacent to the DR and the BDR.
    let rt1 = network.router("10.0.0.1");
    assert_eq!(rt1.nbr_state(ip4!("10.0.0.2")), nsm::State::TwoWay);
    assert_eq!(rt1.nbr_state(ip4!("10.0.0.3")), nsm::State::Full);
    assert_eq!(rt1.nbr_state(ip4!("10.0.0.4")), nsm::State::Full);
    let rt4 = network.router("10.0.0.4");
    for nbr in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        assert_eq!(rt4.nbr_state(nbr.parse().unwrap()), nsm::State::Full);
    }

    // The DR originates the Network-LSA, which reaches every router.
    let key = LsaKey::new(LsaType(2), ip4!("10.0.0.4"), ip4!("10.0.0.4"));
    for rt in &network.routers {
        let lsa = rt.lsa(&key).unwrap();
        assert!(!lsa.hdr.is_maxage());
        for router_id in ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"] {
            let router_id = router_id.parse().unwrap();
            assert!(rt.lsa(&router_lsa_key(router_id)).is_some());
        }
    }
}

// Test description: a router with priority zero never becomes DR or BDR,
// but still forms an adjacency with the DR.
#[tokio::test]
async fn broadcast_priority_zero() {
    let mut network = Network::<Ospfv2>::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("1.1.1.1", "10.0.0.1", 24).priority(0),
            RouterCfg::new("2.2.2.2", "10.0.0.2", 24),
        ],
    );

    // Ineligible routers skip the Waiting state.
    assert_eq!(network.router("1.1.1.1").ism_state(), ism::State::DrOther);
    assert_eq!(network.router("2.2.2.2").ism_state(), ism::State::Waiting);

    network.converge();

    let rt1 = network.router("1.1.1.1");
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt1.ism_state(), ism::State::DrOther);
    assert_eq!(rt2.ism_state(), ism::State::Dr);
    assert_eq!(rt1.peer().state.dr, Some(ip4!("10.0.0.2")));
    assert_eq!(rt1.peer().state.bdr, None);
    assert_eq!(rt2.peer().state.bdr, None);
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    assert_eq!(rt2.nbr_state(ip4!("1.1.1.1")), nsm::State::Full);
}

// Test description: an unexpected Database Description packet received in
// the Full state restarts the database exchange. The first packet of the new
// negotiation is only sent when the retransmission interval expires.
#[tokio::test]
async fn dbdesc_seqno_mismatch() {
    let mut network = p2p_network();
    network.converge();

    let packet = Packet::DbDesc(DbDesc {
        hdr: PacketHdr::new(PacketType::DbDesc, ip4!("2.2.2.2"), BACKBONE, 0),
        mtu: 1500,
        options: Options::E,
        dd_flags: DbDescFlags::MS,
        dd_seq_no: 0xdead,
        lsa_hdrs: vec![],
    });
    network.inject(
        "1.1.1.1",
        ip4!("10.0.0.2"),
        Ospfv2::all_spf_rtrs(),
        encode(&packet),
    );

    let rt1 = network.router_mut("1.1.1.1");
    let nbr = rt1.nbr(ip4!("2.2.2.2"));
    assert_eq!(nbr.state, nsm::State::ExStart);
    assert!(nbr.lists.ls_rxmt.is_empty());
    assert!(nbr.lists.ls_request.is_empty());
    let sent = rt1.take_sent();
    assert!(decode_sent(&sent, PacketType::DbDesc).is_empty());

    rt1.rxmt_interval(ip4!("2.2.2.2"), RxmtPacketType::DbDesc);
    let sent = rt1.take_sent();
    let dbdescs = decode_sent(&sent, PacketType::DbDesc);
    assert_eq!(dbdescs.len(), 1);
    let dbdesc = dbdescs[0].as_db_desc().unwrap();
    assert_eq!(
        dbdesc.dd_flags,
        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS
    );
    assert!(dbdesc.lsa_hdrs.is_empty());
}

// Test description: the slave answers a retransmitted Database Description
// packet with its last sent packet, even after the exchange is over.
#[tokio::test]
async fn dbdesc_duplicate_slave() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router("1.1.1.1");
    let nbr = rt1.nbr(ip4!("2.2.2.2"));
    let last_rcvd = nbr.last_rcvd_dbdesc.clone().unwrap();
    let last_sent = nbr.last_sent_dbdesc.clone().unwrap();

    let packet = Packet::DbDesc(last_rcvd);
    network.inject(
        "1.1.1.1",
        ip4!("10.0.0.2"),
        Ospfv2::all_spf_rtrs(),
        encode(&packet),
    );

    let rt1 = network.router_mut("1.1.1.1");
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    let sent = rt1.take_sent();
    let dbdescs = decode_sent(&sent, PacketType::DbDesc);
    assert_eq!(dbdescs, vec![Packet::DbDesc(last_sent)]);
}

// Test description: killing a neighbor clears its lists and releases the
// acknowledgements it owed.
#[tokio::test]
async fn nbr_kill() {
    let mut network = p2p_network();
    network.converge();

    // Leave an unacknowledged LSA on the retransmission list.
    let rt1 = network.router_mut("1.1.1.1");
    let peer_id = rt1.peer_id;
    rt1.pm.set_cost(peer_id, 20).unwrap();
    let _ = rt1.take_sent();
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    let nbr_id = rt1.nbr_id(ip4!("2.2.2.2"));
    assert!(lsa.has_pending_ack(nbr_id));

    rt1.nsm_event(ip4!("2.2.2.2"), nsm::Event::Kill);
    assert!(rt1.pm.get_neighbor_list().is_empty());
    assert!(rt1.peer().neighbors.is_empty());
    assert!(!lsa.has_pending_ack(nbr_id));
    assert!(rt1.lsdb().iter().all(|lsa| lsa.pending_acks_empty()));
    assert!(
        rt1.pm
            .get_attached_routers(peer_id, BACKBONE)
            .unwrap()
            .is_empty()
    );
}

// Test description: the inactivity timer tears down the adjacency.
#[tokio::test]
async fn nbr_inactivity_timer() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router_mut("1.1.1.1");
    let old_lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    rt1.nsm_event(ip4!("2.2.2.2"), nsm::Event::InactivityTimer);
    assert!(rt1.peer().neighbors.is_empty());

    // The Router-LSA no longer describes the point-to-point link.
    let new_lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    assert!(new_lsa.hdr.seq_no > old_lsa.hdr.seq_no);
    assert!(new_lsa.raw.len() < old_lsa.raw.len());
}

// Test description: the Router-LSA is only reoriginated when the links it
// describes actually change.
#[tokio::test]
async fn router_links_update() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router_mut("1.1.1.1");
    let peer_id = rt1.peer_id;
    let updates = rt1.pm.areas.get(&BACKBONE).unwrap().router_links_updates;
    let seq_no = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap().hdr.seq_no;

    // Same cost, no new Hello information.
    rt1.pm.set_cost(peer_id, 10).unwrap();
    network.hello_interval();
    let rt1 = network.router_mut("1.1.1.1");
    assert_eq!(
        rt1.pm.areas.get(&BACKBONE).unwrap().router_links_updates,
        updates
    );
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    assert_eq!(lsa.hdr.seq_no, seq_no);

    // New cost.
    rt1.pm.set_cost(peer_id, 20).unwrap();
    assert_eq!(
        rt1.pm.areas.get(&BACKBONE).unwrap().router_links_updates,
        updates + 1
    );
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    assert_eq!(lsa.hdr.seq_no, seq_no + 1);
}

// Test description: flooded LSAs stay on the retransmission list until
// acknowledged, and are retransmitted when lost.
#[tokio::test]
async fn lsupd_retransmission() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router_mut("1.1.1.1");
    let peer_id = rt1.peer_id;
    rt1.pm.set_cost(peer_id, 20).unwrap();

    // Lose the first transmission.
    let sent = rt1.take_sent();
    assert_eq!(decode_sent(&sent, PacketType::LsUpdate).len(), 1);
    let key = router_lsa_key(ip4!("1.1.1.1"));
    assert!(rt1.nbr(ip4!("2.2.2.2")).lists.ls_rxmt.contains_key(&key));

    rt1.rxmt_interval(ip4!("2.2.2.2"), RxmtPacketType::LsUpdate);
    network.run();

    // Not acknowledged yet: the acknowledgement is delayed.
    let seq_no = network.router("1.1.1.1").lsa(&key).unwrap().hdr.seq_no;
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt2.lsa(&key).unwrap().hdr.seq_no, seq_no);
    let rt1 = network.router("1.1.1.1");
    assert!(rt1.nbr(ip4!("2.2.2.2")).lists.ls_rxmt.contains_key(&key));

    network.delayed_ack();
    let rt1 = network.router("1.1.1.1");
    assert!(rt1.nbr(ip4!("2.2.2.2")).lists.ls_rxmt.is_empty());
    assert!(rt1.lsa(&key).unwrap().pending_acks_empty());
}

// Test description: a MaxAge LSA received from a neighbor is acknowledged
// and then removed from the database, since no neighbor still owes an
// acknowledgement for it.
#[tokio::test]
async fn lsa_maxage_flush() {
    let mut network = p2p_network();
    network.converge();

    let key = router_lsa_key(ip4!("2.2.2.2"));
    let rt1 = network.router("1.1.1.1");
    let old = rt1.lsa(&key).unwrap();
    let body = &old.raw[20..];
    let lsa = Lsa::new::<Ospfv2>(
        LSA_MAX_AGE,
        old.hdr.options,
        old.hdr.lsa_type,
        old.hdr.lsa_id,
        old.hdr.adv_rtr,
        old.hdr.seq_no + 1,
        body,
    );
    let packet = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr::new(PacketType::LsUpdate, ip4!("2.2.2.2"), BACKBONE, 0),
        lsas: vec![lsa],
    });
    network.inject(
        "1.1.1.1",
        ip4!("10.0.0.2"),
        Ospfv2::all_spf_rtrs(),
        encode(&packet),
    );

    let rt1 = network.router_mut("1.1.1.1");
    assert!(rt1.lsa(&key).is_none());
    assert_eq!(rt1.peer().state.ls_ack_delayed.len(), 1);

    rt1.timer(ProtocolInputMsg::DelayedAck);
    let sent = rt1.take_sent();
    let lsacks = decode_sent(&sent, PacketType::LsAck);
    assert_eq!(lsacks.len(), 1);
    let lsack = lsacks[0].as_ls_ack().unwrap();
    assert_eq!(lsack.lsa_hdrs.len(), 1);
    assert_eq!(lsack.lsa_hdrs[0].key(), key);
    assert!(lsack.lsa_hdrs[0].is_maxage());
}

// Test description: packets from a router using our own Router ID are
// discarded.
#[tokio::test]
async fn duplicate_router_id() {
    let mut network = Network::<Ospfv2>::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("1.1.1.1", "10.0.0.1", 24),
            RouterCfg::new("1.1.1.1", "10.0.0.2", 24),
        ],
    );
    network.hello_interval();
    network.hello_interval();

    for rt in &network.routers {
        assert!(rt.peer().neighbors.is_empty());
    }
}

// Test description: a Database Description packet whose options differ from
// the previous one restarts the negotiation while still in the Exchange
// state, releasing everything the exchange had accumulated.
#[tokio::test]
async fn dbdesc_options_mismatch_exchange() {
    let mut network = p2p_network();
    network.hello_interval();

    // Only the Hello of 2.2.2.2 gets through, so 1.1.1.1 alone starts
    // negotiating.
    let rt2 = network.router_mut("2.2.2.2");
    rt2.timer(ProtocolInputMsg::HelloInterval);
    for msg in rt2.take_sent() {
        network.deliver(1, &msg);
    }
    let rt1 = network.router_mut("1.1.1.1");
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::ExStart);
    let _ = rt1.take_sent();

    // 2.2.2.2 has the highest Router ID and becomes the master.
    let nbr_addr = ip4!("10.0.0.2");
    let dst = Ospfv2::all_spf_rtrs();
    let data = dbdesc(
        ip4!("2.2.2.2"),
        Options::E,
        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
        0x1000,
        vec![],
    );
    network.inject("1.1.1.1", nbr_addr, dst, data);
    let rt1 = network.router("1.1.1.1");
    let nbr = rt1.nbr(ip4!("2.2.2.2"));
    assert_eq!(nbr.state, nsm::State::Exchange);
    assert!(!nbr.is_master());

    // The master describes an LSA we don't have.
    let mut hdr = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap().hdr;
    hdr.lsa_id = ip4!("9.9.9.9");
    hdr.adv_rtr = ip4!("9.9.9.9");
    let data = dbdesc(
        ip4!("2.2.2.2"),
        Options::E,
        DbDescFlags::M | DbDescFlags::MS,
        0x1001,
        vec![hdr],
    );
    network.inject("1.1.1.1", nbr_addr, dst, data);

    // A new Router-LSA is flooded to the neighbor in the meantime.
    let rt1 = network.router_mut("1.1.1.1");
    let peer_id = rt1.peer_id;
    rt1.pm.set_cost(peer_id, 20).unwrap();
    let _ = rt1.take_sent();
    let nbr_id = rt1.nbr_id(ip4!("2.2.2.2"));
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    let nbr = rt1.nbr(ip4!("2.2.2.2"));
    assert_eq!(nbr.state, nsm::State::Exchange);
    assert!(nbr.lists.ls_request.contains_key(&hdr.key()));
    assert!(nbr.lists.ls_rxmt.contains_key(&lsa.hdr.key()));
    assert!(lsa.has_pending_ack(nbr_id));

    // Same flags and next sequence number, but different options.
    let data = dbdesc(
        ip4!("2.2.2.2"),
        Options::empty(),
        DbDescFlags::M | DbDescFlags::MS,
        0x1002,
        vec![],
    );
    network.inject("1.1.1.1", nbr_addr, dst, data);

    let rt1 = network.router_mut("1.1.1.1");
    let nbr = rt1.nbr(ip4!("2.2.2.2"));
    assert_eq!(nbr.state, nsm::State::ExStart);
    assert!(nbr.lists.ls_request.is_empty());
    assert!(nbr.lists.ls_request_pending.is_empty());
    assert!(nbr.lists.ls_rxmt.is_empty());
    assert!(nbr.db_handle.is_none());
    assert!(nbr.last_rcvd_dbdesc.is_none());
    assert_eq!(
        nbr.dd_flags,
        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS
    );
    assert!(!lsa.has_pending_ack(nbr_id));
    let sent = rt1.take_sent();
    assert!(decode_sent(&sent, PacketType::DbDesc).is_empty());

    // The adjacency recovers once both sides hear each other.
    network.settle();
    for (rt, nbr) in [("1.1.1.1", "2.2.2.2"), ("2.2.2.2", "1.1.1.1")] {
        let rt = network.router(rt);
        assert_eq!(rt.nbr_state(nbr.parse().unwrap()), nsm::State::Full);
    }
}

// Test description: a new instance of an LSA received while a MaxAge copy is
// still waiting to be acknowledged takes its place on every retransmission
// list.
#[tokio::test]
async fn lsa_maxage_displaced() {
    let mut network = Network::<Ospfv2>::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("10.0.0.1", "10.0.0.1", 24),
            RouterCfg::new("10.0.0.2", "10.0.0.2", 24),
            RouterCfg::new("10.0.0.3", "10.0.0.3", 24),
        ],
    );
    network.converge();
    assert_eq!(network.router("10.0.0.3").ism_state(), ism::State::Dr);
    assert_eq!(network.router("10.0.0.2").ism_state(), ism::State::Backup);

    // LSAs are sent by 10.0.0.1 to the DR.
    let key = router_lsa_key(ip4!("9.9.9.9"));
    let template = network
        .router("10.0.0.3")
        .lsa(&router_lsa_key(ip4!("10.0.0.1")))
        .unwrap();
    let lsa = |age, seq_no| {
        Lsa::new::<Ospfv2>(
            age,
            template.hdr.options,
            key.lsa_type,
            key.lsa_id,
            key.adv_rtr,
            seq_no,
            &template.raw[20..],
        )
    };
    let src = ip4!("10.0.0.1");
    let dst = Ospfv2::all_dr_rtrs();

    let data = lsupd(src, vec![lsa(1, LSA_INIT_SEQ_NO)]);
    network.inject("10.0.0.3", src, dst, data);
    network.run();
    network.delayed_ack();
    let dr = network.router("10.0.0.3");
    assert!(dr.nbr(ip4!("10.0.0.2")).lists.ls_rxmt.is_empty());

    // The originator flushes the LSA. The BDR hasn't acknowledged it yet.
    let data = lsupd(src, vec![lsa(LSA_MAX_AGE, LSA_INIT_SEQ_NO + 1)]);
    network.inject("10.0.0.3", src, dst, data);
    let dr = network.router_mut("10.0.0.3");
    let _ = dr.take_sent();
    let bdr_id = dr.nbr_id(ip4!("10.0.0.2"));
    let maxage = dr.lsa(&key).unwrap();
    assert!(maxage.is_maxage());
    assert!(maxage.has_pending_ack(bdr_id));
    let rxmt = &dr.nbr(ip4!("10.0.0.2")).lists.ls_rxmt;
    assert!(Rc::ptr_eq(rxmt.get(&key).unwrap(), &maxage));

    // The originator comes back with a fresh instance.
    let data = lsupd(src, vec![lsa(1, LSA_INIT_SEQ_NO + 2)]);
    network.inject("10.0.0.3", src, dst, data);
    let dr = network.router("10.0.0.3");
    assert!(maxage.pending_acks_empty());
    let fresh = dr.lsa(&key).unwrap();
    assert!(!fresh.is_maxage());
    assert_eq!(fresh.hdr.seq_no, LSA_INIT_SEQ_NO + 2);
    let rxmt = &dr.nbr(ip4!("10.0.0.2")).lists.ls_rxmt;
    assert!(Rc::ptr_eq(rxmt.get(&key).unwrap(), &fresh));

    network.run();
    network.delayed_ack();
    for rt in &network.routers {
        let lsa = rt.lsa(&key).unwrap();
        assert_eq!(lsa.hdr.seq_no, LSA_INIT_SEQ_NO + 2);
        assert!(!lsa.is_maxage());
    }
    let dr = network.router("10.0.0.3");
    assert!(dr.nbr(ip4!("10.0.0.2")).lists.ls_rxmt.is_empty());
}

// Test description: configured NBMA neighbors are polled with unicast Hellos
// as soon as the interface comes up.
#[tokio::test]
async fn nbma_static_neighbors() {
    let mut network = Network::<Ospfv2>::new(
        LinkType::Nbma,
        &[
            RouterCfg::new("1.1.1.1", "10.0.0.1", 24).static_nbr("10.0.0.2", 1),
            RouterCfg::new("2.2.2.2", "10.0.0.2", 24).static_nbr("10.0.0.1", 1),
        ],
    );

    // Eligible neighbors go from Down to Attempt.
    for rt in &network.routers {
        assert_eq!(rt.ism_state(), ism::State::Waiting);
        assert_eq!(rt.peer().neighbors.len(), 1);
        let nbr = &rt.peer().neighbors[0];
        assert!(nbr.is_static);
        assert_eq!(nbr.state, nsm::State::Attempt);
        assert!(nbr.router_id.is_unspecified());
    }

    // A first Hello goes out when polling starts, then one per interval,
    // always unicast to the configured neighbor.
    let rt1 = network.router_mut("1.1.1.1");
    let mut sent = rt1.take_sent();
    rt1.timer(ProtocolInputMsg::HelloInterval);
    sent.extend(rt1.take_sent());
    assert_eq!(sent.len(), 2);
    for msg in &sent {
        assert_eq!(msg.pkt_type, PacketType::Hello);
        assert_eq!(msg.dst.as_slice(), &[ip4!("10.0.0.2")]);
    }
    network.deliver(0, &sent[1]);

    // The Hello is matched to the configured neighbor by source address.
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt2.peer().neighbors.len(), 1);
    let nbr = rt2.nbr(ip4!("1.1.1.1"));
    assert!(nbr.is_static);
    assert_eq!(nbr.state, nsm::State::Init);

    network.converge();
    let rt1 = network.router("1.1.1.1");
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt2.ism_state(), ism::State::Dr);
    assert_eq!(rt1.ism_state(), ism::State::Backup);
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    assert_eq!(rt2.nbr_state(ip4!("1.1.1.1")), nsm::State::Full);
    assert_eq!(rt1.lsdb_summary(), rt2.lsdb_summary());
}

// Test description: a router still in the Waiting state elects right away
// when it hears from an existing DR, without waiting for the wait timer.
#[tokio::test]
async fn backup_seen() {
    let mut network = Network::<Ospfv2>::new(
        LinkType::Broadcast,
        &[
            RouterCfg::new("1.1.1.1", "10.0.0.1", 24),
            RouterCfg::new("2.2.2.2", "10.0.0.2", 24),
        ],
    );
    network.hello_interval();

    // 2.2.2.2 finishes waiting first and becomes DR, with no BDR.
    let rt2 = network.router_mut("2.2.2.2");
    rt2.timer(ProtocolInputMsg::WaitTimer);
    assert_eq!(rt2.ism_state(), ism::State::Dr);
    assert_eq!(rt2.peer().state.bdr, None);
    network.run();
    assert_eq!(network.router("1.1.1.1").ism_state(), ism::State::Waiting);

    // Its next Hello declares itself DR.
    let rt2 = network.router_mut("2.2.2.2");
    rt2.timer(ProtocolInputMsg::HelloInterval);
    network.run();

    let rt1 = network.router("1.1.1.1");
    assert_eq!(rt1.ism_state(), ism::State::Backup);
    assert_eq!(rt1.peer().state.dr, Some(ip4!("10.0.0.2")));
    assert_eq!(rt1.peer().state.bdr, Some(ip4!("10.0.0.1")));
    assert!(rt1.peer().state.tasks.wait_timer.is_none());

    network.settle();
    let rt1 = network.router("1.1.1.1");
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    assert_eq!(network.router("2.2.2.2").ism_state(), ism::State::Dr);
}

// Test description: a looped back link only advertises a host route to its
// address and ignores everything it receives until the loop goes away.
#[tokio::test]
async fn loopback() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router_mut("1.1.1.1");
    let peer_id = rt1.peer_id;
    rt1.pm.set_loopback(peer_id, true).unwrap();
    assert_eq!(rt1.ism_state(), ism::State::Loopback);
    assert!(rt1.peer().neighbors.is_empty());
    let _ = rt1.take_sent();

    // Router-LSA: flags, #links, then a single stub link.
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    let body = &lsa.raw[20..];
    assert_eq!(body.len(), 4 + 12);
    assert_eq!(u16::from_be_bytes([body[2], body[3]]), 1);
    assert_eq!(&body[4..8], &[10, 0, 0, 1]);
    assert_eq!(&body[8..12], &[255, 255, 255, 255]);
    assert_eq!(body[12], 3);
    assert_eq!(u16::from_be_bytes([body[14], body[15]]), 0);

    // No Hellos are sent.
    rt1.timer(ProtocolInputMsg::HelloInterval);
    let sent = rt1.take_sent();
    assert!(decode_sent(&sent, PacketType::Hello).is_empty());

    // Hellos from the neighbor are dropped.
    network.hello_interval();
    network.hello_interval();
    let rt1 = network.router("1.1.1.1");
    assert_eq!(rt1.ism_state(), ism::State::Loopback);
    assert!(rt1.peer().neighbors.is_empty());

    // Back to normal operation.
    let rt1 = network.router_mut("1.1.1.1");
    rt1.pm.set_loopback(peer_id, false).unwrap();
    assert_eq!(rt1.ism_state(), ism::State::PointToPoint);
    network.converge();
    let rt1 = network.router("1.1.1.1");
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    let lsa = rt1.lsa(&router_lsa_key(ip4!("1.1.1.1"))).unwrap();
    let body = &lsa.raw[20..];
    assert_eq!(u16::from_be_bytes([body[2], body[3]]), 2);
}

// Test description: changing the Router ID restarts every peer, which then
// forms new adjacencies under the new identity.
#[tokio::test]
async fn router_id_change() {
    let mut network = p2p_network();
    network.converge();

    let rt1 = network.router_mut("1.1.1.1");
    rt1.pm.set_router_id(ip4!("3.3.3.3"));
    assert_eq!(rt1.router_id(), ip4!("3.3.3.3"));
    assert_eq!(rt1.ism_state(), ism::State::PointToPoint);
    assert!(rt1.peer().neighbors.is_empty());

    network.converge();
    let rt1 = network.router("3.3.3.3");
    assert_eq!(rt1.nbr_state(ip4!("2.2.2.2")), nsm::State::Full);
    assert!(rt1.lsa(&router_lsa_key(ip4!("3.3.3.3"))).is_some());
    let rt2 = network.router("2.2.2.2");
    assert_eq!(rt2.nbr_state(ip4!("3.3.3.3")), nsm::State::Full);
    assert!(rt2.lsa(&router_lsa_key(ip4!("3.3.3.3"))).is_some());
}
