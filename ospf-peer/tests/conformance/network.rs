//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use ospf_peer::config::{InstanceCfg, LinkCfg, PeerCfg, StaticNbrCfg};
use ospf_peer::lsdb::LsaDatabase;
use ospf_peer::neighbor::{Neighbor, NeighborId, nsm};
use ospf_peer::packet::lsa::{LsaKey, LsaRef};
use ospf_peer::packet::{Packet, PacketType};
use ospf_peer::peer::{LinkType, Peer, ism};
use ospf_peer::peer_manager::{PeerId, PeerManager, ProtocolChannelsRx};
use ospf_peer::tasks::messages::input::{
    NsmEventMsg, PeerTimerMsg, RxmtIntervalMsg, RxmtPacketType,
};
use ospf_peer::tasks::messages::output::NetTxPacketMsg;
use ospf_peer::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};
use ospf_peer::version::Version;
use ospf_utils::UnboundedReceiver;
use ospf_utils::ip::IpAddrKind;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const IFNAME: &str = "eth0";
pub const BACKBONE: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

// Upper bound on the number of delivery rounds needed for the network to
// settle down.
const MAX_ROUNDS: usize = 100;

// Simulated router attached to a single multi-access segment.
pub struct Router<V: Version> {
    pub pm: PeerManager<V>,
    pub peer_id: PeerId,
    pub addr: V::NetIpAddr,
    net_rx: UnboundedReceiver<ProtocolOutputMsg<V>>,
    _rx: ProtocolChannelsRx<V>,
}

// Parameters of a simulated router.
pub struct RouterCfg {
    pub router_id: Ipv4Addr,
    pub addr: IpAddr,
    pub prefixlen: u8,
    pub iface_id: u32,
    pub priority: u8,
    pub static_nbrs: Vec<StaticNbrCfg>,
}

// Set of routers sharing the same segment.
//
// Timers are inert in test builds, so their expirations are injected
// explicitly.
pub struct Network<V: Version> {
    pub routers: Vec<Router<V>>,
}

// ===== impl Router =====

impl<V> Router<V>
where
    V: Version,
{
    fn new(link_type: LinkType, cfg: &RouterCfg) -> Router<V> {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let instance = InstanceCfg {
            router_id: cfg.router_id,
            ..Default::default()
        };
        let (mut pm, rx) = PeerManager::new(instance, net_tx);

        let link = LinkCfg {
            ifname: IFNAME.to_owned(),
            addr: cfg.addr,
            prefixlen: cfg.prefixlen,
            link_type,
            iface_id: cfg.iface_id,
            peers: vec![PeerCfg {
                area_id: BACKBONE,
                priority: cfg.priority,
                static_nbrs: cfg.static_nbrs.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let peer_id = pm.peer_out_create(&link).unwrap();
        let addr = V::NetIpAddr::get(cfg.addr).unwrap();

        Router {
            pm,
            peer_id,
            addr,
            net_rx,
            _rx: rx,
        }
    }

    pub fn router_id(&self) -> Ipv4Addr {
        self.pm.router_id
    }

    pub fn peer(&self) -> &Peer<V> {
        self.pm.get_peer(self.peer_id, BACKBONE).unwrap()
    }

    pub fn ism_state(&self) -> ism::State {
        self.peer().state.ism_state
    }

    pub fn nbr(&self, router_id: Ipv4Addr) -> &Neighbor<V> {
        self.peer()
            .neighbors
            .iter()
            .find(|nbr| nbr.router_id == router_id)
            .unwrap()
    }

    pub fn nbr_state(&self, router_id: Ipv4Addr) -> nsm::State {
        self.nbr(router_id).state
    }

    pub fn nbr_id(&self, router_id: Ipv4Addr) -> NeighborId {
        self.nbr(router_id).id
    }

    pub fn lsdb(&self) -> Vec<LsaRef> {
        self.pm.areas.get(&BACKBONE).unwrap().lsas()
    }

    pub fn lsa(&self, key: &LsaKey) -> Option<LsaRef> {
        self.pm.areas.get(&BACKBONE).unwrap().lookup(key)
    }

    // Returns the LSDB contents as (key, sequence number) pairs.
    pub fn lsdb_summary(&self) -> Vec<(LsaKey, u32)> {
        self.lsdb()
            .iter()
            .map(|lsa| (lsa.hdr.key(), lsa.hdr.seq_no))
            .collect()
    }

    pub fn timer(&mut self, timer: fn(PeerTimerMsg) -> ProtocolInputMsg<V>) {
        let msg = PeerTimerMsg {
            peer_id: self.peer_id,
            area_id: BACKBONE,
        };
        self.pm.process_msg(timer(msg));
    }

    pub fn nsm_event(&mut self, nbr_router_id: Ipv4Addr, event: nsm::Event) {
        let msg = NsmEventMsg {
            peer_id: self.peer_id,
            area_id: BACKBONE,
            nbr_id: self.nbr_id(nbr_router_id),
            event,
        };
        self.pm.process_msg(ProtocolInputMsg::NsmEvent(msg));
    }

    pub fn rxmt_interval(
        &mut self,
        nbr_router_id: Ipv4Addr,
        packet_type: RxmtPacketType,
    ) {
        let msg = RxmtIntervalMsg {
            peer_id: self.peer_id,
            area_id: BACKBONE,
            nbr_id: self.nbr_id(nbr_router_id),
            packet_type,
        };
        self.pm.process_msg(ProtocolInputMsg::RxmtInterval(msg));
    }

    // Drains the packets sent by this router.
    pub fn take_sent(&mut self) -> Vec<NetTxPacketMsg<V>> {
        let mut sent = vec![];
        while let Ok(ProtocolOutputMsg::NetTxPacket(msg)) = self.net_rx.try_recv()
        {
            sent.push(msg);
        }
        sent
    }
}

// ===== impl RouterCfg =====

impl RouterCfg {
    pub fn new(router_id: &str, addr: &str, prefixlen: u8) -> RouterCfg {
        RouterCfg {
            router_id: router_id.parse().unwrap(),
            addr: addr.parse().unwrap(),
            prefixlen,
            iface_id: 0,
            priority: 1,
            static_nbrs: vec![],
        }
    }

    pub fn iface_id(mut self, iface_id: u32) -> RouterCfg {
        self.iface_id = iface_id;
        self
    }

    pub fn priority(mut self, priority: u8) -> RouterCfg {
        self.priority = priority;
        self
    }

    pub fn static_nbr(mut self, addr: &str, priority: u8) -> RouterCfg {
        self.static_nbrs.push(StaticNbrCfg {
            addr: addr.parse().unwrap(),
            priority,
        });
        self
    }
}

// ===== impl Network =====

impl<V> Network<V>
where
    V: Version,
{
    pub fn new(link_type: LinkType, routers: &[RouterCfg]) -> Network<V> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let routers = routers
            .iter()
            .map(|cfg| Router::new(link_type, cfg))
            .collect();
        Network { routers }
    }

    pub fn router(&self, router_id: &str) -> &Router<V> {
        let router_id: Ipv4Addr = router_id.parse().unwrap();
        self.routers
            .iter()
            .find(|rtr| rtr.router_id() == router_id)
            .unwrap()
    }

    pub fn router_mut(&mut self, router_id: &str) -> &mut Router<V> {
        let router_id: Ipv4Addr = router_id.parse().unwrap();
        self.routers
            .iter_mut()
            .find(|rtr| rtr.router_id() == router_id)
            .unwrap()
    }

    // Delivers every packet in flight, including the ones sent in response,
    // until the segment is quiet.
    pub fn run(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let sent = self
                .routers
                .iter_mut()
                .enumerate()
                .flat_map(|(idx, rtr)| {
                    rtr.take_sent().into_iter().map(move |msg| (idx, msg))
                })
                .collect::<Vec<_>>();
            if sent.is_empty() {
                return;
            }
            for (idx, msg) in sent {
                self.deliver(idx, &msg);
            }
        }
        panic!("network didn't settle down");
    }

    // Delivers a packet sent by the router of the given index.
    pub fn deliver(&mut self, from: usize, msg: &NetTxPacketMsg<V>) {
        let src = self.routers[from].addr;
        for dst in &msg.dst {
            for (idx, rtr) in self.routers.iter_mut().enumerate() {
                if idx == from || (!dst.is_multicast() && rtr.addr != *dst) {
                    continue;
                }
                rtr.pm.receive(IFNAME, "", src, *dst, msg.data.clone());
            }
        }
    }

    // Injects a packet into the given router, as if sent by another member
    // of the segment.
    pub fn inject(
        &mut self,
        router_id: &str,
        src: V::NetIpAddr,
        dst: V::NetIpAddr,
        data: Bytes,
    ) {
        let rtr = self.router_mut(router_id);
        rtr.pm.receive(IFNAME, "", src, dst, data);
    }

    pub fn hello_interval(&mut self) {
        for rtr in &mut self.routers {
            rtr.timer(ProtocolInputMsg::HelloInterval);
        }
        self.run();
    }

    pub fn wait_timer(&mut self) {
        for rtr in &mut self.routers {
            if rtr.ism_state() == ism::State::Waiting {
                rtr.timer(ProtocolInputMsg::WaitTimer);
            }
        }
        self.run();
    }

    pub fn delayed_ack(&mut self) {
        for rtr in &mut self.routers {
            rtr.timer(ProtocolInputMsg::DelayedAck);
        }
        self.run();
    }

    // Expires the DD retransmission interval of every neighbor still
    // negotiating or exchanging databases.
    pub fn dbdesc_rxmt(&mut self) {
        for rtr in &mut self.routers {
            let nbrs = rtr
                .peer()
                .neighbors
                .iter()
                .filter(|nbr| {
                    matches!(nbr.state, nsm::State::ExStart | nsm::State::Exchange)
                })
                .map(|nbr| nbr.router_id)
                .collect::<Vec<_>>();
            for nbr in nbrs {
                rtr.rxmt_interval(nbr, RxmtPacketType::DbDesc);
            }
        }
        self.run();
    }

    // Brings up every adjacency and waits for all LSAs to be acknowledged.
    pub fn converge(&mut self) {
        self.hello_interval();
        self.hello_interval();
        self.wait_timer();
        self.settle();
    }

    // Runs Hello exchanges and retransmissions until the adjacencies are
    // stable, then flushes the delayed acknowledgements.
    pub fn settle(&mut self) {
        for _ in 0..2 {
            self.hello_interval();
            self.dbdesc_rxmt();
        }
        for _ in 0..3 {
            self.delayed_ack();
        }
    }
}

// ===== global functions =====

// Decodes the given packets, keeping only those of the requested type.
pub fn decode_sent<V>(
    sent: &[NetTxPacketMsg<V>],
    pkt_type: PacketType,
) -> Vec<Packet>
where
    V: Version,
{
    sent.iter()
        .filter(|msg| msg.pkt_type == pkt_type)
        .map(|msg| Packet::decode::<V>(&msg.data).unwrap())
        .collect()
}
