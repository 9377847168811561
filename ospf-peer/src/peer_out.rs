//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;
use ospf_utils::ip::IpAddrKind;
use ospf_utils::task::IntervalTask;
use smallvec::SmallVec;

use crate::area::Area;
use crate::config::LinkCfg;
use crate::debug::{Debug, PeerInactiveReason};
use crate::error::Error;
use crate::neighbor::NeighborIdAllocator;
use crate::packet::PacketType;
use crate::peer::{LinkType, Peer, PeerCtx};
use crate::peer_manager::{PeerId, ProtocolChannelsTx};
use crate::tasks;
use crate::tasks::messages::ProtocolOutputMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;

// A link (interface or virtual interface) and the peers attached to it, one
// per area.
#[derive(Debug)]
pub struct PeerOut<V: Version> {
    pub link: Link<V>,
    // Administrative status.
    pub enabled: bool,
    // Operational status reported by the link layer.
    pub link_status: bool,
    pub peers: BTreeMap<Ipv4Addr, Peer<V>>,
    pub txq: TransmitQueue<V>,
}

// Link parameters shared by all peers of a PeerOut.
#[derive(Clone, Debug)]
pub struct Link<V: Version> {
    pub peer_id: PeerId,
    pub ifname: String,
    pub vifname: String,
    pub addr: V::NetIpAddr,
    pub prefixlen: u8,
    pub mtu: u16,
    pub cost: u16,
    pub link_type: LinkType,
    pub iface_id: u32,
    pub transmit_delay: u16,
    // Set while the link is looped back, either administratively or as
    // detected by the link layer.
    pub loopback: bool,
    pub debug_packets: bool,
}

// Outgoing packets of a link, optionally paced so that consecutive packets
// are at least `gap` apart.
#[derive(Debug)]
pub struct TransmitQueue<V: Version> {
    pub peer_id: PeerId,
    pub ifname: String,
    pub vifname: String,
    pub gap: Duration,
    pub queue: VecDeque<NetTxPacketMsg<V>>,
    pub pacing: Option<IntervalTask>,
}

// ===== impl PeerOut =====

impl<V> PeerOut<V>
where
    V: Version,
{
    pub(crate) fn new(
        peer_id: PeerId,
        cfg: &LinkCfg,
        gap: Duration,
        debug_packets: bool,
    ) -> Option<PeerOut<V>> {
        let addr = V::NetIpAddr::get(cfg.addr)?;
        Debug::<V>::PeerOutCreate(&cfg.ifname, &cfg.vifname).log();

        let link = Link {
            peer_id,
            ifname: cfg.ifname.clone(),
            vifname: cfg.vifname.clone(),
            addr,
            prefixlen: cfg.prefixlen,
            mtu: cfg.mtu,
            cost: cfg.cost,
            link_type: cfg.link_type,
            iface_id: cfg.iface_id,
            transmit_delay: cfg.transmit_delay,
            loopback: false,
            debug_packets,
        };
        let txq = TransmitQueue {
            peer_id,
            ifname: cfg.ifname.clone(),
            vifname: cfg.vifname.clone(),
            gap,
            queue: Default::default(),
            pacing: None,
        };

        Some(PeerOut {
            link,
            enabled: cfg.enabled,
            link_status: true,
            peers: Default::default(),
            txq,
        })
    }

    // Returns whether the peers of this link should be running.
    pub fn is_active(&self) -> bool {
        self.enabled && self.link_status
    }

    // Starts or stops the peers of this link following a change in its
    // administrative or operational status.
    pub(crate) fn update_status(
        &mut self,
        areas: &mut BTreeMap<Ipv4Addr, Area<V>>,
        tx: &ProtocolChannelsTx<V>,
        nbr_ids: &mut NeighborIdAllocator,
        router_id: Ipv4Addr,
        reason: PeerInactiveReason,
    ) {
        let active = self.is_active();
        for peer in self.peers.values_mut() {
            let Some(area) = areas.get_mut(&peer.area_id) else {
                Error::<V>::AreaIdNotFound(peer.area_id).log();
                continue;
            };
            let mut ctx = PeerCtx {
                router_id,
                link: &self.link,
                txq: &mut self.txq,
                area,
                tx,
                nbr_ids: &mut *nbr_ids,
            };
            match (active, peer.is_down()) {
                (true, true) => peer.start(&mut ctx),
                (false, false) => peer.stop(&mut ctx, reason),
                _ => (),
            }
        }

        if !active {
            self.txq.clear();
        }
    }
}

impl<V> Drop for PeerOut<V>
where
    V: Version,
{
    fn drop(&mut self) {
        Debug::<V>::PeerOutDelete(&self.link.ifname, &self.link.vifname).log();
    }
}

// ===== impl TransmitQueue =====

impl<V> TransmitQueue<V>
where
    V: Version,
{
    // Sends a packet, or queues it when the pacing gap hasn't elapsed yet.
    pub(crate) fn transmit(
        &mut self,
        pkt_type: PacketType,
        dst: SmallVec<[V::NetIpAddr; 4]>,
        data: Bytes,
        tx: &ProtocolChannelsTx<V>,
    ) {
        let msg = NetTxPacketMsg {
            ifname: self.ifname.clone(),
            vifname: self.vifname.clone(),
            pkt_type,
            dst,
            data,
        };

        if self.gap.is_zero() {
            send(msg, tx);
        } else if self.pacing.is_none() {
            send(msg, tx);
            let task =
                tasks::tx_pacing_interval(self.peer_id, self.gap, &tx.protocol_input);
            self.pacing = Some(task);
        } else {
            self.queue.push_back(msg);
        }
    }

    // Handles the expiration of the pacing interval.
    pub(crate) fn pacing_tick(&mut self, tx: &ProtocolChannelsTx<V>) {
        match self.queue.pop_front() {
            Some(msg) => send(msg, tx),
            None => self.pacing = None,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.pacing = None;
    }
}

// ===== helper functions =====

fn send<V>(msg: NetTxPacketMsg<V>, tx: &ProtocolChannelsTx<V>)
where
    V: Version,
{
    let _ = tx.net_tx.send(ProtocolOutputMsg::<V>::NetTxPacket(msg));
}

// ===== unit tests =====
