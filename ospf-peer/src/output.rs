//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use smallvec::{SmallVec, smallvec};

use crate::debug::Debug;
use crate::error::Error;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{LsaHdr, LsaRef};
use crate::packet::{
    Hello, LsAck, LsRequest, LsUpdate, Packet, PacketHdr, PacketType,
};
use crate::peer::{PeerCtx, PeerRef};
use crate::version::Version;

// Destination addresses of an outgoing packet.
pub type Destinations<V> = SmallVec<[<V as Version>::NetIpAddr; 4]>;

// Length of an LS Request entry.
const LSREQ_ENTRY_LENGTH: u16 = 12;
// Length of the LSA count field of LS Update packets.
const LSUPD_BASE_LENGTH: u16 = 4;

// ===== Hello Packets =====

pub(crate) fn send_hello<V>(
    peer: &mut PeerRef<'_>,
    nbrs: &[Neighbor<V>],
    ctx: &mut PeerCtx<'_, V>,
    dst: Destinations<V>,
) where
    V: Version,
{
    let neighbors = nbrs
        .iter()
        .filter(|nbr| nbr.state >= nsm::State::Init)
        .map(|nbr| nbr.router_id)
        .collect();

    let packet = Packet::Hello(Hello {
        hdr: packet_hdr(peer, ctx, PacketType::Hello),
        network_mask: V::hello_mask(ctx.link),
        iface_id: ctx.link.iface_id,
        hello_interval: peer.config.hello_interval,
        options: V::packet_options(peer.area_type),
        priority: peer.config.priority,
        dead_interval: peer.config.dead_interval,
        dr: peer.state.dr,
        bdr: peer.state.bdr,
        neighbors,
    });
    send_packet(peer, ctx, dst, &packet);
}

// ===== Database Description Packets =====

// Sends (or resends) the last Database Description packet built for the
// neighbor.
pub(crate) fn send_dbdesc<V>(
    nbr: &Neighbor<V>,
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
) where
    V: Version,
{
    let Some(dbdesc) = &nbr.last_sent_dbdesc else {
        return;
    };
    let dst = smallvec![nbr.dst(ctx.link.link_type)];
    send_packet(peer, ctx, dst, &Packet::DbDesc(dbdesc.clone()));
}

// ===== LS Request Packets =====

// Sends an LS Request for the outstanding entries of the neighbor's request
// list.
//
// Entries already requested are requested again until the corresponding LSAs
// arrive. Otherwise, as many new entries as fit in a single packet are taken
// from the request list.
pub(crate) fn send_lsreq<V>(
    nbr: &mut Neighbor<V>,
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
) where
    V: Version,
{
    if nbr.lists.ls_request_pending.is_empty() {
        let max_entries = (max_payload::<V>(peer, ctx) / LSREQ_ENTRY_LENGTH)
            .max(1) as usize;
        nbr.lists.ls_request_pending = nbr
            .lists
            .ls_request
            .keys()
            .take(max_entries)
            .copied()
            .collect();
    }
    if nbr.lists.ls_request_pending.is_empty() {
        return;
    }

    let packet = Packet::LsRequest(LsRequest {
        hdr: packet_hdr(peer, ctx, PacketType::LsRequest),
        entries: nbr.lists.ls_request_pending.iter().copied().collect(),
    });
    let dst = smallvec![nbr.dst(ctx.link.link_type)];
    send_packet(peer, ctx, dst, &packet);
}

// ===== LS Update Packets =====

// Sends the given LSAs, split into as many LS Update packets as needed.
//
// The age of each transmitted copy is incremented by the link transmit delay.
pub(crate) fn send_lsupd<'a, V>(
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
    dst: Destinations<V>,
    lsas: impl IntoIterator<Item = &'a LsaRef>,
) where
    V: Version,
{
    let max_size = (max_payload::<V>(peer, ctx) - LSUPD_BASE_LENGTH) as usize;

    let mut total = 0;
    let mut pending = vec![];
    for lsa in lsas {
        let length = lsa.raw.len();
        // Oversized LSAs are left to IP fragmentation.
        if !pending.is_empty() && total + length > max_size {
            let lsas = std::mem::take(&mut pending);
            send_lsupd_packet(peer, ctx, dst.clone(), lsas);
            total = 0;
        }
        total += length;
        pending.push(lsa.tx_copy(ctx.link.transmit_delay));
    }
    if !pending.is_empty() {
        send_lsupd_packet(peer, ctx, dst, pending);
    }
}

fn send_lsupd_packet<V>(
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
    dst: Destinations<V>,
    lsas: Vec<crate::packet::lsa::Lsa>,
) where
    V: Version,
{
    let packet = Packet::LsUpdate(LsUpdate {
        hdr: packet_hdr(peer, ctx, PacketType::LsUpdate),
        lsas,
    });
    send_packet(peer, ctx, dst, &packet);
}

// ===== LS Ack Packets =====

// Acknowledges a single LSA directly to the neighbor that sent it.
pub(crate) fn send_lsack_direct<V>(
    nbr: &Neighbor<V>,
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
    lsa_hdr: &LsaHdr,
) where
    V: Version,
{
    let dst = smallvec![nbr.dst(ctx.link.link_type)];
    send_lsack(peer, ctx, dst, std::slice::from_ref(lsa_hdr));
}

// Sends the given LSA headers, split into as many LS Ack packets as needed.
pub(crate) fn send_lsack<V>(
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
    dst: Destinations<V>,
    lsa_hdrs: &[LsaHdr],
) where
    V: Version,
{
    let max_hdrs =
        (max_payload::<V>(peer, ctx) / LsaHdr::LENGTH).max(1) as usize;
    for chunk in lsa_hdrs.chunks(max_hdrs) {
        let packet = Packet::LsAck(LsAck {
            hdr: packet_hdr(peer, ctx, PacketType::LsAck),
            lsa_hdrs: chunk.to_vec(),
        });
        send_packet(peer, ctx, dst.clone(), &packet);
    }
}

// ===== global functions =====

pub(crate) fn packet_hdr<V>(
    peer: &PeerRef<'_>,
    ctx: &PeerCtx<'_, V>,
    pkt_type: PacketType,
) -> PacketHdr
where
    V: Version,
{
    PacketHdr::new(
        pkt_type,
        ctx.router_id,
        peer.area_id,
        peer.config.instance_id,
    )
}

// Encodes, authenticates and enqueues a packet for transmission.
pub(crate) fn send_packet<V>(
    peer: &mut PeerRef<'_>,
    ctx: &mut PeerCtx<'_, V>,
    dst: Destinations<V>,
    packet: &Packet,
) where
    V: Version,
{
    if dst.is_empty() {
        return;
    }

    let mut buf = packet.encode::<V>();
    if let Err(error) = V::auth_generate(&mut peer.state.auth, &mut buf) {
        Error::<V>::PacketAuthGenerateError(ctx.link.ifname.clone(), error)
            .log();
        return;
    }

    if ctx.link.debug_packets {
        for addr in &dst {
            Debug::<V>::PacketTx(&ctx.link.ifname, addr, packet).log();
        }
    }

    ctx.txq
        .transmit(packet.pkt_type(), dst, buf.freeze(), ctx.tx);
}

// ===== helper functions =====

// Room left for the packet body once the IP header, the OSPF header and the
// authentication trailer are accounted for.
fn max_payload<V>(peer: &PeerRef<'_>, ctx: &PeerCtx<'_, V>) -> u16
where
    V: Version,
{
    ctx.link
        .mtu
        .saturating_sub(V::IP_HDR_LENGTH)
        .saturating_sub(V::HDR_LENGTH)
        .saturating_sub(peer.state.auth.trailer_length())
        .max(LSUPD_BASE_LENGTH + LsaHdr::LENGTH)
}
