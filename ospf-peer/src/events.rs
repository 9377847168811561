//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::rc::Rc;

use ospf_utils::ip::IpAddrKind;

use crate::area::{AreaRouter, AreaType};
use crate::debug::{Debug, SeqNoMismatchReason};
use crate::error::{Error, PeerCfgError};
use crate::flood::{FloodSrc, flood};
use crate::lsdb::{BadLsReq, LSA_MAX_SEQ_NO, LsaCompare, LsaDatabase, compare_lsa};
use crate::neighbor::{Neighbor, NeighborId, nsm};
use crate::output;
use crate::packet::lsa::{Lsa, LsaHdr, LsaRef, LsaScope};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketType,
};
use crate::peer::{LinkType, Peer, PeerCtx, ism};
use crate::peer_manager::{PeerId, Peers};
use crate::tasks::messages::input::RxmtPacketType;
use crate::version::Version;

// Backbone area.
const BACKBONE: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    event: nsm::Event,
) -> Result<(), Error<V>>
where
    V: Version,
{
    peers.with_peer(peer_id, area_id, |peer, ctx| {
        let nbr_idx = peer
            .nbr_idx_by_id(nbr_id)
            .ok_or(Error::NeighborIdNotFound(nbr_id))?;

        // Invoke FSM event.
        peer.nsm_event(nbr_idx, ctx, event);

        // Effectively delete the neighbor. Configured neighbors are kept
        // around so they can be polled again.
        let nbr = &peer.neighbors[nbr_idx];
        if nbr.state == nsm::State::Down && !nbr.is_static {
            peer.neighbors.remove(nbr_idx);
        }

        Ok(())
    })?
}

// ===== Packet retransmission =====

pub(crate) fn process_rxmt_interval<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    packet_type: RxmtPacketType,
) -> Result<(), Error<V>>
where
    V: Version,
{
    peers.with_peer(peer_id, area_id, |peer, ctx| {
        let nbr_idx = peer
            .nbr_idx_by_id(nbr_id)
            .ok_or(Error::NeighborIdNotFound(nbr_id))?;

        let (mut peer_ref, nbrs) = peer.split();
        let nbr = &mut nbrs[nbr_idx];
        match packet_type {
            RxmtPacketType::DbDesc => nbr.rxmt_dbdesc(&mut peer_ref, ctx),
            RxmtPacketType::LsUpdate => {
                nbr.rxmt_lsupd(&mut peer_ref, ctx);
            }
        }

        Ok(())
    })?
}

// ===== Network packet receipt =====

pub(crate) fn process_packet<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    src: V::NetIpAddr,
    dst: V::NetIpAddr,
    data: &[u8],
) -> Result<(), Error<V>>
where
    V: Version,
{
    let peer_out = peers
        .peer_outs
        .get(&peer_id)
        .ok_or(Error::PeerIdNotFound(peer_id))?;
    if !peer_out.is_active() {
        return Ok(());
    }

    // Validate the source and destination addresses.
    if !V::validate_src_addr(peer_out.link.link_type, &src) {
        return Err(Error::InvalidSrcAddr(src));
    }
    if dst.is_multicast() && dst != V::all_spf_rtrs() && dst != V::all_dr_rtrs()
    {
        return Err(Error::InvalidDstAddr(dst));
    }

    // Decode packet.
    let packet = Packet::decode::<V>(data)?;

    // Find the peer the packet belongs to.
    let hdr = packet.hdr();
    let (peer_id, area_id) = if peer_out.peers.contains_key(&hdr.area_id) {
        (peer_id, hdr.area_id)
    } else if let Some(vlink_id) = (hdr.area_id == BACKBONE)
        .then(|| vlink_find(peers, hdr.router_id))
        .flatten()
    {
        (vlink_id, BACKBONE)
    } else {
        return Err(Error::PeerCfgError(
            peer_out.link.ifname.clone(),
            src,
            hdr.pkt_type,
            PeerCfgError::AreaIdMismatch(hdr.area_id),
        ));
    };

    let lsupd = peers.with_peer(peer_id, area_id, |peer, ctx| {
        process_peer_packet(peer, ctx, src, dst, data, packet)
    })??;

    // Link State Updates affect every peer in the flooding scope.
    if let Some((nbr_id, lsupd)) = lsupd {
        process_packet_lsupd(peers, peer_id, area_id, nbr_id, lsupd)?;
    }

    Ok(())
}

// Processing common to all packet types, once the receiving peer is known.
fn process_peer_packet<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    src: V::NetIpAddr,
    dst: V::NetIpAddr,
    data: &[u8],
    packet: Packet,
) -> Result<Option<(NeighborId, LsUpdate)>, Error<V>>
where
    V: Version,
{
    if matches!(peer.state.ism_state, ism::State::Down | ism::State::Loopback)
        || peer.config.passive
    {
        return Ok(None);
    }

    let hdr = packet.hdr().clone();
    let cfg_error = |error| {
        Error::PeerCfgError(ctx.link.ifname.clone(), src, hdr.pkt_type, error)
    };

    // Check for Instance ID mismatch.
    if hdr.instance_id != peer.config.instance_id {
        return Err(cfg_error(PeerCfgError::InstanceIdMismatch(
            hdr.instance_id,
            peer.config.instance_id,
        )));
    }

    // Packets sent to AllDRouters are only accepted by the DR and the BDR.
    if dst == V::all_dr_rtrs()
        && !matches!(peer.state.ism_state, ism::State::Dr | ism::State::Backup)
    {
        return Err(Error::InvalidDstAddr(dst));
    }

    // Check for duplicate Router ID.
    if hdr.router_id == ctx.router_id {
        return Err(cfg_error(PeerCfgError::DuplicateRouterId(hdr.router_id)));
    }

    // Authenticate the packet.
    let nbr_idx = peer.nbr_idx_find(ctx.link.link_type, hdr.router_id, &src);
    V::auth_verify(&mut peer.state.auth, data, src.into(), nbr_idx.is_none())
        .map_err(|error| Error::PacketAuthError(src, error))?;

    if ctx.link.debug_packets {
        Debug::<V>::PacketRx(&ctx.link.ifname, &src, &dst, &packet).log();
    }

    // Hello packets are the only ones accepted from unknown neighbors.
    let packet = match packet {
        Packet::Hello(hello) => {
            process_packet_hello(peer, ctx, src, nbr_idx, hello)?;
            return Ok(None);
        }
        packet => packet,
    };
    let nbr_idx =
        nbr_idx.ok_or(Error::UnknownNeighbor(src, hdr.router_id))?;

    match packet {
        Packet::DbDesc(dbdesc) => {
            process_packet_dbdesc(peer, ctx, nbr_idx, src, dbdesc)?;
        }
        Packet::LsRequest(lsreq) => {
            process_packet_lsreq(peer, ctx, nbr_idx, lsreq)?;
        }
        Packet::LsUpdate(lsupd) => {
            let nbr = &peer.neighbors[nbr_idx];
            if nbr.state < nsm::State::Exchange {
                Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
                return Ok(None);
            }
            return Ok(Some((nbr.id, lsupd)));
        }
        Packet::LsAck(lsack) => process_packet_lsack(peer, nbr_idx, lsack),
        Packet::Hello(_) => (),
    }

    Ok(None)
}

// ===== Hello packets =====

fn process_packet_hello<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    src: V::NetIpAddr,
    nbr_idx: Option<usize>,
    hello: Hello,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Perform all the required sanity checks.
    if let Err(error) = process_packet_hello_sanity_checks(peer, ctx, &hello) {
        return Err(Error::PeerCfgError(
            ctx.link.ifname.clone(),
            src,
            PacketType::Hello,
            error,
        ));
    }

    // Find or create new neighbor.
    let router_id = hello.hdr.router_id;
    let nbr_idx = match nbr_idx {
        Some(nbr_idx) => nbr_idx,
        None => {
            let nbr_id = ctx.nbr_ids.next_id();
            let nbr =
                Neighbor::new(nbr_id, router_id, src, hello.priority, false);
            peer.neighbors.push(nbr);
            peer.neighbors.len() - 1
        }
    };

    // Update neighbor data, keeping track of what changed.
    let nbr = &mut peer.neighbors[nbr_idx];
    nbr.router_id = router_id;
    nbr.src = src;
    let net_id = nbr.network_id();
    let old_priority = nbr.priority;
    let old_dr = nbr.dr;
    let old_bdr = nbr.bdr;
    nbr.priority = hello.priority;
    nbr.dr = hello.dr;
    nbr.bdr = hello.bdr;
    nbr.iface_id = hello.iface_id;
    let two_way = hello.neighbors.contains(&ctx.router_id);
    let (priority, dr, bdr) = (hello.priority, hello.dr, hello.bdr);
    nbr.last_hello = Some(hello);

    peer.nsm_event(nbr_idx, ctx, nsm::Event::HelloRcvd);

    // Check whether the neighbor sees us.
    if !two_way {
        peer.nsm_event(nbr_idx, ctx, nsm::Event::OneWayRcvd);
        return Ok(());
    }
    peer.nsm_event(nbr_idx, ctx, nsm::Event::TwoWayRcvd);

    if !ctx.link.link_type.is_broadcast_or_nbma() {
        return Ok(());
    }

    // The neighbor declares itself the BDR, or the DR with no BDR elected.
    if peer.state.ism_state == ism::State::Waiting
        && ((dr == Some(net_id) && bdr.is_none()) || bdr == Some(net_id))
    {
        peer.state.deferred.insert(ism::Event::BackupSeen);
    }

    // The neighbor changed its priority, or started or stopped declaring
    // itself DR or BDR.
    if priority != old_priority
        || (dr == Some(net_id)) != (old_dr == Some(net_id))
        || (bdr == Some(net_id)) != (old_bdr == Some(net_id))
    {
        peer.state.deferred.insert(ism::Event::NbrChange);
    }

    Ok(())
}

fn process_packet_hello_sanity_checks<V>(
    peer: &Peer<V>,
    ctx: &PeerCtx<'_, V>,
    hello: &Hello,
) -> Result<(), PeerCfgError>
where
    V: Version,
{
    // Check for network mask mismatch.
    if !V::validate_hello_mask(ctx.link, hello) {
        return Err(PeerCfgError::HelloMaskMismatch(
            hello.network_mask,
            V::hello_mask(ctx.link),
        ));
    }

    // Check for HelloInterval mismatch.
    if hello.hello_interval != peer.config.hello_interval {
        return Err(PeerCfgError::HelloIntervalMismatch(
            hello.hello_interval,
            peer.config.hello_interval,
        ));
    }

    // Check for RouterDeadInterval mismatch.
    if hello.dead_interval != peer.config.dead_interval {
        return Err(PeerCfgError::DeadIntervalMismatch(
            hello.dead_interval,
            peer.config.dead_interval,
        ));
    }

    // Check for ExternalRoutingCapability mismatch.
    let e_bit = hello.options.contains(Options::E);
    if e_bit != (peer.area_type == AreaType::Normal) {
        return Err(PeerCfgError::ExternalRoutingCapabilityMismatch(e_bit));
    }

    Ok(())
}

// ===== Database Description packets =====

fn process_packet_dbdesc<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    nbr_idx: usize,
    src: V::NetIpAddr,
    dbdesc: DbDesc,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // MTU mismatch check.
    if !peer.config.mtu_ignore
        && ctx.link.link_type != LinkType::VirtualLink
        && dbdesc.mtu > ctx.link.mtu
    {
        return Err(Error::PeerCfgError(
            ctx.link.ifname.clone(),
            src,
            PacketType::DbDesc,
            PeerCfgError::MtuMismatch(dbdesc.mtu),
        ));
    }

    // Further processing depends on the neighbor's state.
    let nbr = &peer.neighbors[nbr_idx];
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::TwoWay => {
            Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
            return Ok(());
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                peer.nsm_event(nbr_idx, ctx, nsm::Event::TwoWayRcvd);
                if peer.neighbors[nbr_idx].state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            let nbr = &mut peer.neighbors[nbr_idx];
            if dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs.is_empty()
                && dbdesc.hdr.router_id > ctx.router_id
            {
                // We're the slave. Adopt the master's DD sequence number.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no;
            } else if !dbdesc.dd_flags.intersects(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no == nbr.dd_seq_no
                && dbdesc.hdr.router_id < ctx.router_id
            {
                // We're the master.
            } else {
                // Ignore the packet.
                return Ok(());
            }

            nbr.options = Some(dbdesc.options);
            nbr.dd_flags.remove(DbDescFlags::I);
            peer.nsm_event(nbr_idx, ctx, nsm::Event::NegotiationDone);
        }
        nsm::State::Exchange => {
            // Check for duplicate packet.
            if nbr
                .last_rcvd_dbdesc
                .as_ref()
                .is_some_and(|last| last.is_duplicate(&dbdesc))
            {
                // The slave retransmits the last packet it sent, the master
                // discards the duplicate.
                if !nbr.is_master() {
                    let (mut peer_ref, nbrs) = peer.split();
                    output::send_dbdesc(&nbrs[nbr_idx], &mut peer_ref, ctx);
                }
                return Ok(());
            }

            // Sanity checks.
            let reason = if dbdesc.dd_flags.contains(DbDescFlags::MS)
                == nbr.is_master()
                || dbdesc.dd_flags.contains(DbDescFlags::I)
            {
                Some(SeqNoMismatchReason::InconsistentFlags)
            } else if nbr
                .last_rcvd_dbdesc
                .as_ref()
                .is_some_and(|last| last.options != dbdesc.options)
            {
                Some(SeqNoMismatchReason::InconsistentOptions)
            } else if (nbr.is_master() && dbdesc.dd_seq_no != nbr.dd_seq_no)
                || (!nbr.is_master()
                    && dbdesc.dd_seq_no != nbr.dd_seq_no.wrapping_add(1))
            {
                Some(SeqNoMismatchReason::InconsistentSeqNo)
            } else {
                None
            };
            if let Some(reason) = reason {
                let event = nsm::Event::SeqNoMismatch(reason);
                peer.nsm_event(nbr_idx, ctx, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // The slave must respond to duplicates by repeating the last
            // Database Description packet that it had sent.
            if nbr
                .last_rcvd_dbdesc
                .as_ref()
                .is_some_and(|last| last.is_duplicate(&dbdesc))
            {
                if !nbr.is_master() {
                    let (mut peer_ref, nbrs) = peer.split();
                    output::send_dbdesc(&nbrs[nbr_idx], &mut peer_ref, ctx);
                }
                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            peer.nsm_event(nbr_idx, ctx, nsm::Event::SeqNoMismatch(reason));
            return Ok(());
        }
    }

    // If we got this far it means the packet was accepted.
    process_packet_dbdesc_accept(peer, ctx, nbr_idx, dbdesc);
    Ok(())
}

fn process_packet_dbdesc_accept<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    nbr_idx: usize,
    dbdesc: DbDesc,
) where
    V: Version,
{
    let (mut peer_ref, nbrs) = peer.split();
    let nbr = &mut nbrs[nbr_idx];

    // Put the LSAs we don't have (or have an older instance of) on the Link
    // state request list.
    let mut invalid_type = false;
    for lsa_hdr in &dbdesc.lsa_hdrs {
        let lsa_type = lsa_hdr.lsa_type;
        if !V::lsa_type_is_known(lsa_type)
            || (V::lsa_type_is_as_external(lsa_type)
                && peer_ref.area_type != AreaType::Normal)
        {
            invalid_type = true;
            break;
        }

        if ctx.area.newer_lsa(lsa_hdr) {
            nbr.lists.ls_request.insert(lsa_hdr.key(), *lsa_hdr);
        }
    }
    if invalid_type {
        let reason = SeqNoMismatchReason::InvalidLsaType;
        peer.nsm_event(nbr_idx, ctx, nsm::Event::SeqNoMismatch(reason));
        return;
    }

    let dd_seq_no = dbdesc.dd_seq_no;
    let more = dbdesc.dd_flags.contains(DbDescFlags::M);
    nbr.last_rcvd_dbdesc = Some(dbdesc);

    // Further processing depends on whether the router is master or slave.
    let exchange_done = if nbr.is_master() {
        nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);
        if nbr.all_headers_sent && !more {
            true
        } else {
            nbr.dbdesc_build(&mut peer_ref, ctx);
            output::send_dbdesc(nbr, &mut peer_ref, ctx);
            nbr.rxmt_dbdesc_start(&peer_ref, ctx);
            false
        }
    } else {
        nbr.dd_seq_no = dd_seq_no;
        nbr.dbdesc_build(&mut peer_ref, ctx);
        output::send_dbdesc(nbr, &mut peer_ref, ctx);
        nbr.all_headers_sent && !more
    };

    if exchange_done {
        peer.nsm_event(nbr_idx, ctx, nsm::Event::ExchangeDone);
    }
}

// ===== LS Request packets =====

fn process_packet_lsreq<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    nbr_idx: usize,
    lsreq: LsRequest,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let nbr = &mut peer.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // The requested LSAs are sent once the current message is fully
    // processed.
    match ctx.area.get_lsas(&lsreq.entries) {
        Ok(lsas) => {
            for lsa in lsas {
                nbr.lists.ls_update.insert(lsa.hdr.key(), lsa);
            }
            Ok(())
        }
        Err(BadLsReq(lsa_key)) => {
            let router_id = nbr.router_id;
            peer.nsm_event(nbr_idx, ctx, nsm::Event::BadLsReq);
            Err(Error::BadLsReq(router_id, lsa_key))
        }
    }
}

// ===== LS Update packets =====

fn process_packet_lsupd<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    lsupd: LsUpdate,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let nbr_router_id = lsupd.hdr.router_id;
    for lsa in lsupd.lsas {
        let proceed = process_packet_lsupd_lsa(
            peers,
            peer_id,
            area_id,
            nbr_id,
            nbr_router_id,
            lsa,
        )?;
        if !proceed {
            break;
        }
    }

    // Check whether the database exchange is over.
    peers.with_peer(peer_id, area_id, |peer, ctx| {
        let Some(nbr_idx) = peer.nbr_idx_by_id(nbr_id) else {
            return;
        };
        let (mut peer_ref, nbrs) = peer.split();
        if nbrs[nbr_idx].loading_done_check(&mut peer_ref, ctx) {
            peer.nsm_event(nbr_idx, ctx, nsm::Event::LoadingDone);
        }
    })
}

// Processes a single LSA received in an LS Update (RFC 2328 section 13).
//
// Returns false when the rest of the packet must be discarded.
fn process_packet_lsupd_lsa<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    nbr_router_id: Ipv4Addr,
    lsa: Lsa,
) -> Result<bool, Error<V>>
where
    V: Version,
{
    let lsa_type = lsa.hdr.lsa_type;

    // (1-3) Validate the LSA.
    if !V::lsa_type_is_known(lsa_type) {
        Error::<V>::LsaUnknownType(lsa_type).log();
        return Ok(true);
    }
    if let Err(error) = lsa.validate::<V>() {
        Debug::<V>::LsaDiscard(nbr_router_id, &lsa.hdr, &error).log();
        return Ok(true);
    }
    let area = peers
        .areas
        .get(&area_id)
        .ok_or(Error::AreaIdNotFound(area_id))?;
    if V::lsa_type_is_as_external(lsa_type) && area.area_type != AreaType::Normal
    {
        return Ok(true);
    }

    let lsa_key = lsa.hdr.key();
    let lsa_hdr = lsa.current_hdr();
    let db_copy = area.lookup(&lsa_key);

    // (4) MaxAge LSA that isn't in the database.
    if lsa.is_maxage()
        && db_copy.is_none()
        && !peers.area_nbrs_exchanging(area_id)
    {
        peers.with_peer(peer_id, area_id, |peer, ctx| {
            lsack_direct(peer, ctx, nbr_id, &lsa_hdr);
        })?;
        return Ok(true);
    }

    // (5) Received instance is more recent than the database copy.
    let cmp = db_copy
        .as_ref()
        .map(|db_copy| compare_lsa(&lsa_hdr, &db_copy.current_hdr()));
    let Some(db_copy) = db_copy.filter(|_| cmp != Some(LsaCompare::Newer))
    else {
        lsupd_lsa_newer(peers, peer_id, area_id, nbr_id, nbr_router_id, lsa)?;
        return Ok(true);
    };

    // (6) The LSA was requested from this neighbor during the database
    // exchange: restart it.
    let requested = peers.with_peer(peer_id, area_id, |peer, ctx| {
        let Some(nbr_idx) = peer.nbr_idx_by_id(nbr_id) else {
            return false;
        };
        if !peer.neighbors[nbr_idx]
            .lists
            .ls_request
            .contains_key(&lsa_key)
        {
            return false;
        }
        peer.nsm_event(nbr_idx, ctx, nsm::Event::BadLsReq);
        true
    })?;
    if requested {
        return Ok(false);
    }

    peers.with_peer(peer_id, area_id, |peer, ctx| {
        let Some(nbr_idx) = peer.nbr_idx_by_id(nbr_id) else {
            return;
        };

        match cmp {
            // (7) Same instance as the database copy.
            Some(LsaCompare::Equivalent) => {
                let nbr = &mut peer.neighbors[nbr_idx];
                if nbr.rxmt_remove(&lsa_key).is_some() {
                    // Implied acknowledgment.
                    let from_dr = peer.state.dr == Some(nbr.network_id());
                    if peer.state.ism_state == ism::State::Backup && from_dr {
                        peer.delayed_ack_add(lsa_hdr, ctx);
                    }
                } else {
                    lsack_direct(peer, ctx, nbr_id, &lsa_hdr);
                }
            }
            // (8) Database copy is more recent: send it back, unless it's
            // being flushed after reaching MaxSequenceNumber.
            Some(LsaCompare::Older) => {
                if db_copy.is_maxage() && db_copy.hdr.seq_no == LSA_MAX_SEQ_NO {
                    return;
                }
                let nbr = &mut peer.neighbors[nbr_idx];
                nbr.lists.ls_update.insert(lsa_key, db_copy);
            }
            _ => (),
        }
    })?;

    Ok(true)
}

fn lsupd_lsa_newer<V>(
    peers: &mut Peers<'_, V>,
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    nbr_router_id: Ipv4Addr,
    lsa: Lsa,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let lsa_key = lsa.hdr.key();
    let lsa_hdr = lsa.current_hdr();
    let area = peers
        .areas
        .get(&area_id)
        .ok_or(Error::AreaIdNotFound(area_id))?;
    let db_copy = area.lookup(&lsa_key);

    // (5.a) MinLSArrival check.
    if db_copy.is_some() && area.arrived_recently(&lsa_key) {
        Debug::<V>::LsaMinArrivalDiscard(nbr_router_id, &lsa_hdr).log();
        return Ok(());
    }

    // (5.c) The database copy is no longer retransmitted to anyone.
    if let Some(db_copy) = &db_copy {
        rxmt_purge(peers, db_copy);
    }

    // (5.b) Flood the new instance.
    let lsa = Rc::new(lsa);
    let src = FloodSrc {
        peer_id,
        area_id,
        nbr_id,
    };
    let flooded_back = flood(peers, area_id, &lsa, Some(src));

    // (5.d) Install the new instance.
    lsa_install(peers, area_id, &lsa);

    // (5.e) Acknowledge the LSA, unless it was flooded back.
    if !flooded_back {
        peers.with_peer(peer_id, area_id, |peer, ctx| {
            let Some(nbr_idx) = peer.nbr_idx_by_id(nbr_id) else {
                return;
            };
            let from_dr =
                peer.state.dr == Some(peer.neighbors[nbr_idx].network_id());
            if peer.state.ism_state != ism::State::Backup || from_dr {
                peer.delayed_ack_add(lsa_hdr, ctx);
            }
        })?;
    }

    // (5.f) Self-originated LSA.
    if lsa.hdr.adv_rtr == peers.router_id {
        Debug::<V>::LsaSelfOriginated(nbr_router_id, &lsa.hdr).log();
        if let Some(area) = peers.areas.get_mut(&area_id) {
            area.receive_self_originated(&lsa);
        }
    }

    Ok(())
}

// ===== LS Ack packets =====

fn process_packet_lsack<V>(peer: &mut Peer<V>, nbr_idx: usize, lsack: LsAck)
where
    V: Version,
{
    let nbr = &mut peer.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return;
    }

    for lsa_hdr in &lsack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();
        let Some(lsa) = nbr.lists.ls_rxmt.get(&lsa_key) else {
            continue;
        };

        if compare_lsa(lsa_hdr, &lsa.current_hdr()) == LsaCompare::Equivalent {
            nbr.rxmt_remove(&lsa_key);
        } else {
            Debug::<V>::QuestionableAck(nbr.router_id, lsa_hdr).log();
        }
    }
}

// ===== helper functions =====

// Finds the virtual link leading to the given router.
fn vlink_find<V>(peers: &Peers<'_, V>, router_id: Ipv4Addr) -> Option<PeerId>
where
    V: Version,
{
    peers
        .peer_outs
        .iter()
        .filter(|(_, peer_out)| {
            peer_out.link.link_type == LinkType::VirtualLink
                && peer_out.is_active()
        })
        .find(|(_, peer_out)| {
            peer_out.peers.get(&BACKBONE).is_some_and(|peer| {
                peer.config.vlink_router_id == Some(router_id)
            })
        })
        .map(|(peer_id, _)| *peer_id)
}

fn lsack_direct<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    nbr_id: NeighborId,
    lsa_hdr: &LsaHdr,
) where
    V: Version,
{
    let (mut peer_ref, nbrs) = peer.split();
    if let Some(nbr) = nbrs.iter().find(|nbr| nbr.id == nbr_id) {
        output::send_lsack_direct(nbr, &mut peer_ref, ctx, lsa_hdr);
    }
}

// Removes an LSA instance from every retransmission list it's on.
fn rxmt_purge<V>(peers: &mut Peers<'_, V>, lsa: &LsaRef)
where
    V: Version,
{
    let lsa_key = lsa.hdr.key();
    for nbr in peers
        .peer_outs
        .values_mut()
        .flat_map(|peer_out| peer_out.peers.values_mut())
        .flat_map(|peer| peer.neighbors.iter_mut())
    {
        if nbr
            .lists
            .ls_rxmt
            .get(&lsa_key)
            .is_some_and(|old| Rc::ptr_eq(old, lsa))
        {
            nbr.rxmt_remove(&lsa_key);
        }
    }
}

// Installs an LSA in the databases of its flooding scope.
fn lsa_install<V>(peers: &mut Peers<'_, V>, area_id: Ipv4Addr, lsa: &LsaRef)
where
    V: Version,
{
    Debug::<V>::LsaInstall(&lsa.hdr).log();

    match V::lsa_type_scope(lsa.hdr.lsa_type) {
        LsaScope::As => {
            for area in peers
                .areas
                .values_mut()
                .filter(|area| area.area_type == AreaType::Normal)
            {
                area.install(lsa.clone());
            }
        }
        _ => {
            if let Some(area) = peers.areas.get_mut(&area_id) {
                area.install(lsa.clone());
            }
        }
    }
}
