//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use crate::area::AreaType;
use crate::lsdb::{LsaCompare, compare_lsa};
use crate::neighbor::{NeighborId, nsm};
use crate::packet::lsa::{LsaRef, LsaScope};
use crate::peer::{LinkType, Peer, PeerCtx, ism};
use crate::peer_manager::{PeerId, Peers};
use crate::version::Version;

// Where a flooded LSA came from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FloodSrc {
    pub peer_id: PeerId,
    pub area_id: Ipv4Addr,
    pub nbr_id: NeighborId,
}

// ===== global functions =====

// Floods an LSA out of every peer in its flooding scope (RFC 2328 section
// 13.3).
//
// The LSA is added to the retransmission lists of the eligible neighbors and
// queued for transmission on the peers that need it. Queued LSAs are sent
// once the current message is fully processed.
//
// Returns whether the LSA was flooded back out of the receiving peer.
pub(crate) fn flood<V>(
    peers: &mut Peers<'_, V>,
    area_id: Ipv4Addr,
    lsa: &LsaRef,
    src: Option<FloodSrc>,
) -> bool
where
    V: Version,
{
    let scope = V::lsa_type_scope(lsa.hdr.lsa_type);
    let mut flooded_back = false;

    peers.for_each(|peer_id, peer, ctx| {
        let eligible = match scope {
            LsaScope::Link => src.is_some_and(|src| {
                src.peer_id == peer_id && src.area_id == peer.area_id
            }),
            LsaScope::Area => peer.area_id == area_id,
            LsaScope::As => {
                peer.area_type == AreaType::Normal
                    && ctx.link.link_type != LinkType::VirtualLink
            }
            LsaScope::Unknown => false,
        };
        if !eligible {
            return;
        }

        let src_nbr = src
            .filter(|src| src.peer_id == peer_id && src.area_id == peer.area_id)
            .map(|src| src.nbr_id);
        flooded_back |= flood_peer(peer, ctx, lsa, src_nbr);
    });

    flooded_back
}

// ===== helper functions =====

fn flood_peer<V>(
    peer: &mut Peer<V>,
    ctx: &mut PeerCtx<'_, V>,
    lsa: &LsaRef,
    src_nbr: Option<NeighborId>,
) -> bool
where
    V: Version,
{
    let lsa_key = lsa.hdr.key();
    let lsa_hdr = lsa.current_hdr();
    let mut rxmt_added = false;
    let mut loading_done = vec![];

    // 1) Each of the neighbors attached to this peer are examined.
    let (mut peer_ref, nbrs) = peer.split();
    for (idx, nbr) in nbrs.iter_mut().enumerate() {
        // 1.a) Skip neighbors in a lesser state than Exchange.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // 1.b) Handle adjacencies that are not full.
        if nbr.state != nsm::State::Full
            && let Some(req) = nbr.lists.ls_request.get(&lsa_key)
        {
            let cmp = compare_lsa(&lsa_hdr, req);
            if cmp == LsaCompare::Older {
                continue;
            }

            nbr.ls_request_remove(&lsa_key);
            if nbr.loading_done_check(&mut peer_ref, ctx) {
                loading_done.push(idx);
            }
            if cmp == LsaCompare::Equivalent {
                continue;
            }
        }

        // 1.c) Skip the neighbor the LSA was received from.
        if src_nbr == Some(nbr.id) {
            continue;
        }

        // 1.d) Add LSA to the retransmission list (replacing any older
        // instance).
        nbr.rxmt_add(lsa);
        nbr.rxmt_lsupd_start_check(&peer_ref, ctx);
        rxmt_added = true;
    }

    for idx in loading_done {
        peer.nsm_event(idx, ctx, nsm::Event::LoadingDone);
    }

    // 2) Nothing to send if no neighbor needs the LSA.
    if !rxmt_added {
        return false;
    }

    let mut flooded_back = false;
    if let Some(src_nbr) = src_nbr
        && let Some(nbr) = peer.neighbors.iter().find(|nbr| nbr.id == src_nbr)
    {
        // 3) Received from the DR or the BDR: the other routers already got
        // it.
        let net_id = nbr.network_id();
        if peer.state.dr == Some(net_id) || peer.state.bdr == Some(net_id) {
            return false;
        }

        // 4) The BDR doesn't flood back out of the receiving peer.
        if peer.state.ism_state == ism::State::Backup {
            return false;
        }

        flooded_back = true;
    }

    // 5) Queue the LSA for transmission.
    peer.state.ls_update.insert(lsa_key, lsa.clone());

    flooded_back
}
