//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use nsm::{Event, State};
use ospf_utils::task::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::debug::Debug;
use crate::error::Error;
use crate::lsdb::DatabaseHandle;
use crate::packet::lsa::{LsaHdr, LsaKey, LsaRef};
use crate::packet::{DbDesc, DbDescFlags, Hello, Options, PacketType};
use crate::peer::{LinkType, PeerCtx, PeerRef};
use crate::peer_manager::PeerId;
use crate::tasks::messages::input::RxmtPacketType;
use crate::version::Version;
use crate::{output, tasks};

// Process-local neighbor identifier.
//
// Identifiers are never reused, which allows them to be stored in the
// pending-ack sets of shared LSA objects.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct NeighborId(u32);

// Sentinel that matches every neighbor.
pub const ALL_NEIGHBORS: NeighborId = NeighborId(0);

#[derive(Debug)]
pub struct NeighborIdAllocator {
    next: u32,
}

#[derive(Debug)]
pub struct Neighbor<V: Version> {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: V::NetIpAddr,
    pub state: State,
    pub priority: u8,
    // Configured neighbor (NBMA, point-to-multipoint and virtual links).
    pub is_static: bool,
    // DR and BDR declared in the neighbor's last Hello.
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    // OSPFv3 only.
    pub iface_id: u32,
    pub last_hello: Option<Hello>,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<DbDesc>,
    pub last_sent_dbdesc: Option<DbDesc>,
    pub all_headers_sent: bool,
    pub db_handle: Option<DatabaseHandle>,

    pub uptime: Option<DateTime<Utc>>,
    pub event_count: u32,
    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeSet<LsaKey>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, LsaRef>,
    // Requested LSAs enqueued for transmission to this neighbor.
    pub ls_update: BTreeMap<LsaKey, LsaRef>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_rxmt: Option<IntervalTask>,
    // Drives both LS Request and LS Update retransmissions.
    pub ls_rxmt: Option<IntervalTask>,
}

// Operational state of a neighbor, as exposed to management queries.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NeighborInfo {
    pub peer_id: PeerId,
    pub area_id: Ipv4Addr,
    pub nbr_id: NeighborId,
    pub address: IpAddr,
    pub router_id: Ipv4Addr,
    pub priority: u8,
    pub state: State,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub uptime: Option<DateTime<Utc>>,
    // Seconds until the inactivity timer expires.
    pub dead_timer_remaining: Option<u64>,
    pub ls_request_count: usize,
    pub ls_rxmt_count: usize,
    pub adjacent: bool,
    pub event_count: u32,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl NeighborId =====

impl NeighborId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NeighborId {
    fn from(id: u32) -> NeighborId {
        NeighborId(id)
    }
}

impl std::fmt::Display for NeighborId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl NeighborIdAllocator =====

impl NeighborIdAllocator {
    pub fn next_id(&mut self) -> NeighborId {
        let id = NeighborId(self.next);
        self.next += 1;
        id
    }
}

impl Default for NeighborIdAllocator {
    fn default() -> NeighborIdAllocator {
        NeighborIdAllocator {
            next: ALL_NEIGHBORS.0 + 1,
        }
    }
}

// ===== impl Neighbor =====

impl<V> Neighbor<V>
where
    V: Version,
{
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: V::NetIpAddr,
        priority: u8,
        is_static: bool,
    ) -> Neighbor<V> {
        Debug::<V>::NeighborCreate(router_id).log();

        // Initial DD sequence number.
        #[cfg(not(feature = "deterministic"))]
        let dd_seq_no = rand::random::<u32>();
        #[cfg(feature = "deterministic")]
        let dd_seq_no = u32::from(router_id);

        Neighbor {
            id,
            router_id,
            src,
            state: State::Down,
            priority,
            is_static,
            dr: None,
            bdr: None,
            iface_id: 0,
            last_hello: None,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            all_headers_sent: false,
            db_handle: None,
            uptime: None,
            event_count: 0,
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    // Returns the identifier used to refer to this neighbor in the DR and BDR
    // fields of Hello packets.
    pub fn network_id(&self) -> Ipv4Addr {
        V::network_id(&self.src, self.router_id)
    }

    // Returns whether we're the master of the database exchange.
    pub fn is_master(&self) -> bool {
        self.dd_flags.contains(DbDescFlags::MS)
    }

    // Destination address of packets addressed to this neighbor only.
    pub(crate) fn dst(&self, link_type: LinkType) -> V::NetIpAddr {
        match link_type {
            LinkType::PointToPoint => V::all_spf_rtrs(),
            _ => self.src,
        }
    }

    pub(crate) fn fsm(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
        event: Event,
    ) -> Option<(State, State)> {
        Debug::<V>::NsmEvent(self.router_id, &self.state, &event).log();
        self.event_count += 1;

        let new_state = match (self.state, event) {
            // NSM (state, event) -> (Action, new state)
            (State::Down, Event::Start) => {
                self.inactivity_timer_reset(peer, ctx);
                Some(State::Attempt)
            }
            // NSM (state, event) -> (Action, new state)
            (State::Down | State::Attempt, Event::HelloRcvd) => {
                self.inactivity_timer_reset(peer, ctx);
                Some(State::Init)
            }
            // NSM (state, event) -> (Action, no state change)
            (_, Event::HelloRcvd) => {
                self.inactivity_timer_reset(peer, ctx);
                None
            }
            // NSM (state, event) -> (Action, new state)
            (State::Init, Event::TwoWayRcvd) => {
                if self.adjacency_needed(peer, ctx) {
                    self.start_exstart(peer, ctx, true);
                    Some(State::ExStart)
                } else {
                    Some(State::TwoWay)
                }
            }
            // NSM (state, event) -> (No action, no state change)
            (state, Event::TwoWayRcvd) if state >= State::TwoWay => None,
            // NSM (state, event) -> (Action, new state)
            (State::ExStart, Event::NegotiationDone) => {
                let vlink = ctx.link.link_type == LinkType::VirtualLink;
                let (handle, _) = ctx.area.open_database(peer.peer_id, vlink);
                self.db_handle = Some(handle);

                // The slave only answers the master's packets.
                if !self.is_master() {
                    self.tasks.dbdesc_rxmt = None;
                }
                Some(State::Exchange)
            }
            // NSM (state, event) -> (Action, new state)
            (State::Exchange, Event::ExchangeDone) => {
                // The slave keeps its last packet to answer duplicates from
                // the master.
                self.tasks.dbdesc_rxmt = None;
                if let Some(handle) = self.db_handle.take() {
                    ctx.area.close_database(handle);
                }

                if self.lists.ls_request.is_empty() {
                    Some(State::Full)
                } else {
                    output::send_lsreq(self, peer, ctx);
                    self.rxmt_lsupd_start_check(peer, ctx);
                    Some(State::Loading)
                }
            }
            // NSM (state, event) -> (No action, new state)
            (State::Loading, Event::LoadingDone) => Some(State::Full),
            // NSM (state, event) -> (Action, new state)
            (State::TwoWay, Event::AdjOk) => {
                if self.adjacency_needed(peer, ctx) {
                    self.start_exstart(peer, ctx, true);
                    Some(State::ExStart)
                } else {
                    None
                }
            }
            // NSM (state, event) -> (Action, new state)
            (state, Event::AdjOk) if state >= State::ExStart => {
                if self.adjacency_needed(peer, ctx) {
                    None
                } else {
                    self.reset_adjacency(ctx);
                    Some(State::TwoWay)
                }
            }
            // NSM (state, event) -> (No action, no state change)
            (_, Event::AdjOk) => None,
            // NSM (state, event) -> (Action, new state)
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => {
                // The first packet of the new negotiation leaves after one
                // retransmission interval.
                self.reset_adjacency(ctx);
                self.start_exstart(peer, ctx, false);
                Some(State::ExStart)
            }
            // NSM (state, event) -> (Action, new state)
            (_, Event::Kill | Event::InactivityTimer | Event::LinkDown) => {
                self.reset_adjacency(ctx);
                self.tasks.inactivity_timer = None;
                self.last_hello = None;
                self.dr = None;
                self.bdr = None;
                Some(State::Down)
            }
            // NSM (state, event) -> (Action, new state)
            (state, Event::OneWayRcvd) if state >= State::TwoWay => {
                self.reset_adjacency(ctx);
                Some(State::Init)
            }
            // NSM (state, event) -> (No action, no state change)
            (State::Init, Event::OneWayRcvd) => None,
            _ => {
                Error::<V>::NsmUnexpectedEvent(self.router_id, self.state, event)
                    .log();
                return None;
            }
        };

        let old_state = self.state;
        match new_state {
            Some(new_state) if new_state != old_state => {
                self.fsm_state_change(new_state);
                Some((old_state, new_state))
            }
            _ => None,
        }
    }

    fn fsm_state_change(&mut self, new_state: State) {
        Debug::<V>::NsmTransition(self.router_id, &self.state, &new_state)
            .log();

        if new_state == State::Full {
            self.uptime = Some(Utc::now());
        } else if self.state == State::Full {
            self.uptime = None;
        }
        self.state = new_state;
    }

    // Returns whether an adjacency should be established with this neighbor
    // (RFC 2328 section 10.4).
    pub(crate) fn adjacency_needed(
        &self,
        peer: &PeerRef<'_>,
        ctx: &PeerCtx<'_, V>,
    ) -> bool {
        if !ctx.link.link_type.is_broadcast_or_nbma() {
            return true;
        }

        let my_id = V::network_id(&ctx.link.addr, ctx.router_id);
        let nbr_id = self.network_id();
        [my_id, nbr_id].into_iter().any(|id| {
            peer.state.dr == Some(id) || peer.state.bdr == Some(id)
        })
    }

    fn start_exstart(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
        send_now: bool,
    ) {
        self.dd_flags = DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS;
        self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
        self.all_headers_sent = false;
        self.last_rcvd_dbdesc = None;
        self.dbdesc_build(peer, ctx);
        if send_now {
            output::send_dbdesc(self, peer, ctx);
        }
        self.rxmt_dbdesc_start(peer, ctx);
    }

    // Tears down the database exchange state, including the retransmission
    // list and the pending acks it holds on shared LSAs.
    pub(crate) fn reset_adjacency(&mut self, ctx: &mut PeerCtx<'_, V>) {
        if let Some(handle) = self.db_handle.take() {
            ctx.area.close_database(handle);
        }
        for lsa in self.lists.ls_rxmt.values() {
            lsa.remove_pending_ack(self.id);
        }
        self.lists = Default::default();
        self.tasks.dbdesc_rxmt = None;
        self.tasks.ls_rxmt = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.all_headers_sent = false;
    }

    // Builds the next Database Description packet to be sent.
    //
    // While negotiating, the packet carries no LSA headers. Afterwards it
    // carries as many headers as fit in a single frame. MaxAge LSAs found in
    // the database are put on the retransmission list instead.
    pub(crate) fn dbdesc_build(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
    ) {
        let mut lsa_hdrs = vec![];
        let mut maxage_lsas = vec![];

        if !self.dd_flags.contains(DbDescFlags::I) {
            let overhead = V::IP_HDR_LENGTH
                + V::HDR_LENGTH
                + V::DBDESC_BASE_LENGTH
                + peer.state.auth.trailer_length();
            let max_hdrs =
                (ctx.link.mtu.saturating_sub(overhead) / LsaHdr::LENGTH) as usize;

            if let Some(mut handle) = self.db_handle.take() {
                while lsa_hdrs.len() < max_hdrs {
                    let Some((lsa, _)) = ctx.area.get_entry(&mut handle) else {
                        break;
                    };
                    if lsa.is_maxage() {
                        maxage_lsas.push(lsa);
                        continue;
                    }
                    lsa_hdrs.push(lsa.current_hdr());
                }

                if ctx.area.advance(&handle) {
                    self.db_handle = Some(handle);
                } else {
                    ctx.area.close_database(handle);
                    self.all_headers_sent = true;
                }
            } else {
                self.all_headers_sent = true;
            }
            self.dd_flags.set(DbDescFlags::M, !self.all_headers_sent);
        }

        for lsa in maxage_lsas {
            self.rxmt_add(&lsa);
        }
        self.rxmt_lsupd_start_check(peer, ctx);

        let mtu = match ctx.link.link_type {
            LinkType::VirtualLink => 0,
            _ => ctx.link.mtu,
        };
        let hdr = output::packet_hdr(peer, ctx, PacketType::DbDesc);
        self.last_sent_dbdesc = Some(DbDesc {
            hdr,
            mtu,
            options: V::packet_options(peer.area_type),
            dd_flags: self.dd_flags,
            dd_seq_no: self.dd_seq_no,
            lsa_hdrs,
        });
    }

    // Handles the expiration of the DD retransmission interval.
    pub(crate) fn rxmt_dbdesc(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
    ) {
        let active = match self.state {
            State::ExStart => true,
            State::Exchange => self.is_master(),
            _ => false,
        };
        if !active {
            self.tasks.dbdesc_rxmt = None;
            return;
        }
        output::send_dbdesc(self, peer, ctx);
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        peer: &PeerRef<'_>,
        ctx: &PeerCtx<'_, V>,
    ) {
        let task = tasks::nbr_rxmt_interval(
            peer.peer_id,
            peer.area_id,
            self.id,
            RxmtPacketType::DbDesc,
            peer.config.rxmt_interval,
            &ctx.tx.protocol_input,
        );
        self.tasks.dbdesc_rxmt = Some(task);
    }

    // Combined LS Request and LS Update retransmission pass.
    //
    // Returns whether there's more work left, in which case the
    // retransmission interval keeps running.
    pub(crate) fn rxmt_lsupd(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
    ) -> bool {
        if self.state == State::Loading && !self.lists.ls_request.is_empty() {
            output::send_lsreq(self, peer, ctx);
        }

        // Prune entries acknowledged since the last pass.
        let nbr_id = self.id;
        self.lists
            .ls_rxmt
            .retain(|_, lsa| lsa.has_pending_ack(nbr_id));
        if !self.lists.ls_rxmt.is_empty() {
            let dst = smallvec![self.dst(ctx.link.link_type)];
            output::send_lsupd(peer, ctx, dst, self.lists.ls_rxmt.values());
        }

        let more =
            !self.lists.ls_request.is_empty() || !self.lists.ls_rxmt.is_empty();
        if !more {
            self.tasks.ls_rxmt = None;
        }
        more
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        peer: &PeerRef<'_>,
        ctx: &PeerCtx<'_, V>,
    ) {
        if self.tasks.ls_rxmt.is_some()
            || (self.lists.ls_rxmt.is_empty()
                && self.lists.ls_request.is_empty())
        {
            return;
        }

        let task = tasks::nbr_rxmt_interval(
            peer.peer_id,
            peer.area_id,
            self.id,
            RxmtPacketType::LsUpdate,
            peer.config.rxmt_interval,
            &ctx.tx.protocol_input,
        );
        self.tasks.ls_rxmt = Some(task);
    }

    // Adds an LSA to the retransmission list, replacing any older instance.
    pub(crate) fn rxmt_add(&mut self, lsa: &LsaRef) {
        lsa.add_pending_ack(self.id);
        if let Some(old) = self.lists.ls_rxmt.insert(lsa.hdr.key(), lsa.clone())
            && !std::rc::Rc::ptr_eq(&old, lsa)
        {
            old.remove_pending_ack(self.id);
        }
    }

    pub(crate) fn rxmt_remove(&mut self, key: &LsaKey) -> Option<LsaRef> {
        let lsa = self.lists.ls_rxmt.remove(key)?;
        lsa.remove_pending_ack(self.id);
        Some(lsa)
    }

    // Removes an entry from the request list, returning the requested
    // header.
    pub(crate) fn ls_request_remove(&mut self, key: &LsaKey) -> Option<LsaHdr> {
        self.lists.ls_request_pending.remove(key);
        self.lists.ls_request.remove(key)
    }

    // Checks whether the database exchange is over, sending the next LS
    // Request if needed.
    //
    // Returns true when the LoadingDone event should be generated.
    pub(crate) fn loading_done_check(
        &mut self,
        peer: &mut PeerRef<'_>,
        ctx: &mut PeerCtx<'_, V>,
    ) -> bool {
        if !self.lists.ls_request_pending.is_empty() {
            return false;
        }
        if !self.lists.ls_request.is_empty() {
            if self.state == State::Loading {
                output::send_lsreq(self, peer, ctx);
            }
            return false;
        }
        self.state == State::Loading
    }

    pub(crate) fn inactivity_timer_reset(
        &mut self,
        peer: &PeerRef<'_>,
        ctx: &PeerCtx<'_, V>,
    ) {
        if let Some(inactivity_timer) = &mut self.tasks.inactivity_timer {
            inactivity_timer.reset(None);
        } else {
            let task = tasks::nsm_inactivity_timer(
                peer.peer_id,
                peer.area_id,
                self.id,
                peer.config.dead_interval,
                &ctx.tx.protocol_input,
            );
            self.tasks.inactivity_timer = Some(task);
        }
    }

    pub(crate) fn info(&self, peer_id: PeerId, area_id: Ipv4Addr) -> NeighborInfo {
        NeighborInfo {
            peer_id,
            area_id,
            nbr_id: self.id,
            address: self.src.into(),
            router_id: self.router_id,
            priority: self.priority,
            state: self.state,
            dr: self.dr,
            bdr: self.bdr,
            uptime: self.uptime,
            dead_timer_remaining: self
                .tasks
                .inactivity_timer
                .as_ref()
                .map(|timer| timer.remaining().as_secs()),
            ls_request_count: self.lists.ls_request.len(),
            ls_rxmt_count: self.lists.ls_rxmt.len(),
            adjacent: self.state >= State::ExStart,
            event_count: self.event_count,
        }
    }
}

impl<V> Drop for Neighbor<V>
where
    V: Version,
{
    fn drop(&mut self) {
        Debug::<V>::NeighborDelete(self.router_id).log();
    }
}

// ===== unit tests =====
