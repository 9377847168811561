//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};

use ism::{Event, State};
use ospf_utils::ip::{IpAddrKind, Ipv4AddrExt, Ipv6AddrExt};
use ospf_utils::task::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::area::{
    AreaRouter, AreaType, NetworkLsaInfo, RouterLink, RouterLinkType,
};
use crate::auth::AuthHandler;
use crate::config::PeerCfg;
use crate::debug::{Debug, PeerInactiveReason};
use crate::error::Error;
use crate::neighbor::{Neighbor, NeighborId, NeighborIdAllocator, nsm};
use crate::output::Destinations;
use crate::packet::lsa::{LsaHdr, LsaKey, LsaRef};
use crate::packet::{Hello, Options};
use crate::peer_manager::{PeerId, ProtocolChannelsTx};
use crate::peer_out::{Link, TransmitQueue};
use crate::version::{Ospfv2, Ospfv3, Version};
use crate::{output, tasks};

// OSPF link type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
    PointToPoint,
    Broadcast,
    Nbma,
    PointToMultipoint,
    VirtualLink,
}

// A peer is the attachment of a link to an area.
#[derive(Debug)]
pub struct Peer<V: Version> {
    pub peer_id: PeerId,
    pub area_id: Ipv4Addr,
    pub area_type: AreaType,
    pub config: PeerCfg,
    pub state: PeerState,
    pub neighbors: Vec<Neighbor<V>>,
}

#[derive(Debug)]
pub struct PeerState {
    pub ism_state: State,
    // DR and BDR, identified by their network IDs.
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub auth: AuthHandler,
    // Events scheduled to run once the current message is processed.
    pub deferred: BTreeSet<Event>,
    // Links contributed to the Router-LSA (sorted).
    pub router_links: Vec<RouterLink>,
    // Network-LSA originated while we're the DR.
    pub network_lsa: Option<NetworkLsaInfo>,
    // LSAs queued for flooding out of this peer.
    pub ls_update: BTreeMap<LsaKey, LsaRef>,
    pub ls_ack_delayed: Vec<LsaHdr>,
    pub tasks: PeerTasks,
}

#[derive(Debug, Default)]
pub struct PeerTasks {
    pub hello_interval: Option<IntervalTask>,
    pub wait_timer: Option<TimeoutTask>,
    pub ls_delayed_ack: Option<TimeoutTask>,
}

// Peer fields that remain accessible while one of its neighbors is borrowed.
pub struct PeerRef<'a> {
    pub peer_id: PeerId,
    pub area_id: Ipv4Addr,
    pub area_type: AreaType,
    pub config: &'a PeerCfg,
    pub state: &'a mut PeerState,
}

// Context owned by the link and the peer manager, lent to a peer while it
// processes an event.
pub struct PeerCtx<'a, V: Version> {
    pub router_id: Ipv4Addr,
    pub link: &'a Link<V>,
    pub txq: &'a mut TransmitQueue<V>,
    pub area: &'a mut dyn AreaRouter<V>,
    pub tx: &'a ProtocolChannelsTx<V>,
    pub nbr_ids: &'a mut NeighborIdAllocator,
}

// Router taking part in the DR election.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DrCandidate {
    pub net_id: Ipv4Addr,
    pub router_id: Ipv4Addr,
    pub priority: u8,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
}

// OSPF version-specific code.
pub trait PeerVersion<V: Version> {
    // Returns the ID identifying a router in the DR and BDR fields of Hello
    // packets.
    fn network_id(addr: &V::NetIpAddr, router_id: Ipv4Addr) -> Ipv4Addr;

    // Returns whether neighbors on this link type are identified by their
    // Router IDs (as opposed to their source addresses).
    fn nbr_key_by_router_id(link_type: LinkType) -> bool;

    // Validates the source address of a received packet.
    fn validate_src_addr(link_type: LinkType, src: &V::NetIpAddr) -> bool;

    // Options advertised in Hello and Database Description packets.
    fn packet_options(area_type: AreaType) -> Options;

    // Network mask advertised in Hello packets.
    fn hello_mask(link: &Link<V>) -> Ipv4Addr;

    // Checks the network mask of a received Hello packet.
    fn validate_hello_mask(link: &Link<V>, hello: &Hello) -> bool;

    // Computes the links contributed by a peer to the Router-LSA.
    fn router_links(
        link: &Link<V>,
        state: &PeerState,
        router_id: Ipv4Addr,
        neighbors: &[Neighbor<V>],
    ) -> Vec<RouterLink>;

    // LSA-ID and mask of the Network-LSA originated as DR.
    fn network_lsa_id(link: &Link<V>) -> Ipv4Addr;

    fn network_lsa_mask(link: &Link<V>) -> Ipv4Addr;

    fn all_spf_rtrs() -> V::NetIpAddr;

    fn all_dr_rtrs() -> V::NetIpAddr;
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown,
    }
}

// ===== impl LinkType =====

impl LinkType {
    // Returns whether a DR is elected on this link type.
    pub fn is_broadcast_or_nbma(&self) -> bool {
        matches!(self, LinkType::Broadcast | LinkType::Nbma)
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkType::PointToPoint => write!(f, "point-to-point"),
            LinkType::Broadcast => write!(f, "broadcast"),
            LinkType::Nbma => write!(f, "nbma"),
            LinkType::PointToMultipoint => write!(f, "point-to-multipoint"),
            LinkType::VirtualLink => write!(f, "virtual-link"),
        }
    }
}

// ===== impl Peer =====

impl<V> Peer<V>
where
    V: Version,
{
    pub(crate) fn new(
        peer_id: PeerId,
        area_type: AreaType,
        config: PeerCfg,
    ) -> Peer<V> {
        Peer {
            peer_id,
            area_id: config.area_id,
            area_type,
            config,
            state: PeerState::default(),
            neighbors: Default::default(),
        }
    }

    // Splits the peer so that its neighbors can be mutated alongside the
    // remaining peer state.
    pub(crate) fn split(&mut self) -> (PeerRef<'_>, &mut Vec<Neighbor<V>>) {
        let peer = PeerRef {
            peer_id: self.peer_id,
            area_id: self.area_id,
            area_type: self.area_type,
            config: &self.config,
            state: &mut self.state,
        };
        (peer, &mut self.neighbors)
    }

    pub fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn start(&mut self, ctx: &mut PeerCtx<'_, V>) {
        Debug::<V>::PeerStart(&ctx.link.ifname, self.area_id).log();
        if ctx.link.loopback {
            self.fsm(ctx, Event::LoopInd);
        } else {
            self.fsm(ctx, Event::InterfaceUp);
        }
    }

    pub(crate) fn stop(
        &mut self,
        ctx: &mut PeerCtx<'_, V>,
        reason: PeerInactiveReason,
    ) {
        if self.is_down() {
            return;
        }
        Debug::<V>::PeerStop(&ctx.link.ifname, self.area_id, reason).log();
        self.fsm(ctx, Event::InterfaceDown);
    }

    pub(crate) fn fsm(&mut self, ctx: &mut PeerCtx<'_, V>, event: Event) {
        Debug::<V>::IsmEvent(&self.state.ism_state, &event).log();

        let new_state = match (self.state.ism_state, event) {
            // ISM (state, event) -> (Action, new state)
            (State::Down, Event::InterfaceUp) => {
                ctx.area.peer_up(self.peer_id);
                self.hello_interval_start(ctx);

                match ctx.link.link_type {
                    LinkType::PointToPoint
                    | LinkType::PointToMultipoint
                    | LinkType::VirtualLink => Some(State::PointToPoint),
                    LinkType::Broadcast | LinkType::Nbma => {
                        if self.config.priority == 0 {
                            Some(State::DrOther)
                        } else {
                            let task = tasks::ism_wait_timer(
                                self.peer_id,
                                self.area_id,
                                self.config.dead_interval,
                                &ctx.tx.protocol_input,
                            );
                            self.state.tasks.wait_timer = Some(task);

                            // Poll the eligible configured neighbors.
                            if ctx.link.link_type == LinkType::Nbma {
                                let idxs = self
                                    .neighbors
                                    .iter()
                                    .enumerate()
                                    .filter(|(_, nbr)| nbr.priority != 0)
                                    .map(|(idx, _)| idx)
                                    .collect::<Vec<_>>();
                                for idx in idxs {
                                    self.nsm_event(idx, ctx, nsm::Event::Start);
                                }
                            }
                            Some(State::Waiting)
                        }
                    }
                }
            }
            // ISM (state, event) -> (Action, new state)
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;
                Some(self.dr_election(ctx))
            }
            // ISM (state, event) -> (Action, new state)
            (
                State::DrOther | State::Backup | State::Dr,
                Event::NbrChange,
            ) => Some(self.dr_election(ctx)),
            // ISM (state, event) -> (No action, no state change)
            (State::Down | State::Waiting, Event::NbrChange) => None,
            // ISM (state, event) -> (Action, new state)
            (_, Event::LoopInd) => {
                self.reset(ctx);
                ctx.area.peer_up(self.peer_id);
                Some(State::Loopback)
            }
            // ISM (state, event) -> (No action, new state)
            (State::Loopback, Event::UnloopInd) => Some(State::Down),
            // ISM (state, event) -> (Action, new state)
            (_, Event::InterfaceDown) => {
                self.reset(ctx);
                Some(State::Down)
            }
            _ => {
                Error::<V>::IsmUnexpectedEvent(self.state.ism_state, event)
                    .log();
                return;
            }
        };

        let mut went_down = false;
        if let Some(new_state) = new_state
            && new_state != self.state.ism_state
        {
            let old_state = self.state.ism_state;
            Debug::<V>::IsmTransition(&old_state, &new_state).log();
            self.state.ism_state = new_state;
            went_down = new_state == State::Down;
        }

        // The DR may have changed even if the state didn't.
        self.update_router_links(ctx);
        self.network_lsa_check(ctx);

        if went_down {
            ctx.area.peer_down(self.peer_id);
        }
    }

    // Kills all neighbors and clears the dynamic state of the peer.
    fn reset(&mut self, ctx: &mut PeerCtx<'_, V>) {
        for idx in 0..self.neighbors.len() {
            self.nsm_event(idx, ctx, nsm::Event::Kill);
        }
        self.neighbors.retain(|nbr| nbr.is_static);
        self.state.dr = None;
        self.state.bdr = None;
        self.state.deferred.clear();
        self.state.ls_update.clear();
        self.state.ls_ack_delayed.clear();
        self.state.tasks = Default::default();
        self.state.auth.reset();
    }

    // Runs the neighbor state machine and the peer-level actions triggered
    // by the resulting transition.
    pub(crate) fn nsm_event(
        &mut self,
        idx: usize,
        ctx: &mut PeerCtx<'_, V>,
        event: nsm::Event,
    ) {
        let (mut peer, nbrs) = self.split();
        let Some(nbr) = nbrs.get_mut(idx) else {
            return;
        };
        let transition = nbr.fsm(&mut peer, ctx, event);
        let nbr_src = nbr.src;

        // Configured neighbors are polled as soon as they're started.
        if event == nsm::Event::Start && transition.is_some() {
            output::send_hello(&mut peer, nbrs, ctx, smallvec![nbr_src]);
        }

        let Some((old_state, new_state)) = transition else {
            return;
        };

        if new_state == nsm::State::Down {
            peer.state.auth.reset_source(nbr_src.into());
        }

        // Changes in bidirectional communication affect the DR election.
        if ctx.link.link_type.is_broadcast_or_nbma()
            && (old_state >= nsm::State::TwoWay)
                != (new_state >= nsm::State::TwoWay)
        {
            self.state.deferred.insert(Event::NbrChange);
        }

        // Adjacency changes affect the Router-LSA and the Network-LSA.
        if (old_state == nsm::State::Full) != (new_state == nsm::State::Full) {
            self.update_router_links(ctx);
            self.network_lsa_check(ctx);
        }
    }

    // Runs the events deferred while processing the last message.
    pub(crate) fn run_deferred(&mut self, ctx: &mut PeerCtx<'_, V>) {
        while let Some(event) = self.state.deferred.pop_first() {
            self.fsm(ctx, event);
        }
    }

    // Elects the DR and BDR (RFC 2328 section 9.4).
    fn dr_election(&mut self, ctx: &mut PeerCtx<'_, V>) -> State {
        let my_id = V::network_id(&ctx.link.addr, ctx.router_id);
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        let candidates = self.dr_candidates(ctx.router_id, my_id);
        let (dr, bdr) = dr_bdr_election(&candidates, my_id, old_dr, old_bdr);
        self.state.dr = dr;
        self.state.bdr = bdr;
        Debug::<V>::IsmDrElection(old_dr, dr, old_bdr, bdr).log();

        // Adjacencies may need to be formed or torn down.
        let idxs = self
            .neighbors
            .iter()
            .enumerate()
            .filter(|(_, nbr)| nbr.state >= nsm::State::TwoWay)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        for idx in idxs {
            self.nsm_event(idx, ctx, nsm::Event::AdjOk);
        }

        // On NBMA networks, the DR and BDR start polling all configured
        // neighbors.
        let is_dr_or_bdr = dr == Some(my_id) || bdr == Some(my_id);
        let was_dr_or_bdr = old_dr == Some(my_id) || old_bdr == Some(my_id);
        if ctx.link.link_type == LinkType::Nbma && is_dr_or_bdr && !was_dr_or_bdr
        {
            let idxs = self
                .neighbors
                .iter()
                .enumerate()
                .filter(|(_, nbr)| nbr.is_static)
                .filter(|(_, nbr)| nbr.state == nsm::State::Down)
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>();
            for idx in idxs {
                self.nsm_event(idx, ctx, nsm::Event::Start);
            }
        }

        if dr == Some(my_id) {
            State::Dr
        } else if bdr == Some(my_id) {
            State::Backup
        } else {
            State::DrOther
        }
    }

    fn dr_candidates(
        &self,
        router_id: Ipv4Addr,
        my_id: Ipv4Addr,
    ) -> Vec<DrCandidate> {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            net_id: my_id,
            router_id,
            priority: self.config.priority,
            dr: self.state.dr,
            bdr: self.state.bdr,
        });

        let nbrs = self
            .neighbors
            .iter()
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                net_id: nbr.network_id(),
                router_id: nbr.router_id,
                priority: nbr.priority,
                dr: nbr.dr,
                bdr: nbr.bdr,
            });

        myself.into_iter().chain(nbrs).collect()
    }

    // Recomputes the links contributed to the Router-LSA, notifying the area
    // only when they actually changed.
    pub(crate) fn update_router_links(&mut self, ctx: &mut PeerCtx<'_, V>) {
        let mut links =
            V::router_links(ctx.link, &self.state, ctx.router_id, &self.neighbors);
        links.sort();
        links.dedup();
        if links != self.state.router_links {
            ctx.area.new_router_links(self.peer_id, &links);
            self.state.router_links = links;
        }
    }

    // Starts, updates or withdraws the Network-LSA of this peer.
    pub(crate) fn network_lsa_check(&mut self, ctx: &mut PeerCtx<'_, V>) {
        let mut attached = self
            .neighbors
            .iter()
            .filter(|nbr| nbr.state == nsm::State::Full)
            .map(|nbr| nbr.router_id)
            .collect::<Vec<_>>();

        if self.state.ism_state == State::Dr && !attached.is_empty() {
            attached.push(ctx.router_id);
            attached.sort();
            let info = NetworkLsaInfo {
                lsa_id: V::network_lsa_id(ctx.link),
                mask: V::network_lsa_mask(ctx.link),
                options: V::packet_options(self.area_type),
                attached,
            };
            match &self.state.network_lsa {
                None => {
                    ctx.area.generate_network_lsa(self.peer_id, info.clone())
                }
                Some(old) if *old != info => {
                    ctx.area.update_network_lsa(self.peer_id, info.clone())
                }
                Some(_) => return,
            }
            self.state.network_lsa = Some(info);
        } else if self.state.network_lsa.take().is_some() {
            ctx.area.withdraw_network_lsa(self.peer_id);
        }
    }

    pub(crate) fn hello_interval_start(&mut self, ctx: &PeerCtx<'_, V>) {
        if self.config.passive {
            return;
        }
        let task = tasks::hello_interval(
            self.peer_id,
            self.area_id,
            self.config.hello_interval,
            &ctx.tx.protocol_input,
        );
        self.state.tasks.hello_interval = Some(task);
    }

    // Sends Hello packets, either multicast or to each configured or known
    // neighbor depending on the link type.
    pub(crate) fn send_hellos(&mut self, ctx: &mut PeerCtx<'_, V>) {
        if self.config.passive
            || matches!(self.state.ism_state, State::Down | State::Loopback)
        {
            return;
        }

        let (mut peer, nbrs) = self.split();
        let dst = match ctx.link.link_type {
            LinkType::PointToPoint | LinkType::Broadcast => {
                smallvec![V::all_spf_rtrs()]
            }
            // NBMA neighbors in the Down state are only polled when either
            // side is eligible to become DR.
            LinkType::Nbma => nbrs
                .iter()
                .filter(|nbr| {
                    nbr.state > nsm::State::Down
                        || (nbr.is_static
                            && (nbr.priority != 0
                                || peer.config.priority != 0))
                })
                .map(|nbr| nbr.src)
                .collect(),
            LinkType::PointToMultipoint | LinkType::VirtualLink => nbrs
                .iter()
                .filter(|nbr| nbr.is_static || nbr.state > nsm::State::Down)
                .map(|nbr| nbr.src)
                .collect(),
        };
        output::send_hello(&mut peer, nbrs, ctx, dst);
    }

    // Destination of multicast flooding and delayed acknowledgments.
    //
    // Returns None on link types where these are unicast to each adjacent
    // neighbor.
    pub(crate) fn flood_dst(&self, link_type: LinkType) -> Option<V::NetIpAddr> {
        match link_type {
            LinkType::PointToPoint => Some(V::all_spf_rtrs()),
            LinkType::Broadcast => match self.state.ism_state {
                State::Dr | State::Backup => Some(V::all_spf_rtrs()),
                _ => Some(V::all_dr_rtrs()),
            },
            _ => None,
        }
    }

    // Returns the destinations of flooded LSAs and delayed acks.
    fn flood_dsts(&self, link_type: LinkType) -> Destinations<V> {
        match self.flood_dst(link_type) {
            Some(dst) => smallvec![dst],
            None => self
                .neighbors
                .iter()
                .filter(|nbr| nbr.state >= nsm::State::Exchange)
                .map(|nbr| nbr.src)
                .collect(),
        }
    }

    // Sends the LSAs queued for flooding, along with the responses to LS
    // Requests queued on each neighbor.
    pub(crate) fn push_lsas(&mut self, ctx: &mut PeerCtx<'_, V>) {
        if !self.state.ls_update.is_empty() {
            let dst = self.flood_dsts(ctx.link.link_type);
            let lsas = std::mem::take(&mut self.state.ls_update);
            let (mut peer, _) = self.split();
            output::send_lsupd(&mut peer, ctx, dst, lsas.values());
        }

        let (mut peer, nbrs) = self.split();
        for nbr in nbrs.iter_mut() {
            if nbr.lists.ls_update.is_empty() {
                continue;
            }
            let lsas = std::mem::take(&mut nbr.lists.ls_update);
            let dst = smallvec![nbr.dst(ctx.link.link_type)];
            output::send_lsupd(&mut peer, ctx, dst, lsas.values());
        }
    }

    // Queues an LSA header for delayed acknowledgment.
    pub(crate) fn delayed_ack_add(
        &mut self,
        lsa_hdr: LsaHdr,
        ctx: &PeerCtx<'_, V>,
    ) {
        self.state.ls_ack_delayed.push(lsa_hdr);
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(
                self.peer_id,
                self.area_id,
                self.config.hello_interval,
                &ctx.tx.protocol_input,
            );
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    // Sends the pending delayed acknowledgments.
    pub(crate) fn delayed_ack_flush(&mut self, ctx: &mut PeerCtx<'_, V>) {
        self.state.tasks.ls_delayed_ack = None;
        if self.state.ls_ack_delayed.is_empty() {
            return;
        }

        let dst = self.flood_dsts(ctx.link.link_type);
        let lsa_hdrs = std::mem::take(&mut self.state.ls_ack_delayed);
        let (mut peer, _) = self.split();
        output::send_lsack(&mut peer, ctx, dst, &lsa_hdrs);
    }

    pub(crate) fn nbr_idx_by_id(&self, nbr_id: NeighborId) -> Option<usize> {
        self.neighbors.iter().position(|nbr| nbr.id == nbr_id)
    }

    // Finds the neighbor that sent a packet.
    //
    // Configured neighbors whose Router ID isn't known yet are matched by
    // their addresses.
    pub(crate) fn nbr_idx_find(
        &self,
        link_type: LinkType,
        router_id: Ipv4Addr,
        src: &V::NetIpAddr,
    ) -> Option<usize> {
        let by_router_id = V::nbr_key_by_router_id(link_type);
        self.neighbors
            .iter()
            .position(|nbr| {
                if by_router_id {
                    nbr.router_id == router_id
                } else {
                    nbr.src == *src
                }
            })
            .or_else(|| {
                self.neighbors.iter().position(|nbr| {
                    nbr.is_static
                        && nbr.src == *src
                        && nbr.router_id.is_unspecified()
                })
            })
    }

    // Adds a configured neighbor.
    pub(crate) fn static_nbr_add(
        &mut self,
        ctx: &mut PeerCtx<'_, V>,
        addr: V::NetIpAddr,
        priority: u8,
    ) {
        if self.neighbors.iter().any(|nbr| nbr.is_static && nbr.src == addr) {
            return;
        }

        let router_id = match ctx.link.link_type {
            LinkType::VirtualLink => self
                .config
                .vlink_router_id
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            _ => Ipv4Addr::UNSPECIFIED,
        };
        let nbr_id = ctx.nbr_ids.next_id();
        let nbr = Neighbor::new(nbr_id, router_id, addr, priority, true);
        self.neighbors.push(nbr);

        // Start polling right away when possible.
        if ctx.link.link_type == LinkType::Nbma
            && !self.is_down()
            && (priority != 0
                || matches!(self.state.ism_state, State::Dr | State::Backup))
        {
            let idx = self.neighbors.len() - 1;
            self.nsm_event(idx, ctx, nsm::Event::Start);
        }
    }

    // Removes a configured neighbor.
    pub(crate) fn static_nbr_remove(
        &mut self,
        ctx: &mut PeerCtx<'_, V>,
        addr: V::NetIpAddr,
    ) -> bool {
        let Some(idx) = self
            .neighbors
            .iter()
            .position(|nbr| nbr.is_static && nbr.src == addr)
        else {
            return false;
        };
        self.nsm_event(idx, ctx, nsm::Event::Kill);
        self.neighbors.remove(idx);
        true
    }
}

// ===== impl PeerState =====

impl Default for PeerState {
    fn default() -> PeerState {
        PeerState {
            ism_state: State::Down,
            dr: None,
            bdr: None,
            auth: Default::default(),
            deferred: Default::default(),
            router_links: Default::default(),
            network_lsa: None,
            ls_update: Default::default(),
            ls_ack_delayed: Default::default(),
            tasks: Default::default(),
        }
    }
}

// ===== impl Ospfv2 =====

impl PeerVersion<Self> for Ospfv2 {
    fn network_id(addr: &Ipv4Addr, _router_id: Ipv4Addr) -> Ipv4Addr {
        *addr
    }

    fn nbr_key_by_router_id(link_type: LinkType) -> bool {
        matches!(link_type, LinkType::PointToPoint | LinkType::VirtualLink)
    }

    fn validate_src_addr(_link_type: LinkType, src: &Ipv4Addr) -> bool {
        src.is_usable()
    }

    fn packet_options(area_type: AreaType) -> Options {
        area_type.options()
    }

    fn hello_mask(link: &Link<Self>) -> Ipv4Addr {
        match link.link_type {
            LinkType::VirtualLink => Ipv4Addr::UNSPECIFIED,
            _ => Ipv4Addr::from_prefixlen(link.prefixlen),
        }
    }

    fn validate_hello_mask(link: &Link<Self>, hello: &Hello) -> bool {
        match link.link_type {
            LinkType::PointToPoint | LinkType::VirtualLink => true,
            _ => hello.network_mask == Self::hello_mask(link),
        }
    }

    fn router_links(
        link: &Link<Self>,
        state: &PeerState,
        _router_id: Ipv4Addr,
        neighbors: &[Neighbor<Self>],
    ) -> Vec<RouterLink> {
        let mask = Ipv4Addr::from_prefixlen(link.prefixlen);
        let subnet = Ipv4Addr::from(u32::from(link.addr) & u32::from(mask));
        let full_nbrs = || {
            neighbors
                .iter()
                .filter(|nbr| nbr.state == nsm::State::Full)
        };

        let mut links = vec![];
        match state.ism_state {
            State::Down => (),
            State::Loopback => {
                links.push(RouterLink::v2(
                    RouterLinkType::Stub,
                    link.addr,
                    Ipv4Addr::BROADCAST,
                    0,
                ));
            }
            State::Waiting => {
                links.push(RouterLink::v2(
                    RouterLinkType::Stub,
                    subnet,
                    mask,
                    link.cost,
                ));
            }
            State::PointToPoint | State::DrOther | State::Backup | State::Dr => {
                match link.link_type {
                    LinkType::PointToPoint => {
                        for nbr in full_nbrs() {
                            links.push(RouterLink::v2(
                                RouterLinkType::PointToPoint,
                                nbr.router_id,
                                link.addr,
                                link.cost,
                            ));
                        }
                        links.push(RouterLink::v2(
                            RouterLinkType::Stub,
                            subnet,
                            mask,
                            link.cost,
                        ));
                    }
                    LinkType::PointToMultipoint => {
                        for nbr in full_nbrs() {
                            links.push(RouterLink::v2(
                                RouterLinkType::PointToPoint,
                                nbr.router_id,
                                link.addr,
                                link.cost,
                            ));
                        }
                        links.push(RouterLink::v2(
                            RouterLinkType::Stub,
                            link.addr,
                            Ipv4Addr::BROADCAST,
                            0,
                        ));
                    }
                    LinkType::VirtualLink => {
                        for nbr in full_nbrs() {
                            links.push(RouterLink::v2(
                                RouterLinkType::VirtualLink,
                                nbr.router_id,
                                link.addr,
                                link.cost,
                            ));
                        }
                    }
                    LinkType::Broadcast | LinkType::Nbma => {
                        let adjacent_to_dr = match state.dr {
                            Some(dr) if dr == link.addr => {
                                full_nbrs().next().is_some()
                            }
                            Some(dr) => full_nbrs()
                                .any(|nbr| nbr.network_id() == dr),
                            None => false,
                        };
                        match state.dr {
                            Some(dr) if adjacent_to_dr => {
                                links.push(RouterLink::v2(
                                    RouterLinkType::Transit,
                                    dr,
                                    link.addr,
                                    link.cost,
                                ));
                            }
                            _ => {
                                links.push(RouterLink::v2(
                                    RouterLinkType::Stub,
                                    subnet,
                                    mask,
                                    link.cost,
                                ));
                            }
                        }
                    }
                }
            }
        }
        links
    }

    fn network_lsa_id(link: &Link<Self>) -> Ipv4Addr {
        link.addr
    }

    fn network_lsa_mask(link: &Link<Self>) -> Ipv4Addr {
        Ipv4Addr::from_prefixlen(link.prefixlen)
    }

    fn all_spf_rtrs() -> Ipv4Addr {
        Ipv4Addr::new(224, 0, 0, 5)
    }

    fn all_dr_rtrs() -> Ipv4Addr {
        Ipv4Addr::new(224, 0, 0, 6)
    }
}

// ===== impl Ospfv3 =====

impl PeerVersion<Self> for Ospfv3 {
    fn network_id(_addr: &Ipv6Addr, router_id: Ipv4Addr) -> Ipv4Addr {
        router_id
    }

    fn nbr_key_by_router_id(_link_type: LinkType) -> bool {
        true
    }

    fn validate_src_addr(link_type: LinkType, src: &Ipv6Addr) -> bool {
        match link_type {
            LinkType::VirtualLink => src.is_usable(),
            _ => src.is_link_local(),
        }
    }

    fn packet_options(area_type: AreaType) -> Options {
        area_type.options() | Options::V6 | Options::R
    }

    fn hello_mask(_link: &Link<Self>) -> Ipv4Addr {
        Ipv4Addr::UNSPECIFIED
    }

    fn validate_hello_mask(_link: &Link<Self>, _hello: &Hello) -> bool {
        true
    }

    fn router_links(
        link: &Link<Self>,
        state: &PeerState,
        router_id: Ipv4Addr,
        neighbors: &[Neighbor<Self>],
    ) -> Vec<RouterLink> {
        let full_nbrs = || {
            neighbors
                .iter()
                .filter(|nbr| nbr.state == nsm::State::Full)
        };

        let mut links = vec![];
        if !matches!(
            state.ism_state,
            State::PointToPoint | State::DrOther | State::Backup | State::Dr
        ) {
            return links;
        }

        match link.link_type {
            LinkType::PointToPoint | LinkType::PointToMultipoint => {
                for nbr in full_nbrs() {
                    links.push(RouterLink::v3(
                        RouterLinkType::PointToPoint,
                        link.iface_id,
                        nbr.iface_id,
                        nbr.router_id,
                        link.cost,
                    ));
                }
            }
            LinkType::VirtualLink => {
                for nbr in full_nbrs() {
                    links.push(RouterLink::v3(
                        RouterLinkType::VirtualLink,
                        link.iface_id,
                        nbr.iface_id,
                        nbr.router_id,
                        link.cost,
                    ));
                }
            }
            LinkType::Broadcast | LinkType::Nbma => match state.dr {
                Some(dr) if dr == router_id => {
                    if full_nbrs().next().is_some() {
                        links.push(RouterLink::v3(
                            RouterLinkType::Transit,
                            link.iface_id,
                            link.iface_id,
                            router_id,
                            link.cost,
                        ));
                    }
                }
                Some(dr) => {
                    if let Some(nbr) = full_nbrs().find(|nbr| nbr.router_id == dr)
                    {
                        links.push(RouterLink::v3(
                            RouterLinkType::Transit,
                            link.iface_id,
                            nbr.iface_id,
                            nbr.router_id,
                            link.cost,
                        ));
                    }
                }
                None => (),
            },
        }
        links
    }

    fn network_lsa_id(link: &Link<Self>) -> Ipv4Addr {
        Ipv4Addr::from(link.iface_id)
    }

    fn network_lsa_mask(_link: &Link<Self>) -> Ipv4Addr {
        Ipv4Addr::UNSPECIFIED
    }

    fn all_spf_rtrs() -> Ipv6Addr {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 5)
    }

    fn all_dr_rtrs() -> Ipv6Addr {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 6)
    }
}

// ===== global functions =====

// Runs the DR and BDR calculation (RFC 2328 section 9.4, steps 2 to 4).
//
// The calculation is repeated once when the calculating router becomes or
// stops being DR or BDR, so that its own declarations are taken into account.
pub fn dr_bdr_election(
    candidates: &[DrCandidate],
    my_id: Ipv4Addr,
    old_dr: Option<Ipv4Addr>,
    old_bdr: Option<Ipv4Addr>,
) -> (Option<Ipv4Addr>, Option<Ipv4Addr>) {
    let (dr, bdr) = calc_dr_bdr(candidates);

    let is_me = |id: Option<Ipv4Addr>| id == Some(my_id);
    if is_me(dr) != is_me(old_dr) || is_me(bdr) != is_me(old_bdr) {
        let candidates = candidates
            .iter()
            .map(|rtr| {
                if rtr.net_id == my_id {
                    DrCandidate { dr, bdr, ..*rtr }
                } else {
                    *rtr
                }
            })
            .collect::<Vec<_>>();
        return calc_dr_bdr(&candidates);
    }

    (dr, bdr)
}

fn calc_dr_bdr(
    candidates: &[DrCandidate],
) -> (Option<Ipv4Addr>, Option<Ipv4Addr>) {
    let key = |rtr: &&DrCandidate| (rtr.priority, rtr.net_id);

    // BDR: routers declaring themselves DR aren't eligible.
    let eligible = || {
        candidates
            .iter()
            .filter(|rtr| rtr.dr != Some(rtr.net_id))
    };
    let bdr = eligible()
        .filter(|rtr| rtr.bdr == Some(rtr.net_id))
        .max_by_key(key)
        .or_else(|| eligible().max_by_key(key))
        .map(|rtr| rtr.net_id);

    // DR: falls back to the BDR when no router declares itself DR.
    let dr = candidates
        .iter()
        .filter(|rtr| rtr.dr == Some(rtr.net_id))
        .max_by_key(key)
        .map(|rtr| rtr.net_id)
        .or(bdr);

    (dr, bdr)
}

// ===== unit tests =====
