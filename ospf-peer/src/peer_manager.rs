//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use ospf_utils::ip::IpAddrKind;
use ospf_utils::{UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc;
use tracing::{Instrument, debug_span};

use crate::area::{Area, AreaRouter, AreaType};
use crate::auth::{AuthHandler, KeyTransition};
use crate::config::{AuthCfg, Config, InstanceCfg, LinkCfg, Md5KeyCfg, PeerCfg};
use crate::debug::{Debug, PeerInactiveReason};
use crate::error::Error;
use crate::events;
use crate::flood::flood;
use crate::lsdb::LsaDatabase;
use crate::neighbor::{
    Neighbor, NeighborId, NeighborIdAllocator, NeighborInfo, nsm,
};
use crate::packet::lsa::{LsaHdr, LsaRef};
use crate::peer::{LinkType, Peer, PeerCtx, ism};
use crate::peer_out::PeerOut;
use crate::tasks;
use crate::tasks::messages::input::{
    AuthKeyMsg, NetRxPacketMsg, NsmEventMsg, PeerTimerMsg, RxmtIntervalMsg,
    TxPacingMsg,
};
use crate::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};
use crate::version::Version;

// Identifier of a PeerOut (link).
pub type PeerId = u32;

// Top-level registry of links and areas.
//
// Every input (received packet, timer expiration or configuration change) is
// processed to completion before the next one is looked at.
#[derive(Debug)]
pub struct PeerManager<V: Version> {
    pub router_id: Ipv4Addr,
    pub config: InstanceCfg,
    pub peer_outs: BTreeMap<PeerId, PeerOut<V>>,
    // (interface, vif) -> PeerId.
    pub peer_ids: BTreeMap<(String, String), PeerId>,
    pub areas: BTreeMap<Ipv4Addr, Area<V>>,
    pub nbr_ids: NeighborIdAllocator,
    pub tx: ProtocolChannelsTx<V>,
    next_peer_id: PeerId,
}

#[derive(Clone, Debug)]
pub struct ProtocolChannelsTx<V: Version> {
    pub protocol_input: UnboundedSender<ProtocolInputMsg<V>>,
    pub net_tx: UnboundedSender<ProtocolOutputMsg<V>>,
}

#[derive(Debug)]
pub struct ProtocolChannelsRx<V: Version> {
    pub protocol_input: UnboundedReceiver<ProtocolInputMsg<V>>,
}

// Mutable view over every peer, used by the code paths that need to reach
// more than one of them (flooding, for instance).
pub(crate) struct Peers<'a, V: Version> {
    pub router_id: Ipv4Addr,
    pub peer_outs: &'a mut BTreeMap<PeerId, PeerOut<V>>,
    pub areas: &'a mut BTreeMap<Ipv4Addr, Area<V>>,
    pub nbr_ids: &'a mut NeighborIdAllocator,
    pub tx: &'a ProtocolChannelsTx<V>,
}

// ===== impl PeerManager =====

impl<V> PeerManager<V>
where
    V: Version,
{
    pub fn new(
        config: InstanceCfg,
        net_tx: UnboundedSender<ProtocolOutputMsg<V>>,
    ) -> (PeerManager<V>, ProtocolChannelsRx<V>) {
        let (protocol_input_tx, protocol_input_rx) = mpsc::unbounded_channel();
        let tx = ProtocolChannelsTx {
            protocol_input: protocol_input_tx,
            net_tx,
        };
        let rx = ProtocolChannelsRx {
            protocol_input: protocol_input_rx,
        };

        let pm = PeerManager {
            router_id: config.router_id,
            config,
            peer_outs: Default::default(),
            peer_ids: Default::default(),
            areas: Default::default(),
            nbr_ids: Default::default(),
            tx,
            next_peer_id: 1,
        };
        (pm, rx)
    }

    // Instantiates every link and peer of the given configuration.
    pub fn from_config(
        config: &Config,
        net_tx: UnboundedSender<ProtocolOutputMsg<V>>,
    ) -> Result<(PeerManager<V>, ProtocolChannelsRx<V>), Error<V>> {
        let (mut pm, rx) = PeerManager::new(config.instance.clone(), net_tx);
        for link in &config.links {
            pm.peer_out_create(link)?;
        }
        Ok((pm, rx))
    }

    // Sender used to feed packets and timer expirations to the manager.
    pub fn input_tx(&self) -> UnboundedSender<ProtocolInputMsg<V>> {
        self.tx.protocol_input.clone()
    }

    // Main event loop.
    pub async fn run(mut self, mut rx: ProtocolChannelsRx<V>) {
        let span = debug_span!("ospf-peer-manager", version = V::VERSION);
        async move {
            while let Some(msg) = rx.protocol_input.recv().await {
                self.process_msg(msg);
            }
        }
        .instrument(span)
        .await
    }

    // Processes a packet received on the given link.
    pub fn receive(
        &mut self,
        ifname: &str,
        vifname: &str,
        src: V::NetIpAddr,
        dst: V::NetIpAddr,
        data: bytes::Bytes,
    ) {
        let msg = NetRxPacketMsg {
            ifname: ifname.to_owned(),
            vifname: vifname.to_owned(),
            src,
            dst,
            data,
        };
        self.process_msg(ProtocolInputMsg::<V>::NetRxPacket(msg));
    }

    // Processes a single input message, along with everything it triggers.
    pub fn process_msg(&mut self, msg: ProtocolInputMsg<V>) {
        if let Err(error) = self.process_msg_inner(msg) {
            error.log();
        }
        self.run_pending();
    }

    fn process_msg_inner(
        &mut self,
        msg: ProtocolInputMsg<V>,
    ) -> Result<(), Error<V>> {
        use crate::tasks::messages::input::ProtocolMsg;

        match msg {
            ProtocolMsg::NetRxPacket(msg) => {
                let key = (msg.ifname.clone(), msg.vifname.clone());
                let Some(peer_id) = self.peer_ids.get(&key).copied() else {
                    return Err(Error::UnknownLink(msg.ifname, msg.vifname));
                };
                events::process_packet(
                    &mut self.peers(),
                    peer_id,
                    msg.src,
                    msg.dst,
                    &msg.data,
                )
            }
            ProtocolMsg::HelloInterval(PeerTimerMsg { peer_id, area_id }) => {
                self.peers().with_peer(peer_id, area_id, |peer, ctx| {
                    peer.send_hellos(ctx);
                })
            }
            ProtocolMsg::WaitTimer(PeerTimerMsg { peer_id, area_id }) => {
                self.peers().with_peer(peer_id, area_id, |peer, ctx| {
                    peer.fsm(ctx, ism::Event::WaitTimer);
                })
            }
            ProtocolMsg::DelayedAck(PeerTimerMsg { peer_id, area_id }) => {
                self.peers().with_peer(peer_id, area_id, |peer, ctx| {
                    peer.delayed_ack_flush(ctx);
                })
            }
            ProtocolMsg::NsmEvent(NsmEventMsg {
                peer_id,
                area_id,
                nbr_id,
                event,
            }) => events::process_nsm_event(
                &mut self.peers(),
                peer_id,
                area_id,
                nbr_id,
                event,
            ),
            ProtocolMsg::RxmtInterval(RxmtIntervalMsg {
                peer_id,
                area_id,
                nbr_id,
                packet_type,
            }) => events::process_rxmt_interval(
                &mut self.peers(),
                peer_id,
                area_id,
                nbr_id,
                packet_type,
            ),
            ProtocolMsg::TxPacing(TxPacingMsg { peer_id }) => {
                let peer_out = self
                    .peer_outs
                    .get_mut(&peer_id)
                    .ok_or(Error::PeerIdNotFound(peer_id))?;
                peer_out.txq.pacing_tick(&self.tx);
                Ok(())
            }
            ProtocolMsg::AuthKey(AuthKeyMsg {
                peer_id,
                area_id,
                key_id,
                transition,
            }) => self.peers().with_peer(peer_id, area_id, |peer, _| {
                peer.state.auth.key_transition(key_id, transition);
            }),
        }
    }

    // Runs the work left behind by the last input: deferred peer events,
    // flooding of newly originated LSAs and transmission of queued LSAs.
    fn run_pending(&mut self) {
        let mut peers = self.peers();

        // Deferred events may originate LSAs, and flooding may complete
        // database exchanges, so iterate until nothing is left. Removing
        // MaxAge LSAs may also originate new instances when a sequence number
        // wrap completes.
        loop {
            peers.for_each(|_, peer, ctx| peer.run_deferred(ctx));

            let originated = peers
                .areas
                .values_mut()
                .flat_map(|area| {
                    let area_id = area.area_id;
                    area.take_pending_floods()
                        .into_iter()
                        .map(move |lsa| (area_id, lsa))
                })
                .collect::<Vec<_>>();
            if originated.is_empty() {
                if peers.maxage_sweep() {
                    continue;
                }
                break;
            }
            for (area_id, lsa) in originated {
                flood(&mut peers, area_id, &lsa, None);
            }
        }

        peers.for_each(|_, peer, ctx| peer.push_lsas(ctx));
    }

    fn peers(&mut self) -> Peers<'_, V> {
        Peers {
            router_id: self.router_id,
            peer_outs: &mut self.peer_outs,
            areas: &mut self.areas,
            nbr_ids: &mut self.nbr_ids,
            tx: &self.tx,
        }
    }

    // ===== links =====

    pub fn peer_out_create(&mut self, cfg: &LinkCfg) -> Result<PeerId, Error<V>> {
        let key = (cfg.ifname.clone(), cfg.vifname.clone());
        if self.peer_ids.contains_key(&key) {
            return Err(Error::PeerOutExists(key.0, key.1));
        }

        let peer_id = self.next_peer_id;
        let gap = Duration::from_millis(self.config.transmit_gap_ms);
        let peer_out =
            PeerOut::new(peer_id, cfg, gap, self.config.debug_packets)
                .ok_or_else(|| {
                    Error::InvalidLinkAddr(cfg.ifname.clone(), cfg.addr)
                })?;
        self.next_peer_id += 1;
        self.peer_outs.insert(peer_id, peer_out);
        self.peer_ids.insert(key, peer_id);

        for peer_cfg in &cfg.peers {
            self.peer_create(peer_id, peer_cfg.clone())?;
        }

        Ok(peer_id)
    }

    pub fn peer_out_delete(
        &mut self,
        ifname: &str,
        vifname: &str,
    ) -> Result<(), Error<V>> {
        let peer_id = self.peer_id(ifname, vifname)?;
        let area_ids = self
            .peer_outs
            .get(&peer_id)
            .map(|peer_out| peer_out.peers.keys().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for area_id in area_ids {
            self.peer_delete(peer_id, area_id)?;
        }

        self.peer_outs.remove(&peer_id);
        self.peer_ids.remove(&(ifname.to_owned(), vifname.to_owned()));
        Ok(())
    }

    pub fn peer_id(&self, ifname: &str, vifname: &str) -> Result<PeerId, Error<V>> {
        self.peer_ids
            .get(&(ifname.to_owned(), vifname.to_owned()))
            .copied()
            .ok_or_else(|| {
                Error::PeerOutNotFound(ifname.to_owned(), vifname.to_owned())
            })
    }

    pub fn get_peer_out(&self, peer_id: PeerId) -> Option<&PeerOut<V>> {
        self.peer_outs.get(&peer_id)
    }

    // Administratively enables or disables a link.
    pub fn set_enabled(
        &mut self,
        peer_id: PeerId,
        enabled: bool,
    ) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        peer_out.enabled = enabled;
        peer_out.update_status(
            &mut self.areas,
            &self.tx,
            &mut self.nbr_ids,
            self.router_id,
            PeerInactiveReason::AdminDown,
        );
        self.run_pending();
        Ok(())
    }

    // Handles an operational status change reported by the link layer.
    pub fn set_link_status(
        &mut self,
        peer_id: PeerId,
        up: bool,
    ) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        Debug::<V>::LinkStatusChange(
            &peer_out.link.ifname,
            &peer_out.link.vifname,
            up,
        )
        .log();
        peer_out.link_status = up;
        peer_out.update_status(
            &mut self.areas,
            &self.tx,
            &mut self.nbr_ids,
            self.router_id,
            PeerInactiveReason::LinkDown,
        );
        self.run_pending();
        Ok(())
    }

    // Puts a link in or out of the loopback state. A looped back link keeps
    // advertising a host route to its address but drops every packet it
    // receives.
    pub fn set_loopback(
        &mut self,
        peer_id: PeerId,
        loopback: bool,
    ) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        if peer_out.link.loopback == loopback {
            return Ok(());
        }
        Debug::<V>::LinkLoopbackChange(
            &peer_out.link.ifname,
            &peer_out.link.vifname,
            loopback,
        )
        .log();
        peer_out.link.loopback = loopback;
        let active = peer_out.is_active();

        self.peers().for_peer_out(peer_id, |peer, ctx| {
            if loopback {
                peer.fsm(ctx, ism::Event::LoopInd);
            } else if peer.state.ism_state == ism::State::Loopback {
                peer.fsm(ctx, ism::Event::UnloopInd);
                if active {
                    peer.start(ctx);
                }
            }
        });
        self.run_pending();
        Ok(())
    }

    pub fn set_cost(&mut self, peer_id: PeerId, cost: u16) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        peer_out.link.cost = cost;

        self.peers().for_peer_out(peer_id, |peer, ctx| {
            peer.update_router_links(ctx);
        });
        self.run_pending();
        Ok(())
    }

    pub fn set_mtu(&mut self, peer_id: PeerId, mtu: u16) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        peer_out.link.mtu = mtu;
        Ok(())
    }

    // Changes the address of a link. Its peers are restarted.
    pub fn set_address(
        &mut self,
        peer_id: PeerId,
        addr: IpAddr,
        prefixlen: u8,
    ) -> Result<(), Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        let Some(net_addr) = V::NetIpAddr::get(addr) else {
            return Err(Error::InvalidLinkAddr(peer_out.link.ifname.clone(), addr));
        };
        peer_out.link.addr = net_addr;
        peer_out.link.prefixlen = prefixlen;

        self.peer_out_restart(peer_id);
        self.run_pending();
        Ok(())
    }

    // ===== peers =====

    // Attaches a link to an area.
    pub fn peer_create(
        &mut self,
        peer_id: PeerId,
        cfg: PeerCfg,
    ) -> Result<(), Error<V>> {
        let area_id = cfg.area_id;
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        let ifname = peer_out.link.ifname.clone();

        // OSPFv2 links belong to a single area.
        if peer_out.peers.contains_key(&area_id)
            || (V::VERSION == 2 && !peer_out.peers.is_empty())
        {
            return Err(Error::PeerExists(ifname, area_id));
        }

        match self.areas.get(&area_id) {
            Some(area) if area.area_type != cfg.area_type => {
                return Err(Error::AreaTypeConflict(area_id));
            }
            Some(_) => (),
            None => {
                let area = Area::new(area_id, cfg.area_type, self.router_id);
                self.areas.insert(area_id, area);
            }
        }

        let static_nbrs = cfg
            .static_nbrs
            .iter()
            .map(|nbr| {
                V::NetIpAddr::get(nbr.addr)
                    .map(|addr| (addr, nbr.priority))
                    .ok_or_else(|| Error::InvalidLinkAddr(ifname.clone(), nbr.addr))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut peer = Peer::new(peer_id, cfg.area_type, cfg);
        auth_apply(&mut peer, &self.tx)?;
        Debug::<V>::PeerCreate(&ifname, area_id).log();
        peer_out.peers.insert(area_id, peer);
        let active = peer_out.is_active();

        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            for (addr, priority) in static_nbrs {
                peer.static_nbr_add(ctx, addr, priority);
            }
            if active {
                peer.start(ctx);
            }
        })?;
        self.run_pending();
        Ok(())
    }

    // Detaches a link from an area.
    pub fn peer_delete(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            peer.stop(ctx, PeerInactiveReason::AdminDown);
        })?;
        self.run_pending();

        if let Some(peer_out) = self.peer_outs.get_mut(&peer_id)
            && peer_out.peers.remove(&area_id).is_some()
        {
            Debug::<V>::PeerDelete(&peer_out.link.ifname, area_id).log();
        }

        // Remove the area once no link is attached to it anymore.
        if !self
            .peer_outs
            .values()
            .any(|peer_out| peer_out.peers.contains_key(&area_id))
        {
            self.areas.remove(&area_id);
        }
        Ok(())
    }

    // Moves a peer to another area, keeping its configuration.
    pub fn peer_change_area(
        &mut self,
        peer_id: PeerId,
        old_area_id: Ipv4Addr,
        new_area_id: Ipv4Addr,
    ) -> Result<(), Error<V>> {
        let mut cfg = self.peer_cfg(peer_id, old_area_id)?;
        cfg.area_id = new_area_id;
        self.peer_delete(peer_id, old_area_id)?;
        self.peer_create(peer_id, cfg)
    }

    pub fn area_type_change(
        &mut self,
        area_id: Ipv4Addr,
        area_type: AreaType,
    ) -> Result<(), Error<V>> {
        let area = self
            .areas
            .get_mut(&area_id)
            .ok_or(Error::AreaIdNotFound(area_id))?;
        area.area_type = area_type;

        let peer_ids = self.area_peer_ids(area_id);
        for peer_id in peer_ids {
            if let Some(peer) = self
                .peer_outs
                .get_mut(&peer_id)
                .and_then(|peer_out| peer_out.peers.get_mut(&area_id))
            {
                peer.area_type = area_type;
                peer.config.area_type = area_type;
            }
            // The advertised options change.
            self.peer_restart(peer_id, area_id);
        }
        self.run_pending();
        Ok(())
    }

    pub fn set_hello_interval(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        hello_interval: u16,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            peer.config.hello_interval = hello_interval;
            if !peer.is_down() {
                peer.hello_interval_start(ctx);
            }
        })
    }

    pub fn set_dead_interval(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        dead_interval: u32,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, _| {
            peer.config.dead_interval = dead_interval;
        })
    }

    pub fn set_rxmt_interval(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        rxmt_interval: u16,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, _| {
            peer.config.rxmt_interval = rxmt_interval;
        })
    }

    pub fn set_priority(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        priority: u8,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            peer.config.priority = priority;
            if ctx.link.link_type.is_broadcast_or_nbma() && !peer.is_down() {
                peer.state.deferred.insert(ism::Event::NbrChange);
            }
        })?;
        self.run_pending();
        Ok(())
    }

    pub fn set_passive(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        passive: bool,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, _| {
            peer.config.passive = passive;
        })?;
        self.peer_restart(peer_id, area_id);
        self.run_pending();
        Ok(())
    }

    pub fn static_nbr_add(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        addr: IpAddr,
        priority: u8,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            let Some(net_addr) = V::NetIpAddr::get(addr) else {
                return Err(Error::InvalidLinkAddr(ctx.link.ifname.clone(), addr));
            };
            peer.static_nbr_add(ctx, net_addr, priority);
            Ok(())
        })??;
        self.run_pending();
        Ok(())
    }

    pub fn static_nbr_remove(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        addr: IpAddr,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            let removed = V::NetIpAddr::get(addr)
                .is_some_and(|addr| peer.static_nbr_remove(ctx, addr));
            if removed {
                Ok(())
            } else {
                Err(Error::StaticNbrNotFound(addr))
            }
        })??;
        self.run_pending();
        Ok(())
    }

    // ===== authentication =====

    pub fn auth_set(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        auth: AuthCfg,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            peer.config.auth = auth;
            auth_apply(peer, ctx.tx)
        })?
    }

    pub fn auth_set_simple_key(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        password: &str,
    ) -> Result<(), Error<V>> {
        self.auth_set(
            peer_id,
            area_id,
            AuthCfg::Simple {
                password: password.to_owned(),
            },
        )
    }

    pub fn auth_delete_simple_key(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, _| {
            peer.config.auth = AuthCfg::None;
            peer.state.auth.delete_simple_key();
        })
    }

    pub fn auth_add_md5_key(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        key: Md5KeyCfg,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            md5_key_add(peer, &key, ctx.tx)?;
            match &mut peer.config.auth {
                AuthCfg::Md5 { keys } => {
                    keys.retain(|old| old.key_id != key.key_id);
                    keys.push(key);
                }
                auth => *auth = AuthCfg::Md5 { keys: vec![key] },
            }
            Ok(())
        })?
    }

    pub fn auth_remove_md5_key(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        key_id: u8,
    ) -> Result<(), Error<V>> {
        self.peers().with_peer(peer_id, area_id, |peer, _| {
            peer.state
                .auth
                .remove_md5_key(key_id)
                .map_err(Error::AuthCfgError)?;
            if let AuthCfg::Md5 { keys } = &mut peer.config.auth {
                keys.retain(|key| key.key_id != key_id);
                if keys.is_empty() {
                    peer.config.auth = AuthCfg::None;
                }
            }
            Ok(())
        })?
    }

    // ===== instance =====

    // Changes the Router ID. Every peer is restarted.
    pub fn set_router_id(&mut self, router_id: Ipv4Addr) {
        if router_id == self.router_id {
            return;
        }
        Debug::<V>::RouterIdChange(self.router_id, router_id).log();

        let peers = self
            .peer_outs
            .iter()
            .flat_map(|(peer_id, peer_out)| {
                peer_out.peers.keys().map(move |area_id| (*peer_id, *area_id))
            })
            .collect::<Vec<_>>();
        for (peer_id, area_id) in &peers {
            if let Err(error) =
                self.peers().with_peer(*peer_id, *area_id, |peer, ctx| {
                    peer.stop(ctx, PeerInactiveReason::Resetting);
                })
            {
                error.log();
            }
        }
        self.run_pending();

        self.router_id = router_id;
        self.config.router_id = router_id;
        for area in self.areas.values_mut() {
            area.set_router_id(router_id);
        }
        for (peer_id, area_id) in &peers {
            let active = self
                .peer_outs
                .get(peer_id)
                .is_some_and(|peer_out| peer_out.is_active());
            if active {
                if let Err(error) =
                    self.peers().with_peer(*peer_id, *area_id, |peer, ctx| {
                        peer.start(ctx);
                    })
                {
                    error.log();
                }
            }
        }
        self.run_pending();
    }

    // ===== queries =====

    pub fn get_peer(&self, peer_id: PeerId, area_id: Ipv4Addr) -> Option<&Peer<V>> {
        self.peer_outs.get(&peer_id)?.peers.get(&area_id)
    }

    pub fn get_neighbor_list(&self) -> Vec<NeighborInfo> {
        self.peer_outs
            .iter()
            .flat_map(|(peer_id, peer_out)| {
                peer_out.peers.values().flat_map(move |peer| {
                    peer.neighbors
                        .iter()
                        .map(move |nbr| nbr.info(*peer_id, peer.area_id))
                })
            })
            .collect()
    }

    pub fn get_neighbor_info(
        &self,
        nbr_id: NeighborId,
    ) -> Result<NeighborInfo, Error<V>> {
        self.get_neighbor_list()
            .into_iter()
            .find(|info| info.nbr_id == nbr_id)
            .ok_or(Error::NeighborIdNotFound(nbr_id))
    }

    // Returns the routers fully adjacent on the given peer.
    pub fn get_attached_routers(
        &self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
    ) -> Result<Vec<Ipv4Addr>, Error<V>> {
        let peer = self
            .get_peer(peer_id, area_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        Ok(peer
            .neighbors
            .iter()
            .filter(|nbr| nbr.state == nsm::State::Full)
            .map(|nbr| nbr.router_id)
            .collect())
    }

    // Returns whether any neighbor of the area is synchronizing its
    // database.
    pub fn neighbours_exchange_or_loading(&self, area_id: Ipv4Addr) -> bool {
        self.area_neighbors(area_id).any(|nbr| {
            matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
        })
    }

    // Returns whether the given router is at least in the TwoWay state on
    // some link of the area.
    pub fn neighbour_at_least_two_way(
        &self,
        area_id: Ipv4Addr,
        router_id: Ipv4Addr,
    ) -> bool {
        self.area_neighbors(area_id)
            .any(|nbr| nbr.router_id == router_id && nbr.state >= nsm::State::TwoWay)
    }

    // Returns whether an LSA is still expected from the given neighbor.
    pub fn on_link_state_request_list(
        &self,
        nbr_id: NeighborId,
        lsa_hdr: &LsaHdr,
    ) -> Result<bool, Error<V>> {
        self.peer_outs
            .values()
            .flat_map(|peer_out| peer_out.peers.values())
            .flat_map(|peer| peer.neighbors.iter())
            .find(|nbr| nbr.id == nbr_id)
            .map(|nbr| nbr.lists.ls_request.contains_key(&lsa_hdr.key()))
            .ok_or(Error::NeighborIdNotFound(nbr_id))
    }

    // Returns the local and remote addresses to be used by a virtual link
    // to the given router through a transit area.
    pub fn virtual_link_endpoint(
        &self,
        transit_area_id: Ipv4Addr,
        router_id: Ipv4Addr,
    ) -> Option<(V::NetIpAddr, V::NetIpAddr)> {
        self.peer_outs
            .values()
            .filter(|peer_out| peer_out.link.link_type != LinkType::VirtualLink)
            .find_map(|peer_out| {
                let peer = peer_out.peers.get(&transit_area_id)?;
                peer.neighbors
                    .iter()
                    .find(|nbr| {
                        nbr.router_id == router_id
                            && nbr.state == nsm::State::Full
                    })
                    .map(|nbr| (peer_out.link.addr, nbr.src))
            })
    }

    // ===== helper methods =====

    fn peer_cfg(
        &self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
    ) -> Result<PeerCfg, Error<V>> {
        let peer_out = self
            .peer_outs
            .get(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        peer_out
            .peers
            .get(&area_id)
            .map(|peer| peer.config.clone())
            .ok_or_else(|| {
                Error::PeerNotFound(peer_out.link.ifname.clone(), area_id)
            })
    }

    fn area_peer_ids(&self, area_id: Ipv4Addr) -> Vec<PeerId> {
        self.peer_outs
            .iter()
            .filter(|(_, peer_out)| peer_out.peers.contains_key(&area_id))
            .map(|(peer_id, _)| *peer_id)
            .collect()
    }

    fn area_neighbors(
        &self,
        area_id: Ipv4Addr,
    ) -> impl Iterator<Item = &Neighbor<V>> + '_ {
        self.peer_outs
            .values()
            .filter_map(move |peer_out| peer_out.peers.get(&area_id))
            .flat_map(|peer| peer.neighbors.iter())
    }

    // Stops and starts again a running peer.
    fn peer_restart(&mut self, peer_id: PeerId, area_id: Ipv4Addr) {
        let active = self
            .peer_outs
            .get(&peer_id)
            .is_some_and(|peer_out| peer_out.is_active());
        if let Err(error) = self.peers().with_peer(peer_id, area_id, |peer, ctx| {
            peer.stop(ctx, PeerInactiveReason::Resetting);
            if active {
                peer.start(ctx);
            }
        }) {
            error.log();
        }
    }

    fn peer_out_restart(&mut self, peer_id: PeerId) {
        let area_ids = self
            .peer_outs
            .get(&peer_id)
            .map(|peer_out| peer_out.peers.keys().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for area_id in area_ids {
            self.peer_restart(peer_id, area_id);
        }
    }
}

// ===== impl Peers =====

impl<V> Peers<'_, V>
where
    V: Version,
{
    // Runs the given closure on every running peer.
    pub(crate) fn for_each(
        &mut self,
        mut f: impl FnMut(PeerId, &mut Peer<V>, &mut PeerCtx<'_, V>),
    ) {
        for (peer_id, peer_out) in self.peer_outs.iter_mut() {
            let PeerOut {
                link, peers, txq, ..
            } = peer_out;
            for peer in peers.values_mut() {
                if peer.is_down() {
                    continue;
                }
                let Some(area) = self.areas.get_mut(&peer.area_id) else {
                    continue;
                };
                let mut ctx = PeerCtx {
                    router_id: self.router_id,
                    link,
                    txq,
                    area,
                    tx: self.tx,
                    nbr_ids: &mut *self.nbr_ids,
                };
                f(*peer_id, peer, &mut ctx);
            }
        }
    }

    // Runs the given closure on every peer of a link.
    pub(crate) fn for_peer_out(
        &mut self,
        peer_id: PeerId,
        mut f: impl FnMut(&mut Peer<V>, &mut PeerCtx<'_, V>),
    ) {
        self.for_each(|id, peer, ctx| {
            if id == peer_id {
                f(peer, ctx);
            }
        });
    }

    // Runs the given closure on a single peer.
    pub(crate) fn with_peer<R>(
        &mut self,
        peer_id: PeerId,
        area_id: Ipv4Addr,
        f: impl FnOnce(&mut Peer<V>, &mut PeerCtx<'_, V>) -> R,
    ) -> Result<R, Error<V>> {
        let peer_out = self
            .peer_outs
            .get_mut(&peer_id)
            .ok_or(Error::PeerIdNotFound(peer_id))?;
        let PeerOut {
            link, peers, txq, ..
        } = peer_out;
        let peer = peers
            .get_mut(&area_id)
            .ok_or_else(|| Error::PeerNotFound(link.ifname.clone(), area_id))?;
        let area = self
            .areas
            .get_mut(&area_id)
            .ok_or(Error::AreaIdNotFound(area_id))?;

        let mut ctx = PeerCtx {
            router_id: self.router_id,
            link,
            txq,
            area,
            tx: self.tx,
            nbr_ids: &mut *self.nbr_ids,
        };
        Ok(f(peer, &mut ctx))
    }

    // Returns whether any neighbor of the area is in the Exchange or Loading
    // state.
    pub(crate) fn area_nbrs_exchanging(&self, area_id: Ipv4Addr) -> bool {
        self.peer_outs
            .values()
            .filter_map(|peer_out| peer_out.peers.get(&area_id))
            .flat_map(|peer| peer.neighbors.iter())
            .any(|nbr| {
                matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
            })
    }

    // Removes the MaxAge LSAs that are no longer waiting for any
    // acknowledgment (RFC 2328 section 14).
    //
    // Returns whether any LSA was removed.
    fn maxage_sweep(&mut self) -> bool {
        let exchanging = self
            .areas
            .keys()
            .copied()
            .filter(|area_id| self.area_nbrs_exchanging(*area_id))
            .collect::<BTreeSet<_>>();

        let mut removed = false;
        for (area_id, area) in self.areas.iter_mut() {
            if exchanging.contains(area_id) {
                continue;
            }
            let expired = area
                .lsas()
                .into_iter()
                .filter(|lsa| lsa.is_maxage() && lsa.pending_acks_empty())
                .collect::<Vec<LsaRef>>();
            for lsa in expired {
                Debug::<V>::LsaMaxAgeRemove(&lsa.hdr).log();
                area.remove(&lsa.hdr.key());
                removed = true;
            }
        }
        removed
    }
}

// ===== helper functions =====

// Sets up the authentication handler of a peer from its configuration.
fn auth_apply<V>(
    peer: &mut Peer<V>,
    tx: &ProtocolChannelsTx<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    peer.state.auth = AuthHandler::Null;
    match peer.config.auth.clone() {
        AuthCfg::None => Ok(()),
        AuthCfg::Simple { password } => peer
            .state
            .auth
            .set_simple_key(&password)
            .map_err(Error::AuthCfgError),
        AuthCfg::Md5 { keys } => {
            for key in &keys {
                md5_key_add(peer, key, tx)?;
            }
            Ok(())
        }
    }
}

fn md5_key_add<V>(
    peer: &mut Peer<V>,
    key: &Md5KeyCfg,
    tx: &ProtocolChannelsTx<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let (peer_id, area_id) = (peer.peer_id, peer.area_id);
    let timer = |key_id: u8, transition: KeyTransition, timeout: Duration| {
        tasks::auth_key_timer(
            peer_id,
            area_id,
            key_id,
            transition,
            timeout,
            &tx.protocol_input,
        )
    };
    peer.state
        .auth
        .add_md5_key(
            key.key_id,
            &key.password,
            key.start,
            key.end,
            key.max_time_drift,
            &timer,
        )
        .map_err(Error::AuthCfgError)
}
