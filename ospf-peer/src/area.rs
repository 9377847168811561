//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use ospf_utils::bytes::BytesMutExt;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::lsdb::{
    BadLsReq, DatabaseHandle, LSA_INIT_SEQ_NO, LSA_MAX_AGE, LSA_MAX_SEQ_NO,
    LsaDatabase, Lsdb,
};
use crate::packet::Options;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaRef};
use crate::peer_manager::PeerId;
use crate::version::{Ospfv2, Ospfv3, Version};

// OSPF area type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    #[default]
    Normal,
    Stub,
    Nssa,
}

// Router-LSA link type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, Ord, PartialEq)]
#[derive(PartialOrd, Deserialize, Serialize)]
pub enum RouterLinkType {
    PointToPoint = 1,
    Transit = 2,
    Stub = 3,
    VirtualLink = 4,
}

// Link contributed by a peer to the Router-LSA.
//
// OSPFv2 links use the Link ID and Link Data fields, OSPFv3 links use the
// interface IDs and the neighbor's Router ID.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RouterLink {
    pub link_type: RouterLinkType,
    pub metric: u16,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub iface_id: u32,
    pub nbr_iface_id: u32,
    pub nbr_router_id: Ipv4Addr,
}

// Network-LSA originated on behalf of a peer where we're the DR.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkLsaInfo {
    pub lsa_id: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub options: Options,
    pub attached: Vec<Ipv4Addr>,
}

// Area-level services consumed by the peers of an area.
pub trait AreaRouter<V: Version>: LsaDatabase<V> {
    fn area_id(&self) -> Ipv4Addr;

    fn area_type(&self) -> AreaType;

    // Replaces the router links contributed by a peer.
    fn new_router_links(&mut self, peer_id: PeerId, links: &[RouterLink]);

    // Starts originating a Network-LSA for a peer where we became DR.
    fn generate_network_lsa(&mut self, peer_id: PeerId, info: NetworkLsaInfo);

    // Refreshes the Network-LSA after the set of adjacent routers changed.
    fn update_network_lsa(&mut self, peer_id: PeerId, info: NetworkLsaInfo);

    // Flushes the Network-LSA of a peer.
    fn withdraw_network_lsa(&mut self, peer_id: PeerId);

    fn peer_up(&mut self, peer_id: PeerId);

    fn peer_down(&mut self, peer_id: PeerId);

    // Handles the reception of a newer instance of a self-originated LSA
    // (RFC 2328 section 13.4). The received instance is already installed.
    fn receive_self_originated(&mut self, lsa: &LsaRef);

    // Updates the Router ID used for LSA origination.
    fn set_router_id(&mut self, router_id: Ipv4Addr);

    // Takes the LSAs originated since the last call, which must be flooded
    // throughout the area.
    fn take_pending_floods(&mut self) -> Vec<LsaRef>;
}

// Reference area implementation backed by an in-memory database.
#[derive(Debug)]
pub struct Area<V: Version> {
    pub area_id: Ipv4Addr,
    pub area_type: AreaType,
    pub router_id: Ipv4Addr,
    pub lsdb: Lsdb<V>,
    pub router_links: BTreeMap<PeerId, Vec<RouterLink>>,
    pub router_links_updates: usize,
    pub network_lsas: BTreeMap<PeerId, NetworkLsaInfo>,
    pub peers_up: BTreeSet<PeerId>,
    // Self-originated LSAs that reached MaxSequenceNumber. Their bodies are
    // originated again once the flushed instance leaves the database.
    pub seqno_wrapped: BTreeMap<LsaKey, Bytes>,
    pending_floods: Vec<LsaRef>,
}

// OSPF version-specific code.
pub trait AreaVersion<V: Version> {
    // Return the LSA-ID of the Router-LSA.
    fn router_lsa_id(router_id: Ipv4Addr) -> Ipv4Addr;

    // Return the options carried in the header of self-originated LSAs.
    fn lsa_hdr_options(area_type: AreaType) -> u8;

    // Encode the Router-LSA body.
    fn encode_router_lsa(
        area_type: AreaType,
        links: &[RouterLink],
        buf: &mut BytesMut,
    );

    // Encode the Network-LSA body.
    fn encode_network_lsa(info: &NetworkLsaInfo, buf: &mut BytesMut);
}

// ===== impl AreaType =====

impl AreaType {
    // Returns the options advertised in packets sent to this area.
    pub fn options(&self) -> Options {
        match self {
            AreaType::Normal => Options::E,
            AreaType::Stub => Options::empty(),
            AreaType::Nssa => Options::NP,
        }
    }
}

impl std::fmt::Display for AreaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AreaType::Normal => write!(f, "normal"),
            AreaType::Stub => write!(f, "stub"),
            AreaType::Nssa => write!(f, "nssa"),
        }
    }
}

// ===== impl RouterLink =====

impl RouterLink {
    pub fn v2(
        link_type: RouterLinkType,
        link_id: Ipv4Addr,
        link_data: Ipv4Addr,
        metric: u16,
    ) -> RouterLink {
        RouterLink {
            link_type,
            metric,
            link_id,
            link_data,
            iface_id: 0,
            nbr_iface_id: 0,
            nbr_router_id: Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn v3(
        link_type: RouterLinkType,
        iface_id: u32,
        nbr_iface_id: u32,
        nbr_router_id: Ipv4Addr,
        metric: u16,
    ) -> RouterLink {
        RouterLink {
            link_type,
            metric,
            link_id: Ipv4Addr::UNSPECIFIED,
            link_data: Ipv4Addr::UNSPECIFIED,
            iface_id,
            nbr_iface_id,
            nbr_router_id,
        }
    }
}

// ===== impl Area =====

impl<V> Area<V>
where
    V: Version,
{
    pub fn new(
        area_id: Ipv4Addr,
        area_type: AreaType,
        router_id: Ipv4Addr,
    ) -> Area<V> {
        Area {
            area_id,
            area_type,
            router_id,
            lsdb: Default::default(),
            router_links: Default::default(),
            router_links_updates: 0,
            network_lsas: Default::default(),
            peers_up: Default::default(),
            seqno_wrapped: Default::default(),
            pending_floods: Default::default(),
        }
    }

    fn router_lsa_key(&self) -> LsaKey {
        LsaKey::new(V::TYPE_ROUTER, self.router_id, V::router_lsa_id(self.router_id))
    }

    fn network_lsa_key(&self, lsa_id: Ipv4Addr) -> LsaKey {
        LsaKey::new(V::TYPE_NETWORK, self.router_id, lsa_id)
    }

    // Returns the sequence number for a new instance of a self-originated
    // LSA.
    fn next_seq_no(&self, key: &LsaKey) -> u32 {
        match self.lsdb.lookup(key) {
            Some(old) => old.hdr.seq_no.wrapping_add(1),
            None => LSA_INIT_SEQ_NO,
        }
    }

    fn originate(&mut self, key: LsaKey, body: &[u8]) {
        // The sequence number space is exhausted: flush the current instance
        // and start over from InitialSequenceNumber once it's gone
        // (RFC 2328 section 12.1.6).
        if self
            .lsdb
            .lookup(&key)
            .is_some_and(|old| old.hdr.seq_no == LSA_MAX_SEQ_NO)
        {
            self.flush(&key);
            self.seqno_wrapped.insert(key, Bytes::copy_from_slice(body));
            return;
        }

        let lsa = Lsa::new::<V>(
            0,
            V::lsa_hdr_options(self.area_type),
            key.lsa_type,
            key.lsa_id,
            key.adv_rtr,
            self.next_seq_no(&key),
            body,
        );
        Debug::<V>::LsaOriginate(&lsa.hdr).log();

        let lsa = Rc::new(lsa);
        self.lsdb.install(lsa.clone());
        self.pending_floods.push(lsa);
    }

    fn flush(&mut self, key: &LsaKey) {
        let Some(lsa) = self.lsdb.lookup(key) else {
            return;
        };
        if lsa.is_maxage() {
            return;
        }

        let mut lsa = Lsa::clone(&lsa);
        lsa.set_age(LSA_MAX_AGE);
        Debug::<V>::LsaFlush(&lsa.hdr).log();

        let lsa = Rc::new(lsa);
        self.lsdb.install(lsa.clone());
        self.pending_floods.push(lsa);
    }

    fn originate_router_lsa(&mut self) {
        let links = self
            .router_links
            .values()
            .flatten()
            .copied()
            .collect::<Vec<_>>();

        let mut buf = BytesMut::new();
        V::encode_router_lsa(self.area_type, &links, &mut buf);
        self.originate(self.router_lsa_key(), &buf);
    }

    fn originate_network_lsa(&mut self, info: &NetworkLsaInfo) {
        let mut buf = BytesMut::new();
        V::encode_network_lsa(info, &mut buf);
        self.originate(self.network_lsa_key(info.lsa_id), &buf);
    }
}

impl<V> LsaDatabase<V> for Area<V>
where
    V: Version,
{
    fn open_database(
        &mut self,
        peer_id: PeerId,
        vlink: bool,
    ) -> (DatabaseHandle, bool) {
        self.lsdb.open_database(peer_id, vlink)
    }

    fn advance(&self, handle: &DatabaseHandle) -> bool {
        self.lsdb.advance(handle)
    }

    fn get_entry(&self, handle: &mut DatabaseHandle) -> Option<(LsaRef, bool)> {
        self.lsdb.get_entry(handle)
    }

    fn close_database(&mut self, handle: DatabaseHandle) {
        self.lsdb.close_database(handle)
    }

    fn newer_lsa(&self, hdr: &LsaHdr) -> bool {
        self.lsdb.newer_lsa(hdr)
    }

    fn get_lsas(&self, requests: &[LsaKey]) -> Result<Vec<LsaRef>, BadLsReq> {
        self.lsdb.get_lsas(requests)
    }

    fn lookup(&self, key: &LsaKey) -> Option<LsaRef> {
        self.lsdb.lookup(key)
    }

    fn install(&mut self, lsa: LsaRef) -> Option<LsaRef> {
        self.lsdb.install(lsa)
    }

    fn remove(&mut self, key: &LsaKey) -> Option<LsaRef> {
        let lsa = self.lsdb.remove(key)?;
        if let Some(body) = self.seqno_wrapped.remove(key) {
            self.originate(*key, &body);
        }
        Some(lsa)
    }

    fn arrived_recently(&self, key: &LsaKey) -> bool {
        self.lsdb.arrived_recently(key)
    }

    fn lsas(&self) -> Vec<LsaRef> {
        self.lsdb.lsas()
    }
}

impl<V> AreaRouter<V> for Area<V>
where
    V: Version,
{
    fn area_id(&self) -> Ipv4Addr {
        self.area_id
    }

    fn area_type(&self) -> AreaType {
        self.area_type
    }

    fn new_router_links(&mut self, peer_id: PeerId, links: &[RouterLink]) {
        if links.is_empty() {
            self.router_links.remove(&peer_id);
        } else {
            self.router_links.insert(peer_id, links.to_vec());
        }
        self.router_links_updates += 1;
        self.originate_router_lsa();
    }

    fn generate_network_lsa(&mut self, peer_id: PeerId, info: NetworkLsaInfo) {
        self.originate_network_lsa(&info);
        self.network_lsas.insert(peer_id, info);
    }

    fn update_network_lsa(&mut self, peer_id: PeerId, info: NetworkLsaInfo) {
        // The LSA-ID may change if the interface address did.
        if let Some(old) = self.network_lsas.get(&peer_id)
            && old.lsa_id != info.lsa_id
        {
            let key = self.network_lsa_key(old.lsa_id);
            self.seqno_wrapped.remove(&key);
            self.flush(&key);
        }
        self.originate_network_lsa(&info);
        self.network_lsas.insert(peer_id, info);
    }

    fn withdraw_network_lsa(&mut self, peer_id: PeerId) {
        if let Some(info) = self.network_lsas.remove(&peer_id) {
            let key = self.network_lsa_key(info.lsa_id);
            self.seqno_wrapped.remove(&key);
            self.flush(&key);
        }
    }

    fn peer_up(&mut self, peer_id: PeerId) {
        self.peers_up.insert(peer_id);
    }

    fn peer_down(&mut self, peer_id: PeerId) {
        self.peers_up.remove(&peer_id);
        if self.router_links.remove(&peer_id).is_some() {
            self.router_links_updates += 1;
            self.originate_router_lsa();
        }
    }

    fn receive_self_originated(&mut self, lsa: &LsaRef) {
        let key = lsa.hdr.key();

        // Our own Router-LSA is always wanted, so it's reoriginated with a
        // sequence number higher than the received one.
        if key == self.router_lsa_key() {
            self.originate_router_lsa();
            return;
        }

        // Likewise for Network-LSAs of peers where we're still the DR.
        if let Some(info) = self
            .network_lsas
            .values()
            .find(|info| self.network_lsa_key(info.lsa_id) == key)
            .cloned()
        {
            self.originate_network_lsa(&info);
            return;
        }

        // Otherwise, the LSA needs to be flushed.
        self.seqno_wrapped.remove(&key);
        self.flush(&key);
    }

    fn set_router_id(&mut self, router_id: Ipv4Addr) {
        self.router_id = router_id;
        self.seqno_wrapped.clear();
    }

    fn take_pending_floods(&mut self) -> Vec<LsaRef> {
        std::mem::take(&mut self.pending_floods)
    }
}

// ===== impl Ospfv2 =====

impl AreaVersion<Self> for Ospfv2 {
    fn router_lsa_id(router_id: Ipv4Addr) -> Ipv4Addr {
        router_id
    }

    fn lsa_hdr_options(area_type: AreaType) -> u8 {
        area_type.options().bits() as u8
    }

    fn encode_router_lsa(
        _area_type: AreaType,
        links: &[RouterLink],
        buf: &mut BytesMut,
    ) {
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u16(links.len() as u16);
        for link in links {
            buf.put_ipv4(&link.link_id);
            buf.put_ipv4(&link.link_data);
            buf.put_u8(link.link_type as u8);
            // No TOS metrics.
            buf.put_u8(0);
            buf.put_u16(link.metric);
        }
    }

    fn encode_network_lsa(info: &NetworkLsaInfo, buf: &mut BytesMut) {
        buf.put_ipv4(&info.mask);
        for rtr in &info.attached {
            buf.put_ipv4(rtr);
        }
    }
}

// ===== impl Ospfv3 =====

impl AreaVersion<Self> for Ospfv3 {
    fn router_lsa_id(_router_id: Ipv4Addr) -> Ipv4Addr {
        Ipv4Addr::UNSPECIFIED
    }

    fn lsa_hdr_options(_area_type: AreaType) -> u8 {
        0
    }

    fn encode_router_lsa(
        area_type: AreaType,
        links: &[RouterLink],
        buf: &mut BytesMut,
    ) {
        let options = area_type.options() | Options::V6 | Options::R;
        buf.put_u32(options.bits() & 0x00ff_ffff);
        for link in links {
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
            buf.put_u32(link.iface_id);
            buf.put_u32(link.nbr_iface_id);
            buf.put_ipv4(&link.nbr_router_id);
        }
    }

    fn encode_network_lsa(info: &NetworkLsaInfo, buf: &mut BytesMut) {
        buf.put_u32(info.options.bits() & 0x00ff_ffff);
        for rtr in &info.attached {
            buf.put_ipv4(rtr);
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsdb::{LsaCompare, compare_lsa};
    use crate::packet::lsa::LsaVersion;

    const RID: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

    #[test]
    fn router_lsa_reorigination() {
        let mut area = Area::<Ospfv2>::new(Ipv4Addr::UNSPECIFIED, AreaType::Normal, RID);
        let links = [RouterLink::v2(
            RouterLinkType::Stub,
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            10,
        )];
        area.new_router_links(1, &links);
        let lsas = area.take_pending_floods();
        assert_eq!(lsas.len(), 1);
        assert_eq!(lsas[0].hdr.seq_no, LSA_INIT_SEQ_NO);
        assert_eq!(lsas[0].hdr.lsa_id, RID);
        assert_eq!(lsas[0].hdr.length, 20 + 4 + 12);

        // A newer copy of our own Router-LSA triggers reorigination.
        let mut received = Lsa::clone(&lsas[0]);
        received.hdr.seq_no += 5;
        let received = Rc::new(received);
        area.install(received.clone());
        area.receive_self_originated(&received);
        let lsas = area.take_pending_floods();
        assert_eq!(lsas[0].hdr.seq_no, LSA_INIT_SEQ_NO + 6);
    }

    #[test]
    fn network_lsa_flush() {
        let mut area = Area::<Ospfv2>::new(Ipv4Addr::UNSPECIFIED, AreaType::Normal, RID);
        let info = NetworkLsaInfo {
            lsa_id: Ipv4Addr::new(10, 0, 0, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            options: Options::E,
            attached: vec![RID, Ipv4Addr::new(2, 2, 2, 2)],
        };
        area.generate_network_lsa(3, info);
        let lsa = area.take_pending_floods().remove(0);
        assert_eq!(lsa.hdr.lsa_type, Ospfv2::TYPE_NETWORK);

        area.withdraw_network_lsa(3);
        let flushed = area.take_pending_floods().remove(0);
        assert!(flushed.is_maxage());
        assert_eq!(
            compare_lsa(&flushed.hdr, &lsa.hdr),
            LsaCompare::Newer
        );

        // Unwanted self-originated LSAs are flushed.
        area.receive_self_originated(&flushed);
        assert!(area.take_pending_floods().is_empty());
    }

    #[test]
    fn router_lsa_seqno_wrap() {
        let mut area = Area::<Ospfv2>::new(Ipv4Addr::UNSPECIFIED, AreaType::Normal, RID);
        let links = [RouterLink::v2(
            RouterLinkType::Stub,
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            10,
        )];
        area.new_router_links(1, &links);
        let lsa = area.take_pending_floods().remove(0);
        let key = lsa.hdr.key();

        // A copy of our Router-LSA with MaxSequenceNumber comes back.
        let mut received = Lsa::clone(&lsa);
        received.hdr.seq_no = LSA_MAX_SEQ_NO;
        let received = Rc::new(received);
        area.install(received.clone());
        area.receive_self_originated(&received);

        // The sequence number can't be incremented, so the LSA is flushed.
        let flushed = area.take_pending_floods();
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].is_maxage());
        assert_eq!(flushed[0].hdr.seq_no, LSA_MAX_SEQ_NO);
        assert!(area.seqno_wrapped.contains_key(&key));

        // Links changing in the meantime don't originate anything either.
        area.new_router_links(2, &links);
        assert!(area.take_pending_floods().is_empty());

        // Once the flushed instance is gone, the LSA starts over.
        area.remove(&key);
        let lsas = area.take_pending_floods();
        assert_eq!(lsas.len(), 1);
        assert!(!lsas[0].is_maxage());
        assert_eq!(lsas[0].hdr.seq_no, LSA_INIT_SEQ_NO);
        assert_eq!(lsas[0].hdr.length, 20 + 4 + 2 * 12);
        assert!(area.seqno_wrapped.is_empty());
        assert!(area.lookup(&key).is_some());
    }
}
