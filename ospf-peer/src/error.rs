//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use tracing::{warn, warn_span};

use crate::auth::AuthError;
use crate::neighbor::{NeighborId, nsm};
use crate::packet::PacketType;
use crate::packet::error::DecodeError;
use crate::packet::lsa::{LsaKey, LsaType};
use crate::peer::ism;
use crate::peer_manager::PeerId;
use crate::version::Version;

// Peer manager errors.
#[derive(Debug)]
pub enum Error<V: Version> {
    // Inter-task communication
    PeerIdNotFound(PeerId),
    AreaIdNotFound(Ipv4Addr),
    NeighborIdNotFound(NeighborId),
    // Packet input
    UnknownLink(String, String),
    InvalidSrcAddr(V::NetIpAddr),
    InvalidDstAddr(V::NetIpAddr),
    PacketDecodeError(DecodeError),
    PacketAuthError(V::NetIpAddr, AuthError),
    UnknownNeighbor(V::NetIpAddr, Ipv4Addr),
    PeerCfgError(String, V::NetIpAddr, PacketType, PeerCfgError),
    DbDescReject(Ipv4Addr, nsm::State),
    LsaUnknownType(LsaType),
    BadLsReq(Ipv4Addr, LsaKey),
    // Packet output
    PacketAuthGenerateError(String, AuthError),
    // Configuration
    PeerOutExists(String, String),
    PeerOutNotFound(String, String),
    PeerExists(String, Ipv4Addr),
    PeerNotFound(String, Ipv4Addr),
    InvalidLinkAddr(String, IpAddr),
    StaticNbrNotFound(IpAddr),
    AreaTypeConflict(Ipv4Addr),
    AuthCfgError(AuthError),
    // Other
    IsmUnexpectedEvent(ism::State, ism::Event),
    NsmUnexpectedEvent(Ipv4Addr, nsm::State, nsm::Event),
}

// Peer configuration mismatches detected on received packets.
#[derive(Debug)]
pub enum PeerCfgError {
    AreaIdMismatch(Ipv4Addr),
    InstanceIdMismatch(u8, u8),
    HelloMaskMismatch(Ipv4Addr, Ipv4Addr),
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u32, u32),
    ExternalRoutingCapabilityMismatch(bool),
    MtuMismatch(u16),
    DuplicateRouterId(Ipv4Addr),
}

// ===== impl Error =====

impl<V> Error<V>
where
    V: Version,
{
    pub(crate) fn log(&self) {
        match self {
            Error::PeerIdNotFound(peer_id) => {
                warn!(%peer_id, "{}", self);
            }
            Error::AreaIdNotFound(area_id) => {
                warn!(%area_id, "{}", self);
            }
            Error::NeighborIdNotFound(nbr_id) => {
                warn!(?nbr_id, "{}", self);
            }
            Error::UnknownLink(ifname, vifname) => {
                warn!(%ifname, %vifname, "{}", self);
            }
            Error::InvalidSrcAddr(addr) | Error::InvalidDstAddr(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::PacketDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::PacketAuthError(source, error) => {
                warn!(%source, %error, "{}", self);
            }
            Error::UnknownNeighbor(source, router_id) => {
                warn!(%source, %router_id, "{}", self);
            }
            Error::PeerCfgError(ifname, source, pkt_type, error) => {
                warn_span!("peer", %ifname, %source, ?pkt_type).in_scope(
                    || {
                        error.log();
                    },
                )
            }
            Error::DbDescReject(router_id, state) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(?state, "{}", self);
                })
            }
            Error::LsaUnknownType(lsa_type) => {
                warn!(%lsa_type, "{}", self);
            }
            Error::BadLsReq(router_id, lsa_key) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(%lsa_key, "{}", self);
                })
            }
            Error::PacketAuthGenerateError(ifname, error) => {
                warn!(%ifname, %error, "{}", self);
            }
            Error::PeerOutExists(ifname, vifname)
            | Error::PeerOutNotFound(ifname, vifname) => {
                warn!(%ifname, %vifname, "{}", self);
            }
            Error::PeerExists(ifname, area_id)
            | Error::PeerNotFound(ifname, area_id) => {
                warn!(%ifname, %area_id, "{}", self);
            }
            Error::InvalidLinkAddr(ifname, address) => {
                warn!(%ifname, %address, "{}", self);
            }
            Error::StaticNbrNotFound(address) => {
                warn!(%address, "{}", self);
            }
            Error::AreaTypeConflict(area_id) => {
                warn!(%area_id, "{}", self);
            }
            Error::AuthCfgError(error) => {
                warn!(%error, "{}", self);
            }
            Error::IsmUnexpectedEvent(state, event) => {
                warn_span!("fsm").in_scope(|| {
                    warn!(?state, ?event, "{}", self);
                })
            }
            Error::NsmUnexpectedEvent(router_id, state, event) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn_span!("fsm").in_scope(|| {
                        warn!(?state, ?event, "{}", self);
                    })
                })
            }
        }
    }
}

impl<V> std::fmt::Display for Error<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PeerIdNotFound(..) => {
                write!(f, "peer ID not found")
            }
            Error::AreaIdNotFound(..) => {
                write!(f, "area ID not found")
            }
            Error::NeighborIdNotFound(..) => {
                write!(f, "neighbor ID not found")
            }
            Error::UnknownLink(..) => {
                write!(f, "packet received on unknown link")
            }
            Error::InvalidSrcAddr(..) => {
                write!(f, "invalid source address")
            }
            Error::InvalidDstAddr(..) => {
                write!(f, "invalid destination address")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::PacketAuthError(..) => {
                write!(f, "authentication failed")
            }
            Error::UnknownNeighbor(..) => {
                write!(f, "unknown neighbor")
            }
            Error::PeerCfgError(_, _, _, error) => error.fmt(f),
            Error::DbDescReject(..) => {
                write!(f, "database description packet rejected")
            }
            Error::LsaUnknownType(..) => {
                write!(f, "discarding LSA due to unknown type")
            }
            Error::BadLsReq(..) => {
                write!(f, "requested LSA not found in the database")
            }
            Error::PacketAuthGenerateError(..) => {
                write!(f, "failed to authenticate outgoing packet")
            }
            Error::PeerOutExists(..) => {
                write!(f, "link already exists")
            }
            Error::PeerOutNotFound(..) => {
                write!(f, "link not found")
            }
            Error::PeerExists(..) => {
                write!(f, "peer already exists")
            }
            Error::PeerNotFound(..) => {
                write!(f, "peer not found")
            }
            Error::InvalidLinkAddr(..) => {
                write!(f, "link address doesn't match the address family")
            }
            Error::StaticNbrNotFound(..) => {
                write!(f, "configured neighbor not found")
            }
            Error::AreaTypeConflict(..) => {
                write!(f, "conflicting area type")
            }
            Error::AuthCfgError(..) => {
                write!(f, "invalid authentication configuration")
            }
            Error::IsmUnexpectedEvent(..) => {
                write!(f, "unexpected event")
            }
            Error::NsmUnexpectedEvent(..) => {
                write!(f, "unexpected event")
            }
        }
    }
}

impl<V> std::error::Error for Error<V>
where
    V: Version,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PacketDecodeError(error) => Some(error),
            Error::PeerCfgError(_, _, _, error) => Some(error),
            Error::PacketAuthError(_, error)
            | Error::PacketAuthGenerateError(_, error)
            | Error::AuthCfgError(error) => Some(error),
            _ => None,
        }
    }
}

impl<V> From<DecodeError> for Error<V>
where
    V: Version,
{
    fn from(error: DecodeError) -> Error<V> {
        Error::PacketDecodeError(error)
    }
}

// ===== impl PeerCfgError =====

impl PeerCfgError {
    pub(crate) fn log(&self) {
        match self {
            PeerCfgError::AreaIdMismatch(area_id) => {
                warn!(%area_id, "{}", self);
            }
            PeerCfgError::InstanceIdMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            PeerCfgError::HelloMaskMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            PeerCfgError::HelloIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            PeerCfgError::DeadIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            PeerCfgError::ExternalRoutingCapabilityMismatch(e_bit) => {
                warn!(%e_bit, "{}", self);
            }
            PeerCfgError::MtuMismatch(mtu) => {
                warn!(%mtu, "{}", self);
            }
            PeerCfgError::DuplicateRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for PeerCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerCfgError::AreaIdMismatch(..) => {
                write!(f, "area ID mismatch")
            }
            PeerCfgError::InstanceIdMismatch(..) => {
                write!(f, "instance ID mismatch")
            }
            PeerCfgError::HelloMaskMismatch(..) => {
                write!(f, "network mask mismatch")
            }
            PeerCfgError::HelloIntervalMismatch(..) => {
                write!(f, "hello interval mismatch")
            }
            PeerCfgError::DeadIntervalMismatch(..) => {
                write!(f, "dead interval mismatch")
            }
            PeerCfgError::ExternalRoutingCapabilityMismatch(..) => {
                write!(f, "external routing capability mismatch")
            }
            PeerCfgError::MtuMismatch(..) => {
                write!(f, "MTU mismatch")
            }
            PeerCfgError::DuplicateRouterId(..) => {
                write!(f, "duplicate Router ID")
            }
        }
    }
}

impl std::error::Error for PeerCfgError {}
