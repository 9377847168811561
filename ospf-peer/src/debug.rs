//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::neighbor::nsm;
use crate::packet::Packet;
use crate::packet::error::LsaValidationError;
use crate::packet::lsa::LsaHdr;
use crate::peer::ism;
use crate::version::Version;

// Peer manager debug messages.
#[derive(Debug)]
pub enum Debug<'a, V: Version> {
    // Peer manager
    RouterIdChange(Ipv4Addr, Ipv4Addr),
    // Links and peers
    PeerOutCreate(&'a str, &'a str),
    PeerOutDelete(&'a str, &'a str),
    LinkStatusChange(&'a str, &'a str, bool),
    LinkLoopbackChange(&'a str, &'a str, bool),
    PeerCreate(&'a str, Ipv4Addr),
    PeerDelete(&'a str, Ipv4Addr),
    PeerStart(&'a str, Ipv4Addr),
    PeerStop(&'a str, Ipv4Addr, PeerInactiveReason),
    IsmEvent(&'a ism::State, &'a ism::Event),
    IsmTransition(&'a ism::State, &'a ism::State),
    IsmDrElection(
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
    ),
    // Neighbors
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    // Network
    PacketRx(&'a str, &'a V::NetIpAddr, &'a V::NetIpAddr, &'a Packet),
    PacketTx(&'a str, &'a V::NetIpAddr, &'a Packet),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    // Flooding
    QuestionableAck(Ipv4Addr, &'a LsaHdr),
    LsaDiscard(Ipv4Addr, &'a LsaHdr, &'a LsaValidationError),
    LsaMinArrivalDiscard(Ipv4Addr, &'a LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a LsaHdr),
    // Database maintenance
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaFlush(&'a LsaHdr),
    LsaMaxAgeRemove(&'a LsaHdr),
}

// Reason why a peer is inactive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PeerInactiveReason {
    AdminDown,
    LinkDown,
    Resetting,
}

// Reason why a SeqNoMismatch event was generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    UnexpectedDbDesc,
    InvalidLsaType,
}

// ===== impl Debug =====

impl<V> Debug<'_, V>
where
    V: Version,
{
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::RouterIdChange(old, new) => {
                // Parent span(s): ospf-peer-manager
                debug!(%old, %new, "{}", self);
            }
            Debug::PeerOutCreate(ifname, vifname)
            | Debug::PeerOutDelete(ifname, vifname) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("link", %ifname, %vifname).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::LinkStatusChange(ifname, vifname, up) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("link", %ifname, %vifname).in_scope(|| {
                    debug!(%up, "{}", self);
                })
            }
            Debug::LinkLoopbackChange(ifname, vifname, loopback) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("link", %ifname, %vifname).in_scope(|| {
                    debug!(%loopback, "{}", self);
                })
            }
            Debug::PeerCreate(ifname, area_id)
            | Debug::PeerDelete(ifname, area_id)
            | Debug::PeerStart(ifname, area_id) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("peer", %ifname, %area_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::PeerStop(ifname, area_id, reason) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("peer", %ifname, %area_id).in_scope(|| {
                    debug!(?reason, "{}", self);
                })
            }
            Debug::IsmEvent(state, event) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("fsm").in_scope(|| {
                    debug!(?state, ?event, "{}", self);
                })
            }
            Debug::IsmTransition(old_state, new_state) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("fsm").in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self);
                })
            }
            Debug::IsmDrElection(old_dr, new_dr, old_bdr, new_bdr) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("fsm").in_scope(|| {
                    debug!(?old_dr, ?new_dr, ?old_bdr, ?new_bdr, "{}", self);
                })
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NsmEvent(router_id, state, event) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::PacketRx(ifname, src, dst, packet) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("network").in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&packet)
                            .unwrap_or_default();
                        debug!(%ifname, %src, %dst, %data, "{}", self);
                    })
                })
            }
            Debug::PacketTx(ifname, dst, packet) => {
                // Parent span(s): ospf-peer-manager
                debug_span!("network").in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&packet)
                            .unwrap_or_default();
                        debug!(%ifname, %dst, %data, "{}", self);
                    })
                })
            }
            Debug::PacketRxIgnore(router_id, state) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?state, "{}", self);
                })
            }
            Debug::QuestionableAck(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaDiscard(router_id, lsa_hdr, error) => {
                // Parent span(s): ospf-peer-manager:peer
                debug_span!("neighbor", %router_id, %error).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaFlush(lsa_hdr)
            | Debug::LsaMaxAgeRemove(lsa_hdr) => {
                // Parent span(s): ospf-peer-manager
                debug!(?lsa_hdr, "{}", self);
            }
        }
    }
}

impl<V> std::fmt::Display for Debug<'_, V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::RouterIdChange(..) => {
                write!(f, "router-id changed")
            }
            Debug::PeerOutCreate(..) => {
                write!(f, "link created")
            }
            Debug::PeerOutDelete(..) => {
                write!(f, "link deleted")
            }
            Debug::LinkStatusChange(..) => {
                write!(f, "link status changed")
            }
            Debug::LinkLoopbackChange(..) => {
                write!(f, "link loopback status changed")
            }
            Debug::PeerCreate(..) => {
                write!(f, "peer created")
            }
            Debug::PeerDelete(..) => {
                write!(f, "peer deleted")
            }
            Debug::PeerStart(..) => {
                write!(f, "starting peer")
            }
            Debug::PeerStop(..) => {
                write!(f, "stopping peer")
            }
            Debug::IsmEvent(..) => {
                write!(f, "event")
            }
            Debug::IsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::IsmDrElection(..) => {
                write!(f, "DR election")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::NsmEvent(..) => {
                write!(f, "event")
            }
            Debug::NsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::PacketRx(..) | Debug::PacketTx(..) => {
                write!(f, "packet")
            }
            Debug::PacketRxIgnore(..) => {
                write!(
                    f,
                    "ignoring packet received from a non-adjacent neighbor"
                )
            }
            Debug::QuestionableAck(..) => {
                write!(f, "received questionable ack")
            }
            Debug::LsaDiscard(..) => {
                write!(f, "discarding LSA")
            }
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA due to the MinLSArrival check")
            }
            Debug::LsaSelfOriginated(..) => {
                write!(f, "received self-originated LSA")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaMaxAgeRemove(..) => {
                write!(f, "removing MaxAge LSA")
            }
        }
    }
}
