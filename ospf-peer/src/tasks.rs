//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use ospf_utils::UnboundedSender;
use ospf_utils::task::{IntervalTask, TimeoutTask};

use crate::auth::KeyTransition;
use crate::neighbor::{NeighborId, nsm};
use crate::peer_manager::PeerId;
use crate::version::Version;

//
// Peer manager tasks diagram:
//                                    +--------------+
//                     net_rx (Nx) -> |              | -> (Nx) net_tx
//                                    |              |
//             hello_interval (Nx) -> |              |
//             ism_wait_timer (Nx) -> |              |
//          delayed_ack_timer (Nx) -> |              |
//       nsm_inactivity_timer (Nx) -> | peer manager |
//          nbr_rxmt_interval (Nx) -> |              |
//         tx_pacing_interval (Nx) -> |              |
//             auth_key_timer (Nx) -> |              |
//                                    +--------------+
//
// Timers never act on protocol state directly. Each expiration is turned
// into an input message that the peer manager handles from its event loop.
//

// Peer manager inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    use crate::auth::KeyTransition;
    use crate::neighbor::{NeighborId, nsm};
    use crate::packet::PacketType;
    use crate::peer_manager::PeerId;
    use crate::version::Version;

    // Type aliases.
    pub type ProtocolInputMsg<V> = input::ProtocolMsg<V>;
    pub type ProtocolOutputMsg<V> = output::ProtocolMsg<V>;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            NetRxPacket(NetRxPacketMsg<V>),
            HelloInterval(PeerTimerMsg),
            WaitTimer(PeerTimerMsg),
            DelayedAck(PeerTimerMsg),
            NsmEvent(NsmEventMsg),
            RxmtInterval(RxmtIntervalMsg),
            TxPacing(TxPacingMsg),
            AuthKey(AuthKeyMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetRxPacketMsg<V: Version> {
            pub ifname: String,
            pub vifname: String,
            pub src: V::NetIpAddr,
            pub dst: V::NetIpAddr,
            pub data: Bytes,
        }

        #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
        pub struct PeerTimerMsg {
            pub peer_id: PeerId,
            pub area_id: Ipv4Addr,
        }

        #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub peer_id: PeerId,
            pub area_id: Ipv4Addr,
            pub nbr_id: NeighborId,
            pub event: nsm::Event,
        }

        #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub peer_id: PeerId,
            pub area_id: Ipv4Addr,
            pub nbr_id: NeighborId,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
        pub enum RxmtPacketType {
            DbDesc,
            LsUpdate,
        }

        #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
        pub struct TxPacingMsg {
            pub peer_id: PeerId,
        }

        #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
        pub struct AuthKeyMsg {
            pub peer_id: PeerId,
            pub area_id: Ipv4Addr,
            pub key_id: u8,
            pub transition: KeyTransition,
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            NetTxPacket(NetTxPacketMsg<V>),
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetTxPacketMsg<V: Version> {
            pub ifname: String,
            pub vifname: String,
            pub pkt_type: PacketType,
            pub dst: SmallVec<[V::NetIpAddr; 4]>,
            // Fully encoded packet, checksum and authentication included.
            pub data: Bytes,
        }
    }
}

// ===== peer manager tasks =====

// Send periodic Hello messages.
pub(crate) fn hello_interval<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    interval: u16,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> IntervalTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    IntervalTask::new(
        Duration::from_secs(interval.into()),
        true,
        move || {
            let protocol_input = protocol_input.clone();
            async move {
                let msg = messages::input::PeerTimerMsg { peer_id, area_id };
                let _ = protocol_input
                    .send(messages::input::ProtocolMsg::HelloInterval(msg));
            }
        },
    )
}

// Peer wait timer task.
pub(crate) fn ism_wait_timer<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    dead_interval: u32,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    TimeoutTask::new(
        Duration::from_secs(dead_interval.into()),
        move || async move {
            let msg = messages::input::PeerTimerMsg { peer_id, area_id };
            let _ = protocol_input
                .send(messages::input::ProtocolMsg::WaitTimer(msg));
        },
    )
}

// Delayed acknowledgment timer.
//
// Expires after half the hello interval so that delayed acks always leave
// before the neighbor retransmits.
pub(crate) fn delayed_ack_timer<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    hello_interval: u16,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    let timeout = Duration::from_millis(u64::from(hello_interval) * 500);
    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::PeerTimerMsg { peer_id, area_id };
        let _ =
            protocol_input.send(messages::input::ProtocolMsg::DelayedAck(msg));
    })
}

// Neighbor inactivity timer.
pub(crate) fn nsm_inactivity_timer<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    dead_interval: u32,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    TimeoutTask::new(
        Duration::from_secs(dead_interval.into()),
        move || async move {
            let msg = messages::input::NsmEventMsg {
                peer_id,
                area_id,
                nbr_id,
                event: nsm::Event::InactivityTimer,
            };
            let _ = protocol_input
                .send(messages::input::ProtocolMsg::NsmEvent(msg));
        },
    )
}

// Send periodic packet retransmissions.
pub(crate) fn nbr_rxmt_interval<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    nbr_id: NeighborId,
    packet_type: messages::input::RxmtPacketType,
    rxmt_interval: u16,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> IntervalTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    IntervalTask::new(
        Duration::from_secs(rxmt_interval.into()),
        false,
        move || {
            let protocol_input = protocol_input.clone();
            async move {
                let msg = messages::input::RxmtIntervalMsg {
                    peer_id,
                    area_id,
                    nbr_id,
                    packet_type,
                };
                let _ = protocol_input
                    .send(messages::input::ProtocolMsg::RxmtInterval(msg));
            }
        },
    )
}

// Transmit queue pacing.
pub(crate) fn tx_pacing_interval<V>(
    peer_id: PeerId,
    gap: Duration,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> IntervalTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    IntervalTask::new(gap, false, move || {
        let protocol_input = protocol_input.clone();
        async move {
            let msg = messages::input::TxPacingMsg { peer_id };
            let _ =
                protocol_input.send(messages::input::ProtocolMsg::TxPacing(msg));
        }
    })
}

// Authentication key lifetime timer.
pub(crate) fn auth_key_timer<V>(
    peer_id: PeerId,
    area_id: Ipv4Addr,
    key_id: u8,
    transition: KeyTransition,
    timeout: Duration,
    protocol_input: &UnboundedSender<messages::ProtocolInputMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    let protocol_input = protocol_input.clone();
    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::AuthKeyMsg {
            peer_id,
            area_id,
            key_id,
            transition,
        };
        let _ = protocol_input.send(messages::input::ProtocolMsg::AuthKey(msg));
    })
}
