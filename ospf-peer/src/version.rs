//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use ospf_utils::ip::{AddressFamily, IpAddrKind};

use crate::area::AreaVersion;
use crate::packet::PacketVersion;
use crate::packet::lsa::LsaVersion;
use crate::peer::PeerVersion;

// OSPF version-specific code.
pub trait Version
where
    Self: 'static
        + Send
        + Sync
        + Clone
        + Default
        + Eq
        + PartialEq
        + std::fmt::Debug
        + AreaVersion<Self>
        + PacketVersion<Self>
        + LsaVersion<Self>
        + PeerVersion<Self>,
{
    // Protocol version number carried in the packet header.
    const VERSION: u8;
    const ADDRESS_FAMILY: AddressFamily;

    type NetIpAddr: IpAddrKind;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ospfv2();

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ospfv3();

// ===== impl Ospfv2 =====

impl Version for Ospfv2 {
    const VERSION: u8 = 2;
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv4;

    type NetIpAddr = Ipv4Addr;
}

// ===== impl Ospfv3 =====

impl Version for Ospfv3 {
    const VERSION: u8 = 3;
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv6;

    type NetIpAddr = Ipv6Addr;
}
