//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod lsa;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use ospf_utils::ip::IpAddrKind;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthHandler};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};
use crate::version::{Ospfv2, Ospfv3, Version};

// OSPF Options field.
//
// The OSPFv2 Options field is 8 bits long while the OSPFv3 one is 24 bits
// long. Both are represented using the same set of flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u32 {
        const V6 = 0x01;
        const E = 0x02;
        const MC = 0x04;
        const NP = 0x08;
        const R = 0x10;
        const DC = 0x20;
        const O = 0x40;
    }
}

// Database Description flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// OSPF Packet Type.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-3
#[derive(Clone, Copy, Debug, Eq, Hash, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    DbDesc = 0x02,
    LsRequest = 0x03,
    LsUpdate = 0x04,
    LsAck = 0x05,
}

// OSPFv2 authentication type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthType {
    Null = 0x00,
    Simple = 0x01,
    Cryptographic = 0x02,
}

// OSPF packet header.
//
// The OSPFv2 authentication fields aren't decoded here. Authentication is
// verified against the raw packet by the receiving peer.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    // OSPFv3 only.
    pub instance_id: u8,
}

//
// OSPF Hello packet.
//
// OSPFv2 encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Network Mask                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         HelloInterval         |    Options    |    Rtr Pri    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     RouterDeadInterval                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      Designated Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Backup Designated Router                    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Neighbor                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
// OSPFv3 encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Interface ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Rtr Priority  |             Options                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        HelloInterval          |       RouterDeadInterval      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Designated Router ID                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                Backup Designated Router ID                    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Neighbor ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        ...                                    |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    // OSPFv2 only.
    pub network_mask: Ipv4Addr,
    // OSPFv3 only.
    pub iface_id: u32,
    pub hello_interval: u16,
    pub options: Options,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

//
// OSPF Database Description packet.
//
// OSPFv2 encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Interface MTU         |    Options    |0|0|0|0|0|I|M|MS
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     DD sequence number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        LSA Headers...                         |
//
// OSPFv3 encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       0       |               Options                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        Interface MTU          |       0       |0|0|0|0|0|I|M|MS
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    DD sequence number                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        LSA Headers...                         |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

//
// OSPF Link State Request packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          LS type                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Link State ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Advertising Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

//
// OSPF Link State Update packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                            # LSAs                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                             LSAs                              |
// |                              ...                              |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

//
// OSPF Link State Acknowledgment packet.
//
// Encoding format (packet body): a list of LSA headers.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// OSPF packet.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

// OSPF version-specific code.
pub trait PacketVersion<V: Version> {
    // Packet header length.
    const HDR_LENGTH: u16;
    // Length of the IP header (plus Router Alert option where used) that
    // precedes every OSPF packet.
    const IP_HDR_LENGTH: u16;
    // Fixed part of the Hello and Database Description bodies.
    const HELLO_BASE_LENGTH: u16;
    const DBDESC_BASE_LENGTH: u16;

    // Decode OSPF packet header from a bytes buffer.
    fn decode_hdr(buf: &mut Bytes) -> DecodeResult<(PacketHdr, u16)>;

    // Encode OSPF packet header into a bytes buffer.
    fn encode_hdr(hdr: &PacketHdr, buf: &mut BytesMut);

    fn decode_hello(hdr: PacketHdr, buf: &mut Bytes) -> Hello;

    fn encode_hello(hello: &Hello, buf: &mut BytesMut);

    fn decode_dbdesc_fixed(buf: &mut Bytes) -> (u16, Options, DbDescFlags);

    fn encode_dbdesc_fixed(dbdesc: &DbDesc, buf: &mut BytesMut);

    // Authenticate an outbound packet.
    fn auth_generate(
        auth: &mut AuthHandler,
        buf: &mut BytesMut,
    ) -> Result<(), AuthError>;

    // Verify the authentication of an inbound packet.
    fn auth_verify(
        auth: &mut AuthHandler,
        data: &[u8],
        src: IpAddr,
        new_peer: bool,
    ) -> Result<(), AuthError>;
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub fn new(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        instance_id: u8,
    ) -> PacketHdr {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
            instance_id,
        }
    }
}

// ===== impl DbDesc =====

impl DbDesc {
    // Returns whether the other packet is a duplicate of this one, as defined
    // by the fields compared when detecting retransmissions.
    pub fn is_duplicate(&self, other: &DbDesc) -> bool {
        self.options == other.options
            && self.dd_flags == other.dd_flags
            && self.dd_seq_no == other.dd_seq_no
    }
}

// ===== impl Packet =====

impl Packet {
    // Decodes OSPF packet from a bytes buffer.
    //
    // Checksum and authentication are not verified here.
    pub fn decode<V>(data: &[u8]) -> DecodeResult<Packet>
    where
        V: Version,
    {
        let mut buf = Bytes::copy_from_slice(data);
        if buf.remaining() < V::HDR_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        // Decode the packet header.
        let (hdr, pkt_len) = V::decode_hdr(&mut buf)?;
        if (pkt_len as usize) > data.len() {
            return Err(DecodeError::InvalidLength(pkt_len));
        }
        let mut buf = buf.slice(..(pkt_len - V::HDR_LENGTH) as usize);

        // Decode the packet body.
        let packet = match hdr.pkt_type {
            PacketType::Hello => {
                if buf.remaining() < V::HELLO_BASE_LENGTH as usize {
                    return Err(DecodeError::InvalidLength(pkt_len));
                }
                Packet::Hello(V::decode_hello(hdr, &mut buf))
            }
            PacketType::DbDesc => {
                if buf.remaining() < V::DBDESC_BASE_LENGTH as usize {
                    return Err(DecodeError::InvalidLength(pkt_len));
                }
                let (mtu, options, dd_flags) = V::decode_dbdesc_fixed(&mut buf);
                let dd_seq_no = buf.get_u32();
                let lsa_hdrs = decode_lsa_hdrs::<V>(&mut buf);
                Packet::DbDesc(DbDesc {
                    hdr,
                    mtu,
                    options,
                    dd_flags,
                    dd_seq_no,
                    lsa_hdrs,
                })
            }
            PacketType::LsRequest => {
                let mut entries = vec![];
                let entries_cnt = buf.remaining() / 12;
                for _ in 0..entries_cnt {
                    let lsa_type = LsaType(buf.get_u32() as u16);
                    let lsa_id = buf.get_ipv4();
                    let adv_rtr = buf.get_ipv4();
                    entries.push(LsaKey::new(lsa_type, adv_rtr, lsa_id));
                }
                Packet::LsRequest(LsRequest { hdr, entries })
            }
            PacketType::LsUpdate => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::InvalidLength(pkt_len));
                }
                let lsas_cnt = buf.get_u32();
                let mut lsas = vec![];
                for _ in 0..lsas_cnt {
                    let lsa = Lsa::decode::<V>(&mut buf)?;
                    lsas.push(lsa);
                }
                Packet::LsUpdate(LsUpdate { hdr, lsas })
            }
            PacketType::LsAck => {
                let lsa_hdrs = decode_lsa_hdrs::<V>(&mut buf);
                Packet::LsAck(LsAck { hdr, lsa_hdrs })
            }
        };

        Ok(packet)
    }

    // Encodes OSPF packet into a bytes buffer.
    //
    // The checksum and authentication data are filled in afterwards by the
    // authentication handler of the transmitting peer.
    pub fn encode<V>(&self) -> BytesMut
    where
        V: Version,
    {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start::<V>(buf, self.hdr());

            match self {
                Packet::Hello(pkt) => V::encode_hello(pkt, &mut buf),
                Packet::DbDesc(pkt) => {
                    V::encode_dbdesc_fixed(pkt, &mut buf);
                    buf.put_u32(pkt.dd_seq_no);
                    for lsa_hdr in &pkt.lsa_hdrs {
                        V::lsa_hdr_encode(lsa_hdr, &mut buf);
                    }
                }
                Packet::LsRequest(pkt) => {
                    for entry in &pkt.entries {
                        buf.put_u32(entry.lsa_type.0 as u32);
                        buf.put_ipv4(&entry.lsa_id);
                        buf.put_ipv4(&entry.adv_rtr);
                    }
                }
                Packet::LsUpdate(pkt) => {
                    buf.put_u32(pkt.lsas.len() as u32);
                    for lsa in &pkt.lsas {
                        buf.put_slice(&lsa.raw);
                    }
                }
                Packet::LsAck(pkt) => {
                    for lsa_hdr in &pkt.lsa_hdrs {
                        V::lsa_hdr_encode(lsa_hdr, &mut buf);
                    }
                }
            }

            packet_encode_end(buf)
        })
    }

    // Returns a reference to the packet header.
    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }

    pub fn pkt_type(&self) -> PacketType {
        self.hdr().pkt_type
    }
}

// ===== impl Ospfv2 =====

impl Ospfv2 {
    pub const CKSUM_RANGE: std::ops::Range<usize> = 12..14;
    pub const AUTYPE_RANGE: std::ops::Range<usize> = 14..16;
    pub const AUTH_RANGE: std::ops::Range<usize> = 16..24;
}

impl PacketVersion<Self> for Ospfv2 {
    const HDR_LENGTH: u16 = 24;
    // IP header plus the Router Alert option.
    const IP_HDR_LENGTH: u16 = 20 + 4;
    const HELLO_BASE_LENGTH: u16 = 20;
    const DBDESC_BASE_LENGTH: u16 = 8;

    fn decode_hdr(buf: &mut Bytes) -> DecodeResult<(PacketHdr, u16)> {
        let (pkt_type, pkt_len, router_id, area_id) =
            decode_hdr_common::<Self>(buf)?;

        // Parse checksum and authentication type (verified later).
        let _cksum = buf.get_u16();
        let au_type = buf.get_u16();
        if AuthType::from_u16(au_type).is_none() {
            return Err(DecodeError::UnsupportedAuthType(au_type));
        }
        let _auth = buf.get_u64();

        let hdr = PacketHdr::new(pkt_type, router_id, area_id, 0);
        Ok((hdr, pkt_len))
    }

    fn encode_hdr(hdr: &PacketHdr, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(hdr.pkt_type as u8);
        // The length will be initialized later.
        buf.put_u16(0);
        buf.put_ipv4(&hdr.router_id);
        buf.put_ipv4(&hdr.area_id);
        // The checksum and authentication are filled in later.
        buf.put_u16(0);
        buf.put_u16(AuthType::Null as u16);
        buf.put_u64(0);
    }

    fn decode_hello(hdr: PacketHdr, buf: &mut Bytes) -> Hello {
        let network_mask = buf.get_ipv4();
        let hello_interval = buf.get_u16();
        // Ignore unknown options.
        let options = Options::from_bits_truncate(buf.get_u8() as u32);
        let priority = buf.get_u8();
        let dead_interval = buf.get_u32();
        let dr = buf.get_opt_ipv4();
        let bdr = buf.get_opt_ipv4();
        let neighbors = decode_hello_neighbors(buf);

        Hello {
            hdr,
            network_mask,
            iface_id: 0,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        }
    }

    fn encode_hello(hello: &Hello, buf: &mut BytesMut) {
        buf.put_ipv4(&hello.network_mask);
        buf.put_u16(hello.hello_interval);
        buf.put_u8(hello.options.bits() as u8);
        buf.put_u8(hello.priority);
        buf.put_u32(hello.dead_interval);
        buf.put_opt_ipv4(hello.dr);
        buf.put_opt_ipv4(hello.bdr);
        for nbr in &hello.neighbors {
            buf.put_ipv4(nbr);
        }
    }

    fn decode_dbdesc_fixed(buf: &mut Bytes) -> (u16, Options, DbDescFlags) {
        let mtu = buf.get_u16();
        let options = Options::from_bits_truncate(buf.get_u8() as u32);
        let dd_flags = DbDescFlags::from_bits_truncate(buf.get_u8());
        (mtu, options, dd_flags)
    }

    fn encode_dbdesc_fixed(dbdesc: &DbDesc, buf: &mut BytesMut) {
        buf.put_u16(dbdesc.mtu);
        buf.put_u8(dbdesc.options.bits() as u8);
        buf.put_u8(dbdesc.dd_flags.bits());
    }

    fn auth_generate(
        auth: &mut AuthHandler,
        buf: &mut BytesMut,
    ) -> Result<(), AuthError> {
        auth.generate(buf)
    }

    fn auth_verify(
        auth: &mut AuthHandler,
        data: &[u8],
        src: IpAddr,
        new_peer: bool,
    ) -> Result<(), AuthError> {
        auth.verify(data, src, new_peer)
    }
}

// ===== impl Ospfv3 =====

impl PacketVersion<Self> for Ospfv3 {
    const HDR_LENGTH: u16 = 16;
    // IPv6 header plus the Hop-by-Hop options header carrying Router Alert.
    const IP_HDR_LENGTH: u16 = 40 + 8;
    const HELLO_BASE_LENGTH: u16 = 20;
    const DBDESC_BASE_LENGTH: u16 = 12;

    fn decode_hdr(buf: &mut Bytes) -> DecodeResult<(PacketHdr, u16)> {
        let (pkt_type, pkt_len, router_id, area_id) =
            decode_hdr_common::<Self>(buf)?;

        // The checksum is verified by the kernel (IPV6_CHECKSUM).
        let _cksum = buf.get_u16();
        let instance_id = buf.get_u8();
        let _reserved = buf.get_u8();

        let hdr = PacketHdr::new(pkt_type, router_id, area_id, instance_id);
        Ok((hdr, pkt_len))
    }

    fn encode_hdr(hdr: &PacketHdr, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(hdr.pkt_type as u8);
        // The length will be initialized later.
        buf.put_u16(0);
        buf.put_ipv4(&hdr.router_id);
        buf.put_ipv4(&hdr.area_id);
        buf.put_u16(0);
        buf.put_u8(hdr.instance_id);
        buf.put_u8(0);
    }

    fn decode_hello(hdr: PacketHdr, buf: &mut Bytes) -> Hello {
        let iface_id = buf.get_u32();
        let priority = buf.get_u8();
        let options = Options::from_bits_truncate(get_u24(buf));
        let hello_interval = buf.get_u16();
        let dead_interval = buf.get_u16() as u32;
        let dr = buf.get_opt_ipv4();
        let bdr = buf.get_opt_ipv4();
        let neighbors = decode_hello_neighbors(buf);

        Hello {
            hdr,
            network_mask: Ipv4Addr::UNSPECIFIED,
            iface_id,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        }
    }

    fn encode_hello(hello: &Hello, buf: &mut BytesMut) {
        buf.put_u32(hello.iface_id);
        buf.put_u8(hello.priority);
        put_u24(buf, hello.options.bits());
        buf.put_u16(hello.hello_interval);
        buf.put_u16(hello.dead_interval as u16);
        buf.put_opt_ipv4(hello.dr);
        buf.put_opt_ipv4(hello.bdr);
        for nbr in &hello.neighbors {
            buf.put_ipv4(nbr);
        }
    }

    fn decode_dbdesc_fixed(buf: &mut Bytes) -> (u16, Options, DbDescFlags) {
        let _reserved = buf.get_u8();
        let options = Options::from_bits_truncate(get_u24(buf));
        let mtu = buf.get_u16();
        let _reserved = buf.get_u8();
        let dd_flags = DbDescFlags::from_bits_truncate(buf.get_u8());
        (mtu, options, dd_flags)
    }

    fn encode_dbdesc_fixed(dbdesc: &DbDesc, buf: &mut BytesMut) {
        buf.put_u8(0);
        put_u24(buf, dbdesc.options.bits());
        buf.put_u16(dbdesc.mtu);
        buf.put_u8(0);
        buf.put_u8(dbdesc.dd_flags.bits());
    }

    // OSPFv3 relies on IPsec, and the checksum is computed by the kernel.
    fn auth_generate(
        _auth: &mut AuthHandler,
        _buf: &mut BytesMut,
    ) -> Result<(), AuthError> {
        Ok(())
    }

    fn auth_verify(
        _auth: &mut AuthHandler,
        _data: &[u8],
        _src: IpAddr,
        _new_peer: bool,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}

// ===== helper functions =====

fn decode_hdr_common<V>(
    buf: &mut Bytes,
) -> DecodeResult<(PacketType, u16, Ipv4Addr, Ipv4Addr)>
where
    V: Version,
{
    // Parse version.
    let version = buf.get_u8();
    if version != V::VERSION {
        return Err(DecodeError::InvalidVersion(version));
    }

    // Parse packet type.
    let pkt_type = buf.get_u8();
    let pkt_type = match PacketType::from_u8(pkt_type) {
        Some(pkt_type) => pkt_type,
        None => return Err(DecodeError::UnknownPacketType(pkt_type)),
    };

    // Parse and validate message length.
    let pkt_len = buf.get_u16();
    if pkt_len < V::HDR_LENGTH {
        return Err(DecodeError::InvalidLength(pkt_len));
    }

    // Parse Router-ID.
    let router_id = buf.get_ipv4();
    if !router_id.is_usable() {
        return Err(DecodeError::InvalidRouterId(router_id));
    }

    // Parse Area ID.
    let area_id = buf.get_ipv4();

    Ok((pkt_type, pkt_len, router_id, area_id))
}

fn decode_hello_neighbors(buf: &mut Bytes) -> BTreeSet<Ipv4Addr> {
    let mut neighbors = BTreeSet::new();
    let nbrs_cnt = buf.remaining() / 4;
    for _ in 0..nbrs_cnt {
        neighbors.insert(buf.get_ipv4());
    }
    neighbors
}

fn decode_lsa_hdrs<V>(buf: &mut Bytes) -> Vec<LsaHdr>
where
    V: Version,
{
    let mut lsa_hdrs = vec![];
    let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
    for _ in 0..lsa_hdrs_cnt {
        lsa_hdrs.push(V::lsa_hdr_decode(buf));
    }
    lsa_hdrs
}

fn get_u24(buf: &mut Bytes) -> u32 {
    let high = buf.get_u8() as u32;
    let low = buf.get_u16() as u32;
    (high << 16) | low
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u16(value as u16);
}

fn packet_encode_start<'a, V>(
    buf: &'a RefCell<BytesMut>,
    hdr: &PacketHdr,
) -> RefMut<'a, BytesMut>
where
    V: Version,
{
    let mut buf = buf.borrow_mut();
    buf.clear();
    V::encode_hdr(hdr, &mut buf);
    buf
}

fn packet_encode_end(mut buf: RefMut<'_, BytesMut>) -> BytesMut {
    // Initialize packet length.
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());
    buf.clone()
}

// ===== global functions =====

// Computes the standard IP checksum over the whole OSPFv2 packet, skipping
// the 64-bit authentication field, and stores it in the header.
pub fn ospfv2_update_cksum(buf: &mut BytesMut) {
    buf[Ospfv2::CKSUM_RANGE].copy_from_slice(&[0, 0]);
    let cksum = ospfv2_cksum(buf);
    buf[Ospfv2::CKSUM_RANGE].copy_from_slice(&cksum);
}

// Verifies the OSPFv2 packet checksum, skipping the authentication field.
pub fn ospfv2_verify_cksum(data: &[u8]) -> bool {
    if data.len() < Ospfv2::HDR_LENGTH as usize {
        return false;
    }
    ospfv2_cksum(data) == [0; 2]
}

fn ospfv2_cksum(data: &[u8]) -> [u8; 2] {
    let mut cksum = Checksum::new();
    cksum.add_bytes(&data[0..Ospfv2::AUTH_RANGE.start]);
    cksum.add_bytes(&data[Ospfv2::AUTH_RANGE.end..]);
    cksum.checksum()
}
