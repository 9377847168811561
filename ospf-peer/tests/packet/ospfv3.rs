//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use const_addrs::ip4;
use maplit::btreeset;
use ospf_peer::packet::error::DecodeError;
use ospf_peer::packet::lsa::{LsaHdr, LsaKey, LsaType};
use ospf_peer::packet::{
    DbDesc, DbDescFlags, Hello, LsRequest, Options, Packet, PacketHdr,
    PacketType,
};
use ospf_peer::version::Ospfv3;

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode::<Ospfv3>();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let packet_actual = Packet::decode::<Ospfv3>(bytes).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

//
// Test packets.
//

fn hello1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x03, 0x01, 0x00, 0x28, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x00,
            0x00, 0x13, 0x00, 0x0a, 0x00, 0x28, 0x01, 0x01, 0x01, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: ip4!("1.1.1.1"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 0,
            },
            network_mask: Ipv4Addr::UNSPECIFIED,
            iface_id: 4,
            hello_interval: 10,
            options: Options::V6 | Options::E | Options::R,
            priority: 1,
            dead_interval: 40,
            dr: Some(ip4!("1.1.1.1")),
            bdr: None,
            neighbors: btreeset![ip4!("2.2.2.2")],
        }),
    )
}

fn dbdesc1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x03, 0x02, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x13, 0x05, 0xdc,
            0x00, 0x01, 0x00, 0x00, 0x12, 0x35, 0x00, 0x01, 0x20, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x01,
            0xab, 0xcd, 0x00, 0x28,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: ip4!("2.2.2.2"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 1,
            },
            mtu: 1500,
            options: Options::V6 | Options::E | Options::R,
            dd_flags: DbDescFlags::MS,
            dd_seq_no: 0x1235,
            lsa_hdrs: vec![LsaHdr {
                age: 1,
                options: 0,
                lsa_type: LsaType(0x2001),
                lsa_id: Ipv4Addr::UNSPECIFIED,
                adv_rtr: ip4!("1.1.1.1"),
                seq_no: 0x80000001,
                cksum: 0xabcd,
                length: 40,
            }],
        }),
    )
}

fn lsrequest1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x03, 0x03, 0x00, 0x1c, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x01, 0x01, 0x01,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: ip4!("2.2.2.2"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 0,
            },
            entries: vec![LsaKey {
                lsa_type: LsaType(0x2001),
                adv_rtr: ip4!("1.1.1.1"),
                lsa_id: Ipv4Addr::UNSPECIFIED,
            }],
        }),
    )
}

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref hello) = hello1();
    test_encode_packet(bytes, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref hello) = hello1();
    test_decode_packet(bytes, hello);
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref dbdesc) = dbdesc1();
    test_encode_packet(bytes, dbdesc);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref dbdesc) = dbdesc1();
    test_decode_packet(bytes, dbdesc);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref lsrequest) = lsrequest1();
    test_encode_packet(bytes, lsrequest);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref lsrequest) = lsrequest1();
    test_decode_packet(bytes, lsrequest);
}

#[test]
fn test_decode_ospfv2_packet() {
    let mut bytes = hello1().0;
    bytes[0] = 2;
    assert_eq!(
        Packet::decode::<Ospfv3>(&bytes),
        Err(DecodeError::InvalidVersion(2))
    );
}
