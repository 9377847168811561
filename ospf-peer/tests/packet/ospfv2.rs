//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::BytesMut;
use const_addrs::ip4;
use maplit::btreeset;
use ospf_peer::packet::error::DecodeError;
use ospf_peer::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};
use ospf_peer::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketType, ospfv2_update_cksum, ospfv2_verify_cksum,
};
use ospf_peer::version::Ospfv2;

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode::<Ospfv2>();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let packet_actual = Packet::decode::<Ospfv2>(bytes).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn lsa_hdr1() -> LsaHdr {
    LsaHdr {
        age: 1,
        options: 0x02,
        lsa_type: LsaType(1),
        lsa_id: ip4!("1.1.1.1"),
        adv_rtr: ip4!("1.1.1.1"),
        seq_no: 0x80000001,
        cksum: 0x1234,
        length: 36,
    }
}

//
// Test packets.
//

fn hello1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x02, 0x01, 0x00, 0x30, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x0a, 0x02, 0x01, 0x00,
            0x00, 0x00, 0x28, 0x0a, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
            0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: ip4!("1.1.1.1"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 0,
            },
            network_mask: ip4!("255.255.255.0"),
            iface_id: 0,
            hello_interval: 10,
            options: Options::E,
            priority: 1,
            dead_interval: 40,
            dr: Some(ip4!("10.0.0.1")),
            bdr: None,
            neighbors: btreeset![ip4!("2.2.2.2")],
        }),
    )
}

fn dbdesc1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x02, 0x02, 0x00, 0x34, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x05, 0xdc, 0x02, 0x07, 0x00, 0x00, 0x12, 0x34, 0x00,
            0x01, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x80, 0x00, 0x00, 0x01, 0x12, 0x34, 0x00, 0x24,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: ip4!("2.2.2.2"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 0,
            },
            mtu: 1500,
            options: Options::E,
            dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
            dd_seq_no: 0x1234,
            lsa_hdrs: vec![lsa_hdr1()],
        }),
    )
}

fn lsrequest1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x02, 0x03, 0x00, 0x24, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x03,
            0x03, 0x03, 0x03,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: ip4!("2.2.2.2"),
                area_id: ip4!("0.0.0.1"),
                instance_id: 0,
            },
            entries: vec![LsaKey {
                lsa_type: LsaType(1),
                adv_rtr: ip4!("3.3.3.3"),
                lsa_id: ip4!("1.1.1.1"),
            }],
        }),
    )
}

fn lsack1() -> (Vec<u8>, Packet) {
    (
        vec![
            0x02, 0x05, 0x00, 0x2c, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x01, 0x12, 0x34, 0x00, 0x24,
        ],
        Packet::LsAck(LsAck {
            hdr: PacketHdr {
                pkt_type: PacketType::LsAck,
                router_id: ip4!("1.1.1.1"),
                area_id: Ipv4Addr::UNSPECIFIED,
                instance_id: 0,
            },
            lsa_hdrs: vec![lsa_hdr1()],
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
fn test_encode_lsack1() {
    let (ref bytes, ref lsack) = lsack1();
    test_encode_packet(bytes, lsack);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref lsack) = lsack1();
    test_decode_packet(bytes, lsack);
}

#[test]
fn test_lsupdate1() {
    let lsa = Lsa::new::<Ospfv2>(
        1,
        0x02,
        LsaType(1),
        ip4!("1.1.1.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        &[0, 0, 0, 1, 10, 0, 0, 0, 255, 255, 255, 0, 3, 0, 0, 10],
    );
    let packet = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr {
            pkt_type: PacketType::LsUpdate,
            router_id: ip4!("1.1.1.1"),
            area_id: Ipv4Addr::UNSPECIFIED,
            instance_id: 0,
        },
        lsas: vec![lsa.clone()],
    });

    let mut bytes = vec![
        0x02, 0x04, 0x00, 0x40, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x01,
    ];
    bytes.extend_from_slice(&lsa.raw);

    test_encode_packet(&bytes, &packet);
    test_decode_packet(&bytes, &packet);
}

#[test]
fn test_checksum() {
    let (bytes, _) = hello1();
    let mut buf = BytesMut::from(bytes.as_slice());
    assert!(!ospfv2_verify_cksum(&buf));

    ospfv2_update_cksum(&mut buf);
    assert!(ospfv2_verify_cksum(&buf));

    // The authentication field isn't covered by the checksum.
    buf[20] = 0xff;
    assert!(ospfv2_verify_cksum(&buf));

    buf[30] ^= 0x01;
    assert!(!ospfv2_verify_cksum(&buf));
}

#[test]
fn test_decode_errors() {
    let (bytes, _) = hello1();

    // Truncated header.
    assert_eq!(
        Packet::decode::<Ospfv2>(&bytes[..20]),
        Err(DecodeError::InvalidLength(20))
    );

    // Wrong version.
    let mut data = bytes.clone();
    data[0] = 3;
    assert_eq!(
        Packet::decode::<Ospfv2>(&data),
        Err(DecodeError::InvalidVersion(3))
    );

    // Unknown packet type.
    let mut data = bytes.clone();
    data[1] = 6;
    assert_eq!(
        Packet::decode::<Ospfv2>(&data),
        Err(DecodeError::UnknownPacketType(6))
    );

    // Packet length larger than the received data.
    let mut data = bytes.clone();
    data[3] = 0x40;
    assert_eq!(
        Packet::decode::<Ospfv2>(&data),
        Err(DecodeError::InvalidLength(0x40))
    );

    // Unknown authentication type.
    let mut data = bytes.clone();
    data[15] = 9;
    assert_eq!(
        Packet::decode::<Ospfv2>(&data),
        Err(DecodeError::UnsupportedAuthType(9))
    );

    // Hello body shorter than its fixed part.
    let mut data = bytes[..40].to_vec();
    data[3] = 40;
    assert_eq!(
        Packet::decode::<Ospfv2>(&data),
        Err(DecodeError::InvalidLength(40))
    );
}
