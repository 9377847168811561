//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Instant;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use ospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use serde::{Deserialize, Serialize};

use crate::lsdb::{LSA_MAX_AGE, LSA_RESERVED_SEQ_NO};
use crate::neighbor::NeighborId;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};
use crate::version::{Ospfv2, Ospfv3, Version};

// Type aliases.
pub type LsaRef = Rc<Lsa>;

// LSA type code.
//
// OSPFv2 LSA types occupy the lower 8 bits, while OSPFv3 LSA types use the
// full 16-bit field (U-bit, flooding scope and function code).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct LsaType(pub u16);

// LSA flooding scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaScope {
    Link,
    Area,
    As,
    Unknown,
}

// Key identifying an LSA instance in the link-state database.
#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub adv_rtr: Ipv4Addr,
    pub lsa_id: Ipv4Addr,
}

//
// LSA header.
//
// OSPFv2 encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            LS age             |    Options    |    LS type    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Link State ID                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Advertising Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     LS sequence number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         LS checksum           |             length            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// OSPFv3 replaces the Options and LS type fields by a 16-bit LS type.
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    pub age: u16,
    pub options: u8,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    pub cksum: u16,
    pub length: u16,
}

// LSA with its raw encoding.
//
// Installed LSAs are shared between the database and the retransmission lists
// of every neighbor they were flooded to. Each copy tracks the set of
// neighbors that still owe an acknowledgement for it.
#[derive(Debug, Deserialize, Serialize)]
pub struct Lsa {
    // LSA header.
    pub hdr: LsaHdr,
    // Raw bytes of the whole LSA (header included).
    #[serde(skip)]
    pub raw: Bytes,
    // Time the LSA was created or received.
    #[serde(skip)]
    pub base_time: Option<Instant>,
    // Neighbors this LSA was sent to and that haven't acknowledged it yet.
    #[serde(skip)]
    pending_acks: RefCell<BTreeSet<NeighborId>>,
}

// OSPF version-specific code.
pub trait LsaVersion<V: Version> {
    const TYPE_ROUTER: LsaType;
    const TYPE_NETWORK: LsaType;

    // Decode an LSA header. The caller guarantees enough bytes are available.
    fn lsa_hdr_decode(buf: &mut Bytes) -> LsaHdr;

    // Encode an LSA header.
    fn lsa_hdr_encode(hdr: &LsaHdr, buf: &mut BytesMut);

    // Return the flooding scope of the given LSA type.
    fn lsa_type_scope(lsa_type: LsaType) -> LsaScope;

    // Return whether the LSA type is recognized.
    fn lsa_type_is_known(lsa_type: LsaType) -> bool;

    // Return whether the LSA type is AS-external.
    fn lsa_type_is_as_external(lsa_type: LsaType) -> bool;
}

// ===== impl LsaType =====

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

// ===== impl LsaKey =====

impl std::fmt::Display for LsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} adv-rtr {} lsa-id {}",
            self.lsa_type, self.adv_rtr, self.lsa_id
        )
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    pub fn key(&self) -> LsaKey {
        LsaKey::new(self.lsa_type, self.adv_rtr, self.lsa_id)
    }

    pub fn is_maxage(&self) -> bool {
        self.age == LSA_MAX_AGE
    }
}

// ===== impl Lsa =====

impl Lsa {
    // LSA maximum length.
    pub const MAX_LENGTH: usize = 1024;

    // Builds a new LSA from its header fields and encoded body. The length and
    // checksum are computed here.
    pub fn new<V>(
        age: u16,
        options: u8,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: &[u8],
    ) -> Lsa
    where
        V: Version,
    {
        let mut hdr = LsaHdr::new(
            age, options, lsa_type, lsa_id, adv_rtr, seq_no, 0, 0,
        );

        let raw = TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            V::lsa_hdr_encode(&hdr, &mut buf);
            buf.put_slice(body);

            // Rewrite LSA length.
            let lsa_len = buf.len() as u16;
            buf[18..20].copy_from_slice(&lsa_len.to_be_bytes());
            hdr.length = lsa_len;

            // Compute LSA checksum.
            let cksum = checksum(&buf[2..(lsa_len as usize)]);
            buf[16..18].copy_from_slice(&cksum);
            hdr.cksum = u16::from_be_bytes(cksum);

            buf.clone().freeze()
        });

        Lsa {
            hdr,
            raw,
            base_time: lsa_base_time(),
            pending_acks: Default::default(),
        }
    }

    // Decodes LSA from a bytes buffer.
    pub fn decode<V>(buf: &mut Bytes) -> DecodeResult<Lsa>
    where
        V: Version,
    {
        let buf_orig = buf.clone();
        if buf.remaining() < LsaHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }
        let hdr = V::lsa_hdr_decode(buf);
        if hdr.length < LsaHdr::LENGTH {
            return Err(DecodeError::InvalidLsaLength);
        }
        let body_len = (hdr.length - LsaHdr::LENGTH) as usize;
        if buf.remaining() < body_len {
            return Err(DecodeError::InvalidLsaLength);
        }
        buf.advance(body_len);

        Ok(Lsa {
            hdr,
            raw: buf_orig.slice(0..hdr.length as usize),
            base_time: lsa_base_time(),
            pending_acks: Default::default(),
        })
    }

    // Returns the LSA body.
    pub fn body(&self) -> &[u8] {
        &self.raw[LsaHdr::LENGTH as usize..]
    }

    // Returns the current LSA age.
    pub fn age(&self) -> u16 {
        match self.base_time {
            Some(base_time) => {
                let elapsed = u16::try_from(base_time.elapsed().as_secs())
                    .unwrap_or(u16::MAX);
                std::cmp::min(
                    self.hdr.age.saturating_add(elapsed),
                    LSA_MAX_AGE,
                )
            }
            None => self.hdr.age,
        }
    }

    // Updates the LSA age.
    pub fn set_age(&mut self, age: u16) {
        self.hdr.age = age;

        let mut raw = BytesMut::from(self.raw.as_ref());
        raw[0..2].copy_from_slice(&age.to_be_bytes());
        self.raw = raw.freeze();

        self.base_time = lsa_base_time();
    }

    pub fn is_maxage(&self) -> bool {
        self.age() == LSA_MAX_AGE
    }

    // Returns the header as it should appear on the wire right now.
    pub fn current_hdr(&self) -> LsaHdr {
        let mut hdr = self.hdr;
        hdr.age = self.age();
        hdr
    }

    // Returns the raw LSA with its age incremented by the link transmit
    // delay, capped at MaxAge.
    pub fn tx_raw(&self, transmit_delay: u16) -> Bytes {
        let age = std::cmp::min(
            self.age().saturating_add(transmit_delay),
            LSA_MAX_AGE,
        );
        let mut raw = BytesMut::from(self.raw.as_ref());
        raw[0..2].copy_from_slice(&age.to_be_bytes());
        raw.freeze()
    }

    // Returns the copy of the LSA that goes into an outgoing LS Update.
    pub fn tx_copy(&self, transmit_delay: u16) -> Lsa {
        let raw = self.tx_raw(transmit_delay);
        let mut hdr = self.hdr;
        hdr.age = u16::from_be_bytes([raw[0], raw[1]]);
        Lsa {
            hdr,
            raw,
            base_time: None,
            pending_acks: Default::default(),
        }
    }

    pub fn validate<V>(&self) -> Result<(), LsaValidationError>
    where
        V: Version,
    {
        if self.hdr.age > LSA_MAX_AGE {
            return Err(LsaValidationError::InvalidLsaAge);
        }
        if self.hdr.seq_no == LSA_RESERVED_SEQ_NO {
            return Err(LsaValidationError::InvalidLsaSeqNo);
        }
        if !V::lsa_type_is_known(self.hdr.lsa_type) {
            return Err(LsaValidationError::UnknownType);
        }
        if !self.is_checksum_valid() {
            return Err(LsaValidationError::InvalidChecksum);
        }

        Ok(())
    }

    // Checks if the checksum is valid.
    fn is_checksum_valid(&self) -> bool {
        // Skip checksum validation in testing mode if the checksum field is set
        // to zero.
        #[cfg(feature = "testing")]
        {
            if self.hdr.cksum == 0 {
                return true;
            }
        }

        // Skip the Age field.
        fletcher::calc_fletcher16(&self.raw[2..(self.hdr.length as usize)])
            == 0
    }

    pub fn add_pending_ack(&self, nbr_id: NeighborId) {
        self.pending_acks.borrow_mut().insert(nbr_id);
    }

    pub fn remove_pending_ack(&self, nbr_id: NeighborId) -> bool {
        self.pending_acks.borrow_mut().remove(&nbr_id)
    }

    pub fn has_pending_ack(&self, nbr_id: NeighborId) -> bool {
        self.pending_acks.borrow().contains(&nbr_id)
    }

    pub fn pending_acks_empty(&self) -> bool {
        self.pending_acks.borrow().is_empty()
    }
}

impl Clone for Lsa {
    fn clone(&self) -> Lsa {
        Lsa {
            hdr: self.hdr,
            raw: self.raw.clone(),
            base_time: self.base_time,
            pending_acks: Default::default(),
        }
    }
}

impl PartialEq for Lsa {
    fn eq(&self, other: &Lsa) -> bool {
        self.hdr == other.hdr && self.raw == other.raw
    }
}

impl Eq for Lsa {}

// ===== impl Ospfv2 =====

impl LsaVersion<Self> for Ospfv2 {
    const TYPE_ROUTER: LsaType = LsaType(1);
    const TYPE_NETWORK: LsaType = LsaType(2);

    fn lsa_hdr_decode(buf: &mut Bytes) -> LsaHdr {
        let age = buf.get_u16();
        let options = buf.get_u8();
        let lsa_type = LsaType(buf.get_u8() as u16);
        let lsa_id = buf.get_ipv4();
        let adv_rtr = buf.get_ipv4();
        let seq_no = buf.get_u32();
        let cksum = buf.get_u16();
        let length = buf.get_u16();

        LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        }
    }

    fn lsa_hdr_encode(hdr: &LsaHdr, buf: &mut BytesMut) {
        buf.put_u16(hdr.age);
        buf.put_u8(hdr.options);
        buf.put_u8(hdr.lsa_type.0 as u8);
        buf.put_ipv4(&hdr.lsa_id);
        buf.put_ipv4(&hdr.adv_rtr);
        buf.put_u32(hdr.seq_no);
        buf.put_u16(hdr.cksum);
        buf.put_u16(hdr.length);
    }

    fn lsa_type_scope(lsa_type: LsaType) -> LsaScope {
        match lsa_type.0 {
            1..=4 | 7 | 10 => LsaScope::Area,
            5 | 11 => LsaScope::As,
            9 => LsaScope::Link,
            _ => LsaScope::Unknown,
        }
    }

    fn lsa_type_is_known(lsa_type: LsaType) -> bool {
        Self::lsa_type_scope(lsa_type) != LsaScope::Unknown
    }

    fn lsa_type_is_as_external(lsa_type: LsaType) -> bool {
        lsa_type.0 == 5
    }
}

// ===== impl Ospfv3 =====

impl Ospfv3 {
    const LSA_SCOPE_MASK: u16 = 0x6000;
}

impl LsaVersion<Self> for Ospfv3 {
    const TYPE_ROUTER: LsaType = LsaType(0x2001);
    const TYPE_NETWORK: LsaType = LsaType(0x2002);

    fn lsa_hdr_decode(buf: &mut Bytes) -> LsaHdr {
        let age = buf.get_u16();
        let lsa_type = LsaType(buf.get_u16());
        let lsa_id = buf.get_ipv4();
        let adv_rtr = buf.get_ipv4();
        let seq_no = buf.get_u32();
        let cksum = buf.get_u16();
        let length = buf.get_u16();

        LsaHdr {
            age,
            options: 0,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        }
    }

    fn lsa_hdr_encode(hdr: &LsaHdr, buf: &mut BytesMut) {
        buf.put_u16(hdr.age);
        buf.put_u16(hdr.lsa_type.0);
        buf.put_ipv4(&hdr.lsa_id);
        buf.put_ipv4(&hdr.adv_rtr);
        buf.put_u32(hdr.seq_no);
        buf.put_u16(hdr.cksum);
        buf.put_u16(hdr.length);
    }

    fn lsa_type_scope(lsa_type: LsaType) -> LsaScope {
        match lsa_type.0 & Self::LSA_SCOPE_MASK {
            0x0000 => LsaScope::Link,
            0x2000 => LsaScope::Area,
            0x4000 => LsaScope::As,
            _ => LsaScope::Unknown,
        }
    }

    fn lsa_type_is_known(lsa_type: LsaType) -> bool {
        Self::lsa_type_scope(lsa_type) != LsaScope::Unknown
    }

    fn lsa_type_is_as_external(lsa_type: LsaType) -> bool {
        lsa_type.0 == 0x4005
    }
}

// ===== helper functions =====

// Computes the Fletcher checksum of an LSA (Age field excluded), adjusted so
// that the checksum field itself makes the whole sum zero.
fn checksum(data: &[u8]) -> [u8; 2] {
    let checksum = fletcher::calc_fletcher16(data);
    let mut checkbyte0 = (checksum & 0x00FF) as i32;
    let mut checkbyte1 = ((checksum >> 8) & 0x00FF) as i32;

    // Adjust checksum value using scaling factor.
    let sop = data.len() as u16 - 15;
    let mut x = (sop as i32 * checkbyte0 - checkbyte1) % 255;
    if x <= 0 {
        x += 255;
    }
    checkbyte1 = 510 - checkbyte0 - x;
    if checkbyte1 > 255 {
        checkbyte1 -= 255;
    }
    checkbyte0 = x;
    [checkbyte0 as u8, checkbyte1 as u8]
}

fn lsa_base_time() -> Option<Instant> {
    #[cfg(not(feature = "testing"))]
    {
        Some(Instant::now())
    }
    #[cfg(feature = "testing")]
    {
        None
    }
}

// ===== unit tests =====
