//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use num_traits::FromPrimitive;
use ospf_utils::task::TimeoutTask;
use serde::{Deserialize, Serialize};

use crate::packet::{
    AuthType, PacketVersion, ospfv2_update_cksum, ospfv2_verify_cksum,
};
use crate::version::Ospfv2;

pub const SIMPLE_KEY_LENGTH: usize = 8;
pub const MD5_KEY_LENGTH: usize = 16;
pub const MD5_DIGEST_LENGTH: usize = 16;

// Authentication key lifecycle transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum KeyTransition {
    Start,
    Stop,
}

// Creates the timer that delivers a key transition after the given delay.
pub type KeyTimerFn<'a> = &'a dyn Fn(u8, KeyTransition, Duration) -> TimeoutTask;

// OSPFv2 packet authentication (RFC 2328 Appendix D).
#[derive(Debug, Default)]
pub enum AuthHandler {
    #[default]
    Null,
    Simple(SimpleAuth),
    Md5(Md5Auth),
}

#[derive(Debug)]
pub struct SimpleAuth {
    key: [u8; SIMPLE_KEY_LENGTH],
}

#[derive(Debug, Default)]
pub struct Md5Auth {
    keys: BTreeMap<u8, Md5Key>,
}

// Keyed-MD5 authentication key.
#[derive(Debug)]
pub struct Md5Key {
    pub key_id: u8,
    key: [u8; MD5_KEY_LENGTH],
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    // Tolerance (in seconds) applied to the validity window of received
    // packets.
    pub max_time_drift: u32,
    // Usable for sending.
    pub valid: bool,
    // Kept in use after expiring because no other key is valid.
    pub persistent: bool,
    // Last sequence number received from each source.
    last_seqno_rcvd: BTreeMap<IpAddr, u32>,
    seqno_out: u32,
    start_timer: Option<TimeoutTask>,
    stop_timer: Option<TimeoutTask>,
}

// Authentication errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthError {
    InvalidLength,
    AuthTypeMismatch(u16),
    InvalidChecksum,
    InvalidPassword,
    KeyIdNotFound(u8),
    KeyNotValid(u8),
    InvalidDigest,
    SeqnoDecreased(u32, u32),
    NoValidKey,
    KeyTooLong(usize),
    InvalidKeyWindow,
}

// ===== impl AuthHandler =====

impl AuthHandler {
    pub fn name(&self) -> &'static str {
        match self {
            AuthHandler::Null => "none",
            AuthHandler::Simple(_) => "simple",
            AuthHandler::Md5(_) => "md5",
        }
    }

    // Number of bytes appended after the packet by the authentication
    // scheme.
    pub fn trailer_length(&self) -> u16 {
        match self {
            AuthHandler::Md5(_) => MD5_DIGEST_LENGTH as u16,
            _ => 0,
        }
    }

    // Verifies an inbound OSPFv2 packet.
    //
    // `new_peer` is set when the packet doesn't come from a known neighbor,
    // in which case its cryptographic sequence number is accepted as is.
    pub fn verify(
        &mut self,
        data: &[u8],
        src: IpAddr,
        new_peer: bool,
    ) -> Result<(), AuthError> {
        if data.len() < Ospfv2::HDR_LENGTH as usize {
            return Err(AuthError::InvalidLength);
        }
        let au_type = u16::from_be_bytes([data[14], data[15]]);

        match self {
            AuthHandler::Null => {
                if AuthType::from_u16(au_type) != Some(AuthType::Null) {
                    return Err(AuthError::AuthTypeMismatch(au_type));
                }
                if !ospfv2_verify_cksum(data) {
                    return Err(AuthError::InvalidChecksum);
                }
                Ok(())
            }
            AuthHandler::Simple(auth) => auth.verify(data, au_type),
            AuthHandler::Md5(auth) => auth.verify(data, au_type, src, new_peer),
        }
    }

    // Authenticates an outbound OSPFv2 packet, filling in the checksum and
    // the authentication data (and trailer, for MD5).
    pub fn generate(&mut self, buf: &mut BytesMut) -> Result<(), AuthError> {
        match self {
            AuthHandler::Null => {
                buf[Ospfv2::AUTYPE_RANGE]
                    .copy_from_slice(&(AuthType::Null as u16).to_be_bytes());
                ospfv2_update_cksum(buf);
                Ok(())
            }
            AuthHandler::Simple(auth) => {
                auth.generate(buf);
                Ok(())
            }
            AuthHandler::Md5(auth) => auth.generate(buf),
        }
    }

    // Resets the per-source authentication state.
    pub fn reset(&mut self) {
        if let AuthHandler::Md5(auth) = self {
            for key in auth.keys.values_mut() {
                key.last_seqno_rcvd.clear();
            }
        }
    }

    // Resets the authentication state of a single source (e.g. when the
    // corresponding neighbor goes down).
    pub fn reset_source(&mut self, src: IpAddr) {
        if let AuthHandler::Md5(auth) = self {
            for key in auth.keys.values_mut() {
                key.last_seqno_rcvd.remove(&src);
            }
        }
    }

    // Switches to simple password authentication.
    pub fn set_simple_key(&mut self, password: &str) -> Result<(), AuthError> {
        let password = password.as_bytes();
        if password.len() > SIMPLE_KEY_LENGTH {
            return Err(AuthError::KeyTooLong(password.len()));
        }
        let mut key = [0; SIMPLE_KEY_LENGTH];
        key[..password.len()].copy_from_slice(password);
        *self = AuthHandler::Simple(SimpleAuth { key });
        Ok(())
    }

    // Removes the simple password, falling back to null authentication.
    pub fn delete_simple_key(&mut self) {
        if let AuthHandler::Simple(_) = self {
            *self = AuthHandler::Null;
        }
    }

    // Adds (or replaces) a keyed-MD5 key, switching to MD5 authentication if
    // necessary.
    //
    // Keys whose start time is in the future become valid once their start
    // timer fires. Keys with an end time are stopped by their stop timer.
    pub fn add_md5_key(
        &mut self,
        key_id: u8,
        password: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_time_drift: u32,
        timer: KeyTimerFn<'_>,
    ) -> Result<(), AuthError> {
        let now = Utc::now();
        let start = start.unwrap_or(now);
        let password = password.as_bytes();
        if password.len() > MD5_KEY_LENGTH {
            return Err(AuthError::KeyTooLong(password.len()));
        }
        if let Some(end) = end
            && (end < start || end <= now)
        {
            return Err(AuthError::InvalidKeyWindow);
        }

        let mut key = [0; MD5_KEY_LENGTH];
        key[..password.len()].copy_from_slice(password);
        let mut md5_key = Md5Key {
            key_id,
            key,
            start,
            end,
            max_time_drift,
            valid: false,
            persistent: false,
            last_seqno_rcvd: Default::default(),
            seqno_out: initial_seqno(),
            start_timer: None,
            stop_timer: None,
        };
        if let Some(end) = end {
            let timeout = (end - now).to_std().unwrap_or_default();
            md5_key.stop_timer =
                Some(timer(key_id, KeyTransition::Stop, timeout));
        }

        if start > now {
            let timeout = (start - now).to_std().unwrap_or_default();
            md5_key.start_timer =
                Some(timer(key_id, KeyTransition::Start, timeout));
        }

        if !matches!(self, AuthHandler::Md5(_)) {
            *self = AuthHandler::Md5(Md5Auth::default());
        }
        if let AuthHandler::Md5(auth) = self {
            auth.keys.insert(key_id, md5_key);
            if start <= now {
                auth.key_start(key_id);
            }
        }

        Ok(())
    }

    // Removes a keyed-MD5 key. Removing the last key falls back to null
    // authentication.
    pub fn remove_md5_key(&mut self, key_id: u8) -> Result<(), AuthError> {
        let AuthHandler::Md5(auth) = self else {
            return Err(AuthError::KeyIdNotFound(key_id));
        };
        if auth.keys.remove(&key_id).is_none() {
            return Err(AuthError::KeyIdNotFound(key_id));
        }
        if auth.keys.is_empty() {
            *self = AuthHandler::Null;
        }
        Ok(())
    }

    // Processes a key start or stop timer expiration.
    pub fn key_transition(&mut self, key_id: u8, transition: KeyTransition) {
        if let AuthHandler::Md5(auth) = self {
            match transition {
                KeyTransition::Start => auth.key_start(key_id),
                KeyTransition::Stop => auth.key_stop(key_id),
            }
        }
    }

    // Returns the ID of the key currently used for sending.
    pub fn active_key(&self) -> Option<u8> {
        match self {
            AuthHandler::Md5(auth) => auth.active_key().map(|key| key.key_id),
            _ => None,
        }
    }

    pub fn md5_key(&self, key_id: u8) -> Option<&Md5Key> {
        match self {
            AuthHandler::Md5(auth) => auth.keys.get(&key_id),
            _ => None,
        }
    }
}

// ===== impl SimpleAuth =====

impl SimpleAuth {
    fn verify(&self, data: &[u8], au_type: u16) -> Result<(), AuthError> {
        if AuthType::from_u16(au_type) != Some(AuthType::Simple) {
            return Err(AuthError::AuthTypeMismatch(au_type));
        }
        if data[Ospfv2::AUTH_RANGE] != self.key {
            return Err(AuthError::InvalidPassword);
        }
        // The checksum excludes the authentication field.
        if !ospfv2_verify_cksum(data) {
            return Err(AuthError::InvalidChecksum);
        }
        Ok(())
    }

    fn generate(&self, buf: &mut BytesMut) {
        buf[Ospfv2::AUTYPE_RANGE]
            .copy_from_slice(&(AuthType::Simple as u16).to_be_bytes());
        ospfv2_update_cksum(buf);
        buf[Ospfv2::AUTH_RANGE].copy_from_slice(&self.key);
    }
}

// ===== impl Md5Auth =====

impl Md5Auth {
    fn verify(
        &mut self,
        data: &[u8],
        au_type: u16,
        src: IpAddr,
        new_peer: bool,
    ) -> Result<(), AuthError> {
        if AuthType::from_u16(au_type) != Some(AuthType::Cryptographic) {
            return Err(AuthError::AuthTypeMismatch(au_type));
        }

        let key_id = data[18];
        let auth_len = data[19] as usize;
        let seqno = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        let pkt_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if auth_len != MD5_DIGEST_LENGTH
            || data.len() < pkt_len + MD5_DIGEST_LENGTH
        {
            return Err(AuthError::InvalidLength);
        }

        let key = self
            .keys
            .get_mut(&key_id)
            .ok_or(AuthError::KeyIdNotFound(key_id))?;
        if !key.valid_at(Utc::now()) {
            return Err(AuthError::KeyNotValid(key_id));
        }

        let digest = md5_digest(&data[..pkt_len], &key.key);
        if digest[..] != data[pkt_len..pkt_len + MD5_DIGEST_LENGTH] {
            return Err(AuthError::InvalidDigest);
        }

        // Sequence numbers must be non-decreasing, unless this is the first
        // packet from a new neighbor.
        if !new_peer
            && let Some(last) = key.last_seqno_rcvd.get(&src)
            && seqno < *last
        {
            return Err(AuthError::SeqnoDecreased(seqno, *last));
        }
        key.last_seqno_rcvd.insert(src, seqno);

        Ok(())
    }

    fn generate(&mut self, buf: &mut BytesMut) -> Result<(), AuthError> {
        let key_id = self.active_key().ok_or(AuthError::NoValidKey)?.key_id;
        let Some(key) = self.keys.get_mut(&key_id) else {
            return Err(AuthError::NoValidKey);
        };

        buf[Ospfv2::CKSUM_RANGE].copy_from_slice(&[0, 0]);
        buf[Ospfv2::AUTYPE_RANGE]
            .copy_from_slice(&(AuthType::Cryptographic as u16).to_be_bytes());
        let mut auth = [0; 8];
        auth[2] = key.key_id;
        auth[3] = MD5_DIGEST_LENGTH as u8;
        auth[4..8].copy_from_slice(&key.seqno_out.to_be_bytes());
        buf[Ospfv2::AUTH_RANGE].copy_from_slice(&auth);
        key.seqno_out = key.seqno_out.wrapping_add(1);

        let digest = md5_digest(buf, &key.key);
        buf.put_slice(&digest);
        Ok(())
    }

    // Returns the key used for sending: the valid key with the most recent
    // start time.
    fn active_key(&self) -> Option<&Md5Key> {
        self.keys
            .values()
            .filter(|key| key.valid)
            .max_by_key(|key| (key.start, key.key_id))
    }

    fn key_start(&mut self, key_id: u8) {
        let Some(key) = self.keys.get_mut(&key_id) else {
            return;
        };
        key.valid = true;
        key.start_timer = None;

        // A fresh key makes expired persistent keys unnecessary.
        for key in self
            .keys
            .values_mut()
            .filter(|key| key.key_id != key_id && key.persistent)
        {
            key.persistent = false;
            key.valid = false;
        }
    }

    fn key_stop(&mut self, key_id: u8) {
        let others_valid = self
            .keys
            .values()
            .any(|key| key.key_id != key_id && key.valid);
        let Some(key) = self.keys.get_mut(&key_id) else {
            return;
        };
        key.stop_timer = None;

        // RFC 2328 Appendix D.3: keep using the last key when every key has
        // expired.
        if others_valid {
            key.valid = false;
        } else {
            key.persistent = true;
        }
    }
}

// ===== impl Md5Key =====

impl Md5Key {
    // Returns whether received packets can be authenticated with this key at
    // the given time.
    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.persistent {
            return true;
        }
        let drift = chrono::Duration::seconds(self.max_time_drift as i64);
        if now < self.start - drift {
            return false;
        }
        match self.end {
            Some(end) => now <= end + drift,
            None => true,
        }
    }

    pub fn last_seqno_rcvd(&self, src: &IpAddr) -> Option<u32> {
        self.last_seqno_rcvd.get(src).copied()
    }
}

// ===== impl AuthError =====

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidLength => {
                write!(f, "invalid packet length")
            }
            AuthError::AuthTypeMismatch(au_type) => {
                write!(f, "authentication type mismatch: {au_type}")
            }
            AuthError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            AuthError::InvalidPassword => {
                write!(f, "invalid password")
            }
            AuthError::KeyIdNotFound(key_id) => {
                write!(f, "authentication key ID not found: {key_id}")
            }
            AuthError::KeyNotValid(key_id) => {
                write!(f, "authentication key {key_id} is not valid")
            }
            AuthError::InvalidDigest => {
                write!(f, "invalid message digest")
            }
            AuthError::SeqnoDecreased(seqno, last) => {
                write!(
                    f,
                    "cryptographic sequence number decreased: {seqno} < {last}"
                )
            }
            AuthError::NoValidKey => {
                write!(f, "no valid authentication key")
            }
            AuthError::KeyTooLong(len) => {
                write!(f, "authentication key too long: {len}")
            }
            AuthError::InvalidKeyWindow => {
                write!(f, "invalid key validity window")
            }
        }
    }
}

impl std::error::Error for AuthError {}

// ===== helper functions =====

fn md5_digest(data: &[u8], key: &[u8; MD5_KEY_LENGTH]) -> [u8; MD5_DIGEST_LENGTH] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.update(key);
    hasher.finalize().into()
}

fn initial_seqno() -> u32 {
    #[cfg(not(feature = "deterministic"))]
    {
        Utc::now().timestamp() as u32
    }
    #[cfg(feature = "deterministic")]
    {
        0
    }
}

// ===== unit tests =====
