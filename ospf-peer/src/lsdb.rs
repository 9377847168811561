//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crate::packet::lsa::{LsaHdr, LsaKey, LsaRef};
use crate::peer_manager::PeerId;
use crate::version::Version;

// Architectural Constants.
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_ARRIVAL: Duration = Duration::from_secs(1);

// Result of comparing two LSA instances.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaCompare {
    NoMatch,
    Equivalent,
    Newer,
    Older,
}

// A requested LSA isn't present in the database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BadLsReq(pub LsaKey);

// Iteration handle over a snapshot of the database, used to build the
// Database Description packets sent to a single neighbor.
#[derive(Debug)]
pub struct DatabaseHandle {
    pub peer_id: PeerId,
    keys: Vec<LsaKey>,
    position: usize,
}

// Per-area link-state database.
//
// The adjacency core only relies on this contract. The database is shared by
// every peer attached to the area.
pub trait LsaDatabase<V: Version> {
    // Opens an iteration handle over the current database contents.
    // AS-external LSAs are skipped on virtual links. Also returns whether the
    // handle is empty.
    fn open_database(
        &mut self,
        peer_id: PeerId,
        vlink: bool,
    ) -> (DatabaseHandle, bool);

    // Returns whether more entries remain to be fetched.
    fn advance(&self, handle: &DatabaseHandle) -> bool;

    // Fetches the next entry. The returned flag is set for the last one.
    fn get_entry(&self, handle: &mut DatabaseHandle) -> Option<(LsaRef, bool)>;

    // Releases an iteration handle.
    fn close_database(&mut self, handle: DatabaseHandle);

    // Returns whether the given header is newer than the database copy (or
    // whether there's no database copy at all).
    fn newer_lsa(&self, hdr: &LsaHdr) -> bool;

    // Fetches every requested LSA, failing if any of them is missing.
    fn get_lsas(&self, requests: &[LsaKey]) -> Result<Vec<LsaRef>, BadLsReq>;

    // Looks up the database copy of an LSA.
    fn lookup(&self, key: &LsaKey) -> Option<LsaRef>;

    // Installs an LSA, returning the previous instance if any.
    fn install(&mut self, lsa: LsaRef) -> Option<LsaRef>;

    // Removes an LSA from the database.
    fn remove(&mut self, key: &LsaKey) -> Option<LsaRef>;

    // Returns whether the database copy was installed less than MinLSArrival
    // ago.
    fn arrived_recently(&self, key: &LsaKey) -> bool;

    // Returns every LSA in the database.
    fn lsas(&self) -> Vec<LsaRef>;
}

// In-memory link-state database.
#[derive(Debug)]
pub struct Lsdb<V: Version> {
    entries: BTreeMap<LsaKey, LsdbEntry>,
    open_handles: usize,
    _version: PhantomData<V>,
}

#[derive(Debug)]
struct LsdbEntry {
    lsa: LsaRef,
    installed: Option<Instant>,
}

// ===== impl DatabaseHandle =====

impl DatabaseHandle {
    pub fn remaining(&self) -> usize {
        self.keys.len() - self.position
    }
}

// ===== impl Lsdb =====

impl<V> Lsdb<V>
where
    V: Version,
{
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles
    }
}

impl<V> Default for Lsdb<V>
where
    V: Version,
{
    fn default() -> Lsdb<V> {
        Lsdb {
            entries: Default::default(),
            open_handles: 0,
            _version: PhantomData,
        }
    }
}

impl<V> LsaDatabase<V> for Lsdb<V>
where
    V: Version,
{
    fn open_database(
        &mut self,
        peer_id: PeerId,
        vlink: bool,
    ) -> (DatabaseHandle, bool) {
        let keys = self
            .entries
            .keys()
            .filter(|key| !(vlink && V::lsa_type_is_as_external(key.lsa_type)))
            .copied()
            .collect::<Vec<_>>();
        let empty = keys.is_empty();
        self.open_handles += 1;

        let handle = DatabaseHandle {
            peer_id,
            keys,
            position: 0,
        };
        (handle, empty)
    }

    fn advance(&self, handle: &DatabaseHandle) -> bool {
        handle.keys[handle.position..]
            .iter()
            .any(|key| self.entries.contains_key(key))
    }

    fn get_entry(&self, handle: &mut DatabaseHandle) -> Option<(LsaRef, bool)> {
        // Entries removed since the handle was opened are skipped.
        while handle.position < handle.keys.len() {
            let key = handle.keys[handle.position];
            handle.position += 1;
            if let Some(entry) = self.entries.get(&key) {
                let last = !self.advance(handle);
                return Some((entry.lsa.clone(), last));
            }
        }
        None
    }

    fn close_database(&mut self, _handle: DatabaseHandle) {
        self.open_handles = self.open_handles.saturating_sub(1);
    }

    fn newer_lsa(&self, hdr: &LsaHdr) -> bool {
        match self.entries.get(&hdr.key()) {
            Some(entry) => {
                compare_lsa(hdr, &entry.lsa.current_hdr()) == LsaCompare::Newer
            }
            None => true,
        }
    }

    fn get_lsas(&self, requests: &[LsaKey]) -> Result<Vec<LsaRef>, BadLsReq> {
        requests
            .iter()
            .map(|key| {
                self.entries
                    .get(key)
                    .map(|entry| entry.lsa.clone())
                    .ok_or(BadLsReq(*key))
            })
            .collect()
    }

    fn lookup(&self, key: &LsaKey) -> Option<LsaRef> {
        self.entries.get(key).map(|entry| entry.lsa.clone())
    }

    fn install(&mut self, lsa: LsaRef) -> Option<LsaRef> {
        let entry = LsdbEntry {
            lsa,
            installed: install_time(),
        };
        self.entries
            .insert(entry.lsa.hdr.key(), entry)
            .map(|old| old.lsa)
    }

    fn remove(&mut self, key: &LsaKey) -> Option<LsaRef> {
        self.entries.remove(key).map(|entry| entry.lsa)
    }

    fn arrived_recently(&self, key: &LsaKey) -> bool {
        self.entries
            .get(key)
            .and_then(|entry| entry.installed)
            .is_some_and(|installed| installed.elapsed() < LSA_MIN_ARRIVAL)
    }

    fn lsas(&self) -> Vec<LsaRef> {
        self.entries.values().map(|entry| entry.lsa.clone()).collect()
    }
}

// ===== helper functions =====

fn install_time() -> Option<Instant> {
    #[cfg(not(feature = "testing"))]
    {
        Some(Instant::now())
    }
    #[cfg(feature = "testing")]
    {
        None
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// The result describes `a` relative to `b`. Both headers are expected to
// carry the current age of their LSA.
pub fn compare_lsa(a: &LsaHdr, b: &LsaHdr) -> LsaCompare {
    if a.key() != b.key() {
        return LsaCompare::NoMatch;
    }

    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    match a_seq_no.cmp(&b_seq_no) {
        Ordering::Greater => return LsaCompare::Newer,
        Ordering::Less => return LsaCompare::Older,
        Ordering::Equal => (),
    }

    match a.cksum.cmp(&b.cksum) {
        Ordering::Greater => return LsaCompare::Newer,
        Ordering::Less => return LsaCompare::Older,
        Ordering::Equal => (),
    }

    if a.is_maxage() && !b.is_maxage() {
        return LsaCompare::Newer;
    } else if !a.is_maxage() && b.is_maxage() {
        return LsaCompare::Older;
    }

    if a.age.abs_diff(b.age) > LSA_MAX_AGE_DIFF {
        return if a.age < b.age {
            LsaCompare::Newer
        } else {
            LsaCompare::Older
        };
    }

    LsaCompare::Equivalent
}

// ===== unit tests =====
