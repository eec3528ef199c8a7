//! Per-entry optimistic locks.
//!
//! Every accepted change to an entry gets a fresh sync id and the set of
//! connections that were sent the change. Until a connection confirms that id,
//! it may not change the entry again: it would be overwriting a value it has not
//! seen yet.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::state::ConnectionId;
use crate::{constants::DUMMY_SYNC_ID, entry::Entry};

#[derive(Debug)]
pub(crate) struct LockTable {
    next_sync_id: u16,
    sync_ids: HashMap<Entry, u16>,
    entries: HashMap<u16, Entry>,
    pending: HashMap<u16, HashSet<ConnectionId>>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self {
            next_sync_id: DUMMY_SYNC_ID + 1,
            sync_ids: HashMap::new(),
            entries: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl LockTable {
    /// Ids are never the dummy id; after `u16::MAX` the counter wraps to 1.
    fn next_sync_id(&mut self) -> u16 {
        let id = self.next_sync_id;
        self.next_sync_id = match id.checked_add(1) {
            Some(next) => next,
            None => DUMMY_SYNC_ID + 1,
        };
        id
    }

    /// Lock `entry` until every connection in `pending` confirmed the returned id.
    ///
    /// Any older lock on the entry is replaced.
    pub fn lock(&mut self, entry: &Entry, pending: HashSet<ConnectionId>) -> u16 {
        let sync_id = self.next_sync_id();

        if let Some(previous) = self.sync_ids.insert(entry.clone(), sync_id) {
            self.entries.remove(&previous);
            self.pending.remove(&previous);
        }
        // After wrapping, the id may still belong to a lock nobody confirmed.
        if let Some(stale) = self.entries.insert(sync_id, entry.clone()) {
            if stale != *entry {
                self.sync_ids.remove(&stale);
            }
        }

        trace!(sync_id, %entry, pending = pending.len(), "Locked entry");
        if pending.is_empty() {
            self.release(sync_id);
        } else {
            self.pending.insert(sync_id, pending);
        }
        sync_id
    }

    /// Whether `conn` has seen every accepted change to `entry`.
    pub fn can_modify(&self, conn: ConnectionId, entry: &Entry) -> bool {
        self.sync_ids
            .get(entry)
            .and_then(|sync_id| self.pending.get(sync_id))
            .is_none_or(|pending| !pending.contains(&conn))
    }

    /// Record that `conn` applied the change with `sync_id`.
    pub fn confirm(&mut self, conn: ConnectionId, sync_id: u16) {
        let Some(pending) = self.pending.get_mut(&sync_id) else {
            return;
        };
        pending.remove(&conn);
        if pending.is_empty() {
            self.release(sync_id);
        }
    }

    /// Drop `conn` from every pending set, releasing locks nobody else holds.
    pub fn forget(&mut self, conn: ConnectionId) {
        let released: Vec<u16> = self
            .pending
            .iter_mut()
            .filter_map(|(sync_id, pending)| {
                pending.remove(&conn);
                pending.is_empty().then_some(*sync_id)
            })
            .collect();
        for sync_id in released {
            self.release(sync_id);
        }
    }

    #[cfg(test)]
    pub fn lock_of(&self, entry: &Entry) -> Option<u16> {
        self.sync_ids.get(entry).copied()
    }

    fn release(&mut self, sync_id: u16) {
        self.pending.remove(&sync_id);
        if let Some(entry) = self.entries.remove(&sync_id) {
            self.sync_ids.remove(&entry);
        }
        trace!(sync_id, "Released lock");
    }

    pub fn clear(&mut self) {
        self.sync_ids.clear();
        self.entries.clear();
        self.pending.clear();
    }
}
