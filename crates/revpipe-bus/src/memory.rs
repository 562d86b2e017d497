use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::inbox::{InboxEntry, InboxStore};
use crate::transport::BusTransport;

#[derive(Debug, thiserror::Error)]
#[error("in-memory transport rejected the batch")]
pub struct RejectedBatch;

/// Transport that keeps published envelopes in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    published: Mutex<Vec<Envelope>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn published(&self) -> Vec<Envelope> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn publish_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusTransport for InMemoryTransport {
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::transport(RejectedBatch));
        }
        let mut guard = self
            .published
            .lock()
            .map_err(|_| BusError::transport(RejectedBatch))?;
        guard.extend_from_slice(envelopes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Pending,
    Claimed,
    Handled,
}

/// Inbox that keeps entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryInbox {
    entries: Mutex<Vec<(InboxEntry, EntryState, Option<String>)>>,
    next_id: AtomicUsize,
}

impl InMemoryInbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received envelope and return its entry id.
    pub fn push(&self, envelope: Envelope) -> i64 {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = i64::try_from(seq).unwrap_or(i64::MAX);
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((InboxEntry { id, envelope }, EntryState::Pending, None));
        }
        id
    }

    #[must_use]
    pub fn handled_ids(&self) -> Vec<i64> {
        self.ids_in(EntryState::Handled)
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<i64> {
        self.ids_in(EntryState::Pending)
    }

    #[must_use]
    pub fn last_error(&self, id: i64) -> Option<String> {
        self.entries.lock().ok().and_then(|guard| {
            guard
                .iter()
                .find(|(entry, _, _)| entry.id == id)
                .and_then(|(_, _, error)| error.clone())
        })
    }

    fn ids_in(&self, state: EntryState) -> Vec<i64> {
        self.entries
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|(_, s, _)| *s == state)
                    .map(|(entry, _, _)| entry.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_state(&self, id: i64, state: EntryState, error: Option<String>) -> Result<(), BusError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| BusError::transport(RejectedBatch))?;
        if let Some(slot) = guard.iter_mut().find(|(entry, _, _)| entry.id == id) {
            slot.1 = state;
            slot.2 = error;
        }
        Ok(())
    }
}

#[async_trait]
impl InboxStore for InMemoryInbox {
    async fn claim(&self, limit: usize) -> Result<Vec<InboxEntry>, BusError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| BusError::transport(RejectedBatch))?;
        let mut claimed = Vec::new();
        for (entry, state, _) in guard.iter_mut() {
            if claimed.len() == limit {
                break;
            }
            if *state == EntryState::Pending {
                *state = EntryState::Claimed;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_handled(&self, id: i64) -> Result<(), BusError> {
        self.set_state(id, EntryState::Handled, None)
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), BusError> {
        self.set_state(id, EntryState::Pending, Some(error.to_string()))
    }
}
