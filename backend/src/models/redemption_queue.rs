//! FIFO Redemption Queue
//!
//! Pending withdrawal requests waiting for liquidity, served strictly in
//! enqueue order.
//!
//! # Layout
//!
//! An append-only `Vec<QueueEntry>` plus a `head` cursor. Entries are never
//! removed in place: cancelling or fully consuming an entry clears its owner
//! (tombstone), which keeps indices stable for callers holding them.
//! [`RedemptionQueue::compact`] reclaims the dead prefix on demand.
//!
//! ```text
//!  index:   0      1      2      3      4
//!          [dead] [dead] [live] [dead] [live]
//!                         ^ head
//! ```
//!
//! # Critical Invariants
//!
//! 1. `head` points at the first live entry, or `entries.len()` if none
//! 2. At most one live entry per owner; re-queuing voids the previous entry
//!    and the owner moves to the tail
//! 3. `head` only moves forward (until compaction resets it to 0)
//! 4. Compaction never reorders live entries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by queue operations
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("Requested amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Queue owner must not be empty")]
    EmptyOwner,

    #[error("Redemption queue is full ({max_length} live entries)")]
    QueueFull { max_length: usize },

    #[error("Queue index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Queue entry {index} already cancelled or consumed")]
    AlreadyCancelled { index: usize },

    #[error("{caller} does not own queue entry {index}")]
    NotOwner { index: usize, caller: String },

    #[error("Redemption queue is empty")]
    Empty,

    #[error("Head entry {index} is cancelled")]
    HeadCancelled { index: usize },

    #[error("Amount {amount} exceeds queued remainder {queued}")]
    AmountExceedsQueued { amount: i64, queued: i64 },

    #[error("Corrupt queue state: {0}")]
    Corrupt(String),
}

/// What a queued request asks for: shares to redeem XOR assets to withdraw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionRequest {
    /// Share-based redemption
    Shares(i64),
    /// Asset-based withdrawal
    Assets(i64),
}

impl RedemptionRequest {
    /// Remaining amount (shares or assets)
    pub fn amount(&self) -> i64 {
        match self {
            RedemptionRequest::Shares(v) | RedemptionRequest::Assets(v) => *v,
        }
    }

    /// Same kind of request with a different amount
    pub fn with_amount(&self, amount: i64) -> Self {
        match self {
            RedemptionRequest::Shares(_) => RedemptionRequest::Shares(amount),
            RedemptionRequest::Assets(_) => RedemptionRequest::Assets(amount),
        }
    }

    pub fn is_shares(&self) -> bool {
        matches!(self, RedemptionRequest::Shares(_))
    }
}

/// One queued withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// `None` once cancelled or fully consumed
    owner: Option<String>,
    receiver: String,
    request: RedemptionRequest,
    queued_at: u64,
}

impl QueueEntry {
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn request(&self) -> RedemptionRequest {
        self.request
    }

    /// Remaining shares or assets
    pub fn remaining(&self) -> i64 {
        self.request.amount()
    }

    pub fn queued_at(&self) -> u64 {
        self.queued_at
    }

    pub fn is_live(&self) -> bool {
        self.owner.is_some()
    }
}

/// Who is cancelling a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canceller<'a> {
    /// The accounting engine itself (always permitted)
    Engine,
    /// An account; must own the entry
    Account(&'a str),
}

/// Append-only FIFO queue with a head cursor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionQueue {
    entries: Vec<QueueEntry>,
    head: usize,
    max_length: usize,
    /// Owner → index of their live entry. Rebuilt on load and compaction.
    #[serde(skip)]
    live_by_owner: HashMap<String, usize>,
}

impl PartialEq for RedemptionQueue {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
            && self.head == other.head
            && self.max_length == other.max_length
    }
}

impl RedemptionQueue {
    /// Create an empty queue admitting at most `max_length` live entries
    pub fn new(max_length: usize) -> Self {
        Self {
            entries: Vec::new(),
            head: 0,
            max_length,
            live_by_owner: HashMap::new(),
        }
    }

    /// Index of the current head
    pub fn head_index(&self) -> usize {
        self.head
    }

    /// Size of the backing sequence, including tombstones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no live entry remains
    pub fn is_empty(&self) -> bool {
        self.live_by_owner.is_empty()
    }

    /// Number of live entries
    pub fn live_len(&self) -> usize {
        self.live_by_owner.len()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }

    /// Entry at `index` (live or not)
    pub fn entry(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    /// Backing sequence, tombstones included
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Live entries from head onward, in service order
    pub fn live_entries(&self) -> impl Iterator<Item = (usize, &QueueEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(self.head)
            .filter(|(_, e)| e.is_live())
    }

    /// Current head entry, if any
    pub fn head(&self) -> Option<(usize, &QueueEntry)> {
        self.entries
            .get(self.head)
            .filter(|e| e.is_live())
            .map(|e| (self.head, e))
    }

    /// Index of `owner`'s live entry
    pub fn index_of_owner(&self, owner: &str) -> Option<usize> {
        self.live_by_owner.get(owner).copied()
    }

    /// Total queued (shares, assets) over live entries
    pub fn totals(&self) -> (i64, i64) {
        self.live_entries()
            .fold((0, 0), |(shares, assets), (_, e)| match e.request {
                RedemptionRequest::Shares(v) => (shares + v, assets),
                RedemptionRequest::Assets(v) => (shares, assets + v),
            })
    }

    /// Append a request at the tail, voiding any live entry of the same owner
    ///
    /// Returns the new entry's index.
    ///
    /// # Example
    /// ```
    /// use factoring_pool_core_rs::models::redemption_queue::{RedemptionQueue, RedemptionRequest};
    ///
    /// let mut queue = RedemptionQueue::new(100);
    /// let first = queue.enqueue("alice", "alice", RedemptionRequest::Shares(50), 0).unwrap();
    /// let second = queue.enqueue("alice", "alice", RedemptionRequest::Assets(70), 1).unwrap();
    ///
    /// assert!(!queue.entry(first).unwrap().is_live());
    /// assert_eq!(queue.head().unwrap().0, second);
    /// assert_eq!(queue.live_len(), 1);
    /// ```
    pub fn enqueue(
        &mut self,
        owner: &str,
        receiver: &str,
        request: RedemptionRequest,
        now: u64,
    ) -> Result<usize, QueueError> {
        if owner.is_empty() {
            return Err(QueueError::EmptyOwner);
        }
        if request.amount() <= 0 {
            return Err(QueueError::InvalidAmount(request.amount()));
        }

        let previous = self.index_of_owner(owner);
        let live_after_void = self.live_len() - usize::from(previous.is_some());
        if live_after_void >= self.max_length {
            return Err(QueueError::QueueFull {
                max_length: self.max_length,
            });
        }

        if let Some(index) = previous {
            self.tombstone(index);
        }

        let index = self.entries.len();
        self.entries.push(QueueEntry {
            owner: Some(owner.to_string()),
            receiver: receiver.to_string(),
            request,
            queued_at: now,
        });
        self.live_by_owner.insert(owner.to_string(), index);
        self.advance_head();
        Ok(index)
    }

    /// Cancel the entry at `index`
    ///
    /// Only the entry's owner or the engine may cancel. Returns the request
    /// that was outstanding.
    pub fn cancel(
        &mut self,
        index: usize,
        canceller: Canceller<'_>,
    ) -> Result<QueueEntry, QueueError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get(index)
            .ok_or(QueueError::IndexOutOfBounds { index, len })?;

        let owner = entry
            .owner
            .as_deref()
            .ok_or(QueueError::AlreadyCancelled { index })?;
        if let Canceller::Account(caller) = canceller {
            if caller != owner {
                return Err(QueueError::NotOwner {
                    index,
                    caller: caller.to_string(),
                });
            }
        }

        let cancelled = entry.clone();
        self.tombstone(index);
        Ok(cancelled)
    }

    /// Consume `amount` from the head entry
    ///
    /// Equal to the remainder: the entry is tombstoned and the head advances.
    /// Less: the remainder is decremented in place. More: caller error.
    /// Returns the head entry after the operation so callers can loop.
    pub fn consume_from_head(
        &mut self,
        amount: i64,
    ) -> Result<Option<(usize, &QueueEntry)>, QueueError> {
        let index = self.head;
        let entry = self.entries.get_mut(index).ok_or(QueueError::Empty)?;
        if entry.owner.is_none() {
            return Err(QueueError::HeadCancelled { index });
        }
        if amount <= 0 {
            return Err(QueueError::InvalidAmount(amount));
        }

        let queued = entry.request.amount();
        if amount > queued {
            return Err(QueueError::AmountExceedsQueued { amount, queued });
        }

        if amount == queued {
            entry.request = entry.request.with_amount(0);
            self.tombstone(index);
        } else {
            entry.request = entry.request.with_amount(queued - amount);
        }
        Ok(self.head())
    }

    /// Rebuild the backing sequence with only live entries, resetting head to 0
    ///
    /// Indices held by callers are invalidated. Returns the number of
    /// tombstones reclaimed.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        let live: Vec<QueueEntry> = self
            .entries
            .drain(..)
            .skip(self.head)
            .filter(|e| e.is_live())
            .collect();
        self.entries = live;
        self.head = 0;
        self.rebuild_owner_index();
        before - self.entries.len()
    }

    /// Re-derive the owner index after deserialization and check invariants
    pub fn restore_index(&mut self) -> Result<(), QueueError> {
        if self.head > self.entries.len() {
            return Err(QueueError::Corrupt(format!(
                "head {} past end {}",
                self.head,
                self.entries.len()
            )));
        }
        if self.entries[..self.head].iter().any(|e| e.is_live()) {
            return Err(QueueError::Corrupt("live entry behind head".to_string()));
        }
        if self.entries.get(self.head).is_some_and(|e| !e.is_live()) {
            return Err(QueueError::Corrupt("head on a tombstone".to_string()));
        }
        self.rebuild_owner_index();
        let live = self.entries.iter().filter(|e| e.is_live()).count();
        if live != self.live_by_owner.len() {
            return Err(QueueError::Corrupt(
                "more than one live entry per owner".to_string(),
            ));
        }
        Ok(())
    }

    fn rebuild_owner_index(&mut self) {
        self.live_by_owner = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.owner.clone().map(|o| (o, i)))
            .collect();
    }

    /// Clear the owner of `index` and move head past tombstones
    fn tombstone(&mut self, index: usize) {
        if let Some(owner) = self.entries[index].owner.take() {
            self.live_by_owner.remove(&owner);
        }
        if index == self.head {
            self.advance_head();
        }
    }

    /// Move head forward while it sits on a tombstone
    fn advance_head(&mut self) {
        while self.head < self.entries.len() && !self.entries[self.head].is_live() {
            self.head += 1;
        }
    }
}
