//! Client-side nested transactions built from undo logs.
//!
//! The server has no notion of a transaction. While at least one transaction
//! is open, the manager records the inverse of every mutation it forwards;
//! rolling back replays those inverses, newest first, through
//! [`RemoteBinding::execute_log`].
//!
//! The manager is a per-session object. It is not meant to be driven from
//! several tasks at once; `&mut self` on every operation enforces that.

use tracing::{debug, warn};

use crate::{
    binding::RemoteBinding,
    error::{CacheError, Result},
    item::{CacheItem, LogEntry},
};

/// Inverse operations recorded during one nesting level, oldest first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UndoFrame {
    entries: Vec<LogEntry>,
}

impl UndoFrame {
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Appends a committed inner frame, keeping its order.
    fn absorb(&mut self, inner: UndoFrame) {
        self.entries.extend(inner.entries);
    }

    /// Entries in the order they must be replayed: most recent first.
    fn into_replay(self) -> Vec<LogEntry> {
        let mut entries = self.entries;
        entries.reverse();
        entries
    }
}

/// Forwards calls to a [`RemoteBinding`] and keeps the undo stack.
pub struct TransactionManager<B> {
    binding: B,
    frames: Vec<UndoFrame>,
}

impl<B: RemoteBinding> TransactionManager<B> {
    pub fn new(binding: B) -> Self {
        Self {
            binding,
            frames: Vec::new(),
        }
    }

    /// Current nesting level; 0 outside any transaction.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Undo frames from outermost to innermost.
    pub fn frames(&self) -> &[UndoFrame] {
        &self.frames
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn into_binding(self) -> B {
        self.binding
    }

    /// Looks up `key`, folding every failure into `None`.
    ///
    /// `None` is ambiguous: the key may be absent, or the call may have failed
    /// in transit. Transport failures are logged but not returned. Use
    /// [`try_get`](Self::try_get) to tell the two apart.
    pub async fn get(&mut self, key: &str) -> Option<CacheItem> {
        match self.binding.get(key).await {
            Ok(item) => Some(item),
            Err(CacheError::NotFound(_)) => None,
            Err(err) => {
                warn!(key, error = %err, "get failed");
                None
            }
        }
    }

    /// Looks up `key`, distinguishing a missing key (`Ok(None)`) from a failed call.
    pub async fn try_get(&mut self, key: &str) -> Result<Option<CacheItem>> {
        match self.binding.get(key).await {
            Ok(item) => Ok(Some(item)),
            Err(CacheError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn get_count(&mut self, value: &str) -> Result<u64> {
        self.binding.get_count(value).await
    }

    /// Stores `item`, recording how to undo it when a transaction is open.
    pub async fn set(&mut self, item: CacheItem) -> Result<()> {
        if self.in_transaction() {
            let undo = match self.try_get(&item.key).await? {
                Some(current) => LogEntry::restore(current),
                None => LogEntry::delete(item.key.as_str()),
            };
            self.record(undo);
        }
        self.binding.set(item).await?;
        Ok(())
    }

    /// Deletes `key`, recording how to undo it when a transaction is open.
    ///
    /// Deleting a missing key records nothing and reports
    /// [`CacheError::NotFound`] from the store.
    pub async fn unset(&mut self, key: &str) -> Result<()> {
        if self.in_transaction() {
            if let Some(current) = self.try_get(key).await? {
                self.record(LogEntry::restore(current));
            }
        }
        self.binding.unset(key).await?;
        Ok(())
    }

    /// Opens a (possibly nested) transaction.
    pub fn begin(&mut self) {
        self.frames.push(UndoFrame::default());
        debug!(depth = self.depth(), "transaction started");
    }

    /// Closes the innermost transaction.
    ///
    /// Its undo entries move into the enclosing frame so an outer rollback can
    /// still revert them. Committing the outermost transaction discards the
    /// log and makes its mutations permanent. Returns `false` if no
    /// transaction was open.
    pub fn commit(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        match self.frames.last_mut() {
            Some(parent) => parent.absorb(frame),
            None => debug!(entries = frame.len(), "outermost transaction committed"),
        }
        debug!(depth = self.depth(), "transaction committed");
        true
    }

    /// Reverts everything recorded by the innermost transaction.
    ///
    /// The frame is popped before the replay is sent; if the replay fails the
    /// frame is not restored.
    pub async fn rollback(&mut self) -> Result<()> {
        let frame = self.frames.pop().ok_or(CacheError::NoOpenTransaction)?;
        debug!(depth = self.depth(), entries = frame.len(), "rolling back transaction");
        self.replay(frame).await
    }

    /// Reverts every transaction still open, innermost first.
    ///
    /// Frames are merged inner-into-outer until one remains, then that frame
    /// is replayed newest first, so each recorded entry is applied exactly
    /// once. Does nothing outside a transaction.
    pub async fn end_session(&mut self) -> Result<()> {
        let depth = self.depth();
        let Some(frame) = flatten(std::mem::take(&mut self.frames)) else {
            return Ok(());
        };
        debug!(depth, entries = frame.len(), "undoing open transactions at session end");
        self.replay(frame).await
    }

    fn record(&mut self, entry: LogEntry) {
        if let Some(frame) = self.frames.last_mut() {
            frame.record(entry);
        }
    }

    async fn replay(&mut self, frame: UndoFrame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        self.binding.execute_log(frame.into_replay()).await?;
        Ok(())
    }
}

/// Collapses a stack of frames (outermost first) into one frame.
fn flatten(frames: Vec<UndoFrame>) -> Option<UndoFrame> {
    frames.into_iter().rev().reduce(|inner, mut outer| {
        outer.absorb(inner);
        outer
    })
}
