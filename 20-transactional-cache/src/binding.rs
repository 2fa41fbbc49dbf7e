//! The five calls the store exposes to clients.
//!
//! [`RemoteBinding`] is the seam between the transaction manager and the
//! store. [`crate::remote::RemoteClient`] implements it over TCP;
//! [`LocalBinding`] implements it in-process, which is what unit tests and
//! embedded callers use.

use std::sync::Arc;

use crate::error::Result;
use crate::item::{CacheItem, LogEntry};
use crate::store::Store;

/// Synchronous request/response access to a [`Store`].
///
/// Each call suspends the caller until the store answers or the transport
/// fails. There is no per-call timeout and no cancellation.
#[allow(async_fn_in_trait)]
pub trait RemoteBinding {
    async fn get(&mut self, key: &str) -> Result<CacheItem>;

    async fn set(&mut self, item: CacheItem) -> Result<bool>;

    async fn unset(&mut self, key: &str) -> Result<bool>;

    async fn get_count(&mut self, value: &str) -> Result<u64>;

    async fn execute_log(&mut self, entries: Vec<LogEntry>) -> Result<bool>;
}

/// In-process binding that calls straight into a shared [`Store`].
#[derive(Clone, Default)]
pub struct LocalBinding {
    store: Arc<Store>,
}

impl LocalBinding {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

impl RemoteBinding for LocalBinding {
    async fn get(&mut self, key: &str) -> Result<CacheItem> {
        self.store.get(key)
    }

    async fn set(&mut self, item: CacheItem) -> Result<bool> {
        self.store.set(item);
        Ok(true)
    }

    async fn unset(&mut self, key: &str) -> Result<bool> {
        self.store.unset(key).map(|_| true)
    }

    async fn get_count(&mut self, value: &str) -> Result<u64> {
        Ok(self.store.get_count(value))
    }

    async fn execute_log(&mut self, entries: Vec<LogEntry>) -> Result<bool> {
        self.store.execute_log(&entries).map(|()| true)
    }
}
