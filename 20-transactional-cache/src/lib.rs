//! Networked in-memory key/value cache with client-side nested transactions.
//!
//! A server owns one [`store::Store`]; clients reach it through the five calls
//! of [`binding::RemoteBinding`] and may wrap mutations in transactions that
//! exist only on the client, as undo logs.
//!
//! - [`ordered_index`] is the AVL tree behind both store indexes.
//! - [`store`] keeps the key index and the value refcount index consistent.
//! - [`item`] and [`error`] hold the shared records and failure kinds.
//! - [`binding`], [`message`], [`server`] and [`remote`] carry calls from a
//!   client to the store over newline-delimited JSON on TCP.
//! - [`transaction`] records inverses and implements begin/commit/rollback.
//! - [`protocol`], [`session`], [`client`] and [`cli`] make up the console
//!   front end.

pub mod binding;
pub mod cli;
pub mod client;
pub mod error;
pub mod item;
pub mod message;
pub mod ordered_index;
pub mod protocol;
pub mod remote;
pub mod server;
pub mod session;
pub mod store;
pub mod transaction;

pub use binding::{LocalBinding, RemoteBinding};
pub use error::CacheError;
pub use item::{CacheItem, LogCommand, LogEntry};
pub use store::Store;
