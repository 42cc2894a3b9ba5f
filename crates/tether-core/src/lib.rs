//! Core abstractions for Tether: provider records, credential pairs and the
//! contracts the storage, repository and verification crates implement.
//! This crate does no I/O of its own.

pub mod connection;
pub mod credentials;
pub mod error;
pub mod providers;
pub mod repository;
pub mod storage;

pub use error::TetherError;
