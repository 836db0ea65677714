//! # State Store Crate
//!
//! A high-level, application-specific interface to the PostgreSQL database
//! that durably holds every bot's operating state: its snapshot (lifecycle,
//! regime, active deals, open orders, grid ladder, risk counters) plus
//! append-only order and trade history.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 adapter:** encapsulates all database-specific logic behind a
//!   clean, abstract API, hiding the underlying SQL.
//! - **Compile-time-checkable SQL:** built on `sqlx`, the same toolkit a live
//!   schema could verify queries against.
//! - **Asynchronous & pooled:** every operation runs against a shared
//!   `PgPool`.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: establish the pool and bring the schema
//!   up to date.
//! - `StateStoreRepository`: the struct holding the pool and every
//!   high-level data access method.
//! - `BotSnapshot` / `ClosedTrade`: the persisted shapes.
//! - `StateStoreError`: this crate's error type.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::StateStoreError;
pub use repository::{BotSnapshot, ClosedTrade, StateStoreRepository};
