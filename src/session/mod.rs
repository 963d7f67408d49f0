//! Session management module.
//!
//! This module provides:
//! - `client`: the capability traits a coordination service client exposes
//! - `manager`: the single-handle session manager with reconnect-on-demand
//! - `memory`: an in-process service implementing the client traits

pub mod client;
pub mod manager;
pub mod memory;

pub use client::{ClientHandle, ClientState, Connector, CoordinationClient, StateObserver};
pub use manager::{SessionManager, SessionState, DEFAULT_CONNECT_TIMEOUT};
pub use memory::{MemoryClient, MemoryConnector, MemoryService};
