//! Synchronization core for a multi-currency wallet.
//!
//! A [`registry::WalletRegistry`] drives an external blockchain engine and keeps one wallet
//! controller per currency. The currency catalog, the user's asset list and per-network
//! connection modes are persisted through a replicated key-value store. Application state is
//! published as actions to a separate store task.

pub mod asset;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod registry;
pub mod replica;
pub mod state;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod test_support;
