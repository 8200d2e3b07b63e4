//! IdeaVault - timestamped proof of authorship for startup ideas
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Registration
//! - [`registry`] - Hash, pin, anchor on chain, persist
//! - [`query`] - Role-scoped listing, detail access, re-verification
//!
//! ## External Services
//! - [`content_store`] - IPFS pinning client (Pinata) with 429 backoff
//! - [`ledger`] - Algorand application client (ABI calls, simulation)
//!
//! ## Cryptography & Accounts
//! - [`crypto`] - Idea hashing, addresses, 25-word mnemonics, signing
//! - [`auth`] - Password hashing and session tokens
//!
//! ## State Management
//! - [`models`] - Domain records
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Integration
//! - [`api`] - REST API
//! - [`server`] - Wires configuration into a running API server
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Registration
// ============================================================================
pub mod query;
pub mod registry;

// ============================================================================
// External Services
// ============================================================================
pub mod content_store;
pub mod ledger;

// ============================================================================
// Cryptography & Accounts
// ============================================================================
pub mod auth;
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod models;
pub mod persistence;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod server;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
