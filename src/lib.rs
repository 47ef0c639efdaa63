//! Nomadcoin - a single-node proof-of-work ledger
//!
//! This library implements:
//! - UTXO-based transactions signed with secp256k1 ECDSA
//! - Leading-zero-bit proof of work with periodic difficulty retargeting
//! - Fork choice by accumulated chain work with full replay validation
//! - A single-writer ledger context with cancellable mining
//! - Block-list snapshots, a REST API and a CLI

pub mod core;
pub mod crypto;
pub mod mining;
pub mod storage;
pub mod ledger;
pub mod cli;
pub mod api;
pub mod consensus;
pub mod error;
pub mod config;

pub use error::{LedgerError, Result};
pub use ledger::Ledger;
