//! Cardano DEX indexer.
//!
//! # Overview
//!
//! Reconstructs liquidity pool states and order lifecycles of the supported
//! exchanges from already decoded transactions.
//!
//! Exchange datums are decoded into [`datum::StructuredValue`] and matched
//! against declarative [`datum::DefinitionTemplate`]s. Each exchange in
//! [`dex`] implements the [`analyzer`] contract on top of them, producing
//! normalized [`types::DomainOperation`]s per transaction.
//!
//! Use [`indexer::Indexer`] to apply the analyzers to blocks in slot order,
//! it keeps the pool view up to date, retries operations waiting for a pool
//! and reconciles hybrid exchanges via [`reconcile::Reconciler`].
//! [`stream::blocks`] reads blocks as newline-delimited JSON.
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Rollbacks are not supported, a different block at an applied slot is
//!   rejected.
//!
//! * Pools and the reconciliation ledger are kept in memory, durable storage
//!   plugs in through [`analyzer::PoolStore`] and [`reconcile::OrderLedger`].
//!
//! # Testing
//!
//! [`testing`] module provides addresses, transaction builders and Plutus
//! data builders for exercising analyzers without chain data.

pub mod analyzer;
pub mod datum;
pub mod dex;
pub mod error;
pub mod indexer;
pub mod num;
pub mod reconcile;
pub mod stream;
pub mod testing;
pub mod types;
