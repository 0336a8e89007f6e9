//! CBDC Ledger Core
//!
//! Two-tier central bank digital currency ledger executed as a contract over a
//! versioned key/value world state.
//!
//! # Architecture
//!
//! - **Contract**: Role-checked state transitions (issue, wholesale and retail
//!   distribution, peer transfer, redemption) plus balance and history queries
//! - **Simulation**: Each invocation runs against a read/write set; nothing is
//!   visible to other invocations until commit
//! - **Single Writer**: One committer task validates read versions and applies
//!   write sets, so concurrent endorsements touching the same account conflict
//!   instead of racing
//! - **RocksDB**: Durable world state with atomic write batches
//!
//! # Invariants
//!
//! - Conservation: outside of issuance and redemption, the sum of all balances
//!   never changes
//! - Non-negativity: no committed balance is below zero
//! - Atomicity: a rejected invocation leaves no trace in the world state
//! - Determinism: identical inputs and prior state produce identical writes

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod error;
pub mod config;
pub mod policy;
pub mod stub;
pub mod state;
pub mod storage;
pub mod ledger;
pub mod registry;
pub mod history;
pub mod contract;
pub mod dispatch;
pub mod committer;
pub mod metrics;
pub mod peer;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use types::{
    AccountBalance, AccountId, Amount, DocType, TokenAsset, TokenStatus, TransactionHistory,
    TransactionType,
};
pub use config::Config;
pub use policy::{AuthorizationPolicy, CallerIdentity, Role};
pub use stub::{ChaincodeStub, Selector, Simulation};
pub use state::{MemoryWorldState, ReadWriteSet, Version, WorldState};
pub use storage::RocksWorldState;
pub use contract::LedgerContract;
pub use dispatch::{invoke, Operation, Response};
pub use metrics::Metrics;
pub use peer::{Endorsement, Peer, Proposal};
