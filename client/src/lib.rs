//! SDK for driving an ENS-style naming registry.
//!
//! Every remote contract is reached through a narrow capability trait
//! ([Registry], [RegistrarController], [Resolver], [ReverseRegistrar]) handed out
//! by a [Network]. [evm::EvmNetwork] implements them over JSON-RPC; tests use
//! the in-memory network in `mocks` (feature `mocks`).
//!
//! Deployed addresses live in [NamedContracts], which persists per network and
//! is shared between the deployer and the [CommitRevealRegistrar].

pub mod artifacts;
pub mod config;
pub mod defaults;
pub mod evm;
pub mod interfaces;
pub mod registrar;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


pub use interfaces::{
    CommitmentParams, Confirmed, DeployedContract, Network, RegistrarController, Registry,
    Resolver, ReverseRegistrar,
};
pub use registrar::{
    CommitRevealRegistrar, PendingCommitment, RegistrarConfig, RegistrarContracts,
    RegistrationError, RegistrationResult, Verification,
};
pub use store::{DeploymentRecord, NamedContracts};

use ethers::{
    providers::ProviderError,
    types::{Address, H256},
};
use namereg_types::Revert;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("{call} failed: {reason}")]
    Contract { call: &'static str, reason: String },
    #[error("{call} reverted: {revert}")]
    Reverted { call: &'static str, revert: Revert },
    #[error("{call} transaction {tx_hash:?} was mined but failed")]
    Failed { call: &'static str, tx_hash: H256 },
    #[error("{call} returned malformed data: {reason}")]
    Decode { call: &'static str, reason: String },
    #[error("transaction {0:?} dropped before confirmation")]
    Dropped(H256),
    #[error("invalid signing key for {account}: {reason}")]
    InvalidKey { account: String, reason: String },
    #[error("artifact {name}: {reason}")]
    Artifact { name: String, reason: String },
    #[error("no contract named {0} in the deployment store")]
    UnknownContract(String),
    #[error("no code at {0:?}")]
    NoCode(Address),
    #[error("deployment store {path} belongs to chain {found}, expected {expected}")]
    ChainMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("endpoint serves chain {found}, expected {expected}")]
    WrongChain { expected: u64, found: u64 },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Revert reported by the remote contract, if any.
    pub fn revert(&self) -> Option<&Revert> {
        match self {
            Self::Reverted { revert, .. } => Some(revert),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
