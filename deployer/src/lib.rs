//! Ordered, idempotent deployment of an ENS-style naming system.
//!
//! A [plan::Plan] lists deployment units. The [sequencer::Sequencer] selects
//! the units for the target network, orders them with [graph::order] and
//! deploys whatever the [namereg_client::NamedContracts] book does not already
//! hold. Hooks run after each unit; [hooks::EnsHooks] bootstraps the registry,
//! migrates a legacy registry and hands the root to its final owner through
//! [root::RootOwnershipController].

use ethers::types::Address;
use namereg_client::Error;
use thiserror::Error as ThisError;

pub mod graph;
pub mod hooks;
pub mod legacy;
pub mod plan;
pub mod root;
pub mod sequencer;

#[cfg(test)]
mod idempotency_tests;

pub use hooks::{EnsHooks, Hooks, NoHooks};
pub use legacy::{ImportFailure, ImportOutcome, LegacyImporter, NameListImporter};
pub use plan::{Arg, DeploymentUnit, Mode, Plan};
pub use root::RootOwnershipController;
pub use sequencer::{DeploymentReport, Sequencer, UnitOutcome, UnitReport};

#[derive(Debug, ThisError)]
pub enum DeployError {
    #[error("dependency cycle between units: {}", units.join(", "))]
    CyclicDependency { units: Vec<String> },
    #[error("unit {unit} depends on unknown {dependency}")]
    UnknownDependency { unit: String, dependency: String },
    #[error("unit {unit} needs {dependency}, which has not been deployed")]
    MissingDependency { unit: String, dependency: String },
    #[error("unit {0} is defined more than once")]
    DuplicateUnit(String),
    #[error("unit {unit} failed: {source}")]
    Unit {
        unit: String,
        #[source]
        source: Error,
    },
    #[error("legacy registry root is held by {holder:?}; the migrator is {migrator:?}")]
    LegacyRootHeld { holder: Address, migrator: Address },
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: String, reason: String },
    #[error(transparent)]
    Client(#[from] Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;
