//! Dependency-ordered, idempotent deployment.

use crate::{
    graph::{self, Edge},
    hooks::Hooks,
    plan::{DeploymentUnit, Mode, Plan},
    DeployError, Result,
};
use ethers::{
    abi::Token,
    types::{Address, H256},
};
use namereg_client::{DeploymentRecord, Error, NamedContracts, Network};
use std::collections::HashSet;
use tracing::{debug, info};

/// What happened to a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitOutcome {
    Deployed { address: Address, tx_hash: H256 },
    Reused { address: Address },
}

impl UnitOutcome {
    pub fn address(&self) -> Address {
        match self {
            Self::Deployed { address, .. } | Self::Reused { address } => *address,
        }
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitReport {
    pub id: String,
    pub artifact: String,
    pub outcome: UnitOutcome,
}

/// Units in the order they ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub units: Vec<UnitReport>,
}

impl DeploymentReport {
    pub fn deployed(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| unit.outcome.is_deployed())
    }

    pub fn reused(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| !unit.outcome.is_deployed())
    }
}

/// Runs a [Plan] against one network and its book.
pub struct Sequencer<'a, N: Network> {
    network: &'a N,
    tags: Vec<String>,
    force: HashSet<String>,
    force_all: bool,
}

impl<'a, N: Network> Sequencer<'a, N> {
    pub fn new(network: &'a N) -> Self {
        Self {
            network,
            tags: Vec::new(),
            force: HashSet::new(),
            force_all: false,
        }
    }

    /// Only run units answering to `tags` and what they depend on.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Redeploy `id` even if the book holds a matching deployment.
    pub fn force(mut self, id: impl Into<String>) -> Self {
        self.force.insert(id.into());
        self
    }

    pub fn force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    /// Selected units, in execution order.
    pub fn schedule(&self, plan: &Plan, book: &NamedContracts) -> Result<Vec<DeploymentUnit>> {
        let mode = Mode::of(self.network.identity().legacy);
        let units = plan.select(mode, &self.tags)?;
        let order = graph::order(&units, book)?;
        let mut slots: Vec<Option<DeploymentUnit>> = units.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }

    pub async fn run<H: Hooks<N>>(
        &self,
        plan: &Plan,
        book: &mut NamedContracts,
        hooks: &mut H,
    ) -> Result<DeploymentReport> {
        let units = self.schedule(plan, book)?;
        info!(
            network = %self.network.identity().name,
            units = units.len(),
            "starting deployment"
        );
        let mut report = DeploymentReport::default();
        for (index, unit) in units.iter().enumerate() {
            self.check_dependencies(&units, index, book)?;
            let outcome = self
                .run_unit(unit, book)
                .await
                .map_err(|source| DeployError::Unit {
                    unit: unit.id.clone(),
                    source,
                })?;
            hooks
                .after_unit(self.network, book, unit, &outcome)
                .await
                .map_err(|err| match err {
                    DeployError::Client(source) => DeployError::Unit {
                        unit: unit.id.clone(),
                        source,
                    },
                    other => other,
                })?;
            report.units.push(UnitReport {
                id: unit.id.clone(),
                artifact: unit.artifact_name().to_string(),
                outcome,
            });
        }
        info!(
            deployed = report.deployed().count(),
            reused = report.reused().count(),
            "deployment complete"
        );
        Ok(report)
    }

    /// Every unit `units[index]` waits for must be in the book by now.
    fn check_dependencies(
        &self,
        units: &[DeploymentUnit],
        index: usize,
        book: &NamedContracts,
    ) -> Result<()> {
        for edge in graph::edges(units, index, book)? {
            let name = match edge {
                Edge::Unit(other) => units[other].id.clone(),
                Edge::Deployed(name) => name,
            };
            if !book.contains(&name) {
                return Err(DeployError::MissingDependency {
                    unit: units[index].id.clone(),
                    dependency: name,
                });
            }
        }
        Ok(())
    }

    fn forced(&self, unit: &DeploymentUnit) -> bool {
        self.force_all || unit.force || self.force.contains(&unit.id)
    }

    async fn run_unit(
        &self,
        unit: &DeploymentUnit,
        book: &mut NamedContracts,
    ) -> std::result::Result<UnitOutcome, Error> {
        let artifact = unit.artifact_name();
        let accounts = self.network.accounts();
        let args = unit
            .args
            .iter()
            .map(|arg| arg.resolve(book, accounts))
            .collect::<std::result::Result<Vec<Token>, _>>()?;
        let fingerprint = self.network.fingerprint(artifact, &args).await?;

        if !self.forced(unit) {
            if let Some(existing) = book.get(&unit.id) {
                if existing.artifact != artifact {
                    debug!(unit = %unit.id, previous = %existing.artifact, "artifact changed");
                } else if existing.fingerprint != fingerprint {
                    debug!(unit = %unit.id, "bytecode or arguments changed");
                } else if !self.network.has_code(existing.address).await? {
                    debug!(unit = %unit.id, address = ?existing.address, "no code at recorded address");
                } else {
                    info!(unit = %unit.id, address = ?existing.address, tx = ?existing.tx_hash, "reusing");
                    return Ok(UnitOutcome::Reused {
                        address: existing.address,
                    });
                }
            }
        }

        let deployed = self.network.deploy(artifact, &args).await?;
        book.record(
            &unit.id,
            DeploymentRecord {
                address: deployed.address,
                artifact: artifact.to_string(),
                fingerprint: deployed.fingerprint,
                tx_hash: Some(deployed.tx_hash),
                block: deployed.block,
            },
        )?;
        info!(
            unit = %unit.id,
            artifact,
            address = ?deployed.address,
            tx = ?deployed.tx_hash,
            "deployed"
        );
        Ok(UnitOutcome::Deployed {
            address: deployed.address,
            tx_hash: deployed.tx_hash,
        })
    }
}
