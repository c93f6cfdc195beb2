//! Steps that run after a unit is deployed or reused.
//!
//! Every step reads on-chain state first and only sends a transaction when
//! the state differs from the target, so hooks are safe to rerun.

use crate::{
    legacy::{self, LegacyImporter, MigrationReport},
    plan::DeploymentUnit,
    root::RootOwnershipController,
    sequencer::UnitOutcome,
    Result,
};
use ethers::types::Address;
use namereg_client::{
    store::{ENS_REGISTRY, LEGACY_ENS_REGISTRY, PUBLIC_RESOLVER, REVERSE_REGISTRAR},
    NamedContracts, Network, Registry, Resolver, ReverseRegistrar,
};
use namereg_types::{labelhash, namehash, Account, RootAuthorityState, ETH_TLD, RESOLVER_NAME, ROOT_NODE};
use std::future::Future;
use tracing::{info, warn};

pub trait Hooks<N: Network> {
    fn after_unit(
        &mut self,
        network: &N,
        book: &NamedContracts,
        unit: &DeploymentUnit,
        outcome: &UnitOutcome,
    ) -> impl Future<Output = Result<()>>;
}

/// Runs nothing.
pub struct NoHooks;

impl<N: Network> Hooks<N> for NoHooks {
    async fn after_unit(
        &mut self,
        _: &N,
        _: &NamedContracts,
        _: &DeploymentUnit,
        _: &UnitOutcome,
    ) -> Result<()> {
        Ok(())
    }
}

/// Bootstrap of the naming system, keyed by unit id.
///
/// - `LegacyENSRegistry`: migrate legacy names and release the legacy root.
/// - `ENSRegistry`: assign `eth` and `resolver.eth`, then finalize the root.
/// - `PublicResolver`: wire the reverse registrar and `resolver.eth`.
pub struct EnsHooks<I> {
    importer: I,
    migrator: Account,
    root_stays_open: bool,
    root: Option<RootAuthorityState>,
    migration: Option<MigrationReport>,
}

impl<I> EnsHooks<I> {
    pub fn new(importer: I) -> Self {
        Self {
            importer,
            migrator: Account::Owner,
            root_stays_open: false,
            root: None,
            migration: None,
        }
    }

    /// Account that holds the legacy root while names are imported.
    pub fn with_migrator(mut self, migrator: Account) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn root_stays_open(mut self, stays_open: bool) -> Self {
        self.root_stays_open = stays_open;
        self
    }

    /// Root state after the last registry bootstrap.
    pub fn root(&self) -> Option<RootAuthorityState> {
        self.root
    }

    /// Report of the migration, if one ran.
    pub fn migration(&self) -> Option<&MigrationReport> {
        self.migration.as_ref()
    }
}

impl<N: Network, I: LegacyImporter<N>> Hooks<N> for EnsHooks<I> {
    async fn after_unit(
        &mut self,
        network: &N,
        book: &NamedContracts,
        unit: &DeploymentUnit,
        outcome: &UnitOutcome,
    ) -> Result<()> {
        let address = outcome.address();
        match unit.id.as_str() {
            LEGACY_ENS_REGISTRY => {
                if let Some(report) =
                    legacy::migrate(network, address, self.migrator, &self.importer).await?
                {
                    self.migration = Some(report);
                }
            }
            ENS_REGISTRY => {
                bootstrap_registry(network, address).await?;
                let state = RootOwnershipController::new(network, address)
                    .stays_open(self.root_stays_open)
                    .finalize()
                    .await?;
                self.root = Some(state);
            }
            PUBLIC_RESOLVER => wire_resolver(network, book, address).await?,
            _ => {}
        }
        Ok(())
    }
}

/// Give `eth` to the deployer and `resolver.eth` to the owner when the
/// registry has no record of its own for them. Names visible only through a
/// fallback registry are reassigned in this one.
pub async fn bootstrap_registry<N: Network>(network: &N, at: Address) -> Result<()> {
    let accounts = network.accounts();
    let registry = network.registry(at, Account::Deployer);
    let eth = namehash(ETH_TLD);

    if !registry.record_exists(eth).await? {
        let confirmed = registry
            .set_subnode_owner(ROOT_NODE, labelhash(ETH_TLD), accounts.deployer)
            .await?;
        info!(owner = ?accounts.deployer, tx = ?confirmed.tx_hash, "assigned eth");
    }

    let resolver_node = namehash(RESOLVER_NAME);
    if registry.record_exists(resolver_node).await? {
        return Ok(());
    }
    let eth_owner = registry.owner(eth).await?;
    if eth_owner != accounts.deployer {
        warn!(?eth_owner, "eth is not held by the deployer; cannot assign resolver.eth");
        return Ok(());
    }
    let confirmed = registry
        .set_subnode_owner(eth, labelhash("resolver"), accounts.owner)
        .await?;
    info!(owner = ?accounts.owner, tx = ?confirmed.tx_hash, "assigned resolver.eth");
    Ok(())
}

/// Point the reverse registrar and `resolver.eth` at the public resolver.
pub async fn wire_resolver<N: Network>(
    network: &N,
    book: &NamedContracts,
    resolver: Address,
) -> Result<()> {
    let accounts = network.accounts();

    match book.address(REVERSE_REGISTRAR) {
        Some(at) => {
            let reverse = network.reverse_registrar(at, Account::Deployer);
            if reverse.default_resolver().await? != resolver {
                let confirmed = reverse.set_default_resolver(resolver).await?;
                info!(?resolver, tx = ?confirmed.tx_hash, "set reverse registrar default resolver");
            }
        }
        None => warn!("no reverse registrar deployed; default resolver not set"),
    }

    let registry = network.registry(book.require(ENS_REGISTRY)?, Account::Owner);
    let node = namehash(RESOLVER_NAME);
    let holder = registry.owner(node).await?;
    if holder != accounts.owner {
        warn!(?holder, "resolver.eth is not owned by the owner; not setting resolver");
        return Ok(());
    }
    if registry.resolver(node).await? != resolver {
        let confirmed = registry.set_resolver(node, resolver).await?;
        info!(?resolver, tx = ?confirmed.tx_hash, "set resolver of resolver.eth");
    }
    let public = network.resolver(resolver, Account::Owner);
    if public.addr(node).await? != resolver {
        let confirmed = public.set_addr(node, resolver).await?;
        info!(?resolver, tx = ?confirmed.tx_hash, "set address of resolver.eth");
    }
    Ok(())
}
