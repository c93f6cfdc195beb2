//! Migration of names out of a legacy registry.
//!
//! The migrator temporarily holds the legacy root, imports names, then
//! releases the root to the zero address. Once released, the legacy registry
//! is frozen and only read through the fallback registry.

use crate::{DeployError, Result};
use ethers::types::Address;
use namereg_client::{Confirmed, Network, Registry};
use namereg_types::{labelhash, namehash, Account, ROOT_NODE};
use serde::Deserialize;
use std::{fs, future::Future, path::Path, str::FromStr};
use tracing::{info, warn};

/// A name the importer could not write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub failures: Vec<ImportFailure>,
}

/// Writes names into a legacy registry while the migrator holds its root.
pub trait LegacyImporter<N: Network> {
    /// Import through `registry`, which signs as the migrator. Failures are
    /// collected rather than returned.
    fn import(&self, network: &N, registry: &N::Registry) -> impl Future<Output = ImportOutcome>;
}

/// Entry of a name list file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyName {
    /// Parent name; empty for a top-level label.
    #[serde(default)]
    pub parent: String,
    pub label: String,
    /// `deployer`, `owner` or a hex address.
    pub owner: String,
}

impl LegacyName {
    pub fn name(&self) -> String {
        if self.parent.is_empty() {
            self.label.clone()
        } else {
            format!("{}.{}", self.label, self.parent)
        }
    }
}

/// Applies a list of `(parent, label, owner)` entries with `setSubnodeOwner`.
///
/// Parents must come before their children.
#[derive(Clone, Debug, Default)]
pub struct NameListImporter {
    names: Vec<LegacyName>,
}

impl NameListImporter {
    pub fn new(names: Vec<LegacyName>) -> Self {
        Self { names }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let manifest = |reason: String| DeployError::Manifest {
            path: path.display().to_string(),
            reason,
        };
        let yaml = fs::read_to_string(path).map_err(|err| manifest(err.to_string()))?;
        let names = serde_yaml::from_str(&yaml).map_err(|err| manifest(err.to_string()))?;
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn owner_address<N: Network>(network: &N, owner: &str) -> std::result::Result<Address, String> {
    match owner {
        "deployer" => Ok(network.accounts().deployer),
        "owner" => Ok(network.accounts().owner),
        other => Address::from_str(other).map_err(|err| format!("invalid owner {other:?}: {err}")),
    }
}

impl<N: Network> LegacyImporter<N> for NameListImporter {
    async fn import(&self, network: &N, registry: &N::Registry) -> ImportOutcome {
        let mut outcome = ImportOutcome::default();
        for entry in &self.names {
            let name = entry.name();
            let owner = match owner_address(network, &entry.owner) {
                Ok(owner) => owner,
                Err(reason) => {
                    outcome.failures.push(ImportFailure { name, reason });
                    continue;
                }
            };
            match registry
                .set_subnode_owner(namehash(&entry.parent), labelhash(&entry.label), owner)
                .await
            {
                Ok(confirmed) => {
                    info!(%name, ?owner, tx = ?confirmed.tx_hash, "imported legacy name");
                    outcome.imported += 1;
                }
                Err(err) => outcome.failures.push(ImportFailure {
                    name,
                    reason: err.to_string(),
                }),
            }
        }
        outcome
    }
}

/// Result of a migration run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: ImportOutcome,
    /// Transaction that released the legacy root.
    pub released: Confirmed,
}

/// Import names into the legacy registry at `legacy` and release its root.
///
/// Returns `None` when the root was already released by an earlier run. The
/// release is attempted whatever the import outcome.
pub async fn migrate<N: Network, I: LegacyImporter<N>>(
    network: &N,
    legacy: Address,
    migrator: Account,
    importer: &I,
) -> Result<Option<MigrationReport>> {
    let accounts = network.accounts();
    let migrator_address = accounts.address(migrator);
    let holder = network
        .registry(legacy, Account::Deployer)
        .owner(ROOT_NODE)
        .await?;
    if holder.is_zero() {
        info!(registry = ?legacy, "legacy root already released, skipping migration");
        return Ok(None);
    }

    if holder != migrator_address {
        let from = if holder == accounts.deployer {
            Account::Deployer
        } else if holder == accounts.owner {
            Account::Owner
        } else {
            return Err(DeployError::LegacyRootHeld {
                holder,
                migrator: migrator_address,
            });
        };
        let confirmed = network
            .registry(legacy, from)
            .set_owner(ROOT_NODE, migrator_address)
            .await?;
        info!(registry = ?legacy, %migrator, tx = ?confirmed.tx_hash, "granted legacy root to migrator");
    }

    let registry = network.registry(legacy, migrator);
    info!(registry = ?legacy, "importing legacy names");
    let outcome = importer.import(network, &registry).await;
    let released = registry.set_owner(ROOT_NODE, Address::zero()).await?;
    info!(registry = ?legacy, tx = ?released.tx_hash, "released legacy root");

    for failure in &outcome.failures {
        warn!(name = %failure.name, reason = %failure.reason, "legacy name not imported");
    }
    info!(
        imported = outcome.imported,
        failed = outcome.failures.len(),
        "legacy migration complete"
    );
    Ok(Some(MigrationReport { outcome, released }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use namereg_client::mocks::{local_identity, MockNetwork};

    fn names(yaml: &str) -> NameListImporter {
        NameListImporter::new(serde_yaml::from_str(yaml).unwrap())
    }

    async fn legacy_registry(network: &MockNetwork) -> Address {
        network
            .deploy("LegacyENSRegistry", &[])
            .await
            .unwrap()
            .address
    }

    #[tokio::test]
    async fn test_migrate_imports_and_releases() {
        let network = MockNetwork::new(local_identity(true));
        let legacy = legacy_registry(&network).await;
        let importer = names(
            r#"
- label: eth
  owner: owner
- parent: eth
  label: legacy
  owner: "0x00000000000000000000000000000000000000aa"
"#,
        );
        let report = migrate(&network, legacy, Account::Owner, &importer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome.imported, 2);
        assert!(report.outcome.failures.is_empty());
        assert_eq!(network.owner_of(legacy, ROOT_NODE), Some(Address::zero()));
        assert_eq!(
            network.owner_of(legacy, namehash("legacy.eth")),
            Some(Address::from_low_u64_be(0xaa))
        );
    }

    #[tokio::test]
    async fn test_release_after_failed_import() {
        let network = MockNetwork::new(local_identity(true));
        let legacy = legacy_registry(&network).await;
        // The child comes first, so the migrator does not own `eth` yet.
        let importer = names(
            r#"
- parent: eth
  label: orphan
  owner: deployer
- label: eth
  owner: bogus
"#,
        );
        let report = migrate(&network, legacy, Account::Owner, &importer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome.imported, 0);
        let failed: Vec<_> = report
            .outcome
            .failures
            .iter()
            .map(|failure| failure.name.as_str())
            .collect();
        assert_eq!(failed, ["orphan.eth", "eth"]);
        assert_eq!(network.owner_of(legacy, ROOT_NODE), Some(Address::zero()));
    }

    #[tokio::test]
    async fn test_released_root_not_migrated_again() {
        let network = MockNetwork::new(local_identity(true));
        let legacy = legacy_registry(&network).await;
        let importer = NameListImporter::default();
        assert!(migrate(&network, legacy, Account::Owner, &importer)
            .await
            .unwrap()
            .is_some());

        let before = network.transactions();
        assert!(migrate(&network, legacy, Account::Owner, &importer)
            .await
            .unwrap()
            .is_none());
        assert_eq!(network.transactions(), before);
    }

    #[tokio::test]
    async fn test_foreign_root_holder() {
        let network = MockNetwork::new(local_identity(true));
        let legacy = legacy_registry(&network).await;
        let stranger = Address::repeat_byte(0x55);
        network
            .registry(legacy, Account::Deployer)
            .set_owner(ROOT_NODE, stranger)
            .await
            .unwrap();
        let err = migrate(&network, legacy, Account::Owner, &NameListImporter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::LegacyRootHeld { holder, .. } if holder == stranger));
    }

    #[test]
    fn test_legacy_name() {
        let entry = LegacyName {
            parent: "eth".to_string(),
            label: "foo".to_string(),
            owner: "owner".to_string(),
        };
        assert_eq!(entry.name(), "foo.eth");
    }
}
