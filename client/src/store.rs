//! Persisted book of deployed contracts, keyed by logical name.
//!
//! One JSON file per network (`<dir>/<network>.json`). Every write goes to a
//! temporary file first and is renamed over the old one, so an interrupted
//! run leaves either the previous book or the new one.

use crate::{Error, Result};
use ethers::types::{Address, H256};
use namereg_types::NetworkIdentity;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const ENS_REGISTRY: &str = "ENSRegistry";
pub const LEGACY_ENS_REGISTRY: &str = "LegacyENSRegistry";
pub const PUBLIC_RESOLVER: &str = "PublicResolver";
pub const REVERSE_REGISTRAR: &str = "ReverseRegistrar";
pub const ETH_REGISTRAR_CONTROLLER: &str = "ETHRegistrarController";

/// Where a logical contract lives and what produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub address: Address,
    pub artifact: String,
    pub fingerprint: H256,
    #[serde(default)]
    pub tx_hash: Option<H256>,
    #[serde(default)]
    pub block: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct BookFile {
    network: String,
    chain_id: u64,
    contracts: BTreeMap<String, DeploymentRecord>,
}

/// Logical name to deployment mapping for one network.
#[derive(Debug)]
pub struct NamedContracts {
    path: Option<PathBuf>,
    network: String,
    chain_id: u64,
    contracts: BTreeMap<String, DeploymentRecord>,
}

impl NamedContracts {
    /// A book that is never written to disk.
    pub fn in_memory(identity: &NetworkIdentity) -> Self {
        Self {
            path: None,
            network: identity.name.clone(),
            chain_id: identity.chain_id,
            contracts: BTreeMap::new(),
        }
    }

    /// Open (or start) the book for `identity` under `dir`.
    pub fn open(dir: &Path, identity: &NetworkIdentity) -> Result<Self> {
        let path = dir.join(format!("{}.json", identity.name));
        let contracts = if path.exists() {
            let data = fs::read(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            let file: BookFile = serde_json::from_slice(&data)?;
            if file.chain_id != identity.chain_id {
                return Err(Error::ChainMismatch {
                    path,
                    expected: identity.chain_id,
                    found: file.chain_id,
                });
            }
            file.contracts
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = contracts.len(), "opened deployment store");
        Ok(Self {
            path: Some(path),
            network: identity.name.clone(),
            chain_id: identity.chain_id,
            contracts,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.contracts.get(name)
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.contracts.get(name).map(|record| record.address)
    }

    /// Address of `name`, or [Error::UnknownContract].
    pub fn require(&self, name: &str) -> Result<Address> {
        self.address(name)
            .ok_or_else(|| Error::UnknownContract(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn entries(&self) -> &BTreeMap<String, DeploymentRecord> {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Insert or replace `name` and persist the book.
    pub fn record(&mut self, name: &str, record: DeploymentRecord) -> Result<()> {
        self.contracts.insert(name.to_string(), record);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = BookFile {
            network: self.network.clone(),
            chain_id: self.chain_id,
            contracts: self.contracts.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data).map_err(|source| Error::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(chain_id: u64) -> NetworkIdentity {
        NetworkIdentity {
            name: "localhost".to_string(),
            chain_id,
            legacy: false,
        }
    }

    fn record(byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            address: Address::repeat_byte(byte),
            artifact: ENS_REGISTRY.to_string(),
            fingerprint: H256::repeat_byte(byte),
            tx_hash: Some(H256::repeat_byte(byte)),
            block: Some(byte as u64),
        }
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = NamedContracts::open(dir.path(), &identity(31337)).unwrap();
        assert!(book.is_empty());
        book.record(ENS_REGISTRY, record(1)).unwrap();

        let reopened = NamedContracts::open(dir.path(), &identity(31337)).unwrap();
        assert_eq!(reopened.entries(), book.entries());
        assert_eq!(reopened.require(ENS_REGISTRY).unwrap(), Address::repeat_byte(1));
        assert!(!dir.path().join("localhost.json.tmp").exists());
    }

    #[test]
    fn test_chain_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = NamedContracts::open(dir.path(), &identity(1)).unwrap();
        book.record(ENS_REGISTRY, record(1)).unwrap();
        let err = NamedContracts::open(dir.path(), &identity(5)).unwrap_err();
        assert!(matches!(
            err,
            Error::ChainMismatch {
                expected: 5,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_contract() {
        let book = NamedContracts::in_memory(&identity(1));
        assert!(matches!(
            book.require(PUBLIC_RESOLVER),
            Err(Error::UnknownContract(name)) if name == PUBLIC_RESOLVER
        ));
    }
}
