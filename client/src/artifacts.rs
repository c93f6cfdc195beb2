//! Compiled contract artifacts.
//!
//! Artifacts are the JSON files a Hardhat build writes under `artifacts/`:
//! one `<ContractName>.json` per contract with `abi` and `bytecode` fields.
//! Lookups search the tree recursively, skipping `*.dbg.json` debug files.

use crate::{Error, Result};
use ethers::{
    abi::{self, Abi, Token},
    types::{Bytes, H256},
    utils::keccak256,
};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// A contract's interface and creation code.
#[derive(Clone, Debug)]
pub struct Artifact {
    pub name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
struct ArtifactFile {
    abi: Abi,
    bytecode: Bytes,
}

impl Artifact {
    /// Creation code followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, args: &[Token]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&abi::encode(args));
        code.into()
    }

    /// Identity of a deployment: changes when either the code or the arguments do.
    pub fn fingerprint(&self, args: &[Token]) -> H256 {
        H256(keccak256(self.creation_code(args)))
    }
}

/// Reads artifacts from a build output directory.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> Result<Artifact> {
        let path = find(&self.root, &format!("{name}.json"))?.ok_or_else(|| Error::Artifact {
            name: name.to_string(),
            reason: format!("not found under {}", self.root.display()),
        })?;
        let data = fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let file: ArtifactFile = serde_json::from_slice(&data).map_err(|err| Error::Artifact {
            name: name.to_string(),
            reason: format!("{}: {err}", path.display()),
        })?;
        if file.bytecode.is_empty() {
            return Err(Error::Artifact {
                name: name.to_string(),
                reason: "no creation bytecode (abstract contract or interface)".to_string(),
            });
        }
        Ok(Artifact {
            name: name.to_string(),
            abi: file.abi,
            bytecode: file.bytecode,
        })
    }
}

fn find(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name().to_str() == Some(file_name) {
            return Ok(Some(path));
        }
    }
    // Deterministic pick when two builds carry the same contract name.
    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn write_artifact(dir: &Path, name: &str, bytecode: &str) {
        let nested = dir.join(format!("contracts/{name}.sol"));
        fs::create_dir_all(&nested).unwrap();
        let body = serde_json::json!({
            "contractName": name,
            "abi": [],
            "bytecode": bytecode,
        });
        fs::write(nested.join(format!("{name}.json")), body.to_string()).unwrap();
        fs::write(nested.join(format!("{name}.dbg.json")), "{}").unwrap();
    }

    #[test]
    fn test_load_nested_artifact() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "ENSRegistry", "0x6080");
        let store = ArtifactStore::new(dir.path());
        let artifact = store.load("ENSRegistry").unwrap();
        assert_eq!(artifact.bytecode.to_vec(), vec![0x60, 0x80]);
        assert!(matches!(
            store.load("Missing"),
            Err(Error::Artifact { .. })
        ));
    }

    #[test]
    fn test_fingerprint_tracks_args() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "PublicResolver", "0x6080");
        let artifact = ArtifactStore::new(dir.path()).load("PublicResolver").unwrap();
        let a = artifact.fingerprint(&[Token::Address(Address::repeat_byte(1))]);
        let b = artifact.fingerprint(&[Token::Address(Address::repeat_byte(2))]);
        assert_ne!(a, b, "constructor args must change the fingerprint");
        assert_eq!(a, artifact.fingerprint(&[Token::Address(Address::repeat_byte(1))]));
    }

    #[test]
    fn test_reject_interface_artifact() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "IRegistry", "0x");
        assert!(ArtifactStore::new(dir.path()).load("IRegistry").is_err());
    }
}
