//! Node hashing for the naming tree.
//!
//! Nodes are identified by the recursive `namehash` of their dotted name: the
//! root is 32 zero bytes and every label is folded in as
//! `keccak256(parent || keccak256(label))`.

use ethers::{
    types::{Address, H256},
    utils::keccak256,
};
use thiserror::Error;

/// Node of the naming root.
pub const ROOT_NODE: H256 = H256::zero();

/// Top-level domain handled by the registrar controller.
pub const ETH_TLD: &str = "eth";

/// Name whose resolver is the canonical public resolver.
pub const RESOLVER_NAME: &str = "resolver.eth";

/// Suffix under which reverse records live.
pub const REVERSE_SUFFIX: &str = "addr.reverse";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label {0:?} contains a '.'")]
    Dotted(String),
    #[error("label {0:?} is not lowercase")]
    NotNormalized(String),
}

/// Hash a single label.
pub fn labelhash(label: &str) -> H256 {
    H256(keccak256(label.as_bytes()))
}

/// Hash a dotted name into its node. The empty name is the root.
pub fn namehash(name: &str) -> H256 {
    if name.is_empty() {
        return ROOT_NODE;
    }
    name.rsplit('.').fold(ROOT_NODE, |node, label| subnode(node, labelhash(label)))
}

/// Node of `label` directly under `parent`.
pub fn subnode(parent: H256, label: H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(parent.as_bytes());
    buf[32..].copy_from_slice(label.as_bytes());
    H256(keccak256(buf))
}

/// Fully-qualified name of a second-level label under the registrar's TLD.
pub fn full_name(label: &str) -> String {
    format!("{label}.{ETH_TLD}")
}

/// Reverse-resolution name of an address (`<hex>.addr.reverse`).
pub fn reverse_name(address: Address) -> String {
    format!("{}.{REVERSE_SUFFIX}", hex::encode(address.as_bytes()))
}

/// Reverse-resolution node of an address.
pub fn reverse_node(address: Address) -> H256 {
    namehash(&reverse_name(address))
}

/// Check that a label can be submitted to the registrar as-is.
///
/// Normalisation is the caller's job; this only rejects input that would hash
/// to a different node than the operator expects.
pub fn validate_label(label: &str) -> Result<(), LabelError> {
    if label.is_empty() {
        return Err(LabelError::Empty);
    }
    if label.contains('.') {
        return Err(LabelError::Dotted(label.to_string()));
    }
    if label.chars().any(char::is_uppercase) {
        return Err(LabelError::NotNormalized(label.to_string()));
    }
    Ok(())
}
