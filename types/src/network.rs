use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named signing identities used by deployment and registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    /// Sends deployments and bootstrap transactions.
    Deployer,
    /// Ends up holding the root and operates the registration flow.
    Owner,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployer => f.write_str("deployer"),
            Self::Owner => f.write_str("owner"),
        }
    }
}

/// Resolved addresses of the named accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAccounts {
    pub deployer: Address,
    pub owner: Address,
}

impl NamedAccounts {
    pub fn address(&self, account: Account) -> Address {
        match account {
            Account::Deployer => self.deployer,
            Account::Owner => self.owner,
        }
    }
}

/// Identity of the target network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub name: String,
    pub chain_id: u64,
    /// Network still runs the legacy registry that must be migrated.
    pub legacy: bool,
}

/// Holder of the registry's root node, relative to the named accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootAuthorityState {
    Unset,
    HeldByDeployer,
    HeldByFinalOwner,
    HeldByOther(Address),
}

impl RootAuthorityState {
    /// Classify `holder`. The final owner wins when both accounts are the same.
    pub fn classify(holder: Address, deployer: Address, final_owner: Address) -> Self {
        if holder.is_zero() {
            Self::Unset
        } else if holder == final_owner {
            Self::HeldByFinalOwner
        } else if holder == deployer {
            Self::HeldByDeployer
        } else {
            Self::HeldByOther(holder)
        }
    }
}

impl fmt::Display for RootAuthorityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::HeldByDeployer => f.write_str("held by deployer"),
            Self::HeldByFinalOwner => f.write_str("held by final owner"),
            Self::HeldByOther(holder) => write!(f, "held by {holder:?}"),
        }
    }
}
