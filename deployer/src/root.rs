//! Hand-off of the registry root to its final owner.

use crate::Result;
use ethers::types::Address;
use namereg_client::{Network, Registry};
use namereg_types::{Account, RootAuthorityState, ROOT_NODE};
use tracing::{info, warn};

/// Moves the root node of a registry from the deployer to the owner, once.
pub struct RootOwnershipController<'a, N: Network> {
    network: &'a N,
    registry: Address,
    stays_open: bool,
}

impl<'a, N: Network> RootOwnershipController<'a, N> {
    pub fn new(network: &'a N, registry: Address) -> Self {
        Self {
            network,
            registry,
            stays_open: false,
        }
    }

    /// Report the root holder without ever transferring it.
    pub fn stays_open(mut self, stays_open: bool) -> Self {
        self.stays_open = stays_open;
        self
    }

    /// Current holder of the root, relative to the named accounts.
    pub async fn state(&self) -> Result<RootAuthorityState> {
        let accounts = self.network.accounts();
        let holder = self
            .network
            .registry(self.registry, Account::Deployer)
            .owner(ROOT_NODE)
            .await?;
        Ok(RootAuthorityState::classify(
            holder,
            accounts.deployer,
            accounts.owner,
        ))
    }

    /// Transfer the root to the owner if the deployer still holds it.
    ///
    /// Any other holder is reported and left alone, so repeated calls issue
    /// at most one transaction in total.
    pub async fn finalize(&self) -> Result<RootAuthorityState> {
        let state = self.state().await?;
        if self.stays_open {
            info!(registry = ?self.registry, %state, "root stays open, not transferring");
            return Ok(state);
        }
        match state {
            RootAuthorityState::HeldByFinalOwner => {
                info!(registry = ?self.registry, "root already held by owner");
                Ok(state)
            }
            RootAuthorityState::HeldByDeployer => {
                let owner = self.network.accounts().owner;
                let confirmed = self
                    .network
                    .registry(self.registry, Account::Deployer)
                    .set_owner(ROOT_NODE, owner)
                    .await?;
                info!(
                    registry = ?self.registry,
                    ?owner,
                    tx = ?confirmed.tx_hash,
                    "transferred root to owner"
                );
                let after = self.state().await?;
                if after != RootAuthorityState::HeldByFinalOwner {
                    warn!(registry = ?self.registry, state = %after, "root transfer not reflected on chain");
                }
                Ok(after)
            }
            RootAuthorityState::Unset => {
                warn!(registry = ?self.registry, "root has no holder; nothing to transfer");
                Ok(state)
            }
            RootAuthorityState::HeldByOther(holder) => {
                warn!(
                    registry = ?self.registry,
                    ?holder,
                    "root is held by an unexpected account; cannot transfer to owner"
                );
                Ok(state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use namereg_client::{
        mocks::{local_identity, MockNetwork},
        Network,
    };
    use namereg_types::NamedAccounts;

    async fn registry(network: &MockNetwork) -> Address {
        network
            .deploy("ENSRegistry", &[])
            .await
            .unwrap()
            .address
    }

    #[tokio::test]
    async fn test_transfers_once() {
        let network = MockNetwork::new(local_identity(false));
        let at = registry(&network).await;
        let controller = RootOwnershipController::new(&network, at);

        assert_eq!(controller.state().await.unwrap(), RootAuthorityState::HeldByDeployer);
        let before = network.transactions();
        assert_eq!(
            controller.finalize().await.unwrap(),
            RootAuthorityState::HeldByFinalOwner
        );
        assert_eq!(network.transactions(), before + 1);
        assert_eq!(network.owner_of(at, ROOT_NODE), Some(network.accounts().owner));

        // Second call is a no-op.
        assert_eq!(
            controller.finalize().await.unwrap(),
            RootAuthorityState::HeldByFinalOwner
        );
        assert_eq!(network.transactions(), before + 1);
    }

    #[tokio::test]
    async fn test_same_account_is_noop() {
        let account = Address::repeat_byte(0x77);
        let network = MockNetwork::with_accounts(
            local_identity(false),
            NamedAccounts {
                deployer: account,
                owner: account,
            },
        );
        let at = registry(&network).await;
        let before = network.transactions();
        let state = RootOwnershipController::new(&network, at)
            .finalize()
            .await
            .unwrap();
        assert_eq!(state, RootAuthorityState::HeldByFinalOwner);
        assert_eq!(network.transactions(), before);
    }

    #[tokio::test]
    async fn test_other_holder_left_alone() {
        let network = MockNetwork::new(local_identity(false));
        let at = registry(&network).await;
        let stranger = Address::repeat_byte(0x55);
        network
            .registry(at, Account::Deployer)
            .set_owner(ROOT_NODE, stranger)
            .await
            .unwrap();
        let before = network.transactions();
        let state = RootOwnershipController::new(&network, at)
            .finalize()
            .await
            .unwrap();
        assert_eq!(state, RootAuthorityState::HeldByOther(stranger));
        assert_eq!(network.transactions(), before);
        assert_eq!(network.owner_of(at, ROOT_NODE), Some(stranger));
    }

    #[tokio::test]
    async fn test_unset_root() {
        let network = MockNetwork::new(local_identity(false));
        let at = registry(&network).await;
        network
            .registry(at, Account::Deployer)
            .set_owner(ROOT_NODE, Address::zero())
            .await
            .unwrap();
        let before = network.transactions();
        let state = RootOwnershipController::new(&network, at)
            .finalize()
            .await
            .unwrap();
        assert_eq!(state, RootAuthorityState::Unset);
        assert_eq!(network.transactions(), before);
    }

    #[tokio::test]
    async fn test_stays_open() {
        let network = MockNetwork::new(local_identity(false));
        let at = registry(&network).await;
        let before = network.transactions();
        let state = RootOwnershipController::new(&network, at)
            .stays_open(true)
            .finalize()
            .await
            .unwrap();
        assert_eq!(state, RootAuthorityState::HeldByDeployer);
        assert_eq!(network.transactions(), before);
        assert_eq!(network.owner_of(at, ROOT_NODE), Some(network.accounts().deployer));
    }
}
