//! [Network] over JSON-RPC, using ethers signer middleware.

use crate::{
    artifacts::ArtifactStore,
    config::ValidatedConfig,
    interfaces::{
        CommitmentParams, Confirmed, DeployedContract, Network, RegistrarController, Registry,
        Resolver, ReverseRegistrar,
    },
    Error, Result,
};
use ethers::{
    abi::{Detokenize, Token},
    prelude::*,
    providers::{MiddlewareError as _, RpcError},
};
use namereg_types::{Account, NamedAccounts, NetworkIdentity, Revert};
use std::sync::Arc;
use tracing::{debug, info};

abigen!(
    EnsRegistryContract,
    r#"[
        function owner(bytes32 node) external view returns (address)
        function resolver(bytes32 node) external view returns (address)
        function recordExists(bytes32 node) external view returns (bool)
        function setOwner(bytes32 node, address owner) external
        function setSubnodeOwner(bytes32 node, bytes32 label, address owner) external returns (bytes32)
        function setResolver(bytes32 node, address resolver) external
    ]"#
);

// `rentPrice` returns a static (base, premium) struct; its encoding is the
// same as two flat words.
abigen!(
    EthRegistrarControllerContract,
    r#"[
        function available(string name) external view returns (bool)
        function rentPrice(string name, uint256 duration) external view returns (uint256 base, uint256 premium)
        function minCommitmentAge() external view returns (uint256)
        function maxCommitmentAge() external view returns (uint256)
        function makeCommitment(string name, address owner, uint256 duration, bytes32 secret, address resolver, bytes[] data, bool reverseRecord, uint16 ownerControlledFuses) external pure returns (bytes32)
        function commit(bytes32 commitment) external
        function register(string name, address owner, uint256 duration, bytes32 secret, address resolver, bytes[] data, bool reverseRecord, uint16 ownerControlledFuses) external payable
    ]"#
);

abigen!(
    PublicResolverContract,
    r#"[
        function addr(bytes32 node) external view returns (address)
        function name(bytes32 node) external view returns (string)
        function setAddr(bytes32 node, address a) external
    ]"#
);

abigen!(
    ReverseRegistrarContract,
    r#"[
        function node(address addr) external pure returns (bytes32)
        function defaultResolver() external view returns (address)
        function setDefaultResolver(address resolver) external
    ]"#
);

pub type EvmClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Live network with the deployer and owner keys loaded.
#[derive(Clone)]
pub struct EvmNetwork {
    provider: Provider<Http>,
    deployer: Arc<EvmClient>,
    owner: Arc<EvmClient>,
    accounts: NamedAccounts,
    identity: NetworkIdentity,
    artifacts: ArtifactStore,
    confirmations: usize,
}

fn wallet(key: &str, account: Account, chain_id: u64) -> Result<LocalWallet> {
    let wallet: LocalWallet = key
        .trim_start_matches("0x")
        .parse()
        .map_err(|err: WalletError| Error::InvalidKey {
            account: account.to_string(),
            reason: err.to_string(),
        })?;
    Ok(wallet.with_chain_id(chain_id))
}

impl EvmNetwork {
    /// Connect to `config.rpc_url`. Without an owner key, the deployer also acts as owner.
    pub fn connect(config: &ValidatedConfig, deployer_key: &str, owner_key: Option<&str>) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|err| Error::Contract {
                call: "connect",
                reason: err.to_string(),
            })?
            .interval(config.registrar.poll_interval);
        let chain_id = config.identity.chain_id;

        let deployer_wallet = wallet(deployer_key, Account::Deployer, chain_id)?;
        let owner_wallet = match owner_key {
            Some(key) => wallet(key, Account::Owner, chain_id)?,
            None => deployer_wallet.clone(),
        };
        let accounts = NamedAccounts {
            deployer: deployer_wallet.address(),
            owner: owner_wallet.address(),
        };

        Ok(Self {
            deployer: Arc::new(SignerMiddleware::new(provider.clone(), deployer_wallet)),
            owner: Arc::new(SignerMiddleware::new(provider.clone(), owner_wallet)),
            provider,
            accounts,
            identity: config.identity.clone(),
            artifacts: ArtifactStore::new(&config.artifacts),
            confirmations: config.confirmations,
        })
    }

    /// Fail unless the endpoint serves the configured chain.
    pub async fn ensure_chain(&self) -> Result<()> {
        let found = self.provider.get_chainid().await?.as_u64();
        if found != self.identity.chain_id {
            return Err(Error::WrongChain {
                expected: self.identity.chain_id,
                found,
            });
        }
        Ok(())
    }

    fn signer(&self, from: Account) -> Arc<EvmClient> {
        match from {
            Account::Deployer => self.deployer.clone(),
            Account::Owner => self.owner.clone(),
        }
    }

    async fn timestamp(&self, number: BlockNumber) -> Result<u64> {
        let block = self
            .provider
            .get_block(number)
            .await?
            .ok_or_else(|| Error::Contract {
                call: "eth_getBlockByNumber",
                reason: format!("block {number:?} missing"),
            })?;
        Ok(block.timestamp.as_u64())
    }
}

fn revert_data(err: &ContractError<EvmClient>) -> Option<Bytes> {
    match err {
        ContractError::Revert(data) => Some(data.clone()),
        ContractError::MiddlewareError { e } => {
            e.as_error_response().and_then(|resp| resp.as_revert_data())
        }
        ContractError::ProviderError { e } => {
            RpcError::as_error_response(e).and_then(|resp| resp.as_revert_data())
        }
        _ => None,
    }
}

fn contract_error(call: &'static str, err: ContractError<EvmClient>) -> Error {
    if let Some(data) = revert_data(&err) {
        return Error::Reverted {
            call,
            revert: Revert::decode(&data),
        };
    }
    match err {
        ContractError::DecodingError(err) => Error::Decode {
            call,
            reason: err.to_string(),
        },
        ContractError::DetokenizationError(err) => Error::Decode {
            call,
            reason: err.to_string(),
        },
        ContractError::AbiError(err) => Error::Decode {
            call,
            reason: err.to_string(),
        },
        ContractError::ProviderError { e } => Error::Provider(e),
        other => Error::Contract {
            call,
            reason: other.to_string(),
        },
    }
}

async fn send<D: Detokenize>(
    call: ContractCall<EvmClient, D>,
    name: &'static str,
    confirmations: usize,
) -> Result<Confirmed> {
    let pending = call.send().await.map_err(|err| contract_error(name, err))?;
    let tx_hash = pending.tx_hash();
    debug!(call = name, tx_hash = %format!("{:#x}", tx_hash), "transaction submitted");
    let receipt = pending
        .confirmations(confirmations)
        .await?
        .ok_or(Error::Dropped(tx_hash))?;
    if receipt.status == Some(U64::zero()) {
        return Err(Error::Failed {
            call: name,
            tx_hash,
        });
    }
    Ok(Confirmed {
        tx_hash,
        block: receipt.block_number.map(|num| num.as_u64()),
    })
}

#[derive(Clone)]
pub struct EvmRegistry {
    contract: EnsRegistryContract<EvmClient>,
    confirmations: usize,
}

impl Registry for EvmRegistry {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn owner(&self, node: H256) -> Result<Address> {
        self.contract
            .owner(node.into())
            .call()
            .await
            .map_err(|err| contract_error("owner", err))
    }

    async fn record_exists(&self, node: H256) -> Result<bool> {
        self.contract
            .record_exists(node.into())
            .call()
            .await
            .map_err(|err| contract_error("recordExists", err))
    }

    async fn resolver(&self, node: H256) -> Result<Address> {
        self.contract
            .resolver(node.into())
            .call()
            .await
            .map_err(|err| contract_error("resolver", err))
    }

    async fn set_owner(&self, node: H256, owner: Address) -> Result<Confirmed> {
        send(
            self.contract.set_owner(node.into(), owner),
            "setOwner",
            self.confirmations,
        )
        .await
    }

    async fn set_subnode_owner(&self, node: H256, label: H256, owner: Address) -> Result<Confirmed> {
        send(
            self.contract
                .set_subnode_owner(node.into(), label.into(), owner),
            "setSubnodeOwner",
            self.confirmations,
        )
        .await
    }

    async fn set_resolver(&self, node: H256, resolver: Address) -> Result<Confirmed> {
        send(
            self.contract.set_resolver(node.into(), resolver),
            "setResolver",
            self.confirmations,
        )
        .await
    }
}

#[derive(Clone)]
pub struct EvmController {
    contract: EthRegistrarControllerContract<EvmClient>,
    confirmations: usize,
}

impl EvmController {
    fn commitment_call(
        &self,
        params: &CommitmentParams<'_>,
    ) -> ContractCall<EvmClient, [u8; 32]> {
        self.contract.make_commitment(
            params.label.to_string(),
            params.owner,
            U256::from(params.duration),
            *params.secret.as_bytes(),
            params.resolver,
            params.data.to_vec(),
            params.reverse_record,
            params.fuses,
        )
    }
}

impl RegistrarController for EvmController {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn available(&self, label: &str) -> Result<bool> {
        self.contract
            .available(label.to_string())
            .call()
            .await
            .map_err(|err| contract_error("available", err))
    }

    async fn rent_price(&self, label: &str, duration: u64) -> Result<(U256, U256)> {
        self.contract
            .rent_price(label.to_string(), U256::from(duration))
            .call()
            .await
            .map_err(|err| contract_error("rentPrice", err))
    }

    async fn min_commitment_age(&self) -> Result<u64> {
        let age = self
            .contract
            .min_commitment_age()
            .call()
            .await
            .map_err(|err| contract_error("minCommitmentAge", err))?;
        seconds("minCommitmentAge", age)
    }

    async fn max_commitment_age(&self) -> Result<u64> {
        let age = self
            .contract
            .max_commitment_age()
            .call()
            .await
            .map_err(|err| contract_error("maxCommitmentAge", err))?;
        seconds("maxCommitmentAge", age)
    }

    async fn make_commitment(&self, params: &CommitmentParams<'_>) -> Result<H256> {
        self.commitment_call(params)
            .call()
            .await
            .map(H256)
            .map_err(|err| contract_error("makeCommitment", err))
    }

    async fn commit(&self, commitment: H256) -> Result<Confirmed> {
        send(
            self.contract.commit(commitment.into()),
            "commit",
            self.confirmations,
        )
        .await
    }

    async fn register(&self, params: &CommitmentParams<'_>, value: U256) -> Result<Confirmed> {
        let call = self
            .contract
            .register(
                params.label.to_string(),
                params.owner,
                U256::from(params.duration),
                *params.secret.as_bytes(),
                params.resolver,
                params.data.to_vec(),
                params.reverse_record,
                params.fuses,
            )
            .value(value);
        send(call, "register", self.confirmations).await
    }
}

fn seconds(call: &'static str, value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::Decode {
            call,
            reason: format!("{value} does not fit in u64"),
        });
    }
    Ok(value.as_u64())
}

#[derive(Clone)]
pub struct EvmResolver {
    contract: PublicResolverContract<EvmClient>,
    confirmations: usize,
}

impl Resolver for EvmResolver {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn addr(&self, node: H256) -> Result<Address> {
        self.contract
            .addr(node.into())
            .call()
            .await
            .map_err(|err| contract_error("addr", err))
    }

    async fn name(&self, node: H256) -> Result<String> {
        self.contract
            .name(node.into())
            .call()
            .await
            .map_err(|err| contract_error("name", err))
    }

    async fn set_addr(&self, node: H256, address: Address) -> Result<Confirmed> {
        send(
            self.contract.set_addr(node.into(), address),
            "setAddr",
            self.confirmations,
        )
        .await
    }
}

#[derive(Clone)]
pub struct EvmReverseRegistrar {
    contract: ReverseRegistrarContract<EvmClient>,
    confirmations: usize,
}

impl ReverseRegistrar for EvmReverseRegistrar {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn node(&self, address: Address) -> Result<H256> {
        self.contract
            .node(address)
            .call()
            .await
            .map(H256)
            .map_err(|err| contract_error("node", err))
    }

    async fn default_resolver(&self) -> Result<Address> {
        self.contract
            .default_resolver()
            .call()
            .await
            .map_err(|err| contract_error("defaultResolver", err))
    }

    async fn set_default_resolver(&self, resolver: Address) -> Result<Confirmed> {
        send(
            self.contract.set_default_resolver(resolver),
            "setDefaultResolver",
            self.confirmations,
        )
        .await
    }
}

impl Network for EvmNetwork {
    type Registry = EvmRegistry;
    type Controller = EvmController;
    type Resolver = EvmResolver;
    type ReverseRegistrar = EvmReverseRegistrar;

    fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    fn accounts(&self) -> &NamedAccounts {
        &self.accounts
    }

    fn registry(&self, at: Address, from: Account) -> EvmRegistry {
        EvmRegistry {
            contract: EnsRegistryContract::new(at, self.signer(from)),
            confirmations: self.confirmations,
        }
    }

    fn controller(&self, at: Address, from: Account) -> EvmController {
        EvmController {
            contract: EthRegistrarControllerContract::new(at, self.signer(from)),
            confirmations: self.confirmations,
        }
    }

    fn resolver(&self, at: Address, from: Account) -> EvmResolver {
        EvmResolver {
            contract: PublicResolverContract::new(at, self.signer(from)),
            confirmations: self.confirmations,
        }
    }

    fn reverse_registrar(&self, at: Address, from: Account) -> EvmReverseRegistrar {
        EvmReverseRegistrar {
            contract: ReverseRegistrarContract::new(at, self.signer(from)),
            confirmations: self.confirmations,
        }
    }

    async fn chain_time(&self) -> Result<u64> {
        self.timestamp(BlockNumber::Latest).await
    }

    async fn block_time(&self, block: u64) -> Result<u64> {
        self.timestamp(BlockNumber::Number(block.into())).await
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code = self.provider.get_code(address, None).await?;
        Ok(!code.is_empty())
    }

    async fn fingerprint(&self, artifact: &str, args: &[Token]) -> Result<H256> {
        Ok(self.artifacts.load(artifact)?.fingerprint(args))
    }

    async fn deploy(&self, artifact: &str, args: &[Token]) -> Result<DeployedContract> {
        let artifact = self.artifacts.load(artifact)?;
        let fingerprint = artifact.fingerprint(args);
        let factory = ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode.clone(),
            self.deployer.clone(),
        );
        let deployer = factory
            .deploy_tokens(args.to_vec())
            .map_err(|err| contract_error("deploy", err))?
            .confirmations(self.confirmations);
        let (contract, receipt) = deployer
            .send_with_receipt()
            .await
            .map_err(|err| contract_error("deploy", err))?;
        if receipt.status == Some(U64::zero()) {
            return Err(Error::Failed {
                call: "deploy",
                tx_hash: receipt.transaction_hash,
            });
        }
        info!(
            artifact = %artifact.name,
            address = %format!("{:#x}", contract.address()),
            tx_hash = %format!("{:#x}", receipt.transaction_hash),
            "contract deployed"
        );
        Ok(DeployedContract {
            address: contract.address(),
            tx_hash: receipt.transaction_hash,
            block: receipt.block_number.map(|num| num.as_u64()),
            fingerprint,
        })
    }
}
