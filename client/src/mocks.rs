//! In-memory network for tests.
//!
//! [MockNetwork] models the registry, public resolver, reverse registrar and
//! registrar controller closely enough to exercise deployment and
//! registration end to end: ownership checks, the commitment age window, rent
//! and the custom errors the real contracts revert with.
//!
//! Chain time follows the tokio clock, so tests running with
//! `#[tokio::test(start_paused = true)]` advance it by sleeping.

use crate::{
    interfaces::{
        CommitmentParams, Confirmed, DeployedContract, Network, RegistrarController, Registry,
        Resolver, ReverseRegistrar,
    },
    registrar::RegistrarContracts,
    store::{self, DeploymentRecord, NamedContracts},
    Error, Result,
};
use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use namereg_types::{
    full_name, labelhash, namehash, reverse_node, Account, NamedAccounts, NetworkIdentity,
    Record, Revert, ETH_TLD, MIN_REGISTRATION_DURATION, ROOT_NODE,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::time::Instant;

/// Chain time at the start of every mock network.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Expired names stay reserved for this long.
pub const GRACE_PERIOD: u64 = 90 * 24 * 60 * 60;

/// Rent per second for labels of five or more characters.
pub const PRICE_PER_SECOND: u64 = 158_548_959_918;

/// Creates the deployer account address
pub fn deployer() -> Address {
    Address::from_low_u64_be(0xd0)
}

/// Creates the owner account address
pub fn owner() -> Address {
    Address::from_low_u64_be(0x0e)
}

/// Creates the identity of a local test network
pub fn local_identity(legacy: bool) -> NetworkIdentity {
    NetworkIdentity {
        name: "hardhat".to_string(),
        chain_id: 31337,
        legacy,
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct NodeRecord {
    owner: Address,
    resolver: Address,
}

#[derive(Clone, Debug, Default)]
struct RegistryState {
    records: HashMap<H256, NodeRecord>,
    fallback: Option<Address>,
}

#[derive(Clone, Debug, Default)]
struct ResolverState {
    registry: Address,
    addrs: HashMap<H256, Address>,
    texts: HashMap<(H256, String), String>,
    contenthashes: HashMap<H256, Bytes>,
    names: HashMap<H256, String>,
}

#[derive(Clone, Debug)]
struct ReverseState {
    registry: Address,
    owner: Address,
    default_resolver: Address,
}

#[derive(Clone, Debug)]
struct ControllerState {
    registry: Address,
    min_age: u64,
    max_age: u64,
    premium: U256,
    commitments: HashMap<H256, u64>,
    expiries: HashMap<H256, u64>,
}

#[derive(Clone, Debug)]
enum Contract {
    Registry(RegistryState),
    Resolver(ResolverState),
    Reverse(ReverseState),
    Controller(ControllerState),
    Opaque,
}

struct World {
    started: Instant,
    skew: u64,
    next_address: u64,
    transactions: u64,
    /// Block number to timestamp; one block per transaction.
    blocks: HashMap<u64, u64>,
    /// Seconds the clock moves while a transaction gathers confirmations.
    confirmation_lag: u64,
    contracts: HashMap<Address, Contract>,
    versions: HashMap<String, u64>,
    failing: HashSet<String>,
    malformed_price: bool,
}

fn unauthorised() -> Error {
    Error::Reverted {
        call: "authorised",
        revert: Revert::decode(&[]),
    }
}

fn revert(call: &'static str, revert: Revert) -> Error {
    Error::Reverted { call, revert }
}

impl World {
    fn now(&self) -> u64 {
        GENESIS_TIMESTAMP + self.started.elapsed().as_secs() + self.skew
    }

    fn confirm(&mut self) -> Confirmed {
        self.transactions += 1;
        let mined_at = self.now();
        self.blocks.insert(self.transactions, mined_at);
        self.skew += self.confirmation_lag;
        Confirmed {
            tx_hash: H256::from_low_u64_be(self.transactions),
            block: Some(self.transactions),
        }
    }

    fn create(&mut self, contract: Contract) -> Address {
        self.next_address += 1;
        let address = Address::from_low_u64_be(0x1000 + self.next_address);
        self.contracts.insert(address, contract);
        address
    }

    fn registry(&self, at: Address) -> Result<&RegistryState> {
        match self.contracts.get(&at) {
            Some(Contract::Registry(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn registry_mut(&mut self, at: Address) -> Result<&mut RegistryState> {
        match self.contracts.get_mut(&at) {
            Some(Contract::Registry(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn resolver(&self, at: Address) -> Result<&ResolverState> {
        match self.contracts.get(&at) {
            Some(Contract::Resolver(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn resolver_mut(&mut self, at: Address) -> Result<&mut ResolverState> {
        match self.contracts.get_mut(&at) {
            Some(Contract::Resolver(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn reverse(&self, at: Address) -> Result<&ReverseState> {
        match self.contracts.get(&at) {
            Some(Contract::Reverse(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn controller(&self, at: Address) -> Result<&ControllerState> {
        match self.contracts.get(&at) {
            Some(Contract::Controller(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    fn controller_mut(&mut self, at: Address) -> Result<&mut ControllerState> {
        match self.contracts.get_mut(&at) {
            Some(Contract::Controller(state)) => Ok(state),
            _ => Err(Error::NoCode(at)),
        }
    }

    // Registry

    /// Direct record, without consulting the fallback.
    fn record(&self, at: Address, node: H256) -> Result<NodeRecord> {
        Ok(self
            .registry(at)?
            .records
            .get(&node)
            .copied()
            .unwrap_or_default())
    }

    fn owner(&self, at: Address, node: H256) -> Result<Address> {
        let registry = self.registry(at)?;
        match (registry.records.get(&node), registry.fallback) {
            (Some(record), _) if !record.owner.is_zero() => Ok(record.owner),
            (_, Some(old)) => self.owner(old, node),
            _ => Ok(Address::zero()),
        }
    }

    fn record_exists(&self, at: Address, node: H256) -> Result<bool> {
        Ok(!self.record(at, node)?.owner.is_zero())
    }

    fn resolver_of(&self, at: Address, node: H256) -> Result<Address> {
        let registry = self.registry(at)?;
        match (registry.records.get(&node), registry.fallback) {
            (Some(record), _) if !record.owner.is_zero() => Ok(record.resolver),
            (_, Some(old)) => self.resolver_of(old, node),
            _ => Ok(Address::zero()),
        }
    }

    fn authorise(&self, at: Address, node: H256, from: Address) -> Result<()> {
        if self.record(at, node)?.owner != from {
            return Err(unauthorised());
        }
        Ok(())
    }

    fn set_owner(&mut self, at: Address, from: Address, node: H256, owner: Address) -> Result<Confirmed> {
        self.authorise(at, node, from)?;
        self.registry_mut(at)?.records.entry(node).or_default().owner = owner;
        Ok(self.confirm())
    }

    fn set_subnode_owner(
        &mut self,
        at: Address,
        from: Address,
        node: H256,
        label: H256,
        owner: Address,
    ) -> Result<Confirmed> {
        self.authorise(at, node, from)?;
        let subnode = namereg_types::subnode(node, label);
        self.registry_mut(at)?
            .records
            .entry(subnode)
            .or_default()
            .owner = owner;
        Ok(self.confirm())
    }

    fn set_resolver(&mut self, at: Address, from: Address, node: H256, resolver: Address) -> Result<Confirmed> {
        self.authorise(at, node, from)?;
        self.registry_mut(at)?
            .records
            .entry(node)
            .or_default()
            .resolver = resolver;
        Ok(self.confirm())
    }

    // Resolver

    fn set_addr(&mut self, at: Address, from: Address, node: H256, address: Address) -> Result<Confirmed> {
        let registry = self.resolver(at)?.registry;
        if self.owner(registry, node)? != from {
            return Err(unauthorised());
        }
        self.resolver_mut(at)?.addrs.insert(node, address);
        Ok(self.confirm())
    }

    fn apply_record(&mut self, at: Address, node: H256, record: Record) -> Result<()> {
        let resolver = self.resolver_mut(at)?;
        match record {
            Record::Addr(address) => {
                resolver.addrs.insert(node, address);
            }
            Record::Text { key, value } => {
                resolver.texts.insert((node, key), value);
            }
            Record::ContentHash(hash) => {
                resolver.contenthashes.insert(node, hash);
            }
        }
        Ok(())
    }

    // Controller

    fn rent(&self, at: Address, label: &str, duration: u64) -> Result<(U256, U256)> {
        let controller = self.controller(at)?;
        if self.malformed_price {
            return Err(Error::Decode {
                call: "rentPrice",
                reason: "expected 64 bytes of output, got 3".to_string(),
            });
        }
        let multiplier: u64 = match label.chars().count() {
            0..=3 => 20,
            4 => 5,
            _ => 1,
        };
        let base = U256::from(PRICE_PER_SECOND) * U256::from(multiplier) * U256::from(duration);
        Ok((base, controller.premium))
    }

    fn available(&self, at: Address, label: &str) -> Result<bool> {
        let controller = self.controller(at)?;
        if label.chars().count() < 3 {
            return Ok(false);
        }
        let now = self.now();
        Ok(controller
            .expiries
            .get(&labelhash(label))
            .map_or(true, |expiry| expiry + GRACE_PERIOD < now))
    }

    fn commit(&mut self, at: Address, commitment: H256) -> Result<Confirmed> {
        let now = self.now();
        let controller = self.controller_mut(at)?;
        let previous = controller.commitments.get(&commitment).copied().unwrap_or(0);
        if previous + controller.max_age >= now {
            return Err(revert(
                "commit",
                Revert::custom(
                    "UnexpiredCommitmentExists(bytes32)",
                    &[Token::FixedBytes(commitment.as_bytes().to_vec())],
                ),
            ));
        }
        controller.commitments.insert(commitment, now);
        Ok(self.confirm())
    }

    fn register(
        &mut self,
        at: Address,
        from: Address,
        params: &CommitmentParams<'_>,
        value: U256,
    ) -> Result<Confirmed> {
        let commitment = commitment_hash(params)?;
        let (base, premium) = self.rent(at, params.label, params.duration)?;
        if value < base.saturating_add(premium) {
            return Err(revert(
                "register",
                Revert::custom("InsufficientValue()", &[]),
            ));
        }

        let now = self.now();
        let controller = self.controller(at)?;
        let registry = controller.registry;
        let committed_at = controller.commitments.get(&commitment).copied().unwrap_or(0);
        let commitment_token = [Token::FixedBytes(commitment.as_bytes().to_vec())];
        if committed_at + controller.min_age > now {
            return Err(revert(
                "register",
                Revert::custom("CommitmentTooNew(bytes32)", &commitment_token),
            ));
        }
        if committed_at + controller.max_age <= now {
            return Err(revert(
                "register",
                Revert::custom("CommitmentTooOld(bytes32)", &commitment_token),
            ));
        }
        if !self.available(at, params.label)? {
            return Err(revert(
                "register",
                Revert::custom(
                    "NameNotAvailable(string)",
                    &[Token::String(params.label.to_string())],
                ),
            ));
        }
        if params.duration < MIN_REGISTRATION_DURATION {
            return Err(revert(
                "register",
                Revert::custom(
                    "DurationTooShort(uint256)",
                    &[Token::Uint(U256::from(params.duration))],
                ),
            ));
        }

        // Validate every side effect before applying any of them.
        let name = full_name(params.label);
        let node = namehash(&name);
        let mut records = Vec::with_capacity(params.data.len());
        for call in params.data {
            let (target, record) = Record::decode(call).map_err(|err| {
                revert("register", Revert::message(&format!("resolver call: {err}")))
            })?;
            if target != node {
                return Err(revert(
                    "register",
                    Revert::message("multicall: All records must have a matching namehash"),
                ));
            }
            records.push(record);
        }
        if (!records.is_empty() || params.reverse_record) && self.resolver(params.resolver).is_err() {
            return Err(revert("register", Revert::decode(&[])));
        }
        self.registry(registry)?;

        let controller = self.controller_mut(at)?;
        controller.commitments.remove(&commitment);
        controller
            .expiries
            .insert(labelhash(params.label), now + params.duration);
        self.registry_mut(registry)?.records.insert(
            node,
            NodeRecord {
                owner: params.owner,
                resolver: params.resolver,
            },
        );
        for record in records {
            self.apply_record(params.resolver, node, record)?;
        }
        if params.reverse_record {
            let reverse = reverse_node(from);
            self.registry_mut(registry)?.records.insert(
                reverse,
                NodeRecord {
                    owner: from,
                    resolver: params.resolver,
                },
            );
            self.resolver_mut(params.resolver)?
                .names
                .insert(reverse, name);
        }
        Ok(self.confirm())
    }

    // Deployment

    fn fingerprint(&self, artifact: &str, args: &[Token]) -> H256 {
        let version = self.versions.get(artifact).copied().unwrap_or(0);
        let mut preimage = artifact.as_bytes().to_vec();
        preimage.extend_from_slice(&version.to_be_bytes());
        preimage.extend_from_slice(&abi::encode(args));
        H256(keccak256(preimage))
    }

    fn instantiate(artifact: &str, args: &[Token], sender: Address) -> Contract {
        let addresses: Vec<Address> = args
            .iter()
            .filter_map(|token| match token {
                Token::Address(address) => Some(*address),
                _ => None,
            })
            .collect();
        let uints: Vec<u64> = args
            .iter()
            .filter_map(|token| match token {
                Token::Uint(value) => Some(value.low_u64()),
                _ => None,
            })
            .collect();
        let first = addresses.first().copied().unwrap_or_default();
        match artifact {
            "ENSRegistry" | "LegacyENSRegistry" => Contract::Registry(rooted_registry(sender, None)),
            "ENSRegistryWithFallback" => {
                Contract::Registry(rooted_registry(sender, Some(first)))
            }
            "PublicResolver" => Contract::Resolver(ResolverState {
                registry: first,
                ..Default::default()
            }),
            "ReverseRegistrar" => Contract::Reverse(ReverseState {
                registry: first,
                owner: sender,
                default_resolver: Address::zero(),
            }),
            "ETHRegistrarController" => Contract::Controller(ControllerState {
                registry: addresses.last().copied().unwrap_or_default(),
                min_age: uints.first().copied().unwrap_or(60),
                max_age: uints.get(1).copied().unwrap_or(86_400),
                premium: U256::zero(),
                commitments: HashMap::new(),
                expiries: HashMap::new(),
            }),
            _ => Contract::Opaque,
        }
    }
}

fn rooted_registry(root: Address, fallback: Option<Address>) -> RegistryState {
    let mut records = HashMap::new();
    records.insert(
        ROOT_NODE,
        NodeRecord {
            owner: root,
            resolver: Address::zero(),
        },
    );
    RegistryState { records, fallback }
}

/// Commitment the controller derives from registration parameters.
pub fn commitment_hash(params: &CommitmentParams<'_>) -> Result<H256> {
    if !params.data.is_empty() && params.resolver.is_zero() {
        return Err(revert(
            "makeCommitment",
            Revert::custom("ResolverRequiredWhenDataSupplied()", &[]),
        ));
    }
    let encoded = abi::encode(&[
        Token::FixedBytes(labelhash(params.label).as_bytes().to_vec()),
        Token::Address(params.owner),
        Token::Uint(U256::from(params.duration)),
        Token::FixedBytes(params.secret.as_bytes().to_vec()),
        Token::Address(params.resolver),
        Token::Array(
            params
                .data
                .iter()
                .map(|call| Token::Bytes(call.to_vec()))
                .collect(),
        ),
        Token::Bool(params.reverse_record),
        Token::Uint(U256::from(params.fuses)),
    ]);
    Ok(H256(keccak256(encoded)))
}

/// Addresses of a pre-deployed naming system.
#[derive(Clone, Copy, Debug)]
pub struct EnsFixture {
    pub registry: Address,
    pub resolver: Address,
    pub reverse_registrar: Address,
    pub controller: Address,
}

impl EnsFixture {
    pub fn contracts(&self) -> RegistrarContracts {
        RegistrarContracts {
            registry: self.registry,
            controller: self.controller,
            reverse_registrar: self.reverse_registrar,
        }
    }

    /// In-memory book listing the fixture's contracts.
    pub fn book(&self, identity: &NetworkIdentity) -> NamedContracts {
        let mut book = NamedContracts::in_memory(identity);
        for (name, address) in [
            (store::ENS_REGISTRY, self.registry),
            (store::PUBLIC_RESOLVER, self.resolver),
            (store::REVERSE_REGISTRAR, self.reverse_registrar),
            (store::ETH_REGISTRAR_CONTROLLER, self.controller),
        ] {
            let record = DeploymentRecord {
                address,
                artifact: name.to_string(),
                fingerprint: H256::zero(),
                tx_hash: None,
                block: None,
            };
            // In-memory books never touch the disk.
            let _ = book.record(name, record);
        }
        book
    }
}

/// Shared handle to an in-memory chain.
#[derive(Clone)]
pub struct MockNetwork {
    world: Arc<Mutex<World>>,
    identity: NetworkIdentity,
    accounts: NamedAccounts,
}

impl MockNetwork {
    pub fn new(identity: NetworkIdentity) -> Self {
        Self::with_accounts(
            identity,
            NamedAccounts {
                deployer: deployer(),
                owner: owner(),
            },
        )
    }

    pub fn with_accounts(identity: NetworkIdentity, accounts: NamedAccounts) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                started: Instant::now(),
                skew: 0,
                next_address: 0,
                transactions: 0,
                blocks: HashMap::new(),
                confirmation_lag: 0,
                contracts: HashMap::new(),
                versions: HashMap::new(),
                failing: HashSet::new(),
                malformed_price: false,
            })),
            identity,
            accounts,
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a complete naming system without counting transactions.
    ///
    /// The registry root stays with the deployer, `eth` belongs to the
    /// controller and the reverse registrar points at the public resolver.
    pub fn deploy_ens(&self, min_age: u64, max_age: u64) -> EnsFixture {
        let mut world = self.world();
        let registry = world.create(Contract::Registry(rooted_registry(
            self.accounts.deployer,
            None,
        )));
        let resolver = world.create(Contract::Resolver(ResolverState {
            registry,
            ..Default::default()
        }));
        let reverse_registrar = world.create(Contract::Reverse(ReverseState {
            registry,
            owner: self.accounts.deployer,
            default_resolver: resolver,
        }));
        let controller = world.create(Contract::Controller(ControllerState {
            registry,
            min_age,
            max_age,
            premium: U256::zero(),
            commitments: HashMap::new(),
            expiries: HashMap::new(),
        }));
        if let Ok(state) = world.registry_mut(registry) {
            state.records.insert(
                namehash(ETH_TLD),
                NodeRecord {
                    owner: controller,
                    resolver: Address::zero(),
                },
            );
        }
        EnsFixture {
            registry,
            resolver,
            reverse_registrar,
            controller,
        }
    }

    /// Successful transactions so far.
    pub fn transactions(&self) -> u64 {
        self.world().transactions
    }

    /// Move chain time forward without waiting.
    pub fn advance(&self, secs: u64) {
        self.world().skew += secs;
    }

    /// Let `secs` of chain time pass after each mined transaction, as when
    /// waiting for several confirmations.
    pub fn set_confirmation_lag(&self, secs: u64) {
        self.world().confirmation_lag = secs;
    }

    /// When the controller at `controller` recorded `commitment`.
    pub fn commitment_time(&self, controller: Address, commitment: H256) -> Option<u64> {
        self.world()
            .controller(controller)
            .ok()
            .and_then(|state| state.commitments.get(&commitment).copied())
    }

    pub fn set_premium(&self, controller: Address, premium: U256) {
        if let Ok(state) = self.world().controller_mut(controller) {
            state.premium = premium;
        }
    }

    /// Make `rentPrice` return undecodable data.
    pub fn set_malformed_price(&self, malformed: bool) {
        self.world().malformed_price = malformed;
    }

    /// Make every deployment of `artifact` revert.
    pub fn fail_deploy(&self, artifact: &str) {
        self.world().failing.insert(artifact.to_string());
    }

    /// Simulate a rebuilt artifact with different bytecode.
    pub fn bump_artifact(&self, artifact: &str) {
        *self.world().versions.entry(artifact.to_string()).or_default() += 1;
    }

    /// Wipe the code at `address`, as after a chain reset.
    pub fn remove_code(&self, address: Address) {
        self.world().contracts.remove(&address);
    }

    /// Registry owner of `node`, read synchronously.
    pub fn owner_of(&self, registry: Address, node: H256) -> Option<Address> {
        self.world().owner(registry, node).ok()
    }

    /// Text record stored on a resolver.
    pub fn text(&self, resolver: Address, node: H256, key: &str) -> Option<String> {
        self.world()
            .resolver(resolver)
            .ok()
            .and_then(|state| state.texts.get(&(node, key.to_string())).cloned())
    }

    fn handle(&self, at: Address, from: Account) -> Handle {
        Handle {
            network: self.clone(),
            at,
            from: self.accounts.address(from),
        }
    }
}

#[derive(Clone)]
struct Handle {
    network: MockNetwork,
    at: Address,
    from: Address,
}

#[derive(Clone)]
pub struct MockRegistry(Handle);

#[derive(Clone)]
pub struct MockController(Handle);

#[derive(Clone)]
pub struct MockResolver(Handle);

#[derive(Clone)]
pub struct MockReverseRegistrar(Handle);

impl Registry for MockRegistry {
    fn address(&self) -> Address {
        self.0.at
    }

    async fn owner(&self, node: H256) -> Result<Address> {
        self.0.network.world().owner(self.0.at, node)
    }

    async fn record_exists(&self, node: H256) -> Result<bool> {
        self.0.network.world().record_exists(self.0.at, node)
    }

    async fn resolver(&self, node: H256) -> Result<Address> {
        self.0.network.world().resolver_of(self.0.at, node)
    }

    async fn set_owner(&self, node: H256, owner: Address) -> Result<Confirmed> {
        self.0
            .network
            .world()
            .set_owner(self.0.at, self.0.from, node, owner)
    }

    async fn set_subnode_owner(&self, node: H256, label: H256, owner: Address) -> Result<Confirmed> {
        self.0
            .network
            .world()
            .set_subnode_owner(self.0.at, self.0.from, node, label, owner)
    }

    async fn set_resolver(&self, node: H256, resolver: Address) -> Result<Confirmed> {
        self.0
            .network
            .world()
            .set_resolver(self.0.at, self.0.from, node, resolver)
    }
}

impl RegistrarController for MockController {
    fn address(&self) -> Address {
        self.0.at
    }

    async fn available(&self, label: &str) -> Result<bool> {
        self.0.network.world().available(self.0.at, label)
    }

    async fn rent_price(&self, label: &str, duration: u64) -> Result<(U256, U256)> {
        self.0.network.world().rent(self.0.at, label, duration)
    }

    async fn min_commitment_age(&self) -> Result<u64> {
        Ok(self.0.network.world().controller(self.0.at)?.min_age)
    }

    async fn max_commitment_age(&self) -> Result<u64> {
        Ok(self.0.network.world().controller(self.0.at)?.max_age)
    }

    async fn make_commitment(&self, params: &CommitmentParams<'_>) -> Result<H256> {
        self.0.network.world().controller(self.0.at)?;
        commitment_hash(params)
    }

    async fn commit(&self, commitment: H256) -> Result<Confirmed> {
        self.0.network.world().commit(self.0.at, commitment)
    }

    async fn register(&self, params: &CommitmentParams<'_>, value: U256) -> Result<Confirmed> {
        self.0
            .network
            .world()
            .register(self.0.at, self.0.from, params, value)
    }
}

impl Resolver for MockResolver {
    fn address(&self) -> Address {
        self.0.at
    }

    async fn addr(&self, node: H256) -> Result<Address> {
        let world = self.0.network.world();
        Ok(world
            .resolver(self.0.at)?
            .addrs
            .get(&node)
            .copied()
            .unwrap_or_default())
    }

    async fn name(&self, node: H256) -> Result<String> {
        let world = self.0.network.world();
        Ok(world
            .resolver(self.0.at)?
            .names
            .get(&node)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_addr(&self, node: H256, address: Address) -> Result<Confirmed> {
        self.0
            .network
            .world()
            .set_addr(self.0.at, self.0.from, node, address)
    }
}

impl ReverseRegistrar for MockReverseRegistrar {
    fn address(&self) -> Address {
        self.0.at
    }

    async fn node(&self, address: Address) -> Result<H256> {
        self.0.network.world().reverse(self.0.at)?;
        Ok(reverse_node(address))
    }

    async fn default_resolver(&self) -> Result<Address> {
        Ok(self.0.network.world().reverse(self.0.at)?.default_resolver)
    }

    async fn set_default_resolver(&self, resolver: Address) -> Result<Confirmed> {
        let mut world = self.0.network.world();
        if world.reverse(self.0.at)?.owner != self.0.from {
            return Err(revert(
                "setDefaultResolver",
                Revert::message("Ownable: caller is not the owner"),
            ));
        }
        if let Some(Contract::Reverse(state)) = world.contracts.get_mut(&self.0.at) {
            state.default_resolver = resolver;
        }
        Ok(world.confirm())
    }
}

impl Network for MockNetwork {
    type Registry = MockRegistry;
    type Controller = MockController;
    type Resolver = MockResolver;
    type ReverseRegistrar = MockReverseRegistrar;

    fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    fn accounts(&self) -> &NamedAccounts {
        &self.accounts
    }

    fn registry(&self, at: Address, from: Account) -> MockRegistry {
        MockRegistry(self.handle(at, from))
    }

    fn controller(&self, at: Address, from: Account) -> MockController {
        MockController(self.handle(at, from))
    }

    fn resolver(&self, at: Address, from: Account) -> MockResolver {
        MockResolver(self.handle(at, from))
    }

    fn reverse_registrar(&self, at: Address, from: Account) -> MockReverseRegistrar {
        MockReverseRegistrar(self.handle(at, from))
    }

    async fn chain_time(&self) -> Result<u64> {
        Ok(self.world().now())
    }

    async fn block_time(&self, block: u64) -> Result<u64> {
        self.world().blocks.get(&block).copied().ok_or(Error::Contract {
            call: "eth_getBlockByNumber",
            reason: format!("block {block} missing"),
        })
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        Ok(self.world().contracts.contains_key(&address))
    }

    async fn fingerprint(&self, artifact: &str, args: &[Token]) -> Result<H256> {
        Ok(self.world().fingerprint(artifact, args))
    }

    async fn deploy(&self, artifact: &str, args: &[Token]) -> Result<DeployedContract> {
        let mut world = self.world();
        if world.failing.contains(artifact) {
            return Err(revert(
                "deploy",
                Revert::message(&format!("{artifact}: constructor reverted")),
            ));
        }
        let fingerprint = world.fingerprint(artifact, args);
        // Constructors run as the deployer.
        let contract = World::instantiate(artifact, args, self.accounts.deployer);
        let address = world.create(contract);
        let confirmed = world.confirm();
        Ok(DeployedContract {
            address,
            tx_hash: confirmed.tx_hash,
            block: confirmed.block,
            fingerprint,
        })
    }
}
