//! Capability traits for the remote contracts.
//!
//! Each trait covers only the calls this crate makes. Transaction methods
//! resolve once the transaction is mined with a successful status. Failures
//! surface as [crate::Error::Reverted] (with the decoded reason) or
//! [crate::Error::Failed].

use crate::Result;
use ethers::{
    abi::Token,
    types::{Address, Bytes, H256, U256},
};
use namereg_types::{Account, NamedAccounts, NetworkIdentity, RegistrationRequest, Secret};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// A mined, successful transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmed {
    pub tx_hash: H256,
    pub block: Option<u64>,
}

/// Result of deploying an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: H256,
    pub block: Option<u64>,
    /// Hash of creation bytecode and constructor arguments.
    pub fingerprint: H256,
}

/// Arguments of `makeCommitment` and `register`.
///
/// Both calls take the same tuple; the controller hashes it to produce the
/// commitment, so any field drifting between commit and reveal is rejected.
#[derive(Clone, Copy, Debug)]
pub struct CommitmentParams<'a> {
    pub label: &'a str,
    pub owner: Address,
    pub duration: u64,
    pub secret: &'a Secret,
    pub resolver: Address,
    pub data: &'a [Bytes],
    pub reverse_record: bool,
    pub fuses: u16,
}

impl<'a> CommitmentParams<'a> {
    pub fn new(request: &'a RegistrationRequest, data: &'a [Bytes]) -> Self {
        Self {
            label: &request.label,
            owner: request.owner,
            duration: request.duration,
            secret: &request.secret,
            resolver: request.resolver,
            data,
            reverse_record: request.reverse_record,
            fuses: request.fuses,
        }
    }
}

pub trait Registry {
    fn address(&self) -> Address;

    fn owner(&self, node: H256) -> impl Future<Output = Result<Address>>;

    /// Whether this registry holds its own record for `node`. Unlike
    /// [Registry::owner], never consults a fallback registry.
    fn record_exists(&self, node: H256) -> impl Future<Output = Result<bool>>;

    fn resolver(&self, node: H256) -> impl Future<Output = Result<Address>>;

    fn set_owner(&self, node: H256, owner: Address) -> impl Future<Output = Result<Confirmed>>;

    fn set_subnode_owner(
        &self,
        node: H256,
        label: H256,
        owner: Address,
    ) -> impl Future<Output = Result<Confirmed>>;

    fn set_resolver(
        &self,
        node: H256,
        resolver: Address,
    ) -> impl Future<Output = Result<Confirmed>>;
}

pub trait RegistrarController {
    fn address(&self) -> Address;

    fn available(&self, label: &str) -> impl Future<Output = Result<bool>>;

    /// `(base, premium)` for renting `label` for `duration` seconds.
    fn rent_price(&self, label: &str, duration: u64) -> impl Future<Output = Result<(U256, U256)>>;

    fn min_commitment_age(&self) -> impl Future<Output = Result<u64>>;

    fn max_commitment_age(&self) -> impl Future<Output = Result<u64>>;

    fn make_commitment(&self, params: &CommitmentParams<'_>) -> impl Future<Output = Result<H256>>;

    fn commit(&self, commitment: H256) -> impl Future<Output = Result<Confirmed>>;

    fn register(
        &self,
        params: &CommitmentParams<'_>,
        value: U256,
    ) -> impl Future<Output = Result<Confirmed>>;
}

pub trait Resolver {
    fn address(&self) -> Address;

    fn addr(&self, node: H256) -> impl Future<Output = Result<Address>>;

    fn name(&self, node: H256) -> impl Future<Output = Result<String>>;

    fn set_addr(&self, node: H256, address: Address) -> impl Future<Output = Result<Confirmed>>;
}

pub trait ReverseRegistrar {
    fn address(&self) -> Address;

    /// Reverse node of `address`.
    fn node(&self, address: Address) -> impl Future<Output = Result<H256>>;

    fn default_resolver(&self) -> impl Future<Output = Result<Address>>;

    fn set_default_resolver(&self, resolver: Address) -> impl Future<Output = Result<Confirmed>>;
}

/// A chain with the named accounts unlocked.
///
/// Contract handles are bound to the account that signs their transactions.
/// Deployments are always sent by [Account::Deployer].
pub trait Network {
    type Registry: Registry;
    type Controller: RegistrarController;
    type Resolver: Resolver;
    type ReverseRegistrar: ReverseRegistrar;

    fn identity(&self) -> &NetworkIdentity;

    fn accounts(&self) -> &NamedAccounts;

    fn registry(&self, at: Address, from: Account) -> Self::Registry;

    fn controller(&self, at: Address, from: Account) -> Self::Controller;

    fn resolver(&self, at: Address, from: Account) -> Self::Resolver;

    fn reverse_registrar(&self, at: Address, from: Account) -> Self::ReverseRegistrar;

    /// Timestamp of the latest block.
    fn chain_time(&self) -> impl Future<Output = Result<u64>>;

    /// Timestamp of block number `block`.
    fn block_time(&self, block: u64) -> impl Future<Output = Result<u64>>;

    /// Whether any code is deployed at `address`.
    fn has_code(&self, address: Address) -> impl Future<Output = Result<bool>>;

    /// Fingerprint a deployment would record, without sending anything.
    fn fingerprint(&self, artifact: &str, args: &[Token]) -> impl Future<Output = Result<H256>>;

    fn deploy(
        &self,
        artifact: &str,
        args: &[Token],
    ) -> impl Future<Output = Result<DeployedContract>>;
}
