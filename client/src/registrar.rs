//! Commit-reveal registration of second-level names.
//!
//! A registration goes through the stages of [RegistrationStage]. Each stage is
//! exposed on its own so callers can resume or inspect a partial run;
//! [CommitRevealRegistrar::register] drives all of them.
//!
//! Nothing here retries automatically. A rejected reveal leaves the
//! commitment on chain; retrying needs a new secret
//! ([RegistrationRequest::renew]).

use crate::{
    defaults,
    interfaces::{
        CommitmentParams, Confirmed, Network, RegistrarController, Registry, Resolver,
        ReverseRegistrar,
    },
    store::{self, NamedContracts},
    Error, Result,
};
use ethers::types::{Address, Bytes, H256, U256};
use namereg_types::{
    namehash, validate_label, Account, LabelError, PriceQuote, Record, RegistrationRequest,
    RegistrationStage, Revert, MIN_REGISTRATION_DURATION, RESOLVER_NAME,
};
use std::time::Duration;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};

/// Tunables of the registration flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrarConfig {
    /// Longest single sleep while waiting for a commitment to mature.
    pub poll_interval: Duration,
    /// Extra time waited past the minimum commitment age.
    pub age_margin: Duration,
    /// Headroom added to the quoted price, in basis points.
    pub price_buffer_bps: u32,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults::DEFAULT_POLL_INTERVAL_MS),
            age_margin: Duration::from_secs(defaults::DEFAULT_AGE_MARGIN_SECS),
            price_buffer_bps: defaults::DEFAULT_PRICE_BUFFER_BPS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid label: {0}")]
    InvalidLabel(#[from] LabelError),
    #[error("registration period of {duration}s for {name} is below the minimum of {minimum}s")]
    InvalidDuration {
        name: String,
        duration: u64,
        minimum: u64,
    },
    #[error("{name} is not available")]
    DomainUnavailable { name: String },
    #[error("registrar returned an unusable price for {name}: {reason}")]
    InvalidPriceResponse { name: String, reason: String },
    #[error("commitment {commitment:?} for {name} is outside its age window: {reason}")]
    CommitmentTimingViolation {
        name: String,
        commitment: H256,
        reason: String,
    },
    #[error("registration of {name} rejected: {revert}")]
    RegistrationRejected { name: String, revert: Revert },
    #[error("registration of {name} cancelled; commitment {commitment:?} is still on chain")]
    Cancelled { name: String, commitment: H256 },
    #[error(transparent)]
    Client(#[from] Error),
}

impl RegistrationError {
    /// Whether trying again (another label, or a renewed request) can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DomainUnavailable { .. }
                | Self::CommitmentTimingViolation { .. }
                | Self::RegistrationRejected { .. }
                | Self::Cancelled { .. }
        )
    }
}

/// Contracts the registrar talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistrarContracts {
    pub registry: Address,
    pub controller: Address,
    pub reverse_registrar: Address,
}

impl RegistrarContracts {
    pub fn from_book(book: &NamedContracts) -> Result<Self> {
        Ok(Self {
            registry: book.require(store::ENS_REGISTRY)?,
            controller: book.require(store::ETH_REGISTRAR_CONTROLLER)?,
            reverse_registrar: book.require(store::REVERSE_REGISTRAR)?,
        })
    }
}

/// A commitment that has been mined and is waiting to mature.
#[derive(Debug)]
pub struct PendingCommitment {
    pub commitment: H256,
    pub tx: Confirmed,
    /// Timestamp of the block that mined the commit.
    pub committed_at: u64,
    /// Local clock at the same moment.
    pub observed: Instant,
    pub calldata: Vec<Bytes>,
    pub quote: PriceQuote,
}

/// Post-registration read-back. Never fails the registration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Verification {
    pub resolver: Option<Address>,
    pub address: Option<Address>,
    pub reverse_name: Option<String>,
    pub warnings: Vec<String>,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug)]
pub struct RegistrationResult {
    pub name: String,
    pub node: H256,
    pub commitment: H256,
    pub commit_tx: Confirmed,
    pub register_tx: Confirmed,
    pub quote: PriceQuote,
    pub paid: U256,
    pub stage: RegistrationStage,
    pub verification: Verification,
}

/// Runs the commit-reveal protocol against one controller.
pub struct CommitRevealRegistrar<'a, N: Network> {
    network: &'a N,
    from: Account,
    registry: N::Registry,
    controller: N::Controller,
    reverse: N::ReverseRegistrar,
    config: RegistrarConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a, N: Network> CommitRevealRegistrar<'a, N> {
    /// Registrar sending its transactions from `from`.
    pub fn new(
        network: &'a N,
        contracts: RegistrarContracts,
        from: Account,
        config: RegistrarConfig,
    ) -> Self {
        Self {
            network,
            from,
            registry: network.registry(contracts.registry, from),
            controller: network.controller(contracts.controller, from),
            reverse: network.reverse_registrar(contracts.reverse_registrar, from),
            config,
            shutdown: None,
        }
    }

    /// Abort the maturity wait once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn sender(&self) -> Address {
        self.network.accounts().address(self.from)
    }

    /// Reject requests the controller would refuse, before anything is sent.
    fn check_request(request: &RegistrationRequest) -> std::result::Result<(), RegistrationError> {
        validate_label(&request.label)?;
        if request.duration < MIN_REGISTRATION_DURATION {
            return Err(RegistrationError::InvalidDuration {
                name: request.name(),
                duration: request.duration,
                minimum: MIN_REGISTRATION_DURATION,
            });
        }
        Ok(())
    }

    pub async fn check_available(
        &self,
        request: &RegistrationRequest,
    ) -> std::result::Result<(), RegistrationError> {
        Self::check_request(request)?;
        if !self.controller.available(&request.label).await? {
            return Err(RegistrationError::DomainUnavailable {
                name: request.name(),
            });
        }
        Ok(())
    }

    pub async fn quote(
        &self,
        request: &RegistrationRequest,
    ) -> std::result::Result<PriceQuote, RegistrationError> {
        let name = request.name();
        let (base, premium) = match self
            .controller
            .rent_price(&request.label, request.duration)
            .await
        {
            Ok(price) => price,
            Err(Error::Decode { reason, .. }) => {
                return Err(RegistrationError::InvalidPriceResponse { name, reason })
            }
            Err(err) => return Err(err.into()),
        };
        PriceQuote::new(base, premium).map_err(|err| RegistrationError::InvalidPriceResponse {
            name,
            reason: err.to_string(),
        })
    }

    /// Resolver calls to run at registration, in request order.
    pub fn build_calldata(&self, request: &RegistrationRequest) -> Vec<Bytes> {
        request.calldata()
    }

    pub async fn commit(
        &self,
        request: &RegistrationRequest,
        calldata: Vec<Bytes>,
        quote: PriceQuote,
    ) -> std::result::Result<PendingCommitment, RegistrationError> {
        Self::check_request(request)?;
        let params = CommitmentParams::new(request, &calldata);
        let commitment = self.controller.make_commitment(&params).await?;
        let tx = self.controller.commit(commitment).await?;
        // The head may be several blocks past the commit by now.
        let committed_at = match tx.block {
            Some(block) => self.network.block_time(block).await?,
            None => self.network.chain_time().await?,
        };
        info!(
            name = %request.name(),
            commitment = %format!("{:#x}", commitment),
            tx_hash = %format!("{:#x}", tx.tx_hash),
            committed_at,
            "commitment submitted"
        );
        Ok(PendingCommitment {
            commitment,
            tx,
            committed_at,
            observed: Instant::now(),
            calldata,
            quote,
        })
    }

    /// Chain time as best known: the latest block, or local time elapsed since
    /// the commit, whichever is further ahead.
    async fn estimated_chain_time(&self, pending: &PendingCommitment) -> Result<u64> {
        let head = self.network.chain_time().await?;
        let local = pending
            .committed_at
            .saturating_add(pending.observed.elapsed().as_secs());
        Ok(head.max(local))
    }

    async fn commitment_window(
        &self,
        request: &RegistrationRequest,
        pending: &PendingCommitment,
    ) -> std::result::Result<(u64, u64), RegistrationError> {
        let min_age = self.controller.min_commitment_age().await?;
        let max_age = self.controller.max_commitment_age().await?;
        if min_age >= max_age {
            return Err(RegistrationError::CommitmentTimingViolation {
                name: request.name(),
                commitment: pending.commitment,
                reason: format!("registrar window is empty (min {min_age}s >= max {max_age}s)"),
            });
        }
        Ok((min_age, max_age))
    }

    /// Sleep until the commitment is older than the minimum age plus margin.
    pub async fn wait_for_age(
        &self,
        request: &RegistrationRequest,
        pending: &PendingCommitment,
    ) -> std::result::Result<(), RegistrationError> {
        let (min_age, max_age) = self.commitment_window(request, pending).await?;
        let ready_at = pending
            .committed_at
            .saturating_add(min_age)
            .saturating_add(self.config.age_margin.as_secs());
        let expires_at = pending.committed_at.saturating_add(max_age);
        info!(
            name = %request.name(),
            wait_secs = ready_at.saturating_sub(pending.committed_at),
            "waiting for commitment to mature"
        );

        let mut shutdown = self.shutdown.clone();
        loop {
            let now = self.estimated_chain_time(pending).await?;
            if now >= expires_at {
                return Err(RegistrationError::CommitmentTimingViolation {
                    name: request.name(),
                    commitment: pending.commitment,
                    reason: format!("expired at {expires_at}, now {now}"),
                });
            }
            if now >= ready_at {
                return Ok(());
            }
            let nap = Duration::from_secs(ready_at - now).min(self.config.poll_interval);
            debug!(now, ready_at, nap_ms = nap.as_millis() as u64, "commitment not mature");
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    warn!(name = %request.name(), "wait cancelled");
                    return Err(RegistrationError::Cancelled {
                        name: request.name(),
                        commitment: pending.commitment,
                    });
                }
            }
        }
    }

    /// Send the registration with payment re-quoted at reveal time.
    pub async fn reveal(
        &self,
        request: &RegistrationRequest,
        pending: &PendingCommitment,
    ) -> std::result::Result<(Confirmed, PriceQuote, U256), RegistrationError> {
        let name = request.name();
        let (_, max_age) = self.commitment_window(request, pending).await?;
        let now = self.estimated_chain_time(pending).await?;
        let expires_at = pending.committed_at.saturating_add(max_age);
        if now >= expires_at {
            return Err(RegistrationError::CommitmentTimingViolation {
                name,
                commitment: pending.commitment,
                reason: format!("expired at {expires_at}, now {now}"),
            });
        }

        let quote = self.quote(request).await?;
        if quote.total() > pending.quote.total() {
            warn!(
                name = %name,
                quoted = %pending.quote.total(),
                now = %quote.total(),
                "price rose since commit"
            );
        }
        let value = quote.total_with_buffer(self.config.price_buffer_bps);

        let params = CommitmentParams::new(request, &pending.calldata);
        match self.controller.register(&params, value).await {
            Ok(tx) => {
                info!(
                    name = %name,
                    tx_hash = %format!("{:#x}", tx.tx_hash),
                    paid = %value,
                    "name registered"
                );
                Ok((tx, quote, value))
            }
            Err(Error::Reverted { revert, .. }) if revert.is_commitment_timing() => {
                Err(RegistrationError::CommitmentTimingViolation {
                    name,
                    commitment: pending.commitment,
                    reason: revert.reason,
                })
            }
            Err(Error::Reverted { revert, .. }) => {
                Err(RegistrationError::RegistrationRejected { name, revert })
            }
            Err(Error::Failed { tx_hash, .. }) => Err(RegistrationError::RegistrationRejected {
                name,
                revert: Revert::message(&format!("transaction {tx_hash:#x} failed")),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Read back the forward and reverse records.
    pub async fn verify(&self, request: &RegistrationRequest) -> Verification {
        let mut verification = Verification::default();
        let node = request.node();
        let name = request.name();

        match self.read_addr(node).await {
            Ok((resolver, address)) => {
                verification.resolver = Some(resolver);
                verification.address = address;
            }
            Err(err) => verification
                .warnings
                .push(format!("address lookup failed: {err}")),
        }
        let expected_addr = request.records.iter().find_map(|record| match record {
            Record::Addr(address) => Some(*address),
            _ => None,
        });
        if let (Some(expected), Some(found)) = (expected_addr, verification.address) {
            if expected != found {
                verification
                    .warnings
                    .push(format!("{name} resolves to {found:?}, expected {expected:?}"));
            }
        }

        if request.reverse_record {
            match self.read_reverse(self.sender()).await {
                Ok(reverse) => {
                    if reverse.as_deref() != Some(name.as_str()) {
                        verification.warnings.push(format!(
                            "reverse record of {:?} is {:?}, expected {name}",
                            self.sender(),
                            reverse
                        ));
                    }
                    verification.reverse_name = reverse;
                }
                Err(err) => verification
                    .warnings
                    .push(format!("reverse lookup failed: {err}")),
            }
        }

        for warning in &verification.warnings {
            warn!(name = %name, "{warning}");
        }
        verification
    }

    async fn read_addr(&self, node: H256) -> Result<(Address, Option<Address>)> {
        let resolver = self.registry.resolver(node).await?;
        if resolver.is_zero() {
            return Ok((resolver, None));
        }
        let address = self.network.resolver(resolver, self.from).addr(node).await?;
        Ok((resolver, Some(address)))
    }

    async fn read_reverse(&self, address: Address) -> Result<Option<String>> {
        let node = self.reverse.node(address).await?;
        let resolver = self.registry.resolver(node).await?;
        if resolver.is_zero() {
            return Ok(None);
        }
        let name = self.network.resolver(resolver, self.from).name(node).await?;
        Ok((!name.is_empty()).then_some(name))
    }

    /// Run every stage in order.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> std::result::Result<RegistrationResult, RegistrationError> {
        let name = request.name();
        let mut stage = RegistrationStage::Requested;
        info!(name = %name, owner = %format!("{:#x}", request.owner), duration = request.duration, %stage, "registration requested");

        self.check_available(request).await?;
        stage = RegistrationStage::AvailableChecked;
        debug!(name = %name, %stage);

        let quote = self.quote(request).await?;
        stage = RegistrationStage::Priced;
        info!(name = %name, base = %quote.base, premium = %quote.premium, %stage, "price quoted");

        let calldata = self.build_calldata(request);
        stage = RegistrationStage::CalldataBuilt;
        debug!(name = %name, records = calldata.len(), %stage);

        let pending = self.commit(request, calldata, quote).await?;
        stage = RegistrationStage::Committed;
        debug!(name = %name, %stage);

        self.wait_for_age(request, &pending).await?;
        stage = RegistrationStage::Aged;
        debug!(name = %name, %stage);

        let (register_tx, quote, paid) = self.reveal(request, &pending).await?;
        stage = RegistrationStage::Registered;

        let verification = self.verify(request).await;
        if verification.is_clean() {
            stage = RegistrationStage::Verified;
        }
        info!(name = %name, %stage, "registration finished");

        Ok(RegistrationResult {
            name,
            node: request.node(),
            commitment: pending.commitment,
            commit_tx: pending.tx,
            register_tx,
            quote,
            paid,
            stage,
            verification,
        })
    }
}

/// Resolves once `shutdown` reads true. Never resolves without a sender.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    loop {
        let Some(rx) = shutdown.as_mut() else {
            return std::future::pending().await;
        };
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            *shutdown = None;
        }
    }
}

/// Resolver to use for new registrations.
///
/// Prefers whatever `resolver.eth` points at when the owner controls that
/// name, and falls back to the deployed public resolver.
pub async fn default_resolver<N: Network>(network: &N, book: &NamedContracts) -> Result<Address> {
    let registry = network.registry(book.require(store::ENS_REGISTRY)?, Account::Owner);
    let node = namehash(RESOLVER_NAME);
    if registry.owner(node).await? == network.accounts().owner {
        let resolver = registry.resolver(node).await?;
        if !resolver.is_zero() {
            return Ok(resolver);
        }
    }
    book.require(store::PUBLIC_RESOLVER)
}
