use crate::{
    names::{full_name, namehash},
    records::{encode_records, Record},
};
use ethers::types::{Address, Bytes, H256, U256};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One year, the default registration period.
pub const DEFAULT_DURATION: u64 = 31_536_000;

/// Shortest registration the controller accepts (28 days).
pub const MIN_REGISTRATION_DURATION: u64 = 28 * 24 * 60 * 60;

/// Length of the anti-front-running secret.
pub const SECRET_LEN: usize = 32;

/// Random nonce blinding a commitment.
///
/// Deliberately not `Clone`: a retry must go through
/// [RegistrationRequest::renew], which draws a fresh value.
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    /// Draw a secret from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Use an externally supplied secret (tests and replays).
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("price {base} + {premium} overflows")]
pub struct PriceOverflow {
    pub base: U256,
    pub premium: U256,
}

/// Rent quoted by the registrar for a label and duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base: U256,
    pub premium: U256,
}

impl PriceQuote {
    /// Build a quote, rejecting pairs whose sum cannot be paid.
    pub fn new(base: U256, premium: U256) -> Result<Self, PriceOverflow> {
        if base.checked_add(premium).is_none() {
            return Err(PriceOverflow { base, premium });
        }
        Ok(Self { base, premium })
    }

    pub fn total(&self) -> U256 {
        self.base.saturating_add(self.premium)
    }

    /// Total with `bps` basis points of headroom on top.
    pub fn total_with_buffer(&self, bps: u32) -> U256 {
        let total = self.total();
        let headroom = total.saturating_mul(U256::from(bps)) / U256::from(10_000u64);
        total.saturating_add(headroom)
    }
}

/// Everything needed to commit to and then register one label.
#[derive(Debug)]
pub struct RegistrationRequest {
    pub label: String,
    pub owner: Address,
    pub duration: u64,
    pub secret: Secret,
    pub resolver: Address,
    pub records: Vec<Record>,
    pub reverse_record: bool,
    pub fuses: u16,
}

impl RegistrationRequest {
    /// A request with a fresh secret, no records and the reverse record set.
    pub fn new(label: impl Into<String>, owner: Address, duration: u64, resolver: Address) -> Self {
        Self {
            label: label.into(),
            owner,
            duration,
            secret: Secret::generate(),
            resolver,
            records: Vec::new(),
            reverse_record: true,
            fuses: 0,
        }
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn with_reverse_record(mut self, reverse_record: bool) -> Self {
        self.reverse_record = reverse_record;
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = secret;
        self
    }

    /// Same parameters, fresh secret. Use this to retry after a rejected reveal.
    pub fn renew(&self) -> Self {
        Self {
            label: self.label.clone(),
            owner: self.owner,
            duration: self.duration,
            secret: Secret::generate(),
            resolver: self.resolver,
            records: self.records.clone(),
            reverse_record: self.reverse_record,
            fuses: self.fuses,
        }
    }

    /// Fully-qualified name (`<label>.eth`).
    pub fn name(&self) -> String {
        full_name(&self.label)
    }

    /// Node of the fully-qualified name.
    pub fn node(&self) -> H256 {
        namehash(&self.name())
    }

    /// Resolver calls for the requested records, in request order.
    pub fn calldata(&self) -> Vec<Bytes> {
        encode_records(self.node(), &self.records)
    }
}

/// Progress of a registration attempt. Stages only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegistrationStage {
    Requested,
    AvailableChecked,
    Priced,
    CalldataBuilt,
    Committed,
    Aged,
    Registered,
    Verified,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Requested => "requested",
            Self::AvailableChecked => "available-checked",
            Self::Priced => "priced",
            Self::CalldataBuilt => "calldata-built",
            Self::Committed => "committed",
            Self::Aged => "aged",
            Self::Registered => "registered",
            Self::Verified => "verified",
        };
        f.write_str(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_fresh() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(format!("{a:?}"), "Secret(<redacted>)");
    }

    #[test]
    fn test_renew_draws_new_secret() {
        let request = RegistrationRequest::new("mydomain", Address::repeat_byte(1), DEFAULT_DURATION, Address::repeat_byte(2))
            .with_records(vec![Record::Addr(Address::repeat_byte(1))]);
        let retry = request.renew();
        assert_eq!(retry.label, request.label);
        assert_eq!(retry.records, request.records);
        assert_ne!(retry.secret.as_bytes(), request.secret.as_bytes());
    }

    #[test]
    fn test_price_overflow_rejected() {
        assert!(PriceQuote::new(U256::MAX, U256::one()).is_err());
        let quote = PriceQuote::new(U256::from(100u64), U256::from(5u64)).unwrap();
        assert_eq!(quote.total(), U256::from(105u64));
    }

    #[test]
    fn test_total_with_buffer() {
        let quote = PriceQuote::new(U256::from(10_000u64), U256::zero()).unwrap();
        assert_eq!(quote.total_with_buffer(0), U256::from(10_000u64));
        assert_eq!(quote.total_with_buffer(250), U256::from(10_250u64));
    }

    #[test]
    fn test_calldata_targets_full_name() {
        let owner = Address::repeat_byte(9);
        let request = RegistrationRequest::new("mydomain", owner, DEFAULT_DURATION, Address::zero())
            .with_records(vec![Record::Addr(owner)]);
        let calldata = request.calldata();
        assert_eq!(calldata.len(), 1);
        let (node, record) = Record::decode(&calldata[0]).unwrap();
        assert_eq!(node, namehash("mydomain.eth"));
        assert_eq!(record, Record::Addr(owner));
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(RegistrationStage::Committed < RegistrationStage::Aged);
        assert!(RegistrationStage::Registered < RegistrationStage::Verified);
    }
}
