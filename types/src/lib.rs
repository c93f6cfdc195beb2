//! Common types for namereg: node hashing, resolver records, revert decoding
//! and the data carried through deployment and registration.

pub mod names;
pub mod network;
pub mod records;
pub mod registration;
pub mod revert;

pub use names::{
    full_name, labelhash, namehash, reverse_name, reverse_node, subnode, validate_label,
    LabelError, ETH_TLD, RESOLVER_NAME, ROOT_NODE,
};
pub use network::{Account, NamedAccounts, NetworkIdentity, RootAuthorityState};
pub use records::{encode_records, CalldataError, Record};
pub use registration::{
    PriceOverflow, PriceQuote, RegistrationRequest, RegistrationStage, Secret, DEFAULT_DURATION,
    MIN_REGISTRATION_DURATION,
};
pub use revert::{Revert, RevertKind};
