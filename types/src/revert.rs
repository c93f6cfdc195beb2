//! Revert data decoding.
//!
//! The registrar controller reports failures as Solidity custom errors. We only
//! need to tell commitment timing problems apart from every other rejection,
//! but keep a readable reason for operators.

use ethers::{
    abi::{self, ParamType, Token},
    types::Bytes,
    utils::id,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector of `Error(string)`.
const ERROR_STRING: &str = "Error(string)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevertKind {
    CommitmentTooNew,
    CommitmentTooOld,
    UnexpiredCommitmentExists,
    NameNotAvailable,
    DurationTooShort,
    InsufficientValue,
    ResolverRequiredWhenDataSupplied,
    Unauthorised,
    /// `require(.., "reason")` style revert.
    Message,
    Unknown,
}

struct KnownError {
    signature: &'static str,
    kind: RevertKind,
}

const KNOWN_ERRORS: &[KnownError] = &[
    KnownError {
        signature: "CommitmentTooNew(bytes32)",
        kind: RevertKind::CommitmentTooNew,
    },
    KnownError {
        signature: "CommitmentTooOld(bytes32)",
        kind: RevertKind::CommitmentTooOld,
    },
    KnownError {
        signature: "UnexpiredCommitmentExists(bytes32)",
        kind: RevertKind::UnexpiredCommitmentExists,
    },
    KnownError {
        signature: "NameNotAvailable(string)",
        kind: RevertKind::NameNotAvailable,
    },
    KnownError {
        signature: "DurationTooShort(uint256)",
        kind: RevertKind::DurationTooShort,
    },
    KnownError {
        signature: "InsufficientValue()",
        kind: RevertKind::InsufficientValue,
    },
    KnownError {
        signature: "ResolverRequiredWhenDataSupplied()",
        kind: RevertKind::ResolverRequiredWhenDataSupplied,
    },
    KnownError {
        signature: "Unauthorised(bytes32,address)",
        kind: RevertKind::Unauthorised,
    },
];

/// A decoded revert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revert {
    pub kind: RevertKind,
    pub reason: String,
    pub data: Bytes,
}

impl Revert {
    /// Classify raw revert data.
    pub fn decode(data: &[u8]) -> Self {
        let raw = Bytes::from(data.to_vec());
        if data.len() < 4 {
            return Self {
                kind: RevertKind::Unknown,
                reason: if data.is_empty() {
                    "reverted without a reason".to_string()
                } else {
                    format!("0x{}", hex::encode(data))
                },
                data: raw,
            };
        }

        let (selector, body) = data.split_at(4);
        if selector == id(ERROR_STRING) {
            let reason = match abi::decode(&[ParamType::String], body) {
                Ok(mut tokens) => match tokens.pop() {
                    Some(Token::String(reason)) => reason,
                    _ => format!("0x{}", hex::encode(body)),
                },
                Err(_) => format!("0x{}", hex::encode(body)),
            };
            return Self {
                kind: RevertKind::Message,
                reason,
                data: raw,
            };
        }

        for known in KNOWN_ERRORS {
            if selector == id(known.signature) {
                return Self {
                    kind: known.kind,
                    reason: describe(known.signature, body),
                    data: raw,
                };
            }
        }

        Self {
            kind: RevertKind::Unknown,
            reason: format!("0x{}", hex::encode(data)),
            data: raw,
        }
    }

    /// Build the revert data of a known custom error.
    pub fn custom(signature: &str, args: &[Token]) -> Self {
        let mut data = id(signature).to_vec();
        data.extend(abi::encode(args));
        Self::decode(&data)
    }

    /// Build a `require`-style revert.
    pub fn message(reason: &str) -> Self {
        Self::custom(ERROR_STRING, &[Token::String(reason.to_string())])
    }

    /// Whether the revert means the commitment was outside its allowed age window.
    pub fn is_commitment_timing(&self) -> bool {
        matches!(
            self.kind,
            RevertKind::CommitmentTooNew | RevertKind::CommitmentTooOld
        )
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

fn describe(signature: &str, body: &[u8]) -> String {
    let name = signature.split('(').next().unwrap_or(signature);
    if body.is_empty() {
        return name.to_string();
    }
    if signature.ends_with("(string)") {
        if let Ok(mut tokens) = abi::decode(&[ParamType::String], body) {
            if let Some(Token::String(value)) = tokens.pop() {
                return format!("{name}({value})");
            }
        }
    }
    format!("{name}(0x{})", hex::encode(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_commitment_too_new() {
        let revert = Revert::custom(
            "CommitmentTooNew(bytes32)",
            &[Token::FixedBytes(vec![0xab; 32])],
        );
        assert_eq!(revert.kind, RevertKind::CommitmentTooNew);
        assert!(revert.is_commitment_timing());
        assert!(revert.reason.starts_with("CommitmentTooNew(0xabab"));
    }

    #[test]
    fn test_decode_name_not_available_shows_label() {
        let revert = Revert::custom(
            "NameNotAvailable(string)",
            &[Token::String("mydomain".to_string())],
        );
        assert_eq!(revert.kind, RevertKind::NameNotAvailable);
        assert_eq!(revert.reason, "NameNotAvailable(mydomain)");
        assert!(!revert.is_commitment_timing());
    }

    #[test]
    fn test_decode_require_message() {
        let revert = Revert::message("ETHRegistrarController: Not enough ether provided");
        assert_eq!(revert.kind, RevertKind::Message);
        assert_eq!(
            revert.reason,
            "ETHRegistrarController: Not enough ether provided"
        );
    }

    #[test]
    fn test_decode_empty_and_unknown() {
        assert_eq!(Revert::decode(&[]).kind, RevertKind::Unknown);
        let unknown = Revert::decode(&[1, 2, 3, 4, 5]);
        assert_eq!(unknown.kind, RevertKind::Unknown);
        assert_eq!(unknown.reason, "0x0102030405");
    }

    #[test]
    fn test_parameterless_error() {
        let revert = Revert::custom("InsufficientValue()", &[]);
        assert_eq!(revert.kind, RevertKind::InsufficientValue);
        assert_eq!(revert.reason, "InsufficientValue");
    }
}
