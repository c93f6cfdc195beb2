//! Resolver record calldata.
//!
//! Records set at registration time travel to the registrar as ABI-encoded
//! resolver calls. The registrar forwards them verbatim, so the encoded list
//! must be identical between `makeCommitment` and `register`.

use ethers::{
    abi::{self, ParamType, Token},
    types::{Address, Bytes, H256},
    utils::id,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SET_ADDR: &str = "setAddr(bytes32,address)";
const SET_TEXT: &str = "setText(bytes32,string,string)";
const SET_CONTENTHASH: &str = "setContenthash(bytes32,bytes)";

/// A record to write on the resolver once the name is registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Record {
    Addr(Address),
    Text { key: String, value: String },
    ContentHash(Bytes),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalldataError {
    #[error("calldata shorter than a selector ({0} bytes)")]
    Truncated(usize),
    #[error("unknown resolver selector 0x{0}")]
    UnknownSelector(String),
    #[error("malformed arguments for {0}")]
    Malformed(&'static str),
}

impl Record {
    fn signature(&self) -> &'static str {
        match self {
            Self::Addr(_) => SET_ADDR,
            Self::Text { .. } => SET_TEXT,
            Self::ContentHash(_) => SET_CONTENTHASH,
        }
    }

    /// Encode the resolver call writing this record on `node`.
    pub fn encode(&self, node: H256) -> Bytes {
        let node = Token::FixedBytes(node.as_bytes().to_vec());
        let args = match self {
            Self::Addr(address) => vec![node, Token::Address(*address)],
            Self::Text { key, value } => vec![
                node,
                Token::String(key.clone()),
                Token::String(value.clone()),
            ],
            Self::ContentHash(hash) => vec![node, Token::Bytes(hash.to_vec())],
        };
        let mut data = id(self.signature()).to_vec();
        data.extend(abi::encode(&args));
        data.into()
    }

    /// Decode a resolver call produced by [Record::encode].
    pub fn decode(data: &[u8]) -> Result<(H256, Self), CalldataError> {
        if data.len() < 4 {
            return Err(CalldataError::Truncated(data.len()));
        }
        let (selector, body) = data.split_at(4);
        let (signature, params) = if selector == id(SET_ADDR) {
            (SET_ADDR, vec![ParamType::FixedBytes(32), ParamType::Address])
        } else if selector == id(SET_TEXT) {
            (
                SET_TEXT,
                vec![ParamType::FixedBytes(32), ParamType::String, ParamType::String],
            )
        } else if selector == id(SET_CONTENTHASH) {
            (SET_CONTENTHASH, vec![ParamType::FixedBytes(32), ParamType::Bytes])
        } else {
            return Err(CalldataError::UnknownSelector(hex::encode(selector)));
        };

        let tokens = abi::decode(&params, body).map_err(|_| CalldataError::Malformed(signature))?;
        let mut tokens = tokens.into_iter();
        let node = match tokens.next() {
            Some(Token::FixedBytes(bytes)) if bytes.len() == 32 => H256::from_slice(&bytes),
            _ => return Err(CalldataError::Malformed(signature)),
        };
        let record = match (signature, tokens.next(), tokens.next()) {
            (SET_ADDR, Some(Token::Address(address)), None) => Self::Addr(address),
            (SET_TEXT, Some(Token::String(key)), Some(Token::String(value))) => {
                Self::Text { key, value }
            }
            (SET_CONTENTHASH, Some(Token::Bytes(hash)), None) => Self::ContentHash(hash.into()),
            _ => return Err(CalldataError::Malformed(signature)),
        };
        Ok((node, record))
    }
}

/// Encode an ordered record list against `node`, preserving order.
pub fn encode_records(node: H256, records: &[Record]) -> Vec<Bytes> {
    records.iter().map(|record| record.encode(node)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::namehash;

    #[test]
    fn test_set_addr_selector() {
        let data = Record::Addr(Address::zero()).encode(namehash("mydomain.eth"));
        assert_eq!(&data[..4], &[0xd5, 0xfa, 0x2b, 0x00]);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_decode_text_record() {
        let node = namehash("mydomain.eth");
        let record = Record::Text {
            key: "url".to_string(),
            value: "https://example.org".to_string(),
        };
        assert_eq!(Record::decode(&record.encode(node)), Ok((node, record)));
    }

    #[test]
    fn test_decode_rejects_unknown_selector() {
        let err = Record::decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert_eq!(err, CalldataError::UnknownSelector("deadbeef".to_string()));
        assert_eq!(Record::decode(&[0x01]), Err(CalldataError::Truncated(1)));
    }

    #[test]
    fn test_encoding_preserves_order() {
        let node = namehash("mydomain.eth");
        let addr = Record::Addr(Address::repeat_byte(7));
        let text = Record::Text {
            key: "email".to_string(),
            value: "ops@example.org".to_string(),
        };
        let forward = encode_records(node, &[addr.clone(), text.clone()]);
        let backward = encode_records(node, &[text, addr]);
        assert_eq!(forward[0], backward[1]);
        assert_eq!(forward[1], backward[0]);
        assert_ne!(forward, backward);
    }
}
