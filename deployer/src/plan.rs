//! Deployment manifest.
//!
//! ```yaml
//! units:
//!   - id: ENSRegistry
//!     artifact: ENSRegistryWithFallback
//!     when: legacy
//!     args: ["contract:LegacyENSRegistry"]
//!     tags: [registry]
//! ```

use crate::{DeployError, Result};
use ethers::{
    abi::Token,
    types::{Address, H256, U256},
};
use namereg_client::NamedContracts;
use namereg_types::{labelhash, namehash, Account, NamedAccounts};
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashSet},
    fmt, fs,
    path::Path,
    str::FromStr,
};

/// Network flavour a unit applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Legacy,
    Standard,
}

impl Mode {
    pub fn of(legacy: bool) -> Self {
        if legacy {
            Self::Legacy
        } else {
            Self::Standard
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Standard => f.write_str("standard"),
        }
    }
}

/// Constructor argument, written `kind:value` in manifests.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Arg {
    /// Address of another unit (or of a contract already in the book).
    Contract(String),
    Account(Account),
    Address(Address),
    Namehash(String),
    Labelhash(String),
    Bytes32(H256),
    Uint(U256),
    Uints(Vec<U256>),
    Bool(bool),
    String(String),
}

fn parse_uint(value: &str) -> std::result::Result<U256, String> {
    U256::from_dec_str(value.trim()).map_err(|err| format!("invalid uint {value:?}: {err}"))
}

impl FromStr for Arg {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, rest) = value
            .split_once(':')
            .ok_or_else(|| format!("argument {value:?} must be written kind:value"))?;
        match kind {
            "contract" if !rest.is_empty() => Ok(Self::Contract(rest.to_string())),
            "account" => match rest {
                "deployer" => Ok(Self::Account(Account::Deployer)),
                "owner" => Ok(Self::Account(Account::Owner)),
                other => Err(format!("unknown account {other:?}")),
            },
            "address" => Address::from_str(rest)
                .map(Self::Address)
                .map_err(|err| format!("invalid address {rest:?}: {err}")),
            "namehash" => Ok(Self::Namehash(rest.to_string())),
            "labelhash" => Ok(Self::Labelhash(rest.to_string())),
            "bytes32" => H256::from_str(rest)
                .map(Self::Bytes32)
                .map_err(|err| format!("invalid bytes32 {rest:?}: {err}")),
            "uint" => parse_uint(rest).map(Self::Uint),
            "uints" if rest.is_empty() => Ok(Self::Uints(Vec::new())),
            "uints" => rest
                .split(',')
                .map(parse_uint)
                .collect::<std::result::Result<_, _>>()
                .map(Self::Uints),
            "bool" => rest
                .parse()
                .map(Self::Bool)
                .map_err(|_| format!("invalid bool {rest:?}")),
            "string" => Ok(Self::String(rest.to_string())),
            _ => Err(format!("unknown argument kind in {value:?}")),
        }
    }
}

impl TryFrom<String> for Arg {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl Arg {
    /// Name of the contract this argument refers to, if any.
    pub fn contract(&self) -> Option<&str> {
        match self {
            Self::Contract(name) => Some(name),
            _ => None,
        }
    }

    /// ABI token for this argument on the current network.
    pub fn resolve(
        &self,
        book: &NamedContracts,
        accounts: &NamedAccounts,
    ) -> namereg_client::Result<Token> {
        Ok(match self {
            Self::Contract(name) => Token::Address(book.require(name)?),
            Self::Account(account) => Token::Address(accounts.address(*account)),
            Self::Address(address) => Token::Address(*address),
            Self::Namehash(name) => Token::FixedBytes(namehash(name).as_bytes().to_vec()),
            Self::Labelhash(label) => Token::FixedBytes(labelhash(label).as_bytes().to_vec()),
            Self::Bytes32(value) => Token::FixedBytes(value.as_bytes().to_vec()),
            Self::Uint(value) => Token::Uint(*value),
            Self::Uints(values) => Token::Array(values.iter().copied().map(Token::Uint).collect()),
            Self::Bool(value) => Token::Bool(*value),
            Self::String(value) => Token::String(value.clone()),
        })
    }
}

/// One contract to deploy and the conditions for deploying it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentUnit {
    /// Logical name, also the key in the book.
    pub id: String,
    /// Artifact to deploy; defaults to `id`.
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Unit ids or tags that must be deployed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Restrict the unit to one network flavour.
    #[serde(default)]
    pub when: Option<Mode>,
    /// Redeploy even when the book already holds a matching deployment.
    #[serde(default)]
    pub force: bool,
}

impl DeploymentUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            artifact: None,
            args: Vec::new(),
            dependencies: Vec::new(),
            tags: Vec::new(),
            when: None,
            force: false,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn only(mut self, mode: Mode) -> Self {
        self.when = Some(mode);
        self
    }

    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.id)
    }

    pub fn applies_to(&self, mode: Mode) -> bool {
        self.when.map_or(true, |when| when == mode)
    }

    /// Whether `name` refers to this unit, by id or by tag.
    pub fn answers_to(&self, name: &str) -> bool {
        self.id == name || self.tags.iter().any(|tag| tag == name)
    }

    /// Contracts referenced by the constructor arguments.
    pub fn contract_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Arg::contract)
    }
}

/// Ordered list of deployment units.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub units: Vec<DeploymentUnit>,
}

impl Plan {
    pub fn new(units: Vec<DeploymentUnit>) -> Self {
        Self { units }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let manifest = |reason: String| DeployError::Manifest {
            path: path.display().to_string(),
            reason,
        };
        let yaml = fs::read_to_string(path).map_err(|err| manifest(err.to_string()))?;
        Self::from_yaml(&yaml).map_err(|err| manifest(err.to_string()))
    }

    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Units for `mode`, narrowed to `tags` and everything they need.
    ///
    /// An empty tag list selects every unit for the mode. Manifest order is
    /// preserved.
    pub fn select(&self, mode: Mode, tags: &[String]) -> Result<Vec<DeploymentUnit>> {
        let candidates: Vec<&DeploymentUnit> =
            self.units.iter().filter(|unit| unit.applies_to(mode)).collect();
        let mut seen = HashSet::new();
        for unit in &candidates {
            if !seen.insert(unit.id.as_str()) {
                return Err(DeployError::DuplicateUnit(unit.id.clone()));
            }
        }
        if tags.is_empty() {
            return Ok(candidates.into_iter().cloned().collect());
        }

        let mut selected = BTreeSet::new();
        let mut pending: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, unit)| tags.iter().any(|tag| unit.answers_to(tag)))
            .map(|(index, _)| index)
            .collect();
        while let Some(index) = pending.pop() {
            if !selected.insert(index) {
                continue;
            }
            let unit = candidates[index];
            for (other, candidate) in candidates.iter().enumerate() {
                let declared = unit.dependencies.iter().any(|dep| candidate.answers_to(dep));
                let referenced = unit.contract_args().any(|name| name == candidate.id);
                if other != index && (declared || referenced) {
                    pending.push(other);
                }
            }
        }
        Ok(selected
            .into_iter()
            .map(|index| candidates[index].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
units:
  - id: LegacyENSRegistry
    artifact: ENSRegistry
    when: legacy
  - id: ENSRegistry
    when: standard
    tags: [registry]
  - id: ENSRegistry
    artifact: ENSRegistryWithFallback
    when: legacy
    args: ["contract:LegacyENSRegistry"]
    tags: [registry]
  - id: ReverseRegistrar
    args: ["contract:ENSRegistry"]
    tags: [reverse]
  - id: DummyOracle
    args: ["uint:160000000000"]
  - id: PublicResolver
    args: ["contract:ENSRegistry", "contract:ReverseRegistrar"]
    dependencies: [registry]
    tags: [resolvers]
"#;

    fn ids(units: &[DeploymentUnit]) -> Vec<&str> {
        units.iter().map(|unit| unit.id.as_str()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            "contract:ENSRegistry".parse::<Arg>().unwrap(),
            Arg::Contract("ENSRegistry".to_string())
        );
        assert_eq!(
            "account:owner".parse::<Arg>().unwrap(),
            Arg::Account(Account::Owner)
        );
        assert_eq!(
            "uints:0,0,20294266869609".parse::<Arg>().unwrap(),
            Arg::Uints(vec![U256::zero(), U256::zero(), U256::from(20_294_266_869_609u64)])
        );
        assert_eq!(
            "uint:100000000000000000000000000".parse::<Arg>().unwrap(),
            Arg::Uint(U256::exp10(26))
        );
        assert_eq!("namehash:".parse::<Arg>().unwrap(), Arg::Namehash(String::new()));
        assert!("contract:".parse::<Arg>().is_err());
        assert!("uint:-1".parse::<Arg>().is_err());
        assert!("ENSRegistry".parse::<Arg>().is_err());
        assert!("float:1.5".parse::<Arg>().is_err());
    }

    #[test]
    fn test_resolve_args() {
        let identity = namereg_types::NetworkIdentity {
            name: "test".to_string(),
            chain_id: 1,
            legacy: false,
        };
        let book = NamedContracts::in_memory(&identity);
        let accounts = NamedAccounts {
            deployer: Address::repeat_byte(1),
            owner: Address::repeat_byte(2),
        };
        assert_eq!(
            Arg::Account(Account::Owner).resolve(&book, &accounts).unwrap(),
            Token::Address(accounts.owner)
        );
        assert_eq!(
            Arg::Namehash("eth".to_string()).resolve(&book, &accounts).unwrap(),
            Token::FixedBytes(namehash("eth").as_bytes().to_vec())
        );
        assert!(matches!(
            Arg::Contract("ENSRegistry".to_string()).resolve(&book, &accounts),
            Err(namereg_client::Error::UnknownContract(name)) if name == "ENSRegistry"
        ));
    }

    #[test]
    fn test_select_by_mode() {
        let plan = Plan::from_yaml(MANIFEST).unwrap();
        let standard = plan.select(Mode::Standard, &[]).unwrap();
        assert_eq!(
            ids(&standard),
            ["ENSRegistry", "ReverseRegistrar", "DummyOracle", "PublicResolver"]
        );
        assert_eq!(standard[0].artifact_name(), "ENSRegistry");

        let legacy = plan.select(Mode::Legacy, &[]).unwrap();
        assert_eq!(ids(&legacy)[..2], ["LegacyENSRegistry", "ENSRegistry"]);
        assert_eq!(legacy[1].artifact_name(), "ENSRegistryWithFallback");
    }

    #[test]
    fn test_select_by_tag_pulls_dependencies() {
        let plan = Plan::from_yaml(MANIFEST).unwrap();
        let selected = plan
            .select(Mode::Legacy, &["resolvers".to_string()])
            .unwrap();
        assert_eq!(
            ids(&selected),
            ["LegacyENSRegistry", "ENSRegistry", "ReverseRegistrar", "PublicResolver"]
        );

        let selected = plan.select(Mode::Standard, &["DummyOracle".to_string()]).unwrap();
        assert_eq!(ids(&selected), ["DummyOracle"]);
    }

    #[test]
    fn test_duplicate_unit() {
        let plan = Plan::new(vec![
            DeploymentUnit::new("ENSRegistry"),
            DeploymentUnit::new("ENSRegistry").with_artifact("ENSRegistryWithFallback"),
        ]);
        assert!(matches!(
            plan.select(Mode::Standard, &[]),
            Err(DeployError::DuplicateUnit(id)) if id == "ENSRegistry"
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(Plan::from_yaml("units:\n  - id: A\n    artefact: B\n").is_err());
        assert!(Plan::from_yaml("units:\n  - id: A\n    args: [\"bogus\"]\n").is_err());
    }

    #[test]
    fn test_load_missing_manifest() {
        let err = Plan::load(Path::new("/nonexistent/manifest.yaml")).unwrap_err();
        assert!(matches!(err, DeployError::Manifest { .. }));
    }
}
