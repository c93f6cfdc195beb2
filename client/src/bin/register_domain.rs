//! Register a second-level name through the commit-reveal controller.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ethers::types::{Address, Bytes};
use namereg_client::{
    config::{load_key, require_key, Config},
    defaults::{DEPLOYER_KEY_ENV, DEPLOYER_KEY_FILE_ENV, OWNER_KEY_ENV, OWNER_KEY_FILE_ENV},
    evm::EvmNetwork,
    registrar::default_resolver,
    CommitRevealRegistrar, Network, NamedContracts, RegistrarContracts, RegistrationError,
};
use namereg_types::{Account, Record, RegistrationRequest, DEFAULT_DURATION};
use std::{path::PathBuf, str::FromStr};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Register a name under .eth")]
struct Args {
    /// Network configuration (YAML)
    #[arg(long)]
    config: PathBuf,

    /// Label to register (without `.eth`)
    #[arg(long, default_value = "defaultdomain")]
    name: String,

    /// Owner of the new name (defaults to the sending account)
    #[arg(long)]
    address: Option<String>,

    /// Registration period in seconds
    #[arg(long, default_value_t = DEFAULT_DURATION)]
    duration: u64,

    /// Resolver to use (defaults to the resolver of resolver.eth, then PublicResolver)
    #[arg(long)]
    resolver: Option<String>,

    /// Account sending the transactions (deployer or owner)
    #[arg(long, default_value = "deployer", value_parser = parse_account)]
    from: Account,

    /// Extra text record, as key=value (repeatable)
    #[arg(long = "text")]
    texts: Vec<String>,

    /// Content hash record (hex)
    #[arg(long)]
    contenthash: Option<String>,

    /// Do not set the reverse record of the sender
    #[arg(long)]
    no_reverse: bool,

    /// Deployer private key hex
    #[arg(long)]
    deployer_key: Option<String>,

    /// Path to file with the deployer private key hex
    #[arg(long)]
    deployer_key_file: Option<PathBuf>,

    /// Owner private key hex (defaults to the deployer key)
    #[arg(long)]
    owner_key: Option<String>,

    /// Path to file with the owner private key hex
    #[arg(long)]
    owner_key_file: Option<PathBuf>,
}

fn parse_account(value: &str) -> std::result::Result<Account, String> {
    match value {
        "deployer" => Ok(Account::Deployer),
        "owner" => Ok(Account::Owner),
        other => Err(format!("unknown account {other:?} (expected deployer or owner)")),
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value).with_context(|| format!("Invalid {field} address: {value}"))
}

fn parse_records(owner: Address, texts: &[String], contenthash: Option<&str>) -> Result<Vec<Record>> {
    let mut records = vec![Record::Addr(owner)];
    for text in texts {
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| anyhow!("Text record must be key=value: {text}"))?;
        records.push(Record::Text {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    if let Some(hash) = contenthash {
        let bytes = Bytes::from_str(hash).context("Invalid content hash hex")?;
        records.push(Record::ContentHash(bytes));
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?.validate()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let deployer_key = require_key(
        args.deployer_key,
        args.deployer_key_file,
        DEPLOYER_KEY_ENV,
        DEPLOYER_KEY_FILE_ENV,
    )?;
    let owner_key = load_key(
        args.owner_key,
        args.owner_key_file,
        OWNER_KEY_ENV,
        OWNER_KEY_FILE_ENV,
    )?;
    let network = EvmNetwork::connect(&config, &deployer_key, owner_key.as_deref())?;
    network.ensure_chain().await?;

    let book = NamedContracts::open(&config.deployments, &config.identity)?;
    let contracts = RegistrarContracts::from_book(&book)
        .context("Deployment store is missing registrar contracts; run namereg-deploy first")?;
    let resolver = match args.resolver.as_deref() {
        Some(value) => parse_address("resolver", value)?,
        None => default_resolver(&network, &book).await?,
    };
    let owner = match args.address.as_deref() {
        Some(value) => parse_address("owner", value)?,
        None => network.accounts().address(args.from),
    };
    let records = parse_records(owner, &args.texts, args.contenthash.as_deref())?;
    let request = RegistrationRequest::new(args.name, owner, args.duration, resolver)
        .with_records(records)
        .with_reverse_record(!args.no_reverse);

    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(true);
        }
    });

    info!(
        network = %config.identity.name,
        name = %request.name(),
        owner = %format!("{:#x}", owner),
        resolver = %format!("{:#x}", resolver),
        from = %args.from,
        "Registering name"
    );
    let registrar = CommitRevealRegistrar::new(&network, contracts, args.from, config.registrar.clone())
        .with_shutdown(rx);
    match registrar.register(&request).await {
        Ok(result) => {
            info!(
                name = %result.name,
                node = %format!("{:#x}", result.node),
                commit_tx = %format!("{:#x}", result.commit_tx.tx_hash),
                register_tx = %format!("{:#x}", result.register_tx.tx_hash),
                paid = %result.paid,
                stage = %result.stage,
                "Registration complete"
            );
            println!("Registered {} (paid {} wei)", result.name, result.paid);
            if let Some(address) = result.verification.address {
                println!("{} resolves to {:#x}", result.name, address);
            }
            if let Some(reverse) = &result.verification.reverse_name {
                println!("{:#x} reverse-resolves to {}", registrar.sender(), reverse);
            }
            Ok(())
        }
        Err(err @ RegistrationError::DomainUnavailable { .. }) => {
            warn!(%err, "Pick another label");
            Err(err.into())
        }
        Err(err) => {
            if err.is_recoverable() {
                warn!(%err, "Registration can be retried with a fresh secret");
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let owner = Address::repeat_byte(1);
        let records = parse_records(
            owner,
            &["url=https://example.org".to_string()],
            Some("0xe301"),
        )
        .unwrap();
        assert_eq!(records[0], Record::Addr(owner));
        assert_eq!(
            records[1],
            Record::Text {
                key: "url".to_string(),
                value: "https://example.org".to_string(),
            }
        );
        assert_eq!(records[2], Record::ContentHash(Bytes::from(vec![0xe3, 0x01])));
        assert!(parse_records(owner, &["missing-separator".to_string()], None).is_err());
    }

    #[test]
    fn test_parse_account() {
        assert_eq!(parse_account("owner").unwrap(), Account::Owner);
        assert!(parse_account("root").is_err());
    }
}
