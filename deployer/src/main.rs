use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use namereg_client::{
    config::{load_key, require_key, Config, ValidatedConfig},
    defaults::{DEPLOYER_KEY_ENV, DEPLOYER_KEY_FILE_ENV, OWNER_KEY_ENV, OWNER_KEY_FILE_ENV},
    evm::EvmNetwork,
    NamedContracts,
};
use namereg_deployer::{graph, EnsHooks, Mode, NameListImporter, Plan, Sequencer};
use std::path::PathBuf;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("namereg-deploy")
        .about("Deploy and bootstrap the naming system on one network.")
        .arg(
            Arg::new("config")
                .long("config")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("tags")
                .long("tags")
                .value_delimiter(',')
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::Append)
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("force_all")
                .long("force-all")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("import")
                .long("import")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log_json")
                .long("log-json")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("deployer_key")
                .long("deployer-key")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("deployer_key_file")
                .long("deployer-key-file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("owner_key")
                .long("owner-key")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("owner_key_file")
                .long("owner-key-file")
                .value_parser(value_parser!(PathBuf)),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let Some(path) = matches.get_one::<PathBuf>("config") else {
        eprintln!("missing --config");
        std::process::exit(1);
    };
    let config = match Config::load(path).and_then(Config::validate) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    // Initialize logger
    let subscriber = tracing_subscriber::fmt().with_max_level(config.log_level);
    if matches.get_flag("log_json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Err(err) = run(&matches, &config).await {
        error!("deployment failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run(matches: &ArgMatches, config: &ValidatedConfig) -> Result<()> {
    let manifest = matches
        .get_one::<PathBuf>("manifest")
        .context("missing --manifest")?;
    let plan = Plan::load(manifest)?;
    let tags = strings(matches, "tags");
    let mut book = NamedContracts::open(&config.deployments, &config.identity)
        .context("failed to open deployment store")?;

    if matches.get_flag("dry_run") {
        let units = plan.select(Mode::of(config.identity.legacy), &tags)?;
        for index in graph::order(&units, &book)? {
            let unit = &units[index];
            let state = match book.get(&unit.id) {
                Some(record) => format!("recorded at {:#x}", record.address),
                None => "new".to_string(),
            };
            println!("{:<32} {:<32} {}", unit.id, unit.artifact_name(), state);
        }
        return Ok(());
    }

    let deployer_key = require_key(
        matches.get_one::<String>("deployer_key").cloned(),
        matches.get_one::<PathBuf>("deployer_key_file").cloned(),
        DEPLOYER_KEY_ENV,
        DEPLOYER_KEY_FILE_ENV,
    )?;
    let owner_key = load_key(
        matches.get_one::<String>("owner_key").cloned(),
        matches.get_one::<PathBuf>("owner_key_file").cloned(),
        OWNER_KEY_ENV,
        OWNER_KEY_FILE_ENV,
    )?;
    let network = EvmNetwork::connect(config, &deployer_key, owner_key.as_deref())?;
    network.ensure_chain().await?;

    let importer = match matches.get_one::<PathBuf>("import") {
        Some(path) => NameListImporter::load(path)?,
        None => NameListImporter::default(),
    };
    if config.identity.legacy && importer.is_empty() {
        warn!("legacy network without --import; the legacy registry will be released empty");
    }
    let mut hooks = EnsHooks::new(importer).root_stays_open(config.root_stays_open);

    let mut sequencer = Sequencer::new(&network)
        .with_tags(tags)
        .force_all(matches.get_flag("force_all"));
    for id in strings(matches, "force") {
        sequencer = sequencer.force(id);
    }
    info!(
        network = %config.identity.name,
        chain_id = config.identity.chain_id,
        manifest = %manifest.display(),
        "deploying"
    );
    let report = sequencer.run(&plan, &mut book, &mut hooks).await?;

    for unit in &report.units {
        let action = if unit.outcome.is_deployed() {
            "deployed"
        } else {
            "reused"
        };
        println!(
            "{:<32} {:#x}  {} ({})",
            unit.id,
            unit.outcome.address(),
            action,
            unit.artifact
        );
    }
    if let Some(state) = hooks.root() {
        println!("root: {state}");
    }
    if let Some(migration) = hooks.migration() {
        println!(
            "legacy names: {} imported, {} failed",
            migration.outcome.imported,
            migration.outcome.failures.len()
        );
        for failure in &migration.outcome.failures {
            println!("  {}: {}", failure.name, failure.reason);
        }
    }
    if let Some(path) = book.path() {
        println!("address book: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let matches = cli()
            .try_get_matches_from([
                "namereg-deploy",
                "--config",
                "config/localhost.yaml",
                "--manifest",
                "manifests/ens.yaml",
                "--tags",
                "registry,resolvers",
                "--force",
                "PublicResolver",
                "--force",
                "ReverseRegistrar",
            ])
            .unwrap();
        assert_eq!(strings(&matches, "tags"), ["registry", "resolvers"]);
        assert_eq!(strings(&matches, "force"), ["PublicResolver", "ReverseRegistrar"]);
        assert!(!matches.get_flag("force_all"));
        assert!(cli()
            .try_get_matches_from(["namereg-deploy", "--config", "x.yaml"])
            .is_err());
    }
}
