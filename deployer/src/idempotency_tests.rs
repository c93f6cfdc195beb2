use crate::{
    DeployError, DeploymentUnit, EnsHooks, NameListImporter, NoHooks, Plan, Sequencer, UnitOutcome,
};
use namereg_client::{
    mocks::{local_identity, MockNetwork},
    NamedContracts, Network,
};

const MANIFEST: &str = include_str!("../manifests/ens.yaml");

fn plan() -> Plan {
    Plan::from_yaml(MANIFEST).unwrap()
}

fn hooks() -> EnsHooks<NameListImporter> {
    EnsHooks::new(NameListImporter::default())
}

fn deployed_ids(report: &crate::DeploymentReport) -> Vec<&str> {
    report.deployed().map(|unit| unit.id.as_str()).collect()
}

#[tokio::test]
async fn test_rerun_is_noop() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = plan();

    let first = Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    assert_eq!(first.deployed().count(), 9);
    // 9 deployments, eth, resolver.eth, root, default resolver, resolver and addr.
    assert_eq!(network.transactions(), 15);
    let snapshot = book.entries().clone();

    let second = Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    assert_eq!(second.deployed().count(), 0);
    assert_eq!(second.reused().count(), 9);
    assert_eq!(network.transactions(), 15);
    assert_eq!(book.entries(), &snapshot);
}

#[tokio::test]
async fn test_manifest_order() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let report = Sequencer::new(&network)
        .run(&plan(), &mut book, &mut NoHooks)
        .await
        .unwrap();
    let order: Vec<&str> = report.units.iter().map(|unit| unit.id.as_str()).collect();
    assert_eq!(
        order,
        [
            "ENSRegistry",
            "BaseRegistrarImplementation",
            "ReverseRegistrar",
            "StaticMetadataService",
            "NameWrapper",
            "DummyOracle",
            "ExponentialPremiumPriceOracle",
            "ETHRegistrarController",
            "PublicResolver",
        ]
    );
    assert_eq!(network.transactions(), 9);
}

#[tokio::test]
async fn test_force_redeploys_one_unit() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = plan();
    Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    let previous = book.require("PublicResolver").unwrap();
    let before = network.transactions();

    let report = Sequencer::new(&network)
        .force("PublicResolver")
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    assert_eq!(deployed_ids(&report), ["PublicResolver"]);
    let current = book.require("PublicResolver").unwrap();
    assert_ne!(current, previous);
    // Deployment plus rewiring of the default resolver, resolver and addr.
    assert_eq!(network.transactions(), before + 4);
}

#[tokio::test]
async fn test_force_all() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = plan();
    Sequencer::new(&network)
        .run(&plan, &mut book, &mut NoHooks)
        .await
        .unwrap();
    let report = Sequencer::new(&network)
        .force_all(true)
        .run(&plan, &mut book, &mut NoHooks)
        .await
        .unwrap();
    assert_eq!(report.deployed().count(), 9);
}

#[tokio::test]
async fn test_changed_artifact_cascades() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = plan();
    Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();

    network.bump_artifact("ReverseRegistrar");
    let report = Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    // Dependents take the new address as a constructor argument.
    assert_eq!(
        deployed_ids(&report),
        ["ReverseRegistrar", "ETHRegistrarController", "PublicResolver"]
    );
}

#[tokio::test]
async fn test_missing_code_redeploys() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = Plan::new(vec![DeploymentUnit::new("DummyOracle")]);
    Sequencer::new(&network)
        .run(&plan, &mut book, &mut NoHooks)
        .await
        .unwrap();
    let previous = book.require("DummyOracle").unwrap();

    network.remove_code(previous);
    let report = Sequencer::new(&network)
        .run(&plan, &mut book, &mut NoHooks)
        .await
        .unwrap();
    assert!(matches!(report.units[0].outcome, UnitOutcome::Deployed { .. }));
    assert_ne!(book.require("DummyOracle").unwrap(), previous);
}

#[tokio::test]
async fn test_tags_limit_selection() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let report = Sequencer::new(&network)
        .with_tags(vec!["registry".to_string()])
        .run(&plan(), &mut book, &mut hooks())
        .await
        .unwrap();
    assert_eq!(deployed_ids(&report), ["ENSRegistry"]);
    assert_eq!(book.len(), 1);
    // Deployment, eth, resolver.eth and the root transfer.
    assert_eq!(network.transactions(), 4);
}

#[tokio::test]
async fn test_unit_failure_keeps_earlier_records() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    network.fail_deploy("NameWrapper");
    let err = Sequencer::new(&network)
        .run(&plan(), &mut book, &mut NoHooks)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Unit { ref unit, .. } if unit == "NameWrapper"));
    assert!(book.contains("ENSRegistry"));
    assert!(book.contains("StaticMetadataService"));
    assert!(!book.contains("NameWrapper"));
    assert!(!book.contains("DummyOracle"));
}

#[tokio::test]
async fn test_unknown_dependency_sends_nothing() {
    let network = MockNetwork::new(local_identity(false));
    let mut book = NamedContracts::in_memory(network.identity());
    let plan = Plan::from_yaml(
        "units:\n  - id: DummyOracle\n  - id: PublicResolver\n    args: [\"contract:NameWrapper\"]\n",
    )
    .unwrap();
    let err = Sequencer::new(&network)
        .run(&plan, &mut book, &mut NoHooks)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::UnknownDependency { .. }));
    assert_eq!(network.transactions(), 0);
}

#[tokio::test]
async fn test_book_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = MockNetwork::new(local_identity(false));
    let plan = plan();
    {
        let mut book = NamedContracts::open(dir.path(), network.identity()).unwrap();
        Sequencer::new(&network)
            .run(&plan, &mut book, &mut hooks())
            .await
            .unwrap();
    }
    let before = network.transactions();

    let mut book = NamedContracts::open(dir.path(), network.identity()).unwrap();
    assert_eq!(book.len(), 9);
    let report = Sequencer::new(&network)
        .run(&plan, &mut book, &mut hooks())
        .await
        .unwrap();
    assert_eq!(report.deployed().count(), 0);
    assert_eq!(network.transactions(), before);
}
