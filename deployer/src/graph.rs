//! Dependency graph between deployment units.
//!
//! Edges come from declared dependencies (matched by id or tag) and from
//! `contract:` constructor arguments. Names that match no selected unit must
//! already be in the book. Units are ordered with Kahn's algorithm; among the
//! units ready at the same time, the one listed first in the manifest runs
//! first.

use crate::{plan::DeploymentUnit, DeployError, Result};
use namereg_client::NamedContracts;
use std::collections::BTreeSet;

/// Something a unit waits for.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Edge {
    /// Another selected unit, by position.
    Unit(usize),
    /// A contract recorded by an earlier run.
    Deployed(String),
}

fn external(unit: &DeploymentUnit, name: &str, book: &NamedContracts) -> Result<Edge> {
    if book.contains(name) {
        Ok(Edge::Deployed(name.to_string()))
    } else {
        Err(DeployError::UnknownDependency {
            unit: unit.id.clone(),
            dependency: name.to_string(),
        })
    }
}

/// Dependencies of `units[index]`, deduplicated.
pub fn edges(units: &[DeploymentUnit], index: usize, book: &NamedContracts) -> Result<Vec<Edge>> {
    let unit = &units[index];
    let mut edges = BTreeSet::new();
    for dependency in &unit.dependencies {
        if *dependency == unit.id {
            return Err(DeployError::CyclicDependency {
                units: vec![unit.id.clone()],
            });
        }
        let providers: Vec<Edge> = units
            .iter()
            .enumerate()
            .filter(|(other, candidate)| *other != index && candidate.answers_to(dependency))
            .map(|(other, _)| Edge::Unit(other))
            .collect();
        if providers.is_empty() {
            edges.insert(external(unit, dependency, book)?);
        } else {
            edges.extend(providers);
        }
    }
    for name in unit.contract_args() {
        match units.iter().position(|candidate| candidate.id == name) {
            Some(other) if other == index => {
                return Err(DeployError::CyclicDependency {
                    units: vec![unit.id.clone()],
                })
            }
            Some(other) => {
                edges.insert(Edge::Unit(other));
            }
            None => {
                edges.insert(external(unit, name, book)?);
            }
        }
    }
    Ok(edges.into_iter().collect())
}

/// Execution order of `units`, as indices into the slice.
pub fn order(units: &[DeploymentUnit], book: &NamedContracts) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for index in 0..units.len() {
        for edge in edges(units, index, book)? {
            if let Edge::Unit(dependency) = edge {
                in_degree[index] += 1;
                dependents[dependency].push(index);
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| index)
        .collect();
    let mut order = Vec::with_capacity(units.len());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < units.len() {
        let units = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| units[index].id.clone())
            .collect();
        return Err(DeployError::CyclicDependency { units });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Arg;
    use ethers::types::{Address, H256};
    use namereg_client::DeploymentRecord;
    use namereg_types::NetworkIdentity;

    fn book() -> NamedContracts {
        NamedContracts::in_memory(&NetworkIdentity {
            name: "test".to_string(),
            chain_id: 1,
            legacy: false,
        })
    }

    fn contract(name: &str) -> Arg {
        Arg::Contract(name.to_string())
    }

    fn ordered<'a>(units: &'a [DeploymentUnit], book: &NamedContracts) -> Vec<&'a str> {
        order(units, book)
            .unwrap()
            .into_iter()
            .map(|index| units[index].id.as_str())
            .collect()
    }

    #[test]
    fn test_chain() {
        let units = vec![
            DeploymentUnit::new("C").with_dependency("B"),
            DeploymentUnit::new("B").with_arg(contract("A")),
            DeploymentUnit::new("A"),
        ];
        assert_eq!(ordered(&units, &book()), ["A", "B", "C"]);
    }

    #[test]
    fn test_independent_units_keep_manifest_order() {
        let units = vec![
            DeploymentUnit::new("Oracle"),
            DeploymentUnit::new("Registry"),
            DeploymentUnit::new("Metadata"),
        ];
        assert_eq!(ordered(&units, &book()), ["Oracle", "Registry", "Metadata"]);
    }

    #[test]
    fn test_diamond() {
        let units = vec![
            DeploymentUnit::new("Resolver")
                .with_arg(contract("Wrapper"))
                .with_arg(contract("Reverse")),
            DeploymentUnit::new("Wrapper").with_arg(contract("Registry")),
            DeploymentUnit::new("Reverse").with_arg(contract("Registry")),
            DeploymentUnit::new("Registry"),
        ];
        assert_eq!(
            ordered(&units, &book()),
            ["Registry", "Wrapper", "Reverse", "Resolver"]
        );
    }

    #[test]
    fn test_tag_dependency() {
        let units = vec![
            DeploymentUnit::new("PublicResolver").with_dependency("registry"),
            DeploymentUnit::new("LegacyENSRegistry").with_tag("registry"),
            DeploymentUnit::new("ENSRegistry")
                .with_arg(contract("LegacyENSRegistry"))
                .with_tag("registry"),
        ];
        assert_eq!(
            edges(&units, 0, &book()).unwrap(),
            [Edge::Unit(1), Edge::Unit(2)]
        );
        assert_eq!(
            ordered(&units, &book()),
            ["LegacyENSRegistry", "ENSRegistry", "PublicResolver"]
        );
    }

    #[test]
    fn test_cycle() {
        let units = vec![
            DeploymentUnit::new("Root"),
            DeploymentUnit::new("A").with_dependency("B"),
            DeploymentUnit::new("B").with_arg(contract("A")),
        ];
        match order(&units, &book()) {
            Err(DeployError::CyclicDependency { units }) => assert_eq!(units, ["A", "B"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency() {
        let units = vec![DeploymentUnit::new("A").with_arg(contract("A"))];
        assert!(matches!(
            order(&units, &book()),
            Err(DeployError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let units = vec![DeploymentUnit::new("PublicResolver").with_arg(contract("NameWrapper"))];
        match order(&units, &book()) {
            Err(DeployError::UnknownDependency { unit, dependency }) => {
                assert_eq!(unit, "PublicResolver");
                assert_eq!(dependency, "NameWrapper");
            }
            other => panic!("expected unknown dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_dependency_from_book() {
        let mut book = book();
        book.record(
            "NameWrapper",
            DeploymentRecord {
                address: Address::repeat_byte(9),
                artifact: "NameWrapper".to_string(),
                fingerprint: H256::zero(),
                tx_hash: None,
                block: None,
            },
        )
        .unwrap();
        let units = vec![DeploymentUnit::new("PublicResolver").with_arg(contract("NameWrapper"))];
        assert_eq!(
            edges(&units, 0, &book).unwrap(),
            [Edge::Deployed("NameWrapper".to_string())]
        );
        assert_eq!(ordered(&units, &book), ["PublicResolver"]);
    }
}
