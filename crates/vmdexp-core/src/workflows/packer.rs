use super::materialize::can_share_set;
use crate::engine::composer::ComposedSimulation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// How a pool is partitioned into simulation sets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PackerMode {
    /// Every simulation is its own set.
    #[default]
    None,
    /// At most `size` simulations per set.
    Size { size: usize },
    /// Greedy packing while the summed `property` stays within `limit`.
    UpperLimit { property: String, limit: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PackError {
    #[error("Simulation '{simulation}' does not expose the property '{property}'")]
    UnknownProperty { simulation: String, property: String },

    #[error("Set size must be at least 1")]
    InvalidSize,
}

/// Anything the packer can measure.
pub trait Packable {
    fn name(&self) -> &str;
    fn property(&self, name: &str) -> Option<f64>;

    /// Whether this item can join a set already holding `members`.
    fn can_join(&self, _members: &[&Self]) -> bool {
        true
    }
}

impl Packable for ComposedSimulation {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, name: &str) -> Option<f64> {
        ComposedSimulation::property(self, name)
    }

    fn can_join(&self, members: &[&Self]) -> bool {
        can_share_set(members, self)
    }
}

/// One planned set: its name and the pool indices of its members.
///
/// Set numbers start at 0: a session `TEST` of five simulations packed one
/// per set yields `TEST_0` through `TEST_4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPlan {
    pub name: String,
    pub members: Vec<usize>,
}

pub fn set_name(session: &str, index: usize) -> String {
    format!("{}_{}", session, index)
}

/// Partitions `items` into non-empty sets, preserving pool order.
///
/// Sets are named `<session>_<k>` with `k` counting from 0 (see
/// [`SetPlan`]). Concatenating the members of all sets in order yields
/// `0..items.len()`. In every mode an item that cannot join the open set
/// starts a new one.
pub fn pack<T: Packable>(mode: &PackerMode, session: &str, items: &[T]) -> Result<Vec<SetPlan>, PackError> {
    let groups: Vec<Vec<usize>> = match mode {
        PackerMode::None => (0..items.len()).map(|i| vec![i]).collect(),
        PackerMode::Size { size } => {
            if *size == 0 {
                return Err(PackError::InvalidSize);
            }
            let mut groups: Vec<Vec<usize>> = Vec::new();
            let mut current: Vec<usize> = Vec::new();
            for (index, item) in items.iter().enumerate() {
                if current.len() == *size || !joins_open_set(items, &current, item) {
                    groups.push(std::mem::take(&mut current));
                }
                current.push(index);
            }
            if !current.is_empty() {
                groups.push(current);
            }
            groups
        }
        PackerMode::UpperLimit { property, limit } => pack_upper_limit(items, property, *limit)?,
    };

    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(k, members)| SetPlan {
            name: set_name(session, k),
            members,
        })
        .collect())
}

fn joins_open_set<T: Packable>(items: &[T], current: &[usize], item: &T) -> bool {
    if current.is_empty() {
        return true;
    }
    let members: Vec<&T> = current.iter().filter_map(|&i| items.get(i)).collect();
    let joins = item.can_join(&members);
    if !joins {
        debug!(simulation = item.name(), "Incompatible with the open set; starting a new one.");
    }
    joins
}

fn pack_upper_limit<T: Packable>(items: &[T], property: &str, limit: f64) -> Result<Vec<Vec<usize>>, PackError> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut load = 0.0;

    for (index, item) in items.iter().enumerate() {
        let value = item.property(property).ok_or_else(|| PackError::UnknownProperty {
            simulation: item.name().to_string(),
            property: property.to_string(),
        })?;
        if value > limit {
            warn!(
                simulation = item.name(),
                property,
                value,
                limit,
                "Capacity exceeded: simulation is packed alone."
            );
        }
        if !current.is_empty() && (load + value > limit || !joins_open_set(items, &current, item)) {
            groups.push(std::mem::take(&mut current));
            load = 0.0;
        }
        current.push(index);
        load += value;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Job(&'static str, f64);

    impl Packable for Job {
        fn name(&self) -> &str {
            self.0
        }

        fn property(&self, name: &str) -> Option<f64> {
            (name == "numberOfParticles").then_some(self.1)
        }
    }

    /// A job that only shares a set with jobs of the same timestep.
    struct Stepped(&'static str, f64, u32);

    impl Packable for Stepped {
        fn name(&self) -> &str {
            self.0
        }

        fn property(&self, name: &str) -> Option<f64> {
            (name == "numberOfParticles").then_some(self.1)
        }

        fn can_join(&self, members: &[&Self]) -> bool {
            members.iter().all(|m| m.2 == self.2)
        }
    }

    fn members(plans: &[SetPlan]) -> Vec<Vec<usize>> {
        plans.iter().map(|p| p.members.clone()).collect()
    }

    fn limit(n: f64) -> PackerMode {
        PackerMode::UpperLimit {
            property: "numberOfParticles".into(),
            limit: n,
        }
    }

    #[test]
    fn size_one_gives_one_set_per_simulation_named_from_zero() {
        let items: Vec<Job> = (0..5).map(|_| Job("s", 1.0)).collect();
        let plans = pack(&PackerMode::Size { size: 1 }, "TEST", &items).unwrap();
        let names: Vec<&str> = plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["TEST_0", "TEST_1", "TEST_2", "TEST_3", "TEST_4"]);
        assert_eq!(members(&plans), vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn size_chunks_preserve_order() {
        let items: Vec<Job> = (0..5).map(|_| Job("s", 1.0)).collect();
        let plans = pack(&PackerMode::Size { size: 2 }, "T", &items).unwrap();
        assert_eq!(members(&plans), vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(pack(&PackerMode::Size { size: 0 }, "T", &items), Err(PackError::InvalidSize));
    }

    #[test]
    fn upper_limit_packs_greedily() {
        let items = vec![Job("a", 500.0), Job("b", 500.0), Job("c", 1500.0), Job("d", 600.0)];
        let plans = pack(&limit(2000.0), "T", &items).unwrap();
        assert_eq!(members(&plans), vec![vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn oversized_simulation_is_packed_alone() {
        let items = vec![Job("a", 10.0), Job("big", 5000.0), Job("c", 10.0)];
        let plans = pack(&limit(100.0), "T", &items).unwrap();
        assert_eq!(members(&plans), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn every_set_respects_the_limit_or_is_a_singleton() {
        let sizes = [30.0, 80.0, 10.0, 10.0, 250.0, 60.0, 40.0, 1.0];
        let items: Vec<Job> = sizes.iter().map(|&s| Job("s", s)).collect();
        let plans = pack(&limit(100.0), "T", &items).unwrap();

        let flattened: Vec<usize> = plans.iter().flat_map(|p| p.members.clone()).collect();
        assert_eq!(flattened, (0..items.len()).collect::<Vec<_>>());
        for plan in &plans {
            assert!(!plan.members.is_empty());
            let load: f64 = plan.members.iter().map(|&i| sizes[i]).sum();
            assert!(load <= 100.0 || plan.members.len() == 1);
        }
    }

    #[test]
    fn unknown_property_is_an_error() {
        let items = vec![Job("a", 1.0)];
        let mode = PackerMode::UpperLimit {
            property: "mass".into(),
            limit: 1.0,
        };
        assert!(matches!(
            pack(&mode, "T", &items),
            Err(PackError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn modes_deserialize_from_tagged_objects() {
        let mode: PackerMode =
            serde_json::from_str(r#"{"mode": "upperLimit", "property": "numberOfParticles", "limit": 2000}"#).unwrap();
        assert_eq!(mode, limit(2000.0));
        let none: PackerMode = serde_json::from_str(r#"{"mode": "none"}"#).unwrap();
        assert_eq!(none, PackerMode::None);
    }

    #[test]
    fn incompatible_simulations_start_a_new_set() {
        let items = vec![
            Stepped("a", 500.0, 1),
            Stepped("b", 500.0, 2),
            Stepped("c", 500.0, 2),
            Stepped("d", 500.0, 1),
        ];
        let plans = pack(&limit(2000.0), "T", &items).unwrap();
        assert_eq!(members(&plans), vec![vec![0], vec![1, 2], vec![3]]);

        let plans = pack(&PackerMode::Size { size: 3 }, "T", &items).unwrap();
        assert_eq!(members(&plans), vec![vec![0], vec![1, 2], vec![3]]);
    }
}
