use super::{model_class, particle_type, with_type_parameters};
use crate::core::component::{Built, ComponentClass, ComponentError};
use crate::core::document::Entry;
use crate::core::models::{ModelData, ModelKind, ModelParts, POSITION_COLUMN, TYPE_COLUMN};
use crate::core::registry::RegistryError;
use crate::core::schema::{DefaultValue, ParamKind, Parameters};
use crate::core::selection::{SelectionError, parse_ids};
use crate::core::table::Table;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

const POLYMER_INDEX: &str = "polymerIndex";
const MONOMER_INDEX: &str = "monomerIndex";
const ENDS: &str = "ends";

const RES_ID: &str = "resId";
const CHAIN_ID: &str = "chainId";
const MODEL_ID: &str = "modelId";

pub(super) fn class() -> Result<ComponentClass, RegistryError> {
    with_type_parameters(model_class("POLYMER"))
        .required("numberOfMonomers", ParamKind::PositiveInteger)
        .defaulted("numberOfPolymers", ParamKind::PositiveInteger, DefaultValue::Integer(1))
        .required("bondLength", ParamKind::PositiveReal)
        .required("K", ParamKind::Real)
        .predicates(&[TYPE_COLUMN, POLYMER_INDEX, MONOMER_INDEX, ENDS])
        .build()
}

/// Linear harmonic chains laid out side by side in the xy plane.
///
/// Each chain is straight along x with the given bond length; chains are
/// stacked along y two bond lengths apart. Particle `p * M + m` is monomer
/// `m` of polymer `p`.
pub(super) fn build(params: &Parameters) -> Result<Built, ComponentError> {
    let monomers = params.count("numberOfMonomers")?;
    let polymers = params.count("numberOfPolymers")?;
    let bond_length = params.real("bondLength")?;
    let k = params.real("K")?;
    let (type_name, info) = particle_type(params)?;

    let mut state = Table::new(&[POSITION_COLUMN]);
    let mut structure = Table::new(&[TYPE_COLUMN, RES_ID, CHAIN_ID, MODEL_ID]);
    let mut bonds = Table::new(&["id_i", "id_j", "K", "r0"]);

    let x0 = (monomers as f64 - 1.0) / 2.0;
    let y0 = (polymers as f64 - 1.0) / 2.0;
    for p in 0..polymers {
        for m in 0..monomers {
            let id = p * monomers + m;
            let x = (m as f64 - x0) * bond_length;
            let y = (p as f64 - y0) * 2.0 * bond_length;
            state.push_row(vec![json!([x, y, 0.0])])?;
            structure.push_row(vec![
                Value::from(type_name.as_str()),
                Value::from(m),
                Value::from(p),
                Value::from(p),
            ])?;
            if m + 1 < monomers {
                bonds.push_row(vec![
                    Value::from(id),
                    Value::from(id + 1),
                    Value::from(k),
                    Value::from(bond_length),
                ])?;
            }
        }
    }

    let data = ModelData {
        state,
        structure,
        force_field: BTreeMap::from([(
            "bonds".to_string(),
            Entry::new("Bond2", "Harmonic").with_table(bonds),
        )]),
        types: BTreeMap::from([(type_name, info)]),
    };
    Ok(Built::Model(ModelParts::new(data, PolymerKind { monomers })))
}

#[derive(Debug, Clone, Copy)]
struct PolymerKind {
    monomers: usize,
}

impl PolymerKind {
    fn matching(data: &ModelData, column: &str, wanted: &[i64]) -> BTreeSet<usize> {
        data.structure
            .column(column)
            .map(|values| {
                values
                    .enumerate()
                    .filter(|(_, v)| v.as_i64().is_some_and(|v| wanted.contains(&v)))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ModelKind for PolymerKind {
    fn select(
        &self,
        data: &ModelData,
        predicate: &str,
        value: &Value,
    ) -> Result<BTreeSet<usize>, SelectionError> {
        match predicate {
            POLYMER_INDEX => Ok(Self::matching(data, CHAIN_ID, &parse_ids(predicate, value)?)),
            MONOMER_INDEX => Ok(Self::matching(data, RES_ID, &parse_ids(predicate, value)?)),
            ENDS => {
                let want_ends = value.as_bool().ok_or_else(|| SelectionError::InvalidPredicateValue {
                    predicate: predicate.to_string(),
                    reason: "expected a boolean".into(),
                })?;
                let last = self.monomers.saturating_sub(1) as i64;
                let ends = Self::matching(data, RES_ID, &[0, last]);
                Ok((0..data.particle_count())
                    .filter(|i| ends.contains(i) == want_ends)
                    .collect())
            }
            other => Err(SelectionError::InvalidPredicateValue {
                predicate: other.to_string(),
                reason: "predicate is not implemented by POLYMER".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Model;

    fn polymer(monomers: i64, polymers: i64) -> Model {
        let params = class()
            .unwrap()
            .schema
            .validate(
                "POLYMER",
                json!({"numberOfMonomers": monomers, "numberOfPolymers": polymers, "bondLength": 1.0, "K": 100.0})
                    .as_object()
                    .unwrap(),
            )
            .unwrap();
        let Built::Model(parts) = build(&params).unwrap() else {
            panic!("model expected");
        };
        Model::new("poly", "POLYMER", parts, class().unwrap().defined_selections).unwrap()
    }

    fn select(model: &Model, predicate: &str, value: Value) -> Vec<usize> {
        let predicates = BTreeMap::from([(predicate.to_string(), value)]);
        model.resolve_selection(&predicates).unwrap().into_iter().collect()
    }

    #[test]
    fn chains_are_bonded_within_but_not_across_polymers() {
        let model = polymer(3, 2);
        assert_eq!(model.particle_count(), 6);
        let bonds = &model.force_field()["bonds"];
        let pairs: Vec<(i64, i64)> = bonds
            .data
            .iter()
            .map(|row| (row[0].as_i64().unwrap(), row[1].as_i64().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (3, 4), (4, 5)]);
    }

    #[test]
    fn polymer_predicates_select_by_chain_and_position() {
        let model = polymer(4, 2);
        assert_eq!(select(&model, POLYMER_INDEX, json!(1)), vec![4, 5, 6, 7]);
        assert_eq!(select(&model, MONOMER_INDEX, json!([0])), vec![0, 4]);
        assert_eq!(select(&model, ENDS, json!(true)), vec![0, 3, 4, 7]);
        assert_eq!(select(&model, ENDS, json!(false)), vec![1, 2, 5, 6]);
    }

    #[test]
    fn ends_requires_a_boolean() {
        let model = polymer(2, 1);
        let predicates = BTreeMap::from([(ENDS.to_string(), json!("yes"))]);
        assert!(matches!(
            model.resolve_selection(&predicates),
            Err(SelectionError::InvalidPredicateValue { .. })
        ));
    }
}
