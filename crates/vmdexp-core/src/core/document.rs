use super::table::{Table, TableError, is_id_label, shift_ids_in};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// The `[class, subclass]` pair identifying an engine-input entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryType(pub String, pub String);

impl EntryType {
    pub fn new(class: &str, subclass: &str) -> Self {
        Self(class.to_string(), subclass.to_string())
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

/// Parameter keys whose values carry particle ids.
const ID_PARAMETERS: [&str; 2] = ["ids", "selection"];

pub const GROUPS_ENTRY: &str = "groups";

/// One named sub-entry of the engine-input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Vec<Value>>,
}

impl Entry {
    pub fn new(class: &str, subclass: &str) -> Self {
        Self {
            entry_type: EntryType::new(class, subclass),
            parameters: Map::new(),
            labels: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.labels = table.labels;
        self.data = table.data;
        self
    }

    pub fn table(&self) -> Table {
        Table {
            labels: self.labels.clone(),
            data: self.data.clone(),
        }
    }

    /// A `["Groups","GroupsList"]` entry with one `Ids` group per row.
    pub fn groups_list(groups: &[Group]) -> Self {
        let mut table = Table::new(&["name", "type", "selection"]);
        table.data = groups
            .iter()
            .map(|g| {
                vec![
                    Value::from(g.name.as_str()),
                    Value::from("Ids"),
                    Value::Array(g.ids.iter().map(|&id| Value::from(id)).collect()),
                ]
            })
            .collect();
        Entry::new("Groups", "GroupsList").with_table(table)
    }

    pub fn is_groups_list(&self) -> bool {
        self.entry_type == EntryType::new("Groups", "GroupsList")
    }

    /// Shifts every particle id carried by this entry, in id-bearing table
    /// columns and id-bearing parameters alike.
    pub fn shift_ids(&mut self, offset: i64) {
        for key in ID_PARAMETERS {
            if let Some(v) = self.parameters.get_mut(key) {
                shift_ids_in(v, offset);
            }
        }
        let id_columns: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| is_id_label(l))
            .map(|(i, _)| i)
            .collect();
        for row in &mut self.data {
            for &col in &id_columns {
                if let Some(cell) = row.get_mut(col) {
                    shift_ids_in(cell, offset);
                }
            }
        }
    }

    /// True when both entries describe the same interaction and can share rows.
    pub fn compatible_with(&self, other: &Entry) -> bool {
        self.entry_type == other.entry_type
            && self.parameters == other.parameters
            && self.labels == other.labels
    }

    fn group_names(&self) -> BTreeSet<String> {
        let Some(col) = self.labels.iter().position(|l| l == "name") else {
            return BTreeSet::new();
        };
        self.data
            .iter()
            .filter_map(|row| row.get(col).and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

/// A named particle group produced by resolving a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub ids: Vec<usize>,
}

/// The named sections of the engine-input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    System,
    Global,
    Integrator,
    ForceField,
    SimulationStep,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Section::System => "system",
            Section::Global => "global",
            Section::Integrator => "integrator",
            Section::ForceField => "topology.forceField",
            Section::SimulationStep => "simulationStep",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Duplicate entry '{name}' in {section}")]
    DuplicateName { section: Section, name: String },

    #[error("Duplicate group '{name}' in {section}")]
    DuplicateGroup { section: Section, name: String },

    #[error("Cannot merge {table} tables: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: TableError,
    },
}

/// One producer's contribution to the engine-input document.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    Entry {
        section: Section,
        name: String,
        entry: Entry,
    },
    State(Table),
    Structure(Table),
}

impl Contribution {
    pub fn entry(section: Section, name: impl Into<String>, entry: Entry) -> Self {
        Contribution::Entry {
            section,
            name: name.into(),
            entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    pub structure: Table,
    #[serde(rename = "forceField")]
    pub force_field: BTreeMap<String, Entry>,
}

/// The complete, self-contained input document for one engine run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineInput {
    pub system: BTreeMap<String, Entry>,
    pub global: BTreeMap<String, Entry>,
    pub integrator: BTreeMap<String, Entry>,
    pub state: Table,
    pub topology: Topology,
    #[serde(rename = "simulationStep")]
    pub simulation_step: BTreeMap<String, Entry>,
}

/// Structure columns that default to zero for particles whose model does
/// not provide them.
const STRUCTURE_DEFAULTS: [&str; 4] = ["resId", "chainId", "modelId", "batchId"];

pub fn structure_fill(label: &str) -> Option<Value> {
    STRUCTURE_DEFAULTS.contains(&label).then(|| Value::from(0))
}

impl EngineInput {
    /// Builds a document from contributions without mutating any of them.
    ///
    /// Entries are merged by name within their section; a repeated name
    /// fails unless both entries are group lists, whose rows are combined as
    /// long as group names stay unique. State and structure rows are
    /// concatenated in contribution order.
    pub fn merge(contributions: impl IntoIterator<Item = Contribution>) -> Result<Self, DocumentError> {
        let mut doc = EngineInput::default();
        for contribution in contributions {
            match contribution {
                Contribution::Entry {
                    section,
                    name,
                    entry,
                } => doc.insert(section, name, entry)?,
                Contribution::State(table) => doc
                    .state
                    .append(&table, |_| None)
                    .map_err(|source| DocumentError::Table {
                        table: "state",
                        source,
                    })?,
                Contribution::Structure(table) => doc
                    .topology
                    .structure
                    .append(&table, structure_fill)
                    .map_err(|source| DocumentError::Table {
                        table: "structure",
                        source,
                    })?,
            }
        }
        Ok(doc)
    }

    pub fn section(&self, section: Section) -> &BTreeMap<String, Entry> {
        match section {
            Section::System => &self.system,
            Section::Global => &self.global,
            Section::Integrator => &self.integrator,
            Section::ForceField => &self.topology.force_field,
            Section::SimulationStep => &self.simulation_step,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Entry> {
        match section {
            Section::System => &mut self.system,
            Section::Global => &mut self.global,
            Section::Integrator => &mut self.integrator,
            Section::ForceField => &mut self.topology.force_field,
            Section::SimulationStep => &mut self.simulation_step,
        }
    }

    pub fn insert(&mut self, section: Section, name: String, entry: Entry) -> Result<(), DocumentError> {
        let entries = self.section_mut(section);
        match entries.get_mut(&name) {
            None => {
                entries.insert(name, entry);
                Ok(())
            }
            Some(existing) if existing.is_groups_list() && entry.is_groups_list() => {
                let existing_names = existing.group_names();
                if let Some(dup) = entry.group_names().intersection(&existing_names).next() {
                    return Err(DocumentError::DuplicateGroup {
                        section,
                        name: dup.clone(),
                    });
                }
                existing.data.extend(entry.data);
                Ok(())
            }
            Some(_) => Err(DocumentError::DuplicateName { section, name }),
        }
    }

    pub fn number_of_particles(&self) -> usize {
        self.state.len()
    }

    /// Shifts every particle id in the document by `offset`.
    pub fn shift_ids(&mut self, offset: i64) {
        self.state.shift_ids(offset);
        self.topology.structure.shift_ids(offset);
        for section in [
            Section::System,
            Section::Global,
            Section::Integrator,
            Section::ForceField,
            Section::SimulationStep,
        ] {
            for entry in self.section_mut(section).values_mut() {
                entry.shift_ids(offset);
            }
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bond_entry(rows: Vec<Vec<Value>>) -> Entry {
        let mut table = Table::new(&["id_i", "id_j", "K", "r0"]);
        table.data = rows;
        Entry::new("Bond2", "Harmonic").with_table(table)
    }

    #[test]
    fn merge_rejects_duplicate_names_within_a_section() {
        let err = EngineInput::merge(vec![
            Contribution::entry(Section::ForceField, "bonds", bond_entry(vec![])),
            Contribution::entry(Section::ForceField, "bonds", bond_entry(vec![])),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            DocumentError::DuplicateName {
                section: Section::ForceField,
                name: "bonds".into()
            }
        );
    }

    #[test]
    fn same_name_in_different_sections_is_allowed() {
        let doc = EngineInput::merge(vec![
            Contribution::entry(Section::ForceField, "x", bond_entry(vec![])),
            Contribution::entry(Section::SimulationStep, "x", Entry::new("UtilsStep", "InfoStep")),
        ])
        .unwrap();
        assert!(doc.topology.force_field.contains_key("x"));
        assert!(doc.simulation_step.contains_key("x"));
    }

    #[test]
    fn group_lists_merge_rows_and_reject_duplicate_groups() {
        let g1 = Entry::groups_list(&[Group { name: "a".into(), ids: vec![0, 1] }]);
        let g2 = Entry::groups_list(&[Group { name: "b".into(), ids: vec![2] }]);
        let doc = EngineInput::merge(vec![
            Contribution::entry(Section::SimulationStep, GROUPS_ENTRY, g1.clone()),
            Contribution::entry(Section::SimulationStep, GROUPS_ENTRY, g2),
        ])
        .unwrap();
        assert_eq!(doc.simulation_step[GROUPS_ENTRY].data.len(), 2);

        let err = EngineInput::merge(vec![
            Contribution::entry(Section::SimulationStep, GROUPS_ENTRY, g1.clone()),
            Contribution::entry(Section::SimulationStep, GROUPS_ENTRY, g1),
        ])
        .unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateGroup { .. }));
    }

    #[test]
    fn entry_shift_covers_tables_and_id_parameters() {
        let mut entry = bond_entry(vec![vec![json!(0), json!(1), json!(10.0), json!(1.0)]])
            .with_parameter("ids", json!([3, 4]))
            .with_parameter("K", json!(2));
        entry.shift_ids(5);
        assert_eq!(entry.data[0][..2], [json!(5), json!(6)]);
        assert_eq!(entry.parameters["ids"], json!([8, 9]));
        assert_eq!(entry.parameters["K"], json!(2));
    }

    #[test]
    fn entries_serialize_with_type_pair_and_skip_empty_fields() {
        let entry = Entry::new("Langevin", "BBK").with_parameter("timeStep", 0.01);
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"type": ["Langevin", "BBK"], "parameters": {"timeStep": 0.01}})
        );
    }

    #[test]
    fn structure_rows_fill_known_integer_columns() {
        let mut a = Table::new(&["id", "type", "modelId"]);
        a.push_row(vec![json!(0), json!("A"), json!(0)]).unwrap();
        let mut b = Table::new(&["id", "type"]);
        b.push_row(vec![json!(1), json!("B")]).unwrap();
        let doc = EngineInput::merge(vec![Contribution::Structure(a), Contribution::Structure(b)]).unwrap();
        assert_eq!(doc.topology.structure.data[1], vec![json!(1), json!("B"), json!(0)]);
    }
}
