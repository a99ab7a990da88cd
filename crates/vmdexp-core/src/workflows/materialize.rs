use super::manifest::{ENGINE_INPUT_FILE, ManifestError, SessionManifest, SetRecord, SimulationRecord, merge_summaries};
use super::packer::SetPlan;
use crate::components::global::TYPES_ENTRY;
use crate::core::document::{DocumentError, EngineInput, Entry, EntryType, GROUPS_ENTRY, Section, structure_fill};
use crate::core::table::{Table, TableError};
use crate::core::utils::paths::is_plain_component;
use crate::engine::composer::ComposedSimulation;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Structure column tagging each particle with its member index.
pub const BATCH_COLUMN: &str = "batchId";
pub const BATCHES_ENTRY: &str = "batches";
pub const INFORMATION_ENTRY: &str = "information";

/// Parameters holding member-relative output paths.
const PATH_PARAMETERS: [&str; 2] = ["outputFilePath", "backupFilePath"];

/// Sections whose entries every member of a set must agree on.
const SHARED_SECTIONS: [Section; 2] = [Section::Global, Section::Integrator];

#[derive(Debug, Error)]
pub enum MaterializationError {
    #[error("Set directory '{0}' already exists")]
    AlreadyExists(PathBuf),

    #[error("'{0}' cannot be used as a directory name")]
    InvalidName(String),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize engine input for '{name}': {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Simulation '{simulation}' cannot join its set: {section} entry '{entry}' differs from earlier members")]
    IncompatibleMember {
        simulation: String,
        section: Section,
        entry: String,
    },

    #[error("Set '{set}' member '{simulation}': {source}")]
    Document {
        set: String,
        simulation: String,
        #[source]
        source: DocumentError,
    },

    #[error("Set '{set}' member '{simulation}': {source}")]
    Table {
        set: String,
        simulation: String,
        #[source]
        source: TableError,
    },
}

/// A planned set that could not be merged, with its member names.
#[derive(Debug)]
pub struct RejectedSet {
    pub name: String,
    pub members: Vec<String>,
    pub error: MaterializationError,
}

/// The written session and the sets left out of it.
#[derive(Debug)]
pub struct Materialized {
    pub manifest: SessionManifest,
    pub rejected: Vec<RejectedSet>,
}

/// Writes packed sets to disk and records them in a session manifest.
///
/// Layout: `<root>/<session>/<set>/input.json` for the set-level input and
/// `<root>/<session>/<set>/<simulation>/input.json` for each member.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    overwrite: bool,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            root: root.into(),
            overwrite,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    /// Materializes every planned set and writes the session manifest.
    ///
    /// A set is merged before any of its files are written. Sets whose
    /// members cannot be merged are left out of the session and returned
    /// as rejected; the other sets are written regardless.
    ///
    /// # Errors
    ///
    /// Fails on a session, set or simulation name that is not a plain
    /// directory name, on a set directory that already exists (unless
    /// overwriting), and on I/O errors.
    #[instrument(skip_all, fields(session = session))]
    pub fn materialize(
        &self,
        session: &str,
        simulations: &[ComposedSimulation],
        plans: &[SetPlan],
    ) -> Result<Materialized, MaterializationError> {
        check_name(session)?;
        let session_dir = self.session_dir(session);
        create_dir(&session_dir)?;

        let mut manifest = SessionManifest::new(session);
        let mut rejected = Vec::new();
        for plan in plans {
            check_name(&plan.name)?;
            let members: Vec<&ComposedSimulation> = plan.members.iter().filter_map(|&i| simulations.get(i)).collect();
            for member in &members {
                check_name(&member.name)?;
            }

            let document = match merge_set(&plan.name, &members) {
                Ok(document) => document,
                Err(error) => {
                    warn!(set = %plan.name, "Set left out of the session: {}", error);
                    rejected.push(RejectedSet {
                        name: plan.name.clone(),
                        members: members.iter().map(|m| m.name.clone()).collect(),
                        error,
                    });
                    continue;
                }
            };

            let set_dir = session_dir.join(&plan.name);
            self.prepare_set_dir(&set_dir)?;
            for member in &members {
                let member_dir = set_dir.join(&member.name);
                create_dir(&member_dir)?;
                write_document(&member_dir.join(ENGINE_INPUT_FILE), &member.name, &member.document)?;
                manifest.simulations.push(SimulationRecord {
                    name: member.name.clone(),
                    set: plan.name.clone(),
                    result_dir: member_dir,
                    summary: member.summary.clone(),
                });
            }
            write_document(&set_dir.join(ENGINE_INPUT_FILE), &plan.name, &document)?;
            debug!(
                set = %plan.name,
                members = members.len(),
                particles = document.number_of_particles(),
                "Set materialized."
            );

            manifest.simulation_sets.push(SetRecord {
                name: plan.name.clone(),
                directory: set_dir,
                engine_options: vec![ENGINE_INPUT_FILE.to_string()],
                summary: merge_summaries(members.iter().map(|m| &m.summary)),
            });
        }

        manifest.write(&self.root).map_err(|e| match e {
            ManifestError::Io { path, source } => MaterializationError::Io { path, source },
            ManifestError::Json { source, .. } => MaterializationError::Json {
                name: session.to_string(),
                source,
            },
        })?;
        info!(
            sets = manifest.simulation_sets.len(),
            rejected = rejected.len(),
            "Session materialized."
        );
        Ok(Materialized { manifest, rejected })
    }

    fn prepare_set_dir(&self, dir: &Path) -> Result<(), MaterializationError> {
        if dir.exists() {
            if !self.overwrite {
                return Err(MaterializationError::AlreadyExists(dir.to_path_buf()));
            }
            std::fs::remove_dir_all(dir).map_err(|source| MaterializationError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        create_dir(dir)
    }
}

fn check_name(name: &str) -> Result<(), MaterializationError> {
    if is_plain_component(name) {
        Ok(())
    } else {
        Err(MaterializationError::InvalidName(name.to_string()))
    }
}

fn create_dir(dir: &Path) -> Result<(), MaterializationError> {
    std::fs::create_dir_all(dir).map_err(|source| MaterializationError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_document(path: &Path, name: &str, document: &EngineInput) -> Result<(), MaterializationError> {
    let json = document.to_json_pretty().map_err(|source| MaterializationError::Json {
        name: name.to_string(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| MaterializationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Merges the members of one set into a single engine input.
///
/// Member ids are shifted past the particles of earlier members and every
/// structure row is tagged with its member's `batchId`. Global and
/// integrator entries are shared and must agree across members (type rows
/// are unioned by name). Member-only entries are prefixed with the member
/// name, and output paths point into the member's directory.
pub fn merge_set(set: &str, members: &[&ComposedSimulation]) -> Result<EngineInput, MaterializationError> {
    let mut doc = EngineInput::default();
    let mut batches = Table::new(&[BATCH_COLUMN, "simulation", "input"]);
    let mut offset: i64 = 0;

    for (batch, member) in members.iter().enumerate() {
        let table_err = |source| MaterializationError::Table {
            set: set.to_string(),
            simulation: member.name.clone(),
            source,
        };
        let doc_err = |source| MaterializationError::Document {
            set: set.to_string(),
            simulation: member.name.clone(),
            source,
        };

        let mut input = member.document.clone();
        input.shift_ids(offset);
        offset += input.number_of_particles() as i64;

        doc.state.append(&input.state, |_| None).map_err(table_err)?;
        let tagged = input
            .topology
            .structure
            .with_constant_column(BATCH_COLUMN, Value::from(batch))
            .map_err(table_err)?;
        doc.topology.structure.append(&tagged, structure_fill).map_err(table_err)?;

        merge_shared_sections(&mut doc, member)?;

        let prefix = |name: &str| format!("{}_{}", member.name, name);
        for section in [Section::System, Section::ForceField, Section::SimulationStep] {
            for (name, mut entry) in std::mem::take(input.section_mut(section)) {
                if entry.entry_type == EntryType::new("Simulation", "Information") {
                    continue;
                }
                let name = if entry.is_groups_list() {
                    rename_groups(&mut entry, &prefix);
                    name
                } else {
                    if let Some(Value::String(group)) = entry.parameters.get_mut("group") {
                        *group = prefix(group);
                    }
                    for key in PATH_PARAMETERS {
                        if let Some(Value::String(path)) = entry.parameters.get_mut(key) {
                            *path = format!("{}/{}", member.name, path);
                        }
                    }
                    prefix(&name)
                };
                doc.insert(section, name, entry).map_err(doc_err)?;
            }
        }

        batches
            .push_row(vec![
                Value::from(batch),
                Value::from(member.name.as_str()),
                Value::from(format!("{}/{}", member.name, ENGINE_INPUT_FILE)),
            ])
            .map_err(table_err)?;
    }

    doc.system.insert(
        INFORMATION_ENTRY.to_string(),
        Entry::new("Simulation", "Information").with_parameter("name", set),
    );
    doc.system.insert(
        BATCHES_ENTRY.to_string(),
        Entry::new("Simulation", "Batches").with_table(batches),
    );
    Ok(doc)
}

/// Whether `candidate` can join a set already holding `members`.
pub fn can_share_set(members: &[&ComposedSimulation], candidate: &ComposedSimulation) -> bool {
    let mut doc = EngineInput::default();
    members
        .iter()
        .copied()
        .chain(std::iter::once(candidate))
        .all(|member| merge_shared_sections(&mut doc, member).is_ok())
}

fn merge_shared_sections(doc: &mut EngineInput, member: &ComposedSimulation) -> Result<(), MaterializationError> {
    for section in SHARED_SECTIONS {
        for (name, entry) in member.document.section(section) {
            merge_shared(doc, section, &member.name, name.clone(), entry.clone())?;
        }
    }
    Ok(())
}

fn merge_shared(
    doc: &mut EngineInput,
    section: Section,
    simulation: &str,
    name: String,
    entry: Entry,
) -> Result<(), MaterializationError> {
    let incompatible = |entry: &str| MaterializationError::IncompatibleMember {
        simulation: simulation.to_string(),
        section,
        entry: entry.to_string(),
    };
    let entries = doc.section_mut(section);
    match entries.get_mut(&name) {
        None => {
            entries.insert(name, entry);
        }
        Some(existing) if *existing == entry => {}
        Some(existing) if section == Section::Global && name == TYPES_ENTRY => {
            if !existing.compatible_with(&entry) {
                return Err(incompatible(&name));
            }
            let name_col = existing.labels.iter().position(|l| l == "name").unwrap_or(0);
            for row in entry.data {
                match existing.data.iter().find(|r| r.get(name_col) == row.get(name_col)) {
                    Some(known) if *known != row => return Err(incompatible(&name)),
                    Some(_) => {}
                    None => existing.data.push(row),
                }
            }
        }
        Some(_) => return Err(incompatible(&name)),
    }
    Ok(())
}

fn rename_groups(entry: &mut Entry, prefix: &impl Fn(&str) -> String) {
    let Some(col) = entry.labels.iter().position(|l| l == "name") else {
        return;
    };
    for row in &mut entry.data {
        if let Some(Value::String(name)) = row.get_mut(col) {
            *name = prefix(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::ComponentSummary;
    use crate::core::document::{Contribution, Group};
    use serde_json::json;

    fn member(name: &str, particles: usize, mass: f64) -> ComposedSimulation {
        let mut state = Table::new(&["id", "position"]);
        let mut structure = Table::new(&["id", "type"]);
        for i in 0..particles {
            state.push_row(vec![json!(i), json!([i as f64, 0.0, 0.0])]).unwrap();
            structure.push_row(vec![json!(i), json!("A")]).unwrap();
        }
        let mut types = Table::new(&["name", "mass", "radius", "charge"]);
        types.push_row(vec![json!("A"), json!(mass), json!(0.5), json!(0.0)]).unwrap();
        let mut bonds = Table::new(&["id_i", "id_j", "K", "r0"]);
        bonds.push_row(vec![json!(0), json!(1), json!(10.0), json!(1.0)]).unwrap();

        let document = EngineInput::merge(vec![
            Contribution::State(state),
            Contribution::Structure(structure),
            Contribution::entry(Section::Global, TYPES_ENTRY, Entry::new("Types", "Basic").with_table(types)),
            Contribution::entry(Section::Integrator, "bbk", Entry::new("Langevin", "BBK").with_parameter("timeStep", 0.01)),
            Contribution::entry(Section::System, "simulationName", Entry::new("Simulation", "Information").with_parameter("name", name)),
            Contribution::entry(Section::ForceField, "bonds", Entry::new("Bond2", "Harmonic").with_table(bonds)),
            Contribution::entry(
                Section::SimulationStep,
                "com",
                Entry::new("GeometricalMeasure", "CenterOfMassMeasure")
                    .with_parameter("outputFilePath", "com.dat")
                    .with_parameter("group", "com"),
            ),
            Contribution::entry(Section::SimulationStep, GROUPS_ENTRY, Entry::groups_list(&[Group { name: "com".into(), ids: vec![1] }])),
        ])
        .unwrap();

        ComposedSimulation {
            name: name.to_string(),
            number_of_particles: particles,
            number_of_models: 1,
            integration_steps: 10,
            summary: ComponentSummary::new(),
            document,
        }
    }

    #[test]
    fn members_share_the_set_document_without_id_collisions() {
        let a = member("a", 3, 1.0);
        let b = member("b", 2, 1.0);
        let set = merge_set("S_0", &[&a, &b]).unwrap();

        assert_eq!(set.number_of_particles(), 5);
        let ids: Vec<&Value> = set.state.column("id").unwrap().collect();
        assert_eq!(ids, vec![&json!(0), &json!(1), &json!(2), &json!(3), &json!(4)]);
        let batches: Vec<&Value> = set.topology.structure.column(BATCH_COLUMN).unwrap().collect();
        assert_eq!(batches, vec![&json!(0), &json!(0), &json!(0), &json!(1), &json!(1)]);

        assert_eq!(set.topology.force_field["b_bonds"].data[0][..2], [json!(3), json!(4)]);
        let com = &set.simulation_step["b_com"];
        assert_eq!(com.parameters["group"], json!("b_com"));
        assert_eq!(com.parameters["outputFilePath"], json!("b/com.dat"));
        assert_eq!(
            set.simulation_step[GROUPS_ENTRY].data,
            vec![
                vec![json!("a_com"), json!("Ids"), json!([1])],
                vec![json!("b_com"), json!("Ids"), json!([4])]
            ]
        );

        assert_eq!(set.system[INFORMATION_ENTRY].parameters["name"], json!("S_0"));
        assert!(!set.system.contains_key("a_simulationName"));
        assert_eq!(
            set.system[BATCHES_ENTRY].data[1],
            vec![json!(1), json!("b"), json!("b/input.json")]
        );
    }

    #[test]
    fn conflicting_type_definitions_make_a_member_incompatible() {
        let a = member("a", 1, 1.0);
        let b = member("b", 1, 2.0);
        let err = merge_set("S_0", &[&a, &b]).unwrap_err();
        assert!(matches!(
            err,
            MaterializationError::IncompatibleMember { ref simulation, section: Section::Global, .. } if simulation == "b"
        ));
    }

    #[test]
    fn existing_set_directories_fail_unless_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let sims = vec![member("a", 2, 1.0)];
        let plans = vec![SetPlan {
            name: "S_0".into(),
            members: vec![0],
        }];

        let manifest = Materializer::new(dir.path(), false)
            .materialize("S", &sims, &plans)
            .unwrap()
            .manifest;
        assert!(dir.path().join("S/S_0/input.json").is_file());
        assert!(dir.path().join("S/S_0/a/input.json").is_file());
        assert!(dir.path().join("S/S.manifest.json").is_file());
        assert_eq!(manifest.simulations[0].result_dir, dir.path().join("S/S_0/a"));
        assert_eq!(manifest.simulation_sets[0].engine_options, vec!["input.json"]);

        let err = Materializer::new(dir.path(), false).materialize("S", &sims, &plans).unwrap_err();
        assert!(matches!(err, MaterializationError::AlreadyExists(_)));

        std::fs::write(dir.path().join("S/S_0/stale.txt"), "x").unwrap();
        Materializer::new(dir.path(), true).materialize("S", &sims, &plans).unwrap();
        assert!(!dir.path().join("S/S_0/stale.txt").exists());
    }

    #[test]
    fn unmergeable_sets_are_rejected_without_touching_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let sims = vec![member("a", 1, 1.0), member("b", 1, 2.0), member("c", 2, 1.0)];
        let plans = vec![
            SetPlan { name: "S_0".into(), members: vec![0, 1] },
            SetPlan { name: "S_1".into(), members: vec![2] },
        ];

        let written = Materializer::new(dir.path(), false).materialize("S", &sims, &plans).unwrap();
        assert_eq!(written.rejected.len(), 1);
        assert_eq!(written.rejected[0].name, "S_0");
        assert_eq!(written.rejected[0].members, vec!["a", "b"]);
        assert!(matches!(written.rejected[0].error, MaterializationError::IncompatibleMember { .. }));

        assert!(!dir.path().join("S/S_0").exists());
        assert!(dir.path().join("S/S_1/c/input.json").is_file());
        let names: Vec<&str> = written.manifest.simulation_sets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["S_1"]);
        assert!(dir.path().join("S/S.manifest.json").is_file());
    }

    #[test]
    fn names_that_escape_the_session_directory_are_refused() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let sims = vec![member("../../escaped", 1, 1.0)];
        let plans = vec![SetPlan { name: "S_0".into(), members: vec![0] }];

        let err = Materializer::new(&out, false).materialize("S", &sims, &plans).unwrap_err();
        assert!(matches!(err, MaterializationError::InvalidName(ref n) if n == "../../escaped"));
        assert!(!root.path().join("escaped").exists());

        let err = Materializer::new(&out, false)
            .materialize("..", &[member("a", 1, 1.0)], &plans)
            .unwrap_err();
        assert!(matches!(err, MaterializationError::InvalidName(_)));
    }

    #[test]
    fn members_share_a_set_only_when_shared_entries_agree() {
        let a = member("a", 1, 1.0);
        let b = member("b", 1, 1.0);
        let heavy = member("heavy", 1, 2.0);
        assert!(can_share_set(&[&a], &b));
        assert!(!can_share_set(&[&a], &heavy));
        assert!(!can_share_set(&[&a, &b], &heavy));
        assert!(can_share_set(&[], &heavy));
    }
}
