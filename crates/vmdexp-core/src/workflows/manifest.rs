use crate::core::component::ComponentSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Arguments passed to the engine for every set.
pub const ENGINE_INPUT_FILE: &str = "input.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to access manifest '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

type SimulationRow = (String, String, PathBuf, ComponentSummary);
type SetRow = (String, PathBuf, Vec<String>, ComponentSummary);

/// One composed simulation and where its results go.
///
/// Serialized as `[simName, setName, resultDir, componentsSummary]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SimulationRow", into = "SimulationRow")]
pub struct SimulationRecord {
    pub name: String,
    pub set: String,
    pub result_dir: PathBuf,
    pub summary: ComponentSummary,
}

impl From<SimulationRow> for SimulationRecord {
    fn from((name, set, result_dir, summary): SimulationRow) -> Self {
        Self {
            name,
            set,
            result_dir,
            summary,
        }
    }
}

impl From<SimulationRecord> for SimulationRow {
    fn from(r: SimulationRecord) -> Self {
        (r.name, r.set, r.result_dir, r.summary)
    }
}

/// One materialized set, the unit of work handed to a launcher.
///
/// Serialized as `[setName, setDir, engineOptions, componentsSummary]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SetRow", into = "SetRow")]
pub struct SetRecord {
    pub name: String,
    pub directory: PathBuf,
    pub engine_options: Vec<String>,
    pub summary: ComponentSummary,
}

impl From<SetRow> for SetRecord {
    fn from((name, directory, engine_options, summary): SetRow) -> Self {
        Self {
            name,
            directory,
            engine_options,
            summary,
        }
    }
}

impl From<SetRecord> for SetRow {
    fn from(r: SetRecord) -> Self {
        (r.name, r.directory, r.engine_options, r.summary)
    }
}

/// The handoff document between composition and launching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub name: String,
    pub simulations: Vec<SimulationRecord>,
    #[serde(rename = "simulationSets")]
    pub simulation_sets: Vec<SetRecord>,
}

impl SessionManifest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            simulations: Vec::new(),
            simulation_sets: Vec::new(),
        }
    }

    /// `<root>/<session>/<session>.manifest.json`
    pub fn path_for(root: &Path, session: &str) -> PathBuf {
        root.join(session).join(format!("{}.manifest.json", session))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the manifest under `root` and returns its path.
    pub fn write(&self, root: &Path) -> Result<PathBuf, ManifestError> {
        let path = Self::path_for(root, &self.name);
        let json = serde_json::to_string_pretty(self).map_err(|source| ManifestError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn set(&self, name: &str) -> Option<&SetRecord> {
        self.simulation_sets.iter().find(|s| s.name == name)
    }

    /// The simulations recorded for one set, in manifest order.
    pub fn members_of<'a>(&'a self, set: &'a str) -> impl Iterator<Item = &'a SimulationRecord> + 'a {
        self.simulations.iter().filter(move |s| s.set == set)
    }
}

/// Union of member summaries; identical entries appear once.
pub fn merge_summaries<'a>(summaries: impl IntoIterator<Item = &'a ComponentSummary>) -> ComponentSummary {
    let mut merged = ComponentSummary::new();
    for summary in summaries {
        for (category, entries) in summary {
            let target = merged.entry(category.clone()).or_default();
            for entry in entries {
                if !target.contains(entry) {
                    target.push(entry.clone());
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::SummaryEntry;
    use serde_json::{Map, json};

    fn summary(type_name: &str) -> ComponentSummary {
        ComponentSummary::from([(
            "units".to_string(),
            vec![SummaryEntry {
                name: type_name.into(),
                type_name: type_name.into(),
                parameters: Map::new(),
            }],
        )])
    }

    #[test]
    fn records_serialize_as_positional_arrays() {
        let mut manifest = SessionManifest::new("S");
        manifest.simulations.push(SimulationRecord {
            name: "a".into(),
            set: "S_0".into(),
            result_dir: PathBuf::from("S/S_0/a"),
            summary: summary("none"),
        });
        manifest.simulation_sets.push(SetRecord {
            name: "S_0".into(),
            directory: PathBuf::from("S/S_0"),
            engine_options: vec![ENGINE_INPUT_FILE.into()],
            summary: summary("none"),
        });

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["simulations"][0][0], json!("a"));
        assert_eq!(value["simulations"][0][2], json!("S/S_0/a"));
        assert_eq!(value["simulationSets"][0][2], json!(["input.json"]));
        assert_eq!(value["simulationSets"][0][3]["units"][0]["type"], json!("none"));

        let back: SessionManifest = serde_json::from_value(value).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn write_then_load_uses_the_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("S")).unwrap();
        let manifest = SessionManifest::new("S");
        let path = manifest.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("S").join("S.manifest.json"));
        assert_eq!(SessionManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn merged_summaries_drop_repeated_entries() {
        let merged = merge_summaries([&summary("none"), &summary("none"), &summary("KcalMol_A")]);
        assert_eq!(merged["units"].len(), 2);
    }

    #[test]
    fn loading_garbage_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(SessionManifest::load(&path), Err(ManifestError::Json { .. })));
    }
}
