//! Project files
//!
//! A project is a list of named signal tracks plus an optional sample
//! count, stored as TOML or JSON:
//!
//! ```toml
//! samples_count = 4
//!
//! [[tracks]]
//! id = "6f1c1b8e-1f5e-4b7c-9a55-1f2e3d4c5b6a"
//! name = "A"
//! color = "#3fa7d6"
//! signal = { kind = "meander", values = [0.0, 0.5, 1.0, -1.0] }
//! ```

use crate::adapter::SignalSnapshot;
use crate::error::{EvaluatorError, EvaluatorResult};
use crate::signal_data::{Signal, SignalData, SignalId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One authored signal with its display metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalTrack {
    pub id: SignalId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub signal: SignalData,
}

impl SignalTrack {
    pub fn new(name: impl Into<String>, signal: SignalData) -> Self {
        Self {
            id: SignalId::new_v4(),
            name: name.into(),
            color: None,
            signal,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_count: Option<usize>,
    #[serde(default)]
    pub tracks: Vec<SignalTrack>,
}

impl Project {
    pub fn load(path: &Path) -> EvaluatorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse TOML, falling back to JSON
    pub fn parse(content: &str) -> EvaluatorResult<Self> {
        let toml_error = match toml::from_str(content) {
            Ok(project) => return Ok(project),
            Err(e) => e,
        };

        serde_json::from_str(content).map_err(|json_error| {
            EvaluatorError::Project(format!(
                "neither TOML ({}) nor JSON ({})",
                toml_error.message(),
                json_error
            ))
        })
    }

    pub fn to_json(&self) -> EvaluatorResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EvaluatorError::Project(e.to_string()))
    }

    /// Find a track by id or, failing that, by name
    pub fn track(&self, key: &str) -> Option<&SignalTrack> {
        if let Ok(id) = key.parse::<SignalId>() {
            if let Some(track) = self.tracks.iter().find(|t| t.id == id) {
                return Some(track);
            }
        }
        self.tracks.iter().find(|t| t.name == key)
    }

    /// Snapshot of every track, using `default_samples_count` when the
    /// project does not set one
    pub fn snapshot(&self, default_samples_count: usize) -> SignalSnapshot {
        SignalSnapshot::new(
            self.samples_count.unwrap_or(default_samples_count),
            self.tracks
                .iter()
                .map(|track| Signal::new(track.id, track.signal.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML_PROJECT: &str = r#"
samples_count = 4

[[tracks]]
id = "00000000-0000-4000-8000-000000000001"
name = "A"
color = "red"
signal = { kind = "meander", values = [0.0, 0.5, 1.0, -1.0] }

[[tracks]]
id = "00000000-0000-4000-8000-000000000002"
name = "B"
signal = { kind = "meander", values = [1.0, 1.0, 1.0, 1.0] }

[[tracks]]
id = "00000000-0000-4000-8000-000000000003"
name = "A - B"
signal = { kind = "difference", minuend = "00000000-0000-4000-8000-000000000001", subtrahend = "00000000-0000-4000-8000-000000000002" }
"#;

    #[test]
    fn test_parse_toml() {
        let project = Project::parse(TOML_PROJECT).unwrap();
        assert_eq!(project.samples_count, Some(4));
        assert_eq!(project.tracks.len(), 3);
        assert_eq!(project.tracks[0].color.as_deref(), Some("red"));
        assert_eq!(project.tracks[2].signal.dependencies().len(), 2);
    }

    #[test]
    fn test_json_fallback() {
        let project = Project::parse(TOML_PROJECT).unwrap();
        let json = project.to_json().unwrap();
        assert!(json.trim_start().starts_with('{'));
        assert_eq!(Project::parse(&json).unwrap(), project);
    }

    #[test]
    fn test_garbage_is_a_project_error() {
        assert!(matches!(
            Project::parse("tracks = [ not valid"),
            Err(EvaluatorError::Project(_))
        ));
    }

    #[test]
    fn test_track_lookup_by_id_or_name() {
        let project = Project::parse(TOML_PROJECT).unwrap();
        let b = project.track("B").unwrap();
        assert_eq!(project.track(&b.id.to_string()), Some(b));
        assert!(project.track("C").is_none());
    }

    #[test]
    fn test_snapshot_uses_default_samples_count() {
        let mut project = Project::parse(TOML_PROJECT).unwrap();
        assert_eq!(project.snapshot(2048).samples_count(), 4);

        project.samples_count = None;
        let snapshot = project.snapshot(2048);
        assert_eq!(snapshot.samples_count(), 2048);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.signals()[0].id, project.tracks[0].id);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOML_PROJECT.as_bytes()).unwrap();

        let project = Project::load(file.path()).unwrap();
        assert_eq!(project.tracks[1].name, "B");
    }
}
