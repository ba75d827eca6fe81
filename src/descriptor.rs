//! Dataset descriptor consumed by the SPAdes assemblers (`--dataset`).
//!
//! SPAdes reads the descriptor as YAML; the JSON flow style written here is a
//! valid YAML document, so no hand-formatted text is involved.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{LibraryType, SampleAccession, SampleFileSet};
use crate::error::RavenError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetDescriptor {
    Paired {
        left: Vec<Utf8PathBuf>,
        right: Vec<Utf8PathBuf>,
    },
    Single {
        reads: Vec<Utf8PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum LibraryEntry<'a> {
    Paired {
        orientation: &'static str,
        #[serde(rename = "type")]
        kind: &'static str,
        #[serde(rename = "left reads")]
        left: &'a [Utf8PathBuf],
        #[serde(rename = "right reads")]
        right: &'a [Utf8PathBuf],
    },
    Single {
        #[serde(rename = "type")]
        kind: &'static str,
        #[serde(rename = "single reads")]
        reads: &'a [Utf8PathBuf],
    },
}

impl DatasetDescriptor {
    /// Collects per-sample read files, in sample order, for a resolved layout.
    pub fn from_samples(
        library: LibraryType,
        samples: &[SampleAccession],
        reads_dir: &Utf8Path,
    ) -> Option<Self> {
        let sets = samples
            .iter()
            .map(|sample| SampleFileSet::trimmed(reads_dir, sample, library))
            .collect::<Option<Vec<_>>>()?;
        let descriptor = match library {
            LibraryType::Paired => {
                let (left, right) = sets
                    .into_iter()
                    .filter_map(|set| match set {
                        SampleFileSet::Paired { left, right } => Some((left, right)),
                        SampleFileSet::Single { .. } => None,
                    })
                    .unzip();
                DatasetDescriptor::Paired { left, right }
            }
            LibraryType::Single => DatasetDescriptor::Single {
                reads: sets
                    .into_iter()
                    .filter_map(|set| match set {
                        SampleFileSet::Single { reads } => Some(reads),
                        SampleFileSet::Paired { .. } => None,
                    })
                    .collect(),
            },
            LibraryType::Unknown => return None,
        };
        Some(descriptor)
    }

    pub fn to_yaml(&self) -> Result<String, RavenError> {
        let entry = match self {
            DatasetDescriptor::Paired { left, right } => LibraryEntry::Paired {
                orientation: "fr",
                kind: "paired-end",
                left,
                right,
            },
            DatasetDescriptor::Single { reads } => LibraryEntry::Single {
                kind: "single",
                reads,
            },
        };
        let mut text = serde_json::to_string_pretty(&[entry])
            .map_err(|err| RavenError::Filesystem(format!("dataset descriptor: {err}")))?;
        text.push('\n');
        Ok(text)
    }

    /// Writes through a temp file in the same directory, then renames into place.
    pub fn write(&self, path: &Utf8Path) -> Result<(), RavenError> {
        let text = self.to_yaml()?;
        let parent = path
            .parent()
            .ok_or_else(|| RavenError::Filesystem(format!("invalid descriptor path {path}")))?;
        let mut temp = tempfile::Builder::new()
            .prefix("raven-descriptor")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RavenError::fs(parent, err))?;
        temp.write_all(text.as_bytes())
            .map_err(|err| RavenError::fs(path, err))?;
        temp.persist(path.as_std_path())
            .map_err(|err| RavenError::fs(path, err.error))?;
        Ok(())
    }
}
