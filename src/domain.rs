use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RavenError;

static SRA_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[SED]RR\d+$").expect("static regex"));

/// A sequencing run accession, e.g. `SRR1001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleAccession(String);

impl SampleAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for SRA/ENA/DDBJ run accessions that the downloader understands.
    pub fn is_sra_run(&self) -> bool {
        SRA_RUN.is_match(&self.0)
    }
}

impl fmt::Display for SampleAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleAccession {
    type Err = RavenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(RavenError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Sequencing layout of a whole run. `Unknown` is resolved once after download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Paired,
    Single,
    Unknown,
}

impl LibraryType {
    pub fn is_resolved(self) -> bool {
        !matches!(self, LibraryType::Unknown)
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryType::Paired => write!(f, "paired"),
            LibraryType::Single => write!(f, "single"),
            LibraryType::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for LibraryType {
    type Err = RavenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paired" | "pe" => Ok(LibraryType::Paired),
            "single" | "se" => Ok(LibraryType::Single),
            _ => Err(RavenError::InvalidLibraryType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AssemblerMode {
    #[default]
    Rna,
    Meta,
}

impl AssemblerMode {
    pub fn program(self) -> &'static str {
        match self {
            AssemblerMode::Rna => "rnaspades.py",
            AssemblerMode::Meta => "metaspades.py",
        }
    }

    /// Name of the assembler's primary sequence output inside its output directory.
    pub fn output_name(self) -> &'static str {
        match self {
            AssemblerMode::Rna => "transcripts.fasta",
            AssemblerMode::Meta => "contigs.fasta",
        }
    }
}

impl fmt::Display for AssemblerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblerMode::Rna => write!(f, "rna"),
            AssemblerMode::Meta => write!(f, "meta"),
        }
    }
}

/// Read files of one sample for a resolved layout. Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleFileSet {
    Paired {
        left: Utf8PathBuf,
        right: Utf8PathBuf,
    },
    Single {
        reads: Utf8PathBuf,
    },
}

impl SampleFileSet {
    pub fn raw(dir: &Utf8Path, sample: &SampleAccession, library: LibraryType) -> Option<Self> {
        Self::with_suffix(dir, sample, library, "fastq")
    }

    pub fn trimmed(
        dir: &Utf8Path,
        sample: &SampleAccession,
        library: LibraryType,
    ) -> Option<Self> {
        Self::with_suffix(dir, sample, library, "trimmed.fastq")
    }

    fn with_suffix(
        dir: &Utf8Path,
        sample: &SampleAccession,
        library: LibraryType,
        suffix: &str,
    ) -> Option<Self> {
        match library {
            LibraryType::Paired => Some(SampleFileSet::Paired {
                left: dir.join(format!("{sample}_1.{suffix}")),
                right: dir.join(format!("{sample}_2.{suffix}")),
            }),
            LibraryType::Single => Some(SampleFileSet::Single {
                reads: dir.join(format!("{sample}.{suffix}")),
            }),
            LibraryType::Unknown => None,
        }
    }

    pub fn paths(&self) -> Vec<&Utf8Path> {
        match self {
            SampleFileSet::Paired { left, right } => vec![left.as_path(), right.as_path()],
            SampleFileSet::Single { reads } => vec![reads.as_path()],
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_accession_trims_whitespace() {
        let acc: SampleAccession = " SRR1001 ".parse().unwrap();
        assert_eq!(acc.as_str(), "SRR1001");
        assert!(acc.is_sra_run());
    }

    #[test]
    fn parse_accession_rejects_separators() {
        let err = "SRR1/../x".parse::<SampleAccession>().unwrap_err();
        assert_matches!(err, RavenError::InvalidAccession(_));
        let err = "".parse::<SampleAccession>().unwrap_err();
        assert_matches!(err, RavenError::InvalidAccession(_));
    }

    #[test]
    fn local_ids_are_not_sra_runs() {
        let acc: SampleAccession = "liver_rep1".parse().unwrap();
        assert!(!acc.is_sra_run());
    }

    #[test]
    fn library_type_flag_values() {
        assert_eq!("paired".parse::<LibraryType>().unwrap(), LibraryType::Paired);
        assert_eq!("SINGLE".parse::<LibraryType>().unwrap(), LibraryType::Single);
        assert_matches!(
            "interleaved".parse::<LibraryType>(),
            Err(RavenError::InvalidLibraryType(_))
        );
    }

    #[test]
    fn file_sets_follow_layout() {
        let acc: SampleAccession = "SRR1001".parse().unwrap();
        let dir = Utf8Path::new("data/raw-sra");
        let paired = SampleFileSet::raw(dir, &acc, LibraryType::Paired).unwrap();
        assert_eq!(
            paired.paths(),
            vec![
                Utf8Path::new("data/raw-sra/SRR1001_1.fastq"),
                Utf8Path::new("data/raw-sra/SRR1001_2.fastq")
            ]
        );
        let single = SampleFileSet::trimmed(dir, &acc, LibraryType::Single).unwrap();
        assert_eq!(
            single.paths(),
            vec![Utf8Path::new("data/raw-sra/SRR1001.trimmed.fastq")]
        );
        assert!(SampleFileSet::raw(dir, &acc, LibraryType::Unknown).is_none());
    }
}
