use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{AssemblerMode, LibraryType, SampleAccession};
use crate::error::RavenError;

pub const DEFAULT_MEMORY_GB: u32 = 16;
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_DIAMOND_DB: &str = "databases/nr.dmnd";

/// Raw, unvalidated run parameters as they arrive from the parameter file or the CLI.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunParams {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub samples: Option<SampleList>,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub memory: Option<LooseValue>,
    #[serde(default)]
    pub threads: Option<LooseValue>,
    #[serde(default)]
    pub working_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub temp_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub final_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub home_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub diamond_db: Option<Utf8PathBuf>,
    #[serde(default)]
    pub db_fasta: Option<Utf8PathBuf>,
    #[serde(default)]
    pub taxonmap: Option<Utf8PathBuf>,
    #[serde(default)]
    pub assembler: Option<AssemblerMode>,
    #[serde(default)]
    pub tool_env: Option<Utf8PathBuf>,
    #[serde(default)]
    pub resume: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SampleList {
    Joined(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LooseValue {
    Number(u64),
    Text(String),
}

impl LooseValue {
    fn as_text(&self) -> String {
        match self {
            LooseValue::Number(value) => value.to_string(),
            LooseValue::Text(value) => value.clone(),
        }
    }
}

impl RunParams {
    /// Field-by-field overlay: values present in `overrides` win.
    pub fn merge(self, overrides: RunParams) -> RunParams {
        RunParams {
            project: overrides.project.or(self.project),
            samples: overrides.samples.or(self.samples),
            library: overrides.library.or(self.library),
            memory: overrides.memory.or(self.memory),
            threads: overrides.threads.or(self.threads),
            working_dir: overrides.working_dir.or(self.working_dir),
            temp_dir: overrides.temp_dir.or(self.temp_dir),
            final_dir: overrides.final_dir.or(self.final_dir),
            home_dir: overrides.home_dir.or(self.home_dir),
            diamond_db: overrides.diamond_db.or(self.diamond_db),
            db_fasta: overrides.db_fasta.or(self.db_fasta),
            taxonmap: overrides.taxonmap.or(self.taxonmap),
            assembler: overrides.assembler.or(self.assembler),
            tool_env: overrides.tool_env.or(self.tool_env),
            resume: overrides.resume.or(self.resume),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Utf8Path) -> Result<RunParams, RavenError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| RavenError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| RavenError::ConfigParse(err.to_string()))
    }
}

/// Immutable parameters of one run. Every derived path starts here.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    project_id: String,
    sample_accessions: Vec<SampleAccession>,
    run_label: String,
    library_type: LibraryType,
    memory_budget_gb: u32,
    thread_count: usize,
    working_dir: Utf8PathBuf,
    temp_dir: Utf8PathBuf,
    final_dir: Utf8PathBuf,
    home_dir: Utf8PathBuf,
    diamond_db_path: Utf8PathBuf,
    db_fasta: Option<Utf8PathBuf>,
    taxonmap: Option<Utf8PathBuf>,
    assembler: AssemblerMode,
    tool_env: Option<Utf8PathBuf>,
    resume: bool,
}

impl RunConfig {
    pub fn resolve(params: RunParams) -> Result<Self, RavenError> {
        let project_id = params
            .project
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(RavenError::MissingProject)?;
        if project_id.contains('/') {
            return Err(RavenError::InvalidParameter {
                name: "project",
                value: project_id,
            });
        }

        let sample_accessions = match params.samples {
            Some(SampleList::Joined(value)) => parse_accessions(&value)?,
            Some(SampleList::List(values)) => parse_accessions(&values.join(","))?,
            None => return Err(RavenError::MissingSamples),
        };
        for acc in sample_accessions.iter().filter(|acc| !acc.is_sra_run()) {
            warn!(sample = %acc, "accession does not look like an SRA run; download may fail");
        }

        let library_type = match params.library {
            Some(value) => value.parse()?,
            None => LibraryType::Unknown,
        };
        let memory_budget_gb = parse_memory_gb(params.memory.map(|v| v.as_text()).as_deref());
        let thread_count = match params.threads {
            Some(value) => parse_threads(&value.as_text())?,
            None => detect_threads(),
        };

        let run_label = run_label(&sample_accessions);
        let working_dir = absolute(
            params
                .working_dir
                .unwrap_or_else(|| Utf8PathBuf::from("raven-work").join(&project_id)),
        )?;
        let temp_dir = absolute(params.temp_dir.unwrap_or_else(|| {
            Utf8PathBuf::from("raven-tmp")
                .join(&project_id)
                .join(&run_label)
        }))?;
        let final_dir = absolute(
            params
                .final_dir
                .unwrap_or_else(|| Utf8PathBuf::from("raven-results").join(&project_id)),
        )?;
        let home_dir = absolute(params.home_dir.unwrap_or_else(|| Utf8PathBuf::from(".")))?;
        let diamond_db_path = absolute(
            params
                .diamond_db
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DIAMOND_DB)),
        )?;
        let db_fasta = params.db_fasta.map(absolute).transpose()?;
        let taxonmap = params.taxonmap.map(absolute).transpose()?;
        let tool_env = params.tool_env.map(absolute).transpose()?;

        Ok(Self {
            project_id,
            sample_accessions,
            run_label,
            library_type,
            memory_budget_gb,
            thread_count,
            working_dir,
            temp_dir,
            final_dir,
            home_dir,
            diamond_db_path,
            db_fasta,
            taxonmap,
            assembler: params.assembler.unwrap_or_default(),
            tool_env,
            resume: params.resume.unwrap_or(false),
        })
    }

    /// The single permitted change after construction: `Unknown` becomes `Paired` or `Single`.
    pub fn resolve_library_type(mut self, library: LibraryType) -> Result<Self, RavenError> {
        if self.library_type.is_resolved() {
            return Err(RavenError::LibraryAlreadyResolved(
                self.library_type.to_string(),
            ));
        }
        if !library.is_resolved() {
            return Err(RavenError::UnresolvedLayout(
                "determine_library_type".to_string(),
            ));
        }
        self.library_type = library;
        Ok(self)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn sample_accessions(&self) -> &[SampleAccession] {
        &self.sample_accessions
    }

    pub fn run_label(&self) -> &str {
        &self.run_label
    }

    pub fn library_type(&self) -> LibraryType {
        self.library_type
    }

    pub fn memory_budget_gb(&self) -> u32 {
        self.memory_budget_gb
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    pub fn temp_dir(&self) -> &Utf8Path {
        &self.temp_dir
    }

    pub fn final_dir(&self) -> &Utf8Path {
        &self.final_dir
    }

    pub fn home_dir(&self) -> &Utf8Path {
        &self.home_dir
    }

    pub fn diamond_db_path(&self) -> &Utf8Path {
        &self.diamond_db_path
    }

    pub fn db_fasta(&self) -> Option<&Utf8Path> {
        self.db_fasta.as_deref()
    }

    /// Protein accession to taxid map used when building the database from FASTA.
    pub fn taxonmap(&self) -> Option<&Utf8Path> {
        self.taxonmap.as_deref()
    }

    pub fn assembler(&self) -> AssemblerMode {
        self.assembler
    }

    pub fn tool_env(&self) -> Option<&Utf8Path> {
        self.tool_env.as_deref()
    }

    pub fn resume(&self) -> bool {
        self.resume
    }
}

/// Splits a comma-delimited accession list, keeping input order.
pub fn parse_accessions(raw: &str) -> Result<Vec<SampleAccession>, RavenError> {
    if raw.trim().is_empty() {
        return Err(RavenError::MissingSamples);
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in raw.split(',') {
        let acc: SampleAccession = token.parse()?;
        if !seen.insert(acc.clone()) {
            return Err(RavenError::DuplicateAccession(acc.to_string()));
        }
        out.push(acc);
    }
    Ok(out)
}

/// Largest sample count whose label spells out every accession.
pub const EXPANDED_LABEL_MAX: usize = 1;

/// Up to [`EXPANDED_LABEL_MAX`] accessions are joined with `_`; larger sets
/// are compressed to `first-last`, so `SRR1001,SRR10002` becomes `SRR1001-SRR10002`.
pub fn run_label(samples: &[SampleAccession]) -> String {
    match samples {
        [first, .., last] if samples.len() > EXPANDED_LABEL_MAX => format!("{first}-{last}"),
        _ => samples
            .iter()
            .map(SampleAccession::as_str)
            .collect::<Vec<_>>()
            .join("_"),
    }
}

/// Tools run in their own directories, so every configured path is anchored at the
/// current directory once, here.
fn absolute(path: Utf8PathBuf) -> Result<Utf8PathBuf, RavenError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let anchored =
        std::path::absolute(path.as_std_path()).map_err(|err| RavenError::fs(&path, err))?;
    Utf8PathBuf::from_path_buf(anchored).map_err(|raw| RavenError::InvalidParameter {
        name: "path",
        value: raw.display().to_string(),
    })
}

/// Non-digit characters are stripped, so `30GB` reads as 30.
pub fn parse_memory_gb(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_MEMORY_GB;
    };
    let digits: String = raw.chars().filter(|ch| ch.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(
                value = raw,
                default = DEFAULT_MEMORY_GB,
                "unusable memory budget, using default"
            );
            DEFAULT_MEMORY_GB
        }
    }
}

fn parse_threads(raw: &str) -> Result<usize, RavenError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(RavenError::InvalidParameter {
            name: "threads",
            value: raw.to_string(),
        }),
    }
}

pub fn detect_threads() -> usize {
    match std::thread::available_parallelism() {
        Ok(count) => count.get(),
        Err(err) => {
            warn!(error = %err, default = DEFAULT_THREADS, "cannot detect core count");
            DEFAULT_THREADS
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn params(project: &str, samples: &str) -> RunParams {
        RunParams {
            project: Some(project.to_string()),
            samples: Some(SampleList::Joined(samples.to_string())),
            threads: Some(LooseValue::Number(2)),
            ..RunParams::default()
        }
    }

    #[test]
    fn label_uses_first_and_last() {
        let samples = parse_accessions("SRR1001,SRR1500,SRR10002").unwrap();
        assert_eq!(run_label(&samples), "SRR1001-SRR10002");
        assert_eq!(run_label(&samples), run_label(&samples));
    }

    #[test]
    fn label_for_single_sample_is_the_accession() {
        let samples = parse_accessions("SRR1001").unwrap();
        assert_eq!(run_label(&samples), "SRR1001");
        let pair = parse_accessions("SRR1001,SRR10002").unwrap();
        assert!(pair.len() > EXPANDED_LABEL_MAX);
        assert_eq!(run_label(&pair), "SRR1001-SRR10002");
    }

    #[test]
    fn empty_tokens_are_rejected() {
        assert_matches!(
            parse_accessions("SRR1,,SRR2"),
            Err(RavenError::InvalidAccession(_))
        );
        assert_matches!(
            parse_accessions("SRR1,SRR2,SRR1"),
            Err(RavenError::DuplicateAccession(_))
        );
    }

    #[test]
    fn memory_strips_units() {
        assert_eq!(parse_memory_gb(Some("30GB")), 30);
        assert_eq!(parse_memory_gb(Some("GB")), DEFAULT_MEMORY_GB);
        assert_eq!(parse_memory_gb(Some("0")), DEFAULT_MEMORY_GB);
        assert_eq!(parse_memory_gb(None), DEFAULT_MEMORY_GB);
    }

    #[test]
    fn defaults_are_namespaced() {
        let config = RunConfig::resolve(params("trichomonas", "SRR1001,SRR10002")).unwrap();
        assert!(config.working_dir().is_absolute());
        assert!(config.working_dir().ends_with("raven-work/trichomonas"));
        assert!(config.temp_dir().ends_with("raven-tmp/trichomonas/SRR1001-SRR10002"));
        assert!(config.final_dir().ends_with("raven-results/trichomonas"));
        assert!(config.diamond_db_path().ends_with(DEFAULT_DIAMOND_DB));
        assert!(config.home_dir().is_absolute());
        assert_eq!(config.library_type(), LibraryType::Unknown);
        assert_eq!(config.thread_count(), 2);
    }

    #[test]
    fn missing_project_and_samples() {
        let mut raw = params("  ", "SRR1");
        assert_matches!(RunConfig::resolve(raw.clone()), Err(RavenError::MissingProject));
        raw.project = Some("p".to_string());
        raw.samples = None;
        assert_matches!(RunConfig::resolve(raw), Err(RavenError::MissingSamples));
    }

    #[test]
    fn bad_thread_count_is_a_config_error() {
        let mut raw = params("p", "SRR1");
        raw.threads = Some(LooseValue::Text("many".to_string()));
        assert_matches!(
            RunConfig::resolve(raw),
            Err(RavenError::InvalidParameter { name: "threads", .. })
        );
    }

    #[test]
    fn library_type_resolves_once() {
        let config = RunConfig::resolve(params("p", "SRR1")).unwrap();
        let config = config.resolve_library_type(LibraryType::Single).unwrap();
        assert_eq!(config.library_type(), LibraryType::Single);
        assert_matches!(
            config.resolve_library_type(LibraryType::Paired),
            Err(RavenError::LibraryAlreadyResolved(_))
        );
    }

    #[test]
    fn cli_values_override_file_values() {
        let file = RunParams {
            project: Some("from-file".to_string()),
            memory: Some(LooseValue::Number(64)),
            ..RunParams::default()
        };
        let cli = RunParams {
            project: Some("from-cli".to_string()),
            ..RunParams::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.project.as_deref(), Some("from-cli"));
        assert_matches!(merged.memory, Some(LooseValue::Number(64)));
    }
}
