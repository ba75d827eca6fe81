use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RavenError {
    #[error("missing project id (-p PROJECT)")]
    #[diagnostic(help("usage: raven run -p PROJECT -s ACC1,ACC2,..."))]
    MissingProject,

    #[error("missing sample accessions (-s ACC1,ACC2,...)")]
    #[diagnostic(help("usage: raven run -p PROJECT -s ACC1,ACC2,..."))]
    MissingSamples,

    #[error("invalid sample accession: {0:?}")]
    InvalidAccession(String),

    #[error("sample accession listed twice: {0}")]
    DuplicateAccession(String),

    #[error("invalid library type: {0} (expected paired or single)")]
    InvalidLibraryType(String),

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("failed to read parameter file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse parameter file: {0}")]
    ConfigParse(String),

    #[error("reference database not found at {0}")]
    #[diagnostic(help("pass -d with an existing DIAMOND database or --db-fasta to build one"))]
    MissingDatabase(Utf8PathBuf),

    #[error("required helper resource not found: {0}")]
    #[diagnostic(help("install the resource under <home_dir>/resources or pass -h"))]
    MissingHelper(Utf8PathBuf),

    #[error("required tool not found on PATH: {0}")]
    MissingTool(String),

    #[error("classification result not found: {0}")]
    #[diagnostic(help("the classify_taxonomy stage must complete before taxonomy translation"))]
    MissingClassification(Utf8PathBuf),

    #[error("cannot determine library type for sample {sample}: {found}")]
    AmbiguousLibrary { sample: String, found: String },

    #[error("mixed library types: {paired} paired and {single} single-end samples")]
    MixedLibrary { paired: usize, single: usize },

    #[error("library layout is unresolved for stage {0}")]
    UnresolvedLayout(String),

    #[error("invalid invocation for stage {stage}: {reason}")]
    InvalidInvocation { stage: String, reason: String },

    #[error("failed to activate tool environment at {0}")]
    EnvironmentActivation(Utf8PathBuf),

    #[error("library type already resolved as {0}")]
    LibraryAlreadyResolved(String),

    #[error("path exists and is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write timelog {path}: {message}")]
    Timelog { path: Utf8PathBuf, message: String },

    #[error("stage {stage} failed with exit status {status}")]
    #[diagnostic(help("completed stage outputs were kept; fix the cause and re-run with --resume"))]
    StageFailed { stage: String, status: i32 },
}

impl RavenError {
    pub fn exit_code(&self) -> u8 {
        match self {
            RavenError::MissingProject
            | RavenError::MissingSamples
            | RavenError::InvalidAccession(_)
            | RavenError::DuplicateAccession(_)
            | RavenError::InvalidLibraryType(_)
            | RavenError::InvalidParameter { .. }
            | RavenError::ConfigRead(_)
            | RavenError::ConfigParse(_) => 1,
            RavenError::AmbiguousLibrary { .. } => 2,
            RavenError::MixedLibrary { .. } => 3,
            RavenError::MissingDatabase(_) => 4,
            RavenError::MissingHelper(_) => 5,
            RavenError::MissingTool(_) => 6,
            RavenError::MissingClassification(_) => 7,
            RavenError::UnresolvedLayout(_) | RavenError::LibraryAlreadyResolved(_) => 8,
            RavenError::InvalidInvocation { .. } => 9,
            RavenError::EnvironmentActivation(_) => 10,
            RavenError::StageFailed { .. } => 11,
            RavenError::NotADirectory(_)
            | RavenError::Filesystem(_)
            | RavenError::Timelog { .. } => 1,
        }
    }

    pub(crate) fn fs(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        RavenError::Filesystem(format!("{context}: {err}"))
    }
}
