//! Per-stage invocation builders. Each takes the run configuration and the
//! workspace layout and returns the external calls the stage needs.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::RunConfig;
use crate::descriptor::DatasetDescriptor;
use crate::domain::{AssemblerMode, LibraryType, SampleAccession, SampleFileSet};
use crate::error::RavenError;
use crate::runner::FailurePolicy;
use crate::tool::Invocation;
use crate::workspace::{ADAPTERS_PAIRED, ADAPTERS_SINGLE, WorkspaceLayout};

/// Column of the DIAMOND tabular output holding the subject taxon ids.
pub const DIAMOND_TAXID_COLUMN: usize = 13;
pub const DIAMOND_FIELDS: &[&str] = &[
    "qseqid", "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart",
    "send", "evalue", "bitscore", "staxids",
];
pub const VIRUS_LINEAGE_MARKER: &str = "Viruses";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Download,
    DetermineLibraryType,
    TrimAdapters,
    AssembleContigs,
    ClassifyTaxonomy,
    TranslateTaxonomy,
    MapReads,
    ExtractViralSequences,
    Finalize,
}

impl StageKind {
    pub const ALL: [StageKind; 9] = [
        StageKind::Download,
        StageKind::DetermineLibraryType,
        StageKind::TrimAdapters,
        StageKind::AssembleContigs,
        StageKind::ClassifyTaxonomy,
        StageKind::TranslateTaxonomy,
        StageKind::MapReads,
        StageKind::ExtractViralSequences,
        StageKind::Finalize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Download => "download",
            StageKind::DetermineLibraryType => "determine_library_type",
            StageKind::TrimAdapters => "trim_adapters",
            StageKind::AssembleContigs => "assemble_contigs",
            StageKind::ClassifyTaxonomy => "classify_taxonomy",
            StageKind::TranslateTaxonomy => "translate_taxonomy",
            StageKind::MapReads => "map_reads",
            StageKind::ExtractViralSequences => "extract_viral_sequences",
            StageKind::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageStep {
    pub name: String,
    pub invocation: Invocation,
    pub policy: FailurePolicy,
}

impl StageStep {
    fn abort(name: impl Into<String>, invocation: Invocation) -> Self {
        Self {
            name: name.into(),
            invocation,
            policy: FailurePolicy::Abort,
        }
    }
}

fn resolved_library(config: &RunConfig, stage: StageKind) -> Result<LibraryType, RavenError> {
    let library = config.library_type();
    if library.is_resolved() {
        Ok(library)
    } else {
        Err(RavenError::UnresolvedLayout(stage.name().to_string()))
    }
}

fn sample_files(
    dir: &Utf8Path,
    sample: &SampleAccession,
    library: LibraryType,
    trimmed: bool,
    stage: StageKind,
) -> Result<SampleFileSet, RavenError> {
    let set = if trimmed {
        SampleFileSet::trimmed(dir, sample, library)
    } else {
        SampleFileSet::raw(dir, sample, library)
    };
    set.ok_or_else(|| RavenError::UnresolvedLayout(stage.name().to_string()))
}

/// One `fasterq-dump` call per sample; the tool's "file exists" exit is tolerated.
pub fn download(config: &RunConfig, layout: &WorkspaceLayout) -> Vec<StageStep> {
    config
        .sample_accessions()
        .iter()
        .map(|sample| StageStep {
            name: format!("{} {sample}", StageKind::Download.name()),
            invocation: Invocation::new("fasterq-dump")
                .arg(sample)
                .arg("--split-3")
                .args(["--threads".to_string(), config.thread_count().to_string()])
                .args(["--outdir".to_string(), layout.raw_reads_dir().to_string()])
                .args(["--temp".to_string(), layout.temp_subdir("sra").to_string()])
                .current_dir(layout.raw_reads_dir()),
            policy: FailurePolicy::Tolerate,
        })
        .collect()
}

pub fn trim_adapters(
    config: &RunConfig,
    layout: &WorkspaceLayout,
) -> Result<Vec<StageStep>, RavenError> {
    let stage = StageKind::TrimAdapters;
    let library = resolved_library(config, stage)?;
    let raw_dir = layout.raw_reads_dir();
    let trimmed_dir = layout.trimmed_reads_dir();
    let unpaired_dir = layout.temp_subdir("unpaired");
    let threads = config.thread_count().to_string();

    config
        .sample_accessions()
        .iter()
        .map(|sample| {
            let raw = sample_files(&raw_dir, sample, library, false, stage)?;
            let trimmed = sample_files(&trimmed_dir, sample, library, true, stage)?;
            let invocation = match (&raw, &trimmed) {
                (
                    SampleFileSet::Paired { left, right },
                    SampleFileSet::Paired {
                        left: out_left,
                        right: out_right,
                    },
                ) => Invocation::new("trimmomatic")
                    .args(["PE", "-threads", threads.as_str()])
                    .args([left, right, out_left])
                    .arg(unpaired_dir.join(format!("{sample}_1.unpaired.fastq")))
                    .arg(out_right)
                    .arg(unpaired_dir.join(format!("{sample}_2.unpaired.fastq")))
                    .arg(illumina_clip(layout, ADAPTERS_PAIRED))
                    .args(TRIM_STEPS)
                    .current_dir(&trimmed_dir)
                    .output(out_left.clone())
                    .output(out_right.clone()),
                (SampleFileSet::Single { reads }, SampleFileSet::Single { reads: out }) => {
                    Invocation::new("trimmomatic")
                        .args(["SE", "-threads", threads.as_str()])
                        .args([reads, out])
                        .arg(illumina_clip(layout, ADAPTERS_SINGLE))
                        .args(TRIM_STEPS)
                        .current_dir(&trimmed_dir)
                        .output(out.clone())
                }
                _ => return Err(RavenError::UnresolvedLayout(stage.name().to_string())),
            };
            Ok(StageStep::abort(
                format!("{} {sample}", stage.name()),
                invocation,
            ))
        })
        .collect()
}

const TRIM_STEPS: [&str; 2] = ["SLIDINGWINDOW:4:20", "MINLEN:36"];

fn illumina_clip(layout: &WorkspaceLayout, adapters: &str) -> String {
    format!("ILLUMINACLIP:{}:2:30:10", layout.adapters_path(adapters))
}

#[derive(Debug, Clone)]
pub struct AssemblyPlan {
    pub descriptor: DatasetDescriptor,
    pub step: StageStep,
    pub assembler_output: Utf8PathBuf,
}

pub fn assemble_contigs(
    config: &RunConfig,
    layout: &WorkspaceLayout,
) -> Result<AssemblyPlan, RavenError> {
    let stage = StageKind::AssembleContigs;
    let library = resolved_library(config, stage)?;
    let mode = config.assembler();
    if mode == AssemblerMode::Meta && library == LibraryType::Single {
        return Err(RavenError::InvalidInvocation {
            stage: stage.name().to_string(),
            reason: "metaSPAdes requires paired-end reads".to_string(),
        });
    }
    let descriptor = DatasetDescriptor::from_samples(
        library,
        config.sample_accessions(),
        &layout.trimmed_reads_dir(),
    )
    .ok_or_else(|| RavenError::UnresolvedLayout(stage.name().to_string()))?;

    let out_dir = layout.temp_subdir("assembly");
    let invocation = Invocation::new(mode.program())
        .args(["--dataset".to_string(), layout.descriptor_path().to_string()])
        .args(["-t".to_string(), config.thread_count().to_string()])
        .args(["-m".to_string(), config.memory_budget_gb().to_string()])
        .args(["-o".to_string(), out_dir.to_string()])
        .current_dir(layout.data_contigs_dir())
        .output(layout.contigs_path());

    Ok(AssemblyPlan {
        descriptor,
        step: StageStep::abort(stage.name(), invocation),
        assembler_output: out_dir.join(mode.output_name()),
    })
}

#[derive(Debug, Clone)]
pub struct ClassifyPlan {
    pub makedb: Option<StageStep>,
    pub blastx: StageStep,
    pub built_database: Option<Utf8PathBuf>,
}

fn database_present(path: &Utf8Path) -> bool {
    path.as_std_path().is_file()
        || Utf8PathBuf::from(format!("{path}.dmnd")).as_std_path().is_file()
}

/// Uses the configured database, or builds one from `--db-fasta` when it is absent.
/// A built database carries taxonomy (`--taxonmap` plus the taxdump nodes and names),
/// otherwise the `staxids` column would stay empty.
pub fn classify_taxonomy(
    config: &RunConfig,
    layout: &WorkspaceLayout,
) -> Result<ClassifyPlan, RavenError> {
    let stage = StageKind::ClassifyTaxonomy;
    let threads = config.thread_count().to_string();

    let (database, makedb, built_database) = if database_present(config.diamond_db_path()) {
        (config.diamond_db_path().to_path_buf(), None, None)
    } else {
        let missing = || RavenError::MissingDatabase(config.diamond_db_path().to_path_buf());
        let fasta = config.db_fasta().ok_or_else(missing)?;
        let taxonmap = config.taxonmap().ok_or_else(missing)?;
        let taxdump = layout.taxdump_dir();
        let prefix = layout.databases_dir().join("nr");
        let built = Utf8PathBuf::from(format!("{prefix}.dmnd"));
        let step = StageStep::abort(
            format!("{} makedb", stage.name()),
            Invocation::new("diamond")
                .args(["makedb", "--in", fasta.as_str(), "-d", prefix.as_str()])
                .args(["--taxonmap", taxonmap.as_str()])
                .args(["--taxonnodes".to_string(), taxdump.join("nodes.dmp").to_string()])
                .args(["--taxonnames".to_string(), taxdump.join("names.dmp").to_string()])
                .args(["-p", threads.as_str()])
                .current_dir(layout.databases_dir())
                .output(built.clone()),
        );
        (prefix, Some(step), Some(built))
    };

    let block_size = (config.memory_budget_gb() / 6).max(1).to_string();
    let invocation = Invocation::new("diamond")
        .args(["blastx", "-d", database.as_str()])
        .args(["-q".to_string(), layout.contigs_path().to_string()])
        .args(["-o".to_string(), layout.diamond_path().to_string()])
        .args(["-p", threads.as_str(), "-b", block_size.as_str()])
        .args(["--tmpdir".to_string(), layout.temp_subdir("diamond").to_string()])
        .args(["--max-target-seqs", "1", "--outfmt", "6"])
        .args(DIAMOND_FIELDS)
        .current_dir(layout.temp_subdir("diamond"))
        .output(layout.diamond_path());

    Ok(ClassifyPlan {
        makedb,
        blastx: StageStep::abort(stage.name(), invocation),
        built_database,
    })
}

pub fn translate_taxonomy(
    config: &RunConfig,
    layout: &WorkspaceLayout,
) -> Result<StageStep, RavenError> {
    let diamond = layout.diamond_path();
    if !diamond.as_std_path().is_file() {
        return Err(RavenError::MissingClassification(diamond));
    }
    let invocation = Invocation::new("taxonkit")
        .args(["lineage", "-i"])
        .arg(DIAMOND_TAXID_COLUMN)
        .args(["--data-dir".to_string(), layout.taxdump_dir().to_string()])
        .args(["-j".to_string(), config.thread_count().to_string()])
        .args(["-o".to_string(), layout.taxonomy_path().to_string()])
        .arg(&diamond)
        .current_dir(layout.analysis_dir("taxonomy"))
        .output(layout.taxonomy_path());
    Ok(StageStep::abort(StageKind::TranslateTaxonomy.name(), invocation))
}

/// Index build followed by one alignment per sample against the run's contigs.
pub fn map_reads(
    config: &RunConfig,
    layout: &WorkspaceLayout,
) -> Result<Vec<StageStep>, RavenError> {
    let stage = StageKind::MapReads;
    let library = resolved_library(config, stage)?;
    let threads = config.thread_count().to_string();
    let index = layout.temp_subdir("mapping").join(layout.run_label());

    let mut steps = vec![StageStep::abort(
        format!("{} index", stage.name()),
        Invocation::new("bowtie2-build")
            .args(["--threads", threads.as_str()])
            .arg(layout.contigs_path())
            .arg(&index)
            .current_dir(layout.temp_subdir("mapping"))
            .output(Utf8PathBuf::from(format!("{index}.1.bt2"))),
    )];

    let trimmed_dir = layout.trimmed_reads_dir();
    for sample in config.sample_accessions() {
        let reads = sample_files(&trimmed_dir, sample, library, true, stage)?;
        let sam = layout.mapping_path(sample.as_str());
        let invocation = Invocation::new("bowtie2")
            .args(["-p", threads.as_str(), "-x", index.as_str()]);
        let invocation = match &reads {
            SampleFileSet::Paired { left, right } => invocation
                .args(["-1", left.as_str(), "-2", right.as_str()]),
            SampleFileSet::Single { reads } => invocation.args(["-U", reads.as_str()]),
        };
        steps.push(StageStep::abort(
            format!("{} {sample}", stage.name()),
            invocation
                .args(["-S", sam.as_str()])
                .current_dir(layout.analysis_dir("mapping"))
                .output(sam.clone()),
        ));
    }
    Ok(steps)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViralHits {
    pub rows: usize,
    pub contigs: usize,
}

/// Keeps taxonomy rows whose lineage mentions `Viruses` and lists their contig ids.
pub fn select_viral_hits(
    taxonomy: &Utf8Path,
    rows_out: &Utf8Path,
    ids_out: &Utf8Path,
) -> Result<ViralHits, RavenError> {
    let input = fs::File::open(taxonomy.as_std_path())
        .map_err(|_| RavenError::MissingClassification(taxonomy.to_path_buf()))?;
    let create = |path: &Utf8Path| {
        fs::File::create(path.as_std_path())
            .map(BufWriter::new)
            .map_err(|err| RavenError::fs(path, err))
    };
    let mut rows = create(rows_out)?;
    let mut ids = create(ids_out)?;

    let mut seen = HashSet::new();
    let mut hits = ViralHits { rows: 0, contigs: 0 };
    for line in BufReader::new(input).lines() {
        let line = line.map_err(|err| RavenError::fs(taxonomy, err))?;
        let lineage = line.rsplit('\t').next().unwrap_or_default();
        if !lineage.split(';').any(|rank| rank.trim() == VIRUS_LINEAGE_MARKER) {
            continue;
        }
        writeln!(rows, "{line}").map_err(|err| RavenError::fs(rows_out, err))?;
        hits.rows += 1;
        let contig = line.split('\t').next().unwrap_or_default();
        if !contig.is_empty() && seen.insert(contig.to_string()) {
            writeln!(ids, "{contig}").map_err(|err| RavenError::fs(ids_out, err))?;
            hits.contigs += 1;
        }
    }
    rows.flush().map_err(|err| RavenError::fs(rows_out, err))?;
    ids.flush().map_err(|err| RavenError::fs(ids_out, err))?;
    Ok(hits)
}

pub fn extract_viral_sequences(layout: &WorkspaceLayout) -> StageStep {
    let invocation = Invocation::new("seqtk")
        .arg("subseq")
        .arg(layout.contigs_path())
        .arg(layout.viruses_ids_path())
        .stdout_to(layout.viruses_fasta_path())
        .current_dir(layout.analysis_dir("viruses"))
        .output(layout.viruses_fasta_path());
    StageStep::abort(StageKind::ExtractViralSequences.name(), invocation)
}
