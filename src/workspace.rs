use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::RavenError;

pub const ADAPTERS_PAIRED: &str = "adapters/TruSeq3-PE-2.fa";
pub const ADAPTERS_SINGLE: &str = "adapters/TruSeq3-SE.fa";
pub const TAXDUMP_FILES: &[&str] = &["taxdump/names.dmp", "taxdump/nodes.dmp"];

/// On-disk tree of one run. Every path is namespaced by the run label.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    run_label: String,
    working_dir: Utf8PathBuf,
    temp_dir: Utf8PathBuf,
    final_dir: Utf8PathBuf,
    resources_dir: Utf8PathBuf,
    scripts_source_dir: Utf8PathBuf,
}

impl WorkspaceLayout {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            run_label: config.run_label().to_string(),
            working_dir: config.working_dir().to_path_buf(),
            temp_dir: config.temp_dir().to_path_buf(),
            final_dir: config.final_dir().to_path_buf(),
            resources_dir: config.home_dir().join("resources"),
            scripts_source_dir: config.home_dir().join("scripts"),
        }
    }

    pub fn run_label(&self) -> &str {
        &self.run_label
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

    pub fn raw_reads_dir(&self) -> Utf8PathBuf {
        self.working_dir.join("data").join("raw-sra")
    }

    pub fn trimmed_reads_dir(&self) -> Utf8PathBuf {
        self.working_dir.join("data").join("fastq-adapter-trimmed")
    }

    pub fn data_contigs_dir(&self) -> Utf8PathBuf {
        self.working_dir.join("data").join("contigs")
    }

    pub fn analysis_dir(&self, name: &str) -> Utf8PathBuf {
        self.working_dir.join("analysis").join(name)
    }

    pub fn scripts_dir(&self) -> Utf8PathBuf {
        self.working_dir.join("scripts")
    }

    pub fn databases_dir(&self) -> Utf8PathBuf {
        self.working_dir.join("databases")
    }

    pub fn temp_subdir(&self, name: &str) -> Utf8PathBuf {
        self.temp_dir.join(name)
    }

    pub fn timelog_path(&self) -> Utf8PathBuf {
        self.analysis_dir("timelogs")
            .join(format!("{}.log", self.run_label))
    }

    pub fn descriptor_path(&self) -> Utf8PathBuf {
        self.data_contigs_dir()
            .join(format!("{}.input.yaml", self.run_label))
    }

    pub fn data_contigs_path(&self) -> Utf8PathBuf {
        self.data_contigs_dir()
            .join(format!("{}.contigs.fasta", self.run_label))
    }

    pub fn contigs_path(&self) -> Utf8PathBuf {
        self.analysis_dir("contigs")
            .join(format!("{}.contigs.fasta", self.run_label))
    }

    pub fn diamond_path(&self) -> Utf8PathBuf {
        self.analysis_dir("diamond")
            .join(format!("{}.nr.diamond.txt", self.run_label))
    }

    pub fn taxonomy_path(&self) -> Utf8PathBuf {
        self.analysis_dir("taxonomy")
            .join(format!("{}.nr.diamond.taxonomy.txt", self.run_label))
    }

    pub fn viruses_fasta_path(&self) -> Utf8PathBuf {
        self.analysis_dir("viruses")
            .join(format!("{}.viruses.fasta", self.run_label))
    }

    pub fn viruses_taxonomy_path(&self) -> Utf8PathBuf {
        self.analysis_dir("viruses")
            .join(format!("{}.viruses.taxonomy.txt", self.run_label))
    }

    pub fn viruses_ids_path(&self) -> Utf8PathBuf {
        self.analysis_dir("viruses")
            .join(format!("{}.viruses.ids.txt", self.run_label))
    }

    pub fn mapping_path(&self, sample: &str) -> Utf8PathBuf {
        self.analysis_dir("mapping")
            .join(format!("{}.{sample}.sam", self.run_label))
    }

    /// Workspace copy of the adapter file the trimmer reads.
    pub fn adapters_path(&self, relative: &str) -> Utf8PathBuf {
        self.scripts_dir().join(relative)
    }

    pub fn taxdump_dir(&self) -> Utf8PathBuf {
        self.resources_dir.join("taxdump")
    }

    pub fn resources_dir(&self) -> &Utf8Path {
        &self.resources_dir
    }

    fn required_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs = vec![
            self.raw_reads_dir(),
            self.trimmed_reads_dir(),
            self.data_contigs_dir(),
        ];
        for name in [
            "timelogs", "contigs", "diamond", "taxonomy", "viruses", "mapping",
        ] {
            dirs.push(self.analysis_dir(name));
        }
        dirs.push(self.scripts_dir());
        dirs.push(self.temp_dir.clone());
        for name in ["sra", "unpaired", "diamond", "mapping"] {
            dirs.push(self.temp_subdir(name));
        }
        dirs
    }
}

#[derive(Debug, Clone, Default)]
pub struct HelperSummary {
    pub copied: Vec<Utf8PathBuf>,
    pub verified: Vec<Utf8PathBuf>,
}

pub struct WorkspaceManager;

impl WorkspaceManager {
    /// Creates every directory of the layout. Existing directories are left untouched.
    pub fn ensure_layout(layout: &WorkspaceLayout) -> Result<(), RavenError> {
        for dir in layout.required_dirs() {
            ensure_dir(&dir)?;
        }
        debug!(working_dir = %layout.working_dir(), "workspace layout ready");
        Ok(())
    }

    /// Verifies mandatory resources and copies adapters and helper scripts into `scripts/`.
    pub fn install_helpers(layout: &WorkspaceLayout) -> Result<HelperSummary, RavenError> {
        let resources = layout.resources_dir();
        let missing = [ADAPTERS_PAIRED, ADAPTERS_SINGLE]
            .into_iter()
            .chain(TAXDUMP_FILES.iter().copied())
            .map(|relative| resources.join(relative))
            .find(|path| !path.as_std_path().is_file());
        if let Some(path) = missing {
            return Err(RavenError::MissingHelper(path));
        }

        let mut summary = HelperSummary::default();
        for relative in [ADAPTERS_PAIRED, ADAPTERS_SINGLE] {
            let target = layout.adapters_path(relative);
            copy_if_changed(&resources.join(relative), &target)?;
            summary.copied.push(target);
        }
        for relative in TAXDUMP_FILES {
            summary.verified.push(resources.join(relative));
        }

        let scripts = &layout.scripts_source_dir;
        if scripts.as_std_path().is_dir() {
            let entries = fs::read_dir(scripts.as_std_path())
                .map_err(|err| RavenError::fs(scripts, err))?;
            for entry in entries {
                let entry = entry.map_err(|err| RavenError::fs(scripts, err))?;
                let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                    continue;
                };
                if !path.as_std_path().is_file() {
                    continue;
                }
                let Some(name) = path.file_name() else {
                    continue;
                };
                let target = layout.scripts_dir().join(name);
                copy_if_changed(&path, &target)?;
                summary.copied.push(target);
            }
        }
        info!(
            copied = summary.copied.len(),
            verified = summary.verified.len(),
            "helper resources installed"
        );
        Ok(summary)
    }
}

/// `mkdir -p` that refuses to treat a regular file as a directory.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), RavenError> {
    let std_path = path.as_std_path();
    if std_path.exists() && !std_path.is_dir() {
        return Err(RavenError::NotADirectory(path.to_path_buf()));
    }
    fs::create_dir_all(std_path).map_err(|err| {
        if std_path.exists() && !std_path.is_dir() {
            RavenError::NotADirectory(path.to_path_buf())
        } else {
            RavenError::fs(path, err)
        }
    })
}

/// Copies `source` over `dest` when `dest` is missing, differs in length, or is older.
/// Returns whether a copy happened.
pub fn copy_if_changed(source: &Utf8Path, dest: &Utf8Path) -> Result<bool, RavenError> {
    let src_meta = fs::metadata(source.as_std_path()).map_err(|err| RavenError::fs(source, err))?;
    if let Ok(dest_meta) = fs::metadata(dest.as_std_path()) {
        let same_len = dest_meta.len() == src_meta.len();
        let up_to_date = match (src_meta.modified(), dest_meta.modified()) {
            (Ok(src), Ok(dst)) => dst >= src,
            _ => false,
        };
        if same_len && up_to_date {
            return Ok(false);
        }
    }
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(source.as_std_path(), dest.as_std_path())
        .map_err(|err| RavenError::fs(format!("copy {source} -> {dest}"), err))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::{LooseValue, RunParams, SampleList};

    fn layout_in(root: &Utf8Path) -> WorkspaceLayout {
        let config = RunConfig::resolve(RunParams {
            project: Some("trichomonas".to_string()),
            samples: Some(SampleList::Joined("SRR1001,SRR10002".to_string())),
            threads: Some(LooseValue::Number(1)),
            working_dir: Some(root.join("work")),
            temp_dir: Some(root.join("tmp")),
            final_dir: Some(root.join("final")),
            home_dir: Some(root.join("home")),
            ..RunParams::default()
        })
        .unwrap();
        WorkspaceLayout::new(&config)
    }

    #[test]
    fn key_filenames() {
        let layout = layout_in(Utf8Path::new("/w"));
        assert_eq!(
            layout.timelog_path(),
            "/w/work/analysis/timelogs/SRR1001-SRR10002.log"
        );
        assert_eq!(
            layout.diamond_path(),
            "/w/work/analysis/diamond/SRR1001-SRR10002.nr.diamond.txt"
        );
        assert_eq!(
            layout.taxonomy_path(),
            "/w/work/analysis/taxonomy/SRR1001-SRR10002.nr.diamond.taxonomy.txt"
        );
        assert_eq!(
            layout.viruses_fasta_path(),
            "/w/work/analysis/viruses/SRR1001-SRR10002.viruses.fasta"
        );
    }

    #[test]
    fn ensure_layout_rejects_file_in_place_of_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let layout = layout_in(root);
        fs::create_dir_all(root.join("work/data")).unwrap();
        fs::write(root.join("work/data/raw-sra"), b"not a dir").unwrap();
        assert_matches!(
            WorkspaceManager::ensure_layout(&layout),
            Err(RavenError::NotADirectory(_))
        );
    }

    #[test]
    fn missing_adapter_is_reported_by_path() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let layout = layout_in(root);
        let err = WorkspaceManager::install_helpers(&layout).unwrap_err();
        assert_matches!(err, RavenError::MissingHelper(path) if path.ends_with(ADAPTERS_PAIRED));
    }
}
