use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RavenError;
use crate::workspace::{WorkspaceLayout, copy_if_changed, ensure_dir};

#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalizeSummary {
    pub copied: usize,
    pub unchanged: usize,
    pub readme: Option<Utf8PathBuf>,
    pub temp_removed: bool,
}

/// Moves results to permanent storage and drops the temporary tree.
pub struct ResultFinalizer;

impl ResultFinalizer {
    pub fn finalize(
        layout: &WorkspaceLayout,
        built_database: bool,
    ) -> Result<FinalizeSummary, RavenError> {
        let mut summary = FinalizeSummary::default();
        let work = layout.working_dir();
        let dest = layout.final_dir();

        let mut trees = vec![
            Utf8PathBuf::from("analysis"),
            Utf8PathBuf::from("scripts"),
            Utf8PathBuf::from("data/contigs"),
        ];
        if built_database {
            trees.push(Utf8PathBuf::from("databases"));
        }
        for tree in &trees {
            let source = work.join(tree);
            if !source.as_std_path().is_dir() {
                continue;
            }
            Self::sync_tree(&source, &dest.join(tree), &mut summary)?;
        }
        summary.readme = Some(Self::write_readme(layout)?);
        info!(
            final_dir = %dest,
            copied = summary.copied,
            unchanged = summary.unchanged,
            "results synchronized"
        );

        summary.temp_removed = Self::remove_temp(layout);
        Ok(summary)
    }

    /// Adds and updates files under `dest`; never deletes anything there.
    fn sync_tree(
        source: &Utf8Path,
        dest: &Utf8Path,
        summary: &mut FinalizeSummary,
    ) -> Result<(), RavenError> {
        ensure_dir(dest)?;
        for entry in walk_dir(source.as_std_path())? {
            let Ok(entry) = Utf8PathBuf::from_path_buf(entry) else {
                continue;
            };
            let Ok(relative) = entry.strip_prefix(source) else {
                continue;
            };
            let target = dest.join(relative);
            if entry.as_std_path().is_dir() {
                ensure_dir(&target)?;
            } else if copy_if_changed(&entry, &target)? {
                summary.copied += 1;
            } else {
                summary.unchanged += 1;
            }
        }
        Ok(())
    }

    fn write_readme(layout: &WorkspaceLayout) -> Result<Utf8PathBuf, RavenError> {
        let data_dir = layout.final_dir().join("data");
        ensure_dir(&data_dir)?;
        let path = data_dir.join("README.txt");
        let text = format!(
            "Raw and adapter-trimmed FASTQ files for run {label} are not kept in final storage.\n\
             If still present, they are in the working directory:\n\
             \x20 raw reads:     {raw}\n\
             \x20 trimmed reads: {trimmed}\n\
             Re-download raw reads with fasterq-dump using the accessions in the timelog.\n",
            label = layout.run_label(),
            raw = layout.raw_reads_dir(),
            trimmed = layout.trimmed_reads_dir(),
        );
        fs::write(path.as_std_path(), text).map_err(|err| RavenError::fs(&path, err))?;
        Ok(path)
    }

    /// Failure here is only a warning: the results are already in final storage.
    fn remove_temp(layout: &WorkspaceLayout) -> bool {
        let temp = layout.temp_dir();
        if !temp.as_std_path().exists() {
            return true;
        }
        let protected = [layout.working_dir(), layout.final_dir()];
        if protected.iter().any(|path| path.starts_with(temp)) {
            warn!(temp_dir = %temp, "temp directory contains run output, not removing");
            return false;
        }
        match fs::remove_dir_all(temp.as_std_path()) {
            Ok(()) => {
                info!(temp_dir = %temp, "temp directory removed");
                true
            }
            Err(err) => {
                warn!(temp_dir = %temp, error = %err, "failed to remove temp directory");
                false
            }
        }
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, RavenError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| RavenError::fs(path.display(), err))?;
        for entry in entries {
            let entry = entry.map_err(|err| RavenError::fs(path.display(), err))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    items.sort();
    Ok(items)
}
