use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use raven::config::{LooseValue, RunConfig, RunParams, SampleList};
use raven::error::RavenError;
use raven::workspace::{WorkspaceLayout, WorkspaceManager};

fn layout(root: &Utf8Path) -> WorkspaceLayout {
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

fn root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8Path::from_path(temp.path()).unwrap().to_path_buf()
}

#[test]
fn layout_matches_documented_tree() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    WorkspaceManager::ensure_layout(&layout(&root)).unwrap();
    for dir in [
        "work/data/raw-sra",
        "work/data/fastq-adapter-trimmed",
        "work/data/contigs",
        "work/analysis/timelogs",
        "work/analysis/contigs",
        "work/analysis/diamond",
        "work/analysis/taxonomy",
        "work/analysis/viruses",
        "work/analysis/mapping",
        "work/scripts",
        "tmp",
    ] {
        assert!(root.join(dir).as_std_path().is_dir(), "missing {dir}");
    }
}

#[test]
fn ensure_layout_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let layout = layout(&root);
    WorkspaceManager::ensure_layout(&layout).unwrap();
    let contigs = layout.contigs_path();
    fs::write(&contigs, b">c1\nACGT\n").unwrap();

    WorkspaceManager::ensure_layout(&layout).unwrap();
    assert_eq!(fs::read(&contigs).unwrap(), b">c1\nACGT\n");
}

#[test]
fn helpers_are_copied_into_scripts() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    for file in [
        "home/resources/adapters/TruSeq3-PE-2.fa",
        "home/resources/adapters/TruSeq3-SE.fa",
        "home/resources/taxdump/names.dmp",
        "home/resources/taxdump/nodes.dmp",
        "home/scripts/plot_coverage.R",
    ] {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, file).unwrap();
    }
    let layout = layout(&root);
    WorkspaceManager::ensure_layout(&layout).unwrap();
    let summary = WorkspaceManager::install_helpers(&layout).unwrap();

    assert_eq!(summary.verified.len(), 2);
    assert!(root.join("work/scripts/adapters/TruSeq3-SE.fa").as_std_path().is_file());
    assert!(root.join("work/scripts/plot_coverage.R").as_std_path().is_file());

    let again = WorkspaceManager::install_helpers(&layout).unwrap();
    assert_eq!(again.copied.len(), summary.copied.len());
}

#[test]
fn missing_helper_has_its_own_exit_code() {
    let temp = tempfile::tempdir().unwrap();
    let root = root(&temp);
    let err = WorkspaceManager::install_helpers(&layout(&root)).unwrap_err();
    assert_matches!(err, RavenError::MissingHelper(_));
    assert_eq!(err.exit_code(), 5);
}
