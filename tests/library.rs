use std::fs;

use assert_matches::assert_matches;
use camino::Utf8Path;

use raven::config::parse_accessions;
use raven::domain::LibraryType;
use raven::error::RavenError;
use raven::library::LibraryTypeResolver;

fn reads_dir(files: &[&str]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    for file in files {
        fs::write(temp.path().join(file), b"@r\nA\n+\nI\n").unwrap();
    }
    temp
}

#[test]
fn all_paired_resolves_paired() {
    let temp = reads_dir(&[
        "SRR1001_1.fastq",
        "SRR1001_2.fastq",
        "SRR10002_1.fastq",
        "SRR10002_2.fastq",
    ]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1001,SRR10002").unwrap();
    let resolved = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap();
    assert_eq!(resolved, LibraryType::Paired);
}

#[test]
fn all_single_resolves_single() {
    let temp = reads_dir(&["SRR1.fastq", "SRR2.fastq"]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1,SRR2").unwrap();
    let resolved = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap();
    assert_eq!(resolved, LibraryType::Single);
}

#[test]
fn mixture_is_rejected() {
    let temp = reads_dir(&["SRR1.fastq", "SRR2_1.fastq", "SRR2_2.fastq", "SRR3.fastq"]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1,SRR2,SRR3").unwrap();
    let err = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap_err();
    assert_matches!(err, RavenError::MixedLibrary { paired: 1, single: 2 });
}

#[test]
fn first_unresolvable_sample_stops_probing() {
    let temp = reads_dir(&["SRR2_1.fastq", "SRR2_2.fastq"]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1,SRR2").unwrap();
    let err = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap_err();
    assert_matches!(
        err,
        RavenError::AmbiguousLibrary { sample, found } if sample == "SRR1" && found == "no read files found"
    );
}

#[test]
fn explicit_paired_wins_over_files() {
    let temp = reads_dir(&["SRR1.fastq"]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1").unwrap();
    let resolved = LibraryTypeResolver::resolve(LibraryType::Paired, &samples, dir).unwrap();
    assert_eq!(resolved, LibraryType::Paired);
}

#[test]
fn split_download_with_orphans_is_paired() {
    let temp = reads_dir(&[
        "SRR1001.fastq",
        "SRR1001_1.fastq",
        "SRR1001_2.fastq",
        "SRR10002_1.fastq",
        "SRR10002_2.fastq",
    ]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1001,SRR10002").unwrap();
    let resolved = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap();
    assert_eq!(resolved, LibraryType::Paired);
}

#[test]
fn lone_mate_beside_orphans_is_ambiguous() {
    let temp = reads_dir(&["SRR1.fastq", "SRR1_2.fastq"]);
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let samples = parse_accessions("SRR1").unwrap();
    let err = LibraryTypeResolver::resolve(LibraryType::Unknown, &samples, dir).unwrap_err();
    assert_matches!(err, RavenError::AmbiguousLibrary { sample, .. } if sample == "SRR1");
}
