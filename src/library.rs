use camino::Utf8Path;
use tracing::{debug, info};

use crate::domain::{LibraryType, SampleAccession, SampleFileSet};
use crate::error::RavenError;

/// Classifies a run as paired or single-end from the downloaded reads.
pub struct LibraryTypeResolver;

impl LibraryTypeResolver {
    /// An explicit library type is returned as-is without touching the filesystem.
    pub fn resolve(
        explicit: LibraryType,
        samples: &[SampleAccession],
        raw_reads_dir: &Utf8Path,
    ) -> Result<LibraryType, RavenError> {
        if explicit.is_resolved() {
            debug!(library = %explicit, "library type given explicitly");
            return Ok(explicit);
        }

        let mut paired = 0;
        let mut single = 0;
        for sample in samples {
            match Self::probe(sample, raw_reads_dir)? {
                LibraryType::Paired => paired += 1,
                _ => single += 1,
            }
        }

        let resolved = match (paired, single) {
            (_, 0) => LibraryType::Paired,
            (0, _) => LibraryType::Single,
            _ => return Err(RavenError::MixedLibrary { paired, single }),
        };
        info!(library = %resolved, samples = samples.len(), "library type detected");
        Ok(resolved)
    }

    /// Both mates make a sample paired; `--split-3` also leaves `{acc}.fastq` for
    /// orphan reads, which does not change that. Aborts on the first sample with
    /// only one mate or no reads at all.
    fn probe(sample: &SampleAccession, dir: &Utf8Path) -> Result<LibraryType, RavenError> {
        let exists = |layout: LibraryType| {
            SampleFileSet::raw(dir, sample, layout)
                .map(|set| {
                    set.paths()
                        .iter()
                        .map(|path| path.as_std_path().is_file())
                        .collect::<Vec<bool>>()
                })
                .unwrap_or_default()
        };
        let single = exists(LibraryType::Single);
        let paired = exists(LibraryType::Paired);

        match (single.as_slice(), paired.as_slice()) {
            ([true], [false, false]) => Ok(LibraryType::Single),
            ([orphans], [true, true]) => {
                if *orphans {
                    debug!(sample = %sample, "unpaired reads beside both mates, treated as orphans");
                }
                Ok(LibraryType::Paired)
            }
            _ => {
                let found = describe(sample, &single, &paired);
                Err(RavenError::AmbiguousLibrary {
                    sample: sample.to_string(),
                    found,
                })
            }
        }
    }
}

fn describe(sample: &SampleAccession, single: &[bool], paired: &[bool]) -> String {
    let names = [
        format!("{sample}.fastq"),
        format!("{sample}_1.fastq"),
        format!("{sample}_2.fastq"),
    ];
    let present: Vec<&str> = single
        .iter()
        .chain(paired)
        .zip(names.iter())
        .filter(|(exists, _)| **exists)
        .map(|(_, name)| name.as_str())
        .collect();
    if present.is_empty() {
        "no read files found".to_string()
    } else {
        format!("found only {}", present.join(", "))
    }
}
