use serde::Serialize;
use tracing::{info, warn};

use crate::error::RavenError;
use crate::timelog::{StageRecord, Timelog};
use crate::tool::{Invocation, ToolExecutor};

/// Whether a non-zero exit status stops the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailurePolicy {
    Abort,
    /// Only for the downloader, which exits non-zero when its output already exists.
    Tolerate,
}

/// Runs stage steps one at a time, bracketing each with timelog lines.
pub struct StageRunner<E: ToolExecutor> {
    executor: E,
    timelog: Timelog,
    resume: bool,
    records: Vec<StageRecord>,
}

impl<E: ToolExecutor> StageRunner<E> {
    pub fn new(executor: E, timelog: Timelog, resume: bool) -> Self {
        Self {
            executor,
            timelog,
            resume,
            records: Vec::new(),
        }
    }

    pub fn timelog(&self) -> &Timelog {
        &self.timelog
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn run_stage(
        &mut self,
        name: &str,
        invocation: &Invocation,
        policy: FailurePolicy,
    ) -> Result<&StageRecord, RavenError> {
        if self.resume && invocation.outputs_present() {
            info!(stage = name, "outputs present, skipping");
            self.timelog.stage_skip(name)?;
            let now = Timelog::now();
            return Ok(self.push(StageRecord {
                stage: name.to_string(),
                started_at: now.clone(),
                finished_at: now,
                exit_status: 0,
                tolerated: false,
                skipped: true,
            }));
        }

        let started_at = Timelog::now();
        self.timelog.stage_start(name, &started_at)?;
        info!(stage = name, command = %invocation.command_line(), "stage started");

        let outcome = self.executor.execute(invocation);
        let exit_status = match &outcome {
            Ok(code) => *code,
            Err(_) => -1,
        };
        let tolerated = exit_status != 0 && policy == FailurePolicy::Tolerate && outcome.is_ok();
        let record = StageRecord {
            stage: name.to_string(),
            started_at,
            finished_at: Timelog::now(),
            exit_status,
            tolerated,
            skipped: false,
        };
        self.timelog.stage_end(&record)?;
        self.push(record);
        outcome?;

        if exit_status != 0 {
            if !tolerated {
                return Err(RavenError::StageFailed {
                    stage: name.to_string(),
                    status: exit_status,
                });
            }
            warn!(stage = name, exit_status, "non-zero exit tolerated");
        } else {
            info!(stage = name, "stage finished");
        }
        Ok(self.last())
    }

    /// Runs an orchestrator-internal step (no external process) with the same bracketing.
    pub fn run_internal<T>(
        &mut self,
        name: &str,
        step: impl FnOnce() -> Result<T, RavenError>,
    ) -> Result<T, RavenError> {
        let started_at = Timelog::now();
        self.timelog.stage_start(name, &started_at)?;
        let result = step();
        let record = StageRecord {
            stage: name.to_string(),
            started_at,
            finished_at: Timelog::now(),
            exit_status: if result.is_ok() { 0 } else { 1 },
            tolerated: false,
            skipped: false,
        };
        self.timelog.stage_end(&record)?;
        self.push(record);
        result
    }

    fn push(&mut self, record: StageRecord) -> &StageRecord {
        self.records.push(record);
        self.last()
    }

    fn last(&self) -> &StageRecord {
        &self.records[self.records.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use camino::Utf8Path;

    use super::*;

    struct FixedExit(i32);

    impl ToolExecutor for FixedExit {
        fn execute(&self, _invocation: &Invocation) -> Result<i32, RavenError> {
            Ok(self.0)
        }
    }

    fn runner(dir: &Utf8Path, code: i32) -> StageRunner<FixedExit> {
        StageRunner::new(FixedExit(code), Timelog::new(dir.join("run.log")), false)
    }

    #[test]
    fn tolerated_failure_is_recorded_not_raised() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let mut runner = runner(dir, 3);
        let record = runner
            .run_stage(
                "download SRR1",
                &Invocation::new("fasterq-dump"),
                FailurePolicy::Tolerate,
            )
            .unwrap();
        assert_eq!(record.exit_status, 3);
        assert!(record.tolerated);
        assert!(record.succeeded());
    }

    #[test]
    fn abort_policy_raises_and_records() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let mut runner = runner(dir, 1);
        let err = runner
            .run_stage("trim SRR1", &Invocation::new("trimmomatic"), FailurePolicy::Abort)
            .unwrap_err();
        assert_matches!(err, RavenError::StageFailed { status: 1, .. });
        assert_eq!(runner.records().len(), 1);
        assert!(!runner.records()[0].succeeded());

        let log = fs::read_to_string(dir.join("run.log")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn resume_skips_when_outputs_exist() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let output = dir.join("contigs.fasta");
        fs::write(&output, b">c1\nACGT\n").unwrap();
        let mut runner = StageRunner::new(FixedExit(1), Timelog::new(dir.join("run.log")), true);
        let record = runner
            .run_stage(
                "assemble_contigs",
                &Invocation::new("rnaspades.py").output(output),
                FailurePolicy::Abort,
            )
            .unwrap();
        assert!(record.skipped);
        let log = fs::read_to_string(dir.join("run.log")).unwrap();
        assert!(log.trim_end().ends_with("SKIP assemble_contigs"));
    }
}
