use std::fs::OpenOptions;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::Serialize;

use crate::error::RavenError;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one stage step. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub started_at: String,
    pub finished_at: String,
    pub exit_status: i32,
    pub tolerated: bool,
    pub skipped: bool,
}

impl StageRecord {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0 || self.tolerated
    }
}

/// Append-only, human-readable run log at `analysis/timelogs/{run_label}.log`.
#[derive(Debug, Clone)]
pub struct Timelog {
    path: Utf8PathBuf,
}

impl Timelog {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn now() -> String {
        Local::now().format(TIMESTAMP).to_string()
    }

    pub fn run_header(
        &self,
        project_id: &str,
        run_label: &str,
        samples: usize,
    ) -> Result<(), RavenError> {
        self.append(&format!("RUN {project_id} {run_label} samples={samples}"))
    }

    pub fn stage_start(&self, stage: &str, at: &str) -> Result<(), RavenError> {
        self.append_at(at, &format!("START {stage}"))
    }

    pub fn stage_end(&self, record: &StageRecord) -> Result<(), RavenError> {
        let mut line = format!("END {} exit={}", record.stage, record.exit_status);
        if record.tolerated {
            line.push_str(" tolerated");
        }
        self.append_at(&record.finished_at, &line)
    }

    pub fn stage_skip(&self, stage: &str) -> Result<(), RavenError> {
        self.append(&format!("SKIP {stage}"))
    }

    pub fn complete(&self, final_dir: &Utf8Path) -> Result<(), RavenError> {
        self.append(&format!("COMPLETE final_dir={final_dir}"))
    }

    fn append(&self, message: &str) -> Result<(), RavenError> {
        self.append_at(&Self::now(), message)
    }

    fn append_at(&self, at: &str, message: &str) -> Result<(), RavenError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| self.error(err))?;
        writeln!(file, "[{at}] {message}").map_err(|err| self.error(err))
    }

    fn error(&self, err: std::io::Error) -> RavenError {
        RavenError::Timelog {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn lines_are_appended_across_instances() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("run.log");
        let log = Timelog::new(path.clone());
        log.stage_start("download SRR1", &Timelog::now()).unwrap();
        Timelog::new(path.clone())
            .stage_end(&StageRecord {
                stage: "download SRR1".to_string(),
                started_at: Timelog::now(),
                finished_at: Timelog::now(),
                exit_status: 3,
                tolerated: true,
                skipped: false,
            })
            .unwrap();

        let content = fs::read_to_string(path.as_std_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("START download SRR1"));
        assert!(lines[1].ends_with("END download SRR1 exit=3 tolerated"));
    }

    #[test]
    fn unwritable_log_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(temp.path())
            .unwrap()
            .join("missing-dir/run.log");
        let err = Timelog::new(path).stage_skip("trim").unwrap_err();
        assert!(matches!(err, RavenError::Timelog { .. }));
    }
}
