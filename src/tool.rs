use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::error::RavenError;
use crate::workspace::ensure_dir;

/// One external process call: program, arguments, and what it should leave behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    pub stdout: Option<Utf8PathBuf>,
    pub outputs: Vec<Utf8PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdout: None,
            outputs: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(path) = &self.stdout {
            line.push_str(&format!(" > {path}"));
        }
        line
    }

    /// True when every declared output is already on disk.
    pub fn outputs_present(&self) -> bool {
        !self.outputs.is_empty()
            && self
                .outputs
                .iter()
                .all(|path| path.as_std_path().exists())
    }
}

/// Runs external tools. Returns the process exit status; spawning problems are errors.
pub trait ToolExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<i32, RavenError>;
}

#[derive(Debug, Clone)]
pub struct SystemExecutor {
    env_bin: Option<PathBuf>,
}

impl SystemExecutor {
    pub fn new(tool_env: Option<&Utf8Path>) -> Result<Self, RavenError> {
        let env_bin = match tool_env {
            Some(prefix) => {
                let bin = prefix.join("bin");
                if !bin.as_std_path().is_dir() {
                    return Err(RavenError::EnvironmentActivation(prefix.to_path_buf()));
                }
                Some(bin.into_std_path_buf())
            }
            None => None,
        };
        Ok(Self { env_bin })
    }

    pub fn locate(&self, name: &str) -> Result<PathBuf, RavenError> {
        if let Some(bin) = &self.env_bin {
            let candidate = bin.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        find_in_path(name).ok_or_else(|| RavenError::MissingTool(name.to_string()))
    }
}

impl ToolExecutor for SystemExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<i32, RavenError> {
        let program = self.locate(&invocation.program)?;
        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            ensure_dir(dir)?;
            cmd.current_dir(dir.as_std_path());
        }
        if let Some(bin) = &self.env_bin {
            let mut paths = vec![bin.clone()];
            if let Some(path_var) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&path_var));
            }
            let joined = std::env::join_paths(paths)
                .map_err(|err| RavenError::Filesystem(format!("PATH: {err}")))?;
            cmd.env("PATH", joined);
        }
        if let Some(path) = &invocation.stdout {
            let file = fs::File::create(path.as_std_path()).map_err(|err| RavenError::fs(path, err))?;
            cmd.stdout(Stdio::from(file));
        }
        debug!(command = %invocation.command_line(), "spawning");
        let status = cmd
            .status()
            .map_err(|err| RavenError::fs(format!("spawn {}", program.display()), err))?;
        // Killed by a signal: no exit code, report as failure.
        Ok(status.code().unwrap_or(-1))
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
