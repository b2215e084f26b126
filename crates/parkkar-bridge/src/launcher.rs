//! Detector process launcher
//!
//! Resolves the interpreter for the current deployment, checks that the
//! script and working directory exist, and spawns the detector with piped
//! stdout/stderr. stderr is handed to a background collector right away so
//! a noisy detector can never stall on a full diagnostic pipe.

use crate::{diagnostics::Diagnostics, error::LaunchError, reap::Session, DetectionJob, Mode};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::{Child, ChildStdout, Command};

/// Flag that switches a detector into MJPEG mode.
pub const STREAM_FLAG: &str = "--stream";

/// Where the service is deployed, which decides the interpreter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    /// Inside a container image: interpreter comes from `PATH`.
    Container,
    /// Developer checkout: interpreter lives in the project virtualenv.
    Local,
}

impl Runtime {
    /// `PARKKAR_CONTAINER` set, or a `/.dockerenv` marker, means container.
    pub fn detect() -> Self {
        if std::env::var_os("PARKKAR_CONTAINER").is_some() || Path::new("/.dockerenv").exists() {
            Runtime::Container
        } else {
            Runtime::Local
        }
    }
}

/// Configuration for launching detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Working directory of every detector; relative scripts resolve here
    pub project_root: PathBuf,
    /// Explicit interpreter, bypassing runtime-based resolution
    pub interpreter: Option<PathBuf>,
    /// Interpreter used when running in a container
    pub container_interpreter: PathBuf,
    /// Virtualenv directory (relative to `project_root`) used locally
    pub venv_dir: PathBuf,
    /// Extra arguments placed before the script path
    pub interpreter_args: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            interpreter: None,
            container_interpreter: PathBuf::from("python3"),
            venv_dir: PathBuf::from("venv"),
            interpreter_args: Vec::new(),
        }
    }
}

/// A started detector: the child, its stdout and the stderr collector.
pub struct ProcessHandle {
    pub(crate) lot_id: String,
    pub(crate) child: Child,
    pub(crate) stdout: ChildStdout,
    pub(crate) diagnostics: Diagnostics,
}

impl ProcessHandle {
    /// OS process id, `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn lot_id(&self) -> &str {
        &self.lot_id
    }

    pub(crate) fn split(self) -> (ChildStdout, Session) {
        let session = Session {
            lot_id: self.lot_id,
            child: self.child,
            diagnostics: self.diagnostics,
        };
        (self.stdout, session)
    }
}

/// Starts detector processes.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LauncherConfig,
    runtime: Runtime,
}

impl Launcher {
    pub fn new(config: LauncherConfig, runtime: Runtime) -> Self {
        Self { config, runtime }
    }

    /// Launcher for the runtime detected from the environment.
    pub fn detected(config: LauncherConfig) -> Self {
        Self::new(config, Runtime::detect())
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    /// Interpreter that will run the detector scripts.
    ///
    /// A relative path with a directory component is taken from the
    /// project root; a bare name is left for `PATH` lookup.
    pub fn interpreter(&self) -> PathBuf {
        if let Some(explicit) = &self.config.interpreter {
            if explicit.is_relative() && explicit.components().count() > 1 {
                return self.config.project_root.join(explicit);
            }
            return explicit.clone();
        }
        match self.runtime {
            Runtime::Container => self.config.container_interpreter.clone(),
            Runtime::Local => venv_python(&self.config.project_root.join(&self.config.venv_dir)),
        }
    }

    /// Absolute-or-root-relative location of a detector script.
    pub fn resolve_script(&self, script: &Path) -> PathBuf {
        if script.is_absolute() {
            script.to_path_buf()
        } else {
            self.config.project_root.join(script)
        }
    }

    /// Build the command line for `job` without spawning it.
    pub fn command(&self, job: &DetectionJob) -> Command {
        let mut cmd = Command::new(self.interpreter());
        cmd.args(&self.config.interpreter_args)
            .arg(self.resolve_script(&job.script_path));
        if job.mode == Mode::Stream {
            cmd.arg(STREAM_FLAG);
        }
        cmd.current_dir(&self.config.project_root)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Start the detector for `job`.
    ///
    /// Must be called from inside a tokio runtime: the pipes are registered
    /// with the reactor and stderr is drained on a spawned task.
    pub fn launch(&self, job: &DetectionJob) -> Result<ProcessHandle, LaunchError> {
        if !self.config.project_root.is_dir() {
            return Err(LaunchError::WorkingDirMissing(self.config.project_root.clone()));
        }

        let script = self.resolve_script(&job.script_path);
        if !script.is_file() {
            return Err(LaunchError::ScriptMissing(script));
        }

        let interpreter = self.interpreter();
        // a bare name is looked up on PATH by spawn; anything with a
        // directory component has to exist already
        if interpreter.components().count() > 1 && !interpreter.exists() {
            return Err(LaunchError::InterpreterNotFound(interpreter));
        }

        debug!(
            "[{}] launching {:?} {:?} (mode {:?})",
            job.lot_id, interpreter, script, job.mode
        );

        let mut child = self.command(job).spawn().map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LaunchError::InterpreterNotFound(interpreter.clone()),
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied {
                path: interpreter.clone(),
                source,
            },
            _ => LaunchError::Spawn {
                path: interpreter.clone(),
                source,
            },
        })?;

        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(LaunchError::MissingPipe("stderr"))?;

        Ok(ProcessHandle {
            lot_id: job.lot_id.clone(),
            child,
            stdout,
            diagnostics: Diagnostics::capture(stderr),
        })
    }
}

#[cfg(not(windows))]
fn venv_python(venv: &Path) -> PathBuf {
    venv.join("bin").join("python")
}

#[cfg(windows)]
fn venv_python(venv: &Path) -> PathBuf {
    venv.join("Scripts").join("python.exe")
}
