//! Resolution of implementation ids to executable invocations.

use crate::config::SweepflowConfig;
use crate::core::StageId;
use crate::errors::LaunchError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A resolved program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to spawn.
    pub program: OsString,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Script backing the implementation.
    pub script: PathBuf,
}

impl Invocation {
    /// Printable program name.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Maps `(stage, implementation)` to `<scripts_dir>/<stage dir>/<id>[.<ext>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResolver {
    scripts_dir: PathBuf,
    interpreter: Option<String>,
    extension: Option<String>,
}

impl ScriptResolver {
    /// Creates a resolver rooted at `scripts_dir`.
    #[must_use]
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            interpreter: None,
            extension: None,
        }
    }

    /// Builds a resolver from the orchestrator config.
    #[must_use]
    pub fn from_config(config: &SweepflowConfig) -> Self {
        Self {
            scripts_dir: config.scripts_dir.clone(),
            interpreter: config.interpreter.clone(),
            extension: config.extension.clone(),
        }
    }

    /// Launches scripts through an interpreter such as `python3`.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Appends an extension to implementation ids.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Root scripts directory.
    #[must_use]
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Path of the script for an implementation, whether or not it exists.
    #[must_use]
    pub fn script_path(&self, stage: StageId, implementation: &str) -> PathBuf {
        let file = match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => {
                format!("{implementation}.{}", ext.trim_start_matches('.'))
            }
            _ => implementation.to_string(),
        };
        self.scripts_dir.join(stage.script_dir()).join(file)
    }

    /// Resolves an implementation to an invocation.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::NotFound`] if the script does not exist.
    pub fn resolve(&self, stage: StageId, implementation: &str) -> Result<Invocation, LaunchError> {
        let script = self.script_path(stage, implementation);
        if !script.is_file() {
            return Err(LaunchError::NotFound {
                implementation: implementation.to_string(),
                path: script,
            });
        }

        let invocation = match &self.interpreter {
            Some(interpreter) => Invocation {
                program: OsString::from(interpreter),
                args: vec![script.clone().into_os_string()],
                script,
            },
            None => Invocation {
                program: script.clone().into_os_string(),
                args: Vec::new(),
                script,
            },
        };
        Ok(invocation)
    }
}
