//! Launch configuration for a debug session.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SessionError;

/// How to start the debugger subprocess.
///
/// The interpreter runs unbuffered (`-u`) so that prompts, which carry no
/// newline, reach the reader immediately, and the companion module
/// directory is appended to `PYTHONPATH` so `-m tetherpdb` resolves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// Script to debug.
    pub file: PathBuf,
    /// Arguments passed to the debugged script.
    pub args: Vec<String>,
    /// Interpreter to run.
    pub python: String,
    /// Debugger module started with `-m`.
    pub module: String,
    /// Directory holding the companion python modules.
    pub lib_dir: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            args: Vec::new(),
            python: "python3".to_string(),
            module: "tetherpdb".to_string(),
            lib_dir: PathBuf::from("lib"),
        }
    }
}

impl LaunchConfig {
    /// Configuration for debugging `file` with defaults for everything
    /// else.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Split a shell-style argument string on whitespace.
    pub fn with_args_str(mut self, args: &str) -> Self {
        self.args = args.split_whitespace().map(str::to_string).collect();
        self
    }

    /// Parse a configuration from TOML text. Missing keys keep their
    /// defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Arguments for the interpreter invocation, after the program name.
    pub fn interpreter_args(&self) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            "-m".to_string(),
            self.module.clone(),
            self.file.display().to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }

    /// `PYTHONPATH` value with the companion module directory appended.
    pub fn python_path(&self) -> std::ffi::OsString {
        let mut paths: Vec<PathBuf> = std::env::var_os("PYTHONPATH")
            .map(|existing| std::env::split_paths(&existing).collect())
            .unwrap_or_default();
        paths.push(self.lib_dir.clone());
        std::env::join_paths(paths)
            .unwrap_or_else(|_| self.lib_dir.clone().into_os_string())
    }
}
