//! Executable resolution
//!
//! Turns a unit name and its (optional) definition into the program,
//! arguments and working directory to launch. Units without `ExecStart=`
//! fall back to a fixed layout: `<base>/<shortname>/<name>`, where the short
//! name is the last dot-separated segment of the unit name, lower-cased.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::units::{strip_suffix, UnitDefinition};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Where a resolved command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    ExecStart,
    Convention,
}

/// A concrete command line ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub source: CommandSource,
}

impl ResolvedCommand {
    /// Human-readable command line, used as the record fingerprint
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    app_base: PathBuf,
    default_working_dir: PathBuf,
}

impl Resolver {
    pub fn new(app_base: impl Into<PathBuf>, default_working_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_base: app_base.into(),
            default_working_dir: default_working_dir.into(),
        }
    }

    pub fn resolve(
        &self,
        unit_name: &str,
        definition: Option<&UnitDefinition>,
    ) -> Result<ResolvedCommand, ResolveError> {
        let working_dir = definition
            .and_then(|d| d.working_directory.clone())
            .unwrap_or_else(|| self.default_working_dir.clone());

        let exec_start = definition
            .and_then(|d| d.exec_start.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match exec_start {
            Some(line) => {
                let (program, args) = split_exec_start(line)?;
                let program = locate(Path::new(&program), &working_dir)
                    .ok_or_else(|| ResolveError::ExecutableNotFound(PathBuf::from(&program)))?;
                Ok(ResolvedCommand {
                    program,
                    args,
                    working_dir,
                    source: CommandSource::ExecStart,
                })
            }
            None => {
                let program = self.conventional_path(unit_name);
                if !program.is_file() {
                    return Err(ResolveError::ExecutableNotFound(program));
                }
                Ok(ResolvedCommand {
                    program,
                    args: Vec::new(),
                    working_dir,
                    source: CommandSource::Convention,
                })
            }
        }
    }

    /// `<base>/<shortname>/<name>` for a unit with no `ExecStart=`
    pub fn conventional_path(&self, unit_name: &str) -> PathBuf {
        let name = strip_suffix(unit_name.trim());
        let short = name.rsplit('.').next().unwrap_or(name).to_lowercase();
        self.app_base
            .join(short)
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }
}

/// Split an `ExecStart=` line into program and arguments
///
/// A double-quoted first token is taken verbatim as the program, spaces
/// included. The rest of the line is split with shell-style quoting.
pub fn split_exec_start(line: &str) -> Result<(String, Vec<String>), ResolveError> {
    // Handle special prefixes (-, @, +, !, !!)
    let cmd = line
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '@' || c == '+' || c == '!');

    let (program, rest) = if let Some(quoted) = cmd.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| ResolveError::InvalidCommand(line.to_string()))?;
        (&quoted[..end], &quoted[end + 1..])
    } else {
        match cmd.find(char::is_whitespace) {
            Some(pos) => (&cmd[..pos], &cmd[pos..]),
            None => (cmd, ""),
        }
    };

    if program.is_empty() {
        return Err(ResolveError::InvalidCommand(line.to_string()));
    }

    let rest = rest.trim();
    let args = if rest.is_empty() {
        Vec::new()
    } else {
        shlex::split(rest)
            .unwrap_or_else(|| rest.split_whitespace().map(str::to_string).collect())
    };

    Ok((program.to_string(), args))
}

/// Find the file a program name refers to
///
/// Bare names are looked up on `PATH`; relative paths resolve against the
/// working directory.
fn locate(program: &Path, working_dir: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        let candidate = if program.is_absolute() {
            program.to_path_buf()
        } else {
            working_dir.join(program)
        };
        return candidate.is_file().then_some(candidate);
    }

    let path = std::env::var_os("PATH").unwrap_or_else(|| OsString::from("/usr/bin:/bin"));
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
