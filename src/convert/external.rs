//! Subprocess bindings for the external ISA tooling.
//!
//! The format encoders/decoders, document validators and the study-design
//! generator live outside this service. Each is bound through a configured
//! command with a fixed argument contract:
//!
//! ```text
//! <converter>  --from <fmt> --to <fmt> <source> <dest-dir>
//! <validator>  --format <tab|json> <source>           # report JSON on stdout
//! <generator>  --format <tab|json> <config> [<dest-dir>]
//! ```
//!
//! Nonzero exit maps to a tool failure carrying the process stderr; a
//! command that cannot be launched maps to a spawn failure.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

use crate::convert::{Conversion, DocumentValidator, FormatConverter};
use crate::design::generate::DesignGenerator;
use crate::error::{ConvertError, ConvertResult};

fn run(command: &str, args: &mut Command) -> ConvertResult<Output> {
    let output = args.output().map_err(|e| ConvertError::Spawn {
        command: command.to_string(),
        message: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(ConvertError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

fn stdout_json(output: Output) -> ConvertResult<Value> {
    serde_json::from_slice(&output.stdout).map_err(|e| ConvertError::BadOutput(e.to_string()))
}

// =============================================================================
// Converter binding
// =============================================================================

/// [`FormatConverter`] backed by an external command.
#[derive(Debug, Clone)]
pub struct CliConverter {
    command: String,
}

impl CliConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl FormatConverter for CliConverter {
    fn convert(&self, source: &Path, dest: &Path, conversion: &Conversion) -> ConvertResult<()> {
        run(
            &self.command,
            Command::new(&self.command)
                .arg("--from")
                .arg(conversion.source.as_str())
                .arg("--to")
                .arg(conversion.target.as_str())
                .arg(source)
                .arg(dest),
        )?;
        Ok(())
    }
}

// =============================================================================
// Validator binding
// =============================================================================

/// [`DocumentValidator`] backed by an external command printing its
/// report as JSON on stdout.
#[derive(Debug, Clone)]
pub struct CliValidator {
    command: String,
}

impl CliValidator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn validate(&self, format: &str, source: &Path) -> ConvertResult<Value> {
        let output = run(
            &self.command,
            Command::new(&self.command)
                .arg("--format")
                .arg(format)
                .arg(source),
        )?;
        stdout_json(output)
    }
}

impl DocumentValidator for CliValidator {
    fn validate_json(&self, source: &Path) -> ConvertResult<Value> {
        self.validate("json", source)
    }

    fn validate_tab(&self, source: &Path) -> ConvertResult<Value> {
        self.validate("tab", source)
    }
}

// =============================================================================
// Generator binding
// =============================================================================

/// [`DesignGenerator`] backed by an external command.
#[derive(Debug, Clone)]
pub struct CliGenerator {
    command: String,
}

impl CliGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DesignGenerator for CliGenerator {
    fn generate_json(&self, config: &Path) -> ConvertResult<Vec<u8>> {
        let output = run(
            &self.command,
            Command::new(&self.command)
                .arg("--format")
                .arg("json")
                .arg(config),
        )?;
        Ok(output.stdout)
    }

    fn generate_tab(&self, config: &Path, dest: &Path) -> ConvertResult<()> {
        run(
            &self.command,
            Command::new(&self.command)
                .arg("--format")
                .arg("tab")
                .arg(config)
                .arg(dest),
        )?;
        Ok(())
    }
}
