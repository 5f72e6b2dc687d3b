//! Conversion specifications and external tool contracts.
//!
//! The service supports a fixed, enumerated table of (source, target)
//! format pairs ([`CONVERSIONS`]). Each entry declares the accepted input
//! mimetype, whether the input and output are archives, and the naming
//! convention that locates the converter entry point inside an extracted
//! archive. The table is checked before any I/O happens, so unsupported
//! requests never allocate temporary storage.
//!
//! The actual format encoders/decoders are external collaborators behind
//! the [`FormatConverter`], [`DocumentValidator`] and
//! [`crate::design::generate::DesignGenerator`] traits; production bindings
//! live in [`external`].

pub mod dispatch;
pub mod external;

use std::path::Path;

use serde_json::Value;

use crate::archive::EntryPattern;
use crate::error::ConvertResult;

/// Accepted input mimetype for zip archives.
pub const MIME_ZIP: &str = "application/zip";

/// Accepted input mimetype for JSON documents.
pub const MIME_JSON: &str = "application/json";

/// Suffix of transient converter artifacts deleted before packing.
///
/// The tabular converter emits per-table `*_expanded.json` intermediates
/// alongside its real output; the converter contract documents them as
/// disposable.
pub const EXPANDED_SUFFIX: &str = "_expanded.json";

// =============================================================================
// Formats and the conversion table
// =============================================================================

/// Document formats the service converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// ISA-Tab: a directory of tab-separated files, exchanged as a zip.
    Tab,
    /// ISA-JSON: a single combined JSON document.
    Json,
    /// SRA XML submission bundle, exchanged as a zip.
    Sra,
    /// CEDAR template JSON.
    Cedar,
}

impl Format {
    /// Tag used on the external tool command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Tab => "tab",
            Format::Json => "json",
            Format::Sra => "sra",
            Format::Cedar => "cedar",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a conversion's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// A single document, disambiguated by suffix among the converter's
    /// output files.
    Document {
        mimetype: &'static str,
        suffix: &'static str,
    },
    /// The whole output directory, packed as a zip.
    Archive,
}

/// One supported (source, target) pair and its wire contract.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub source: Format,
    pub target: Format,
    /// The only mimetype accepted for this conversion's input.
    pub input_mimetype: &'static str,
    /// Whether the input payload is a zip archive to extract.
    pub input_is_archive: bool,
    /// How the converter's output is returned to the client.
    pub output: OutputShape,
    /// Naming rule locating the converter entry point among extracted
    /// files. `None` means the materialized payload itself is the source.
    pub entry_pattern: Option<EntryPattern>,
}

/// Entry-point convention for ISA-Tab investigation files.
const TAB_ENTRY: EntryPattern = EntryPattern::PrefixSuffix("i_", ".txt");

/// Entry-point convention for zipped JSON inputs.
const JSON_ENTRY: EntryPattern = EntryPattern::Suffix(".json");

/// The fixed table of supported conversions.
pub static CONVERSIONS: &[Conversion] = &[
    Conversion {
        source: Format::Tab,
        target: Format::Json,
        input_mimetype: MIME_ZIP,
        input_is_archive: true,
        output: OutputShape::Document {
            mimetype: MIME_JSON,
            suffix: ".json",
        },
        entry_pattern: Some(TAB_ENTRY),
    },
    Conversion {
        source: Format::Json,
        target: Format::Tab,
        input_mimetype: MIME_JSON,
        input_is_archive: false,
        output: OutputShape::Archive,
        entry_pattern: None,
    },
    Conversion {
        source: Format::Tab,
        target: Format::Sra,
        input_mimetype: MIME_ZIP,
        input_is_archive: true,
        output: OutputShape::Archive,
        entry_pattern: Some(TAB_ENTRY),
    },
    Conversion {
        source: Format::Json,
        target: Format::Sra,
        input_mimetype: MIME_ZIP,
        input_is_archive: true,
        output: OutputShape::Archive,
        entry_pattern: Some(JSON_ENTRY),
    },
    Conversion {
        source: Format::Tab,
        target: Format::Cedar,
        input_mimetype: MIME_ZIP,
        input_is_archive: true,
        output: OutputShape::Document {
            mimetype: MIME_JSON,
            suffix: ".json",
        },
        entry_pattern: Some(TAB_ENTRY),
    },
];

/// Look up the table entry for a (source, target) pair.
pub fn lookup(source: Format, target: Format) -> Option<&'static Conversion> {
    CONVERSIONS
        .iter()
        .find(|c| c.source == source && c.target == target)
}

// =============================================================================
// Pipeline outcome
// =============================================================================

/// Successful result of a request pipeline.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A single converted document.
    Document {
        bytes: Vec<u8>,
        mimetype: &'static str,
    },
    /// A zip archive of the converter's output directory.
    Archive { bytes: Vec<u8> },
    /// A JSON validation report.
    Report(Value),
}

// =============================================================================
// External collaborator contracts
// =============================================================================

/// The external format converter capability.
///
/// Given a source path (file or directory) and a destination directory,
/// the converter either populates the destination with output files and
/// returns success, or reports a converter-specific error.
pub trait FormatConverter: Send + Sync {
    fn convert(&self, source: &Path, dest: &Path, conversion: &Conversion) -> ConvertResult<()>;
}

/// The external document validator capability.
///
/// Both methods run the relevant validator over an already-materialized
/// input and return its report as a JSON document.
pub trait DocumentValidator: Send + Sync {
    fn validate_json(&self, source: &Path) -> ConvertResult<Value>;
    fn validate_tab(&self, source: &Path) -> ConvertResult<Value>;
}
