//! Study-design generation request flow.
//!
//! `POST /design/generate` takes `{studyDesignConfig, responseFormat}`,
//! runs the limits engine first, and only then hands the config to the
//! external generator. The response is either the serialized investigation
//! JSON or a zip of generated tab files, per `responseFormat`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::archive;
use crate::arena::Arena;
use crate::convert::{Outcome, MIME_JSON};
use crate::design::{validate, StudyDesignConfig, ValidationLimits};
use crate::error::{ConvertResult, ServiceError, ServiceResult};

/// File name of the serialized config handed to the generator.
const CONFIG_FILE_NAME: &str = "design-config.json";

/// File name of the JSON document included in `all` archives.
const OUTPUT_JSON_FILE_NAME: &str = "investigation.json";

/// Requested serialization of the generated design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Investigation JSON document.
    Json,
    /// Zip of generated tab files.
    #[default]
    Tab,
    /// Zip of tab files plus the JSON document.
    All,
}

impl ResponseFormat {
    /// Anything other than `json` or `all` falls back to tab output,
    /// never an error.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("json") => Self::Json,
            Some("all") => Self::All,
            _ => Self::Tab,
        }
    }
}

/// The external design generator capability, invoked only after the
/// limits engine accepted the config.
pub trait DesignGenerator: Send + Sync {
    /// Serialize the generated investigation as a JSON document.
    fn generate_json(&self, config: &Path) -> ConvertResult<Vec<u8>>;

    /// Dump the generated investigation as tab files into `dest`.
    fn generate_tab(&self, config: &Path, dest: &Path) -> ConvertResult<()>;
}

/// Run a design-generation request end to end.
///
/// `body` is the raw request JSON. Missing `studyDesignConfig` is a client
/// error; a populated validation report short-circuits before any
/// generation work or temporary storage.
pub fn run_design_request(
    arena: &Arena,
    generator: &Arc<dyn DesignGenerator>,
    limits: &ValidationLimits,
    body: &[u8],
) -> ServiceResult<Outcome> {
    let request: Value = serde_json::from_slice(body)
        .map_err(|_| ServiceError::MissingField("studyDesignConfig".into()))?;
    let config_value = request
        .get("studyDesignConfig")
        .ok_or_else(|| ServiceError::MissingField("studyDesignConfig".into()))?
        .clone();
    let format = ResponseFormat::parse(request.get("responseFormat").and_then(Value::as_str));

    let config: StudyDesignConfig = serde_json::from_value(config_value.clone())
        .map_err(|e| ServiceError::MissingField(format!("studyDesignConfig: {e}")))?;
    if let Some(report) = validate(&config, limits) {
        return Err(ServiceError::ValidationFailed(report));
    }

    let scope = arena.open()?;
    let result = (|| {
        let config_path = scope.root().join(CONFIG_FILE_NAME);
        fs::write(&config_path, serde_json::to_vec(&config_value).map_err(json_failure)?)
            .map_err(io_failure)?;

        match format {
            ResponseFormat::Json => {
                let bytes = generator.generate_json(&config_path)?;
                Ok(Outcome::Document {
                    bytes,
                    mimetype: MIME_JSON,
                })
            }
            ResponseFormat::Tab | ResponseFormat::All => {
                let out_dir = scope.subdir("design").map_err(io_failure)?;
                if format == ResponseFormat::All {
                    let json = generator.generate_json(&config_path)?;
                    fs::write(out_dir.join(OUTPUT_JSON_FILE_NAME), json).map_err(io_failure)?;
                }
                generator.generate_tab(&config_path, &out_dir)?;
                let bytes = archive::pack(&out_dir)?;
                Ok(Outcome::Archive { bytes })
            }
        }
    })();
    scope.close();
    result
}

fn io_failure(err: std::io::Error) -> ServiceError {
    ServiceError::ResourceAllocation(err.to_string())
}

fn json_failure(err: serde_json::Error) -> ServiceError {
    ServiceError::ResourceAllocation(err.to_string())
}
