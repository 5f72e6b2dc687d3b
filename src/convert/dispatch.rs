//! Request-scoped conversion pipeline.
//!
//! One [`Dispatcher::dispatch`] call drives a request through the states
//! `Received -> InputMaterialized -> Converted -> OutputPackaged ->
//! Completed`, with an error-absorbing edge from every state to `Failed`.
//! Exactly one arena scope is opened per request and closed on every exit
//! path; no state survives across requests.
//!
//! The declared mimetype is checked against the conversion table before
//! any temporary resource is allocated, so a 415 leaves no residue on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::api::logs::{log_error, log_info, log_success};
use crate::archive::{self, EntryPattern, InputPayload};
use crate::arena::{Arena, RequestScope};
use crate::convert::{
    lookup, Conversion, DocumentValidator, Format, FormatConverter, Outcome, OutputShape,
    EXPANDED_SUFFIX, MIME_JSON, MIME_ZIP,
};
use crate::error::{ServiceError, ServiceResult};

/// Drives conversion and validation requests through the pipeline.
pub struct Dispatcher {
    arena: Arena,
    converter: Arc<dyn FormatConverter>,
    validator: Arc<dyn DocumentValidator>,
}

impl Dispatcher {
    pub fn new(
        arena: Arena,
        converter: Arc<dyn FormatConverter>,
        validator: Arc<dyn DocumentValidator>,
    ) -> Self {
        Self {
            arena,
            converter,
            validator,
        }
    }

    /// Run a conversion request end to end.
    pub fn dispatch(
        &self,
        source: Format,
        target: Format,
        payload: InputPayload,
    ) -> ServiceResult<Outcome> {
        // Unsupported pairs are rejected before any I/O.
        let conversion = lookup(source, target).ok_or_else(|| {
            ServiceError::MalformedInput(format!("no conversion from {source} to {target}"))
        })?;

        // Mimetype gate runs before the arena opens: a 415 must leave
        // no residual directories.
        check_mimetype(&payload, conversion.input_mimetype)?;

        log_info(format!("convert {source} -> {target}: received {} bytes", payload.bytes.len()));

        let scope = self.arena.open()?;
        let result = self.run_conversion(conversion, &payload, &scope);
        scope.close();

        match &result {
            Ok(_) => log_success(format!("convert {source} -> {target}: completed")),
            Err(e) => log_error(format!("convert {source} -> {target}: {}", e.category())),
        }
        result
    }

    fn run_conversion(
        &self,
        conversion: &Conversion,
        payload: &InputPayload,
        scope: &RequestScope,
    ) -> ServiceResult<Outcome> {
        let input_dir = scope.subdir("input").map_err(io_failure)?;
        let output_dir = scope.subdir("output").map_err(io_failure)?;

        // Received -> InputMaterialized
        let extracted = archive::extract(payload, conversion.input_is_archive, &input_dir)?;
        let source_path = match &conversion.entry_pattern {
            Some(pattern) => archive::locate_entry_point(&extracted, pattern)?,
            None => extracted
                .first()
                .cloned()
                .ok_or_else(|| ServiceError::MalformedInput("empty input payload".into()))?,
        };
        log_info(format!("scope {}: input materialized", scope.id()));

        // InputMaterialized -> Converted
        self.converter
            .convert(&source_path, &output_dir, conversion)
            .map_err(|e| sanitize_tool_error(e, scope.root()))?;
        log_info(format!("scope {}: converted", scope.id()));

        // Converted -> OutputPackaged
        let outcome = package_output(conversion, &output_dir)?;
        log_info(format!("scope {}: output packaged", scope.id()));

        Ok(outcome)
    }

    /// Run a JSON document validation request.
    pub fn validate_json(&self, payload: InputPayload) -> ServiceResult<Outcome> {
        check_mimetype(&payload, MIME_JSON)?;

        let scope = self.arena.open()?;
        let result = (|| {
            let input_dir = scope.subdir("input").map_err(io_failure)?;
            let extracted = archive::extract(&payload, false, &input_dir)?;
            let document = extracted
                .first()
                .ok_or_else(|| ServiceError::MalformedInput("empty input payload".into()))?;
            let report = self
                .validator
                .validate_json(document)
                .map_err(|e| sanitize_tool_error(e, scope.root()))?;
            Ok(Outcome::Report(report))
        })();
        scope.close();
        result
    }

    /// Run a tabular archive validation request: extract, locate the
    /// investigation entry point, validate.
    pub fn validate_tab(&self, payload: InputPayload) -> ServiceResult<Outcome> {
        check_mimetype(&payload, MIME_ZIP)?;

        let scope = self.arena.open()?;
        let result = (|| {
            let input_dir = scope.subdir("input").map_err(io_failure)?;
            let extracted = archive::extract(&payload, true, &input_dir)?;
            let pattern = EntryPattern::PrefixSuffix("i_", ".txt");
            let entry = archive::locate_entry_point(&extracted, &pattern)?;
            let report = self
                .validator
                .validate_tab(&entry)
                .map_err(|e| sanitize_tool_error(e, scope.root()))?;
            Ok(Outcome::Report(report))
        })();
        scope.close();
        result
    }

    /// The arena this dispatcher allocates scopes from.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

/// Package the converter's destination directory per the declared shape.
fn package_output(conversion: &Conversion, output_dir: &Path) -> ServiceResult<Outcome> {
    match conversion.output {
        OutputShape::Document { mimetype, suffix } => {
            let files = archive::list_files(output_dir).map_err(io_failure)?;
            let mut candidates = files.iter().filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
            });
            let document = match (candidates.next(), candidates.next()) {
                (Some(single), None) => single,
                (first, _) => {
                    let matches = first.map_or(0, |_| 2) + candidates.count();
                    return Err(ServiceError::AmbiguousOutput { matches });
                }
            };
            let bytes = fs::read(document).map_err(io_failure)?;
            Ok(Outcome::Document { bytes, mimetype })
        }
        OutputShape::Archive => {
            // Drop transient intermediates before packing.
            archive::remove_by_suffix(output_dir, EXPANDED_SUFFIX).map_err(io_failure)?;
            let bytes = archive::pack(output_dir)?;
            Ok(Outcome::Archive { bytes })
        }
    }
}

fn check_mimetype(payload: &InputPayload, accepted: &'static str) -> ServiceResult<()> {
    if payload.mimetype == accepted {
        Ok(())
    } else {
        Err(ServiceError::UnsupportedMediaType {
            declared: payload.mimetype.clone(),
            accepted,
        })
    }
}

fn io_failure(err: std::io::Error) -> ServiceError {
    ServiceError::ResourceAllocation(err.to_string())
}

/// Strip the scope's filesystem path from external tool output before it
/// can reach a response body.
fn sanitize_tool_error(err: crate::error::ConvertError, scope_root: &Path) -> ServiceError {
    let service: ServiceError = err.into();
    match service {
        ServiceError::ConversionFailed(messages) => ServiceError::ConversionFailed(
            messages
                .into_iter()
                .map(|m| m.replace(&scope_root.display().to_string(), "<workdir>"))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip_from_entries;
    use crate::error::{ConvertError, ConvertResult};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tempfile::{tempdir, TempDir};

    /// Converter double that writes a fixed set of output files.
    struct FakeConverter {
        outputs: Vec<(&'static str, &'static [u8])>,
        fail_with: Option<String>,
    }

    impl FakeConverter {
        fn writing(outputs: Vec<(&'static str, &'static [u8])>) -> Self {
            Self {
                outputs,
                fail_with: None,
            }
        }

        fn failing(stderr: &str) -> Self {
            Self {
                outputs: vec![],
                fail_with: Some(stderr.to_string()),
            }
        }
    }

    impl FormatConverter for FakeConverter {
        fn convert(&self, source: &Path, dest: &Path, _conversion: &Conversion) -> ConvertResult<()> {
            assert!(source.exists(), "converter must receive an existing source");
            if let Some(stderr) = &self.fail_with {
                return Err(ConvertError::Failed {
                    code: Some(1),
                    stderr: stderr.clone(),
                });
            }
            for (name, contents) in &self.outputs {
                fs::write(dest.join(name), contents)?;
            }
            Ok(())
        }
    }

    struct FakeValidator;

    impl DocumentValidator for FakeValidator {
        fn validate_json(&self, _source: &Path) -> ConvertResult<Value> {
            Ok(json!({"errors": [], "warnings": []}))
        }

        fn validate_tab(&self, _source: &Path) -> ConvertResult<Value> {
            Ok(json!({"errors": [], "warnings": []}))
        }
    }

    fn dispatcher(converter: FakeConverter) -> (Dispatcher, TempDir) {
        let base = tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            Arena::new(base.path()),
            Arc::new(converter),
            Arc::new(FakeValidator),
        );
        (dispatcher, base)
    }

    fn tab_archive() -> InputPayload {
        let bytes = zip_from_entries(&[
            ("study/i_investigation.txt", b"INVESTIGATION".as_slice()),
            ("study/s_samples.txt", b"Source Name".as_slice()),
        ]);
        InputPayload::new(bytes, MIME_ZIP)
    }

    fn residual_dirs(base: &Path) -> usize {
        match fs::read_dir(base) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn test_tab_to_json_yields_single_document() {
        let (dispatcher, base) =
            dispatcher(FakeConverter::writing(vec![("combined.json", b"{\"ok\":true}")]));

        let outcome = dispatcher
            .dispatch(Format::Tab, Format::Json, tab_archive())
            .unwrap();

        match outcome {
            Outcome::Document { bytes, mimetype } => {
                assert_eq!(mimetype, MIME_JSON);
                assert_eq!(bytes, b"{\"ok\":true}");
            }
            other => panic!("expected document, got {other:?}"),
        }
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_wrong_mimetype_rejected_before_allocation() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![]));
        let payload = InputPayload::new(b"{}".to_vec(), MIME_JSON);

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, payload)
            .unwrap_err();

        assert!(matches!(err, ServiceError::UnsupportedMediaType { .. }));
        // the arena base was never touched
        assert!(!base.path().join("input").exists());
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_archive_without_entry_point_is_ambiguous() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![]));
        let bytes = zip_from_entries(&[("study/s_samples.txt", b"Source Name".as_slice())]);
        let payload = InputPayload::new(bytes, MIME_ZIP);

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, payload)
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::AmbiguousEntryPoint { matches: 0, .. }
        ));
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_malformed_archive_maps_to_malformed_input() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![]));
        let payload = InputPayload::new(b"definitely not a zip".to_vec(), MIME_ZIP);

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, payload)
            .unwrap_err();

        assert!(matches!(err, ServiceError::MalformedInput(_)));
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_two_json_outputs_is_ambiguous_output() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![
            ("one.json", b"{}"),
            ("two.json", b"{}"),
        ]));

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, tab_archive())
            .unwrap_err();

        assert!(matches!(err, ServiceError::AmbiguousOutput { matches: 2 }));
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_archive_target_excludes_expanded_intermediates() {
        let (dispatcher, _base) = dispatcher(FakeConverter::writing(vec![
            ("i_investigation.txt", b"INVESTIGATION"),
            ("s_study_expanded.json", b"{}"),
        ]));
        let payload = InputPayload::new(b"{\"studies\": []}".to_vec(), MIME_JSON);

        let outcome = dispatcher
            .dispatch(Format::Json, Format::Tab, payload)
            .unwrap();

        let Outcome::Archive { bytes } = outcome else {
            panic!("expected archive outcome");
        };
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["i_investigation.txt"]);
    }

    #[test]
    fn test_failing_converter_maps_to_conversion_failed() {
        let (dispatcher, base) = dispatcher(FakeConverter::failing("parse error at line 3"));

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, tab_archive())
            .unwrap_err();

        let ServiceError::ConversionFailed(messages) = err else {
            panic!("expected conversion failure");
        };
        assert!(messages.iter().any(|m| m.contains("parse error at line 3")));
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_tool_errors_do_not_leak_scope_paths() {
        let base = tempdir().unwrap();

        struct PathLeakingConverter;
        impl FormatConverter for PathLeakingConverter {
            fn convert(&self, source: &Path, _dest: &Path, _c: &Conversion) -> ConvertResult<()> {
                Err(ConvertError::Failed {
                    code: Some(1),
                    stderr: format!("cannot parse {}", source.display()),
                })
            }
        }

        let dispatcher = Dispatcher::new(
            Arena::new(base.path()),
            Arc::new(PathLeakingConverter),
            Arc::new(FakeValidator),
        );

        let err = dispatcher
            .dispatch(Format::Tab, Format::Json, tab_archive())
            .unwrap_err();
        let base_str = base.path().display().to_string();
        for message in err.messages() {
            assert!(
                !message.contains(&base_str),
                "scope path leaked: {message}"
            );
        }
    }

    #[test]
    fn test_validate_tab_locates_entry_point() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![]));

        let outcome = dispatcher.validate_tab(tab_archive()).unwrap();
        assert!(matches!(outcome, Outcome::Report(_)));
        assert_eq!(residual_dirs(base.path()), 0);

        // two investigation files: ambiguity surfaces as a server error
        let bytes = zip_from_entries(&[
            ("a/i_one.txt", b"X".as_slice()),
            ("b/i_two.txt", b"Y".as_slice()),
        ]);
        let err = dispatcher
            .validate_tab(InputPayload::new(bytes, MIME_ZIP))
            .unwrap_err();
        assert!(matches!(err, ServiceError::AmbiguousEntryPoint { matches: 2, .. }));
    }

    #[test]
    fn test_validate_json_mimetype_gate() {
        let (dispatcher, base) = dispatcher(FakeConverter::writing(vec![]));

        let err = dispatcher
            .validate_json(InputPayload::new(b"zipzip".to_vec(), MIME_ZIP))
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedMediaType { .. }));

        let outcome = dispatcher
            .validate_json(InputPayload::new(b"{}".to_vec(), MIME_JSON))
            .unwrap();
        assert!(matches!(outcome, Outcome::Report(_)));
        assert_eq!(residual_dirs(base.path()), 0);
    }

    #[test]
    fn test_concurrent_requests_are_isolated() {
        let base = tempdir().unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            Arena::new(base.path()),
            Arc::new(FakeConverter::writing(vec![("combined.json", b"{}")])),
            Arc::new(FakeValidator),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || {
                    dispatcher.dispatch(Format::Tab, Format::Json, tab_archive())
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(residual_dirs(base.path()), 0);
    }
}
