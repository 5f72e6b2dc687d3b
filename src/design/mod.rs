//! Study-design model and combinatorial limits checking.
//!
//! [`validate`] is a pure function that inspects a [`StudyDesignConfig`]
//! and reports whether it exceeds the configured [`ValidationLimits`]. It
//! exists to reject pathologically large designs cheaply, before the
//! expensive external generation step runs. It never touches storage and
//! never invokes converters.
//!
//! # Checks
//!
//! 1. Arm count against `max_arms`
//! 2. Per-arm subject count against `max_subjects_per_arm`
//! 3. `count * max_arm_size` for every sample-plan count against
//!    `max_sample_size` (single flag, not per-occurrence)
//! 4. Per selected assay type, the combination count of its workflow
//!    against `max_assay_combinations`
//!
//! The combination count of a workflow is the maximum, over nodes carrying
//! the `#replicates` marker, of the product of value-list lengths across the
//! node's non-marker fields. Nodes without the marker are ignored entirely.

pub mod generate;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker key flagging a workflow node as replicated.
pub const REPLICATE_MARKER: &str = "#replicates";

// =============================================================================
// Study design model
// =============================================================================

/// The subset of a study-design configuration the limits engine inspects.
///
/// Configurations carry many more keys (elements, events, treatment plans);
/// unknown keys are ignored, and every inspected section defaults to empty
/// so partial configs validate as zero-impact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDesignConfig {
    /// Ordered study arms.
    #[serde(default)]
    pub arms: Vec<Arm>,

    /// Per-arm, per-sample-type collection counts.
    #[serde(default)]
    pub sample_plan: Vec<SamplePlanItem>,

    /// Assay workflows keyed by assay name.
    #[serde(default)]
    pub assay_configs: Vec<AssayConfig>,

    /// Which assay types are actually selected for generation.
    #[serde(default)]
    pub selected_assay_types: HashMap<String, bool>,
}

/// A named branch of the study with a subject count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arm {
    pub name: String,
    pub size: u64,
}

/// Planned sample counts for one sample type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePlanItem {
    pub sample_type: String,
    /// Arm name to per-event sample counts; `null` entries mean
    /// "no collection at this event".
    #[serde(default)]
    pub per_arm_sample_counts: HashMap<String, Vec<Option<u64>>>,
}

/// One assay type and its workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssayConfig {
    pub name: String,
    #[serde(default)]
    pub workflow: Vec<WorkflowNode>,
}

/// A workflow node: `[name, parameters]` pair as serialized in design
/// configurations. A node carrying the [`REPLICATE_MARKER`] key contributes
/// to the assay combination count; its other fields are parameter objects
/// whose `values` arrays enumerate the options to combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode(pub String, pub Map<String, Value>);

impl WorkflowNode {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.1
    }

    fn is_replicated(&self) -> bool {
        self.1.contains_key(REPLICATE_MARKER)
    }
}

// =============================================================================
// Limits
// =============================================================================

/// Combinatorial ceilings, read-only after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLimits {
    pub max_arms: u64,
    pub max_subjects_per_arm: u64,
    pub max_sample_size: u64,
    pub max_assay_combinations: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_arms: 20,
            max_subjects_per_arm: 1000,
            max_sample_size: 100_000,
            max_assay_combinations: 1024,
        }
    }
}

// =============================================================================
// Validation report
// =============================================================================

/// Violations keyed by category; an empty report means "valid" and is
/// never returned ([`validate`] yields `None` instead).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Too many arms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arms: Option<String>,

    /// Some arm exceeds the per-arm subject ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Some sample count, scaled by the largest arm, exceeds the total
    /// sample ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<String>,

    /// Per-assay combination-count violations.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub assay_plan: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.arms.is_none()
            && self.size.is_none()
            && self.sample_size.is_none()
            && self.assay_plan.is_empty()
    }
}

// =============================================================================
// Validation engine
// =============================================================================

/// Check a design configuration against the limits.
///
/// Returns `None` when the design is within every limit, otherwise the
/// populated report. Pure and deterministic; arms referenced by the sample
/// plan but absent from `arms` are tolerated as zero-impact.
pub fn validate(config: &StudyDesignConfig, limits: &ValidationLimits) -> Option<ValidationReport> {
    let mut report = ValidationReport::default();

    if config.arms.len() as u64 > limits.max_arms {
        report.arms = Some(format!(
            "too many arms: {} (max {})",
            config.arms.len(),
            limits.max_arms
        ));
    }

    if let Some(arm) = config
        .arms
        .iter()
        .find(|arm| arm.size > limits.max_subjects_per_arm)
    {
        report.size = Some(format!(
            "arm '{}' has {} subjects (max {})",
            arm.name, arm.size, limits.max_subjects_per_arm
        ));
    }

    let max_arm_size = config.arms.iter().map(|arm| arm.size).max().unwrap_or(0);
    'sample_scan: for item in &config.sample_plan {
        for counts in item.per_arm_sample_counts.values() {
            for count in counts.iter().flatten() {
                let projected = count.saturating_mul(max_arm_size);
                if projected > limits.max_sample_size {
                    report.sample_size = Some(format!(
                        "projected sample size {} for sample type '{}' exceeds max {}",
                        projected, item.sample_type, limits.max_sample_size
                    ));
                    break 'sample_scan;
                }
            }
        }
    }

    for assay in &config.assay_configs {
        let selected = config
            .selected_assay_types
            .get(&assay.name)
            .copied()
            .unwrap_or(false);
        if !selected {
            continue;
        }
        let combinations = combination_count(&assay.workflow);
        if combinations > limits.max_assay_combinations {
            report.assay_plan.insert(
                assay.name.clone(),
                format!(
                    "{} parameter combinations (max {})",
                    combinations, limits.max_assay_combinations
                ),
            );
        }
    }

    if report.is_empty() {
        None
    } else {
        Some(report)
    }
}

/// Maximum product of value-list lengths across replicate-marked nodes.
///
/// Nodes without the replicate marker are ignored. The product saturates:
/// value-list lengths come straight from the request, and a count pinned
/// at `u64::MAX` still trips the limit instead of wrapping past it.
fn combination_count(workflow: &[WorkflowNode]) -> u64 {
    workflow
        .iter()
        .filter(|node| node.is_replicated())
        .map(|node| {
            node.params()
                .iter()
                .filter(|(key, _)| key.as_str() != REPLICATE_MARKER)
                .map(|(_, value)| field_cardinality(value))
                .fold(1u64, u64::saturating_mul)
        })
        .max()
        .unwrap_or(0)
}

/// Number of options a parameter field contributes: the length of its
/// `values` array when present, otherwise 1.
fn field_cardinality(field: &Value) -> u64 {
    field
        .get("values")
        .and_then(Value::as_array)
        .map(|values| values.len() as u64)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> ValidationLimits {
        ValidationLimits {
            max_arms: 4,
            max_subjects_per_arm: 10,
            max_sample_size: 20,
            max_assay_combinations: 10,
        }
    }

    fn arm(name: &str, size: u64) -> Arm {
        Arm {
            name: name.into(),
            size,
        }
    }

    fn replicated_node(list_lengths: &[usize]) -> WorkflowNode {
        let mut params = Map::new();
        params.insert(REPLICATE_MARKER.into(), json!({"value": 2}));
        for (i, len) in list_lengths.iter().enumerate() {
            let values: Vec<Value> = (0..*len).map(|v| json!(v)).collect();
            params.insert(format!("param{i}"), json!({ "values": values }));
        }
        WorkflowNode("extraction".into(), params)
    }

    #[test]
    fn test_within_limits_is_valid() {
        let config = StudyDesignConfig {
            arms: vec![arm("A", 5), arm("B", 6)],
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);
    }

    #[test]
    fn test_validate_is_deterministic() {
        let config = StudyDesignConfig {
            arms: (0..6).map(|i| arm(&format!("arm{i}"), 3)).collect(),
            ..Default::default()
        };
        let first = validate(&config, &limits());
        let second = validate(&config, &limits());
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn test_arm_count_boundary() {
        let at_limit = StudyDesignConfig {
            arms: (0..4).map(|i| arm(&format!("arm{i}"), 1)).collect(),
            ..Default::default()
        };
        assert_eq!(validate(&at_limit, &limits()), None);

        let over = StudyDesignConfig {
            arms: (0..5).map(|i| arm(&format!("arm{i}"), 1)).collect(),
            ..Default::default()
        };
        let report = validate(&over, &limits()).unwrap();
        let message = report.arms.unwrap();
        assert!(message.contains('5'), "actual count in message: {message}");
        assert!(message.contains('4'), "limit in message: {message}");
    }

    #[test]
    fn test_arm_size_check() {
        let config = StudyDesignConfig {
            arms: vec![arm("A", 5)],
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);

        let config = StudyDesignConfig {
            arms: vec![arm("A", 11)],
            ..Default::default()
        };
        let report = validate(&config, &limits()).unwrap();
        assert!(report.size.is_some());
    }

    #[test]
    fn test_sample_size_uses_largest_arm() {
        // max_arm_size = 6; 3 * 6 = 18 <= 20 passes, 4 * 6 = 24 > 20 fails
        let mut counts = HashMap::new();
        counts.insert("A".to_string(), vec![Some(3), None]);
        let config = StudyDesignConfig {
            arms: vec![arm("A", 5), arm("B", 6)],
            sample_plan: vec![SamplePlanItem {
                sample_type: "blood".into(),
                per_arm_sample_counts: counts.clone(),
            }],
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);

        counts.insert("A".to_string(), vec![Some(4)]);
        let config = StudyDesignConfig {
            arms: vec![arm("A", 5), arm("B", 6)],
            sample_plan: vec![SamplePlanItem {
                sample_type: "blood".into(),
                per_arm_sample_counts: counts,
            }],
            ..Default::default()
        };
        let report = validate(&config, &limits()).unwrap();
        assert!(report.sample_size.is_some());
    }

    #[test]
    fn test_sample_plan_missing_arm_is_zero_impact() {
        let mut counts = HashMap::new();
        counts.insert("no-such-arm".to_string(), vec![Some(3)]);
        let config = StudyDesignConfig {
            // no arms at all: max_arm_size = 0, so every product is 0
            sample_plan: vec![SamplePlanItem {
                sample_type: "blood".into(),
                per_arm_sample_counts: counts,
            }],
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);
    }

    #[test]
    fn test_assay_combination_count() {
        // 3 * 4 = 12 > 10 for the selected assay
        let config = StudyDesignConfig {
            arms: vec![arm("A", 1)],
            assay_configs: vec![AssayConfig {
                name: "mass spectrometry".into(),
                workflow: vec![replicated_node(&[3, 4])],
            }],
            selected_assay_types: HashMap::from([("mass spectrometry".to_string(), true)]),
            ..Default::default()
        };
        let report = validate(&config, &limits()).unwrap();
        let message = report.assay_plan.get("mass spectrometry").unwrap();
        assert!(message.contains("12"), "combination count in: {message}");
    }

    #[test]
    fn test_unselected_assay_is_ignored() {
        let config = StudyDesignConfig {
            arms: vec![arm("A", 1)],
            assay_configs: vec![AssayConfig {
                name: "nmr".into(),
                workflow: vec![replicated_node(&[10, 10])],
            }],
            selected_assay_types: HashMap::from([("nmr".to_string(), false)]),
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);
    }

    #[test]
    fn test_nodes_without_marker_are_ignored() {
        let mut params = Map::new();
        params.insert("huge".into(), json!({"values": (0..100).collect::<Vec<i64>>()}));
        let config = StudyDesignConfig {
            arms: vec![arm("A", 1)],
            assay_configs: vec![AssayConfig {
                name: "nmr".into(),
                workflow: vec![WorkflowNode("extraction".into(), params)],
            }],
            selected_assay_types: HashMap::from([("nmr".to_string(), true)]),
            ..Default::default()
        };
        assert_eq!(validate(&config, &limits()), None);
    }

    #[test]
    fn test_huge_combination_product_saturates() {
        // 2^64 worth of combinations must saturate and fail the limit,
        // not wrap around to something small enough to pass.
        let config = StudyDesignConfig {
            arms: vec![arm("A", 1)],
            assay_configs: vec![AssayConfig {
                name: "ms".into(),
                workflow: vec![replicated_node(&[2; 64])],
            }],
            selected_assay_types: HashMap::from([("ms".to_string(), true)]),
            ..Default::default()
        };
        let report = validate(&config, &limits()).unwrap();
        let message = report.assay_plan.get("ms").unwrap();
        assert!(
            message.contains(&u64::MAX.to_string()),
            "saturated count in message: {message}"
        );
    }

    #[test]
    fn test_max_over_nodes_in_workflow() {
        let config = StudyDesignConfig {
            arms: vec![arm("A", 1)],
            assay_configs: vec![AssayConfig {
                name: "ms".into(),
                workflow: vec![replicated_node(&[2]), replicated_node(&[3, 4])],
            }],
            selected_assay_types: HashMap::from([("ms".to_string(), true)]),
            ..Default::default()
        };
        let report = validate(&config, &limits()).unwrap();
        assert!(report.assay_plan.get("ms").unwrap().contains("12"));
    }

    #[test]
    fn test_config_deserializes_from_camel_case() {
        let config: StudyDesignConfig = serde_json::from_value(json!({
            "arms": [{"name": "control", "size": 10}],
            "samplePlan": [{
                "sampleType": "blood",
                "perArmSampleCounts": {"control": [1, null, 2]}
            }],
            "assayConfigs": [{
                "name": "ms",
                "workflow": [
                    ["extraction", {"#replicates": {"value": 2},
                                    "solvent": {"values": ["a", "b"]}}]
                ]
            }],
            "selectedAssayTypes": {"ms": true},
            "subjectType": "ignored extra key"
        }))
        .unwrap();

        assert_eq!(config.arms.len(), 1);
        assert_eq!(config.sample_plan[0].per_arm_sample_counts["control"].len(), 3);
        assert_eq!(config.assay_configs[0].workflow[0].name(), "extraction");
        assert!(config.assay_configs[0].workflow[0].is_replicated());
    }

    #[test]
    fn test_report_serialization_shape() {
        let mut report = ValidationReport::default();
        report.sample_size = Some("too big".into());
        report
            .assay_plan
            .insert("ms".into(), "too many combinations".into());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["sampleSize"], "too big");
        assert_eq!(value["assayPlan"]["ms"], "too many combinations");
        assert!(value.get("arms").is_none());
    }
}
