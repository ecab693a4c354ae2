//! Preflight input verification.
//!
//! Checks the generated assign table against the preconditions the pipeline
//! assumes, before any assignment stage runs. Malformed input (non-finite
//! coordinates, nonpositive stream orders, a cyclic network) is fatal: the
//! pipeline refuses to partially execute. Benign oddities (dangling
//! downstream links, unlabeled segments) are reported as warnings and the
//! run continues.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::logging::{self, Stage};
use crate::model::AssignError;
use crate::network::NetworkGraph;
use crate::table::AssignTable;

pub const VALIDATION_REPORT_FILE: &str = "validation_report.json";

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub status: VerificationStatus,
    pub segment_count: usize,
    pub gauge_count: usize,
    pub labeled_count: usize,
    pub outlet_count: usize,
    /// Segments whose `downstream_id` is neither the sentinel nor a known
    /// row. The walks treat these like outlets; listed so the operator can
    /// spot a clipped or mismatched drain table.
    pub dangling_downstream: Vec<i64>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub model_id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

/// Outcome of `verify_table`: the serializable report plus the typed errors
/// behind each fatal finding, in discovery order.
#[derive(Debug)]
pub struct Preflight {
    pub report: ValidationReport,
    pub fatal: Vec<AssignError>,
}

// ============================================================================
// Verification
// ============================================================================

/// Run every precondition check and collect the results.
///
/// Never fails; callers that want fail-fast semantics use `preflight`.
pub fn verify_table(table: &AssignTable, outlet_sentinel: i64) -> Preflight {
    let mut findings = Vec::new();
    let mut fatal = Vec::new();

    let mut gauge_count = 0;
    let mut labeled_count = 0;
    let mut outlet_count = 0;
    let mut dangling_downstream = Vec::new();

    for row in table.rows() {
        if row.gauge_id.is_some() {
            gauge_count += 1;
        }
        if row.fdc_cluster.is_some() {
            labeled_count += 1;
        }
        if row.is_outlet(outlet_sentinel) {
            outlet_count += 1;
        } else if let Some(next) = row.downstream_id {
            if !table.contains(next) {
                dangling_downstream.push(row.model_id);
                findings.push(Finding {
                    severity: Severity::Warning,
                    model_id: Some(row.model_id),
                    message: format!("downstream_id {} matches no row; treated as outlet", next),
                });
            }
        }

        for (value, column) in [(row.x, "x"), (row.y, "y")] {
            if !value.is_finite() {
                let err = AssignError::InvalidCoordinate {
                    model_id: row.model_id,
                    column,
                };
                findings.push(Finding {
                    severity: Severity::Fatal,
                    model_id: Some(row.model_id),
                    message: err.to_string(),
                });
                fatal.push(err);
            }
        }

        if row.stream_order == 0 {
            let err = AssignError::InvalidStreamOrder {
                model_id: row.model_id,
            };
            findings.push(Finding {
                severity: Severity::Fatal,
                model_id: Some(row.model_id),
                message: err.to_string(),
            });
            fatal.push(err);
        }
    }

    let graph = NetworkGraph::from_table(table, outlet_sentinel);
    if let Err(err) = graph.check_acyclic() {
        let model_id = match &err {
            AssignError::CyclicNetwork(id) => Some(*id),
            _ => None,
        };
        findings.push(Finding {
            severity: Severity::Fatal,
            model_id,
            message: err.to_string(),
        });
        fatal.push(err);
    }

    let status = if !fatal.is_empty() {
        VerificationStatus::Failed
    } else if findings.is_empty() {
        VerificationStatus::Passed
    } else {
        VerificationStatus::PassedWithWarnings
    };

    Preflight {
        report: ValidationReport {
            timestamp: Utc::now().to_rfc3339(),
            status,
            segment_count: table.len(),
            gauge_count,
            labeled_count,
            outlet_count,
            dangling_downstream,
            findings,
        },
        fatal,
    }
}

/// Fail-fast wrapper used by the batch driver: logs every finding, then
/// returns the report, or the first fatal error if verification failed.
pub fn preflight(
    table: &AssignTable,
    outlet_sentinel: i64,
) -> Result<ValidationReport, AssignError> {
    let outcome = verify_table(table, outlet_sentinel);

    for finding in &outcome.report.findings {
        match finding.severity {
            Severity::Fatal => logging::error(Stage::Verify, finding.model_id, &finding.message),
            Severity::Warning => logging::warn(Stage::Verify, finding.model_id, &finding.message),
        }
    }
    logging::info(
        Stage::Verify,
        None,
        &format!(
            "{} segments, {} gauged, {} labeled, {} outlets",
            outcome.report.segment_count,
            outcome.report.gauge_count,
            outcome.report.labeled_count,
            outcome.report.outlet_count
        ),
    );

    match outcome.fatal.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(outcome.report),
    }
}

/// Write the report as pretty JSON next to the assign table.
pub fn write_report(report: &ValidationReport, workdir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let path = Path::new(workdir).join(VALIDATION_REPORT_FILE);
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_OUTLET_SENTINEL, SegmentRow};

    fn segment(model_id: i64, downstream_id: i64, stream_order: u32) -> SegmentRow {
        SegmentRow {
            model_id,
            downstream_id: Some(downstream_id),
            stream_order,
            x: 0.0,
            y: 0.0,
            gauge_id: None,
            fdc_cluster: None,
            ma_cluster: None,
            assigned_model_id: None,
            assigned_gauge_id: None,
            reason: None,
        }
    }

    fn table_of(rows: Vec<SegmentRow>) -> AssignTable {
        AssignTable::from_rows(rows).expect("fixture ids are unique")
    }

    #[test]
    fn test_clean_table_passes() {
        let table = table_of(vec![segment(1, 2, 1), segment(2, -1, 1)]);
        let outcome = verify_table(&table, DEFAULT_OUTLET_SENTINEL);
        assert_eq!(outcome.report.status, VerificationStatus::Passed);
        assert!(outcome.fatal.is_empty());
        assert_eq!(outcome.report.segment_count, 2);
        assert_eq!(outcome.report.outlet_count, 1);
    }

    #[test]
    fn test_nan_coordinate_is_fatal() {
        let mut bad = segment(1, -1, 1);
        bad.x = f64::NAN;
        let table = table_of(vec![bad]);
        let outcome = verify_table(&table, DEFAULT_OUTLET_SENTINEL);
        assert_eq!(outcome.report.status, VerificationStatus::Failed);
        assert_eq!(
            outcome.fatal,
            vec![AssignError::InvalidCoordinate {
                model_id: 1,
                column: "x"
            }]
        );
    }

    #[test]
    fn test_zero_stream_order_is_fatal() {
        let table = table_of(vec![segment(1, -1, 0)]);
        let outcome = verify_table(&table, DEFAULT_OUTLET_SENTINEL);
        assert_eq!(
            outcome.fatal,
            vec![AssignError::InvalidStreamOrder { model_id: 1 }]
        );
    }

    #[test]
    fn test_dangling_downstream_is_warning_not_fatal() {
        let table = table_of(vec![segment(1, 99, 1)]);
        let outcome = verify_table(&table, DEFAULT_OUTLET_SENTINEL);
        assert_eq!(
            outcome.report.status,
            VerificationStatus::PassedWithWarnings
        );
        assert_eq!(outcome.report.dangling_downstream, vec![1]);
        assert!(outcome.fatal.is_empty());
    }

    #[test]
    fn test_cyclic_network_is_fatal() {
        let table = table_of(vec![segment(1, 2, 1), segment(2, 1, 1)]);
        let outcome = verify_table(&table, DEFAULT_OUTLET_SENTINEL);
        assert_eq!(outcome.report.status, VerificationStatus::Failed);
        assert!(matches!(
            outcome.fatal.first(),
            Some(AssignError::CyclicNetwork(_))
        ));
    }

    #[test]
    fn test_preflight_fails_fast_on_first_fatal() {
        let table = table_of(vec![segment(1, 2, 1), segment(2, 1, 1)]);
        match preflight(&table, DEFAULT_OUTLET_SENTINEL) {
            Err(AssignError::CyclicNetwork(_)) => {}
            other => panic!("expected CyclicNetwork, got {:?}", other),
        }
    }

    #[test]
    fn test_preflight_returns_report_when_only_warnings() {
        let table = table_of(vec![segment(1, 99, 1)]);
        let report = preflight(&table, DEFAULT_OUTLET_SENTINEL).expect("warnings are not fatal");
        assert_eq!(report.status, VerificationStatus::PassedWithWarnings);
    }
}
