//! The assignment pipeline.
//!
//! Stage order is load-bearing, not incidental: propagation must see which
//! segments are already `gauged`, and the distance fallback only uses
//! already-assigned segments as candidates, so it must run after both.
//! Each stage is a pure function from a table snapshot to a new table; the
//! driver checkpoints the table after every stage so an interrupted run can
//! resume from the last cached copy.
//!
//! Submodules:
//! - `propagation` — distance-bounded override policy for one gauge.
//! - `distance` — grouped nearest-neighbor fallback.

use std::error::Error;

use serde::Serialize;

use crate::config::AssignConfig;
use crate::logging::{self, Stage};
use crate::model::{AssignError, AssignReason, Direction};
use crate::network::NetworkGraph;
use crate::table::{self, AssignTable};

pub mod distance;
pub mod propagation;

pub use distance::assign_by_distance;
pub use propagation::propagate_in_table;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Stage 1: segments co-located with a gauge are assigned to themselves.
///
/// Sets `reason = gauged`, which later stages treat as authoritative and
/// never overwrite.
pub fn assign_gauged(table: &AssignTable) -> AssignTable {
    let mut out = table.clone();
    for row in out.rows_mut() {
        if let Some(gauge_id) = row.gauge_id.clone() {
            row.assigned_model_id = Some(row.model_id);
            row.assigned_gauge_id = Some(gauge_id);
            row.reason = Some(AssignReason::Gauged);
        }
    }
    out
}

/// Stage 2: propagate each gauge along the network, same stream order only,
/// up to `max_prop` hops in each direction.
///
/// Gauges are processed in ascending `model_id` order, upstream pass before
/// downstream pass, so equal-distance override ties resolve identically on
/// every run.
pub fn assign_propagation(
    table: &AssignTable,
    graph: &NetworkGraph,
    max_prop: u32,
) -> Result<AssignTable, AssignError> {
    let mut out = table.clone();

    for gauged_id in table.gauged_ids() {
        let Some(gauge_id) = table.get(gauged_id).and_then(|r| r.gauge_id.clone()) else {
            continue;
        };

        let upstream = graph.walk_upstream(gauged_id, true)?;
        // The walk includes the gauged segment itself as its first element;
        // candidates start at hop 1.
        out = propagate_in_table(
            &out,
            gauged_id,
            &gauge_id,
            &upstream[1..],
            max_prop,
            Direction::Upstream,
        );

        let downstream = graph.walk_downstream(gauged_id, true)?;
        out = propagate_in_table(
            &out,
            gauged_id,
            &gauge_id,
            &downstream,
            max_prop,
            Direction::Downstream,
        );
    }

    Ok(out)
}

/// Stage 3: cluster matching on monthly-average similarity in addition to
/// flow-duration-curve similarity.
///
/// Extension point, currently a pass-through: the `ma_cluster` labels are
/// carried through the table but no assignment rule consumes them yet.
pub fn assign_by_monavg(table: &AssignTable) -> AssignTable {
    logging::debug(Stage::Cluster, None, "monthly-average stage is a pass-through");
    table.clone()
}

// Stage 4 is `distance::assign_by_distance`, re-exported above.

// ---------------------------------------------------------------------------
// Pipeline driver
// ---------------------------------------------------------------------------

/// Run the full pipeline over `table`, checkpointing after each stage.
///
/// The caller is expected to have run `verify::preflight` first; the walks
/// still carry their own cycle guards as a second line of defense.
pub fn run_pipeline(
    table: AssignTable,
    config: &AssignConfig,
) -> Result<AssignTable, Box<dyn Error>> {
    let graph = NetworkGraph::from_table(&table, config.outlet_sentinel);
    let total = table.len();

    let table = assign_gauged(&table);
    let gauged = table.count_reason(&AssignReason::Gauged);
    logging::info(
        Stage::Table,
        None,
        &format!("{}/{} segments carry a gauge", gauged, total),
    );
    table::write_assign_table(&table, &config.workdir)?;

    let table = assign_propagation(&table, &graph, config.max_prop)?;
    logging::log_stage_summary(
        Stage::Propagation,
        assigned_count(&table),
        total,
        unassigned_count(&table),
    );
    table::write_assign_table(&table, &config.workdir)?;

    let table = assign_by_monavg(&table);

    let table = assign_by_distance(&table);
    logging::log_stage_summary(
        Stage::Cluster,
        assigned_count(&table),
        total,
        unassigned_count(&table),
    );
    table::write_assign_table(&table, &config.workdir)?;

    Ok(table)
}

fn assigned_count(table: &AssignTable) -> usize {
    table.rows().iter().filter(|r| r.is_assigned()).count()
}

fn unassigned_count(table: &AssignTable) -> usize {
    table.len() - assigned_count(table)
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Per-reason assignment counts for the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentSummary {
    pub total: usize,
    pub gauged: usize,
    pub propagation: usize,
    pub cluster: usize,
    pub unassigned: usize,
}

pub fn summarize(table: &AssignTable) -> AssignmentSummary {
    let mut summary = AssignmentSummary {
        total: table.len(),
        gauged: 0,
        propagation: 0,
        cluster: 0,
        unassigned: 0,
    };
    for row in table.rows() {
        match row.reason {
            Some(AssignReason::Gauged) => summary.gauged += 1,
            Some(AssignReason::Propagation { .. }) => summary.propagation += 1,
            Some(AssignReason::ClusterDistance { .. }) => summary.cluster += 1,
            None => summary.unassigned += 1,
        }
    }
    summary
}

pub fn log_summary(summary: &AssignmentSummary) {
    let message = format!(
        "assignment complete: {} gauged, {} by propagation, {} by cluster distance, {} unassigned of {}",
        summary.gauged, summary.propagation, summary.cluster, summary.unassigned, summary.total
    );
    if summary.unassigned == 0 {
        logging::info(Stage::System, None, &message);
    } else {
        logging::warn(Stage::System, None, &message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

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

    fn with_gauge(mut row: SegmentRow, gauge_id: &str) -> SegmentRow {
        row.gauge_id = Some(gauge_id.to_string());
        row
    }

    fn table_of(rows: Vec<SegmentRow>) -> AssignTable {
        AssignTable::from_rows(rows).expect("fixture ids are unique")
    }

    fn graph_of(table: &AssignTable) -> NetworkGraph {
        NetworkGraph::from_table(table, DEFAULT_OUTLET_SENTINEL)
    }

    #[test]
    fn test_assign_gauged_fills_all_three_columns() {
        let table = table_of(vec![
            with_gauge(segment(1, 2, 1), "23187280"),
            segment(2, -1, 1),
        ]);
        let out = assign_gauged(&table);

        let one = out.get(1).unwrap();
        assert_eq!(one.assigned_model_id, Some(1));
        assert_eq!(one.assigned_gauge_id.as_deref(), Some("23187280"));
        assert_eq!(one.reason, Some(AssignReason::Gauged));

        let two = out.get(2).unwrap();
        assert!(!two.is_assigned());
        assert!(two.reason.is_none());
    }

    #[test]
    fn test_scenario_linear_chain_with_central_gauge() {
        // 1→2→3→4→5, gauge on 3, max_prop 5: two upstream hops and two
        // downstream hops, everything assigned to segment 3.
        let table = table_of(vec![
            segment(1, 2, 1),
            segment(2, 3, 1),
            with_gauge(segment(3, 4, 1), "G3"),
            segment(4, 5, 1),
            segment(5, -1, 1),
        ]);
        let graph = graph_of(&table);
        let out = assign_propagation(&assign_gauged(&table), &graph, 5).unwrap();

        let expect = [
            (3, "gauged"),
            (2, "propagation-upstream-1"),
            (1, "propagation-upstream-2"),
            (4, "propagation-downstream-1"),
            (5, "propagation-downstream-2"),
        ];
        for (id, tag) in expect {
            let row = out.get(id).unwrap();
            assert_eq!(
                row.reason.as_ref().map(|r| r.to_string()).as_deref(),
                Some(tag),
                "segment {} has the wrong reason",
                id
            );
            assert_eq!(row.assigned_model_id, Some(3));
            assert_eq!(row.assigned_gauge_id.as_deref(), Some("G3"));
        }
    }

    #[test]
    fn test_propagation_respects_max_prop() {
        let table = table_of(vec![
            segment(1, 2, 1),
            segment(2, 3, 1),
            with_gauge(segment(3, 4, 1), "G3"),
            segment(4, 5, 1),
            segment(5, -1, 1),
        ]);
        let graph = graph_of(&table);
        let out = assign_propagation(&assign_gauged(&table), &graph, 1).unwrap();

        assert!(out.get(2).unwrap().is_assigned());
        assert!(out.get(4).unwrap().is_assigned());
        assert!(!out.get(1).unwrap().is_assigned(), "hop 2 exceeds max_prop=1");
        assert!(!out.get(5).unwrap().is_assigned(), "hop 2 exceeds max_prop=1");
    }

    #[test]
    fn test_propagation_never_rewrites_gauged_segments() {
        // Two adjacent gauges: each propagation pass meets the other gauge
        // at hop 1 and must leave it alone.
        let table = table_of(vec![
            with_gauge(segment(1, 2, 1), "G1"),
            with_gauge(segment(2, -1, 1), "G2"),
        ]);
        let graph = graph_of(&table);
        let out = assign_propagation(&assign_gauged(&table), &graph, 5).unwrap();

        assert_eq!(out.get(1).unwrap().assigned_gauge_id.as_deref(), Some("G1"));
        assert_eq!(out.get(2).unwrap().assigned_gauge_id.as_deref(), Some("G2"));
        assert_eq!(out.get(1).unwrap().reason, Some(AssignReason::Gauged));
        assert_eq!(out.get(2).unwrap().reason, Some(AssignReason::Gauged));
    }

    #[test]
    fn test_later_gauge_wins_equal_distance_tie() {
        // 1 and 5 are gauged ends of a chain; 3 sits two hops from both.
        // Gauges run in ascending model_id order, so gauge 5's pass
        // overrides gauge 1's equal-distance claim on 3.
        let table = table_of(vec![
            with_gauge(segment(1, 2, 1), "G1"),
            segment(2, 3, 1),
            segment(3, 4, 1),
            segment(4, 5, 1),
            with_gauge(segment(5, -1, 1), "G5"),
        ]);
        let graph = graph_of(&table);
        let out = assign_propagation(&assign_gauged(&table), &graph, 5).unwrap();

        let three = out.get(3).unwrap();
        assert_eq!(three.assigned_model_id, Some(5));
        assert_eq!(
            three.reason.as_ref().map(|r| r.to_string()).as_deref(),
            Some("propagation-upstream-2"),
            "the override comes from gauge 5's upstream pass"
        );
    }

    #[test]
    fn test_monavg_stage_is_identity() {
        let table = table_of(vec![with_gauge(segment(1, -1, 1), "G1")]);
        let staged = assign_gauged(&table);
        assert_eq!(assign_by_monavg(&staged), staged);
    }

    #[test]
    fn test_summarize_counts_every_row_exactly_once() {
        let mut by_cluster = segment(4, -1, 1);
        by_cluster.assigned_model_id = Some(1);
        by_cluster.reason = Some(AssignReason::ClusterDistance { cluster: 2 });
        let mut by_prop = segment(3, 4, 1);
        by_prop.assigned_model_id = Some(1);
        by_prop.reason = Some(AssignReason::Propagation {
            direction: Direction::Downstream,
            distance: 1,
        });

        let table = assign_gauged(&table_of(vec![
            with_gauge(segment(1, 3, 1), "G1"),
            segment(2, 3, 1),
            by_prop,
            by_cluster,
        ]));
        let summary = summarize(&table);
        assert_eq!(
            summary,
            AssignmentSummary {
                total: 4,
                gauged: 1,
                propagation: 1,
                cluster: 1,
                unassigned: 1,
            }
        );
        assert_eq!(
            summary.total,
            summary.gauged + summary.propagation + summary.cluster + summary.unassigned
        );
    }
}
