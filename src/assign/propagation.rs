//! Distance-bounded propagation from a single gauged segment.
//!
//! The candidate sequence must be hop-ordered (hop distance = 1-based
//! position) and must not contain the gauged segment itself; both are
//! guaranteed by the traversal contract in `network`.

use crate::logging::{self, Stage};
use crate::model::{AssignReason, Direction};
use crate::table::AssignTable;

/// Propagate `gauged_stream`'s gauge to connected segments within
/// `max_prop` hops, honoring override priority:
///
/// - an unassigned candidate takes the new assignment;
/// - a `gauged` candidate is authoritative and never touched;
/// - a candidate already reached by propagation is overwritten only when
///   the new gauge is at least as close as the old one (`d_prev >= d`);
/// - candidates beyond `max_prop` are skipped regardless of state.
///
/// Returns a new table; the input snapshot is left intact.
pub fn propagate_in_table(
    table: &AssignTable,
    gauged_stream: i64,
    gauge_id: &str,
    connected_segments: &[i64],
    max_prop: u32,
    direction: Direction,
) -> AssignTable {
    let mut out = table.clone();

    for (index, &segment_id) in connected_segments.iter().enumerate() {
        let distance = index as u32 + 1;
        if distance > max_prop {
            // Hop ordering makes "skip remaining" equivalent to stopping
            // the walk here; keep scanning so a reordering bug upstream
            // would surface in tests instead of silently truncating.
            continue;
        }
        let Some(row) = out.get_mut(segment_id) else {
            continue;
        };

        let current = row.reason.clone();
        match current {
            None => {
                row.assigned_model_id = Some(gauged_stream);
                row.assigned_gauge_id = Some(gauge_id.to_string());
                row.reason = Some(AssignReason::Propagation {
                    direction,
                    distance,
                });
                logging::debug(
                    Stage::Propagation,
                    Some(segment_id),
                    &format!(
                        "assigned gauged stream {} to ungauged {} segment at hop {}",
                        gauged_stream, direction, distance
                    ),
                );
            }
            Some(AssignReason::Gauged) => {
                // Gauged status is authoritative and permanent.
            }
            Some(AssignReason::Propagation {
                distance: previous, ..
            }) if previous >= distance => {
                row.assigned_model_id = Some(gauged_stream);
                row.assigned_gauge_id = Some(gauge_id.to_string());
                row.reason = Some(AssignReason::Propagation {
                    direction,
                    distance,
                });
                logging::debug(
                    Stage::Propagation,
                    Some(segment_id),
                    &format!(
                        "reassigned gauged stream {} over a farther gauge at hop {}",
                        gauged_stream, distance
                    ),
                );
            }
            Some(_) => {
                // Existing assignment is strictly closer (or a later-stage
                // tag, which never occurs before this stage): leave it.
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentRow;

    fn segment(model_id: i64) -> SegmentRow {
        SegmentRow {
            model_id,
            downstream_id: None,
            stream_order: 1,
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

    fn gauged_segment(model_id: i64, gauge_id: &str) -> SegmentRow {
        let mut row = segment(model_id);
        row.gauge_id = Some(gauge_id.to_string());
        row.assigned_model_id = Some(model_id);
        row.assigned_gauge_id = Some(gauge_id.to_string());
        row.reason = Some(AssignReason::Gauged);
        row
    }

    fn table_of(rows: Vec<SegmentRow>) -> AssignTable {
        AssignTable::from_rows(rows).expect("fixture ids are unique")
    }

    fn propagation(direction: Direction, distance: u32) -> AssignReason {
        AssignReason::Propagation {
            direction,
            distance,
        }
    }

    // --- Fresh assignment ---------------------------------------------------

    #[test]
    fn test_assigns_unassigned_candidates_with_hop_distances() {
        let table = table_of(vec![gauged_segment(3, "G3"), segment(4), segment(5)]);
        let out = propagate_in_table(&table, 3, "G3", &[4, 5], 5, Direction::Downstream);

        let four = out.get(4).unwrap();
        assert_eq!(four.assigned_model_id, Some(3));
        assert_eq!(four.assigned_gauge_id.as_deref(), Some("G3"));
        assert_eq!(four.reason, Some(propagation(Direction::Downstream, 1)));

        let five = out.get(5).unwrap();
        assert_eq!(five.reason, Some(propagation(Direction::Downstream, 2)));
    }

    #[test]
    fn test_empty_candidate_sequence_is_a_no_op() {
        let table = table_of(vec![gauged_segment(3, "G3")]);
        let out = propagate_in_table(&table, 3, "G3", &[], 5, Direction::Upstream);
        assert_eq!(out, table);
    }

    #[test]
    fn test_candidates_beyond_max_prop_stay_unassigned() {
        let table = table_of(vec![
            gauged_segment(1, "G1"),
            segment(2),
            segment(3),
            segment(4),
        ]);
        let out = propagate_in_table(&table, 1, "G1", &[2, 3, 4], 2, Direction::Upstream);
        assert!(out.get(2).unwrap().is_assigned());
        assert!(out.get(3).unwrap().is_assigned());
        assert!(
            !out.get(4).unwrap().is_assigned(),
            "hop 3 exceeds max_prop=2 and must be skipped"
        );
    }

    // --- Override policy ----------------------------------------------------

    #[test]
    fn test_never_touches_gauged_candidates() {
        let table = table_of(vec![gauged_segment(1, "G1"), gauged_segment(2, "G2")]);
        let out = propagate_in_table(&table, 1, "G1", &[2], 5, Direction::Downstream);
        let two = out.get(2).unwrap();
        assert_eq!(two.assigned_model_id, Some(2));
        assert_eq!(two.assigned_gauge_id.as_deref(), Some("G2"));
        assert_eq!(two.reason, Some(AssignReason::Gauged));
    }

    #[test]
    fn test_overrides_equal_distance_assignment() {
        // Segment 5 was reached at hop 2 by gauge 1; gauge 9 also reaches
        // it at hop 2. The later gauge wins the tie.
        let mut reached = segment(5);
        reached.assigned_model_id = Some(1);
        reached.assigned_gauge_id = Some("G1".to_string());
        reached.reason = Some(propagation(Direction::Upstream, 2));

        let table = table_of(vec![gauged_segment(9, "G9"), reached, segment(4)]);
        let out = propagate_in_table(&table, 9, "G9", &[4, 5], 5, Direction::Downstream);

        let five = out.get(5).unwrap();
        assert_eq!(five.assigned_model_id, Some(9));
        assert_eq!(five.assigned_gauge_id.as_deref(), Some("G9"));
        assert_eq!(five.reason, Some(propagation(Direction::Downstream, 2)));
    }

    #[test]
    fn test_overrides_farther_assignment_with_closer_gauge() {
        let mut reached = segment(5);
        reached.assigned_model_id = Some(1);
        reached.assigned_gauge_id = Some("G1".to_string());
        reached.reason = Some(propagation(Direction::Downstream, 4));

        let table = table_of(vec![gauged_segment(9, "G9"), reached]);
        let out = propagate_in_table(&table, 9, "G9", &[5], 5, Direction::Upstream);

        assert_eq!(
            out.get(5).unwrap().reason,
            Some(propagation(Direction::Upstream, 1))
        );
    }

    #[test]
    fn test_keeps_strictly_closer_existing_assignment() {
        let mut reached = segment(5);
        reached.assigned_model_id = Some(1);
        reached.assigned_gauge_id = Some("G1".to_string());
        reached.reason = Some(propagation(Direction::Downstream, 1));

        let table = table_of(vec![gauged_segment(9, "G9"), reached, segment(4)]);
        let out = propagate_in_table(&table, 9, "G9", &[4, 5], 5, Direction::Upstream);

        let five = out.get(5).unwrap();
        assert_eq!(five.assigned_model_id, Some(1), "closer gauge must be kept");
        assert_eq!(five.reason, Some(propagation(Direction::Downstream, 1)));
    }

    #[test]
    fn test_override_reason_carries_direction_of_overriding_pass() {
        // An upstream pass that overrides must tag "upstream", not echo the
        // direction of the assignment it replaced.
        let mut reached = segment(5);
        reached.assigned_model_id = Some(1);
        reached.assigned_gauge_id = Some("G1".to_string());
        reached.reason = Some(propagation(Direction::Downstream, 3));

        let table = table_of(vec![gauged_segment(9, "G9"), reached]);
        let out = propagate_in_table(&table, 9, "G9", &[5], 5, Direction::Upstream);

        assert_eq!(
            out.get(5).unwrap().reason,
            Some(propagation(Direction::Upstream, 1))
        );
    }

    #[test]
    fn test_input_snapshot_is_not_mutated() {
        let table = table_of(vec![gauged_segment(3, "G3"), segment(4)]);
        let before = table.clone();
        let _ = propagate_in_table(&table, 3, "G3", &[4], 5, Direction::Downstream);
        assert_eq!(table, before);
    }
}
