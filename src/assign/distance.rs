//! Nearest-neighbor fallback for segments propagation could not reach.
//!
//! Works purely on the table state left by the earlier stages: no network
//! topology, only `(fdc_cluster, stream_order)` group membership and planar
//! distance. Coordinates must be in a projected equal-distance system;
//! geographic lat/lon would distort the metric and is a caller
//! precondition, not something corrected here.

use crate::logging::{self, Stage};
use crate::model::AssignReason;
use crate::table::AssignTable;

/// An already-assigned segment offering its gauge to group neighbors.
struct Candidate {
    x: f64,
    y: f64,
    assigned_model_id: Option<i64>,
    assigned_gauge_id: Option<String>,
}

/// Assign every still-unassigned labeled segment to the spatially nearest
/// already-assigned segment sharing its `fdc_cluster` and `stream_order`.
///
/// Clusters and stream orders are visited in ascending order and distance
/// ties break toward the first candidate in original table order, so the
/// result is reproducible. Availability is snapshotted per group: segments
/// assigned while a group is processed do not become candidates for the
/// rest of that group. A group with nothing available (or nothing to
/// assign) is skipped with a diagnostic, never an error.
pub fn assign_by_distance(table: &AssignTable) -> AssignTable {
    let mut out = table.clone();

    let unlabeled = out
        .rows()
        .iter()
        .filter(|r| r.fdc_cluster.is_none() && !r.is_assigned())
        .count();
    if unlabeled > 0 {
        logging::warn(
            Stage::Cluster,
            None,
            &format!(
                "{} unassigned segments carry no cluster label and are skipped",
                unlabeled
            ),
        );
    }

    let mut clusters: Vec<i64> = out.rows().iter().filter_map(|r| r.fdc_cluster).collect();
    clusters.sort_unstable();
    clusters.dedup();

    for cluster in clusters {
        let mut orders: Vec<u32> = out
            .rows()
            .iter()
            .filter(|r| r.fdc_cluster == Some(cluster))
            .map(|r| r.stream_order)
            .collect();
        orders.sort_unstable();
        orders.dedup();

        for order in orders {
            let mut to_assign: Vec<i64> = Vec::new();
            let mut available: Vec<Candidate> = Vec::new();
            for row in out.rows() {
                if row.fdc_cluster != Some(cluster) || row.stream_order != order {
                    continue;
                }
                if row.is_assigned() {
                    available.push(Candidate {
                        x: row.x,
                        y: row.y,
                        assigned_model_id: row.assigned_model_id,
                        assigned_gauge_id: row.assigned_gauge_id.clone(),
                    });
                } else {
                    to_assign.push(row.model_id);
                }
            }

            if to_assign.is_empty() {
                logging::debug(
                    Stage::Cluster,
                    None,
                    &format!(
                        "cluster {} at stream order {} is fully assigned",
                        cluster, order
                    ),
                );
                continue;
            }
            if available.is_empty() {
                logging::warn(
                    Stage::Cluster,
                    None,
                    &format!("unable to assign cluster {} at stream order {}", cluster, order),
                );
                continue;
            }

            for segment_id in to_assign {
                let Some((sx, sy)) = out.get(segment_id).map(|r| (r.x, r.y)) else {
                    continue;
                };
                // Strictly-less comparison keeps the first candidate in
                // table order on distance ties.
                let mut best: Option<(f64, usize)> = None;
                for (i, candidate) in available.iter().enumerate() {
                    let dx = candidate.x - sx;
                    let dy = candidate.y - sy;
                    let dist = (dx * dx + dy * dy).sqrt();
                    match best {
                        Some((best_dist, _)) if dist >= best_dist => {}
                        _ => best = Some((dist, i)),
                    }
                }
                if let Some((_, i)) = best {
                    let candidate = &available[i];
                    if let Some(row) = out.get_mut(segment_id) {
                        row.assigned_model_id = candidate.assigned_model_id;
                        row.assigned_gauge_id = candidate.assigned_gauge_id.clone();
                        row.reason = Some(AssignReason::ClusterDistance { cluster });
                    }
                }
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
