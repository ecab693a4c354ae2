/// SegmentRow, AssignReason, AssignError
/// core data structures and error handling
///
/// Core data types for the gauge assignment service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O and no table logic — only types, the assignment-reason
/// vocabulary, and the error enum.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Network sentinels
// ---------------------------------------------------------------------------

/// Default `downstream_id` value marking the terminal end of the network.
/// GIS preprocessing tools commonly emit -1 for the outlet; an empty field
/// is treated the same way. Overridable via `AssignConfig::outlet_sentinel`.
pub const DEFAULT_OUTLET_SENTINEL: i64 = -1;

/// Default number of stream segments a gauge propagates up/downstream.
pub const DEFAULT_MAX_PROP: u32 = 5;

// ---------------------------------------------------------------------------
// Assignment reason vocabulary
// ---------------------------------------------------------------------------

/// Direction of a propagation pass along the drainage network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upstream,
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

/// Provenance tag explaining why a segment received its assigned gauge.
///
/// Serialized as the closed string vocabulary consumed by the downstream
/// GIS-clipping and bias-correction stages:
///   `gauged`, `propagation-<direction>-<d>`, `cluster-<c>-dist`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignReason {
    /// The segment is co-located with an observation gauge.
    Gauged,
    /// Assigned by network propagation from a gauged segment `distance`
    /// hops away (same stream order only).
    Propagation { direction: Direction, distance: u32 },
    /// Assigned by the nearest-neighbor fallback within the segment's
    /// `(fdc_cluster, stream_order)` group.
    ClusterDistance { cluster: i64 },
}

impl fmt::Display for AssignReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignReason::Gauged => write!(f, "gauged"),
            AssignReason::Propagation { direction, distance } => {
                write!(f, "propagation-{}-{}", direction, distance)
            }
            AssignReason::ClusterDistance { cluster } => {
                write!(f, "cluster-{}-dist", cluster)
            }
        }
    }
}

impl FromStr for AssignReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "gauged" {
            return Ok(AssignReason::Gauged);
        }
        if let Some(rest) = s.strip_prefix("propagation-") {
            let (direction, distance) = match rest.split_once('-') {
                Some(("upstream", d)) => (Direction::Upstream, d),
                Some(("downstream", d)) => (Direction::Downstream, d),
                _ => return Err(format!("unrecognized propagation reason: '{}'", s)),
            };
            let distance: u32 = distance
                .parse()
                .map_err(|_| format!("bad propagation distance in reason: '{}'", s))?;
            if distance == 0 {
                return Err(format!("propagation distance must be >= 1: '{}'", s));
            }
            return Ok(AssignReason::Propagation { direction, distance });
        }
        if let Some(rest) = s.strip_prefix("cluster-") {
            if let Some(cluster) = rest.strip_suffix("-dist") {
                let cluster: i64 = cluster
                    .parse()
                    .map_err(|_| format!("bad cluster number in reason: '{}'", s))?;
                return Ok(AssignReason::ClusterDistance { cluster });
            }
        }
        Err(format!("unrecognized assignment reason: '{}'", s))
    }
}

// Reasons live in one CSV column, so they serialize as their display form
// rather than as a serde-derived structure.
impl Serialize for AssignReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssignReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReasonVisitor;

        impl Visitor<'_> for ReasonVisitor {
            type Value = AssignReason;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an assignment reason tag")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                AssignReason::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ReasonVisitor)
    }
}

// ---------------------------------------------------------------------------
// Segment rows
// ---------------------------------------------------------------------------

/// One row of the assign table: a network segment plus its embedded,
/// mutable assignment record.
///
/// The first eight fields come from the outer join of the drain, gauge, and
/// cluster-label input tables; the last three are initialized to null and
/// filled in by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    pub model_id: i64,
    /// Empty field or the outlet sentinel marks the network outlet.
    pub downstream_id: Option<i64>,
    pub stream_order: u32,
    /// Projected planar coordinates. Geographic lat/lon would distort the
    /// distance-fallback metric and is a caller precondition violation.
    pub x: f64,
    pub y: f64,
    pub gauge_id: Option<String>,
    pub fdc_cluster: Option<i64>,
    pub ma_cluster: Option<i64>,
    pub assigned_model_id: Option<i64>,
    pub assigned_gauge_id: Option<String>,
    pub reason: Option<AssignReason>,
}

impl SegmentRow {
    /// True if this segment terminates the network under the given sentinel.
    pub fn is_outlet(&self, outlet_sentinel: i64) -> bool {
        match self.downstream_id {
            None => true,
            Some(id) => id == outlet_sentinel,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_model_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while building or traversing the assign table.
///
/// All variants are fatal precondition failures: the pipeline refuses to
/// partially execute against invalid input.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignError {
    /// Two rows share a `model_id`; the table key must be unique.
    DuplicateModelId(i64),
    /// A traversal was started from an id with no matching row.
    UnknownModelId(i64),
    /// Following downstream links revisited this id. The network restricted
    /// to the relevant order filter must be acyclic.
    CyclicNetwork(i64),
    /// A coordinate parsed but is not a finite number.
    InvalidCoordinate { model_id: i64, column: &'static str },
    /// Stream order must be a positive integer.
    InvalidStreamOrder { model_id: i64 },
    /// An input table is missing a required column.
    MissingColumn { table: String, column: String },
}

impl fmt::Display for AssignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignError::DuplicateModelId(id) => {
                write!(f, "duplicate model_id in table: {}", id)
            }
            AssignError::UnknownModelId(id) => {
                write!(f, "no segment with model_id {}", id)
            }
            AssignError::CyclicNetwork(id) => {
                write!(f, "cyclic network detected at model_id {}", id)
            }
            AssignError::InvalidCoordinate { model_id, column } => {
                write!(f, "non-finite {} coordinate for model_id {}", column, model_id)
            }
            AssignError::InvalidStreamOrder { model_id } => {
                write!(f, "stream_order must be positive for model_id {}", model_id)
            }
            AssignError::MissingColumn { table, column } => {
                write!(f, "{} is missing required column '{}'", table, column)
            }
        }
    }
}

impl std::error::Error for AssignError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
