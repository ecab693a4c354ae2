//! The assign table: ordered segment rows keyed by `model_id`.
//!
//! Built once by joining the drain, gauge, and cluster-label input tables,
//! then threaded through the pipeline stages by value. Also owns the flat
//! CSV persistence used for checkpoint/resume: the table is cached after
//! each stage, and because every stage is a pure function of its input, a
//! run interrupted mid-pipeline can restart from the last cached copy.

use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use crate::logging::{self, Stage};
use crate::model::{AssignError, AssignReason, SegmentRow};
use crate::schema::SCHEMA;

// ---------------------------------------------------------------------------
// Input row types
// ---------------------------------------------------------------------------

/// One row of the drain (network) table produced by GIS preprocessing.
#[derive(Debug, Clone, Deserialize)]
pub struct DrainRow {
    pub model_id: i64,
    pub downstream_id: Option<i64>,
    pub stream_order: u32,
    pub x: f64,
    pub y: f64,
}

/// One row of the gauge table: a segment co-located with an observation gauge.
#[derive(Debug, Clone, Deserialize)]
pub struct GaugeRow {
    pub model_id: i64,
    pub gauge_id: String,
}

/// One row of the cluster-label table produced by the external time-series
/// clustering stage.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterLabelRow {
    pub model_id: i64,
    pub fdc_cluster: Option<i64>,
    pub ma_cluster: Option<i64>,
}

// ---------------------------------------------------------------------------
// AssignTable
// ---------------------------------------------------------------------------

/// Ordered collection of segment rows with a uniqueness-checked id index.
///
/// Row order is the drain-table input order and is preserved through every
/// stage and through persistence; the distance fallback's tie-breaking
/// depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTable {
    rows: Vec<SegmentRow>,
    index: HashMap<i64, usize>,
}

impl AssignTable {
    /// Build a table from rows, rejecting duplicate `model_id`s.
    pub fn from_rows(rows: Vec<SegmentRow>) -> Result<Self, AssignError> {
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if index.insert(row.model_id, position).is_some() {
                return Err(AssignError::DuplicateModelId(row.model_id));
            }
        }
        Ok(AssignTable { rows, index })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SegmentRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut SegmentRow> {
        self.rows.iter_mut()
    }

    pub fn contains(&self, model_id: i64) -> bool {
        self.index.contains_key(&model_id)
    }

    pub fn get(&self, model_id: i64) -> Option<&SegmentRow> {
        self.index.get(&model_id).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, model_id: i64) -> Option<&mut SegmentRow> {
        match self.index.get(&model_id) {
            Some(&i) => Some(&mut self.rows[i]),
            None => None,
        }
    }

    /// Ids of all gauged segments in ascending `model_id` order.
    ///
    /// Propagation iterates gauges in this order so that equal-distance
    /// override ties resolve the same way on every run.
    pub fn gauged_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .rows
            .iter()
            .filter(|r| r.gauge_id.is_some())
            .map(|r| r.model_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Count of rows whose `reason` equals the given tag.
    pub fn count_reason(&self, reason: &AssignReason) -> usize {
        self.rows
            .iter()
            .filter(|r| r.reason.as_ref() == Some(reason))
            .count()
    }

    /// Outer-join the three input tables on `model_id` and initialize the
    /// assignment columns to null.
    ///
    /// The drain table defines the row set: a segment without network
    /// topology and coordinates cannot participate in any stage, so gauge
    /// or label rows that match no drain row are dropped with a warning
    /// rather than padded into half-empty rows.
    pub fn generate(
        drain: Vec<DrainRow>,
        gauges: Vec<GaugeRow>,
        labels: Vec<ClusterLabelRow>,
    ) -> Result<Self, AssignError> {
        let mut gauge_by_id: HashMap<i64, String> = HashMap::with_capacity(gauges.len());
        for gauge in gauges {
            if let Some(previous) = gauge_by_id.insert(gauge.model_id, gauge.gauge_id) {
                logging::warn(
                    Stage::Table,
                    Some(gauge.model_id),
                    &format!("multiple gauges on one segment, replacing '{}'", previous),
                );
            }
        }

        let mut labels_by_id: HashMap<i64, (Option<i64>, Option<i64>)> =
            HashMap::with_capacity(labels.len());
        for label in labels {
            labels_by_id.insert(label.model_id, (label.fdc_cluster, label.ma_cluster));
        }

        let mut rows = Vec::with_capacity(drain.len());
        for d in drain {
            let gauge_id = gauge_by_id.remove(&d.model_id);
            let (fdc_cluster, ma_cluster) =
                labels_by_id.remove(&d.model_id).unwrap_or((None, None));
            rows.push(SegmentRow {
                model_id: d.model_id,
                downstream_id: d.downstream_id,
                stream_order: d.stream_order,
                x: d.x,
                y: d.y,
                gauge_id,
                fdc_cluster,
                ma_cluster,
                assigned_model_id: None,
                assigned_gauge_id: None,
                reason: None,
            });
        }

        for orphan in gauge_by_id.keys() {
            logging::warn(
                Stage::Table,
                Some(*orphan),
                "gauge table references a model_id absent from the drain table",
            );
        }
        for orphan in labels_by_id.keys() {
            logging::warn(
                Stage::Table,
                Some(*orphan),
                "cluster labels reference a model_id absent from the drain table",
            );
        }

        AssignTable::from_rows(rows)
    }
}

// ---------------------------------------------------------------------------
// Working-directory paths
// ---------------------------------------------------------------------------

pub const GIS_INPUTS_DIR: &str = "gis_inputs";
pub const DRAIN_TABLE_FILE: &str = "drain_table.csv";
pub const GAUGE_TABLE_FILE: &str = "gauge_table.csv";
pub const CLUSTER_LABELS_FILE: &str = "cluster_labels.csv";
pub const ASSIGN_TABLE_FILE: &str = "assign_table.csv";

pub fn drain_table_path(workdir: &str) -> PathBuf {
    Path::new(workdir).join(GIS_INPUTS_DIR).join(DRAIN_TABLE_FILE)
}

pub fn gauge_table_path(workdir: &str) -> PathBuf {
    Path::new(workdir).join(GIS_INPUTS_DIR).join(GAUGE_TABLE_FILE)
}

pub fn cluster_labels_path(workdir: &str) -> PathBuf {
    Path::new(workdir).join(GIS_INPUTS_DIR).join(CLUSTER_LABELS_FILE)
}

pub fn assign_table_path(workdir: &str) -> PathBuf {
    Path::new(workdir).join(ASSIGN_TABLE_FILE)
}

// ---------------------------------------------------------------------------
// CSV persistence
// ---------------------------------------------------------------------------

fn check_headers(
    table_name: &str,
    headers: &csv::StringRecord,
    required: &[&str],
) -> Result<(), AssignError> {
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(AssignError::MissingColumn {
                table: table_name.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn read_rows<T, R>(reader: R, table_name: &str, required: &[&str]) -> Result<Vec<T>, Box<dyn Error>>
where
    T: for<'de> Deserialize<'de>,
    R: io::Read,
{
    let mut rdr = csv::Reader::from_reader(reader);
    check_headers(table_name, rdr.headers()?, required)?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn read_drain_table(workdir: &str) -> Result<Vec<DrainRow>, Box<dyn Error>> {
    let path = drain_table_path(workdir);
    read_rows(
        std::fs::File::open(&path)?,
        DRAIN_TABLE_FILE,
        &SCHEMA.drain_columns(),
    )
}

pub fn read_gauge_table(workdir: &str) -> Result<Vec<GaugeRow>, Box<dyn Error>> {
    let path = gauge_table_path(workdir);
    read_rows(
        std::fs::File::open(&path)?,
        GAUGE_TABLE_FILE,
        &SCHEMA.gauge_columns(),
    )
}

pub fn read_cluster_labels(workdir: &str) -> Result<Vec<ClusterLabelRow>, Box<dyn Error>> {
    let path = cluster_labels_path(workdir);
    read_rows(
        std::fs::File::open(&path)?,
        CLUSTER_LABELS_FILE,
        &SCHEMA.label_columns(),
    )
}

/// Read a cached assign table (checkpoint/resume entry point).
pub fn read_assign_table(workdir: &str) -> Result<AssignTable, Box<dyn Error>> {
    let path = assign_table_path(workdir);
    let rows: Vec<SegmentRow> = read_rows(
        std::fs::File::open(&path)?,
        ASSIGN_TABLE_FILE,
        &SCHEMA.assign_columns(),
    )?;
    Ok(AssignTable::from_rows(rows)?)
}

/// Persist the assign table to its conventional path.
///
/// A checkpoint side effect with no transactional guarantee across stages;
/// the caller decides when a snapshot is worth keeping.
pub fn write_assign_table(table: &AssignTable, workdir: &str) -> Result<(), Box<dyn Error>> {
    let path = assign_table_path(workdir);
    let mut wtr = csv::Writer::from_path(&path)?;
    for row in table.rows() {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    logging::debug(
        Stage::Table,
        None,
        &format!("cached {} rows to {}", table.len(), path.display()),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
