//! Gauge assignment service for hydrographic stream networks.
//!
//! Assigns a representative observation gauge to every segment of a stream
//! network so that simulated discharge on ungauged segments can later be
//! bias-corrected against a hydrologically or statistically similar gauge.
//! The engine runs once, in batch, over a static network snapshot:
//!
//! 1. `assign::assign_gauged` — gauge co-location,
//! 2. `assign::assign_propagation` — bounded same-order network
//!    propagation with an override policy,
//! 3. `assign::assign_by_distance` — nearest-neighbor fallback within
//!    `(fdc_cluster, stream_order)` groups.
//!
//! Clustering itself, GIS clipping, and the eventual bias correction are
//! external collaborators; this crate only honors their table schemas.

pub mod assign;
pub mod config;
pub mod logging;
pub mod model;
pub mod network;
pub mod schema;
pub mod table;
pub mod verify;
