// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - schema:     Flat record and record sequence types
// - decoder:    Tolerant scanners turning upstream text into records
// - sources:    Data source trait, implementations and registry
// - collector:  Polling workers, round barrier, aggregator, supervisor
// - presenter:  Console / CSV rendering of records and snapshots
// - config:     Configuration structs loaded from JSON
// - metrics:    Process-wide runtime counters
// - error:      Error taxonomy shared by the library
// - util:       Shared helper utilities (time, asset files)
//
pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod presenter;
pub mod schema;
pub mod sources;
pub mod util;

pub use error::{CollectorError, Result};
