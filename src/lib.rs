/// Common error types
pub mod error;
/// Datatypes, attribute values, and dtype-dispatched arrays
pub mod types;
/// Cadence-scaled tolerance arithmetic over index values
pub mod cadence;
/// Product configuration model and validation
pub mod config;
/// Abstract granule reader/writer contracts
pub mod dataset;
/// One-shot inspection of input granules
pub mod granule;
/// Plan construction: nodes, sort, dedup, fill, bounds
pub mod plan;
/// Plan execution into the output granule
pub mod evaluate;
/// Global attribute reduction strategies
pub mod attributes;
/// The top-level aggregation call
pub mod aggregate;
/// In-memory granule store for tests and prototyping
pub mod memory;
/// Logging setup shared by the command-line tools
pub mod logging;
/// netCDF-backed granule store
#[cfg(feature = "netcdf")]
pub mod netcdf_io;

pub use aggregate::{aggregate, aggregate_with, AggregateOptions};
pub use config::Config;
pub use error::{AggError, AggResult};
pub use evaluate::CancelToken;
