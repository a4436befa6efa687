//! Abstract granule reader and writer contracts.
//!
//! The engine never touches a netCDF library directly; it consumes these
//! traits. The `netcdf`-backed implementation lives in
//! [`crate::netcdf_io`] (behind the `netcdf` feature) and an in-memory
//! implementation for tests and prototyping lives in [`crate::memory`].
use std::ops::Range;
use std::path::Path;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::AggResult;
use crate::types::{AttrValue, DataType, NcArray};

/// One dimension of a granule as reported by its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimSchema {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

/// One variable of a granule as reported by its file.
#[derive(Debug, Clone, PartialEq)]
pub struct VarSchema {
    pub name: String,
    pub dimensions: Vec<String>,
    pub datatype: DataType,
    pub attributes: IndexMap<String, AttrValue>,
}

/// Everything a single inspection pass needs to know about a granule's
/// structure. No bulk variable data is carried here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSchema {
    pub dimensions: Vec<DimSchema>,
    pub variables: Vec<VarSchema>,
    pub global_attributes: IndexMap<String, AttrValue>,
}

impl SourceSchema {
    pub fn dimension(&self, name: &str) -> Option<&DimSchema> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VarSchema> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Read-only access to one granule. Implementations must be cheap to
/// open: the evaluator opens a granule once per (variable, node) visit
/// and drops the handle immediately after.
pub trait GranuleReader {
    /// The granule's dimensions, variables, and global attributes.
    fn schema(&self) -> AggResult<SourceSchema>;

    /// Project an index variable to 1-D values: the unlimited (first)
    /// dimension runs free, every other dimension of the variable is
    /// pinned to the index from `other_dim_indices` (default 0).
    fn read_index(
        &self,
        variable: &str,
        other_dim_indices: &IndexMap<String, usize>,
    ) -> AggResult<Vec<f64>>;

    /// Read a hyperslab of a variable, one index range per dimension.
    fn read_slice(&self, variable: &str, ranges: &[Range<usize>]) -> AggResult<NcArray>;
}

/// Write access to the output granule being aggregated.
///
/// The engine writes each disjoint window exactly once per variable and
/// sets global attributes in configuration order at finalize time.
pub trait GranuleWriter {
    fn write(&mut self, variable: &str, ranges: &[Range<usize>], data: &NcArray) -> AggResult<()>;

    fn set_global_attr(&mut self, name: &str, value: &AttrValue) -> AggResult<()>;

    /// Flush and atomically rename the temporary output to `final_path`.
    fn finalize_and_rename(self, final_path: &Path) -> AggResult<()>;

    /// Drop the partial output, removing the temporary file.
    fn discard(self);
}

/// A provider of granule readers and writers, e.g. a netCDF library or
/// an in-memory test store.
pub trait DataStore {
    type Reader: GranuleReader;
    type Writer: GranuleWriter;

    /// Open an existing granule read-only.
    fn open(&self, path: &Path) -> AggResult<Self::Reader>;

    /// Create the output granule at a temporary path: dimensions sized
    /// per `udim_sizes` for unlimited dimensions and per the config for
    /// fixed ones, variables declared with their datatypes, attributes,
    /// and chunk sizes.
    fn create(
        &self,
        path: &Path,
        config: &Config,
        udim_sizes: &IndexMap<String, usize>,
    ) -> AggResult<Self::Writer>;
}
