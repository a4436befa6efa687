//! One-shot inspection of input granules.
//!
//! A [`GranuleDescriptor`] records everything the planner needs to know
//! about a granule: unlimited dimension sizes, projected index values,
//! and raw global attribute values. No bulk variable data is read at
//! descriptor time; that only happens when the evaluator walks the plan.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::config::Config;
use crate::dataset::GranuleReader;
use crate::error::{AggError, AggResult};
use crate::types::AttrValue;

/// The projected (1-D) values of an index variable over one granule.
#[derive(Debug, Clone)]
pub struct IndexProjection {
    pub values: Vec<f64>,
    /// Smallest projected value; the planner orders granules by this.
    pub first: f64,
    /// Largest projected value. Together with `first` this lets the
    /// planner reject a granule entirely outside the bounds without
    /// walking its records.
    pub last: f64,
}

/// Planner-facing summary of a single input granule.
#[derive(Debug, Clone)]
pub struct GranuleDescriptor {
    pub path: PathBuf,
    pub filename: String,
    /// Length of each configured dimension in this granule; absent
    /// dimensions are recorded as 0.
    pub dim_lens: IndexMap<String, usize>,
    /// Configured variables this granule does not carry. The evaluator
    /// substitutes `_FillValue` for them.
    pub missing_vars: Vec<String>,
    /// Raw values of each configured global attribute (`None` when the
    /// granule does not carry it).
    pub attrs: IndexMap<String, Option<AttrValue>>,
    /// Projected index values per unlimited dimension with an UDC.
    pub index: IndexMap<String, IndexProjection>,
}

impl GranuleDescriptor {
    /// Inspect one granule against the configuration. Fixed-dimension
    /// size and variable datatype divergences surface as
    /// [`AggError::SchemaMismatch`] here, before any planning happens.
    pub fn inspect<R: GranuleReader>(path: &Path, reader: &R, config: &Config) -> AggResult<Self> {
        let schema = reader.schema()?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut dim_lens = IndexMap::new();
        for dim in &config.dimensions {
            let granule_dim = schema.dimension(&dim.name);
            if let (Some(size), Some(gdim)) = (dim.size, granule_dim) {
                if gdim.len != size {
                    return Err(AggError::schema_mismatch(
                        path,
                        format!(
                            "dimension '{}' has size {} but the configuration requires {size}",
                            dim.name, gdim.len
                        ),
                    ));
                }
            }
            dim_lens.insert(dim.name.clone(), granule_dim.map(|d| d.len).unwrap_or(0));
        }

        let mut missing_vars = Vec::new();
        for var in &config.variables {
            let granule_var = match schema.variable(&var.name) {
                Some(v) => v,
                None => {
                    missing_vars.push(var.name.clone());
                    continue;
                }
            };
            if granule_var.datatype != var.datatype {
                return Err(AggError::schema_mismatch(
                    path,
                    format!(
                        "variable '{}' is {} but the configuration declares {}",
                        var.name, granule_var.datatype, var.datatype
                    ),
                ));
            }
            if granule_var.dimensions != var.dimensions {
                return Err(AggError::schema_mismatch(
                    path,
                    format!(
                        "variable '{}' has dimensions {:?} but the configuration declares {:?}",
                        var.name, granule_var.dimensions, var.dimensions
                    ),
                ));
            }
            if var.fill_value().is_some() && !granule_var.attributes.contains_key("_FillValue") {
                return Err(AggError::schema_mismatch(
                    path,
                    format!(
                        "variable '{}' is missing the _FillValue the configuration declares",
                        var.name
                    ),
                ));
            }
        }

        let mut index = IndexMap::new();
        for dim in config.unlimited_dims() {
            let index_var = match &dim.index_by {
                Some(v) if !dim.flatten => v,
                _ => continue,
            };
            let n_records = dim_lens.get(&dim.name).copied().unwrap_or(0);
            if n_records == 0 {
                continue;
            }
            if missing_vars.iter().any(|v| v == index_var) {
                return Err(AggError::schema_mismatch(
                    path,
                    format!(
                        "granule has {n_records} records along '{}' but no '{index_var}' to order them by",
                        dim.name
                    ),
                ));
            }

            let values = reader.read_index(index_var, &dim.other_dim_indices)?;
            if values.len() != n_records {
                return Err(AggError::schema_mismatch(
                    path,
                    format!(
                        "projected '{index_var}' has {} values for {n_records} records along '{}'",
                        values.len(),
                        dim.name
                    ),
                ));
            }
            let first = values.iter().copied().fold(f64::INFINITY, f64::min);
            let last = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            index.insert(dim.name.clone(), IndexProjection { values, first, last });
        }

        let attrs = config
            .global_attributes
            .iter()
            .map(|spec| (spec.name.clone(), schema.global_attributes.get(&spec.name).cloned()))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            filename,
            dim_lens,
            missing_vars,
            attrs,
            index,
        })
    }

    pub fn dim_len(&self, dim: &str) -> usize {
        self.dim_lens.get(dim).copied().unwrap_or(0)
    }

    pub fn has_var(&self, name: &str) -> bool {
        !self.missing_vars.iter().any(|v| v == name)
    }
}
