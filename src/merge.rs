//! Strict multi-file concatenation along the time dimension
//!
//! The merger opens every chunk of a multi-file time series, applies a
//! per-file transform to each chunk *as it is opened* (bounding peak
//! memory to roughly one file's footprint), then combines the chunks with
//! strict compatibility checks: everything that is not being concatenated
//! must be identical across files. Any divergence is fatal; there is no
//! silent reconciliation.
//!
//! Chunk open + transform is delegated to Rayon's thread pool; the caller
//! issues one blocking `merge` call and receives the combined dataset.

use crate::dataset::{DataVar, Dataset, Dimension};
use crate::errors::{PrepError, Result};
use ndarray::{concatenate, ArrayViewD, Axis};
use rayon::prelude::*;
use std::path::PathBuf;

/// Concatenates N files along one time dimension.
pub struct DatasetMerger {
    time_dim: String,
}

impl DatasetMerger {
    pub fn new(time_dim: impl Into<String>) -> Self {
        Self {
            time_dim: time_dim.into(),
        }
    }

    /// Opens and transforms every chunk in parallel, then combines them.
    pub fn merge<F>(&self, paths: &[PathBuf], per_file: F) -> Result<Dataset>
    where
        F: Fn(Dataset) -> Result<Dataset> + Sync,
    {
        let chunks: Vec<Dataset> = paths
            .par_iter()
            .map(|path| Dataset::open(path).and_then(&per_file))
            .collect::<Result<Vec<_>>>()?;
        self.combine(chunks)
    }

    /// Combines already-opened chunks with strict consistency checks.
    pub fn combine(&self, mut chunks: Vec<Dataset>) -> Result<Dataset> {
        if chunks.is_empty() {
            return Err(PrepError::MergeConsistency {
                msg: "no files to merge".to_string(),
            });
        }
        for chunk in &chunks {
            if !chunk.has_dim(&self.time_dim) {
                return Err(PrepError::MergeConsistency {
                    msg: format!("a file lacks the time dimension '{}'", self.time_dim),
                });
            }
        }
        if chunks.len() == 1 {
            return Ok(chunks.pop().unwrap());
        }

        // order chunks by their first timestamp; raw values are comparable
        // once the encodings are known to match, which is checked below
        chunks.sort_by(|a, b| {
            let first = |ds: &Dataset| {
                ds.var(&self.time_dim)
                    .and_then(|t| t.data.iter().next().copied())
                    .unwrap_or(f64::NAN)
            };
            first(a)
                .partial_cmp(&first(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (template, rest) = chunks.split_first().expect("checked non-empty");
        for other in rest {
            self.check_compatible(template, other)?;
        }

        let merged_time_len: usize = chunks
            .iter()
            .map(|ds| ds.dim_len(&self.time_dim).unwrap_or(0))
            .sum();

        let template = &chunks[0];
        let dims: Vec<Dimension> = template
            .dims
            .iter()
            .map(|d| Dimension {
                name: d.name.clone(),
                len: if d.name == self.time_dim {
                    merged_time_len
                } else {
                    d.len
                },
            })
            .collect();

        // only time-varying variables and coordinates participate in the
        // concatenation; everything else is taken from the first chunk
        let mut vars = Vec::with_capacity(template.vars.len());
        for var in &template.vars {
            if let Some(pos) = var.dims.iter().position(|d| *d == self.time_dim) {
                let views: Vec<ArrayViewD<f64>> = chunks
                    .iter()
                    .map(|ds| {
                        ds.var(&var.name)
                            .map(|v| v.data.view())
                            .ok_or_else(|| PrepError::MergeConsistency {
                                msg: format!("variable '{}' missing from a file", var.name),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let data = concatenate(Axis(pos), &views)?;
                vars.push(DataVar {
                    name: var.name.clone(),
                    dims: var.dims.clone(),
                    data,
                    attrs: var.attrs.clone(),
                    time_encoding: var.time_encoding.clone(),
                });
            } else {
                vars.push(var.clone());
            }
        }

        let merged = Dataset {
            dims,
            attrs: template.attrs.clone(),
            vars,
        };

        // the union of the per-file time axes must be strictly increasing
        if let Some(time_var) = merged.var(&self.time_dim) {
            let values: Vec<f64> = time_var.data.iter().copied().collect();
            if values.windows(2).any(|w| w[1] <= w[0]) {
                return Err(PrepError::MergeConsistency {
                    msg: format!(
                        "time axes of merged files overlap or are unordered along '{}'",
                        self.time_dim
                    ),
                });
            }
        }

        Ok(merged)
    }

    fn check_compatible(&self, template: &Dataset, other: &Dataset) -> Result<()> {
        // non-time dimensions must match exactly
        let non_time = |ds: &Dataset| {
            let mut dims: Vec<(String, usize)> = ds
                .dims
                .iter()
                .filter(|d| d.name != self.time_dim)
                .map(|d| (d.name.clone(), d.len))
                .collect();
            dims.sort();
            dims
        };
        if non_time(template) != non_time(other) {
            return Err(PrepError::MergeConsistency {
                msg: "non-time dimensions differ between files".to_string(),
            });
        }

        if template.attrs != other.attrs {
            return Err(PrepError::MergeConsistency {
                msg: "global attributes differ between files".to_string(),
            });
        }

        fn var_names(ds: &Dataset) -> Vec<&str> {
            let mut names: Vec<&str> = ds.vars.iter().map(|v| v.name.as_str()).collect();
            names.sort_unstable();
            names
        }
        if var_names(template) != var_names(other) {
            return Err(PrepError::MergeConsistency {
                msg: "variable sets differ between files".to_string(),
            });
        }

        for var in &template.vars {
            let other_var = other.var(&var.name).expect("checked same variable sets");
            if var.dims != other_var.dims {
                return Err(PrepError::MergeConsistency {
                    msg: format!("dimensions of variable '{}' differ between files", var.name),
                });
            }
            if var.attrs != other_var.attrs {
                return Err(PrepError::MergeConsistency {
                    msg: format!("attributes of variable '{}' differ between files", var.name),
                });
            }
            let is_time_varying = var.dims.iter().any(|d| *d == self.time_dim);
            if is_time_varying {
                if var.name == self.time_dim && var.time_encoding != other_var.time_encoding {
                    return Err(PrepError::MergeConsistency {
                        msg: format!("time encodings of '{}' differ between files", var.name),
                    });
                }
            } else if var.data != other_var.data {
                // all non-concatenated variables must be identical
                return Err(PrepError::MergeConsistency {
                    msg: format!("values of variable '{}' differ between files", var.name),
                });
            }
        }

        Ok(())
    }
}
