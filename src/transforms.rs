//! Composable preprocessing transforms
//!
//! Each transform implements four lifecycle hooks: `parse` (inspect the
//! first file, record derived state), `process_static` (time-independent
//! datasets), `process_file` (each file of a time-dependent dataset,
//! before merging) and `process_dataset` (the combined time-dependent
//! dataset). All hooks default to pass-through; concrete transforms
//! override only the granularity they act at. The pipeline dispatches over
//! an ordered list of boxed transforms.

use crate::axes::AxisRole;
use crate::dataset::Dataset;
use crate::dates::DateRange;
use crate::errors::{PrepError, Result};
use crate::pipeline::PreprocessContext;

/// One named unit of preprocessing work.
///
/// Implementations must be order-independent with respect to axis-role
/// data they only read; the pipeline fixes the chain order.
pub trait TransformFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Setup based on attributes of the first file, before the full
    /// dataset is processed.
    fn parse(&mut self, _ds: &Dataset, _ctx: &PreprocessContext) -> Result<()> {
        Ok(())
    }

    /// Preprocessing for time-independent datasets.
    fn process_static(&self, ds: Dataset, _ctx: &PreprocessContext) -> Result<Dataset> {
        Ok(ds)
    }

    /// Preprocessing for each individual file of a time-dependent dataset,
    /// before `process_dataset` runs on the combined result.
    fn process_file(&self, ds: Dataset, _ctx: &PreprocessContext) -> Result<Dataset> {
        Ok(ds)
    }

    /// Preprocessing for the (possibly merged) time-dependent dataset.
    fn process_dataset(&self, ds: Dataset, _ctx: &PreprocessContext) -> Result<Dataset> {
        Ok(ds)
    }
}

/// Trims the time axis of the dataset to the user-requested analysis
/// period.
///
/// The requested range carries fuzzy bounds (earliest/latest instants
/// consistent with the precision the user gave); the crop keeps the
/// inclusive `[start-lower, end-upper]` window. The asymmetric bound
/// choice is deliberate: a request for "year 2000" keeps all of 2000.
#[derive(Debug, Default)]
pub struct CropTimeRange;

impl CropTimeRange {
    pub fn new() -> Self {
        Self
    }
}

impl TransformFunction for CropTimeRange {
    fn name(&self) -> &'static str {
        "crop_time_range"
    }

    fn process_dataset(&self, mut ds: Dataset, ctx: &PreprocessContext) -> Result<Dataset> {
        let time_name = match ctx.axes.get(AxisRole::T) {
            Some(name) => name.to_string(),
            None => {
                println!("⚠ Tried to crop time axis of time-independent variable");
                return Ok(ds);
            }
        };
        let (start, end) = match &ctx.var.date_range {
            DateRange::Between { start, end } => (*start, *end),
            DateRange::Static => {
                println!("⚠ Tried to crop time axis for a static date range");
                return Ok(ds);
            }
        };
        let calendar = ctx.calendar.ok_or_else(|| PrepError::CalendarResolution {
            var: ctx.var.name.clone(),
        })?;

        let time_var = ds.var(&time_name).ok_or_else(|| PrepError::Resolution {
            var: ctx.var.name.clone(),
            msg: format!("time coordinate '{}' not found in dataset", time_name),
        })?;
        let encoding = time_var
            .time_encoding
            .clone()
            .ok_or_else(|| PrepError::Resolution {
                var: ctx.var.name.clone(),
                msg: format!("time coordinate '{}' has no decodable units", time_name),
            })?;

        let seconds: Vec<i64> = time_var
            .data
            .iter()
            .map(|v| encoding.to_seconds(*v, calendar))
            .collect();
        if seconds.is_empty() {
            return Err(PrepError::DataRange {
                var: ctx.var.name.clone(),
                msg: "time axis is empty".to_string(),
            });
        }

        let start_lower = calendar.seconds_from_date(&start.lower);
        let start_upper = calendar.seconds_from_date(&start.upper);
        let end_lower = calendar.seconds_from_date(&end.lower);
        let end_upper = calendar.seconds_from_date(&end.upper);

        let first = seconds[0];
        let last = seconds[seconds.len() - 1];
        if first > start_upper {
            return Err(PrepError::DataRange {
                var: ctx.var.name.clone(),
                msg: format!(
                    "dataset start ({}) is after requested date range start ({})",
                    calendar.date_from_seconds(first),
                    start.upper
                ),
            });
        }
        if last < end_lower {
            return Err(PrepError::DataRange {
                var: ctx.var.name.clone(),
                msg: format!(
                    "dataset end ({}) is before requested date range end ({})",
                    calendar.date_from_seconds(last),
                    end.lower
                ),
            });
        }

        let first_idx = seconds.iter().position(|&s| s >= start_lower);
        let last_idx = seconds.iter().rposition(|&s| s <= end_upper);
        let (first_idx, last_idx) = match (first_idx, last_idx) {
            (Some(a), Some(b)) if a <= b => (a, b),
            _ => {
                return Err(PrepError::DataRange {
                    var: ctx.var.name.clone(),
                    msg: "no samples fall within the requested date range".to_string(),
                })
            }
        };

        println!(
            "  trimming '{}' of '{}' from {} - {} to {}",
            time_name,
            ctx.var_name_in(&ds).unwrap_or_default(),
            calendar.date_from_seconds(first),
            calendar.date_from_seconds(last),
            ctx.var.date_range
        );
        ds.crop_dim(&time_name, first_idx, last_idx);
        Ok(ds)
    }
}

/// Extracts a single pressure level from the dataset.
///
/// Pressure unit conversion covers the Pa/hPa/mb family; parametric
/// vertical coordinates are not handled since that would require
/// interpolation. The exact level must be present on the axis. Runs at
/// per-file granularity to avoid holding multi-file 3-D fields in memory
/// simultaneously. On success the resolved variable is renamed to embed
/// the level (e.g. `ta500`), so independently processed levels of the same
/// field cannot collide.
#[derive(Debug, Default)]
pub struct ExtractVerticalLevel;

impl ExtractVerticalLevel {
    pub fn new() -> Self {
        Self
    }

    /// Converts a requested level in hPa to the vertical axis's own units.
    fn target_in_axis_units(units: Option<&str>, level_hpa: f64) -> Result<f64> {
        match units.map(|u| u.trim().to_lowercase()).as_deref() {
            Some("pa") => Ok(level_hpa * 100.0),
            Some("hpa") | Some("mb") | Some("mbar") | Some("millibar") | Some("millibars") => {
                Ok(level_hpa)
            }
            None => {
                println!("⚠ Vertical axis has no units attribute, assuming hPa");
                Ok(level_hpa)
            }
            Some(other) => Err(PrepError::Generic(format!(
                "unsupported vertical coordinate units '{}'",
                other
            ))),
        }
    }
}

impl TransformFunction for ExtractVerticalLevel {
    fn name(&self) -> &'static str {
        "extract_vertical_level"
    }

    fn process_file(&self, mut ds: Dataset, ctx: &PreprocessContext) -> Result<Dataset> {
        let z_name = match ctx.axes.get(AxisRole::Z) {
            Some(name) => name.to_string(),
            None => return Ok(ds),
        };
        let level_hpa = match ctx.var.scalar_coordinates.get("pressure") {
            Some(p) => *p,
            None => return Ok(ds),
        };
        // suffix and error reporting use the truncated integer level
        let level = level_hpa as i64;

        let z_var = ds.var(&z_name).ok_or_else(|| PrepError::Resolution {
            var: ctx.var.name.clone(),
            msg: format!("vertical coordinate '{}' not found in dataset", z_name),
        })?;
        let units = z_var.attrs.get("units").and_then(|a| a.as_str());
        let target = Self::target_in_axis_units(units, level_hpa)?;

        let tolerance = target.abs().max(1.0) * 1e-6;
        let index = z_var
            .data
            .iter()
            .position(|&v| (v - target).abs() <= tolerance)
            .ok_or(PrepError::LevelNotFound {
                var: ctx.var.name.clone(),
                level,
            })?;

        let var_name = ctx
            .axes
            .var_name()
            .ok_or_else(|| PrepError::Resolution {
                var: ctx.var.name.clone(),
                msg: "no resolved variable name".to_string(),
            })?
            .to_string();

        println!(
            "  extracting level {} hPa from '{}' of '{}'",
            level, z_name, var_name
        );
        ds.extract_index(&z_name, index);
        ds.rename_var(&var_name, &format!("{}{}", var_name, level))?;
        Ok(ds)
    }
}
