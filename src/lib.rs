//! ClimPrep: preprocessing of climate-model NetCDF output
//!
//! ClimPrep normalizes raw climate-model output into the form expected by
//! downstream diagnostic modules ("PODs"): one NetCDF file per variable,
//! cropped to the requested analysis window, with a single pressure level
//! extracted where one was asked for, and multi-file time series merged
//! into one coherent dataset under strict consistency checks.
//!
//! ## Key Features
//!
//! - **Axis resolution**: maps ambiguous dimension names onto semantic
//!   X/Y/Z/T roles from CF metadata, with stable tags for leftover axes
//! - **Calendar handling**: noleap, all_leap, 360_day, julian and the
//!   gregorian calendars, with the CF fallback chain for finding one
//! - **Composable transforms**: time-range cropping and exact vertical
//!   level extraction, dispatched through a four-hook lifecycle
//! - **Strict merging**: multi-file series are concatenated along time
//!   only when everything else matches exactly
//! - **Parallel chunk decode**: Rayon-backed open/transform of chunks
//!   during merges
//!
//! ## Module Organization
//!
//! - [`dates`]: CF calendars, fuzzy date bounds, time-axis encodings
//! - [`dataset`]: in-memory dataset model and NetCDF I/O
//! - [`axes`]: axis roles, the bidirectional axis map and the resolver
//! - [`convention`]: naming-convention translation tables
//! - [`transforms`]: the transform trait and its concrete variants
//! - [`merge`]: strict multi-file concatenation
//! - [`pipeline`]: variable descriptors and the two pipeline strategies
//! - [`nco`]: opaque NCO subprocess wrapper
//! - [`parallel`]: parallel processing configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clim_prep::prelude::*;
//! use std::collections::BTreeMap;
//! use std::path::PathBuf;
//!
//! let translator = VariableTranslator::with_builtin_tables();
//! let config = PipelineConfig {
//!     convention: "CMIP".to_string(),
//!     frequency: "day".to_string(),
//! };
//! let var = VarSpec::new(
//!     "tas",
//!     "tas",
//!     "K",
//!     DateRange::parse("2000", "2000").unwrap(),
//!     "day",
//!     BTreeMap::new(),
//!     vec![SourceFile {
//!         local_path: PathBuf::from("tas.nc"),
//!         date_range: DateRange::parse("1999-06", "2001-06").unwrap(),
//!     }],
//!     PathBuf::from("out/tas.nc"),
//! )
//! .unwrap();
//! SingleFilePreprocessor::new(&config, &translator, var)
//!     .unwrap()
//!     .preprocess()
//!     .unwrap();
//! ```

// Core modules
pub mod axes;
pub mod cli;
pub mod convention;
pub mod dataset;
pub mod dates;
pub mod errors;
pub mod merge;
pub mod nco;
pub mod parallel;
pub mod pipeline;
pub mod transforms;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::axes::{AxisMap, AxisResolver, AxisRole, NameLookup};
    pub use crate::convention::{ConventionTable, VariableTranslator};
    pub use crate::dataset::{AttrValue, Dataset};
    pub use crate::dates::{Calendar, CfDate, DateRange, FuzzyBound, TimeEncoding};
    pub use crate::errors::{PrepError, Result};
    pub use crate::merge::DatasetMerger;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{
        MultiFilePreprocessor, PipelineConfig, PreprocessContext, SingleFilePreprocessor,
        SourceFile, VarSpec,
    };
    pub use crate::transforms::{CropTimeRange, ExtractVerticalLevel, TransformFunction};
}
