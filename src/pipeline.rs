//! Preprocessing pipeline orchestration
//!
//! A pipeline run takes one variable descriptor and its located source
//! files, resolves axis roles and the calendar from the first file, then
//! drives an ordered chain of transforms before writing a single
//! normalized NetCDF file. Two strategies exist: `SingleFilePreprocessor`
//! for variables whose whole time series lives in one file (curated sample
//! data), and `MultiFilePreprocessor` which merges chunked series through
//! `DatasetMerger`.
//!
//! All failures are data-integrity errors: they propagate to the caller
//! with no retry and leave the destination path unwritten. Isolation
//! across variables is the caller's concern.

use crate::axes::{AxisMap, AxisResolver, AxisRole};
use crate::convention::VariableTranslator;
use crate::dataset::Dataset;
use crate::dates::{Calendar, CfDate, DateRange};
use crate::errors::{PrepError, Result};
use crate::merge::DatasetMerger;
use crate::transforms::{CropTimeRange, ExtractVerticalLevel, TransformFunction};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One located source file and the date sub-range it covers.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub local_path: PathBuf,
    pub date_range: DateRange,
}

impl SourceFile {
    fn sort_key(&self) -> CfDate {
        match &self.date_range {
            DateRange::Between { start, .. } => start.lower,
            DateRange::Static => CfDate::new(i32::MIN, 1, 1),
        }
    }
}

/// Everything the pipeline needs to know about one requested variable.
///
/// Validated at construction: the file list is non-empty and sorted by
/// sub-range start.
#[derive(Debug, Clone)]
pub struct VarSpec {
    /// Canonical (CF) name
    pub name: String,
    /// Name used inside the model's own files
    pub name_in_model: String,
    pub units: String,
    pub date_range: DateRange,
    pub frequency: String,
    /// Fixed single-valued coordinates narrowing the request, e.g.
    /// `pressure` (hPa)
    pub scalar_coordinates: BTreeMap<String, f64>,
    pub files: Vec<SourceFile>,
    pub dest_path: PathBuf,
}

impl VarSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        name_in_model: impl Into<String>,
        units: impl Into<String>,
        date_range: DateRange,
        frequency: impl Into<String>,
        scalar_coordinates: BTreeMap<String, f64>,
        mut files: Vec<SourceFile>,
        dest_path: PathBuf,
    ) -> Result<Self> {
        let name = name.into();
        if files.is_empty() {
            return Err(PrepError::InvalidDescriptor(format!(
                "variable '{}' has no source files",
                name
            )));
        }
        if files.len() > 1 {
            files.sort_by_key(|f| f.sort_key());
        }
        Ok(Self {
            name,
            name_in_model: name_in_model.into(),
            units: units.into(),
            date_range,
            frequency: frequency.into(),
            scalar_coordinates,
            files,
            dest_path,
        })
    }

    /// True when this variable requires the chunked strategy: several
    /// source files, or a scalar-coordinate selection, which only the
    /// multi-file transform chain applies.
    pub fn needs_chunked_strategy(&self) -> bool {
        self.files.len() > 1 || !self.scalar_coordinates.is_empty()
    }
}

/// Job-level settings shared by every variable of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub convention: String,
    pub frequency: String,
}

/// Aggregate state for one pipeline run: the descriptor plus everything
/// the resolver learned from the first file. Mutated only during the
/// parse phase; read-only for transform execution.
#[derive(Debug, Clone)]
pub struct PreprocessContext {
    pub var: VarSpec,
    pub convention: String,
    pub frequency: String,
    pub axes: AxisMap,
    pub calendar: Option<Calendar>,
}

impl PreprocessContext {
    /// Current name of the primary variable inside `ds`. Transforms may
    /// rename the variable (level extraction embeds the selected level),
    /// so the resolved name is tried first, then a prefix match against
    /// the data variables.
    pub fn var_name_in(&self, ds: &Dataset) -> Option<String> {
        let base = self.axes.var_name()?;
        if ds.var(base).is_some() {
            return Some(base.to_string());
        }
        ds.data_var_names()
            .into_iter()
            .find(|name| name.starts_with(base))
            .map(str::to_string)
    }
}

/// Shared orchestration core for both pipeline strategies.
struct PipelineCore {
    ctx: PreprocessContext,
    functions: Vec<Box<dyn TransformFunction>>,
    convention_calendar: Option<Calendar>,
}

impl PipelineCore {
    fn new(
        config: &PipelineConfig,
        translator: &VariableTranslator,
        var: VarSpec,
        functions: Vec<Box<dyn TransformFunction>>,
    ) -> Result<Self> {
        // also validates that the convention is registered
        let convention_calendar = translator.default_calendar(&config.convention)?;
        Ok(Self {
            ctx: PreprocessContext {
                var,
                convention: config.convention.clone(),
                frequency: config.frequency.clone(),
                axes: AxisMap::new(),
                calendar: None,
            },
            functions,
            convention_calendar,
        })
    }

    /// Axis/calendar resolution on the first file, then each transform's
    /// own parse hook.
    fn parse(&mut self, ds: &Dataset) -> Result<()> {
        let resolver = AxisResolver::new(self.convention_calendar);
        let (axes, calendar) = resolver.resolve(ds, &self.ctx.var.name_in_model)?;
        self.ctx.axes = axes;
        self.ctx.calendar = calendar;

        let ctx = &self.ctx;
        for func in &mut self.functions {
            func.parse(ds, ctx)?;
        }
        Ok(())
    }

    fn run_static(&self, mut ds: Dataset) -> Result<Dataset> {
        for func in &self.functions {
            ds = func.process_static(ds, &self.ctx)?;
        }
        Ok(ds)
    }

    fn run_file(&self, mut ds: Dataset) -> Result<Dataset> {
        for func in &self.functions {
            ds = func.process_file(ds, &self.ctx)?;
        }
        Ok(ds)
    }

    fn run_dataset(&self, mut ds: Dataset) -> Result<Dataset> {
        for func in &self.functions {
            ds = func.process_dataset(ds, &self.ctx)?;
        }
        Ok(ds)
    }

    fn write_output(&self, ds: &Dataset) -> Result<()> {
        ds.write(&self.ctx.var.dest_path)?;
        println!(
            "✅ Wrote '{}' to {}",
            self.ctx.var.name,
            self.ctx.var.dest_path.display()
        );
        Ok(())
    }
}

/// Preprocessor for model data provided as a single NetCDF file per
/// variable. Simplicity and determinism over memory efficiency.
pub struct SingleFilePreprocessor {
    core: PipelineCore,
}

impl SingleFilePreprocessor {
    pub fn new(
        config: &PipelineConfig,
        translator: &VariableTranslator,
        var: VarSpec,
    ) -> Result<Self> {
        let functions: Vec<Box<dyn TransformFunction>> = vec![Box::new(CropTimeRange::new())];
        Ok(Self {
            core: PipelineCore::new(config, translator, var, functions)?,
        })
    }

    /// Appends a caller-supplied transform after the default chain.
    pub fn add_function(&mut self, func: Box<dyn TransformFunction>) {
        self.core.functions.push(func);
    }

    /// Top-level wrapper for all preprocessing of this variable's data.
    pub fn preprocess(mut self) -> Result<()> {
        let var = &self.core.ctx.var;
        if var.files.len() != 1 {
            return Err(PrepError::InvalidDescriptor(format!(
                "single-file preprocessing of '{}' requires exactly one file, got {}",
                var.name,
                var.files.len()
            )));
        }
        println!("Preprocessing '{}' (single file)", var.name);

        let path = var.files[0].local_path.clone();
        let is_static = var.date_range.is_static();
        let ds = Dataset::open(&path)?;
        self.core.parse(&ds)?;

        let ds = if is_static {
            self.core.run_static(ds)?
        } else {
            let ds = self.core.run_file(ds)?;
            self.core.run_dataset(ds)?
        };

        self.core.write_output(&ds)?;
        drop(ds); // bound peak memory across variables processed in sequence
        Ok(())
    }
}

/// Preprocessor for general, possibly chunked, multi-file data.
pub struct MultiFilePreprocessor {
    core: PipelineCore,
}

impl MultiFilePreprocessor {
    pub fn new(
        config: &PipelineConfig,
        translator: &VariableTranslator,
        var: VarSpec,
    ) -> Result<Self> {
        let functions: Vec<Box<dyn TransformFunction>> = vec![
            Box::new(CropTimeRange::new()),
            Box::new(ExtractVerticalLevel::new()),
        ];
        Ok(Self {
            core: PipelineCore::new(config, translator, var, functions)?,
        })
    }

    /// Appends a caller-supplied transform after the default chain.
    pub fn add_function(&mut self, func: Box<dyn TransformFunction>) {
        self.core.functions.push(func);
    }

    /// Top-level wrapper for all preprocessing of this variable's data.
    pub fn preprocess(mut self) -> Result<()> {
        let var = &self.core.ctx.var;
        let var_name = var.name.clone();
        let paths: Vec<PathBuf> = var.files.iter().map(|f| f.local_path.clone()).collect();
        let is_static = var.date_range.is_static();
        println!("Preprocessing '{}' ({} file(s))", var_name, paths.len());

        let first = Dataset::open(&paths[0])?;
        self.core.parse(&first)?;

        let ds = if is_static {
            if paths.len() != 1 {
                return Err(PrepError::InvalidDescriptor(format!(
                    "static variable '{}' must come from exactly one file, got {}",
                    var_name,
                    paths.len()
                )));
            }
            self.core.run_static(first)?
        } else {
            drop(first); // reopened by the merger; keep one file's footprint

            let time_dim = self
                .core
                .ctx
                .axes
                .get(AxisRole::T)
                .ok_or_else(|| PrepError::Resolution {
                    var: var_name.clone(),
                    msg: "time-dependent request but no time axis was resolved".to_string(),
                })?
                .to_string();

            let merger = DatasetMerger::new(time_dim);
            let ds = merger
                .merge(&paths, |chunk| self.core.run_file(chunk))
                .map_err(|e| match e {
                    PrepError::MergeConsistency { msg } => PrepError::MergeConsistency {
                        msg: format!("'{}': {}", var_name, msg),
                    },
                    other => other,
                })?;
            self.core.run_dataset(ds)?
        };

        self.core.write_output(&ds)?;
        drop(ds); // bound peak memory across variables processed in sequence
        Ok(())
    }
}
