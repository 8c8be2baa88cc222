//! Command-line interface and JSON job-file loading for ClimPrep
//!
//! The CLI is deliberately thin: file discovery and download are the
//! business of an external data-acquisition step, so the job file already
//! names every local source file with its date sub-range. This module
//! parses arguments with `clap` and deserializes the job description into
//! validated `VarSpec` descriptors.

use crate::convention::VariableTranslator;
use crate::dates::DateRange;
use crate::errors::{PrepError, Result};
use crate::pipeline::{SourceFile, VarSpec};
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A CLI tool for preprocessing climate-model NetCDF output
#[derive(Parser, Debug)]
#[command(
    version = "0.3.0",
    name = "ClimPrep",
    about = "Preprocess climate-model NetCDF output into POD-ready form"
)]
pub struct Args {
    /// Path to the JSON job file describing the variables to preprocess
    #[arg(short, long)]
    pub job: PathBuf,

    /// Number of threads for parallel chunk processing. Defaults to the
    /// Rayon default.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Force the chunked (multi-file) strategy even for single-file
    /// variables
    #[arg(long, default_value_t = false)]
    pub chunked: bool,

    /// Verify the NCO utilities are on $PATH before starting
    #[arg(long, default_value_t = false)]
    pub check_nco: bool,
}

/// Top-level job description.
#[derive(Debug, Deserialize)]
pub struct JobSpec {
    /// Naming convention of the model that produced the input files
    pub convention: String,
    /// Sampling frequency of the requested data, e.g. "day" or "mon"
    pub frequency: String,
    pub variables: Vec<VariableEntry>,
}

/// One requested variable, as written in the job file.
#[derive(Debug, Deserialize)]
pub struct VariableEntry {
    /// Canonical (CF) variable name
    pub name: String,
    /// Model-native name; derived from the naming convention when omitted
    #[serde(default)]
    pub name_in_model: Option<String>,
    #[serde(default)]
    pub units: String,
    /// Requested window as limited-precision date strings; omit for
    /// time-independent data
    #[serde(default)]
    pub date_range: Option<RangeEntry>,
    #[serde(default)]
    pub scalar_coordinates: BTreeMap<String, f64>,
    pub files: Vec<FileEntry>,
    pub dest: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct RangeEntry {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl JobSpec {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| PrepError::Generic(format!("invalid job file {}: {}", path.display(), e)))
    }
}

impl VariableEntry {
    /// Builds the validated descriptor, filling the model-native name from
    /// the translation table when the job file omits it.
    pub fn to_var_spec(
        &self,
        translator: &VariableTranslator,
        convention: &str,
        frequency: &str,
    ) -> Result<VarSpec> {
        let name_in_model = match &self.name_in_model {
            Some(name) => name.clone(),
            None => translator.from_canonical(convention, &self.name)?,
        };
        let date_range = match &self.date_range {
            Some(range) => DateRange::parse(&range.start, &range.end)?,
            None => DateRange::Static,
        };
        let files = self
            .files
            .iter()
            .map(|f| {
                let date_range = match (&f.start, &f.end) {
                    (Some(start), Some(end)) => DateRange::parse(start, end)?,
                    _ => DateRange::Static,
                };
                Ok(SourceFile {
                    local_path: f.path.clone(),
                    date_range,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        VarSpec::new(
            self.name.clone(),
            name_in_model,
            self.units.clone(),
            date_range,
            frequency,
            self.scalar_coordinates.clone(),
            files,
            self.dest.clone(),
        )
    }
}
