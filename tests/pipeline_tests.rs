//! End-to-end pipeline runs over real NetCDF files.

use clim_prep::cli::JobSpec;
use clim_prep::convention::VariableTranslator;
use clim_prep::dataset::Dataset;
use clim_prep::dates::DateRange;
use clim_prep::errors::PrepError;
use clim_prep::pipeline::{
    MultiFilePreprocessor, PipelineConfig, SingleFilePreprocessor, SourceFile, VarSpec,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn cmip_config() -> PipelineConfig {
    PipelineConfig {
        convention: "CMIP".to_string(),
        frequency: "day".to_string(),
    }
}

/// Daily tas(time, lat) series covering 1999-06-01 .. 2001-06-01 (noleap).
fn write_daily_tas(path: &Path) {
    let n = 731usize;
    let mut file = netcdf::create(path).unwrap();
    file.add_attribute("title", "test run").unwrap();
    file.add_dimension("time", n).unwrap();
    file.add_dimension("lat", 2).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", "days since 1999-06-01").unwrap();
    time.put_attribute("calendar", "noleap").unwrap();
    let time_values: Vec<f64> = (0..n).map(|i| i as f64).collect();
    time.put_values(&time_values, ..).unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&[0.0, 10.0], ..).unwrap();

    let mut tas = file.add_variable::<f64>("tas", &["time", "lat"]).unwrap();
    tas.put_attribute("units", "K").unwrap();
    let values: Vec<f64> = (0..n * 2).map(|i| i as f64).collect();
    tas.put_values(&values, ..).unwrap();
}

fn tas_spec(files: Vec<SourceFile>, range: DateRange, dest: PathBuf) -> VarSpec {
    VarSpec::new(
        "tas",
        "tas",
        "K",
        range,
        "day",
        BTreeMap::new(),
        files,
        dest,
    )
    .unwrap()
}

#[test]
fn test_single_file_crop_to_year() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tas.nc");
    let dest = dir.path().join("tas.2000.nc");
    write_daily_tas(&input);

    let var = tas_spec(
        vec![SourceFile {
            local_path: input,
            date_range: DateRange::parse("1999-06", "2001-06").unwrap(),
        }],
        DateRange::parse("2000", "2000").unwrap(),
        dest.clone(),
    );
    let translator = VariableTranslator::with_builtin_tables();
    SingleFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess()
        .unwrap();

    let out = Dataset::open(&dest).unwrap();
    assert_eq!(out.dim_len("time"), Some(365));
    let time = out.var("time").unwrap();
    assert_eq!(time.data.first(), Some(&214.0));
    assert_eq!(time.data.last(), Some(&578.0));
    assert_eq!(out.var("tas").unwrap().data.shape(), &[365, 2]);
    // metadata rides along
    assert!(out.attrs.contains_key("title"));
    assert_eq!(
        out.var("tas")
            .unwrap()
            .attrs
            .get("units")
            .and_then(|a| a.as_str()),
        Some("K")
    );
}

#[test]
fn test_single_file_rejects_multiple_files() {
    let dir = tempdir().unwrap();
    let var = tas_spec(
        vec![
            SourceFile {
                local_path: dir.path().join("a.nc"),
                date_range: DateRange::Static,
            },
            SourceFile {
                local_path: dir.path().join("b.nc"),
                date_range: DateRange::Static,
            },
        ],
        DateRange::Static,
        dir.path().join("out.nc"),
    );
    let translator = VariableTranslator::with_builtin_tables();
    let result = SingleFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess();
    assert!(matches!(result, Err(PrepError::InvalidDescriptor(_))));
}

#[test]
fn test_static_variable_roundtrips_unchanged() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("orog.nc");
    let dest = dir.path().join("orog.out.nc");
    {
        let mut file = netcdf::create(&input).unwrap();
        file.add_attribute("title", "topography").unwrap();
        file.add_dimension("lat", 3).unwrap();
        file.add_dimension("lon", 2).unwrap();
        let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        lat.put_attribute("units", "degrees_north").unwrap();
        lat.put_values(&[-10.0, 0.0, 10.0], ..).unwrap();
        let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        lon.put_attribute("units", "degrees_east").unwrap();
        lon.put_values(&[0.0, 180.0], ..).unwrap();
        let mut orog = file.add_variable::<f64>("orog", &["lat", "lon"]).unwrap();
        orog.put_attribute("units", "m").unwrap();
        orog.put_values(&[0.0, 100.0, 200.0, 300.0, 400.0, 500.0], ..)
            .unwrap();
    }

    let var = VarSpec::new(
        "orog",
        "orog",
        "m",
        DateRange::Static,
        "fx",
        BTreeMap::new(),
        vec![SourceFile {
            local_path: input.clone(),
            date_range: DateRange::Static,
        }],
        dest.clone(),
    )
    .unwrap();
    let translator = VariableTranslator::with_builtin_tables();
    SingleFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess()
        .unwrap();

    let before = Dataset::open(&input).unwrap();
    let after = Dataset::open(&dest).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_failed_run_leaves_no_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tas.nc");
    let dest = dir.path().join("tas.2005.nc");
    write_daily_tas(&input);

    let var = tas_spec(
        vec![SourceFile {
            local_path: input,
            date_range: DateRange::parse("1999-06", "2001-06").unwrap(),
        }],
        DateRange::parse("2005", "2005").unwrap(),
        dest.clone(),
    );
    let translator = VariableTranslator::with_builtin_tables();
    let result = SingleFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess();

    assert!(matches!(result, Err(PrepError::DataRange { .. })));
    assert!(!dest.exists());
}

/// One chunk of ta(time, plev, lat) with a 2-level pressure axis.
fn write_ta_chunk(path: &Path, time_values: &[f64], value_offset: f64) {
    let n = time_values.len();
    let mut file = netcdf::create(path).unwrap();
    file.add_attribute("title", "test run").unwrap();
    file.add_dimension("time", n).unwrap();
    file.add_dimension("plev", 2).unwrap();
    file.add_dimension("lat", 2).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", "days since 2000-01-01").unwrap();
    time.put_attribute("calendar", "noleap").unwrap();
    time.put_values(time_values, ..).unwrap();

    let mut plev = file.add_variable::<f64>("plev", &["plev"]).unwrap();
    plev.put_attribute("units", "hPa").unwrap();
    plev.put_values(&[850.0, 500.0], ..).unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&[0.0, 10.0], ..).unwrap();

    let mut ta = file
        .add_variable::<f64>("ta", &["time", "plev", "lat"])
        .unwrap();
    ta.put_attribute("units", "K").unwrap();
    let values: Vec<f64> = (0..n * 4).map(|i| i as f64 + value_offset).collect();
    ta.put_values(&values, ..).unwrap();
}

#[test]
fn test_multi_file_merge_with_level_extraction() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("ta.0.nc");
    let second = dir.path().join("ta.1.nc");
    let dest = dir.path().join("ta500.nc");
    write_ta_chunk(&first, &[0.0, 1.0, 2.0], 0.0);
    write_ta_chunk(&second, &[3.0, 4.0, 5.0], 12.0);

    let mut scalar_coordinates = BTreeMap::new();
    scalar_coordinates.insert("pressure".to_string(), 500.0);
    let var = VarSpec::new(
        "ta",
        "ta",
        "K",
        DateRange::parse("2000", "2000").unwrap(),
        "day",
        scalar_coordinates,
        vec![
            SourceFile {
                local_path: first,
                date_range: DateRange::parse("2000-01-01", "2000-01-03").unwrap(),
            },
            SourceFile {
                local_path: second,
                date_range: DateRange::parse("2000-01-04", "2000-01-06").unwrap(),
            },
        ],
        dest.clone(),
    )
    .unwrap();

    let translator = VariableTranslator::with_builtin_tables();
    MultiFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess()
        .unwrap();

    let out = Dataset::open(&dest).unwrap();
    assert_eq!(out.dim_len("time"), Some(6));
    assert!(!out.has_dim("plev"));
    assert!(out.var("ta").is_none());

    let ta500 = out.var("ta500").unwrap();
    assert_eq!(ta500.dims, vec!["time".to_string(), "lat".to_string()]);
    // level index 1 of each (time, plev, lat) block survives
    assert_eq!(ta500.data.first(), Some(&2.0));
    assert_eq!(ta500.data.last(), Some(&23.0));

    let plev = out.var("plev").unwrap();
    assert_eq!(plev.ndim(), 0);
    assert_eq!(plev.data.iter().next(), Some(&500.0));
}

#[test]
fn test_level_request_forces_chunked_strategy() {
    let one_file = vec![SourceFile {
        local_path: PathBuf::from("ta.nc"),
        date_range: DateRange::Static,
    }];
    let plain = tas_spec(
        one_file.clone(),
        DateRange::Static,
        PathBuf::from("out.nc"),
    );
    assert!(!plain.needs_chunked_strategy());

    let mut scalar_coordinates = BTreeMap::new();
    scalar_coordinates.insert("pressure".to_string(), 500.0);
    let leveled = VarSpec::new(
        "ta",
        "ta",
        "K",
        DateRange::Static,
        "day",
        scalar_coordinates,
        one_file,
        PathBuf::from("out.nc"),
    )
    .unwrap();
    assert!(leveled.needs_chunked_strategy());

    let two_files = tas_spec(
        vec![
            SourceFile {
                local_path: PathBuf::from("a.nc"),
                date_range: DateRange::Static,
            },
            SourceFile {
                local_path: PathBuf::from("b.nc"),
                date_range: DateRange::Static,
            },
        ],
        DateRange::Static,
        PathBuf::from("out.nc"),
    );
    assert!(two_files.needs_chunked_strategy());
}

#[test]
fn test_single_file_level_request_extracts_level() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("ta.nc");
    let dest = dir.path().join("ta500.nc");
    write_ta_chunk(&input, &[0.0, 1.0, 2.0], 0.0);

    let mut scalar_coordinates = BTreeMap::new();
    scalar_coordinates.insert("pressure".to_string(), 500.0);
    let var = VarSpec::new(
        "ta",
        "ta",
        "K",
        DateRange::parse("2000", "2000").unwrap(),
        "day",
        scalar_coordinates,
        vec![SourceFile {
            local_path: input,
            date_range: DateRange::parse("2000-01-01", "2000-01-03").unwrap(),
        }],
        dest.clone(),
    )
    .unwrap();
    assert!(var.needs_chunked_strategy());

    let translator = VariableTranslator::with_builtin_tables();
    MultiFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess()
        .unwrap();

    let out = Dataset::open(&dest).unwrap();
    assert!(!out.has_dim("plev"));
    assert!(out.var("ta").is_none());
    assert_eq!(out.var("ta500").unwrap().dims[0], "time");
    assert_eq!(out.dim_len("time"), Some(3));
}

#[test]
fn test_multi_file_rejects_inconsistent_chunks() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("ta.0.nc");
    let second = dir.path().join("ta.1.nc");
    write_ta_chunk(&first, &[0.0, 1.0, 2.0], 0.0);
    // overlapping time values with the first chunk
    write_ta_chunk(&second, &[2.0, 3.0, 4.0], 8.0);

    let var = VarSpec::new(
        "ta",
        "ta",
        "K",
        DateRange::parse("2000", "2000").unwrap(),
        "day",
        BTreeMap::new(),
        vec![
            SourceFile {
                local_path: first,
                date_range: DateRange::Static,
            },
            SourceFile {
                local_path: second,
                date_range: DateRange::Static,
            },
        ],
        dir.path().join("out.nc"),
    )
    .unwrap();

    let translator = VariableTranslator::with_builtin_tables();
    let result = MultiFilePreprocessor::new(&cmip_config(), &translator, var)
        .unwrap()
        .preprocess();
    match result {
        Err(PrepError::MergeConsistency { msg }) => assert!(msg.contains("'ta'")),
        other => panic!("expected MergeConsistency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_job_file_loading() {
    let dir = tempdir().unwrap();
    let job_path = dir.path().join("job.json");
    fs::write(
        &job_path,
        r#"{
            "convention": "NCAR",
            "frequency": "day",
            "variables": [
                {
                    "name": "tas",
                    "units": "K",
                    "date_range": { "start": "2000", "end": "2004" },
                    "files": [
                        { "path": "tas.0.nc", "start": "2000", "end": "2002" },
                        { "path": "tas.1.nc", "start": "2003", "end": "2004" }
                    ],
                    "dest": "out/tas.nc"
                }
            ]
        }"#,
    )
    .unwrap();

    let job = JobSpec::from_path(&job_path).unwrap();
    assert_eq!(job.convention, "NCAR");
    assert_eq!(job.variables.len(), 1);

    let translator = VariableTranslator::with_builtin_tables();
    let var = job.variables[0]
        .to_var_spec(&translator, &job.convention, &job.frequency)
        .unwrap();
    // the model-native name comes from the NCAR translation table
    assert_eq!(var.name_in_model, "TREFHT");
    assert_eq!(var.files.len(), 2);
    assert_eq!(var.frequency, "day");
    assert!(!var.date_range.is_static());
}

#[test]
fn test_job_file_rejects_malformed_json() {
    let dir = tempdir().unwrap();
    let job_path = dir.path().join("bad.json");
    fs::write(&job_path, "{ not json").unwrap();
    assert!(JobSpec::from_path(&job_path).is_err());
}
