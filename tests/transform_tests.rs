//! Behavior of the individual transforms on in-memory datasets.

use clim_prep::axes::{AxisMap, AxisRole};
use clim_prep::dataset::{AttrValue, DataVar, Dataset, Dimension};
use clim_prep::dates::{Calendar, DateRange, TimeEncoding};
use clim_prep::errors::PrepError;
use clim_prep::pipeline::{PreprocessContext, SourceFile, VarSpec};
use clim_prep::transforms::{CropTimeRange, ExtractVerticalLevel, TransformFunction};
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn var_spec(range: DateRange, pressure: Option<f64>) -> VarSpec {
    let mut scalar_coordinates = BTreeMap::new();
    if let Some(p) = pressure {
        scalar_coordinates.insert("pressure".to_string(), p);
    }
    VarSpec::new(
        "ta",
        "ta",
        "K",
        range,
        "day",
        scalar_coordinates,
        vec![SourceFile {
            local_path: PathBuf::from("in.nc"),
            date_range: DateRange::Static,
        }],
        PathBuf::from("out.nc"),
    )
    .unwrap()
}

fn context(var: VarSpec, axes: AxisMap, calendar: Option<Calendar>) -> PreprocessContext {
    PreprocessContext {
        var,
        convention: "CMIP".to_string(),
        frequency: "day".to_string(),
        axes,
        calendar,
    }
}

/// Daily noleap time series: 731 samples spanning 1999-06-01 .. 2001-06-01.
fn daily_time_series() -> Dataset {
    let n = 731usize;
    let time_values: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let mut time_attrs = BTreeMap::new();
    time_attrs.insert(
        "units".to_string(),
        AttrValue::Str("days since 1999-06-01".to_string()),
    );
    time_attrs.insert(
        "calendar".to_string(),
        AttrValue::Str("noleap".to_string()),
    );
    let encoding = TimeEncoding::parse("days since 1999-06-01", Some("noleap".to_string()));

    Dataset {
        dims: vec![Dimension {
            name: "time".to_string(),
            len: n,
        }],
        attrs: BTreeMap::new(),
        vars: vec![
            DataVar {
                name: "time".to_string(),
                dims: vec!["time".to_string()],
                data: ArrayD::from_shape_vec(IxDyn(&[n]), time_values.clone()).unwrap(),
                attrs: time_attrs,
                time_encoding: encoding,
            },
            DataVar {
                name: "ta".to_string(),
                dims: vec!["time".to_string()],
                data: ArrayD::from_shape_vec(IxDyn(&[n]), time_values).unwrap(),
                attrs: BTreeMap::new(),
                time_encoding: None,
            },
        ],
    }
}

fn time_axes() -> AxisMap {
    let mut axes = AxisMap::new();
    axes.insert(AxisRole::Var, "ta");
    axes.insert(AxisRole::T, "time");
    axes
}

#[test]
fn test_crop_year_keeps_whole_year() {
    let ds = daily_time_series();
    let ctx = context(
        var_spec(DateRange::parse("2000", "2000").unwrap(), None),
        time_axes(),
        Some(Calendar::NoLeap),
    );

    let cropped = CropTimeRange::new().process_dataset(ds, &ctx).unwrap();

    // 1999-06-01 + 214 days is 2000-01-01 under noleap
    assert_eq!(cropped.dim_len("time"), Some(365));
    let time = cropped.var("time").unwrap();
    assert_eq!(time.data.first(), Some(&214.0));
    assert_eq!(time.data.last(), Some(&578.0));
    assert_eq!(cropped.var("ta").unwrap().data.len(), 365);
}

#[test]
fn test_crop_fails_when_data_ends_too_early() {
    let ds = daily_time_series();
    let ctx = context(
        var_spec(DateRange::parse("2000", "2005").unwrap(), None),
        time_axes(),
        Some(Calendar::NoLeap),
    );
    match CropTimeRange::new().process_dataset(ds, &ctx) {
        Err(PrepError::DataRange { var, msg }) => {
            assert_eq!(var, "ta");
            assert!(msg.contains("before requested date range end"));
        }
        other => panic!("expected DataRange error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_crop_fails_when_data_starts_too_late() {
    let ds = daily_time_series();
    let ctx = context(
        var_spec(DateRange::parse("1998", "2000").unwrap(), None),
        time_axes(),
        Some(Calendar::NoLeap),
    );
    match CropTimeRange::new().process_dataset(ds, &ctx) {
        Err(PrepError::DataRange { msg, .. }) => {
            assert!(msg.contains("after requested date range start"));
        }
        other => panic!("expected DataRange error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_crop_passes_through_static_range() {
    let ds = daily_time_series();
    let ctx = context(
        var_spec(DateRange::Static, None),
        time_axes(),
        Some(Calendar::NoLeap),
    );
    let out = CropTimeRange::new().process_dataset(ds, &ctx).unwrap();
    assert_eq!(out.dim_len("time"), Some(731));
}

#[test]
fn test_crop_passes_through_without_time_axis() {
    let ds = daily_time_series();
    let mut axes = AxisMap::new();
    axes.insert(AxisRole::Var, "ta");
    let ctx = context(
        var_spec(DateRange::parse("2000", "2000").unwrap(), None),
        axes,
        None,
    );
    let out = CropTimeRange::new().process_dataset(ds, &ctx).unwrap();
    assert_eq!(out.dim_len("time"), Some(731));
}

#[test]
fn test_crop_requires_calendar() {
    let ds = daily_time_series();
    let ctx = context(
        var_spec(DateRange::parse("2000", "2000").unwrap(), None),
        time_axes(),
        None,
    );
    match CropTimeRange::new().process_dataset(ds, &ctx) {
        Err(PrepError::CalendarResolution { var }) => assert_eq!(var, "ta"),
        other => panic!(
            "expected CalendarResolution error, got {:?}",
            other.map(|_| ())
        ),
    }
}

/// 3-level pressure field: ta(plev, lat) with plev in the given units.
fn pressure_field(plev_values: &[f64], plev_units: Option<&str>) -> Dataset {
    let nlev = plev_values.len();
    let mut plev_attrs = BTreeMap::new();
    if let Some(units) = plev_units {
        plev_attrs.insert(
            "units".to_string(),
            AttrValue::Str(units.to_string()),
        );
    }
    let ta_values: Vec<f64> = (0..nlev * 2).map(|i| i as f64).collect();

    Dataset {
        dims: vec![
            Dimension {
                name: "plev".to_string(),
                len: nlev,
            },
            Dimension {
                name: "lat".to_string(),
                len: 2,
            },
        ],
        attrs: BTreeMap::new(),
        vars: vec![
            DataVar {
                name: "plev".to_string(),
                dims: vec!["plev".to_string()],
                data: ArrayD::from_shape_vec(IxDyn(&[nlev]), plev_values.to_vec()).unwrap(),
                attrs: plev_attrs,
                time_encoding: None,
            },
            DataVar {
                name: "ta".to_string(),
                dims: vec!["plev".to_string(), "lat".to_string()],
                data: ArrayD::from_shape_vec(IxDyn(&[nlev, 2]), ta_values).unwrap(),
                attrs: BTreeMap::new(),
                time_encoding: None,
            },
        ],
    }
}

fn level_axes() -> AxisMap {
    let mut axes = AxisMap::new();
    axes.insert(AxisRole::Var, "ta");
    axes.insert(AxisRole::Z, "plev");
    axes
}

#[test]
fn test_extract_level_renames_and_drops_axis() {
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, Some(500.0)), level_axes(), None);

    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();

    assert!(!out.has_dim("plev"));
    assert!(out.var("ta").is_none());
    let ta500 = out.var("ta500").unwrap();
    assert_eq!(ta500.dims, vec!["lat".to_string()]);
    let values: Vec<f64> = ta500.data.iter().copied().collect();
    assert_eq!(values, vec![2.0, 3.0]);
    // the coordinate collapses to a scalar holding the selected level
    let plev = out.var("plev").unwrap();
    assert_eq!(plev.ndim(), 0);
    assert_eq!(plev.data.iter().next(), Some(&500.0));
}

#[test]
fn test_extract_level_converts_pascal_axis() {
    let ds = pressure_field(&[100000.0, 50000.0, 25000.0], Some("Pa"));
    let ctx = context(var_spec(DateRange::Static, Some(500.0)), level_axes(), None);

    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();
    assert!(out.var("ta500").is_some());
    assert_eq!(out.var("plev").unwrap().data.iter().next(), Some(&50000.0));
}

#[test]
fn test_extract_level_requires_exact_match() {
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, Some(700.0)), level_axes(), None);

    match ExtractVerticalLevel::new().process_file(ds, &ctx) {
        Err(PrepError::LevelNotFound { var, level }) => {
            assert_eq!(var, "ta");
            assert_eq!(level, 700);
        }
        other => panic!("expected LevelNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_extract_level_suffix_truncates_fractional_levels() {
    let ds = pressure_field(&[1000.0, 512.7, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, Some(512.7)), level_axes(), None);
    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();
    assert!(out.var("ta512").is_some());

    // the truncated level also names the failure
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, Some(512.7)), level_axes(), None);
    match ExtractVerticalLevel::new().process_file(ds, &ctx) {
        Err(PrepError::LevelNotFound { level, .. }) => assert_eq!(level, 512),
        other => panic!("expected LevelNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_context_finds_variable_after_rename() {
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, Some(500.0)), level_axes(), None);
    assert_eq!(ctx.var_name_in(&ds), Some("ta".to_string()));

    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();
    assert_eq!(ctx.var_name_in(&out), Some("ta500".to_string()));
}

#[test]
fn test_extract_level_rejects_unknown_units() {
    let ds = pressure_field(&[1.0, 0.5, 0.25], Some("sigma"));
    let ctx = context(var_spec(DateRange::Static, Some(500.0)), level_axes(), None);
    assert!(ExtractVerticalLevel::new().process_file(ds, &ctx).is_err());
}

#[test]
fn test_extract_skipped_without_scalar_coordinate() {
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let ctx = context(var_spec(DateRange::Static, None), level_axes(), None);

    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();
    assert!(out.has_dim("plev"));
    assert!(out.var("ta").is_some());
}

#[test]
fn test_extract_skipped_without_vertical_axis() {
    let ds = pressure_field(&[1000.0, 500.0, 250.0], Some("hPa"));
    let mut axes = AxisMap::new();
    axes.insert(AxisRole::Var, "ta");
    let ctx = context(var_spec(DateRange::Static, Some(500.0)), axes, None);

    let out = ExtractVerticalLevel::new().process_file(ds, &ctx).unwrap();
    assert!(out.has_dim("plev"));
}
