//! Integration tests for turning form values into a detection configuration.
//!
//! Tests cover:
//! - Default form values for calibrated images
//! - Refusing uncalibrated images before a form exists
//! - Normalization, threshold and pixel size validation
//! - Optional cell expansion, constrain scale and channel
//! - Building twice gives equal configurations

mod common;

use common::*;
use nucdetect::config::{DEFAULT_NORMALIZE_HIGH, DEFAULT_NORMALIZE_LOW, DEFAULT_THRESHOLD, NOT_SET};
use nucdetect::default_parameters;

#[test]
fn test_default_parameters_for_calibrated_image() -> anyhow::Result<()> {
    let dir = create_model_dir(&["b_model.pb", "a_model.pb"]);
    let catalog = ModelCatalog::new(dir.path());
    let image = ImageData::new(
        "slide.tif",
        create_nuclei_image(10, 10, &[], 1),
        PixelCalibration {
            pixel_width_microns: Some(0.25),
            pixel_height_microns: Some(0.35),
        },
    );

    let params = default_parameters(&image, &catalog)?;
    assert_eq!(params.path_model, "a_model.pb");
    assert!((params.pixel_size - 0.3).abs() < 1e-12);
    assert_eq!(params.threshold, DEFAULT_THRESHOLD);
    assert_eq!(params.normalize_percentiles_low, DEFAULT_NORMALIZE_LOW);
    assert_eq!(params.normalize_percentiles_high, DEFAULT_NORMALIZE_HIGH);
    assert_eq!(params.channel, "");
    assert_eq!(params.cell_expansion, NOT_SET);
    assert_eq!(params.cell_constrain_scale, NOT_SET);
    assert!(!params.measure_shape && !params.measure_intensity && !params.include_probability);

    Ok(())
}

#[test]
fn test_uncalibrated_image_has_no_form() {
    let (catalog, _dir) = create_test_catalog();
    let image = uncalibrated(create_nuclei_image(10, 10, &[], 1));

    let result = default_parameters(&image, &catalog);
    assert_eq!(
        result,
        Err(DetectionError::Validation(ValidationError::UnknownPixelSize))
    );
}

#[test]
fn test_form_requires_models() {
    let dir = create_model_dir(&[]);
    let catalog = ModelCatalog::new(dir.path());
    let image = calibrated(create_nuclei_image(10, 10, &[], 1));

    assert!(matches!(
        default_parameters(&image, &catalog),
        Err(DetectionError::Configuration(ConfigurationError::NoModels { .. }))
    ));
}

#[test]
fn test_build_carries_values() -> anyhow::Result<()> {
    let (catalog, dir) = create_test_catalog();
    let mut raw = make_raw_params(TEST_MODEL);
    raw.threshold = 0.45;
    raw.normalize_percentiles_low = 2.0;
    raw.normalize_percentiles_high = 99.8;
    raw.measure_shape = true;
    raw.include_probability = true;

    let config = DetectionConfigBuilder::new(&catalog).build(&raw)?;
    assert_eq!(config.model_path(), dir.path().join(TEST_MODEL));
    assert_eq!(config.threshold(), 0.45);
    assert_eq!(config.normalize_percentiles(), (2.0, 99.8));
    assert_eq!(config.pixel_size_microns(), TEST_PIXEL_SIZE);
    assert_eq!(config.channel(), None);
    assert!(config.measure_shape());
    assert!(!config.measure_intensity());
    assert!(config.include_probability());

    Ok(())
}

#[test]
fn test_build_unknown_model() {
    let (catalog, _dir) = create_test_catalog();
    let raw = make_raw_params("other.pb");

    assert_eq!(
        DetectionConfigBuilder::new(&catalog).build(&raw),
        Err(DetectionError::Configuration(ConfigurationError::UnknownModel(
            "other.pb".to_string()
        )))
    );
}

#[test]
fn test_build_rejects_inverted_normalization() {
    let (catalog, _dir) = create_test_catalog();
    let builder = DetectionConfigBuilder::new(&catalog);

    for (low, high) in [(99.0, 1.0), (50.0, 50.0), (-1.0, 99.0), (1.0, 100.5)] {
        let mut raw = make_raw_params(TEST_MODEL);
        raw.normalize_percentiles_low = low;
        raw.normalize_percentiles_high = high;

        assert_eq!(
            builder.build(&raw),
            Err(DetectionError::Validation(ValidationError::NormalizationBounds { low, high })),
            "low={} high={} should be rejected",
            low,
            high
        );
    }
}

#[test]
fn test_build_accepts_full_percentile_range() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let mut raw = make_raw_params(TEST_MODEL);
    raw.normalize_percentiles_low = 0.0;
    raw.normalize_percentiles_high = 100.0;

    let config = DetectionConfigBuilder::new(&catalog).build(&raw)?;
    assert_eq!(config.normalize_percentiles(), (0.0, 100.0));
    Ok(())
}

#[test]
fn test_build_rejects_bad_threshold_and_pixel_size() {
    let (catalog, _dir) = create_test_catalog();
    let builder = DetectionConfigBuilder::new(&catalog);

    let mut raw = make_raw_params(TEST_MODEL);
    raw.threshold = 1.5;
    assert_eq!(
        builder.build(&raw),
        Err(DetectionError::Validation(ValidationError::Threshold(1.5)))
    );

    let mut raw = make_raw_params(TEST_MODEL);
    raw.pixel_size = 0.0;
    assert_eq!(
        builder.build(&raw),
        Err(DetectionError::Validation(ValidationError::PixelSize(0.0)))
    );
}

#[test]
fn test_cell_expansion_sentinel() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let builder = DetectionConfigBuilder::new(&catalog);

    let mut raw = make_raw_params(TEST_MODEL);
    raw.cell_expansion = -1.0;
    raw.cell_constrain_scale = 0.0;
    let config = builder.build(&raw)?;
    assert_eq!(config.cell_expansion_microns(), None);
    assert_eq!(config.cell_constrain_scale(), None);
    assert!(!config.expands_cells());

    raw.cell_expansion = 5.0;
    raw.cell_constrain_scale = 1.5;
    let config = builder.build(&raw)?;
    assert_eq!(config.cell_expansion_microns(), Some(5.0));
    assert_eq!(config.cell_constrain_scale(), Some(1.5));
    assert!(config.expands_cells());

    Ok(())
}

#[test]
fn test_constrain_scale_without_expansion_is_kept() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let mut raw = make_raw_params(TEST_MODEL);
    raw.cell_constrain_scale = 2.0;

    let config = DetectionConfigBuilder::new(&catalog).build(&raw)?;
    assert_eq!(config.cell_expansion_microns(), None);
    assert_eq!(config.cell_constrain_scale(), Some(2.0));
    Ok(())
}

#[test]
fn test_channel_blank_and_verbatim() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let builder = DetectionConfigBuilder::new(&catalog);

    let mut raw = make_raw_params(TEST_MODEL);
    raw.channel = "   \t".to_string();
    assert_eq!(builder.build(&raw)?.channel(), None);

    raw.channel = "DAPI".to_string();
    assert_eq!(builder.build(&raw)?.channel(), Some("DAPI"));

    Ok(())
}

#[test]
fn test_build_is_idempotent() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let mut raw = make_raw_params(TEST_MODEL);
    raw.cell_expansion = 3.0;
    raw.channel = "blue".to_string();

    let builder = DetectionConfigBuilder::new(&catalog);
    let first = builder.build(&raw)?;
    let second = builder.build(&raw)?;
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn test_raw_params_from_json_uses_sentinels() -> anyhow::Result<()> {
    let raw: RawParams = serde_json::from_str(
        r#"{
            "path_model": "dsb2018_heavy_augment.pb",
            "threshold": 0.5,
            "normalize_percentiles_low": 1.0,
            "normalize_percentiles_high": 99.0,
            "pixel_size": 0.5
        }"#,
    )?;
    assert_eq!(raw.cell_expansion, NOT_SET);
    assert_eq!(raw.cell_constrain_scale, NOT_SET);
    assert_eq!(raw.channel, "");
    assert!(!raw.measure_shape);

    Ok(())
}

#[test]
fn test_build_rejects_non_finite_values() {
    let (catalog, _dir) = create_test_catalog();
    let builder = DetectionConfigBuilder::new(&catalog);

    let cases: [(&str, fn(&mut RawParams)); 8] = [
        ("nan threshold", |raw| raw.threshold = f64::NAN),
        ("infinite threshold", |raw| raw.threshold = f64::INFINITY),
        ("nan low percentile", |raw| raw.normalize_percentiles_low = f64::NAN),
        ("nan high percentile", |raw| raw.normalize_percentiles_high = f64::NAN),
        ("infinite high percentile", |raw| raw.normalize_percentiles_high = f64::INFINITY),
        ("nan pixel size", |raw| raw.pixel_size = f64::NAN),
        ("infinite pixel size", |raw| raw.pixel_size = f64::INFINITY),
        ("negative infinite pixel size", |raw| raw.pixel_size = f64::NEG_INFINITY),
    ];

    for (name, edit) in cases {
        let mut raw = make_raw_params(TEST_MODEL);
        edit(&mut raw);
        let result = builder.build(&raw);
        assert!(
            matches!(result, Err(DetectionError::Validation(_))),
            "{} should be rejected, got {:?}",
            name,
            result
        );
    }
}

#[test]
fn test_non_finite_cell_options_mean_not_set() -> anyhow::Result<()> {
    let (catalog, _dir) = create_test_catalog();
    let mut raw = make_raw_params(TEST_MODEL);
    raw.cell_expansion = f64::NAN;
    raw.cell_constrain_scale = f64::INFINITY;

    let config = DetectionConfigBuilder::new(&catalog).build(&raw)?;
    assert_eq!(config.cell_expansion_microns(), None);
    assert_eq!(config.cell_constrain_scale(), None);
    Ok(())
}
