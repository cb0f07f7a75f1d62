use alignkit_core::geometry::RotationMethod;
use alignkit_core::{AxisDir, Point3, RotDir};
use alignkit_settings::{
    AlignmentConstants, AlignmentParams, ConfigFormat, ConfigProvider, FileConfig, SettingsError,
};
use tempfile::TempDir;

fn custom_params() -> AlignmentParams {
    AlignmentParams {
        calib_move: Point3::new(1.5, 1.5, 2.0),
        offset_limit: Point3::new(5.0, 5.0, 1.0),
        offset_trim: Point3::new(0.01, -0.02, 0.0),
        x_positive: AxisDir::Left,
        y_positive: AxisDir::Up,
        u_rotation: RotDir::Cw,
        rotation_method: RotationMethod::CircleFit,
    }
}

#[test]
fn missing_files_load_defaults() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path().join("nested"), ConfigFormat::Json);

    assert_eq!(cfg.load_params().unwrap(), AlignmentParams::default());
    assert_eq!(cfg.load_constants().unwrap(), AlignmentConstants::default());
}

#[test]
fn json_round_trip_creates_directory() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path().join("AlignmentData"), ConfigFormat::Json);

    cfg.save_params(&custom_params()).unwrap();
    cfg.save_constants(&AlignmentConstants::default()).unwrap();

    assert!(cfg.params_path().exists());
    assert_eq!(cfg.load_params().unwrap(), custom_params());
    assert_eq!(cfg.load_constants().unwrap(), AlignmentConstants::default());
}

#[test]
fn toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path(), ConfigFormat::Toml);

    cfg.save_params(&custom_params()).unwrap();
    cfg.save_constants(&AlignmentConstants::default()).unwrap();

    assert_eq!(cfg.load_params().unwrap(), custom_params());
    assert_eq!(cfg.load_constants().unwrap(), AlignmentConstants::default());
}

#[test]
fn partial_document_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path(), ConfigFormat::Json);
    std::fs::write(
        cfg.params_path(),
        r#"{ "calib_move": { "x": 2.0, "y": 2.0, "u": 1.0 } }"#,
    )
    .unwrap();

    let params = cfg.load_params().unwrap();
    assert_eq!(params.calib_move, Point3::new(2.0, 2.0, 1.0));
    assert_eq!(params.y_positive, AxisDir::Down);
}

#[test]
fn malformed_document_is_an_error() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path(), ConfigFormat::Json);
    std::fs::write(cfg.constants_path(), "{ not json").unwrap();

    assert!(matches!(
        cfg.load_constants(),
        Err(SettingsError::JsonError(_))
    ));
}

#[test]
fn empty_pattern_on_disk_fails_validation() {
    let dir = TempDir::new().unwrap();
    let cfg = FileConfig::new(dir.path(), ConfigFormat::Json);
    std::fs::write(
        cfg.constants_path(),
        r#"{ "calib_pos_matrix": [], "calib_move_matrix": [] }"#,
    )
    .unwrap();

    assert!(matches!(
        cfg.load_constants(),
        Err(SettingsError::InvalidSetting { .. })
    ));
}
