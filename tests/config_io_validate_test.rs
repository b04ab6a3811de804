//! Configuration file I/O and validation.

use helios::config::{Config, SocSourceKind};

#[test]
fn yaml_roundtrip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helios.yaml");

    let mut config = Config::default();
    config.charging.max_rate = 32;
    config.schedule.stop_time = "21:00".to_string();
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.charging.max_rate, 32);
    assert_eq!(loaded.schedule.stop_time, "21:00");
    assert_eq!(loaded.charging.ratio, 0.98);
}

#[test]
fn partial_yaml_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helios.yaml");
    std::fs::write(
        &path,
        "charging:\n  soc_ceiling: 75\nvehicle:\n  source: secondary\n",
    )
    .unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.charging.soc_ceiling, 75);
    assert_eq!(loaded.charging.min_rate, 6);
    assert_eq!(loaded.vehicle.source, SocSourceKind::Secondary);
    assert_eq!(loaded.poll_interval_secs, 15);
    loaded.validate().unwrap();
}

#[test]
fn malformed_yaml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helios.yaml");
    std::fs::write(&path, "charging: [not, a, map]").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/helios.yaml").is_err());
}

#[test]
fn out_of_range_values_fail_validation() {
    let mut config = Config::default();
    config.vehicle.source = SocSourceKind::Secondary;

    config.location.latitude = 95.0;
    assert!(config.validate().is_err());

    config.location.latitude = 37.32;
    config.charging.soc_ceiling = 140;
    assert!(config.validate().is_err());

    config.charging.soc_ceiling = 60;
    config.schedule.timezone = "Mars/Olympus_Mons".to_string();
    assert!(config.validate().is_err());

    config.schedule.timezone = "America/Los_Angeles".to_string();
    config.poll_interval_secs = 0;
    assert!(config.validate().is_err());
}
