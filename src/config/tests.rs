use super::*;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.editor.read_cap_lines, 1000);
    assert_eq!(config.listing.prefetch_threshold, 15);
    assert_eq!(config.service.kind, ServiceKind::Memory);
}

#[test]
fn test_partial_yaml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "service:\n  kind: http\n  base_url: http://drive.local:9000\nlisting:\n  page_size: 5\naccount: erin@example.com\n",
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.service.kind, ServiceKind::Http);
    assert_eq!(config.service.base_url, "http://drive.local:9000");
    assert_eq!(config.service.timeout_secs, 30);
    assert_eq!(config.listing.page_size, 5);
    assert_eq!(config.listing.prefetch_threshold, 15);
    assert_eq!(config.account.as_deref(), Some("erin@example.com"));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yaml");
    let mut config = Config::default();
    config.editor.read_cap_lines = 42;
    config.logging.level = "debug".to_string();

    save_config(&config, &path).unwrap();
    assert_eq!(load_config(&path).unwrap(), config);
}

#[test]
fn test_invalid_yaml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "service: [unterminated").unwrap();
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_expand_tilde() {
    assert_eq!(expand_tilde("/etc/drivepad"), PathBuf::from("/etc/drivepad"));
    if let Some(home) = dirs::home_dir() {
        assert_eq!(expand_tilde("~/x.yaml"), home.join("x.yaml"));
        assert_eq!(collapse_tilde(&home.join("a")), "~/a");
    }
}
