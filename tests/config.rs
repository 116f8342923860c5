use std::path::PathBuf;

use tempfile::TempDir;

use taskmirror::config::Config;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.store.path, PathBuf::from(".taskmirror/tasks.json"));
    assert_eq!(config.sync.label, "taskmirror");
    assert_eq!(config.git.repo_dir, PathBuf::from("."));
    assert_eq!(config.git.default_branch, "main");
    assert!(!config.logging.enabled);
    assert_eq!(config.logging.level, "info");
    assert!(!config.github.enabled);
    assert_eq!(config.github.token_env, "GITHUB_TOKEN");
    assert!(!config.shortcut.enabled);
    assert_eq!(config.shortcut.token_env, "SHORTCUT_API_TOKEN");
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_merges_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("taskmirror.toml");
    std::fs::write(
        &path,
        r#"
[sync]
label = "mirror"

[github]
enabled = true
owner = "acme"
repo = "widgets"
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.sync.label, "mirror");
    assert!(config.github.enabled);
    assert_eq!(config.github.owner, "acme");
    // Untouched sections keep their defaults.
    assert_eq!(config.github.token_env, "GITHUB_TOKEN");
    assert_eq!(config.git.default_branch, "main");
    assert_eq!(config.store.path, PathBuf::from(".taskmirror/tasks.json"));
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("taskmirror.toml");
    std::fs::write(&path, "").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.sync.label, "taskmirror");
}

#[test]
fn test_invalid_toml_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("taskmirror.toml");
    std::fs::write(&path, "sync = nonsense").unwrap();
    assert!(Config::load_from_file(&path).is_err());
}

#[test]
fn test_github_enabled_requires_owner_and_repo() {
    let mut config = Config::default();
    config.github.enabled = true;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("github.owner"));

    config.github.owner = "acme".to_string();
    config.github.repo = "widgets".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_shortcut_enabled_requires_state_ids() {
    let mut config = Config::default();
    config.shortcut.enabled = true;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("state_id"));

    config.shortcut.open_state_id = 500;
    config.shortcut.done_state_id = 501;
    assert!(config.validate().is_ok());
}

#[test]
fn test_label_rejects_whitespace_and_colon() {
    let mut config = Config::default();
    config.sync.label = "has space".to_string();
    assert!(config.validate().is_err());

    config.sync.label = "has:colon".to_string();
    assert!(config.validate().is_err());

    config.sync.label = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_logging_level_rejected() {
    let mut config = Config::default();
    config.logging.level = "verbose".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn test_generate_default_config_creates_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    Config::generate_default_config(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# taskmirror Configuration File"));

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.sync.label, "taskmirror");
}
