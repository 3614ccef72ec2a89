use std::fs;
use std::path::PathBuf;

use dirmatch::config::Config;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Figment without Env, so variables set by other tests cannot interfere.
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
io_threads = 2
skip_hidden = true
ignore_patterns = ["*.tmp", "node_modules/"]
plugins = ["blake3", "media_checksum"]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();

    assert_eq!(config.io_threads, 2);
    assert!(config.skip_hidden);
    assert!(!config.follow_symlinks);
    assert_eq!(config.ignore_patterns, vec!["*.tmp", "node_modules/"]);
    assert_eq!(config.plugins, vec!["blake3", "media_checksum"]);
    assert_eq!(
        config.ffmpeg_path,
        Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
    );
    assert!(config.walker_config().skip_hidden);
}

#[test]
fn test_config_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = 2\nfollow_symlinks = false\n").unwrap();

    std::env::set_var("DIRMATCH_IO_THREADS", "16");
    std::env::set_var("DIRMATCH_FOLLOW_SYMLINKS", "true");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("DIRMATCH_").split("__"))
        .extract()
        .unwrap();

    std::env::remove_var("DIRMATCH_IO_THREADS");
    std::env::remove_var("DIRMATCH_FOLLOW_SYMLINKS");

    assert_eq!(config.io_threads, 16);
    assert!(config.follow_symlinks);
}

#[test]
fn test_config_load_explicit_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "use_trash = true\nplugins = [\"blake3\"]\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert!(config.use_trash);
    assert_eq!(config.plugins, vec!["blake3"]);
}

#[test]
fn test_config_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let config = Config {
        io_threads: 8,
        ignore_patterns: vec!["*.bak".to_string()],
        use_trash: true,
        ..Config::default()
    };
    config.save(&path).unwrap();

    let reloaded: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_config_invalid_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "invalid = toml").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract();
    assert!(result.is_err());
}
