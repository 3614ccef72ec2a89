use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use dirmatch::cli::Cli;
use dirmatch::error::ExitCode;
use dirmatch::index::{DirectoryIndex, IndexError};
use dirmatch::plugins::PluginError;
use sha1::{Digest, Sha1};
use tempfile::TempDir;

use super::support::write;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), config).unwrap();
        fs::create_dir_all(dir.path().join("reference")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        Self { dir }
    }

    fn reference(&self) -> PathBuf {
        self.dir.path().join("reference")
    }

    fn target(&self) -> PathBuf {
        self.dir.path().join("target")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> (anyhow::Result<ExitCode>, String) {
        let config = self.path("config.toml");
        let mut argv = vec![
            "dirmatch".to_string(),
            "-q".to_string(),
            "--config".to_string(),
            config.to_string_lossy().into_owned(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));

        let cli = Cli::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        let result = dirmatch::run_app_with_writer(cli, false, &mut out);
        (result, String::from_utf8(out).unwrap())
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn scenario() -> Workspace {
    let ws = Workspace::new("");
    write(&ws.reference(), "a.txt", "X");
    write(&ws.target(), "b.txt", "X");
    write(&ws.target(), "c.txt", "Y");
    ws
}

#[test]
fn test_compare_prints_classification_lines() {
    let ws = scenario();
    let (result, out) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        &arg(&ws.reference()),
        "--blake3",
    ]);

    assert_eq!(result.unwrap(), ExitCode::Success);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Renamed:"));
    assert!(lines[0].ends_with("b.txt-->/a.txt"));
    assert!(lines[1].starts_with("Missing:"));
    assert!(lines[1].ends_with("c.txt-->|"));
}

#[test]
fn test_compare_json_output() {
    let ws = scenario();
    let (result, out) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        &arg(&ws.reference()),
        "--plugin",
        "blake3",
        "--output",
        "json",
    ]);

    assert_eq!(result.unwrap(), ExitCode::Success);
    let records: Vec<serde_json::Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["classification"], "Renamed");
    assert_eq!(records[0]["matched"], "a.txt");
    assert_eq!(records[0]["source"], "blake3");
    assert_eq!(records[1]["classification"], "Missing");
    assert!(records[1].get("matched").is_none());
    assert_eq!(records[2]["summary"]["evaluated"], 2);
    assert_eq!(records[2]["summary"]["exit_code"], 0);
}

#[test]
fn test_config_supplies_default_plugins() {
    let ws = Workspace::new("plugins = [\"blake3\"]\n");
    write(&ws.reference(), "a.txt", "X");
    write(&ws.target(), "b.txt", "X");

    let (result, out) = ws.run(&["compare", &arg(&ws.target()), &arg(&ws.reference())]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.starts_with("Renamed:"));
}

#[test]
fn test_build_index_then_compare_with_loaded_index() {
    let ws = scenario();
    let saved = ws.path("reference.json");
    let (result, out) = ws.run(&[
        "build-index",
        &arg(&ws.reference()),
        &arg(&saved),
        "--blake3",
    ]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.is_empty());

    let index = DirectoryIndex::load(&saved).unwrap();
    assert_eq!(index.len(), 1);
    assert!(index.has_feature("blake3"));

    // Without plugin flags the loaded index's own features are used.
    let (result, out) = ws.run(&["compare", &arg(&ws.target()), "--load-index", &arg(&saved)]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.lines().next().unwrap().starts_with("Renamed:"));
}

#[test]
fn test_compare_saves_built_index() {
    let ws = scenario();
    let saved = ws.path("saved.json");
    let (result, _) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        &arg(&ws.reference()),
        "--blake3",
        "--save-index",
        &arg(&saved),
    ]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert_eq!(DirectoryIndex::load(&saved).unwrap().len(), 1);
}

#[test]
fn test_compare_resaves_loaded_index() {
    let ws = scenario();
    let saved = ws.path("reference.json");
    let copy = ws.path("copy.json");
    ws.run(&["build-index", &arg(&ws.reference()), &arg(&saved), "--blake3"])
        .0
        .unwrap();

    let (result, _) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        "--load-index",
        &arg(&saved),
        "--save-index",
        &arg(&copy),
    ]);
    assert_eq!(result.unwrap(), ExitCode::Success);

    let original = DirectoryIndex::load(&saved).unwrap();
    let resaved = DirectoryIndex::load(&copy).unwrap();
    assert_eq!(resaved.root(), original.root());
    assert_eq!(resaved.features(), original.features());
    assert_eq!(resaved.entries(), original.entries());
}

fn sha1_hex(content: &[u8]) -> String {
    Sha1::digest(content)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[test]
fn test_compare_with_sha1_index_finds_renamed_file() {
    let ws = Workspace::new("");
    write(&ws.reference(), "music/a.txt", "X");
    write(&ws.reference(), "music/b.txt", "Z");
    write(&ws.target(), "renamed.txt", "X");
    write(&ws.target(), "new.txt", "Y");

    // Snapshot in the older layout: naive timestamp, leading '/' on folders,
    // no checksum.
    let saved = ws.path("legacy.json");
    let legacy = serde_json::json!({
        "directory": arg(&ws.reference()),
        "indexed_on": "2024-05-01T12:00:00.123456",
        "features": ["sha1"],
        "length": 2,
        "index": [
            {"name": "a.txt", "folder": "/music", "path": "/music/a.txt",
             "modified": 1714564800.5, "sha1": sha1_hex(b"X")},
            {"name": "b.txt", "folder": "/music", "path": "/music/b.txt",
             "modified": 1714564801.0, "sha1": sha1_hex(b"Z")}
        ]
    });
    fs::write(&saved, serde_json::to_vec(&legacy).unwrap()).unwrap();

    let (result, out) = ws.run(&["compare", &arg(&ws.target()), "--load-index", &arg(&saved)]);
    assert_eq!(result.unwrap(), ExitCode::Success);

    let renamed = ws.target().join("renamed.txt");
    let missing = ws.target().join("new.txt");
    assert!(out.contains(&format!("Renamed:{}-->/music/a.txt", renamed.display())));
    assert!(out.contains(&format!("Missing:{}-->|", missing.display())));
}

#[test]
fn test_compare_missing_feature_is_fatal() {
    let ws = scenario();
    let saved = ws.path("reference.json");
    ws.run(&["build-index", &arg(&ws.reference()), &arg(&saved)])
        .0
        .unwrap();

    let (result, out) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        "--load-index",
        &arg(&saved),
        "--blake3",
    ]);
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::MissingFeature { .. })
    ));
    assert!(out.is_empty());
}

#[test]
fn test_compare_corrupt_index_is_fatal() {
    let ws = scenario();
    let saved = ws.path("broken.json");
    fs::write(&saved, "{\"directory\": ").unwrap();

    let (result, _) = ws.run(&["compare", &arg(&ws.target()), "--load-index", &arg(&saved)]);
    assert!(matches!(
        result.unwrap_err().downcast_ref::<IndexError>(),
        Some(IndexError::Corrupt { .. })
    ));
}

#[test]
fn test_unknown_plugin_is_fatal() {
    let ws = scenario();
    let (result, _) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        &arg(&ws.reference()),
        "--plugin",
        "blake",
    ]);
    let err = result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<PluginError>(),
        Some(&PluginError::Unknown {
            name: "blake".to_string(),
            suggestion: Some("blake3".to_string()),
        })
    );
}

#[test]
fn test_compare_rm_deletes_matched_files() {
    let ws = Workspace::new("");
    write(&ws.reference(), "dup.txt", "same");
    let dup = write(&ws.target(), "dup.txt", "same");
    let other = write(&ws.target(), "other.txt", "different");

    let (result, out) = ws.run(&[
        "compare",
        &arg(&ws.target()),
        &arg(&ws.reference()),
        "--rm",
    ]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(!dup.exists());
    assert!(other.exists());
    assert!(ws.reference().join("dup.txt").exists());
    assert!(out.contains("Matched:"));
}

#[test]
fn test_compare_missing_target_is_fatal() {
    let ws = scenario();
    let (result, _) = ws.run(&[
        "compare",
        &arg(&ws.path("absent")),
        &arg(&ws.reference()),
    ]);
    assert!(result.is_err());
}

#[test]
fn test_refresh_index_picks_up_new_files() {
    let ws = scenario();
    let saved = ws.path("reference.json");
    ws.run(&["build-index", &arg(&ws.reference()), &arg(&saved), "--blake3"])
        .0
        .unwrap();
    write(&ws.reference(), "later.txt", "Y");

    let (result, _) = ws.run(&["refresh-index", &arg(&saved)]);
    assert_eq!(result.unwrap(), ExitCode::Success);

    let index = DirectoryIndex::load(&saved).unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.has_feature("blake3"));
    assert!(index.find_by_name("later.txt")[0]
        .fingerprint("blake3")
        .is_some());
}

#[test]
fn test_index_info() {
    let ws = scenario();
    let saved = ws.path("reference.json");
    ws.run(&["build-index", &arg(&ws.reference()), &arg(&saved), "--blake3"])
        .0
        .unwrap();

    let (result, out) = ws.run(&["index-info", &arg(&saved)]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.contains("Files:      1"));
    assert!(out.contains("Features:   blake3"));
}

#[test]
fn test_plugins_listing() {
    let ws = Workspace::new("");
    let (result, out) = ws.run(&["plugins"]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.lines().any(|l| l.starts_with("blake3")));
    assert!(out.lines().any(|l| l.starts_with("sha1")));
    assert!(out.lines().any(|l| l.starts_with("media_checksum")));
}

#[test]
fn test_invalid_config_is_reported() {
    let ws = Workspace::new("io_threads = \"many\"\n");
    let (result, _) = ws.run(&["plugins"]);
    assert!(result.is_err());
}
