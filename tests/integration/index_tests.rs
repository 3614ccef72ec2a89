use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dirmatch::index::{BuildOptions, DirectoryIndex, IndexError};
use dirmatch::plugins::PluginHandle;
use dirmatch::scanner::WalkerConfig;
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use super::support::{build, digest, media, write, CountingDigest};

fn sample_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "docs/b.txt", "beta");
    write(dir.path(), "docs/deep/c.txt", "gamma");
    write(dir.path(), "empty.txt", "");
    dir
}

#[test]
fn test_build_records_every_file() {
    let tree = sample_tree();
    let index = build(tree.path(), &digest());

    let mut paths: Vec<&str> = index
        .entries()
        .iter()
        .map(|e| e.relative_path.as_str())
        .collect();
    paths.sort_unstable();
    assert_eq!(paths, vec!["a.txt", "docs/b.txt", "docs/deep/c.txt", "empty.txt"]);

    let c = index.find_by_name("c.txt")[0];
    assert_eq!(c.folder, "docs/deep");
    assert_eq!(c.size, Some(5));
    assert!(c.modified.is_some());
    assert!(c.fingerprint("blake3").is_some());
    assert_eq!(index.features(), ["blake3".to_string()]);
    assert_eq!(index.total_size(), 14);
}

#[test]
fn test_build_keeps_on_disk_spelling() {
    let tree = TempDir::new().unwrap();
    let nfd = "cafe\u{0301}.txt";
    write(tree.path(), &format!("sub/{nfd}"), "X");

    let index = build(tree.path(), &digest());
    let entry = &index.entries()[0];
    assert_eq!(entry.name, nfd);
    assert_eq!(entry.relative_path, format!("sub/{nfd}"));
    assert!(index.absolute_path(entry).is_file());
    assert!(entry.fingerprint("blake3").is_some());

    // Lookups accept either normal form.
    assert_eq!(index.find_by_name("café.txt").len(), 1);
    assert_eq!(index.find_by_name(nfd).len(), 1);

    let saved = tree.path().join("index.json");
    index.save(&saved).unwrap();
    let loaded = DirectoryIndex::load(&saved).unwrap();
    assert_eq!(loaded.entries()[0].relative_path, format!("sub/{nfd}"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_build_keeps_siblings_differing_in_normal_form() {
    let tree = TempDir::new().unwrap();
    write(tree.path(), "café.txt", "composed");
    write(tree.path(), "cafe\u{0301}.txt", "decomposed");

    let index = build(tree.path(), &digest());
    assert_eq!(index.len(), 2);

    let found = index.find_by_name("café.txt");
    assert_eq!(found.len(), 2);
    assert_ne!(found[0].relative_path, found[1].relative_path);
    for entry in found {
        assert!(index.absolute_path(entry).is_file());
        assert!(entry.fingerprint("blake3").is_some());
    }
}

#[test]
fn test_save_load_round_trip() {
    let tree = sample_tree();
    let out = TempDir::new().unwrap();
    let saved = out.path().join("index.json");

    let index = build(tree.path(), &digest());
    index.save(&saved).unwrap();
    let loaded = DirectoryIndex::load(&saved).unwrap();

    assert_eq!(loaded.entries(), index.entries());
    assert_eq!(loaded.root(), index.root());
    assert_eq!(loaded.features(), index.features());
    assert_eq!(
        loaded.indexed_on().timestamp_micros(),
        index.indexed_on().timestamp_micros()
    );
}

#[test]
fn test_save_replaces_existing_file_without_leftovers() {
    let tree = sample_tree();
    let out = TempDir::new().unwrap();
    let saved = out.path().join("index.json");
    fs::write(&saved, "old").unwrap();

    build(tree.path(), &[]).save(&saved).unwrap();

    assert!(DirectoryIndex::load(&saved).is_ok());
    let names: Vec<_> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("index.json")]);
}

#[test]
fn test_build_missing_root() {
    let dir = TempDir::new().unwrap();
    let result = DirectoryIndex::build(&dir.path().join("nope"), &[], &BuildOptions::default());
    assert!(matches!(result, Err(IndexError::PathNotFound(_))));
}

#[test]
fn test_build_file_root() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "file.txt", "x");
    let result = DirectoryIndex::build(&file, &[], &BuildOptions::default());
    assert!(matches!(result, Err(IndexError::NotADirectory(_))));
}

#[test]
fn test_build_interrupted() {
    let tree = sample_tree();
    let options = BuildOptions::default().with_shutdown_flag(Arc::new(AtomicBool::new(true)));
    let result = DirectoryIndex::build(tree.path(), &digest(), &options);
    assert!(matches!(result, Err(IndexError::Interrupted)));
}

#[test]
fn test_build_honors_walker_settings() {
    let tree = sample_tree();
    write(tree.path(), ".hidden/secret.txt", "s");
    write(tree.path(), "scratch.tmp", "t");

    let options = BuildOptions::default().with_walker(WalkerConfig::new(
        false,
        true,
        vec!["*.tmp".to_string()],
    ));
    let index = DirectoryIndex::build(tree.path(), &[], &options).unwrap();

    assert!(index.find_by_name("secret.txt").is_empty());
    assert!(index.find_by_name("scratch.tmp").is_empty());
    assert_eq!(index.len(), 4);
}

#[test]
fn test_media_plugin_skips_non_audio_files() {
    let tree = TempDir::new().unwrap();
    write(tree.path(), "song.mp3", "TAG:artist=x\naudio-frames");
    write(tree.path(), "book.m4b", "TAG:chapter=1\naudio-frames");
    write(tree.path(), "notes.txt", "text");

    let index = build(tree.path(), &media());
    assert!(index.find_by_name("song.mp3")[0]
        .fingerprint("media_checksum")
        .is_some());
    assert_eq!(
        index.find_by_name("book.m4b")[0].fingerprint("media_checksum"),
        index.find_by_name("song.mp3")[0].fingerprint("media_checksum")
    );
    assert!(index.find_by_name("notes.txt")[0]
        .fingerprint("media_checksum")
        .is_none());
}

#[test]
fn test_require_features() {
    let tree = sample_tree();
    let index = build(tree.path(), &digest());

    assert!(index.require_features(&digest()).is_ok());
    let err = index.require_features(&media()).unwrap_err();
    match err {
        IndexError::MissingFeature { feature, .. } => assert_eq!(feature, "media_checksum"),
        other => panic!("Expected MissingFeature, got {other:?}"),
    }
}

#[test]
fn test_refresh_reuses_unchanged_fingerprints() {
    let tree = sample_tree();
    let counting = CountingDigest::new();
    let plugins: Vec<PluginHandle> = vec![counting.clone()];

    let mut index = build(tree.path(), &plugins);
    assert_eq!(counting.calls(), 4);
    counting.reset();

    let stats = index.refresh(&plugins, &BuildOptions::default()).unwrap();
    assert_eq!(stats.unchanged, 4);
    assert_eq!(stats.reused_fingerprints, 4);
    assert_eq!(stats.recomputed, 0);
    assert_eq!(counting.calls(), 0);
}

#[test]
fn test_refresh_matches_full_rebuild() {
    let tree = sample_tree();
    let counting = CountingDigest::new();
    let plugins: Vec<PluginHandle> = vec![counting.clone()];
    let mut index = build(tree.path(), &plugins);

    // Same size, new content and a distinct mtime.
    let changed = write(tree.path(), "a.txt", "ALPHA");
    let later = SystemTime::now() + Duration::from_secs(120);
    set_file_mtime(&changed, FileTime::from_system_time(later)).unwrap();
    write(tree.path(), "new.txt", "fresh");
    fs::remove_file(tree.path().join("docs/b.txt")).unwrap();

    counting.reset();
    let stats = index.refresh(&plugins, &BuildOptions::default()).unwrap();
    assert_eq!(stats.changed, 1);
    assert_eq!(stats.added, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(stats.recomputed, 2);
    assert_eq!(counting.calls(), 2);

    let rebuilt = build(tree.path(), &digest());
    assert_eq!(index.entries(), rebuilt.entries());
}

#[test]
fn test_refresh_adds_and_drops_features() {
    let tree = sample_tree();
    let mut index = build(tree.path(), &[]);
    assert!(index.entries().iter().all(|e| e.fingerprints.is_empty()));

    let stats = index.refresh(&digest(), &BuildOptions::default()).unwrap();
    assert_eq!(stats.recomputed, 4);
    assert!(index.has_feature("blake3"));
    assert!(index.entries().iter().all(|e| e.fingerprint("blake3").is_some()));

    index.refresh(&[], &BuildOptions::default()).unwrap();
    assert!(index.features().is_empty());
    assert!(index.entries().iter().all(|e| e.fingerprints.is_empty()));
}

#[test]
fn test_refresh_interrupted_leaves_index_untouched() {
    let tree = sample_tree();
    let mut index = build(tree.path(), &digest());
    let before = index.entries().to_vec();
    write(tree.path(), "new.txt", "fresh");

    let options = BuildOptions::default().with_shutdown_flag(Arc::new(AtomicBool::new(true)));
    let result = index.refresh(&digest(), &options);

    assert!(matches!(result, Err(IndexError::Interrupted)));
    assert_eq!(index.entries(), before.as_slice());
}

#[test]
fn test_refresh_after_load() {
    let tree = sample_tree();
    let out = TempDir::new().unwrap();
    let saved = out.path().join("index.json");
    build(tree.path(), &digest()).save(&saved).unwrap();

    let counting = CountingDigest::new();
    let plugins: Vec<PluginHandle> = vec![counting.clone()];
    let mut loaded = DirectoryIndex::load(&saved).unwrap();
    let stats = loaded.refresh(&plugins, &BuildOptions::default()).unwrap();

    assert_eq!(stats.reused_fingerprints, 4);
    assert_eq!(counting.calls(), 0);
}

mod corruption {
    use super::*;
    use serde_json::Value;

    fn saved_index() -> (TempDir, TempDir, std::path::PathBuf) {
        let tree = sample_tree();
        let out = TempDir::new().unwrap();
        let saved = out.path().join("index.json");
        build(tree.path(), &digest()).save(&saved).unwrap();
        (tree, out, saved)
    }

    fn edit(path: &std::path::Path, f: impl FnOnce(&mut Value)) {
        let mut value: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        f(&mut value);
        fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    fn assert_corrupt(path: &std::path::Path) {
        match DirectoryIndex::load(path) {
            Err(IndexError::Corrupt { .. }) => {}
            other => panic!("Expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_file() {
        let (_tree, _out, saved) = saved_index();
        let bytes = fs::read(&saved).unwrap();
        fs::write(&saved, &bytes[..bytes.len() / 2]).unwrap();
        assert_corrupt(&saved);
    }

    #[test]
    fn test_missing_key() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| {
            v.as_object_mut().unwrap().remove("features");
        });
        assert_corrupt(&saved);
    }

    #[test]
    fn test_length_mismatch() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| v["length"] = Value::from(99));
        assert_corrupt(&saved);
    }

    #[test]
    fn test_checksum_mismatch() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| v["index"][0]["modified"] = Value::from(1.0));
        assert_corrupt(&saved);
    }

    #[test]
    fn test_duplicate_path_without_checksum() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| {
            let first = v["index"][0].clone();
            let entries = v["index"].as_array_mut().unwrap();
            entries.push(first);
            let len = entries.len();
            v["length"] = Value::from(len);
            v.as_object_mut().unwrap().remove("checksum");
        });
        assert_corrupt(&saved);
    }

    #[test]
    fn test_name_not_matching_path() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| {
            v["index"][0]["name"] = Value::from("other.txt");
            v.as_object_mut().unwrap().remove("checksum");
        });
        assert_corrupt(&saved);
    }

    #[test]
    fn test_non_string_fingerprint() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| {
            v["index"][0]["blake3"] = Value::from(42);
            v.as_object_mut().unwrap().remove("checksum");
        });
        assert_corrupt(&saved);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let out = TempDir::new().unwrap();
        let result = DirectoryIndex::load(&out.path().join("absent.json"));
        assert!(matches!(result, Err(IndexError::Io { .. })));
    }

    #[test]
    fn test_null_fingerprint_loads_as_absent() {
        let (_tree, _out, saved) = saved_index();
        edit(&saved, |v| {
            v["index"][0]["blake3"] = Value::Null;
            v.as_object_mut().unwrap().remove("checksum");
        });
        let loaded = DirectoryIndex::load(&saved).unwrap();
        assert!(loaded.entries()[0].fingerprint("blake3").is_none());
    }
}
