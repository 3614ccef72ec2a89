//! Unicode name normalization and relative path keys.
//!
//! macOS stores file names in NFD (decomposed) form while Linux and Windows
//! usually hand out NFC. The same visible name can therefore have two byte
//! representations:
//!
//! - NFC: `café.txt` - 'é' is U+00E9 (single code point)
//! - NFD: `café.txt` - 'e' U+0065 + combining acute accent U+0301
//!
//! Indexed paths keep the exact on-disk spelling, since that is what opens
//! the file. Only name lookups go through NFC, so a reference tree indexed
//! on one platform can be compared with a target tree on another.
//!
//! ```
//! use dirmatch::scanner::path_utils::{names_equal, normalize_name};
//!
//! let nfc = "café.txt";
//! let nfd = "cafe\u{0301}.txt";
//! assert_eq!(normalize_name(nfd), nfc);
//! assert!(names_equal(nfc, nfd));
//! ```

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Separator used in persisted relative paths, on every platform.
pub const KEY_SEPARATOR: char = '/';

/// Normalize a name to NFC, borrowing when it already is.
#[must_use]
pub fn normalize_name(s: &str) -> Cow<'_, str> {
    if is_nfc(s) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.nfc().collect())
    }
}

/// Compare two names after NFC normalization.
#[must_use]
pub fn names_equal(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Normalized base name of a path, if it has one.
#[must_use]
pub fn file_name_key(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| normalize_name(&n.to_string_lossy()).into_owned())
}

/// Relative location of a file inside an indexed tree, spelled as on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeKey {
    /// Containing directory, `/`-separated, empty for the root
    pub folder: String,
    /// File name, not normalized
    pub name: String,
    /// `folder/name`, or just `name` at the root
    pub path: String,
}

impl RelativeKey {
    /// Build the key of `path` relative to `root`.
    ///
    /// Returns `None` when `path` is not strictly below `root`, or when a
    /// segment is not valid UTF-8 and so cannot be stored losslessly.
    #[must_use]
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let mut segments: Vec<&str> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }

        let name = segments.pop()?.to_string();
        let folder = segments.join(&KEY_SEPARATOR.to_string());
        let path = if folder.is_empty() {
            name.clone()
        } else {
            format!("{folder}{KEY_SEPARATOR}{name}")
        };
        Some(Self { folder, name, path })
    }
}

/// Join a persisted `/`-separated relative path onto a native root.
#[must_use]
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split(KEY_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}
