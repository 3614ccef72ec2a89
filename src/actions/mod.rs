//! Actions applied to evaluated target files.
//!
//! Only deletion exists: a target file with a reference counterpart can be
//! moved to the system trash or removed permanently.
//!
//! ```no_run
//! use dirmatch::actions::delete::{delete_to_trash, DeleteConfig};
//! use std::path::PathBuf;
//!
//! let path = PathBuf::from("/path/to/copy.txt");
//! let result = delete_to_trash(&path);
//! ```

pub mod delete;

pub use delete::{
    delete_to_trash, delete_verified, permanent_delete, DeleteConfig, DeleteError, DeleteResult,
    FileSnapshot,
};
