//! Signal handling for graceful shutdown.
//!
//! Ctrl+C sets a shared `AtomicBool`. Walks, fingerprinting and evaluation
//! check it once per file and stop early; an interrupted build is never
//! saved.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dirmatch::index::BuildOptions;
//! use dirmatch::signal::install_handler;
//!
//! let token = install_handler().expect("Failed to install signal handler");
//! let options = BuildOptions::default().with_shutdown_flag(token.flag());
//!
//! if token.is_cancelled() {
//!     println!("Interrupted");
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for `with_shutdown_flag` builders.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Install a Ctrl+C handler that cancels the returned token.
///
/// The handler is process-wide. Later calls (several `run_app` invocations
/// in one test binary, say) reset and return the same token. When another
/// component already owns the Ctrl+C hook, an unhooked token is returned
/// that can still be cancelled manually.
///
/// # Errors
///
/// Currently always succeeds; the `Result` leaves room for platforms where
/// installation must be reported.
pub fn install_handler() -> Result<CancellationToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancellationToken::new();
    let flag = token.flag();

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_TOKEN.set(token.clone());
            Ok(GLOBAL_TOKEN.get().cloned().unwrap_or(token))
        }
        Err(e) => {
            if let Some(existing) = GLOBAL_TOKEN.get() {
                existing.reset();
                return Ok(existing.clone());
            }
            log::debug!("Ctrl+C handler already registered ({}), using unhooked token", e);
            let fallback = CancellationToken::new();
            let _ = GLOBAL_TOKEN.set(fallback.clone());
            Ok(GLOBAL_TOKEN.get().cloned().unwrap_or(fallback))
        }
    }
}
