//! Cooperative cancellation and progress reporting.
//!
//! Every long loop in the builders takes a `&CancelToken` and polls it once
//! per object. The foreground side keeps a clone and flips it.
//!
//! ## Rust Lesson #24: Shared Flags Across Threads
//!
//! `Arc<AtomicBool>` is the smallest thing two threads can both own and
//! both touch without a lock. `Arc` shares ownership, the atomic makes
//! the read/write safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Progress sink: receives a fraction in `0.0..=1.0`.
pub type Progress<'a> = &'a dyn Fn(f64);

/// A progress sink that ignores every report.
pub fn no_progress(_fraction: f64) {}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled, so loops can use `?`.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
