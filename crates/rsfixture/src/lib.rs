//! # rsfixture — label-driven test orchestration with injected fixtures
//!
//! Tests, hooks and fixtures are plain functions. Their parameters are
//! resolved by type: a fixture returning `Widget` satisfies every `Widget`
//! parameter, and a [`Handle`] parameter receives the running test.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use rsfixture::{Engine, Handle};
//!
//! #[derive(Clone)]
//! struct Widget {
//!     parts: Vec<&'static str>,
//! }
//!
//! fn build_widget() -> Widget {
//!     Widget { parts: vec!["gear", "spring"] }
//! }
//!
//! fn widget_has_parts(t: Handle, w: Widget) {
//!     if w.parts.is_empty() {
//!         t.fail("widget has no parts");
//!     }
//! }
//!
//! fn main() {
//!     let mut engine = Engine::new();
//!     engine.declare_label("unit");
//!     engine.register_fixture(build_widget).unwrap();
//!     engine.register_test("widget_has_parts", widget_has_parts, &[]).unwrap();
//!     engine.run_main();
//! }
//! ```
//!
//! Run with `cargo test -- --labels unit,integration` to choose labels, or
//! set `RSFIXTURE_LABELS`. Logging goes through `tracing`; set
//! `RSFIXTURE_LOG=debug` to see resolution and hook activity.
//!
//! ## Features
//!
//! - `googletest` — re-exports `googletest` matchers via `rsfixture::matchers`

pub mod container;
pub mod engine;
pub mod error;
mod handle;
pub mod labels;
pub mod logging;
pub mod provider;
pub mod runner;

pub use container::{FixtureTable, Scope};
pub use engine::{Engine, RegisteredHook, RegisteredTest};
pub use error::{Error, ErrorKind, HookStage, Result};
pub use handle::{Handle, Phase};
pub use labels::{LabelRegistry, LabelSet, DEFAULT_LABEL};
pub use provider::{Callable, FnProvider, Injectable, OnceProvider, Outcome, Param, Provider, TypeKey, Value};
pub use runner::{RunConfig, RunSummary, Status, TestReport};

/// Re-export of the [`googletest`] crate. Available with the `googletest` feature.
#[cfg(feature = "googletest")]
pub use googletest;

/// Composable matchers re-exported from [`googletest::prelude`].
#[cfg(feature = "googletest")]
pub mod matchers {
    pub use googletest::prelude::*;
}

/// A drop guard that runs cleanup code even if the enclosing code panics.
pub struct Guard<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Guard<F> {
    pub fn new(f: F) -> Self {
        Guard { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for Guard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}
