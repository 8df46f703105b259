//! # rsfixture_directives — find fixtures, tests and hooks in Rust source
//!
//! Doc comments carry directives such as `@fixture`, `@test(integration)` or
//! `@testLabel(blackbox, black_)`. Functions without a directive can still be
//! classified by name prefix (`fixture_`, `pre`, `post`, `test`, ...).
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! let result = rsfixture_directives::parse_dir(Path::new("tests/suite"), ".rs", true).unwrap();
//! for warning in &result.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! println!("{}", result.to_json().unwrap());
//! ```

pub mod directive;
pub mod resolver;
pub mod source;

pub use directive::{Directive, DirectiveKind, DirectiveParseError};
pub use resolver::{resolve, LabeledFunction, ParseResult};
pub use source::{scan_dir, scan_source, DeclaredFunction, ScanError, Signature, SourceUnit};

use std::path::Path;

/// Scan `dir` for files ending in `suffix` and resolve them as one package.
pub fn parse_dir(dir: &Path, suffix: &str, auto_classify: bool) -> Result<ParseResult, ScanError> {
    let unit = scan_dir(dir, suffix)?;
    Ok(resolve(&unit, auto_classify))
}
