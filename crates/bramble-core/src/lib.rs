//! Core identifiers shared by every Bramble crate.
//!
//! - [`Cell`] / [`CellRegistry`]: project roots, their build-file name and ignore set.
//! - [`BuildTarget`]: `cell//package:name#flavors`.
//! - [`BuildTargetPattern`]: command-line and visibility patterns over targets.

mod cell;
mod ignore;
mod path;
mod pattern;
mod target;

pub use cell::{
    Cell, CellError, CellName, CellNameResolver, CellRegistry, CellRegistryBuilder,
    DEFAULT_BUILD_FILE_NAME,
};
pub use ignore::{IgnoreError, IgnoreSet, IgnoreSetBuilder};
pub use path::{normalize_path, package_path_to_relative, to_package_path};
pub use pattern::{BuildTargetPattern, PatternKind};
pub use target::{
    BuildTarget, BuildTargetParseError, Flavor, BUILD_TARGET_PREFIX, FLAVOR_SEPARATOR,
};
