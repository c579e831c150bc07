//! Build-file parsing and target-graph construction.
//!
//! Evaluated build files are cached per cell in [`DaemonicParserState`] and survive across
//! requests until a watcher event invalidates them. A [`Parser`] turns that state into typed
//! [`TargetNode`]s, resolves command-line [`TargetNodeSpec`]s and builds acyclic,
//! visibility-checked [`TargetGraph`]s, optionally warming the caches on a rayon pool first.

mod cancel;
mod cell_state;
mod coercer;
mod daemon_state;
mod error;
mod evaluator;
mod factory;
mod graph;
mod macros;
mod node;
mod parser;
mod per_build;
mod raw;
mod rules;
mod spec;
mod traversal;
mod visibility;

pub use cancel::CancellationToken;
pub use coercer::CoercedValue;
pub use daemon_state::{CacheStats, DaemonicParserState};
pub use error::{CoercionError, ParserError};
pub use evaluator::{BuildFileEvaluator, BuildFileParseError, JsonBuildFileEvaluator, INCLUDES_KEY};
pub use factory::TargetNodeFactory;
pub use graph::{TargetGraph, TargetGraphBuilder};
pub use macros::{MacroInvocation, MacroKind, MacroRegistry, StringPart, StringWithMacros};
pub use node::{ConstructorArgs, RuleType, TargetNode};
pub use parser::{ParseOptions, Parser};
pub use per_build::ParseProfiler;
pub use raw::{
    BuildFileManifest, RawTargetNode, RawValue, BASE_PATH_KEY, DIRECT_DEPENDENCIES_KEY,
    INTERNAL_KEY_PREFIX, NAME_KEY, TYPE_KEY, VISIBILITY_KEY,
};
pub use rules::{AttrSpec, AttrType, RuleRegistry, RuleSchema};
pub use spec::{
    BuildFileSpec, BuildTargetSpec, CommandLineTargetNodeSpecParser, TargetNodePredicateSpec,
    TargetNodeSpec,
};
pub use traversal::{AcyclicDepthFirstPostOrderTraversal, GraphTraversalVisitor, TraversalError};
pub use visibility::{VisibilityError, VisibilityPattern, VisibilitySpecification};
