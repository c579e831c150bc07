use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bramble_core::BuildTarget;
use indexmap::IndexMap;

use crate::coercer::CoercedValue;
use crate::visibility::{VisibilityError, VisibilitySpecification};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleType {
    pub name: String,
    pub is_test: bool,
}

/// Coerced attributes in rule-schema order. Omitted optional scalars are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructorArgs(pub(crate) IndexMap<String, CoercedValue>);

impl ConstructorArgs {
    pub fn get(&self, field: &str) -> Option<&CoercedValue> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoercedValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A validated, typed target. Dependencies are identifiers, resolved by the graph builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNode {
    pub(crate) build_target: BuildTarget,
    pub(crate) rule_type: RuleType,
    pub(crate) build_file: PathBuf,
    pub(crate) args: ConstructorArgs,
    pub(crate) declared_deps: BTreeSet<BuildTarget>,
    pub(crate) extra_deps: BTreeSet<BuildTarget>,
    pub(crate) visibility: VisibilitySpecification,
}

impl TargetNode {
    pub fn build_target(&self) -> &BuildTarget {
        &self.build_target
    }

    pub fn rule_type(&self) -> &RuleType {
        &self.rule_type
    }

    pub fn is_test(&self) -> bool {
        self.rule_type.is_test
    }

    pub fn build_file(&self) -> &Path {
        &self.build_file
    }

    pub fn args(&self) -> &ConstructorArgs {
        &self.args
    }

    /// Targets listed in `deps`.
    pub fn declared_deps(&self) -> &BTreeSet<BuildTarget> {
        &self.declared_deps
    }

    /// Every other referenced target, including macro arguments.
    pub fn extra_deps(&self) -> &BTreeSet<BuildTarget> {
        &self.extra_deps
    }

    /// Declared and extra dependencies, sorted.
    pub fn deps(&self) -> BTreeSet<&BuildTarget> {
        self.declared_deps.iter().chain(&self.extra_deps).collect()
    }

    pub fn visibility(&self) -> &VisibilitySpecification {
        &self.visibility
    }

    /// Checks that `dependent` may depend on this node.
    pub fn check_visible_to(&self, dependent: &BuildTarget) -> Result<(), VisibilityError> {
        self.visibility.check(&self.build_target, dependent)
    }
}
