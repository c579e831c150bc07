use std::fmt;

use bramble_core::{BuildTarget, BuildTargetParseError, BuildTargetPattern, CellName, CellRegistry};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisibilityError {
    #[error("`{0}` is not visible to `{1}` (check the `visibility` attribute of `{0}`)")]
    NotVisibleTo(BuildTarget, BuildTarget),
}

/// One entry of a `visibility` list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisibilityPattern(pub BuildTargetPattern);

impl VisibilityPattern {
    pub const PUBLIC: &'static str = "PUBLIC";
}

impl fmt::Display for VisibilityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Who may depend on a target. Targets in the same package ignore each other's visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VisibilitySpecification {
    Public,
    /// An empty list is the default: visible only inside the package.
    VisibleTo(Vec<VisibilityPattern>),
    #[default]
    Private,
}

impl VisibilitySpecification {
    /// Parses the raw `visibility` strings of a target declared in `current_cell`.
    pub fn parse<'a>(
        entries: impl IntoIterator<Item = &'a str>,
        current_cell: &CellName,
        cells: &CellRegistry,
    ) -> Result<Self, BuildTargetParseError> {
        let mut patterns = Vec::new();
        for entry in entries {
            if entry == VisibilityPattern::PUBLIC {
                return Ok(VisibilitySpecification::Public);
            }
            patterns.push(VisibilityPattern(BuildTargetPattern::parse(
                entry,
                current_cell,
                cells,
            )?));
        }
        if patterns.is_empty() {
            Ok(VisibilitySpecification::Private)
        } else {
            Ok(VisibilitySpecification::VisibleTo(patterns))
        }
    }

    pub fn is_visible_to(&self, target: &BuildTarget) -> bool {
        match self {
            VisibilitySpecification::Public => true,
            VisibilitySpecification::VisibleTo(patterns) => {
                patterns.iter().any(|pattern| pattern.0.matches(target))
            }
            VisibilitySpecification::Private => false,
        }
    }

    /// Fails unless `dependent` may depend on `owner`, whose visibility this is.
    pub fn check(
        &self,
        owner: &BuildTarget,
        dependent: &BuildTarget,
    ) -> Result<(), VisibilityError> {
        if owner.is_in_package_of(dependent) || self.is_visible_to(dependent) {
            Ok(())
        } else {
            Err(VisibilityError::NotVisibleTo(owner.clone(), dependent.clone()))
        }
    }
}

impl fmt::Display for VisibilitySpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibilitySpecification::Public => write!(f, "[\"{}\"]", VisibilityPattern::PUBLIC),
            VisibilitySpecification::Private => f.write_str("[]"),
            VisibilitySpecification::VisibleTo(patterns) => {
                write!(f, "[")?;
                for (i, pattern) in patterns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{pattern}\"")?;
                }
                write!(f, "]")
            }
        }
    }
}
