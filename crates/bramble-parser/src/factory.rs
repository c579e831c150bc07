use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use bramble_core::{BuildTarget, Cell, CellRegistry};
use indexmap::IndexMap;

use crate::coercer::{CoercedValue, CoercionContext};
use crate::error::{CoercionError, ParserError};
use crate::macros::MacroRegistry;
use crate::node::{ConstructorArgs, RuleType, TargetNode};
use crate::raw::{RawTargetNode, RawValue, INTERNAL_KEY_PREFIX, NAME_KEY, TYPE_KEY, VISIBILITY_KEY};
use crate::rules::{AttrType, RuleRegistry};
use crate::visibility::VisibilitySpecification;

const DEPS_FIELD: &str = "deps";

/// Builds [`TargetNode`]s from raw evaluator output.
#[derive(Debug, Clone)]
pub struct TargetNodeFactory {
    rules: Arc<RuleRegistry>,
    macros: Arc<MacroRegistry>,
    enforce_package_boundary: bool,
}

impl TargetNodeFactory {
    pub fn new(rules: Arc<RuleRegistry>, macros: Arc<MacroRegistry>) -> Self {
        Self {
            rules,
            macros,
            enforce_package_boundary: true,
        }
    }

    pub fn with_package_boundary_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_package_boundary = enforce;
        self
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Coerces `raw` into a node for `target`. A flavored target shares the raw node of its
    /// unflavored short name.
    pub fn create(
        &self,
        cells: &CellRegistry,
        cell: &Cell,
        build_file: &Path,
        target: &BuildTarget,
        raw: &RawTargetNode,
    ) -> Result<TargetNode, ParserError> {
        let rule_name = raw.rule_type().unwrap_or_default();
        let error = |field: &str, value: &RawValue, reason: String| {
            ParserError::Coercion(CoercionError {
                target: target.clone(),
                rule_type: rule_name.to_owned(),
                field: field.to_owned(),
                value: value.to_string(),
                reason,
            })
        };

        let Some(schema) = self.rules.get(rule_name) else {
            return Err(error(
                TYPE_KEY,
                &RawValue::from(rule_name),
                format!("unknown rule type `{rule_name}`"),
            ));
        };

        for (key, value) in raw.iter() {
            let reserved = matches!(key, NAME_KEY | TYPE_KEY | VISIBILITY_KEY)
                || key.starts_with(INTERNAL_KEY_PREFIX);
            if !reserved && schema.attr_spec(key).is_none() {
                return Err(error(key, value, "unexpected attribute".to_owned()));
            }
        }

        let ctx = CoercionContext {
            cells,
            cell,
            target,
            rule_type: rule_name,
            macros: &self.macros,
            enforce_package_boundary: self.enforce_package_boundary,
        };

        let mut args = IndexMap::with_capacity(schema.attrs().len());
        for attr in schema.attrs() {
            let value = match raw.get(&attr.name) {
                Some(RawValue::Null) | None if attr.required => {
                    return Err(error(
                        attr.name.as_str(),
                        &RawValue::Null,
                        "missing required attribute".to_owned(),
                    ));
                }
                Some(RawValue::Null) | None => match &attr.ty {
                    AttrType::List(_) => CoercedValue::List(Vec::new()),
                    AttrType::Dict(_) => CoercedValue::Dict(IndexMap::new()),
                    _ => continue,
                },
                Some(value) => ctx.coerce(&attr.name, &attr.ty, value)?,
            };
            args.insert(attr.name.clone(), value);
        }

        let mut declared_deps = BTreeSet::new();
        let mut extra_deps = BTreeSet::new();
        for (field, value) in &args {
            let into = if field == DEPS_FIELD {
                &mut declared_deps
            } else {
                &mut extra_deps
            };
            for dep in value.targets() {
                if dep == target {
                    return Err(error(
                        field.as_str(),
                        &RawValue::from(dep.to_string()),
                        "a target cannot depend on itself".to_owned(),
                    ));
                }
                into.insert(dep.clone());
            }
        }
        extra_deps.retain(|dep| !declared_deps.contains(dep));

        let visibility = match raw.get(VISIBILITY_KEY) {
            None | Some(RawValue::Null) => VisibilitySpecification::default(),
            Some(value @ RawValue::List(items)) => {
                let entries = items
                    .iter()
                    .map(|item| {
                        item.as_str().ok_or_else(|| {
                            error(VISIBILITY_KEY, value, "expected a list of strings".to_owned())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                VisibilitySpecification::parse(entries, cell.name(), cells)
                    .map_err(|err| error(VISIBILITY_KEY, value, err.to_string()))?
            }
            Some(value) => {
                return Err(error(
                    VISIBILITY_KEY,
                    value,
                    format!("expected a list of strings, got {}", value.type_name()),
                ))
            }
        };

        Ok(TargetNode {
            build_target: target.clone(),
            rule_type: RuleType {
                name: schema.name().to_owned(),
                is_test: schema.is_test(),
            },
            build_file: build_file.to_path_buf(),
            args: ConstructorArgs(args),
            declared_deps,
            extra_deps,
            visibility,
        })
    }
}
