//! Untyped evaluator output.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const NAME_KEY: &str = "name";
pub const TYPE_KEY: &str = "type";
pub const VISIBILITY_KEY: &str = "visibility";
pub const BASE_PATH_KEY: &str = "bramble.base_path";
pub const DIRECT_DEPENDENCIES_KEY: &str = "bramble.direct_dependencies";

/// Prefix of attribute keys that belong to the engine rather than to a rule.
pub const INTERNAL_KEY_PREFIX: &str = "bramble.";

/// A structural value produced by build-file evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<RawValue>),
    Map(IndexMap<String, RawValue>),
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "integer",
            RawValue::String(_) => "string",
            RawValue::List(_) => "list",
            RawValue::Map(_) => "dict",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(value: Vec<T>) -> Self {
        RawValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// The attributes of one declared target, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTargetNode {
    attrs: IndexMap<String, RawValue>,
}

impl RawTargetNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.attrs.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY).and_then(RawValue::as_str)
    }

    pub fn rule_type(&self) -> Option<&str> {
        self.get(TYPE_KEY).and_then(RawValue::as_str)
    }

    pub fn base_path(&self) -> Option<&str> {
        self.get(BASE_PATH_KEY).and_then(RawValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl From<IndexMap<String, RawValue>> for RawTargetNode {
    fn from(attrs: IndexMap<String, RawValue>) -> Self {
        Self { attrs }
    }
}

/// Everything one build-file evaluation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFileManifest {
    targets: IndexMap<String, RawTargetNode>,
    includes: Vec<PathBuf>,
}

impl BuildFileManifest {
    /// Validates and indexes evaluator output. Every node needs a string `name` and `type`, and
    /// names must be unique within the file.
    pub fn new(nodes: Vec<RawTargetNode>, includes: Vec<PathBuf>) -> Result<Self, String> {
        let mut targets = IndexMap::with_capacity(nodes.len());
        for (idx, node) in nodes.into_iter().enumerate() {
            let Some(name) = node.name() else {
                return Err(format!("rule #{idx} has no string `{NAME_KEY}` attribute"));
            };
            if node.rule_type().is_none() {
                return Err(format!("rule `{name}` has no string `{TYPE_KEY}` attribute"));
            }
            let name = name.to_owned();
            if targets.contains_key(&name) {
                return Err(format!("duplicate rule definition `{name}`"));
            }
            targets.insert(name, node);
        }
        Ok(Self { targets, includes })
    }

    pub fn get(&self, short_name: &str) -> Option<&RawTargetNode> {
        self.targets.get(short_name)
    }

    pub fn targets(&self) -> impl ExactSizeIterator<Item = &RawTargetNode> {
        self.targets.values()
    }

    pub fn target_names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Files read while evaluating the build file, besides the build file itself.
    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    pub fn depends_on(&self, path: &Path) -> bool {
        self.includes.iter().any(|include| include == path)
    }

    pub(crate) fn stamp_base_path(&mut self, base_path: &str) {
        for node in self.targets.values_mut() {
            if node.get(BASE_PATH_KEY).is_none() {
                node.insert(BASE_PATH_KEY, base_path);
            }
        }
    }
}
