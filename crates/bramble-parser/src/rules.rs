//! Rule schemas: which attributes each rule type accepts and how they are typed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The semantic type an attribute is coerced into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrType {
    String,
    Bool,
    Int,
    /// A file path relative to the declaring package.
    Path,
    /// A build target, absolute or relative (`:name`).
    Target,
    /// A string that may contain `$(macro args)` references.
    StringWithMacros,
    List(Box<AttrType>),
    Dict(Box<AttrType>),
}

impl AttrType {
    pub fn list(inner: AttrType) -> Self {
        AttrType::List(Box::new(inner))
    }

    pub fn dict(inner: AttrType) -> Self {
        AttrType::Dict(Box::new(inner))
    }

    /// Collections default to empty when omitted.
    pub(crate) fn has_empty_default(&self) -> bool {
        matches!(self, AttrType::List(_) | AttrType::Dict(_))
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => f.write_str("string"),
            AttrType::Bool => f.write_str("bool"),
            AttrType::Int => f.write_str("int"),
            AttrType::Path => f.write_str("path"),
            AttrType::Target => f.write_str("target"),
            AttrType::StringWithMacros => f.write_str("string_with_macros"),
            AttrType::List(inner) => write!(f, "list<{inner}>"),
            AttrType::Dict(inner) => write!(f, "dict<string, {inner}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSpec {
    pub name: String,
    pub ty: AttrType,
    pub required: bool,
}

/// The ordered constructor-argument table of one rule type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSchema {
    name: String,
    is_test: bool,
    attrs: Vec<AttrSpec>,
}

impl RuleSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_test: false,
            attrs: Vec::new(),
        }
    }

    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }

    pub fn required(self, name: impl Into<String>, ty: AttrType) -> Self {
        self.attr(name, ty, true)
    }

    pub fn optional(self, name: impl Into<String>, ty: AttrType) -> Self {
        self.attr(name, ty, false)
    }

    fn attr(mut self, name: impl Into<String>, ty: AttrType, required: bool) -> Self {
        let name = name.into();
        self.attrs.retain(|existing| existing.name != name);
        self.attrs.push(AttrSpec { name, ty, required });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub fn attrs(&self) -> &[AttrSpec] {
        &self.attrs
    }

    pub fn attr_spec(&self, name: &str) -> Option<&AttrSpec> {
        self.attrs.iter().find(|attr| attr.name == name)
    }
}

/// Rule type name to schema. Built once and shared by every node factory.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<RuleSchema>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: RuleSchema) -> &mut Self {
        self.rules
            .insert(schema.name().to_owned(), Arc::new(schema));
        self
    }

    pub fn get(&self, rule_type: &str) -> Option<&Arc<RuleSchema>> {
        self.rules.get(rule_type)
    }

    pub fn rule_types(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// The generic rules every project gets.
    pub fn builtin() -> Self {
        let paths = || AttrType::list(AttrType::Path);
        let targets = || AttrType::list(AttrType::Target);
        let strings = || AttrType::list(AttrType::String);

        let mut registry = Self::new();
        registry
            .register(
                RuleSchema::new("library")
                    .optional("srcs", paths())
                    .optional("resources", paths())
                    .optional("deps", targets())
                    .optional("exported_deps", targets())
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("binary")
                    .optional("srcs", paths())
                    .optional("main", AttrType::String)
                    .optional("deps", targets())
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("test")
                    .test()
                    .optional("srcs", paths())
                    .optional("deps", targets())
                    .optional("env", AttrType::dict(AttrType::StringWithMacros))
                    .optional("timeout_ms", AttrType::Int)
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("genrule")
                    .optional("srcs", paths())
                    .required("cmd", AttrType::StringWithMacros)
                    .required("out", AttrType::String)
                    .optional("deps", targets())
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("filegroup")
                    .optional("srcs", paths())
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("alias")
                    .required("actual", AttrType::Target)
                    .optional("labels", strings()),
            )
            .register(
                RuleSchema::new("export_file")
                    .optional("src", AttrType::Path)
                    .optional("out", AttrType::String)
                    .optional("executable", AttrType::Bool)
                    .optional("labels", strings()),
            );
        registry
    }
}
