//! `$(macro arg ...)` references embedded in string attributes.

use std::collections::HashMap;
use std::fmt;

use bramble_core::BuildTarget;

/// How a macro's arguments are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// Exactly one build-target argument, which becomes a dependency of the declaring target.
    Target,
}

#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, MacroKind>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, kind: MacroKind) -> &mut Self {
        self.macros.insert(name.into(), kind);
        self
    }

    pub fn get(&self, name: &str) -> Option<MacroKind> {
        self.macros.get(name).copied()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("location", MacroKind::Target)
            .register("exe", MacroKind::Target)
            .register("classpath", MacroKind::Target);
        registry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInvocation {
    pub name: String,
    pub target: BuildTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringPart {
    Literal(String),
    Macro(MacroInvocation),
}

/// A string attribute with its macro references resolved to targets.
///
/// Expansion into concrete output paths happens at build time; the parser only needs the
/// referenced targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringWithMacros {
    parts: Vec<StringPart>,
}

impl StringWithMacros {
    pub fn new(parts: Vec<StringPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[StringPart] {
        &self.parts
    }

    pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
        self.parts.iter().filter_map(|part| match part {
            StringPart::Macro(invocation) => Some(&invocation.target),
            StringPart::Literal(_) => None,
        })
    }
}

impl fmt::Display for StringWithMacros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                StringPart::Literal(text) => f.write_str(&text.replace('$', "$$"))?,
                StringPart::Macro(invocation) => {
                    write!(f, "$({} {})", invocation.name, invocation.target)?
                }
            }
        }
        Ok(())
    }
}

/// A macro reference before its arguments are interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UnresolvedPart {
    Literal(String),
    Macro { name: String, args: Vec<String> },
}

/// Splits `input` into literal text and macro references. `$$` is a literal dollar sign.
pub(crate) fn split_macros(input: &str) -> Result<Vec<UnresolvedPart>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                literal.push('$');
            }
            Some((_, '(')) => {
                chars.next();
                let mut depth = 1usize;
                let mut body = String::new();
                for (_, c) in chars.by_ref() {
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    body.push(c);
                }
                if depth != 0 {
                    return Err(format!("unterminated macro starting at offset {idx}"));
                }
                let mut words = body.split_whitespace().map(str::to_owned);
                let Some(name) = words.next() else {
                    return Err(format!("empty macro at offset {idx}"));
                };
                if !literal.is_empty() {
                    parts.push(UnresolvedPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(UnresolvedPart::Macro {
                    name,
                    args: words.collect(),
                });
            }
            _ => literal.push('$'),
        }
    }
    if !literal.is_empty() {
        parts.push(UnresolvedPart::Literal(literal));
    }
    Ok(parts)
}
