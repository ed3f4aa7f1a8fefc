use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::is_constant_type;

/// A ground term: a named object of the world, such as `kitchen: r`.
///
/// Variables are compared by value. Constants (`P`, `I`) are variables
/// whose name equals their type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    name: Arc<str>,
    #[serde(rename = "type")]
    type_name: Arc<str>,
}

impl Variable {
    /// Create a variable of the given type.
    pub fn new(name: impl Into<Arc<str>>, type_name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a variable whose type is its own name, such as `P` or `I`.
    pub fn constant(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            type_name: name.clone(),
            name,
        }
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variable's name as a shared string.
    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// The variable's type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The variable's type name as a shared string.
    pub fn type_arc(&self) -> &Arc<str> {
        &self.type_name
    }

    /// Whether this variable is the singleton of a constant type.
    pub fn is_constant(&self) -> bool {
        is_constant_type(&self.type_name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.type_name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.type_name)
        }
    }
}

/// The type a placeholder gets when none is written: its name with trailing
/// apostrophes removed, so `r`, `r'` and `r''` are all of type `r`.
pub fn default_placeholder_type(name: &str) -> &str {
    name.trim_end_matches('\'')
}

/// A symbolic argument of a rule or predicate, bound to a [`Variable`] on
/// instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Placeholder {
    name: Arc<str>,
    #[serde(rename = "type")]
    type_name: Arc<str>,
}

impl Placeholder {
    /// Create a placeholder whose type is derived from its name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        let type_name = Arc::from(default_placeholder_type(&name));
        Self { name, type_name }
    }

    /// Create a placeholder with an explicit type.
    pub fn with_type(name: impl Into<Arc<str>>, type_name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// The placeholder's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The placeholder's type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The placeholder's type name as a shared string.
    pub fn type_arc(&self) -> &Arc<str> {
        &self.type_name
    }

    /// The variable that stands for this placeholder when its type is a
    /// constant (the placeholder `P` maps to the player `P`).
    pub fn constant_variable(&self) -> Option<Variable> {
        is_constant_type(&self.type_name).then(|| Variable::constant(self.type_name.clone()))
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if default_placeholder_type(&self.name) == &*self.type_name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.type_name)
        }
    }
}
