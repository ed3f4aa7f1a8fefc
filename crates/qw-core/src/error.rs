/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur when building a game logic or manipulating a state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A name was used with two different types in the same scope.
    #[error("type conflict for \"{name}\": {existing} vs {conflicting}")]
    TypeConflict {
        /// The name used twice.
        name: String,
        /// The type it was first seen with.
        existing: String,
        /// The type it was used with afterwards.
        conflicting: String,
    },

    /// The requested type does not exist in the hierarchy.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The requested rule does not exist in the logic.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// The requested constraint does not exist in the logic.
    #[error("unknown constraint: {0}")]
    UnknownConstraint(String),

    /// The requested variable is not referenced by any fact of the state.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Something with the same identity was already declared.
    #[error("duplicate {kind}: {name}")]
    Duplicate {
        /// What was declared twice ("type", "rule", "predicate", ...).
        kind: &'static str,
        /// The duplicated name or signature.
        name: String,
    },

    /// Aliases expand into each other.
    #[error("cycle of aliases involving {0}")]
    AliasCycle(String),

    /// A rule was instantiated without a variable for one of its placeholders.
    #[error("rule \"{rule}\" has no variable bound to placeholder \"{placeholder}\"")]
    UnboundPlaceholder {
        /// The rule being instantiated.
        rule: String,
        /// The placeholder left unbound.
        placeholder: String,
    },

    /// A data tree does not describe a valid object.
    #[error("invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),
}
