use qw_core::CoreError;

/// Alias for `Result<T, ChainError>`.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur while generating chains.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The options admit no chain from the given state.
    #[error("no quest could be generated from this state with the given options")]
    QuestGeneration,

    /// `rules_per_depth` names a rule the logic does not declare.
    #[error("unknown rule in rules_per_depth[{depth}]: {name}")]
    UnknownRule {
        /// The depth whose rule list holds the name.
        depth: usize,
        /// The unresolved rule name.
        name: String,
    },

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}
