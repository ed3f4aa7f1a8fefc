use qw_chaining::ChainError;
use qw_core::CoreError;
use qw_dsl::DslError;

/// Alias for `Result<T, QuestError>`.
pub type QuestResult<T> = Result<T, QuestError>;

/// Errors that can occur when describing quests or tracking their progress.
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    /// An event was given neither conditions nor actions.
    #[error("an event needs conditions or actions")]
    UnderspecifiedEvent,

    /// A quest was given neither win nor fail events.
    #[error("a quest needs at least one win or fail event")]
    UnderspecifiedQuest,

    /// An action event names a rule the logic does not declare.
    #[error("event refers to unknown rule: {0}")]
    UnknownRule(String),

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Chaining failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The logic of a serialized game could not be recompiled.
    #[error(transparent)]
    Dsl(#[from] DslError),

    /// A data tree does not describe a valid object.
    #[error("invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),
}
