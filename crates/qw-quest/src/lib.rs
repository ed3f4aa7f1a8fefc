//! Quests and progression tracking for Questweber.
//!
//! A [`Quest`] is won or failed by [`Event`]s: facts holding, a rule
//! firing, or boolean combinations of both. While the player acts, a
//! [`GameProgression`] keeps each [`QuestProgression`] up to date along
//! with a winning policy, the actions still needed to finish the game.
//! Policies follow the player through an [`ActionDependencyTree`] and are
//! recomputed by the [`Planner`] when the player wanders off.

/// Dependency trees of actions.
pub mod action_tree;
/// Tuning of the progression trackers.
pub mod config;
/// Error types for quests.
pub mod error;
/// Events quests are made of.
pub mod event;
/// The game descriptor.
pub mod game;
/// Breadth-first search for policies.
pub mod planner;
/// Run-time tracking.
pub mod progression;
/// Quests.
pub mod quest;

/// Re-exports of the action tree types.
pub use action_tree::{ActionDependencyTree, ActionElement};
/// Re-export of [`config::ProgressionConfig`].
pub use config::ProgressionConfig;
/// Re-exports of [`error::QuestError`] and [`error::QuestResult`].
pub use error::{QuestError, QuestResult};
/// Re-exports of the event types.
pub use event::{Event, EventAction, EventCondition, TRIGGER};
/// Re-export of [`game::Game`].
pub use game::Game;
/// Re-export of [`planner::Planner`].
pub use planner::Planner;
/// Re-exports of the progression trackers.
pub use progression::{EventProgression, GameProgression, QuestProgression};
/// Re-export of [`quest::Quest`].
pub use quest::Quest;
