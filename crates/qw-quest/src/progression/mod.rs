//! Tracking of events, quests and whole games as the player acts.

mod event;
mod game;
mod quest;

pub use event::EventProgression;
pub use game::GameProgression;
pub use quest::QuestProgression;
