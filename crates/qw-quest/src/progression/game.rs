use std::sync::Arc;

use qw_core::{Action, GameLogic, State};
use tracing::{debug, info};

use crate::config::ProgressionConfig;
use crate::error::QuestResult;
use crate::game::Game;
use crate::progression::QuestProgression;

/// Drives a [`Game`]: holds the current state, the valid actions and the
/// progression of every quest.
#[derive(Debug, Clone)]
pub struct GameProgression {
    logic: Arc<GameLogic>,
    state: State,
    valid_actions: Vec<Action>,
    quests: Vec<QuestProgression>,
    tracking: bool,
}

impl GameProgression {
    /// Start playing `game` from its initial state.
    ///
    /// Quests are only tracked when `config.track_quests` is set; an
    /// untracked progression still applies actions but never finishes.
    pub fn new(game: &Game, config: ProgressionConfig) -> QuestResult<Self> {
        let logic = game.logic().clone();
        let state = game.state().copy();
        let valid_actions = logic.all_applicable_actions(&state)?;
        let quests = if config.track_quests {
            game.quests()
                .iter()
                .map(|quest| QuestProgression::new(quest, logic.clone(), &state, &config))
                .collect::<QuestResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        debug!(quests = quests.len(), actions = valid_actions.len(), "game progression started");

        Ok(Self {
            logic,
            state,
            valid_actions,
            quests,
            tracking: config.track_quests,
        })
    }

    /// The current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Actions applicable in the current state.
    pub fn valid_actions(&self) -> &[Action] {
        &self.valid_actions
    }

    /// Per-quest progressions, in declaration order.
    pub fn quest_progressions(&self) -> &[QuestProgression] {
        &self.quests
    }

    /// Whether quests are being tracked.
    pub fn tracking_quests(&self) -> bool {
        self.tracking
    }

    /// Whether the game is over.
    pub fn done(&self) -> bool {
        self.completed() || self.failed()
    }

    /// Whether every quest is completed.
    pub fn completed(&self) -> bool {
        self.tracking && self.quests.iter().all(QuestProgression::completed)
    }

    /// Whether some quest failed or can no longer be completed.
    pub fn failed(&self) -> bool {
        self.tracking && self.quests.iter().any(|q| q.failed() || q.unfinishable())
    }

    /// Sum of the rewards of completed quests.
    pub fn score(&self) -> i64 {
        self.quests
            .iter()
            .filter(|q| q.completed())
            .map(|q| q.quest().reward)
            .sum()
    }

    /// Sum of all rewards.
    pub fn max_score(&self) -> i64 {
        self.quests.iter().map(|q| q.quest().reward).sum()
    }

    /// The actions left to finish every pending quest, quest after quest.
    ///
    /// `None` when not tracking, when the game is over, or when some
    /// pending quest has no known policy.
    pub fn winning_policy(&self) -> Option<Vec<Action>> {
        if !self.tracking || self.done() {
            return None;
        }
        let mut policy = Vec::new();
        for quest in self.quests.iter().filter(|q| !q.done()) {
            policy.extend(quest.winning_policy()?);
        }
        Some(policy)
    }

    /// Perform `action`. Returns `false`, leaving everything untouched, when
    /// it is not applicable in the current state.
    pub fn update(&mut self, action: &Action) -> QuestResult<bool> {
        if !self.state.apply(action)? {
            debug!(action = %action, "action not applicable");
            return Ok(false);
        }
        self.valid_actions = self.logic.all_applicable_actions(&self.state)?;
        for quest in &mut self.quests {
            quest.update(Some(action), &self.state)?;
        }

        if self.completed() {
            info!(score = self.score(), "all quests completed");
        } else if self.failed() {
            info!(score = self.score(), "game lost");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::quest::Quest;
    use qw_core::{Placeholder, Variable};

    const LOGIC: &str = r#"
        type P {}
        type I {}
        type r {
            predicates { at(P, r); }
        }
        type f {
            predicates { at(f, r); in(f, I); eaten(f); }
            rules {
                take :: $at(P, r) & at(f, r) -> in(f, I);
                eat :: in(f, I) -> eaten(f);
            }
        }
    "#;

    fn game(quests: &[(&str, Option<&str>, i64)]) -> Game {
        let logic = qw_dsl::parse_logic(LOGIC).unwrap();
        let state = logic
            .new_state(qw_dsl::parse_facts("at(P, hall: r) & at(apple: f, hall) & at(pear: f, hall)").unwrap())
            .unwrap();
        let condition = |source: &str| Event::condition(qw_dsl::parse_facts(source).unwrap(), Vec::new()).unwrap();
        let quests = quests
            .iter()
            .map(|&(win, fail, reward)| {
                Quest::new(vec![condition(win)], fail.map(condition).into_iter().collect())
                    .unwrap()
                    .with_reward(reward)
            })
            .collect();
        Game::new(Arc::new(logic), state, quests)
    }

    fn action(progression: &GameProgression, rule: &str, food: &str) -> Action {
        let logic = &progression.logic;
        let mut mapping = logic.constants_mapping();
        mapping.insert(Placeholder::new("r"), Variable::new("hall", "r"));
        mapping.insert(Placeholder::new("f"), Variable::new(food, "f"));
        logic.rule(rule).unwrap().instantiate(&mapping).unwrap()
    }

    #[test]
    fn quests_complete_one_after_the_other() {
        let game = game(&[("in(apple: f, I)", None, 2), ("eaten(pear: f)", None, 3)]);
        let mut progression = GameProgression::new(&game, ProgressionConfig::default()).unwrap();
        assert_eq!(progression.max_score(), 5);
        assert_eq!(progression.winning_policy().map(|p| p.len()), Some(3));

        let take = action(&progression, "take", "apple");
        assert!(progression.update(&take).unwrap());
        assert_eq!(progression.score(), 2);
        assert_eq!(progression.winning_policy().map(|p| p.len()), Some(2));

        for (rule, food) in [("take", "pear"), ("eat", "pear")] {
            let next = action(&progression, rule, food);
            assert!(progression.update(&next).unwrap());
        }
        assert!(progression.completed());
        assert!(progression.done());
        assert_eq!(progression.score(), 5);
        assert!(progression.winning_policy().is_none());
    }

    #[test]
    fn inapplicable_action_is_rejected() {
        let game = game(&[("eaten(apple: f)", None, 1)]);
        let mut progression = GameProgression::new(&game, ProgressionConfig::default()).unwrap();
        let before = progression.state().clone();

        let eat = action(&progression, "eat", "apple");
        assert!(!progression.valid_actions().contains(&eat));
        assert!(!progression.update(&eat).unwrap());
        assert_eq!(progression.state(), &before);
    }

    #[test]
    fn failing_a_quest_ends_the_game() {
        let game = game(&[("in(apple: f, I)", Some("eaten(pear: f)"), 1)]);
        let mut progression = GameProgression::new(&game, ProgressionConfig::default()).unwrap();
        for (rule, food) in [("take", "pear"), ("eat", "pear")] {
            let next = action(&progression, rule, food);
            assert!(progression.update(&next).unwrap());
        }
        assert!(progression.failed());
        assert!(!progression.completed());
        assert_eq!(progression.score(), 0);
    }

    #[test]
    fn untracked_progression_never_ends() {
        let game = game(&[("in(apple: f, I)", None, 1)]);
        let config = ProgressionConfig::default().with_track_quests(false);
        let mut progression = GameProgression::new(&game, config).unwrap();
        assert!(!progression.tracking_quests());

        let take = action(&progression, "take", "apple");
        assert!(progression.update(&take).unwrap());
        assert!(!progression.done());
        assert!(progression.winning_policy().is_none());
        assert!(progression.quest_progressions().is_empty());
    }
}
