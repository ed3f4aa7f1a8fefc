use qw_chaining::Chain;
use qw_core::{GameLogic, State};
use serde::{Deserialize, Serialize};

use crate::error::{QuestError, QuestResult};
use crate::event::{Event, EventRepr};

/// Something the player is asked to achieve, or to avoid.
///
/// Win events and fail events are each combined with an implicit OR.
#[derive(Debug, Clone, PartialEq)]
pub struct Quest {
    win_events: Vec<Event>,
    fail_events: Vec<Event>,
    /// Points granted on completion.
    pub reward: i64,
    /// Text shown to the player.
    pub description: Option<String>,
    /// Commands solving the quest, for the text layer.
    pub commands: Vec<String>,
}

impl Quest {
    /// Create a quest. The reward is 1 when there is a way to win, 0
    /// otherwise.
    pub fn new(win_events: Vec<Event>, fail_events: Vec<Event>) -> QuestResult<Self> {
        if win_events.is_empty() && fail_events.is_empty() {
            return Err(QuestError::UnderspecifiedQuest);
        }
        let reward = i64::from(!win_events.is_empty());
        let commands = win_events.iter().flat_map(Event::commands).collect();
        Ok(Self {
            win_events,
            fail_events,
            reward,
            description: None,
            commands,
        })
    }

    /// A quest won by replaying a generated chain.
    pub fn from_chain(chain: &Chain) -> QuestResult<Self> {
        let event = Event::condition(Vec::new(), chain.actions().cloned())?;
        Self::new(vec![event], Vec::new())
    }

    /// Set the reward.
    pub fn with_reward(mut self, reward: i64) -> Self {
        self.reward = reward;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the solving commands.
    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    /// The events winning the quest.
    pub fn win_events(&self) -> &[Event] {
        &self.win_events
    }

    /// The events failing the quest.
    pub fn fail_events(&self) -> &[Event] {
        &self.fail_events
    }

    /// The win events as a single event.
    pub fn win_event(&self) -> Option<Event> {
        combine(&self.win_events)
    }

    /// The fail events as a single event.
    pub fn fail_event(&self) -> Option<Event> {
        combine(&self.fail_events)
    }

    /// Whether `state` wins the quest.
    pub fn is_winning(&self, state: &State, logic: &GameLogic) -> bool {
        self.win_events.iter().any(|e| e.is_triggering(state, None, logic))
    }

    /// Whether `state` fails the quest.
    pub fn is_failing(&self, state: &State, logic: &GameLogic) -> bool {
        self.fail_events.iter().any(|e| e.is_triggering(state, None, logic))
    }

    /// Serialize to a plain data tree.
    pub fn to_data(&self) -> QuestResult<serde_json::Value> {
        Ok(serde_json::to_value(QuestRepr::from(self))?)
    }

    /// Rebuild a quest from a data tree, interning its facts through `logic`.
    pub fn from_data(data: serde_json::Value, logic: &GameLogic) -> QuestResult<Self> {
        let repr: QuestRepr = serde_json::from_value(data)?;
        let events = |reprs: Vec<EventRepr>| -> QuestResult<Vec<Event>> {
            reprs.into_iter().map(|e| e.into_event(logic)).collect()
        };
        let mut quest = Self::new(events(repr.win_events)?, events(repr.fail_events)?)?;
        quest.reward = repr.reward;
        quest.description = repr.description;
        quest.commands = repr.commands;
        Ok(quest)
    }
}

fn combine(events: &[Event]) -> Option<Event> {
    match events {
        [] => None,
        [event] => Some(event.clone()),
        _ => Some(Event::Or(events.to_vec())),
    }
}

#[derive(Serialize, Deserialize)]
struct QuestRepr {
    #[serde(default)]
    win_events: Vec<EventRepr>,
    #[serde(default)]
    fail_events: Vec<EventRepr>,
    reward: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    commands: Vec<String>,
}

impl From<&Quest> for QuestRepr {
    fn from(quest: &Quest) -> Self {
        Self {
            win_events: quest.win_events.iter().map(EventRepr::from).collect(),
            fail_events: quest.fail_events.iter().map(EventRepr::from).collect(),
            reward: quest.reward,
            description: quest.description.clone(),
            commands: quest.commands.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qw_chaining::{ChainingOptions, sample_quest};

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
            inform7 {
                commands {
                    take :: "take {f}" :: "taking the {f}";
                    eat :: "eat {f}" :: "eating the {f}";
                }
            }
        }
    "#;

    fn logic() -> GameLogic {
        qw_dsl::parse_logic(LOGIC).unwrap()
    }

    fn condition(source: &str) -> Event {
        Event::condition(qw_dsl::parse_facts(source).unwrap(), Vec::new()).unwrap()
    }

    #[test]
    fn underspecified_quest() {
        let err = Quest::new(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, QuestError::UnderspecifiedQuest));
    }

    #[test]
    fn reward_defaults() {
        let win = Quest::new(vec![condition("eaten(apple: f)")], Vec::new()).unwrap();
        assert_eq!(win.reward, 1);
        let fail_only = Quest::new(Vec::new(), vec![condition("eaten(apple: f)")]).unwrap();
        assert_eq!(fail_only.reward, 0);
        assert!(fail_only.win_event().is_none());
    }

    #[test]
    fn several_win_events_combine_with_or() {
        let quest = Quest::new(vec![condition("eaten(apple: f)"), condition("eaten(pear: f)")], Vec::new()).unwrap();
        assert!(matches!(quest.win_event(), Some(Event::Or(events)) if events.len() == 2));
    }

    #[test]
    fn winning_and_failing_states() {
        let logic = logic();
        let quest = Quest::new(vec![condition("in(apple: f, I)")], vec![condition("eaten(apple: f)")]).unwrap();
        let carried = logic.new_state(qw_dsl::parse_facts("in(apple: f, I)").unwrap()).unwrap();
        let eaten = logic.new_state(qw_dsl::parse_facts("eaten(apple: f)").unwrap()).unwrap();
        assert!(quest.is_winning(&carried, &logic));
        assert!(!quest.is_failing(&carried, &logic));
        assert!(quest.is_failing(&eaten, &logic));
    }

    #[test]
    fn quest_from_generated_chain() {
        let logic = logic();
        let state = logic.new_state(qw_dsl::parse_facts("at(P, hall: r) & at(apple: f, hall)").unwrap()).unwrap();
        let options = ChainingOptions::default().with_depth(2, 2);
        let chain = sample_quest(&logic, &state, options).unwrap();
        let quest = Quest::from_chain(&chain).unwrap();

        assert_eq!(quest.commands, vec!["take {apple}", "eat {apple}"]);
        assert!(!quest.is_winning(&state, &logic));
        assert!(quest.is_winning(&chain.final_state().unwrap(), &logic));
    }

    #[test]
    fn data_tree_preserves_the_quest() {
        let logic = logic();
        let quest = Quest::new(vec![condition("in(apple: f, I)")], vec![condition("eaten(apple: f)")])
            .unwrap()
            .with_reward(3)
            .with_description("Pick the apple without eating it.");
        let data = quest.to_data().unwrap();
        assert_eq!(data["reward"], 3);
        assert_eq!(Quest::from_data(data, &logic).unwrap(), quest);
    }
}
