use std::sync::Arc;

use qw_core::{Action, GameLogic, State};
use tracing::debug;

use crate::config::ProgressionConfig;
use crate::error::QuestResult;
use crate::event::Event;
use crate::progression::EventProgression;
use crate::quest::Quest;

/// Tracks a [`Quest`]: its win and fail events and the policy winning it.
#[derive(Debug, Clone)]
pub struct QuestProgression {
    quest: Quest,
    logic: Arc<GameLogic>,
    win_event: Option<Event>,
    win: Option<EventProgression>,
    fail: Option<EventProgression>,
    policy: Option<Vec<Action>>,
}

impl QuestProgression {
    /// Start tracking `quest` from `state`.
    pub fn new(quest: &Quest, logic: Arc<GameLogic>, state: &State, config: &ProgressionConfig) -> QuestResult<Self> {
        let win_event = quest.win_event();
        let win = win_event
            .as_ref()
            .map(|event| EventProgression::new(event, logic.clone(), state, config))
            .transpose()?;
        let fail = quest
            .fail_event()
            .map(|event| EventProgression::new(&event, logic.clone(), state, config))
            .transpose()?;

        let mut progression = Self {
            quest: quest.clone(),
            logic,
            win_event,
            win,
            fail,
            policy: None,
        };
        progression.policy = progression.win.as_ref().and_then(EventProgression::triggering_policy);
        progression.update(None, state)?;
        Ok(progression)
    }

    /// The tracked quest.
    pub fn quest(&self) -> &Quest {
        &self.quest
    }

    /// Whether the win event happened.
    pub fn completed(&self) -> bool {
        self.win.as_ref().is_some_and(EventProgression::triggered)
    }

    /// Whether the fail event happened.
    pub fn failed(&self) -> bool {
        self.fail.as_ref().is_some_and(EventProgression::triggered)
    }

    /// Whether the win event can no longer happen, without the quest having
    /// failed.
    pub fn unfinishable(&self) -> bool {
        self.win.as_ref().is_some_and(EventProgression::untriggerable) && !self.failed()
    }

    /// Whether the quest is over, one way or another.
    pub fn done(&self) -> bool {
        self.completed() || self.failed() || self.unfinishable()
    }

    /// The actions left to complete the quest, `None` once it is done or
    /// when no policy is known.
    pub fn winning_policy(&self) -> Option<Vec<Action>> {
        if self.done() {
            return None;
        }
        self.policy.clone()
    }

    /// Take into account that `action` was just performed, leading to
    /// `state`.
    pub fn update(&mut self, action: Option<&Action>, state: &State) -> QuestResult<()> {
        if self.done() {
            return Ok(());
        }
        if let Some(win) = &mut self.win {
            win.update(action, state)?;
        }
        if let Some(fail) = &mut self.fail {
            fail.update(action, state)?;
        }

        let previous = self.policy.take();
        let mut policy = self.win.as_ref().and_then(EventProgression::triggering_policy);
        if let Some(previous) = previous
            && let Some(shortcut) = self.shortcut(&previous, state)
            && policy.as_ref().is_none_or(|current| shortcut.len() < current.len())
        {
            debug!(length = shortcut.len(), "shortcut found in the previous policy");
            policy = Some(shortcut);
        }
        self.policy = policy;
        Ok(())
    }

    /// The shortest non-empty suffix of `previous` that, played from
    /// `state`, wins the quest.
    fn shortcut(&self, previous: &[Action], state: &State) -> Option<Vec<Action>> {
        let win = self.win_event.as_ref()?;
        (0..previous.len()).rev().find_map(|start| {
            let suffix = &previous[start..];
            let mut end = state.copy();
            for action in suffix {
                if !matches!(end.apply(action), Ok(true)) {
                    return None;
                }
            }
            win.is_triggering(&end, suffix.last(), &self.logic)
                .then(|| suffix.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qw_core::{Placeholder, Variable};

    const LOGIC: &str = r#"
        type P {}
        type I {}
        type r {
            predicates { at(P, r); link(r, r); }
            rules { go :: at(P, r) & $link(r, r') -> at(P, r'); }
        }
        type f {
            predicates { at(f, r); in(f, I); eaten(f); }
            rules {
                take :: $at(P, r) & at(f, r) -> in(f, I);
                eat :: in(f, I) -> eaten(f);
            }
        }
    "#;

    fn setup(facts: &str) -> (Arc<GameLogic>, State) {
        let logic = qw_dsl::parse_logic(LOGIC).unwrap();
        let state = logic.new_state(qw_dsl::parse_facts(facts).unwrap()).unwrap();
        (Arc::new(logic), state)
    }

    fn condition(source: &str) -> Event {
        Event::condition(qw_dsl::parse_facts(source).unwrap(), Vec::new()).unwrap()
    }

    fn act(logic: &GameLogic, state: &mut State, rule: &str, bindings: &[(&str, &str, &str)]) -> Action {
        let mut mapping = logic.constants_mapping();
        for (ph, name, ty) in bindings {
            mapping.insert(Placeholder::new(*ph), Variable::new(*name, *ty));
        }
        let action = logic.rule(rule).unwrap().instantiate(&mapping).unwrap();
        assert!(state.apply(&action).unwrap());
        action
    }

    #[test]
    fn completed_quest() {
        let (logic, mut state) = setup("at(P, hall: r) & at(apple: f, hall)");
        let quest = Quest::new(vec![condition("in(apple: f, I)")], Vec::new()).unwrap();
        let mut progression = QuestProgression::new(&quest, logic.clone(), &state, &ProgressionConfig::default()).unwrap();
        assert_eq!(progression.winning_policy().map(|p| p.len()), Some(1));

        let take = act(&logic, &mut state, "take", &[("r", "hall", "r"), ("f", "apple", "f")]);
        progression.update(Some(&take), &state).unwrap();
        assert!(progression.completed());
        assert!(progression.done());
        assert!(progression.winning_policy().is_none());
    }

    #[test]
    fn failed_quest() {
        let (logic, mut state) = setup("at(P, hall: r) & in(apple: f, I) & link(hall, garden: r)");
        let quest = Quest::new(vec![condition("at(P, garden: r)")], vec![condition("eaten(apple: f)")]).unwrap();
        let mut progression = QuestProgression::new(&quest, logic.clone(), &state, &ProgressionConfig::default()).unwrap();

        let eat = act(&logic, &mut state, "eat", &[("f", "apple", "f")]);
        progression.update(Some(&eat), &state).unwrap();
        assert!(progression.failed());
        assert!(!progression.unfinishable());
        assert!(progression.done());
    }

    #[test]
    fn quest_already_won() {
        let (logic, state) = setup("at(P, hall: r)");
        let quest = Quest::new(vec![condition("at(P, hall: r)")], Vec::new()).unwrap();
        let progression = QuestProgression::new(&quest, logic, &state, &ProgressionConfig::default()).unwrap();
        assert!(progression.completed());
    }

    #[test]
    fn shortcut_reuses_a_suffix_of_the_previous_policy() {
        let (logic, mut state) = setup("at(P, hall: r) & link(hall, garden: r) & at(apple: f, garden)");
        let quest = Quest::new(vec![condition("in(apple: f, I)")], Vec::new()).unwrap();
        let progression = QuestProgression::new(&quest, logic.clone(), &state, &ProgressionConfig::default()).unwrap();
        let previous = progression.winning_policy().unwrap();
        assert_eq!(previous.len(), 2);

        act(&logic, &mut state, "go", &[("r", "hall", "r"), ("r'", "garden", "r")]);
        let shortcut = progression.shortcut(&previous, &state).unwrap();
        assert_eq!(shortcut, previous[1..].to_vec());
    }

    #[test]
    fn overlapping_conjunction_takes_the_shortcut() {
        let (logic, mut state) = setup("at(P, hall: r) & link(hall, garden: r) & at(apple: f, garden)");
        let win = Event::And(vec![condition("at(P, garden: r)"), condition("in(apple: f, I)")]);
        let quest = Quest::new(vec![win], Vec::new()).unwrap();
        let mut progression = QuestProgression::new(&quest, logic.clone(), &state, &ProgressionConfig::default()).unwrap();

        // Both branches walk to the garden; the conjunction alone would walk twice.
        let chained = progression.win.as_ref().and_then(EventProgression::triggering_policy).unwrap();
        let names = |policy: &[Action]| policy.iter().map(|a| a.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(&chained), vec!["go", "go", "take"]);
        let policy = progression.winning_policy().unwrap();
        assert_eq!(names(&policy), vec!["go", "take"]);
        assert_eq!(policy, chained[1..].to_vec());

        let go = act(&logic, &mut state, "go", &[("r", "hall", "r"), ("r'", "garden", "r")]);
        progression.update(Some(&go), &state).unwrap();
        assert_eq!(progression.winning_policy().map(|p| names(&p)), Some(vec!["take".to_string()]));

        let take = act(&logic, &mut state, "take", &[("r", "garden", "r"), ("f", "apple", "f")]);
        progression.update(Some(&take), &state).unwrap();
        assert!(progression.completed());
    }
}
