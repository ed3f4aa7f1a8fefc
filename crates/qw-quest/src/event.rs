use qw_core::{Action, GameLogic, Mapping, Placeholder, Proposition, State, Variable};
use serde::{Deserialize, Serialize};

use crate::error::{QuestError, QuestResult};

/// Name of the synthetic action whose applicability means a condition holds.
pub const TRIGGER: &str = "trigger";

/// Name of the marker fact added by a [`TRIGGER`] action.
const EVENT_MARKER: &str = "event";

// ---------------------------------------------------------------------------
// Leaf events
// ---------------------------------------------------------------------------

/// A set of facts that must hold, optionally with a witness: a sequence of
/// actions known to bring them about.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCondition {
    trigger: Action,
    actions: Vec<Action>,
}

impl EventCondition {
    /// Create a condition event.
    ///
    /// Without conditions, the postconditions of the last witness action
    /// are used. Fails when both lists are empty.
    pub fn new(
        conditions: impl IntoIterator<Item = Proposition>,
        actions: impl IntoIterator<Item = Action>,
    ) -> QuestResult<Self> {
        let actions: Vec<Action> = actions.into_iter().collect();
        let mut conditions: Vec<Proposition> = conditions.into_iter().collect();
        if conditions.is_empty() {
            let last = actions.last().ok_or(QuestError::UnderspecifiedEvent)?;
            conditions = last.postconditions().to_vec();
        }

        let marker = Proposition::new(EVENT_MARKER, [Variable::new(EVENT_MARKER, EVENT_MARKER)]);
        let mut post = conditions.clone();
        post.push(marker);
        Ok(Self {
            trigger: Action::new(TRIGGER, conditions, post),
            actions,
        })
    }

    /// The facts that must hold.
    pub fn conditions(&self) -> &[Proposition] {
        self.trigger.preconditions()
    }

    /// The witness actions, possibly empty.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The [`TRIGGER`] action: applicable exactly when the conditions hold.
    pub fn trigger(&self) -> &Action {
        &self.trigger
    }

    /// Whether every condition holds in `state`.
    pub fn is_met(&self, state: &State) -> bool {
        state.is_applicable(&self.trigger)
    }
}

/// A specific rule firing, with some or all of its placeholders bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAction {
    rule: String,
    mapping: Mapping,
}

impl EventAction {
    /// Wait for `rule` to fire with arguments agreeing with `mapping`.
    pub fn new(rule: impl Into<String>, mapping: Mapping) -> Self {
        Self {
            rule: rule.into(),
            mapping,
        }
    }

    /// Wait for exactly `action`.
    pub fn from_action(action: &Action, logic: &GameLogic) -> QuestResult<Self> {
        let rule = logic
            .rule(action.name())
            .map_err(|_| QuestError::UnknownRule(action.name().to_string()))?;
        let mapping = rule.match_action(action).unwrap_or_default();
        Ok(Self::new(action.name(), mapping))
    }

    /// Name of the awaited rule.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// The bound placeholders.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Whether `action` is the awaited rule firing with agreeing arguments.
    pub fn matches(&self, action: &Action, logic: &GameLogic) -> bool {
        if action.name() != self.rule {
            return false;
        }
        let Some(found) = logic.rule(&self.rule).ok().and_then(|rule| rule.match_action(action)) else {
            return false;
        };
        self.mapping.iter().all(|(ph, var)| found.get(ph) == Some(var))
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A boolean condition on the evolution of a game.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Facts holding in the current state.
    Condition(EventCondition),
    /// A rule firing.
    Action(EventAction),
    /// Any of the events.
    Or(Vec<Event>),
    /// All of the events.
    And(Vec<Event>),
}

impl Event {
    /// Shorthand for a [`Event::Condition`].
    pub fn condition(
        conditions: impl IntoIterator<Item = Proposition>,
        actions: impl IntoIterator<Item = Action>,
    ) -> QuestResult<Self> {
        EventCondition::new(conditions, actions).map(Event::Condition)
    }

    /// Shorthand for an [`Event::Action`].
    pub fn action(rule: impl Into<String>, mapping: Mapping) -> Self {
        Event::Action(EventAction::new(rule, mapping))
    }

    /// Whether the event holds in `state` right after `action` was taken.
    pub fn is_triggering(&self, state: &State, action: Option<&Action>, logic: &GameLogic) -> bool {
        match self {
            Event::Condition(condition) => condition.is_met(state),
            Event::Action(expected) => action.is_some_and(|a| expected.matches(a, logic)),
            Event::Or(events) => events.iter().any(|e| e.is_triggering(state, action, logic)),
            Event::And(events) => events.iter().all(|e| e.is_triggering(state, action, logic)),
        }
    }

    /// Command templates of the witness actions, in order.
    pub fn commands(&self) -> Vec<String> {
        match self {
            Event::Condition(condition) => condition
                .actions()
                .iter()
                .filter_map(|a| a.command_template().map(str::to_string))
                .collect(),
            Event::Action(_) => Vec::new(),
            Event::Or(events) | Event::And(events) => events.iter().flat_map(Event::commands).collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize to a plain data tree.
    pub fn to_data(&self) -> QuestResult<serde_json::Value> {
        Ok(serde_json::to_value(EventRepr::from(self))?)
    }

    /// Rebuild an event from a data tree, interning its facts through
    /// `logic`.
    pub fn from_data(data: serde_json::Value, logic: &GameLogic) -> QuestResult<Self> {
        let repr: EventRepr = serde_json::from_value(data)?;
        repr.into_event(logic)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum EventRepr {
    Condition {
        conditions: Vec<Proposition>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        actions: Vec<Action>,
    },
    Action {
        rule: String,
        #[serde(default)]
        mapping: Vec<(Placeholder, Variable)>,
    },
    Or {
        events: Vec<EventRepr>,
    },
    And {
        events: Vec<EventRepr>,
    },
}

impl From<&Event> for EventRepr {
    fn from(event: &Event) -> Self {
        match event {
            Event::Condition(condition) => EventRepr::Condition {
                conditions: condition.conditions().to_vec(),
                actions: condition.actions().to_vec(),
            },
            Event::Action(action) => EventRepr::Action {
                rule: action.rule.clone(),
                mapping: action.mapping.iter().map(|(ph, var)| (ph.clone(), var.clone())).collect(),
            },
            Event::Or(events) => EventRepr::Or {
                events: events.iter().map(EventRepr::from).collect(),
            },
            Event::And(events) => EventRepr::And {
                events: events.iter().map(EventRepr::from).collect(),
            },
        }
    }
}

impl EventRepr {
    pub(crate) fn into_event(self, logic: &GameLogic) -> QuestResult<Event> {
        let interner = logic.interner();
        Ok(match self {
            EventRepr::Condition { conditions, actions } => Event::condition(
                conditions.into_iter().map(|p| interner.intern_proposition(p)),
                actions.iter().map(|a| logic.intern_action(a)),
            )?,
            EventRepr::Action { rule, mapping } => {
                logic.rule(&rule).map_err(|_| QuestError::UnknownRule(rule.clone()))?;
                Event::action(rule, mapping.into_iter().collect())
            }
            EventRepr::Or { events } => Event::Or(
                events
                    .into_iter()
                    .map(|e| e.into_event(logic))
                    .collect::<QuestResult<_>>()?,
            ),
            EventRepr::And { events } => Event::And(
                events
                    .into_iter()
                    .map(|e| e.into_event(logic))
                    .collect::<QuestResult<_>>()?,
            ),
        })
    }
}
