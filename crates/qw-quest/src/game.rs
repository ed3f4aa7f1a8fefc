use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use qw_core::{GameLogic, Proposition, State};
use serde::Deserialize;

use crate::error::QuestResult;
use crate::event::Event;
use crate::quest::Quest;

/// Verbs every game understands, whether or not a rule uses them.
const BUILTIN_VERBS: [&str; 4] = ["look", "inventory", "examine", "wait"];

/// Everything the text layer needs to run a game: the logic, the initial
/// state, the quests and free-form metadata.
#[derive(Debug, Clone)]
pub struct Game {
    logic: Arc<GameLogic>,
    state: State,
    quests: Vec<Quest>,
    /// Free-form data attached by the generator (seed, theme, ...).
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl Game {
    /// Create a game.
    pub fn new(logic: Arc<GameLogic>, state: State, quests: Vec<Quest>) -> Self {
        Self {
            logic,
            state,
            quests,
            metadata: IndexMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The rules of the game.
    pub fn logic(&self) -> &Arc<GameLogic> {
        &self.logic
    }

    /// The initial state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The quests, in declaration order.
    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    /// The first quest, if any.
    pub fn main_quest(&self) -> Option<&Quest> {
        self.quests.first()
    }

    /// The fact sets of every condition winning a quest.
    pub fn win_conditions(&self) -> Vec<&[Proposition]> {
        fn collect<'a>(event: &'a Event, out: &mut Vec<&'a [Proposition]>) {
            match event {
                Event::Condition(condition) => out.push(condition.conditions()),
                Event::Action(_) => {}
                Event::Or(events) | Event::And(events) => events.iter().for_each(|e| collect(e, out)),
            }
        }

        let mut out = Vec::new();
        for event in self.quests.iter().flat_map(Quest::win_events) {
            collect(event, &mut out);
        }
        out
    }

    /// The verbs the game understands, sorted: the first word of every
    /// command template plus a few built-ins.
    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: BTreeSet<String> = BUILTIN_VERBS.iter().map(|v| v.to_string()).collect();
        verbs.extend(
            self.logic
                .rules()
                .filter_map(|rule| rule.command_template())
                .filter_map(|template| template.split_whitespace().next())
                .map(str::to_string),
        );
        verbs.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize to a plain data tree.
    pub fn to_data(&self) -> QuestResult<serde_json::Value> {
        let quests = self
            .quests
            .iter()
            .map(Quest::to_data)
            .collect::<QuestResult<Vec<_>>>()?;
        Ok(serde_json::json!({
            "logic": self.logic.to_data()?,
            "state": self.state.to_data()?,
            "quests": quests,
            "metadata": self.metadata,
        }))
    }

    /// Rebuild a game from a data tree, recompiling its logic.
    pub fn from_data(data: serde_json::Value) -> QuestResult<Self> {
        #[derive(Deserialize)]
        struct Repr {
            logic: serde_json::Value,
            state: serde_json::Value,
            #[serde(default)]
            quests: Vec<serde_json::Value>,
            #[serde(default)]
            metadata: IndexMap<String, serde_json::Value>,
        }

        let repr: Repr = serde_json::from_value(data)?;
        let logic = qw_dsl::logic_from_data(repr.logic)?;
        let state = State::from_data(repr.state, &logic)?;
        let quests = repr
            .quests
            .into_iter()
            .map(|quest| Quest::from_data(quest, &logic))
            .collect::<QuestResult<Vec<_>>>()?;
        Ok(Self {
            logic: Arc::new(logic),
            state,
            quests,
            metadata: repr.metadata,
        })
    }
}
