use std::sync::Arc;

use qw_core::{Action, GameLogic, State};
use tracing::debug;

use crate::action_tree::ActionDependencyTree;
use crate::config::ProgressionConfig;
use crate::error::{QuestError, QuestResult};
use crate::event::{Event, TRIGGER};
use crate::planner::Planner;

#[derive(Debug, Clone)]
enum Node {
    /// A condition or action event, tracked through its policy.
    Leaf {
        tree: Option<ActionDependencyTree>,
        /// Ends with the action completing the event: the trigger of a
        /// condition, or the awaited action itself.
        policy: Option<Vec<Action>>,
    },
    Or(Vec<EventProgression>),
    And(Vec<EventProgression>),
}

/// Tracks how close the game is to triggering an [`Event`].
///
/// Once triggered or untriggerable the progression is done and ignores
/// further updates.
#[derive(Debug, Clone)]
pub struct EventProgression {
    event: Event,
    logic: Arc<GameLogic>,
    config: ProgressionConfig,
    node: Node,
    triggered: bool,
    untriggerable: bool,
}

impl EventProgression {
    /// Start tracking `event` from `state`.
    ///
    /// Condition events with a witness start from the witness; other leaf
    /// events ask the [`Planner`] for their initial policy.
    pub fn new(event: &Event, logic: Arc<GameLogic>, state: &State, config: &ProgressionConfig) -> QuestResult<Self> {
        let children = |events: &[Event]| -> QuestResult<Vec<EventProgression>> {
            events
                .iter()
                .map(|e| EventProgression::new(e, logic.clone(), state, config))
                .collect()
        };
        let node = match event {
            Event::Condition(_) => Node::Leaf { tree: None, policy: None },
            Event::Action(expected) => {
                logic
                    .rule(expected.rule())
                    .map_err(|_| QuestError::UnknownRule(expected.rule().to_string()))?;
                Node::Leaf { tree: None, policy: None }
            }
            Event::Or(events) => Node::Or(children(events)?),
            Event::And(events) => Node::And(children(events)?),
        };

        let mut progression = Self {
            event: event.clone(),
            logic,
            config: config.clone(),
            node,
            triggered: false,
            untriggerable: false,
        };
        let policy = match event {
            Event::Condition(condition) if !condition.actions().is_empty() => {
                let mut policy = condition.actions().to_vec();
                policy.push(condition.trigger().clone());
                Some(policy)
            }
            _ => progression.plan(state)?,
        };
        progression.set_policy(policy);
        Ok(progression)
    }

    /// The tracked event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Whether the event happened.
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    /// Whether the event can no longer happen.
    pub fn untriggerable(&self) -> bool {
        self.untriggerable
    }

    /// Whether the progression stopped changing.
    pub fn is_done(&self) -> bool {
        self.triggered || self.untriggerable
    }

    /// The dependency tree of a condition or action event.
    pub fn tree(&self) -> Option<&ActionDependencyTree> {
        match &self.node {
            Node::Leaf { tree, .. } => tree.as_ref(),
            Node::Or(_) | Node::And(_) => None,
        }
    }

    /// The actions still needed to trigger the event.
    ///
    /// Empty once triggered. `None` when the event is untriggerable or no
    /// plan is known. A disjunction follows its shortest branch, ties going
    /// to the branch declared first; a conjunction chains the policies of
    /// its pending branches in declaration order.
    pub fn triggering_policy(&self) -> Option<Vec<Action>> {
        if self.triggered {
            return Some(Vec::new());
        }
        if self.untriggerable {
            return None;
        }
        match &self.node {
            Node::Leaf { policy, .. } => policy
                .as_ref()
                .map(|policy| policy.iter().filter(|a| a.name() != TRIGGER).cloned().collect()),
            Node::Or(children) => children
                .iter()
                .filter(|child| !child.is_done())
                .filter_map(EventProgression::triggering_policy)
                .min_by_key(Vec::len),
            Node::And(children) => {
                let mut policy = Vec::new();
                for child in children.iter().filter(|child| !child.triggered) {
                    policy.extend(child.triggering_policy()?);
                }
                Some(policy)
            }
        }
    }

    /// Take into account that `action` was just performed, leading to
    /// `state`. Pass no action to only look at the state.
    pub fn update(&mut self, action: Option<&Action>, state: &State) -> QuestResult<()> {
        if self.is_done() {
            return Ok(());
        }
        if matches!(self.node, Node::Leaf { .. }) {
            return self.update_leaf(action, state);
        }

        match &mut self.node {
            Node::Or(children) => {
                for child in children.iter_mut() {
                    child.update(action, state)?;
                }
                self.triggered = children.iter().any(|c| c.triggered);
                self.untriggerable = children.iter().all(|c| c.untriggerable);
            }
            Node::And(children) => {
                for child in children.iter_mut() {
                    child.update(action, state)?;
                }
                self.triggered = children.iter().all(|c| c.triggered);
                self.untriggerable = children.iter().any(|c| c.untriggerable);
            }
            Node::Leaf { .. } => {}
        }
        Ok(())
    }

    fn update_leaf(&mut self, action: Option<&Action>, state: &State) -> QuestResult<()> {
        self.triggered = self.event.is_triggering(state, action, &self.logic);
        if self.triggered {
            debug!("event triggered");
            return Ok(());
        }

        if matches!(self.node, Node::Leaf { policy: None, .. }) {
            if action.is_some() {
                let policy = self.plan(state)?;
                self.set_policy(policy);
            }
            return Ok(());
        }

        if self.compress_policy(state) {
            return Ok(());
        }

        let Some(action) = action else {
            return Ok(());
        };
        let Node::Leaf {
            tree: Some(tree),
            policy,
        } = &mut self.node
        else {
            return Ok(());
        };
        tree.remove(action);
        let Some(flattened) = tree.flatten() else {
            debug!(action = %action, "policy lost, planning again");
            let policy = self.plan(state)?;
            self.set_policy(policy);
            return Ok(());
        };
        if self.logic.reverse_action(action).is_none() && !state.is_sequence_applicable(&flattened) {
            debug!(action = %action, "irreversible action makes the event untriggerable");
            self.untriggerable = true;
        }
        *policy = Some(flattened);
        Ok(())
    }

    fn plan(&self, state: &State) -> QuestResult<Option<Vec<Action>>> {
        let planner = Planner::new(&self.logic, &self.config);
        match &self.event {
            Event::Condition(condition) => {
                planner.plan(state, |s| Ok(condition.is_met(s).then(|| condition.trigger().clone())))
            }
            Event::Action(expected) => planner.plan(state, |s| {
                Ok(self
                    .logic
                    .all_applicable_actions(s)?
                    .into_iter()
                    .find(|a| expected.matches(a, &self.logic)))
            }),
            Event::Or(_) | Event::And(_) => Ok(None),
        }
    }

    fn set_policy(&mut self, new_policy: Option<Vec<Action>>) {
        if let Node::Leaf { tree, policy } = &mut self.node {
            *tree = new_policy
                .as_deref()
                .map(|p| ActionDependencyTree::from_policy(self.logic.clone(), p));
            *policy = new_policy;
        }
    }

    /// Drop the longest run of actions the policy no longer needs.
    fn compress_policy(&mut self, state: &State) -> bool {
        let Node::Leaf {
            tree,
            policy: Some(policy),
        } = &mut self.node
        else {
            return false;
        };

        let mut compressed = false;
        while let Some(shorter) = shorten(policy, state) {
            *policy = shorter;
            compressed = true;
        }
        if compressed {
            debug!(length = policy.len(), "policy compressed");
            *tree = Some(ActionDependencyTree::from_policy(self.logic.clone(), policy));
        }
        compressed
    }
}

/// The policy without `policy[j..i]` for the first `j` and the largest `i`
/// leaving a sequence applicable from `state`. The last action is kept.
fn shorten(policy: &[Action], state: &State) -> Option<Vec<Action>> {
    let len = policy.len();
    for j in 0..len {
        for i in (j + 1..len).rev() {
            let candidate: Vec<Action> = policy[..j].iter().chain(&policy[i..]).cloned().collect();
            if state.is_sequence_applicable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}
