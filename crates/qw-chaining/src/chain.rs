use std::fmt;

use qw_core::{Action, State};

/// One step of a [`Chain`], placed in the dependency tree the chain induces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNode {
    /// The action performed at this step.
    pub action: Action,
    /// Position of the step within its linear subchain, starting at 1.
    pub depth: usize,
    /// Index of the subchain this step belongs to, starting at 1.
    pub breadth: usize,
    /// Index into [`Chain::nodes`] of the step this one builds upon, or
    /// `None` for steps branching off the initial state.
    pub parent: Option<usize>,
}

/// A quest candidate: an initial state and the steps leading away from it.
///
/// Replaying [`actions`](Self::actions) in order from
/// [`initial_state`](Self::initial_state) always succeeds.
#[derive(Debug, Clone)]
pub struct Chain {
    /// The state the first action applies to.
    pub initial_state: State,
    /// The steps, in the order they are replayed.
    pub nodes: Vec<ChainNode>,
}

impl Chain {
    /// The actions in replay order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.nodes.iter().map(|node| &node.action)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the chain holds no action.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of parallel subchains.
    pub fn breadth(&self) -> usize {
        self.nodes.iter().map(|node| node.breadth).max().unwrap_or(0)
    }

    /// The state reached after replaying every action.
    pub fn final_state(&self) -> qw_core::CoreResult<State> {
        let mut state = self.initial_state.copy();
        for action in self.actions() {
            state.apply(action)?;
        }
        Ok(state)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chain([")?;
        for action in self.actions() {
            writeln!(f, "    {action},")?;
        }
        write!(f, "])")
    }
}
