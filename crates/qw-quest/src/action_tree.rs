use std::fmt;
use std::sync::Arc;

use qw_chaining::{DependencyElement, DependencyTree};
use qw_core::{Action, GameLogic};
use tracing::debug;

/// An [`Action`] placed in an [`ActionDependencyTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionElement(pub Action);

impl ActionElement {
    /// The wrapped action.
    pub fn action(&self) -> &Action {
        &self.0
    }
}

impl DependencyElement for ActionElement {
    /// `self` needs a fact `other` adds.
    fn depends_on(&self, other: &Self) -> bool {
        other.0.added().iter().any(|fact| self.0.requires(fact))
    }

    /// `self` adds a fact none of `others` adds.
    fn is_distinct_from(&self, others: &[&Self]) -> bool {
        self.0
            .added()
            .iter()
            .any(|fact| !others.iter().any(|other| other.0.adds(fact)))
    }

    /// `other` removes a fact `self` needs, so `self` must go first.
    fn precedes(&self, other: &Self) -> bool {
        other.0.removed().iter().any(|fact| self.0.requires(fact))
    }
}

impl fmt::Display for ActionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A dependency tree of actions that knows how to undo them.
///
/// Removing an action pushes its reverse back into the tree, so anything
/// the action disturbed gets restored before the actions depending on it.
#[derive(Debug, Clone)]
pub struct ActionDependencyTree {
    tree: DependencyTree<ActionElement>,
    logic: Arc<GameLogic>,
}

impl ActionDependencyTree {
    /// Create an empty tree.
    pub fn new(logic: Arc<GameLogic>) -> Self {
        Self {
            tree: DependencyTree::new(),
            logic,
        }
    }

    /// Build the tree of a sequence of actions ending with the goal.
    pub fn from_policy(logic: Arc<GameLogic>, policy: &[Action]) -> Self {
        let mut tree = Self::new(logic);
        for action in policy.iter().rev() {
            tree.push(action.clone());
        }
        tree
    }

    /// Whether the tree has no action left.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Add an action under every node needing one of its effects. Returns
    /// whether the tree changed.
    pub fn push(&mut self, action: Action) -> bool {
        self.tree.push(ActionElement(action), false)
    }

    /// The actions that can happen next.
    pub fn leaves(&self) -> Vec<&Action> {
        self.tree.leaves().into_iter().map(ActionElement::action).collect()
    }

    /// Remove `action` where it is a leaf, then push its reverse.
    ///
    /// Returns the reverse action, or `None` when the tree is empty or the
    /// action cannot be undone.
    pub fn remove(&mut self, action: &Action) -> Option<Action> {
        if self.tree.is_empty() {
            return None;
        }
        self.tree.remove(&ActionElement(action.clone()));
        let reverse = self.logic.reverse_action(action)?;
        self.push(reverse.clone());
        Some(reverse)
    }

    /// The actions in an order they can be performed in.
    ///
    /// Leaves are taken one at a time, preferring leaves that do not undo
    /// what another leaf needs and never taking the reverse of the action
    /// just taken unless nothing else is left. `None` when the actions
    /// keep undoing each other and no complete ordering is found.
    pub fn flatten(&self) -> Option<Vec<Action>> {
        self.flatten_within(4 * self.tree.values().len() + 16)
    }

    fn flatten_within(&self, mut budget: usize) -> Option<Vec<Action>> {
        let mut tree = self.clone();
        let mut policy = Vec::new();
        let mut last_reverse: Option<Action> = None;

        while !tree.is_empty() && budget > 0 {
            budget -= 1;
            let leaves: Vec<ActionElement> = tree.tree.leaves().into_iter().cloned().collect();
            let Some(leaf) = pick_leaf(&leaves, last_reverse.as_ref()) else {
                break;
            };
            policy.push(leaf.clone());
            last_reverse = tree.remove(&leaf);
        }
        if !tree.is_empty() {
            debug!(partial = policy.len(), "dependency tree could not be flattened");
            return None;
        }
        Some(policy)
    }
}

fn pick_leaf(leaves: &[ActionElement], last_reverse: Option<&Action>) -> Option<Action> {
    let blocked = |leaf: &ActionElement| leaves.iter().any(|other| other != leaf && other.precedes(leaf));
    let mut ordered: Vec<&ActionElement> = leaves.iter().filter(|leaf| !blocked(*leaf)).collect();
    ordered.extend(leaves.iter().filter(|leaf| blocked(*leaf)));

    ordered
        .iter()
        .find(|leaf| Some(leaf.action()) != last_reverse)
        .or_else(|| ordered.first())
        .map(|leaf| leaf.0.clone())
}

impl fmt::Display for ActionDependencyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tree, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCondition;
    use qw_core::{Placeholder, Variable};

    const LOGIC: &str = r#"
        type P {}
        type I {}
        type r {
            predicates { at(P, r); link(r, r); }
            rules {
                go :: at(P, r) & $link(r, r') -> at(P, r');
            }
        }
        type c {
            predicates { at(c, r); open(c); closed(c); }
            rules {
                open/c :: $at(P, r) & $at(c, r) & closed(c) -> open(c);
                close/c :: $at(P, r) & $at(c, r) & open(c) -> closed(c);
            }
            reverse_rules { open/c :: close/c; }
        }
        type o {
            predicates { in(o, I); in(o, c); }
            rules {
                insert :: $at(P, r) & $at(c, r) & $open(c) & in(o, I) -> in(o, c);
            }
        }
    "#;

    fn logic() -> Arc<GameLogic> {
        Arc::new(qw_dsl::parse_logic(LOGIC).unwrap())
    }

    fn action(logic: &GameLogic, rule: &str, bindings: &[(&str, &str, &str)]) -> Action {
        let mut mapping = logic.constants_mapping();
        for (ph, name, ty) in bindings {
            mapping.insert(Placeholder::new(*ph), Variable::new(*name, *ty));
        }
        logic.rule(rule).unwrap().instantiate(&mapping).unwrap()
    }

    fn names(policy: &[Action]) -> Vec<&str> {
        policy.iter().map(Action::name).collect()
    }

    /// go(hall -> kitchen), insert(carrot, chest), close/c(chest), then the
    /// trigger of "the carrot is in the closed chest".
    fn plan(logic: &GameLogic) -> Vec<Action> {
        let go = action(logic, "go", &[("r", "hall", "r"), ("r'", "kitchen", "r")]);
        let insert = action(logic, "insert", &[("r", "kitchen", "r"), ("c", "chest", "c"), ("o", "carrot", "o")]);
        let close = action(logic, "close/c", &[("r", "kitchen", "r"), ("c", "chest", "c")]);
        let goal = insert.added().iter().chain(close.added()).cloned();
        let trigger = EventCondition::new(goal, Vec::new()).unwrap().trigger().clone();
        vec![go, insert, close, trigger]
    }

    #[test]
    fn element_relations() {
        let logic = logic();
        let plan: Vec<ActionElement> = plan(&logic).into_iter().map(ActionElement).collect();
        let (go, insert, close, trigger) = (&plan[0], &plan[1], &plan[2], &plan[3]);

        assert!(insert.depends_on(go));
        assert!(close.depends_on(go));
        assert!(!close.depends_on(insert));
        assert!(trigger.depends_on(insert) && trigger.depends_on(close));
        assert!(!trigger.depends_on(go));
        assert!(insert.precedes(close));
        assert!(!close.precedes(insert));
        assert!(insert.is_distinct_from(&[close]));
        assert!(!insert.is_distinct_from(&[insert]));
    }

    #[test]
    fn flatten_orders_siblings() {
        let logic = logic();
        let plan = plan(&logic);
        let tree = ActionDependencyTree::from_policy(logic.clone(), &plan);

        assert_eq!(names(&tree.flatten().unwrap()), vec!["go", "insert", "close/c", "trigger"]);
        assert_eq!(tree.leaves().len(), 1);
        // Flattening works on a copy.
        assert_eq!(tree.flatten(), tree.flatten());
    }

    #[test]
    fn flatten_gives_up_when_out_of_steps() {
        let logic = logic();
        let tree = ActionDependencyTree::from_policy(logic.clone(), &plan(&logic));
        assert_eq!(tree.flatten_within(3), None);
        assert_eq!(tree.flatten_within(4).map(|p| p.len()), Some(4));
    }

    #[test]
    fn removing_a_reversible_action_pushes_its_reverse() {
        let logic = logic();
        let close = action(&logic, "close/c", &[("r", "kitchen", "r"), ("c", "chest", "c")]);
        let insert = action(&logic, "insert", &[("r", "kitchen", "r"), ("c", "chest", "c"), ("o", "carrot", "o")]);
        let mut tree = ActionDependencyTree::from_policy(logic.clone(), &[insert.clone()]);

        // Closing the chest removes open(chest), which insert needs.
        let reverse = tree.remove(&close).unwrap();
        assert_eq!(reverse.name(), "open/c");
        assert_eq!(names(&tree.flatten().unwrap()), vec!["open/c", "insert"]);
    }

    #[test]
    fn irreversible_actions_have_no_reverse() {
        let logic = logic();
        let plan = plan(&logic);
        let mut tree = ActionDependencyTree::from_policy(logic.clone(), &plan);
        assert!(tree.remove(&plan[0]).is_none());
        assert_eq!(names(&tree.flatten().unwrap()), vec!["insert", "close/c", "trigger"]);
    }

    #[test]
    fn empty_tree() {
        let logic = logic();
        let plan = plan(&logic);
        let mut tree = ActionDependencyTree::new(logic);
        assert!(tree.is_empty());
        assert!(tree.remove(&plan[2]).is_none());
        assert_eq!(tree.flatten(), Some(Vec::new()));
    }
}
