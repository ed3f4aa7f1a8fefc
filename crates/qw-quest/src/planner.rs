use std::collections::{HashSet, VecDeque};

use qw_core::{Action, GameLogic, State};
use tracing::{debug, trace};

use crate::config::ProgressionConfig;
use crate::error::QuestResult;

struct PlanNode {
    state: State,
    parent: Option<(usize, Action)>,
    depth: usize,
}

/// Breadth-first search for the shortest sequence of actions reaching a goal.
///
/// States that break a constraint are never entered. The search is bounded
/// by [`ProgressionConfig::max_plan_length`] and
/// [`ProgressionConfig::max_expanded_states`].
pub struct Planner<'a> {
    logic: &'a GameLogic,
    config: &'a ProgressionConfig,
}

impl<'a> Planner<'a> {
    /// Create a planner over the rules of `logic`.
    pub fn new(logic: &'a GameLogic, config: &'a ProgressionConfig) -> Self {
        Self { logic, config }
    }

    /// Find the shortest plan from `start` after which `goal` offers a
    /// final action, and return the plan followed by that action.
    ///
    /// Returns `None` when the bounds are exhausted first.
    pub fn plan(
        &self,
        start: &State,
        goal: impl Fn(&State) -> QuestResult<Option<Action>>,
    ) -> QuestResult<Option<Vec<Action>>> {
        let mut nodes = vec![PlanNode {
            state: start.copy(),
            parent: None,
            depth: 0,
        }];
        let mut seen: HashSet<State> = HashSet::from([start.copy()]);
        let mut queue = VecDeque::from([0]);

        while let Some(idx) = queue.pop_front() {
            if let Some(last) = goal(&nodes[idx].state)? {
                let mut plan = vec![last];
                let mut cursor = idx;
                while let Some((parent, action)) = &nodes[cursor].parent {
                    plan.push(action.clone());
                    cursor = *parent;
                }
                plan.reverse();
                debug!(length = plan.len(), expanded = nodes.len(), "plan found");
                return Ok(Some(plan));
            }

            let depth = nodes[idx].depth + 1;
            if depth > self.config.max_plan_length || nodes.len() >= self.config.max_expanded_states {
                continue;
            }
            for action in self.logic.all_applicable_actions(&nodes[idx].state)? {
                let Some(next) = nodes[idx].state.apply_on_copy(&action)? else {
                    continue;
                };
                if self.logic.is_violated(&next) {
                    trace!(action = %action, "planner skips a forbidden state");
                    continue;
                }
                if !seen.insert(next.copy()) {
                    continue;
                }
                nodes.push(PlanNode {
                    state: next,
                    parent: Some((idx, action)),
                    depth,
                });
                queue.push_back(nodes.len() - 1);
            }
        }

        debug!(expanded = nodes.len(), "no plan within bounds");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIC: &str = r#"
        type P {}
        type r {
            predicates { at(P, r); link(r, r); }
            rules { go :: at(P, r) & $link(r, r') -> at(P, r'); }
        }
    "#;

    fn setup(facts: &str) -> (GameLogic, State) {
        let logic = qw_dsl::parse_logic(LOGIC).unwrap();
        let state = logic.new_state(qw_dsl::parse_facts(facts).unwrap()).unwrap();
        (logic, state)
    }

    fn reach(room: &'static str) -> impl Fn(&State) -> QuestResult<Option<Action>> {
        move |state: &State| {
            let at = qw_dsl::parse_proposition(&format!("at(P, {room}: r)")).unwrap();
            let marker = qw_core::Proposition::new("done", []);
            Ok(state.is_fact(&at).then(|| Action::new("arrive", [at.clone()], [at, marker])))
        }
    }

    #[test]
    fn finds_the_shortest_plan() {
        let (logic, state) = setup("at(P, a: r) & link(a, b: r) & link(b, c: r) & link(a, c)");
        let config = ProgressionConfig::default();
        let plan = Planner::new(&logic, &config).plan(&state, reach("c")).unwrap().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name(), "go");
        assert_eq!(plan[1].name(), "arrive");
    }

    #[test]
    fn goal_already_met() {
        let (logic, state) = setup("at(P, a: r) & link(a, b: r)");
        let config = ProgressionConfig::default();
        let plan = Planner::new(&logic, &config).plan(&state, reach("a")).unwrap().unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn respects_the_length_bound() {
        let (logic, state) = setup("at(P, a: r) & link(a, b: r) & link(b, c: r) & link(c, d: r)");
        let config = ProgressionConfig::default().with_max_plan_length(2);
        let planner = Planner::new(&logic, &config);
        assert!(planner.plan(&state, reach("d")).unwrap().is_none());
        assert!(planner.plan(&state, reach("c")).unwrap().is_some());
    }

    #[test]
    fn unreachable_goal() {
        let (logic, state) = setup("at(P, a: r) & link(b: r, a)");
        let config = ProgressionConfig::default();
        assert!(Planner::new(&logic, &config).plan(&state, reach("b")).unwrap().is_none());
    }
}
