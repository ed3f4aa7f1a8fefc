use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use qw_core::{Action, GameLogic, Mapping, PartialMapping, Placeholder, Rule, State, Variable};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::chain::{Chain, ChainNode};
use crate::error::{ChainError, ChainResult};
use crate::options::{ChainingOptions, RuleSchedule};

const OPEN_DOOR: &str = "open/d";

fn is_navigation(action: &Action) -> bool {
    action.name().starts_with("go/")
}

/// A rule as searched, together with the rule it was declared as.
///
/// Backward search unifies against the reversed rule and emits the
/// declared one.
struct DirectedRule {
    search: Rule,
    source: Arc<Rule>,
}

/// A candidate action: the action applied to the search state and the
/// action as it appears in the emitted chain. Both are the same when
/// searching forward.
#[derive(Clone)]
struct Step {
    action: Action,
    forward: Action,
}

struct Candidate {
    rule: Rc<DirectedRule>,
    mapping: PartialMapping,
}

impl Candidate {
    fn sort_key(&self) -> (&str, Vec<&Placeholder>, Vec<(&Placeholder, &Variable)>) {
        let absent = self.mapping.iter().filter(|(_, v)| v.is_none()).map(|(ph, _)| ph).collect();
        let present = self
            .mapping
            .iter()
            .filter_map(|(ph, v)| v.as_ref().map(|v| (ph, v)))
            .collect();
        (self.rule.search.name(), absent, present)
    }
}

/// A node of the search tree.
///
/// `parent` is the previous step of the linear path from the root;
/// `dep_parent` is the step this one builds upon, which differs from
/// `parent` after backtracking. `backtracks[i]` holds the actions already
/// used at depth `i + 1` so that backtracking never yields them twice.
struct SearchNode {
    parent: Option<Rc<SearchNode>>,
    dep_parent: Option<Rc<SearchNode>>,
    state: State,
    step: Option<Step>,
    backtracks: Vec<Rc<HashSet<Action>>>,
    depth: usize,
    breadth: usize,
    length: usize,
}

/// Lazy enumeration of the chains admitted by a [`ChainingOptions`].
///
/// Created by [`get_chains`]. The search is depth first over an explicit
/// stack; chains come out in a deterministic order unless a seed is set.
pub struct Chainer<'a> {
    logic: &'a GameLogic,
    options: ChainingOptions,
    rules: RuleSchedule<Rc<DirectedRule>>,
    mapping: Mapping,
    rng: Option<StdRng>,
    stack: Vec<Rc<SearchNode>>,
}

/// Enumerate the chains starting from (or, backwards, ending at) `state`.
///
/// Fails if `rules_per_depth` names an unknown rule.
pub fn get_chains<'a>(logic: &'a GameLogic, state: &State, options: ChainingOptions) -> ChainResult<Chainer<'a>> {
    let backward = options.backward;
    let rules = options.resolve_rules(logic)?.map(|source| {
        Rc::new(DirectedRule {
            search: if backward { source.reversed() } else { (*source).clone() },
            source,
        })
    });
    let mapping = options.mapping(logic);
    let rng = options.seed.map(StdRng::seed_from_u64);

    let root = SearchNode {
        parent: None,
        dep_parent: None,
        state: state.copy(),
        step: None,
        backtracks: Vec::new(),
        depth: 0,
        breadth: 1,
        length: 0,
    };

    Ok(Chainer {
        logic,
        options,
        rules,
        mapping,
        rng,
        stack: vec![Rc::new(root)],
    })
}

/// The first chain [`get_chains`] yields.
///
/// Fails with [`ChainError::QuestGeneration`] when there is none.
pub fn sample_quest(logic: &GameLogic, state: &State, options: ChainingOptions) -> ChainResult<Chain> {
    get_chains(logic, state, options)?
        .next()
        .unwrap_or(Err(ChainError::QuestGeneration))
}

impl Iterator for Chainer<'_> {
    type Item = ChainResult<Chain>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match self.expand(&node) {
                Ok(Some(chain)) => return Some(Ok(chain)),
                Ok(None) => {}
                Err(err) => {
                    self.stack.clear();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl Chainer<'_> {
    /// Push the children of `node` and return its chain if it is a result.
    fn expand(&mut self, node: &Rc<SearchNode>) -> ChainResult<Option<Chain>> {
        let children = self.chain(node)?;
        let no_children = children.is_empty();
        self.stack.extend(children);

        if !(no_children || self.options.subquests) {
            return Ok(None);
        }

        let siblings = self.backtrack(node)?;
        self.stack.extend(siblings);

        if !self.is_result(node) {
            return Ok(None);
        }
        let chain = self.make_chain(node)?;
        debug!(
            depth = node.depth,
            breadth = node.breadth,
            length = node.length,
            "yielding chain"
        );
        Ok(Some(chain))
    }

    fn is_result(&self, node: &SearchNode) -> bool {
        node.depth >= self.options.min_depth
            && node.breadth >= self.options.min_breadth
            && node.length >= self.options.min_length
    }

    fn at_max_length(&self, node: &SearchNode) -> bool {
        self.options.max_length.is_some_and(|max| node.length >= max)
    }

    // -----------------------------------------------------------------------
    // Expansion
    // -----------------------------------------------------------------------

    /// Extend the linear path ending at `node` by one action.
    fn chain(&mut self, node: &Rc<SearchNode>) -> ChainResult<Vec<Rc<SearchNode>>> {
        if node.depth >= self.options.max_depth || self.at_max_length(node) {
            return Ok(Vec::new());
        }

        let candidates = self.candidates(&node.state, node.depth);
        let mut accepted = Vec::new();
        for candidate in candidates {
            let Some(step) = self.instantiate(&node.state, &candidate)? else {
                continue;
            };
            if !self.check_action(node, &node.state, &step) {
                continue;
            }
            let Some(state) = self.apply(node, &step)? else {
                continue;
            };
            accepted.push((step, state));
        }

        // Later siblings may not backtrack into earlier ones.
        let mut used = HashSet::new();
        let mut children = Vec::with_capacity(accepted.len());
        for (step, state) in accepted {
            used.insert(step.action.clone());
            let mut backtracks = node.backtracks.clone();
            backtracks.push(Rc::new(used.clone()));
            children.push(Rc::new(SearchNode {
                parent: Some(node.clone()),
                dep_parent: Some(node.clone()),
                state,
                step: Some(step),
                backtracks,
                depth: node.depth + 1,
                breadth: node.breadth,
                length: node.length + 1,
            }));
        }
        Ok(children)
    }

    /// Start a new subchain from an earlier step of the path ending at
    /// `node`.
    fn backtrack(&mut self, node: &Rc<SearchNode>) -> ChainResult<Vec<Rc<SearchNode>>> {
        if node.breadth >= self.options.max_breadth || self.at_max_length(node) {
            return Ok(Vec::new());
        }

        let mut parents = Vec::new();
        let mut current = node.dep_parent.clone();
        while let Some(parent) = current {
            current = parent.dep_parent.clone();
            if parent.step.is_some() || self.options.independent_chains {
                parents.push(parent);
            }
        }
        parents.reverse();

        let mut siblings = Vec::new();
        for parent in parents {
            let Some(used) = node.backtracks.get(parent.depth).cloned() else {
                continue;
            };

            let candidates = self.candidates(&node.state, parent.depth);
            for candidate in candidates {
                let Some(step) = self.instantiate(&node.state, &candidate)? else {
                    continue;
                };
                if used.contains(&step.action) {
                    continue;
                }
                if !self.check_action(&parent, &node.state, &step) {
                    continue;
                }
                let Some(state) = self.apply(node, &step)? else {
                    continue;
                };

                debug!(
                    action = %step.forward,
                    depth = parent.depth + 1,
                    breadth = node.breadth + 1,
                    "backtracking"
                );
                let mut used = (*used).clone();
                used.insert(step.action.clone());
                let mut backtracks = node.backtracks[..parent.depth].to_vec();
                backtracks.push(Rc::new(used));
                siblings.push(Rc::new(SearchNode {
                    parent: Some(node.clone()),
                    dep_parent: Some(parent.clone()),
                    state,
                    step: Some(step),
                    backtracks,
                    depth: parent.depth + 1,
                    breadth: node.breadth + 1,
                    length: node.length + 1,
                }));
            }
        }
        Ok(siblings)
    }

    /// Every assignment of the rules usable at `depth`, in canonical order
    /// or shuffled when a seed is set.
    fn candidates(&mut self, state: &State, depth: usize) -> Vec<Candidate> {
        let options = &self.options;
        let mut candidates = Vec::new();
        for rule in self.rules.at(depth) {
            if options.create_variables {
                let allow_partial = |ph: &Placeholder| options.check_new_variable(ph.type_name());
                for mapping in state.all_partial_assignments(&rule.search, &self.mapping, allow_partial) {
                    candidates.push(Candidate {
                        rule: rule.clone(),
                        mapping,
                    });
                }
            } else {
                for mapping in state.all_assignments(&rule.search, &self.mapping) {
                    let mapping = mapping.into_iter().map(|(ph, var)| (ph, Some(var))).collect();
                    candidates.push(Candidate {
                        rule: rule.clone(),
                        mapping,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        if let Some(rng) = self.rng.as_mut() {
            candidates.shuffle(rng);
        }
        candidates
    }

    /// Bind the missing placeholders of a candidate to fresh variables.
    ///
    /// Fresh variables are named `{type}_{n}`, with apostrophes appended
    /// until the name is unused.
    fn instantiate(&self, state: &State, candidate: &Candidate) -> ChainResult<Option<Step>> {
        let rule = &candidate.rule;
        let mut mapping = Mapping::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for ph in rule.search.placeholders() {
            if let Some(Some(var)) = candidate.mapping.get(ph) {
                mapping.insert(ph.clone(), var.clone());
                continue;
            }

            let type_name = ph.type_name();
            if !self.options.check_new_variable(type_name) {
                return Ok(None);
            }
            let count = counts
                .entry(type_name)
                .or_insert_with(|| state.variables_of_type(type_name).count());
            let mut name = format!("{type_name}_{count}");
            while state.has_variable(&name) || mapping.values().any(|v| v.name() == name) {
                name.push('\'');
            }
            *count += 1;
            mapping.insert(ph.clone(), Variable::new(name, type_name));
        }

        let action = rule.search.instantiate(&mapping)?;
        let forward = if self.options.backward {
            rule.source.instantiate(&mapping)?
        } else {
            action.clone()
        };
        Ok(Some(Step { action, forward }))
    }

    // -----------------------------------------------------------------------
    // Checks
    // -----------------------------------------------------------------------

    /// Navigation gating plus [`ChainingOptions::check_action`].
    ///
    /// Walking through rooms only counts when the first action after the
    /// walk uses something the walk and the action before it provided.
    fn check_action(&self, node: &SearchNode, state: &State, step: &Step) -> bool {
        let backward = self.options.backward;

        let mut nav_parent = node;
        while let Some(nav_step) = &nav_parent.step {
            if !is_navigation(&nav_step.action) {
                break;
            }
            let Some(parent) = nav_parent.parent.as_deref() else {
                break;
            };
            // Going through a door right after opening it is never a detour.
            if parent.step.as_ref().is_some_and(|s| s.action.name() == OPEN_DOOR) {
                break;
            }
            if backward && step.action.name() == OPEN_DOOR {
                break;
            }
            nav_parent = parent;
        }

        if let (Some(nav_step), Some(last)) = (&nav_parent.step, &node.step)
            && !is_navigation(&step.action)
        {
            let (recent, pre_navigation, post_navigation) = if backward {
                (&step.forward, &step.forward, &nav_step.forward)
            } else {
                (&last.action, &nav_step.action, &step.action)
            };
            let uses = |source: &Action| source.added().iter().any(|p| post_navigation.requires(p));
            if !uses(recent) || !uses(pre_navigation) {
                trace!(action = %step.forward, "rejected: unrelated to the previous action");
                return false;
            }
        }

        self.options.check_action(state, &step.action)
    }

    /// The state after `step`, or `None` if it breaks a constraint or
    /// revisits a state of the current path.
    fn apply(&self, node: &SearchNode, step: &Step) -> ChainResult<Option<State>> {
        let mut new_state = node.state.copy();
        for prop in step.action.preconditions() {
            new_state.add_fact(prop.clone())?;
        }
        if self.logic.is_violated(&new_state) {
            trace!(action = %step.forward, "rejected: preconditions break a constraint");
            return Ok(None);
        }

        new_state.apply(&step.action)?;
        if self.logic.is_violated(&new_state) {
            trace!(action = %step.forward, "rejected: effects break a constraint");
            return Ok(None);
        }

        let mut state = new_state.copy();
        state.apply(&step.action.swapped())?;
        let mut current = Some(node);
        while let Some(n) = current {
            let Some(previous) = &n.step else {
                break;
            };
            state.apply(&previous.action.swapped())?;
            if state == new_state {
                trace!(action = %step.forward, "rejected: cycle");
                return Ok(None);
            }
            current = n.parent.as_deref();
        }

        Ok(Some(new_state))
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn make_chain(&self, leaf: &SearchNode) -> ChainResult<Chain> {
        let mut path: Vec<&SearchNode> = Vec::new();
        let mut current = Some(leaf);
        while let Some(node) = current {
            if node.step.is_none() {
                break;
            }
            path.push(node);
            current = node.parent.as_deref();
        }

        let backward = self.options.backward;
        let len = path.len();
        let position = |idx: usize| if backward { idx } else { len - 1 - idx };

        let mut nodes: Vec<Option<ChainNode>> = vec![None; len];
        for (idx, node) in path.iter().enumerate() {
            let Some(step) = &node.step else {
                continue;
            };
            let parent = node
                .dep_parent
                .as_deref()
                .and_then(|dep| path.iter().position(|n| std::ptr::eq(*n, dep)))
                .map(position);
            nodes[position(idx)] = Some(ChainNode {
                action: step.forward.clone(),
                depth: node.depth,
                breadth: node.breadth,
                parent,
            });
        }

        let mut initial_state = leaf.state.copy();
        if !backward {
            for node in &path {
                if let Some(step) = &node.step {
                    initial_state.apply(&step.action.swapped())?;
                }
            }
        }

        Ok(Chain {
            initial_state,
            nodes: nodes.into_iter().flatten().collect(),
        })
    }
}
