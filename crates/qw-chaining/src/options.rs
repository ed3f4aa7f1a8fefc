use std::collections::BTreeSet;
use std::sync::Arc;

use qw_core::{Action, GameLogic, Mapping, Rule, State};

use crate::error::{ChainError, ChainResult};

/// Rule-name prefixes left out once `rules_per_depth` runs out.
const PASSIVE_RULE_PREFIXES: [&str; 3] = ["examine", "look", "inventory"];

/// Options controlling the shape of generated chains.
///
/// Depth bounds apply to a single linear subchain, breadth bounds to the
/// number of parallel subchains and length bounds to the total number of
/// actions.
#[derive(Debug, Clone)]
pub struct ChainingOptions {
    /// Search backwards from a terminal state instead of forwards.
    pub backward: bool,
    /// Minimum depth of a yielded chain.
    pub min_depth: usize,
    /// Maximum depth of any subchain.
    pub max_depth: usize,
    /// Minimum number of parallel subchains.
    pub min_breadth: usize,
    /// Maximum number of parallel subchains.
    pub max_breadth: usize,
    /// Minimum total number of actions.
    pub min_length: usize,
    /// Maximum total number of actions, unbounded when `None`.
    pub max_length: Option<usize>,
    /// Also yield chains that could still be extended.
    pub subquests: bool,
    /// Allow a new subchain to branch off the starting state itself.
    pub independent_chains: bool,
    /// Allow actions to introduce variables that do not exist yet.
    pub create_variables: bool,
    /// Types that may never receive a new variable.
    pub restricted_types: BTreeSet<String>,
    /// If set, the only types that may receive a new variable.
    pub allowed_types: Option<BTreeSet<String>>,
    /// Rule names allowed at each depth.
    pub rules_per_depth: Vec<Vec<String>>,
    /// Seed for shuffling candidates; candidates keep their canonical order
    /// when `None`.
    pub seed: Option<u64>,
    /// Bindings every instantiation must respect, on top of the logic's
    /// constants.
    pub fixed_mapping: Mapping,
}

impl Default for ChainingOptions {
    fn default() -> Self {
        Self {
            backward: false,
            min_depth: 1,
            max_depth: 1,
            min_breadth: 1,
            max_breadth: 1,
            min_length: 1,
            max_length: None,
            subquests: false,
            independent_chains: false,
            create_variables: false,
            restricted_types: BTreeSet::new(),
            allowed_types: None,
            rules_per_depth: Vec::new(),
            seed: None,
            fixed_mapping: Mapping::new(),
        }
    }
}

impl ChainingOptions {
    /// Search backwards from the given state.
    pub fn with_backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    /// Set the minimum and maximum depth.
    pub fn with_depth(mut self, min: usize, max: usize) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    /// Set the minimum and maximum breadth.
    pub fn with_breadth(mut self, min: usize, max: usize) -> Self {
        self.min_breadth = min;
        self.max_breadth = max;
        self
    }

    /// Set the minimum and maximum total length.
    pub fn with_length(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Also yield chains that could still be extended.
    pub fn with_subquests(mut self, subquests: bool) -> Self {
        self.subquests = subquests;
        self
    }

    /// Allow subchains branching off the starting state.
    pub fn with_independent_chains(mut self, independent: bool) -> Self {
        self.independent_chains = independent;
        self
    }

    /// Allow the creation of new variables.
    pub fn with_create_variables(mut self, create: bool) -> Self {
        self.create_variables = create;
        self
    }

    /// Forbid new variables of these types.
    pub fn with_restricted_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.restricted_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Only allow new variables of these types.
    pub fn with_allowed_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the rules usable at each depth.
    pub fn with_rules_per_depth<S: Into<String>>(mut self, rules: impl IntoIterator<Item = Vec<S>>) -> Self {
        self.rules_per_depth = rules
            .into_iter()
            .map(|names| names.into_iter().map(Into::into).collect())
            .collect();
        self
    }

    /// Shuffle candidates with a `StdRng` seeded with `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add bindings every instantiation must respect.
    pub fn with_fixed_mapping(mut self, mapping: Mapping) -> Self {
        self.fixed_mapping = mapping;
        self
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    /// Whether a new variable of type `type_name` may be created.
    pub fn check_new_variable(&self, type_name: &str) -> bool {
        !self.restricted_types.contains(type_name)
            && self.allowed_types.as_ref().is_none_or(|allowed| allowed.contains(type_name))
    }

    /// Whether `action` may be taken in `state`.
    ///
    /// An action may not assert a fact that is missing from the state unless
    /// that fact mentions a variable the state does not know yet.
    pub fn check_action(&self, state: &State, action: &Action) -> bool {
        action.preconditions().iter().all(|prop| {
            state.is_fact(prop) || !prop.arguments().iter().all(|var| state.has_variable(var.name()))
        })
    }

    /// The logic's constants overridden by `fixed_mapping`.
    pub(crate) fn mapping(&self, logic: &GameLogic) -> Mapping {
        let mut mapping = logic.constants_mapping();
        mapping.extend(self.fixed_mapping.iter().map(|(ph, var)| (ph.clone(), var.clone())));
        mapping
    }

    /// Resolve the rules usable at each depth, plus the rules used beyond
    /// the last listed depth.
    pub(crate) fn resolve_rules(&self, logic: &GameLogic) -> ChainResult<RuleSchedule> {
        let mut per_depth = Vec::with_capacity(self.rules_per_depth.len());
        for (depth, names) in self.rules_per_depth.iter().enumerate() {
            let rules = names
                .iter()
                .map(|name| {
                    logic.rule(name).cloned().map_err(|_| ChainError::UnknownRule {
                        depth,
                        name: name.clone(),
                    })
                })
                .collect::<ChainResult<Vec<_>>>()?;
            per_depth.push(rules);
        }

        let fallback = logic
            .rules()
            .filter(|rule| !PASSIVE_RULE_PREFIXES.iter().any(|p| rule.name().starts_with(p)))
            .cloned()
            .collect();

        Ok(RuleSchedule { per_depth, fallback })
    }
}

/// Rules resolved per depth.
#[derive(Debug, Clone)]
pub(crate) struct RuleSchedule<T = Arc<Rule>> {
    per_depth: Vec<Vec<T>>,
    fallback: Vec<T>,
}

impl<T> RuleSchedule<T> {
    /// The rules usable at `depth`.
    pub(crate) fn at(&self, depth: usize) -> &[T] {
        self.per_depth.get(depth).map_or(&self.fallback, Vec::as_slice)
    }

    /// Transform every rule of the schedule.
    pub(crate) fn map<U>(self, mut f: impl FnMut(T) -> U) -> RuleSchedule<U> {
        let per_depth = self
            .per_depth
            .into_iter()
            .map(|rules| rules.into_iter().map(&mut f).collect())
            .collect();
        let fallback = self.fallback.into_iter().map(&mut f).collect();
        RuleSchedule { per_depth, fallback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ChainingOptions::default();
        assert!(!options.backward);
        assert_eq!((options.min_depth, options.max_depth), (1, 1));
        assert_eq!((options.min_breadth, options.max_breadth), (1, 1));
        assert_eq!(options.min_length, 1);
        assert_eq!(options.max_length, None);
        assert!(options.seed.is_none());
        assert!(options.fixed_mapping.is_empty());
    }

    #[test]
    fn builders_chain() {
        let options = ChainingOptions::default()
            .with_backward(true)
            .with_depth(2, 4)
            .with_breadth(1, 2)
            .with_length(2, Some(6))
            .with_seed(7)
            .with_rules_per_depth([vec!["open/d"], vec!["go/east"]]);
        assert!(options.backward);
        assert_eq!(options.max_depth, 4);
        assert_eq!(options.max_breadth, 2);
        assert_eq!(options.max_length, Some(6));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.rules_per_depth[1], vec!["go/east".to_string()]);
    }

    #[test]
    fn new_variable_policy() {
        let options = ChainingOptions::default().with_restricted_types(["r"]);
        assert!(!options.check_new_variable("r"));
        assert!(options.check_new_variable("o"));

        let options = options.with_allowed_types(["k"]);
        assert!(options.check_new_variable("k"));
        assert!(!options.check_new_variable("o"));
    }
}
