use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{CoreError, CoreResult};
use crate::fact::{Mapping, Predicate, Proposition, Signature};
use crate::logic::GameLogic;
use crate::rule::Rule;
use crate::term::{Placeholder, Variable};
use crate::types::TypeHierarchy;

/// Assignment where unbound placeholders are `None`, standing for variables
/// that do not exist yet.
pub type PartialMapping = BTreeMap<Placeholder, Option<Variable>>;

/// An indexed set of facts.
///
/// Facts are grouped by signature; variables are indexed by name and by
/// type and forgotten once no fact references them. Two states are equal
/// when their fact sets are equal.
#[derive(Debug, Clone, Default)]
pub struct State {
    types: Arc<TypeHierarchy>,
    facts: BTreeMap<Signature, BTreeSet<Proposition>>,
    vars_by_name: HashMap<Arc<str>, Variable>,
    vars_by_type: HashMap<Arc<str>, IndexSet<Variable>>,
    var_counts: HashMap<Arc<str>, usize>,
}

impl State {
    /// Create an empty state over a type hierarchy.
    pub fn new(types: Arc<TypeHierarchy>) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    /// Create a state holding `facts`.
    pub fn with_facts(types: Arc<TypeHierarchy>, facts: impl IntoIterator<Item = Proposition>) -> CoreResult<Self> {
        let mut state = Self::new(types);
        state.add_facts(facts)?;
        Ok(state)
    }

    /// The type hierarchy used for subtype-aware matching.
    pub fn types(&self) -> &Arc<TypeHierarchy> {
        &self.types
    }

    /// A snapshot of this state. Mutating either copy leaves the other unchanged.
    pub fn copy(&self) -> State {
        self.clone()
    }

    // -----------------------------------------------------------------------
    // Fact queries
    // -----------------------------------------------------------------------

    /// Every fact, sorted by signature then arguments.
    pub fn facts(&self) -> impl Iterator<Item = &Proposition> {
        self.facts.values().flatten()
    }

    /// Number of facts.
    pub fn len(&self) -> usize {
        self.facts.values().map(BTreeSet::len).sum()
    }

    /// Whether the state holds no fact.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts of the given signature.
    pub fn facts_with_signature(&self, signature: &Signature) -> impl Iterator<Item = &Proposition> {
        self.facts.get(signature).into_iter().flatten()
    }

    /// Whether `fact` holds.
    pub fn is_fact(&self, fact: &Proposition) -> bool {
        self.facts.get(fact.signature()).is_some_and(|set| set.contains(fact))
    }

    /// Whether every fact of `facts` holds.
    pub fn are_facts<'a>(&self, facts: impl IntoIterator<Item = &'a Proposition>) -> bool {
        facts.into_iter().all(|f| self.is_fact(f))
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Every variable referenced by a fact.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.vars_by_name.values()
    }

    /// The variable with the given name.
    pub fn variable(&self, name: &str) -> CoreResult<&Variable> {
        self.vars_by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownVariable(name.to_string()))
    }

    /// Whether a fact references a variable with this name.
    pub fn has_variable(&self, name: &str) -> bool {
        self.vars_by_name.contains_key(name)
    }

    /// Variables of exactly this type, in order of first reference.
    pub fn variables_of_type(&self, type_name: &str) -> impl Iterator<Item = &Variable> {
        self.vars_by_type.get(type_name).into_iter().flatten()
    }

    /// Variables of this type or any of its subtypes.
    pub fn variables_of_subtypes(&self, type_name: &str) -> Vec<Variable> {
        self.types
            .subtypes(type_name)
            .iter()
            .flat_map(|t| self.variables_of_type(t))
            .cloned()
            .collect()
    }

    fn reference(&mut self, var: &Variable) {
        *self.var_counts.entry(var.name_arc().clone()).or_default() += 1;
        self.vars_by_name.entry(var.name_arc().clone()).or_insert_with(|| var.clone());
        self.vars_by_type.entry(var.type_arc().clone()).or_default().insert(var.clone());
    }

    fn release(&mut self, var: &Variable) {
        let Some(count) = self.var_counts.get_mut(var.name()) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.var_counts.remove(var.name());
        self.vars_by_name.remove(var.name());
        if let Some(vars) = self.vars_by_type.get_mut(var.type_name()) {
            vars.shift_remove(var);
            if vars.is_empty() {
                self.vars_by_type.remove(var.type_name());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add a fact. Returns whether it was new.
    ///
    /// Fails if one of its arguments reuses a known variable name with
    /// another type.
    pub fn add_fact(&mut self, fact: Proposition) -> CoreResult<bool> {
        for var in fact.arguments() {
            if let Some(existing) = self.vars_by_name.get(var.name())
                && existing.type_name() != var.type_name()
            {
                return Err(CoreError::TypeConflict {
                    name: var.name().to_string(),
                    existing: existing.type_name().to_string(),
                    conflicting: var.type_name().to_string(),
                });
            }
        }

        let inserted = self
            .facts
            .entry(fact.signature().clone())
            .or_default()
            .insert(fact.clone());
        if inserted {
            for var in fact.arguments() {
                self.reference(var);
            }
        }
        Ok(inserted)
    }

    /// Add several facts.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Proposition>) -> CoreResult<()> {
        for fact in facts {
            self.add_fact(fact)?;
        }
        Ok(())
    }

    /// Remove a fact. Returns whether it was present.
    pub fn remove_fact(&mut self, fact: &Proposition) -> bool {
        let Some(set) = self.facts.get_mut(fact.signature()) else {
            return false;
        };
        if !set.remove(fact) {
            return false;
        }
        if set.is_empty() {
            self.facts.remove(fact.signature());
        }
        for var in fact.arguments() {
            self.release(var);
        }
        true
    }

    /// Remove several facts.
    pub fn remove_facts<'a>(&mut self, facts: impl IntoIterator<Item = &'a Proposition>) {
        for fact in facts {
            self.remove_fact(fact);
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Whether every precondition of `action` holds.
    pub fn is_applicable(&self, action: &Action) -> bool {
        self.are_facts(action.preconditions())
    }

    /// Whether `actions` can be applied one after the other.
    ///
    /// Only the fact sets are simulated; no intermediate state is built.
    pub fn is_sequence_applicable<'a>(&self, actions: impl IntoIterator<Item = &'a Action>) -> bool {
        let mut facts: HashSet<&Proposition> = self.facts().collect();
        for action in actions {
            if !action.preconditions().iter().all(|p| facts.contains(p)) {
                return false;
            }
            for removed in action.removed() {
                facts.remove(removed);
            }
            facts.extend(action.added());
        }
        true
    }

    /// Apply `action` if it is applicable. Returns whether it was applied.
    pub fn apply(&mut self, action: &Action) -> CoreResult<bool> {
        if !self.is_applicable(action) {
            return Ok(false);
        }
        self.add_facts(action.added().iter().cloned())?;
        self.remove_facts(action.removed());
        Ok(true)
    }

    /// A copy of this state with `action` applied, or `None` if it is not
    /// applicable.
    pub fn apply_on_copy(&self, action: &Action) -> CoreResult<Option<State>> {
        if !self.is_applicable(action) {
            return Ok(None);
        }
        let mut state = self.copy();
        state.apply(action)?;
        Ok(Some(state))
    }

    // -----------------------------------------------------------------------
    // Unification
    // -----------------------------------------------------------------------

    /// Every injective assignment of the rule's placeholders to variables of
    /// this state such that all preconditions hold.
    ///
    /// Placeholders bound by `mapping` keep their binding. Preconditions are
    /// matched in order against facts of the predicate's signature or of any
    /// subtype signature; placeholders appearing only in postconditions take
    /// every unused variable of their type or its subtypes.
    pub fn all_assignments(&self, rule: &Rule, mapping: &Mapping) -> Vec<Mapping> {
        let mut bound = Mapping::new();
        for ph in rule.placeholders() {
            if let Some(var) = mapping.get(ph) {
                bound.insert(ph.clone(), var.clone());
            }
        }
        let mut used: HashSet<Variable> = bound.values().cloned().collect();
        let mut results = Vec::new();
        self.match_preconditions(rule, 0, &mut bound, &mut used, &mut results);
        results
    }

    fn match_preconditions(
        &self,
        rule: &Rule,
        index: usize,
        mapping: &mut Mapping,
        used: &mut HashSet<Variable>,
        results: &mut Vec<Mapping>,
    ) {
        let Some(pred) = rule.preconditions().get(index) else {
            let free: Vec<&Placeholder> = rule.placeholders().iter().filter(|ph| !mapping.contains_key(*ph)).collect();
            self.fill_free(&free, mapping, used, results);
            return;
        };

        for types in self.types.multi_subtypes(&pred.types()).iter() {
            let signature = Signature::new(pred.name(), types.iter().cloned());
            for fact in self.facts_with_signature(&signature) {
                let Some(new) = bind_fact(pred, fact, mapping, used) else {
                    continue;
                };
                for (ph, var) in &new {
                    used.insert(var.clone());
                    mapping.insert(ph.clone(), var.clone());
                }
                self.match_preconditions(rule, index + 1, mapping, used, results);
                for (ph, var) in &new {
                    used.remove(var);
                    mapping.remove(ph);
                }
            }
        }
    }

    fn fill_free(&self, free: &[&Placeholder], mapping: &mut Mapping, used: &mut HashSet<Variable>, results: &mut Vec<Mapping>) {
        let Some((ph, rest)) = free.split_first() else {
            results.push(mapping.clone());
            return;
        };
        for var in self.variables_of_subtypes(ph.type_name()) {
            if used.contains(&var) {
                continue;
            }
            used.insert(var.clone());
            mapping.insert((*ph).clone(), var.clone());
            self.fill_free(rest, mapping, used, results);
            mapping.remove(*ph);
            used.remove(&var);
        }
    }

    /// Every assignment of the rule's placeholders where unbound
    /// placeholders take a variable of their type (or a subtype) or, when
    /// `allow_partial` accepts them, `None`.
    ///
    /// Assigned variables are pairwise distinct. Preconditions are not
    /// checked: callers assert them before applying the action.
    pub fn all_partial_assignments(
        &self,
        rule: &Rule,
        mapping: &Mapping,
        allow_partial: impl Fn(&Placeholder) -> bool,
    ) -> Vec<PartialMapping> {
        let mut current = PartialMapping::new();
        let mut used = HashSet::new();
        let mut free = Vec::new();
        for ph in rule.placeholders() {
            match mapping.get(ph) {
                Some(var) => {
                    used.insert(var.clone());
                    current.insert(ph.clone(), Some(var.clone()));
                }
                None => free.push(ph),
            }
        }

        let candidates: Vec<Vec<Option<Variable>>> = free
            .iter()
            .map(|ph| {
                let mut options: Vec<Option<Variable>> =
                    self.variables_of_subtypes(ph.type_name()).into_iter().map(Some).collect();
                if allow_partial(ph) {
                    options.push(None);
                }
                options
            })
            .collect();

        let mut results = Vec::new();
        product(&free, &candidates, &mut current, &mut used, &mut results);
        results
    }

    /// Every action instantiating `rule` that is applicable in this state.
    pub fn all_instantiations(&self, rule: &Rule, mapping: &Mapping) -> CoreResult<Vec<Action>> {
        self.all_assignments(rule, mapping)
            .iter()
            .map(|assignment| rule.instantiate(assignment))
            .collect()
    }

    /// Every applicable action of every rule, rule by rule.
    pub fn all_applicable_actions<'a>(
        &self,
        rules: impl IntoIterator<Item = &'a Rule>,
        mapping: &Mapping,
    ) -> CoreResult<Vec<Action>> {
        let mut actions = Vec::new();
        for rule in rules {
            actions.extend(self.all_instantiations(rule, mapping)?);
        }
        Ok(actions)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize to a plain data tree. Facts come in canonical order.
    pub fn to_data(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a state from a data tree, interning its facts through `logic`.
    pub fn from_data(data: serde_json::Value, logic: &GameLogic) -> CoreResult<State> {
        let repr: StateRepr = serde_json::from_value(data)?;
        logic.new_state(repr.facts)
    }
}

fn bind_fact(pred: &Predicate, fact: &Proposition, mapping: &Mapping, used: &HashSet<Variable>) -> Option<Vec<(Placeholder, Variable)>> {
    let mut new: Vec<(Placeholder, Variable)> = Vec::new();
    for (ph, var) in pred.parameters().iter().zip(fact.arguments()) {
        if let Some(bound) = mapping.get(ph) {
            if bound != var {
                return None;
            }
            continue;
        }
        if let Some((_, earlier)) = new.iter().find(|(p, _)| p == ph) {
            if earlier != var {
                return None;
            }
            continue;
        }
        if used.contains(var) || new.iter().any(|(_, v)| v == var) {
            return None;
        }
        new.push((ph.clone(), var.clone()));
    }
    Some(new)
}

fn product(
    free: &[&Placeholder],
    candidates: &[Vec<Option<Variable>>],
    current: &mut PartialMapping,
    used: &mut HashSet<Variable>,
    results: &mut Vec<PartialMapping>,
) {
    let (Some((ph, free_rest)), Some((options, rest))) = (free.split_first(), candidates.split_first()) else {
        results.push(current.clone());
        return;
    };
    for option in options {
        if let Some(var) = option {
            if used.contains(var) {
                continue;
            }
            used.insert(var.clone());
        }
        current.insert((*ph).clone(), option.clone());
        product(free_rest, rest, current, used, results);
        current.remove(*ph);
        if let Some(var) = option {
            used.remove(var);
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.facts == other.facts
    }
}

impl Eq for State {}

impl std::hash::Hash for State {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.facts.hash(state);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facts: Vec<String> = self.facts().map(ToString::to_string).collect();
        write!(f, "State({})", facts.join(", "))
    }
}

#[derive(Serialize, Deserialize)]
struct StateRepr {
    facts: Vec<Proposition>,
}

impl Serialize for State {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StateRepr {
            facts: self.facts().cloned().collect(),
        }
        .serialize(serializer)
    }
}
