use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{CoreError, CoreResult};
use crate::fact::{Alias, Mapping, Predicate, Proposition, Signature};
use crate::intern::Interner;
use crate::rule::{ReverseBinding, Rule};
use crate::state::State;
use crate::term::{Placeholder, Variable};
use crate::types::{Type, TypeHierarchy};

/// Name of the predicate derived by violated constraints.
pub const FAIL_PREDICATE: &str = "fail";

// ---------------------------------------------------------------------------
// Inform 7 bindings
// ---------------------------------------------------------------------------

/// Inform 7 rendering of a type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inform7Type {
    /// The Inform 7 kind, such as `"room"`.
    pub kind: Option<String>,
    /// Extra Inform 7 source defining the kind.
    pub definition: Option<String>,
}

/// Command and event templates of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inform7Command {
    /// Command typed by the player, such as `"open {c}"`.
    pub command: String,
    /// Inform 7 event phrase, such as `"opening the {c}"`.
    pub event: String,
}

/// Opaque Inform 7 material, kept for the external story compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inform7Logic {
    /// Kind and definition per type name.
    pub types: IndexMap<String, Inform7Type>,
    /// Inform 7 source per predicate.
    pub predicates: IndexMap<Predicate, String>,
    /// Command and event templates per rule name.
    pub commands: IndexMap<String, Inform7Command>,
    /// Verbatim Inform 7 code blocks.
    pub code: Vec<String>,
}

// ---------------------------------------------------------------------------
// GameLogic
// ---------------------------------------------------------------------------

/// The compiled logic of a game: types, predicates, aliases, rules,
/// constraints and reverse-rule pairs.
///
/// A game logic is immutable once built and shared between every state and
/// progression that uses it. Its [`Interner`] hash-conses the facts of
/// those states.
#[derive(Debug)]
pub struct GameLogic {
    types: Arc<TypeHierarchy>,
    predicates: IndexSet<Signature>,
    aliases: IndexMap<Signature, Alias>,
    rules: IndexMap<Arc<str>, Arc<Rule>>,
    constraints: IndexMap<Arc<str>, Arc<Rule>>,
    reverse_rules: IndexMap<Arc<str>, Arc<str>>,
    inform7: Inform7Logic,
    interner: Arc<Interner>,
    documents: Vec<String>,
}

impl GameLogic {
    /// Start building a logic.
    pub fn builder() -> GameLogicBuilder {
        GameLogicBuilder::default()
    }

    /// The type hierarchy.
    pub fn types(&self) -> &Arc<TypeHierarchy> {
        &self.types
    }

    /// Declared predicate signatures, in declaration order.
    pub fn predicates(&self) -> impl Iterator<Item = &Signature> {
        self.predicates.iter()
    }

    /// Fully expanded aliases keyed by the signature of their pattern.
    pub fn aliases(&self) -> impl Iterator<Item = &Alias> {
        self.aliases.values()
    }

    /// Rules, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    /// Constraints, in declaration order.
    pub fn constraints(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.constraints.values()
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> CoreResult<&Arc<Rule>> {
        self.rules
            .get(name)
            .ok_or_else(|| CoreError::UnknownRule(name.to_string()))
    }

    /// Look up a constraint by name.
    pub fn constraint(&self, name: &str) -> CoreResult<&Arc<Rule>> {
        self.constraints
            .get(name)
            .ok_or_else(|| CoreError::UnknownConstraint(name.to_string()))
    }

    /// Name of the rule registered as the reverse of `name`.
    pub fn reverse_rule_name(&self, name: &str) -> Option<&str> {
        self.reverse_rules.get(name).map(|n| &**n)
    }

    /// The rule registered as the reverse of `rule`. Reverse pairs are
    /// involutive: the inverse of the inverse is the same `Arc`.
    pub fn inverse_rule(&self, rule: &Rule) -> Option<&Arc<Rule>> {
        self.reverse_rules
            .get(rule.name())
            .and_then(|name| self.rules.get(name))
    }

    /// The action undoing `action`, named after the registered reverse rule.
    ///
    /// Returns `None` if the action's rule has no registered reverse.
    pub fn reverse_action(&self, action: &Action) -> Option<Action> {
        let reverse = self.inverse_rule(self.rules.get(action.name())?)?;
        let candidate = Action::new(
            reverse.name(),
            action.postconditions().to_vec(),
            action.preconditions().to_vec(),
        );
        let instantiated = reverse
            .match_action(&candidate)
            .and_then(|mapping| reverse.instantiate(&mapping).ok());
        Some(instantiated.unwrap_or(candidate))
    }

    /// Inform 7 material.
    pub fn inform7(&self) -> &Inform7Logic {
        &self.inform7
    }

    /// The interner shared by every rule and state of this logic.
    pub fn interner(&self) -> &Arc<Interner> {
        &self.interner
    }

    /// Source documents this logic was compiled from.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Binds each constant type's placeholder to its singleton variable
    /// (`P` to the player, `I` to the inventory).
    pub fn constants_mapping(&self) -> Mapping {
        self.types
            .constants()
            .map(|name| (Placeholder::new(name.clone()), Variable::constant(name.clone())))
            .collect()
    }

    /// A new state holding `facts`, interned through this logic.
    pub fn new_state(&self, facts: impl IntoIterator<Item = Proposition>) -> CoreResult<State> {
        State::with_facts(
            self.types.clone(),
            facts.into_iter().map(|f| self.interner.intern_proposition(f)),
        )
    }

    /// Intern an action's facts through this logic.
    pub fn intern_action(&self, action: &Action) -> Action {
        let intern = |props: &[Proposition]| -> Vec<Proposition> {
            props.iter().map(|p| self.interner.intern_proposition(p.clone())).collect()
        };
        Action::new(action.name(), intern(action.preconditions()), intern(action.postconditions()))
            .with_command_template(action.command_template().map(str::to_string))
            .with_reverse(
                action.reverse_name().map(Arc::from),
                action.reverse_command_template().map(str::to_string),
            )
    }

    /// Every action applicable in `state`, rule by rule in declaration order.
    pub fn all_applicable_actions(&self, state: &State) -> CoreResult<Vec<Action>> {
        state.all_applicable_actions(self.rules.values().map(|r| &**r), &self.constants_mapping())
    }

    /// Names of the constraints whose `fail()` is derivable in `state`.
    pub fn constraint_violations(&self, state: &State) -> Vec<&str> {
        let mapping = self.constants_mapping();
        self.constraints
            .values()
            .filter(|c| c.postconditions().iter().any(|p| p.name() == FAIL_PREDICATE))
            .filter(|c| !state.all_assignments(c, &mapping).is_empty())
            .map(|c| c.name())
            .collect()
    }

    /// Whether `state` violates any constraint.
    pub fn is_violated(&self, state: &State) -> bool {
        !self.constraint_violations(state).is_empty()
    }

    /// Serialize to a plain data tree holding the source documents.
    pub fn to_data(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for GameLogic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Repr<'a> {
            documents: &'a [String],
        }
        Repr {
            documents: &self.documents,
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects declarations and finalizes them into a [`GameLogic`].
#[derive(Debug, Default)]
pub struct GameLogicBuilder {
    types: TypeHierarchy,
    predicates: IndexSet<Signature>,
    aliases: IndexMap<Signature, Alias>,
    rules: IndexMap<Arc<str>, Rule>,
    constraints: IndexMap<Arc<str>, Rule>,
    reverse_rules: IndexMap<Arc<str>, Arc<str>>,
    inform7: Inform7Logic,
    documents: Vec<String>,
}

impl GameLogicBuilder {
    /// Declare a type. Its parents must already be declared.
    pub fn add_type(&mut self, ty: Type) -> CoreResult<&mut Self> {
        self.types.add(ty)?;
        Ok(self)
    }

    /// Whether a type is declared.
    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    /// Declare a predicate signature.
    ///
    /// A signature cannot be both a predicate and an alias.
    pub fn add_predicate(&mut self, signature: Signature) -> CoreResult<&mut Self> {
        if self.aliases.contains_key(&signature) || !self.predicates.insert(signature.clone()) {
            return Err(CoreError::Duplicate {
                kind: "predicate",
                name: signature.to_string(),
            });
        }
        Ok(self)
    }

    /// Whether a predicate signature is declared, directly or as an alias.
    pub fn has_predicate(&self, signature: &Signature) -> bool {
        self.predicates.contains(signature) || self.aliases.contains_key(signature)
    }

    /// Declare an alias.
    pub fn add_alias(&mut self, alias: Alias) -> CoreResult<&mut Self> {
        let signature = alias.pattern.signature();
        if self.aliases.contains_key(&signature) || self.predicates.contains(&signature) {
            return Err(CoreError::Duplicate {
                kind: "alias",
                name: signature.to_string(),
            });
        }
        self.aliases.insert(signature, alias);
        Ok(self)
    }

    /// Declare a rule.
    pub fn add_rule(&mut self, rule: Rule) -> CoreResult<&mut Self> {
        insert_unique(&mut self.rules, rule, "rule")?;
        Ok(self)
    }

    /// Declare a constraint.
    pub fn add_constraint(&mut self, rule: Rule) -> CoreResult<&mut Self> {
        insert_unique(&mut self.constraints, rule, "constraint")?;
        Ok(self)
    }

    /// Declare `a` and `b` as reverses of each other.
    pub fn add_reverse_rule(&mut self, a: &str, b: &str) -> CoreResult<&mut Self> {
        for (from, to) in [(a, b), (b, a)] {
            match self.reverse_rules.get(from) {
                Some(existing) if &**existing != to => {
                    return Err(CoreError::Duplicate {
                        kind: "reverse rule",
                        name: from.to_string(),
                    });
                }
                _ => {}
            }
        }
        self.reverse_rules.insert(Arc::from(a), Arc::from(b));
        self.reverse_rules.insert(Arc::from(b), Arc::from(a));
        Ok(self)
    }

    /// Attach the Inform 7 kind and definition of a type.
    pub fn add_inform7_type(&mut self, name: &str, ty: Inform7Type) -> CoreResult<&mut Self> {
        insert_unique_key(&mut self.inform7.types, name.to_string(), ty, "inform7 type")?;
        Ok(self)
    }

    /// Attach the Inform 7 source of a predicate.
    pub fn add_inform7_predicate(&mut self, predicate: Predicate, source: String) -> CoreResult<&mut Self> {
        if self.inform7.predicates.contains_key(&predicate) {
            return Err(CoreError::Duplicate {
                kind: "inform7 predicate",
                name: predicate.to_string(),
            });
        }
        self.inform7.predicates.insert(predicate, source);
        Ok(self)
    }

    /// Attach the command and event templates of a rule.
    pub fn add_inform7_command(&mut self, rule: &str, command: Inform7Command) -> CoreResult<&mut Self> {
        insert_unique_key(&mut self.inform7.commands, rule.to_string(), command, "inform7 command")?;
        Ok(self)
    }

    /// Append a verbatim Inform 7 code block.
    pub fn add_inform7_code(&mut self, code: String) -> &mut Self {
        self.inform7.code.push(code);
        self
    }

    /// Record the source text of a compiled document.
    pub fn add_document(&mut self, source: impl Into<String>) -> &mut Self {
        self.documents.push(source.into());
        self
    }

    /// Finalize: expand aliases, normalize rules and constraints, check
    /// placeholder types and reverse-rule names, and attach command
    /// templates and reverse metadata.
    pub fn build(self) -> CoreResult<GameLogic> {
        let aliases = expand_aliases(&self.aliases)?;
        let interner = Arc::new(Interner::new());

        let normalize = |rule: &Rule| -> CoreResult<Rule> {
            let pre = expand_once(rule.preconditions(), &aliases);
            let post = expand_once(rule.postconditions(), &aliases);
            let normalized = Rule::new(rule.name(), pre, post)?.with_interner(interner.clone());
            for ph in normalized.placeholders() {
                if !self.types.contains(ph.type_name()) {
                    return Err(CoreError::UnknownType(ph.type_name().to_string()));
                }
            }
            Ok(normalized)
        };

        let mut rules: IndexMap<Arc<str>, Rule> = IndexMap::new();
        for (name, rule) in &self.rules {
            let template = self.inform7.commands.get(&**name).map(|c| c.command.clone());
            rules.insert(name.clone(), normalize(rule)?.with_command_template(template));
        }
        let mut constraints: IndexMap<Arc<str>, Arc<Rule>> = IndexMap::new();
        for (name, rule) in &self.constraints {
            constraints.insert(name.clone(), Arc::new(normalize(rule)?));
        }

        for (from, to) in &self.reverse_rules {
            for name in [from, to] {
                if !rules.contains_key(name) {
                    return Err(CoreError::UnknownRule(name.to_string()));
                }
            }
        }

        let mut bindings: Vec<(Arc<str>, ReverseBinding)> = Vec::new();
        for (from, to) in &self.reverse_rules {
            if let (Some(rule), Some(reverse)) = (rules.get(from), rules.get(to)) {
                bindings.push((from.clone(), reverse_binding(rule, reverse)));
            }
        }
        for (name, binding) in bindings {
            if let Some(rule) = rules.get_mut(&name) {
                rule.set_reverse(Some(binding));
            }
        }

        let interned: IndexSet<Signature> = self
            .predicates
            .into_iter()
            .map(|s| interner.intern_signature(s))
            .collect();

        Ok(GameLogic {
            types: Arc::new(self.types),
            predicates: interned,
            aliases,
            rules: rules.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            constraints,
            reverse_rules: self.reverse_rules,
            inform7: self.inform7,
            interner,
            documents: self.documents,
        })
    }
}

fn insert_unique(map: &mut IndexMap<Arc<str>, Rule>, rule: Rule, kind: &'static str) -> CoreResult<()> {
    let name: Arc<str> = Arc::from(rule.name());
    if map.contains_key(&name) {
        return Err(CoreError::Duplicate {
            kind,
            name: name.to_string(),
        });
    }
    map.insert(name, rule);
    Ok(())
}

fn insert_unique_key<V>(map: &mut IndexMap<String, V>, key: String, value: V, kind: &'static str) -> CoreResult<()> {
    if map.contains_key(&key) {
        return Err(CoreError::Duplicate { kind, name: key });
    }
    map.insert(key, value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Alias expansion
// ---------------------------------------------------------------------------

fn expand_aliases(aliases: &IndexMap<Signature, Alias>) -> CoreResult<IndexMap<Signature, Alias>> {
    let mut expanded = IndexMap::new();
    for (signature, alias) in aliases {
        let mut seen = HashSet::new();
        seen.insert(signature.clone());
        let mut replacement = Vec::new();
        for pred in &alias.replacement {
            replacement.extend(expand_predicate(pred, aliases, &mut seen)?);
        }
        expanded.insert(signature.clone(), Alias::new(alias.pattern.clone(), replacement));
    }
    Ok(expanded)
}

fn expand_predicate(
    pred: &Predicate,
    aliases: &IndexMap<Signature, Alias>,
    seen: &mut HashSet<Signature>,
) -> CoreResult<Vec<Predicate>> {
    let signature = pred.signature();
    let Some(alias) = aliases.get(&signature) else {
        return Ok(vec![pred.clone()]);
    };
    if !seen.insert(signature.clone()) {
        return Err(CoreError::AliasCycle(signature.to_string()));
    }
    let mut result = Vec::new();
    for inner in alias.expand(pred) {
        result.extend(expand_predicate(&inner, aliases, seen)?);
    }
    seen.remove(&signature);
    Ok(result)
}

fn expand_once(predicates: &[Predicate], aliases: &IndexMap<Signature, Alias>) -> Vec<Predicate> {
    let mut result: Vec<Predicate> = Vec::new();
    for pred in predicates {
        match aliases.get(&pred.signature()) {
            Some(alias) => result.extend(alias.expand(pred)),
            None => result.push(pred.clone()),
        }
    }
    let mut seen = HashSet::new();
    result.retain(|p| seen.insert(p.clone()));
    result
}

// ---------------------------------------------------------------------------
// Reverse bindings
// ---------------------------------------------------------------------------

/// Relate the placeholders of `reverse` to those of `rule` so that reverse
/// command templates can be formatted from a mapping of `rule`.
fn reverse_binding(rule: &Rule, reverse: &Rule) -> ReverseBinding {
    let template = reverse.command_template().map(str::to_string);
    let placeholders = inverse_substitution(rule, reverse).or_else(|| same_names(rule, reverse));
    let (placeholders, command_template) = match placeholders {
        Some(map) => (map, template),
        None => (BTreeMap::new(), None),
    };
    ReverseBinding {
        name: Arc::from(reverse.name()),
        command_template,
        placeholders,
    }
}

/// Find a type-preserving injection from the placeholders of `reverse` to
/// those of `rule` under which `reverse` swaps the conditions of `rule`.
fn inverse_substitution(rule: &Rule, reverse: &Rule) -> Option<BTreeMap<String, Placeholder>> {
    let pre: HashSet<&Predicate> = rule.preconditions().iter().collect();
    let post: HashSet<&Predicate> = rule.postconditions().iter().collect();

    fn search(
        index: usize,
        reverse: &Rule,
        rule: &Rule,
        chosen: &mut BTreeMap<Placeholder, Placeholder>,
        check: &dyn Fn(&BTreeMap<Placeholder, Placeholder>) -> bool,
    ) -> bool {
        let Some(ph) = reverse.placeholders().get(index) else {
            return check(chosen);
        };
        for target in rule.placeholders() {
            if target.type_name() != ph.type_name() || chosen.values().any(|t| t == target) {
                continue;
            }
            chosen.insert(ph.clone(), target.clone());
            if search(index + 1, reverse, rule, chosen, check) {
                return true;
            }
            chosen.remove(ph);
        }
        false
    }

    let check = |sigma: &BTreeMap<Placeholder, Placeholder>| {
        let rev_pre: Vec<Predicate> = reverse.preconditions().iter().map(|p| p.substitute(sigma)).collect();
        let rev_post: Vec<Predicate> = reverse.postconditions().iter().map(|p| p.substitute(sigma)).collect();
        rev_pre.iter().collect::<HashSet<_>>() == post && rev_post.iter().collect::<HashSet<_>>() == pre
    };

    let mut chosen = BTreeMap::new();
    search(0, reverse, rule, &mut chosen, &check).then(|| {
        chosen
            .into_iter()
            .map(|(from, to)| (from.name().to_string(), to))
            .collect()
    })
}

fn same_names(rule: &Rule, reverse: &Rule) -> Option<BTreeMap<String, Placeholder>> {
    reverse
        .placeholders()
        .iter()
        .map(|ph| {
            rule.placeholders()
                .iter()
                .find(|target| target == &ph)
                .map(|target| (ph.name().to_string(), target.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ph(name: &str) -> Placeholder {
        Placeholder::new(name)
    }

    fn pred(name: &str, params: &[&str]) -> Predicate {
        Predicate::new(name, params.iter().map(|p| ph(p)))
    }

    fn base_builder() -> GameLogicBuilder {
        let mut builder = GameLogic::builder();
        for name in ["r", "c", "P", "I"] {
            builder.add_type(Type::new(name, Vec::<&str>::new())).unwrap();
        }
        builder
    }

    fn open_close(builder: &mut GameLogicBuilder) {
        let at_p = pred("at", &["P", "r"]);
        let at_c = pred("at", &["c", "r"]);
        builder
            .add_rule(
                Rule::new(
                    "open/c",
                    vec![at_p.clone(), at_c.clone(), pred("closed", &["c"])],
                    vec![at_p.clone(), at_c.clone(), pred("open", &["c"])],
                )
                .unwrap(),
            )
            .unwrap()
            .add_rule(
                Rule::new(
                    "close/c",
                    vec![at_p.clone(), at_c.clone(), pred("open", &["c"])],
                    vec![at_p, at_c, pred("closed", &["c"])],
                )
                .unwrap(),
            )
            .unwrap()
            .add_reverse_rule("open/c", "close/c")
            .unwrap();
        for (rule, command) in [("open/c", "open {c}"), ("close/c", "close {c}")] {
            builder
                .add_inform7_command(
                    rule,
                    Inform7Command {
                        command: command.into(),
                        event: String::new(),
                    },
                )
                .unwrap();
        }
    }

    fn chest_state(logic: &GameLogic) -> State {
        let kitchen = Variable::new("kitchen", "r");
        let chest = Variable::new("chest", "c");
        logic
            .new_state([
                Proposition::new("at", [Variable::constant("P"), kitchen.clone()]),
                Proposition::new("at", [chest.clone(), kitchen]),
                Proposition::new("closed", [chest]),
            ])
            .unwrap()
    }

    #[test]
    fn alias_cycle_is_detected() {
        let mut builder = base_builder();
        builder
            .add_alias(Alias::new(pred("a", &["r"]), vec![pred("b", &["r"])]))
            .unwrap()
            .add_alias(Alias::new(pred("b", &["r"]), vec![pred("a", &["r"])]))
            .unwrap();
        assert!(matches!(builder.build(), Err(CoreError::AliasCycle(_))));
    }

    #[test]
    fn aliases_expand_transitively() {
        let mut builder = base_builder();
        builder
            .add_alias(Alias::new(pred("near", &["r", "r'"]), vec![pred("link", &["r", "r'"]), pred("free", &["r", "r'"])]))
            .unwrap()
            .add_alias(Alias::new(pred("path", &["r", "r'"]), vec![pred("near", &["r", "r'"]), pred("near", &["r'", "r"])]))
            .unwrap()
            .add_rule(Rule::new("walk", vec![pred("path", &["r", "r'"])], vec![pred("seen", &["r'"])]).unwrap())
            .unwrap();
        let logic = builder.build().unwrap();
        let rule = logic.rule("walk").unwrap();
        let pre: Vec<String> = rule.preconditions().iter().map(ToString::to_string).collect();
        assert_eq!(pre, vec!["link(r, r')", "free(r, r')", "link(r', r)", "free(r', r)"]);
    }

    #[test]
    fn predicate_cannot_also_be_an_alias() {
        let mut builder = base_builder();
        builder.add_predicate(Signature::new("free", ["r", "r"])).unwrap();
        let alias = Alias::new(pred("free", &["r", "r'"]), vec![pred("link", &["r", "r'"])]);
        assert!(matches!(builder.add_alias(alias), Err(CoreError::Duplicate { kind: "alias", .. })));

        let mut builder = base_builder();
        builder
            .add_alias(Alias::new(pred("near", &["r", "r'"]), vec![pred("link", &["r", "r'"])]))
            .unwrap();
        assert!(builder.add_predicate(Signature::new("near", ["r", "r"])).is_err());
    }

    #[test]
    fn unknown_placeholder_type_is_rejected() {
        let mut builder = base_builder();
        builder
            .add_rule(Rule::new("take", vec![pred("at", &["o", "r"])], vec![pred("in", &["o", "I"])]).unwrap())
            .unwrap();
        assert!(matches!(builder.build(), Err(CoreError::UnknownType(t)) if t == "o"));
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let mut builder = base_builder();
        open_close(&mut builder);
        let again = Rule::new("open/c", vec![], vec![]).unwrap();
        assert!(matches!(builder.add_rule(again), Err(CoreError::Duplicate { kind: "rule", .. })));
    }

    #[test]
    fn reverse_rules_must_exist() {
        let mut builder = base_builder();
        builder.add_reverse_rule("open/c", "close/c").unwrap();
        assert!(matches!(builder.build(), Err(CoreError::UnknownRule(_))));
    }

    #[test]
    fn inverse_rule_is_involutive() {
        let mut builder = base_builder();
        open_close(&mut builder);
        let logic = builder.build().unwrap();
        let open = logic.rule("open/c").unwrap();
        let close = logic.inverse_rule(open).unwrap();
        assert_eq!(close.name(), "close/c");
        assert!(Arc::ptr_eq(logic.inverse_rule(close).unwrap(), open));
    }

    #[test]
    fn actions_carry_templates_and_reverse_metadata() {
        let mut builder = base_builder();
        open_close(&mut builder);
        let logic = builder.build().unwrap();
        let state = chest_state(&logic);
        let actions = logic.all_applicable_actions(&state).unwrap();
        assert_eq!(actions.len(), 1);
        let open = &actions[0];
        assert_eq!(open.command_template(), Some("open {chest}"));
        assert_eq!(open.reverse_name(), Some("close/c"));
        assert_eq!(open.reverse_command_template(), Some("close {chest}"));
    }

    #[test]
    fn reverse_action_restores_the_state() {
        let mut builder = base_builder();
        open_close(&mut builder);
        let logic = builder.build().unwrap();
        let mut state = chest_state(&logic);
        let before = state.clone();
        let open = logic.all_applicable_actions(&state).unwrap().remove(0);
        let close = logic.reverse_action(&open).unwrap();
        assert_eq!(close.name(), "close/c");
        assert_eq!(close.command_template(), Some("close {chest}"));

        assert!(state.apply(&open).unwrap());
        assert!(state.apply(&close).unwrap());
        assert_eq!(state, before);
    }

    #[test]
    fn irreversible_actions_have_no_reverse() {
        let mut builder = base_builder();
        builder
            .add_rule(Rule::new("smash", vec![pred("closed", &["c"])], vec![pred("broken", &["c"])]).unwrap())
            .unwrap();
        let logic = builder.build().unwrap();
        let state = logic
            .new_state([Proposition::new("closed", [Variable::new("chest", "c")])])
            .unwrap();
        let smash = logic.all_applicable_actions(&state).unwrap().remove(0);
        assert_eq!(logic.reverse_action(&smash), None);
    }

    #[test]
    fn constraints_report_violations() {
        let mut builder = base_builder();
        builder
            .add_constraint(
                Rule::new(
                    "c1",
                    vec![pred("open", &["c"]), pred("closed", &["c"])],
                    vec![Predicate::new(FAIL_PREDICATE, [])],
                )
                .unwrap(),
            )
            .unwrap();
        let logic = builder.build().unwrap();
        let chest = Variable::new("chest", "c");
        let mut state = logic.new_state([Proposition::new("closed", [chest.clone()])]).unwrap();
        assert!(!logic.is_violated(&state));
        state.add_fact(Proposition::new("open", [chest])).unwrap();
        assert_eq!(logic.constraint_violations(&state), vec!["c1"]);
    }

    #[test]
    fn constants_mapping_binds_singletons() {
        let logic = base_builder().build().unwrap();
        let mapping = logic.constants_mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get(&ph("P")), Some(&Variable::constant("P")));
        assert_eq!(mapping.get(&ph("I")), Some(&Variable::constant("I")));
    }

    #[test]
    fn new_state_interns_facts() {
        let logic = base_builder().build().unwrap();
        let fact = Proposition::new("open", [Variable::new("chest", "c")]);
        let a = logic.new_state([fact.clone()]).unwrap();
        let b = logic.new_state([fact]).unwrap();
        let first = a.facts().next().unwrap();
        assert!(first.ptr_eq(b.facts().next().unwrap()));
    }
}
