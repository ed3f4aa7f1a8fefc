use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{CoreError, CoreResult};
use crate::fact::{Mapping, Predicate, Proposition};
use crate::intern::Interner;
use crate::term::{Placeholder, Variable};

/// Replace every `{name}` segment of `template` for which `lookup` returns a
/// value by `{value}`. Other segments are kept verbatim.
pub fn format_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => {
                        result.push('{');
                        result.push_str(value);
                        result.push('}');
                    }
                    None => result.push_str(&rest[open..open + close + 2]),
                }
                rest = &after[close + 1..];
            }
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Reverse-rule metadata attached to a rule by its game logic.
#[derive(Debug, Clone)]
pub(crate) struct ReverseBinding {
    pub(crate) name: Arc<str>,
    pub(crate) command_template: Option<String>,
    /// Placeholder names of the reverse rule, mapped to this rule's placeholders.
    pub(crate) placeholders: BTreeMap<String, Placeholder>,
}

/// A templated transition such as
/// `open/c :: $at(P, r) & $at(c, r) & closed(c) -> open(c)`.
pub struct Rule {
    name: Arc<str>,
    preconditions: Vec<Predicate>,
    postconditions: Vec<Predicate>,
    placeholders: Vec<Placeholder>,
    command_template: Option<String>,
    reverse: Option<ReverseBinding>,
    interner: Arc<Interner>,
    cache: RwLock<HashMap<Vec<Variable>, Action>>,
}

impl Rule {
    /// Create a rule. Placeholders sharing a name must share a type.
    pub fn new(
        name: impl Into<Arc<str>>,
        preconditions: Vec<Predicate>,
        postconditions: Vec<Predicate>,
    ) -> CoreResult<Rule> {
        let mut placeholders: Vec<Placeholder> = Vec::new();
        let mut types: HashMap<&str, &str> = HashMap::new();
        for ph in preconditions.iter().chain(&postconditions).flat_map(Predicate::parameters) {
            match types.get(ph.name()) {
                Some(existing) if *existing != ph.type_name() => {
                    return Err(CoreError::TypeConflict {
                        name: ph.name().to_string(),
                        existing: existing.to_string(),
                        conflicting: ph.type_name().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    types.insert(ph.name(), ph.type_name());
                    placeholders.push(ph.clone());
                }
            }
        }

        Ok(Rule {
            name: name.into(),
            preconditions,
            postconditions,
            placeholders,
            command_template: None,
            reverse: None,
            interner: Arc::default(),
            cache: RwLock::default(),
        })
    }

    /// Share the interner of a game logic.
    pub fn with_interner(mut self, interner: Arc<Interner>) -> Self {
        self.interner = interner;
        self.clear_cache();
        self
    }

    /// Attach the command template, written with placeholder names in braces.
    pub fn with_command_template(mut self, template: Option<String>) -> Self {
        self.command_template = template;
        self.clear_cache();
        self
    }

    pub(crate) fn set_reverse(&mut self, reverse: Option<ReverseBinding>) {
        self.reverse = reverse;
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Templated preconditions.
    pub fn preconditions(&self) -> &[Predicate] {
        &self.preconditions
    }

    /// Templated postconditions.
    pub fn postconditions(&self) -> &[Predicate] {
        &self.postconditions
    }

    /// The distinct placeholders, in order of first appearance.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// The command template, if any.
    pub fn command_template(&self) -> Option<&str> {
        self.command_template.as_deref()
    }

    /// Name of the registered reverse rule, if any.
    pub fn reverse_name(&self) -> Option<&str> {
        self.reverse.as_ref().map(|r| &*r.name)
    }

    /// The interner used for instantiated facts.
    pub fn interner(&self) -> &Arc<Interner> {
        &self.interner
    }

    /// Every predicate, preconditions first.
    pub fn all_predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.preconditions.iter().chain(&self.postconditions)
    }

    /// The same rule with preconditions and postconditions swapped and no
    /// metadata. Used to run the rule backwards.
    pub fn reversed(&self) -> Rule {
        Rule {
            name: self.name.clone(),
            preconditions: self.postconditions.clone(),
            postconditions: self.preconditions.clone(),
            placeholders: self.placeholders.clone(),
            command_template: None,
            reverse: None,
            interner: self.interner.clone(),
            cache: RwLock::default(),
        }
    }

    /// Rename placeholders, optionally giving the result a new name.
    pub fn substitute(&self, mapping: &BTreeMap<Placeholder, Placeholder>, name: Option<&str>) -> CoreResult<Rule> {
        let pre = self.preconditions.iter().map(|p| p.substitute(mapping)).collect();
        let post = self.postconditions.iter().map(|p| p.substitute(mapping)).collect();
        let name: Arc<str> = name.map_or_else(|| self.name.clone(), Arc::from);
        Ok(Rule::new(name, pre, post)?
            .with_interner(self.interner.clone())
            .with_command_template(self.command_template.clone()))
    }

    /// Bind every placeholder, producing an action.
    ///
    /// Instantiations are memoized per tuple of variables.
    pub fn instantiate(&self, mapping: &Mapping) -> CoreResult<Action> {
        let key = self
            .placeholders
            .iter()
            .map(|ph| {
                mapping.get(ph).cloned().ok_or_else(|| CoreError::UnboundPlaceholder {
                    rule: self.name.to_string(),
                    placeholder: ph.name().to_string(),
                })
            })
            .collect::<CoreResult<Vec<Variable>>>()?;

        if let Some(action) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(action.clone());
        }

        let action = self.build(mapping)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(key).or_insert(action).clone())
    }

    fn build(&self, mapping: &Mapping) -> CoreResult<Action> {
        let pre = self
            .preconditions
            .iter()
            .map(|p| p.instantiate_in(mapping, &self.interner))
            .collect::<CoreResult<Vec<_>>>()?;
        let post = self
            .postconditions
            .iter()
            .map(|p| p.instantiate_in(mapping, &self.interner))
            .collect::<CoreResult<Vec<_>>>()?;

        let by_name = |name: &str| {
            self.placeholders
                .iter()
                .find(|ph| ph.name() == name)
                .and_then(|ph| mapping.get(ph))
                .map(Variable::name)
        };
        let command = self
            .command_template
            .as_deref()
            .map(|template| format_template(template, by_name));

        let (reverse_name, reverse_command) = match &self.reverse {
            Some(reverse) => {
                let lookup = |name: &str| reverse.placeholders.get(name).and_then(|ph| mapping.get(ph)).map(Variable::name);
                let template = reverse
                    .command_template
                    .as_deref()
                    .map(|template| format_template(template, lookup));
                (Some(reverse.name.clone()), template)
            }
            None => (None, None),
        };

        Ok(Action::new(self.name.clone(), pre, post)
            .with_command_template(command)
            .with_reverse(reverse_name, reverse_command))
    }

    /// Find the mapping whose instantiation equals `action`.
    ///
    /// Actions produced by this rule list their facts in the same order as
    /// the rule, which is tried first; otherwise every injective assignment
    /// of the action's variables to the placeholders is tried. Two
    /// placeholders never share a variable.
    pub fn match_action(&self, action: &Action) -> Option<Mapping> {
        if self.name() != action.name() {
            return None;
        }

        if let Some(mapping) = self.positional_match(action)
            && self.matches(&mapping, action)
        {
            return Some(mapping);
        }

        let variables = action.variables();
        let mut mapping = Mapping::new();
        self.search_match(0, &variables, &mut mapping, action)
    }

    fn positional_match(&self, action: &Action) -> Option<Mapping> {
        if self.preconditions.len() != action.preconditions().len()
            || self.postconditions.len() != action.postconditions().len()
        {
            return None;
        }
        let pairs = self
            .preconditions
            .iter()
            .zip(action.preconditions())
            .chain(self.postconditions.iter().zip(action.postconditions()));

        let mut mapping = Mapping::new();
        for (pred, prop) in pairs {
            for (ph, var) in pred.match_proposition(prop)? {
                match mapping.get(&ph) {
                    Some(existing) if existing != &var => return None,
                    Some(_) => {}
                    None => {
                        mapping.insert(ph, var);
                    }
                }
            }
        }
        let distinct: HashSet<&Variable> = mapping.values().collect();
        (distinct.len() == mapping.len()).then_some(mapping)
    }

    fn search_match(&self, index: usize, variables: &[Variable], mapping: &mut Mapping, action: &Action) -> Option<Mapping> {
        let Some(ph) = self.placeholders.get(index) else {
            return self.matches(mapping, action).then(|| mapping.clone());
        };
        mapping.remove(ph);
        for var in variables {
            if mapping.values().any(|bound| bound == var) {
                continue;
            }
            mapping.insert(ph.clone(), var.clone());
            if let Some(found) = self.search_match(index + 1, variables, mapping, action) {
                return Some(found);
            }
        }
        mapping.remove(ph);
        None
    }

    fn matches(&self, mapping: &Mapping, action: &Action) -> bool {
        let instantiate = |preds: &[Predicate]| -> Option<HashSet<Proposition>> {
            preds.iter().map(|p| p.instantiate(mapping).ok()).collect()
        };
        let (Some(pre), Some(post)) = (instantiate(&self.preconditions), instantiate(&self.postconditions)) else {
            return false;
        };
        pre.len() == action.preconditions().len()
            && post.len() == action.postconditions().len()
            && pre.iter().all(|p| action.requires(p))
            && post.iter().all(|p| action.postconditions().contains(p))
    }

    /// Serialize to a plain data tree.
    pub fn to_data(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a rule from a data tree, sharing `interner`.
    pub fn from_data(data: serde_json::Value, interner: Arc<Interner>) -> CoreResult<Rule> {
        let repr: RuleRepr = serde_json::from_value(data)?;
        Ok(Rule::new(repr.name, repr.preconditions, repr.postconditions)?
            .with_interner(interner)
            .with_command_template(repr.command_template))
    }
}

impl Clone for Rule {
    fn clone(&self) -> Self {
        Rule {
            name: self.name.clone(),
            preconditions: self.preconditions.clone(),
            postconditions: self.postconditions.clone(),
            placeholders: self.placeholders.clone(),
            command_template: self.command_template.clone(),
            reverse: self.reverse.clone(),
            interner: self.interner.clone(),
            cache: RwLock::default(),
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.preconditions == other.preconditions
            && self.postconditions == other.postconditions
    }
}

impl Eq for Rule {}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({self})")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pre: Vec<String> = self
            .preconditions
            .iter()
            .map(|p| {
                if self.postconditions.contains(p) {
                    format!("${p}")
                } else {
                    p.to_string()
                }
            })
            .collect();
        let post: Vec<String> = self
            .postconditions
            .iter()
            .filter(|p| !self.preconditions.contains(p))
            .map(ToString::to_string)
            .collect();
        write!(f, "{} :: {} -> {}", self.name, pre.join(" & "), post.join(" & "))
    }
}

#[derive(Serialize, Deserialize)]
struct RuleRepr {
    name: Arc<str>,
    preconditions: Vec<Predicate>,
    postconditions: Vec<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_template: Option<String>,
}

impl Serialize for Rule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RuleRepr {
            name: self.name.clone(),
            preconditions: self.preconditions.clone(),
            postconditions: self.postconditions.clone(),
            command_template: self.command_template.clone(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(name: &str, params: &[&str]) -> Predicate {
        Predicate::new(name, params.iter().map(|p| Placeholder::new(*p)))
    }

    fn open_rule() -> Rule {
        let at_p = pred("at", &["P", "r"]);
        let at_c = pred("at", &["c", "r"]);
        Rule::new(
            "open/c",
            vec![at_p.clone(), at_c.clone(), pred("closed", &["c"])],
            vec![at_p, at_c, pred("open", &["c"])],
        )
        .unwrap()
        .with_command_template(Some("open {c}".into()))
    }

    fn mapping() -> Mapping {
        let mut mapping = Mapping::new();
        mapping.insert(Placeholder::new("P"), Variable::constant("P"));
        mapping.insert(Placeholder::new("r"), Variable::new("kitchen", "r"));
        mapping.insert(Placeholder::new("c"), Variable::new("chest", "c"));
        mapping
    }

    #[test]
    fn placeholder_type_conflict_is_rejected() {
        let err = Rule::new(
            "take",
            vec![Predicate::new("in", [Placeholder::with_type("o", "k"), Placeholder::new("c")])],
            vec![Predicate::new("in", [Placeholder::new("o"), Placeholder::new("I")])],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TypeConflict { name, .. } if name == "o"));
    }

    #[test]
    fn placeholders_in_order_of_appearance() {
        let rule = open_rule();
        let names: Vec<&str> = rule.placeholders().iter().map(Placeholder::name).collect();
        assert_eq!(names, vec!["P", "r", "c"]);
    }

    #[test]
    fn instantiate_formats_command_template() {
        let action = open_rule().instantiate(&mapping()).unwrap();
        assert_eq!(action.command_template(), Some("open {chest}"));
        assert_eq!(action.added().len(), 1);
        assert_eq!(action.added()[0].to_string(), "open(chest)");
    }

    #[test]
    fn instantiate_is_memoized() {
        let rule = open_rule();
        let a = rule.instantiate(&mapping()).unwrap();
        let b = rule.instantiate(&mapping()).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn instantiate_reports_unbound_placeholders() {
        let mut partial = mapping();
        partial.remove(&Placeholder::new("c"));
        assert!(matches!(
            open_rule().instantiate(&partial),
            Err(CoreError::UnboundPlaceholder { .. })
        ));
    }

    #[test]
    fn match_recovers_the_mapping() {
        let rule = open_rule();
        let action = rule.instantiate(&mapping()).unwrap();
        assert_eq!(rule.match_action(&action), Some(mapping()));
    }

    #[test]
    fn match_accepts_reordered_facts() {
        let rule = open_rule();
        let action = rule.instantiate(&mapping()).unwrap();
        let mut pre = action.preconditions().to_vec();
        pre.reverse();
        let reordered = Action::new("open/c", pre, action.postconditions().to_vec());
        assert_eq!(rule.match_action(&reordered), Some(mapping()));
    }

    #[test]
    fn match_rejects_other_rules() {
        let rule = open_rule();
        let action = rule.instantiate(&mapping()).unwrap();
        let renamed = Action::new("close/c", action.preconditions().to_vec(), action.postconditions().to_vec());
        assert_eq!(rule.match_action(&renamed), None);
    }

    #[test]
    fn match_never_binds_two_placeholders_to_one_variable() {
        let rule = Rule::new("pair", vec![pred("free", &["r", "r'"])], vec![pred("seen", &["r", "r'"])]).unwrap();
        let a = Variable::new("a", "r");
        let b = Variable::new("b", "r");

        let same = Action::new(
            "pair",
            vec![Proposition::new("free", [a.clone(), a.clone()])],
            vec![Proposition::new("seen", [a.clone(), a.clone()])],
        );
        assert_eq!(rule.match_action(&same), None);

        let distinct = Action::new(
            "pair",
            vec![Proposition::new("free", [a.clone(), b.clone()])],
            vec![Proposition::new("seen", [a.clone(), b.clone()])],
        );
        let mapping = rule.match_action(&distinct).unwrap();
        assert_eq!(mapping.get(&Placeholder::new("r")), Some(&a));
        assert_eq!(mapping.get(&Placeholder::new("r'")), Some(&b));
    }

    #[test]
    fn reversed_swaps_conditions() {
        let rule = open_rule();
        let reversed = rule.reversed();
        assert_eq!(reversed.name(), "open/c");
        assert_eq!(reversed.preconditions(), rule.postconditions());
        let action = reversed.instantiate(&mapping()).unwrap();
        assert_eq!(action, rule.instantiate(&mapping()).unwrap().swapped());
    }

    #[test]
    fn display_marks_persistent_predicates() {
        assert_eq!(
            open_rule().to_string(),
            "open/c :: $at(P, r) & $at(c, r) & closed(c) -> open(c)"
        );
    }

    #[test]
    fn template_keeps_unknown_segments() {
        let formatted = format_template("put {o} on {s} {x", |key| (key == "o").then_some("apple"));
        assert_eq!(formatted, "put {apple} on {s} {x");
    }

    #[test]
    fn data_tree_keeps_the_template() {
        let rule = open_rule();
        let data = rule.to_data().unwrap();
        let back = Rule::from_data(data, Arc::default()).unwrap();
        assert_eq!(back, rule);
        assert_eq!(back.command_template(), Some("open {c}"));
    }
}
