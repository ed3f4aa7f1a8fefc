use std::collections::HashSet;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::fact::Proposition;
use crate::intern::Interner;
use crate::term::Variable;

#[derive(Debug, Clone)]
struct ActionData {
    name: Arc<str>,
    preconditions: Vec<Proposition>,
    postconditions: Vec<Proposition>,
    pre_set: HashSet<Proposition>,
    post_set: HashSet<Proposition>,
    added: Vec<Proposition>,
    removed: Vec<Proposition>,
    hash: u64,
    command_template: Option<String>,
    reverse_name: Option<Arc<str>>,
    reverse_command_template: Option<String>,
}

/// A ground transition: a rule whose placeholders are all bound.
///
/// Facts in both the preconditions and the postconditions are persistent;
/// [`added`](Self::added) and [`removed`](Self::removed) hold the actual
/// effect. Equality and hashing ignore the command templates and reverse
/// metadata.
#[derive(Clone)]
pub struct Action(Arc<ActionData>);

fn dedup(props: impl IntoIterator<Item = Proposition>) -> Vec<Proposition> {
    let mut seen = HashSet::new();
    props.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

impl Action {
    /// Create an action without command templates or reverse metadata.
    pub fn new(
        name: impl Into<Arc<str>>,
        preconditions: impl IntoIterator<Item = Proposition>,
        postconditions: impl IntoIterator<Item = Proposition>,
    ) -> Self {
        let name = name.into();
        let preconditions = dedup(preconditions);
        let postconditions = dedup(postconditions);
        let pre_set: HashSet<Proposition> = preconditions.iter().cloned().collect();
        let post_set: HashSet<Proposition> = postconditions.iter().cloned().collect();
        let added = postconditions.iter().filter(|p| !pre_set.contains(*p)).cloned().collect();
        let removed = preconditions.iter().filter(|p| !post_set.contains(*p)).cloned().collect();

        let mut sorted_pre = preconditions.clone();
        sorted_pre.sort();
        let mut sorted_post = postconditions.clone();
        sorted_post.sort();
        let mut hasher = DefaultHasher::new();
        (&name, sorted_pre, sorted_post).hash(&mut hasher);

        Self(Arc::new(ActionData {
            name,
            preconditions,
            postconditions,
            pre_set,
            post_set,
            added,
            removed,
            hash: hasher.finish(),
            command_template: None,
            reverse_name: None,
            reverse_command_template: None,
        }))
    }

    /// Attach the command template shown to the text layer.
    pub fn with_command_template(mut self, template: Option<String>) -> Self {
        Arc::make_mut(&mut self.0).command_template = template;
        self
    }

    /// Attach the name and command template of the reverse action.
    pub fn with_reverse(mut self, name: Option<Arc<str>>, template: Option<String>) -> Self {
        let data = Arc::make_mut(&mut self.0);
        data.reverse_name = name;
        data.reverse_command_template = template;
        self
    }

    /// The name of the rule this action instantiates.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Facts required before the action.
    pub fn preconditions(&self) -> &[Proposition] {
        &self.0.preconditions
    }

    /// Facts true after the action (persistent facts included).
    pub fn postconditions(&self) -> &[Proposition] {
        &self.0.postconditions
    }

    /// Facts introduced by the action: postconditions that are not preconditions.
    pub fn added(&self) -> &[Proposition] {
        &self.0.added
    }

    /// Facts deleted by the action: preconditions that are not postconditions.
    pub fn removed(&self) -> &[Proposition] {
        &self.0.removed
    }

    /// Facts required and kept by the action.
    pub fn persistent(&self) -> impl Iterator<Item = &Proposition> {
        self.0
            .preconditions
            .iter()
            .filter(|p| self.0.post_set.contains(*p))
    }

    /// Whether `fact` is one of the preconditions.
    pub fn requires(&self, fact: &Proposition) -> bool {
        self.0.pre_set.contains(fact)
    }

    /// Whether `fact` is added by the action.
    pub fn adds(&self, fact: &Proposition) -> bool {
        self.0.post_set.contains(fact) && !self.0.pre_set.contains(fact)
    }

    /// Whether `fact` is deleted by the action.
    pub fn removes(&self, fact: &Proposition) -> bool {
        self.0.pre_set.contains(fact) && !self.0.post_set.contains(fact)
    }

    /// Every fact mentioned, preconditions first.
    pub fn all_propositions(&self) -> impl Iterator<Item = &Proposition> {
        self.0
            .preconditions
            .iter()
            .chain(self.0.postconditions.iter().filter(|p| !self.0.pre_set.contains(*p)))
    }

    /// The distinct variables mentioned, in order of first appearance.
    pub fn variables(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        self.all_propositions()
            .flat_map(|p| p.arguments().iter())
            .filter(|v| seen.insert((*v).clone()))
            .cloned()
            .collect()
    }

    /// Command template with placeholders replaced by variable names, such
    /// as `"open {chest}"`.
    pub fn command_template(&self) -> Option<&str> {
        self.0.command_template.as_deref()
    }

    /// Name of the registered reverse action, if the action is reversible.
    pub fn reverse_name(&self) -> Option<&str> {
        self.0.reverse_name.as_deref()
    }

    /// Command template of the reverse action.
    pub fn reverse_command_template(&self) -> Option<&str> {
        self.0.reverse_command_template.as_deref()
    }

    /// The action undoing this one: preconditions and postconditions are
    /// swapped and the reverse metadata becomes the primary metadata.
    ///
    /// Without a registered reverse the name is kept.
    pub fn inverse(&self) -> Action {
        let name = self.0.reverse_name.clone().unwrap_or_else(|| self.0.name.clone());
        let reverse_name = self.0.reverse_name.as_ref().map(|_| self.0.name.clone());
        Action::new(name, self.0.postconditions.clone(), self.0.preconditions.clone())
            .with_command_template(self.0.reverse_command_template.clone())
            .with_reverse(reverse_name, self.0.command_template.clone())
    }

    /// Same name and metadata, with preconditions and postconditions swapped.
    pub fn swapped(&self) -> Action {
        Action::new(
            self.0.name.clone(),
            self.0.postconditions.clone(),
            self.0.preconditions.clone(),
        )
        .with_command_template(self.0.command_template.clone())
        .with_reverse(self.0.reverse_name.clone(), self.0.reverse_command_template.clone())
    }

    /// Whether both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Serialize to a plain data tree.
    pub fn to_data(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild an action from a data tree, interning its facts.
    pub fn from_data(data: serde_json::Value, interner: &Interner) -> CoreResult<Action> {
        let repr: ActionRepr = serde_json::from_value(data)?;
        Ok(repr.into_action(interner))
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.name == other.0.name
                && self.0.pre_set == other.0.pre_set
                && self.0.post_set == other.0.post_set)
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({self})")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pre: Vec<String> = self
            .0
            .preconditions
            .iter()
            .map(|p| {
                if self.0.post_set.contains(p) {
                    format!("${p}")
                } else {
                    p.to_string()
                }
            })
            .collect();
        let post: Vec<String> = self.0.added.iter().map(ToString::to_string).collect();
        write!(f, "{} :: {} -> {}", self.0.name, pre.join(" & "), post.join(" & "))
    }
}

#[derive(Serialize, Deserialize)]
struct ActionRepr {
    name: Arc<str>,
    preconditions: Vec<Proposition>,
    postconditions: Vec<Proposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reverse_name: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reverse_command_template: Option<String>,
}

impl ActionRepr {
    fn into_action(self, interner: &Interner) -> Action {
        let intern = |props: Vec<Proposition>| {
            props
                .into_iter()
                .map(|p| interner.intern_proposition(p))
                .collect::<Vec<_>>()
        };
        Action::new(self.name, intern(self.preconditions), intern(self.postconditions))
            .with_command_template(self.command_template)
            .with_reverse(self.reverse_name, self.reverse_command_template)
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ActionRepr {
            name: self.0.name.clone(),
            preconditions: self.0.preconditions.clone(),
            postconditions: self.0.postconditions.clone(),
            command_template: self.0.command_template.clone(),
            reverse_name: self.0.reverse_name.clone(),
            reverse_command_template: self.0.reverse_command_template.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ActionRepr::deserialize(deserializer)?;
        Ok(Action::new(repr.name, repr.preconditions, repr.postconditions)
            .with_command_template(repr.command_template)
            .with_reverse(repr.reverse_name, repr.reverse_command_template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
        Proposition::new(name, args.iter().map(|(n, t)| Variable::new(*n, *t)))
    }

    fn open_chest() -> Action {
        let at_p = fact("at", &[("P", "P"), ("kitchen", "r")]);
        let at_c = fact("at", &[("chest", "c"), ("kitchen", "r")]);
        let closed = fact("closed", &[("chest", "c")]);
        let open = fact("open", &[("chest", "c")]);
        Action::new("open/c", [at_p.clone(), at_c.clone(), closed], [at_p, at_c, open])
            .with_command_template(Some("open {chest}".into()))
            .with_reverse(Some("close/c".into()), Some("close {chest}".into()))
    }

    #[test]
    fn added_and_removed_sets() {
        let action = open_chest();
        assert_eq!(action.added(), &[fact("open", &[("chest", "c")])]);
        assert_eq!(action.removed(), &[fact("closed", &[("chest", "c")])]);
        assert_eq!(action.persistent().count(), 2);
        assert!(action.requires(&fact("closed", &[("chest", "c")])));
        assert!(action.adds(&fact("open", &[("chest", "c")])));
    }

    #[test]
    fn display_marks_persistent_facts() {
        assert_eq!(
            open_chest().to_string(),
            "open/c :: $at(P, kitchen) & $at(chest, kitchen) & closed(chest) -> open(chest)"
        );
    }

    #[test]
    fn inverse_uses_reverse_metadata() {
        let action = open_chest();
        let inverse = action.inverse();
        assert_eq!(inverse.name(), "close/c");
        assert_eq!(inverse.command_template(), Some("close {chest}"));
        assert_eq!(inverse.reverse_name(), Some("open/c"));
        assert_eq!(inverse.added(), action.removed());
        assert_eq!(inverse.inverse(), action);
    }

    #[test]
    fn swapped_keeps_the_name() {
        let action = open_chest();
        let swapped = action.swapped();
        assert_eq!(swapped.name(), "open/c");
        assert_eq!(swapped.removed(), action.added());
        assert_eq!(swapped.swapped(), action);
    }

    #[test]
    fn equality_ignores_order_and_metadata() {
        let action = open_chest();
        let mut pre = action.preconditions().to_vec();
        pre.reverse();
        let other = Action::new("open/c", pre, action.postconditions().to_vec());
        assert_eq!(other, action);
        assert_eq!(other.command_template(), None);
    }

    #[test]
    fn variables_in_order_of_appearance() {
        let names: Vec<String> = open_chest().variables().iter().map(|v| v.name().to_string()).collect();
        assert_eq!(names, vec!["P", "kitchen", "chest"]);
    }

    #[test]
    fn data_tree_interns_facts() {
        let interner = Interner::new();
        let action = open_chest();
        let data = action.to_data().unwrap();
        let back = Action::from_data(data.clone(), &interner).unwrap();
        assert_eq!(back, action);
        assert_eq!(back.reverse_name(), Some("close/c"));
        let again = Action::from_data(data, &interner).unwrap();
        assert!(back.preconditions()[0].ptr_eq(&again.preconditions()[0]));
    }
}
