use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Returns whether a type name denotes a constant type.
///
/// Constant types (names starting with an uppercase letter, such as the
/// player `P` or the inventory `I`) have exactly one variable whose name is
/// the type name itself.
pub fn is_constant_type(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// A named node of the type DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    /// Name of the type.
    pub name: Arc<str>,
    /// Names of the direct supertypes.
    pub parents: Vec<Arc<str>>,
}

impl Type {
    /// Create a type with the given direct supertypes.
    pub fn new<S: Into<Arc<str>>>(name: impl Into<Arc<str>>, parents: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is a constant type.
    pub fn is_constant(&self) -> bool {
        is_constant_type(&self.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parents.is_empty() {
            write!(f, "type {}", self.name)
        } else {
            write!(f, "type {} : {}", self.name, self.parents.join(", "))
        }
    }
}

type TypeTuple = Vec<Arc<str>>;

/// The DAG of types of a game logic.
///
/// Types are added one at a time; the parents of a type must already be
/// present. Children lists are kept sorted by name so that every closure is
/// independent of the order in which types were added.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    types: IndexMap<Arc<str>, Type>,
    children: HashMap<Arc<str>, Vec<Arc<str>>>,
    subtypes_cache: Mutex<HashMap<TypeTuple, Arc<[TypeTuple]>>>,
}

impl Clone for TypeHierarchy {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            children: self.children.clone(),
            subtypes_cache: Mutex::default(),
        }
    }
}

impl PartialEq for TypeHierarchy {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl TypeHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type. Its parents must already be part of the hierarchy.
    pub fn add(&mut self, ty: Type) -> CoreResult<()> {
        if self.types.contains_key(&ty.name) {
            return Err(CoreError::Duplicate {
                kind: "type",
                name: ty.name.to_string(),
            });
        }
        for parent in &ty.parents {
            if !self.types.contains_key(parent) {
                return Err(CoreError::UnknownType(parent.to_string()));
            }
        }

        for parent in &ty.parents {
            let siblings = self.children.entry(parent.clone()).or_default();
            let pos = siblings.partition_point(|s| s < &ty.name);
            siblings.insert(pos, ty.name.clone());
        }
        self.types.insert(ty.name.clone(), ty);
        self.subtypes_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> CoreResult<&Type> {
        self.types
            .get(name)
            .ok_or_else(|| CoreError::UnknownType(name.to_string()))
    }

    /// Whether a type with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the hierarchy has no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    /// Names of the constant types, in insertion order.
    pub fn constants(&self) -> impl Iterator<Item = &Arc<str>> {
        self.types.keys().filter(|name| is_constant_type(name))
    }

    /// Direct supertypes of a type. Unknown types have none.
    pub fn parents_of(&self, name: &str) -> &[Arc<str>] {
        match self.types.get(name) {
            Some(ty) => &ty.parents,
            None => &[],
        }
    }

    /// Direct subtypes of a type, sorted by name. Unknown types have none.
    pub fn children_of(&self, name: &str) -> &[Arc<str>] {
        match self.children.get(name) {
            Some(children) => children,
            None => &[],
        }
    }

    /// Breadth-first traversal from `start`, yielding every type reachable
    /// through `expand` exactly once. `start` itself is not yielded.
    pub fn closure<'a>(&'a self, start: &str, expand: impl Fn(&str) -> &'a [Arc<str>]) -> Vec<Arc<str>> {
        let mut seen: HashSet<Arc<str>> = HashSet::new();
        let mut queue: VecDeque<Arc<str>> = VecDeque::new();
        let mut result = Vec::new();

        seen.insert(Arc::from(start));
        for next in expand(start) {
            if seen.insert(next.clone()) {
                queue.push_back(next.clone());
            }
        }
        while let Some(current) = queue.pop_front() {
            for next in expand(&*current) {
                if seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
            result.push(current);
        }
        result
    }

    /// Every strict supertype of a type, nearest first.
    pub fn ancestors(&self, name: &str) -> Vec<Arc<str>> {
        self.closure(name, |t| self.parents_of(t))
    }

    /// Every strict subtype of a type, nearest first.
    pub fn descendants(&self, name: &str) -> Vec<Arc<str>> {
        self.closure(name, |t| self.children_of(t))
    }

    /// The type itself followed by its ancestors.
    pub fn supertypes(&self, name: &str) -> Vec<Arc<str>> {
        let mut result = vec![Arc::from(name)];
        result.extend(self.ancestors(name));
        result
    }

    /// The type itself followed by its descendants.
    pub fn subtypes(&self, name: &str) -> Vec<Arc<str>> {
        let mut result = vec![Arc::from(name)];
        result.extend(self.descendants(name));
        result
    }

    /// Whether `name` is `other` or one of its descendants.
    pub fn is_subtype_of(&self, name: &str, other: &str) -> bool {
        name == other || self.ancestors(name).iter().any(|t| &**t == other)
    }

    /// Every tuple obtained by replacing each element of `types` by one of
    /// its subtypes (itself included).
    ///
    /// The enumeration is breadth-first over the product lattice, starting
    /// from `types` and specializing one position at a time, so the result
    /// only depends on the shape of the DAG. Results are cached per input.
    pub fn multi_subtypes(&self, types: &[Arc<str>]) -> Arc<[TypeTuple]> {
        let key: TypeTuple = types.to_vec();
        let mut cache = self
            .subtypes_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let mut seen: HashSet<TypeTuple> = HashSet::new();
        let mut queue: VecDeque<TypeTuple> = VecDeque::new();
        let mut result = Vec::new();
        seen.insert(key.clone());
        queue.push_back(key.clone());
        while let Some(tuple) = queue.pop_front() {
            for (i, ty) in tuple.iter().enumerate() {
                for child in self.children_of(ty) {
                    let mut next = tuple.clone();
                    next[i] = child.clone();
                    if seen.insert(next.clone()) {
                        queue.push_back(next);
                    }
                }
            }
            result.push(tuple);
        }

        let result: Arc<[TypeTuple]> = result.into();
        cache.insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[Arc<str>]) -> Vec<&str> {
        list.iter().map(|n| &**n).collect()
    }

    fn test_hierarchy() -> TypeHierarchy {
        let mut types = TypeHierarchy::new();
        types.add(Type::new("t", Vec::<&str>::new())).unwrap();
        types.add(Type::new("o", ["t"])).unwrap();
        types.add(Type::new("c", ["t"])).unwrap();
        types.add(Type::new("k", ["o"])).unwrap();
        types.add(Type::new("f", ["o"])).unwrap();
        types.add(Type::new("s", ["c"])).unwrap();
        types
    }

    #[test]
    fn parents_must_exist() {
        let mut types = TypeHierarchy::new();
        let err = types.add(Type::new("o", ["t"])).unwrap_err();
        assert!(matches!(err, CoreError::UnknownType(name) if name == "t"));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut types = test_hierarchy();
        let err = types.add(Type::new("o", ["t"])).unwrap_err();
        assert!(matches!(err, CoreError::Duplicate { kind: "type", .. }));
    }

    #[test]
    fn get_unknown_type_fails() {
        let types = test_hierarchy();
        assert!(types.get("x").is_err());
        assert_eq!(&*types.get("k").unwrap().name, "k");
    }

    #[test]
    fn ancestors_and_descendants() {
        let types = test_hierarchy();
        assert_eq!(names(&types.ancestors("k")), vec!["o", "t"]);
        assert_eq!(names(&types.descendants("t")), vec!["c", "o", "s", "f", "k"]);
        assert_eq!(names(&types.subtypes("o")), vec!["o", "f", "k"]);
        assert!(types.is_subtype_of("k", "t"));
        assert!(!types.is_subtype_of("t", "k"));
    }

    #[test]
    fn closure_visits_shared_ancestors_once() {
        let mut types = test_hierarchy();
        types.add(Type::new("x", ["k", "f"])).unwrap();
        assert_eq!(names(&types.ancestors("x")), vec!["k", "f", "o", "t"]);
    }

    #[test]
    fn multi_subtypes_is_breadth_first() {
        let types = test_hierarchy();
        let tuples = types.multi_subtypes(&[Arc::from("o"), Arc::from("c")]);
        let rendered: Vec<String> = tuples.iter().map(|t| t.join(",")).collect();
        assert_eq!(rendered, vec!["o,c", "f,c", "k,c", "o,s", "f,s", "k,s"]);
    }

    #[test]
    fn multi_subtypes_ignores_insertion_order() {
        let mut other = TypeHierarchy::new();
        other.add(Type::new("t", Vec::<&str>::new())).unwrap();
        other.add(Type::new("c", ["t"])).unwrap();
        other.add(Type::new("s", ["c"])).unwrap();
        other.add(Type::new("o", ["t"])).unwrap();
        other.add(Type::new("f", ["o"])).unwrap();
        other.add(Type::new("k", ["o"])).unwrap();

        let key = [Arc::from("t"), Arc::from("o")];
        assert_eq!(test_hierarchy().multi_subtypes(&key), other.multi_subtypes(&key));
    }

    #[test]
    fn unknown_types_have_no_subtypes() {
        let types = TypeHierarchy::new();
        let tuples = types.multi_subtypes(&[Arc::from("r")]);
        assert_eq!(tuples.len(), 1);
    }

    #[test]
    fn constants_are_uppercase() {
        let mut types = test_hierarchy();
        types.add(Type::new("P", Vec::<&str>::new())).unwrap();
        assert_eq!(types.constants().map(|n| &**n).collect::<Vec<_>>(), vec!["P"]);
        assert!(is_constant_type("I"));
        assert!(!is_constant_type("r"));
    }
}
