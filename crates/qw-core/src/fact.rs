use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};
use crate::intern::Interner;
use crate::term::{Placeholder, Variable};

/// Mapping from placeholders to the variables they are bound to.
pub type Mapping = BTreeMap<Placeholder, Variable>;

fn precomputed_hash(value: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SignatureData {
    name: Arc<str>,
    types: Box<[Arc<str>]>,
    hash: u64,
}

/// The shape of a fact: a predicate name and the types of its arguments.
///
/// Signatures are cheap to clone. Equal signatures obtained from the same
/// [`Interner`] share their allocation, which makes equality a pointer
/// comparison in the common case.
#[derive(Clone)]
pub struct Signature(Arc<SignatureData>);

impl Signature {
    /// Create a signature outside of any interner.
    pub fn new<S: Into<Arc<str>>>(name: impl Into<Arc<str>>, types: impl IntoIterator<Item = S>) -> Self {
        let name = name.into();
        let types: Box<[Arc<str>]> = types.into_iter().map(Into::into).collect();
        let hash = precomputed_hash(&(&name, &types));
        Self(Arc::new(SignatureData { name, types, hash }))
    }

    /// The predicate name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The argument types.
    pub fn types(&self) -> &[Arc<str>] {
        &self.0.types
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.0.types.len()
    }

    /// Whether both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.name == other.0.name
                && self.0.types == other.0.types)
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        (&self.0.name, &self.0.types).cmp(&(&other.0.name, &other.0.types))
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.0.name, join(&self.0.types))
    }
}

#[derive(Serialize, Deserialize)]
struct SignatureRepr {
    name: Arc<str>,
    types: Vec<Arc<str>>,
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SignatureRepr {
            name: self.0.name.clone(),
            types: self.0.types.to_vec(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = SignatureRepr::deserialize(deserializer)?;
        Ok(Signature::new(repr.name, repr.types))
    }
}

// ---------------------------------------------------------------------------
// Proposition
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PropositionData {
    name: Arc<str>,
    arguments: Box<[Variable]>,
    signature: Signature,
    hash: u64,
}

/// A ground fact such as `at(P, kitchen)`.
///
/// Like [`Signature`], propositions are shared handles with a precomputed
/// hash; the [`Interner`] of a game logic returns the same handle for equal
/// propositions.
#[derive(Clone)]
pub struct Proposition(Arc<PropositionData>);

impl Proposition {
    /// Create a proposition outside of any interner.
    pub fn new(name: impl Into<Arc<str>>, arguments: impl IntoIterator<Item = Variable>) -> Self {
        let name = name.into();
        let arguments: Box<[Variable]> = arguments.into_iter().collect();
        let signature = Signature::new(name.clone(), arguments.iter().map(|v| v.type_arc().clone()));
        Self::with_signature(name, arguments, signature)
    }

    pub(crate) fn with_signature(name: Arc<str>, arguments: Box<[Variable]>, signature: Signature) -> Self {
        let hash = precomputed_hash(&(&name, &arguments));
        Self(Arc::new(PropositionData {
            name,
            arguments,
            signature,
            hash,
        }))
    }

    /// The predicate name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.0.name
    }

    /// The arguments, in order.
    pub fn arguments(&self) -> &[Variable] {
        &self.0.arguments
    }

    /// The shape of this fact.
    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    /// Names of the arguments.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.arguments.iter().map(Variable::name)
    }

    /// Whether both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Proposition {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.name == other.0.name
                && self.0.arguments == other.0.arguments)
    }
}

impl Eq for Proposition {}

impl Hash for Proposition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl Ord for Proposition {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        (&self.0.name, &self.0.arguments).cmp(&(&other.0.name, &other.0.arguments))
    }
}

impl PartialOrd for Proposition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Proposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proposition({self})")
    }
}

impl fmt::Display for Proposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.names().collect();
        write!(f, "{}({})", self.0.name, args.join(", "))
    }
}

#[derive(Serialize, Deserialize)]
struct PropositionRepr {
    name: Arc<str>,
    arguments: Vec<Variable>,
}

impl Serialize for Proposition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PropositionRepr {
            name: self.0.name.clone(),
            arguments: self.0.arguments.to_vec(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Proposition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = PropositionRepr::deserialize(deserializer)?;
        Ok(Proposition::new(repr.name, repr.arguments))
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A templated fact such as `at(P, r)`, instantiated into a [`Proposition`]
/// by binding its placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Predicate {
    name: Arc<str>,
    parameters: Vec<Placeholder>,
}

impl Predicate {
    /// Create a predicate.
    pub fn new(name: impl Into<Arc<str>>, parameters: impl IntoIterator<Item = Placeholder>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().collect(),
        }
    }

    /// The predicate name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The placeholders, in order.
    pub fn parameters(&self) -> &[Placeholder] {
        &self.parameters
    }

    /// The shape of this predicate.
    pub fn signature(&self) -> Signature {
        Signature::new(self.name.clone(), self.parameters.iter().map(|ph| ph.type_arc().clone()))
    }

    /// The argument types, in order.
    pub fn types(&self) -> Vec<Arc<str>> {
        self.parameters.iter().map(|ph| ph.type_arc().clone()).collect()
    }

    /// Rename placeholders. Placeholders missing from `mapping` are kept.
    pub fn substitute(&self, mapping: &BTreeMap<Placeholder, Placeholder>) -> Predicate {
        Predicate {
            name: self.name.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|ph| mapping.get(ph).unwrap_or(ph).clone())
                .collect(),
        }
    }

    /// Bind every placeholder, producing a proposition outside of any interner.
    pub fn instantiate(&self, mapping: &Mapping) -> CoreResult<Proposition> {
        Ok(Proposition::new(self.name.clone(), self.bind(mapping)?))
    }

    /// Bind every placeholder, producing an interned proposition.
    pub fn instantiate_in(&self, mapping: &Mapping, interner: &Interner) -> CoreResult<Proposition> {
        let arguments = self.bind(mapping)?;
        Ok(interner.proposition(self.name.clone(), arguments))
    }

    fn bind(&self, mapping: &Mapping) -> CoreResult<Vec<Variable>> {
        self.parameters
            .iter()
            .map(|ph| {
                mapping
                    .get(ph)
                    .cloned()
                    .ok_or_else(|| CoreError::UnboundPlaceholder {
                        rule: self.to_string(),
                        placeholder: ph.name().to_string(),
                    })
            })
            .collect()
    }

    /// The mapping that turns this predicate into `proposition`, if any.
    pub fn match_proposition(&self, proposition: &Proposition) -> Option<Mapping> {
        if &*self.name != proposition.name() || self.parameters.len() != proposition.arguments().len() {
            return None;
        }
        let mut mapping = Mapping::new();
        for (ph, var) in self.parameters.iter().zip(proposition.arguments()) {
            match mapping.get(ph) {
                Some(existing) if existing != var => return None,
                Some(_) => {}
                None => {
                    mapping.insert(ph.clone(), var.clone());
                }
            }
        }
        Some(mapping)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, join(&self.parameters))
    }
}

// ---------------------------------------------------------------------------
// Alias
// ---------------------------------------------------------------------------

/// A shorthand predicate standing for a conjunction of other predicates,
/// written `pattern = a & b` in a logic document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// The shorthand form.
    pub pattern: Predicate,
    /// What the shorthand expands to.
    pub replacement: Vec<Predicate>,
}

impl Alias {
    /// Create an alias.
    pub fn new(pattern: Predicate, replacement: Vec<Predicate>) -> Self {
        Self { pattern, replacement }
    }

    /// Expand one use of this alias, renaming the pattern's placeholders to
    /// the arguments of `predicate`.
    pub fn expand(&self, predicate: &Predicate) -> Vec<Predicate> {
        let mapping: BTreeMap<Placeholder, Placeholder> = self
            .pattern
            .parameters()
            .iter()
            .cloned()
            .zip(predicate.parameters().iter().cloned())
            .collect();
        self.replacement.iter().map(|p| p.substitute(&mapping)).collect()
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let replacement: Vec<String> = self.replacement.iter().map(ToString::to_string).collect();
        write!(f, "{} = {}", self.pattern, replacement.join(" & "))
    }
}
