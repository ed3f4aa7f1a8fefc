use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::fact::{Proposition, Signature};
use crate::term::Variable;

/// Hash-consing tables for signatures and propositions.
///
/// Every [`GameLogic`](crate::GameLogic) owns one interner, shared by its
/// rules and by the states built from it. Interning the same signature or
/// proposition twice returns the same handle, so `ptr_eq` holds between
/// them. Entries are never evicted.
#[derive(Default)]
pub struct Interner {
    signatures: Mutex<HashSet<Signature>>,
    propositions: Mutex<HashSet<Proposition>>,
}

impl Interner {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared signature `name(types...)`.
    pub fn signature<S: Into<Arc<str>>>(&self, name: impl Into<Arc<str>>, types: impl IntoIterator<Item = S>) -> Signature {
        self.intern_signature(Signature::new(name, types))
    }

    /// The shared handle equal to `signature`.
    pub fn intern_signature(&self, signature: Signature) -> Signature {
        let mut table = self.signatures.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.get(&signature) {
            return existing.clone();
        }
        table.insert(signature.clone());
        signature
    }

    /// The shared proposition `name(arguments...)`.
    pub fn proposition(&self, name: impl Into<Arc<str>>, arguments: impl IntoIterator<Item = Variable>) -> Proposition {
        self.intern_proposition(Proposition::new(name, arguments))
    }

    /// The shared handle equal to `proposition`.
    pub fn intern_proposition(&self, proposition: Proposition) -> Proposition {
        {
            let table = self.propositions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = table.get(&proposition) {
                return existing.clone();
            }
        }

        let signature = self.intern_signature(proposition.signature().clone());
        let interned = Proposition::with_signature(
            proposition.name_arc().clone(),
            proposition.arguments().into(),
            signature,
        );
        let mut table = self.propositions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.get(&interned) {
            return existing.clone();
        }
        table.insert(interned.clone());
        interned
    }

    /// Number of interned propositions.
    pub fn len(&self) -> usize {
        self.propositions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signatures = self.signatures.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("Interner")
            .field("signatures", &signatures)
            .field("propositions", &self.len())
            .finish()
    }
}
