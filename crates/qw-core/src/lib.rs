//! Core logic for Questweber: a typed first-order model of text-adventure
//! worlds.
//!
//! Worlds are sets of ground facts ([`Proposition`]s) held in a [`State`].
//! A [`GameLogic`] declares the types, predicates and [`Rule`]s of a game;
//! rules instantiate into [`Action`]s that transform states. The DSL crate
//! compiles logic documents into a `GameLogic`, but one can also be
//! assembled programmatically with [`GameLogicBuilder`].

/// Ground transitions.
pub mod action;
/// Error types used throughout the crate.
pub mod error;
/// Signatures, propositions, predicates and aliases.
pub mod fact;
/// Hash-consing of signatures and propositions.
pub mod intern;
/// The compiled game logic and its builder.
pub mod logic;
/// Templated transitions and their instantiation.
pub mod rule;
/// Indexed fact sets and rule unification.
pub mod state;
/// Variables and placeholders.
pub mod term;
/// The type DAG.
pub mod types;

/// Re-export of [`action::Action`].
pub use action::Action;
/// Re-exports of [`error::CoreError`] and [`error::CoreResult`].
pub use error::{CoreError, CoreResult};
/// Re-exports of the fact types.
pub use fact::{Alias, Mapping, Predicate, Proposition, Signature};
/// Re-export of [`intern::Interner`].
pub use intern::Interner;
/// Re-exports of the game logic types.
pub use logic::{FAIL_PREDICATE, GameLogic, GameLogicBuilder, Inform7Command, Inform7Logic, Inform7Type};
/// Re-export of [`rule::Rule`].
pub use rule::Rule;
/// Re-exports of [`state::State`] and [`state::PartialMapping`].
pub use state::{PartialMapping, State};
/// Re-exports of the term types.
pub use term::{Placeholder, Variable};
/// Re-exports of the type hierarchy.
pub use types::{Type, TypeHierarchy};
