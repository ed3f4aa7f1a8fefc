//! Quest generation for Questweber.
//!
//! A quest candidate is a [`Chain`] of actions found by searching the
//! transitions of a [`qw_core::GameLogic`], either forward from an initial
//! state or backward from the state the quest should end in. The shape of
//! the search is set by [`ChainingOptions`]. Independent subchains make a
//! chain nonlinear; the [`DependencyTree`] is the structure quests use to
//! track which of their actions can happen next.

/// Chains and their nodes.
pub mod chain;
/// The search itself.
pub mod chainer;
/// A generic multi-root dependency tree.
pub mod dependency_tree;
/// Error types for chaining.
pub mod error;
/// Options shaping the search.
pub mod options;

/// Re-exports of [`chain::Chain`] and [`chain::ChainNode`].
pub use chain::{Chain, ChainNode};
/// Re-exports of the search entry points.
pub use chainer::{Chainer, get_chains, sample_quest};
/// Re-exports of the dependency tree types.
pub use dependency_tree::{DependencyElement, DependencyTree};
/// Re-exports of [`error::ChainError`] and [`error::ChainResult`].
pub use error::{ChainError, ChainResult};
/// Re-export of [`options::ChainingOptions`].
pub use options::ChainingOptions;
