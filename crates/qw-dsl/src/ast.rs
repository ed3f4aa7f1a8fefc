/// Source span as a byte range.
pub type Span = std::ops::Range<usize>;

/// An AST node with source location.
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    /// The wrapped AST node.
    pub node: T,
    /// The byte range of this node in the source text.
    pub span: Span,
}

/// A parsed logic document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Type blocks, in source order.
    pub types: Vec<Spanned<TypeDecl>>,
}

/// A type block, e.g. `type k : o { ... }`.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// The name of the type.
    pub name: Spanned<String>,
    /// Names of the direct supertypes.
    pub supertypes: Vec<Spanned<String>>,
    /// Sections of the block.
    pub parts: Vec<Spanned<TypePart>>,
}

/// A section of a type block.
#[derive(Debug, Clone)]
pub enum TypePart {
    /// `predicates { ... }`: signatures and aliases.
    Predicates(Vec<Spanned<PredicateDecl>>),
    /// `rules { ... }`.
    Rules(Vec<Spanned<RuleNode>>),
    /// `reverse_rules { a :: b; ... }`.
    ReverseRules(Vec<Spanned<ReverseRuleNode>>),
    /// `constraints { ... }`.
    Constraints(Vec<Spanned<RuleNode>>),
    /// `inform7 { ... }`.
    Inform7(Vec<Spanned<Inform7Part>>),
}

/// A name with an optional type, such as `kitchen: r` or `r'`.
///
/// Used both for placeholders (in rules) and variables (in actions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermNode {
    /// The name.
    pub name: String,
    /// The explicit type, if written.
    pub type_name: Option<String>,
}

/// A name applied to terms, such as `at(P, r)`.
#[derive(Debug, Clone)]
pub struct AtomNode {
    /// The predicate name.
    pub name: String,
    /// The arguments.
    pub arguments: Vec<Spanned<TermNode>>,
}

/// An entry of a `predicates` block.
///
/// Without a replacement this is a signature whose arguments are type
/// names; with one it is an alias.
#[derive(Debug, Clone)]
pub struct PredicateDecl {
    /// The declared shape, or the alias pattern.
    pub atom: Spanned<AtomNode>,
    /// The alias replacement, if any.
    pub replacement: Option<Vec<Spanned<AtomNode>>>,
}

/// A precondition, possibly marked persistent with `$`.
#[derive(Debug, Clone)]
pub struct ConditionNode {
    /// Whether the condition is kept by the rule.
    pub preserve: bool,
    /// The condition itself.
    pub atom: Spanned<AtomNode>,
}

/// A rule or action, e.g. `take :: $at(P, r) & at(o, r) -> in(o, I)`.
#[derive(Debug, Clone)]
pub struct RuleNode {
    /// The rule name.
    pub name: Spanned<String>,
    /// Preconditions, in order.
    pub preconditions: Vec<ConditionNode>,
    /// Explicit postconditions, in order.
    pub postconditions: Vec<Spanned<AtomNode>>,
}

/// A reverse-rule pair, e.g. `open/c :: close/c`.
#[derive(Debug, Clone)]
pub struct ReverseRuleNode {
    /// The first rule.
    pub lhs: Spanned<String>,
    /// The rule undoing it.
    pub rhs: Spanned<String>,
}

/// An entry of an `inform7` block.
#[derive(Debug, Clone)]
pub enum Inform7Part {
    /// `type { kind :: "..."; definition :: "..."; }` for the enclosing type.
    Type {
        /// The Inform 7 kind.
        kind: Option<String>,
        /// Extra Inform 7 definition.
        definition: Option<String>,
    },
    /// `predicates { at(P, r) :: "..."; }`.
    Predicates(Vec<(Spanned<AtomNode>, String)>),
    /// `commands { open/c :: "open {c}" :: "opening the {c}"; }`.
    Commands(Vec<Spanned<CommandNode>>),
    /// `code :: """...""";`.
    Code(String),
}

/// Command and event templates of one rule.
#[derive(Debug, Clone)]
pub struct CommandNode {
    /// The rule name.
    pub rule: String,
    /// The command template.
    pub command: String,
    /// The event template.
    pub event: String,
}
