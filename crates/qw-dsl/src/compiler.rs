use std::collections::{HashMap, HashSet};

use qw_core::{
    Action, Alias, CoreError, CoreResult, FAIL_PREDICATE, GameLogic, GameLogicBuilder, Inform7Command, Inform7Type,
    Placeholder, Predicate, Proposition, Rule, Signature, Type, Variable,
};

use crate::ast::*;
use crate::diagnostics::{Diagnostic, Severity, tally};
use crate::error::{DslError, DslResult};
use crate::source_map::SourceMap;

/// Result of compiling logic documents into a [`GameLogic`].
#[derive(Debug)]
pub struct CompileResult {
    /// The compiled logic, absent when any error was reported.
    pub logic: Option<GameLogic>,
    /// Errors and warnings produced during compilation.
    pub diagnostics: Vec<Diagnostic>,
    /// Maps byte offsets back to individual documents.
    pub source_map: SourceMap,
}

impl CompileResult {
    /// Returns `true` if any diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Warnings only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Counts of errors and warnings, such as `"0 errors, 2 warnings"`.
    pub fn summary(&self) -> String {
        tally(&self.diagnostics)
    }

    /// Render every diagnostic against the document it points into.
    pub fn render(&self) -> String {
        self.source_map.render(&self.diagnostics)
    }

    /// The logic, or the error diagnostics that prevented building it.
    pub fn into_logic(self) -> DslResult<GameLogic> {
        if self.has_errors() || self.logic.is_none() {
            return Err(DslError::Invalid(
                self.diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
            ));
        }
        self.logic.ok_or(DslError::Invalid(Vec::new()))
    }
}

/// Compile a parsed document into a game logic.
///
/// The compilation happens in two passes:
/// 1. **Type pass**: declare every type block, so that any section may
///    mention types declared further down.
/// 2. **Section pass**: predicates, aliases, rules, reverse rules,
///    constraints and Inform 7 bindings, in source order.
///
/// Predicates used without a declaration are reported as warnings.
pub fn compile(ast: &Document, source_map: SourceMap) -> CompileResult {
    let mut compiler = Compiler::default();
    for idx in 0..source_map.files().len() {
        if let Some(text) = source_map.file_text(idx) {
            compiler.builder.add_document(text);
        }
    }
    compiler.compile(ast);
    let logic = compiler.finish();
    CompileResult {
        logic,
        diagnostics: compiler.diagnostics,
        source_map,
    }
}

#[derive(Default)]
struct Compiler {
    builder: GameLogicBuilder,
    diagnostics: Vec<Diagnostic>,
    /// Declared predicate and alias shapes, by name and arity.
    declared: HashSet<(String, usize)>,
    /// Declared signatures whose types are checked once every type exists.
    signatures: Vec<(Signature, Span)>,
    /// Predicate uses in rules, aliases and bindings.
    usages: Vec<(String, usize, Span)>,
    /// First mention of each type name.
    type_spans: HashMap<String, Span>,
    /// First reference to each rule name outside its declaration.
    rule_refs: HashMap<String, Span>,
    alias_spans: HashMap<String, Span>,
    rule_names: HashSet<String>,
    commands: Vec<(String, Span)>,
}

impl Compiler {
    fn compile(&mut self, ast: &Document) {
        for decl in &ast.types {
            self.compile_type(&decl.node);
        }
        for decl in &ast.types {
            for part in &decl.node.parts {
                self.compile_part(&decl.node.name.node, &part.node);
            }
        }
    }

    fn error(&mut self, span: &Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(span.clone(), message));
    }

    // -- Pass 1: types --

    fn compile_type(&mut self, decl: &TypeDecl) {
        let parents = decl.supertypes.iter().map(|s| s.node.as_str());
        if let Err(err) = self.builder.add_type(Type::new(decl.name.node.as_str(), parents)) {
            let span = match &err {
                CoreError::UnknownType(parent) => decl
                    .supertypes
                    .iter()
                    .find(|s| &s.node == parent)
                    .map_or(decl.name.span.clone(), |s| s.span.clone()),
                _ => decl.name.span.clone(),
            };
            self.diagnostics
                .push(Diagnostic::error(span, err.to_string()).with_label("types must be declared before their subtypes"));
        }
    }

    // -- Pass 2: sections --

    fn compile_part(&mut self, type_name: &str, part: &TypePart) {
        match part {
            TypePart::Predicates(decls) => {
                for decl in decls {
                    self.compile_predicate_decl(decl);
                }
            }
            TypePart::Rules(rules) => {
                for rule in rules {
                    if let Some(rule) = self.compile_rule(rule) {
                        self.rule_names.insert(rule.name().to_string());
                        let span = rule_name_span(rules, rule.name());
                        if let Err(err) = self.builder.add_rule(rule) {
                            self.error(&span, err.to_string());
                        }
                    }
                }
            }
            TypePart::Constraints(rules) => {
                for rule in rules {
                    if let Some(rule) = self.compile_rule(rule) {
                        let span = rule_name_span(rules, rule.name());
                        if let Err(err) = self.builder.add_constraint(rule) {
                            self.error(&span, err.to_string());
                        }
                    }
                }
            }
            TypePart::ReverseRules(pairs) => {
                for pair in pairs {
                    let ReverseRuleNode { lhs, rhs } = &pair.node;
                    for name in [lhs, rhs] {
                        self.rule_refs.entry(name.node.clone()).or_insert_with(|| name.span.clone());
                    }
                    if let Err(err) = self.builder.add_reverse_rule(&lhs.node, &rhs.node) {
                        self.error(&pair.span, err.to_string());
                    }
                }
            }
            TypePart::Inform7(parts) => {
                for part in parts {
                    self.compile_inform7(type_name, &part.node, &part.span);
                }
            }
        }
    }

    fn compile_predicate_decl(&mut self, decl: &Spanned<PredicateDecl>) {
        let pattern = self.predicate(&decl.node.atom);
        self.declared
            .insert((pattern.name().to_string(), pattern.parameters().len()));

        let result = match &decl.node.replacement {
            None => {
                let signature = pattern.signature();
                self.signatures.push((signature.clone(), decl.node.atom.span.clone()));
                self.builder.add_predicate(signature).map(|_| ())
            }
            Some(replacement) => {
                let replacement: Vec<Predicate> = replacement.iter().map(|a| self.use_predicate(a)).collect();
                match check_placeholder_types(std::iter::once(&pattern).chain(&replacement)) {
                    Ok(()) => {
                        self.alias_spans
                            .insert(pattern.signature().to_string(), decl.node.atom.span.clone());
                        self.builder.add_alias(Alias::new(pattern, replacement)).map(|_| ())
                    }
                    Err(err) => Err(err),
                }
            }
        };
        if let Err(err) = result {
            self.error(&decl.span, err.to_string());
        }
    }

    fn compile_rule(&mut self, node: &Spanned<RuleNode>) -> Option<Rule> {
        for cond in &node.node.preconditions {
            self.use_predicate(&cond.atom);
        }
        for atom in &node.node.postconditions {
            self.use_predicate(atom);
        }
        match rule(&node.node) {
            Ok(rule) => Some(rule),
            Err(err) => {
                self.error(&node.span, err.to_string());
                None
            }
        }
    }

    fn compile_inform7(&mut self, type_name: &str, part: &Inform7Part, span: &Span) {
        let result = match part {
            Inform7Part::Type { kind, definition } => {
                let ty = Inform7Type {
                    kind: kind.clone(),
                    definition: definition.clone(),
                };
                self.builder.add_inform7_type(type_name, ty).map(|_| ())
            }
            Inform7Part::Predicates(entries) => entries.iter().try_for_each(|(atom, source)| {
                let predicate = self.use_predicate(atom);
                self.builder
                    .add_inform7_predicate(predicate, source.clone())
                    .map(|_| ())
            }),
            Inform7Part::Commands(commands) => commands.iter().try_for_each(|cmd| {
                let CommandNode { rule, command, event } = &cmd.node;
                self.commands.push((rule.clone(), cmd.span.clone()));
                let command = Inform7Command {
                    command: command.clone(),
                    event: event.clone(),
                };
                self.builder.add_inform7_command(rule, command).map(|_| ())
            }),
            Inform7Part::Code(code) => {
                self.builder.add_inform7_code(code.clone());
                Ok(())
            }
        };
        if let Err(err) = result {
            self.error(span, err.to_string());
        }
    }

    // -- Helpers --

    fn predicate(&mut self, atom: &Spanned<AtomNode>) -> Predicate {
        for arg in &atom.node.arguments {
            let ph = placeholder(&arg.node);
            self.type_spans
                .entry(ph.type_name().to_string())
                .or_insert_with(|| arg.span.clone());
        }
        predicate(&atom.node)
    }

    fn use_predicate(&mut self, atom: &Spanned<AtomNode>) -> Predicate {
        self.usages
            .push((atom.node.name.clone(), atom.node.arguments.len(), atom.span.clone()));
        self.predicate(atom)
    }

    fn check_signatures(&mut self) {
        let signatures = std::mem::take(&mut self.signatures);
        for (signature, span) in &signatures {
            for ty in signature.types() {
                if !self.builder.has_type(ty) {
                    self.error(span, format!("unknown type: {ty}"));
                }
            }
        }
    }

    fn check_usages(&mut self) {
        let usages = std::mem::take(&mut self.usages);
        for (name, arity, span) in usages {
            if name != FAIL_PREDICATE && !self.declared.contains(&(name.clone(), arity)) {
                self.diagnostics.push(
                    Diagnostic::warning(span, format!("undeclared predicate: {name}/{arity}"))
                        .with_label("not declared in any predicates block")
                        .with_note("declare it in the predicates block of one of its argument types"),
                );
            }
        }
        let commands = std::mem::take(&mut self.commands);
        for (rule, span) in commands {
            if !self.rule_names.contains(&rule) {
                self.diagnostics
                    .push(Diagnostic::warning(span, format!("command for unknown rule: {rule}")));
            }
        }
    }

    fn span_for(&self, err: &CoreError) -> Span {
        let found = match err {
            CoreError::UnknownType(name) => self.type_spans.get(name),
            CoreError::UnknownRule(name) => self.rule_refs.get(name),
            CoreError::AliasCycle(name) => self.alias_spans.get(name),
            _ => None,
        };
        found.cloned().unwrap_or(0..0)
    }

    fn finish(&mut self) -> Option<GameLogic> {
        self.check_signatures();
        self.check_usages();
        if self.diagnostics.iter().any(Diagnostic::is_error) {
            return None;
        }
        match std::mem::take(&mut self.builder).build() {
            Ok(logic) => Some(logic),
            Err(err) => {
                let span = self.span_for(&err);
                self.error(&span, err.to_string());
                None
            }
        }
    }
}

fn rule_name_span(rules: &[Spanned<RuleNode>], name: &str) -> Span {
    rules
        .iter()
        .find(|r| r.node.name.node == name)
        .map_or(0..0, |r| r.node.name.span.clone())
}

fn check_placeholder_types<'a>(predicates: impl IntoIterator<Item = &'a Predicate>) -> CoreResult<()> {
    let mut types: HashMap<&str, &str> = HashMap::new();
    for ph in predicates.into_iter().flat_map(Predicate::parameters) {
        let existing = *types.entry(ph.name()).or_insert(ph.type_name());
        if existing != ph.type_name() {
            return Err(CoreError::TypeConflict {
                name: ph.name().to_string(),
                existing: existing.to_string(),
                conflicting: ph.type_name().to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AST conversion
// ---------------------------------------------------------------------------

/// `r'` becomes a placeholder of type `r`; `x: o` one of type `o`.
pub(crate) fn placeholder(term: &TermNode) -> Placeholder {
    match &term.type_name {
        Some(ty) => Placeholder::with_type(term.name.as_str(), ty.as_str()),
        None => Placeholder::new(term.name.as_str()),
    }
}

pub(crate) fn predicate(atom: &AtomNode) -> Predicate {
    Predicate::new(atom.name.as_str(), atom.arguments.iter().map(|a| placeholder(&a.node)))
}

/// Persistent preconditions come first among the postconditions.
fn split_conditions<T>(node: &RuleNode, convert: &mut impl FnMut(&AtomNode) -> T) -> (Vec<T>, Vec<T>) {
    let mut pre = Vec::with_capacity(node.preconditions.len());
    let mut post = Vec::new();
    for cond in &node.preconditions {
        pre.push(convert(&cond.atom.node));
    }
    for cond in node.preconditions.iter().filter(|c| c.preserve) {
        post.push(convert(&cond.atom.node));
    }
    for atom in &node.postconditions {
        post.push(convert(&atom.node));
    }
    (pre, post)
}

pub(crate) fn rule(node: &RuleNode) -> CoreResult<Rule> {
    let (pre, post) = split_conditions(node, &mut predicate);
    Rule::new(node.name.node.as_str(), pre, post)
}

/// Variables of one action or fact list: a name keeps its first type.
#[derive(Debug, Default)]
pub(crate) struct VariableScope {
    types: HashMap<String, String>,
}

impl VariableScope {
    /// An untyped variable is typed by its own name, as constants are.
    pub(crate) fn variable(&mut self, term: &TermNode) -> CoreResult<Variable> {
        let ty = term.type_name.as_deref().unwrap_or(&term.name);
        match self.types.get(&term.name) {
            Some(existing) if existing != ty && term.type_name.is_some() => Err(CoreError::TypeConflict {
                name: term.name.clone(),
                existing: existing.clone(),
                conflicting: ty.to_string(),
            }),
            Some(existing) => Ok(Variable::new(term.name.as_str(), existing.as_str())),
            None => {
                self.types.insert(term.name.clone(), ty.to_string());
                Ok(Variable::new(term.name.as_str(), ty))
            }
        }
    }

    pub(crate) fn proposition(&mut self, atom: &AtomNode) -> CoreResult<Proposition> {
        let arguments = atom
            .arguments
            .iter()
            .map(|a| self.variable(&a.node))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Proposition::new(atom.name.as_str(), arguments))
    }
}

pub(crate) fn action(node: &RuleNode) -> CoreResult<Action> {
    let mut scope = VariableScope::default();
    let mut error = None;
    let (pre, post) = split_conditions(node, &mut |atom| match scope.proposition(atom) {
        Ok(prop) => Some(prop),
        Err(err) => {
            error.get_or_insert(err);
            None
        }
    });
    if let Some(err) = error {
        return Err(err);
    }
    Ok(Action::new(
        node.name.node.as_str(),
        pre.into_iter().flatten(),
        post.into_iter().flatten(),
    ))
}
