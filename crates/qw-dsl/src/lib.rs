//! Logic documents for Questweber.
//!
//! A document is a sequence of type blocks:
//!
//! ```text
//! type c : t {
//!     predicates { open(c); closed(c); }
//!     rules { open/c :: $at(P, r) & $at(c, r) & closed(c) -> open(c); }
//!     reverse_rules { open/c :: close/c; }
//!     inform7 { commands { open/c :: "open {c}" :: "opening the {c}"; } }
//! }
//! ```
//!
//! [`compile_source`] and [`compile_documents`] turn documents into a
//! [`GameLogic`], reporting problems as [`Diagnostic`]s. The `parse_*`
//! functions read single items (facts, actions, rules) written in the same
//! syntax.

/// Syntax tree of logic documents.
pub mod ast;
/// Lowering of syntax trees into a game logic.
pub mod compiler;
/// Diagnostics and their terminal rendering.
pub mod diagnostics;
/// Error types of the convenience entry points.
pub mod error;
/// Tokens and the lexer.
pub mod lexer;
/// Token-stream parsers.
pub mod parser;
/// Offsets of concatenated documents.
pub mod source_map;

use std::path::Path;

use qw_core::{Action, GameLogic, Placeholder, Predicate, Proposition, Rule, Signature, Variable};
use serde::Deserialize;

/// Re-export of [`compiler::CompileResult`].
pub use compiler::CompileResult;
/// Re-exports of the diagnostic types.
pub use diagnostics::{Diagnostic, Severity, render_diagnostics, tally};
/// Re-exports of [`error::DslError`] and [`error::DslResult`].
pub use error::{DslError, DslResult};
/// Re-export of [`source_map::SourceMap`].
pub use source_map::SourceMap;

use compiler::VariableScope;
use lexer::Token;
use parser::ParseError;

/// File extension of logic documents.
pub const LOGIC_EXTENSION: &str = "twl";

/// Compile a single source string into a game logic.
pub fn compile_source(source: &str) -> CompileResult {
    compile_documents([("<source>", source)])
}

/// Compile several named documents into a single game logic.
///
/// Documents are concatenated in order; diagnostic spans refer to the
/// concatenation and can be mapped back with the result's source map.
pub fn compile_documents<'a, N: Into<String>>(documents: impl IntoIterator<Item = (N, &'a str)>) -> CompileResult {
    let mut source_map = SourceMap::new();
    for (name, text) in documents {
        source_map.add_file(name, text);
    }

    let (tokens, lex_errors) = lexer::lex(source_map.source());
    let mut diagnostics: Vec<Diagnostic> = lex_errors
        .into_iter()
        .map(|e| Diagnostic::error(e.span, e.message))
        .collect();

    let ast = match parser::parse(&tokens) {
        Ok(ast) => ast,
        Err(parse_errors) => {
            diagnostics.extend(parse_diagnostics(parse_errors));
            return CompileResult {
                logic: None,
                diagnostics,
                source_map,
            };
        }
    };

    let mut result = compiler::compile(&ast, source_map);
    if !diagnostics.is_empty() {
        result.logic = None;
        diagnostics.append(&mut result.diagnostics);
        result.diagnostics = diagnostics;
    }
    result
}

/// Compile a source string, failing on any error diagnostic.
pub fn parse_logic(source: &str) -> DslResult<GameLogic> {
    compile_source(source).into_logic()
}

/// Load a logic from a `.twl` file, or from every `.twl` file of a
/// directory in name order.
pub fn load_logic(path: &Path) -> DslResult<GameLogic> {
    let io_error = |source| DslError::Io {
        path: path.display().to_string(),
        source,
    };

    let files = if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)
            .map_err(io_error)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == LOGIC_EXTENSION))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };
    if files.is_empty() {
        return Err(DslError::Invalid(vec![Diagnostic::error(
            0..0,
            format!("no .{LOGIC_EXTENSION} files found in {}", path.display()),
        )]));
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        let text = std::fs::read_to_string(file).map_err(|source| DslError::Io {
            path: file.display().to_string(),
            source,
        })?;
        documents.push((file.display().to_string(), text));
    }
    compile_documents(documents.iter().map(|(name, text)| (name.as_str(), text.as_str()))).into_logic()
}

#[derive(Deserialize)]
struct LogicRepr {
    documents: Vec<String>,
}

/// Rebuild a game logic from the data tree produced by
/// [`GameLogic::to_data`], by recompiling its documents.
pub fn logic_from_data(data: serde_json::Value) -> DslResult<GameLogic> {
    let repr: LogicRepr = serde_json::from_value(data)?;
    compile_documents(
        repr.documents
            .iter()
            .enumerate()
            .map(|(i, text)| (format!("<document {i}>"), text.as_str())),
    )
    .into_logic()
}

// ---------------------------------------------------------------------------
// Single items
// ---------------------------------------------------------------------------

fn parse_diagnostics(errors: Vec<ParseError>) -> impl Iterator<Item = Diagnostic> {
    errors.into_iter().map(|e| Diagnostic::error(e.span, e.message))
}

fn parse_item<T>(
    source: &str,
    parse: impl FnOnce(&[(Token, std::ops::Range<usize>)]) -> Result<T, Vec<ParseError>>,
) -> DslResult<T> {
    let (tokens, lex_errors) = lexer::lex(source);
    if !lex_errors.is_empty() {
        return Err(DslError::Invalid(
            lex_errors
                .into_iter()
                .map(|e| Diagnostic::error(e.span, e.message))
                .collect(),
        ));
    }
    parse(&tokens).map_err(|errors| DslError::Invalid(parse_diagnostics(errors).collect()))
}

/// Parse a variable such as `kitchen: r`; a bare name is typed by itself,
/// as constants like `P` are.
pub fn parse_variable(source: &str) -> DslResult<Variable> {
    let term = parse_item(source, parser::parse_term)?;
    Ok(VariableScope::default().variable(&term.node)?)
}

/// Parse a placeholder such as `r'` or `x: o`.
pub fn parse_placeholder(source: &str) -> DslResult<Placeholder> {
    let term = parse_item(source, parser::parse_term)?;
    Ok(compiler::placeholder(&term.node))
}

/// Parse a predicate such as `link(r, d, r')`.
pub fn parse_predicate(source: &str) -> DslResult<Predicate> {
    let atom = parse_item(source, parser::parse_atom)?;
    Ok(compiler::predicate(&atom.node))
}

/// Parse a signature such as `at(P, r)`.
pub fn parse_signature(source: &str) -> DslResult<Signature> {
    Ok(parse_predicate(source)?.signature())
}

/// Parse a fact such as `at(P, kitchen: r)`.
pub fn parse_proposition(source: &str) -> DslResult<Proposition> {
    let atom = parse_item(source, parser::parse_atom)?;
    Ok(VariableScope::default().proposition(&atom.node)?)
}

/// Parse a conjunction of facts. A variable typed once keeps that type in
/// the rest of the conjunction.
pub fn parse_facts(source: &str) -> DslResult<Vec<Proposition>> {
    let atoms = parse_item(source, parser::parse_conjunction)?;
    let mut scope = VariableScope::default();
    let facts = atoms
        .iter()
        .map(|a| scope.proposition(&a.node))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Parse a rule such as `take :: $at(P, r) & at(o, r) -> in(o, I)`.
pub fn parse_rule(source: &str) -> DslResult<Rule> {
    let node = parse_item(source, parser::parse_rule)?;
    Ok(compiler::rule(&node.node)?)
}

/// Parse a ground action such as
/// `open/c :: $at(P, kitchen: r) & closed(chest: c) -> open(chest)`.
pub fn parse_action(source: &str) -> DslResult<Action> {
    let node = parse_item(source, parser::parse_rule)?;
    Ok(compiler::action(&node.node)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_renders_back() {
        let rule = parse_rule("take :: $at(P, r) & at(o, r) -> in(o, I)").unwrap();
        insta::assert_snapshot!(rule, @"take :: $at(P, r) & at(o, r) -> in(o, I)");
        let names: Vec<&str> = rule.placeholders().iter().map(Placeholder::name).collect();
        assert_eq!(names, vec!["P", "r", "o", "I"]);
    }

    #[test]
    fn action_renders_back() {
        let action = parse_action("open/c :: $at(P, kitchen: r) & $at(chest: c, kitchen) & closed(chest) -> open(chest)").unwrap();
        insta::assert_snapshot!(action, @"open/c :: $at(P, kitchen) & $at(chest, kitchen) & closed(chest) -> open(chest)");
        let removed: Vec<String> = action.removed().iter().map(ToString::to_string).collect();
        assert_eq!(removed, vec!["closed(chest)"]);
    }

    #[test]
    fn typed_items() {
        let var = parse_variable("kitchen: r").unwrap();
        assert_eq!((var.name(), var.type_name()), ("kitchen", "r"));
        assert!(parse_variable("P").unwrap().is_constant());

        let ph = parse_placeholder("r''").unwrap();
        assert_eq!(ph.type_name(), "r");
        insta::assert_snapshot!(parse_placeholder("x: o").unwrap(), @"x: o");

        insta::assert_snapshot!(parse_signature("link(r, d, r')").unwrap(), @"link(r, d, r)");
        insta::assert_snapshot!(parse_predicate("link(r, d, r')").unwrap(), @"link(r, d, r')");
    }

    #[test]
    fn facts_share_variable_types() {
        let facts = parse_facts("at(P, kitchen: r) & in(carrot: f, kitchen)").unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[1].arguments()[1].type_name(), "r");
        assert!(matches!(parse_facts("at(x: r) & at(x: c)"), Err(DslError::Core(_))));
    }

    #[test]
    fn proposition_keeps_types() {
        let prop = parse_proposition("at(chest: c, kitchen: r)").unwrap();
        insta::assert_snapshot!(prop, @"at(chest, kitchen)");
        let types: Vec<&str> = prop.signature().types().iter().map(|t| &**t).collect();
        assert_eq!(types, vec!["c", "r"]);
    }

    #[test]
    fn bad_items_report_diagnostics() {
        let err = parse_rule("take :: at(P, r) ->> in(o, I)").unwrap_err();
        assert!(!err.diagnostics().is_empty());
        assert!(parse_proposition("at(P, r").is_err());
        assert!(matches!(parse_rule("bad :: at(x: r) -> at(x: c)"), Err(DslError::Core(_))));
    }

    #[test]
    fn documents_compile_together() {
        let result = compile_documents([
            ("rooms.twl", "type r { predicates { at(P, r); } }\ntype P {}"),
            ("doors.twl", "type d { predicates { link(r, d, r); } }"),
        ]);
        assert!(!result.has_errors(), "{}", result.render());
        let logic = result.logic.unwrap();
        assert_eq!(logic.documents().len(), 2);
        assert_eq!(logic.predicates().count(), 2);
    }

    #[test]
    fn lex_errors_prevent_building() {
        let result = compile_source("type r { } %");
        assert!(result.has_errors());
        assert!(result.logic.is_none());
        assert!(parse_logic("type r { } %").is_err());
    }

    #[test]
    fn parse_error_is_located() {
        let result = compile_documents([("a.twl", "type r {}"), ("b.twl", "type c { rules }")]);
        assert!(result.has_errors());
        let (idx, _) = result.source_map.to_local_span(&result.diagnostics[0].span).unwrap();
        assert_eq!(result.source_map.files()[idx].name, "b.twl");
    }

    #[test]
    fn logic_round_trips_through_data() {
        let logic = parse_logic("type r { predicates { free(r, r); } rules { stay :: $free(r, r') -> ; } }").unwrap();
        let data = logic.to_data().unwrap();
        let again = logic_from_data(data).unwrap();
        assert_eq!(again.documents(), logic.documents());
        assert_eq!(again.rule("stay").unwrap().to_string(), logic.rule("stay").unwrap().to_string());
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let err = load_logic(Path::new("/nonexistent/logic.twl")).unwrap_err();
        assert!(matches!(err, DslError::Io { .. }));
    }
}
