use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::ast::*;
use crate::lexer::Token;

type ChumskySpan = SimpleSpan;
type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Parse error with source span.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Byte range of the offending tokens.
    pub span: std::ops::Range<usize>,
    /// Human-readable description of the error.
    pub message: String,
}

fn spanned<T>(node: T, span: ChumskySpan) -> Spanned<T> {
    Spanned {
        node,
        span: span.into_range(),
    }
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

fn ident<'a, I>() -> impl Parser<'a, I, String, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    select! { Token::Ident(w) => w }.labelled("identifier")
}

fn kw<'a, I>(k: &'static str) -> impl Parser<'a, I, (), Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    select! { Token::Ident(ref w) if w.as_str() == k => () }.labelled(k)
}

fn string_lit<'a, I>() -> impl Parser<'a, I, String, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    select! { Token::Str(s) => s }.labelled("string")
}

/// `name` or `name: type`.
pub(crate) fn term<'a, I>() -> impl Parser<'a, I, Spanned<TermNode>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    ident()
        .then(just(Token::Colon).ignore_then(ident()).or_not())
        .map_with(|(name, type_name), e| spanned(TermNode { name, type_name }, e.span()))
        .labelled("term")
}

/// `name(term, ...)`.
pub(crate) fn atom<'a, I>() -> impl Parser<'a, I, Spanned<AtomNode>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    ident()
        .then(
            term()
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map_with(|(name, arguments), e| spanned(AtomNode { name, arguments }, e.span()))
        .labelled("predicate")
}

/// `atom & atom & ...`, possibly empty.
pub(crate) fn conjunction<'a, I>() -> impl Parser<'a, I, Vec<Spanned<AtomNode>>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    atom().separated_by(just(Token::Amp)).collect::<Vec<_>>()
}

/// `name :: [$]atom & ... -> atom & ...`.
pub(crate) fn rule<'a, I>() -> impl Parser<'a, I, Spanned<RuleNode>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    let condition = just(Token::Dollar)
        .or_not()
        .then(atom())
        .map(|(dollar, atom)| ConditionNode {
            preserve: dollar.is_some(),
            atom,
        });

    ident()
        .map_with(|name, e| spanned(name, e.span()))
        .then_ignore(just(Token::DoubleColon))
        .then(condition.separated_by(just(Token::Amp)).collect::<Vec<_>>())
        .then_ignore(just(Token::Arrow))
        .then(conjunction())
        .map_with(|((name, preconditions), postconditions), e| {
            spanned(
                RuleNode {
                    name,
                    preconditions,
                    postconditions,
                },
                e.span(),
            )
        })
        .labelled("rule")
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = ChumskySpan>,
{
    let semi = just(Token::Semicolon);
    let block = |open: Token, close: Token| (just(open), just(close));
    let (lbrace, rbrace) = block(Token::LBrace, Token::RBrace);
    let name = ident().map_with(|n, e| spanned(n, e.span()));

    // -- predicates { sig; alias = a & b; } --
    let predicate_decl = atom()
        .then(just(Token::Equals).ignore_then(conjunction()).or_not())
        .then_ignore(semi.clone())
        .map_with(|(atom, replacement), e| spanned(PredicateDecl { atom, replacement }, e.span()));
    let predicates = kw("predicates")
        .ignore_then(
            predicate_decl
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(TypePart::Predicates);

    // -- rules / constraints --
    let rule_list = rule()
        .then_ignore(semi.clone())
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(lbrace.clone(), rbrace.clone());
    let rules = kw("rules").ignore_then(rule_list.clone()).map(TypePart::Rules);
    let constraints = kw("constraints").ignore_then(rule_list).map(TypePart::Constraints);

    // -- reverse_rules { a :: b; } --
    let reverse_rule = name
        .clone()
        .then_ignore(just(Token::DoubleColon))
        .then(name.clone())
        .then_ignore(semi.clone())
        .map_with(|(lhs, rhs), e| spanned(ReverseRuleNode { lhs, rhs }, e.span()));
    let reverse_rules = kw("reverse_rules")
        .ignore_then(
            reverse_rule
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(TypePart::ReverseRules);

    // -- inform7 { ... } --
    let field = |k: &'static str| {
        kw(k)
            .ignore_then(just(Token::DoubleColon))
            .ignore_then(string_lit())
            .then_ignore(semi.clone())
    };
    let i7_type = kw("type")
        .ignore_then(
            choice((
                field("kind").map(|s| (Some(s), None)),
                field("definition").map(|s| (None, Some(s))),
            ))
            .repeated()
            .collect::<Vec<(Option<String>, Option<String>)>>()
            .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(|fields| {
            let (mut kind, mut definition) = (None, None);
            for (k, d) in fields {
                kind = k.or(kind);
                definition = d.or(definition);
            }
            Inform7Part::Type { kind, definition }
        });
    let i7_predicates = kw("predicates")
        .ignore_then(
            atom()
                .then_ignore(just(Token::DoubleColon))
                .then(string_lit())
                .then_ignore(semi.clone())
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(Inform7Part::Predicates);
    let command = ident()
        .then_ignore(just(Token::DoubleColon))
        .then(string_lit())
        .then_ignore(just(Token::DoubleColon))
        .then(string_lit())
        .then_ignore(semi.clone())
        .map_with(|((rule, command), event), e| spanned(CommandNode { rule, command, event }, e.span()));
    let i7_commands = kw("commands")
        .ignore_then(
            command
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(Inform7Part::Commands);
    let i7_code = kw("code")
        .ignore_then(just(Token::DoubleColon))
        .ignore_then(select! { Token::DocString(s) => s }.labelled("code block"))
        .then_ignore(semi)
        .map(Inform7Part::Code);
    let inform7 = kw("inform7")
        .ignore_then(
            choice((i7_type, i7_predicates, i7_commands, i7_code))
                .map_with(|part, e| spanned(part, e.span()))
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(lbrace.clone(), rbrace.clone()),
        )
        .map(TypePart::Inform7);

    let part = choice((predicates, rules, reverse_rules, constraints, inform7))
        .map_with(|part, e| spanned(part, e.span()))
        .labelled("type section");

    // -- type name : parents { ... } --
    let type_decl = kw("type")
        .ignore_then(name.clone())
        .then(
            just(Token::Colon)
                .ignore_then(name.separated_by(just(Token::Comma)).at_least(1).collect::<Vec<_>>())
                .or_not(),
        )
        .then(part.repeated().collect::<Vec<_>>().delimited_by(lbrace, rbrace))
        .map_with(|((name, supertypes), parts), e| {
            spanned(
                TypeDecl {
                    name,
                    supertypes: supertypes.unwrap_or_default(),
                    parts,
                },
                e.span(),
            )
        })
        .labelled("type declaration");

    type_decl
        .repeated()
        .collect::<Vec<_>>()
        .map(|types| Document { types })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn convert_errors(errors: Vec<Rich<'_, Token>>) -> Vec<ParseError> {
    errors
        .into_iter()
        .map(|e| ParseError {
            span: e.span().into_range(),
            message: e.to_string(),
        })
        .collect()
}

/// Run `$parser` to the end of the token slice `$tokens`.
macro_rules! run_parser {
    ($tokens:expr, $parser:expr) => {{
        let tokens: &[(Token, std::ops::Range<usize>)] = $tokens;
        let token_iter = tokens
            .iter()
            .map(|(tok, span)| (tok.clone(), ChumskySpan::from(span.clone())));
        let len = tokens.last().map_or(0, |(_, s)| s.end);
        let eoi: ChumskySpan = (len..len).into();
        let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));
        let (output, errors) = $parser.then_ignore(end()).parse(stream).into_output_errors();
        match output {
            Some(ast) if errors.is_empty() => Ok(ast),
            _ => Err(convert_errors(errors)),
        }
    }};
}

/// Parse a token stream into a document.
pub fn parse(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Document, Vec<ParseError>> {
    run_parser!(tokens, document_parser())
}

/// Parse a lone term such as `kitchen: r`.
pub fn parse_term(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Spanned<TermNode>, Vec<ParseError>> {
    run_parser!(tokens, term())
}

/// Parse a lone atom such as `at(P, kitchen: r)`.
pub fn parse_atom(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Spanned<AtomNode>, Vec<ParseError>> {
    run_parser!(tokens, atom())
}

/// Parse a conjunction of atoms such as `at(P, r) & open(c)`.
pub fn parse_conjunction(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Vec<Spanned<AtomNode>>, Vec<ParseError>> {
    run_parser!(tokens, conjunction())
}

/// Parse a lone rule or action.
pub fn parse_rule(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Spanned<RuleNode>, Vec<ParseError>> {
    run_parser!(tokens, rule())
}
