use logos::Logos;
use std::fmt;

/// Token type for logic documents.
///
/// Keywords (`type`, `predicates`, `rules`, ...) are plain identifiers; the
/// parser recognizes them by position.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Left brace `{`.
    LBrace,
    /// Right brace `}`.
    RBrace,
    /// Left parenthesis `(`.
    LParen,
    /// Right parenthesis `)`.
    RParen,
    /// Comma separator `,`.
    Comma,
    /// Statement terminator `;`.
    Semicolon,
    /// Type annotation `:`.
    Colon,
    /// Definition separator `::`.
    DoubleColon,
    /// Conjunction `&`.
    Amp,
    /// Persistent precondition marker `$`.
    Dollar,
    /// Rule arrow `->`.
    Arrow,
    /// Alias definition `=`.
    Equals,
    /// Triple-quoted code block (`"""..."""`).
    DocString(String),
    /// Double-quoted string literal.
    Str(String),
    /// Identifier: a name, a rule name such as `go/east`, or a primed
    /// placeholder such as `r'`.
    Ident(String),
}

impl Token {
    /// The fixed spelling of a punctuation token.
    fn punctuation(&self) -> Option<&'static str> {
        Some(match self {
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::DoubleColon => "::",
            Token::Amp => "&",
            Token::Dollar => "$",
            Token::Arrow => "->",
            Token::Equals => "=",
            Token::DocString(_) | Token::Str(_) | Token::Ident(_) => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbol) = self.punctuation() {
            return f.write_str(symbol);
        }
        match self {
            Token::DocString(_) => f.write_str("code block"),
            Token::Str(text) => write!(f, "{text:?}"),
            Token::Ident(name) => f.write_str(name),
            _ => Ok(()),
        }
    }
}

/// Internal logos token, converted to an owned `Token` after lexing.
#[derive(Logos, Debug)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"#[^\n]*")]
enum RawToken {
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("::")]
    DoubleColon,

    #[token("&")]
    Amp,

    #[token("$")]
    Dollar,

    #[token("->")]
    Arrow,

    #[token("=")]
    Equals,

    #[token("\"\"\"")]
    DocStringStart,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Str,

    #[regex(r"[A-Za-z_][A-Za-z0-9_/]*'*")]
    Ident,
}

/// A lexer error with source location.
#[derive(Debug, Clone)]
pub struct LexError {
    /// Byte range of the erroneous input in the source.
    pub span: std::ops::Range<usize>,
    /// Human-readable description of the lexer error.
    pub message: String,
}

/// Lex source code into a sequence of `(Token, Span)` pairs.
///
/// Lexing continues past errors to collect as many tokens as possible.
pub fn lex(source: &str) -> (Vec<(Token, std::ops::Range<usize>)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = match result {
            Ok(RawToken::LBrace) => Token::LBrace,
            Ok(RawToken::RBrace) => Token::RBrace,
            Ok(RawToken::LParen) => Token::LParen,
            Ok(RawToken::RParen) => Token::RParen,
            Ok(RawToken::Comma) => Token::Comma,
            Ok(RawToken::Semicolon) => Token::Semicolon,
            Ok(RawToken::Colon) => Token::Colon,
            Ok(RawToken::DoubleColon) => Token::DoubleColon,
            Ok(RawToken::Amp) => Token::Amp,
            Ok(RawToken::Dollar) => Token::Dollar,
            Ok(RawToken::Arrow) => Token::Arrow,
            Ok(RawToken::Equals) => Token::Equals,
            Ok(RawToken::DocStringStart) => {
                let remainder = lexer.remainder();
                match remainder.find("\"\"\"") {
                    Some(end_idx) => {
                        let content = dedent(&remainder[..end_idx]);
                        lexer.bump(end_idx + 3);
                        tokens.push((Token::DocString(content), span.start..lexer.span().end));
                    }
                    None => errors.push(LexError {
                        span: span.clone(),
                        message: "unterminated code block (missing closing \"\"\")".to_string(),
                    }),
                }
                continue;
            }
            Ok(RawToken::Str) => {
                let slice = lexer.slice();
                Token::Str(unescape(&slice[1..slice.len() - 1]))
            }
            Ok(RawToken::Ident) => Token::Ident(lexer.slice().to_string()),
            Err(()) => {
                errors.push(LexError {
                    span: span.clone(),
                    message: format!("unexpected character: {:?}", &source[span.clone()]),
                });
                continue;
            }
        };
        tokens.push((token, span));
    }

    (tokens, errors)
}

/// Resolve the escapes of a string literal body: `\\`, `\n`, `\t` and
/// `\"`. Anything else after a backslash is kept verbatim.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(at) = rest.find('\\') {
        out.push_str(&rest[..at]);
        let mut tail = rest[at + 1..].chars();
        let resolved = match tail.next() {
            Some('n') => "\n".to_string(),
            Some('t') => "\t".to_string(),
            Some(c @ ('\\' | '"')) => c.to_string(),
            Some(c) => format!("\\{c}"),
            None => "\\".to_string(),
        };
        out.push_str(&resolved);
        rest = tail.as_str();
    }
    out.push_str(rest);
    out
}

/// Remove the indentation shared by every non-blank line, and the leading
/// and trailing blank lines.
fn dedent(block: &str) -> String {
    let lines: Vec<&str> = block.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let body: Vec<&str> = lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect();
    body.join("\n").trim_matches('\n').to_string()
}
