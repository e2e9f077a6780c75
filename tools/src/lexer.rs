// Lexer for the C-subset token stream used by all rewriting passes.
//
// Tokenizes generated kernel C source (and standalone size expressions)
// into spanned tokens. Uses the `logos` crate for DFA-based lexing.
//
// The token set covers only what the rewrite passes pattern-match on:
// identifiers, numeric literals, arithmetic operators, comparison
// operators, delimiters. Every other byte lexes as `Tok::Other`, which no
// rewrite rule ever matches, so unknown C constructs pass through
// untouched. Comments and string/char literals are recognized so that
// rewrites never fire inside them.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans; no input byte
//                 is ever lost (rewrites splice replacements by span).
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The source text this span covers.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// C-subset token types.
///
/// Tokens carry no value — use the span to retrieve the text from the
/// source. Comments are skipped; string and char literals are single
/// tokens so their contents are opaque to every rewrite rule.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*|/\*[^*]*\*+([^/*][^*]*\*+)*/")]
pub enum Tok {
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // Float must appear before Int so the longer match (digits with a
    // fractional part or exponent) wins over a bare integer prefix.
    /// Floating literal (`1.5`, `1.`, `2e10`).
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+")]
    Float,

    /// Integer literal.
    #[regex(r"[0-9]+")]
    Int,

    /// String literal with escapes, kept as one opaque token.
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    /// Char literal, kept as one opaque token.
    #[regex(r"'([^'\\]|\\.)*'")]
    CharLit,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,

    /// Any byte the subset does not model (`&`, `.`, `#`, …).
    /// Never matched by a rewrite rule; passes through verbatim.
    #[regex(r".", priority = 0)]
    Other,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tok::Ident => "<ident>",
            Tok::Float => "<float>",
            Tok::Int => "<int>",
            Tok::Str => "<string>",
            Tok::CharLit => "<char>",
            Tok::Plus => "+",
            Tok::Minus => "-",
            Tok::Star => "*",
            Tok::Slash => "/",
            Tok::Percent => "%",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::Comma => ",",
            Tok::Semi => ";",
            Tok::EqEq => "==",
            Tok::Ne => "!=",
            Tok::Le => "<=",
            Tok::Ge => ">=",
            Tok::Lt => "<",
            Tok::Gt => ">",
            Tok::Eq => "=",
            Tok::Other => "<other>",
        };
        write!(f, "{}", s)
    }
}

/// Lex a source string into spanned tokens.
///
/// Lexing never fails: bytes outside the subset become `Tok::Other` with
/// their span intact.
pub fn lex(source: &str) -> Vec<(Tok, Span)> {
    let lexer = Tok::lexer(source);
    let mut tokens = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => tokens.push((Tok::Other, span)),
        }
    }

    tokens
}

/// True for tokens that can stand as an arithmetic term on their own.
pub fn is_term(tok: Tok) -> bool {
    matches!(tok, Tok::Ident | Tok::Int | Tok::Float)
}

/// True when `tok` is the integer literal `0`.
pub fn is_zero(source: &str, tok: Tok, span: Span) -> bool {
    tok == Tok::Int && span.slice(source) == "0"
}

// ── Tests ──
