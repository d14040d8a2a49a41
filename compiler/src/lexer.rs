// Lexer for kernel signature notation.
//
// Tokenizes text such as `add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]`.
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Signature tokens.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,

    /// Non-negative integer literal (array extents).
    #[regex(r"[0-9]+", parse_int)]
    Int(u64),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Arrow => write!(f, "->"),
            Token::Colon => write!(f, ":"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<u64> {
    lex.slice().parse().ok()
}

/// Lex a signature string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn full_signature() {
        let tokens = lex_ok("add(a: f32[n, 4]) -> f32[n]");
        assert_eq!(
            tokens,
            vec![
                Token::Ident,
                Token::LParen,
                Token::Ident,
                Token::Colon,
                Token::Ident,
                Token::LBracket,
                Token::Ident,
                Token::Comma,
                Token::Int(4),
                Token::RBracket,
                Token::RParen,
                Token::Arrow,
                Token::Ident,
                Token::LBracket,
                Token::Ident,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn comments_and_newlines_are_skipped() {
        let tokens = lex_ok("k(\n  x: f64 // scale\n) -> f64");
        assert_eq!(tokens.len(), 8);
    }

    #[test]
    fn bad_character_is_reported_and_skipped() {
        let result = lex("f(a: i32) -> i32 $");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 17, end: 18 });
        assert_eq!(result.tokens.len(), 8);
    }

    #[test]
    fn span_tracks_identifier_text() {
        let src = "scale(x: f32) -> f32";
        let result = lex(src);
        let (tok, span) = &result.tokens[0];
        assert_eq!(*tok, Token::Ident);
        assert_eq!(&src[span.start..span.end], "scale");
    }
}
