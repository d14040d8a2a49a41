// Parser for kernel signature notation.
//
// Parses a token stream (from the lexer) into a `KernelSignature`:
//
//   signature := IDENT '(' (param (',' param)* ','?)? ')' '->' type
//   param     := IDENT ':' type
//   type      := KIND ('[' (dim (',' dim)*)? ']')?
//   dim       := INT | IDENT
//
// A bare KIND is a scalar; `KIND[]` is a rank-0 array. Uses chumsky combinators.
//
// Preconditions: none.
// Postconditions: returns a signature plus any diagnostics; the signature is
//   only meaningful when the diagnostics are empty.
// Failure modes: lex errors (E0001), syntax errors and unknown element kinds
//   (E0002), duplicate parameter names (E0003).
// Side effects: none.

use std::collections::HashMap;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::lexer::Token;
use crate::signature::{KernelSignature, Param};
use crate::types::{Dim, KernelType, PrimKind};

/// Result of parsing: signature plus any diagnostics.
#[derive(Debug)]
pub struct ParseResult {
    pub signature: Option<KernelSignature>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parsed signature with parameter-name spans, before validation.
struct RawSignature {
    name: String,
    params: Vec<(Param, SimpleSpan)>,
    ret: KernelType,
}

/// Parse a signature string. Lexes, parses, then validates parameter names.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = signature_parser(source);
    let (raw, parse_errors) = parser.parse(stream).into_output_errors();

    let mut diagnostics: Vec<Diagnostic> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Diagnostic::new(DiagLevel::Error, span, e.message).with_code(codes::E0001)
        })
        .collect();
    diagnostics.extend(parse_errors.into_iter().map(|e| {
        Diagnostic::new(DiagLevel::Error, *e.span(), e.to_string()).with_code(codes::E0002)
    }));

    let signature = raw.map(|raw| validate(raw, &mut diagnostics));

    ParseResult {
        signature,
        diagnostics,
    }
}

fn validate(raw: RawSignature, diagnostics: &mut Vec<Diagnostic>) -> KernelSignature {
    let mut seen: HashMap<&str, SimpleSpan> = HashMap::new();
    for (param, span) in &raw.params {
        if let Some(first) = seen.get(param.name.as_str()) {
            diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    *span,
                    format!("duplicate parameter '{}'", param.name),
                )
                .with_code(codes::E0003)
                .with_hint(format!("first declared at {}..{}", first.start, first.end)),
            );
        } else {
            seen.insert(param.name.as_str(), *span);
        }
    }
    KernelSignature {
        name: raw.name,
        params: raw.params.into_iter().map(|(p, _)| p).collect(),
        ret: raw.ret,
    }
}

fn signature_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, RawSignature, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        (source[span.start()..span.end()].to_string(), span)
    });

    // ── Dimensions ──

    let dim = select! {
        Token::Int(n) => Dim::Literal(n),
    }
    .or(ident.clone().map(|(name, _)| Dim::Symbol(name)));

    let shape = dim
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    // ── Types ──

    let kind = ident.clone().try_map(|(name, _), span| {
        PrimKind::from_name(&name).ok_or_else(|| {
            Rich::custom(
                span,
                format!("unknown element kind '{}' (expected bool, i8..i64, u8..u64, f32, f64)", name),
            )
        })
    });

    let ty = kind.then(shape.or_not()).map(|(elem, shape)| match shape {
        Some(shape) => KernelType::Array { elem, shape },
        None => KernelType::Scalar { elem },
    });

    // ── Parameters ──

    let param = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(ty.clone())
        .map(|((name, span), ty)| (Param { name, ty }, span));

    let params = param
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Signature ──

    ident
        .then(params)
        .then_ignore(just(Token::Arrow))
        .then(ty)
        .map(|(((name, _), params), ret)| RawSignature { name, params, ret })
}

// ── Tests ──
