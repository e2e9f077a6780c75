// Arithmetic expression simplifier and restricted constant evaluator.
//
// `simplify` removes identity operations and redundant grouping from
// C arithmetic text (buffer size expressions, index arithmetic) without
// building a full AST: rewrite rules pattern-match the token stream and
// splice replacements back by byte span, so untouched source is preserved
// verbatim. Rules run to a fixpoint with a bounded pass count.
//
// `eval_literal` evaluates fully-literal integer arithmetic. The grammar
// accepts integers, `+ - * /` and parentheses, nothing else; identifiers,
// floats and any other token fail the parse. This is a hard boundary:
// the evaluator can neither resolve names nor cause side effects.
//
// Preconditions: input is valid UTF-8.
// Postconditions: `simplify` output is arithmetically equivalent to its
//                 input and a fixpoint of the rules; `eval_literal`
//                 returns the exact integer value or `None`.
// Failure modes: none for `simplify` (worst case: input returned
//                unchanged); `eval_literal` returns `None` on non-literal
//                input, inexact division, or overflow.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::lexer::{self, is_term, is_zero, Span, Tok};

/// Upper bound on simplification passes. Well-formed input converges in
/// two or three; the cap guarantees termination on pathological text.
const MAX_PASSES: usize = 5;

// ── Simplifier ──────────────────────────────────────────────────────────────

/// Simplify a standalone arithmetic expression (e.g. a buffer size).
///
/// Idempotent: `simplify(simplify(e)) == simplify(e)`.
pub fn simplify(expr: &str) -> String {
    simplify_fixpoint(expr.trim())
}

/// Simplify arithmetic wherever it occurs inside a larger source text.
/// Same rules as [`simplify`]; surrounding code passes through untouched.
pub fn simplify_code(code: &str) -> String {
    simplify_fixpoint(code)
}

fn simplify_fixpoint(text: &str) -> String {
    let mut cur = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = simplify_pass(&cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

fn simplify_pass(text: &str) -> String {
    let rules: [fn(&str) -> Option<String>; 5] = [
        fold_parenthesized_identity,
        fold_bare_zero,
        fold_paren_product,
        fold_term_identity,
        strip_redundant_parens,
    ];
    let mut cur = text.to_string();
    for rule in rules {
        if let Some(next) = rule(&cur) {
            cur = next;
        }
    }
    cur
}

/// Replace each `(start, end)` byte range with its replacement text.
/// Edits must be sorted and non-overlapping.
fn apply_edits(source: &str, edits: &[(usize, usize, String)]) -> Option<String> {
    if edits.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (start, end, repl) in edits {
        out.push_str(&source[pos..*start]);
        out.push_str(repl);
        pos = *end;
    }
    out.push_str(&source[pos..]);
    Some(out)
}

/// `(A - (0))` → `A` and `(A + (0))` → `A`, where `A` is a paren-free
/// token run. When dropping the group's own parentheses would change how
/// `A` binds to its context, the group is kept: `(A ± (0))` → `(A)`.
fn fold_parenthesized_identity(source: &str) -> Option<String> {
    let tokens = lexer::lex(source);
    let mut edits = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].0 != Tok::LParen {
            i += 1;
            continue;
        }
        // Walk the paren-free run after '('. The first nested paren must
        // open the trailing `(0)` for the pattern to match.
        let mut p = i + 1;
        while p < tokens.len() && !matches!(tokens[p].0, Tok::LParen | Tok::RParen) {
            p += 1;
        }
        let matched = p >= i + 3
            && p + 3 < tokens.len()
            && tokens[p].0 == Tok::LParen
            && matches!(tokens[p - 1].0, Tok::Plus | Tok::Minus)
            && is_zero(source, tokens[p + 1].0, tokens[p + 1].1)
            && tokens[p + 2].0 == Tok::RParen
            && tokens[p + 3].0 == Tok::RParen;
        if !matched {
            i += 1;
            continue;
        }

        let a_tokens = &tokens[i + 1..p - 1];
        let a_slice = &source[tokens[i + 1].1.start..tokens[p - 2].1.end];
        let prev = if i > 0 { Some(tokens[i - 1].0) } else { None };
        let next = tokens.get(p + 4).map(|t| t.0);
        let repl = if unparen_is_safe(a_tokens, prev, next) {
            a_slice.to_string()
        } else {
            format!("({})", a_slice)
        };
        edits.push((tokens[i].1.start, tokens[p + 3].1.end, repl));
        i = p + 4;
    }
    apply_edits(source, &edits)
}

/// Whether a parenthesized group whose body is `a` can lose its parens in
/// the context `prev (a) next` without changing operator binding.
fn unparen_is_safe(a: &[(Tok, Span)], prev: Option<Tok>, next: Option<Tok>) -> bool {
    if a.len() == 1 {
        return true;
    }
    let has_addsub = a.iter().any(|(t, _)| matches!(t, Tok::Plus | Tok::Minus));
    if has_addsub {
        !matches!(prev, Some(Tok::Minus | Tok::Star | Tok::Slash | Tok::Percent))
            && !matches!(next, Some(Tok::Star | Tok::Slash | Tok::Percent))
    } else {
        !matches!(prev, Some(Tok::Slash | Tok::Percent))
    }
}

/// Bare `(0)` → `0`. Skipped after an identifier so a call such as
/// `f(0)` keeps its argument parentheses.
fn fold_bare_zero(source: &str) -> Option<String> {
    let tokens = lexer::lex(source);
    let mut edits = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let matched = tokens[i].0 == Tok::LParen
            && is_zero(source, tokens[i + 1].0, tokens[i + 1].1)
            && tokens[i + 2].0 == Tok::RParen
            && (i == 0 || tokens[i - 1].0 != Tok::Ident);
        if matched {
            edits.push((tokens[i].1.start, tokens[i + 2].1.end, "0".to_string()));
            i += 3;
        } else {
            i += 1;
        }
    }
    apply_edits(source, &edits)
}

/// `(X) * (Y)` → `X * Y` for single identifiers or integers. Conservative:
/// multi-token groups keep their parens, and a preceding identifier (a
/// call) blocks the rewrite.
fn fold_paren_product(source: &str) -> Option<String> {
    let tokens = lexer::lex(source);
    let mut edits = Vec::new();
    let mut i = 0;
    while i + 6 < tokens.len() {
        let single = |t: Tok| matches!(t, Tok::Ident | Tok::Int);
        let matched = tokens[i].0 == Tok::LParen
            && single(tokens[i + 1].0)
            && tokens[i + 2].0 == Tok::RParen
            && tokens[i + 3].0 == Tok::Star
            && tokens[i + 4].0 == Tok::LParen
            && single(tokens[i + 5].0)
            && tokens[i + 6].0 == Tok::RParen
            && (i == 0 || tokens[i - 1].0 != Tok::Ident);
        if matched {
            let x = tokens[i + 1].1.slice(source);
            let y = tokens[i + 5].1.slice(source);
            edits.push((
                tokens[i].1.start,
                tokens[i + 6].1.end,
                format!("{} * {}", x, y),
            ));
            i += 7;
        } else {
            i += 1;
        }
    }
    apply_edits(source, &edits)
}

/// Unparenthesized `t - 0` → `t` and `t + 0` → `t` for a single term
/// token. A following `*`, `/` or `%` binds tighter than the dropped
/// operator and blocks the rewrite.
fn fold_term_identity(source: &str) -> Option<String> {
    let tokens = lexer::lex(source);
    let mut edits = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let matched = is_term(tokens[i].0)
            && matches!(tokens[i + 1].0, Tok::Plus | Tok::Minus)
            && is_zero(source, tokens[i + 2].0, tokens[i + 2].1)
            && !matches!(
                tokens.get(i + 3).map(|t| t.0),
                Some(Tok::Star | Tok::Slash | Tok::Percent)
            );
        if matched {
            edits.push((
                tokens[i].1.start,
                tokens[i + 2].1.end,
                tokens[i].1.slice(source).to_string(),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }
    apply_edits(source, &edits)
}

/// `(t)` → `t` for a single identifier or integer when followed by an
/// arithmetic operator or a closing paren. A preceding identifier (a
/// call) blocks the rewrite.
fn strip_redundant_parens(source: &str) -> Option<String> {
    let tokens = lexer::lex(source);
    let mut edits = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let matched = tokens[i].0 == Tok::LParen
            && matches!(tokens[i + 1].0, Tok::Ident | Tok::Int)
            && tokens[i + 2].0 == Tok::RParen
            && matches!(
                tokens.get(i + 3).map(|t| t.0),
                Some(Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::RParen)
            )
            && (i == 0 || tokens[i - 1].0 != Tok::Ident);
        if matched {
            edits.push((
                tokens[i].1.start,
                tokens[i + 2].1.end,
                tokens[i + 1].1.slice(source).to_string(),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }
    apply_edits(source, &edits)
}

// ── Restricted arithmetic evaluator ─────────────────────────────────────────

/// Binary operator of the restricted grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed integer arithmetic expression.
///
/// Literals are held as `i128` so oversized source literals survive
/// parsing and fail cleanly at evaluation instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArithExpr {
    Int(i128),
    Neg(Box<ArithExpr>),
    Bin(Box<ArithExpr>, ArithOp, Box<ArithExpr>),
}

fn arith_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, ArithExpr, extra::Err<Rich<'tokens, Tok, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Tok, Span = SimpleSpan>,
{
    recursive(|expr| {
        let int = just(Tok::Int).map_with(move |_, e| {
            let span: SimpleSpan = e.span();
            let lexeme = &source[span.start()..span.end()];
            ArithExpr::Int(lexeme.parse::<i128>().unwrap_or(i128::MAX))
        });

        let atom = int.or(expr.delimited_by(just(Tok::LParen), just(Tok::RParen)));

        let unary = just(Tok::Minus)
            .repeated()
            .foldr(atom, |_, inner| ArithExpr::Neg(Box::new(inner)));

        let product = unary.clone().foldl(
            just(Tok::Star)
                .to(ArithOp::Mul)
                .or(just(Tok::Slash).to(ArithOp::Div))
                .then(unary)
                .repeated(),
            |lhs, (op, rhs)| ArithExpr::Bin(Box::new(lhs), op, Box::new(rhs)),
        );

        product.clone().foldl(
            just(Tok::Plus)
                .to(ArithOp::Add)
                .or(just(Tok::Minus).to(ArithOp::Sub))
                .then(product)
                .repeated(),
            |lhs, (op, rhs)| ArithExpr::Bin(Box::new(lhs), op, Box::new(rhs)),
        )
    })
}

/// Parse integer arithmetic text into an [`ArithExpr`].
///
/// Returns `None` unless every token is an integer literal, `+ - * /`,
/// or a parenthesis, and the whole input forms one expression. This
/// token check plus the grammar is the evaluator's safety boundary.
pub fn parse_arith(text: &str) -> Option<ArithExpr> {
    let tokens = lexer::lex(text);
    if tokens.is_empty() {
        return None;
    }
    let allowed = tokens.iter().all(|(t, _)| {
        matches!(
            t,
            Tok::Int | Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::LParen | Tok::RParen
        )
    });
    if !allowed {
        return None;
    }

    let len = text.len();
    let token_iter = tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, errors) = arith_parser(text)
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    if !errors.is_empty() {
        return None;
    }
    output
}

/// Evaluate a parsed expression with checked `i64` arithmetic.
///
/// Division must be exact: a zero divisor or a nonzero remainder yields
/// `None`, as does any overflow.
pub fn eval_arith(expr: &ArithExpr) -> Option<i64> {
    match expr {
        ArithExpr::Int(v) => i64::try_from(*v).ok(),
        ArithExpr::Neg(inner) => eval_arith(inner)?.checked_neg(),
        ArithExpr::Bin(lhs, op, rhs) => {
            let a = eval_arith(lhs)?;
            let b = eval_arith(rhs)?;
            match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div => match a.checked_rem(b) {
                    Some(0) => a.checked_div(b),
                    _ => None,
                },
            }
        }
    }
}

/// Parse and evaluate in one step. `None` whenever the text is not a
/// fully-literal integer expression with an exact value.
pub fn eval_literal(text: &str) -> Option<i64> {
    parse_arith(text).as_ref().and_then(eval_arith)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    // ── Simplification rules ──

    #[test]
    fn subtract_zero_in_parens() {
        assert_eq!(simplify("(N - (0))"), "N");
        assert_eq!(simplify("(8 - (0))"), "8");
    }

    #[test]
    fn add_zero_in_parens() {
        assert_eq!(simplify("(M + (0))"), "M");
    }

    #[test]
    fn multi_term_group_keeps_parens_when_needed() {
        // Dropping the group here would change c * (a + b) into c * a + b.
        assert_eq!(simplify("c * (a + b - (0))"), "c * (a + b)");
    }

    #[test]
    fn multi_term_group_unparenthesized_when_safe() {
        assert_eq!(simplify("(a + b - (0))"), "a + b");
        assert_eq!(simplify("(M * N - (0))"), "M * N");
    }

    #[test]
    fn bare_zero_parens() {
        assert_eq!(simplify("(0)"), "0");
        assert_eq!(simplify("x[(0)]"), "x[0]");
    }

    #[test]
    fn call_argument_parens_survive() {
        // f(0) is a call, not a grouped literal.
        assert_eq!(simplify("f(0)"), "f(0)");
        assert_eq!(simplify("sqrt(x) * (y)"), "sqrt(x) * (y)");
    }

    #[test]
    fn paren_product() {
        assert_eq!(simplify("(4) * (N)"), "4 * N");
        assert_eq!(simplify("(M) * (N)"), "M * N");
    }

    #[test]
    fn nested_product_reduces() {
        // The inner groups fold away; the outer group survives because the
        // trailing-paren rule only fires before an operator.
        assert_eq!(simplify("((M) * (N) - (0))"), "(M * N)");
    }

    #[test]
    fn unparenthesized_identity() {
        assert_eq!(simplify("N - 0"), "N");
        assert_eq!(simplify("N + 0"), "N");
        assert_eq!(simplify("x[i - 0]"), "x[i]");
    }

    #[test]
    fn identity_blocked_by_tighter_operator() {
        // a - 0 * b is a, not a * b; the rewrite must not fire.
        assert_eq!(simplify("a - 0 * b"), "a - 0 * b");
        assert_eq!(simplify("a + 0 / b"), "a + 0 / b");
    }

    #[test]
    fn float_zero_untouched() {
        assert_eq!(simplify("a - 0.5"), "a - 0.5");
    }

    #[test]
    fn redundant_parens_before_operator() {
        assert_eq!(simplify("(N) * 4"), "N * 4");
        assert_eq!(simplify("(4 * (N))"), "(4 * N)");
    }

    #[test]
    fn standalone_single_paren_kept() {
        // No following operator, so the trailing-paren rule does not apply.
        assert_eq!(simplify("(N)"), "(N)");
    }

    #[test]
    fn simplify_is_idempotent() {
        for e in [
            "(N - (0))",
            "((M) * (N) - (0))",
            "c * (a + b - (0))",
            "x[i - 0] + y[(0)]",
            "(4 * (N))",
            "already simple",
        ] {
            let once = simplify(e);
            assert_eq!(simplify(&once), once, "not idempotent on {:?}", e);
        }
    }

    #[test]
    fn simplify_preserves_untouched_text() {
        let code = "for (int i = 0; i < N; i++) { x[i - 0] = 1.0; }";
        assert_eq!(
            simplify_code(code),
            "for (int i = 0; i < N; i++) { x[i] = 1.0; }"
        );
    }

    #[test]
    fn simplify_skips_comments_and_strings() {
        let code = "printf(\"(0) stays\"); // (N - (0)) stays too";
        assert_eq!(simplify_code(code), code);
    }

    // ── Evaluator ──

    #[test]
    fn precedence() {
        assert_eq!(eval_literal("2 + 3 * 4"), Some(14));
        assert_eq!(eval_literal("(2 + 3) * 4"), Some(20));
        assert_eq!(eval_literal("20 - 2 - 3"), Some(15));
    }

    #[test]
    fn exact_division_only() {
        assert_eq!(eval_literal("8 / 2"), Some(4));
        assert_eq!(eval_literal("7 / 2"), None);
        assert_eq!(eval_literal("8 / 0"), None);
    }

    #[test]
    fn unary_minus() {
        assert_eq!(eval_literal("-3 * 2"), Some(-6));
        assert_eq!(eval_literal("2 - -3"), Some(5));
    }

    #[test]
    fn rejects_free_variables() {
        assert_eq!(eval_literal("N + 1"), None);
        assert_eq!(eval_literal("sizeof(float)"), None);
    }

    #[test]
    fn rejects_floats_and_junk() {
        assert_eq!(eval_literal("1.5 + 1"), None);
        assert_eq!(eval_literal("1 + "), None);
        assert_eq!(eval_literal(""), None);
        assert_eq!(eval_literal("(1"), None);
    }

    #[test]
    fn overflow_is_none() {
        assert_eq!(eval_literal("9223372036854775807 + 1"), None);
        assert_eq!(eval_literal("99999999999999999999999999999999999999999"), None);
    }

    #[test]
    fn folded_identity_shapes_evaluate() {
        // The shapes the rewriter leaves behind are still valid input.
        assert_eq!(eval_literal("(8 - (0))"), Some(8));
        assert_eq!(eval_literal("(4) * (2)"), Some(8));
    }
}
