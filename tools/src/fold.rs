// Constant folder for specialized kernel bodies.
//
// Substitutes bound scalar parameters by their literal values, then
// evaluates fully-literal arithmetic in the two syntactic contexts where
// a fold is always safe: array-size brackets and the right-hand operand
// of a comparison. Everything else is left verbatim; folding is a
// best-effort transform that never fails.
//
// Evaluation goes through `expr::eval_literal`, whose grammar admits only
// integers and `+ - * / ( )`. Substitution and folding are token-level,
// so comments, strings and unrelated identifiers pass through untouched.
//
// Preconditions: bindings hold unique names (one per scalar parameter).
// Postconditions: output is the input with bound names replaced and
//                 foldable subexpressions evaluated; nothing else moves.
// Failure modes: none; unfoldable text survives verbatim.
// Side effects: none.

use crate::expr::eval_literal;
use crate::lexer::{self, Tok};

/// Maximum inside-out folding passes for bracket and comparison contexts.
const MAX_FOLD_PASSES: usize = 4;

/// Scalar parameter bindings for one specialization request.
///
/// Insertion order is substitution order. The first binding for a name
/// wins; later binds of the same name are ignored.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, i64)>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: i64) {
        let name = name.into();
        if self.get(&name).is_none() {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fold constants through `code`: substitute bindings, then evaluate
/// literal arithmetic in size brackets and comparison operands.
pub fn fold(code: &str, bindings: &Bindings) -> String {
    let substituted = substitute(code, bindings);
    let bracketed = fold_bracket_sizes(&substituted);
    fold_comparison_operands(&bracketed)
}

/// Replace every whole-identifier occurrence of a bound name by its
/// literal decimal value.
pub fn substitute(code: &str, bindings: &Bindings) -> String {
    if bindings.is_empty() {
        return code.to_string();
    }
    let tokens = lexer::lex(code);
    let mut out = String::with_capacity(code.len());
    let mut pos = 0;
    for (tok, span) in tokens {
        if tok == Tok::Ident {
            if let Some(value) = bindings.get(span.slice(code)) {
                out.push_str(&code[pos..span.start]);
                out.push_str(&value.to_string());
                pos = span.end;
            }
        }
    }
    out.push_str(&code[pos..]);
    out
}

/// Evaluate the contents of `[ … ]` wherever they form a fully-literal
/// expression. Innermost brackets first; repeated passes catch sizes
/// exposed by an inner fold.
fn fold_bracket_sizes(code: &str) -> String {
    let mut cur = code.to_string();
    for _ in 0..MAX_FOLD_PASSES {
        let tokens = lexer::lex(&cur);
        let mut edits: Vec<(usize, usize, String)> = Vec::new();
        let mut stack: Vec<(usize, bool)> = Vec::new();
        for (i, (tok, _)) in tokens.iter().enumerate() {
            match tok {
                Tok::LBracket => stack.push((i, false)),
                Tok::RBracket => {
                    if let Some((lb, has_nested)) = stack.pop() {
                        if let Some(top) = stack.last_mut() {
                            top.1 = true;
                        }
                        if !has_nested && i > lb + 1 {
                            let start = tokens[lb + 1].1.start;
                            let end = tokens[i - 1].1.end;
                            let slice = &cur[start..end];
                            if let Some(value) = eval_literal(slice) {
                                let repl = value.to_string();
                                if repl != slice {
                                    edits.push((start, end, repl));
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        match apply_edits(&cur, &edits) {
            Some(next) => cur = next,
            None => break,
        }
    }
    cur
}

/// Evaluate the literal expression following `< <= > >=`, when there is
/// one. Only runs that contain an operator are folded; a lone literal is
/// already as simple as it gets.
fn fold_comparison_operands(code: &str) -> String {
    let mut cur = code.to_string();
    for _ in 0..MAX_FOLD_PASSES {
        let tokens = lexer::lex(&cur);
        let mut edits: Vec<(usize, usize, String)> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if !matches!(tokens[i].0, Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge) {
                i += 1;
                continue;
            }
            // Longest balanced arithmetic run after the comparison that
            // ends on a term; a closing paren of the enclosing expression
            // terminates the scan.
            let mut j = i + 1;
            let mut depth = 0i32;
            let mut last_good: Option<usize> = None;
            while j < tokens.len() && is_arith(tokens[j].0) {
                match tokens[j].0 {
                    Tok::LParen => depth += 1,
                    Tok::RParen => {
                        depth -= 1;
                        if depth < 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                if depth == 0 && matches!(tokens[j].0, Tok::Int | Tok::RParen) {
                    last_good = Some(j);
                }
                j += 1;
            }
            if let Some(lg) = last_good {
                let has_op = tokens[i + 1..=lg].iter().any(|(t, _)| {
                    matches!(t, Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash)
                });
                if has_op {
                    let start = tokens[i + 1].1.start;
                    let end = tokens[lg].1.end;
                    let slice = &cur[start..end];
                    if let Some(value) = eval_literal(slice) {
                        let repl = value.to_string();
                        if repl != slice {
                            edits.push((start, end, repl));
                        }
                    }
                }
                i = lg + 1;
            } else {
                i += 1;
            }
        }
        match apply_edits(&cur, &edits) {
            Some(next) => cur = next,
            None => break,
        }
    }
    cur
}

fn is_arith(tok: Tok) -> bool {
    matches!(
        tok,
        Tok::Int | Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::LParen | Tok::RParen
    )
}

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

// ── Tests ──
