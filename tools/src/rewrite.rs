// Heap-to-stack allocation rewriting for generated kernel C files.
//
// Generated kernels allocate scratch buffers with
// `float *name = calloc(size, sizeof(float));` and release them with
// `free(name);`. This pass turns each allocation into a fixed-size stack
// array declaration with a simplified size expression, neutralizes every
// `free` call into a comment, re-simplifies all existing array-size
// declarations, and finishes with a whole-file identity-elimination
// sweep. The transform runs fully in memory; callers persist the result
// only after the whole file succeeds.
//
// Preconditions: input is valid UTF-8 C source.
// Postconditions: no `free(name);` survives as executable code; every
//                 rewritten buffer has exactly one declaration.
// Failure modes: none; unrecognized text passes through verbatim.
// Side effects: none (diagnostics are returned, not printed).

use crate::expr::{simplify, simplify_code};
use crate::lexer::{self, Tok};

/// Counters and warnings for one rewritten file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub callocs_replaced: usize,
    pub frees_removed: usize,
    pub simplifications: usize,
    /// Size expressions the simplifier could not fully flatten.
    /// Informational; the transform still succeeds.
    pub warnings: Vec<String>,
}

/// Result of rewriting one file's text.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub code: String,
    pub stats: RewriteStats,
}

/// Rewrite every heap scratch allocation in `source` to a fixed-size
/// stack declaration.
pub fn rewrite_allocations(source: &str) -> RewriteOutcome {
    let mut stats = RewriteStats::default();

    let code = replace_callocs(source, &mut stats);
    let code = neutralize_frees(&code, &mut stats);
    let code = simplify_declared_sizes(&code, &mut stats);
    let code = simplify_code(&code);
    collect_size_warnings(&code, &mut stats);

    RewriteOutcome { code, stats }
}

/// `float *name = calloc(size, sizeof(float));` → `float name[size'];`
fn replace_callocs(source: &str, stats: &mut RewriteStats) -> String {
    let tokens = lexer::lex(source);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut i = 0;

    while i + 5 < tokens.len() {
        let head_matches = tokens[i].0 == Tok::Ident
            && tokens[i].1.slice(source) == "float"
            && tokens[i + 1].0 == Tok::Star
            && tokens[i + 2].0 == Tok::Ident
            && tokens[i + 3].0 == Tok::Eq
            && tokens[i + 4].0 == Tok::Ident
            && tokens[i + 4].1.slice(source) == "calloc"
            && tokens[i + 5].0 == Tok::LParen;
        if !head_matches {
            i += 1;
            continue;
        }

        let Some(close) = matching_paren(&tokens, i + 5) else {
            i += 1;
            continue;
        };
        let Some(comma) = top_level_comma(&tokens, i + 6, close) else {
            i += 1;
            continue;
        };

        // Second argument must be exactly `sizeof(float)`, and the
        // statement must end right after the call.
        let elem = &tokens[comma + 1..close];
        let elem_ok = elem.len() == 4
            && elem[0].0 == Tok::Ident
            && elem[0].1.slice(source) == "sizeof"
            && elem[1].0 == Tok::LParen
            && elem[2].0 == Tok::Ident
            && elem[2].1.slice(source) == "float"
            && elem[3].0 == Tok::RParen;
        let tail_ok = tokens.get(close + 1).map(|t| t.0) == Some(Tok::Semi);
        if !elem_ok || !tail_ok || comma <= i + 6 {
            i += 1;
            continue;
        }

        let name = tokens[i + 2].1.slice(source);
        let size = &source[tokens[i + 6].1.start..tokens[comma - 1].1.end];
        let simplified = simplify(size);
        if simplified != size.trim() {
            stats.simplifications += 1;
        }
        stats.callocs_replaced += 1;

        edits.push((
            tokens[i].1.start,
            tokens[close + 1].1.end,
            format!("float {}[{}];", name, simplified),
        ));
        i = close + 2;
    }

    apply_edits(source, &edits)
}

/// `free(name);` → a comment. A stack buffer must never reach a
/// deallocator, so every free site in the file is neutralized.
fn neutralize_frees(source: &str, stats: &mut RewriteStats) -> String {
    let tokens = lexer::lex(source);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut i = 0;

    while i + 4 < tokens.len() {
        let matched = tokens[i].0 == Tok::Ident
            && tokens[i].1.slice(source) == "free"
            && tokens[i + 1].0 == Tok::LParen
            && tokens[i + 2].0 == Tok::Ident
            && tokens[i + 3].0 == Tok::RParen
            && tokens[i + 4].0 == Tok::Semi;
        if matched {
            let name = tokens[i + 2].1.slice(source);
            stats.frees_removed += 1;
            edits.push((
                tokens[i].1.start,
                tokens[i + 4].1.end,
                format!("// {} released on scope exit", name),
            ));
            i += 5;
        } else {
            i += 1;
        }
    }

    apply_edits(source, &edits)
}

/// Re-simplify the size of every `float name[size];` declaration,
/// including declarations produced moments ago by `replace_callocs`.
fn simplify_declared_sizes(source: &str, stats: &mut RewriteStats) -> String {
    let tokens = lexer::lex(source);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for (_, lb, rb) in array_decls(source, &tokens) {
        let start = tokens[lb + 1].1.start;
        let end = tokens[rb - 1].1.end;
        let size = &source[start..end];
        let simplified = simplify(size);
        if simplified != size {
            stats.simplifications += 1;
            edits.push((start, end, simplified));
        }
    }

    apply_edits(source, &edits)
}

/// Warn about any surviving declaration size still carrying nested
/// grouping, a sign the simplifier could not fully reduce it.
fn collect_size_warnings(source: &str, stats: &mut RewriteStats) {
    let tokens = lexer::lex(source);
    for (i, lb, rb) in array_decls(source, &tokens) {
        let parens = tokens[lb + 1..rb]
            .iter()
            .filter(|(t, _)| *t == Tok::LParen)
            .count();
        if parens > 1 {
            let name = tokens[i + 1].1.slice(source);
            let size = &source[tokens[lb + 1].1.start..tokens[rb - 1].1.end];
            stats
                .warnings
                .push(format!("complex size expression for {}: {}", name, size));
        }
    }
}

/// Occurrences of `float name[size];` (no initializer). Yields the index
/// of the `float` token and of the bracket pair.
fn array_decls(source: &str, tokens: &[(Tok, lexer::Span)]) -> Vec<(usize, usize, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let head = tokens[i].0 == Tok::Ident
            && tokens[i].1.slice(source) == "float"
            && tokens[i + 1].0 == Tok::Ident
            && tokens[i + 2].0 == Tok::LBracket;
        if head {
            if let Some(rb) = matching_bracket(tokens, i + 2) {
                let closed = tokens.get(rb + 1).map(|t| t.0) == Some(Tok::Semi);
                if closed && rb > i + 3 {
                    found.push((i, i + 2, rb));
                    i = rb + 2;
                    continue;
                }
            }
        }
        i += 1;
    }
    found
}

fn matching_paren(tokens: &[(Tok, lexer::Span)], open: usize) -> Option<usize> {
    matching(tokens, open, Tok::LParen, Tok::RParen)
}

fn matching_bracket(tokens: &[(Tok, lexer::Span)], open: usize) -> Option<usize> {
    matching(tokens, open, Tok::LBracket, Tok::RBracket)
}

fn matching(tokens: &[(Tok, lexer::Span)], open: usize, open_tok: Tok, close_tok: Tok) -> Option<usize> {
    let mut depth = 0i32;
    for (i, (tok, _)) in tokens.iter().enumerate().skip(open) {
        if *tok == open_tok {
            depth += 1;
        } else if *tok == close_tok {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// First comma at calloc-argument depth within `(start..close)`.
fn top_level_comma(tokens: &[(Tok, lexer::Span)], start: usize, close: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, (tok, _)) in tokens.iter().enumerate().take(close).skip(start) {
        match tok {
            Tok::LParen | Tok::LBracket => depth += 1,
            Tok::RParen | Tok::RBracket => depth -= 1,
            Tok::Comma if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn apply_edits(source: &str, edits: &[(usize, usize, String)]) -> String {
    if edits.is_empty() {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (start, end, repl) in edits {
        out.push_str(&source[pos..*start]);
        out.push_str(repl);
        pos = *end;
    }
    out.push_str(&source[pos..]);
    out
}

// ── Tests ──
