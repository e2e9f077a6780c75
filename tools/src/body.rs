// Function body extraction from generated C implementation files.
//
// Locates `void|int|float <name>(…) {` at the token level and returns the
// text strictly between the opening brace and its balanced match. Braces
// inside comments and string literals are invisible to the scan because
// the lexer never emits them as brace tokens.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns the trimmed body text, or `None` when the
//                 definition is absent or its braces never balance.
// Failure modes: none beyond the `None` outcome; callers fall back to a
//                non-inlined call.
// Side effects: none.

use std::path::{Path, PathBuf};

use crate::lexer::{self, Tok};

/// Extract the body of `name`'s definition from `source`.
pub fn extract_body(source: &str, name: &str) -> Option<String> {
    let tokens = lexer::lex(source);

    let mut i = 0;
    while i + 2 < tokens.len() {
        let is_def_start = tokens[i].0 == Tok::Ident
            && matches!(tokens[i].1.slice(source), "void" | "int" | "float")
            && tokens[i + 1].0 == Tok::Ident
            && tokens[i + 1].1.slice(source) == name
            && tokens[i + 2].0 == Tok::LParen;
        if !is_def_start {
            i += 1;
            continue;
        }

        // Matching ')' of the parameter list, then the opening '{'.
        let Some(close_paren) = matching(&tokens, i + 2, Tok::LParen, Tok::RParen) else {
            i += 1;
            continue;
        };
        let open_brace = close_paren + 1;
        if tokens.get(open_brace).map(|t| t.0) != Some(Tok::LBrace) {
            i += 1;
            continue;
        }

        let close_brace = matching(&tokens, open_brace, Tok::LBrace, Tok::RBrace)?;
        let start = tokens[open_brace].1.end;
        let end = tokens[close_brace].1.start;
        return Some(source[start..end].trim().to_string());
    }

    None
}

/// The `<name>.c` implementation file convention of the generated
/// library layout.
pub fn find_impl_file(lib_dir: &Path, name: &str) -> Option<PathBuf> {
    let path = lib_dir.join(format!("{}.c", name));
    if path.is_file() {
        Some(path)
    } else {
        None
    }
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

// ── Tests ──
