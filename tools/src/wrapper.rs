// Specialized wrapper program generation.
//
// Assembles a self-contained C program for one library function: input
// arrays as literal-initialized declarations, a zero-initialized output
// buffer, then either a direct call or the callee's body inlined and
// constant-folded against the concrete scalar arguments, and finally a
// fixed output-printing loop.
//
// Preconditions (validated by the CLI layer): scalar argument count
//                equals the signature's scalar parameter count; array
//                argument count equals its input-buffer count;
//                output_size is positive.
// Postconditions: given identical inputs the emitted text is
//                 byte-identical across runs.
// Failure modes: a missing or unreadable implementation file downgrades
//                inlining to a direct call; nothing here errors.
// Side effects: reads the library header and implementation files.

use std::fmt::Write as _;
use std::path::Path;

use crate::body;
use crate::fold::{fold, Bindings};
use crate::lexer::{self, Tok};
use crate::signature::{FunctionSignature, ParamKind};

/// Input-array values emitted per source line.
const VALUES_PER_LINE: usize = 10;

/// Generator for one specialization request.
pub struct WrapperGenerator<'a> {
    sig: &'a FunctionSignature,
    header: &'a Path,
    lib_dir: &'a Path,
}

impl<'a> WrapperGenerator<'a> {
    pub fn new(sig: &'a FunctionSignature, header: &'a Path, lib_dir: &'a Path) -> Self {
        WrapperGenerator {
            sig,
            header,
            lib_dir,
        }
    }

    /// Emit the complete wrapper program text.
    pub fn generate(
        &self,
        scalar_args: &[i64],
        array_args: &[Vec<f64>],
        output_size: usize,
        inline: bool,
    ) -> String {
        let inlined = if inline {
            self.inlined_body(scalar_args)
        } else {
            None
        };

        let mut out = String::new();
        self.emit_preamble(&mut out, inlined.is_some());

        let _ = writeln!(out, "int main() {{");
        self.emit_input_arrays(&mut out, array_args);
        let _ = writeln!(out, "    float output[{}] = {{0}};", output_size);
        out.push('\n');

        match inlined {
            Some(inlined_body) => {
                let _ = writeln!(out, "    // Inlined and constant-folded function body");
                for line in inlined_body.lines() {
                    if !line.trim().is_empty() {
                        let _ = writeln!(out, "    {}", line);
                    }
                }
                out.push('\n');
            }
            None => {
                let _ = writeln!(out, "    {};", self.call_expr(scalar_args));
                out.push('\n');
            }
        }

        self.emit_print_loop(&mut out, output_size);
        out.push('\n');
        let _ = writeln!(out, "    return 0;");
        let _ = writeln!(out, "}}");
        out
    }

    // ── Preamble ──

    /// Provenance comments plus includes. The include set tracks the
    /// path actually taken: an inlined program is self-contained, a call
    /// needs the library header.
    fn emit_preamble(&self, out: &mut String, inlined: bool) {
        out.push_str("// Generated by wrapgen (kspec)\n");
        if let Ok(bytes) = std::fs::read(self.header) {
            let _ = writeln!(out, "// header sha256: {}", sha256_hex(&bytes));
        }
        let _ = writeln!(
            out,
            "// signature sha256: {}",
            sha256_hex(self.sig.canonical_json().as_bytes())
        );
        if inlined {
            out.push_str("#include <stdlib.h>\n");
        } else {
            let _ = writeln!(out, "#include \"{}.h\"", self.sig.name);
        }
        out.push_str("#include <stdio.h>\n");
        out.push('\n');
    }

    // ── Input arrays ──

    fn emit_input_arrays(&self, out: &mut String, array_args: &[Vec<f64>]) {
        let mut array_idx = 0;
        for param in &self.sig.params {
            if param.kind != ParamKind::InputBuffer {
                continue;
            }
            let Some(values) = array_args.get(array_idx) else {
                break;
            };
            array_idx += 1;

            let _ = writeln!(out, "    float {}[{}] = {{", param.name, values.len());
            for (chunk_idx, chunk) in values.chunks(VALUES_PER_LINE).enumerate() {
                let rendered: Vec<String> = chunk.iter().map(|v| format!("{:.6}", v)).collect();
                let more = (chunk_idx + 1) * VALUES_PER_LINE < values.len();
                let _ = writeln!(
                    out,
                    "        {}{}",
                    rendered.join(", "),
                    if more { "," } else { "" }
                );
            }
            let _ = writeln!(out, "    }};");
        }
    }

    // ── Call path ──

    /// Direct call with arguments in declared parameter order: scalars as
    /// literals, input buffers by their emitted declaration names, the
    /// output buffer as the synthesized `output`.
    fn call_expr(&self, scalar_args: &[i64]) -> String {
        let mut args = Vec::new();
        let mut scalar_idx = 0;
        for param in &self.sig.params {
            match param.kind {
                ParamKind::OutputBuffer => args.push("output".to_string()),
                ParamKind::InputBuffer => args.push(param.name.clone()),
                ParamKind::Scalar => {
                    if let Some(v) = scalar_args.get(scalar_idx) {
                        args.push(v.to_string());
                    }
                    scalar_idx += 1;
                }
            }
        }
        format!("{}({})", self.sig.name, args.join(", "))
    }

    // ── Inline path ──

    /// Extract, fold and zero-initialize the callee's body. `None` when
    /// the implementation file or the definition cannot be found.
    fn inlined_body(&self, scalar_args: &[i64]) -> Option<String> {
        let impl_path = body::find_impl_file(self.lib_dir, &self.sig.name)?;
        let source = std::fs::read_to_string(&impl_path).ok()?;
        let raw = body::extract_body(&source, &self.sig.name)?;

        let mut bindings = Bindings::new();
        let mut scalar_idx = 0;
        for param in &self.sig.params {
            if param.kind == ParamKind::Scalar {
                if let Some(v) = scalar_args.get(scalar_idx) {
                    bindings.bind(param.name.as_str(), *v);
                }
                scalar_idx += 1;
            }
        }

        let folded = fold(&raw, &bindings);
        Some(zero_init_local_arrays(&folded))
    }

    // ── Output printing ──

    fn emit_print_loop(&self, out: &mut String, output_size: usize) {
        let _ = writeln!(out, "    // Print output");
        let _ = writeln!(out, "    for (int i = 0; i < {}; i++) {{", output_size);
        let _ = writeln!(out, "        printf(\"%f \", output[i]);");
        let _ = writeln!(out, "        if ((i + 1) % 10 == 0) printf(\"\\n\");");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "    printf(\"\\n\");");
    }
}

/// `float name[size];` → `float name[size] = {0};` for every local array
/// declaration. The original heap allocations were zero-initialized, so
/// an inlined local buffer must be as well.
fn zero_init_local_arrays(body_text: &str) -> String {
    let tokens = lexer::lex(body_text);
    let mut edits: Vec<(usize, String)> = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let head = tokens[i].0 == Tok::Ident
            && tokens[i].1.slice(body_text) == "float"
            && tokens[i + 1].0 == Tok::Ident
            && tokens[i + 2].0 == Tok::LBracket;
        if head {
            if let Some(rb) = matching_bracket(&tokens, i + 2) {
                if tokens.get(rb + 1).map(|t| t.0) == Some(Tok::Semi) && rb > i + 3 {
                    edits.push((tokens[rb + 1].1.start, " = {0};".to_string()));
                    i = rb + 2;
                    continue;
                }
            }
        }
        i += 1;
    }

    if edits.is_empty() {
        return body_text.to_string();
    }
    let mut out = String::with_capacity(body_text.len() + edits.len() * 8);
    let mut pos = 0;
    for (semi_start, repl) in edits {
        out.push_str(&body_text[pos..semi_start]);
        out.push_str(&repl);
        pos = semi_start + 1; // consume the original ';'
    }
    out.push_str(&body_text[pos..]);
    out
}

fn matching_bracket(tokens: &[(Tok, lexer::Span)], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, (tok, _)) in tokens.iter().enumerate().skip(open) {
        match tok {
            Tok::LBracket => depth += 1,
            Tok::RBracket => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut s = String::with_capacity(64);
    for b in digest {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── Tests ──
