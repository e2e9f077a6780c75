// Function signature parser and library registry.
//
// Extracts kernel function prototypes from C header files by scanning the
// token stream. No C parsing — generated headers declare exactly one flat
// prototype (`void|int|float name(params);`), which maps to simple token
// operations.
//
// Buffer classification is a load-bearing naming convention inherited
// from the generator: a parameter is a buffer iff its declared type ends
// in `*`, and a buffer is the output iff its name contains the
// case-insensitive substring "output". Do not "fix" this; it decides
// which parameter receives the synthesized result buffer.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::lexer::{self, Tok};

// ── Data types ──────────────────────────────────────────────────────────────

/// Declared return kind of a kernel function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnKind {
    Void,
    Int,
    Float,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Void => "void",
            ReturnKind::Int => "int",
            ReturnKind::Float => "float",
        }
    }

    fn from_str(s: &str) -> Option<ReturnKind> {
        match s {
            "void" => Some(ReturnKind::Void),
            "int" => Some(ReturnKind::Int),
            "float" => Some(ReturnKind::Float),
            _ => None,
        }
    }
}

/// How a parameter participates in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Scalar,
    InputBuffer,
    OutputBuffer,
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    /// Declared type text, trimmed (`int`, `float*`, `float *`).
    pub ty: String,
    pub name: String,
    pub kind: ParamKind,
}

/// A parsed function prototype. Parameter order is call-site order and is
/// preserved exactly when re-emitting a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    pub return_kind: ReturnKind,
    pub params: Vec<Parameter>,
}

impl FunctionSignature {
    pub fn scalar_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::Scalar)
            .count()
    }

    pub fn input_buffer_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::InputBuffer)
            .count()
    }

    /// Compact JSON for fingerprinting. Field order is declaration order,
    /// so the rendering is stable.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_kind.as_str(), self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.ty, p.name)?;
        }
        write!(f, ")")
    }
}

// ── Prototype parsing ───────────────────────────────────────────────────────

/// Parse the first recognizable prototype in `decl`.
///
/// Returns `None` when no `void|int|float name(…);` declaration is
/// present; a normal not-found outcome, not an error.
pub fn parse_prototype(decl: &str) -> Option<FunctionSignature> {
    let tokens = lexer::lex(decl);

    let mut i = 0;
    while i + 2 < tokens.len() {
        let ret = if tokens[i].0 == Tok::Ident {
            ReturnKind::from_str(tokens[i].1.slice(decl))
        } else {
            None
        };
        let Some(return_kind) = ret else {
            i += 1;
            continue;
        };
        if tokens[i + 1].0 != Tok::Ident || tokens[i + 2].0 != Tok::LParen {
            i += 1;
            continue;
        }

        // Balanced scan to the matching ')' followed by ';'.
        let Some(close) = matching_delim(&tokens, i + 2, Tok::LParen, Tok::RParen) else {
            i += 1;
            continue;
        };
        if tokens.get(close + 1).map(|t| t.0) != Some(Tok::Semi) {
            i += 1;
            continue;
        }

        let name = tokens[i + 1].1.slice(decl).to_string();
        let params = parse_parameters(decl, &tokens[i + 3..close]);
        return Some(FunctionSignature {
            name,
            return_kind,
            params,
        });
    }

    None
}

/// Index of the delimiter matching `tokens[open]`, or `None`.
fn matching_delim(
    tokens: &[(Tok, lexer::Span)],
    open: usize,
    open_tok: Tok,
    close_tok: Tok,
) -> Option<usize> {
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

/// Split the parameter-list tokens on top-level commas and derive each
/// parameter's (type, name, kind). Parameter lists here are flat; nested
/// function-pointer or array parameters are out of scope.
fn parse_parameters(source: &str, tokens: &[(Tok, lexer::Span)]) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut group_start = 0;

    let mut flush = |start: usize, end: usize, params: &mut Vec<Parameter>| {
        let group = &tokens[start..end];
        if let Some(param) = parse_one_parameter(source, group) {
            params.push(param);
        }
    };

    for (i, (tok, _)) in tokens.iter().enumerate() {
        match tok {
            Tok::LParen | Tok::LBracket => depth += 1,
            Tok::RParen | Tok::RBracket => depth -= 1,
            Tok::Comma if depth == 0 => {
                flush(group_start, i, &mut params);
                group_start = i + 1;
            }
            _ => {}
        }
    }
    flush(group_start, tokens.len(), &mut params);

    params
}

fn parse_one_parameter(source: &str, group: &[(Tok, lexer::Span)]) -> Option<Parameter> {
    if group.is_empty() {
        return None;
    }
    // A single token is either `(void)` or an unnamed parameter; neither
    // declares anything usable.
    if group.len() == 1 {
        return None;
    }

    // The name is the final identifier; everything before it is the type.
    let (name_idx, _) = group
        .iter()
        .enumerate()
        .rev()
        .find(|(_, (tok, _))| *tok == Tok::Ident)?;
    if name_idx == 0 {
        return None;
    }
    let name = group[name_idx].1.slice(source).to_string();
    let ty = source[group[0].1.start..group[name_idx].1.start]
        .trim()
        .to_string();

    let kind = if ty.ends_with('*') {
        if name.to_ascii_lowercase().contains("output") {
            ParamKind::OutputBuffer
        } else {
            ParamKind::InputBuffer
        }
    } else {
        ParamKind::Scalar
    };

    Some(Parameter { ty, name, kind })
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Errors that can occur while scanning a library directory.
#[derive(Debug)]
pub enum RegistryError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    DuplicateFunction {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            RegistryError::DuplicateFunction {
                name,
                first,
                second,
            } => {
                write!(
                    f,
                    "duplicate function '{}': first declared in {}, redeclared in {}",
                    name,
                    first.display(),
                    second.display()
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Function registry populated by scanning `.h` files in a library
/// directory. Each header contributes at most one prototype.
#[derive(Debug)]
pub struct Registry {
    functions: HashMap<String, (FunctionSignature, PathBuf)>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            functions: HashMap::new(),
        }
    }

    /// Scan every `*.h` file directly inside `dir`. Headers without a
    /// recognizable prototype are skipped. Duplicate function names are
    /// an error rather than silent last-wins.
    pub fn scan_lib_dir(dir: &Path) -> Result<Registry, RegistryError> {
        let mut registry = Registry::new();
        let entries = std::fs::read_dir(dir).map_err(|e| RegistryError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut headers: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "h").unwrap_or(false))
            .collect();
        headers.sort();

        for header in headers {
            registry.load_header(&header)?;
        }

        Ok(registry)
    }

    /// Load one header file. Returns whether a prototype was found.
    pub fn load_header(&mut self, path: &Path) -> Result<bool, RegistryError> {
        let source = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let Some(sig) = parse_prototype(&source) else {
            return Ok(false);
        };

        if let Some((_, first_path)) = self.functions.get(&sig.name) {
            return Err(RegistryError::DuplicateFunction {
                name: sig.name.clone(),
                first: first_path.clone(),
                second: path.to_path_buf(),
            });
        }
        self.functions
            .insert(sig.name.clone(), (sig, path.to_path_buf()));
        Ok(true)
    }

    pub fn lookup(&self, name: &str) -> Option<(&FunctionSignature, &Path)> {
        self.functions
            .get(name)
            .map(|(sig, path)| (sig, path.as_path()))
    }

    /// All registered function names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(decl: &str) -> FunctionSignature {
        parse_prototype(decl).expect("prototype not recognized")
    }

    #[test]
    fn simple_prototype() {
        let sig = parse_one("void addone(int N, float* x, float* output);");
        assert_eq!(sig.name, "addone");
        assert_eq!(sig.return_kind, ReturnKind::Void);
        assert_eq!(sig.params.len(), 3);
        assert_eq!(sig.params[0].kind, ParamKind::Scalar);
        assert_eq!(sig.params[0].ty, "int");
        assert_eq!(sig.params[1].kind, ParamKind::InputBuffer);
        assert_eq!(sig.params[1].name, "x");
        assert_eq!(sig.params[2].kind, ParamKind::OutputBuffer);
    }

    #[test]
    fn pointer_without_space() {
        let sig = parse_one("void f(float*x, float*output);");
        assert_eq!(sig.params[0].name, "x");
        assert_eq!(sig.params[0].ty, "float*");
        assert_eq!(sig.params[0].kind, ParamKind::InputBuffer);
        assert_eq!(sig.params[1].kind, ParamKind::OutputBuffer);
    }

    #[test]
    fn star_bound_to_name() {
        let sig = parse_one("void f(float *x);");
        assert_eq!(sig.params[0].name, "x");
        assert_eq!(sig.params[0].ty, "float *");
        assert_eq!(sig.params[0].kind, ParamKind::InputBuffer);
    }

    #[test]
    fn output_detection_is_case_insensitive() {
        let sig = parse_one("void f(float* Output_buf, float* x);");
        assert_eq!(sig.params[0].kind, ParamKind::OutputBuffer);
        assert_eq!(sig.params[1].kind, ParamKind::InputBuffer);
    }

    #[test]
    fn scalar_named_output_stays_scalar() {
        // The convention only classifies pointer parameters.
        let sig = parse_one("void f(int output_size, float* output);");
        assert_eq!(sig.params[0].kind, ParamKind::Scalar);
        assert_eq!(sig.params[1].kind, ParamKind::OutputBuffer);
    }

    #[test]
    fn int_and_float_returns() {
        assert_eq!(parse_one("int count(int N);").return_kind, ReturnKind::Int);
        assert_eq!(
            parse_one("float sum(float* x, int N);").return_kind,
            ReturnKind::Float
        );
    }

    #[test]
    fn prototype_after_preamble() {
        let header = "#ifndef BLUR_H\n#define BLUR_H\n\nvoid blurtwo(int W, int H, float* img, float* output);\n\n#endif\n";
        let sig = parse_one(header);
        assert_eq!(sig.name, "blurtwo");
        assert_eq!(sig.params.len(), 4);
    }

    #[test]
    fn definition_is_not_a_prototype() {
        // A definition opens a brace instead of ending with ';'.
        assert!(parse_prototype("void f(int N) { return; }").is_none());
    }

    #[test]
    fn no_match_returns_none() {
        assert!(parse_prototype("static const int x = 4;").is_none());
        assert!(parse_prototype("").is_none());
    }

    #[test]
    fn void_parameter_list_is_empty() {
        let sig = parse_one("void tick(void);");
        assert!(sig.params.is_empty());
    }

    #[test]
    fn display_roundtrips_shape() {
        let sig = parse_one("void addone(int N, float* x, float* output);");
        assert_eq!(format!("{}", sig), "void addone(int N, float* x, float* output)");
    }

    #[test]
    fn counts() {
        let sig = parse_one("void im2col(int A, int B, float* x, float* w, float* output);");
        assert_eq!(sig.scalar_count(), 2);
        assert_eq!(sig.input_buffer_count(), 2);
    }

    #[test]
    fn canonical_json_is_stable() {
        let sig = parse_one("void f(int N);");
        assert_eq!(sig.canonical_json(), sig.canonical_json());
        assert!(sig.canonical_json().contains("\"name\":\"f\""));
    }

    #[test]
    fn registry_scan_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("addone.h"),
            "void addone(int N, float* x, float* output);\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("scale.h"),
            "void scale(int N, int K, float* x, float* output);\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a header").unwrap();

        let registry = Registry::scan_lib_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["addone", "scale"]);

        let (sig, path) = registry.lookup("addone").unwrap();
        assert_eq!(sig.params.len(), 3);
        assert!(path.ends_with("addone.h"));
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn registry_duplicate_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let proto = "void f(int N, float* x, float* output);\n";
        std::fs::write(dir.path().join("a.h"), proto).unwrap();
        std::fs::write(dir.path().join("b.h"), proto).unwrap();

        let err = Registry::scan_lib_dir(dir.path()).unwrap_err();
        match err {
            RegistryError::DuplicateFunction { name, .. } => assert_eq!(name, "f"),
            other => panic!("expected DuplicateFunction, got: {}", other),
        }
    }

    #[test]
    fn headers_without_prototypes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.h"), "#define VERSION 3\n").unwrap();
        let registry = Registry::scan_lib_dir(dir.path()).unwrap();
        assert!(registry.is_empty());
    }
}
