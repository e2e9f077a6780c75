// Snapshot tests: lock the emitted wrapper program text.
//
// Uses the library API against a scratch library directory and snapshots
// the generated program with `insta`. The two provenance hash lines
// depend on scratch-file paths' contents only, but are filtered out so
// the snapshots pin just the program shape.
//
// Run `cargo insta review` after intentional output changes.

use std::path::PathBuf;

use kspec::signature::parse_prototype;
use kspec::wrapper::WrapperGenerator;

const ADDONE_H: &str = "void addone(int N, float* x, float* output);\n";
const ADDONE_C: &str = "\
#include \"addone.h\"

void addone(int N, float* x, float* output) {
  float tmp[N];
  for (int i = 0; i < N; i++) {
    tmp[i] = x[i];
    output[i] = tmp[i] + 1.0;
  }
}
";

fn lib_dir(with_impl: bool) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let header = dir.path().join("addone.h");
    std::fs::write(&header, ADDONE_H).unwrap();
    if with_impl {
        std::fs::write(dir.path().join("addone.c"), ADDONE_C).unwrap();
    }
    (dir, header)
}

/// Drop the provenance hash lines; everything else is snapshotted.
fn without_hashes(code: &str) -> String {
    code.lines()
        .filter(|line| {
            !line.starts_with("// header sha256:") && !line.starts_with("// signature sha256:")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn call_wrapper_snapshot() {
    let sig = parse_prototype(ADDONE_H).unwrap();
    let (dir, header) = lib_dir(false);
    let gen = WrapperGenerator::new(&sig, &header, dir.path());
    let code = gen.generate(&[4], &[vec![1.0, 2.0, 3.0, 4.0]], 4, false);

    insta::assert_snapshot!(without_hashes(&code), @r###"
    // Generated by wrapgen (kspec)
    #include "addone.h"
    #include <stdio.h>

    int main() {
        float x[4] = {
            1.000000, 2.000000, 3.000000, 4.000000
        };
        float output[4] = {0};

        addone(4, x, output);

        // Print output
        for (int i = 0; i < 4; i++) {
            printf("%f ", output[i]);
            if ((i + 1) % 10 == 0) printf("\n");
        }
        printf("\n");

        return 0;
    }
    "###);
}

#[test]
fn inlined_wrapper_snapshot() {
    let sig = parse_prototype(ADDONE_H).unwrap();
    let (dir, header) = lib_dir(true);
    let gen = WrapperGenerator::new(&sig, &header, dir.path());
    let code = gen.generate(&[4], &[vec![1.0, 2.0, 3.0, 4.0]], 4, true);

    insta::assert_snapshot!(without_hashes(&code), @r###"
    // Generated by wrapgen (kspec)
    #include <stdlib.h>
    #include <stdio.h>

    int main() {
        float x[4] = {
            1.000000, 2.000000, 3.000000, 4.000000
        };
        float output[4] = {0};

        // Inlined and constant-folded function body
        float tmp[4] = {0};
          for (int i = 0; i < 4; i++) {
            tmp[i] = x[i];
            output[i] = tmp[i] + 1.0;
          }

        // Print output
        for (int i = 0; i < 4; i++) {
            printf("%f ", output[i]);
            if ((i + 1) % 10 == 0) printf("\n");
        }
        printf("\n");

        return 0;
    }
    "###);
}
