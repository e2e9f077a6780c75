use clap::Parser;
use std::path::{Path, PathBuf};

use kspec::rewrite::{rewrite_allocations, RewriteStats};

/// File-name marker carried by generated output files so directory mode
/// never reprocesses its own results.
const OUTPUT_MARKER: &str = ".stack";

#[derive(Parser, Debug)]
#[command(
    name = "stackify",
    version,
    about = "Rewrites heap-allocated scratch buffers in generated kernel C sources into fixed-size stack arrays"
)]
struct Cli {
    /// Input .c file or directory
    input: PathBuf,

    /// Output file (single-file mode; default: <input>.stack.c)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rewrite files in place
    #[arg(short = 'i', long)]
    in_place: bool,

    /// Recurse into subdirectories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Print per-file rewrite detail
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if !cli.input.exists() {
        eprintln!("stackify: error: {}: no such file or directory", cli.input.display());
        std::process::exit(1);
    }

    if cli.input.is_file() {
        match process_file(&cli.input, cli.output.as_deref(), cli.in_place, cli.verbose) {
            Ok(_) => {}
            Err(e) => {
                eprintln!("stackify: error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Directory mode ──

    let mut files = Vec::new();
    if let Err(e) = collect_c_files(&cli.input, cli.recursive, &mut files) {
        eprintln!("stackify: error: {}: {}", cli.input.display(), e);
        std::process::exit(1);
    }
    files.retain(|f| !is_generated_output(f));
    files.sort();

    if files.is_empty() {
        eprintln!("stackify: no .c files found in {}", cli.input.display());
        std::process::exit(1);
    }

    eprintln!("stackify: found {} C files", files.len());

    let mut processed = 0usize;
    let mut total = RewriteStats::default();
    for file in &files {
        // One bad file must not stop the batch.
        match process_file(file, None, cli.in_place, cli.verbose) {
            Ok(stats) => {
                processed += 1;
                total.callocs_replaced += stats.callocs_replaced;
                total.frees_removed += stats.frees_removed;
                total.simplifications += stats.simplifications;
            }
            Err(e) => {
                eprintln!("stackify: error: {}: {}", file.display(), e);
            }
        }
    }

    eprintln!(
        "stackify: {} files processed, {} callocs replaced, {} frees removed, {} sizes simplified",
        processed, total.callocs_replaced, total.frees_removed, total.simplifications
    );
}

/// Transform one file and write the result. The output is written only
/// after the whole in-memory transform succeeds.
fn process_file(
    input: &Path,
    output: Option<&Path>,
    in_place: bool,
    verbose: bool,
) -> std::io::Result<RewriteStats> {
    let source = std::fs::read_to_string(input)?;
    let outcome = rewrite_allocations(&source);

    let out_path: PathBuf = match (output, in_place) {
        (Some(path), _) => path.to_path_buf(),
        (None, true) => input.to_path_buf(),
        (None, false) => input.with_extension("stack.c"),
    };
    std::fs::write(&out_path, &outcome.code)?;

    eprintln!("stackify: {}", input.display());
    let stats = &outcome.stats;
    if verbose || stats.callocs_replaced > 0 || stats.frees_removed > 0 {
        eprintln!(
            "stackify:   replaced {} callocs, removed {} frees, simplified {} sizes",
            stats.callocs_replaced, stats.frees_removed, stats.simplifications
        );
    }
    for warning in &stats.warnings {
        eprintln!("stackify:   warning: {}", warning);
    }
    if out_path != input {
        eprintln!("stackify:   wrote {}", out_path.display());
    } else {
        eprintln!("stackify:   rewritten in place");
    }

    Ok(outcome.stats)
}

/// True for files this tool previously generated (`foo.stack.c`).
fn is_generated_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with(OUTPUT_MARKER))
        .unwrap_or(false)
}

fn collect_c_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_c_files(&path, recursive, out)?;
            }
        } else if path.extension().map(|x| x == "c").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}
