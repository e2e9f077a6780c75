use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

use kspec::data;
use kspec::signature::Registry;
use kspec::wrapper::WrapperGenerator;

#[derive(Parser, Debug)]
#[command(
    name = "wrapgen",
    version,
    about = "Generates a standalone specialized test program for one library kernel function"
)]
struct Cli {
    /// Library function to specialize
    function: String,

    /// Arguments: decimal integers or @file references to JSON array data
    #[arg(required = true)]
    args: Vec<String>,

    /// Number of elements in the synthesized output buffer
    #[arg(long)]
    output_size: usize,

    /// Directory containing the library headers and implementations
    #[arg(long, default_value = ".")]
    lib_dir: PathBuf,

    /// Output C file (default: wrapper_<function>.c)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compile the generated wrapper
    #[arg(long)]
    compile: bool,

    /// Compile and run the wrapper
    #[arg(long)]
    run: bool,

    /// Emit a direct call instead of inlining the specialized body
    #[arg(long)]
    no_inline: bool,

    /// C compiler command
    #[arg(long, default_value = "cc")]
    cc: String,

    /// Print scan and generation detail
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.output_size == 0 {
        eprintln!("wrapgen: error: --output-size must be positive");
        std::process::exit(1);
    }

    // ── Scan the library ──

    let registry = match Registry::scan_lib_dir(&cli.lib_dir) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("wrapgen: error: {}", e);
            std::process::exit(1);
        }
    };
    if registry.is_empty() {
        eprintln!(
            "wrapgen: error: no function prototypes found in {}",
            cli.lib_dir.display()
        );
        std::process::exit(1);
    }
    if cli.verbose {
        eprintln!(
            "wrapgen: {} functions: {}",
            registry.len(),
            registry.names().join(", ")
        );
    }

    let Some((sig, header)) = registry.lookup(&cli.function) else {
        eprintln!("wrapgen: error: function '{}' not found", cli.function);
        eprintln!("wrapgen: available: {}", registry.names().join(", "));
        std::process::exit(1);
    };
    eprintln!("wrapgen: signature: {}", sig);

    // ── Parse positional arguments ──

    let mut scalar_args: Vec<i64> = Vec::new();
    let mut array_args: Vec<Vec<f64>> = Vec::new();
    for arg in &cli.args {
        if let Some(path) = arg.strip_prefix('@') {
            match data::load(std::path::Path::new(path)) {
                Ok(values) => {
                    eprintln!("wrapgen: loaded {} values from {}", values.len(), path);
                    array_args.push(values);
                }
                Err(e) => {
                    eprintln!("wrapgen: error: {}", e);
                    std::process::exit(1);
                }
            }
        } else {
            match arg.parse::<i64>() {
                Ok(v) => scalar_args.push(v),
                Err(_) => {
                    eprintln!("wrapgen: error: invalid numeric argument '{}'", arg);
                    std::process::exit(1);
                }
            }
        }
    }

    // ── Validate argument counts against the signature ──

    let expected_scalars = sig.scalar_count();
    if scalar_args.len() != expected_scalars {
        eprintln!(
            "wrapgen: error: expected {} scalar arguments, got {}",
            expected_scalars,
            scalar_args.len()
        );
        std::process::exit(1);
    }
    let expected_arrays = sig.input_buffer_count();
    if array_args.len() != expected_arrays {
        eprintln!(
            "wrapgen: error: expected {} array arguments, got {}",
            expected_arrays,
            array_args.len()
        );
        std::process::exit(1);
    }

    // ── Generate and write ──

    let generator = WrapperGenerator::new(sig, header, &cli.lib_dir);
    let code = generator.generate(&scalar_args, &array_args, cli.output_size, !cli.no_inline);

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("wrapper_{}.c", cli.function)));
    if let Err(e) = std::fs::write(&out_path, &code) {
        eprintln!("wrapgen: error: {}: {}", out_path.display(), e);
        std::process::exit(1);
    }
    eprintln!("wrapgen: wrote {}", out_path.display());

    if cli.compile || cli.run {
        compile_and_maybe_run(&cli, &out_path);
    }
}

/// Shell out to the external toolchain. The generated source file is kept
/// on failure so it can be inspected.
fn compile_and_maybe_run(cli: &Cli, out_path: &std::path::Path) {
    let exe_path = out_path.with_extension("");

    let mut cmd = Command::new(&cli.cc);
    cmd.arg("-I").arg(&cli.lib_dir).arg(out_path);
    let archive = cli.lib_dir.join("libkernels.a");
    if archive.is_file() {
        cmd.arg(&archive);
    }
    cmd.arg("-o").arg(&exe_path).arg("-lm");

    if cli.verbose {
        eprintln!("wrapgen: compiling: {:?}", cmd);
    }
    match cmd.status() {
        Ok(status) if status.success() => {
            eprintln!("wrapgen: compiled {}", exe_path.display());
        }
        Ok(status) => {
            eprintln!(
                "wrapgen: error: compilation failed (exit {})",
                status.code().unwrap_or(1)
            );
            std::process::exit(status.code().unwrap_or(1));
        }
        Err(e) => {
            eprintln!("wrapgen: error: failed to launch {}: {}", cli.cc, e);
            std::process::exit(1);
        }
    }

    if cli.run {
        // A bare file name is not a search-path lookup.
        let invocation = if exe_path.components().count() == 1 {
            PathBuf::from(".").join(&exe_path)
        } else {
            exe_path.clone()
        };
        eprintln!("wrapgen: running {}", invocation.display());
        match Command::new(&invocation).status() {
            Ok(status) => std::process::exit(status.code().unwrap_or(1)),
            Err(e) => {
                eprintln!("wrapgen: error: failed to run {}: {}", invocation.display(), e);
                std::process::exit(1);
            }
        }
    }
}
