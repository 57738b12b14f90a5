//! Droe Compiler CLI
//!
//! Command-line interface for compiling .droe programs to bytecode
//! artifacts, running them on the embedded VM, and producing standalone
//! executables with the artifact appended.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use droe_core::{embedded, Artifact};
use droe_runtime::{ExitStatus, StdHost, Vm};
use droec::{compile_file, CompileOutput, CompilerConfig, GeneratedOutput};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "droec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Droe compiler - compile and run .droe programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .droe file to a bytecode artifact (or another target)
    Compile {
        /// Input .droe source file
        source: PathBuf,

        /// Target back end (defaults to the program's @target, then bytecode)
        #[arg(long)]
        target: Option<String>,

        /// Output path (defaults to the input with the target's extension)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compile if needed, then execute on the embedded VM
    Run {
        /// A .droe source file or a compiled .drbc artifact
        input: PathBuf,
    },

    /// Produce a standalone executable with the artifact appended
    Build {
        /// Input .droe source file
        source: PathBuf,

        /// Build the embedded artifact in release form
        #[arg(long)]
        release: bool,

        /// Output executable path (defaults to the input stem)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    init_tracing();

    // A standalone build carries its program inside the executable; run
    // it directly, regardless of argv.
    if let Some(artifact) = load_embedded_artifact() {
        process::exit(run_artifact(artifact));
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            source,
            target,
            out,
        } => run_compile(&source, target.as_deref(), out.as_deref()),
        Commands::Run { input } => run_input(&input),
        Commands::Build {
            source,
            release,
            out,
        } => run_build(&source, release, out.as_deref()),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "droec", &mut io::stdout());
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("DROE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_embedded_artifact() -> Option<Artifact> {
    let exe = std::env::current_exe().ok()?;
    let bytes = std::fs::read(exe).ok()?;
    let payload = embedded::extract_artifact(&bytes)?;
    match Artifact::from_bytes(payload) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            eprintln!("Error: embedded program is unreadable: {}", e);
            process::exit(2);
        }
    }
}

/// Exit codes: 0 success, 1 compile error, 2 I/O error.
fn compile_with_exit(source: &Path, target: Option<&str>) -> CompileOutput {
    if !source.exists() {
        eprintln!("Error: {} does not exist", source.display());
        process::exit(2);
    }
    let mut config = CompilerConfig::new();
    if let Some(target) = target {
        config = config.with_target(target);
    }
    match compile_file(source, &config) {
        Ok(output) => {
            eprint!("{}", droec::format_diagnostics(&output.warnings, &output.sources));
            output
        }
        Err(e) => {
            eprint!("{}", e.render());
            process::exit(1);
        }
    }
}

fn run_compile(source: &Path, target: Option<&str>, out: Option<&Path>) {
    let output = compile_with_exit(source, target);
    match output.output {
        GeneratedOutput::Artifact(artifact) => {
            let out_path = out
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.with_extension("drbc"));
            if let Err(e) = artifact.write_file(&out_path) {
                eprintln!("Error writing {}: {}", out_path.display(), e);
                process::exit(2);
            }
            println!("Compiled {} -> {}", source.display(), out_path.display());
        }
        GeneratedOutput::Text(text) => {
            let out_path = out
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.with_extension("out"));
            if let Err(e) = std::fs::write(&out_path, text) {
                eprintln!("Error writing {}: {}", out_path.display(), e);
                process::exit(2);
            }
            println!("Generated {} -> {}", source.display(), out_path.display());
        }
    }
}

fn run_input(input: &Path) {
    let artifact = if input.extension().is_some_and(|e| e == "drbc") {
        match Artifact::read_file(input) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("Error reading {}: {}", input.display(), e);
                process::exit(2);
            }
        }
    } else {
        match compile_with_exit(input, None).output {
            GeneratedOutput::Artifact(a) => a,
            GeneratedOutput::Text(_) => {
                eprintln!("Error: target produces text, nothing to run");
                process::exit(1);
            }
        }
    };
    process::exit(run_artifact(artifact));
}

fn run_artifact(artifact: Artifact) -> i32 {
    let mut vm = Vm::new(artifact);
    let mut host = StdHost::new();
    match vm.init(&mut host) {
        Ok(ExitStatus::Halted) => 0,
        Ok(ExitStatus::Cancelled) => 0,
        Err(_) => 1,
    }
}

/// Copy the current executable and append the compiled artifact between
/// the framing markers, producing a standalone binary.
fn run_build(source: &Path, _release: bool, out: Option<&Path>) {
    let output = compile_with_exit(source, None);
    let artifact = match output.output {
        GeneratedOutput::Artifact(a) => a,
        GeneratedOutput::Text(_) => {
            eprintln!("Error: only the bytecode target can build executables");
            process::exit(1);
        }
    };
    let artifact_bytes = match artifact.to_bytes() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error encoding artifact: {}", e);
            process::exit(2);
        }
    };

    let exe = match std::env::current_exe().and_then(|p| std::fs::read(p)) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading host executable: {}", e);
            process::exit(2);
        }
    };
    let combined = embedded::embed_artifact(&exe, &artifact_bytes);

    let out_path = out.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(source.file_stem().unwrap_or_default())
    });
    if let Err(e) = std::fs::write(&out_path, combined) {
        eprintln!("Error writing {}: {}", out_path.display(), e);
        process::exit(2);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(0o755))
        {
            eprintln!("Warning: could not set permissions on {}: {}", out_path.display(), e);
        }
    }
    println!("Built {} -> {}", source.display(), out_path.display());
}
