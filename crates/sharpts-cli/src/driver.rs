//! Pipeline driving and diagnostic rendering.

use std::path::Path;

use colored::Colorize;
use sharpts_common::diagnostics::{Diagnostic, DiagnosticCategory};
use sharpts_common::position::LineMap;

use crate::args::{CliArgs, Command};

/// Run the CLI; returns the process exit code.
pub fn run(args: CliArgs) -> i32 {
    init_tracing();
    let result = match args.command {
        Command::Run { file, args } => run_file(&file, args),
        Command::Compile { file, output } => compile_file(&file, output.as_deref()),
        Command::Check { file } => check_file(&file),
    };
    match result {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("{error:#}");
            1
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("SHARPTS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|error| anyhow::anyhow!("cannot read {}: {error}", path.display()))
}

fn parse_and_check(
    path: &Path,
    source: &str,
) -> anyhow::Result<(sharpts_parser::Program, sharpts_checker::CheckResult)> {
    let program = sharpts_parser::parse_source(source)
        .map_err(|d| anyhow::anyhow!(render_diagnostic(path, source, &d)))?;
    let check = sharpts_checker::check(&program)
        .map_err(|d| anyhow::anyhow!(render_diagnostic(path, source, &d)))?;
    Ok((program, check))
}

fn run_file(path: &Path, argv: Vec<String>) -> anyhow::Result<()> {
    let source = load(path)?;
    let (program, _check) = parse_and_check(path, &source)?;
    tracing::debug!(file = %path.display(), "interpreting");
    let stdout = Box::new(std::io::stdout());
    sharpts_interp::run_program_with_argv(&program, stdout, argv)
        .map_err(|d| anyhow::anyhow!(render_diagnostic(path, &source, &d)))
}

fn compile_file(path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let source = load(path)?;
    let (program, check) = parse_and_check(path, &source)?;
    tracing::debug!(file = %path.display(), "emitting");
    let module = sharpts_emitter::emit_program(&program, &check)
        .map_err(|d| anyhow::anyhow!(render_diagnostic(path, &source, &d)))?;
    let default_output = path.with_extension("il");
    let output = output.unwrap_or(&default_output);
    let paths = sharpts_emitter::write_artifact(&module, output)
        .map_err(|d| anyhow::anyhow!(render_diagnostic(path, &source, &d)))?;
    println!(
        "wrote {} and {}",
        paths.artifact.display(),
        paths.config.display()
    );
    Ok(())
}

fn check_file(path: &Path) -> anyhow::Result<()> {
    let source = load(path)?;
    parse_and_check(path, &source)?;
    println!("{}: no errors", path.display());
    Ok(())
}

/// Render a diagnostic with its source position, colored for humans.
pub fn render_diagnostic(path: &Path, source: &str, diagnostic: &Diagnostic) -> String {
    let location = if diagnostic.span.is_dummy() {
        String::new()
    } else {
        let map = LineMap::build(source);
        let position = map.position(diagnostic.span.start);
        format!(":{}:{}", position.line + 1, position.column + 1)
    };
    let label = match diagnostic.category {
        DiagnosticCategory::Runtime => "runtime error".red().bold(),
        _ => format!("error TS{}", diagnostic.code).red().bold(),
    };
    format!(
        "{}{} - {}: {}",
        path.display().to_string().cyan(),
        location.cyan(),
        label,
        diagnostic.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Command;
    use std::io::Write;

    fn write_source(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create source");
        file.write_all(text.as_bytes()).expect("write source");
        path
    }

    #[test]
    fn run_succeeds_on_well_typed_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_source(&dir, "ok.ts", "console.log(1 + 1);");
        let code = run(CliArgs {
            command: Command::Run {
                file: path,
                args: Vec::new(),
            },
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn run_fails_on_type_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_source(&dir, "bad.ts", "let x: number = \"hi\";");
        let code = run(CliArgs {
            command: Command::Run {
                file: path,
                args: Vec::new(),
            },
        });
        assert_ne!(code, 0);
    }

    #[test]
    fn compile_writes_artifact_and_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_source(&dir, "prog.ts", "console.log(42);");
        let output = dir.path().join("prog.il");
        let code = run(CliArgs {
            command: Command::Compile {
                file: path,
                output: Some(output.clone()),
            },
        });
        assert_eq!(code, 0);
        assert!(output.exists());
        assert!(dir.path().join("prog.runtimeconfig.json").exists());
    }

    #[test]
    fn check_reports_parse_errors_with_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_source(&dir, "syntax.ts", "let x = 1__0;");
        let code = run(CliArgs {
            command: Command::Check { file: path },
        });
        assert_ne!(code, 0);
    }
}
