use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use rustscript::{EngineConfig, ExecutionContext, ScriptEngine};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Compile and run Rust source through the system rustc")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and invoke its entry point
    Eval {
        /// Script file to run; standard input is read when neither this
        /// nor --source is given
        file: Option<PathBuf>,
        /// Inline source text instead of a file
        #[arg(short = 's', long)]
        source: Option<String>,
        /// Search roots for compiled artifacts (path-separator separated)
        #[arg(long)]
        classpath: Option<String>,
        /// Search roots for auxiliary dependencies
        #[arg(long)]
        sourcepath: Option<String>,
        /// Explicit entry-unit name
        #[arg(long)]
        main_unit: Option<String>,
        /// Allow invoking units that declare themselves internal
        #[arg(long)]
        trust_internal: bool,
        /// Arguments handed to the entry point
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Compile a script and report the resolved entry unit
    Check {
        /// Script file to compile
        file: PathBuf,
        #[arg(long)]
        classpath: Option<String>,
        #[arg(long)]
        sourcepath: Option<String>,
    },
    /// Print engine metadata as JSON
    Info,
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Commands::Eval {
            file,
            source,
            classpath,
            sourcepath,
            main_unit,
            trust_internal,
            args,
        } => {
            let engine = ScriptEngine::with_config(EngineConfig {
                trust_internal_units: trust_internal,
                ..EngineConfig::default()
            })?;
            let (source_name, source_text) = read_source(file, source)?;
            let mut context = ExecutionContext::new();
            context.source_name = source_name;
            context.classpath = classpath;
            context.source_path = sourcepath;
            context.main_unit = main_unit;
            context.arguments = args;
            match engine.evaluate(&source_text, &mut context)? {
                Some(unit) => log::debug!("executed unit '{}'", unit.name()),
                None => eprintln!("nothing to execute: no unit with an entry point"),
            }
            Ok(())
        }
        Commands::Check {
            file,
            classpath,
            sourcepath,
        } => {
            let engine = ScriptEngine::new()?;
            let source_text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut context = ExecutionContext::new();
            context.source_name = Some(file.display().to_string());
            context.classpath = classpath;
            context.source_path = sourcepath;
            let program = engine.compile_with(&source_text, &mut context)?;
            println!("entry unit: {}", program.unit().name());
            Ok(())
        }
        Commands::Info => {
            let engine = ScriptEngine::new()?;
            println!("{}", serde_json::to_string_pretty(&engine.metadata())?);
            Ok(())
        }
    }
}

fn read_source(file: Option<PathBuf>, source: Option<String>) -> Result<(Option<String>, String)> {
    match (file, source) {
        (Some(_), Some(_)) => Err(anyhow!("pass a file or --source, not both")),
        (Some(path), None) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok((Some(path.display().to_string()), text))
        }
        (None, Some(text)) => Ok((None, text)),
        (None, None) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading standard input")?;
            Ok((None, text))
        }
    }
}
