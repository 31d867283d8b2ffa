//! ConfigRules command line tool.
//!
//! Compiles rule text into framed containers, decompiles them back to text,
//! and evaluates them against a device description.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config_rules::batch::compile_batch;
use config_rules::container::{pack, unpack, PayloadKind, Unpacked};
use config_rules::{
    find_version, CompiledRules, Compiler, Decompiler, EvalContext, RuleEngine, ToolConfig,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "config-rules")]
#[command(author, version, about = "ConfigRules compiler, decompiler and evaluator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every emitted instruction
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tool configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile rule text into a container
    #[command(alias = "parse")]
    Compile {
        /// Rule source file
        input: PathBuf,

        /// Container file to write
        output: PathBuf,

        /// Encrypt the container with this password
        #[arg(long)]
        key: Option<String>,

        /// Store the rule text without compiling it
        #[arg(long)]
        raw: bool,
    },

    /// Turn a container back into rule text
    Decompile {
        /// Container file
        input: PathBuf,

        /// Rule text file to write
        output: PathBuf,

        /// Password the container was encrypted with
        #[arg(long)]
        key: Option<String>,

        /// Annotate jumps with their target offsets
        #[arg(long)]
        debug: bool,
    },

    /// Run a container against a device context and print the variables as JSON
    Eval {
        /// Container file
        input: PathBuf,

        /// Device context file (YAML)
        #[arg(long)]
        context: PathBuf,

        /// Password the container was encrypted with
        #[arg(long)]
        key: Option<String>,
    },

    /// Compile several rule files into containers in one directory
    Batch {
        /// Rule source files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for the containers
        #[arg(long)]
        out_dir: PathBuf,

        /// Encrypt the containers with this password
        #[arg(long)]
        key: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ToolConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ToolConfig::default(),
    };
    if cli.verbose {
        config.compile.verbose = true;
    }

    match cli.command {
        Commands::Compile {
            input,
            output,
            key,
            raw,
        } => {
            let source = read_text(&input)?;
            let framed = if raw {
                let version = find_version(&source)
                    .with_context(|| format!("{}: no usable version header", input.display()))?;
                pack(
                    source.as_bytes(),
                    PayloadKind::Text,
                    i32::from(version),
                    key.as_deref(),
                    &config.container,
                )?
            } else {
                let rules = Compiler::with_options(config.compile.clone())
                    .compile(&source)
                    .with_context(|| format!("failed to compile {}", input.display()))?;
                pack_rules(&rules, key.as_deref(), &config)?
            };
            write_output(&output, &framed)
        }

        Commands::Decompile {
            input,
            output,
            key,
            debug,
        } => {
            let unpacked = read_container(&input, key.as_deref())?;
            let text = match unpacked.kind {
                PayloadKind::Text => String::from_utf8(unpacked.data)
                    .with_context(|| format!("{}: stored text is not UTF-8", input.display()))?,
                PayloadKind::Compiled => {
                    let mut options = config.decompile.clone();
                    options.debug |= debug;
                    Decompiler::with_options(options)
                        .decompile(&unpacked.data)
                        .with_context(|| format!("failed to decompile {}", input.display()))?
                }
            };
            write_output(&output, text.as_bytes())
        }

        Commands::Eval {
            input,
            context,
            key,
        } => {
            let unpacked = read_container(&input, key.as_deref())?;
            let rules = match unpacked.kind {
                PayloadKind::Compiled => CompiledRules::from_bytes(&unpacked.data)
                    .with_context(|| format!("{}: corrupt bytecode", input.display()))?,
                PayloadKind::Text => {
                    let source = String::from_utf8(unpacked.data)
                        .with_context(|| format!("{}: stored text is not UTF-8", input.display()))?;
                    Compiler::with_options(config.compile.clone())
                        .compile(&source)
                        .with_context(|| format!("failed to compile {}", input.display()))?
                }
            };
            let device = EvalContext::from_yaml_file(&context)
                .with_context(|| format!("failed to load context {}", context.display()))?;
            let engine = RuleEngine::new(rules)?;
            let variables = engine.run(&device)?;
            println!("{}", serde_json::to_string_pretty(&variables)?);
            Ok(())
        }

        Commands::Batch {
            inputs,
            out_dir,
            key,
        } => {
            let mut sources = Vec::with_capacity(inputs.len());
            for input in &inputs {
                sources.push((input.display().to_string(), read_text(input)?));
            }
            let items = compile_batch(&sources, &config.compile, &config.batch)?;

            let mut failed = 0;
            for (input, item) in inputs.iter().zip(items) {
                match item.result {
                    Ok(rules) => {
                        let framed = pack_rules(&rules, key.as_deref(), &config)?;
                        let stem = input
                            .file_stem()
                            .with_context(|| format!("{}: no file name", input.display()))?;
                        let output = out_dir.join(stem).with_extension("bin");
                        write_output(&output, &framed)?;
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", item.name, e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} files failed to compile", failed, inputs.len());
            }
            Ok(())
        }
    }
}

fn pack_rules(rules: &CompiledRules, key: Option<&str>, config: &ToolConfig) -> Result<Vec<u8>> {
    Ok(pack(
        &rules.to_bytes(),
        PayloadKind::Compiled,
        i32::from(rules.rule_version),
        key,
        &config.container,
    )?)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_container(path: &Path, key: Option<&str>) -> Result<Unpacked> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    unpack(&bytes, key).with_context(|| format!("failed to open container {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
