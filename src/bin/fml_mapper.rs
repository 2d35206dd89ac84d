//! FML Mapper CLI
//!
//! Loads a definitions directory, answers type-environment queries and
//! compiles editor snapshots into FML.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use fml_mapper::{
    generate_template, generate_template_with_environment, load_from_directory, MapperConfig,
    TemplateSnapshot, TypeEnvironment,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fml-mapper")]
#[command(about = "Query FHIR types and compile mapping graphs to FML")]
struct Cli {
    /// Config file (defaults to fml-mapper.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Definitions directory (overrides the configured path)
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the definitions and report diagnostics
    Check,

    /// Compile a graph snapshot (JSON) into FML
    Compile {
        /// Snapshot file
        snapshot: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip checking edge handles against the definitions
        #[arg(long)]
        no_types: bool,
    },

    /// List the ancestors of a type, root first
    Ancestors { type_name: String },

    /// List the concrete descendants of a type
    Implementations { type_name: String },

    /// Complete a dotted property chain
    Complete {
        /// Root type name or url
        root: String,
        /// Partial chain, e.g. `contact.na`
        #[arg(default_value = "")]
        partial: String,
    },

    /// List the value-set options of a bound field
    Options {
        root: String,
        /// Dotted path to the field
        path: String,
    },

    /// Fuzzy-search type names
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref().and_then(Path::to_str);
    let config = MapperConfig::load_from(config_path).context("failed to load configuration")?;
    let schema_dir = cli.schemas.clone().unwrap_or_else(|| config.schema_path());

    match cli.command {
        Commands::Check => {
            let bundle = load_from_directory(&schema_dir, &config.schemas.load_config())?;
            println!(
                "{} types, {} value sets (bundle {})",
                bundle.types.len(),
                bundle.value_sets.len(),
                bundle.bundle_hash
            );
            if !bundle.diagnostics.is_empty() {
                print!("{}", bundle.diagnostics.format_all());
            }
            if bundle.diagnostics.has_errors() {
                std::process::exit(1);
            }
            bundle.into_environment()?;
            Ok(())
        }

        Commands::Compile {
            snapshot,
            output,
            no_types,
        } => {
            let text = std::fs::read_to_string(&snapshot)
                .with_context(|| format!("failed to read {}", snapshot.display()))?;
            let snapshot = TemplateSnapshot::from_json(&text)?;

            let fml = if no_types {
                generate_template(&snapshot, &config.template)?
            } else {
                let env = load_environment(&schema_dir, &config)?;
                generate_template_with_environment(&snapshot, &config.template, &env)?
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &fml)?;
                    info!(path = %path.display(), "wrote map");
                }
                None => print!("{}", fml),
            }
            Ok(())
        }

        Commands::Ancestors { type_name } => {
            let env = load_environment(&schema_dir, &config)?;
            require_type(&env, &type_name)?;
            for resource in env.ancestors(&type_name) {
                println!("{}\t{}", resource.name, resource.url);
            }
            Ok(())
        }

        Commands::Implementations { type_name } => {
            let env = load_environment(&schema_dir, &config)?;
            require_type(&env, &type_name)?;
            for resource in env.implementations(&type_name) {
                println!("{}\t{}", resource.name, resource.url);
            }
            Ok(())
        }

        Commands::Complete { root, partial } => {
            let env = load_environment(&schema_dir, &config)?;
            for completion in env.complete(&root, &partial) {
                println!(
                    "{}\t{}\t{}..{}",
                    completion.name, completion.detail, completion.min, completion.max
                );
            }
            Ok(())
        }

        Commands::Options { root, path } => {
            let env = load_environment(&schema_dir, &config)?;
            let field = env
                .resolve_path(&root, &path)
                .ok_or_else(|| anyhow!("no field {} on {}", path, root))?;
            for option in env.options_for(field) {
                match &option.display {
                    Some(display) => println!("{}\t{}", option.code, display),
                    None => println!("{}", option.code),
                }
            }
            Ok(())
        }

        Commands::Search { query, limit } => {
            let env = load_environment(&schema_dir, &config)?;
            for hit in env.search(&query, limit) {
                println!("{}\t{}\t{}", hit.score, hit.name, hit.url);
            }
            Ok(())
        }

        Commands::Config { write } => {
            match write {
                Some(path) => {
                    let path = path
                        .to_str()
                        .ok_or_else(|| anyhow!("config path is not valid UTF-8"))?;
                    config.save(path)?;
                    println!("Wrote {}", path);
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}

fn load_environment(schema_dir: &Path, config: &MapperConfig) -> anyhow::Result<TypeEnvironment> {
    let bundle = load_from_directory(schema_dir, &config.schemas.load_config())?;
    for item in bundle.diagnostics.errors() {
        tracing::warn!("{}", item);
    }
    info!(
        types = bundle.types.len(),
        value_sets = bundle.value_sets.len(),
        hash = %bundle.bundle_hash,
        "definitions loaded"
    );
    Ok(bundle.into_environment()?)
}

fn require_type(env: &TypeEnvironment, identifier: &str) -> anyhow::Result<()> {
    if env.get_type(identifier).is_none() {
        bail!("unknown type '{}'", identifier);
    }
    Ok(())
}
