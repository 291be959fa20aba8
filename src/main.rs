//! modbridge: compose module schemas and call module functions.
//!
//! ## Example Usage
//!
//! ```bash
//! # Print the merged schema of every module in a fixture
//! modbridge compose tests/fixtures/greeter.json
//!
//! # Print the introspection result instead
//! modbridge introspect tests/fixtures/greeter.json
//!
//! # Call Greeter.hello through the composed schema
//! modbridge call tests/fixtures/greeter.json --object Greeter --function hello --arg name=world
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use modbridge::{parse_arg, Fixture};
use modbridge_core::{Context, EngineConfig, Selection, Session};
use modbridge_types::gql_field_name;

#[derive(Parser)]
#[command(
    name = "modbridge",
    author,
    version,
    about = "Compose module schemas and call module functions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged schema (SDL) of every module in a fixture
    Compose {
        fixture: PathBuf,
    },

    /// Print the introspection JSON of the merged schema
    Introspect {
        fixture: PathBuf,
    },

    /// Construct an object and call one of its functions
    Call(CallCmd),
}

#[derive(clap::Args)]
struct CallCmd {
    fixture: PathBuf,

    /// Object to construct, by its schema name (e.g. Greeter)
    #[arg(long)]
    object: String,

    /// Function or field to resolve on the object
    #[arg(long)]
    function: String,

    /// Function argument as key=value; JSON values are parsed as JSON
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    args: Vec<String>,

    /// Print engine metrics to stderr after the call
    #[arg(long)]
    metrics: bool,
}

impl CallCmd {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let deps = Fixture::from_path(&self.fixture)?.load(ctx)?;
        let schema = deps.schema(ctx).await?;

        let mut selection = Selection::new(gql_field_name(&self.function));
        for arg in &self.args {
            let (name, value) = parse_arg(arg)?;
            selection = selection.arg(name, value);
        }
        let path = [Selection::new(gql_field_name(&self.object)), selection];

        let value = schema
            .resolve_path(ctx, &path)
            .await
            .with_context(|| format!("failed to call {}.{}", self.object, self.function))?;
        println!("{}", serde_json::to_string_pretty(&value.to_json()?)?);

        if self.metrics {
            let snapshot = ctx.session().metrics().snapshot();
            eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command, verbose } = Cli::parse();
    init_tracing(verbose);

    let config = EngineConfig::from_env();
    info!(?config, "starting session");
    let ctx = Context::new(Session::new(config));

    match command {
        Commands::Compose { fixture } => {
            let deps = Fixture::from_path(&fixture)?.load(&ctx)?;
            let schema = deps.schema(&ctx).await?;
            print!("{}", schema.sdl());
            Ok(())
        }
        Commands::Introspect { fixture } => {
            let deps = Fixture::from_path(&fixture)?.load(&ctx)?;
            let json = deps.schema_introspection_json(&ctx).await?;
            let pretty: serde_json::Value = serde_json::from_str(&json)?;
            println!("{}", serde_json::to_string_pretty(&pretty)?);
            Ok(())
        }
        Commands::Call(cmd) => cmd.execute(&ctx).await,
    }
}
