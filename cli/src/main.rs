//! `satkit` — inspect and edit the persistent settings file.
//!
//! Thin front end over `satkit-params`. Every mutating subcommand goes
//! through the store's validated `set` path and is flushed to disk before
//! the process exits.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use satkit_params::Params;
use serde_json::Value;

/// satkit settings — show and edit the persistent user settings
#[derive(Debug, Parser)]
#[command(name = "satkit", version = satkit_params::VERSION)]
struct Cli {
    /// Directory holding the settings file, instead of the discovery order
    /// (current directory, then the user config directory)
    #[arg(long, value_name = "DIR", global = true)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a fresh settings file populated with defaults
    Init,

    /// Print every tracked setting
    Show,

    /// Print the value stored for a key
    Get {
        key: String,
    },

    /// Assign a value to a key
    ///
    /// The value is parsed as JSON; anything that does not parse is stored
    /// as a plain string, so `satkit set clean_level dirty` works without
    /// quoting.
    Set {
        key: String,
        value: String,
    },

    /// Replace the data_dirs list with the given directories
    SetDataDirs {
        #[arg(required = true)]
        dirs: Vec<String>,
    },

    /// Reset every known setting to its default, keeping user keys
    RestoreDefaults,

    /// Drop everything and rewrite the file with defaults only
    Clear,
}

fn open_store(path: Option<&PathBuf>) -> anyhow::Result<Params> {
    let params = match path {
        Some(dir) => Params::open_at(dir)?,
        None => Params::open()?,
    };
    Ok(params)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => {
            let params = Params::create(cli.path.as_deref())?;
            println!("created {}", params.file_path().display());
        }
        Command::Show => {
            let params = open_store(cli.path.as_ref())?;
            print!("{params}");
        }
        Command::Get { key } => {
            let params = open_store(cli.path.as_ref())?;
            println!("{}", params.get(&key)?);
        }
        Command::Set { key, value } => {
            let mut params = open_store(cli.path.as_ref())?;
            let value: Value =
                serde_json::from_str(&value).unwrap_or(Value::String(value));
            params
                .set(&key, value)
                .with_context(|| format!("could not set `{key}`"))?;
        }
        Command::SetDataDirs { dirs } => {
            let mut params = open_store(cli.path.as_ref())?;
            params.set_data_dirs(&dirs)?;
        }
        Command::RestoreDefaults => {
            let mut params = open_store(cli.path.as_ref())?;
            params.restore_defaults()?;
        }
        Command::Clear => {
            let mut params = open_store(cli.path.as_ref())?;
            params.clear_and_restart()?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    run(Cli::parse())
}
