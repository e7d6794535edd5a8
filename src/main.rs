mod catalog;
mod common;
mod install;
mod ui;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::common::config::{AppConfig, config_file_path};
use crate::install::cli::InstallArgs;
use crate::ui::prelude::*;

/// Unattended installation of packages from a catalog
#[derive(Parser, Debug)]
#[command(name = "spaller", author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Disable colors and nerd font icons
    #[arg(long, global = true)]
    no_color: bool,

    /// Use this config file instead of the default one
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether the package manager is installed
    Check,

    /// Install the package manager if it is missing
    Bootstrap {
        /// Number of attempts (defaults to the configured value)
        #[arg(long)]
        retries: Option<u32>,
    },

    /// List the packages in the catalog
    List {
        /// Catalog URL or local file (defaults to the configured URL)
        #[arg(long, value_name = "SOURCE")]
        catalog: Option<String>,

        /// Only show one category
        #[arg(short, long)]
        category: Option<String>,

        /// Only show packages whose name or description contains TEXT
        #[arg(short, long, value_name = "TEXT")]
        search: Option<String>,
    },

    /// Install packages
    Install(InstallArgs),

    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the path of the configuration file
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            emit(
                Level::Error,
                "app.error",
                &format!("{} {err:#}", icon(NerdFont::Cross)),
                None,
            );
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    if let Commands::Config { command } = &cli.command {
        handle_config(command, cli.config.as_deref())?;
        return Ok(0);
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    emit(
        Level::Debug,
        "config.loaded",
        &format!(
            "{} Catalog: {}, strategy: {:?}",
            icon(NerdFont::Info),
            config.catalog_url,
            config.strategy
        ),
        None,
    );

    match cli.command {
        Commands::Check => {
            let available = install::cli::handle_check(&config).await?;
            Ok(if available { 0 } else { 1 })
        }
        Commands::Bootstrap { retries } => {
            install::cli::handle_bootstrap(&config, retries).await?;
            Ok(0)
        }
        Commands::List {
            catalog,
            category,
            search,
        } => {
            catalog::cli::handle_list(&config, catalog.as_deref(), category.as_deref(), search.as_deref())
                .await?;
            Ok(0)
        }
        Commands::Install(args) => install::cli::handle_install(&config, args).await,
        Commands::Config { .. } => Ok(0),
    }
}

fn handle_config(command: &ConfigCommands, explicit: Option<&std::path::Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };

    match command {
        ConfigCommands::Path => {
            emit(
                Level::Info,
                "config.path",
                &path.display().to_string(),
                Some(serde_json::json!({ "path": path })),
            );
        }
        ConfigCommands::Show => {
            let config = AppConfig::load(explicit)?;
            match get_output_format() {
                OutputFormat::Json => emit(
                    Level::Info,
                    "config.show",
                    &path.display().to_string(),
                    serde_json::to_value(&config).ok(),
                ),
                OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            AppConfig::default().save_to(&path)?;
            emit(
                Level::Success,
                "config.init",
                &format!("{} Wrote default config to {}", icon(NerdFont::Check), path.display()),
                Some(serde_json::json!({ "path": path })),
            );
        }
    }
    Ok(())
}
