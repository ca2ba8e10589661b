//! Application command line.
//!
//! # Responsibilities
//! - Base commands: `serve`, `routes`, `config`, `check`
//! - Mount commands contributed by extensions next to them
//! - Map outcomes to process exit codes

mod command;

pub use command::{CliCommand, CommandContext};

use std::ffi::OsString;
use std::process::ExitCode;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use thiserror::Error;

use crate::app::{Application, BuildError, ServeError};
use crate::config::Settings;
use crate::http::RouteEntry;
use crate::lifecycle::LifespanError;
use crate::BoxError;

#[derive(Parser, Debug)]
#[command(about = "Application management CLI", subcommand_required = true, arg_required_else_help = true)]
struct BaseCli {
    #[command(subcommand)]
    command: BaseCommand,
}

#[derive(Subcommand, Debug)]
enum BaseCommand {
    /// Run the application server
    Serve {
        /// Bind host (defaults to the `host` setting)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (defaults to the `port` setting)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List registered routes
    Routes,
    /// Show the resolved settings
    Config,
    /// Start every extension, ping every service, then shut down
    Check,
}

const BASE_COMMANDS: [&str; 5] = ["serve", "routes", "config", "check", "help"];

/// Errors from running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error(transparent)]
    Serve(#[from] ServeError),

    #[error(transparent)]
    Lifespan(#[from] LifespanError),

    #[error("{failed} service(s) failed their health check")]
    Check { failed: usize },

    #[error("Shutdown finished with {failures} failure(s)")]
    Shutdown { failures: usize },

    #[error("Command '{name}' failed: {source}")]
    Command {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to render settings: {0}")]
    Render(String),
}

/// The application CLI returned by [`build_app`](crate::build_app).
#[derive(Debug)]
pub struct Cli {
    app: Application,
    commands: Vec<CliCommand>,
}

impl Cli {
    pub(crate) fn new(app: Application, commands: Vec<CliCommand>) -> Result<Self, BuildError> {
        let mut seen: Vec<&str> = BASE_COMMANDS.to_vec();
        for command in &commands {
            if seen.contains(&command.name()) {
                return Err(BuildError::DuplicateCommand {
                    name: command.name().to_string(),
                });
            }
            seen.push(command.name());
        }
        Ok(Self { app, commands })
    }

    /// The full clap command, extension commands included.
    pub fn command(&self) -> clap::Command {
        let name = self.app.settings().app_name.clone();
        self.commands
            .iter()
            .fold(BaseCli::command().name(name), |cmd, ext| cmd.subcommand(ext.command().clone()))
    }

    /// Parse the process arguments, run the command and report the outcome.
    pub async fn run(&self) -> ExitCode {
        match self.run_from(std::env::args_os()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(CliError::Args(e)) => {
                let _ = e.print();
                ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(2))
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        }
    }

    /// Run with explicit arguments; the first one is the program name.
    pub async fn run_from<I, T>(&self, args: I) -> Result<(), CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;

        if let Some((name, sub)) = matches.subcommand() {
            if let Some(command) = self.commands.iter().find(|c| c.name() == name) {
                let ctx = CommandContext::new(self.app.clone());
                return command
                    .invoke(sub.clone(), ctx)
                    .await
                    .map_err(|source| CliError::Command {
                        name: name.to_string(),
                        source,
                    });
            }
        }

        match BaseCli::from_arg_matches(&matches)?.command {
            BaseCommand::Serve { host, port } => self.serve(host, port).await,
            BaseCommand::Routes => {
                print!("{}", render_routes(self.app.routes()));
                Ok(())
            }
            BaseCommand::Config => {
                println!("{}", render_config(self.app.settings())?);
                Ok(())
            }
            BaseCommand::Check => self.check().await,
        }
    }

    async fn serve(&self, host: Option<String>, port: Option<u16>) -> Result<(), CliError> {
        let settings = self.app.settings();
        let address = format!(
            "{}:{}",
            host.as_deref().unwrap_or(&settings.host),
            port.unwrap_or(settings.port)
        );

        let report = self.app.serve_until_signal(&address).await?;
        if !report.is_clean() {
            return Err(CliError::Shutdown {
                failures: report.failures.len(),
            });
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), CliError> {
        let guard = self.app.start().await?;
        println!("Started {} extension(s)", self.app.extensions().len());

        let mut failed = 0;
        for ping in self.app.registry().container().pings() {
            match ping.ping().await {
                Ok(()) => println!("  ok    {}", ping.name()),
                Err(e) => {
                    failed += 1;
                    println!("  FAIL  {}: {}", ping.name(), e);
                }
            }
        }

        let report = guard.shutdown().await;
        if failed > 0 {
            return Err(CliError::Check { failed });
        }
        if !report.is_clean() {
            return Err(CliError::Shutdown {
                failures: report.failures.len(),
            });
        }
        println!("All checks passed");
        Ok(())
    }
}

/// One `METHOD  path` line per route.
pub fn render_routes(routes: &[RouteEntry]) -> String {
    routes
        .iter()
        .map(|r| format!("{:<7} {}\n", r.method.as_str(), r.path))
        .collect()
}

/// Settings as TOML.
pub fn render_config(settings: &Settings) -> Result<String, CliError> {
    toml::to_string_pretty(settings).map_err(|e| CliError::Render(e.to_string()))
}
