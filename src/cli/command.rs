//! Extension-provided commands.

use std::future::Future;
use std::sync::Arc;

use clap::ArgMatches;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::app::Application;
use crate::config::Settings;
use crate::lifecycle::{LifespanError, LifespanGuard};
use crate::registry::Registry;
use crate::BoxError;

type Handler = Arc<dyn Fn(ArgMatches, CommandContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// What a command handler can reach.
#[derive(Clone, Debug)]
pub struct CommandContext {
    app: Application,
}

impl CommandContext {
    pub(crate) fn new(app: Application) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn settings(&self) -> &Settings {
        self.app.settings()
    }

    pub fn registry(&self) -> &Registry {
        self.app.registry()
    }

    /// Run extension setup, for commands that need live services.
    pub async fn start(&self) -> Result<LifespanGuard, LifespanError> {
        self.app.start().await
    }
}

/// A clap subcommand plus the async handler that runs it.
///
/// ```rust,no_run
/// use clap::{Arg, Command};
/// use cuneus::cli::CliCommand;
///
/// let seed = CliCommand::new(
///     Command::new("seed").about("Load fixtures").arg(Arg::new("count").long("count")),
///     |matches, ctx| async move {
///         let count = matches.get_one::<String>("count").cloned().unwrap_or_default();
///         println!("seeding {count} rows into {}", ctx.settings().app_name);
///         Ok::<(), cuneus::BoxError>(())
///     },
/// );
/// ```
#[derive(Clone)]
pub struct CliCommand {
    command: clap::Command,
    handler: Handler,
}

impl std::fmt::Debug for CliCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliCommand").field("name", &self.name()).finish()
    }
}

impl CliCommand {
    pub fn new<F, Fut>(command: clap::Command, handler: F) -> Self
    where
        F: Fn(ArgMatches, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            command,
            handler: Arc::new(move |matches, ctx| handler(matches, ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        self.command.get_name()
    }

    pub(crate) fn command(&self) -> &clap::Command {
        &self.command
    }

    pub(crate) async fn invoke(&self, matches: ArgMatches, ctx: CommandContext) -> Result<(), BoxError> {
        (self.handler)(matches, ctx).await
    }
}
