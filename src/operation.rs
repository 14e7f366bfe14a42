//! What the gateway can do for you.
//!
//! This module implements all the commands users can ask the gateway to
//! perform. They are encapsulated in the type [`Operation`] which can
//! determine the command from the command line argumments and then execute
//! it.

use std::sync::Arc;
use clap::ArgMatches;
use log::{error, info};
use tokio::runtime::Runtime;
use crate::archive::fs::FsStore;
use crate::config::Config;
use crate::error::{ExitError, Failed};
use crate::http::{Site, http_listener};
use crate::log::Logger;
use crate::registry::StaticRegistry;

#[cfg(unix)] use tokio::signal::unix::{Signal, SignalKind, signal};


//------------ Operation -----------------------------------------------------

/// The command to execute.
///
/// This type collects all the commands we have defined plus any possible
/// extra configuration they support.
///
/// You can create a value from the command line arguments. First, you add
/// all necessary sub-commands and arguments to a clap `Command` via
/// [`config_args`][Self::config_args] and then process the argument matches
/// into a value in [`from_arg_matches`][Self::from_arg_matches]. Finally,
/// you can execute the created command through the [`run`][Self::run]
/// method.
pub enum Operation {
    Server(Server),
    PrintConfig(PrintConfig),
}

impl Operation {
    /// Prepares everything.
    ///
    /// Call this before doing anything else.
    pub fn prepare() -> Result<(), Failed> {
        Logger::init()
    }

    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        let app = Server::config_args(app);
        PrintConfig::config_args(app)
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        config: &mut Config
    ) -> Result<Self, Failed> {
        Ok(match matches.subcommand() {
            Some(("server", matches)) => {
                Operation::Server(Server::from_arg_matches(matches, config)?)
            }
            Some(("config", matches)) => {
                Operation::PrintConfig(
                    PrintConfig::from_arg_matches(matches, config)?
                )
            }
            _ => {
                error!(
                    "Failed: a command is required.\n\
                     \nCommonly used commands are:\
                     \n   server    Serve archives over HTTP\
                     \n   config    Print the current configuration\
                     \n\
                     \nSee dathost -h for a usage summary."
                );
                return Err(Failed)
            }
        })
    }

    /// Runs the command.
    ///
    /// Depending on the command, this method may switch to logging at some
    /// point.
    pub fn run(self, config: Config) -> Result<(), ExitError> {
        match self {
            Operation::Server(cmd) => cmd.run(config),
            Operation::PrintConfig(cmd) => cmd.run(config),
        }
    }
}


//------------ Server --------------------------------------------------------

/// Run as server.
pub struct Server;

impl Server {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(
            Config::server_args(
                clap::Command::new("server")
                .about("Starts the HTTP gateway")
                .after_help(AFTER_HELP)
            )
        )
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        config: &mut Config
    ) -> Result<Self, Failed> {
        config.apply_server_arg_matches(matches)?;
        Ok(Server)
    }

    /// Runs the gateway until it is told to stop.
    pub fn run(self, config: Config) -> Result<(), ExitError> {
        Logger::switch_logging(&config)?;

        let registry = StaticRegistry::load(&config.registry_path())?;
        info!(
            "Loaded registry with {} archives from {}.",
            registry.archive_count(), config.registry_path().display()
        );
        let store = Arc::new(FsStore::new(config.archive_dir.clone()));
        let site = Arc::new(Site::new(
            config.vhost_mode.resolver(Arc::new(registry)),
            store,
            config.cache_max_age,
        ));
        info!(
            "Serving archives from {} in {} mode.",
            config.archive_dir.display(), config.vhost_mode
        );

        let http = http_listener(site, &config)?;
        let runtime = runtime()?;
        let res: Result<(), Failed> = runtime.block_on(async move {
            let mut signal = SignalListener::new()?;
            tokio::select! {
                _ = http => {
                    error!("Fatal: HTTP listener ended unexpectedly.");
                    Err(Failed)
                }
                _ = signal.shutdown() => {
                    info!("Shutting down.");
                    Ok(())
                }
            }
        });
        res.map_err(Into::into)
    }
}


//------------ PrintConfig ---------------------------------------------------

/// Shows the current configuration.
pub struct PrintConfig;

impl PrintConfig {
    /// Adds the command configuration to a clap app.
    pub fn config_args(app: clap::Command) -> clap::Command {
        app.subcommand(Config::server_args(clap::Command::new("config")
            .about("Prints the current config and exits")
            .after_help(AFTER_HELP)
        ))
    }

    /// Creates a command from clap matches.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        config: &mut Config,
    ) -> Result<Self, Failed> {
        config.apply_server_arg_matches(matches)?;
        Ok(PrintConfig)
    }

    /// Prints the current configuration to stdout and exits.
    fn run(self, config: Config) -> Result<(), ExitError> {
        println!("{}", config);
        Ok(())
    }
}


//------------ SignalListener ------------------------------------------------

/// Waits for the user telling us to quit.
#[cfg(unix)]
struct SignalListener {
    int: Signal,
    term: Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn new() -> Result<Self, Failed> {
        Ok(SignalListener {
            int: match signal(SignalKind::interrupt()) {
                Ok(int) => int,
                Err(err) => {
                    error!("Attaching to signal INT failed: {}", err);
                    return Err(Failed)
                }
            },
            term: match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    error!("Attaching to signal TERM failed: {}", err);
                    return Err(Failed)
                }
            },
        })
    }

    /// Waits until the process should shut down.
    pub async fn shutdown(&mut self) {
        tokio::select! {
            _ = self.int.recv() => { }
            _ = self.term.recv() => { }
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn new() -> Result<Self, Failed> {
        Ok(SignalListener)
    }

    /// Waits until the process should shut down.
    pub async fn shutdown(&mut self) {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Listening for Ctrl-C failed: {}", err);
            futures::future::pending::<()>().await
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Creates the Tokio runtime.
fn runtime() -> Result<Runtime, Failed> {
    Runtime::new().map_err(|err| {
        error!("Failed to create runtime: {}", err);
        Failed
    })
}


//------------ Constants -----------------------------------------------------

/// The after help message pointing to the main help.
const AFTER_HELP: &str =
    "Additional global options are available. \
    Please consult 'dathost --help' for those.";
