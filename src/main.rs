use std::{error::Error, future, num::NonZeroU32, path::PathBuf, process, time::Duration};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};
use tokio::time::Instant;

use playerbar::{
    api::Api,
    commands::Commands,
    config::Config,
    protocol::{Command, PlayerId},
    registry::Registry,
    signal,
    terminal::TerminalMount,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// A TOML file with any of `base_url`, `api_prefix`, `frame_rate` and
    /// `command_rate_limit`. Command line options take precedence.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "PLAYERBAR_CONFIG")]
    config: Option<PathBuf>,

    /// Backend URL
    ///
    /// [default: http://127.0.0.1:3000/]
    #[arg(short, long, value_hint = ValueHint::Url, env = "PLAYERBAR_URL")]
    url: Option<String>,

    /// Route prefix of the backend
    ///
    /// Use an empty string if the backend serves its routes at the root.
    ///
    /// [default: api]
    #[arg(long, value_name = "PREFIX", env = "PLAYERBAR_API_PREFIX")]
    api_prefix: Option<String>,

    /// Progress updates per second while playing
    ///
    /// [default: 60]
    #[arg(long, value_name = "FPS", env = "PLAYERBAR_FRAME_RATE")]
    frame_rate: Option<NonZeroU32>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Clone, Debug, Subcommand)]
enum Action {
    /// Follow all players until interrupted (default)
    Watch,

    /// List the players of the backend
    List,

    /// Toggle between playing and paused
    PlayPause { id: PlayerId },

    /// Skip to the next track
    Next { id: PlayerId },

    /// Skip to the previous track
    Prev { id: PlayerId },

    /// Move the position by a number of microseconds
    Seek {
        id: PlayerId,

        /// Negative to seek backwards
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Set the volume between 0.0 and 1.0
    Volume { id: PlayerId, volume: f64 },
}

impl Action {
    /// Splits a playback action into its player and command.
    fn into_command(self) -> Option<(PlayerId, Command)> {
        match self {
            Self::Watch | Self::List => None,
            Self::PlayPause { id } => Some((id, Command::PlayPause)),
            Self::Next { id } => Some((id, Command::Next)),
            Self::Prev { id } => Some((id, Command::Previous)),
            Self::Seek { id, delta } => Some((id, Command::Seek(delta))),
            Self::Volume { id, volume } => Some((id, Command::Volume(volume))),
        }
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("playerbar", level);
    }

    logger.init();
}

/// Layers the command line over the configuration file over the defaults.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(url) = &args.url {
        config.set_base_url(url)?;
    }
    if let Some(prefix) = &args.api_prefix {
        config.api_prefix.clone_from(prefix);
    }
    if let Some(frame_rate) = args.frame_rate {
        config.frame_rate = frame_rate;
    }

    Ok(config)
}

/// Sleep duration before enumerating players again.
///
/// Jittered to prevent thundering herds. Subsecond precision further
/// prevents that by spreading requests when users are launching this from
/// some crontab.
fn jitter() -> Duration {
    Duration::from_millis(fastrand::u64(5_000..6_000))
}

/// Waits until every player of `registry` ended, or forever without one.
async fn until_empty(registry: Option<&mut Registry>) {
    match registry {
        Some(registry) => registry.run_until_empty().await,
        None => future::pending().await,
    }
}

/// Follows all players of the backend until interrupted.
///
/// Enumerates again when every player ended, the enumeration failed, or on
/// SIGHUP.
async fn watch(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut signals = signal::Handler::new()?;
    let mut mount = TerminalMount::new(Api::new(config)?);
    let mut registry: Option<Registry> = None;

    // The initial enumeration happens immediately.
    let restart_timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(restart_timer);

    loop {
        tokio::select! {
            // Prioritize signals.
            biased;

            signal = signals.recv() => {
                if let Some(mut registry) = registry.take() {
                    registry.shutdown().await;
                }

                if signal.is_shutdown() {
                    info!("{signal}: shutting down gracefully");
                    break Ok(());
                }

                info!("{signal}: enumerating players again");
                restart_timer.as_mut().reset(Instant::now());
            }

            () = until_empty(registry.as_mut()) => {
                registry = None;

                let duration = jitter();
                info!("all players ended; enumerating again in {:.1}s", duration.as_secs_f32());
                restart_timer.as_mut().reset(Instant::now() + duration);
            }

            result = Registry::bootstrap(config, &mut mount), if registry.is_none() && restart_timer.is_elapsed() => {
                match result {
                    Ok(bootstrapped) if !bootstrapped.is_empty() => {
                        registry = Some(bootstrapped);
                        continue;
                    }
                    Ok(_) => info!("backend has no players"),
                    Err(e) => error!("{e}"),
                }

                let duration = jitter();
                info!("enumerating again in {:.1}s", duration.as_secs_f32());
                restart_timer.as_mut().reset(Instant::now() + duration);
            }

            () = &mut restart_timer, if !restart_timer.is_elapsed() => {}
        }
    }
}

/// Main application logic.
///
/// # Errors
///
/// This function returns an error when the configuration cannot be loaded,
/// the backend cannot be enumerated for `list`, or the signal handlers
/// cannot be installed.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    debug!("{config:#?}");

    let action = args.command.unwrap_or(Action::Watch);
    match action {
        Action::Watch => watch(&config).await,
        Action::List => {
            let api = Api::new(&config)?;
            for id in api.list().await? {
                println!("{id}");
            }
            Ok(())
        }
        action => {
            let Some((id, command)) = action.into_command() else {
                return Ok(());
            };

            let commands = Commands::new(Api::new(&config)?, id);
            commands.send(command).await?;
            Ok(())
        }
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
