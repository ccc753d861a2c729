pub mod autostart;
pub mod commands;
pub mod daemon_path;
pub mod process;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use autostart::{process_autostart_command, AutostartCommand};
use clap::{Parser, Subcommand};
use commands::Session;
use process::{spawn_detached_daemon, stop_daemon, StopOutcome, STOP_GRACE_PERIOD};
use tracing::level_filters::LevelFilter;

use crate::{
    blocking::processes::SysinfoProcessTable,
    daemon::{
        lock::{inspect, LockState},
        start_daemon, DEFAULT_RECONCILE_INTERVAL,
    },
    error::{BlockerError, ConfigError},
    utils::{
        dir::AppPaths,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "focusguard", version, long_about = None)]
#[command(about = "Blocks distracting websites and applications", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Option<Commands>,
    #[arg(
        long,
        global = true,
        help = "Application directory holding the configuration and the lock file. By default %APPDATA%\\focusguard, $XDG_STATE_HOME/focusguard or $HOME/.local/state/focusguard"
    )]
    dir: Option<PathBuf>,
    #[arg(long = "hosts-file", global = true, help = "Hosts file to edit instead of the system one")]
    hosts_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Block every configured site and url, kill blocked apps. The default command")]
    Block,
    #[command(about = "Remove every hosts entry and browser policy written by focusguard")]
    Unblock,
    #[command(about = "Add a site (and its www. variant) to the block list")]
    Add { domain: String },
    #[command(about = "Remove a site (and its www. variant) from the block list")]
    Remove { domain: String },
    #[command(name = "addurl", about = "Block a url path, for example youtube.com/shorts")]
    AddUrl { url: String },
    #[command(name = "removeurl", about = "Unblock a url path")]
    RemoveUrl { url: String },
    #[command(name = "addapp", about = "Add an executable, for example TikTok.exe, to blocked apps")]
    AddApp { name: String },
    #[command(name = "removeapp", about = "Remove an executable from blocked apps")]
    RemoveApp { name: String },
    #[command(name = "killapps", about = "Kill running blocked apps now")]
    KillApps,
    #[command(name = "listapps", about = "List running processes")]
    ListApps,
    #[command(about = "Show what is blocked right now and whether the daemon runs")]
    Status,
    #[command(about = "List everything in the configuration")]
    List,
    #[command(about = "Keep everything blocked, re-applying the configuration periodically")]
    Daemon {
        #[arg(long, default_value_t = DEFAULT_RECONCILE_INTERVAL.as_secs(), help = "Seconds between two reconciliations")]
        interval: u64,
        #[arg(long, help = "Run the daemon as a detached background process")]
        detach: bool,
    },
    #[command(about = "Stop the currently running daemon")]
    Stop,
    #[command(about = "Manage running the daemon at logon")]
    Autostart {
        #[command(subcommand)]
        command: AutostartCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let paths = AppPaths::resolve(args.dir, args.hosts_file)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &paths.logs, logging_level, args.log)?;

    let mut session = Session::new(paths);
    match args.commands.unwrap_or(Commands::Block) {
        Commands::Block => commands::block(&mut session).await,
        Commands::Unblock => commands::unblock(&mut session).await,
        Commands::Add { domain } => commands::add_site(&mut session, &domain).await,
        Commands::Remove { domain } => commands::remove_site(&mut session, &domain).await,
        Commands::AddUrl { url } => commands::add_url(&mut session, &url).await,
        Commands::RemoveUrl { url } => commands::remove_url(&mut session, &url).await,
        Commands::AddApp { name } => commands::add_app(&mut session, &name).await,
        Commands::RemoveApp { name } => commands::remove_app(&mut session, &name).await,
        Commands::KillApps => commands::kill_apps(&mut session).await,
        Commands::ListApps => {
            commands::list_apps();
            Ok(())
        }
        Commands::Status => commands::status(&mut session).await,
        Commands::List => commands::list(&session).await,
        Commands::Daemon { interval, detach } => {
            let interval = Duration::from_secs(interval.max(1));
            if let LockState::Held { pid } =
                inspect(&session.paths.lock, &mut SysinfoProcessTable::new())?
            {
                return Err(BlockerError::AlreadyRunning { pid }.into());
            }
            if detach {
                spawn_detached_daemon(&session.paths, interval)
            } else {
                println!(
                    "Running in daemon mode. Blocking sites + killing apps every {} seconds.",
                    interval.as_secs()
                );
                println!("Press Ctrl+C to stop.");
                start_daemon(session.paths, interval).await?;
                println!("Daemon stopped.");
                Ok(())
            }
        }
        Commands::Stop => {
            let outcome = stop_daemon(
                &session.paths.lock,
                &mut SysinfoProcessTable::new(),
                STOP_GRACE_PERIOD,
            )
            .await?;
            match outcome {
                StopOutcome::NotRunning => println!("Daemon is not running."),
                StopOutcome::StaleLockRemoved { .. } => {
                    println!("Daemon was not running, removed its stale lock file.")
                }
                StopOutcome::Stopped { pid } => println!("Stopped daemon with pid {pid}."),
            }
            Ok(())
        }
        Commands::Autostart { command } => process_autostart_command(command, &session.paths.dir),
    }
}

/// Exit code reported for an error escaping [run_cli].
pub fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(error) = error.downcast_ref::<BlockerError>() {
        error.exit_code()
    } else if let Some(error) = error.downcast_ref::<ConfigError>() {
        error.exit_code()
    } else {
        1
    }
}
