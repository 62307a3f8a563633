mod cli;
mod daemon;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{LogLevel, Verbosity};
use std::path::PathBuf;

use gopm2::globals;

#[derive(Copy, Clone, Debug, Default)]
struct NoneLevel;
impl LogLevel for NoneLevel {
    fn default() -> Option<log::Level> {
        None
    }
}

#[derive(Parser)]
#[command(name = "gopm2", version, about = "PM2-style process manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: Verbosity<NoneLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a script or every app in a config file
    Start {
        /// Script path, command, or JSON/YAML config file
        script: String,
        /// Process name (defaults to the script's file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Arguments passed to the script
        #[arg(short, long)]
        args: Vec<String>,
        /// Working directory
        #[arg(short, long)]
        cwd: Option<PathBuf>,
        /// Environment variables (KEY=VALUE)
        #[arg(short, long)]
        env: Vec<String>,
        /// Number of instances (cluster mode spawns siblings)
        #[arg(short, long, default_value_t = 1)]
        instances: usize,
        /// Execution mode (fork|cluster)
        #[arg(short = 'x', long, default_value_t = String::from("fork"))]
        exec_mode: String,
        /// Restart when files under the working directory change
        #[arg(short, long)]
        watch: bool,
        /// Extra ignore patterns for the file watcher
        #[arg(long)]
        ignore: Vec<String>,
        /// Log file path
        #[arg(short, long)]
        log: Option<PathBuf>,
        /// Error log file path
        #[arg(long)]
        error: Option<PathBuf>,
        /// Maximum automatic restarts before parking as errored
        #[arg(long, default_value_t = 15)]
        max_restarts: u64,
        /// Minimum uptime for a run to not count as a fast failure
        #[arg(long, default_value_t = String::from("1s"))]
        min_uptime: String,
    },
    /// Stop a process
    Stop {
        /// Process name or id
        target: String,
    },
    /// Restart a process
    Restart {
        /// Process name or id
        target: String,
    },
    /// Stop and remove a process
    #[command(visible_alias = "del")]
    Delete {
        /// Process name or id
        target: String,
    },
    /// List all processes
    #[command(visible_alias = "ls", visible_alias = "status")]
    List {
        /// Format output (default|json|raw)
        #[arg(long, default_value_t = String::from("default"))]
        format: String,
    },
    /// Show process logs
    Logs {
        /// Process name or id
        target: String,
        /// Number of lines to display from the end of the log file
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,
        /// Show the error log instead of stdout
        #[arg(short, long)]
        error: bool,
    },
    /// Show detailed process information
    #[command(visible_alias = "info")]
    Describe {
        /// Process name or id
        target: String,
        /// Format output (default|json)
        #[arg(long, default_value_t = String::from("default"))]
        format: String,
    },
    /// Live view of all processes
    Monit,
    /// Truncate process log files
    Flush {
        /// Process name or id (all processes when omitted)
        target: Option<String>,
    },
    /// Config file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Save the current process list to the snapshot
    Save,
    /// Start every process that is not online
    Resurrect,
    /// File watcher operations
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },
    /// Generate an OS startup script for the daemon
    Startup,
    /// Run the supervisor daemon in the foreground
    Daemon,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Generate a config file template
    Generate {
        /// Output path (default: ecosystem.config.json)
        file: Option<String>,
    },
    /// Export running processes as a config file
    Export {
        /// Output path (default: ecosystem.config.json)
        file: Option<String>,
    },
}

#[derive(Subcommand)]
enum WatchCommand {
    /// Enable the file watcher for a process
    Enable {
        /// Process name or id
        target: String,
    },
    /// Disable the file watcher for a process
    Disable {
        /// Process name or id
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut env = env_logger::Builder::new();
    env.filter_level(cli.verbose.log_level_filter()).init();

    globals::init();

    if let Commands::Daemon = cli.command {
        daemon::run();
        return;
    }

    daemon::ensure_running();

    match cli.command {
        Commands::Start {
            script,
            name,
            args,
            cwd,
            env,
            instances,
            exec_mode,
            watch,
            ignore,
            log,
            error,
            max_restarts,
            min_uptime,
        } => cli::start(
            &script,
            cli::StartOpts {
                name,
                args,
                cwd,
                env,
                instances,
                exec_mode,
                watch,
                ignore,
                log_file: log,
                error_log_file: error,
                max_restarts,
                min_uptime: Some(min_uptime),
            },
        ),
        Commands::Stop { target } => cli::stop(&target),
        Commands::Restart { target } => cli::restart(&target),
        Commands::Delete { target } => cli::delete(&target),
        Commands::List { format } => cli::list(&format),
        Commands::Logs {
            target,
            lines,
            follow,
            error,
        } => cli::logs::logs(&target, lines, follow, error),
        Commands::Describe { target, format } => cli::describe(&target, &format),
        Commands::Monit => cli::monit(),
        Commands::Flush { target } => cli::flush(target.as_deref()),
        Commands::Config { command } => match command {
            ConfigCommand::Generate { file } => cli::config_generate(file.as_deref()),
            ConfigCommand::Export { file } => cli::config_export(file.as_deref()),
        },
        Commands::Save => cli::save(),
        Commands::Resurrect => cli::resurrect(),
        Commands::Watch { command } => match command {
            WatchCommand::Enable { target } => cli::watch_enable(&target),
            WatchCommand::Disable { target } => cli::watch_disable(&target),
        },
        Commands::Startup => cli::startup(),
        Commands::Daemon => unreachable!(),
    }
}
