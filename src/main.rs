use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use eyre::{Context, Result};
use log::info;

use picod::cli::{self, Mode};
use picod::config::Config;
use picod::daemon::{self, Fork};
use picod::ipc;

fn setup_logging(config: &Config, to_stderr: bool) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    }

    if !to_stderr {
        // Background daemon: stdio is closed, log to a file instead
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/log"))
            .join("picod")
            .join("logs");

        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

        let log_file = log_dir.join("picod.log");
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.mode() {
        Mode::Daemon => {
            if daemon::daemonize().context("Failed to daemonize")? == Fork::Parent {
                return Ok(ExitCode::SUCCESS);
            }
            setup_logging(&config, false).context("Failed to setup logging")?;
            info!("picod {} daemon starting", env!("CARGO_PKG_VERSION"));
            daemon::run(&config).context("Daemon failed")?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Foreground => {
            setup_logging(&config, true).context("Failed to setup logging")?;
            info!("picod {} daemon starting", env!("CARGO_PKG_VERSION"));
            daemon::run(&config).context("Daemon failed")?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Direct => {
            setup_logging(&config, true).context("Failed to setup logging")?;
            let code = daemon::run_direct(&config, &cli.command)?;
            Ok(ExitCode::from(code as u8))
        }
        Mode::Client => {
            let code = ipc::run_command(&config.socket, &cli.command)?;
            Ok(ExitCode::from(code as u8))
        }
        Mode::Help => {
            print!("{}", cli::usage());
            // The command listing depends on which modules the running
            // daemon has loaded, so ask it.
            if let Err(e) = ipc::run_command(&config.socket, &["--help".to_string()]) {
                eprintln!("{}", e);
            }
            Ok(ExitCode::from(1))
        }
    }
}
