use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use tracing::{error, info};

use monitor_brightness::config::Config;
use monitor_brightness::error::Result;
use monitor_brightness::monitor::{select_monitors, MonitorItem};
use monitor_brightness::{enumerate_monitors, fade, logging, watch};

#[derive(Parser)]
#[command(name = "monitor-brightness", version, about = "Read and adjust the brightness of your displays")]
struct Cli {
  /// Path to a config file instead of the default location
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// List the monitors whose brightness can be controlled
  List,
  /// Print the current brightness
  Get {
    /// Monitor position in `list`, or a device instance ID prefix. All monitors when omitted
    monitor: Option<String>,
  },
  /// Change the brightness
  Set {
    /// New brightness, 0 to 100
    #[arg(allow_negative_numbers = true)]
    brightness: i32,
    /// Monitor position in `list`, or a device instance ID prefix. All monitors when omitted
    monitor: Option<String>,
    /// Ease into the new brightness instead of jumping to it
    #[arg(long)]
    fade: bool,
  },
  /// Print brightness changes until Ctrl-C is pressed
  Watch {
    /// Polling interval, overrides the config file
    #[arg(long)]
    interval_ms: Option<u64>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let config = match Config::load(cli.config.as_deref()) {
    Ok(config) => config,
    Err(err) => {
      eprintln!("ERROR: {err}");
      return ExitCode::FAILURE;
    }
  };
  logging::init(&config.log);

  match run(cli.command, &config) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(err) => {
      error!("{err}");
      ExitCode::FAILURE
    }
  }
}

/// Run a command against the connected monitors. `Ok(false)` means some monitor refused the request
fn run(command: Command, config: &Config) -> Result<bool> {
  let monitors = enumerate_monitors(config)?;
  let result = run_with(command, config, &monitors);

  // Release the physical monitor handles before exiting
  for monitor in &monitors {
    monitor.close();
  }

  result
}

fn run_with(command: Command, config: &Config, monitors: &[Box<dyn MonitorItem>]) -> Result<bool> {
  match command {
    Command::List => {
      for (index, monitor) in monitors.iter().enumerate() {
        let info = monitor.info();
        println!(
          "{index}: {} [{}] {} (display {}, monitor {})",
          info.description, info.kind, info.device_instance_id, info.display_index, info.monitor_index
        );
      }
      Ok(true)
    }
    Command::Get { monitor } => {
      let mut all_read = true;
      for monitor in select_monitors(monitors, monitor.as_deref())? {
        let description = &monitor.info().description;
        if monitor.update_brightness() {
          println!("{}: {}", description, monitor.brightness().unwrap_or_default());
        } else {
          println!("{description}: unknown");
          all_read = false;
        }
      }
      Ok(all_read)
    }
    Command::Set { brightness, monitor, fade: eased } => {
      let mut all_set = true;
      for monitor in select_monitors(monitors, monitor.as_deref())? {
        let applied = if eased {
          fade::fade_to(monitor, brightness, config.fade.duration(), config.fade.steps)?
        } else {
          monitor.set_brightness(brightness)?
        };
        if applied {
          info!("set the brightness of {} to {}", monitor.info().description, brightness);
        }
        all_set &= applied;
      }
      Ok(all_set)
    }
    Command::Watch { interval_ms } => {
      let interval = interval_ms.map(Duration::from_millis).unwrap_or_else(|| config.watch.interval());

      // Ctrl-C only signals the loop, the handles are released on the main thread once it returns
      let (stop_tx, stop_rx) = bounded(1);
      if let Err(handler_err) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
      }) {
        error!("failed to register Ctrl-C handler: {}", handler_err);
        return Ok(false);
      }

      let selected = select_monitors(monitors, None)?;
      watch::watch(&selected, interval, &stop_rx, |monitor, brightness| match brightness {
        Some(brightness) => println!("{}: {}", monitor.info().description, brightness),
        None => println!("{}: unknown", monitor.info().description),
      });
      Ok(true)
    }
  }
}
