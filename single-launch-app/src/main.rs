use clap::Args;
use clap::Parser;
use clap::Subcommand;
use single_launch::ArbiterConfig;
use single_launch::CoordinationStore;
use single_launch::FileStore;
use single_launch::OwnershipRecord;
use single_launch::SingleLaunchArbiter;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
mod view;
use crate::view::TerminalView;

const DEFAULT_STORE: &str = "~/.config/single-launch/single_launch.lock";

#[derive(Parser)]
#[command(name = "single-launch-app")]
#[command(about = "Run applications so that only one of them is active at a time", long_about = None)]
struct Cli {
    /// Path to the coordination record shared by all applications
    #[arg(short, long, global = true, env = "SINGLE_LAUNCH_STORE", default_value = DEFAULT_STORE)]
    store: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch an application, or exit right away if it is already active
    Run(RunArgs),

    /// Print the current coordination record
    Status,

    /// Reset the coordination record to "no active application"
    ///
    /// Use this to recover when staleness detection is disabled and an
    /// application crashed without releasing ownership.
    Clear,
}

#[derive(Args)]
struct RunArgs {
    /// Application name, e.g. "Notes"
    app: String,

    /// Interval in milliseconds for polling a previous application during
    /// handoff
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// How long in milliseconds to wait for a previous application to close
    #[arg(short = 't', long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Seconds without a heartbeat after which an owner counts as crashed
    ///
    /// Set to 0 to release ownership only on a clean close.
    #[arg(long, default_value_t = 10)]
    stale_secs: u64,

    /// Interval in milliseconds of the view's tick (heartbeat and close
    /// request check)
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

impl RunArgs {
    fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            handoff_timeout: Duration::from_millis(self.timeout_ms),
            stale_after: match self.stale_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
enum AppMessage {
    Tick,
    Exit,
    Interrupted,
    ShowStatus,
    #[cfg(feature = "dbus")]
    CloseRequested,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or("single_launch_app=trace,single_launch=trace"),
    )
    .init();

    #[cfg(not(debug_assertions))]
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("single_launch_app=warn,single_launch=warn"),
    )
    .init();

    let cli = Cli::parse();
    let store = FileStore::new(handle_store_path(&cli.store).await?);

    match cli.command {
        Command::Run(args) => run(store, args).await,
        Command::Status => {
            print_record(&store.read()?);
            Ok(())
        }
        Command::Clear => {
            store.write(&OwnershipRecord::default())?;
            log::info!("Cleared coordination record {:?}", store.path());
            println!("No application is recorded as active anymore.");
            Ok(())
        }
    }
}

async fn run(store: FileStore, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let arbiter = SingleLaunchArbiter::new(args.app.as_str(), store).with_config(args.arbiter_config());
    #[cfg(feature = "dbus")]
    let arbiter = arbiter.with_notifier(single_launch::DbusNotifier);

    // The handoff wait sleeps, keep it off the runtime thread
    let (arbiter, active) = tokio::task::spawn_blocking(move || {
        let mut arbiter = arbiter;
        let active = arbiter.is_active();
        (arbiter, active)
    })
    .await?;

    if active? {
        // Duplicate launch, the running instance stays on screen
        log::info!("App {} is already active, exiting", args.app);
        return Ok(());
    }

    let (appmsg_sender, mut appmsgs) = tokio::sync::mpsc::unbounded_channel::<AppMessage>();
    let mut view = TerminalView::present(arbiter)?;

    spawn_tick_thread(appmsg_sender.clone(), Duration::from_millis(args.tick_ms.max(1)));
    spawn_stdin_reader(appmsg_sender.clone());
    spawn_ctrl_c_listener(appmsg_sender.clone());
    #[cfg(feature = "dbus")]
    spawn_close_request_listener(&args.app, appmsg_sender.clone());
    drop(appmsg_sender);

    loop {
        let Some(event) = appmsgs.recv().await else {
            view.close("event sources stopped")?;
            break Ok(());
        };
        match view.dispatch(&event) {
            Ok(true) => break Ok(()),
            Err(e) => break Err(e),
            Ok(false) => {}
        }
    }
}

async fn handle_store_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    // Expand ~ to home directory
    let expanded = if path.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(path.strip_prefix("~/").unwrap_or(&path[1..]))
        } else {
            PathBuf::from(path)
        }
    } else {
        PathBuf::from(path)
    };

    // Only the default location is created on demand
    if path == DEFAULT_STORE {
        if let Some(parent) = expanded.parent() {
            log::trace!("Creating parent directories for store path: {:?}", parent);
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    Ok(expanded)
}

fn print_record(record: &OwnershipRecord) {
    if record.is_empty() {
        println!("No application is active.");
        return;
    }

    println!(
        "\n{:<20} {:<8} {:<10} {:<16} {}",
        "Application", "PID", "State", "Close requested", "Last heartbeat"
    );
    println!("{}", "-".repeat(80));
    println!(
        "{:<20} {:<8} {:<10} {:<16} {}",
        record.owner_identity,
        record
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string()),
        format!("{:?}", record.state),
        record.close_requested,
        record
            .heartbeat_at
            .map(|at| at.with_timezone(&chrono::Local).to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    println!();
}

/// Spawns a task that sends a Tick message every `interval`
fn spawn_tick_thread(app_message_sender: UnboundedSender<AppMessage>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        loop {
            ticks.tick().await;
            if app_message_sender.send(AppMessage::Tick).is_err() {
                // Main loop has exited, stop the loop
                break;
            }
        }
    });
}

fn spawn_stdin_reader(app_message_sender: UnboundedSender<AppMessage>) {
    fn print_info() {
        println!("Commands:");
        println!("Q: Close the application");
        println!("S: Show the coordination record");
        println!("Type command and press Enter: ");
    }
    thread::spawn(move || {
        print_info();
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            let message = match line.trim().to_lowercase().as_str() {
                "q" => AppMessage::Exit,
                "s" => AppMessage::ShowStatus,
                _ => {
                    print_info();
                    continue;
                }
            };
            let exit = message == AppMessage::Exit;
            if app_message_sender.send(message).is_err() || exit {
                break;
            }
        }
    });
}

fn spawn_ctrl_c_listener(app_message_sender: UnboundedSender<AppMessage>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = app_message_sender.send(AppMessage::Interrupted);
            }
            Err(e) => log::warn!("Unable to listen for Ctrl+C: {}", e),
        }
    });
}

/// Forwards D-Bus close requests from a challenger into the event loop
#[cfg(feature = "dbus")]
fn spawn_close_request_listener(app: &str, app_message_sender: UnboundedSender<AppMessage>) {
    let listener = single_launch::listen_for_close_requests(app, move || {
        let _ = app_message_sender.send(AppMessage::CloseRequested);
    });
    if let Err(e) = listener {
        log::info!("D-Bus close requests unavailable ({}), polling only", e);
    }
}
