use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::engine::ArgValueCompleter;
use clap_complete::{CompleteEnv, CompletionCandidate, generate};
use log::{info, warn};
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use ptouch_driver::catalog::{self, UsbId};
use ptouch_driver::tape;
use ptouch_driver::{AnyTransport, Bitmap, DriverConfig, Printer, TransportKind};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ptouch")]
#[command(about = "Driver for Brother P-Touch USB label printers")]
#[command(version = "0.1.0")]
#[command(next_line_help = false)]
struct Cli {
    /// Use a simulated PT-P700 instead of a USB device
    #[arg(long = "mock", global = true)]
    mock: bool,

    /// Only open this device
    #[arg(short = 'd', long = "device", global = true, value_name = "VID:PID",
          long_help = "Only open this device, e.g. 04f9:2061 [default: any supported model]",
          add = ArgValueCompleter::new(device_completer))]
    device: Option<UsbId>,

    /// Status poll interval in milliseconds
    #[arg(long = "poll-interval-ms", global = true, default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Log more (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported printer models and tapes
    Devices,
    /// Get status information from P-Touch
    Status,
    /// Send a PNG image to P-Touch
    Print(PrintArgs),
    /// Print every status change until Ctrl-C
    Watch,
    /// Generate shell completion scripts
    Completion(CompletionArgs),
}

#[derive(Args)]
struct PrintArgs {
    /// Chain printing: do not feed and cut after the label
    #[arg(short = 'c', long = "chain")]
    chain: bool,

    /// PNG file to print; image height runs across the tape [default: stdin]
    png_file: Option<PathBuf>,
}

#[derive(Args)]
struct CompletionArgs {
    /// Shell type
    #[arg(value_enum)]
    shell: clap_complete::Shell,
}

impl Cli {
    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            transport: if self.mock {
                TransportKind::Mock
            } else {
                TransportKind::Usb
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            device: self.device,
            ..DriverConfig::default()
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn connect(config: DriverConfig) -> Result<Printer<AnyTransport>> {
    let printer = Printer::from_config(config);
    printer.connect().await?;
    Ok(printer)
}

fn handle_devices_command() -> Result<()> {
    println!("{:<10} {:<24} {:>6} {:>4}  Capabilities", "VID:PID", "Model", "Dots", "DPI");
    for device in catalog::DEVICE_TYPES {
        println!(
            "{:<10} {:<24} {:>6} {:>4}  {}",
            device.usb.to_string(),
            device.name,
            device.max_width_px,
            device.dpi,
            device.capabilities
        );
    }
    println!();
    println!("Tapes:");
    for tape in tape::TAPES {
        println!("  {}", tape);
    }
    Ok(())
}

async fn handle_status_command(config: DriverConfig) -> Result<()> {
    let printer = connect(config).await?;

    if let Some(device) = printer.device_type() {
        println!("Device: {} ({})", device.name, device.usb);
    }
    if let Some(reason) = printer.capability_check() {
        println!("Unsupported: {}", reason);
    }
    match printer.tape_info() {
        Some(tape) => println!("Tape: {}", tape),
        None => println!("Tape: unknown"),
    }
    if let Some(status) = printer.status() {
        print!("{}", status);
    }

    printer.disconnect().await;
    Ok(())
}

async fn handle_print_command(config: DriverConfig, args: PrintArgs) -> Result<()> {
    // Read PNG data
    let png_data = match &args.png_file {
        Some(path) => std::fs::read(path)?,
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };
    let bitmap = Bitmap::from_png_data(&png_data)?;

    let printer = connect(config).await?;

    if let Some(reason) = printer.capability_check() {
        let message = format!("Cannot print on {}: {}", printer.device_name(), reason);
        printer.disconnect().await;
        return Err(message.into());
    }

    // The printhead is wider than most tapes; dots past the tape are lost
    if let Some(tape) = printer.tape_info()
        && bitmap.height() > tape.width_px as usize
    {
        warn!(
            "image is {} dots tall but {} mm tape prints only {} dots",
            bitmap.height(),
            tape.width_mm,
            tape.width_px
        );
    }

    info!("Starting print...");
    let result = printer.print(&bitmap, args.chain).await;
    printer.disconnect().await;
    result?;

    info!("Print command sent successfully");
    Ok(())
}

async fn handle_watch_command(config: DriverConfig) -> Result<()> {
    let printer = connect(config).await?;
    println!("Watching {} (Ctrl-C to stop)", printer.device_name());
    if let Some(status) = printer.status() {
        print!("{}", status);
    }

    printer.add_status_listener(|status| {
        println!("--- status changed ---");
        print!("{}", status);
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut check = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            _ = check.tick() => {
                if !printer.is_connected() {
                    printer.disconnect().await;
                    return Err("Printer disconnected".into());
                }
            }
        }
    }

    printer.disconnect().await;
    Ok(())
}

fn handle_completion_command(args: CompletionArgs) -> Result<()> {
    match args.shell {
        clap_complete::Shell::Zsh => {
            // Generate dynamic completion script for zsh using CompleteEnv
            unsafe {
                std::env::set_var("COMPLETE", "zsh");
            }
            CompleteEnv::with_factory(Cli::command).complete();
        }
        _ => {
            // Generate static completion for other shells
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "ptouch", &mut io::stdout());
        }
    }
    Ok(())
}

/// Complete `--device` with the catalog's USB ids, the model name as help.
fn device_completer(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let Some(current) = current.to_str() else {
        return vec![];
    };
    catalog::DEVICE_TYPES
        .iter()
        .map(|device| (device.usb.to_string(), device.name))
        .filter(|(id, _)| id.starts_with(current))
        .map(|(id, name)| CompletionCandidate::new(id).help(Some(name.into())))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Check for dynamic completion first
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.driver_config();

    match cli.command {
        Commands::Devices => handle_devices_command()?,
        Commands::Status => handle_status_command(config).await?,
        Commands::Print(args) => handle_print_command(config, args).await?,
        Commands::Watch => handle_watch_command(config).await?,
        Commands::Completion(args) => handle_completion_command(args)?,
    }

    Ok(())
}
