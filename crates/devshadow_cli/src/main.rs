//! Device shadow CLI
//!
//! Command-line driver for the device shadow engine.
//!
//! # Commands
//!
//! - `simulate` - Run a device against an in-process simulated cloud
//! - `format` - Print the request a set of attributes would produce

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Device shadow command-line tools.
#[derive(Parser)]
#[command(name = "devshadow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Product key of the device
    #[arg(global = true, short, long, default_value = "demo-product")]
    product_key: String,

    /// Name of the device
    #[arg(global = true, short, long, default_value = "demo-device")]
    device_name: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a device against an in-process simulated cloud
    Simulate {
        /// Attributes to register, as name=value
        #[arg(short, long = "attr", default_values = ["temp=21", "online=true"])]
        attrs: Vec<String>,

        /// Desired values pushed by the cloud, as name=value
        #[arg(short = 'D', long = "desired")]
        desired: Vec<String>,

        /// Attribute to delete before shutting down
        #[arg(short = 'x', long)]
        delete: Option<String>,

        /// Request timeout in milliseconds
        #[arg(short, long, default_value = "2000")]
        timeout_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the request a set of attributes would produce
    Format {
        /// Request method (update, delete, get)
        #[arg(short, long, default_value = "update")]
        method: String,

        /// Buffer capacity in bytes
        #[arg(short, long, default_value = "256")]
        capacity: usize,

        /// Attributes as name=value
        fields: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            attrs,
            desired,
            delete,
            timeout_ms,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                product_key: cli.product_key,
                device_name: cli.device_name,
                attributes: commands::parse_fields(&attrs)?,
                desired: commands::parse_fields(&desired)?,
                delete,
                timeout_ms,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Format {
            method,
            capacity,
            fields,
        } => {
            let fields = commands::parse_fields(&fields)?;
            commands::format::run(
                &cli.product_key,
                &cli.device_name,
                &method,
                capacity,
                &fields,
            )?;
        }
        Commands::Version => {
            println!("devshadow CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
