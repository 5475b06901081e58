// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MTConnect agent daemon.
//!
//! # Usage
//!
//! ```bash
//! # Start with a configuration file
//! mtcagentd --config agent.toml
//!
//! # Override the HTTP port
//! mtcagentd --config agent.toml --port 7001
//!
//! # Generate an example configuration file
//! mtcagentd gen-config --output agent.toml
//!
//! # Validate a configuration file
//! mtcagentd validate --config agent.toml
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mtcagent::config::{AdapterConfig, DeviceConfig};
use mtcagent::{Agent, AgentConfig};

/// MTConnect agent: SHDR ingest, observation storage, XML query service.
#[derive(Parser, Debug)]
#[command(name = "mtcagentd")]
#[command(about = "MTConnect agent daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port override (default from config, 7000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "agent.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config_path = args
        .config
        .ok_or("Missing --config (or use gen-config to create one)")?;
    let mut config = AgentConfig::from_file(&config_path)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let agent = Agent::start(&config)?;

    println!("mtcagentd v{}", env!("CARGO_PKG_VERSION"));
    println!("HTTP: http://{}:{}", config.bind, agent.port());
    println!("Devices: {}", config.devices.len());
    println!("Press Ctrl+C to stop...");

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::Release);
    })?;

    while running.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(200));
    }

    println!("\nShutting down...");
    agent.stop();
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AgentConfig {
        sender: "mtcagent".into(),
        devices: vec![DeviceConfig {
            schema: "devices/vmc-3axis.json".into(),
            xml: Some("devices/vmc-3axis.xml".into()),
            adapter: Some(AdapterConfig {
                host: "127.0.0.1".into(),
                port: 7878,
            }),
        }],
        ..Default::default()
    };

    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!(
        "# MTConnect agent configuration\n# Generated by mtcagentd gen-config\n\n{}",
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match AgentConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Sender: {}", config.sender);
            println!("Port: {}", config.port);
            println!("Buffer: {} observations", config.buffer_capacity);
            println!("Devices: {}", config.devices.len());
            for (i, device) in config.devices.iter().enumerate() {
                match device.adapter {
                    Some(ref adapter) => println!(
                        "  [{}] {} <- {}:{}",
                        i,
                        device.schema.display(),
                        adapter.host,
                        adapter.port
                    ),
                    None => println!("  [{}] {} (no adapter)", i, device.schema.display()),
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
