// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bondruck: local receipt print agent.
//
// Entry point. Initialises logging, loads the configuration store and runs
// the selected command (the HTTP agent by default).

mod error;
mod http;
mod services;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use bondruck_core::AgentConfig;
use bondruck_core::types::LogicalPrinter;
use bondruck_print::{LpstatSource, PrintDispatcher, PrintOrchestrator, PrinterSource, backend_for};
use bondruck_render::Renderer;

use error::AgentError;
use http::AppState;
use services::config_store::{CONFIG_FILE, ConfigStore};
use services::{collaborators, data_dir};

#[derive(Debug, Parser)]
#[command(name = "bondruck", version, about = "Local receipt print agent")]
struct Cli {
    /// Configuration file (defaults to <data dir>/config.json).
    #[arg(long, env = "BONDRUCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP print agent.
    Serve,
    /// Send a synthetic receipt through the running agent.
    TestPrint {
        /// Print on the kitchen printer instead of the main one.
        #[arg(long)]
        kitchen: bool,
    },
    /// Open the log directory.
    OpenLogs,
    /// List the printers known to the OS.
    Printers,
    /// Map a logical printer to a device name. A running agent picks the
    /// change up with its next request.
    SetPrinter {
        /// Device name as listed by `bondruck printers`; empty to unset.
        name: String,
        #[arg(long)]
        kitchen: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logging = match telemetry::init(&data_dir::log_dir()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("bondruck: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "bondruck failed");
            ExitCode::FAILURE
        }
    }
}

/// Warn when HTML requests are bound to fail. Returns whether it warned.
fn warn_if_html_unprintable(config: &AgentConfig) -> bool {
    if config.html_converter.is_some() {
        return false;
    }
    warn!("no htmlConverter configured; HTML print requests will fail, only PDF can print");
    true
}

async fn run(cli: Cli) -> Result<ExitCode, AgentError> {
    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir::data_dir().join(CONFIG_FILE));
    let store = ConfigStore::open(config_path)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = store.snapshot();
            info!(
                version = env!("CARGO_PKG_VERSION"),
                backend = ?config.print_backend,
                "bondruck starting"
            );
            warn_if_html_unprintable(&config);
            let orchestrator = PrintOrchestrator::new(
                Arc::new(LpstatSource::new(config.lpstat_command.clone())),
                Renderer::new(),
                PrintDispatcher::new(backend_for(&config)),
            );
            let port = config.port;
            http::serve(
                AppState {
                    orchestrator,
                    config: store,
                },
                port,
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::TestPrint { kitchen } => {
            let printer = if kitchen {
                LogicalPrinter::Kitchen
            } else {
                LogicalPrinter::Main
            };
            let reply = collaborators::trigger_test_print(store.snapshot().port, printer).await?;
            match (&reply.printer, &reply.error) {
                (Some(name), None) => println!("printed on {name} in {} ms", reply.duration_ms),
                (_, Some(err)) => println!("test print failed: {err}"),
                (None, None) => println!("test print finished in {} ms", reply.duration_ms),
            }
            Ok(if reply.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::OpenLogs => {
            collaborators::open_logs(&data_dir::log_dir())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Printers => {
            let source = LpstatSource::new(store.snapshot().lpstat_command.clone());
            let printers = source.list_printers().await?;
            if printers.is_empty() {
                println!("no printers installed");
            }
            for printer in printers {
                let marker = if printer.is_default { "*" } else { " " };
                println!(
                    "{marker} {:<24} {:<10} {}",
                    printer.name,
                    format!("{:?}", printer.status).to_lowercase(),
                    printer.display_name
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::SetPrinter { name, kitchen } => {
            let mut config = (*store.snapshot()).clone();
            let name = name.trim().to_owned();
            if kitchen {
                config.kitchen_printer_name = Some(name.clone()).filter(|n| !n.is_empty());
            } else {
                config.printer_name = name.clone();
            }
            store.save(config)?;
            info!(path = %store.path().display(), %name, kitchen, "printer mapping saved");
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["bondruck"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_kitchen_test_print_with_config() {
        let cli = Cli::try_parse_from([
            "bondruck",
            "test-print",
            "--kitchen",
            "--config",
            "/etc/bondruck.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::TestPrint { kitchen: true })));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/bondruck.json")));
    }

    #[test]
    fn missing_converter_is_flagged_at_startup() {
        let mut config = AgentConfig::default();
        assert!(warn_if_html_unprintable(&config));
        config.html_converter = Some(bondruck_core::config::ConverterConfig {
            program: "wkhtmltopdf".into(),
            args: vec!["{input}".into(), "{output}".into()],
        });
        assert!(!warn_if_html_unprintable(&config));
    }

    #[test]
    fn parses_set_printer() {
        let cli = Cli::try_parse_from(["bondruck", "set-printer", "TM-T88", "--kitchen"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::SetPrinter { ref name, kitchen: true }) if name == "TM-T88"
        ));
    }
}
