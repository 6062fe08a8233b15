//! # Agora - Opportunistic Blackboard Engine
//!
//! The command-line binary for the Agora engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/agora (THE BINARY)               │
//! │                                                      │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │    CLI      │  │ ROI directory│  │ agora.toml  │  │
//! │  │   (clap)    │  │   (JSON)     │  │   (toml)    │  │
//! │  └──────┬──────┘  └──────┬───────┘  └──────┬──────┘  │
//! │         └────────────────┼─────────────────┘         │
//! │                          ▼                           │
//! │                  ┌───────────────┐                   │
//! │                  │  agora-core   │                   │
//! │                  │  (THE BOARD)  │                   │
//! │                  └───────────────┘                   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! agora check -m model.toml
//! agora run -m model.toml -r rois/ -o run.agrs -n first
//! agora archive list
//! agora hash -i run.agrs
//! ```

use agora::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // AGORA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("AGORA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agora=info,agora_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Agora startup banner.
fn print_banner() {
    println!(
        r#"
   █████╗  ██████╗  ██████╗ ██████╗  █████╗
  ██╔══██╗██╔════╝ ██╔═══██╗██╔══██╗██╔══██╗
  ███████║██║  ███╗██║   ██║██████╔╝███████║
  ██╔══██║██║   ██║██║   ██║██╔══██╗██╔══██║
  ██║  ██║╚██████╔╝╚██████╔╝██║  ██║██║  ██║
  ╚═╝  ╚═╝ ╚═════╝  ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝

  Opportunistic Blackboard Engine v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
