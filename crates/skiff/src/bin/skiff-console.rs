//! Interactive console harness for the skiff core.
//!
//! Wires a window controller to a line-based UI surface: type raw
//! `type:content` events on stdin and watch the outbound UI calls on stdout.
//! Useful for exercising the session/dispatch core against a real agent CLI
//! without a hosting application.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use skiff::WindowController;
use skiff::agent::BackendKind;
use skiff::config::BridgeConfig;
use skiff::history::JsonlHistorySource;
use skiff::registry::ControllerRegistry;
use skiff::settings::MemorySettings;
use skiff::ui::{UiSurface, build_call};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "skiff-console", about = "Drive the skiff core from a terminal")]
struct Args {
    /// Agent backend: claude or codex.
    #[arg(long, default_value = "claude")]
    backend: String,

    /// Model id passed to the backend.
    #[arg(long, default_value = skiff::config::DEFAULT_MODEL)]
    model: String,

    /// Project directory; defaults to the current directory.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Agent executable override.
    #[arg(long, env = "SKIFF_AGENT_EXECUTABLE")]
    executable: Option<String>,
}

/// Prints every outbound UI call as a rendered script line.
struct ConsoleUi;

impl UiSurface for ConsoleUi {
    fn invoke(&self, function: &str, args: &[String]) {
        println!("-> {}", build_call(function, args));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let backend: BackendKind = args
        .backend
        .parse()
        .map_err(|err: String| anyhow::anyhow!(err))?;

    let project_path = args
        .project
        .or_else(|| std::env::current_dir().ok());

    let mut config = BridgeConfig {
        backend,
        model: args.model,
        project_path,
        ..BridgeConfig::default()
    };
    if let Some(executable) = args.executable {
        match backend {
            BackendKind::Claude => config.claude_executable = executable,
            BackendKind::Codex => config.codex_executable = executable,
        }
    }

    let history = JsonlHistorySource::default_root()
        .unwrap_or_else(|| JsonlHistorySource::new(PathBuf::from(".")));

    let registry = ControllerRegistry::new();
    let controller = WindowController::new(
        "console",
        config,
        Arc::new(MemorySettings::new()),
        Arc::new(history),
        Arc::new(ConsoleUi),
    )
    .await;
    registry.insert(Arc::clone(&controller));

    println!("skiff console ready; events are `type:content` lines (try `send_message:hello`)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        controller.handle_ui_event(line).await;
    }

    registry.dispose_all().await;
    Ok(())
}
