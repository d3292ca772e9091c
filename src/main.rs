//! LLM Loader command-line entry point
//!
//! Probes hardware, lists and selects backends, and runs background model
//! loads with fallback.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use llm_loader::backend::{BackendManager, HardwarePreference, ManagerEvent};
use llm_loader::config::LoaderConfig;
use llm_loader::error::{Error, Result};
use llm_loader::hardware::{HardwareProvider, SharedHardwareProvider, SystemHardwareProvider};
use llm_loader::loader::{LoadEvent, LoadTask};
use llm_loader::logging;
use llm_loader::monitoring::PerformanceRecorder;
use llm_loader::types::GenerationConfig;
use llm_loader::version;

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        Commands::Backends { config, .. }
        | Commands::Hardware { config, .. }
        | Commands::Select { config, .. }
        | Commands::Load { config, .. } => config.clone(),
    };

    let config = LoaderConfig::load(config_path.as_deref())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::BuildInfo::current();
    debug!(version = %build.full_version(), target = %build.target, "Starting LLM Loader");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("llm-loader")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(run_command(cli.command, config, cli.quiet))
}

/// Build the hardware provider and manager described by `config`
fn build_manager(config: &LoaderConfig) -> Result<BackendManager> {
    let hardware: SharedHardwareProvider = Arc::new(SystemHardwareProvider::from_settings(&config.hardware));
    let recorder = Arc::new(PerformanceRecorder::new(config.monitoring.history_size));
    BackendManager::from_config(config, hardware, recorder)
}

async fn run_command(command: Commands, config: LoaderConfig, quiet: bool) -> Result<()> {
    match command {
        Commands::Backends { json, .. } => list_backends(&config, json),
        Commands::Hardware { json, .. } => show_hardware(&config, json),
        Commands::Select { size_mb, prefer, .. } => {
            let preference = match prefer {
                Some(p) => p.parse()?,
                None => config.hardware_preference()?,
            };
            select_backend(&config, size_mb, preference)
        }
        Commands::Load {
            path,
            backend,
            prompt,
            max_tokens,
            temperature,
            report,
            ..
        } => {
            let mut generation = GenerationConfig::default();
            if let Some(n) = max_tokens {
                generation.max_tokens = n;
            }
            if let Some(t) = temperature {
                generation.temperature = t;
            }
            let request = LoadRequest {
                path,
                backend,
                prompt,
                generation,
                report,
                quiet,
            };
            run_load(&config, request).await
        }
        Commands::Version | Commands::Config { .. } => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────
// Inspection Commands
// ─────────────────────────────────────────────────────────────────

fn list_backends(config: &LoaderConfig, json: bool) -> Result<()> {
    let manager = build_manager(config)?;

    if json {
        let statuses: Vec<_> = manager
            .backend_names()
            .iter()
            .filter_map(|name| manager.get_status(name))
            .collect();
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("{:<16} {:<10} {:<5} {:<10} REASON", "NAME", "KIND", "GPU", "STATUS");
    for name in manager.backend_names() {
        let (Some(status), Some(backend)) = (manager.get_status(name), manager.backend_config(name)) else {
            continue;
        };
        println!(
            "{:<16} {:<10} {:<5} {:<10} {}",
            name,
            backend.kind.name(),
            if backend.gpu_enabled { "yes" } else { "no" },
            if status.available { "available" } else { "missing" },
            status.error_message.as_deref().unwrap_or("-"),
        );
    }
    println!();
    println!("Fallback order: {}", manager.fallback_order().join(" -> "));
    Ok(())
}

fn show_hardware(config: &LoaderConfig, json: bool) -> Result<()> {
    let provider = SystemHardwareProvider::from_settings(&config.hardware);
    let info = provider.hardware_info();
    let optimal = provider.optimal_settings();

    if json {
        let value = serde_json::json!({ "hardware": info, "optimal_settings": optimal });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", info.summary());
    for gpu in &info.gpus {
        println!("  {}", gpu.summary());
    }
    let supported: Vec<_> = info.supported_hardware.iter().map(|h| h.as_str()).collect();
    println!("Supported: {}", supported.join(", "));
    println!(
        "Optimal: gpu={} layers={} context={} batch={} threads={}",
        optimal.gpu_enabled, optimal.gpu_layers, optimal.context_size, optimal.batch_size, optimal.threads
    );
    Ok(())
}

fn select_backend(config: &LoaderConfig, size_mb: u64, preference: HardwarePreference) -> Result<()> {
    let manager = build_manager(config)?;

    match manager.get_best_backend(size_mb, preference) {
        Some(name) => {
            println!("{}", name);
            Ok(())
        }
        None => Err(Error::BackendUnavailable {
            name: preference.to_string(),
            reason: format!("no available backend can hold a {} MB model", size_mb),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────
// Load Command
// ─────────────────────────────────────────────────────────────────

struct LoadRequest {
    path: std::path::PathBuf,
    backend: Option<String>,
    prompt: Option<String>,
    generation: GenerationConfig,
    report: bool,
    quiet: bool,
}

async fn run_load(config: &LoaderConfig, request: LoadRequest) -> Result<()> {
    let mut manager = build_manager(config)?;
    manager.subscribe(|event: &ManagerEvent| match event {
        ManagerEvent::FallbackTriggered { from, to, error } => {
            warn!(from = %from, to = %to, error = %error, "Backend failed, falling back");
        }
        ManagerEvent::BackendChanged { backend, path } => {
            info!(backend = %backend, path = %path.display(), "Backend changed");
        }
        ManagerEvent::LoadingProgress { message, percent } => {
            debug!(percent, "{}", message);
        }
    });
    let manager = Arc::new(Mutex::new(manager));

    let mut task = LoadTask::new(&request.path, manager.clone());
    if let Some(ref name) = request.backend {
        task = task.with_backend(name.clone());
    }
    let mut handle = task.spawn();

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal, if !interrupted => {
                info!("Interrupt received, cancelling load");
                interrupted = true;
                handle.cancel();
            }

            event = handle.next_event() => {
                match event {
                    Some(LoadEvent::Progress { message, percent }) => {
                        if !request.quiet {
                            println!("[{:>3}%] {}", percent, message);
                        }
                    }
                    Some(LoadEvent::Loaded { summary }) => {
                        if !request.quiet {
                            println!(
                                "Loaded {} ({} MB, {}) on {} using {}",
                                summary.name, summary.file_size_mb, summary.fingerprint, summary.backend, summary.hardware_used
                            );
                        }
                    }
                    Some(LoadEvent::Failed { message }) => debug!(message = %message, "Load failed"),
                    Some(LoadEvent::Cancelled) => debug!("Load cancelled"),
                    None => break,
                }
            }
        }
    }

    let outcome = handle.wait().await;

    let mut manager = manager.lock().await;
    let result = match outcome {
        Ok(_) => match request.prompt {
            Some(ref prompt) => manager.generate_text(prompt, &request.generation).await.map(|text| {
                println!("{}", text);
            }),
            None => Ok(()),
        },
        Err(e) => Err(e),
    };

    if request.report {
        println!("{}", serde_json::to_string_pretty(&manager.get_monitoring_report())?);
    } else if !request.quiet {
        for (name, stats) in manager.get_statistics() {
            if stats.load_attempts > 0 {
                println!(
                    "{}: {} attempt(s), {:.0}% success, avg {:.2}s",
                    name,
                    stats.load_attempts,
                    stats.success_rate * 100.0,
                    stats.average_load_time
                );
            }
        }
    }

    manager.cleanup().await;
    result
}

// ─────────────────────────────────────────────────────────────────
// Configuration Commands
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = LoaderConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Validate { config } => {
            LoaderConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
