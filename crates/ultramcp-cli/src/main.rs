//! UltraMCP CLI
//!
//! Command-line interface for inspecting and operating the gateway:
//! provider readiness, pricing cache, tracking database, and credentials.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use ultramcp_config::ConfigStore;
use ultramcp_core::types::ProviderKind;
use ultramcp_pricing::{format_cost, PricingService, PricingServiceConfig};
use ultramcp_router::ProviderRegistry;
use ultramcp_tracking::RequestTracker;

#[derive(Parser)]
#[command(name = "ultramcp")]
#[command(about = "UltraMCP - Unified multi-provider AI gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check provider configuration and environment health
    Doctor {
        /// Issue a minimal test request against each configured provider
        #[arg(long)]
        test: bool,
    },
    /// Inspect and manipulate the pricing cache
    Pricing {
        #[command(subcommand)]
        command: PricingCommands,
    },
    /// Inspect request tracking data
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Manage provider credentials
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PricingCommands {
    /// Show pricing for a model
    Show { model: String },
    /// Calculate the cost of a call
    Calculate {
        model: String,
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Force a refresh of the pricing catalog
    Refresh,
    /// Drop both cache layers
    Clear,
    /// Show cache freshness and size
    Info,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Show recent request records
    Show {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show aggregate tracking statistics
    Stats,
    /// Show one tracking record in full, including payloads
    View {
        /// Request record id
        id: String,
    },
    /// List conversation sessions
    Sessions {
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (keys redacted)
    Show,
    /// Print the config file path
    Path,
    /// Set a provider API key
    SetKey {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        key: String,
    },
    /// Set a provider base URL
    SetBaseUrl {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        url: String,
    },
    /// Set the Azure resource name
    SetAzureResource {
        #[arg(long)]
        name: String,
    },
    /// Remove the config file
    Reset,
}

fn data_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(windows) {
        base.join("ultra-mcp-nodejs")
    } else {
        base.join("ultra-mcp")
    }
}

fn pricing_service() -> PricingService {
    PricingService::new(PricingServiceConfig::with_default_cache_dir())
}

async fn registry() -> anyhow::Result<ProviderRegistry> {
    let config = ConfigStore::new()?.get_config()?;
    let tracker = RequestTracker::new(
        &data_dir().join("ultra-mcp.db"),
        Arc::new(pricing_service()),
    )
    .await?;
    Ok(ProviderRegistry::from_config(&config, tracker)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor { test } => return doctor(test).await,

        Commands::Pricing { command } => {
            let service = pricing_service();
            match command {
                PricingCommands::Show { model } => {
                    let data = service.get_latest_pricing(false).await?;
                    match ultramcp_pricing::normalize::lookup(&data, &model) {
                        Some((name, pricing)) => {
                            println!("{name}: {}", serde_json::to_string_pretty(pricing)?);
                        }
                        None => println!("No pricing entry for '{model}'"),
                    }
                }
                PricingCommands::Calculate {
                    model,
                    input_tokens,
                    output_tokens,
                } => match service.calculate_cost(&model, input_tokens, output_tokens).await? {
                    Some(cost) => {
                        println!("input:  {}", format_cost(cost.input_cost));
                        println!("output: {}", format_cost(cost.output_cost));
                        println!("total:  {}", format_cost(cost.total_cost));
                        if cost.tiered_applied {
                            println!("(above-200k tier applied)");
                        }
                    }
                    None => println!("No pricing entry for '{model}'"),
                },
                PricingCommands::Refresh => {
                    let data = service.get_latest_pricing(true).await?;
                    println!("Refreshed pricing for {} models", data.len());
                }
                PricingCommands::Clear => {
                    service.clear_cache().await?;
                    println!("Pricing cache cleared");
                }
                PricingCommands::Info => {
                    let (memory_age, disk_meta, model_count) = service.cache_info().await;
                    match memory_age {
                        Some(age) => println!("memory: {model_count} models, {}s old", age.as_secs()),
                        None => println!("memory: empty"),
                    }
                    match disk_meta {
                        Some(meta) => println!(
                            "disk: fetched at {} from {} (ttl {}s)",
                            meta.timestamp, meta.source_url, meta.ttl_secs
                        ),
                        None => println!("disk: no cache file"),
                    }
                }
            }
        }

        Commands::Db { command } => {
            let registry = registry().await?;
            let tracker = registry.tracker();
            match command {
                DbCommands::Show { limit } => {
                    for record in tracker.recent(limit).await? {
                        println!(
                            "{} {} {}/{} {:?} tokens={} cost={}",
                            record.started_at.format("%Y-%m-%d %H:%M:%S"),
                            record.id,
                            record.provider,
                            record.model,
                            record.status,
                            record.total_tokens.unwrap_or(0),
                            format_cost(record.cost_usd.unwrap_or(0.0)),
                        );
                    }
                }
                DbCommands::Stats => {
                    let stats = tracker.stats().await?;
                    println!("requests: {}", stats.total_requests);
                    println!("  success: {}", stats.success_count);
                    println!("  error:   {}", stats.error_count);
                    println!("  pending: {}", stats.pending_count);
                    println!("tokens:   {}", stats.total_tokens);
                    println!("cost:     {}", format_cost(stats.total_cost_usd));
                }
                DbCommands::View { id } => {
                    let record = tracker.get(&id).await?;
                    println!("id:        {}", record.id);
                    println!("status:    {:?}", record.status);
                    println!("provider:  {}", record.provider);
                    println!("model:     {}", record.model);
                    if let Some(tool) = &record.tool_name {
                        println!("tool:      {tool}");
                    }
                    println!("started:   {}", record.started_at.format("%Y-%m-%d %H:%M:%S%.3f"));
                    if let Some(ended) = record.ended_at {
                        println!("ended:     {}", ended.format("%Y-%m-%d %H:%M:%S%.3f"));
                    }
                    if let Some(duration) = record.duration_ms {
                        println!("duration:  {duration}ms");
                    }
                    if let Some(tokens) = record.total_tokens {
                        println!(
                            "tokens:    {} ({} in / {} out)",
                            tokens,
                            record.input_tokens.unwrap_or(0),
                            record.output_tokens.unwrap_or(0),
                        );
                    }
                    if let Some(cost) = record.cost_usd {
                        println!("cost:      {}", format_cost(cost));
                    }
                    if let Some(reason) = &record.finish_reason {
                        println!("finish:    {reason}");
                    }
                    if let Some(error) = &record.error_message {
                        println!("error:     {error}");
                    }
                    if let Some(request) = &record.request_payload {
                        println!("request:   {request}");
                    }
                    if let Some(response) = &record.response_payload {
                        println!("response:  {response}");
                    }
                }
                DbCommands::Sessions { limit, offset } => {
                    let memory =
                        ultramcp_memory::MemoryStore::new(&data_dir().join("ultra-mcp.db")).await?;
                    let page = memory.list_sessions(None, limit, offset).await?;
                    for session in &page.sessions {
                        println!(
                            "{} [{}] messages={} files={} tokens={} cost={}",
                            session.id,
                            session.status.as_str(),
                            session.message_count,
                            session.file_count,
                            session.total_tokens,
                            format_cost(session.total_cost_usd),
                        );
                    }
                    println!(
                        "{} of {} sessions{}",
                        page.sessions.len(),
                        page.total_count,
                        if page.has_more { " (more available)" } else { "" }
                    );
                }
            }
        }

        Commands::Config { command } => {
            let store = ConfigStore::new()?;
            match command {
                ConfigCommands::Show => {
                    let config = store.get_config()?;
                    println!("{config:#?}");
                }
                ConfigCommands::Path => println!("{}", store.config_path().display()),
                ConfigCommands::SetKey { provider, key } => {
                    let kind = parse_provider(&provider)?;
                    store.set_api_key(kind, Some(key))?;
                    println!("API key set for {kind}");
                }
                ConfigCommands::SetBaseUrl { provider, url } => {
                    let kind = parse_provider(&provider)?;
                    store.set_base_url(kind, Some(url))?;
                    println!("Base URL set for {kind}");
                }
                ConfigCommands::SetAzureResource { name } => {
                    store.set_azure_resource_name(Some(name))?;
                    println!("Azure resource name set");
                }
                ConfigCommands::Reset => {
                    store.reset()?;
                    println!("Configuration reset");
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_provider(name: &str) -> anyhow::Result<ProviderKind> {
    ProviderKind::parse(name)
        .ok_or_else(|| anyhow::anyhow!("unknown provider '{name}' (expected one of: azure, openai, gemini, grok, bailian, openai-compatible)"))
}

/// Print the configuration checklist. Exits non-zero iff no provider is
/// configured.
async fn doctor(test: bool) -> anyhow::Result<ExitCode> {
    let registry = registry().await?;
    let configured = registry.configured_providers();

    println!("UltraMCP doctor");
    println!("---------------");
    for kind in ProviderKind::PRIORITY {
        let ready = configured.contains(&kind);
        let marker = if ready { "ok " } else { "-- " };
        println!("{marker}{kind}");
    }

    if configured.is_empty() {
        println!();
        println!("No provider is configured.");
        println!("Run `ultramcp config set-key --provider <name> --key <key>` to add one.");
        return Ok(ExitCode::FAILURE);
    }

    if test {
        println!();
        for kind in configured {
            let request = ultramcp_core::types::GenerateRequest {
                provider: Some(kind),
                prompt: "Reply with the single word: pong".to_string(),
                max_output_tokens: Some(16),
                ..Default::default()
            };
            match registry.generate(request).await {
                Ok(response) => println!("ok  {kind}: {}", response.model),
                Err(e) => println!("ERR {kind}: {e}"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
