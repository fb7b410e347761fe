mod cli;
mod config;
mod datasources;
mod db;
mod error;
mod logic;
mod models;
mod mqtt;
mod state;
mod web;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use datasources::OpenWeatherMapClient;
use dialoguer::Confirm;
use logic::{AdvisorService, CycleOutcome, DecisionEngine};
use models::{rain_intensity_label, RainOutlook};
use mqtt::MqttPublisher;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use web::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Init = cli.command {
        return run_init();
    }

    let config = Config::load(cli.config.clone()).context("Configuration error")?;
    let data_dir = cli.data_dir.as_ref();

    match cli.command {
        Commands::Advise { json, dry_run } => {
            let advisor = build_advisor(&config, data_dir)?;
            let outcome = if dry_run {
                advisor.run_cycle().await
            } else {
                advisor.advise().await
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            if let Some(error) = outcome.error {
                bail!("Advisor cycle failed: {}", error);
            }
        }
        Commands::Publish { dry_run } => {
            let advisor = build_advisor(&config, data_dir)?;
            let outcome = advisor.advise().await;
            print_outcome(&outcome);

            let publisher = MqttPublisher::new(config.mqtt.clone()).dry_run(dry_run);
            let report = publisher
                .publish_cycle(&outcome.message, outcome.recommendation.as_ref())
                .await?;

            println!();
            for result in &report.results {
                let status = match (&result.error, result.delivered, report.dry_run) {
                    (_, _, true) => "dry-run".to_string(),
                    (_, true, _) => "ok".to_string(),
                    (Some(e), false, _) => format!("FAILED ({})", e),
                    (None, false, _) => "FAILED".to_string(),
                };
                println!("  {:<40} {}", result.topic, status);
            }
            if !report.success() {
                bail!("No MQTT message was delivered");
            }
        }
        Commands::Serve => {
            let advisor = build_advisor(&config, data_dir)?;
            let app_state = Arc::new(AppState {
                advisor,
                publisher: MqttPublisher::new(config.mqtt.clone()),
            });
            web::serve(app_state, &config.server).await?;
        }
        Commands::Listen => {
            let store = state::open_store(&config, data_dir)?;
            mqtt::run_feedback_listener(&config.mqtt, store).await?;
        }
        Commands::Status => {
            let store = state::open_store(&config, data_dir)?;
            print_status(store.as_ref())?;
        }
        Commands::Mark { amount, notes } => {
            if amount < 0.0 {
                bail!("Amount must not be negative");
            }
            let store = state::open_store(&config, data_dir)?;
            let entry = store.mark_executed(Some(amount), notes)?;
            println!(
                "Irrigation marked as executed: {:.1} L/m² ({})",
                entry.applied_amount(),
                entry.kind.as_str()
            );
        }
        Commands::Clear { yes } => {
            let store = state::open_store(&config, data_dir)?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!(
                        "Delete the irrigation log ({} backend)?",
                        store.backend_name()
                    ))
                    .default(false)
                    .interact()?;
            if confirmed {
                store.clear()?;
                println!("Irrigation log cleared.");
            } else {
                println!("Aborted.");
            }
        }
        Commands::Rain { json } => {
            let client = OpenWeatherMapClient::new(config.openweathermap.clone());
            run_rain(&client, json).await?;
        }
        Commands::Check => run_check(&config, data_dir).await?,
        // Handled before the config is loaded
        Commands::Init => {}
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_advisor(
    config: &Config,
    data_dir: Option<&PathBuf>,
) -> anyhow::Result<AdvisorService<OpenWeatherMapClient>> {
    let store = state::open_store(config, data_dir)?;
    let client = OpenWeatherMapClient::new(config.openweathermap.clone());
    Ok(AdvisorService::new(client, store, config))
}

fn run_init() -> anyhow::Result<()> {
    if Config::exists(None) {
        let overwrite = Confirm::new()
            .with_prompt("A config already exists. Overwrite it?")
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Keeping existing config.");
            return Ok(());
        }
    }

    Config::setup_interactive()?;
    println!("Run `irrigation-advisor check` to test the connections.");
    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    let msg = &outcome.message;

    match &outcome.recommendation {
        Some(rec) => {
            let a = &rec.analysis;
            println!("Irrigation recommendation");
            println!("  Action:      {} ({}% confidence)", rec.action, rec.confidence_percent);
            println!("  Amount:      {:.1} L/m²", rec.amount_lpm2());
            for reason in &rec.reasons {
                println!("  Reason:      {}", reason);
            }
            println!();
            println!("Analysis");
            println!("  Soil moisture deficit: {:.1} mm", a.soil_moisture_deficit_mm);
            println!("  Rain next 3 days:      {:.1} mm", a.upcoming_rain_3days_mm);
            println!("  Water loss next 3 days: {:.1} mm", a.expected_water_loss_3days_mm);
            println!(
                "  Now: {:.1}°C, {:.0}% humidity, {}{}",
                a.current_conditions.temperature,
                a.current_conditions.humidity,
                a.current_conditions.description,
                if a.currently_raining {
                    format!(" ({:.1} mm/h)", a.current_rain_intensity)
                } else {
                    String::new()
                }
            );
            for day in &a.forecast_highlights {
                println!(
                    "  {}: max {:.1}°C, rain {:.1} mm",
                    day.date.format("%a %m-%d"),
                    day.temp_max,
                    day.expected_rain
                );
            }
        }
        None => {
            println!("No recommendation could be made.");
            if let Some(error) = &outcome.error {
                println!("  Error: {}", error);
            }
        }
    }

    println!();
    println!("Published message");
    println!("  watering_required: {}", msg.watering_required);
    println!("  water_amount_lpm2: {}", msg.water_amount_lpm2);
    println!("  reason:            {}", msg.reason);
}

fn print_status(store: &dyn state::StateStore) -> anyhow::Result<()> {
    let now = Utc::now();
    let summary = store.status_summary(now)?;
    let recent = store.recent_irrigation(48, now)?;

    println!("Irrigation state ({} backend)", store.backend_name());
    match summary.last_recommendation.time {
        Some(time) => println!(
            "  Last recommendation: {:.1} L/m² at {} ({})",
            summary.last_recommendation.amount,
            time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            if summary.last_recommendation.executed {
                "executed"
            } else {
                "pending"
            }
        ),
        None => println!("  Last recommendation: none"),
    }
    println!("  Pending recommendations: {}", summary.pending_recommendations);
    println!(
        "  Last 24h: {} irrigation(s), {:.1} L/m²",
        summary.recent_24h.count, summary.recent_24h.total_amount
    );

    println!();
    if recent.is_empty() {
        println!("No irrigation in the last 48 hours.");
    } else {
        println!("Last 48 hours");
        for entry in recent.iter().take(10) {
            let at = entry.execution_timestamp.unwrap_or(entry.timestamp);
            println!(
                "  {}  {:>5.1} L/m²  {}",
                at.with_timezone(&chrono::Local).format("%m-%d %H:%M"),
                entry.applied_amount(),
                entry.notes.as_deref().unwrap_or(&entry.reason)
            );
        }
    }
    Ok(())
}

async fn run_rain(client: &OpenWeatherMapClient, json: bool) -> anyhow::Result<()> {
    let forecast = client.fetch_forecast().await?;
    let current = client.fetch_current().await?;
    let outlook = RainOutlook::from_forecast(&forecast);

    if json {
        let value = serde_json::json!({
            "currently_raining": current.is_raining,
            "current_rain_intensity": current.rain_intensity,
            "outlook": outlook,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if current.is_raining {
        println!("Raining now: {:.1} mm/h", current.rain_intensity);
    } else {
        println!("Not raining now ({})", current.description);
    }
    println!();

    println!("Rain outlook ({} days)", outlook.forecast_days);
    for day in &outlook.daily_rain {
        println!(
            "  {}  {:>5.1} mm  {}",
            day.date.format("%a %m-%d"),
            day.rain_mm,
            rain_intensity_label(day.rain_mm)
        );
    }
    println!();
    println!(
        "Total: {:.1} mm over {} rainy day(s), {} dry",
        outlook.total_expected_rain, outlook.rainy_days_count, outlook.dry_days_count
    );
    if let Some(heaviest) = outlook.heaviest_day {
        println!(
            "Heaviest: {} with {:.1} mm",
            heaviest.date.format("%a %m-%d"),
            heaviest.rain_mm
        );
    }
    Ok(())
}

async fn run_check(config: &Config, data_dir: Option<&PathBuf>) -> anyhow::Result<()> {
    println!("Config: OK");
    println!(
        "  Location: {:.4}, {:.4} ({} days of history)",
        config.openweathermap.latitude,
        config.openweathermap.longitude,
        config.openweathermap.history_days
    );

    let mut healthy = true;

    let advisor = build_advisor(config, data_dir)?;
    println!("State store: OK ({} backend)", advisor.store().backend_name());

    match advisor.provider().test_connection().await {
        Ok(true) => println!("OpenWeatherMap: OK"),
        Ok(false) => {
            healthy = false;
            println!("OpenWeatherMap: FAILED (check api_key)");
        }
        Err(e) => {
            healthy = false;
            println!("OpenWeatherMap: FAILED ({})", e);
        }
    }

    if config.mqtt.enabled {
        match MqttPublisher::new(config.mqtt.clone()).test_connection().await {
            Ok(()) => println!("MQTT ({}:{}): OK", config.mqtt.broker, config.mqtt.port),
            Err(e) => {
                healthy = false;
                println!("MQTT ({}:{}): FAILED ({})", config.mqtt.broker, config.mqtt.port, e);
            }
        }
    } else {
        println!("MQTT: disabled");
    }

    println!();
    println!("Decision rules, in order:");
    for (id, name) in DecisionEngine::new().list_rules() {
        println!("  {:<20} {}", id, name);
    }

    if !healthy {
        bail!("One or more connections failed");
    }
    Ok(())
}
