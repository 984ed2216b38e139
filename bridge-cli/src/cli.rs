use std::{
    io::{BufRead, BufReader, Read},
    thread,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Select, Text};
use tokio::sync::mpsc;
use weather_bridge_core::{
    Config, Coordinates, LocationProvider, LocationSourceId, OrchestratorOptions, PositionSource,
    Preferences, TemperatureUnit, UpdateOrchestrator, WeatherCache,
    channel::channel_from_config,
    location::{fixed::FixedPosition, location_source_from_config},
    orchestrator::CONFIG_REFETCH_DELAY,
    provider::fetcher_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-bridge", version, about = "Relay current weather to a wrist-worn device")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Relay weather until interrupted.
    ///
    /// Settings changes are read from stdin, one JSON object per line.
    Run,

    /// Fetch the current weather once and print it.
    Show {
        /// Show Fahrenheit instead of the saved preference.
        #[arg(long)]
        fahrenheit: bool,

        /// Latitude to use instead of the configured location source.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude to use instead of the configured location source.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Configure location, units and the device relay interactively.
    Configure,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run => run_bridge().await,
            Command::Show {
                fahrenheit,
                lat,
                lon,
            } => {
                let coords = lat
                    .zip(lon)
                    .map(|(latitude, longitude)| Coordinates { latitude, longitude });
                show(fahrenheit, coords).await
            }
            Command::Configure => configure(),
        }
    }
}

async fn run_bridge() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let orchestrator = UpdateOrchestrator::new(
        LocationProvider::new(location_source_from_config(&config)?),
        fetcher_from_config(&config)?,
        channel_from_config(&config)?,
        WeatherCache::new(),
        config.temperature_unit(),
    )
    .with_options(OrchestratorOptions {
        refresh_interval: config.refresh_interval(),
        config_refetch_delay: CONFIG_REFETCH_DELAY,
    });

    tracing::info!(
        "Relaying weather every {} min, displaying °{}",
        config.refresh_interval().as_secs() / 60,
        config.temperature_unit().symbol()
    );

    let persist_unit = move |unit: TemperatureUnit| {
        if unit != config.temperature_unit() {
            config.set_temperature_unit(unit);
            if let Err(e) = config.save() {
                tracing::warn!("Failed to persist unit preference: {:#}", e);
            }
        }
    };

    let (tx, rx) = mpsc::channel(16);
    spawn_settings_reader(std::io::stdin(), tx, persist_unit)
        .context("Failed to start the settings reader")?;

    tokio::select! {
        _ = orchestrator.run(rx) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

/// Read settings on a plain OS thread. A read blocked on an open stdin
/// must not keep the runtime alive after Ctrl-C.
fn spawn_settings_reader<R>(
    input: R,
    tx: mpsc::Sender<Preferences>,
    on_unit: impl FnMut(TemperatureUnit) + Send + 'static,
) -> std::io::Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("settings-reader".into())
        .spawn(move || read_settings(BufReader::new(input), tx, on_unit))
}

/// Forward settings objects, one JSON object per line. `on_unit` sees every
/// unit preference before the settings reach the orchestrator.
fn read_settings(
    input: impl BufRead,
    tx: mpsc::Sender<Preferences>,
    mut on_unit: impl FnMut(TemperatureUnit),
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read settings: {}", e);
                break;
            }
        };

        let Some(prefs) = parse_settings_line(&line) else {
            continue;
        };

        if let Some(unit) = prefs.unit() {
            on_unit(unit);
        }

        if tx.blocking_send(prefs).is_err() {
            break;
        }
    }
    tracing::debug!("Settings input closed");
}

fn parse_settings_line(line: &str) -> Option<Preferences> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match Preferences::from_json_str(line) {
        Ok(prefs) => Some(prefs),
        Err(e) => {
            tracing::warn!("Ignoring malformed settings: {}", e);
            None
        }
    }
}

async fn show(fahrenheit: bool, coords: Option<Coordinates>) -> anyhow::Result<()> {
    let config = Config::load()?;

    let source: Box<dyn PositionSource> = match coords {
        Some(coords) => Box::new(FixedPosition::new(coords)),
        None => location_source_from_config(&config)?,
    };
    let location = LocationProvider::new(source);
    let fetcher = fetcher_from_config(&config)?;

    let unit = if fahrenheit {
        TemperatureUnit::Fahrenheit
    } else {
        config.temperature_unit()
    };

    let coords = location
        .get_location()
        .await
        .context("Could not determine location")?;
    let reading = fetcher
        .fetch_current(&coords)
        .await
        .context("Could not fetch current weather")?;

    println!(
        "{}°{} {} ({:.1}°C raw) at {}",
        unit.present(reading.temperature_celsius),
        unit.symbol(),
        reading.condition,
        reading.temperature_celsius,
        coords
    );

    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let sources = LocationSourceId::all().to_vec();
    let current = config.location_source_id().unwrap_or(LocationSourceId::Ip);
    let cursor = sources.iter().position(|s| *s == current).unwrap_or(0);

    let source = Select::new("Location source:", sources)
        .with_starting_cursor(cursor)
        .prompt()?;

    match source {
        LocationSourceId::Fixed => {
            let latitude = CustomType::<f64>::new("Latitude:")
                .with_error_message("Please enter a number, e.g. 52.52")
                .prompt()?;
            let longitude = CustomType::<f64>::new("Longitude:")
                .with_error_message("Please enter a number, e.g. 13.41")
                .prompt()?;

            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                bail!("Coordinates out of range: {latitude}, {longitude}");
            }
            config.set_fixed_location(Coordinates { latitude, longitude });
        }
        LocationSourceId::Ip => config.set_location_source(LocationSourceId::Ip),
    }

    let fahrenheit = Confirm::new("Display temperatures in Fahrenheit?")
        .with_default(config.temperature_unit() == TemperatureUnit::Fahrenheit)
        .prompt()?;
    config.set_temperature_unit(TemperatureUnit::from_fahrenheit_flag(fahrenheit));

    let current_endpoint = config.device_endpoint().unwrap_or("").to_string();
    let endpoint = Text::new("Device relay URL (leave empty for stdout):")
        .with_default(&current_endpoint)
        .prompt()?;
    let endpoint = endpoint.trim();
    config.device.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}
