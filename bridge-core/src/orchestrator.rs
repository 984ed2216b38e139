//! Drives the locate → fetch → deliver cycle.
//!
//! Every cycle ends with exactly one weather message to the device, either a
//! real reading or a fallback. Preference changes are answered from the
//! cache when possible so a unit switch costs no network round trip.
//!
//! Cycles are not serialized against each other: a timer tick and a
//! preference change may both have a cycle in flight, and the cache then
//! keeps whichever reading lands last.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::{
    cache::WeatherCache,
    channel::DeliveryChannel,
    error::{FetchError, LocationError},
    location::LocationProvider,
    model::{Fallback, WeatherReading},
    payload::{DevicePayload, Preferences},
    provider::WeatherFetcher,
    units::TemperatureUnit,
};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Pause before a preference-triggered fetch, so the rest of the settings
/// reach the device first.
pub const CONFIG_REFETCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub refresh_interval: Duration,
    pub config_refetch_delay: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            refresh_interval: REFRESH_INTERVAL,
            config_refetch_delay: CONFIG_REFETCH_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    ConfigChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Locating,
    Fetching,
    Delivering,
    Idle,
}

/// What a cycle ended up sending.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Delivered(WeatherReading),
    NoLocation(LocationError),
    FetchFailed(FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigReaction {
    ServedFromCache(WeatherReading),
    FetchScheduled,
}

#[derive(Debug, Clone)]
pub struct UpdateOrchestrator {
    location: Arc<LocationProvider>,
    fetcher: Arc<dyn WeatherFetcher>,
    channel: Arc<dyn DeliveryChannel>,
    cache: WeatherCache,
    unit: Arc<RwLock<TemperatureUnit>>,
    options: OrchestratorOptions,
}

impl UpdateOrchestrator {
    /// `unit` seeds the first cycle, usually from the persisted preference.
    pub fn new(
        location: LocationProvider,
        fetcher: Box<dyn WeatherFetcher>,
        channel: Box<dyn DeliveryChannel>,
        cache: WeatherCache,
        unit: TemperatureUnit,
    ) -> Self {
        Self {
            location: Arc::new(location),
            fetcher: Arc::from(fetcher),
            channel: Arc::from(channel),
            cache,
            unit: Arc::new(RwLock::new(unit)),
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn unit(&self) -> TemperatureUnit {
        *self.unit.read()
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    /// One full locate → fetch → deliver pass.
    ///
    /// Location and fetch failures become fallback messages; the returned
    /// outcome is for diagnostics only.
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let unit = self.unit();
        enter(trigger, CycleState::Locating);

        let coords = match self.location.get_location().await {
            Ok(coords) => coords,
            Err(e) => {
                tracing::warn!("Location unavailable ({}); sending NO_GPS", e);
                enter(trigger, CycleState::Delivering);
                self.deliver_in_order(vec![(DevicePayload::weather(0, Fallback::NoGps), "weather")]);
                enter(trigger, CycleState::Idle);
                return CycleOutcome::NoLocation(e);
            }
        };

        tracing::info!("Got location: {}", coords);
        enter(trigger, CycleState::Fetching);

        let (payload, outcome) = match self.fetcher.fetch_current(&coords).await {
            Ok(reading) => {
                self.cache.store(reading.clone());
                let temperature = unit.present(reading.temperature_celsius);
                tracing::info!(
                    "Weather: {}°{} {}",
                    temperature,
                    unit.symbol(),
                    reading.condition
                );
                (
                    DevicePayload::weather(temperature, reading.condition),
                    CycleOutcome::Delivered(reading),
                )
            }
            Err(e) => {
                tracing::warn!("Weather fetch failed ({}); sending ERROR", e);
                (
                    DevicePayload::weather(0, Fallback::Error),
                    CycleOutcome::FetchFailed(e),
                )
            }
        };

        enter(trigger, CycleState::Delivering);
        self.deliver_in_order(vec![(payload, "weather")]);
        enter(trigger, CycleState::Idle);
        outcome
    }

    /// React to new settings from the configuration collaborator.
    ///
    /// Cached weather, if any, is sent before the preferences message.
    /// Must be called from within a Tokio runtime: deliveries and the
    /// scheduled fetch run as spawned tasks.
    pub fn on_config_change(&self, prefs: Preferences) -> ConfigReaction {
        if let Some(unit) = prefs.unit() {
            *self.unit.write() = unit;
        }
        let unit = self.unit();

        let (weather, reaction) = match self.cache.retrieve() {
            Some(reading) => {
                let age = chrono::Utc::now() - reading.fetched_at;
                tracing::info!(
                    "Sending cached weather ({}s old) in °{}",
                    age.num_seconds(),
                    unit.symbol()
                );
                let weather = DevicePayload::weather(unit.present(reading.temperature_celsius), reading.condition);
                (Some(weather), ConfigReaction::ServedFromCache(reading))
            }
            None => {
                tracing::info!("No cached weather yet; scheduling a fetch");
                self.spawn_cycle(Trigger::ConfigChange, self.options.config_refetch_delay);
                (None, ConfigReaction::FetchScheduled)
            }
        };

        let mut batch = Vec::with_capacity(2);
        if let Some(weather) = weather {
            batch.push((weather, "weather"));
        }
        batch.push((prefs.payload().clone(), "preferences"));
        self.deliver_in_order(batch);

        reaction
    }

    /// Run for the life of the process: a cycle at startup, another every
    /// refresh interval, and a reaction to every settings event.
    ///
    /// The timer keeps going after `events` closes.
    pub async fn run(self, mut events: mpsc::Receiver<Preferences>) {
        let mut ticker = tokio::time::interval(self.options.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        let mut trigger = Trigger::Startup;
        let mut listening = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_cycle(trigger, Duration::ZERO);
                    trigger = Trigger::Timer;
                }
                event = events.recv(), if listening => match event {
                    Some(prefs) => {
                        self.on_config_change(prefs);
                    }
                    None => {
                        tracing::info!("Settings source closed; continuing on timer only");
                        listening = false;
                    }
                },
            }
        }
    }

    fn spawn_cycle(&self, trigger: Trigger, delay: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.run_cycle(trigger).await;
        });
    }

    /// Fire-and-forget sends, one after another on a single task; outcomes
    /// are only logged and a failed send does not stop the next one.
    fn deliver_in_order(&self, batch: Vec<(DevicePayload, &'static str)>) {
        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move {
            for (payload, kind) in batch {
                match channel.send(&payload).await {
                    Ok(()) => tracing::debug!("Sent {} message to device", kind),
                    Err(e) => tracing::warn!("Failed to send {} message: {}", kind, e),
                }
            }
        });
    }
}

fn enter(trigger: Trigger, state: CycleState) {
    tracing::debug!(?trigger, ?state, "weather cycle");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        condition::ConditionCategory,
        error::DeliveryError,
        location::PositionSource,
        model::Coordinates,
        payload::PayloadValue,
        provider::OpenMeteoProvider,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug)]
    struct StubPosition(Result<Coordinates, LocationError>);

    #[async_trait]
    impl PositionSource for StubPosition {
        async fn current_position(&self) -> Result<Coordinates, LocationError> {
            self.0.clone()
        }
    }

    #[derive(Debug)]
    struct StubFetcher {
        calls: Arc<AtomicUsize>,
        result: Result<(f64, ConditionCategory), FetchError>,
    }

    #[async_trait]
    impl WeatherFetcher for StubFetcher {
        async fn fetch_current(&self, _coords: &Coordinates) -> Result<WeatherReading, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .map(|(celsius, condition)| WeatherReading::new(celsius, condition))
        }
    }

    #[derive(Debug)]
    struct RecordingChannel {
        tx: UnboundedSender<DevicePayload>,
        fail: bool,
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        async fn send(&self, payload: &DevicePayload) -> Result<(), DeliveryError> {
            let _ = self.tx.send(payload.clone());
            if self.fail {
                Err(DeliveryError::Transport("link down".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Weather takes longer on the wire than anything else; records how many
    /// sends overlap and passes payloads on in arrival order.
    #[derive(Debug)]
    struct SlowWeatherChannel {
        tx: UnboundedSender<DevicePayload>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeliveryChannel for SlowWeatherChannel {
        async fn send(&self, payload: &DevicePayload) -> Result<(), DeliveryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let wire = if payload.is_weather() { 30 } else { 5 };
            tokio::time::sleep(Duration::from_millis(wire)).await;

            let _ = self.tx.send(payload.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        orchestrator: UpdateOrchestrator,
        fetches: Arc<AtomicUsize>,
        rx: UnboundedReceiver<DevicePayload>,
    }

    impl Harness {
        async fn next(&mut self) -> DevicePayload {
            tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
                .await
                .expect("timed out waiting for a device message")
                .expect("channel closed")
        }

        /// The weather message must come before the preferences message.
        async fn weather_then_prefs(&mut self) -> (DevicePayload, DevicePayload) {
            let weather = self.next().await;
            let prefs = self.next().await;
            assert!(weather.is_weather(), "expected weather first, got {weather:?}");
            assert!(!prefs.is_weather(), "expected preferences second, got {prefs:?}");
            (weather, prefs)
        }
    }

    fn berlin() -> Coordinates {
        Coordinates {
            latitude: 52.52,
            longitude: 13.41,
        }
    }

    fn build(
        location: Result<Coordinates, LocationError>,
        fetch: Result<(f64, ConditionCategory), FetchError>,
        unit: TemperatureUnit,
        fail_delivery: bool,
    ) -> Harness {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetcher = StubFetcher {
            calls: Arc::clone(&fetches),
            result: fetch,
        };
        build_with(location, Box::new(fetcher), unit, fail_delivery, fetches)
    }

    fn build_with(
        location: Result<Coordinates, LocationError>,
        fetcher: Box<dyn WeatherFetcher>,
        unit: TemperatureUnit,
        fail_delivery: bool,
        fetches: Arc<AtomicUsize>,
    ) -> Harness {
        let (tx, rx) = unbounded_channel();
        let orchestrator = UpdateOrchestrator::new(
            LocationProvider::new(Box::new(StubPosition(location))),
            fetcher,
            Box::new(RecordingChannel {
                tx,
                fail: fail_delivery,
            }),
            WeatherCache::new(),
            unit,
        )
        .with_options(OrchestratorOptions {
            refresh_interval: Duration::from_secs(3600),
            config_refetch_delay: Duration::from_millis(20),
        });

        Harness {
            orchestrator,
            fetches,
            rx,
        }
    }

    fn settings(raw: &str) -> Preferences {
        Preferences::from_json_str(raw).unwrap()
    }

    #[tokio::test]
    async fn location_failure_sends_no_gps_without_fetching() {
        let mut h = build(
            Err(LocationError::PermissionDenied),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );

        let outcome = h.orchestrator.run_cycle(Trigger::Startup).await;

        assert_eq!(outcome, CycleOutcome::NoLocation(LocationError::PermissionDenied));
        assert_eq!(h.next().await, DevicePayload::weather(0, Fallback::NoGps));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
        assert!(h.orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn fetch_timeout_sends_error() {
        let mut h = build(
            Ok(berlin()),
            Err(FetchError::Timeout),
            TemperatureUnit::Celsius,
            false,
        );

        let outcome = h.orchestrator.run_cycle(Trigger::Timer).await;

        assert_eq!(outcome, CycleOutcome::FetchFailed(FetchError::Timeout));
        assert_eq!(h.next().await, DevicePayload::weather(0, Fallback::Error));
        assert!(h.orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn successful_cycle_sends_celsius_and_caches() {
        let mut h = build(
            Ok(berlin()),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );

        let outcome = h.orchestrator.run_cycle(Trigger::Startup).await;

        assert!(matches!(outcome, CycleOutcome::Delivered(_)));
        assert_eq!(h.next().await, DevicePayload::weather(21, ConditionCategory::Cloudy));

        let cached = h.orchestrator.cache().retrieve().unwrap();
        assert_eq!(cached.temperature_celsius, 21.4);
        assert_eq!(cached.condition, ConditionCategory::Cloudy);
    }

    #[tokio::test]
    async fn persisted_fahrenheit_applies_to_first_cycle() {
        let mut h = build(
            Ok(berlin()),
            Ok((0.0, ConditionCategory::Snow)),
            TemperatureUnit::Fahrenheit,
            false,
        );

        h.orchestrator.run_cycle(Trigger::Startup).await;

        assert_eq!(h.next().await, DevicePayload::weather(32, ConditionCategory::Snow));
    }

    #[tokio::test]
    async fn unit_change_is_served_from_cache() {
        let mut h = build(
            Ok(berlin()),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );
        h.orchestrator.run_cycle(Trigger::Startup).await;
        h.next().await;

        let reaction = h
            .orchestrator
            .on_config_change(settings(r#"{"UseFahrenheit": true, "Setting24H": false}"#));

        assert!(matches!(reaction, ConfigReaction::ServedFromCache(_)));
        assert_eq!(h.orchestrator.unit(), TemperatureUnit::Fahrenheit);

        let (weather, prefs) = h.weather_then_prefs().await;
        assert_eq!(weather, DevicePayload::weather(71, ConditionCategory::Cloudy));
        assert_eq!(prefs.get("UseFahrenheit"), Some(&PayloadValue::Bool(true)));
        assert_eq!(prefs.get("Setting24H"), Some(&PayloadValue::Bool(false)));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settings_without_unit_keep_current_unit() {
        let mut h = build(
            Ok(berlin()),
            Ok((-3.6, ConditionCategory::Fog)),
            TemperatureUnit::Celsius,
            false,
        );
        h.orchestrator.run_cycle(Trigger::Startup).await;
        h.next().await;

        h.orchestrator.on_config_change(settings(r#"{"BackgroundColor": 0}"#));

        let (weather, prefs) = h.weather_then_prefs().await;
        assert_eq!(weather, DevicePayload::weather(-4, ConditionCategory::Fog));
        assert_eq!(prefs.get("BackgroundColor"), Some(&PayloadValue::Int(0)));
        assert_eq!(h.orchestrator.unit(), TemperatureUnit::Celsius);
    }

    #[tokio::test]
    async fn config_change_with_empty_cache_schedules_fetch() {
        let mut h = build(
            Ok(berlin()),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );

        let reaction = h
            .orchestrator
            .on_config_change(settings(r#"{"UseFahrenheit": true}"#));
        assert_eq!(reaction, ConfigReaction::FetchScheduled);

        // Preferences go out at once; weather only after the delayed fetch.
        let first = h.next().await;
        assert!(!first.is_weather());
        assert_eq!(first.get("UseFahrenheit"), Some(&PayloadValue::Bool(true)));

        let second = h.next().await;
        assert_eq!(second, DevicePayload::weather(71, ConditionCategory::Cloudy));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
        assert!(!h.orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn missing_current_weather_sends_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latitude": 52.52,
                "longitude": 13.41
            })))
            .mount(&mock_server)
            .await;

        let fetcher = OpenMeteoProvider::with_base_url(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let mut h = build_with(
            Ok(berlin()),
            Box::new(fetcher),
            TemperatureUnit::Celsius,
            false,
            Arc::new(AtomicUsize::new(0)),
        );

        let outcome = h.orchestrator.run_cycle(Trigger::Startup).await;

        assert!(matches!(outcome, CycleOutcome::FetchFailed(FetchError::InvalidData(_))));
        assert_eq!(h.next().await, DevicePayload::weather(0, Fallback::Error));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_later_cycles() {
        let mut h = build(
            Ok(berlin()),
            Ok((10.0, ConditionCategory::Rain)),
            TemperatureUnit::Celsius,
            true,
        );

        h.orchestrator.run_cycle(Trigger::Startup).await;
        h.orchestrator.run_cycle(Trigger::Timer).await;

        assert_eq!(h.next().await, DevicePayload::weather(10, ConditionCategory::Rain));
        assert_eq!(h.next().await, DevicePayload::weather(10, ConditionCategory::Rain));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_loop_fetches_at_startup_and_handles_settings() {
        let mut h = build(
            Ok(berlin()),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );
        let (events_tx, events_rx) = mpsc::channel(4);
        let task = tokio::spawn(h.orchestrator.clone().run(events_rx));

        assert_eq!(h.next().await, DevicePayload::weather(21, ConditionCategory::Cloudy));

        events_tx
            .send(settings(r#"{"UseFahrenheit": true}"#))
            .await
            .unwrap();
        let (weather, _prefs) = h.weather_then_prefs().await;
        assert_eq!(weather, DevicePayload::weather(71, ConditionCategory::Cloudy));

        drop(events_tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cached_weather_reaches_device_before_preferences() {
        let (tx, mut rx) = unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let orchestrator = UpdateOrchestrator::new(
            LocationProvider::new(Box::new(StubPosition(Ok(berlin())))),
            Box::new(StubFetcher {
                calls: Arc::new(AtomicUsize::new(0)),
                result: Ok((21.4, ConditionCategory::Cloudy)),
            }),
            Box::new(SlowWeatherChannel {
                tx,
                in_flight,
                max_in_flight: Arc::clone(&max_in_flight),
            }),
            WeatherCache::new(),
            TemperatureUnit::Celsius,
        );
        orchestrator
            .cache()
            .store(WeatherReading::new(21.4, ConditionCategory::Cloudy));

        orchestrator.on_config_change(settings(r#"{"UseFahrenheit": true}"#));

        let mut arrived = Vec::new();
        for _ in 0..2 {
            let payload = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
                .await
                .expect("timed out waiting for a device message")
                .expect("channel closed");
            arrived.push(payload);
        }

        assert_eq!(arrived[0], DevicePayload::weather(71, ConditionCategory::Cloudy));
        assert_eq!(arrived[1].get("UseFahrenheit"), Some(&PayloadValue::Bool(true)));
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_refetches_every_refresh_interval() {
        let mut h = build(
            Ok(berlin()),
            Ok((21.4, ConditionCategory::Cloudy)),
            TemperatureUnit::Celsius,
            false,
        );
        let refresh = h.orchestrator.options.refresh_interval;
        let (_events_tx, events_rx) = mpsc::channel(4);
        let task = tokio::spawn(h.orchestrator.clone().run(events_rx));

        assert_eq!(h.next().await, DevicePayload::weather(21, ConditionCategory::Cloudy));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);

        tokio::time::advance(refresh - Duration::from_secs(1)).await;
        assert!(h.rx.try_recv().is_err());
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = h.rx.recv().await.expect("channel closed");
        assert_eq!(second, DevicePayload::weather(21, ConditionCategory::Cloudy));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 2);

        task.abort();
    }
}
