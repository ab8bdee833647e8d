use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use futures::stream;
use futures_util::StreamExt;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, warn};
use crate::config::FlowSettings;
use crate::handlers::geocoder::FallbackGeocoder;
use crate::handlers::geolocation::{GeolocationProvider, PositionStream};
use crate::models::error::{LocationError, LocationErrorKind, Severity};
use crate::models::position::{Coordinate, PositionFix, PositionOptions};
use crate::models::view::MonitorPhase;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Phase(MonitorPhase),
    Fix(PositionFix),
    Error(LocationError),
    ErrorCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorState {
    None,
    Recoverable,
    Terminal,
}

/// The receiving side hung up; nothing left to report to.
struct Detached;

type FirstFix = Pin<Box<dyn Future<Output = Result<Coordinate, LocationError>> + Send>>;

/// Turns the device capability into a sequence of `SourceEvent`s: first fix,
/// standard watch, escalation to high accuracy, error debounce and fallback
/// geocoding. Runs until permission is denied or the receiver goes away;
/// watches and timers are owned by `run` and released when it returns or is
/// aborted.
pub struct PositionSource {
    provider: Arc<dyn GeolocationProvider>,
    geocoder: Arc<dyn FallbackGeocoder>,
    fallback_query: String,
    settings: FlowSettings,
    events: mpsc::Sender<SourceEvent>,
    error_state: ErrorState,
    last_handled: HashMap<LocationErrorKind, Instant>,
    fallback_cache: Option<Coordinate>,
    phase: MonitorPhase,
}

impl PositionSource {
    pub fn new(provider: Arc<dyn GeolocationProvider>,
               geocoder: Arc<dyn FallbackGeocoder>,
               fallback_query: String,
               settings: FlowSettings,
               events: mpsc::Sender<SourceEvent>) -> Self {
        Self {
            provider,
            geocoder,
            fallback_query,
            settings,
            events,
            error_state: ErrorState::None,
            last_handled: HashMap::new(),
            fallback_cache: None,
            phase: MonitorPhase::Idle,
        }
    }

    pub async fn run(mut self) {
        match self.monitor().await {
            Ok(()) => {
                self.emit(SourceEvent::Phase(MonitorPhase::Stopped)).await.ok();
            }
            Err(Detached) => debug!("Position source detached"),
        }
    }

    async fn monitor(&mut self) -> Result<(), Detached> {
        if !self.provider.is_supported() {
            info!("Geolocation unsupported, going straight to fallback");
            self.handle_error(LocationError::Unsupported).await?;
            return Ok(());
        }

        let provider = self.provider.clone();
        let mut first_fix: Option<FirstFix> = Some(Box::pin(async move {
            provider.current_position(PositionOptions::STANDARD).await
        }));
        let mut watch: PositionStream = self.provider.watch_position(PositionOptions::STANDARD);
        let mut escalation: Option<Pin<Box<Sleep>>> = None;
        let mut escalated = false;

        self.set_phase(MonitorPhase::AwaitingFirstFix).await?;

        loop {
            let result = select! {
                result = wait_some(&mut first_fix), if first_fix.is_some() => {
                    first_fix = None;
                    result
                }
                item = watch.next() => match item {
                    Some(result) => result,
                    None => {
                        debug!("Device closed the watch");
                        watch = stream::pending().boxed();
                        continue;
                    }
                },
                _ = wait_some(&mut escalation), if escalation.is_some() => {
                    escalation = None;
                    info!("Escalating to high accuracy monitoring");
                    // replacing drops the standard watch, which clears it on the device
                    watch = self.provider.watch_position(PositionOptions::HIGH_ACCURACY);
                    self.set_phase(MonitorPhase::MonitoringHighAccuracy).await?;
                    continue;
                }
            };

            match result.and_then(|c| Coordinate::new(c.latitude, c.longitude)) {
                Ok(coordinate) => {
                    self.emit(SourceEvent::Fix(PositionFix::device(coordinate))).await?;
                    self.clear_error().await?;
                    if self.phase == MonitorPhase::AwaitingFirstFix {
                        self.set_phase(MonitorPhase::MonitoringStandard).await?;
                    }
                    if !escalated {
                        escalated = true;
                        escalation = Some(Box::pin(tokio::time::sleep(self.settings.escalation_delay)));
                    }
                }
                Err(e) => {
                    self.handle_error(e).await?;
                    if self.error_state == ErrorState::Terminal {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_error(&mut self, error: LocationError) -> Result<(), Detached> {
        let now = Instant::now();
        let kind = error.kind();
        if let Some(last) = self.last_handled.get(&kind) {
            if now.saturating_duration_since(*last) < self.settings.error_debounce {
                debug!("Suppressing repeated {:?}", kind);
                return Ok(());
            }
        }
        self.last_handled.insert(kind, now);

        warn!("Location error: {}", error);
        let entering_recoverable = self.error_state == ErrorState::None;
        self.error_state = match error.severity() {
            Severity::Terminal => ErrorState::Terminal,
            Severity::Recoverable => ErrorState::Recoverable,
        };
        self.emit(SourceEvent::Error(error.clone())).await?;

        if entering_recoverable && error.allows_fallback() {
            self.fallback().await?;
        }
        Ok(())
    }

    async fn fallback(&mut self) -> Result<(), Detached> {
        let coordinate = match self.fallback_cache {
            Some(coordinate) => Some(coordinate),
            None => match self.geocoder.geocode(&self.fallback_query).await {
                Ok(coordinate) => {
                    self.fallback_cache = Some(coordinate);
                    Some(coordinate)
                }
                Err(e) => {
                    warn!("Fallback geocoding failed: {}", e);
                    None
                }
            },
        };

        match coordinate {
            Some(coordinate) => {
                info!("Using approximate location for {:?}", self.fallback_query);
                self.emit(SourceEvent::Fix(PositionFix::approximate(coordinate))).await?;
                self.clear_error().await
            }
            None if !self.provider.is_supported() => {
                self.error_state = ErrorState::Terminal;
                self.emit(SourceEvent::Error(LocationError::NoLocationSource)).await
            }
            None => self.emit(SourceEvent::Error(LocationError::Unresolved)).await,
        }
    }

    async fn clear_error(&mut self) -> Result<(), Detached> {
        if self.error_state == ErrorState::None {
            return Ok(());
        }
        self.error_state = ErrorState::None;
        self.emit(SourceEvent::ErrorCleared).await
    }

    async fn set_phase(&mut self, phase: MonitorPhase) -> Result<(), Detached> {
        self.phase = phase;
        self.emit(SourceEvent::Phase(phase)).await
    }

    async fn emit(&self, event: SourceEvent) -> Result<(), Detached> {
        self.events.send(event).await.map_err(|_| Detached)
    }
}

async fn wait_some<F: Future + Unpin>(future: &mut Option<F>) -> F::Output {
    match future.as_mut() {
        Some(future) => future.await,
        None => futures::future::pending().await,
    }
}
