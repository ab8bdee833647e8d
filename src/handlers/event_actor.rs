use std::sync::Arc;
use chrono::{Datelike, Local, NaiveDate};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use crate::config::FlowSettings;
use crate::handlers::attendance::AttendanceBackend;
use crate::handlers::events::Command;
use crate::handlers::geocoder::FallbackGeocoder;
use crate::handlers::geolocation::GeolocationProvider;
use crate::handlers::position_source::{PositionSource, SourceEvent};
use crate::handlers::proximity::ProximityEvaluator;
use crate::handlers::task::AutoCancelTask;
use crate::handlers::throttle::UpdateThrottle;
use crate::models::attendance::AttendanceOutcome;
use crate::models::error::{LocationError, Severity};
use crate::models::session::Session;
use crate::models::view::{CheckInView, ErrorBanner, Notice};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Why a submit request would be refused right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    PermissionDenied,
    NoFix,
    OutOfRange,
    AlreadyMarked,
    RestDay,
    Pending,
}

pub struct Dependencies {
    pub provider: Arc<dyn GeolocationProvider>,
    pub geocoder: Arc<dyn FallbackGeocoder>,
    pub backend: Arc<dyn AttendanceBackend>,
    pub clock: Arc<dyn Clock>,
}

/// Owns the check-in screen state. Consumes position-source events and user
/// commands, gates and performs the attendance submission, and republishes
/// the `CheckInView` after every message.
pub struct CheckInActor {
    session: Session,
    settings: FlowSettings,
    deps: Dependencies,
    commands: mpsc::Receiver<Command>,
    view_tx: watch::Sender<CheckInView>,
    view: CheckInView,
    throttle: UpdateThrottle,
    evaluator: ProximityEvaluator,
    source: Option<AutoCancelTask<()>>,
    source_events: mpsc::Receiver<SourceEvent>,
    outcome_tx: mpsc::Sender<AttendanceOutcome>,
    outcome_rx: mpsc::Receiver<AttendanceOutcome>,
    submission: Option<AutoCancelTask<()>>,
    marked_on: Option<NaiveDate>,
    permission_denied: bool,
    // a terminal location error; retry is ignored and the banner stays
    terminal: bool,
}

impl CheckInActor {
    pub fn new(session: Session,
               settings: FlowSettings,
               deps: Dependencies,
               commands: mpsc::Receiver<Command>,
               view_tx: watch::Sender<CheckInView>) -> Self {
        let view = CheckInView::new(session.role, session.center.clone(), settings.threshold_m);
        let evaluator = ProximityEvaluator::new(session.reference_location(), settings.threshold_m);
        let (outcome_tx, outcome_rx) = mpsc::channel(1);
        // replaced by the first start_source
        let (_, source_events) = mpsc::channel(1);

        Self {
            session,
            settings,
            deps,
            commands,
            view_tx,
            view,
            throttle: UpdateThrottle::new(settings.update_interval),
            evaluator,
            source: None,
            source_events,
            outcome_tx,
            outcome_rx,
            submission: None,
            marked_on: None,
            permission_denied: false,
            terminal: false,
        }
    }

    pub async fn run_actor(mut self) {
        enum Message {
            Source(SourceEvent),
            Command(Command),
            Submitted(AttendanceOutcome),
        }

        self.start_source();
        self.publish();

        loop {
            let message = select! {
                Some(event) = self.source_events.recv() => Message::Source(event),
                Some(outcome) = self.outcome_rx.recv() => Message::Submitted(outcome),
                command = self.commands.recv() => match command {
                    Some(command) => Message::Command(command),
                    None => {
                        info!("Check-in session for {} closed", self.session.user_id);
                        return;
                    }
                },
            };

            match message {
                Message::Source(event) => self.on_source_event(event),
                Message::Command(command) => self.on_command(command),
                Message::Submitted(outcome) => self.on_outcome(outcome),
            }
            self.publish();
        }
    }

    fn start_source(&mut self) {
        let (tx, rx) = mpsc::channel(32);
        let source = PositionSource::new(
            self.deps.provider.clone(),
            self.deps.geocoder.clone(),
            self.session.center.place_query(),
            self.settings,
            tx,
        );
        // dropping the previous handle aborts it and releases its watches
        self.source = Some(AutoCancelTask::spawn(source.run()));
        self.source_events = rx;
        self.throttle.reset();
    }

    fn on_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Phase(phase) => self.view.phase = phase,
            SourceEvent::Fix(fix) => {
                if let Some(camera) = self.throttle.offer(&fix, Instant::now()) {
                    let proximity = self.evaluator.evaluate(fix.coordinate);
                    debug!("Applied fix {:?}, {:.1} m from center", fix.coordinate, proximity.distance_m);
                    self.view.fix = Some(fix);
                    self.view.proximity = Some(proximity);
                    self.view.camera = Some(camera);
                }
            }
            SourceEvent::Error(error) => {
                if error.severity() == Severity::Terminal {
                    self.terminal = true;
                    self.permission_denied |= error == LocationError::PermissionDenied;
                }
                self.view.location_error = Some(ErrorBanner::from(&error));
            }
            SourceEvent::ErrorCleared => {
                if !self.terminal {
                    self.view.location_error = None;
                }
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit => self.submit(),
            Command::Retry => {
                if self.terminal {
                    debug!("Ignoring retry after a terminal location error");
                    return;
                }
                info!("Restarting location monitoring");
                self.view.location_error = None;
                // submission waits for a fix from the restarted source
                self.view.fix = None;
                self.view.proximity = None;
                self.view.camera = None;
                self.start_source();
            }
            Command::DismissError => {
                self.view.location_error = None;
                self.view.submit_error = None;
            }
            Command::DismissNotice => self.view.notice = None,
        }
    }

    pub fn blocker(&self) -> Option<Blocker> {
        let today = self.deps.clock.today();
        if self.permission_denied {
            Some(Blocker::PermissionDenied)
        } else if self.submission.is_some() {
            Some(Blocker::Pending)
        } else if self.marked_on == Some(today) {
            Some(Blocker::AlreadyMarked)
        } else if today.weekday() == self.settings.rest_day {
            Some(Blocker::RestDay)
        } else {
            match self.view.proximity {
                None => Some(Blocker::NoFix),
                Some(p) if !p.within_threshold => Some(Blocker::OutOfRange),
                Some(_) => None,
            }
        }
    }

    fn submit(&mut self) {
        if let Some(blocker) = self.blocker() {
            debug!("Submit refused: {:?}", blocker);
            return;
        }
        let Some(fix) = self.view.fix else { return };

        info!("Submitting attendance for {} ({}) at {:?}", self.session.name, self.session.user_id, fix.coordinate);
        self.view.submit_error = None;
        let backend = self.deps.backend.clone();
        let token = self.session.token.clone();
        let outcome_tx = self.outcome_tx.clone();
        self.submission = Some(AutoCancelTask::spawn(async move {
            let outcome = backend.mark_attendance(fix.coordinate, &token).await;
            // the actor may already be gone; nothing to update then
            outcome_tx.send(outcome).await.ok();
        }));
    }

    fn on_outcome(&mut self, outcome: AttendanceOutcome) {
        self.submission = None;
        match outcome {
            AttendanceOutcome::Marked(message) => {
                self.marked_on = Some(self.deps.clock.today());
                self.view.notice = Some(Notice::AttendanceMarked(message));
            }
            AttendanceOutcome::AlreadyMarked(message) => {
                self.marked_on = Some(self.deps.clock.today());
                self.view.notice = Some(Notice::AlreadyMarked(message));
            }
            AttendanceOutcome::Failed(message) => {
                warn!("Attendance submission failed: {}", message);
                self.view.submit_error = Some(message);
            }
        }
    }

    fn publish(&mut self) {
        let today = self.deps.clock.today();
        self.view.attendance_marked_today = self.marked_on == Some(today);
        self.view.rest_day = today.weekday() == self.settings.rest_day;
        self.view.submitting = self.submission.is_some();
        self.view.can_submit = self.blocker().is_none();
        // fixes dropped by the throttle leave the view untouched; don't wake the socket for them
        self.view_tx.send_if_modified(|current| {
            if *current == self.view {
                return false;
            }
            *current = self.view.clone();
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use async_trait::async_trait;
    use chrono::Weekday;
    use super::*;
    use crate::handlers::position_source::tests::{FakeDevice, FakeGeocoder};
    use crate::models::error::{LocationError, LocationErrorKind};
    use crate::models::position::{Coordinate, PositionFix};
    use crate::models::session::{Center, Role};
    use crate::models::view::MonitorPhase;

    const CENTER: Coordinate = Coordinate { latitude: 19.0760, longitude: 72.8777 };
    const NEAR: Coordinate = Coordinate { latitude: 19.0761, longitude: 72.8778 };
    const FAR: Coordinate = Coordinate { latitude: 19.0850, longitude: 72.8900 };

    struct FixedClock(Mutex<NaiveDate>);

    impl FixedClock {
        fn set(&self, date: NaiveDate) {
            *self.0.lock().unwrap() = date;
        }
    }

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            *self.0.lock().unwrap()
        }
    }

    fn monday() -> NaiveDate {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(date.weekday(), Weekday::Mon);
        date
    }

    fn sunday() -> NaiveDate {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(date.weekday(), Weekday::Sun);
        date
    }

    struct FakeBackend {
        outcomes: Mutex<Vec<AttendanceOutcome>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Coordinate, String)>>,
    }

    impl FakeBackend {
        fn new(outcomes: Vec<AttendanceOutcome>) -> Arc<Self> {
            Arc::new(Self { outcomes: Mutex::new(outcomes), calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AttendanceBackend for FakeBackend {
        async fn mark_attendance(&self, coordinate: Coordinate, token: &str) -> AttendanceOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((coordinate, token.to_string()));
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                AttendanceOutcome::Failed("no scripted outcome".into())
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn session() -> Session {
        Session {
            user_id: "tutor-1".into(),
            name: "Asha".into(),
            role: Role::Tutor,
            center: Center {
                id: "c1".into(),
                name: "Dharavi Center".into(),
                city: "Mumbai".into(),
                latitude: CENTER.latitude,
                longitude: CENTER.longitude,
            },
            token: "jwt-token".into(),
        }
    }

    struct Harness {
        commands: mpsc::Sender<Command>,
        view: watch::Receiver<CheckInView>,
        clock: Arc<FixedClock>,
        _actor: AutoCancelTask<()>,
    }

    impl Harness {
        async fn send(&self, command: Command) {
            self.commands.send(command).await.unwrap();
            settle().await;
        }

        fn now(&self) -> CheckInView {
            self.view.borrow().clone()
        }
    }

    fn start(device: Arc<FakeDevice>,
             geocoder: Arc<FakeGeocoder>,
             backend: Arc<FakeBackend>,
             today: NaiveDate,
             settings: FlowSettings) -> Harness {
        let (commands, commands_rx) = mpsc::channel(8);
        let session = session();
        let (view_tx, view) = watch::channel(CheckInView::new(session.role, session.center.clone(), settings.threshold_m));
        let clock = Arc::new(FixedClock(Mutex::new(today)));
        let actor = CheckInActor::new(
            session,
            settings,
            Dependencies { provider: device, geocoder, backend, clock: clock.clone() },
            commands_rx,
            view_tx,
        );
        Harness { commands, view, clock, _actor: AutoCancelTask::spawn(actor.run_actor()) }
    }

    // lets every task run until idle; the paused clock only moves when nothing else can
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn quiet() -> FlowSettings {
        FlowSettings { escalation_delay: Duration::from_secs(3600), ..FlowSettings::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn near_fix_allows_exactly_one_submission() {
        let backend = FakeBackend::new(vec![AttendanceOutcome::Marked("Attendance marked successfully".into())]);
        let h = start(FakeDevice::new(Some(Ok(NEAR))), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;

        let view = h.now();
        assert_eq!(view.fix, Some(PositionFix::device(NEAR)));
        assert!(view.proximity.unwrap().within_threshold);
        assert!(view.can_submit);
        assert!(view.camera.unwrap().animate);

        h.send(Command::Submit).await;
        let view = h.now();
        assert!(view.attendance_marked_today);
        assert!(!view.can_submit);
        assert!(!view.submitting);
        assert_eq!(view.notice, Some(Notice::AttendanceMarked("Attendance marked successfully".into())));
        assert_eq!(backend.seen.lock().unwrap()[0], (NEAR, "jwt-token".to_string()));

        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn far_fix_blocks_submission() {
        let backend = FakeBackend::new(vec![]);
        let h = start(FakeDevice::new(Some(Ok(FAR))), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;

        let view = h.now();
        assert!(!view.proximity.unwrap().within_threshold);
        assert!(!view.can_submit);

        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn guest_threshold_is_wider() {
        let backend = FakeBackend::new(vec![]);
        let settings = FlowSettings { threshold_m: 1300.0, ..quiet() };
        let near_enough = Coordinate { latitude: 19.0800, longitude: 72.8800 };
        let h = start(FakeDevice::new(Some(Ok(near_enough))), FakeGeocoder::new(None), backend, monday(), settings);
        settle().await;
        assert!(h.now().can_submit);
    }

    #[tokio::test(start_paused = true)]
    async fn rest_day_blocks_submission() {
        let backend = FakeBackend::new(vec![]);
        let h = start(FakeDevice::new(Some(Ok(NEAR))), FakeGeocoder::new(None), backend.clone(), sunday(), quiet());
        settle().await;

        let view = h.now();
        assert!(view.rest_day);
        assert!(view.proximity.unwrap().within_threshold);
        assert!(!view.can_submit);

        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fix_blocks_submission() {
        let backend = FakeBackend::new(vec![]);
        let h = start(FakeDevice::new(None), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;
        assert_eq!(h.now().phase, MonitorPhase::AwaitingFirstFix);
        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_is_already_marked_not_an_error() {
        let backend = FakeBackend::new(vec![AttendanceOutcome::AlreadyMarked("Request denied".into())]);
        let h = start(FakeDevice::new(Some(Ok(NEAR))), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;

        h.send(Command::Submit).await;
        let view = h.now();
        assert_eq!(view.notice, Some(Notice::AlreadyMarked("Request denied".into())));
        assert_eq!(view.submit_error, None);
        assert!(view.attendance_marked_today);
        assert!(!view.can_submit);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_transient_and_retryable() {
        let backend = FakeBackend::new(vec![
            AttendanceOutcome::Failed("Server busy".into()),
            AttendanceOutcome::Marked("ok".into()),
        ]);
        let h = start(FakeDevice::new(Some(Ok(NEAR))), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;

        h.send(Command::Submit).await;
        let view = h.now();
        assert_eq!(view.submit_error.as_deref(), Some("Server busy"));
        assert!(!view.attendance_marked_today);
        assert!(view.can_submit);

        h.send(Command::DismissError).await;
        assert_eq!(h.now().submit_error, None);

        h.send(Command::Submit).await;
        assert!(h.now().attendance_marked_today);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_blocks_for_the_session() {
        let device = FakeDevice::new(Some(Err(LocationError::PermissionDenied)));
        let geocoder = FakeGeocoder::new(Some(NEAR));
        let backend = FakeBackend::new(vec![]);
        let h = start(device.clone(), geocoder.clone(), backend.clone(), monday(), quiet());
        settle().await;

        let view = h.now();
        let banner = view.location_error.unwrap();
        assert_eq!(banner.kind, LocationErrorKind::PermissionDenied);
        assert_eq!(banner.severity, Severity::Terminal);
        assert!(!banner.retryable);
        assert_eq!(view.phase, MonitorPhase::Stopped);
        assert!(!view.can_submit);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);

        h.send(Command::Retry).await;
        h.send(Command::Submit).await;
        assert_eq!(device.watch_options().len(), 1, "retry must not restart monitoring");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_fallback_yields_approximate_fix() {
        let device = FakeDevice::new(Some(Err(LocationError::Timeout)));
        let geocoder = FakeGeocoder::new(Some(NEAR));
        let h = start(device, geocoder, FakeBackend::new(vec![]), monday(), quiet());
        settle().await;

        let view = h.now();
        assert_eq!(view.fix, Some(PositionFix::approximate(NEAR)));
        assert!(view.fix.unwrap().is_approximate);
        assert_eq!(view.location_error, None);
        assert!(view.proximity.unwrap().within_threshold);
    }

    #[tokio::test(start_paused = true)]
    async fn fixes_are_applied_once_per_interval() {
        let device = FakeDevice::new(Some(Ok(NEAR)));
        let mut h = start(device.clone(), FakeGeocoder::new(None), FakeBackend::new(vec![]), monday(), quiet());
        settle().await;
        assert_eq!(h.view.borrow_and_update().camera.unwrap().seq, 1);

        // a burst inside the window is dropped without republishing the view
        for _ in 0..10 {
            device.push(Ok(FAR));
            settle().await;
        }
        assert!(!h.view.has_changed().unwrap());
        assert_eq!(h.now().fix, Some(PositionFix::device(NEAR)));

        tokio::time::advance(Duration::from_secs(5)).await;
        device.push(Ok(FAR));
        settle().await;
        let view = h.now();
        assert_eq!(view.fix, Some(PositionFix::device(FAR)));
        assert!(!view.proximity.unwrap().within_threshold);
        let camera = view.camera.unwrap();
        assert_eq!(camera.seq, 2);
        assert!(!camera.animate);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_restarts_monitoring() {
        let device = FakeDevice::new(Some(Err(LocationError::PositionUnavailable)));
        let h = start(device.clone(), FakeGeocoder::new(None), FakeBackend::new(vec![]), monday(), quiet());
        settle().await;

        let banner = h.now().location_error.unwrap();
        assert_eq!(banner.kind, LocationErrorKind::Unresolved);
        assert!(banner.retryable);

        h.send(Command::Retry).await;
        assert_eq!(device.watch_options().len(), 2);
        assert_eq!(device.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.now().location_error, None);

        device.push(Ok(NEAR));
        settle().await;
        let view = h.now();
        assert!(view.can_submit);
        assert!(view.camera.unwrap().animate);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_a_fresh_fix() {
        let device = FakeDevice::new(Some(Ok(NEAR)));
        let backend = FakeBackend::new(vec![]);
        let h = start(device.clone(), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;
        assert!(h.now().can_submit);

        h.send(Command::Retry).await;
        let view = h.now();
        assert_eq!(view.fix, None);
        assert_eq!(view.proximity, None);
        assert_eq!(view.camera, None);
        assert!(!view.can_submit);

        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 0);

        device.push(Ok(NEAR));
        settle().await;
        assert!(h.now().can_submit);
    }

    #[tokio::test(start_paused = true)]
    async fn marked_state_lasts_until_the_next_day() {
        let backend = FakeBackend::new(vec![
            AttendanceOutcome::Marked("Monday marked".into()),
            AttendanceOutcome::Marked("Tuesday marked".into()),
        ]);
        let h = start(FakeDevice::new(Some(Ok(NEAR))), FakeGeocoder::new(None), backend.clone(), monday(), quiet());
        settle().await;

        h.send(Command::Submit).await;
        assert!(h.now().attendance_marked_today);

        // later the same day nothing changes
        h.send(Command::DismissNotice).await;
        h.send(Command::Submit).await;
        assert!(!h.now().can_submit);
        assert_eq!(backend.calls(), 1);

        h.clock.set(monday().succ_opt().unwrap());
        h.send(Command::DismissError).await;
        let view = h.now();
        assert!(!view.attendance_marked_today);
        assert!(view.can_submit);

        h.send(Command::Submit).await;
        assert_eq!(backend.calls(), 2);
        assert_eq!(h.now().notice, Some(Notice::AttendanceMarked("Tuesday marked".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn no_geolocation_and_no_fallback_is_final() {
        let device = FakeDevice::unsupported();
        let geocoder = FakeGeocoder::new(None);
        let h = start(device, geocoder.clone(), FakeBackend::new(vec![]), monday(), quiet());
        settle().await;

        let banner = h.now().location_error.unwrap();
        assert_eq!(banner.kind, LocationErrorKind::Unresolved);
        assert_eq!(banner.severity, Severity::Terminal);
        assert!(!banner.retryable);

        h.send(Command::Retry).await;
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1, "retry must not restart the source");
        assert!(h.now().location_error.is_some());
        assert!(!h.now().can_submit);
    }
}
