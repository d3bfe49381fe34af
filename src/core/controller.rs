//! Tracking lifecycle.
//!
//! The controller owns the sensor registration and the session counters.
//! Control operations and sensor callbacks are serialized through one lock,
//! so accumulator transitions never interleave.

use crate::core::accumulator::{self, TrackingState, TrackingStatus, DEFAULT_STEP_LENGTH_METERS};
use crate::core::updates::{StepUpdate, StepUpdateSink};
use crate::lock;
use crate::sensor::source::{SensorListener, SensorSource};
use crate::sensor::types::{SamplingRate, SensorCapability, SensorEvent, DEFAULT_RATE_LADDER};
use crate::stats::SharedSessionStats;
use std::sync::{Arc, Mutex, Weak};

/// Settings the controller needs from the configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Rates tried in order when registering the listener
    pub rate_ladder: Vec<SamplingRate>,
    pub step_length_meters: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            rate_ladder: DEFAULT_RATE_LADDER.to_vec(),
            step_length_meters: DEFAULT_STEP_LENGTH_METERS,
        }
    }
}

/// Errors returned by tracking operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// No step sensor of either kind exists
    SensorUnavailable,
    /// Every sampling rate was refused
    RegistrationFailed { attempts: usize },
    InvalidArgument(String),
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingError::SensorUnavailable => write!(f, "Step sensor is not available"),
            TrackingError::RegistrationFailed { attempts } => write!(
                f,
                "Sensor listener registration failed after {attempts} attempts"
            ),
            TrackingError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for TrackingError {}

/// Whether `start` began a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started,
    AlreadyTracking,
}

impl StartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StartStatus::Started => "tracking_started",
            StartStatus::AlreadyTracking => "already_tracking",
        }
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub status: StartStatus,
    pub snapshot: TrackingState,
    pub capability: SensorCapability,
    /// Rate the listener was registered at; `None` when already tracking
    pub rate: Option<SamplingRate>,
}

struct Shared {
    state: TrackingState,
    capability: Option<SensorCapability>,
    /// Incremented on every start; listeners from older sessions are ignored.
    session: u64,
    sink: Option<Box<dyn StepUpdateSink>>,
    stats: SharedSessionStats,
}

impl Shared {
    fn on_sensor_event(&mut self, session: u64, event: &SensorEvent) {
        if !self.state.is_tracking() || session != self.session {
            tracing::debug!(session, "Discarding sensor event outside an active session");
            self.stats.record_event_discarded();
            return;
        }

        self.state = accumulator::apply(self.state, event);
        self.stats.record_event_accepted();
        tracing::debug!(
            steps = self.state.steps_since_start,
            distance = self.state.total_distance,
            "Step update"
        );
        self.publish();
    }

    fn publish(&self) {
        let update = StepUpdate::from(&self.state);
        let delivered = match self.sink {
            Some(ref sink) => sink.deliver(&update).map_err(|e| e.to_string()),
            None => Err("no sink attached".to_string()),
        };
        if let Err(reason) = delivered {
            tracing::debug!("Dropping step update: {}", reason);
            self.stats.record_update_dropped();
        }
    }
}

/// Owns one sensor registration and the counters fed by it.
pub struct TrackingController {
    source: SensorSource,
    rate_ladder: Vec<SamplingRate>,
    shared: Arc<Mutex<Shared>>,
}

impl TrackingController {
    pub fn new(source: SensorSource, config: ControllerConfig, stats: SharedSessionStats) -> Self {
        Self {
            source,
            rate_ladder: config.rate_ladder,
            shared: Arc::new(Mutex::new(Shared {
                state: TrackingState::new(config.step_length_meters),
                capability: None,
                session: 0,
                sink: None,
                stats,
            })),
        }
    }

    /// Route step updates to `sink`, replacing any previous one.
    pub fn attach_sink(&self, sink: impl StepUpdateSink + 'static) {
        lock(&self.shared).sink = Some(Box::new(sink));
    }

    /// Stop delivering updates; later ones are dropped.
    pub fn detach_sink(&self) {
        lock(&self.shared).sink = None;
    }

    /// The probed sensor, probing on first use.
    pub fn capability(&self) -> Result<SensorCapability, TrackingError> {
        let mut shared = lock(&self.shared);
        self.ensure_capability(&mut shared)
    }

    fn ensure_capability(&self, shared: &mut Shared) -> Result<SensorCapability, TrackingError> {
        if let Some(ref capability) = shared.capability {
            return Ok(capability.clone());
        }

        let capability = self.source.probe().ok_or(TrackingError::SensorUnavailable)?;
        tracing::info!(
            kind = %capability.kind,
            name = %capability.handle.name,
            "Step sensor found"
        );
        shared.capability = Some(capability.clone());
        Ok(capability)
    }

    /// Begin a tracking session.
    ///
    /// Idempotent while tracking. On success the counters are zeroed and an
    /// initial zero update is published before any hardware event can land.
    pub fn start(&self) -> Result<StartOutcome, TrackingError> {
        let mut shared = lock(&self.shared);

        if shared.state.is_tracking() {
            tracing::debug!("Already tracking");
            return Ok(StartOutcome {
                status: StartStatus::AlreadyTracking,
                snapshot: shared.state,
                capability: self.ensure_capability(&mut shared)?,
                rate: None,
            });
        }

        let capability = self.ensure_capability(&mut shared)?;
        let session = shared.session + 1;
        let listener = session_listener(Arc::downgrade(&self.shared), session);

        let mut registered_at = None;
        for rate in &self.rate_ladder {
            shared.stats.record_registration_attempt();
            if self.source.register(&capability, listener.clone(), *rate) {
                registered_at = Some(*rate);
                break;
            }
            tracing::warn!(%rate, "Sensor registration refused, trying a coarser rate");
        }

        let Some(rate) = registered_at else {
            tracing::error!("Sensor listener registration failed at every rate");
            return Err(TrackingError::RegistrationFailed {
                attempts: self.rate_ladder.len(),
            });
        };

        shared.session = session;
        shared.state = TrackingState {
            status: TrackingStatus::Tracking,
            ..accumulator::reset(shared.state)
        };
        shared.stats.record_session_started();
        tracing::info!(%rate, kind = %capability.kind, "Tracking started");

        shared.publish();

        Ok(StartOutcome {
            status: StartStatus::Started,
            snapshot: shared.state,
            capability,
            rate: Some(rate),
        })
    }

    /// End the session. Always succeeds; no-op when idle.
    pub fn stop(&self) -> TrackingState {
        let mut shared = lock(&self.shared);

        if shared.state.is_tracking() {
            if let Some(ref capability) = shared.capability {
                self.source.unregister(capability);
            }
            shared.state.status = TrackingStatus::Idle;
            tracing::info!(
                steps = shared.state.steps_since_start,
                "Tracking stopped"
            );
        }

        shared.state
    }

    /// Zero the counters without changing the tracking status.
    pub fn reset(&self) -> TrackingState {
        let mut shared = lock(&self.shared);
        shared.state = accumulator::reset(shared.state);
        tracing::debug!("Counters reset");
        shared.state
    }

    pub fn set_step_length(&self, meters: f64) -> Result<TrackingState, TrackingError> {
        if !meters.is_finite() || meters <= 0.0 {
            return Err(TrackingError::InvalidArgument(format!(
                "step length must be positive, got {meters}"
            )));
        }

        let mut shared = lock(&self.shared);
        shared.state = accumulator::rescale(shared.state, meters);
        tracing::debug!(meters, "Step length set");
        Ok(shared.state)
    }

    pub fn snapshot(&self) -> TrackingState {
        lock(&self.shared).state
    }

    pub fn is_tracking(&self) -> bool {
        self.snapshot().is_tracking()
    }
}

impl Drop for TrackingController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Listener for one session. Holds the controller weakly so a registration
/// the host never releases cannot keep it alive.
fn session_listener(shared: Weak<Mutex<Shared>>, session: u64) -> SensorListener {
    Arc::new(move |event: SensorEvent| {
        if let Some(shared) = shared.upgrade() {
            lock(&shared).on_sensor_event(session, &event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::simulated::SimulatedSensorService;
    use crate::sensor::types::SensorKind;
    use crate::stats::create_shared_stats;
    use crossbeam_channel::{unbounded, Receiver};

    fn controller_with(
        kinds: &[SensorKind],
    ) -> (TrackingController, Arc<SimulatedSensorService>, Receiver<StepUpdate>) {
        let service = Arc::new(SimulatedSensorService::new(kinds).with_boot_count(1000));
        let controller = TrackingController::new(
            SensorSource::new(service.clone()),
            ControllerConfig::default(),
            create_shared_stats(),
        );
        let (tx, rx) = unbounded();
        controller.attach_sink(tx);
        (controller, service, rx)
    }

    #[test]
    fn test_start_emits_initial_zero_update() {
        let (controller, service, rx) = controller_with(&[SensorKind::StepDetectorPulse]);

        let outcome = controller.start().unwrap();
        assert_eq!(outcome.status, StartStatus::Started);
        assert_eq!(outcome.rate, Some(SamplingRate::Fastest));
        assert_eq!(service.active_registrations(), 1);

        let first = rx.try_recv().expect("initial update");
        assert_eq!(first.steps, 0);
        assert_eq!(first.distance, 0.0);
    }

    #[test]
    fn test_pulse_session_counts_steps() {
        let (controller, service, rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();

        for _ in 0..7 {
            service.step();
        }

        assert_eq!(controller.snapshot().steps_since_start, 7);
        // initial update plus one per pulse
        assert_eq!(rx.try_iter().count(), 8);
    }

    #[test]
    fn test_cumulative_session_uses_first_reading_as_baseline() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepCounterCumulative]);
        controller.start().unwrap();

        service.emit(SensorEvent::cumulative(1000.0));
        service.emit(SensorEvent::cumulative(1000.0));
        service.emit(SensorEvent::cumulative(1005.0));
        service.emit(SensorEvent::cumulative(1012.0));

        let state = controller.snapshot();
        assert_eq!(state.steps_since_start, 12);
        assert!((state.total_distance - 12.0 * DEFAULT_STEP_LENGTH_METERS).abs() < 1e-9);
    }

    #[test]
    fn test_second_start_reports_already_tracking() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        service.step();
        service.step();

        let outcome = controller.start().unwrap();
        assert_eq!(outcome.status, StartStatus::AlreadyTracking);
        assert_eq!(outcome.snapshot.steps_since_start, 2);
        assert_eq!(service.active_registrations(), 1);
    }

    #[test]
    fn test_restart_takes_fresh_baseline() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepCounterCumulative]);
        controller.start().unwrap();
        for _ in 0..5 {
            service.step();
        }
        assert_eq!(controller.snapshot().steps_since_start, 4);

        controller.stop();
        service.step();
        service.step();
        controller.start().unwrap();
        assert_eq!(controller.snapshot().steps_since_start, 0);
        assert_eq!(controller.snapshot().baseline, None);

        service.step(); // 1008 becomes the new baseline
        service.step();
        service.step();
        let state = controller.snapshot();
        assert_eq!(state.baseline, Some(1008));
        assert_eq!(state.steps_since_start, 2);
    }

    #[test]
    fn test_registration_falls_back_to_coarser_rate() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        service.refuse_rate(SamplingRate::Fastest);
        service.refuse_rate(SamplingRate::Game);

        let outcome = controller.start().unwrap();
        assert_eq!(outcome.rate, Some(SamplingRate::Ui));
        assert_eq!(
            service.registration_attempts(),
            vec![SamplingRate::Fastest, SamplingRate::Game, SamplingRate::Ui]
        );
    }

    #[test]
    fn test_registration_failure_stays_idle_and_is_retryable() {
        let (controller, service, rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        service.refuse_all_rates();

        let err = controller.start().unwrap_err();
        assert_eq!(err, TrackingError::RegistrationFailed { attempts: 4 });
        assert!(!controller.is_tracking());
        assert!(rx.try_recv().is_err());

        service.accept_all_rates();
        assert_eq!(controller.start().unwrap().status, StartStatus::Started);
    }

    #[test]
    fn test_missing_sensor_is_unavailable() {
        let (controller, _service, _rx) = controller_with(&[]);
        assert_eq!(controller.start().unwrap_err(), TrackingError::SensorUnavailable);
        assert_eq!(
            controller.capability().unwrap_err(),
            TrackingError::SensorUnavailable
        );
    }

    #[test]
    fn test_events_after_stop_are_discarded() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        service.step();
        controller.stop();

        assert_eq!(service.active_registrations(), 0);
        // a late callback racing the unregister
        let stale = session_listener(Arc::downgrade(&controller.shared), 1);
        stale(SensorEvent::pulse());

        assert_eq!(controller.snapshot().steps_since_start, 1);
        assert!(!controller.is_tracking());
    }

    #[test]
    fn test_stale_session_listener_is_ignored() {
        let (controller, _service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        controller.stop();
        controller.start().unwrap();

        let stale = session_listener(Arc::downgrade(&controller.shared), 1);
        stale(SensorEvent::pulse());
        assert_eq!(controller.snapshot().steps_since_start, 0);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        let state = controller.stop();
        assert_eq!(state.status, TrackingStatus::Idle);
        assert!(service.registration_attempts().is_empty());
    }

    #[test]
    fn test_reset_keeps_tracking() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        service.step();
        service.step();

        let state = controller.reset();
        assert!(state.is_tracking());
        assert_eq!(state.steps_since_start, 0);

        service.step();
        assert_eq!(controller.snapshot().steps_since_start, 1);
    }

    #[test]
    fn test_invalid_step_length_leaves_state_unchanged() {
        let (controller, _service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        let before = controller.snapshot();

        for bad in [-1.0, 0.0, f64::NAN] {
            assert!(matches!(
                controller.set_step_length(bad),
                Err(TrackingError::InvalidArgument(_))
            ));
        }
        assert_eq!(controller.snapshot(), before);
    }

    #[test]
    fn test_step_length_recomputes_distance() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        for _ in 0..4 {
            service.step();
        }

        let state = controller.set_step_length(0.5).unwrap();
        assert!((state.total_distance - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_detached_sink_drops_updates() {
        let (controller, service, rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.detach_sink();
        controller.start().unwrap();
        service.step();

        assert!(rx.try_recv().is_err());
        assert_eq!(controller.snapshot().steps_since_start, 1);
    }

    #[test]
    fn test_drop_unregisters_listener() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();
        drop(controller);

        assert_eq!(service.active_registrations(), 0);
    }

    #[test]
    fn test_concurrent_events_are_serialized() {
        let (controller, service, _rx) = controller_with(&[SensorKind::StepDetectorPulse]);
        controller.start().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        service.step();
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            controller.set_step_length(0.75).unwrap();
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = controller.snapshot();
        assert_eq!(state.steps_since_start, 1000);
        assert!((state.total_distance - 750.0).abs() < 1e-6);
    }
}
