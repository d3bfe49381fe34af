//! In-process sensor service.
//!
//! Stands in for the platform sensor manager on hosts without step hardware:
//! the CLI, the development server and the test suite drive it directly.

use crate::lock;
use crate::sensor::source::{SensorListener, SensorService};
use crate::sensor::types::{SamplingRate, SensorEvent, SensorHandle, SensorKind};
use std::sync::Mutex;

struct Registration {
    handle: SensorHandle,
    rate: SamplingRate,
    listener: SensorListener,
}

#[derive(Default)]
struct SimState {
    refused_rates: Vec<SamplingRate>,
    attempts: Vec<SamplingRate>,
    registrations: Vec<Registration>,
    boot_count: f64,
}

/// A sensor service whose hardware events are produced on demand.
pub struct SimulatedSensorService {
    available: Vec<SensorKind>,
    state: Mutex<SimState>,
}

impl SimulatedSensorService {
    /// Create a service exposing the given sensor kinds.
    pub fn new(available: &[SensorKind]) -> Self {
        Self {
            available: available.to_vec(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Set the step counter's boot-lifetime total.
    pub fn with_boot_count(self, count: u64) -> Self {
        lock(&self.state).boot_count = count as f64;
        self
    }

    /// Make registrations at `rate` fail.
    pub fn refuse_rate(&self, rate: SamplingRate) {
        let mut state = lock(&self.state);
        if !state.refused_rates.contains(&rate) {
            state.refused_rates.push(rate);
        }
    }

    /// Make every registration fail.
    pub fn refuse_all_rates(&self) {
        for rate in [
            SamplingRate::Fastest,
            SamplingRate::Game,
            SamplingRate::Ui,
            SamplingRate::Normal,
        ] {
            self.refuse_rate(rate);
        }
    }

    /// Accept every rate again.
    pub fn accept_all_rates(&self) {
        lock(&self.state).refused_rates.clear();
    }

    /// Rates tried so far, in order.
    pub fn registration_attempts(&self) -> Vec<SamplingRate> {
        lock(&self.state).attempts.clone()
    }

    /// Number of live listener registrations.
    pub fn active_registrations(&self) -> usize {
        lock(&self.state).registrations.len()
    }

    /// Rate of the first live registration.
    pub fn active_rate(&self) -> Option<SamplingRate> {
        lock(&self.state).registrations.first().map(|r| r.rate)
    }

    /// Simulate one physical step on every registered sensor.
    ///
    /// The step counter advances even with no listener attached, as the
    /// hardware keeps counting. Returns the number of listeners notified.
    pub fn step(&self) -> usize {
        let events: Vec<(SensorListener, SensorEvent)> = {
            let mut state = lock(&self.state);
            state.boot_count += 1.0;
            let total = state.boot_count;
            state
                .registrations
                .iter()
                .map(|r| {
                    let event = match r.handle_kind(&self.available) {
                        Some(SensorKind::StepDetectorPulse) => SensorEvent::pulse(),
                        _ => SensorEvent::cumulative(total),
                    };
                    (r.listener.clone(), event)
                })
                .collect()
        };

        // Listeners run outside the lock; they may call back into the service.
        let delivered = events.len();
        for (listener, event) in events {
            listener(event);
        }
        delivered
    }

    /// Deliver a raw event to every registered listener.
    pub fn emit(&self, event: SensorEvent) -> usize {
        let listeners: Vec<SensorListener> = lock(&self.state)
            .registrations
            .iter()
            .map(|r| r.listener.clone())
            .collect();

        let delivered = listeners.len();
        for listener in listeners {
            listener(event.clone());
        }
        delivered
    }

    /// Kind of the sensor a listener is currently registered on.
    pub fn registered_kind(&self) -> Option<SensorKind> {
        lock(&self.state)
            .registrations
            .first()
            .and_then(|r| r.handle_kind(&self.available))
    }
}

impl Registration {
    fn handle_kind(&self, available: &[SensorKind]) -> Option<SensorKind> {
        available.get(self.handle.id as usize).copied()
    }
}

fn sensor_name(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::StepCounterCumulative => "Simulated Step Counter",
        SensorKind::StepDetectorPulse => "Simulated Step Detector",
    }
}

impl SensorService for SimulatedSensorService {
    fn probe_sensor(&self, kind: SensorKind) -> Option<SensorHandle> {
        self.available
            .iter()
            .position(|k| *k == kind)
            .map(|index| SensorHandle::new(index as u32, sensor_name(kind)))
    }

    fn register_listener(
        &self,
        handle: &SensorHandle,
        rate: SamplingRate,
        listener: SensorListener,
    ) -> bool {
        let mut state = lock(&self.state);
        state.attempts.push(rate);
        if state.refused_rates.contains(&rate) {
            return false;
        }
        state.registrations.push(Registration {
            handle: handle.clone(),
            rate,
            listener,
        });
        true
    }

    fn unregister_listener(&self, handle: &SensorHandle) {
        lock(&self.state)
            .registrations
            .retain(|r| r.handle != *handle);
    }
}
