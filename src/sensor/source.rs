//! Boundary to the host's sensor service.
//!
//! The host implements [`SensorService`]; [`SensorSource`] layers capability
//! probing on top of it and is the only thing the controller talks to.

use crate::sensor::types::{SamplingRate, SensorCapability, SensorEvent, SensorHandle, SensorKind};
use std::fmt;
use std::sync::Arc;

/// Callback invoked by the host for every hardware event.
///
/// May be called from any thread, concurrently with control operations.
pub type SensorListener = Arc<dyn Fn(SensorEvent) + Send + Sync>;

/// Sensor operations provided by the host platform.
pub trait SensorService: Send + Sync {
    /// Look up the default sensor of the given kind.
    fn probe_sensor(&self, kind: SensorKind) -> Option<SensorHandle>;

    /// Register `listener` for events from `handle` at `rate`.
    ///
    /// Returns `false` when the service refuses the rate.
    fn register_listener(
        &self,
        handle: &SensorHandle,
        rate: SamplingRate,
        listener: SensorListener,
    ) -> bool;

    /// Remove the listener registered for `handle`, if any.
    fn unregister_listener(&self, handle: &SensorHandle);
}

/// Probe order: cumulative first, it tolerates missed individual events.
const PROBE_ORDER: [SensorKind; 2] = [
    SensorKind::StepCounterCumulative,
    SensorKind::StepDetectorPulse,
];

/// Both hardware variants behind one capability.
#[derive(Clone)]
pub struct SensorSource {
    service: Arc<dyn SensorService>,
}

impl SensorSource {
    pub fn new(service: Arc<dyn SensorService>) -> Self {
        Self { service }
    }

    /// Find the best available step sensor.
    pub fn probe(&self) -> Option<SensorCapability> {
        PROBE_ORDER.into_iter().find_map(|kind| {
            self.service
                .probe_sensor(kind)
                .map(|handle| SensorCapability { handle, kind })
        })
    }

    pub fn register(
        &self,
        capability: &SensorCapability,
        listener: SensorListener,
        rate: SamplingRate,
    ) -> bool {
        self.service
            .register_listener(&capability.handle, rate, listener)
    }

    pub fn unregister(&self, capability: &SensorCapability) {
        self.service.unregister_listener(&capability.handle);
    }
}

impl fmt::Debug for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorSource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::simulated::SimulatedSensorService;

    #[test]
    fn test_probe_prefers_cumulative() {
        let service = SimulatedSensorService::new(&[
            SensorKind::StepDetectorPulse,
            SensorKind::StepCounterCumulative,
        ]);
        let source = SensorSource::new(Arc::new(service));

        let capability = source.probe().expect("sensor available");
        assert_eq!(capability.kind, SensorKind::StepCounterCumulative);
    }

    #[test]
    fn test_probe_falls_back_to_pulse() {
        let service = SimulatedSensorService::new(&[SensorKind::StepDetectorPulse]);
        let source = SensorSource::new(Arc::new(service));

        let capability = source.probe().expect("sensor available");
        assert_eq!(capability.kind, SensorKind::StepDetectorPulse);
    }

    #[test]
    fn test_probe_without_sensors() {
        let source = SensorSource::new(Arc::new(SimulatedSensorService::new(&[])));
        assert!(source.probe().is_none());
    }
}
