//! Step sensor event types.
//!
//! Two hardware variants exist: a step counter reporting the running total
//! since device boot, and a step detector emitting one event per step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The hardware sensor variant that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Running total of steps since last device boot
    StepCounterCumulative,
    /// One event per detected step, no history
    StepDetectorPulse,
}

impl SensorKind {
    /// How values from this sensor are interpreted.
    pub fn semantics(self) -> StepSemantics {
        match self {
            SensorKind::StepCounterCumulative => StepSemantics::Cumulative,
            SensorKind::StepDetectorPulse => StepSemantics::Pulse,
        }
    }

    /// Name reported to the script layer as `sensorType`.
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::StepCounterCumulative => "step_counter",
            SensorKind::StepDetectorPulse => "step_detector",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Semantic tag consumed by the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSemantics {
    Cumulative,
    Pulse,
}

/// A single hardware step event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    pub kind: SensorKind,
    /// Boot-lifetime total for cumulative sensors, always 1.0 for pulses
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorEvent {
    /// A cumulative step counter reading.
    pub fn cumulative(total: f64) -> Self {
        Self {
            kind: SensorKind::StepCounterCumulative,
            value: total,
            timestamp: Utc::now(),
        }
    }

    /// A single detected step.
    pub fn pulse() -> Self {
        Self {
            kind: SensorKind::StepDetectorPulse,
            value: 1.0,
            timestamp: Utc::now(),
        }
    }

    pub fn semantics(&self) -> StepSemantics {
        self.kind.semantics()
    }
}

/// Opaque handle to a hardware sensor returned by the host's sensor service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorHandle {
    pub id: u32,
    pub name: String,
}

impl SensorHandle {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A probed sensor together with the semantics it reports in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorCapability {
    pub handle: SensorHandle,
    pub kind: SensorKind,
}

impl SensorCapability {
    pub fn semantics(&self) -> StepSemantics {
        self.kind.semantics()
    }
}

/// Sampling rate tiers accepted by the sensor service, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    Normal,
}

/// Registration fallback order: finest to coarsest.
pub const DEFAULT_RATE_LADDER: [SamplingRate; 4] = [
    SamplingRate::Fastest,
    SamplingRate::Game,
    SamplingRate::Ui,
    SamplingRate::Normal,
];

impl SamplingRate {
    /// Nominal delivery period requested from the hardware.
    pub fn period(self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::ZERO,
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_micros(66_667),
            SamplingRate::Normal => Duration::from_millis(200),
        }
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplingRate::Fastest => "fastest",
            SamplingRate::Game => "game",
            SamplingRate::Ui => "ui",
            SamplingRate::Normal => "normal",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_semantics() {
        assert_eq!(
            SensorKind::StepCounterCumulative.semantics(),
            StepSemantics::Cumulative
        );
        assert_eq!(SensorKind::StepDetectorPulse.semantics(), StepSemantics::Pulse);
        assert_eq!(SensorKind::StepDetectorPulse.label(), "step_detector");
    }

    #[test]
    fn test_pulse_event_value() {
        let event = SensorEvent::pulse();
        assert_eq!(event.value, 1.0);
        assert_eq!(event.semantics(), StepSemantics::Pulse);
    }

    #[test]
    fn test_rate_ladder_is_finest_first() {
        let periods: Vec<Duration> = DEFAULT_RATE_LADDER.iter().map(|r| r.period()).collect();
        assert!(periods.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rate_serde_names() {
        let json = serde_json::to_string(&SamplingRate::Ui).unwrap();
        assert_eq!(json, "\"ui\"");
    }
}
