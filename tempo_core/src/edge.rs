//! Debounced edge detection on a polled analog level.

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Hysteresis thresholds and debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeThresholds {
    /// LOW becomes HIGH at or above this level.
    pub high: u16,
    /// HIGH becomes LOW at or below this level.
    pub low: u16,
    /// Minimum time between accepted transitions.
    pub debounce_ms: u32,
}

impl EdgeThresholds {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.high <= self.low {
            return Err(BuildError::InvalidConfig(
                "edge thresholds must satisfy high > low",
            ));
        }
        Ok(())
    }
}

/// Two-state (LOW/HIGH) detector. Levels strictly between the thresholds
/// never cause a transition.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    thresholds: EdgeThresholds,
    is_high: bool,
    last_transition_ms: Option<i64>,
}

impl EdgeDetector {
    pub fn new(thresholds: EdgeThresholds) -> Result<Self, BuildError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            is_high: false,
            last_transition_ms: None,
        })
    }

    pub fn is_high(&self) -> bool {
        self.is_high
    }

    pub fn last_transition_ms(&self) -> Option<i64> {
        self.last_transition_ms
    }

    /// Feed one level reading; returns the transition it caused, if any.
    pub fn sample(&mut self, level: u16, now_ms: i64) -> Option<Edge> {
        let edge = if !self.is_high && level >= self.thresholds.high {
            Edge::Rising
        } else if self.is_high && level <= self.thresholds.low {
            Edge::Falling
        } else {
            return None;
        };

        if let Some(last) = self.last_transition_ms
            && now_ms.saturating_sub(last) < i64::from(self.thresholds.debounce_ms)
        {
            return None;
        }

        self.is_high = edge == Edge::Rising;
        self.last_transition_ms = Some(now_ms);
        Some(edge)
    }
}
