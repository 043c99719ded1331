//! Uniform result type for optional data sources.

use serde::{Deserialize, Serialize};

/// A value paired with how much of it came from a real source.
///
/// Sources that answered produce `confidence == 1.0`; sources that were
/// unconfigured, failed or timed out produce the neutral default with
/// `confidence == 0.0`. Scoring code reads both the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal<T> {
    pub value: T,
    pub confidence: f64,
}

impl<T> Signal<T> {
    pub fn real(value: T) -> Self {
        Self {
            value,
            confidence: 1.0,
        }
    }

    pub fn neutral(default: T) -> Self {
        Self {
            value: default,
            confidence: 0.0,
        }
    }

    pub fn is_real(&self) -> bool {
        self.confidence > 0.0
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
        Signal {
            value: f(self.value),
            confidence: self.confidence,
        }
    }

    /// The value, only when it came from a real source.
    pub fn real_value(&self) -> Option<&T> {
        self.is_real().then_some(&self.value)
    }
}

impl<T: Default> Signal<T> {
    pub fn absent() -> Self {
        Self::neutral(T::default())
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Self::absent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_signal_hides_value() {
        let signal = Signal::neutral(0.5);
        assert!(!signal.is_real());
        assert_eq!(signal.real_value(), None);
    }

    #[test]
    fn map_keeps_confidence() {
        let signal = Signal::real(vec![1.0, 2.0]).map(|v| v.len());
        assert_eq!(signal, Signal::real(2));
    }
}
