//! Pivot level crossing detector.
//!
//! Evaluates the current price against a session's ladder and reports at
//! most one new breach per poll.

use pivotbot_core::{BreachDirection, LevelName, PivotLadder};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Default hysteresis margin (0.1%).
pub const DEFAULT_EPSILON: f64 = 0.001;

/// Maximum number of ladder targets reported with an alert.
const MAX_TARGETS: usize = 2;

/// Configuration for the crossing detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Fraction price must clear a level by before it counts as breached.
    pub epsilon: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// A level newly breached this poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelBreach {
    pub level: LevelName,
    pub level_price: f64,
    pub price: f64,
    pub direction: BreachDirection,
}

/// Stateless crossing detector. Deduplication lives in the session state.
#[derive(Debug, Clone, Default)]
pub struct CrossingDetector {
    config: DetectorConfig,
}

impl CrossingDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Whether `price` clears `level` by more than the hysteresis margin.
    pub fn is_breached(&self, level: LevelName, price: f64, ladder: &PivotLadder) -> bool {
        let level_price = level.price_in(ladder);
        match level.direction() {
            BreachDirection::Up => price > level_price * (1.0 + self.config.epsilon),
            BreachDirection::Down => price < level_price * (1.0 - self.config.epsilon),
        }
    }

    /// Highest-priority breached level not yet in `alerted`.
    ///
    /// Levels are checked R3, R2, R1, P_UP, S1, S2, S3, P_DOWN and the first
    /// match wins, so a move through several levels in one poll only reports
    /// the outermost one.
    pub fn detect(
        &self,
        price: f64,
        ladder: &PivotLadder,
        alerted: &[LevelName],
    ) -> Option<LevelBreach> {
        if !price.is_finite() {
            return None;
        }

        let level = LevelName::PRIORITY
            .into_iter()
            .filter(|level| !alerted.contains(level))
            .find(|level| self.is_breached(*level, price, ladder))?;

        trace!(level = %level, price, "Level breached");
        Some(LevelBreach {
            level,
            level_price: level.price_in(ladder),
            price,
            direction: level.direction(),
        })
    }
}

/// Next price targets after a breach: up to two ladder levels further out,
/// padded with a one-ATR extension from the current price.
pub fn breach_targets(breach: &LevelBreach, ladder: &PivotLadder, atr: f64) -> Vec<f64> {
    let mut targets: Vec<f64> = breach
        .level
        .beyond()
        .iter()
        .take(MAX_TARGETS)
        .map(|level| level.price_in(ladder))
        .collect();

    if targets.len() < MAX_TARGETS && atr > 0.0 && atr.is_finite() {
        targets.push(match breach.direction {
            BreachDirection::Up => breach.price + atr,
            BreachDirection::Down => breach.price - atr,
        });
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::compute_ladder;
    use pivotbot_core::SessionState;
    use pretty_assertions::assert_eq;

    fn ladder() -> PivotLadder {
        compute_ladder(70000.0, 69000.0, 69500.0)
    }

    #[test]
    fn test_hysteresis_boundary() {
        let detector = CrossingDetector::default();
        let l = ladder();

        assert!(!detector.is_breached(LevelName::R1, l.r1, &l));
        assert!(detector.is_breached(LevelName::R1, l.r1 * 1.0011, &l));
        assert!(!detector.is_breached(LevelName::R1, l.r1 * 1.0009, &l));

        assert!(!detector.is_breached(LevelName::S1, l.s1, &l));
        assert!(detector.is_breached(LevelName::S1, l.s1 * 0.9989, &l));
        assert!(!detector.is_breached(LevelName::S1, l.s1 * 0.9991, &l));
    }

    #[test]
    fn test_exactly_at_r1_only_reclaims_pivot() {
        let detector = CrossingDetector::default();
        let breach = detector.detect(70000.0, &ladder(), &[]).unwrap();
        assert_eq!(breach.level, LevelName::PivotUp);
    }

    #[test]
    fn test_r1_then_r2_same_session() {
        let detector = CrossingDetector::default();
        let mut state = SessionState::new();
        state.rollover(86_399_999, ladder);

        let l = *state.ladder().unwrap();
        let first = detector.detect(70080.0, &l, &state.alerted_levels).unwrap();
        assert_eq!(first.level, LevelName::R1);
        assert_eq!(first.level_price, 70000.0);
        assert_eq!(first.direction, BreachDirection::Up);
        state.mark_alerted(first.level);
        assert_eq!(state.alerted_levels, vec![LevelName::R1]);

        let second = detector.detect(70600.0, &l, &state.alerted_levels).unwrap();
        assert_eq!(second.level, LevelName::R2);
        state.mark_alerted(second.level);
        assert_eq!(state.alerted_levels, vec![LevelName::R1, LevelName::R2]);
    }

    #[test]
    fn test_fast_move_reports_outermost_only() {
        let detector = CrossingDetector::default();
        let breach = detector.detect(72000.0, &ladder(), &[]).unwrap();
        assert_eq!(breach.level, LevelName::R3);
    }

    #[test]
    fn test_priority_after_alerts() {
        let detector = CrossingDetector::default();
        let alerted = [LevelName::R1, LevelName::R2, LevelName::R3];
        let breach = detector.detect(72000.0, &ladder(), &alerted).unwrap();
        assert_eq!(breach.level, LevelName::PivotUp);

        let all_up = [LevelName::R1, LevelName::R2, LevelName::R3, LevelName::PivotUp];
        assert!(detector.detect(72000.0, &ladder(), &all_up).is_none());
    }

    #[test]
    fn test_support_side() {
        let detector = CrossingDetector::default();
        let breach = detector.detect(68900.0, &ladder(), &[]).unwrap();
        assert_eq!(breach.level, LevelName::S1);
        assert_eq!(breach.direction, BreachDirection::Down);

        let breach = detector.detect(68900.0, &ladder(), &[LevelName::S1]).unwrap();
        assert_eq!(breach.level, LevelName::PivotDown);
    }

    #[test]
    fn test_quiet_inside_band() {
        let detector = CrossingDetector::default();
        assert!(detector.detect(69500.0, &ladder(), &[]).is_none());
        assert!(detector.detect(f64::NAN, &ladder(), &[]).is_none());
    }

    #[test]
    fn test_targets() {
        let l = ladder();
        let breach = |level: LevelName, price: f64| LevelBreach {
            level,
            level_price: level.price_in(&l),
            price,
            direction: level.direction(),
        };

        assert_eq!(
            breach_targets(&breach(LevelName::R1, 70080.0), &l, 500.0),
            vec![70500.0, 71000.0]
        );
        assert_eq!(
            breach_targets(&breach(LevelName::PivotUp, 69600.0), &l, 500.0),
            vec![70000.0, 70500.0]
        );
        assert_eq!(
            breach_targets(&breach(LevelName::R2, 70600.0), &l, 500.0),
            vec![71000.0, 71100.0]
        );
        assert_eq!(breach_targets(&breach(LevelName::S3, 67900.0), &l, 400.0), vec![67500.0]);
        assert_eq!(breach_targets(&breach(LevelName::R3, 71100.0), &l, 0.0), Vec::<f64>::new());
    }
}
