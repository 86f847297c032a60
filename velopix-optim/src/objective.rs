//! Scalar objectives over metric reports.

use std::fmt;
use std::str::FromStr;

use velopix_core::MetricReport;

use crate::error::{Error, Result};

/// Turns a [`MetricReport`] into a higher-is-better score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Objective {
    /// Score is the efficiency.
    #[default]
    MaximizeEfficiency,
    /// Score is the negated ghost rate.
    MinimizeGhostRate,
    /// `efficiency * e - ghost_rate * g - clone_rate * c`.
    Weighted {
        /// Weight of the efficiency.
        efficiency: f64,
        /// Penalty per unit ghost rate.
        ghost_rate: f64,
        /// Penalty per unit clone rate.
        clone_rate: f64,
    },
}

impl Objective {
    /// Weighted objective.
    #[must_use]
    pub fn weighted(efficiency: f64, ghost_rate: f64, clone_rate: f64) -> Self {
        Self::Weighted {
            efficiency,
            ghost_rate,
            clone_rate,
        }
    }

    /// Score of `report`; higher is better.
    #[must_use]
    pub fn score(&self, report: &MetricReport) -> f64 {
        match *self {
            Self::MaximizeEfficiency => report.efficiency,
            Self::MinimizeGhostRate => -report.ghost_rate,
            Self::Weighted {
                efficiency,
                ghost_rate,
                clone_rate,
            } => {
                efficiency * report.efficiency
                    - ghost_rate * report.ghost_rate
                    - clone_rate * report.clone_rate
            }
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaximizeEfficiency => f.write_str("efficiency"),
            Self::MinimizeGhostRate => f.write_str("ghost_rate"),
            Self::Weighted {
                efficiency,
                ghost_rate,
                clone_rate,
            } => write!(f, "weighted({efficiency}, {ghost_rate}, {clone_rate})"),
        }
    }
}

impl FromStr for Objective {
    type Err = Error;

    /// Parses `efficiency`, `ghost_rate`, `weighted` (unit weights) or
    /// `weighted:E,G,C`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Core(velopix_core::Error::invalid_parameter("objective", s));
        match s {
            "efficiency" => Ok(Self::MaximizeEfficiency),
            "ghost_rate" | "ghost-rate" => Ok(Self::MinimizeGhostRate),
            "weighted" => Ok(Self::weighted(1.0, 1.0, 1.0)),
            _ => {
                let weights = s.strip_prefix("weighted:").ok_or_else(invalid)?;
                let parsed = weights
                    .split(',')
                    .map(|w| w.trim().parse::<f64>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>>>()?;
                match parsed[..] {
                    [e, g, c] if parsed.iter().all(|w| w.is_finite()) => {
                        Ok(Self::weighted(e, g, c))
                    }
                    _ => Err(invalid()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use velopix_core::metrics::MetricCounts;

    fn report() -> MetricReport {
        MetricReport::from_counts(MetricCounts {
            truth_tracks: 4,
            truth_matched: 3,
            reconstructed: 5,
            matched: 4,
            ghosts: 1,
            clones: 1,
            purity_sum: 4.0,
            hit_efficiency_sum: 4.0,
        })
    }

    #[test]
    fn test_scores() {
        let r = report();
        assert_abs_diff_eq!(Objective::MaximizeEfficiency.score(&r), 0.75);
        assert_abs_diff_eq!(Objective::MinimizeGhostRate.score(&r), -0.2);
        assert_abs_diff_eq!(
            Objective::weighted(1.0, 2.0, 1.0).score(&r),
            0.75 - 0.4 - 0.25,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "efficiency".parse::<Objective>().unwrap(),
            Objective::MaximizeEfficiency
        );
        assert_eq!(
            "weighted:1, 0.5,0".parse::<Objective>().unwrap(),
            Objective::weighted(1.0, 0.5, 0.0)
        );
        assert!("weighted:1,2".parse::<Objective>().is_err());
        assert!("purity".parse::<Objective>().is_err());
    }
}
