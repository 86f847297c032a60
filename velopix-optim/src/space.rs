//! Search spaces over algorithm parameters.
//!
//! A [`SearchSpace`] is a complete base [`ParameterSet`] plus the dimensions
//! a strategy may vary. Every candidate a strategy produces is the base set
//! with the varied entries overwritten, so it is always complete.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use rand::Rng;
use velopix_core::{ParamValue, ParameterSchema, ParameterSet};

use crate::error::{Error, Result};

/// One searchable parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Dimension {
    /// An explicit list of values.
    Discrete(Vec<ParamValue>),
    /// A closed float interval; grids use `steps` evenly spaced points.
    Float {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Grid points, endpoints included.
        steps: usize,
    },
    /// A closed integer interval.
    Int {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
}

impl Dimension {
    fn check(&self, name: &str) -> Result<()> {
        let bad = |reason: &str| Err(Error::InvalidSearchSpace(format!("`{name}`: {reason}")));
        match *self {
            Self::Discrete(ref values) if values.is_empty() => bad("no values"),
            Self::Float { min, max, .. } if !(min.is_finite() && max.is_finite()) => {
                bad("bounds must be finite")
            }
            Self::Float { min, max, .. } if min > max => bad("min exceeds max"),
            Self::Float { steps: 0, .. } => bad("steps must be at least 1"),
            Self::Int { min, max } if min > max => bad("min exceeds max"),
            _ => Ok(()),
        }
    }

    /// Number of grid points.
    #[must_use]
    pub fn len(&self) -> usize {
        match *self {
            Self::Discrete(ref values) => values.len(),
            Self::Float { steps, .. } => steps,
            Self::Int { min, max } => usize::try_from(max.abs_diff(min))
                .map_or(usize::MAX, |n| n.saturating_add(1)),
        }
    }

    /// Returns true if the dimension has no grid points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th grid point.
    #[must_use]
    pub fn grid_value(&self, index: usize) -> ParamValue {
        match *self {
            Self::Discrete(ref values) => values[index.min(values.len() - 1)].clone(),
            Self::Float { min, max, steps } => {
                if steps <= 1 {
                    ParamValue::Float(min)
                } else {
                    let t = index.min(steps - 1) as f64 / (steps - 1) as f64;
                    ParamValue::Float(min + t * (max - min))
                }
            }
            Self::Int { min, max } => {
                let offset = u64::try_from(index).unwrap_or(u64::MAX);
                ParamValue::Int(min.saturating_add_unsigned(offset).min(max))
            }
        }
    }

    /// Draws a value uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match *self {
            Self::Discrete(ref values) => values[rng.gen_range(0..values.len())].clone(),
            Self::Float { min, max, .. } => ParamValue::Float(rng.gen_range(min..=max)),
            Self::Int { min, max } => ParamValue::Int(rng.gen_range(min..=max)),
        }
    }

    /// Continuous coordinate of `value`: the index for discrete dimensions,
    /// the value itself otherwise. `None` if the value does not belong.
    #[must_use]
    pub fn coordinate(&self, value: &ParamValue) -> Option<f64> {
        match *self {
            Self::Discrete(ref values) => values.iter().position(|v| v == value).map(|i| i as f64),
            Self::Float { min, max, .. } => value.as_f64().filter(|v| (min..=max).contains(v)),
            Self::Int { min, max } => match *value {
                ParamValue::Int(v) if (min..=max).contains(&v) => Some(v as f64),
                _ => None,
            },
        }
    }

    /// Lowest and highest coordinate.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Discrete(ref values) => (0.0, values.len().saturating_sub(1) as f64),
            Self::Float { min, max, .. } => (min, max),
            Self::Int { min, max } => (min as f64, max as f64),
        }
    }

    /// True if coordinates snap to integers.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        !matches!(self, Self::Float { .. })
    }

    /// Value at `coordinate`, clamped to the bounds.
    #[must_use]
    pub fn value_at(&self, coordinate: f64) -> ParamValue {
        let (lo, hi) = self.bounds();
        let c = coordinate.clamp(lo, hi);
        match *self {
            Self::Discrete(ref values) => values[c.round() as usize].clone(),
            Self::Float { .. } => ParamValue::Float(c),
            Self::Int { .. } => ParamValue::Int(c.round() as i64),
        }
    }
}

/// Base parameters plus the dimensions to search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    base: ParameterSet,
    dimensions: Vec<(String, Dimension)>,
}

impl SearchSpace {
    /// Creates a search space.
    ///
    /// # Errors
    /// Returns `InvalidSearchSpace` for duplicate or malformed dimensions.
    pub fn new(
        base: ParameterSet,
        dimensions: impl IntoIterator<Item = (impl Into<String>, Dimension)>,
    ) -> Result<Self> {
        let mut dims: Vec<(String, Dimension)> = Vec::new();
        for (name, dim) in dimensions {
            let name = name.into();
            dim.check(&name)?;
            if dims.iter().any(|(n, _)| *n == name) {
                return Err(Error::InvalidSearchSpace(format!("duplicate dimension `{name}`")));
            }
            dims.push((name, dim));
        }
        Ok(Self {
            base,
            dimensions: dims,
        })
    }

    /// Checks that the base set and every grid point satisfy `schema`.
    ///
    /// Float dimensions are checked at their bounds.
    ///
    /// # Errors
    /// Returns `InvalidSearchSpace` naming the offending dimension.
    pub fn validate_against(&self, schema: &ParameterSchema) -> Result<()> {
        schema
            .validate(&self.base)
            .map_err(|e| Error::InvalidSearchSpace(format!("base parameters: {e}")))?;
        for (name, dim) in &self.dimensions {
            let spec = schema.spec(name).ok_or_else(|| {
                Error::InvalidSearchSpace(format!("`{name}` is not a {} parameter", schema.algorithm))
            })?;
            let probes: Vec<ParamValue> = match dim {
                Dimension::Discrete(values) => values.clone(),
                Dimension::Float { min, max, .. } => {
                    vec![ParamValue::Float(*min), ParamValue::Float(*max)]
                }
                Dimension::Int { min, max } => vec![ParamValue::Int(*min), ParamValue::Int(*max)],
            };
            for value in &probes {
                spec.check(value)
                    .map_err(|e| Error::InvalidSearchSpace(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// The base parameter set.
    #[must_use]
    pub fn base(&self) -> &ParameterSet {
        &self.base
    }

    /// The searched dimensions, in declaration order.
    #[must_use]
    pub fn dimensions(&self) -> &[(String, Dimension)] {
        &self.dimensions
    }

    /// Number of grid points in the full cartesian product.
    #[must_use]
    pub fn grid_size(&self) -> usize {
        self.dimensions
            .iter()
            .map(|(_, d)| d.len())
            .fold(1, usize::saturating_mul)
    }

    /// The base set with `values` assigned to the dimensions, in order.
    #[must_use]
    pub fn candidate(&self, values: impl IntoIterator<Item = ParamValue>) -> ParameterSet {
        let mut params = self.base.clone();
        for ((name, _), value) in self.dimensions.iter().zip(values) {
            params.insert(name.clone(), value);
        }
        params
    }
}
