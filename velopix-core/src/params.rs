//! Parameter sets and the schemas algorithms declare for them.
//!
//! A [`ParameterSet`] is a plain name → value map. Each reconstruction
//! algorithm owns a [`ParameterSchema`] that lists every parameter it reads,
//! its kind and admissible range, and a default. Validation is strict:
//! every schema key is required and unknown keys are rejected, so a set that
//! passes validation fully determines the algorithm's behavior.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParamValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value.
    Float(f64),
    /// Categorical value.
    Choice(String),
}

impl ParamValue {
    /// Numeric view of the value; integers widen to `f64`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Short kind label used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Choice(_) => "choice",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Choice(value.to_string())
    }
}

/// Mapping from parameter name to value.
///
/// Keys are kept ordered so iteration, display and serialization are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning the updated set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a value, returning the previous one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.values.insert(name.into(), value.into())
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, name: &str) -> Result<&ParamValue> {
        self.get(name)
            .ok_or_else(|| Error::invalid_parameter(name, "missing required parameter"))
    }

    /// Reads a real-valued parameter (integers are accepted).
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the key is missing or not numeric.
    pub fn float(&self, name: &str) -> Result<f64> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| {
            Error::invalid_parameter(name, format!("expected float, got {}", value.kind_name()))
        })
    }

    /// Reads an integer parameter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the key is missing or not an integer.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(Error::invalid_parameter(
                name,
                format!("expected int, got {}", other.kind_name()),
            )),
        }
    }

    /// Reads a non-negative integer parameter as `usize`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the key is missing, not an
    /// integer, or negative.
    pub fn usize(&self, name: &str) -> Result<usize> {
        let v = self.int(name)?;
        usize::try_from(v).map_err(|_| Error::invalid_parameter(name, "must be non-negative"))
    }

    /// Reads a boolean parameter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the key is missing or not a bool.
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(Error::invalid_parameter(
                name,
                format!("expected bool, got {}", other.kind_name()),
            )),
        }
    }

    /// Reads a categorical parameter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the key is missing or not a choice.
    pub fn choice(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            ParamValue::Choice(v) => Ok(v.as_str()),
            other => Err(Error::invalid_parameter(
                name,
                format!("expected choice, got {}", other.kind_name()),
            )),
        }
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Kind and admissible range of a parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ParamKind {
    /// Real value in `[min, max]`.
    Float { min: f64, max: f64 },
    /// Integer value in `[min, max]`.
    Int { min: i64, max: i64 },
    /// Boolean flag.
    Bool,
    /// One of a fixed set of labels.
    Choice(Vec<&'static str>),
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Kind and range.
    pub kind: ParamKind,
    /// Default value.
    pub default: ParamValue,
    /// One-line description.
    pub description: &'static str,
}

impl ParamSpec {
    /// Declares a real-valued parameter.
    #[must_use]
    pub fn float(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float { min, max },
            default: ParamValue::Float(default),
            description: "",
        }
    }

    /// Declares an integer parameter.
    #[must_use]
    pub fn int(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: ParamValue::Int(default),
            description: "",
        }
    }

    /// Declares a boolean flag.
    #[must_use]
    pub fn bool(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            description: "",
        }
    }

    /// Declares a categorical parameter.
    #[must_use]
    pub fn choice(name: &'static str, choices: &[&'static str], default: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Choice(choices.to_vec()),
            default: ParamValue::Choice(default.to_string()),
            description: "",
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Checks a value against this declaration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] on kind mismatch or out-of-range values.
    pub fn check(&self, value: &ParamValue) -> Result<()> {
        match (&self.kind, value) {
            (ParamKind::Float { min, max }, v) if v.as_f64().is_some() => {
                let x = v.as_f64().unwrap_or(f64::NAN);
                if !x.is_finite() {
                    return Err(Error::invalid_parameter(self.name, "must be finite"));
                }
                if x < *min || x > *max {
                    return Err(Error::invalid_parameter(
                        self.name,
                        format!("{x} outside [{min}, {max}]"),
                    ));
                }
                Ok(())
            }
            (ParamKind::Int { min, max }, ParamValue::Int(x)) => {
                if x < min || x > max {
                    return Err(Error::invalid_parameter(
                        self.name,
                        format!("{x} outside [{min}, {max}]"),
                    ));
                }
                Ok(())
            }
            (ParamKind::Bool, ParamValue::Bool(_)) => Ok(()),
            (ParamKind::Choice(choices), ParamValue::Choice(label)) => {
                if choices.contains(&label.as_str()) {
                    Ok(())
                } else {
                    Err(Error::invalid_parameter(
                        self.name,
                        format!("`{label}` is not one of {choices:?}"),
                    ))
                }
            }
            (kind, v) => Err(Error::invalid_parameter(
                self.name,
                format!("{} value does not fit {kind:?}", v.kind_name()),
            )),
        }
    }
}

/// The full set of parameters an algorithm reads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ParameterSchema {
    /// Owning algorithm.
    pub algorithm: &'static str,
    specs: Vec<ParamSpec>,
}

impl ParameterSchema {
    /// Creates a schema from parameter declarations.
    #[must_use]
    pub fn new(algorithm: &'static str, specs: Vec<ParamSpec>) -> Self {
        Self { algorithm, specs }
    }

    /// All declarations, in declaration order.
    #[must_use]
    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// A complete parameter set holding every default.
    #[must_use]
    pub fn defaults(&self) -> ParameterSet {
        self.specs
            .iter()
            .map(|s| (s.name, s.default.clone()))
            .collect()
    }

    /// Validates a parameter set: every declared key present and in range,
    /// no undeclared keys.
    ///
    /// # Errors
    /// Returns the first [`Error::InvalidParameter`] found.
    pub fn validate(&self, params: &ParameterSet) -> Result<()> {
        if let Some((name, _)) = params.iter().find(|(name, _)| self.spec(name).is_none()) {
            return Err(Error::invalid_parameter(
                name,
                format!("not a parameter of {}", self.algorithm),
            ));
        }
        for spec in &self.specs {
            let value = params
                .get(spec.name)
                .ok_or_else(|| Error::invalid_parameter(spec.name, "missing required parameter"))?;
            spec.check(value)?;
        }
        Ok(())
    }
}
