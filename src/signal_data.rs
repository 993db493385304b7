//! Signal definitions
//!
//! A signal is either directly authored (a meander: a sequence of values the
//! sampler reads index by index) or derived from other signals by id (a
//! difference). Kinds are a closed sum type; adding one means adding a
//! variant here plus a match arm in `SignalData::is_sampled` and in
//! `interpolator::build_interpolators`.

use crate::error::{EvaluatorError, EvaluatorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable unique signal identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(Uuid);

impl SignalId {
    /// Fresh random identifier
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for SignalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind tag of a signal definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Meander,
    Difference,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Meander => write!(f, "Meander"),
            SignalKind::Difference => write!(f, "Difference"),
        }
    }
}

/// Directly authored sample values
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanderSignalData {
    values: Vec<f64>,
}

impl MeanderSignalData {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn samples_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `i`, clamped to the authored range
    ///
    /// Out-of-range reads return the nearest edge value; an empty meander
    /// reads as silence.
    pub fn sample_at(&self, i: usize) -> f64 {
        match self.values.len() {
            0 => 0.0,
            len => self.values[i.min(len - 1)],
        }
    }
}

/// Pointwise `minuend - subtrahend` of two other signals
///
/// Serialized as just the two ids; the dependency array is rebuilt on load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DifferenceFields", into = "DifferenceFields")]
pub struct DifferenceSignalData {
    minuend: SignalId,
    subtrahend: SignalId,
    dependencies: [SignalId; 2],
}

impl DifferenceSignalData {
    pub fn new(minuend: SignalId, subtrahend: SignalId) -> Self {
        Self {
            minuend,
            subtrahend,
            dependencies: [minuend, subtrahend],
        }
    }

    pub fn minuend(&self) -> SignalId {
        self.minuend
    }

    pub fn subtrahend(&self) -> SignalId {
        self.subtrahend
    }

    pub fn dependencies(&self) -> &[SignalId] {
        &self.dependencies
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct DifferenceFields {
    minuend: SignalId,
    subtrahend: SignalId,
}

impl From<DifferenceFields> for DifferenceSignalData {
    fn from(fields: DifferenceFields) -> Self {
        DifferenceSignalData::new(fields.minuend, fields.subtrahend)
    }
}

impl From<DifferenceSignalData> for DifferenceFields {
    fn from(data: DifferenceSignalData) -> Self {
        DifferenceFields {
            minuend: data.minuend,
            subtrahend: data.subtrahend,
        }
    }
}

/// Signal definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalData {
    Meander(MeanderSignalData),
    Difference(DifferenceSignalData),
}

impl SignalData {
    pub fn meander(values: impl IntoIterator<Item = f64>) -> Self {
        SignalData::Meander(MeanderSignalData::new(values))
    }

    pub fn difference(minuend: SignalId, subtrahend: SignalId) -> Self {
        SignalData::Difference(DifferenceSignalData::new(minuend, subtrahend))
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            SignalData::Meander(_) => SignalKind::Meander,
            SignalData::Difference(_) => SignalKind::Difference,
        }
    }

    /// Ids this signal reads from; empty for primary signals
    pub fn dependencies(&self) -> &[SignalId] {
        match self {
            SignalData::Meander(_) => &[],
            SignalData::Difference(d) => d.dependencies(),
        }
    }

    /// Whether the sampler writes this signal into the value buffer
    pub fn is_sampled(&self) -> bool {
        match self {
            SignalData::Meander(_) => true,
            SignalData::Difference(_) => false,
        }
    }

    /// Discrete value at index `i`
    ///
    /// Only directly sampled kinds support this; derived kinds fail fast.
    pub fn sample_at(&self, i: usize) -> EvaluatorResult<f64> {
        match self {
            SignalData::Meander(m) => Ok(m.sample_at(i)),
            SignalData::Difference(_) => Err(EvaluatorError::UnsupportedSignalKind(self.kind())),
        }
    }
}

/// A signal as enumerated by an adapter
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    pub id: SignalId,
    pub data: SignalData,
}

impl Signal {
    pub fn new(id: SignalId, data: SignalData) -> Self {
        Self { id, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meander_clamps_index() {
        let data = SignalData::meander([1.0, 2.0, 3.0]);
        assert_eq!(data.sample_at(0).unwrap(), 1.0);
        assert_eq!(data.sample_at(2).unwrap(), 3.0);
        assert_eq!(data.sample_at(100).unwrap(), 3.0);
    }

    #[test]
    fn test_empty_meander_reads_zero() {
        let data = SignalData::meander(std::iter::empty());
        assert_eq!(data.sample_at(5).unwrap(), 0.0);
    }

    #[test]
    fn test_difference_is_not_sampled() {
        let (a, b) = (SignalId::new_v4(), SignalId::new_v4());
        let data = SignalData::difference(a, b);

        assert_eq!(data.kind(), SignalKind::Difference);
        assert!(!data.is_sampled());
        assert_eq!(data.dependencies(), &[a, b]);
        assert!(matches!(
            data.sample_at(0),
            Err(EvaluatorError::UnsupportedSignalKind(SignalKind::Difference))
        ));
    }

    #[test]
    fn test_json_shape() {
        let a: SignalId = "6f1c1b8e-1f5e-4b7c-9a55-1f2e3d4c5b6a".parse().unwrap();
        let b: SignalId = "0a0b0c0d-0000-4000-8000-000000000001".parse().unwrap();

        let json = serde_json::to_value(SignalData::difference(a, b)).unwrap();
        assert_eq!(json["kind"], "difference");
        assert_eq!(json["minuend"], a.to_string());

        let back: SignalData = serde_json::from_value(json).unwrap();
        assert_eq!(back.dependencies(), &[a, b]);

        let meander: SignalData =
            serde_json::from_str(r#"{"kind":"meander","values":[0.0,1.0]}"#).unwrap();
        assert_eq!(meander.kind(), SignalKind::Meander);
    }
}
