//! Numeric decoding that tolerates the shapes older rows were written with.
//!
//! Stored documents may carry a count as `12`, `12.0` or `"12"`. These
//! helpers collapse all of them into one typed value at the Store boundary.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(i64),
    Float(f64),
    Text(String),
    Missing(()),
}

impl Number {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Missing(()) => None,
        }
    }
}

/// Accepts integer, float, numeric string or null; anything unusable becomes 0.
#[allow(clippy::cast_possible_truncation)]
pub fn i32_from_any<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Number::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .filter(|v| v.is_finite())
        .map_or(0, |v| v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32))
}

/// Same as [`i32_from_any`] for fractional values.
pub fn f64_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Number::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "super::i32_from_any")]
        count: i32,
        #[serde(default, deserialize_with = "super::f64_from_any")]
        score: f64,
    }

    fn probe(json: &str) -> Probe {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_ints_floats_and_strings() {
        assert_eq!(probe(r#"{"count": 12, "score": 8}"#).count, 12);
        assert_eq!(probe(r#"{"count": 12.0, "score": 8.5}"#).count, 12);
        assert_eq!(probe(r#"{"count": "12", "score": "7.25"}"#).count, 12);
        assert!((probe(r#"{"count": 1, "score": "7.25"}"#).score - 7.25).abs() < f64::EPSILON);
    }

    #[test]
    fn null_missing_and_garbage_become_zero() {
        assert_eq!(probe(r#"{"count": null, "score": null}"#).count, 0);
        assert_eq!(probe("{}").count, 0);
        assert_eq!(probe(r#"{"count": "n/a", "score": "?"}"#).count, 0);
    }
}
