// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-variable values and the kind conversion table.
//!
//! A [`PvValue`] carries exactly one scalar kind. Array-valued channels are
//! not modelled: reads always request a single element.
//!
//! Conversions between kinds go through [`convert`], a table keyed by
//! `(source kind, target kind)`:
//!
//! ```text
//!             -> Int32   Float32   Float64   Enum    Text
//! Int32          =       cast      cast      range   --
//! Float32        trunc   =         cast      trunc   --
//! Float64        trunc   cast      =         trunc   --
//! Enum           cast    cast      cast      =       --
//! Text           --      --        --        --      =
//! ```
//!
//! `trunc` rounds toward zero and fails when the value is not finite or does
//! not fit the target range. `--` is always a [`ConversionError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Runtime tag identifying which scalar kind a [`PvValue`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// 32-bit signed integer (`DBF_LONG`).
    Int32,
    /// 32-bit float (`DBF_FLOAT`).
    Float32,
    /// 64-bit float (`DBF_DOUBLE`).
    Float64,
    /// 16-bit enum index (`DBF_ENUM`).
    Enum,
    /// Text (`DBF_STRING`).
    Text,
}

impl ValueKind {
    /// All kinds, in table order.
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Int32,
        ValueKind::Float32,
        ValueKind::Float64,
        ValueKind::Enum,
        ValueKind::Text,
    ];

    /// Short lowercase name used in configuration files and node names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueKind::Int32 => "int32",
            ValueKind::Float32 => "float32",
            ValueKind::Float64 => "float64",
            ValueKind::Enum => "enum",
            ValueKind::Text => "text",
        }
    }

    /// Whether values of this kind take part in numeric casts.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::Text)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int32" | "int" | "long" => Ok(ValueKind::Int32),
            "float32" | "float" => Ok(ValueKind::Float32),
            "float64" | "double" => Ok(ValueKind::Float64),
            "enum" => Ok(ValueKind::Enum),
            "text" | "string" => Ok(ValueKind::Text),
            other => Err(format!("unknown value kind '{}'", other)),
        }
    }
}

/// A scalar process-variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PvValue {
    Int32(i32),
    Float32(f32),
    Float64(f64),
    Enum(u16),
    Text(String),
}

impl PvValue {
    /// Kind tag of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            PvValue::Int32(_) => ValueKind::Int32,
            PvValue::Float32(_) => ValueKind::Float32,
            PvValue::Float64(_) => ValueKind::Float64,
            PvValue::Enum(_) => ValueKind::Enum,
            PvValue::Text(_) => ValueKind::Text,
        }
    }

    /// Parse a textual literal as a value of `kind`.
    ///
    /// Numeric kinds accept any numeric literal and then go through
    /// [`convert`], so `"3.0"` is a valid `Int32` literal but `"3.5"` is
    /// truncated to 3 the same way a read would be.
    pub fn parse(kind: ValueKind, text: &str) -> Result<Self, ConversionError> {
        if kind == ValueKind::Text {
            return Ok(PvValue::Text(text.to_string()));
        }
        let trimmed = text.trim();
        let parsed = if let Ok(i) = trimmed.parse::<i32>() {
            PvValue::Int32(i)
        } else if let Ok(f) = trimmed.parse::<f64>() {
            PvValue::Float64(f)
        } else {
            return Err(ConversionError::Unparsable {
                target: kind,
                text: text.to_string(),
            });
        };
        convert(&parsed, kind)
    }

    /// Numeric view of the value, `None` for text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Int32(v) => Some(f64::from(*v)),
            PvValue::Float32(v) => Some(f64::from(*v)),
            PvValue::Float64(v) => Some(*v),
            PvValue::Enum(v) => Some(f64::from(*v)),
            PvValue::Text(_) => None,
        }
    }

    /// Text view of the value, `None` for numeric kinds.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PvValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Int32(v) => write!(f, "{}", v),
            PvValue::Float32(v) => write!(f, "{}", v),
            PvValue::Float64(v) => write!(f, "{}", v),
            PvValue::Enum(v) => write!(f, "{}", v),
            PvValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i32> for PvValue {
    fn from(v: i32) -> Self {
        PvValue::Int32(v)
    }
}

impl From<f32> for PvValue {
    fn from(v: f32) -> Self {
        PvValue::Float32(v)
    }
}

impl From<f64> for PvValue {
    fn from(v: f64) -> Self {
        PvValue::Float64(v)
    }
}

impl From<u16> for PvValue {
    fn from(v: u16) -> Self {
        PvValue::Enum(v)
    }
}

impl From<&str> for PvValue {
    fn from(v: &str) -> Self {
        PvValue::Text(v.to_string())
    }
}

impl From<String> for PvValue {
    fn from(v: String) -> Self {
        PvValue::Text(v)
    }
}

/// One value as produced by the client, with alarm metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PvSample {
    pub value: PvValue,
    /// Alarm severity.
    pub severity: u32,
    /// Alarm status.
    pub status: u32,
    /// Server-side timestamp.
    pub timestamp: SystemTime,
    /// Native element count of the channel.
    pub count: usize,
}

impl PvSample {
    /// Sample with no alarm, stamped now.
    pub fn new(value: PvValue) -> Self {
        Self {
            value,
            severity: 0,
            status: 0,
            timestamp: SystemTime::now(),
            count: 1,
        }
    }
}

/// Failure to represent a value as the requested kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("no conversion from {from} to {to}")]
    Unsupported { from: ValueKind, to: ValueKind },

    #[error("{value} does not fit in {to}")]
    OutOfRange { value: String, to: ValueKind },

    #[error("cannot parse '{text}' as {target}")]
    Unparsable { target: ValueKind, text: String },
}

/// Convert `value` to `target` following the table in the module docs.
pub fn convert(value: &PvValue, target: ValueKind) -> Result<PvValue, ConversionError> {
    if value.kind() == target {
        return Ok(value.clone());
    }

    let out_of_range = || ConversionError::OutOfRange {
        value: value.to_string(),
        to: target,
    };

    match (value, target) {
        (PvValue::Text(_), _) | (_, ValueKind::Text) => Err(ConversionError::Unsupported {
            from: value.kind(),
            to: target,
        }),
        (PvValue::Int32(v), ValueKind::Float32) => Ok(PvValue::Float32(*v as f32)),
        (PvValue::Int32(v), ValueKind::Float64) => Ok(PvValue::Float64(f64::from(*v))),
        (PvValue::Int32(v), ValueKind::Enum) => u16::try_from(*v)
            .map(PvValue::Enum)
            .map_err(|_| out_of_range()),
        (PvValue::Enum(v), ValueKind::Int32) => Ok(PvValue::Int32(i32::from(*v))),
        (PvValue::Enum(v), ValueKind::Float32) => Ok(PvValue::Float32(f32::from(*v))),
        (PvValue::Enum(v), ValueKind::Float64) => Ok(PvValue::Float64(f64::from(*v))),
        (PvValue::Float32(v), ValueKind::Float64) => Ok(PvValue::Float64(f64::from(*v))),
        (PvValue::Float64(v), ValueKind::Float32) => {
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                Err(out_of_range())
            } else {
                Ok(PvValue::Float32(*v as f32))
            }
        }
        (PvValue::Float32(_) | PvValue::Float64(_), ValueKind::Int32 | ValueKind::Enum) => {
            let v = value.as_f64().ok_or_else(out_of_range)?;
            truncate_to(v, target).ok_or_else(out_of_range)
        }
        // Same-kind pairs were handled above.
        _ => Err(ConversionError::Unsupported {
            from: value.kind(),
            to: target,
        }),
    }
}

fn truncate_to(v: f64, target: ValueKind) -> Option<PvValue> {
    if !v.is_finite() {
        return None;
    }
    let t = v.trunc();
    match target {
        ValueKind::Int32 if t >= f64::from(i32::MIN) && t <= f64::from(i32::MAX) => {
            Some(PvValue::Int32(t as i32))
        }
        ValueKind::Enum if t >= 0.0 && t <= f64::from(u16::MAX) => Some(PvValue::Enum(t as u16)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_kind_passes_through() {
        for value in [
            PvValue::Int32(-7),
            PvValue::Float32(1.5),
            PvValue::Float64(2.25),
            PvValue::Enum(3),
            PvValue::from("idle"),
        ] {
            assert_eq!(convert(&value, value.kind()).unwrap(), value);
        }
    }

    #[test]
    fn double_to_int_truncates_toward_zero() {
        assert_eq!(
            convert(&PvValue::Float64(42.9), ValueKind::Int32).unwrap(),
            PvValue::Int32(42)
        );
        assert_eq!(
            convert(&PvValue::Float64(-1.7), ValueKind::Int32).unwrap(),
            PvValue::Int32(-1)
        );
    }

    #[test]
    fn out_of_range_casts_fail() {
        assert!(matches!(
            convert(&PvValue::Float64(1e12), ValueKind::Int32),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            convert(&PvValue::Int32(-1), ValueKind::Enum),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(convert(&PvValue::Float64(f64::NAN), ValueKind::Int32).is_err());
        assert!(convert(&PvValue::Float64(1e300), ValueKind::Float32).is_err());
    }

    #[test]
    fn text_only_matches_text() {
        assert!(matches!(
            convert(&PvValue::from("42"), ValueKind::Int32),
            Err(ConversionError::Unsupported { .. })
        ));
        assert!(matches!(
            convert(&PvValue::Int32(42), ValueKind::Text),
            Err(ConversionError::Unsupported { .. })
        ));
    }

    #[test]
    fn enum_index_widens() {
        assert_eq!(
            convert(&PvValue::Enum(2), ValueKind::Float64).unwrap(),
            PvValue::Float64(2.0)
        );
    }

    #[test]
    fn parse_literals() {
        assert_eq!(
            PvValue::parse(ValueKind::Int32, " 42 ").unwrap(),
            PvValue::Int32(42)
        );
        assert_eq!(
            PvValue::parse(ValueKind::Float64, "3.5").unwrap(),
            PvValue::Float64(3.5)
        );
        assert_eq!(
            PvValue::parse(ValueKind::Text, " spaced ").unwrap(),
            PvValue::from(" spaced ")
        );
        assert!(PvValue::parse(ValueKind::Enum, "open").is_err());
    }

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in ValueKind::ALL {
            assert_eq!(kind.as_str().parse::<ValueKind>().unwrap(), kind);
        }
        assert_eq!("double".parse::<ValueKind>().unwrap(), ValueKind::Float64);
    }
}
