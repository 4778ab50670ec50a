//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. A [`Task`] is what a
//! caller (or a parameters file) writes down; the [`pipeline`](super::pipeline)
//! binds it against the operation registry and hands typed values to the
//! [`operations`](super::operations).
//!
//! ## Types
//!
//! - [`Param`]: one scalar argument (bool, integer or float). Integers and
//!   floats stay distinct because `crop`/`zoom` treat any float as fractional.
//! - [`TaskValue`]: how the arguments are shaped (absent, scalar, list or map).
//! - [`Task`]: `(name, value)`, serialized as `[name]` or `[name, value]`.
//! - [`Region`]: a rectangle, either all-absolute pixels or all-fractional.
//! - [`Quality`]: lossy encoding quality (1 to 100). Clamped on construction.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// One argument value.
///
/// Deserialization tries `bool`, then integer, then float, so `214` stays an
/// integer and `0.25` (or `1.0`) becomes a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Param {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Param::Int(v) => Some(v as f64),
            Param::Float(v) => Some(v),
            Param::Bool(_) => None,
        }
    }

    /// Integer value; floats are accepted only when they have no fractional part.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Param::Int(v) => Some(v),
            Param::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Param::Bool(v) => Some(v),
            Param::Int(v) => Some(v != 0),
            Param::Float(_) => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Param::Float(_))
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value as i64)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Float(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Bool(v) => write!(f, "{v}"),
            Param::Int(v) => write!(f, "{v}"),
            Param::Float(v) => write!(f, "{v}"),
        }
    }
}

/// The argument shape of a task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    /// Call with no parameters (`null` in JSON).
    #[default]
    Absent,
    /// Bind to the operation's primary parameter.
    Scalar(Param),
    /// Bind by position.
    Positional(Vec<Param>),
    /// Bind by keyword.
    Named(BTreeMap<String, Param>),
}

/// A named operation plus its arguments. Order within a pipeline is significant.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub value: TaskValue,
}

impl Task {
    pub fn new(name: impl Into<String>, value: TaskValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, TaskValue::Absent)
    }

    pub fn scalar(name: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(name, TaskValue::Scalar(value.into()))
    }

    pub fn positional<P: Into<Param>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = P>,
    ) -> Self {
        Self::new(
            name,
            TaskValue::Positional(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn named<K: Into<String>, P: Into<Param>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = (K, P)>,
    ) -> Self {
        Self::new(
            name,
            TaskValue::Named(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        )
    }
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let absent = self.value == TaskValue::Absent;
        let mut seq = serializer.serialize_seq(Some(if absent { 1 } else { 2 }))?;
        seq.serialize_element(&self.name)?;
        if !absent {
            seq.serialize_element(&self.value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaskVisitor;

        impl<'de> Visitor<'de> for TaskVisitor {
            type Value = Task;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a task as [name] or [name, value]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Task, A::Error> {
                let name: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let value: TaskValue = seq.next_element()?.unwrap_or_default();
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(Task { name, value })
            }
        }

        deserializer.deserialize_seq(TaskVisitor)
    }
}

/// A rectangle `(x, y, w, h)`, never mixing absolute and fractional units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// Pixel units.
    Absolute { x: i64, y: i64, w: i64, h: i64 },
    /// Fractions of the image width/height, in `[0, 1]`.
    Fractional { x: f64, y: f64, w: f64, h: f64 },
}

impl Region {
    /// The full frame as a fractional region.
    pub const FULL: Region = Region::Fractional {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    /// Build from four parameters. Any float makes all four fractional.
    pub fn from_params(values: [Param; 4]) -> Option<Self> {
        if values.iter().any(|p| p.is_float()) {
            let [x, y, w, h] = values.map(Param::as_f64);
            Some(Region::Fractional {
                x: x?,
                y: y?,
                w: w?,
                h: h?,
            })
        } else {
            let [x, y, w, h] = values.map(Param::as_i64);
            Some(Region::Absolute {
                x: x?,
                y: y?,
                w: w?,
                h: h?,
            })
        }
    }
}
