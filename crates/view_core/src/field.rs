//! Field-level update plumbing shared by both views.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Closed set of named fields a view state exposes to name-based updates.
pub trait FieldSet: Copy + Eq + 'static {
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|field| field.name()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownField,
    TypeMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Applied,
    Ignored(IgnoreReason),
}

impl FieldUpdate {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// Outcome of merging a batch of named values into a view state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: Vec<&'static str>,
    pub unknown: Vec<String>,
    pub mismatched: Vec<String>,
}

impl MergeReport {
    pub(crate) fn record(&mut self, key: String, field: Option<&'static str>, outcome: FieldUpdate) {
        match (outcome, field) {
            (FieldUpdate::Applied, Some(name)) => self.applied.push(name),
            (FieldUpdate::Ignored(IgnoreReason::TypeMismatch), _) => self.mismatched.push(key),
            _ => self.unknown.push(key),
        }
    }

    pub fn ignored(&self) -> usize {
        self.unknown.len() + self.mismatched.len()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Writes `converted` into `slot`, or reports a type mismatch when the
/// incoming value could not be read as the field's type.
pub(crate) fn assign<T>(slot: &mut T, converted: Option<T>) -> FieldUpdate {
    match converted {
        Some(value) => {
            *slot = value;
            FieldUpdate::Applied
        }
        None => FieldUpdate::Ignored(IgnoreReason::TypeMismatch),
    }
}

/// Decodes a structured value; `null` yields the type's default.
pub(crate) fn decode_or_default<T>(value: Value) -> Option<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Some(T::default());
    }
    serde_json::from_value(value).ok()
}
