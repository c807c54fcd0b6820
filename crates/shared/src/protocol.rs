use std::collections::BTreeMap;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{CrateId, SessionId},
    lenient,
};

/// Flat key/value view of a session as returned by the context services.
pub type Snapshot = Map<String, Value>;

pub type CrateMap = BTreeMap<CrateId, CrateRecord>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierOption {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub supplier_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOption {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub item_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub stock_uom: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Initialization object handed to the form view when the page loads.
///
/// Every field is optional on the wire; absent and null values fall back to
/// the field's empty default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormContext {
    #[serde(default, deserialize_with = "deserialize_session_id")]
    pub session_id: SessionId,
    #[serde(default, deserialize_with = "lenient::string")]
    pub activity: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub suppliers: Vec<SupplierOption>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub items: Vec<ItemOption>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub target_warehouses: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub open_material_requests: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub supplier: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub item_code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub target_warehouse: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub need_label: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub picking_flow: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub material_request: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub parent_crate_id: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_manual_picking: bool,
}

/// Initialization object handed to the summary view when the page loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryContext {
    #[serde(default, deserialize_with = "deserialize_session_id")]
    pub session_id: SessionId,
    #[serde(default, deserialize_with = "lenient::string")]
    pub activity: String,
    #[serde(default, deserialize_with = "deserialize_crates")]
    pub crates: CrateMap,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub crate_summary: CrateSummary,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub item_summary: ItemSummary,
}

/// A physical crate as tracked by the backend: its identifier plus whatever
/// activity fields the server merged into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrateRecord {
    pub crate_id: CrateId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CrateRecord {
    pub fn new(crate_id: impl Into<CrateId>) -> Self {
        Self {
            crate_id: crate_id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn item_code(&self) -> Option<String> {
        self.get("item_code")
            .and_then(lenient::as_string)
            .filter(|code| !code.is_empty())
    }

    /// Received quantity; missing or unreadable values count as zero.
    pub fn grn_quantity(&self) -> f64 {
        self.get("grn_quantity")
            .and_then(lenient::as_float)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrateSummary {
    #[serde(default, deserialize_with = "lenient::count")]
    pub count: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemTally {
    #[serde(default, deserialize_with = "lenient::string")]
    pub item_code: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub count: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub quantity: f64,
}

/// Per-item aggregate. Serialized as a list; accepts either a list or an
/// item-code keyed mapping on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ItemSummary(pub Vec<ItemTally>);

impl ItemSummary {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, item_code: &str) -> Option<&ItemTally> {
        self.0.iter().find(|tally| tally.item_code == item_code)
    }
}

impl<'de> Deserialize<'de> for ItemSummary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tallies = match Value::deserialize(deserializer)? {
            Value::Array(entries) => entries
                .into_iter()
                .map(serde_json::from_value::<ItemTally>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(D::Error::custom)?,
            Value::Object(entries) => entries
                .into_iter()
                .map(|(code, entry)| {
                    let mut tally = serde_json::from_value::<ItemTally>(entry)?;
                    if tally.item_code.is_empty() {
                        tally.item_code = code;
                    }
                    Ok::<_, serde_json::Error>(tally)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(D::Error::custom)?,
            other => {
                return Err(D::Error::custom(format!(
                    "expected a list or mapping of item tallies, got {other}"
                )))
            }
        };
        Ok(Self(tallies))
    }
}

/// Directive a child component sends to the form view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDirective {
    #[serde(default, deserialize_with = "lenient::truthy")]
    pub refresh: bool,
    #[serde(default, deserialize_with = "lenient::truthy")]
    pub reload: bool,
}

/// Partial update pushed to the summary view. Absent and null fields are
/// left alone; each present field is applied independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crate_summary: Option<CrateSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_summary: Option<ItemSummary>,
    #[serde(default, rename = "crate", skip_serializing_if = "Option::is_none")]
    pub crate_record: Option<CrateRecord>,
    /// `None` values delete the keyed crate.
    #[serde(
        default,
        deserialize_with = "deserialize_crate_changes",
        skip_serializing_if = "Option::is_none"
    )]
    pub crates: Option<BTreeMap<CrateId, Option<CrateRecord>>>,
}

/// A part of a summary update that could not be decoded and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPart {
    pub part: String,
    pub reason: String,
}

impl RejectedPart {
    fn new(part: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            part: part.into(),
            reason: reason.to_string(),
        }
    }
}

impl SummaryUpdate {
    pub fn is_empty(&self) -> bool {
        self.crate_summary.is_none()
            && self.item_summary.is_none()
            && self.crate_record.is_none()
            && self.crates.is_none()
    }

    /// Decodes each part of an update object on its own. Parts that fail to
    /// decode are returned as rejections instead of sinking the rest; inside
    /// `crates` the same holds per entry. Null parts and unknown keys are
    /// skipped.
    pub fn from_fields(fields: Map<String, Value>) -> (Self, Vec<RejectedPart>) {
        let mut update = Self::default();
        let mut rejected = Vec::new();

        for (key, value) in fields {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "crate_summary" => match serde_json::from_value(value) {
                    Ok(summary) => update.crate_summary = Some(summary),
                    Err(err) => rejected.push(RejectedPart::new("crate_summary", err)),
                },
                "item_summary" => match serde_json::from_value(value) {
                    Ok(summary) => update.item_summary = Some(summary),
                    Err(err) => rejected.push(RejectedPart::new("item_summary", err)),
                },
                "crate" => match serde_json::from_value(value) {
                    Ok(record) => update.crate_record = Some(record),
                    Err(err) => rejected.push(RejectedPart::new("crate", err)),
                },
                "crates" => {
                    let entries = match value {
                        Value::Object(entries) => entries,
                        other => {
                            rejected.push(RejectedPart::new(
                                "crates",
                                format!("expected a mapping of crates, got {other}"),
                            ));
                            continue;
                        }
                    };
                    let mut changes = BTreeMap::new();
                    for (crate_id, entry) in entries {
                        match record_from_entry(&crate_id, entry) {
                            Ok(record) => {
                                changes.insert(CrateId::from(crate_id), record);
                            }
                            Err(err) => {
                                rejected.push(RejectedPart::new(format!("crates.{crate_id}"), err))
                            }
                        }
                    }
                    update.crates = Some(changes);
                }
                _ => {}
            }
        }

        (update, rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
}

/// Success body of a backend method call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodResponse {
    #[serde(default)]
    pub message: Option<Value>,
}

fn deserialize_session_id<'de, D>(deserializer: D) -> Result<SessionId, D::Error>
where
    D: Deserializer<'de>,
{
    lenient::string(deserializer).map(SessionId::from)
}

pub fn deserialize_crates<'de, D>(deserializer: D) -> Result<CrateMap, D::Error>
where
    D: Deserializer<'de>,
{
    crates_from_value(Value::deserialize(deserializer)?).map_err(D::Error::custom)
}

/// Normalizes a crate collection delivered either as a list of records or as
/// an id-keyed mapping. Null entries in a mapping are skipped, and records
/// without their own `crate_id` inherit the mapping key.
pub fn crates_from_value(value: Value) -> Result<CrateMap, serde_json::Error> {
    match value {
        Value::Null => Ok(CrateMap::new()),
        Value::Array(records) => records
            .into_iter()
            .map(|record| {
                let record = serde_json::from_value::<CrateRecord>(record)?;
                Ok::<_, serde_json::Error>((record.crate_id.clone(), record))
            })
            .collect(),
        Value::Object(entries) => {
            let mut crates = CrateMap::new();
            for (key, entry) in entries {
                if let Some(record) = record_from_entry(&key, entry)? {
                    crates.insert(record.crate_id.clone(), record);
                }
            }
            Ok(crates)
        }
        other => Err(serde_json::Error::custom(format!(
            "expected a list or mapping of crates, got {other}"
        ))),
    }
}

fn deserialize_crate_changes<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<CrateId, Option<CrateRecord>>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, entry)| {
                let record = record_from_entry(&key, entry)?;
                Ok::<_, serde_json::Error>((CrateId::from(key), record))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some)
            .map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "expected a mapping of crates, got {other}"
        ))),
    }
}

/// Reads one entry of an id-keyed crate mapping. Null stays `None`; a record
/// without its own `crate_id` inherits the mapping key.
fn record_from_entry(key: &str, entry: Value) -> Result<Option<CrateRecord>, serde_json::Error> {
    let mut fields = match entry {
        Value::Null => return Ok(None),
        Value::Object(fields) => fields,
        other => {
            return Err(serde_json::Error::custom(format!(
                "crate {key} is not a record: {other}"
            )))
        }
    };
    fields
        .entry("crate_id")
        .or_insert_with(|| Value::String(key.to_string()));
    serde_json::from_value::<CrateRecord>(Value::Object(fields)).map(Some)
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
