//! Activity summary view: crate collection plus crate and item aggregates.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::{CrateId, SessionId, ViewKind},
    lenient,
    protocol::{
        crates_from_value, CrateMap, CrateRecord, CrateSummary, ItemSummary, ItemTally,
        RejectedPart, Snapshot, SummaryContext, SummaryUpdate,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::ViewError,
    events::ViewEvent,
    field::{assign, decode_or_default, FieldSet, FieldUpdate, IgnoreReason, MergeReport},
    payload,
    refresh::{self, RefreshOutcome, RefreshRequest, RefreshResponse, RefreshSequence},
    transport::SnapshotSource,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryField {
    SessionId,
    Activity,
    Crates,
    CrateSummary,
    ItemSummary,
}

impl FieldSet for SummaryField {
    const ALL: &'static [Self] = &[
        Self::SessionId,
        Self::Activity,
        Self::Crates,
        Self::CrateSummary,
        Self::ItemSummary,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::SessionId => "session_id",
            Self::Activity => "activity",
            Self::Crates => "crates",
            Self::CrateSummary => "crate_summary",
            Self::ItemSummary => "item_summary",
        }
    }
}

/// State behind the activity summary.
///
/// The crate collection is copy-on-write: [`SummaryState::crates_snapshot`]
/// hands out a shared handle that later inserts and deletes never touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryState {
    pub session_id: SessionId,
    pub activity: String,
    crates: Arc<CrateMap>,
    pub crate_summary: CrateSummary,
    pub item_summary: ItemSummary,
}

impl From<SummaryContext> for SummaryState {
    fn from(context: SummaryContext) -> Self {
        Self {
            session_id: context.session_id,
            activity: context.activity,
            crates: Arc::new(context.crates),
            crate_summary: context.crate_summary,
            item_summary: context.item_summary,
        }
    }
}

impl SummaryState {
    pub fn crates(&self) -> &CrateMap {
        &self.crates
    }

    pub fn crates_snapshot(&self) -> Arc<CrateMap> {
        Arc::clone(&self.crates)
    }

    pub fn apply_field(&mut self, field: SummaryField, value: Value) -> FieldUpdate {
        match field {
            SummaryField::SessionId => assign(
                &mut self.session_id,
                lenient::as_string(&value).map(SessionId::from),
            ),
            SummaryField::Activity => assign(&mut self.activity, lenient::as_string(&value)),
            SummaryField::Crates => assign(
                &mut self.crates,
                crates_from_value(value).ok().map(Arc::new),
            ),
            SummaryField::CrateSummary => {
                assign(&mut self.crate_summary, decode_or_default(value))
            }
            SummaryField::ItemSummary => assign(&mut self.item_summary, decode_or_default(value)),
        }
    }

    /// Inserts `record` under its own id, returning the entry it replaced.
    pub fn insert_or_replace_crate(&mut self, record: CrateRecord) -> Option<CrateRecord> {
        Arc::make_mut(&mut self.crates).insert(record.crate_id.clone(), record)
    }

    pub fn delete_crate(&mut self, crate_id: &CrateId) -> Option<CrateRecord> {
        if !self.crates.contains_key(crate_id) {
            return None;
        }
        Arc::make_mut(&mut self.crates).remove(crate_id)
    }

    /// Rebuilds both aggregates from the crate collection: crate count and
    /// total received quantity, then the same per item code in the order
    /// item codes first appear.
    pub fn recompute_summaries(&mut self) {
        let mut crate_summary = CrateSummary::default();
        let mut tallies: Vec<ItemTally> = Vec::new();

        for record in self.crates.values() {
            let quantity = record.grn_quantity();
            crate_summary.count += 1;
            crate_summary.quantity += quantity;

            let item_code = record.item_code().unwrap_or_default();
            match tallies.iter_mut().find(|tally| tally.item_code == item_code) {
                Some(tally) => {
                    tally.count += 1;
                    tally.quantity += quantity;
                }
                None => tallies.push(ItemTally {
                    item_code,
                    count: 1,
                    quantity,
                }),
            }
        }

        self.crate_summary = crate_summary;
        self.item_summary = ItemSummary(tallies);
    }

    pub fn to_snapshot(&self) -> Snapshot {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// What a summary update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryMergeReport {
    pub crate_summary: bool,
    pub item_summary: bool,
    pub inserted: Vec<CrateId>,
    pub deleted: Vec<CrateId>,
    /// Parts of the update that could not be read and were skipped.
    pub rejected: Vec<RejectedPart>,
}

impl SummaryMergeReport {
    pub fn is_noop(&self) -> bool {
        !self.crate_summary
            && !self.item_summary
            && self.inserted.is_empty()
            && self.deleted.is_empty()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.crate_summary {
            fields.push(SummaryField::CrateSummary.name());
        }
        if self.item_summary {
            fields.push(SummaryField::ItemSummary.name());
        }
        if !self.inserted.is_empty() || !self.deleted.is_empty() {
            fields.push(SummaryField::Crates.name());
        }
        fields
    }
}

pub struct SummaryController {
    state: SummaryState,
    source: Arc<dyn SnapshotSource>,
    refreshes: RefreshSequence,
    events: broadcast::Sender<ViewEvent>,
}

impl SummaryController {
    pub fn new(context: SummaryContext, source: Arc<dyn SnapshotSource>) -> Self {
        let state = SummaryState::from(context);
        debug!(session_id = %state.session_id, crates = state.crates.len(), "summary view constructed");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state,
            source,
            refreshes: RefreshSequence::default(),
            events,
        }
    }

    pub fn from_value(context: Value, source: Arc<dyn SnapshotSource>) -> Result<Self, ViewError> {
        let context = serde_json::from_value(context).map_err(ViewError::InvalidContext)?;
        Ok(Self::new(context, source))
    }

    pub fn from_json(raw: &str, source: Arc<dyn SnapshotSource>) -> Result<Self, ViewError> {
        let context = serde_json::from_str(raw).map_err(ViewError::InvalidContext)?;
        Ok(Self::new(context, source))
    }

    pub fn state(&self) -> &SummaryState {
        &self.state
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub fn apply_field(&mut self, field: SummaryField, value: Value) -> FieldUpdate {
        let outcome = self.state.apply_field(field, value);
        match outcome {
            FieldUpdate::Applied => self.publish_changed(vec![field.name()]),
            FieldUpdate::Ignored(reason) => {
                debug!(field = field.name(), ?reason, "summary field update ignored")
            }
        }
        outcome
    }

    pub fn apply_named_field(&mut self, key: &str, value: Value) -> FieldUpdate {
        match SummaryField::from_name(key) {
            Some(field) => self.apply_field(field, value),
            None => {
                debug!(key, "ignoring unknown summary field");
                FieldUpdate::Ignored(IgnoreReason::UnknownField)
            }
        }
    }

    pub fn insert_or_replace_crate(&mut self, record: CrateRecord) -> Option<CrateRecord> {
        let crate_id = record.crate_id.clone();
        let replaced = self.state.insert_or_replace_crate(record);
        debug!(%crate_id, replaced = replaced.is_some(), "crate stored");
        self.publish_changed(vec![SummaryField::Crates.name()]);
        replaced
    }

    pub fn delete_crate(&mut self, crate_id: &CrateId) -> Option<CrateRecord> {
        let removed = self.state.delete_crate(crate_id);
        if removed.is_some() {
            debug!(%crate_id, "crate removed");
            self.publish_changed(vec![SummaryField::Crates.name()]);
        }
        removed
    }

    /// Applies whichever parts of `update` are present, each independently.
    pub fn merge_summary_update(&mut self, update: SummaryUpdate) -> SummaryMergeReport {
        let SummaryUpdate {
            crate_summary,
            item_summary,
            crate_record,
            crates,
        } = update;
        let mut report = SummaryMergeReport::default();

        if let Some(crate_summary) = crate_summary {
            self.state.crate_summary = crate_summary;
            report.crate_summary = true;
        }
        if let Some(item_summary) = item_summary {
            self.state.item_summary = item_summary;
            report.item_summary = true;
        }
        if let Some(record) = crate_record {
            report.inserted.push(record.crate_id.clone());
            self.state.insert_or_replace_crate(record);
        }
        for (crate_id, entry) in crates.unwrap_or_default() {
            match entry {
                Some(record) => {
                    if record.crate_id != crate_id {
                        debug!(key = %crate_id, crate_id = %record.crate_id, "crate keyed under a different id");
                    }
                    report.inserted.push(record.crate_id.clone());
                    self.state.insert_or_replace_crate(record);
                }
                None => {
                    if self.state.delete_crate(&crate_id).is_some() {
                        report.deleted.push(crate_id);
                    }
                }
            }
        }

        if !report.is_noop() {
            self.publish_changed(report.changed_fields());
        }
        report
    }

    /// Text entry point for [`Self::merge_summary_update`]. Blank input is a
    /// no-op and anything other than a JSON object is rejected. Within an
    /// object each part is read on its own; unreadable parts are skipped and
    /// listed in [`SummaryMergeReport::rejected`].
    pub fn merge_summary_update_text(&mut self, raw: &str) -> Result<SummaryMergeReport, ViewError> {
        if raw.trim().is_empty() {
            return Ok(SummaryMergeReport::default());
        }
        match payload::parse_fields(raw) {
            Ok(fields) => Ok(self.merge_summary_fields(fields)),
            Err(err) => Err(self.discard_payload(err)),
        }
    }

    /// Structured entry point for callers holding an already-parsed value.
    pub fn merge_summary_value(&mut self, value: Value) -> Result<SummaryMergeReport, ViewError> {
        match payload::expect_object(value) {
            Ok(fields) => Ok(self.merge_summary_fields(fields)),
            Err(err) => Err(self.discard_payload(err)),
        }
    }

    fn merge_summary_fields(&mut self, fields: Map<String, Value>) -> SummaryMergeReport {
        let (update, rejected) = SummaryUpdate::from_fields(fields);
        if !rejected.is_empty() {
            for part in &rejected {
                warn!(part = %part.part, reason = %part.reason, "skipping unreadable summary update part");
            }
            let reason = rejected
                .iter()
                .map(|part| format!("{}: {}", part.part, part.reason))
                .collect::<Vec<_>>()
                .join("; ");
            let _ = self.events.send(ViewEvent::InvalidPayload {
                view: ViewKind::Summary,
                reason,
            });
        }

        let mut report = self.merge_summary_update(update);
        report.rejected = rejected;
        report
    }

    fn discard_payload(&self, err: ViewError) -> ViewError {
        warn!(error = %err, "discarding summary update");
        let _ = self.events.send(ViewEvent::InvalidPayload {
            view: ViewKind::Summary,
            reason: err.to_string(),
        });
        err
    }

    pub fn recompute_summaries(&mut self) {
        self.state.recompute_summaries();
        self.publish_changed(vec![
            SummaryField::CrateSummary.name(),
            SummaryField::ItemSummary.name(),
        ]);
    }

    pub fn begin_refresh(&mut self) -> RefreshRequest {
        let ticket = self.refreshes.issue();
        RefreshRequest::new(
            ticket,
            ViewKind::Summary,
            self.state.session_id.clone(),
            Arc::clone(&self.source),
        )
    }

    pub fn complete_refresh(&mut self, response: RefreshResponse) -> Result<RefreshOutcome, ViewError> {
        let Self {
            state,
            refreshes,
            events,
            ..
        } = self;
        let events: &broadcast::Sender<ViewEvent> = events;
        refresh::settle(refreshes, ViewKind::Summary, events, response, |snapshot| {
            let report = merge_into(state, snapshot);
            if !report.is_noop() {
                let _ = events.send(ViewEvent::FieldsChanged {
                    view: ViewKind::Summary,
                    fields: report.applied.clone(),
                });
            }
            report
        })
    }

    pub async fn refresh_from_server(&mut self) -> Result<RefreshOutcome, ViewError> {
        let response = self.begin_refresh().run().await;
        self.complete_refresh(response)
    }

    fn publish_changed(&self, fields: Vec<&'static str>) {
        let _ = self.events.send(ViewEvent::FieldsChanged {
            view: ViewKind::Summary,
            fields,
        });
    }
}

fn merge_into(state: &mut SummaryState, fields: Snapshot) -> MergeReport {
    let mut report = MergeReport::default();
    for (key, value) in fields {
        let field = SummaryField::from_name(&key);
        let outcome = match field {
            Some(field) => state.apply_field(field, value),
            None => FieldUpdate::Ignored(IgnoreReason::UnknownField),
        };
        report.record(key, field.map(SummaryField::name), outcome);
    }
    report
}

#[cfg(test)]
#[path = "tests/summary_tests.rs"]
mod tests;
