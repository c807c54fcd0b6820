//! Activity form view: editable session state and its update surface.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::{SessionId, ViewKind},
    lenient,
    protocol::{CrateRecord, FormContext, ItemOption, Snapshot, SupplierOption, UpdateDirective},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

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
pub enum FormField {
    SessionId,
    Activity,
    Suppliers,
    Items,
    TargetWarehouses,
    OpenMaterialRequests,
    Supplier,
    ItemCode,
    TargetWarehouse,
    NeedLabel,
    PickingFlow,
    MaterialRequest,
    ParentCrateId,
    IsManualPicking,
}

impl FieldSet for FormField {
    const ALL: &'static [Self] = &[
        Self::SessionId,
        Self::Activity,
        Self::Suppliers,
        Self::Items,
        Self::TargetWarehouses,
        Self::OpenMaterialRequests,
        Self::Supplier,
        Self::ItemCode,
        Self::TargetWarehouse,
        Self::NeedLabel,
        Self::PickingFlow,
        Self::MaterialRequest,
        Self::ParentCrateId,
        Self::IsManualPicking,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::SessionId => "session_id",
            Self::Activity => "activity",
            Self::Suppliers => "suppliers",
            Self::Items => "items",
            Self::TargetWarehouses => "target_warehouses",
            Self::OpenMaterialRequests => "open_material_requests",
            Self::Supplier => "supplier",
            Self::ItemCode => "item_code",
            Self::TargetWarehouse => "target_warehouse",
            Self::NeedLabel => "need_label",
            Self::PickingFlow => "picking_flow",
            Self::MaterialRequest => "material_request",
            Self::ParentCrateId => "parent_crate_id",
            Self::IsManualPicking => "is_manual_picking",
        }
    }
}

/// State behind the activity form. Every field always holds a value; the
/// empty default stands in for anything the server left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    pub session_id: SessionId,
    pub activity: String,
    pub suppliers: Vec<SupplierOption>,
    pub items: Vec<ItemOption>,
    pub target_warehouses: Vec<Value>,
    pub open_material_requests: Vec<Value>,
    pub supplier: String,
    pub item_code: String,
    pub target_warehouse: String,
    pub need_label: i64,
    pub picking_flow: String,
    pub material_request: String,
    pub parent_crate_id: String,
    pub is_manual_picking: bool,
}

impl From<FormContext> for FormState {
    fn from(context: FormContext) -> Self {
        Self {
            session_id: context.session_id,
            activity: context.activity,
            suppliers: context.suppliers,
            items: context.items,
            target_warehouses: context.target_warehouses,
            open_material_requests: context.open_material_requests,
            supplier: context.supplier,
            item_code: context.item_code,
            target_warehouse: context.target_warehouse,
            need_label: context.need_label,
            picking_flow: context.picking_flow,
            material_request: context.material_request,
            parent_crate_id: context.parent_crate_id,
            is_manual_picking: context.is_manual_picking,
        }
    }
}

impl FormState {
    /// Overwrites `field` with `value` converted to the field's type. `null`
    /// resets the field to its default; an unconvertible value is ignored.
    pub fn apply_field(&mut self, field: FormField, value: Value) -> FieldUpdate {
        match field {
            FormField::SessionId => assign(
                &mut self.session_id,
                lenient::as_string(&value).map(SessionId::from),
            ),
            FormField::Activity => assign(&mut self.activity, lenient::as_string(&value)),
            FormField::Suppliers => assign(&mut self.suppliers, decode_or_default(value)),
            FormField::Items => assign(&mut self.items, decode_or_default(value)),
            FormField::TargetWarehouses => {
                assign(&mut self.target_warehouses, decode_or_default(value))
            }
            FormField::OpenMaterialRequests => {
                assign(&mut self.open_material_requests, decode_or_default(value))
            }
            FormField::Supplier => assign(&mut self.supplier, lenient::as_string(&value)),
            FormField::ItemCode => assign(&mut self.item_code, lenient::as_string(&value)),
            FormField::TargetWarehouse => {
                assign(&mut self.target_warehouse, lenient::as_string(&value))
            }
            FormField::NeedLabel => assign(&mut self.need_label, lenient::as_int(&value)),
            FormField::PickingFlow => assign(&mut self.picking_flow, lenient::as_string(&value)),
            FormField::MaterialRequest => {
                assign(&mut self.material_request, lenient::as_string(&value))
            }
            FormField::ParentCrateId => {
                assign(&mut self.parent_crate_id, lenient::as_string(&value))
            }
            FormField::IsManualPicking => {
                assign(&mut self.is_manual_picking, lenient::as_bool(&value))
            }
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateValidation {
    pub accepted: bool,
    pub message: String,
    pub code: i64,
}

impl CrateValidation {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            message: String::new(),
            code: 0,
        }
    }

    pub fn rejected(message: impl Into<String>, code: i64) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            code,
        }
    }
}

/// Check a child component runs before it records a crate against the form.
pub trait CrateValidator: Send + Sync {
    fn validate(&self, form: &FormState, record: &CrateRecord) -> CrateValidation;
}

pub struct AcceptAllCrates;

impl CrateValidator for AcceptAllCrates {
    fn validate(&self, _form: &FormState, _record: &CrateRecord) -> CrateValidation {
        CrateValidation::accepted()
    }
}

#[derive(Debug)]
pub enum DirectiveOutcome {
    /// Drive the request with [`RefreshRequest::run`] and hand the response
    /// back to [`FormController::complete_refresh`].
    Refresh(RefreshRequest),
    Reload,
    Ignored,
}

pub struct FormController {
    state: FormState,
    source: Arc<dyn SnapshotSource>,
    validator: Arc<dyn CrateValidator>,
    refreshes: RefreshSequence,
    events: broadcast::Sender<ViewEvent>,
}

impl FormController {
    pub fn new(context: FormContext, source: Arc<dyn SnapshotSource>) -> Self {
        let state = FormState::from(context);
        debug!(session_id = %state.session_id, activity = %state.activity, "form view constructed");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state,
            source,
            validator: Arc::new(AcceptAllCrates),
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

    pub fn with_validator(mut self, validator: Arc<dyn CrateValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub fn apply_field(&mut self, field: FormField, value: Value) -> FieldUpdate {
        let outcome = self.state.apply_field(field, value);
        match outcome {
            FieldUpdate::Applied => self.publish_changed(vec![field.name()]),
            FieldUpdate::Ignored(reason) => {
                debug!(field = field.name(), ?reason, "form field update ignored")
            }
        }
        outcome
    }

    /// Name-based update used by child components. Names outside the form's
    /// field set are ignored.
    pub fn apply_named_field(&mut self, key: &str, value: Value) -> FieldUpdate {
        match FormField::from_name(key) {
            Some(field) => self.apply_field(field, value),
            None => {
                debug!(key, "ignoring unknown form field");
                FieldUpdate::Ignored(IgnoreReason::UnknownField)
            }
        }
    }

    /// Applies every pair in `fields`; one key failing never stops the rest.
    pub fn apply_metadata_batch(&mut self, fields: Snapshot) -> MergeReport {
        let report = self.merge_quietly(fields);
        if !report.is_noop() {
            self.publish_changed(report.applied.clone());
        }
        report
    }

    pub fn handle_update_directive(&mut self, directive: UpdateDirective) -> DirectiveOutcome {
        if directive.refresh {
            DirectiveOutcome::Refresh(self.begin_refresh())
        } else if directive.reload {
            info!(session_id = %self.state.session_id, "form view reload requested");
            let _ = self.events.send(ViewEvent::ReloadRequested {
                view: ViewKind::Form,
            });
            DirectiveOutcome::Reload
        } else {
            DirectiveOutcome::Ignored
        }
    }

    pub fn handle_update_directive_text(&mut self, raw: &str) -> Result<DirectiveOutcome, ViewError> {
        match payload::parse_object::<UpdateDirective>(raw) {
            Ok(directive) => Ok(self.handle_update_directive(directive)),
            Err(err) => {
                warn!(error = %err, "discarding form directive");
                let _ = self.events.send(ViewEvent::InvalidPayload {
                    view: ViewKind::Form,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Issues a refresh for the current session. Any earlier request still in
    /// flight becomes stale.
    pub fn begin_refresh(&mut self) -> RefreshRequest {
        let ticket = self.refreshes.issue();
        RefreshRequest::new(
            ticket,
            ViewKind::Form,
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
        refresh::settle(refreshes, ViewKind::Form, events, response, |snapshot| {
            let report = merge_into(state, snapshot);
            if !report.is_noop() {
                let _ = events.send(ViewEvent::FieldsChanged {
                    view: ViewKind::Form,
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

    pub fn validate_crate(&self, record: &CrateRecord) -> CrateValidation {
        self.validator.validate(&self.state, record)
    }

    fn merge_quietly(&mut self, fields: Snapshot) -> MergeReport {
        merge_into(&mut self.state, fields)
    }

    fn publish_changed(&self, fields: Vec<&'static str>) {
        let _ = self.events.send(ViewEvent::FieldsChanged {
            view: ViewKind::Form,
            fields,
        });
    }
}

fn merge_into(state: &mut FormState, fields: Snapshot) -> MergeReport {
    let mut report = MergeReport::default();
    for (key, value) in fields {
        let field = FormField::from_name(&key);
        let outcome = match field {
            Some(field) => state.apply_field(field, value),
            None => FieldUpdate::Ignored(IgnoreReason::UnknownField),
        };
        report.record(key, field.map(FormField::name), outcome);
    }
    report
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
