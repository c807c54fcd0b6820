//! Notifications a controller publishes to the hosting view.

use shared::domain::ViewKind;

use crate::refresh::RefreshTicket;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// One or more state fields now hold new values; re-render them.
    FieldsChanged {
        view: ViewKind,
        fields: Vec<&'static str>,
    },
    Refreshed {
        view: ViewKind,
        ticket: RefreshTicket,
        applied: usize,
        ignored: usize,
    },
    RefreshFailed {
        view: ViewKind,
        ticket: RefreshTicket,
        reason: String,
    },
    StaleRefreshDiscarded {
        view: ViewKind,
        ticket: RefreshTicket,
        latest: RefreshTicket,
    },
    /// The host should tear the view down and rebuild it from scratch.
    ReloadRequested { view: ViewKind },
    InvalidPayload { view: ViewKind, reason: String },
}

impl ViewEvent {
    pub fn view(&self) -> ViewKind {
        match self {
            Self::FieldsChanged { view, .. }
            | Self::Refreshed { view, .. }
            | Self::RefreshFailed { view, .. }
            | Self::StaleRefreshDiscarded { view, .. }
            | Self::ReloadRequested { view }
            | Self::InvalidPayload { view, .. } => *view,
        }
    }
}
