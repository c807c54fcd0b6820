//! Sequenced reloads of a view's state from its snapshot source.
//!
//! A refresh is issued, awaited and settled in three separate steps so the
//! owning view can keep accepting updates while the remote call is in
//! flight. Only the response for the most recently issued ticket is merged;
//! older responses are dropped.

use std::{fmt, sync::Arc};

use shared::{
    domain::{SessionId, ViewKind},
    protocol::Snapshot,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{TransportError, ViewError},
    events::ViewEvent,
    field::MergeReport,
    transport::SnapshotSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefreshTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct RefreshSequence {
    latest: u64,
}

impl RefreshSequence {
    pub(crate) fn issue(&mut self) -> RefreshTicket {
        self.latest += 1;
        RefreshTicket(self.latest)
    }

    pub(crate) fn latest(&self) -> RefreshTicket {
        RefreshTicket(self.latest)
    }

    pub(crate) fn is_latest(&self, ticket: RefreshTicket) -> bool {
        ticket.0 == self.latest
    }
}

/// An issued, not yet executed, refresh call. Does not borrow the view, so
/// it can be moved onto a task.
pub struct RefreshRequest {
    ticket: RefreshTicket,
    view: ViewKind,
    session_id: SessionId,
    source: Arc<dyn SnapshotSource>,
}

impl RefreshRequest {
    pub(crate) fn new(
        ticket: RefreshTicket,
        view: ViewKind,
        session_id: SessionId,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self {
            ticket,
            view,
            session_id,
            source,
        }
    }

    pub fn ticket(&self) -> RefreshTicket {
        self.ticket
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn run(self) -> RefreshResponse {
        debug!(
            view = %self.view,
            session_id = %self.session_id,
            ticket = self.ticket.seq(),
            "fetching session snapshot"
        );
        let result = self.source.fetch_snapshot(&self.session_id).await;
        RefreshResponse {
            ticket: self.ticket,
            view: self.view,
            result,
        }
    }
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("ticket", &self.ticket)
            .field("view", &self.view)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct RefreshResponse {
    pub ticket: RefreshTicket,
    pub view: ViewKind,
    pub result: Result<Snapshot, TransportError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(MergeReport),
    /// A newer refresh was issued after this one; nothing was merged.
    Stale {
        ticket: RefreshTicket,
        latest: RefreshTicket,
    },
}

/// Settles a finished refresh against the view that issued it.
///
/// Stale responses are dropped whether they succeeded or not. A response
/// issued for another view counts as stale even when its ticket number
/// matches. A failure for the latest ticket is published and returned
/// without touching state.
pub(crate) fn settle(
    sequence: &RefreshSequence,
    owner: ViewKind,
    events: &broadcast::Sender<ViewEvent>,
    response: RefreshResponse,
    merge: impl FnOnce(Snapshot) -> MergeReport,
) -> Result<RefreshOutcome, ViewError> {
    let RefreshResponse {
        ticket,
        view,
        result,
    } = response;

    if view != owner || !sequence.is_latest(ticket) {
        let latest = sequence.latest();
        if view != owner {
            warn!(%owner, %view, ticket = ticket.seq(), "discarding refresh issued for another view");
        } else {
            debug!(%view, ticket = ticket.seq(), latest = latest.seq(), "discarding stale refresh");
        }
        let _ = events.send(ViewEvent::StaleRefreshDiscarded {
            view: owner,
            ticket,
            latest,
        });
        return Ok(RefreshOutcome::Stale { ticket, latest });
    }

    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%view, ticket = ticket.seq(), error = %err, "refresh failed");
            let _ = events.send(ViewEvent::RefreshFailed {
                view,
                ticket,
                reason: err.to_string(),
            });
            return Err(ViewError::RefreshFailed(err));
        }
    };

    let report = merge(snapshot);
    info!(
        %view,
        ticket = ticket.seq(),
        applied = report.applied.len(),
        ignored = report.ignored(),
        "refresh merged"
    );
    let _ = events.send(ViewEvent::Refreshed {
        view,
        ticket,
        applied: report.applied.len(),
        ignored: report.ignored(),
    });
    Ok(RefreshOutcome::Applied(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_newest_ticket_is_latest() {
        let mut sequence = RefreshSequence::default();
        let first = sequence.issue();
        let second = sequence.issue();
        assert!(first < second);
        assert!(!sequence.is_latest(first));
        assert!(sequence.is_latest(second));
        assert_eq!(sequence.latest(), second);
    }

    #[test]
    fn response_for_another_view_is_stale() {
        let mut sequence = RefreshSequence::default();
        let ticket = sequence.issue();
        let (events, mut rx) = broadcast::channel(4);
        let response = RefreshResponse {
            ticket,
            view: ViewKind::Form,
            result: Ok(Snapshot::new()),
        };

        let mut merged = false;
        let outcome = settle(&sequence, ViewKind::Summary, &events, response, |_| {
            merged = true;
            MergeReport::default()
        })
        .expect("settle");

        assert_eq!(
            outcome,
            RefreshOutcome::Stale {
                ticket,
                latest: ticket
            }
        );
        assert!(!merged);
        match rx.try_recv().expect("event") {
            ViewEvent::StaleRefreshDiscarded { view, .. } => assert_eq!(view, ViewKind::Summary),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
