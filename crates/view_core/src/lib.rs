//! State binding for the activity form and activity summary views.
//!
//! Each view owns a typed state record built from the page's initialization
//! context, accepts field and collection updates from child components, and
//! reloads itself from the backend through a [`transport::SnapshotSource`].

pub mod config;
pub mod error;
pub mod events;
pub mod field;
pub mod form;
mod payload;
pub mod refresh;
pub mod summary;
pub mod telemetry;
pub mod transport;

pub use config::{load_settings, ClientSettings};
pub use error::{TransportError, ViewError};
pub use events::ViewEvent;
pub use field::{FieldSet, FieldUpdate, IgnoreReason, MergeReport};
pub use form::{
    AcceptAllCrates, CrateValidation, CrateValidator, DirectiveOutcome, FormController,
    FormField, FormState,
};
pub use refresh::{RefreshOutcome, RefreshRequest, RefreshResponse, RefreshTicket};
pub use summary::{SummaryController, SummaryField, SummaryMergeReport, SummaryState};
pub use transport::{MethodClient, MissingSnapshotSource, SnapshotSource};
