//! Concrete step handler implementations.
//!
//! One module per `StepAction` variant. `build_step_registry` wires them
//! into the closed handler table consumed by the workflow runner.

pub mod dispatch;
pub mod metadata;
pub mod notify;
pub mod search;

use std::path::PathBuf;

use pressroom_core::registry::{BoxStepHandler, StepRegistry};

pub use dispatch::DispatchHandler;
pub use metadata::SuggestMetadataHandler;
pub use notify::{Notification, NotifyHandler};
pub use search::ReindexSearchHandler;

/// Build the full handler table with the default infra implementations.
///
/// `dispatch_secret` signs outbound webhook bodies when set; `index_dir` is
/// where the search stand-in writes its documents.
pub fn build_step_registry(
    notify: NotifyHandler,
    index_dir: PathBuf,
    dispatch_secret: Option<String>,
) -> StepRegistry {
    StepRegistry::new(
        BoxStepHandler::new(notify),
        BoxStepHandler::new(SuggestMetadataHandler::new()),
        BoxStepHandler::new(ReindexSearchHandler::new(index_dir)),
        BoxStepHandler::new(DispatchHandler::new(dispatch_secret)),
    )
}
