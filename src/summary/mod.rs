//! Session list view: per-session summaries, recommended settings across
//! sessions and the session/step CRUD actions behind the list.

mod list;
pub mod recommended;
mod sessions;

pub use list::SessionList;
pub use recommended::{recommended_settings, RecommendedStep, RecommendedValue};
pub use sessions::SessionSummary;
