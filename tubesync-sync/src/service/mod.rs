//! Service layer
//!
//! Services implement the user-facing flows on top of the repository and
//! the synchronization components: downloads and server saves, and the
//! gated ask/analyze notes tasks.

mod download;
mod notes;

pub use download::{DownloadService, LinkOutcome, SaveOutcome};
pub use notes::{NotesError, NotesOutcome, NotesService};
