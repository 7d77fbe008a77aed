pub mod outcome;
pub mod progress;
pub mod tracked_file;

pub use outcome::{BatchReport, BatchStatus, FolderStats, MutationOutcome, STOPPED_BY_USER};
pub use progress::{BatchProgress, ProgressEvent, ProgressMessage, Severity};
pub use tracked_file::{TrackStatus, TrackedFile};
