//! Recording storage
//!
//! Saving finished recordings, listing what has been saved, and handing the
//! folder over to the desktop file manager.

mod listing;
mod reveal;
mod sink;

pub use listing::{RecordingEntry, RecordingsLister};
pub use reveal::{detect_opener, FolderOpener, NoopOpener, SystemOpener};
pub use sink::{FileSink, SavedRecording, StorageError, VideosDirSink};
