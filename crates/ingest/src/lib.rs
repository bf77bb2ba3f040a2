//! Getting an item from its source to ordered segment transcripts.

pub mod chunker;
pub mod media;
pub mod playlist;
pub mod segment;
pub mod transcribe;

pub use chunker::{plan_windows, WindowChunker};
pub use media::{FfmpegBackend, MediaBackend};
pub use playlist::{CollectionProvider, PlaylistPage, SourceLister, YouTubeClient};
pub use segment::{discover_indexed_files, Segment, Window};
pub use transcribe::{SegmentTranscriber, SpeechToText, WhisperClient};
