//! chorder-services: Playback scheduling, persistence, export and backend access

pub mod backend;
pub mod midi_export;
pub mod render;
pub mod scheduler;
pub mod sound;
pub mod storage;

pub use backend::{BackendClient, BackendError, PendingRequest, RequestStatus};
pub use midi_export::{export_row, MidiFile, TICKS_PER_BEAT};
pub use render::{encode_wav, render_samples, render_wav, write_wav, RenderConfig, RenderError};
pub use scheduler::{PlaybackEvent, PlaybackState, Scheduler, SchedulerConfig, SchedulerError};
pub use sound::{RecordingEngine, SoundCall, SoundEngine, SoundError, TracingEngine};
pub use storage::{FileStore, KeyValueStore, MemoryStore, ProgressionStore, StorageError};
