//! Log ingestion pipeline
//!
//! - [`codec`]: splits uploaded bytes into lines
//! - [`progress`]: per-job counters and the checkpoint cadence
//! - [`processor`]: the job state machine, run by the queue for each upload
//! - [`aggregator`]: rebuilds level and hourly counts after a file completes

pub mod aggregator;
pub mod codec;
pub mod processor;
pub mod progress;

pub use aggregator::{StatsAggregator, StatsSnapshot};
pub use codec::{LineCodec, LineFrame, DEFAULT_MAX_LINE_BYTES};
pub use processor::{IngestError, LogProcessor, ProcessorSettings, DEFAULT_FLUSH_SIZE};
pub use progress::{ProgressSnapshot, ProgressTracker, DEFAULT_CHECKPOINT_INTERVAL};
