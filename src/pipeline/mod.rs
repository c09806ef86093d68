//! Dubbing pipeline.
//!
//! Stages run strictly in order on one thread, each taking and returning the
//! full utterance list:
//!
//! ```text
//! Preprocessing → Transcription → Translation → VoiceConfiguration
//!   → Synthesis → Postprocessing → Cleanup
//! ```

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod postprocess;
pub mod stage;
pub mod timing;

pub use context::{RunContext, RunSettings};
pub use error::{CollectingReporter, ErrorReporter, LogReporter, StageError};
pub use orchestrator::{Collaborators, DubReport, Dubber};
pub use postprocess::DubbedOutputs;
pub use stage::Stage;
pub use timing::{RunTimer, TimingReport};
