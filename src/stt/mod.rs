//! Speech side of the pipeline: segmentation, speakers and transcription.

pub mod segmenter;
pub mod speakers;
pub mod transcriber;
pub mod whisper;

pub use segmenter::{EnergySegmenter, RttmSegmenter, Segment, Segmenter};
pub use speakers::{
    Diarizer, FixedGenderClassifier, GenderClassifier, PitchGenderClassifier, RttmDiarizer,
    SingleSpeakerDiarizer,
};
pub use transcriber::{MockTranscriber, Transcriber};
