//! In-memory audio: WAV I/O, speed-up and mixing.

pub mod mix;
pub mod speedup;
pub mod wav;

pub use wav::AudioClip;
