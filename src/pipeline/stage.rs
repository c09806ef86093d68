//! Pipeline stages in execution order.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Preprocessing,
    Transcription,
    Translation,
    VoiceConfiguration,
    Synthesis,
    Postprocessing,
    Cleanup,
}

impl Stage {
    /// Every stage, in the only order they may run.
    pub const ALL: [Stage; 7] = [
        Stage::Preprocessing,
        Stage::Transcription,
        Stage::Translation,
        Stage::VoiceConfiguration,
        Stage::Synthesis,
        Stage::Postprocessing,
        Stage::Cleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Preprocessing => "preprocessing",
            Stage::Transcription => "transcription",
            Stage::Translation => "translation",
            Stage::VoiceConfiguration => "voice_configuration",
            Stage::Synthesis => "synthesis",
            Stage::Postprocessing => "postprocessing",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Stage that must run after this one, if any.
    pub fn next(&self) -> Option<Stage> {
        let position = Stage::ALL.iter().position(|s| s == self)?;
        Stage::ALL.get(position + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_strict() {
        let mut stage = Stage::Preprocessing;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, Stage::ALL.to_vec());
        assert_eq!(Stage::Cleanup.next(), None);
    }

    #[test]
    fn test_display_uses_snake_case() {
        assert_eq!(Stage::VoiceConfiguration.to_string(), "voice_configuration");
    }
}
