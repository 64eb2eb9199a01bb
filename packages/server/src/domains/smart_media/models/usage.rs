use serde::{Deserialize, Serialize};

const TOKENS_PER_CREDIT: u64 = 1_000;
const CREDITS_PER_IMAGE: u64 = 10;
const CREDITS_PER_VIDEO: u64 = 50;
const AUDIO_SECONDS_PER_CREDIT: u64 = 10;

/// Generation usage reported by a template handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub images: u64,
    pub videos: u64,
    pub audio_seconds: u64,
}

impl TemplateUsage {
    pub fn tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Credits charged to the creator for this usage.
    pub fn credits(&self) -> u64 {
        let tokens = self.prompt_tokens.saturating_add(self.completion_tokens);
        tokens
            .div_ceil(TOKENS_PER_CREDIT)
            .saturating_add(self.images.saturating_mul(CREDITS_PER_IMAGE))
            .saturating_add(self.videos.saturating_mul(CREDITS_PER_VIDEO))
            .saturating_add(self.audio_seconds.div_ceil(AUDIO_SECONDS_PER_CREDIT))
    }
}

impl std::ops::Add for TemplateUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            images: self.images.saturating_add(rhs.images),
            videos: self.videos.saturating_add(rhs.videos),
            audio_seconds: self.audio_seconds.saturating_add(rhs.audio_seconds),
        }
    }
}
