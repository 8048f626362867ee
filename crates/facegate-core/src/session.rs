//! Live matching: poll frames until a registered face shows up, the caller
//! aborts, or too many fruitless frames have gone by.

use crate::pipeline::FaceEmbedder;
use crate::registry::Registry;
use crate::types::{FirstMatch, Matcher};
use image::RgbImage;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Default cosine similarity a probe must exceed to be accepted.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Give-up progress for a frame where no face was detected.
const MISS_COST: u32 = 1;
/// Give-up progress for a frame whose face matched nobody.
const UNMATCHED_COST: u32 = 5;
/// The session gives up once progress exceeds this.
const GIVE_UP_BOUND: u32 = 100;

/// Source of camera frames.
pub trait FrameSource {
    type Error: StdError + Send + Sync + 'static;

    fn next_frame(&mut self) -> Result<RgbImage, Self::Error>;
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no members registered")]
    NoMembers,
    #[error("frame capture failed: {0}")]
    Capture(#[source] Box<dyn StdError + Send + Sync>),
    #[error("face embedding failed: {0}")]
    Embedding(#[source] Box<dyn StdError + Send + Sync>),
}

/// How a match session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { name: String, similarity: f32, frames: usize },
    NoMatch { frames: usize },
    Aborted { frames: usize },
}

/// Weighted count of fruitless frames.
///
/// A frame without a face costs a fifth of a frame whose face matched
/// nobody, so a session tolerates 100 faceless frames or 20 strangers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GiveUpCounter {
    progress: u32,
}

impl GiveUpCounter {
    pub fn record_miss(&mut self) {
        self.progress += MISS_COST;
    }

    pub fn record_unmatched(&mut self) {
        self.progress += UNMATCHED_COST;
    }

    pub fn exhausted(&self) -> bool {
        self.progress > GIVE_UP_BOUND
    }
}

/// One matching run against a registry.
pub struct MatchSession<'a> {
    registry: &'a Registry,
    threshold: f32,
}

impl<'a> MatchSession<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Poll `source` until a member is recognised, `abort` is raised, or the
    /// give-up counter runs out. `abort` is checked before every frame.
    pub fn run<S, E>(
        &self,
        source: &mut S,
        embedder: &mut E,
        abort: &AtomicBool,
    ) -> Result<MatchOutcome, SessionError>
    where
        S: FrameSource,
        E: FaceEmbedder,
    {
        if self.registry.is_empty() {
            return Err(SessionError::NoMembers);
        }

        let mut counter = GiveUpCounter::default();
        let mut frames = 0usize;

        loop {
            if abort.load(Ordering::Relaxed) {
                tracing::info!(frames, "match session aborted");
                return Ok(MatchOutcome::Aborted { frames });
            }

            let frame = source
                .next_frame()
                .map_err(|e| SessionError::Capture(Box::new(e)))?;
            frames += 1;

            let probe = embedder
                .embed(&frame)
                .map_err(|e| SessionError::Embedding(Box::new(e)))?;

            match probe {
                Some(probe) => {
                    let result = FirstMatch.compare(&probe, self.registry.gallery(), self.threshold);
                    if let (true, Some(name)) = (result.matched, result.name) {
                        tracing::info!(name = %name, similarity = result.similarity, frames, "member matched");
                        return Ok(MatchOutcome::Matched {
                            name,
                            similarity: result.similarity,
                            frames,
                        });
                    }
                    tracing::debug!(frame = frames, best = result.similarity, "face did not match");
                    counter.record_unmatched();
                }
                None => {
                    tracing::trace!(frame = frames, "no face in frame");
                    counter.record_miss();
                }
            }

            if counter.exhausted() {
                tracing::info!(frames, "giving up, no member matched");
                return Ok(MatchOutcome::NoMatch { frames });
            }
        }
    }
}
