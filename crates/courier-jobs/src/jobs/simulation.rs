//! Long-running job that reports made-up progress.

use crate::error::Result;
use crate::job::{Completion, Job, JobContext};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;

const VERBS: &[&str] = &["Starting up", "Booting", "Repairing", "Loading", "Checking"];
const ADJECTIVES: &[&str] = &["master", "radiant", "silent", "harmonic", "fast"];
const NOUNS: &[&str] = &["solar array", "particle reshaper", "cosmic ray", "orbiter"];

pub const MIN_STEPS: u64 = 10;
pub const MAX_STEPS: u64 = 50;
pub const COMPLETED_STATUS: &str = "Task completed!";
pub const ANSWER: u64 = 42;

/// Walks a random number of steps in `[10, 50]`, pausing `step` between them.
///
/// The status phrase is regenerated on the first step and then with
/// probability 0.25 per step. Always ends at `(100, 100)` with result 42.
#[derive(Debug, Clone)]
pub struct ProgressSimulationJob {
    step: Duration,
    seed: Option<u64>,
}

impl ProgressSimulationJob {
    pub const TASK_NAME: &'static str = "long_task";

    pub fn new(step: Duration) -> Self {
        Self { step, seed: None }
    }

    /// Deterministic step count and phrases
    pub fn with_seed(step: Duration, seed: u64) -> Self {
        Self {
            step,
            seed: Some(seed),
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for ProgressSimulationJob {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

fn pick(words: &[&'static str], rng: &mut StdRng) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}

fn phrase(rng: &mut StdRng) -> String {
    let verb = pick(VERBS, rng);
    let adjective = pick(ADJECTIVES, rng);
    let noun = pick(NOUNS, rng);
    format!("{} {} {}...", verb, adjective, noun)
}

#[async_trait]
impl Job for ProgressSimulationJob {
    const NAME: &'static str = Self::TASK_NAME;
    type Data = ();

    async fn execute(&self, ctx: JobContext, _data: ()) -> Result<Completion> {
        let mut rng = self.rng();
        let total = rng.gen_range(MIN_STEPS..=MAX_STEPS);
        let mut message = String::new();

        for i in 0..total {
            if message.is_empty() || rng.gen_bool(0.25) {
                message = phrase(&mut rng);
            }
            ctx.report(i, total, message.clone()).await?;
            tokio::time::sleep(self.step).await;
        }

        Ok(Completion::new(json!(ANSWER))
            .with_progress(100, 100)
            .with_status(COMPLETED_STATUS))
    }
}
