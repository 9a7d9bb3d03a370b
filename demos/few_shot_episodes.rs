//! Few-shot episodes against the episodic memory.
//!
//! Stands in for an embedding network with fixed random class prototypes plus
//! per-sample noise, then runs Omniglot-style episodes: each episode draws
//! `EPISODE_WIDTH` fresh classes, streams `EPISODE_LENGTH` labelled samples,
//! and scores the prediction made *before* each sample is written. Accuracy is
//! reported by how many times the class had been seen (0-shot, 1-shot, ...).
//!
//! An optional JSON config path overrides the memory parameters.
//!
//! Run: cargo run --example few_shot_episodes --release [-- config.json]

use episodic_memory::vector::{fill_random_unit, seeded_rng};
use episodic_memory::{Memory, MemoryConfig, QueryMode};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EPISODE_WIDTH: usize = 5;
const EPISODE_LENGTH: usize = 30;
const EPISODES: usize = 50;
const CLASSES: usize = 200;
const NOISE: f32 = 0.35;

// =============================================================================
// Synthetic embedding producer
// =============================================================================

struct Embedder {
    prototypes: Vec<Vec<f32>>,
    rng: ChaCha8Rng,
}

impl Embedder {
    fn new(classes: usize, key_dim: usize, seed: u64) -> Self {
        let mut rng = seeded_rng(seed, "prototypes");
        let prototypes = (0..classes)
            .map(|_| {
                let mut v = vec![0.0; key_dim];
                fill_random_unit(&mut rng, &mut v);
                v
            })
            .collect();
        Self {
            prototypes,
            rng: seeded_rng(seed, "samples"),
        }
    }

    fn embed(&mut self, class: usize) -> Vec<f32> {
        // Uniform noise with total norm around NOISE.
        let half_width = NOISE * (3.0 / self.prototypes[class].len() as f32).sqrt();
        let rng = &mut self.rng;
        self.prototypes[class]
            .iter()
            .map(|&p| p + rng.gen_range(-half_width..half_width))
            .collect()
    }
}

// =============================================================================
// Episodes
// =============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MemoryConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => MemoryConfig::new(1024, 64).with_top_k(32),
    };
    info!(?config, "starting few-shot episodes");

    let mut memory = Memory::new(config.clone())?;
    let mut embedder = Embedder::new(CLASSES, config.key_dim, config.seed);
    let mut sampler = ChaCha8Rng::seed_from_u64(config.seed);

    let mut correct_by_shot = vec![(0usize, 0usize); EPISODE_WIDTH + 1];
    let mut total_loss = 0.0f32;
    let mut steps = 0usize;

    for episode in 0..EPISODES {
        memory.reset();
        let classes: Vec<usize> = (0..CLASSES).choose_multiple(&mut sampler, EPISODE_WIDTH);
        let mut seen = [0usize; EPISODE_WIDTH];

        for _ in 0..EPISODE_LENGTH {
            let slot = sampler.gen_range(0..EPISODE_WIDTH);
            let embedding = embedder.embed(classes[slot]);
            let label = slot as i64;

            let result = memory.query_one(&embedding, Some(label), QueryMode::Train)?;
            if let Some(loss) = &result.loss {
                total_loss += loss.value;
                steps += 1;
            }

            let shot = seen[slot].min(EPISODE_WIDTH);
            let entry = &mut correct_by_shot[shot];
            entry.0 += usize::from(result.prediction == label);
            entry.1 += 1;
            seen[slot] += 1;
        }

        if episode % 10 == 0 {
            info!(episode, occupied = memory.bank().occupied(), "episode done");
        }
    }

    println!("average loss: {:.6}", total_loss / steps.max(1) as f32);
    for (shot, (correct, total)) in correct_by_shot.iter().enumerate() {
        if *total > 0 {
            println!("{}-shot: {:.3}", shot, *correct as f32 / *total as f32);
        }
    }

    Ok(())
}
