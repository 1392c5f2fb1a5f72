// ABOUTME: User-facing generation request with defaults and pre-flight validation
// ABOUTME: Resolves the -1 "random" seed before anything reaches the provider

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adapters::adapter_filename;
use crate::error::JobError;
use crate::remote::GenerationParams;

pub const RANDOM_SEED: i64 = -1;
pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;
pub const DEFAULT_ADAPTER_STRENGTH: f32 = 0.8;

const MIN_DIMENSION: u32 = 64;
const MAX_DIMENSION: u32 = 2048;
const MAX_STEPS: u32 = 150;
const MAX_GUIDANCE_SCALE: f32 = 30.0;
const MAX_ADAPTER_STRENGTH: f32 = 2.0;

/// A generation request as callers submit it. Only `prompt` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, alias = "num_inference_steps")]
    pub steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default, alias = "lora_name")]
    pub model_adapter_name: Option<String>,
    #[serde(default, alias = "lora_strength")]
    pub model_adapter_strength: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Validate and fill defaults, drawing a fresh seed from the thread RNG if needed.
    pub fn into_params(self) -> Result<GenerationParams, JobError> {
        self.into_params_with(&mut rand::thread_rng())
    }

    pub fn into_params_with<R: Rng + ?Sized>(self, rng: &mut R) -> Result<GenerationParams, JobError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(JobError::Validation("prompt must not be empty".to_string()));
        }

        let width = check_dimension("width", self.width.unwrap_or(DEFAULT_WIDTH))?;
        let height = check_dimension("height", self.height.unwrap_or(DEFAULT_HEIGHT))?;

        let steps = self.steps.unwrap_or(DEFAULT_STEPS);
        if !(1..=MAX_STEPS).contains(&steps) {
            return Err(JobError::Validation(format!(
                "steps must be between 1 and {}, got {}",
                MAX_STEPS, steps
            )));
        }

        let guidance_scale = self.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE);
        if !guidance_scale.is_finite() || !(0.0..=MAX_GUIDANCE_SCALE).contains(&guidance_scale) {
            return Err(JobError::Validation(format!(
                "guidance_scale must be between 0 and {}, got {}",
                MAX_GUIDANCE_SCALE, guidance_scale
            )));
        }

        let seed = resolve_seed(self.seed.unwrap_or(RANDOM_SEED), rng)?;

        let (lora_name, lora_strength) = match self
            .model_adapter_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != "none")
        {
            Some(name) => {
                let strength = self
                    .model_adapter_strength
                    .unwrap_or(DEFAULT_ADAPTER_STRENGTH);
                if !strength.is_finite() || !(0.0..=MAX_ADAPTER_STRENGTH).contains(&strength) {
                    return Err(JobError::Validation(format!(
                        "model_adapter_strength must be between 0 and {}, got {}",
                        MAX_ADAPTER_STRENGTH, strength
                    )));
                }
                (Some(adapter_filename(name)), Some(strength))
            }
            None => (None, None),
        };

        Ok(GenerationParams {
            prompt,
            negative_prompt: self.negative_prompt.unwrap_or_default(),
            width,
            height,
            num_inference_steps: steps,
            guidance_scale,
            seed,
            lora_name,
            lora_strength,
        })
    }
}

/// Map the caller's seed onto the non-negative range the sampler accepts.
///
/// `-1` draws a random seed in `1..=u32::MAX`. Any other negative value is
/// rejected, since the remote validator refuses negative seeds outright.
pub fn resolve_seed<R: Rng + ?Sized>(seed: i64, rng: &mut R) -> Result<u64, JobError> {
    match seed {
        RANDOM_SEED => Ok(rng.gen_range(1..=u64::from(u32::MAX))),
        s if s < 0 => Err(JobError::Validation(format!(
            "seed must be non-negative or -1 for random, got {}",
            s
        ))),
        s => Ok(s as u64),
    }
}

fn check_dimension(field: &str, value: u32) -> Result<u32, JobError> {
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) || value % 8 != 0 {
        return Err(JobError::Validation(format!(
            "{} must be a multiple of 8 between {} and {}, got {}",
            field, MIN_DIMENSION, MAX_DIMENSION, value
        )));
    }
    Ok(value)
}
