//! Offline rendering of a playback plan to a WAV file

use std::f32::consts::TAU;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use chorder_core::{PlaybackPlan, StepPayload};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub sample_rate: u32,
    pub attack: Duration,
    pub release: Duration,
    /// Notes are released this long before their step ends
    pub hush_before: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            attack: Duration::from_millis(10),
            release: Duration::from_millis(120),
            hush_before: Duration::from_millis(150),
        }
    }
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Gain envelope at sample `i` of a voice gated for `gate` samples
fn envelope(i: usize, gate: usize, attack: usize, release: usize) -> f32 {
    let attack_gain = if attack == 0 { 1.0 } else { (i as f32 / attack as f32).min(1.0) };
    if i < gate {
        return attack_gain;
    }
    if release == 0 {
        return 0.0;
    }
    let since = (i - gate) as f32 / release as f32;
    attack_gain * (1.0 - since).max(0.0)
}

/// Mono f32 samples for the whole plan. Code steps render as silence.
pub fn render_samples(plan: &PlaybackPlan, config: &RenderConfig) -> Vec<f32> {
    let sr = config.sample_rate;
    let attack = samples_for(config.attack, sr);
    let release = samples_for(config.release, sr);
    let mut out = Vec::with_capacity(samples_for(plan.total_duration(), sr));

    for step in &plan.steps {
        let len = samples_for(step.duration, sr);
        let start = out.len();
        out.resize(start + len, 0.0);

        let StepPayload::Notes(notes) = &step.payload else {
            continue;
        };
        if notes.is_empty() {
            continue;
        }
        let gate = samples_for(step.duration.saturating_sub(config.hush_before), sr);
        let voice_gain = 1.0 / notes.len() as f32;

        for note in notes.notes() {
            let phase_step = note.frequency() as f64 / sr as f64;
            for (i, sample) in out[start..].iter_mut().enumerate() {
                let gain = envelope(i, gate, attack, release);
                if gain <= 0.0 && i >= gate {
                    break;
                }
                let phase = (phase_step * i as f64).fract() as f32;
                *sample += (TAU * phase).sin() * gain * voice_gain;
            }
        }
    }

    // Normalize to prevent clipping
    let max_amp = out.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max_amp > 0.001 {
        let gain = 0.8 / max_amp;
        out.iter_mut().for_each(|s| *s *= gain);
    }
    out
}

/// 16-bit mono WAV bytes
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, RenderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

pub fn render_wav(plan: &PlaybackPlan, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    let samples = render_samples(plan, config);
    info!(
        steps = plan.len(),
        seconds = plan.total_duration().as_secs_f32(),
        "Rendered plan"
    );
    encode_wav(&samples, config.sample_rate)
}

pub fn write_wav(path: &Path, plan: &PlaybackPlan, config: &RenderConfig) -> Result<(), RenderError> {
    std::fs::write(path, render_wav(plan, config)?)?;
    info!(path = %path.display(), "Wrote WAV");
    Ok(())
}
