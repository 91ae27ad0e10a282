use crate::error::{AppError, Result};
use std::path::Path;

/// Mono float32 PCM helpers shared by the Slicer and Mixer. Every clip this
/// pipeline produces internally is mono float32 at `target_sr`; conversion
/// to/from int16 happens only at the TTS client boundary.
pub fn read_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AppError::SlicingFailed(format!("open {}: {e}", path.display())))?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::SlicingFailed(format!("decode {}: {e}", path.display())))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::SlicingFailed(format!("decode {}: {e}", path.display())))?
        }
    };

    let mono = if spec.channels > 1 {
        downmix(&samples, spec.channels)
    } else {
        samples
    };

    Ok((mono, sample_rate))
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn write_mono_f32(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| AppError::SlicingFailed(format!("create {}: {e}", path.display())))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AppError::SlicingFailed(format!("write {}: {e}", path.display())))?;
    }
    writer
        .finalize()
        .map_err(|e| AppError::SlicingFailed(format!("finalize {}: {e}", path.display())))?;
    Ok(())
}

/// Equal-power fade applied in place over the first/last `len` samples.
pub fn fade_in(samples: &mut [f32], len: usize) {
    let n = len.min(samples.len());
    for (i, s) in samples.iter_mut().take(n).enumerate() {
        let t = i as f32 / n.max(1) as f32;
        *s *= (t * std::f32::consts::FRAC_PI_2).sin();
    }
}

pub fn fade_out(samples: &mut [f32], len: usize) {
    let n = len.min(samples.len());
    let start = samples.len() - n;
    for (i, s) in samples[start..].iter_mut().enumerate() {
        let t = i as f32 / n.max(1) as f32;
        *s *= (t * std::f32::consts::FRAC_PI_2).cos();
    }
}

/// Clipping guard: scales down only if the peak absolute sample exceeds
/// `threshold`. Leaves audio that is already under the ceiling untouched, so
/// quieter sentences stay quieter relative to louder ones.
pub fn normalize(samples: &mut [f32], threshold: f32) {
    let peak = samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
    if peak > threshold {
        let gain = threshold / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

pub fn silence(duration_ms: f64, sample_rate: u32) -> Vec<f32> {
    let n = ((duration_ms / 1000.0) * sample_rate as f64).round().max(0.0) as usize;
    vec![0.0; n]
}

/// Equal-power cross-fade of `a`'s tail against `b`'s head, `overlap` samples
/// wide. Returns the concatenation of `a` (minus overlap) + cross-faded
/// region + `b` (minus overlap).
pub fn crossfade_concat(a: &[f32], b: &[f32], overlap: usize) -> Vec<f32> {
    let overlap = overlap.min(a.len()).min(b.len());
    let mut out = Vec::with_capacity(a.len() + b.len() - overlap);
    out.extend_from_slice(&a[..a.len() - overlap]);

    for i in 0..overlap {
        let t = i as f32 / overlap.max(1) as f32;
        let gain_out = (t * std::f32::consts::FRAC_PI_2).cos();
        let gain_in = (t * std::f32::consts::FRAC_PI_2).sin();
        let a_sample = a[a.len() - overlap + i];
        let b_sample = b[i];
        out.push(a_sample * gain_out + b_sample * gain_in);
    }

    out.extend_from_slice(&b[overlap..]);
    out
}
