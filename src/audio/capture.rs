//! Microphone-side encoding: float blocks to PCM16, volume metering, and the
//! base64 framing the wire protocol expects.

use base64::Engine as _;
use tokio::sync::mpsc;

use crate::error::RealtimeError;

/// A live block-producing audio input.
///
/// `start` opens the device and yields a stream of mono f32 blocks at the
/// session rate (24 kHz); it fails with [`RealtimeError::DeviceUnavailable`]
/// when no usable device exists or permission is denied. `stop` releases the
/// device; dropping the returned receiver alone does not.
pub trait AudioSource: Send {
    fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, RealtimeError>;
    fn stop(&mut self);
}

/// Quantize normalized float samples to signed 16-bit PCM.
///
/// Samples are clamped to [-1.0, 1.0] first. Scaling is asymmetric —
/// negatives by 32768, non-negatives by 32767, truncating toward zero — to
/// stay bit-compatible with the wire protocol's fixed-point convention.
pub fn quantize_block(input: &[f32]) -> Vec<i16> {
    input
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Mean absolute normalized amplitude of a PCM block, in [0, 1].
pub fn block_volume(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&s| (s as f32 / 32768.0).abs()).sum();
    sum / samples.len() as f32
}

/// Pack a PCM block little-endian and base64-encode it for transport.
pub fn encode_block(samples: &[i16]) -> String {
    let mut byte_data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        byte_data.extend_from_slice(&sample.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(&byte_data)
}
