//! In-memory WAV fixtures for the audio tests.

use crate::decode::AudioSpec;

/// Build a small PCM16 WAV file in memory.
///
/// Returns the file bytes, its spec, and the number of frames.
pub(crate) fn test_wav_bytes() -> (Vec<u8>, AudioSpec, usize) {
    const CHANNELS: u16 = 2;
    const SAMPLE_RATE: u32 = 8000;
    const FRAMES: usize = 256;

    let mut samples: Vec<i16> = Vec::with_capacity(FRAMES * CHANNELS as usize);
    for i in 0..FRAMES {
        let v = ((i as i32 * 120) % 32768 - 16384) as i16;
        samples.push(v);
        samples.push(-v);
    }

    let data_len = (samples.len() * 2) as u32;
    let block_align = CHANNELS * 2;
    let byte_rate = SAMPLE_RATE * block_align as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for s in &samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }

    (
        bytes,
        AudioSpec {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        },
        FRAMES,
    )
}
