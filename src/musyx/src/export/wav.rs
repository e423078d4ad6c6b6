//! Sample to WAV conversion
//!
//! Samples are stored as signed 8-bit mono PCM. WAV stores 8-bit audio
//! offset-binary; hound applies that conversion when fed i8 samples.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::container::Sample;
use crate::Result;

/// Encode one sample as an 8-bit mono WAV file.
pub fn sample_wav_bytes(sample: &Sample) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: u32::from(sample.rate),
        bits_per_sample: 8,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for &value in &sample.data {
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}
