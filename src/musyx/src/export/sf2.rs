//! SoundFont bank assembly
//!
//! Packs a container's sample table into a minimal `sfbk` RIFF: one
//! preset/instrument/sample-header chain per sample, 8-bit source data
//! widened to 16-bit, 46 guard points between samples as the SF2 chunk
//! rules require. Hand-rolled chunk writing; the layout is small enough
//! that a builder dependency would outweigh it.

use crate::container::SampleTable;

/// SF2 generator opcodes used by the bank.
const GEN_INSTRUMENT: u16 = 41;
const GEN_SAMPLE_ID: u16 = 53;

/// Guard points appended after each sample in the smpl chunk.
const GUARD_POINTS: usize = 46;

/// Mono sample link type.
const SAMPLE_TYPE_MONO: u16 = 1;

/// Build a complete SoundFont bank from a sample table.
pub fn sample_bank_bytes(table: &SampleTable) -> Vec<u8> {
    let info = list_chunk(
        b"INFO",
        &[
            chunk(b"ifil", &version_body(2, 1)),
            chunk(b"isng", b"E-mu 10K2\0"),
            chunk(b"INAM", b"MusyX Rip\0"),
        ],
    );
    let sdta = list_chunk(b"sdta", &[chunk(b"smpl", &sample_data_body(table))]);
    let pdta = list_chunk(
        b"pdta",
        &[
            chunk(b"phdr", &preset_headers_body(table)),
            chunk(b"pbag", &bag_body(table.samples.len())),
            chunk(b"pmod", &[0u8; 10]),
            chunk(b"pgen", &gen_body(table.samples.len(), GEN_INSTRUMENT)),
            chunk(b"inst", &instrument_headers_body(table)),
            chunk(b"ibag", &bag_body(table.samples.len())),
            chunk(b"imod", &[0u8; 10]),
            chunk(b"igen", &gen_body(table.samples.len(), GEN_SAMPLE_ID)),
            chunk(b"shdr", &sample_headers_body(table)),
        ],
    );

    let mut body = b"sfbk".to_vec();
    body.extend_from_slice(&info);
    body.extend_from_slice(&sdta);
    body.extend_from_slice(&pdta);
    chunk(b"RIFF", &body)
}

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len() + 1);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list_chunk(kind: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = kind.to_vec();
    for c in chunks {
        body.extend_from_slice(c);
    }
    chunk(b"LIST", &body)
}

fn version_body(major: u16, minor: u16) -> Vec<u8> {
    let mut body = major.to_le_bytes().to_vec();
    body.extend_from_slice(&minor.to_le_bytes());
    body
}

/// Fixed-width record name, zero-padded.
fn record_name(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (slot, byte) in out.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    out
}

/// 16-bit sample data: each 8-bit point widened, then guard points.
fn sample_data_body(table: &SampleTable) -> Vec<u8> {
    let mut body = Vec::new();
    for sample in &table.samples {
        for &point in &sample.data {
            body.extend_from_slice(&(i16::from(point) << 8).to_le_bytes());
        }
        body.extend_from_slice(&[0u8; GUARD_POINTS * 2]);
    }
    body
}

fn preset_headers_body(table: &SampleTable) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, _) in table.samples.iter().enumerate() {
        body.extend_from_slice(&record_name(&format!("Preset {i}")));
        body.extend_from_slice(&(i as u16).to_le_bytes()); // preset number
        body.extend_from_slice(&0u16.to_le_bytes()); // bank
        body.extend_from_slice(&(i as u16).to_le_bytes()); // bag index
        body.extend_from_slice(&[0u8; 12]); // library, genre, morphology
    }
    body.extend_from_slice(&record_name("EOP"));
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(&(table.samples.len() as u16).to_le_bytes());
    body.extend_from_slice(&[0u8; 12]);
    body
}

fn instrument_headers_body(table: &SampleTable) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, _) in table.samples.iter().enumerate() {
        body.extend_from_slice(&record_name(&format!("Instrument {i}")));
        body.extend_from_slice(&(i as u16).to_le_bytes());
    }
    body.extend_from_slice(&record_name("EOI"));
    body.extend_from_slice(&(table.samples.len() as u16).to_le_bytes());
    body
}

/// Bag list: each zone owns exactly one generator and no modulators.
fn bag_body(count: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..=count {
        body.extend_from_slice(&(i as u16).to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
    }
    body
}

/// Generator list: one `oper -> index` generator per zone plus the
/// terminal record.
fn gen_body(count: usize, oper: u16) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..count {
        body.extend_from_slice(&oper.to_le_bytes());
        body.extend_from_slice(&(i as u16).to_le_bytes());
    }
    body.extend_from_slice(&[0u8; 4]);
    body
}

fn sample_headers_body(table: &SampleTable) -> Vec<u8> {
    let mut body = Vec::new();
    let mut start = 0u32;
    for (i, sample) in table.samples.iter().enumerate() {
        let end = start + sample.data.len() as u32;
        body.extend_from_slice(&record_name(&format!("Sample {i}")));
        body.extend_from_slice(&start.to_le_bytes());
        body.extend_from_slice(&end.to_le_bytes());
        body.extend_from_slice(&start.to_le_bytes()); // loop start
        body.extend_from_slice(&end.to_le_bytes()); // loop end
        body.extend_from_slice(&u32::from(sample.rate).to_le_bytes());
        body.push(60); // original pitch: middle C
        body.push(0); // pitch correction
        body.extend_from_slice(&0u16.to_le_bytes()); // link
        body.extend_from_slice(&SAMPLE_TYPE_MONO.to_le_bytes());
        start = end + GUARD_POINTS as u32;
    }
    body.extend_from_slice(&record_name("EOS"));
    body.extend_from_slice(&[0u8; 26]);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Sample;

    fn table() -> SampleTable {
        SampleTable {
            offset: 0x60,
            samples: vec![
                Sample {
                    offset: 0x70,
                    rate: 8000,
                    data: vec![0, 16, 32, -32],
                },
                Sample {
                    offset: 0x80,
                    rate: 11025,
                    data: vec![1, 2],
                },
            ],
        }
    }

    fn find_chunk<'a>(bytes: &'a [u8], id: &[u8; 4]) -> &'a [u8] {
        let pos = bytes
            .windows(4)
            .position(|w| w == id)
            .unwrap_or_else(|| panic!("chunk {:?} missing", std::str::from_utf8(id)));
        let size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        &bytes[pos + 8..pos + 8 + size]
    }

    #[test]
    fn test_riff_envelope() {
        let bytes = sample_bank_bytes(&table());
        assert_eq!(&bytes[0..4], b"RIFF");
        let size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(size, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"sfbk");
    }

    #[test]
    fn test_sample_data_widened_with_guard_points() {
        let bytes = sample_bank_bytes(&table());
        let smpl = find_chunk(&bytes, b"smpl");
        assert_eq!(smpl.len(), (4 + GUARD_POINTS + 2 + GUARD_POINTS) * 2);
        // First point 0, second 16 << 8
        assert_eq!(&smpl[0..2], &0i16.to_le_bytes());
        assert_eq!(&smpl[2..4], &(16i16 << 8).to_le_bytes());
    }

    #[test]
    fn test_record_list_sizes() {
        let bytes = sample_bank_bytes(&table());
        assert_eq!(find_chunk(&bytes, b"phdr").len(), 3 * 38);
        assert_eq!(find_chunk(&bytes, b"pbag").len(), 3 * 4);
        assert_eq!(find_chunk(&bytes, b"pgen").len(), 3 * 4);
        assert_eq!(find_chunk(&bytes, b"inst").len(), 3 * 22);
        assert_eq!(find_chunk(&bytes, b"shdr").len(), 3 * 46);
        assert_eq!(find_chunk(&bytes, b"pmod").len(), 10);
    }

    #[test]
    fn test_sample_header_offsets_skip_guard_points() {
        let bytes = sample_bank_bytes(&table());
        let shdr = find_chunk(&bytes, b"shdr");
        let second = &shdr[46..];
        let start = u32::from_le_bytes(second[20..24].try_into().unwrap());
        let end = u32::from_le_bytes(second[24..28].try_into().unwrap());
        assert_eq!(start, 4 + GUARD_POINTS as u32);
        assert_eq!(end, start + 2);
    }
}
