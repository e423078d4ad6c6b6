//! Pointer candidate scanning
//!
//! A container can sit anywhere in the image and nothing indexes it, but
//! other engine data does point at it. The scanner reads every 4-byte
//! aligned word in the image and records the ones that look like mapped
//! addresses; each distinct target becomes one probe candidate.

use std::collections::BTreeMap;

use crate::image::RomImage;

/// Stride of the candidate scan; also the stored pointer width.
pub const WORD_SIZE: u32 = 4;

/// Candidate target offset -> ordered source word positions.
///
/// Keyed by value, so the mapping is independent of scan order and two
/// scans of the same image are identical.
pub type CandidateMap = BTreeMap<u32, Vec<u32>>;

/// Scan the whole image for words that permissively resolve in-image.
///
/// Every aligned position from 0 through `len - 4` is tested; positions
/// holding the same target accumulate under one key. Words that do not
/// resolve are simply not recorded.
pub fn candidate_pointers(image: &RomImage) -> CandidateMap {
    let mut candidates = CandidateMap::new();

    if image.len() < WORD_SIZE {
        return candidates;
    }

    let data = image.data();
    let mut pos = 0u32;
    while pos <= image.len() - WORD_SIZE {
        let i = pos as usize;
        let word = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        if let Some(target) = image.resolve(word) {
            candidates.entry(target).or_default().push(pos);
        }

        pos += WORD_SIZE;
    }

    candidates
}
