//! Candidate probing
//!
//! Every distinct scan candidate gets one speculative parse attempt with
//! a fresh [`ParseContext`]. Almost all attempts fail; failure is the
//! expected outcome and is swallowed at this boundary. Only the count of
//! probed candidates and the accepted containers surface upward.

use crate::container::{Container, ParseContext};
use crate::flatten::flatten_song;
use crate::image::RomImage;
use crate::scan::CandidateMap;
use crate::{Error, Result};

/// What to do with accepted containers whose parsed bytes sit entirely
/// inside another accepted container. The format itself does not forbid
/// overlap, so keeping everything is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    #[default]
    KeepAll,
    /// Drop a container whose extent lies strictly inside a sibling's.
    FilterNested,
}

/// Result of probing one candidate set.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Number of candidates attempted.
    pub probed: usize,
    pub accepted: Vec<Container>,
}

/// Probe every candidate offset in ascending order.
pub fn probe(image: &RomImage, candidates: &CandidateMap, policy: OverlapPolicy) -> ProbeOutcome {
    let mut accepted = Vec::new();

    for &offset in candidates.keys() {
        if let Ok(container) = try_probe(image, offset) {
            accepted.push(container);
        }
    }

    if policy == OverlapPolicy::FilterNested {
        accepted = filter_nested(accepted);
    }

    ProbeOutcome {
        probed: candidates.len(),
        accepted,
    }
}

/// Attempt one candidate: parse, then validate every song by flattening
/// it, so a container with a regressing track never gets accepted.
pub fn try_probe(image: &RomImage, offset: u32) -> Result<Container> {
    let mut ctx = ParseContext::new(image);
    let container = Container::parse(&mut ctx, offset)?;

    if container.sample_table.is_none() {
        return Err(Error::MissingSampleTable { offset });
    }
    if let Some(song_table) = &container.song_table {
        for entry in &song_table.songs {
            flatten_song(&entry.song)?;
        }
    }

    Ok(container)
}

fn filter_nested(accepted: Vec<Container>) -> Vec<Container> {
    let extents: Vec<_> = accepted.iter().map(|c| c.extent.clone()).collect();
    accepted
        .into_iter()
        .enumerate()
        .filter(|(i, container)| {
            let extent = &container.extent;
            !extents.iter().enumerate().any(|(j, other)| {
                j != *i
                    && other.start <= extent.start
                    && extent.end <= other.end
                    && (other.start < extent.start || extent.end < other.end)
            })
        })
        .map(|(_, container)| container)
        .collect()
}
