pub mod extract;
pub mod scan;

use std::path::Path;

use anyhow::{Context, Result};
use musyx::{candidate_pointers, probe, OverlapPolicy, ProbeOutcome, RomImage};

/// Load the image and run the scan/probe pipeline shared by both
/// commands.
pub fn scan_image(input: &Path, base: u32, dedupe: bool) -> Result<(RomImage, ProbeOutcome)> {
    let data = std::fs::read(input)
        .with_context(|| format!("failed to read image {}", input.display()))?;
    u32::try_from(data.len()).context("image larger than 4 GiB")?;
    let image = RomImage::new(data, base);

    eprintln!(
        "Scanning {:#x} bytes at base {:#010x} for pointer candidates...",
        image.len(),
        image.base()
    );
    let candidates = candidate_pointers(&image);
    eprintln!("Probing {} candidate targets...", candidates.len());

    let policy = if dedupe {
        OverlapPolicy::FilterNested
    } else {
        OverlapPolicy::KeepAll
    };
    let outcome = probe(&image, &candidates, policy);
    eprintln!(
        "{}/{} candidates accepted",
        outcome.accepted.len(),
        outcome.probed
    );

    Ok((image, outcome))
}
