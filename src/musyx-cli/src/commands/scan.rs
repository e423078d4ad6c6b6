//! Scan command: list accepted containers

use std::path::Path;

use anyhow::Result;
use musyx::ContainerSummary;

use super::scan_image;

pub fn run(input: &Path, base: u32, dedupe: bool, json: bool) -> Result<()> {
    let (image, outcome) = scan_image(input, base, dedupe)?;

    let summaries: Vec<ContainerSummary> = outcome
        .accepted
        .iter()
        .map(|container| ContainerSummary::new(container, &image))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!(
                "{}: {} samples - {} songs - {} instruments",
                summary.addr, summary.samples, summary.songs, summary.instruments
            );
        }
        if summaries.is_empty() {
            println!("No containers found");
        }
    }

    Ok(())
}
