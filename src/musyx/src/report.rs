//! Container summaries and parse logs
//!
//! Two human-facing views of an accepted container: a one-line summary
//! (also serializable for `--json` output) and a multi-line parse log
//! written per container when a log directory is configured. Neither is
//! consumed by any other component.

use std::fmt::Write as _;

use serde::Serialize;

use crate::container::Container;
use crate::flatten::flatten_song;
use crate::image::RomImage;

/// Bytes of instrument macro shown in the parse log.
const MACRO_PREVIEW: usize = 16;

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub offset: u32,
    /// Mapped address, formatted for filenames and logs.
    pub addr: String,
    pub samples: usize,
    pub songs: usize,
    pub instruments: usize,
}

impl ContainerSummary {
    pub fn new(container: &Container, image: &RomImage) -> Self {
        Self {
            offset: container.offset,
            addr: format!("{:08X}", image.addr(container.offset)),
            samples: container
                .sample_table
                .as_ref()
                .map_or(0, |t| t.samples.len()),
            songs: container.song_table.as_ref().map_or(0, |t| t.songs.len()),
            instruments: container
                .instrument_table
                .as_ref()
                .map_or(0, |t| t.macros.len()),
        }
    }
}

/// Render the per-container parse log.
pub fn render_log(container: &Container, image: &RomImage) -> String {
    let mut out = String::new();
    let addr = |offset: u32| format!("{:08X}", image.addr(offset));

    let _ = writeln!(out, "Container @ {}", addr(container.offset));
    let _ = writeln!(
        out,
        "  extent {}..{} ({} bytes)",
        addr(container.extent.start),
        addr(container.extent.end),
        container.extent.end - container.extent.start
    );

    if let Some(table) = &container.sample_table {
        let _ = writeln!(
            out,
            "  SampleTable @ {} ({} samples)",
            addr(table.offset),
            table.samples.len()
        );
        for (i, sample) in table.samples.iter().enumerate() {
            let _ = writeln!(
                out,
                "    [{i}] @ {}: {} Hz, {} bytes",
                addr(sample.offset),
                sample.rate,
                sample.data.len()
            );
        }
    }

    if let Some(table) = &container.song_table {
        let _ = writeln!(
            out,
            "  SongTable @ {} ({} songs)",
            addr(table.offset),
            table.songs.len()
        );
        for (i, entry) in table.songs.iter().enumerate() {
            let song = &entry.song;
            let _ = writeln!(
                out,
                "    [{i}] @ {}: {} BPM, {} tracks, {} patterns, {} bytes",
                addr(entry.offset),
                song.bpm,
                song.tracks.iter().flatten().count(),
                song.patterns.len(),
                entry.raw.len()
            );
            match flatten_song(song) {
                Ok(flat) => {
                    for (slot, track) in flat.iter().enumerate() {
                        let Some(track) = track else { continue };
                        match track.loop_time {
                            Some(time) => {
                                let _ = writeln!(
                                    out,
                                    "      track {slot}: {} events, loops to {time}",
                                    track.events.len()
                                );
                            }
                            None => {
                                let _ = writeln!(
                                    out,
                                    "      track {slot}: {} events",
                                    track.events.len()
                                );
                            }
                        }
                    }
                }
                Err(err) => {
                    let _ = writeln!(out, "      flatten failed: {err}");
                }
            }
        }
    }

    if let Some(table) = &container.instrument_table {
        let _ = writeln!(
            out,
            "  InstrumentTable @ {} ({} macros)",
            addr(table.offset),
            table.macros.len()
        );
        for (i, instrument) in table.macros.iter().enumerate() {
            let preview = &instrument.data[..instrument.data.len().min(MACRO_PREVIEW)];
            let _ = writeln!(
                out,
                "    [{i}] @ {}: {} bytes  {}",
                addr(instrument.offset),
                instrument.data.len(),
                hex::encode(preview)
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ParseContext;
    use crate::fixtures::standard_rom;

    fn parsed() -> (RomImage, Container) {
        let (image, offset) = standard_rom();
        let mut ctx = ParseContext::new(&image);
        let container = Container::parse(&mut ctx, offset).unwrap();
        (image, container)
    }

    #[test]
    fn test_summary_counts() {
        let (image, container) = parsed();
        let summary = ContainerSummary::new(&container, &image);
        assert_eq!(summary.offset, 0x40);
        assert_eq!(summary.addr, "08000040");
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.songs, 1);
        assert_eq!(summary.instruments, 1);
    }

    #[test]
    fn test_log_mentions_all_tables() {
        let (image, container) = parsed();
        let log = render_log(&container, &image);
        assert!(log.contains("Container @ 08000040"));
        assert!(log.contains("SampleTable"));
        assert!(log.contains("8000 Hz, 8 bytes"));
        assert!(log.contains("120 BPM"));
        assert!(log.contains("track 0: 2 events"));
        assert!(log.contains("InstrumentTable"));
        assert!(log.contains("deadbeef"));
    }
}
