//! Extract command: write samples, songs, instruments and conversions
//!
//! Output layout, one shared tree for every accepted container:
//!
//! - `Sounds/{i}_{addr}.wav` - samples as 8-bit mono WAV
//! - `SongData/{i}_{addr}.son` - raw song bytes
//! - `SongMidi/{i}_{addr}.mid` - flattened songs as format 1 SMF
//! - `InstrumentData/{i}_{addr}.bin` - raw instrument macros
//! - `SoundFont/{addr}.sf2` - per-container sample bank (opt-in)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use musyx::export::{blob_name, midi, sf2, wav};
use musyx::{flatten_song, render_log, Container, RomImage};

use super::scan_image;

pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub base: u32,
    pub log_dir: Option<PathBuf>,
    pub soundfont: bool,
    pub dedupe: bool,
}

pub fn run(options: &Options) -> Result<()> {
    let (image, outcome) = scan_image(&options.input, options.base, options.dedupe)?;
    if outcome.accepted.is_empty() {
        eprintln!("Nothing to extract");
        return Ok(());
    }

    let out_root = match &options.output {
        Some(path) => path.clone(),
        None => PathBuf::from(
            options
                .input
                .file_stem()
                .context("input path has no basename")?,
        ),
    };

    // Parse logs are only written for containers that already passed
    // validation, so a log directory never fills up with garbage hits.
    if let Some(log_dir) = &options.log_dir {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create {}", log_dir.display()))?;
        for container in &outcome.accepted {
            let path = log_dir.join(format!("{:08X}.txt", image.addr(container.offset)));
            fs::write(&path, render_log(container, &image))
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    for (i, container) in outcome.accepted.iter().enumerate() {
        eprintln!(
            "Converting {}/{}: {:08X}",
            i + 1,
            outcome.accepted.len(),
            image.addr(container.offset)
        );
        export_container(container, &image, &out_root, options.soundfont)?;
    }

    Ok(())
}

fn export_container(
    container: &Container,
    image: &RomImage,
    out_root: &Path,
    soundfont: bool,
) -> Result<()> {
    if let Some(table) = &container.sample_table {
        let dir = out_root.join("Sounds");
        for (i, sample) in table.samples.iter().enumerate() {
            let wav = wav::sample_wav_bytes(sample)?;
            write_file(&dir.join(blob_name(i, image.addr(sample.offset), "wav")), &wav)?;
        }

        if soundfont {
            let path = out_root
                .join("SoundFont")
                .join(format!("{:08X}.sf2", image.addr(container.offset)));
            write_file(&path, &sf2::sample_bank_bytes(table))?;
        }
    }

    if let Some(table) = &container.song_table {
        let song_dir = out_root.join("SongData");
        let midi_dir = out_root.join("SongMidi");
        for (i, entry) in table.songs.iter().enumerate() {
            let addr = image.addr(entry.offset);
            write_file(&song_dir.join(blob_name(i, addr, "son")), &entry.raw)?;

            // Accepted songs flattened cleanly at probe time; failure
            // here means inconsistent re-parse, so skip the song and
            // keep going.
            match flatten_song(&entry.song).and_then(|flat| midi::song_midi_bytes(&entry.song, &flat))
            {
                Ok(bytes) => write_file(&midi_dir.join(blob_name(i, addr, "mid")), &bytes)?,
                Err(err) => eprintln!("song {addr:08X}: {err}"),
            }
        }
    }

    if let Some(table) = &container.instrument_table {
        let dir = out_root.join("InstrumentData");
        for (i, instrument) in table.macros.iter().enumerate() {
            let path = dir.join(blob_name(i, image.addr(instrument.offset), "bin"));
            write_file(&path, &instrument.data)?;
        }
    }

    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
