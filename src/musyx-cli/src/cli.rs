//! CLI argument definitions for musyx

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "musyx")]
#[command(about = "MusyX GBA audio ripper", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a ROM image and list accepted audio containers
    #[command(visible_alias = "s")]
    Scan {
        /// Path to the ROM image
        input: PathBuf,

        /// Address the image is mapped at (stored pointers are relative
        /// to this)
        #[arg(long, env = "MUSYX_BASE", default_value = "0x08000000", value_parser = parse_base)]
        base: u32,

        /// Drop containers nested inside an accepted sibling
        #[arg(long)]
        dedupe: bool,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract samples, songs, instruments and MIDI conversions
    #[command(visible_alias = "x")]
    Extract {
        /// Path to the ROM image
        input: PathBuf,

        /// Directory to save files in (defaults to the image's basename)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Address the image is mapped at
        #[arg(long, env = "MUSYX_BASE", default_value = "0x08000000", value_parser = parse_base)]
        base: u32,

        /// Directory for per-container parse logs (logging disabled if
        /// not specified)
        #[arg(short, long)]
        log_dir: Option<PathBuf>,

        /// Also write a SoundFont bank per container
        #[arg(long)]
        soundfont: bool,

        /// Drop containers nested inside an accepted sibling
        #[arg(long)]
        dedupe: bool,
    },
}

/// Accept `0x`-prefixed hex or plain decimal.
pub fn parse_base(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("invalid address: {s}"))
}
