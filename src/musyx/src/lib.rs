//! MusyX ROM audio ripper
//!
//! GBA games built on the MusyX audio engine carry self-indexing audio
//! containers somewhere inside the cartridge ROM, with no table of
//! contents pointing at them. This library finds and converts them:
//!
//! - `scan` walks every aligned word in the image and keeps the ones
//!   that look like mapped addresses (candidate pointers)
//! - `probe` speculatively parses a container at each candidate and
//!   accepts only instances that survive full structural validation
//! - `container` is the structural schema: sample, song and instrument
//!   tables of offset-addressed records
//! - `flatten` expands a song's pattern-compressed tracks into
//!   absolute-time event timelines, recovering loop points
//! - `export` encodes the results as WAV, Standard MIDI File and
//!   SoundFont output
//!
//! Speculative parsing fails far more often than it succeeds, so every
//! rejection is a typed [`Error`] handled at the probe boundary; nothing
//! in the scan/probe path panics on hostile bytes.

pub mod container;
pub mod export;
pub mod flatten;
pub mod image;
pub mod probe;
pub mod report;
pub mod scan;

pub use container::{
    Container, Instrument, InstrumentTable, Message, ParseContext, Pattern, Sample, SampleTable,
    Song, SongEntry, SongTable, Track, TrackAction, TrackCommand, TrackEnd, TRACK_SLOTS,
};
pub use flatten::{flatten_song, flatten_track, FlatEvent, FlatTrack};
pub use image::{Reader, RomImage, GBA_ROM_BASE};
pub use probe::{probe, try_probe, OverlapPolicy, ProbeOutcome};
pub use report::{render_log, ContainerSummary};
pub use scan::{candidate_pointers, CandidateMap, WORD_SIZE};

/// Errors from scanning, parsing and export.
///
/// Everything except the I/O wrappers marks a structural problem in the
/// bytes under a candidate; probing treats those as "not a container"
/// and moves on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("read of {len} bytes at {offset:#010x} runs past image end ({size:#x} bytes)")]
    OutOfRange { offset: u32, len: u32, size: u32 },

    #[error("stored pointer {value:#010x} does not map into the image")]
    BadPointer { value: u32 },

    #[error("{what} count {count} exceeds limit {max}")]
    CountTooLarge {
        what: &'static str,
        count: u32,
        max: u32,
    },

    #[error("{what} table is empty")]
    EmptyTable { what: &'static str },

    #[error("{what} is zero at {offset:#010x}")]
    ZeroField { what: &'static str, offset: u32 },

    #[error("unknown track command code {code} in track at {offset:#010x}")]
    UnknownTrackCode { code: i16, offset: u32 },

    #[error("unknown message flags {flags:#04x} at {offset:#010x}")]
    BadMessageFlags { flags: u8, offset: u32 },

    #[error("pattern index {index} out of range ({count} patterns) in track at {offset:#010x}")]
    BadPatternIndex { index: u16, count: u16, offset: u32 },

    #[error("loop start command {index} past end of track ({len} commands)")]
    LoopStartOutOfRange { index: u16, len: usize },

    #[error("track time regressed to {time} below {floor} in track at {offset:#010x}")]
    TimeRegression { offset: u32, time: i64, floor: u32 },

    #[error("container at {offset:#010x} has no sample table")]
    MissingSampleTable { offset: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV write error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
