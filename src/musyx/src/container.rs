//! Container structural model and speculative parser
//!
//! A container is a 12-byte header of stored pointers to three tables:
//!
//! - Sample table: `count: u32`, then `count` pointers. Each sample is
//!   `rate: u16`, `pad: u16`, `length: u32`, then signed 8-bit PCM.
//! - Song table: `count: u32`, then `count` pointers. Each song is
//!   `bpm: u16`, `pattern_count: u16`, 17 track slot pointers (0 = empty
//!   slot), then `pattern_count` pattern pointers.
//! - Instrument table: `count: u32`, then `count` pointers. Each macro is
//!   `length: u32`, then raw command bytes.
//!
//! Tracks are 4-byte commands `{delta: i16, code: i16}` up to a terminal
//! code; patterns are 8-byte messages up to an end-flagged message. All
//! stored pointers are image-mapped addresses.
//!
//! Parsing is speculative: most parse attempts run against garbage bytes
//! and are expected to fail. Every failure is a typed [`Error`], never a
//! panic, and state lives in a [`ParseContext`] owned by a single probe
//! attempt so no failed parse can leak into the next one.

use std::collections::HashMap;
use std::ops::Range;

use crate::image::{Reader, RomImage};
use crate::{Error, Result};

/// Fixed number of track slots per song: channels 0-15 plus one
/// reserved slot the driver never plays.
pub const TRACK_SLOTS: usize = 17;

/// Count caps; anything larger is treated as a misparse, not data.
pub const MAX_SAMPLES: u32 = 256;
pub const MAX_SONGS: u32 = 256;
pub const MAX_INSTRUMENTS: u32 = 256;
pub const MAX_PATTERNS: u32 = 256;
pub const MAX_TRACK_COMMANDS: u32 = 4096;
pub const MAX_PATTERN_MESSAGES: u32 = 4096;
pub const MAX_SAMPLE_BYTES: u32 = 0x8_0000;
pub const MAX_INSTRUMENT_BYTES: u32 = 0x1_0000;

/// Track command codes below zero.
const CODE_REST: i16 = -1;
const CODE_LOOP: i16 = -2;
const CODE_STOP: i16 = -3;

/// Message flag bits.
const FLAG_END: u8 = 0x01;
const FLAG_PROGRAM: u8 = 0x02;
const FLAG_KNOWN: u8 = FLAG_END | FLAG_PROGRAM;

/// State owned by one probe attempt.
///
/// Holds the image, the pattern identity cache (pattern offsets shared
/// across tracks and songs parse once per probe) and the byte span the
/// parse has touched so far. Constructed fresh for every candidate, so
/// probe outcomes are independent by construction.
pub struct ParseContext<'a> {
    image: &'a RomImage,
    patterns: HashMap<u32, CachedPattern>,
    span: Option<Range<u32>>,
}

#[derive(Clone)]
struct CachedPattern {
    pattern: Pattern,
    end: u32,
}

impl<'a> ParseContext<'a> {
    pub fn new(image: &'a RomImage) -> Self {
        Self {
            image,
            patterns: HashMap::new(),
            span: None,
        }
    }

    pub fn image(&self) -> &'a RomImage {
        self.image
    }

    /// Byte range touched by the parse so far.
    pub fn span(&self) -> Range<u32> {
        self.span.clone().unwrap_or(0..0)
    }

    fn note(&mut self, start: u32, end: u32) {
        let span = match self.span.take() {
            Some(span) => span.start.min(start)..span.end.max(end),
            None => start..end,
        };
        self.span = Some(span);
    }

    /// Pattern at `offset`, parsed once per probe.
    fn pattern(&mut self, offset: u32) -> Result<(Pattern, u32)> {
        if let Some(cached) = self.patterns.get(&offset) {
            return Ok((cached.pattern.clone(), cached.end));
        }
        let (pattern, end) = Pattern::parse(self.image, offset)?;
        self.note(offset, end);
        self.patterns.insert(offset, CachedPattern {
            pattern: pattern.clone(),
            end,
        });
        Ok((pattern, end))
    }
}

/// One accepted container instance. Immutable once accepted; exporters
/// only read it.
#[derive(Debug, Clone)]
pub struct Container {
    /// Image offset of the container header.
    pub offset: u32,
    pub sample_table: Option<SampleTable>,
    pub song_table: Option<SongTable>,
    pub instrument_table: Option<InstrumentTable>,
    /// Byte range the parsed structure occupies in the image.
    pub extent: Range<u32>,
}

#[derive(Debug, Clone)]
pub struct SampleTable {
    pub offset: u32,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub offset: u32,
    /// Playback rate in Hz.
    pub rate: u16,
    /// Signed 8-bit PCM.
    pub data: Vec<i8>,
}

#[derive(Debug, Clone)]
pub struct SongTable {
    pub offset: u32,
    pub songs: Vec<SongEntry>,
}

/// A song plus the raw bytes it occupies, kept for `.son` export.
#[derive(Debug, Clone)]
pub struct SongEntry {
    pub offset: u32,
    pub song: Song,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Song {
    /// Beats per minute; never zero in an accepted song.
    pub bpm: u16,
    /// Track slots in channel order; None for empty slots.
    pub tracks: Vec<Option<Track>>,
    /// Pattern pool; tracks reference entries by index.
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub offset: u32,
    pub commands: Vec<TrackCommand>,
    pub end: TrackEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackCommand {
    /// Relative time delta; negative values exist in the wire format but
    /// any that would move time backwards fail flattening.
    pub delta: i16,
    pub action: TrackAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAction {
    /// Play the pattern at this pool index, starting now.
    Pattern(u16),
    /// Advance time with no events.
    Rest,
}

/// How a track terminates. The loop marker can only be the final
/// command, so it is modeled as the terminator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEnd {
    Stop,
    Loop {
        delta: i16,
        /// Command index playback returns to.
        start_index: u16,
        /// Time offset added to that command's cumulative time.
        start_time: u16,
    },
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub offset: u32,
    /// Messages in order, end marker included.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Relative time delta from the previous message.
    pub delta: u16,
    /// MIDI-style note number; 0 = no note.
    pub note: u8,
    pub velocity: u8,
    /// Note length; note-off goes at note-on time plus this.
    pub sustain: u16,
    pub is_end: bool,
    pub program_change: bool,
    pub patch: u8,
}

impl Container {
    /// Speculatively parse a container rooted at `offset`.
    ///
    /// The three table pointers are read permissively (an unmapped value
    /// means the table is absent); everything below them is strict.
    pub fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let image = ctx.image();
        let mut r = Reader::at(image, offset);
        let sample_ptr = r.u32()?;
        let song_ptr = r.u32()?;
        let instrument_ptr = r.u32()?;
        ctx.note(offset, r.pos());

        let sample_table = match image.resolve(sample_ptr) {
            Some(table) => Some(SampleTable::parse(ctx, table)?),
            None => None,
        };
        let song_table = match image.resolve(song_ptr) {
            Some(table) => Some(SongTable::parse(ctx, table)?),
            None => None,
        };
        let instrument_table = match image.resolve(instrument_ptr) {
            Some(table) => Some(InstrumentTable::parse(ctx, table)?),
            None => None,
        };

        Ok(Self {
            offset,
            sample_table,
            song_table,
            instrument_table,
            extent: ctx.span(),
        })
    }
}

/// Read `count` stored pointers and strictly resolve each.
fn pointer_array(r: &mut Reader, count: u32) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let word = r.u32()?;
        offsets.push(r.image().require(word)?);
    }
    Ok(offsets)
}

fn checked_count(r: &mut Reader, what: &'static str, max: u32) -> Result<u32> {
    let count = r.u32()?;
    if count > max {
        return Err(Error::CountTooLarge { what, count, max });
    }
    Ok(count)
}

impl SampleTable {
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let mut r = Reader::at(ctx.image(), offset);
        let count = checked_count(&mut r, "samples", MAX_SAMPLES)?;
        if count == 0 {
            return Err(Error::EmptyTable { what: "samples" });
        }
        let offsets = pointer_array(&mut r, count)?;
        ctx.note(offset, r.pos());

        let samples = offsets
            .into_iter()
            .map(|offset| Sample::parse(ctx, offset))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { offset, samples })
    }
}

impl Sample {
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let mut r = Reader::at(ctx.image(), offset);
        let rate = r.u16()?;
        if rate == 0 {
            return Err(Error::ZeroField {
                what: "sample rate",
                offset,
            });
        }
        let _pad = r.u16()?;
        let length = checked_count(&mut r, "sample bytes", MAX_SAMPLE_BYTES)?;
        let data = r.blob(length)?.iter().map(|&b| b as i8).collect();
        ctx.note(offset, r.pos());
        Ok(Self { offset, rate, data })
    }
}

impl SongTable {
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let mut r = Reader::at(ctx.image(), offset);
        let count = checked_count(&mut r, "songs", MAX_SONGS)?;
        let offsets = pointer_array(&mut r, count)?;
        ctx.note(offset, r.pos());

        let songs = offsets
            .into_iter()
            .map(|offset| {
                let (song, end) = Song::parse(ctx, offset)?;
                let raw = ctx.image().bytes(offset, end - offset)?.to_vec();
                Ok(SongEntry { offset, song, raw })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { offset, songs })
    }
}

impl Song {
    /// Parse a song and report the end of the furthest byte it reaches,
    /// including its tracks and patterns.
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<(Self, u32)> {
        let image = ctx.image();
        let mut r = Reader::at(image, offset);
        let bpm = r.u16()?;
        if bpm == 0 {
            return Err(Error::ZeroField { what: "bpm", offset });
        }
        let pattern_count = checked_count(&mut r, "patterns", MAX_PATTERNS)? as u16;

        let mut track_offsets = Vec::with_capacity(TRACK_SLOTS);
        for _ in 0..TRACK_SLOTS {
            let word = r.u32()?;
            // A zero slot is an empty track; anything else must map.
            track_offsets.push(match word {
                0 => None,
                word => Some(image.require(word)?),
            });
        }
        let pattern_offsets = pointer_array(&mut r, u32::from(pattern_count))?;
        let mut end = r.pos();
        ctx.note(offset, end);

        let mut tracks = Vec::with_capacity(TRACK_SLOTS);
        for track_offset in track_offsets {
            tracks.push(match track_offset {
                Some(track_offset) => {
                    let (track, track_end) = Track::parse(ctx, track_offset, pattern_count)?;
                    end = end.max(track_end);
                    Some(track)
                }
                None => None,
            });
        }

        let mut patterns = Vec::with_capacity(pattern_offsets.len());
        for pattern_offset in pattern_offsets {
            let (pattern, pattern_end) = ctx.pattern(pattern_offset)?;
            end = end.max(pattern_end);
            patterns.push(pattern);
        }

        Ok((
            Self {
                bpm,
                tracks,
                patterns,
            },
            end,
        ))
    }
}

impl Track {
    fn parse(ctx: &mut ParseContext, offset: u32, pattern_count: u16) -> Result<(Self, u32)> {
        let mut r = Reader::at(ctx.image(), offset);
        let mut commands = Vec::new();
        let end;

        loop {
            if commands.len() as u32 >= MAX_TRACK_COMMANDS {
                return Err(Error::CountTooLarge {
                    what: "track commands",
                    count: commands.len() as u32 + 1,
                    max: MAX_TRACK_COMMANDS,
                });
            }
            let delta = r.i16()?;
            let code = r.i16()?;
            match code {
                CODE_STOP => {
                    end = TrackEnd::Stop;
                    break;
                }
                CODE_LOOP => {
                    let start_index = r.u16()?;
                    let start_time = r.u16()?;
                    end = TrackEnd::Loop {
                        delta,
                        start_index,
                        start_time,
                    };
                    break;
                }
                CODE_REST => commands.push(TrackCommand {
                    delta,
                    action: TrackAction::Rest,
                }),
                code if code >= 0 => {
                    let index = code as u16;
                    if index >= pattern_count {
                        return Err(Error::BadPatternIndex {
                            index,
                            count: pattern_count,
                            offset,
                        });
                    }
                    commands.push(TrackCommand {
                        delta,
                        action: TrackAction::Pattern(index),
                    });
                }
                code => return Err(Error::UnknownTrackCode { code, offset }),
            }
        }

        let track_end = r.pos();
        ctx.note(offset, track_end);
        Ok((
            Self {
                offset,
                commands,
                end,
            },
            track_end,
        ))
    }
}

impl Pattern {
    fn parse(image: &RomImage, offset: u32) -> Result<(Self, u32)> {
        let mut r = Reader::at(image, offset);
        let mut messages = Vec::new();

        loop {
            if messages.len() as u32 >= MAX_PATTERN_MESSAGES {
                return Err(Error::CountTooLarge {
                    what: "pattern messages",
                    count: messages.len() as u32 + 1,
                    max: MAX_PATTERN_MESSAGES,
                });
            }
            let message_offset = r.pos();
            let delta = r.u16()?;
            let note = r.u8()?;
            let velocity = r.u8()?;
            let sustain = r.u16()?;
            let flags = r.u8()?;
            let patch = r.u8()?;
            if flags & !FLAG_KNOWN != 0 {
                return Err(Error::BadMessageFlags {
                    flags,
                    offset: message_offset,
                });
            }
            let is_end = flags & FLAG_END != 0;
            messages.push(Message {
                delta,
                note,
                velocity,
                sustain,
                is_end,
                program_change: flags & FLAG_PROGRAM != 0,
                patch,
            });
            if is_end {
                break;
            }
        }

        Ok((Self { offset, messages }, r.pos()))
    }
}

impl InstrumentTable {
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let mut r = Reader::at(ctx.image(), offset);
        let count = checked_count(&mut r, "instruments", MAX_INSTRUMENTS)?;
        let offsets = pointer_array(&mut r, count)?;
        ctx.note(offset, r.pos());

        let macros = offsets
            .into_iter()
            .map(|offset| Instrument::parse(ctx, offset))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { offset, macros })
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentTable {
    pub offset: u32,
    pub macros: Vec<Instrument>,
}

/// Raw instrument macro bytes; exported verbatim, never interpreted.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub offset: u32,
    pub data: Vec<u8>,
}

impl Instrument {
    fn parse(ctx: &mut ParseContext, offset: u32) -> Result<Self> {
        let mut r = Reader::at(ctx.image(), offset);
        let length = checked_count(&mut r, "instrument bytes", MAX_INSTRUMENT_BYTES)?;
        let data = r.blob(length)?.to_vec();
        ctx.note(offset, r.pos());
        Ok(Self { offset, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RomBuilder;

    #[test]
    fn test_parse_standard_container() {
        let (image, offset) = crate::fixtures::standard_rom();
        let mut ctx = ParseContext::new(&image);
        let container = Container::parse(&mut ctx, offset).unwrap();

        let samples = &container.sample_table.as_ref().unwrap().samples;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].rate, 8000);
        assert_eq!(samples[0].data.len(), 8);

        let songs = &container.song_table.as_ref().unwrap().songs;
        assert_eq!(songs.len(), 1);
        let song = &songs[0].song;
        assert_eq!(song.bpm, 120);
        assert_eq!(song.patterns.len(), 1);
        assert_eq!(song.tracks.len(), TRACK_SLOTS);
        assert_eq!(song.tracks.iter().flatten().count(), 1);

        let track = song.tracks[0].as_ref().unwrap();
        assert_eq!(track.commands.len(), 1);
        assert_eq!(track.commands[0].action, TrackAction::Pattern(0));
        assert_eq!(track.end, TrackEnd::Stop);

        // Two notes plus the end marker
        assert_eq!(song.patterns[0].messages.len(), 3);
        assert!(song.patterns[0].messages[2].is_end);

        let macros = &container.instrument_table.as_ref().unwrap().macros;
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].data, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_song_raw_bytes_cover_parsed_extent() {
        let (image, offset) = crate::fixtures::standard_rom();
        let mut ctx = ParseContext::new(&image);
        let container = Container::parse(&mut ctx, offset).unwrap();
        let entry = &container.song_table.as_ref().unwrap().songs[0];

        // Raw bytes start at the song header and run through the end of
        // its furthest-out pattern.
        let start = entry.offset;
        let end = start + entry.raw.len() as u32;
        let pattern_end = container.song_table.as_ref().unwrap().songs[0]
            .song
            .patterns[0]
            .offset
            + 24;
        assert!(end >= pattern_end);
        assert_eq!(&image.bytes(start, end - start).unwrap(), &entry.raw.as_slice());
    }

    #[test]
    fn test_absent_tables_are_none() {
        let mut rom = RomBuilder::new(0x100);
        // Only a sample table; song and instrument pointers unmapped/null
        rom.ptr(0x10, 0x20);
        rom.word(0x14, 0);
        rom.word(0x18, 0xffff_ffff);
        rom.word(0x20, 1); // one sample
        rom.ptr(0x24, 0x30);
        rom.u16(0x30, 8000);
        rom.word(0x34, 4);

        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        let container = Container::parse(&mut ctx, 0x10).unwrap();
        assert!(container.sample_table.is_some());
        assert!(container.song_table.is_none());
        assert!(container.instrument_table.is_none());
    }

    #[test]
    fn test_absurd_count_is_structural_error() {
        let mut rom = RomBuilder::new(0x100);
        rom.ptr(0x10, 0x20);
        rom.word(0x20, MAX_SAMPLES + 1);

        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, 0x10),
            Err(Error::CountTooLarge { what: "samples", .. })
        ));
    }

    #[test]
    fn test_empty_sample_table_rejected() {
        let mut rom = RomBuilder::new(0x100);
        rom.ptr(0x10, 0x20);
        rom.word(0x20, 0);

        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, 0x10),
            Err(Error::EmptyTable { what: "samples" })
        ));
    }

    #[test]
    fn test_element_pointer_out_of_range_rejected() {
        let mut rom = RomBuilder::new(0x100);
        rom.ptr(0x10, 0x20);
        rom.word(0x20, 1);
        rom.word(0x24, 0x0900_0000); // sample pointer outside the image

        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, 0x10),
            Err(Error::BadPointer { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_index_rejected() {
        let (mut rom, offset) = crate::fixtures::standard_layout();
        // Track references pattern 5; the song declares only one
        rom.i16(0x102, 5);
        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, offset),
            Err(Error::BadPatternIndex { index: 5, count: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_track_code_rejected() {
        let (mut rom, offset) = crate::fixtures::standard_layout();
        rom.i16(0x102, -7);
        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, offset),
            Err(Error::UnknownTrackCode { code: -7, .. })
        ));
    }

    #[test]
    fn test_unknown_message_flags_rejected() {
        let (mut rom, offset) = crate::fixtures::standard_layout();
        rom.u8(0x146, 0x80); // first message flags
        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, offset),
            Err(Error::BadMessageFlags { flags: 0x80, .. })
        ));
    }

    #[test]
    fn test_shared_pattern_offset_parses_once() {
        let (mut rom, offset) = crate::fixtures::standard_layout();
        // Second pattern slot pointing at the same pattern bytes
        rom.u16(0x92, 2);
        rom.ptr(0xdc, 0x140);
        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        let container = Container::parse(&mut ctx, offset).unwrap();
        let song = &container.song_table.as_ref().unwrap().songs[0].song;
        assert_eq!(song.patterns.len(), 2);
        assert_eq!(song.patterns[0].messages, song.patterns[1].messages);
        assert_eq!(ctx.patterns.len(), 1);
    }

    #[test]
    fn test_zero_bpm_rejected() {
        let (mut rom, offset) = crate::fixtures::standard_layout();
        rom.u16(0x90, 0);
        let image = rom.build();
        let mut ctx = ParseContext::new(&image);
        assert!(matches!(
            Container::parse(&mut ctx, offset),
            Err(Error::ZeroField { what: "bpm", .. })
        ));
    }
}
