//! Track flattening
//!
//! Songs store each channel as pattern references with relative timing, a
//! compression scheme that lets tracks and songs share motifs. Standard
//! output formats want one absolute-time event list per channel, so every
//! reference is expanded here before export. Loop markers have no
//! equivalent in those formats either; the recovered loop-return time is
//! surfaced as metadata for the caller to use or ignore.

use crate::container::{Message, Song, Track, TrackAction, TrackEnd};
use crate::{Error, Result};

/// One flattened event: an absolute time and the message that fires
/// there, or None for a bare rest advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEvent {
    pub time: u32,
    pub message: Option<Message>,
}

/// A fully expanded track timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTrack {
    pub events: Vec<FlatEvent>,
    /// Absolute time playback returns to, when the track loops.
    pub loop_time: Option<u32>,
}

/// Flatten every track slot of a song. Empty slots stay empty.
pub fn flatten_song(song: &Song) -> Result<Vec<Option<FlatTrack>>> {
    song.tracks
        .iter()
        .map(|slot| slot.as_ref().map(|track| flatten_track(song, track)).transpose())
        .collect()
}

/// Flatten one track against its song's pattern pool.
///
/// Cumulative track time advances by each command's delta; pattern
/// playback runs a second clock seeded at the track time. Absolute times
/// must never fall below the largest time already produced; a command
/// that would do so reports [`Error::TimeRegression`].
pub fn flatten_track(song: &Song, track: &Track) -> Result<FlatTrack> {
    let mut events = Vec::new();
    // Cumulative time per command, kept for loop-point recovery.
    let mut command_times = Vec::with_capacity(track.commands.len() + 1);
    let mut track_time: u32 = 0;
    let mut high_water: u32 = 0;

    for command in &track.commands {
        track_time = advance(track_time, command.delta, high_water, track.offset)?;
        command_times.push(track_time);
        high_water = high_water.max(track_time);

        match command.action {
            TrackAction::Rest => events.push(FlatEvent {
                time: track_time,
                message: None,
            }),
            TrackAction::Pattern(index) => {
                let pattern =
                    song.patterns
                        .get(index as usize)
                        .ok_or(Error::BadPatternIndex {
                            index,
                            count: song.patterns.len() as u16,
                            offset: track.offset,
                        })?;
                let mut event_time = track_time;
                for message in &pattern.messages {
                    if message.is_end {
                        continue;
                    }
                    event_time += u32::from(message.delta);
                    events.push(FlatEvent {
                        time: event_time,
                        message: Some(*message),
                    });
                }
                high_water = high_water.max(event_time);
            }
        }
    }

    let loop_time = match track.end {
        TrackEnd::Stop => None,
        TrackEnd::Loop {
            delta,
            start_index,
            start_time,
        } => {
            track_time = advance(track_time, delta, high_water, track.offset)?;
            command_times.push(track_time);
            let start = *command_times
                .get(usize::from(start_index))
                .ok_or(Error::LoopStartOutOfRange {
                    index: start_index,
                    len: command_times.len(),
                })?;
            Some(start + u32::from(start_time))
        }
    };

    Ok(FlatTrack { events, loop_time })
}

fn advance(time: u32, delta: i16, high_water: u32, offset: u32) -> Result<u32> {
    let next = i64::from(time) + i64::from(delta);
    if next < i64::from(high_water) {
        return Err(Error::TimeRegression {
            offset,
            time: next,
            floor: high_water,
        });
    }
    Ok(next as u32)
}
