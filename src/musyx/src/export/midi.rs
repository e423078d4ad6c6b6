//! Flattened song to Standard MIDI File conversion
//!
//! Format 1, one MIDI track per playable channel, division fixed at 96
//! ticks per quarter so the flattened time unit carries over without
//! rescaling. Each MIDI track opens with the song tempo; a note message
//! becomes a note-on at its event time and a note-off at event time plus
//! sustain.

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::container::Song;
use crate::flatten::FlatTrack;
use crate::Result;

/// Fixed tick resolution shared with the flattener's time unit.
pub const TICKS_PER_QUARTER: u16 = 96;

/// Channels 0-15; the 17th track slot has no MIDI equivalent.
pub const MIDI_CHANNELS: usize = 16;

/// Velocity used for note-off events.
const NOTE_OFF_VELOCITY: u8 = 127;

/// Encode a song's flattened tracks as a format 1 SMF.
pub fn song_midi_bytes(song: &Song, flat: &[Option<FlatTrack>]) -> Result<Vec<u8>> {
    // Tempo meta events are 24-bit; BPM below 4 would overflow
    let tempo = (60_000_000 / u32::from(song.bpm)).min(0x00ff_ffff);
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    for (channel, slot) in flat.iter().take(MIDI_CHANNELS).enumerate() {
        if let Some(track) = slot {
            smf.tracks.push(midi_track(track, channel as u8, tempo));
        }
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

// TODO: emit the recovered loop-return time as a cue-point meta event
// once downstream players agree on a representation.
fn midi_track(track: &FlatTrack, channel: u8, tempo: u32) -> Vec<TrackEvent<'static>> {
    let channel = u4::new(channel);
    let mut absolute: Vec<(u32, TrackEventKind)> =
        vec![(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))))];

    for event in &track.events {
        let Some(message) = &event.message else {
            continue;
        };
        if message.program_change {
            absolute.push((
                event.time,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new(message.patch & 0x7f),
                    },
                },
            ));
        }
        if message.note != 0 {
            let key = u7::new(message.note & 0x7f);
            absolute.push((
                event.time,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key,
                        vel: u7::new(message.velocity & 0x7f),
                    },
                },
            ));
            absolute.push((
                event.time + u32::from(message.sustain),
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key,
                        vel: u7::new(NOTE_OFF_VELOCITY),
                    },
                },
            ));
        }
    }

    absolute.sort_by_key(|&(time, _)| time);

    let mut events = Vec::with_capacity(absolute.len() + 1);
    let mut last = 0u32;
    for (time, kind) in absolute {
        events.push(TrackEvent {
            delta: u28::new(time - last),
            kind,
        });
        last = time;
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Message, Pattern, Track, TrackAction, TrackCommand, TrackEnd};
    use crate::flatten::flatten_song;

    fn note(delta: u16, note: u8) -> Message {
        Message {
            delta,
            note,
            velocity: 100,
            sustain: 24,
            is_end: false,
            program_change: false,
            patch: 0,
        }
    }

    fn test_song() -> Song {
        let pattern = Pattern {
            offset: 0,
            messages: vec![
                note(0, 60),
                note(12, 64),
                Message {
                    delta: 0,
                    note: 0,
                    velocity: 0,
                    sustain: 0,
                    is_end: true,
                    program_change: false,
                    patch: 0,
                },
            ],
        };
        let track = Track {
            offset: 0,
            commands: vec![TrackCommand {
                delta: 0,
                action: TrackAction::Pattern(0),
            }],
            end: TrackEnd::Stop,
        };
        let mut tracks = vec![None; 17];
        tracks[0] = Some(track);
        Song {
            bpm: 120,
            tracks,
            patterns: vec![pattern],
        }
    }

    #[test]
    fn test_midi_header_fields() {
        let song = test_song();
        let flat = flatten_song(&song).unwrap();
        let bytes = song_midi_bytes(&song, &flat).unwrap();

        assert_eq!(&bytes[0..4], b"MThd");
        // Format 1, one track, division 96
        assert_eq!(&bytes[8..10], &[0x00, 0x01]);
        assert_eq!(&bytes[10..12], &[0x00, 0x01]);
        assert_eq!(&bytes[12..14], &[0x00, 96]);
    }

    #[test]
    fn test_midi_parses_back_with_tempo_and_notes() {
        let song = test_song();
        let flat = flatten_song(&song).unwrap();
        let bytes = song_midi_bytes(&song, &flat).unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        let track = &smf.tracks[0];

        // 120 BPM -> 500000 us per beat
        assert!(track.iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t == u24::new(500_000)
        )));

        let note_ons = track
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
            .count();
        let note_offs = track
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. }))
            .count();
        assert_eq!(note_ons, 2);
        assert_eq!(note_offs, 2);
    }

    #[test]
    fn test_deltas_encode_absolute_times() {
        let song = test_song();
        let flat = flatten_song(&song).unwrap();
        let bytes = song_midi_bytes(&song, &flat).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        // Note-on times: 0 and 12; offs at 24 and 36 (sustain 24)
        let mut time = 0u32;
        let mut on_times = Vec::new();
        let mut off_times = Vec::new();
        for event in &smf.tracks[0] {
            time += event.delta.as_int();
            match event.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. } => {
                    on_times.push(time);
                }
                TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. } => {
                    off_times.push(time);
                }
                _ => {}
            }
        }
        assert_eq!(on_times, vec![0, 12]);
        assert_eq!(off_times, vec![24, 36]);
    }

    #[test]
    fn test_seventeenth_slot_not_exported() {
        let mut song = test_song();
        song.tracks[16] = song.tracks[0].clone();
        let flat = flatten_song(&song).unwrap();
        let bytes = song_midi_bytes(&song, &flat).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
    }
}
