// MIDI output from scores.
//
// Converts a Score's token stream into a Standard MIDI File (SMF Format 1).
// Track 0 holds the tempo; each voice that appears in the stream gets its own
// track and channel. Layers of a voice share that track but keep separate
// time cursors, mirroring how the token stream is read. `X<n>=<v>` tokens
// become control changes and `I<n>` tokens program changes.
//
// Channel 9 is percussion in General MIDI, so voices 9 and up shift one
// channel higher (voices 14 and 15 share channel 15).
//
// Uses the `midly` crate for MIDI writing.

use crate::error::Result;
use crate::score::{Score, TICKS_PER_WHOLE, Token};
use log::debug;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::BTreeMap;
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// MIDI ticks per score tick (a 128th note).
const TICK_SCALE: u32 = TICKS_PER_QUARTER as u32 / (TICKS_PER_WHOLE / 4);

const VELOCITY: u8 = 80;

const VOICE_NAMES: [&str; 16] = [
    "Voice 0", "Voice 1", "Voice 2", "Voice 3", "Voice 4", "Voice 5", "Voice 6", "Voice 7",
    "Voice 8", "Voice 9", "Voice 10", "Voice 11", "Voice 12", "Voice 13", "Voice 14", "Voice 15",
];

/// Convert a score to MIDI and write it to a file.
pub fn write_midi(score: &Score, path: &Path) -> Result<()> {
    let smf = score_to_smf(score);
    smf.save(path)?;
    debug!("wrote {} MIDI tracks to {}", smf.tracks.len(), path.display());
    Ok(())
}

/// Channel for a voice, skipping the percussion channel.
pub fn channel_for(voice: u8) -> u8 {
    if voice < 9 { voice } else { (voice + 1).min(15) }
}

/// Sort rank of simultaneous events: releases first, then setup, then
/// attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    NoteOff,
    Program,
    Control,
    NoteOn,
}

struct TimedEvent {
    tick: u32,
    rank: Rank,
    message: MidiMessage,
}

/// Convert a score to an in-memory SMF.
pub fn score_to_smf(score: &Score) -> Smf<'static> {
    let mut voices: BTreeMap<u8, Vec<TimedEvent>> = BTreeMap::new();
    let mut tempo_changes: Vec<(u32, u32)> = Vec::new();
    let mut cursors: BTreeMap<(u8, u8), u32> = BTreeMap::new();
    let mut voice_layers: BTreeMap<u8, u8> = BTreeMap::new();
    let mut line = (0u8, 0u8);

    for token in score.tokens() {
        let now = cursors.get(&line).copied().unwrap_or(0);
        let voice = line.0;
        let mut emit = |rank: Rank, tick: u32, message: MidiMessage| {
            voices.entry(voice).or_default().push(TimedEvent {
                tick,
                rank,
                message,
            });
        };
        match *token {
            Token::Tempo(bpm) => tempo_changes.push((now, bpm)),
            Token::Voice(v) => line = (v, voice_layers.get(&v).copied().unwrap_or(0)),
            Token::Layer(l) => {
                line.1 = l;
                voice_layers.insert(line.0, l);
            }
            Token::Instrument(program) => emit(
                Rank::Program,
                now,
                MidiMessage::ProgramChange {
                    program: u7::new(program.min(127)),
                },
            ),
            Token::Control { controller, value } => emit(
                Rank::Control,
                now,
                MidiMessage::Controller {
                    controller: u7::new(controller.min(127)),
                    value: u7::new(value.clamp(0, 127) as u8),
                },
            ),
            Token::Note { pitch, ticks } => {
                let key = u7::new(pitch.min(127));
                emit(
                    Rank::NoteOn,
                    now,
                    MidiMessage::NoteOn {
                        key,
                        vel: u7::new(VELOCITY),
                    },
                );
                emit(
                    Rank::NoteOff,
                    now + ticks,
                    MidiMessage::NoteOff {
                        key,
                        vel: u7::new(0),
                    },
                );
                cursors.insert(line, now + ticks);
            }
            Token::Rest { ticks } => {
                cursors.insert(line, now + ticks);
            }
            Token::Bar => {}
        }
    }

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    smf.tracks.push(tempo_track(&tempo_changes, score.tempo));
    for (voice, mut events) in voices {
        smf.tracks.push(voice_track(voice, &mut events));
    }
    smf
}

fn tempo_track(changes: &[(u32, u32)], default_bpm: u32) -> Track<'static> {
    let mut track: Track<'static> = Vec::new();
    let mut last = 0;
    let changes: Vec<(u32, u32)> = if changes.is_empty() {
        vec![(0, default_bpm)]
    } else {
        changes.to_vec()
    };
    for (tick, bpm) in changes {
        let tick = tick * TICK_SCALE;
        let micros = 60_000_000 / bpm.max(1);
        track.push(TrackEvent {
            delta: u28::new(tick.saturating_sub(last)),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
        });
        last = last.max(tick);
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn voice_track(voice: u8, events: &mut [TimedEvent]) -> Track<'static> {
    let channel = u4::new(channel_for(voice));
    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(
            VOICE_NAMES[voice as usize % 16].as_bytes(),
        )),
    });

    events.sort_by_key(|e| (e.tick, e.rank));
    let mut last = 0;
    for event in events.iter() {
        let tick = event.tick * TICK_SCALE;
        track.push(TrackEvent {
            delta: u28::new(tick - last),
            kind: TrackEventKind::Midi {
                channel,
                message: event.message,
            },
        });
        last = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    fn midi_events(track: &Track<'_>) -> Vec<(u32, MidiMessage)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for event in track {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { message, .. } = event.kind {
                out.push((tick, message));
            }
        }
        out
    }

    #[test]
    fn single_voice_track() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(60, 32, true);
        score.add_rest(16);
        score.add_note(64, 16, true);

        let smf = score_to_smf(&score);
        assert_eq!(smf.tracks.len(), 2);
        let events = midi_events(&smf.tracks[1]);
        assert_eq!(
            events,
            vec![
                (0, MidiMessage::ProgramChange { program: u7::new(80) }),
                (0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(80) }),
                (480, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) }),
                (720, MidiMessage::NoteOn { key: u7::new(64), vel: u7::new(80) }),
                (960, MidiMessage::NoteOff { key: u7::new(64), vel: u7::new(0) }),
            ]
        );
    }

    #[test]
    fn tempo_track_uses_score_tempo() {
        let score = Score::new(Key::C, 100, 80);
        let smf = score_to_smf(&score);
        assert!(matches!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 600_000
        ));
    }

    #[test]
    fn layers_share_a_track_with_their_own_time() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(60, 32, true);
        score.switch_layer(1);
        score.add_note(67, 16, true);
        let smf = score_to_smf(&score);
        assert_eq!(smf.tracks.len(), 2);
        let on_ticks: Vec<u32> = midi_events(&smf.tracks[1])
            .into_iter()
            .filter(|(_, m)| matches!(m, MidiMessage::NoteOn { .. }))
            .map(|(t, _)| t)
            .collect();
        assert_eq!(on_ticks, vec![0, 0]);
    }

    #[test]
    fn voices_get_tracks_and_channels() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(60, 16, true);
        score.switch_voice(13);
        score.push(Token::Instrument(87));
        score.add_note(48, 16, false);
        score.add_control(1, 61);
        let smf = score_to_smf(&score);
        assert_eq!(smf.tracks.len(), 3);
        let channels: Vec<u8> = smf.tracks[2]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { channel, .. } => Some(channel.as_int()),
                _ => None,
            })
            .collect();
        assert!(channels.iter().all(|&c| c == 14));
        assert!(midi_events(&smf.tracks[2]).iter().any(|(_, m)| matches!(
            m,
            MidiMessage::Controller { controller, value }
                if controller.as_int() == 1 && value.as_int() == 61
        )));
    }

    #[test]
    fn channels_skip_percussion() {
        assert_eq!(channel_for(0), 0);
        assert_eq!(channel_for(8), 8);
        assert_eq!(channel_for(9), 10);
        assert_eq!(channel_for(15), 15);
    }

    #[test]
    fn write_and_parse_back() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(60, 16, true);
        let path = std::env::temp_dir().join("fractune_midi_roundtrip_test.mid");
        write_midi(&score, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
