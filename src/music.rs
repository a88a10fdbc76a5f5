// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use crate::ump::{Category, Ump};

mod merger;
mod splitter;

pub use merger::merge;
pub use splitter::{split, split_with, ChannelClassifier, Classifier, DEFAULT_TRACK_KEY};

/// Marks a SYSEX7 packet as a meta event when it appears as the first data byte.
pub const META_EVENT: u8 = 0xFF;

/// Meta event types understood by the player.
pub mod meta_type {
    pub const TEMPO: u8 = 0x51;
    pub const TIME_SIGNATURE: u8 = 0x58;
}

/// Microseconds per quarter note when nothing else is specified (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Music with every track merged into a single time ordered track.
pub const FORMAT_MERGED: u8 = 0;
/// Music with independent per-key tracks.
pub const FORMAT_SPLIT: u8 = 1;

/// An ordered sequence of packets. Timing is carried by JR timestamp packets in the sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Track {
    messages: Vec<Ump>,
}

impl Track {
    pub fn new(messages: Vec<Ump>) -> Track {
        Track { messages }
    }

    pub fn messages(&self) -> &[Ump] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Ump> {
        self.messages
    }

    pub fn push(&mut self, ump: Ump) {
        self.messages.push(ump);
    }

    pub fn extend<I: IntoIterator<Item = Ump>>(&mut self, umps: I) {
        self.messages.extend(umps);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Iterates the non-timestamp packets paired with their absolute time.
    pub fn timed_events(&self) -> TimedEvents<'_> {
        timed_events(&self.messages)
    }
}

/// A collection of tracks plus the format flag that tells whether they are merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Music {
    tracks: Vec<Track>,
    format: u8,
    delta_time_spec: u32,
}

impl Default for Music {
    fn default() -> Self {
        Music::new()
    }
}

impl Music {
    /// Creates an empty music with the split format.
    pub fn new() -> Music {
        Music {
            tracks: Vec::new(),
            format: FORMAT_SPLIT,
            delta_time_spec: 0,
        }
    }

    /// Creates an empty music with the given format.
    pub fn with_format(format: u8) -> Music {
        Music {
            format,
            ..Music::new()
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn format(&self) -> u8 {
        self.format
    }

    pub fn delta_time_spec(&self) -> u32 {
        self.delta_time_spec
    }

    pub fn set_delta_time_spec(&mut self, delta_time_spec: u32) {
        self.delta_time_spec = delta_time_spec;
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// The total play time. For split music this is the longest track, trailing
    /// timestamps included.
    pub fn total_play_time_milliseconds(&self) -> u64 {
        if self.format == FORMAT_MERGED {
            return self
                .tracks
                .first()
                .map(|track| total_play_time_milliseconds(track.messages()))
                .unwrap_or(0);
        }
        self.tracks
            .iter()
            .map(|track| total_play_time_milliseconds(track.messages()))
            .max()
            .unwrap_or(0)
    }

    /// Meta events of the given type with their absolute times, read from the merged stream.
    pub fn meta_events_of_type(&self, meta_type: u8) -> Vec<(u64, Ump)> {
        if self.format == FORMAT_MERGED {
            return self
                .tracks
                .first()
                .map(|track| meta_events_of_type(track.messages(), meta_type).collect())
                .unwrap_or_default();
        }
        merge(self).meta_events_of_type(meta_type)
    }
}

/// Sums every JR timestamp in the given packets.
pub fn total_play_time_milliseconds(messages: &[Ump]) -> u64 {
    messages
        .iter()
        .map(|ump| u64::from(ump.jr_timestamp_value()))
        .sum()
}

/// Returns true if the packet is a SYSEX7 meta event of any type.
pub fn is_any_meta_event(ump: &Ump) -> bool {
    ump.category() == Category::Sysex7 && ump.midi1_msb() == META_EVENT
}

/// Returns true if the packet is a SYSEX7 meta event of the given type.
pub fn is_meta_event(ump: &Ump, meta_type: u8) -> bool {
    is_any_meta_event(ump) && ump.midi1_lsb() == meta_type
}

/// Reads the tempo out of a tempo meta event. The three tempo bytes lead the second word.
pub fn tempo_of(ump: &Ump) -> Option<u32> {
    is_meta_event(ump, meta_type::TEMPO).then(|| ump.word2() >> 8)
}

/// Reads the four time signature bytes out of a time signature meta event.
pub fn time_signature_of(ump: &Ump) -> Option<[u8; 4]> {
    is_meta_event(ump, meta_type::TIME_SIGNATURE).then(|| ump.word2().to_be_bytes())
}

/// Builds a tempo meta event on the given group.
pub fn tempo_event(group: u8, tempo: u32) -> Ump {
    // Five payload bytes: marker, type, three tempo bytes.
    Ump::new64(
        0x3005_0000
            | (u32::from(group & 0xF) << 24)
            | (u32::from(META_EVENT) << 8)
            | u32::from(meta_type::TEMPO),
        (tempo & 0xFF_FFFF) << 8,
    )
}

/// Builds a time signature meta event on the given group.
pub fn time_signature_event(group: u8, time_signature: [u8; 4]) -> Ump {
    Ump::new64(
        0x3006_0000
            | (u32::from(group & 0xF) << 24)
            | (u32::from(META_EVENT) << 8)
            | u32::from(meta_type::TIME_SIGNATURE),
        u32::from_be_bytes(time_signature),
    )
}

/// Meta events of the given type in the packets, paired with their absolute time.
pub fn meta_events_of_type(messages: &[Ump], meta_type: u8) -> impl Iterator<Item = (u64, Ump)> + '_ {
    timed_events(messages).filter(move |(_, ump)| is_meta_event(ump, meta_type))
}

/// Walks packets, accumulating JR timestamps, and yields every other packet with its absolute time.
pub fn timed_events(messages: &[Ump]) -> TimedEvents<'_> {
    TimedEvents {
        messages: messages.iter(),
        time: 0,
    }
}

/// Iterator returned by [timed_events].
pub struct TimedEvents<'a> {
    messages: std::slice::Iter<'a, Ump>,
    time: u64,
}

impl Iterator for TimedEvents<'_> {
    type Item = (u64, Ump);

    fn next(&mut self) -> Option<(u64, Ump)> {
        for ump in self.messages.by_ref() {
            if ump.is_jr_timestamp() {
                self.time += u64::from(ump.jr_timestamp_value());
                continue;
            }
            return Some((self.time, *ump));
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn note_on(channel: u8) -> Ump {
        Ump::new64(0x4090_3C00 | (u32::from(channel) << 16), 0xC000_0000)
    }

    #[test]
    fn test_total_play_time() {
        let track = Track::new(vec![
            Ump::jr_timestamp(0, 100),
            note_on(0),
            Ump::jr_timestamp(0, 0xFFFF),
            Ump::jr_timestamp(0, 5),
            note_on(1),
            Ump::jr_timestamp(0, 20),
        ]);
        let mut music = Music::with_format(FORMAT_MERGED);
        music.add_track(track);

        assert_eq!(100 + 0xFFFF + 5 + 20, music.total_play_time_milliseconds());
    }

    #[test]
    fn test_total_play_time_empty() {
        assert_eq!(0, Music::with_format(FORMAT_MERGED).total_play_time_milliseconds());
        assert_eq!(0, Music::new().total_play_time_milliseconds());
    }

    #[test]
    fn test_total_play_time_split_music_uses_longest_track() {
        let mut music = Music::new();
        music.add_track(Track::new(vec![Ump::jr_timestamp(0, 300), note_on(0)]));
        music.add_track(Track::new(vec![Ump::jr_timestamp(0, 100), note_on(1)]));

        assert_eq!(300, music.total_play_time_milliseconds());
    }

    #[test]
    fn test_total_play_time_split_music_keeps_end_padding() {
        let mut music = Music::new();
        music.add_track(Track::new(vec![note_on(0), Ump::jr_timestamp(0, 1000)]));
        music.add_track(Track::new(vec![Ump::jr_timestamp(0, 200), note_on(1)]));

        assert_eq!(1000, music.total_play_time_milliseconds());
        // Merging drops the padding, the split total doesn't.
        assert_eq!(200, merge(&music).total_play_time_milliseconds());
    }

    #[test]
    fn test_timed_events() {
        let messages = vec![
            note_on(0),
            Ump::jr_timestamp(0, 10),
            note_on(1),
            note_on(2),
            Ump::jr_timestamp(0, 5),
            Ump::jr_timestamp(0, 5),
            note_on(3),
        ];
        let times: Vec<(u64, u8)> = timed_events(&messages)
            .map(|(time, ump)| (time, ump.channel_in_group()))
            .collect();
        assert_eq!(vec![(0, 0), (10, 1), (10, 2), (20, 3)], times);
    }

    #[test]
    fn test_meta_events() {
        let tempo = tempo_event(2, 400_000);
        let signature = time_signature_event(0, [3, 2, 24, 8]);
        let mut music = Music::with_format(FORMAT_MERGED);
        music.add_track(Track::new(vec![
            tempo_event(0, DEFAULT_TEMPO),
            note_on(0),
            Ump::jr_timestamp(0, 480),
            signature,
            tempo,
        ]));

        let tempos = music.meta_events_of_type(meta_type::TEMPO);
        assert_eq!(2, tempos.len());
        assert_eq!(Some(DEFAULT_TEMPO), tempo_of(&tempos[0].1));
        assert_eq!((480, tempo), tempos[1]);
        assert_eq!(Some(400_000), tempo_of(&tempo));
        assert_eq!(2, tempo.group());

        assert_eq!(
            vec![(480, signature)],
            music.meta_events_of_type(meta_type::TIME_SIGNATURE)
        );
        assert_eq!(Some([3, 2, 24, 8]), time_signature_of(&signature));
        assert_eq!(None, tempo_of(&signature));
        assert_eq!(None, tempo_of(&note_on(0)));

        assert!(is_any_meta_event(&tempo));
        assert!(is_any_meta_event(&signature));
        assert!(!is_meta_event(&signature, meta_type::TEMPO));
        assert!(!is_any_meta_event(&note_on(0)));
        // A SYSEX7 packet without the meta marker is plain system exclusive.
        assert!(!is_any_meta_event(&Ump::new64(0x3016_7E7F, 0x0901_0000)));
    }
}
