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
use std::collections::BTreeMap;

use tracing::debug;

use super::{merger::timestamps_between, Music, Track, FORMAT_SPLIT};
use crate::ump::Ump;

/// The key of the track that always exists in split music.
pub const DEFAULT_TRACK_KEY: i32 = -1;

/// Decides which track a packet belongs to when splitting.
pub trait Classifier {
    fn track_key(&self, ump: &Ump) -> i32;
}

/// Splits by group and channel, giving one track per channel of every group.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelClassifier;

impl Classifier for ChannelClassifier {
    fn track_key(&self, ump: &Ump) -> i32 {
        i32::from(ump.group_and_channel())
    }
}

impl<F> Classifier for F
where
    F: Fn(&Ump) -> i32,
{
    fn track_key(&self, ump: &Ump) -> i32 {
        self(ump)
    }
}

/// A track under construction along with the absolute time of its last event.
struct SplitTrack {
    current_time: u64,
    track: Track,
}

impl SplitTrack {
    fn new() -> SplitTrack {
        SplitTrack {
            current_time: 0,
            track: Track::default(),
        }
    }

    fn add_message(&mut self, time: u64, ump: Ump) {
        if time > self.current_time {
            self.track
                .extend(timestamps_between(&ump, time - self.current_time));
            self.current_time = time;
        }
        self.track.push(ump);
    }
}

/// Splits the packets into one track per group and channel.
pub fn split(source: &[Ump]) -> Music {
    split_with(source, &ChannelClassifier)
}

/// Splits the packets into tracks keyed by the given classifier. Tracks come out in key
/// order, starting with the default track.
pub fn split_with<C: Classifier + ?Sized>(source: &[Ump], classifier: &C) -> Music {
    let mut tracks: BTreeMap<i32, SplitTrack> = BTreeMap::new();
    tracks.insert(DEFAULT_TRACK_KEY, SplitTrack::new());

    let mut time = 0u64;
    for ump in source {
        if ump.is_jr_timestamp() {
            time += u64::from(ump.jr_timestamp_value());
            continue;
        }
        tracks
            .entry(classifier.track_key(ump))
            .or_insert_with(SplitTrack::new)
            .add_message(time, *ump);
    }

    debug!(tracks = tracks.len(), "Split track.");

    let mut music = Music::with_format(FORMAT_SPLIT);
    for split_track in tracks.into_values() {
        music.add_track(split_track.track);
    }
    music
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::music::merge;
    use crate::ump::{event_type, Category};

    fn note(group: u8, channel: u8, note: u8) -> Ump {
        Ump::new64(
            0x4090_0000
                | (u32::from(group) << 24)
                | (u32::from(channel) << 16)
                | (u32::from(note) << 8),
            0x8000_0000,
        )
    }

    fn control(channel: u8, index: u8) -> Ump {
        Ump::new64(
            0x40B0_0000 | (u32::from(channel) << 16) | (u32::from(index) << 8),
            0,
        )
    }

    fn ts(delta: u32) -> Ump {
        Ump::jr_timestamp(0, delta)
    }

    #[test]
    fn test_split_empty_has_default_track() {
        let music = split(&[]);
        assert_eq!(FORMAT_SPLIT, music.format());
        assert_eq!(1, music.tracks().len());
        assert!(music.tracks()[0].is_empty());
    }

    #[test]
    fn test_split_by_channel() {
        let source = vec![
            note(0, 0, 1),
            ts(10),
            note(0, 1, 2),
            ts(20),
            note(0, 0, 3),
            note(1, 0, 4),
        ];
        let music = split(&source);

        // Default track, then group 0 channel 0, group 0 channel 1, group 1 channel 0.
        assert_eq!(4, music.tracks().len());
        assert!(music.tracks()[0].is_empty());
        assert_eq!(
            &[note(0, 0, 1), ts(30), note(0, 0, 3)],
            music.tracks()[1].messages()
        );
        assert_eq!(&[ts(10), note(0, 1, 2)], music.tracks()[2].messages());

        let last = music.tracks()[3].messages();
        assert_eq!(2, last.len());
        assert_eq!(30, last[0].jr_timestamp_value());
        assert_eq!(note(1, 0, 4), last[1]);
    }

    #[test]
    fn test_split_tracks_are_self_consistent() {
        let source = vec![
            ts(5),
            note(0, 2, 1),
            ts(70_000),
            control(3, 7),
            ts(1),
            note(0, 2, 2),
        ];
        let expected: HashMap<u8, Vec<(u64, Ump)>> = HashMap::from([
            (2, vec![(5, note(0, 2, 1)), (70_006, note(0, 2, 2))]),
            (3, vec![(70_005, control(3, 7))]),
        ]);

        let music = split(&source);
        for track in music.tracks().iter().skip(1) {
            let events: Vec<(u64, Ump)> = track.timed_events().collect();
            let channel = events[0].1.channel_in_group();
            assert_eq!(expected[&channel], events);
        }
    }

    #[test]
    fn test_split_custom_classifier() {
        let classifier = |ump: &Ump| {
            if ump.category() == Category::Midi2
                && matches!(ump.event_type(), event_type::NOTE_ON | event_type::NOTE_OFF)
            {
                1
            } else {
                DEFAULT_TRACK_KEY
            }
        };
        let source = vec![control(0, 7), ts(10), note(0, 0, 60), control(1, 10)];
        let music = split_with(&source, &classifier);

        assert_eq!(2, music.tracks().len());
        assert_eq!(
            &[control(0, 7), ts(10), control(1, 10)],
            music.tracks()[0].messages()
        );
        assert_eq!(&[ts(10), note(0, 0, 60)], music.tracks()[1].messages());
    }

    #[test]
    fn test_and_combined_key_collapses_channels() {
        // Combining group and channel with AND puts every channel of a group into one
        // track, which is why the default key uses OR.
        let and_key = |ump: &Ump| i32::from((ump.group() << 4) & ump.channel_in_group());
        let source = vec![note(0, 0, 1), note(0, 5, 2), note(3, 9, 3)];

        assert_eq!(2, split_with(&source, &and_key).tracks().len());
        assert_eq!(4, split(&source).tracks().len());
    }

    #[test]
    fn test_split_merge_round_trip() {
        let mut original = Music::new();
        original.add_track(Track::new(vec![
            note(0, 0, 1),
            ts(48),
            note(0, 0, 2),
            ts(100),
            note(0, 0, 3),
        ]));
        original.add_track(Track::new(vec![
            control(1, 7),
            ts(48),
            note(0, 1, 4),
            note(0, 1, 5),
            ts(0x1_0000),
            note(0, 1, 6),
        ]));
        original.add_track(Track::new(vec![ts(20), note(2, 4, 7)]));
        let merged = merge(&original);
        let merged_messages = merged.tracks()[0].messages();

        let round_trip = merge(&split(merged_messages));
        let round_trip_messages = round_trip.tracks()[0].messages();

        let mut expected: Vec<(u64, Ump)> = merged.tracks()[0].timed_events().collect();
        let mut actual: Vec<(u64, Ump)> = round_trip.tracks()[0].timed_events().collect();

        // Per key order holds.
        for key in [0x00u8, 0x01, 0x24] {
            let by_key = |events: &Vec<(u64, Ump)>| {
                events
                    .iter()
                    .filter(|(_, ump)| ump.group_and_channel() == key)
                    .copied()
                    .collect::<Vec<_>>()
            };
            assert_eq!(by_key(&expected), by_key(&actual));
        }

        // Same multiset of timed packets.
        let sort_key = |event: &(u64, Ump)| (event.0, event.1.word1(), event.1.word2());
        expected.sort_by_key(sort_key);
        actual.sort_by_key(sort_key);
        assert_eq!(expected, actual);

        assert_eq!(
            merged.total_play_time_milliseconds(),
            round_trip.total_play_time_milliseconds()
        );
        assert_eq!(
            merged_messages.iter().filter(|ump| !ump.is_jr_timestamp()).count(),
            round_trip_messages
                .iter()
                .filter(|ump| !ump.is_jr_timestamp())
                .count()
        );
    }
}
