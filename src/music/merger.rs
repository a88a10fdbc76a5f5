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
use tracing::debug;

use super::{Music, Track, FORMAT_MERGED};
use crate::ump::Ump;

/// Merges every track of the given music into a single, time ordered track.
///
/// Events are sorted in chunks: a chunk is a run of consecutive events, in source track
/// order, that share an absolute time. Sorting the chunks rather than the events
/// keeps simultaneous events in their original order, so a program change followed by
/// a note on at the same instant is never swapped.
pub fn merge(source: &Music) -> Music {
    let events: Vec<(u64, Ump)> = source
        .tracks()
        .iter()
        .flat_map(|track| track.timed_events())
        .collect();

    if events.is_empty() {
        return Music::new();
    }

    let mut chunks: Vec<&[(u64, Ump)]> = events.chunk_by(|a, b| a.0 == b.0).collect();
    // Stable, so equal times keep track order.
    chunks.sort_by_key(|chunk| chunk[0].0);

    let mut track = Track::default();
    let mut time = 0u64;
    for &(event_time, ump) in chunks.into_iter().flatten() {
        if event_time > time {
            track.extend(timestamps_between(&ump, event_time - time));
            time = event_time;
        }
        track.push(ump);
    }

    debug!(
        tracks = source.tracks().len(),
        events = events.len(),
        merged = track.len(),
        "Merged tracks."
    );

    let mut music = Music::with_format(FORMAT_MERGED);
    music.set_delta_time_spec(source.delta_time_spec());
    music.add_track(track);
    music
}

/// JR timestamps covering the given gap, split so that each fits the 32-bit delta range.
pub(super) fn timestamps_between(ump: &Ump, delta: u64) -> impl Iterator<Item = Ump> {
    let group = ump.group();
    let mut remaining = delta;
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let chunk = remaining.min(u64::from(u32::MAX));
        remaining -= chunk;
        Some(chunk as u32)
    })
    .flat_map(move |chunk| Ump::new(u32::from(group) << 24).timestamps_for(chunk))
}
