//! Playback queue with linear and shuffled navigation.
//!
//! The queue keeps tracks in insertion order. While shuffle is enabled it
//! also keeps a permutation of queue indices that drives next/previous; the
//! track order itself never changes.

use {
    rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom},
    tracing::debug,
};

use crate::library::Track;

/// Ordered list of tracks plus the navigation cursor.
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    /// Tracks in insertion order.
    tracks: Vec<Track>,
    /// Copy of the queue as it was handed in, mutated in lockstep.
    original: Vec<Track>,
    /// Index of the current track; 0 when the queue is empty.
    current_index: usize,
    /// Whether navigation follows `shuffle_order`.
    shuffle_enabled: bool,
    /// Permutation of `0..tracks.len()` while shuffle is enabled, empty otherwise.
    shuffle_order: Vec<usize>,
    rng: SmallRng,
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::with_rng(SmallRng::from_rng(&mut rand::rng()))
    }
}

impl PlaybackQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue whose shuffles are reproducible.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            tracks: Vec::new(),
            original: Vec::new(),
            current_index: 0,
            shuffle_enabled: false,
            shuffle_order: Vec::new(),
            rng,
        }
    }

    /// Tracks in queue order.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The queue as originally supplied, before any navigation.
    #[must_use]
    pub fn original(&self) -> &[Track] {
        &self.original
    }

    /// Number of queued tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the queue holds no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Index of the current track.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The track at the current index, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    /// The track at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Mutable access to every queued copy of the track with `id`.
    pub fn tracks_with_id_mut<'a>(&'a mut self, id: &'a str) -> impl Iterator<Item = &'a mut Track> {
        self.tracks.iter_mut().filter(move |track| track.id == id)
    }

    /// Whether shuffle navigation is active.
    #[must_use]
    pub fn is_shuffled(&self) -> bool {
        self.shuffle_enabled
    }

    /// Current shuffle permutation (empty when shuffle is off).
    #[must_use]
    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle_order
    }

    /// Moves the cursor to `index`, clamped to the queue bounds.
    pub fn set_current_index(&mut self, index: usize) {
        self.current_index = index.min(self.tracks.len().saturating_sub(1));
    }

    /// Replaces the queue and positions the cursor at `start_index`.
    ///
    /// `start_index` is clamped to the last valid index.
    pub fn set_tracks(&mut self, tracks: Vec<Track>, start_index: usize) {
        debug!("PlaybackQueue: Setting queue with {} tracks", tracks.len());
        self.original = tracks.clone();
        self.tracks = tracks;
        self.set_current_index(start_index);
        self.refresh_shuffle();
    }

    /// Appends a track to the end of the queue.
    pub fn push(&mut self, track: Track) {
        self.original.push(track.clone());
        self.tracks.push(track);
        self.refresh_shuffle();
    }

    /// Removes the track at `index`, keeping the cursor on a valid track.
    ///
    /// Removing an entry before the cursor shifts it down by one. Removing
    /// the current entry leaves the cursor on the track that followed it, or
    /// on the new last track.
    ///
    /// # Returns
    ///
    /// The removed track, or `None` if `index` was out of range.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        let removed = self.tracks.remove(index);
        if index < self.original.len() {
            self.original.remove(index);
        }

        if index < self.current_index {
            self.current_index -= 1;
        } else {
            self.set_current_index(self.current_index);
        }

        self.refresh_shuffle();
        Some(removed)
    }

    /// Empties the queue and resets the cursor.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.original.clear();
        self.shuffle_order.clear();
        self.current_index = 0;
    }

    /// Turns shuffle navigation on or off.
    ///
    /// Turning it on generates a fresh permutation with the current track first.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle_enabled = enabled;
        self.refresh_shuffle();
    }

    /// Regenerates the permutation if shuffle is on, drops it otherwise.
    fn refresh_shuffle(&mut self) {
        if self.shuffle_enabled {
            self.regenerate_shuffle();
        } else {
            self.shuffle_order.clear();
        }
    }

    /// Fisher-Yates shuffle of all queue indices, then swaps the current
    /// index into the first slot.
    pub fn regenerate_shuffle(&mut self) {
        self.shuffle_order = (0..self.tracks.len()).collect();
        self.shuffle_order.shuffle(&mut self.rng);

        if let Some(pos) = self.position_in_shuffle(self.current_index)
            && pos != 0
        {
            self.shuffle_order.swap(0, pos);
        }
    }

    fn position_in_shuffle(&self, index: usize) -> Option<usize> {
        self.shuffle_order.iter().position(|&i| i == index)
    }

    /// Queue index that follows the current one, or `None` if the queue is empty.
    ///
    /// Linear order wraps from the last index to 0. Shuffle order walks the
    /// permutation cyclically.
    #[must_use]
    pub fn next_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if self.shuffle_enabled && self.shuffle_order.len() == len {
            let pos = self.position_in_shuffle(self.current_index).unwrap_or(0);
            return self.shuffle_order.get((pos + 1) % len).copied();
        }

        Some((self.current_index + 1) % len)
    }

    /// Queue index that precedes the current one, or `None` if the queue is empty.
    #[must_use]
    pub fn previous_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if self.shuffle_enabled && self.shuffle_order.len() == len {
            let pos = self.position_in_shuffle(self.current_index).unwrap_or(0);
            return self.shuffle_order.get((pos + len - 1) % len).copied();
        }

        Some(if self.current_index == 0 {
            len - 1
        } else {
            self.current_index - 1
        })
    }
}
