//! Playback controller: queue, transport and observer plumbing.
//!
//! The `PlaybackController` owns the single sound slot, the queue and the
//! player settings. Every mutation rebuilds a [`PlayerState`] snapshot and
//! hands it to all observers before the operation returns.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering::SeqCst},
    },
    time::SystemTime,
};

use {
    async_channel::Receiver,
    parking_lot::Mutex,
    tokio::{
        runtime::Handle,
        select,
        sync::broadcast::{self, Sender},
        time::{Duration, MissedTickBehavior, interval},
    },
    tracing::{debug, warn},
};

use crate::{
    audio::{
        engine::{AudioEngine, AudioError, Sound, SoundConfig},
        queue::PlaybackQueue,
        sleep_timer::SleepTimer,
    },
    config::{PlayerSettings, SettingsManager},
    error::{ErrorReporter, PlayerError, Result},
    library::Track,
    state::{ListenerRegistry, PlayerState, RepeatMode, Subscription, restarts_current_track},
};

/// Interval between position polls while playing.
pub const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Distance from the end at which a polled track counts as finished.
pub const TRACK_END_TOLERANCE_MS: u64 = 100;

/// Capacity of the snapshot broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Mutable controller fields. Never held across an `.await`.
#[derive(Debug)]
struct Session {
    current_track: Option<Track>,
    is_playing: bool,
    is_paused: bool,
    is_loading: bool,
    position_ms: u64,
    duration_ms: u64,
    volume: f32,
    is_muted: bool,
    repeat_mode: RepeatMode,
    playback_speed: f32,
    crossfade_enabled: bool,
    crossfade_duration: u32,
    queue: PlaybackQueue,
}

impl Session {
    fn from_settings(settings: &PlayerSettings, mut queue: PlaybackQueue) -> Self {
        queue.set_shuffle(settings.is_shuffle_enabled);
        Self {
            current_track: None,
            is_playing: false,
            is_paused: false,
            is_loading: false,
            position_ms: 0,
            duration_ms: 0,
            volume: settings.volume,
            is_muted: false,
            repeat_mode: settings.repeat_mode,
            playback_speed: settings.playback_speed,
            crossfade_enabled: settings.crossfade_enabled,
            crossfade_duration: settings.crossfade_duration,
            queue,
        }
    }

    fn effective_volume(&self) -> f32 {
        if self.is_muted { 0.0 } else { self.volume }
    }

    fn sound_config(&self) -> SoundConfig {
        SoundConfig {
            volume: self.effective_volume(),
            rate: self.playback_speed,
            correct_pitch: true,
            looping: self.repeat_mode == RepeatMode::One,
        }
    }

    fn settings(&self) -> PlayerSettings {
        PlayerSettings {
            volume: self.volume,
            repeat_mode: self.repeat_mode,
            is_shuffle_enabled: self.queue.is_shuffled(),
            playback_speed: self.playback_speed,
            crossfade_enabled: self.crossfade_enabled,
            crossfade_duration: self.crossfade_duration,
        }
    }

    fn snapshot(&self) -> PlayerState {
        PlayerState {
            current_track: self.current_track.clone(),
            is_playing: self.is_playing,
            is_paused: self.is_paused,
            is_loading: self.is_loading,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            volume: self.volume,
            is_muted: self.is_muted,
            repeat_mode: self.repeat_mode,
            is_shuffle_enabled: self.queue.is_shuffled(),
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            playback_speed: self.playback_speed,
            crossfade_enabled: self.crossfade_enabled,
            crossfade_duration: self.crossfade_duration,
        }
    }
}

/// Shared state behind every controller handle.
struct Shared {
    engine: Arc<dyn AudioEngine>,
    settings: Arc<SettingsManager>,
    session: Mutex<Session>,
    /// The one loaded sound, if any.
    sound: Mutex<Option<Arc<dyn Sound>>>,
    /// Bumped by every `load_track`; stale loads discard their sound.
    load_generation: AtomicU64,
    /// Bumped whenever polling starts or stops; stale poll tasks exit.
    poll_generation: AtomicU64,
    sleep_timer: SleepTimer,
    listeners: ListenerRegistry,
    events_tx: Sender<PlayerState>,
}

/// Playback/queue state machine.
///
/// Cloning yields another handle to the same controller. Operations are
/// expected to be issued one at a time by the UI layer; the only autonomous
/// sources of change are the position poll and the sleep timer.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    /// Creates a controller, seeding volume, repeat, shuffle, speed and
    /// crossfade from the persisted settings.
    ///
    /// # Arguments
    ///
    /// * `engine` - Platform audio engine
    /// * `settings` - Settings store read now and written after every setting change
    #[must_use]
    pub fn new(engine: Arc<dyn AudioEngine>, settings: Arc<SettingsManager>) -> Self {
        Self::with_queue(engine, settings, PlaybackQueue::new())
    }

    /// Creates a controller around a prepared queue (e.g. a seeded one for tests).
    #[must_use]
    pub fn with_queue(
        engine: Arc<dyn AudioEngine>,
        settings: Arc<SettingsManager>,
        queue: PlaybackQueue,
    ) -> Self {
        let session = Session::from_settings(&settings.get_settings(), queue);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                engine,
                settings,
                session: Mutex::new(session),
                sound: Mutex::new(None),
                load_generation: AtomicU64::new(0),
                poll_generation: AtomicU64::new(0),
                sleep_timer: SleepTimer::new(),
                listeners: ListenerRegistry::new(),
                events_tx,
            }),
        }
    }

    fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Registers a listener called synchronously with every snapshot.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlayerState) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    /// Subscribes to snapshots through a broadcast channel.
    ///
    /// Slow receivers skip snapshots (`RecvError::Lagged`) rather than
    /// blocking the controller.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerState> {
        self.shared.events_tx.subscribe()
    }

    /// Current snapshot, without side effects.
    #[must_use]
    pub fn get_state(&self) -> PlayerState {
        self.shared.session.lock().snapshot()
    }

    fn notify(&self) {
        let state = self.get_state();
        self.shared.listeners.notify(&state);
        let _ = self.shared.events_tx.send(state);
    }

    /// Notifies, then hands back `result` unchanged.
    fn notify_with<T>(&self, result: Result<T>) -> Result<T> {
        self.notify();
        result
    }

    fn persist_settings(&self) {
        let settings = self.shared.session.lock().settings();
        if let Err(e) = self.shared.settings.update_settings(settings) {
            warn!("PlaybackController: Failed to persist settings: {e}");
        }
    }

    fn current_sound(&self) -> Option<Arc<dyn Sound>> {
        self.shared.sound.lock().clone()
    }

    /// Replaces the loaded sound with one for `track`.
    ///
    /// The previous sound is released before the new one is acquired, so a
    /// failed acquire leaves the slot empty. On success the track's play
    /// count and last-played time are updated, the position resets to 0 and
    /// the track becomes current.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine cannot load the URI, or
    /// `PlayerError::LoadSuperseded` if another load started meanwhile.
    pub async fn load_track(&self, mut track: Track) -> Result<()> {
        let generation = self.shared.load_generation.fetch_add(1, SeqCst) + 1;
        debug!("PlaybackController: Loading track {} ({})", track.id, track.uri);

        let config = {
            let mut session = self.shared.session.lock();
            session.is_loading = true;
            session.is_playing = false;
            session.is_paused = false;
            session.sound_config()
        };
        self.stop_position_updates();
        self.notify();

        let previous = self.shared.sound.lock().take();
        if let Some(previous) = previous
            && let Err(e) = previous.release().await
        {
            warn!("PlaybackController: Failed to release previous sound: {e}");
        }

        let acquired = self.shared.engine.acquire(&track.uri, config).await;

        if self.shared.load_generation.load(SeqCst) != generation {
            debug!("PlaybackController: Load of {} superseded", track.id);
            if let Ok(sound) = acquired
                && let Err(e) = sound.release().await
            {
                warn!("PlaybackController: Failed to release superseded sound: {e}");
            }
            return Err(PlayerError::LoadSuperseded { track_id: track.id });
        }

        let sound = match acquired {
            Ok(sound) => sound,
            Err(e) => {
                self.shared.session.lock().is_loading = false;
                return self.notify_with(Err(e.into()));
            }
        };

        *self.shared.sound.lock() = Some(sound);
        {
            let mut session = self.shared.session.lock();
            track.mark_played(SystemTime::now());
            for queued in session.queue.tracks_with_id_mut(&track.id) {
                queued.play_count = track.play_count;
                queued.last_played = track.last_played;
            }
            session.duration_ms = track.duration_ms;
            session.position_ms = 0;
            session.current_track = Some(track);
            session.is_loading = false;
        }
        self.notify();
        Ok(())
    }

    /// Starts or resumes playback.
    ///
    /// With nothing loaded, loads the current track or else the queue entry
    /// at the current index; does nothing if the queue is empty too.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if loading or the engine's play command fails.
    pub async fn play(&self) -> Result<()> {
        let sound = match self.current_sound() {
            Some(sound) => sound,
            None => {
                let target = {
                    let session = self.shared.session.lock();
                    session
                        .current_track
                        .clone()
                        .or_else(|| session.queue.current().cloned())
                };
                let Some(track) = target else {
                    debug!("PlaybackController: Nothing to play");
                    return Ok(());
                };
                self.load_track(track).await?;
                self.current_sound()
                    .ok_or(PlayerError::Audio(AudioError::NoSoundLoaded))?
            }
        };

        if let Err(e) = sound.play().await {
            return self.notify_with(Err(e.into()));
        }

        {
            let mut session = self.shared.session.lock();
            session.is_playing = true;
            session.is_paused = false;
        }
        self.start_position_updates(&sound);
        self.notify();
        Ok(())
    }

    /// Pauses playback. Does nothing when no track is loaded.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine's pause command fails.
    pub async fn pause(&self) -> Result<()> {
        let Some(sound) = self.current_sound() else {
            return Ok(());
        };

        if let Err(e) = sound.pause().await {
            return self.notify_with(Err(e.into()));
        }

        {
            let mut session = self.shared.session.lock();
            session.is_playing = false;
            session.is_paused = true;
        }
        self.stop_position_updates();
        self.notify();
        Ok(())
    }

    /// Stops playback and rewinds to the start of the track.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine's stop command fails.
    pub async fn stop(&self) -> Result<()> {
        if let Some(sound) = self.current_sound()
            && let Err(e) = sound.stop().await
        {
            return self.notify_with(Err(e.into()));
        }

        {
            let mut session = self.shared.session.lock();
            session.is_playing = false;
            session.is_paused = false;
            session.position_ms = 0;
        }
        self.stop_position_updates();
        self.notify();
        Ok(())
    }

    /// Pauses when playing, plays otherwise.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` from the underlying `pause` or `play`.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let is_playing = self.shared.session.lock().is_playing;
        if is_playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Loads `track` and starts playing it.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` from `load_track` or `play`.
    pub async fn play_track(&self, track: Track) -> Result<()> {
        self.load_track(track).await?;
        self.play().await
    }

    /// Advances to the next queue entry and plays it.
    ///
    /// Stops instead when linear playback with repeat off would wrap back to
    /// the first entry. Does nothing on an empty queue.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` from loading, playing or stopping.
    pub async fn play_next(&self) -> Result<()> {
        let target = {
            let mut session = self.shared.session.lock();
            let Some(next) = session.queue.next_index() else {
                return Ok(());
            };

            if next == 0 && session.repeat_mode == RepeatMode::Off && !session.queue.is_shuffled()
            {
                None
            } else {
                session.queue.set_current_index(next);
                session.queue.get(next).cloned()
            }
        };

        match target {
            Some(track) => {
                self.load_track(track).await?;
                self.play().await
            }
            None => {
                debug!("PlaybackController: End of queue reached");
                self.stop().await
            }
        }
    }

    /// Goes back to the previous queue entry and plays it.
    ///
    /// Past the restart threshold the current track is rewound instead.
    /// Does nothing on an empty queue.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` from seeking, loading or playing.
    pub async fn play_previous(&self) -> Result<()> {
        let target = {
            let mut session = self.shared.session.lock();
            if session.queue.is_empty() {
                return Ok(());
            }

            if restarts_current_track(session.position_ms) {
                None
            } else {
                let Some(previous) = session.queue.previous_index() else {
                    return Ok(());
                };
                session.queue.set_current_index(previous);
                session.queue.get(previous).cloned()
            }
        };

        match target {
            Some(track) => {
                self.load_track(track).await?;
                self.play().await
            }
            None => self.seek_to(0).await,
        }
    }

    /// Moves the playback position. Does nothing when no track is loaded.
    ///
    /// Out-of-range positions are passed to the engine unchanged.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine's seek command fails.
    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let Some(sound) = self.current_sound() else {
            return Ok(());
        };

        if let Err(e) = sound.seek(position_ms).await {
            return self.notify_with(Err(e.into()));
        }

        self.shared.session.lock().position_ms = position_ms;
        self.notify();
        Ok(())
    }

    /// Sets the stored volume, clamped to `0.0..=1.0`.
    ///
    /// The engine only receives the new volume while unmuted.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Settings` for a non-finite value, or
    /// `PlayerError::Audio` if the engine rejects the volume.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(PlayerError::invalid_value(format!(
                "volume must be a finite number, got {volume}"
            )));
        }

        let (volume, is_muted) = {
            let mut session = self.shared.session.lock();
            session.volume = volume.clamp(0.0, 1.0);
            (session.volume, session.is_muted)
        };
        self.persist_settings();

        let mut result = Ok(());
        if !is_muted && let Some(sound) = self.current_sound() {
            result = sound.set_volume(volume).await.map_err(Into::into);
        }
        self.notify_with(result)
    }

    /// Flips mute, applying 0 or the stored volume to the engine.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine rejects the volume.
    pub async fn toggle_mute(&self) -> Result<()> {
        let effective = {
            let mut session = self.shared.session.lock();
            session.is_muted = !session.is_muted;
            session.effective_volume()
        };

        let mut result = Ok(());
        if let Some(sound) = self.current_sound() {
            result = sound.set_volume(effective).await.map_err(Into::into);
        }
        self.notify_with(result)
    }

    /// Sets the playback rate with pitch correction.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Settings` for a non-positive or non-finite rate,
    /// or `PlayerError::Audio` if the engine rejects it.
    pub async fn set_playback_speed(&self, speed: f32) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlayerError::invalid_value(format!(
                "playback speed must be positive, got {speed}"
            )));
        }

        self.shared.session.lock().playback_speed = speed;
        self.persist_settings();

        let mut result = Ok(());
        if let Some(sound) = self.current_sound() {
            result = sound.set_rate(speed, true).await.map_err(Into::into);
        }
        self.notify_with(result)
    }

    /// Sets the repeat mode; `One` also turns on engine-level looping.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Audio` if the engine rejects the looping change.
    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.shared.session.lock().repeat_mode = mode;
        self.persist_settings();

        let mut result = Ok(());
        if let Some(sound) = self.current_sound() {
            result = sound
                .set_looping(mode == RepeatMode::One)
                .await
                .map_err(Into::into);
        }
        self.notify_with(result)
    }

    /// Advances the repeat mode off → all → one → off.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` from `set_repeat_mode`.
    pub async fn cycle_repeat_mode(&self) -> Result<()> {
        let next = self.shared.session.lock().repeat_mode.cycled();
        self.set_repeat_mode(next).await
    }

    /// Flips shuffle. Turning it on draws a new permutation with the current
    /// track first.
    pub fn toggle_shuffle(&self) {
        {
            let mut session = self.shared.session.lock();
            let enabled = !session.queue.is_shuffled();
            session.queue.set_shuffle(enabled);
        }
        self.persist_settings();
        self.notify();
    }

    /// Stores crossfade preferences. Playback itself does not crossfade.
    pub fn set_crossfade(&self, enabled: bool, duration_secs: u32) {
        {
            let mut session = self.shared.session.lock();
            session.crossfade_enabled = enabled;
            session.crossfade_duration = duration_secs;
        }
        self.persist_settings();
        self.notify();
    }

    /// Replaces the queue. Nothing is loaded or played.
    ///
    /// `start_index` is clamped to the last entry.
    pub fn set_queue(&self, tracks: Vec<Track>, start_index: usize) {
        self.shared
            .session
            .lock()
            .queue
            .set_tracks(tracks, start_index);
        self.notify();
    }

    /// Appends a track to the queue.
    pub fn add_to_queue(&self, track: Track) {
        self.shared.session.lock().queue.push(track);
        self.notify();
    }

    /// Removes the queue entry at `index`. Out-of-range indices are ignored.
    ///
    /// # Returns
    ///
    /// The removed track, if any.
    pub fn remove_from_queue(&self, index: usize) -> Option<Track> {
        let removed = self.shared.session.lock().queue.remove(index);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Empties the queue. The loaded track keeps playing.
    pub fn clear_queue(&self) {
        self.shared.session.lock().queue.clear();
        self.notify();
    }

    /// Schedules a pause after `minutes`, replacing any pending timer.
    ///
    /// `None` or `Some(0)` only cancels the pending timer.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NoRuntime` if called outside a tokio runtime.
    pub fn set_sleep_timer(&self, minutes: Option<u32>) -> Result<()> {
        match minutes {
            Some(minutes) if minutes > 0 => {
                let after = Duration::from_secs(u64::from(minutes) * 60);
                let weak = Arc::downgrade(&self.shared);
                debug!("PlaybackController: Sleep timer set for {minutes} min");
                self.shared.sleep_timer.schedule(after, async move {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    debug!("PlaybackController: Sleep timer fired");
                    if let Err(e) = PlaybackController::from_shared(shared).pause().await {
                        ErrorReporter::background(&e, "sleep timer pause");
                    }
                })
            }
            _ => {
                self.shared.sleep_timer.cancel();
                Ok(())
            }
        }
    }

    /// Time left on the pending sleep timer.
    #[must_use]
    pub fn sleep_timer_remaining(&self) -> Option<Duration> {
        self.shared.sleep_timer.remaining()
    }

    fn stop_position_updates(&self) {
        self.shared.poll_generation.fetch_add(1, SeqCst);
    }

    fn is_current_poll(&self, generation: u64) -> bool {
        self.shared.poll_generation.load(SeqCst) == generation
    }

    /// Spawns the poll task for `sound`, retiring any previous one.
    fn start_position_updates(&self, sound: &Arc<dyn Sound>) {
        let generation = self.shared.poll_generation.fetch_add(1, SeqCst) + 1;
        let Ok(runtime) = Handle::try_current() else {
            warn!("PlaybackController: No runtime for position updates");
            return;
        };

        let weak = Arc::downgrade(&self.shared);
        let completion = sound.completion();
        runtime.spawn(poll_position(weak, generation, completion));
    }

    /// One poll tick.
    ///
    /// # Returns
    ///
    /// `false` once the task should exit.
    async fn poll_once(&self, generation: u64) -> bool {
        if !self.is_current_poll(generation) || !self.shared.session.lock().is_playing {
            return false;
        }
        let Some(sound) = self.current_sound() else {
            return false;
        };

        let status = match sound.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("PlaybackController: Failed to get playback status: {e}");
                return true;
            }
        };

        if !self.is_current_poll(generation) {
            return false;
        }
        if !status.is_loaded {
            return true;
        }

        let track_ended = {
            let mut session = self.shared.session.lock();
            session.position_ms = status.position_ms;
            session.duration_ms = status.duration_ms;
            status.duration_ms > 0
                && status.position_ms >= status.duration_ms.saturating_sub(TRACK_END_TOLERANCE_MS)
        };
        self.notify();

        if track_ended {
            self.handle_track_end().await;
        }
        true
    }

    /// Repeats the track for `RepeatMode::One`, otherwise moves to the next entry.
    async fn handle_track_end(&self) {
        let repeat_one = self.shared.session.lock().repeat_mode == RepeatMode::One;
        debug!("PlaybackController: Track ended (repeat one: {repeat_one})");

        let result = if repeat_one {
            match self.seek_to(0).await {
                Ok(()) => self.play().await,
                Err(e) => Err(e),
            }
        } else {
            self.play_next().await
        };

        if let Err(e) = result {
            ErrorReporter::background(&e, "track end");
        }
    }

    /// Stops polling, cancels the sleep timer, releases the sound and drops
    /// every listener.
    pub async fn shutdown(&self) {
        debug!("PlaybackController: Shutting down");
        self.stop_position_updates();
        self.shared.sleep_timer.cancel();
        self.shared.load_generation.fetch_add(1, SeqCst);

        let sound = self.shared.sound.lock().take();
        if let Some(sound) = sound
            && let Err(e) = sound.release().await
        {
            warn!("PlaybackController: Failed to release sound on shutdown: {e}");
        }

        {
            let mut session = self.shared.session.lock();
            session.is_playing = false;
            session.is_paused = false;
            session.is_loading = false;
        }
        self.shared.listeners.clear();
    }
}

/// Body of the position poll task.
///
/// Ticks every [`POSITION_POLL_INTERVAL`]; a completion signal from the
/// engine triggers track-end handling immediately. Exits once its generation
/// is retired or the controller is gone.
async fn poll_position(weak: Weak<Shared>, generation: u64, mut completion: Option<Receiver<()>>) {
    let mut ticker = interval(POSITION_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        let finished = match &completion {
            Some(rx) => select! {
                _ = ticker.tick() => false,
                signal = rx.recv() => signal.is_ok(),
            },
            None => {
                ticker.tick().await;
                false
            }
        };

        let Some(shared) = weak.upgrade() else {
            break;
        };
        let controller = PlaybackController::from_shared(shared);

        if !controller.is_current_poll(generation) {
            break;
        }

        if finished {
            controller.handle_track_end().await;
            continue;
        }
        if completion.as_ref().is_some_and(Receiver::is_closed) {
            completion = None;
        }

        if !controller.poll_once(generation).await {
            break;
        }
    }

    debug!("PlaybackController: Position updates {generation} stopped");
}
