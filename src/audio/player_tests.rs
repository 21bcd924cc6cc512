//! Tests for the playback controller.

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        path::PathBuf,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering::SeqCst},
        },
    };

    use {
        async_channel::{Receiver, unbounded},
        async_trait::async_trait,
        parking_lot::Mutex,
        tempfile::{TempDir, tempdir},
        tokio::time::{Duration, sleep},
    };

    use crate::{
        audio::{
            engine::{AudioEngine, AudioError, EngineCommand, Sound, SoundConfig, SoundStatus},
            player::PlaybackController,
            queue::PlaybackQueue,
            virtual_engine::{EngineCall, VirtualEngine},
        },
        config::SettingsManager,
        error::PlayerError,
        library::Track,
        state::RepeatMode,
    };

    const LONG_TRACK_MS: u64 = 600_000;

    struct Harness {
        controller: PlaybackController,
        engine: Arc<VirtualEngine>,
        config_path: PathBuf,
        _dir: TempDir,
    }

    fn track(id: &str, duration_ms: u64) -> Track {
        Track::new(id, format!("Track {id}"), format!("{id}.mp3"), duration_ms)
    }

    fn long_tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id, LONG_TRACK_MS)).collect()
    }

    fn harness_with(tracks: &[Track]) -> Harness {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.json");
        let engine = Arc::new(VirtualEngine::new());
        for track in tracks {
            engine.register(track.uri.clone(), track.duration_ms);
        }

        let settings = Arc::new(SettingsManager::with_config_path(config_path.clone()).unwrap());
        let controller =
            PlaybackController::with_queue(engine.clone(), settings, PlaybackQueue::with_seed(7));

        Harness {
            controller,
            engine,
            config_path,
            _dir: dir,
        }
    }

    fn harness(ids: &[&str]) -> (Harness, Vec<Track>) {
        let tracks = long_tracks(ids);
        (harness_with(&tracks), tracks)
    }

    fn count_notifications(controller: &PlaybackController) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        // Subscription handles do not unsubscribe on drop.
        let _ = controller.subscribe(move |_| {
            counter.fetch_add(1, SeqCst);
        });
        count
    }

    /// Sound that never advances and reports completion through a channel.
    struct SignallingSound {
        finished: Receiver<()>,
    }

    #[async_trait]
    impl Sound for SignallingSound {
        async fn play(&self) -> Result<(), AudioError> {
            Ok(())
        }

        async fn pause(&self) -> Result<(), AudioError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), AudioError> {
            Ok(())
        }

        async fn seek(&self, _position_ms: u64) -> Result<(), AudioError> {
            Ok(())
        }

        async fn set_volume(&self, _volume: f32) -> Result<(), AudioError> {
            Ok(())
        }

        async fn set_rate(&self, _rate: f32, _correct_pitch: bool) -> Result<(), AudioError> {
            Ok(())
        }

        async fn set_looping(&self, _looping: bool) -> Result<(), AudioError> {
            Ok(())
        }

        async fn status(&self) -> Result<SoundStatus, AudioError> {
            Ok(SoundStatus {
                position_ms: 0,
                duration_ms: LONG_TRACK_MS,
                is_loaded: true,
            })
        }

        async fn release(&self) -> Result<(), AudioError> {
            Ok(())
        }

        fn completion(&self) -> Option<Receiver<()>> {
            Some(self.finished.clone())
        }
    }

    struct SignallingEngine {
        finished: Receiver<()>,
    }

    #[async_trait]
    impl AudioEngine for SignallingEngine {
        async fn acquire(
            &self,
            _uri: &str,
            _config: SoundConfig,
        ) -> Result<Arc<dyn Sound>, AudioError> {
            Ok(Arc::new(SignallingSound {
                finished: self.finished.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_empty_queue_operations_are_noops() {
        let (h, _) = harness(&[]);
        let c = &h.controller;

        c.play().await.unwrap();
        c.play_next().await.unwrap();
        c.play_previous().await.unwrap();
        c.pause().await.unwrap();
        c.seek_to(1_000).await.unwrap();

        let state = c.get_state();
        assert!(!state.is_playing);
        assert!(state.current_track.is_none());
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_play_loads_current_queue_entry() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 1);
        c.play().await.unwrap();

        let state = c.get_state();
        assert!(state.is_playing);
        assert!(!state.is_paused);
        assert!(!state.is_loading);
        assert_eq!(state.duration_ms, LONG_TRACK_MS);
        let current = state.current_track.unwrap();
        assert_eq!(current.id, "b");
        assert_eq!(current.play_count, 1);
        assert!(current.last_played.is_some());
        assert_eq!(state.queue[1].play_count, 1);
        assert_eq!(state.queue[0].play_count, 0);
        assert_eq!(
            h.engine.calls(),
            vec![EngineCall::Acquire("b.mp3".to_string()), EngineCall::Play]
        );
    }

    #[tokio::test]
    async fn test_pause_and_toggle_play_pause() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        c.toggle_play_pause().await.unwrap();
        assert!(c.get_state().is_playing);

        c.toggle_play_pause().await.unwrap();
        let state = c.get_state();
        assert!(!state.is_playing);
        assert!(state.is_paused);

        c.play().await.unwrap();
        assert!(c.get_state().is_playing);
        assert_eq!(h.engine.count_calls(|call| matches!(call, EngineCall::Acquire(_))), 1);
    }

    #[tokio::test]
    async fn test_next_wraps_with_repeat_all() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 2);
        c.set_repeat_mode(RepeatMode::All).await.unwrap();
        c.play_next().await.unwrap();

        let state = c.get_state();
        assert_eq!(state.current_index, 0);
        assert_eq!(state.current_track.unwrap().id, "a");
        assert!(state.is_playing);
    }

    #[tokio::test]
    async fn test_next_at_end_without_repeat_stops() {
        let (h, tracks) = harness(&["a", "b"]);
        let c = &h.controller;

        c.set_queue(tracks, 1);
        c.play().await.unwrap();
        c.seek_to(20_000).await.unwrap();
        c.play_next().await.unwrap();

        let state = c.get_state();
        assert!(!state.is_playing);
        assert!(!state.is_paused);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.position_ms, 0);
        assert_eq!(h.engine.calls().last(), Some(&EngineCall::Stop));
    }

    #[tokio::test]
    async fn test_previous_near_start_goes_back() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        c.play_previous().await.unwrap();

        let state = c.get_state();
        assert_eq!(state.current_index, 2);
        assert_eq!(state.current_track.unwrap().id, "c");
    }

    #[tokio::test]
    async fn test_previous_past_threshold_restarts_track() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 1);
        c.play().await.unwrap();
        c.seek_to(5_000).await.unwrap();
        h.engine.clear_calls();

        c.play_previous().await.unwrap();

        let state = c.get_state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.position_ms, 0);
        assert_eq!(h.engine.calls(), vec![EngineCall::Seek(0)]);
    }

    #[tokio::test]
    async fn test_previous_at_threshold_goes_back() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 1);
        c.play().await.unwrap();
        c.seek_to(3_000).await.unwrap();
        c.play_previous().await.unwrap();

        assert_eq!(c.get_state().current_index, 0);
    }

    #[tokio::test]
    async fn test_previous_before_any_playback_goes_back() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        assert!(c.get_state().current_track.is_none());
        c.play_previous().await.unwrap();

        let state = c.get_state();
        assert_eq!(state.current_index, 2);
        assert_eq!(state.current_track.unwrap().id, "c");
        assert!(state.is_playing);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Seek(0)), 0);
    }

    #[tokio::test]
    async fn test_loading_snapshot_excludes_playing() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let _ = c.subscribe(move |state| {
            recorder.lock().push((state.is_loading, state.is_playing));
        });
        c.play().await.unwrap();

        let seen = seen.lock().clone();
        assert!(!seen.contains(&(true, true)));
        let loading = seen.iter().position(|flags| *flags == (true, false)).unwrap();
        let playing = seen.iter().position(|flags| *flags == (false, true)).unwrap();
        assert!(loading < playing);
        assert_eq!(seen.last(), Some(&(false, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_failure_keeps_polling() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        h.engine.fail_command(EngineCommand::Status);
        sleep(Duration::from_millis(1_050)).await;
        let state = c.get_state();
        assert_eq!(state.position_ms, 0);
        assert!(state.is_playing);

        h.engine.restore_command(EngineCommand::Status);
        sleep(Duration::from_millis(1_000)).await;
        let state = c.get_state();
        assert!(state.position_ms >= 1_900);
        assert!(state.is_playing);
    }

    #[tokio::test]
    async fn test_shuffle_visits_every_track_starting_from_current() {
        let (h, tracks) = harness(&["a", "b", "c", "d", "e"]);
        let c = &h.controller;

        c.set_queue(tracks, 3);
        c.toggle_shuffle();
        assert!(c.get_state().is_shuffle_enabled);
        c.play().await.unwrap();

        let mut visited = vec![c.get_state().current_index];
        for _ in 0..4 {
            c.play_next().await.unwrap();
            visited.push(c.get_state().current_index);
        }

        assert_eq!(visited[0], 3);
        assert_eq!(visited.iter().copied().collect::<HashSet<_>>().len(), 5);

        // Shuffle never stops at the end of the permutation.
        c.play_next().await.unwrap();
        let state = c.get_state();
        assert_eq!(state.current_index, 3);
        assert!(state.is_playing);

        c.toggle_shuffle();
        assert!(!c.get_state().is_shuffle_enabled);
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        c.set_volume(1.5).await.unwrap();
        assert_eq!(c.get_state().volume, 1.0);

        c.set_volume(-0.2).await.unwrap();
        assert_eq!(c.get_state().volume, 0.0);

        c.set_volume(0.0).await.unwrap();
        assert_eq!(c.get_state().volume, 0.0);
        assert_eq!(h.engine.calls().last(), Some(&EngineCall::SetVolume(0.0)));

        let result = c.set_volume(f32::NAN).await;
        assert!(matches!(result, Err(PlayerError::Settings(_))));
        assert_eq!(c.get_state().volume, 0.0);
    }

    #[tokio::test]
    async fn test_mute_twice_restores_volume() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        c.set_volume(0.6).await.unwrap();

        c.toggle_mute().await.unwrap();
        let state = c.get_state();
        assert!(state.is_muted);
        assert_eq!(state.volume, 0.6);
        assert_eq!(state.effective_volume(), 0.0);
        assert_eq!(h.engine.calls().last(), Some(&EngineCall::SetVolume(0.0)));

        c.toggle_mute().await.unwrap();
        assert!(!c.get_state().is_muted);
        assert_eq!(h.engine.calls().last(), Some(&EngineCall::SetVolume(0.6)));
    }

    #[tokio::test]
    async fn test_volume_change_while_muted_waits_for_unmute() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        c.toggle_mute().await.unwrap();
        h.engine.clear_calls();

        c.set_volume(0.3).await.unwrap();
        assert!(h.engine.calls().is_empty());
        assert_eq!(c.get_state().volume, 0.3);

        c.toggle_mute().await.unwrap();
        assert_eq!(h.engine.calls(), vec![EngineCall::SetVolume(0.3)]);
    }

    #[tokio::test]
    async fn test_playback_speed() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        c.set_playback_speed(1.5).await.unwrap();
        assert_eq!(c.get_state().playback_speed, 1.5);
        assert_eq!(h.engine.calls().last(), Some(&EngineCall::SetRate(1.5)));

        assert!(c.set_playback_speed(0.0).await.is_err());
        assert!(c.set_playback_speed(f32::INFINITY).await.is_err());
        assert_eq!(c.get_state().playback_speed, 1.5);
    }

    #[tokio::test]
    async fn test_cycle_repeat_mode_drives_looping() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        h.engine.clear_calls();

        c.cycle_repeat_mode().await.unwrap();
        assert_eq!(c.get_state().repeat_mode, RepeatMode::All);
        c.cycle_repeat_mode().await.unwrap();
        assert_eq!(c.get_state().repeat_mode, RepeatMode::One);
        c.cycle_repeat_mode().await.unwrap();
        assert_eq!(c.get_state().repeat_mode, RepeatMode::Off);

        assert_eq!(
            h.engine.calls(),
            vec![
                EngineCall::SetLooping(false),
                EngineCall::SetLooping(true),
                EngineCall::SetLooping(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_queue_editing() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 10);
        assert_eq!(c.get_state().current_index, 2);

        c.add_to_queue(track("d", LONG_TRACK_MS));
        assert_eq!(c.get_state().queue.len(), 4);

        let removed = c.remove_from_queue(0).unwrap();
        assert_eq!(removed.id, "a");
        let state = c.get_state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.queue[1].id, "c");

        assert!(c.remove_from_queue(42).is_none());

        c.clear_queue();
        let state = c.get_state();
        assert!(state.queue.is_empty());
        assert_eq!(state.current_index, 0);
    }

    #[tokio::test]
    async fn test_removing_current_entry_keeps_playback() {
        let (h, tracks) = harness(&["a", "b", "c"]);
        let c = &h.controller;

        c.set_queue(tracks, 2);
        c.play().await.unwrap();
        c.remove_from_queue(2);

        let state = c.get_state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.current_track.unwrap().id, "c");
        assert!(state.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_timer_replacement_pauses_once() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        c.set_sleep_timer(Some(1)).unwrap();
        c.set_sleep_timer(Some(5)).unwrap();
        assert_eq!(c.sleep_timer_remaining(), Some(Duration::from_secs(300)));

        sleep(Duration::from_secs(120)).await;
        assert!(c.get_state().is_playing);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Pause), 0);

        sleep(Duration::from_secs(181)).await;
        let state = c.get_state();
        assert!(!state.is_playing);
        assert!(state.is_paused);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Pause), 1);
        assert!(c.sleep_timer_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_timer_zero_cancels() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        c.set_sleep_timer(Some(1)).unwrap();
        c.set_sleep_timer(Some(0)).unwrap();
        assert!(c.sleep_timer_remaining().is_none());

        sleep(Duration::from_secs(120)).await;
        assert!(c.get_state().is_playing);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Pause), 0);
    }

    #[tokio::test]
    async fn test_load_failure_clears_loading_and_slot() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.load_track(tracks[0].clone()).await.unwrap();

        let result = c.load_track(track("missing", 1_000)).await;
        assert!(matches!(
            result,
            Err(PlayerError::Audio(AudioError::Acquire { .. }))
        ));

        let state = c.get_state();
        assert!(!state.is_loading);
        assert!(!state.is_playing);
        assert_eq!(h.engine.live_sounds(), 0);

        h.engine.clear_calls();
        c.pause().await.unwrap();
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_load_discards_its_sound() {
        let (h, tracks) = harness(&["a", "b"]);
        let c = &h.controller;
        h.engine.set_acquire_delay(Some(Duration::from_millis(50)));

        let (first, second) = tokio::join!(
            c.load_track(tracks[0].clone()),
            c.load_track(tracks[1].clone())
        );

        assert!(matches!(
            first,
            Err(PlayerError::LoadSuperseded { ref track_id }) if track_id == "a"
        ));
        second.unwrap();
        assert_eq!(c.get_state().current_track.unwrap().id, "b");
        assert_eq!(h.engine.live_sounds(), 1);
    }

    #[tokio::test]
    async fn test_previous_sound_released_before_acquire() {
        let (h, tracks) = harness(&["a", "b"]);
        let c = &h.controller;

        c.load_track(tracks[0].clone()).await.unwrap();
        c.load_track(tracks[1].clone()).await.unwrap();
        c.load_track(tracks[0].clone()).await.unwrap();

        assert_eq!(h.engine.live_sounds(), 1);
        assert_eq!(
            h.engine.calls(),
            vec![
                EngineCall::Acquire("a.mp3".to_string()),
                EngineCall::Release,
                EngineCall::Acquire("b.mp3".to_string()),
                EngineCall::Release,
                EngineCall::Acquire("a.mp3".to_string()),
            ]
        );
        assert_eq!(c.get_state().current_track.unwrap().play_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_advances_queue() {
        let tracks = vec![track("a", 1_000), track("b", LONG_TRACK_MS)];
        let h = harness_with(&tracks);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        sleep(Duration::from_millis(1_500)).await;

        let state = c.get_state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.current_track.unwrap().id, "b");
        assert!(state.is_playing);
        assert!(state.position_ms < 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_track_end_stops() {
        let tracks = vec![track("a", 1_000)];
        let h = harness_with(&tracks);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        sleep(Duration::from_millis(1_500)).await;

        let state = c.get_state();
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Stop), 1);
        assert_eq!(h.engine.count_calls(|call| matches!(call, EngineCall::Acquire(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_with_repeat_one_restarts() {
        let tracks = vec![track("a", 1_000), track("b", LONG_TRACK_MS)];
        let h = harness_with(&tracks);
        let c = &h.controller;

        c.set_queue(tracks, 0);
        c.set_repeat_mode(RepeatMode::One).await.unwrap();
        c.play().await.unwrap();
        sleep(Duration::from_millis(1_500)).await;

        let state = c.get_state();
        assert_eq!(state.current_index, 0);
        assert!(state.is_playing);
        assert!(h.engine.count_calls(|call| *call == EngineCall::Seek(0)) >= 1);
        assert_eq!(h.engine.count_calls(|call| matches!(call, EngineCall::Acquire(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_polling_stops_on_pause() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();

        sleep(Duration::from_millis(1_050)).await;
        assert_eq!(c.get_state().position_ms, 1_000);

        c.pause().await.unwrap();
        let count = count_notifications(c);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(SeqCst), 0);
        assert_eq!(c.get_state().position_ms, 1_000);
    }

    #[tokio::test]
    async fn test_engine_failure_still_notifies() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.load_track(tracks[0].clone()).await.unwrap();

        h.engine.fail_command(EngineCommand::Play);
        let count = count_notifications(c);
        let result = c.play().await;

        assert!(matches!(
            result,
            Err(PlayerError::Audio(AudioError::Command { .. }))
        ));
        assert_eq!(count.load(SeqCst), 1);
        assert!(!c.get_state().is_playing);
    }

    #[tokio::test]
    async fn test_settings_persisted_and_restored() {
        let (h, _) = harness(&[]);
        let c = &h.controller;

        c.set_volume(0.4).await.unwrap();
        c.set_repeat_mode(RepeatMode::All).await.unwrap();
        c.set_playback_speed(1.25).await.unwrap();
        c.toggle_shuffle();
        c.set_crossfade(true, 5);
        c.toggle_mute().await.unwrap();

        let reloaded = SettingsManager::with_config_path(h.config_path.clone()).unwrap();
        {
            let settings = reloaded.get_settings();
            assert_eq!(settings.volume, 0.4);
            assert_eq!(settings.repeat_mode, RepeatMode::All);
            assert_eq!(settings.playback_speed, 1.25);
            assert!(settings.is_shuffle_enabled);
            assert!(settings.crossfade_enabled);
            assert_eq!(settings.crossfade_duration, 5);
        }

        let restored =
            PlaybackController::new(Arc::new(VirtualEngine::new()), Arc::new(reloaded));
        let state = restored.get_state();
        assert_eq!(state.volume, 0.4);
        assert_eq!(state.repeat_mode, RepeatMode::All);
        assert!(state.is_shuffle_enabled);
        assert!(!state.is_muted);
    }

    #[tokio::test]
    async fn test_listeners_and_event_channel() {
        let (h, tracks) = harness(&["a", "b"]);
        let c = &h.controller;

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subscription = c.subscribe(move |_| {
            counter.fetch_add(1, SeqCst);
        });
        let mut events = c.subscribe_events();

        c.set_queue(tracks, 1);
        assert_eq!(count.load(SeqCst), 1);
        let event = events.recv().await.unwrap();
        assert_eq!(event.queue.len(), 2);
        assert_eq!(event.current_index, 1);

        assert!(subscription.unsubscribe());
        c.clear_queue();
        assert_eq!(count.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_everything() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;
        c.set_queue(tracks, 0);
        c.play().await.unwrap();
        c.set_sleep_timer(Some(1)).unwrap();
        let count = count_notifications(c);

        c.shutdown().await;

        assert_eq!(h.engine.live_sounds(), 0);
        assert!(c.sleep_timer_remaining().is_none());
        assert!(!c.get_state().is_playing);

        sleep(Duration::from_secs(120)).await;
        c.set_queue(long_tracks(&["b"]), 0);
        assert_eq!(count.load(SeqCst), 0);
        assert_eq!(h.engine.count_calls(|call| *call == EngineCall::Pause), 0);
    }

    #[tokio::test]
    async fn test_play_track_sets_current_without_queue() {
        let (h, tracks) = harness(&["a"]);
        let c = &h.controller;

        c.play_track(tracks[0].clone()).await.unwrap();

        let state = c.get_state();
        assert!(state.is_playing);
        assert!(state.queue.is_empty());
        assert_eq!(state.current_track.unwrap().id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_signal_advances_queue() {
        let dir = tempdir().unwrap();
        let settings =
            Arc::new(SettingsManager::with_config_path(dir.path().join("settings.json")).unwrap());
        let (finished_tx, finished_rx) = unbounded();
        let engine = Arc::new(SignallingEngine {
            finished: finished_rx,
        });
        let c = PlaybackController::new(engine, settings);

        c.set_queue(long_tracks(&["a", "b"]), 0);
        c.play().await.unwrap();
        sleep(Duration::from_millis(250)).await;
        assert_eq!(c.get_state().current_index, 0);

        finished_tx.send(()).await.unwrap();
        sleep(Duration::from_millis(10)).await;

        let state = c.get_state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.current_track.unwrap().id, "b");
        assert!(state.is_playing);
    }
}
