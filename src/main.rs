//! Playdeck - headless player
//!
//! Plays a queue of tracks through the virtual engine and logs every
//! transition. Useful for exercising the controller without audio hardware.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use {
    anyhow::{Result, bail},
    clap::{Parser, ValueEnum},
    tokio::{
        select,
        signal::ctrl_c,
        sync::broadcast::{Receiver, error::RecvError},
        time::sleep,
    },
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt},
};

use playdeck::{
    PlaybackController, PlaybackState, PlayerState, RepeatMode, SettingsManager, Track,
    VirtualEngine,
    audio::POSITION_POLL_INTERVAL,
    error::{ErrorReporter, ResultExt},
    state::format_time,
};

/// Repeat mode as given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RepeatArg {
    Off,
    All,
    One,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Off => RepeatMode::Off,
            RepeatArg::All => RepeatMode::All,
            RepeatArg::One => RepeatMode::One,
        }
    }
}

/// Command-line arguments for playdeck
#[derive(Parser, Debug)]
#[command(name = "playdeck")]
#[command(about = "Plays a track queue through a virtual audio engine")]
#[command(version)]
struct Args {
    /// Tracks to queue, each given as URI=SECONDS
    #[arg(required = true, value_parser = parse_track)]
    tracks: Vec<Track>,

    /// Queue index to start from
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Repeat mode (defaults to the stored setting)
    #[arg(long, value_enum)]
    repeat: Option<RepeatArg>,

    /// Shuffle on or off (defaults to the stored setting)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    shuffle: Option<bool>,

    /// Output volume between 0.0 and 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Playback speed (1.0 = normal)
    #[arg(long)]
    speed: Option<f32>,

    /// Pause after this many minutes
    #[arg(long)]
    sleep_minutes: Option<u32>,

    /// Settings file to use instead of the XDG location
    #[arg(long, env = "PLAYDECK_CONFIG")]
    config: Option<PathBuf>,
}

/// Parses `URI=SECONDS` into a track whose id and URI are both `URI`.
fn parse_track(value: &str) -> Result<Track, String> {
    let (uri, seconds) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected URI=SECONDS, got '{value}'"))?;
    let seconds: f64 = seconds
        .parse()
        .map_err(|e| format!("invalid duration '{seconds}': {e}"))?;
    if uri.is_empty() || !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("expected a URI and a positive duration, got '{value}'"));
    }

    let title = uri.rsplit('/').next().unwrap_or(uri);
    Ok(Track::new(uri, title, uri, (seconds * 1000.0).round() as u64))
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::error(&e, "playdeck");
            eprintln!("playdeck: {}", ErrorReporter::to_user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => SettingsManager::with_config_path(path.clone()),
        None => SettingsManager::new(),
    }
    .add_context("Failed to load settings")?;
    info!("Settings: {}", settings.get_config_path().display());

    let engine = VirtualEngine::new();
    for track in &args.tracks {
        engine.register(track.uri.clone(), track.duration_ms);
    }

    let controller = PlaybackController::new(Arc::new(engine), Arc::new(settings));
    if let Err(e) = apply_overrides(&controller, &args).await {
        ErrorReporter::warn(&e, "command-line overrides");
    }

    let mut events = controller.subscribe_events();
    controller.set_queue(args.tracks, args.start);
    controller
        .play()
        .await
        .add_context("Failed to start playback")?;
    controller
        .set_sleep_timer(args.sleep_minutes)
        .add_context("Failed to set sleep timer")?;

    let result = watch(&controller, &mut events).await;
    controller.shutdown().await;
    result
}

async fn apply_overrides(controller: &PlaybackController, args: &Args) -> Result<()> {
    if let Some(volume) = args.volume {
        controller
            .set_volume(volume)
            .await
            .add_contextf(format!("Failed to set volume {volume}"))?;
    }
    if let Some(speed) = args.speed {
        controller
            .set_playback_speed(speed)
            .await
            .add_contextf(format!("Failed to set speed {speed}"))?;
    }
    if let Some(repeat) = args.repeat {
        controller
            .set_repeat_mode(repeat.into())
            .await
            .add_context("Failed to set repeat mode")?;
    }
    if let Some(shuffle) = args.shuffle
        && shuffle != controller.get_state().is_shuffle_enabled
    {
        controller.toggle_shuffle();
    }
    Ok(())
}

/// Logs transitions until playback stops, pauses or Ctrl+C arrives.
async fn watch(controller: &PlaybackController, events: &mut Receiver<PlayerState>) -> Result<()> {
    let mut now_playing: Option<String> = None;
    let mut started = false;

    loop {
        select! {
            signal = ctrl_c() => {
                signal.add_context("Failed to listen for Ctrl+C")?;
                info!("Interrupted");
                return Ok(());
            }
            event = events.recv() => {
                let state = match event {
                    Ok(state) => state,
                    Err(RecvError::Lagged(skipped)) => {
                        info!("Skipped {skipped} state updates");
                        continue;
                    }
                    Err(RecvError::Closed) => bail!("Controller event channel closed"),
                };

                if let Some(track) = &state.current_track
                    && now_playing.as_deref() != Some(track.id.as_str())
                    && !state.is_loading
                {
                    info!(
                        "Now playing [{}/{}] {} ({})",
                        state.current_index + 1,
                        state.queue.len(),
                        track.title,
                        format_time(state.duration_ms)
                    );
                    now_playing = Some(track.id.clone());
                }

                match state.playback_state() {
                    PlaybackState::Playing => started = true,
                    // A track change passes through Stopped between load and play.
                    PlaybackState::Stopped if started => {
                        sleep(POSITION_POLL_INTERVAL).await;
                        if controller.get_state().playback_state() == PlaybackState::Stopped {
                            info!("Queue finished");
                            return Ok(());
                        }
                    }
                    PlaybackState::Paused => {
                        info!(
                            "Paused at {} (sleep timer)",
                            format_time(state.position_ms)
                        );
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}
