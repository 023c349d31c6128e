//! Command-line surface of the demo: orbit one file around the listener.

use anyhow::{Result, bail};
use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use orbitsonic::config::{OrbitSonicEngineDesc, SteamBackendDesc};
use orbitsonic::{OrbitSonicEngine, OrbitSonicEvent, SoundId};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const UPDATE_INTERVAL: Duration = Duration::from_millis(20);

/// Plays an audio file on a circle around the listener until it ends.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "orbitsonic-demo")]
pub struct Args {
    /// Audio file to play (mono or stereo)
    pub file: PathBuf,

    /// HRTF profile to use (built-in when empty or unknown)
    #[arg(long, default_value = "")]
    pub hrtf: String,

    /// Directory holding *.sofa HRTF profiles
    #[arg(long)]
    pub hrtf_dir: Option<PathBuf>,

    /// Orbit radius in meters
    #[arg(long, default_value_t = 2.0, value_parser = finite)]
    pub radius: f32,

    /// Orbit height in meters
    #[arg(long, default_value_t = 0.0, value_parser = finite, allow_negative_numbers = true)]
    pub height: f32,

    /// Seconds for one full orbit
    #[arg(long = "period", default_value_t = 8.0, value_parser = positive)]
    pub period_secs: f32,

    /// Separation of the two voices of a stereo file, in degrees
    #[arg(long = "stereo-angle", default_value_t = 30.0, value_parser = finite)]
    pub stereo_angle_deg: f32,

    /// Stop early after this many seconds
    #[arg(long = "max-seconds", value_parser = positive)]
    pub max_secs: Option<f32>,
}

fn finite(value: &str) -> std::result::Result<f32, String> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("`{}` is not a finite number", value))
}

fn positive(value: &str) -> std::result::Result<f32, String> {
    let number = finite(value)?;
    if number > 0.0 {
        Ok(number)
    } else {
        Err(format!("`{}` must be greater than zero", value))
    }
}

/// Angle of the orbit after `elapsed` seconds.
fn orbit_angle(elapsed: f32, period_secs: f32) -> f32 {
    (elapsed / period_secs).fract() * TAU
}

pub fn run(args: Args) -> Result<()> {
    let mut backend = SteamBackendDesc::new();
    if let Some(dir) = &args.hrtf_dir {
        backend = backend.hrtf_dir(dir);
    }
    let desc = OrbitSonicEngineDesc::new()
        .poll_interval(Duration::from_millis(100))
        .initial_stereo_angle(args.stereo_angle_deg.to_radians())
        .backend(backend);

    let engine = OrbitSonicEngine::with_defaults(desc)?;
    let hrtfs = engine.available_hrtfs();
    if !hrtfs.is_empty() {
        log::info!("Available HRTF profiles: {}", hrtfs.join(", "));
    }

    if !engine.initialize(&args.hrtf) {
        bail!("Failed to initialize the audio engine");
    }

    let (finished_tx, finished_rx) = unbounded::<SoundId>();
    engine.set_callback(move |id: &SoundId| {
        let _ = finished_tx.send(id.clone());
    });

    let sound = engine.create_sound(&args.file);
    if sound.is_empty() {
        engine.cleanup();
        bail!("Could not load {}", args.file.display());
    }

    log::info!(
        "Loaded {} ({:.1}s, {})",
        sound,
        engine.get_sound_duration(&sound),
        if engine.is_sound_stereo(&sound) {
            "stereo"
        } else {
            "mono"
        }
    );

    engine.set_sound_position(&sound, 0.0, args.radius, args.height);
    engine.play_sound(&sound);

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed().as_secs_f32();
        if args.max_secs.is_some_and(|max| elapsed >= max) {
            log::info!("Stopping after {:.1}s", elapsed);
            engine.stop_sound(&sound);
            break;
        }

        let angle = orbit_angle(elapsed, args.period_secs);
        engine.set_sound_position(&sound, angle, args.radius, args.height);

        for event in engine.poll_events() {
            log::debug!("{:?}", event);
        }

        match finished_rx.recv_timeout(UPDATE_INTERVAL) {
            Ok(id) => {
                log::info!("Sound {} finished after {:.1}s", id, elapsed);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.cleanup();
    for event in engine.poll_events() {
        if let OrbitSonicEvent::EngineShutdown = event {
            log::info!("Engine shut down");
        }
    }
    Ok(())
}
