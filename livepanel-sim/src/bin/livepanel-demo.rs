//! Scripted control-panel session against the virtual devices.
//!
//! Turns sources on, records for a few seconds, takes a screenshot and
//! exports everything into the output directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use livepanel_core::{
    export_artifact, export_screenshot, CaptureError, FilterMode, JsonFilePreferenceStore, MediaSession,
    RecorderState, RecordingArtifact, SessionConfig, SessionDelegate, SourceKind,
};
use livepanel_sim::{TintFilter, VirtualCaptureProvider, VirtualEncoder};

/// Livepanel demo - record a session from virtual capture devices
#[derive(Parser, Debug)]
#[command(name = "livepanel-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory the recording, its metadata and the screenshot are written to
    #[arg(short, long, default_value = "recordings")]
    output: PathBuf,

    /// Seconds to record
    #[arg(short, long, default_value_t = 3)]
    seconds: u64,

    /// Record the camera instead of the screen
    #[arg(long)]
    camera_only: bool,

    /// Camera filter: none, a or b
    #[arg(long, default_value = "none")]
    filter: FilterMode,

    /// Microphone device id (defaults to the saved selection)
    #[arg(long)]
    microphone: Option<String>,

    /// Microphone volume 0-100, saved for next time
    #[arg(long)]
    mic_volume: Option<u8>,

    /// Preference file
    #[arg(long, default_value = "livepanel-preferences.json")]
    preferences: PathBuf,

    /// Increase logging verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("livepanel_core", args.log_level());
    builder.filter_module("livepanel_sim", args.log_level());
    builder.filter_module("livepanel_demo", args.log_level());
    builder.format_timestamp_millis().init();
}

/// Prints session events to the log.
struct LoggingDelegate;

impl SessionDelegate for LoggingDelegate {
    fn on_source_changed(&self, kind: SourceKind, active: bool) {
        log::info!("[event] {} {}", kind, if active { "on" } else { "off" });
    }

    fn on_recorder_state_changed(&self, state: RecorderState) {
        log::info!("[event] recorder {:?}", state);
    }

    fn on_warning(&self, warning: &CaptureError) {
        log::warn!("[event] {} ({})", warning, warning.category().guidance());
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("[event] {}", error);
    }

    fn on_recording_finished(&self, artifact: &RecordingArtifact) {
        log::info!("[event] recording ready: {} ({} bytes)", artifact.file_name, artifact.len());
    }
}

async fn run(args: &Args) -> Result<(), CaptureError> {
    let store = Arc::new(JsonFilePreferenceStore::open(&args.preferences));
    let mut session = MediaSession::new(
        SessionConfig::default(),
        Arc::new(VirtualCaptureProvider::default()),
        Box::new(VirtualEncoder::new()),
        store,
    )?;
    session.set_delegate(Arc::new(LoggingDelegate));
    session.set_filter_gateway(Arc::new(TintFilter::default()));

    let inputs = session.list_audio_inputs()?;
    println!("Audio inputs:");
    for input in &inputs {
        println!("  {}{} ({})", input.label, if input.is_default { " [default]" } else { "" }, input.id);
    }

    if let Some(percent) = args.mic_volume {
        session.set_mic_volume(percent);
    }
    if let Some(device) = &args.microphone {
        session.set_microphone_device(device).await?;
    }

    if !args.camera_only {
        session.start_screen(None).await?;
    }
    session.start_camera(None).await?;
    session.start_microphone(None).await?;
    let outcome = session.set_filter_mode(args.filter).await;
    log::info!("Filter: {:?}", outcome);

    let started = session.start_recording()?;
    println!(
        "Recording {} (video: {:?}, audio: {})",
        started.format.mime_type, started.video_origin, started.has_audio
    );

    for _ in 0..args.seconds {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let levels = session.current_levels();
        println!(
            "  mic {:.3} (peak {:.3})  chunks {}",
            levels.mic_level,
            levels.peak_mic_level,
            session.recorded_chunks()
        );
    }

    if !args.camera_only {
        let screenshot = session.take_screenshot()?;
        let path = export_screenshot(&screenshot, &args.output)?;
        println!("Screenshot: {}", path.display());
    }

    match session.stop_recording()? {
        Some(artifact) => {
            let path = export_artifact(&artifact, &args.output)?;
            println!(
                "Recording: {} ({} bytes, {} chunks, sha256 {})",
                path.display(),
                artifact.len(),
                artifact.metadata.chunk_count,
                artifact.metadata.checksum
            );
        }
        None => println!("Nothing was recorded"),
    }

    let diagnostics = session.diagnostics();
    log::info!("Diagnostics: {:?}", diagnostics);
    session.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("livepanel-demo: {} ({})", e, e.category().guidance());
            ExitCode::FAILURE
        }
    }
}
