// Headless transport runner
//
// Plays the transport (with metronome) on the default output device, or
// renders blocks offline when no device is wanted or available, and prints
// the transport position once per second.

use clap::Parser;
use daw_transport::audio::default_output_sample_rate;
use daw_transport::logging::init_logger;
use daw_transport::{
    create_transport, create_transport_from_document, AudioStream, Command, EngineConfig,
    GrooveSettings, MetronomePlugin, ProjectManager, TempoMap, Tempo, TransportController,
    TransportEngine, TransportStatusSnapshot,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

/// UI poll period in real-time mode
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Block size used when rendering offline
const OFFLINE_BLOCK_FRAMES: usize = 512;

#[derive(Debug, Parser)]
#[command(name = "daw_transport", version, about = "Sample-accurate DAW transport runner")]
struct Cli {
    /// Engine config file (RON); defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeline document to load instead of an empty timeline
    #[arg(long)]
    project: Option<PathBuf>,

    /// Initial tempo for an empty timeline
    #[arg(long)]
    bpm: Option<f64>,

    /// How long to run
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    #[arg(long)]
    no_metronome: bool,

    /// Loop between two 1-based bars (end exclusive)
    #[arg(long = "loop", num_args = 2, value_names = ["START_BAR", "END_BAR"])]
    loop_bars: Option<Vec<u32>>,

    /// Log filter, e.g. "debug" or "daw_transport=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Render without an audio device
    #[arg(long)]
    offline: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("ERROR: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match cli.config.as_deref() {
        Some(path) => EngineConfig::load(path)?,
        None => match EngineConfig::default_path() {
            Some(path) => EngineConfig::load_or_default(&path)?,
            None => EngineConfig::default(),
        },
    };

    if let Some(bpm) = cli.bpm {
        config.default_bpm = bpm;
    }
    if cli.no_metronome {
        config.metronome_enabled = false;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(&cli)?;
    init_logger(&config.log_level);
    log::info!("=== DAW Transport {} ===", env!("CARGO_PKG_VERSION"));

    let mut offline = cli.offline;
    let sample_rate = if offline {
        config.sample_rate
    } else {
        match default_output_sample_rate() {
            Ok(rate) => rate,
            Err(err) => {
                log::warn!("{}; rendering offline instead", err);
                offline = true;
                config.sample_rate
            }
        }
    };

    let (mut controller, mut engine) = match &cli.project {
        Some(path) => {
            let document = ProjectManager::new(sample_rate).load_document(path)?;
            if document.sample_rate() != sample_rate && !offline {
                log::warn!(
                    "Document is at {} Hz, device at {} Hz; rendering offline",
                    document.sample_rate(),
                    sample_rate
                );
                offline = true;
            }
            create_transport_from_document(&config, document)
        }
        None => {
            let timeline = TempoMap::with_initial(
                sample_rate,
                Tempo::new(config.default_bpm)?,
                config.default_time_signature,
            )?;
            create_transport(&config, timeline, GrooveSettings::straight())
        }
    };

    if config.metronome_enabled {
        let mut metronome = MetronomePlugin::new(engine.sample_rate() as f32);
        metronome.set_volume(config.metronome_volume);
        engine.add_plugin(Box::new(metronome));
    }

    if let Some(bars) = &cli.loop_bars {
        set_loop(&mut controller, bars)?;
    }
    controller.submit(Command::Play)?;

    if offline {
        run_offline(&mut controller, engine, cli.seconds);
    } else {
        run_realtime(&mut controller, engine, &config, cli.seconds)?;
    }
    Ok(())
}

fn set_loop(controller: &mut TransportController, bars: &[u32]) -> Result<(), Box<dyn Error>> {
    let (start_bar, end_bar) = match bars {
        [start, end] if *start >= 1 && end > start => (*start, *end),
        _ => return Err(format!("invalid loop bars {:?}", bars).into()),
    };

    let clock = controller.timeline().clock();
    let start = clock.bar_start(start_bar - 1);
    let end = clock.bar_start(end_bar - 1);
    controller.submit(Command::SetLoopRegion { start, end })?;
    if !controller.loop_enabled() {
        controller.submit(Command::LoopToggle)?;
    }
    log::info!("Looping bars {} to {}", start_bar, end_bar);
    Ok(())
}

fn print_status(status: &TransportStatusSnapshot) {
    println!(
        "{:<9} {}  {:>7.2} BPM  {}{}",
        status.state.name(),
        status.musical_position,
        status.bpm(),
        status.time_signature,
        if status.loop_enabled { "  [loop]" } else { "" }
    );
}

fn run_offline(controller: &mut TransportController, mut engine: TransportEngine, seconds: f64) {
    let total_frames = (seconds.max(0.0) * engine.sample_rate()) as u64;
    let frames_per_report = engine.sample_rate() as u64;
    let channels = 2;
    let mut output = vec![0.0f32; OFFLINE_BLOCK_FRAMES * channels];

    let mut rendered = 0u64;
    let mut next_report = 0u64;
    while rendered < total_frames {
        engine.process_block(&mut output, channels);
        rendered += OFFLINE_BLOCK_FRAMES as u64;

        if rendered >= next_report {
            engine.publish_status();
            if let Some(status) = controller.poll() {
                print_status(&status);
            }
            next_report += frames_per_report;
        }
    }

    controller.poll();
    let monitor = engine.deadline_monitor();
    log::info!(
        "Rendered {} blocks offline, average load {:.2}%",
        monitor.blocks(),
        monitor.load_percentage()
    );
}

fn run_realtime(
    controller: &mut TransportController,
    engine: TransportEngine,
    config: &EngineConfig,
    seconds: f64,
) -> Result<(), Box<dyn Error>> {
    let stream = AudioStream::start(engine, config.max_block_frames)?;
    log::info!("Playing on '{}'", stream.device_name());

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(seconds.max(0.0));
    let mut last_report = Instant::now();

    while started.elapsed() < run_for {
        if stream.has_failed() {
            return Err("audio stream failed".into());
        }
        let status = controller.poll();
        if last_report.elapsed() >= Duration::from_secs(1)
            && let Some(status) = status.or(controller.latest_status())
        {
            print_status(&status);
            last_report = Instant::now();
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    controller.submit(Command::Stop)?;
    std::thread::sleep(POLL_INTERVAL);
    controller.poll();

    let monitor = stream.deadline_monitor();
    log::info!(
        "{} blocks, average load {:.1}%, {} overruns, worst block {} µs",
        monitor.blocks(),
        monitor.load_percentage(),
        monitor.overruns(),
        monitor.worst_block_ns() / 1000
    );
    Ok(())
}
