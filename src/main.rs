//! reverbrt CLI: runs one audio session and applies effect settings typed on stdin.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;

use clap::Parser;
use reverbrt::control::{control_channel, ControlMessage, ControlSender};
use reverbrt::device::{self, Direction};
use reverbrt::monitor::{monitor_channel, MonitorReceiver, MONITOR_CAPACITY};
use reverbrt::pipeline::{spawn_listener, Pipeline};
use reverbrt::session::{AudioSession, Mode, SessionConfig, SessionResult};
use reverbrt::shutdown::{join_with_timeout, stop_on_interrupt, StopFlag, JOIN_TIMEOUT};
use reverbrt::wav;
use reverbrt::{AmplifierSettings, ReverbSettings};

const RECORDINGS_DIR: &str = "recordings";

#[derive(Parser, Debug)]
#[command(name = "reverbrt")]
#[command(about = "Real-time reverb and gain. Type commands and press Enter.")]
struct Cli {
    /// Operating mode
    #[arg(long, value_enum, default_value_t = Mode::Passthrough)]
    mode: Mode,

    /// Input device index (default device if omitted)
    #[arg(long)]
    input_device: Option<usize>,

    /// Output device index (default device if omitted)
    #[arg(long)]
    output_device: Option<usize>,

    /// WAV file to play in playback mode
    #[arg(long)]
    wav_path: Option<PathBuf>,

    /// Save the raw input of a passthrough session (record mode always saves)
    #[arg(long)]
    save_recording: bool,

    /// Input channels (device default if omitted)
    #[arg(long)]
    in_ch: Option<u16>,

    /// Output channels (device default if omitted)
    #[arg(long)]
    out_ch: Option<u16>,

    /// Log filter, e.g. `info` or `reverbrt=debug`
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print devices by index and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_millis()
        .init();

    if cli.list_devices {
        if let Err(e) = print_devices() {
            log::error!("{}", e);
            process::exit(1);
        }
        return;
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let stop = StopFlag::new();
    if let Err(e) = stop_on_interrupt(stop.clone()) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }
    let (monitor_tx, monitor_rx) = monitor_channel(MONITOR_CAPACITY);
    let (control_tx, control_rx) = control_channel();
    let session = AudioSession::new(config, monitor_tx.clone());

    let listener = spawn_listener(control_rx, session.pipeline(), stop.clone());
    let monitor = spawn_monitor_drain(monitor_rx, stop.clone());
    spawn_stdin_reader(control_tx, session.pipeline(), stop.clone());

    println!("reverbrt (Ctrl+C to stop). Commands: reverb <decay> <delay> <wet> [taps] | reverb off | amp <scale> | amp off | clip on|off | status | quit | help");

    let result = session.run(&stop);
    stop.stop();
    if let Err(e) = &result {
        log::error!("Session failed: {}", e);
    }

    for handle in [listener, monitor] {
        match handle {
            Ok(h) => {
                join_with_timeout(h, JOIN_TIMEOUT);
            }
            Err(e) => log::warn!("Worker thread was never started: {}", e),
        }
    }

    if monitor_tx.dropped() > 0 {
        log::info!("Monitor dropped {} blocks", monitor_tx.dropped());
    }

    if session.config().captures() {
        let recorded = session.capture().take_concatenated();
        if let Err(e) = wav::save_recording(
            Path::new(RECORDINGS_DIR),
            session.config().sample_rate,
            &recorded,
        ) {
            log::error!("Failed to save recording: {}", e);
        }
    }

    if result.is_err() {
        process::exit(1);
    }
}

/// Flags → session config. Channel counts and rate not given on the command line come from
/// the selected devices' defaults.
fn build_config(cli: &Cli) -> SessionResult<SessionConfig> {
    let host = cpal::default_host();
    let mut config = SessionConfig::new(cli.mode)
        .with_devices(cli.input_device, cli.output_device)
        .with_capture(cli.save_recording);
    if let Some(path) = &cli.wav_path {
        config = config.with_wav_path(path);
    }

    let (mut in_ch, mut out_ch) = (config.input_channels, config.output_channels);
    if cli.mode != Mode::Playback {
        let input = device::find_device(&host, Direction::Input, cli.input_device)?;
        let (channels, rate) = device::describe(&input, Direction::Input)?;
        in_ch = cli.in_ch.unwrap_or(channels);
        config = config.with_sample_rate(rate);
    }
    if cli.mode != Mode::Record {
        let output = device::find_device(&host, Direction::Output, cli.output_device)?;
        let (channels, rate) = device::describe(&output, Direction::Output)?;
        out_ch = cli.out_ch.unwrap_or(channels);
        if cli.mode == Mode::Playback {
            config = config.with_sample_rate(rate);
        }
    }
    Ok(config.with_channels(in_ch, out_ch))
}

fn print_devices() -> SessionResult<()> {
    let host = cpal::default_host();
    for direction in [Direction::Input, Direction::Output] {
        println!("{} devices:", direction);
        for info in device::list_devices(&host, direction)? {
            println!(
                "  [{}] {} ({} ch, {} Hz)",
                info.index, info.name, info.channels, info.sample_rate
            );
        }
    }
    Ok(())
}

/// Keeps the monitor feed moving. With no visualizer attached the blocks are only logged.
fn spawn_monitor_drain(rx: MonitorReceiver, stop: StopFlag) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("monitor-drain".into())
        .spawn(move || {
            while !stop.is_stopped() {
                if let Some(block) = rx.recv_timeout(Duration::from_millis(100)) {
                    let peak = reverbrt::audio_block::peak(&block);
                    log::trace!("monitor block: {} frames, peak {:.3}", block.len(), peak);
                }
            }
        })
}

/// Reads commands from stdin until `quit` or EOF, then sets `stop`. Not joined: a read
/// blocked on stdin ends with the process.
fn spawn_stdin_reader(tx: ControlSender, pipeline: std::sync::Arc<Pipeline>, stop: StopFlag) {
    let spawned = thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut lines = stdin.lock().lines();
            while let Some(Ok(line)) = lines.next() {
                if stop.is_stopped() {
                    return;
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_command(line, &tx, &pipeline) {
                    break;
                }
            }
            stop.stop();
        });
    if let Err(e) = spawned {
        log::warn!("Could not start stdin reader: {}", e);
    }
}

/// Handles one stdin line. Returns false on `quit`.
fn handle_command(line: &str, tx: &ControlSender, pipeline: &Pipeline) -> bool {
    if line.starts_with('{') {
        match tx.forward_json_lines(line.as_bytes()) {
            Ok(0) => println!("Malformed control message. Type 'help' for commands."),
            Ok(_) => {}
            Err(e) => log::warn!("{}", e),
        }
        return true;
    }

    let current = pipeline.snapshot();
    let parts: Vec<&str> = line.split_ascii_whitespace().collect();
    match parts.as_slice() {
        ["quit" | "q"] => return false,
        ["amp" | "a", "off"] => send(
            tx,
            ControlMessage::AmplifierSettings(AmplifierSettings {
                enabled: false,
                ..current.amplifier
            }),
        ),
        ["amp" | "a", v] => match v.parse::<f32>() {
            Ok(scale) if scale > 0.0 => {
                send(
                    tx,
                    ControlMessage::AmplifierSettings(AmplifierSettings {
                        scale,
                        enabled: true,
                        ..current.amplifier
                    }),
                );
                println!("Gain set to {}.", scale);
            }
            _ => println!("Usage: amp <scale > 0> | amp off"),
        },
        ["reverb" | "r", "off"] => send(
            tx,
            ControlMessage::ReverbSettings(ReverbSettings {
                enabled: false,
                ..current.reverb
            }),
        ),
        ["reverb" | "r", decay, delay, wet, rest @ ..] if rest.len() <= 1 => {
            let taps = rest.first().map_or(Ok(current.reverb.taps), |t| t.parse::<u32>());
            match (decay.parse::<f32>(), delay.parse::<u32>(), wet.parse::<f32>(), taps) {
                (Ok(decay), Ok(delay_samples), Ok(wet_level), Ok(taps)) => {
                    send(
                        tx,
                        ControlMessage::ReverbSettings(ReverbSettings {
                            enabled: true,
                            decay,
                            delay_samples,
                            wet_level,
                            taps,
                            allow_clipping: current.reverb.allow_clipping,
                        }),
                    );
                    println!(
                        "Reverb on: decay {}, delay {} samples, wet {}, {} taps.",
                        decay, delay_samples, wet_level, taps
                    );
                }
                _ => println!("Usage: reverb <decay> <delay_samples> <wet> [taps]"),
            }
        }
        ["clip", state @ ("on" | "off")] => {
            let allow_clipping = *state == "on";
            send(
                tx,
                ControlMessage::AmplifierSettings(AmplifierSettings {
                    allow_clipping,
                    ..current.amplifier
                }),
            );
            send(
                tx,
                ControlMessage::ReverbSettings(ReverbSettings {
                    allow_clipping,
                    ..current.reverb
                }),
            );
        }
        ["status" | "s"] => println!("{:#?}", current),
        ["help" | "h" | "?"] => {
            println!("  reverb <decay> <delay> <wet> [taps]  Enable reverb (delay in samples)");
            println!("  reverb off                           Bypass reverb");
            println!("  amp <scale>  (a <scale>)             Enable amplifier with linear gain");
            println!("  amp off                              Bypass amplifier");
            println!("  clip on|off                          Allow or guard against clipping");
            println!("  status (s)                           Show current settings");
            println!("  {{\"type\":...}}                        Raw JSON control message");
            println!("  quit (q)                             Stop and exit");
        }
        _ => println!("Unknown command. Type 'help' for commands."),
    }
    true
}

fn send(tx: &ControlSender, msg: ControlMessage) {
    if let Err(e) = tx.send(msg) {
        log::warn!("{}", e);
    }
}
