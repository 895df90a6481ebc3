//! tempestctl - inspect and exercise the capture policy plane
//!
//! Subcommands mirror what an operator needs during an exercise: dump the
//! layer policy table, map a THREATCON level, run a clearance check, and
//! drive a stub device through a full authorize -> capture -> declassify
//! round without real hardware.

use anyhow::Result;
use clap::{Parser, Subcommand};

use tempest_kernel::{
    capture_frame, tempest_for_threatcon, ChunkWriter, DeviceIdentity, EventLog, EventType,
    FileSink, KernelConfig, LoopbackControl, PolicyGate, Severity, SinkKind, SqliteSink,
    StubFrameSource, TempestController, ThreatCon,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the layer policy table.
    Policy,
    /// Map a THREATCON level to its mandated TEMPEST state.
    Threatcon {
        /// Level: normal|alpha|bravo|charlie|delta|emergency
        level: String,
    },
    /// Check session clearance for a device role and classification.
    Clearance {
        role: String,
        classification: String,
    },
    /// Drive a stub device through authorize -> capture once.
    Capture {
        /// Classification marking applied to the captured frame.
        #[arg(long, default_value = "UNCLASSIFIED")]
        classification: String,
        /// Device layer (0-8).
        #[arg(long, default_value_t = 3)]
        layer: u32,
        /// THREATCON level to apply before capturing (overrides config).
        #[arg(long)]
        threatcon: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = KernelConfig::load()?;
    let gate = PolicyGate::new(cfg.clearance, cfg.threatcon);

    match args.command {
        Command::Policy => cmd_policy(&gate),
        Command::Threatcon { level } => cmd_threatcon(&level),
        Command::Clearance {
            role,
            classification,
        } => cmd_clearance(&gate, &role, &classification),
        Command::Capture {
            classification,
            layer,
            threatcon,
        } => cmd_capture(&cfg, gate, &classification, layer, threatcon.as_deref()),
    }
}

fn cmd_policy(gate: &PolicyGate) -> Result<()> {
    println!("layer  max_resolution  min_tempest");
    for layer in 0..=tempest_kernel::MAX_LAYER {
        let policy = gate.layer_policy(layer)?;
        println!(
            "L{}     {:>4}x{:<6}     {}",
            policy.layer, policy.max_width, policy.max_height, policy.min_tempest
        );
    }
    Ok(())
}

fn cmd_threatcon(level: &str) -> Result<()> {
    let level = ThreatCon::parse(level)?;
    println!("{} -> {}", level, tempest_for_threatcon(level));
    Ok(())
}

fn cmd_clearance(gate: &PolicyGate, role: &str, classification: &str) -> Result<()> {
    let decision = gate.check_clearance(role, classification);
    println!(
        "session={} role={} classification={} -> {:?}",
        gate.clearance(),
        role,
        classification,
        decision
    );
    Ok(())
}

fn cmd_capture(
    cfg: &KernelConfig,
    mut gate: PolicyGate,
    classification: &str,
    layer: u32,
    threatcon: Option<&str>,
) -> Result<()> {
    if let Some(raw) = threatcon {
        gate.set_threatcon(ThreatCon::parse(raw)?);
    }

    let events = EventLog::new(cfg.telemetry.ring_capacity, cfg.telemetry.profile);
    let identity = DeviceIdentity {
        dev_id: 0,
        role: "generic_webcam".to_string(),
        layer,
    };
    let mut controller = TempestController::new(
        identity,
        Some(Box::new(LoopbackControl::default())),
        events.clone(),
    );

    controller.apply_threatcon(&gate)?;
    log::info!(
        "device at {} under THREATCON {}",
        controller.state(),
        gate.threatcon()
    );

    let mut source = StubFrameSource::new(640, 480);
    match controller.authorize_capture(&gate, "tempestctl") {
        Ok(token) => {
            let frame = capture_frame(&mut source, token, classification)?;
            events.emit_simple(0, EventType::FrameAcquired, Severity::Info, frame.sequence);
            println!(
                "captured frame seq={} {}x{} ({} bytes, {})",
                frame.sequence,
                frame.width,
                frame.height,
                frame.len(),
                frame.classification()
            );
        }
        Err(err) if err.is_denial() => {
            println!("capture denied: {}", err);
        }
        Err(err) => return Err(err.into()),
    }

    flush_events(cfg, &events)?;
    let stats = events.stats();
    log::info!(
        "audit: {} emitted, {} dropped, {} flushed",
        stats.emitted,
        stats.dropped,
        stats.flushed
    );
    Ok(())
}

fn flush_events(cfg: &KernelConfig, events: &EventLog) -> Result<()> {
    let mut writer = ChunkWriter::new(None);
    match cfg.telemetry.sink {
        SinkKind::File => {
            let mut sink = FileSink::open(std::path::Path::new(&cfg.telemetry.sink_path))?;
            writer.flush(events, &mut sink)?;
        }
        SinkKind::Sqlite => {
            let mut sink = SqliteSink::open(&cfg.telemetry.sink_path)?;
            writer.flush(events, &mut sink)?;
        }
    }
    Ok(())
}
