//! Session server: accepts participant devices, records their motion to BVH
//! and drives the session from the console.

use std::fs::{self, File};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use suit_capture::config::{Config, DEFAULT_CONFIG_PATH};
use suit_capture::dispatch::Dispatcher;
use suit_capture::session::{LogObserver, SessionManager};

fn init_logging() -> Result<String> {
    fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/server_{}.log", ts);
    let file = File::create(&path).with_context(|| format!("failed to create {path}"))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;
    Ok(path)
}

#[derive(Debug, Clone, Copy)]
enum ConsoleCommand {
    StartSession,
    StartRecording,
    Calibrate,
    EndSession,
    Quit,
}

fn spawn_console(tx: mpsc::Sender<ConsoleCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let cmd = match line.trim() {
                "s" => ConsoleCommand::StartSession,
                "r" => ConsoleCommand::StartRecording,
                "c" => ConsoleCommand::Calibrate,
                "e" => ConsoleCommand::EndSession,
                "q" => ConsoleCommand::Quit,
                "" => continue,
                other => {
                    eprintln!("[input] unknown command: {other}");
                    continue;
                }
            };
            if tx.send(cmd).is_err() {
                break;
            }
        }
    });
}

fn main() -> Result<()> {
    let log_path = init_logging()?;
    info!("Suit Capture Server ({})", env!("GIT_VERSION"));
    info!("Log: {log_path}");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    info!(
        "[config] listen={}, sessions_dir={}, capture_fps={}, trigger={}",
        config.server.listen_addr,
        config.recording.sessions_dir.display(),
        config.recording.capture_fps,
        config.imu.cycle_trigger
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("suit-net")
        .build()?;
    let tick = Duration::from_secs_f64(1.0 / f64::from(config.server.tick_hz.max(1)));
    let mut manager = SessionManager::bind(
        config,
        runtime.handle(),
        Dispatcher::new(),
        Box::new(LogObserver),
    )?;

    // SIGUSR1 → calibrate
    let trigger_calibration = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&trigger_calibration))?;

    let (console_tx, console_rx) = mpsc::channel();
    spawn_console(console_tx);
    info!("Commands: s=start session, r=record, c=calibrate, e=end session, q=quit");

    let mut last = Instant::now();
    loop {
        if trigger_calibration.swap(false, Ordering::Relaxed) {
            manager.calibrate();
        }

        let mut quit = false;
        while let Ok(cmd) = console_rx.try_recv() {
            match cmd {
                ConsoleCommand::StartSession => manager.start_session(),
                ConsoleCommand::StartRecording => {
                    if let Err(e) = manager.start_recording() {
                        error!("[session] {e:#}");
                    }
                }
                ConsoleCommand::Calibrate => manager.calibrate(),
                ConsoleCommand::EndSession => manager.end_session(),
                ConsoleCommand::Quit => quit = true,
            }
        }
        if quit {
            break;
        }

        let now = Instant::now();
        manager.tick(now.duration_since(last).as_secs_f64());
        last = now;

        let elapsed = last.elapsed();
        if elapsed < tick {
            std::thread::sleep(tick - elapsed);
        } else {
            debug!("[main] tick overran by {:?}", elapsed - tick);
        }
    }

    manager.end_session();
    // connection tasks still need to flush SESSION_END
    std::thread::sleep(Duration::from_millis(200));
    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("bye");
    Ok(())
}
