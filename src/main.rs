// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use rand::Rng;

use treelogger::config::{self, AppConfig};
use treelogger::{FlushStatus, Writer};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".into());

    let cfg: AppConfig = config::load(&cfg_path)?;
    info!("[treelogger] loaded {}", cfg_path);

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[treelogger] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    let writer = Writer::new(cfg.writer.clone())?;
    info!("[treelogger] writing to {}", cfg.writer.base_dir);

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    let sample_interval = Duration::from_millis(cfg.demo.sample_interval_ms.max(1));
    let flush_interval = Duration::from_millis(cfg.demo.flush_interval_ms.max(1));
    let deadline = cfg.demo.run_secs.map(|s| Instant::now() + Duration::from_secs(s));

    let started = Instant::now();
    let mut last_flush = Instant::now();
    let mut counter: u64 = 0;
    let mut rng = rand::thread_rng();

    while running.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        let t = started.elapsed().as_secs_f64();
        let value = (t * std::f64::consts::TAU / 10.0).sin() + rng.gen_range(-0.05..0.05);

        if let Err(e) = writer.add_f64("sine.csv", (value * 1000.0).round() / 1000.0) {
            error!("[treelogger] add failed: {}", e);
        }
        if let Err(e) = writer.add("counter.bin", &counter.to_le_bytes()) {
            error!("[treelogger] add failed: {}", e);
        }
        counter += 1;

        if last_flush.elapsed() >= flush_interval {
            let status = format!("samples={} uptime={:.1}s", counter, t);
            if let Err(e) = writer.add_str("status.txt", &status) {
                error!("[treelogger] add failed: {}", e);
            }

            match writer.flush() {
                Ok(FlushStatus::Written(report)) => debug!(
                    "[treelogger] flushed {} units ({} bytes, {} failures)",
                    report.units, report.bytes, report.failures
                ),
                Ok(other) => debug!("[treelogger] flush: {:?}", other),
                Err(e) => error!("[treelogger] flush failed: {}", e),
            }
            last_flush = Instant::now();
        }

        std::thread::sleep(sample_interval);
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[treelogger] shutting down…");
    writer.close()?;
    info!("[treelogger] shutdown complete ({} samples)", counter);

    Ok(())
}
