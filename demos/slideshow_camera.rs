//! MJPEG server fed by a fake camera that cycles through JPEG files
//!
//! Run with: cargo run --example slideshow_camera <JPEG_DIR> [PORT] [FPS]
//!
//! Examples:
//!   cargo run --example slideshow_camera ./frames              # port 8080, 10 fps
//!   cargo run --example slideshow_camera ./frames 9000 25      # port 9000, 25 fps
//!
//! Then open http://<host>:<port>/ in a browser on the local network, or:
//!   ffplay -f mjpeg http://127.0.0.1:8080/
//!
//! Type a port number followed by Enter to move the server to that port while
//! it is running, `p` to pause, `r` to resume. Ctrl+C stops the server.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mjpeg_serve::{FrameStore, MjpegServer, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

fn load_frames(dir: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths.iter().map(std::fs::read).collect()
}

/// Stand-in for a camera callback thread
fn spawn_camera(
    store: Arc<FrameStore>,
    frames: Vec<Vec<u8>>,
    fps: u32,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let interval = Duration::from_secs(1) / fps.max(1);

    std::thread::spawn(move || {
        for frame in frames.iter().cycle() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            // The capture buffer is reused by real cameras, hence the copy
            store.publish_copy(frame);
            std::thread::sleep(interval);
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_serve=debug".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => {
            eprintln!("usage: slideshow_camera <JPEG_DIR> [PORT] [FPS]");
            std::process::exit(2);
        }
    };
    let port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(8080);
    let fps: u32 = args.next().map(|f| f.parse()).transpose()?.unwrap_or(10);

    let frames = load_frames(&dir)?;
    if frames.is_empty() {
        eprintln!("no .jpg/.jpeg files in {}", dir.display());
        std::process::exit(2);
    }
    println!("Loaded {} frames from {}", frames.len(), dir.display());

    let server = MjpegServer::new(ServerConfig::with_port(port));
    server.start().await?;
    println!(
        "Serving MJPEG on {:?} (boundary {}, accept timeout {:?})",
        server.local_addr(),
        server.config().boundary,
        server.config().accept_timeout
    );

    let stop = Arc::new(AtomicBool::new(false));
    let camera = spawn_camera(
        Arc::clone(server.frame_store()),
        frames,
        fps,
        Arc::clone(&stop),
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stats_tick = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_tick.tick() => {
                let stats = server.stats();
                println!(
                    "state={:?} clients={} frames_sent={} bitrate={} bps",
                    server.state(),
                    stats.active_connections,
                    stats.frames_sent,
                    stats.bitrate()
                );
            }
            line = stdin.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("stdin: {}", e);
                        break;
                    }
                };
                match line.trim() {
                    "p" => server.pause().await,
                    "r" => {
                        if let Err(e) = server.resume().await {
                            println!("resume failed: {}", e);
                        }
                    }
                    other => match other.parse::<u16>() {
                        Ok(port) => {
                            println!("moving from port {} to {}", server.port(), port);
                            server.set_port(port);
                        }
                        Err(_) => println!("expected a port number, `p` or `r`"),
                    },
                }
            }
        }
    }

    println!("Shutting down");
    stop.store(true, Ordering::Relaxed);
    server.stop().await;
    let _ = camera.join();

    Ok(())
}
