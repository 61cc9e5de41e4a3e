//! Neuroweave daemon: keeps a network ticking in the background
//!
//! The daemon owns one network and manages:
//! - The run loop (sensor stimulation + buffer/commit ticks)
//! - Persistent storage of the network image
//! - A JSON-lines IPC server for `neuroweave-cli` and other clients
//!
//! Storage locations:
//! - Linux: ~/.local/share/neuroweave/
//! - Windows: %APPDATA%\neuroweave\
//! - MacOS: ~/Library/Application Support/neuroweave/

use neuroweave::network::{Diagnostics, Network};
use neuroweave::node::{ConnectionId, SensorId};
use neuroweave::topology::{build_network, NetworkConfig};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader as StdBufReader, BufWriter, Write as _};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time;
use tracing::{error, info, warn};

mod error;
mod paths;

use error::DaemonError;
use paths::AppPaths;

const ADDR: &str = "127.0.0.1:9877";

/// Frames between automatic saves while running.
const AUTOSAVE_FRAMES: u64 = 3600;

const MAX_STEP_FRAMES: u32 = 100_000;

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    Step { frames: u32 },
    InjectSensor { sensor: usize, value: f64 },
    RandomizeSensors,
    ResetConnections,
    ResetConnection { connection: usize },
    SaveNetwork,
    LoadNetwork,
    ResetNetwork,
    Shutdown,
    SetFramerate { fps: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(StateSnapshot),
    Success { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSnapshot {
    running: bool,
    frame: u64,
    target_fps: u32,
    diagnostics: Diagnostics,
    topology_warnings: usize,
}

impl Response {
    fn ok(message: impl Into<String>) -> Self {
        Response::Success {
            message: message.into(),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon State
// ═══════════════════════════════════════════════════════════════════════════

struct DaemonState {
    network: Network,
    config: NetworkConfig,
    running: bool,
    frame: u64,
    paths: AppPaths,
    last_autosave_frame: u64,
    target_fps: u32,
}

impl DaemonState {
    fn new(paths: AppPaths) -> Self {
        let config = match load_config(&paths) {
            Ok(Some(cfg)) => {
                info!("Using config from {:?}", paths.config_file());
                cfg
            }
            Ok(None) => NetworkConfig::default().with_seed(123),
            Err(e) => {
                warn!("{}; using defaults", e);
                NetworkConfig::default().with_seed(123)
            }
        };
        Self::with_config(paths, config)
    }

    fn with_config(paths: AppPaths, config: NetworkConfig) -> Self {
        let mut network = build_network(&config);
        network.randomize_sensors();
        Self {
            network,
            config,
            running: false,
            frame: 0,
            paths,
            last_autosave_frame: 0,
            target_fps: 60,
        }
    }

    fn advance(&mut self) {
        let delta = 1.0 / f64::from(self.target_fps);
        self.network.randomize_random_sensor();
        self.network.tick(delta);
        self.frame += 1;
    }

    fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.advance();

        if self.frame - self.last_autosave_frame >= AUTOSAVE_FRAMES {
            match self.save_network() {
                Ok(()) => {
                    info!("Auto-save succeeded at frame {}", self.frame);
                    self.last_autosave_frame = self.frame;
                }
                Err(e) => error!("Auto-save failed at frame {}: {}", self.frame, e),
            }
        }
    }

    fn get_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            running: self.running,
            frame: self.frame,
            target_fps: self.target_fps,
            diagnostics: self.network.diagnostics(),
            topology_warnings: self.network.report().warnings().len(),
        }
    }

    fn save_network(&self) -> Result<(), DaemonError> {
        let path = self.paths.network_file();
        let io_err = |source: std::io::Error| DaemonError::Io {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(io_err)?;
        let mut w = BufWriter::new(file);
        self.network
            .save_image_to(&mut w)
            .map_err(|source| DaemonError::Image {
                path: path.clone(),
                source,
            })?;
        w.flush().map_err(io_err)?;

        info!("Network saved to {:?}", path);
        Ok(())
    }

    fn load_network(&mut self) -> Result<(), DaemonError> {
        let path = self.paths.network_file();
        if !path.exists() {
            return Err(DaemonError::NotFound(path));
        }
        let file = File::open(&path).map_err(|source| DaemonError::Io {
            path: path.clone(),
            source,
        })?;
        self.network = Network::load_image_from(&mut StdBufReader::new(file))
            .map_err(|source| DaemonError::Image {
                path: path.clone(),
                source,
            })?;
        self.config = self.network.config().clone();
        info!("Network loaded from {:?}", path);
        Ok(())
    }

    fn reset_network(&mut self) {
        let (paths, config, fps) = (self.paths.clone(), self.config.clone(), self.target_fps);
        *self = Self::with_config(paths, config);
        self.target_fps = fps;
        info!("Network rebuilt from config");
    }

    fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::GetState => Response::State(self.get_snapshot()),
            Request::Start => {
                self.running = true;
                Response::ok("Started")
            }
            Request::Stop => {
                self.running = false;
                match self.save_network() {
                    Ok(()) => Response::ok("Stopped and saved"),
                    Err(e) => Response::err(format!("Stopped but save failed: {}", e)),
                }
            }
            Request::Step { frames } => {
                if self.running {
                    return Response::err("Stop the run loop before stepping");
                }
                let frames = frames.clamp(1, MAX_STEP_FRAMES);
                for _ in 0..frames {
                    self.advance();
                }
                Response::ok(format!("Stepped {} frames (frame {})", frames, self.frame))
            }
            Request::InjectSensor { sensor, value } => {
                if self.network.inject_sensor_value(SensorId(sensor), value) {
                    let v = self
                        .network
                        .sensor(SensorId(sensor))
                        .map(|s| s.value())
                        .unwrap_or(value);
                    Response::ok(format!("Sensor {} set to {:.4}", sensor, v))
                } else {
                    Response::err(format!("No sensor {}", sensor))
                }
            }
            Request::RandomizeSensors => {
                self.network.randomize_sensors();
                Response::ok("Sensors randomized")
            }
            Request::ResetConnections => {
                self.network.reset_connections();
                Response::ok(format!(
                    "{} connection weights reset",
                    self.network.connections().len()
                ))
            }
            Request::ResetConnection { connection } => {
                if self.network.reset_connection(ConnectionId(connection)) {
                    Response::ok(format!("Connection {} reset", connection))
                } else {
                    Response::err(format!("No connection {}", connection))
                }
            }
            Request::SaveNetwork => match self.save_network() {
                Ok(()) => Response::ok("Network saved"),
                Err(e) => Response::err(e.to_string()),
            },
            Request::LoadNetwork => match self.load_network() {
                Ok(()) => Response::ok("Network loaded"),
                Err(e) => Response::err(e.to_string()),
            },
            Request::ResetNetwork => {
                self.reset_network();
                Response::ok("Network reset")
            }
            Request::Shutdown => match self.save_network() {
                Ok(()) => {
                    info!("Shutdown requested; network saved");
                    tokio::spawn(async {
                        // Give the response a moment to flush before exiting.
                        time::sleep(Duration::from_millis(50)).await;
                        std::process::exit(0);
                    });
                    Response::ok("Shutting down")
                }
                Err(e) => Response::err(format!("Save failed, aborting shutdown: {}", e)),
            },
            Request::SetFramerate { fps } => {
                let clamped = fps.clamp(1, 1000);
                self.target_fps = clamped;
                info!("Framerate set to {} FPS", clamped);
                Response::ok(format!("Framerate set to {} FPS", clamped))
            }
        }
    }
}

fn load_config(paths: &AppPaths) -> Result<Option<NetworkConfig>, DaemonError> {
    let path = paths.config_file();
    if !path.exists() {
        return Ok(None);
    }
    let cfg = NetworkConfig::from_json_file(&path).map_err(|e| DaemonError::Config {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    cfg.validate().map_err(|reason| DaemonError::Config {
        path: path.clone(),
        reason: reason.to_string(),
    })?;
    Ok(Some(cfg))
}

// ═══════════════════════════════════════════════════════════════════════════
// Client Handler
// ═══════════════════════════════════════════════════════════════════════════

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(Request::GetState) => Response::State(state.read().await.get_snapshot()),
            Ok(request) => state.write().await.handle(request),
            Err(e) => Response::err(format!("Invalid request: {}", e)),
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let paths = AppPaths::new()?;
    info!("Data directory: {:?}", paths.data_dir());
    info!("Network file: {:?}", paths.network_file());

    let state = Arc::new(RwLock::new(DaemonState::new(paths)));

    // Save on Ctrl-C so state persists even if the daemon is stopped abruptly.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let s = state.read().await;
                if let Err(e) = s.save_network() {
                    error!("Ctrl-C save failed: {}", e);
                } else {
                    info!("Ctrl-C: network saved");
                }
                std::process::exit(0);
            }
        });
    }

    {
        let mut s = state.write().await;
        if let Err(e) = s.load_network() {
            warn!("Could not load network: {}", e);
            info!("Starting with freshly generated network");
        }
    }

    let listener = TcpListener::bind(ADDR).await?;
    info!("Neuroweave daemon listening on {}", ADDR);

    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let target_fps = state_clone.read().await.target_fps;
            let frame_millis = u64::from((1000 / target_fps).max(1));
            time::sleep(Duration::from_millis(frame_millis)).await;

            state_clone.write().await.tick();
        }
    });

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let state_clone = Arc::clone(&state);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state_clone).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}
