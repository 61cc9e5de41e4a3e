//! CLI client for the `neuroweaved` daemon.
//!
//! Examples:
//!   neuroweave-cli status
//!   neuroweave-cli start
//!   neuroweave-cli step 10
//!   neuroweave-cli inject 3 0.75
//!   neuroweave-cli reset-weights
//!   neuroweave-cli save
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use neuroweave::network::Diagnostics;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

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
    #[serde(default)]
    target_fps: u32,
    diagnostics: Diagnostics,
    #[serde(default)]
    topology_warnings: usize,
}

fn usage() -> ! {
    eprintln!("neuroweave-cli (talks to neuroweaved @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: neuroweave-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show daemon state");
    eprintln!("  start | stop                Control run loop");
    eprintln!("  step [frames]               Advance while stopped (default 1)");
    eprintln!("  inject <sensor> <value>     Set a sensor value");
    eprintln!("  randomize                   Randomize every sensor");
    eprintln!("  reset-weights               Re-draw every connection weight");
    eprintln!("  reset-weight <connection>   Re-draw one connection weight");
    eprintln!("  save | load | reset         Persistence controls");
    eprintln!("  shutdown                    Save and exit daemon");
    eprintln!("  fps <1-1000>                Set simulation framerate");
    eprintln!("  paths                       Show data directory and network file path");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn arg(args: &[String], i: usize) -> &str {
    match args.get(i) {
        Some(a) => a.as_str(),
        None => usage(),
    }
}

fn print_state(s: StateSnapshot) {
    let d = &s.diagnostics;
    println!(
        "running={} frame={} fps={} cycles={}",
        s.running, s.frame, s.target_fps, d.cycles,
    );
    println!(
        "network: sensors={} neurons={} (in={} out={} interior={} isolated={}) conns={} warnings={}",
        d.sensor_count,
        d.neuron_count,
        d.input_neurons,
        d.output_neurons,
        d.interior_neurons,
        d.isolated_neurons,
        d.connection_count,
        s.topology_warnings,
    );
    println!(
        "learning: avg_w={:.4} changed_conns={} changed_neurons={} out_err={:.4}",
        d.avg_weight, d.changed_connections, d.changed_neurons, d.output_error,
    );
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = &args[0];

    let make_error = |msg: &str| -> ! {
        eprintln!("{}", msg);
        process::exit(1);
    };

    let req = match cmd.as_str() {
        "status" => Request::GetState,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "step" => {
            let frames = match args.get(1) {
                Some(n) => n
                    .parse()
                    .unwrap_or_else(|_| make_error("step count must be a number")),
                None => 1,
            };
            Request::Step { frames }
        }
        "inject" => {
            let sensor: usize = arg(&args, 1)
                .parse()
                .unwrap_or_else(|_| make_error("sensor must be an index"));
            let value: f64 = arg(&args, 2)
                .parse()
                .unwrap_or_else(|_| make_error("value must be a number"));
            Request::InjectSensor { sensor, value }
        }
        "randomize" => Request::RandomizeSensors,
        "reset-weights" => Request::ResetConnections,
        "reset-weight" => {
            let connection: usize = arg(&args, 1)
                .parse()
                .unwrap_or_else(|_| make_error("connection must be an index"));
            Request::ResetConnection { connection }
        }
        "save" => Request::SaveNetwork,
        "load" => Request::LoadNetwork,
        "reset" => Request::ResetNetwork,
        "shutdown" => Request::Shutdown,
        "fps" => {
            let fps: u32 = arg(&args, 1)
                .parse()
                .unwrap_or_else(|_| make_error("fps must be a number (1-1000)"));
            Request::SetFramerate { fps }
        }
        "paths" => {
            // Special command: doesn't need daemon, just print paths
            #[cfg(unix)]
            {
                if let Ok(home) = std::env::var("HOME") {
                    let data_dir = format!("{}/.local/share/neuroweave", home);
                    println!("Data directory: {}", data_dir);
                    println!("Network file: {}/network.nwv", data_dir);
                }
            }
            #[cfg(windows)]
            {
                if let Ok(appdata) = std::env::var("APPDATA") {
                    let data_dir = format!("{}\\neuroweave", appdata);
                    println!("Data directory: {}", data_dir);
                    println!("Network file: {}\\network.nwv", data_dir);
                }
            }
            process::exit(0);
        }
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::State(s)) => print_state(s),
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
