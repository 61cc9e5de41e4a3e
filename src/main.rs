use std::fs::File;
use std::io::BufWriter;

use neuroweave::observer::NetworkAdapter;
use neuroweave::prelude::*;
use tracing::{info, warn};

struct Options {
    config: Option<String>,
    twin: bool,
    frames: usize,
    seed: Option<u64>,
    json: bool,
    save: Option<String>,
}

fn print_help() {
    println!("neuroweave: spatially wired network with local double-buffered learning");
    println!();
    println!("Usage: neuroweave [options]");
    println!();
    println!("Options:");
    println!("  --config <file>   Load a JSON NetworkConfig (missing fields use defaults)");
    println!("  --twin            Use the two-site preset instead of the single ring");
    println!("  --frames <n>      Frames to run (default 600)");
    println!("  --seed <n>        Override the config seed");
    println!("  --json            Print the final summary as JSON");
    println!("  --save <file>     Write a network image when done");
    println!("  -h, --help        Show this help");
}

fn parse_args() -> Result<Options, String> {
    let mut opts = Options {
        config: None,
        twin: false,
        frames: 600,
        seed: None,
        json: false,
        save: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or(format!("{name} needs a value"));
        match arg.as_str() {
            "-h" | "--help" | "help" => {
                print_help();
                std::process::exit(0);
            }
            "--config" => opts.config = Some(value("--config")?),
            "--twin" => opts.twin = true,
            "--frames" => {
                opts.frames = value("--frames")?
                    .parse()
                    .map_err(|_| "--frames must be a number".to_string())?
            }
            "--seed" => {
                opts.seed = Some(
                    value("--seed")?
                        .parse()
                        .map_err(|_| "--seed must be a number".to_string())?,
                )
            }
            "--json" => opts.json = true,
            "--save" => opts.save = Some(value("--save")?),
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(opts)
}

fn load_config(opts: &Options) -> Result<NetworkConfig, Box<dyn std::error::Error>> {
    let mut cfg = match &opts.config {
        #[cfg(feature = "serde")]
        Some(path) => NetworkConfig::from_json_file(path)?,
        #[cfg(not(feature = "serde"))]
        Some(_) => return Err("config files need the `serde` feature".into()),
        None if opts.twin => NetworkConfig::twin_sites(),
        None => NetworkConfig::default(),
    };
    if let Some(seed) = opts.seed {
        cfg.seed = Some(seed);
    }
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let opts = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}");
            print_help();
            std::process::exit(2);
        }
    };

    let cfg = load_config(&opts)?;
    let mut network = build_network(&cfg);
    if !network.report().is_clean() {
        warn!(
            warnings = network.report().warnings().len(),
            "network built with degraded topology"
        );
    }

    // Same loop shape as an interactive frontend: stimulate one sensor, tick,
    // refresh presentation state.
    let mut presenter = Presenter::default();
    let delta = 1.0 / 60.0;
    network.randomize_sensors();

    for frame in 0..opts.frames {
        network.randomize_random_sensor();
        network.tick_and_refresh(delta, &mut presenter);

        if frame % 100 == 0 && !opts.json {
            let d = network.diagnostics();
            println!(
                "frame={frame:5} conns={} changed={:4} neurons_changed={:4} avg_w={:.4} out_err={:.4}",
                d.connection_count,
                d.changed_connections,
                d.changed_neurons,
                d.avg_weight,
                d.output_error,
            );
        }
    }

    let summary = NetworkAdapter::new(&network).summary();
    if opts.json {
        #[cfg(feature = "serde")]
        println!("{}", serde_json::to_string_pretty(&summary)?);
        #[cfg(not(feature = "serde"))]
        warn!("--json needs the `serde` feature");
    } else {
        let d = &summary.diagnostics;
        println!(
            "done: cycles={} sensors={} neurons={} (in={} out={} interior={} isolated={}) conns={}",
            summary.cycles,
            d.sensor_count,
            d.neuron_count,
            d.input_neurons,
            d.output_neurons,
            d.interior_neurons,
            d.isolated_neurons,
            d.connection_count,
        );
    }

    if let Some(path) = &opts.save {
        let mut w = BufWriter::new(File::create(path)?);
        network.save_image_to(&mut w)?;
        info!("network image written to {path} ({} bytes)", network.image_size_bytes()?);
    }
    Ok(())
}
