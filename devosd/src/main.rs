//! # Device OS Host Daemon
//!
//! Main entry point for the device kernel host.

use device_kernel::KernelConfig;
use devosd::{HostRuntime, HostRuntimeConfig};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();

    let config = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        print_usage(&args[0]);
        process::exit(1);
    });
    let interactive = config.script.is_none();

    let mut runtime = HostRuntime::new(config).unwrap_or_else(|e| {
        eprintln!("Failed to start kernel: {}", e);
        process::exit(1);
    });

    if interactive {
        run_interactive(&mut runtime);
    } else {
        runtime.run();
        print_output(&mut runtime);
    }
}

/// Reads lines from stdin, one step per line
fn run_interactive(runtime: &mut HostRuntime) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        };
        runtime.submit(&line);
        runtime.step();
        print_output(runtime);
        if !runtime.is_running() {
            break;
        }
    }
    runtime.shutdown();
}

fn print_output(runtime: &mut HostRuntime) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for text in runtime.take_output() {
        if out.write_all(text.as_bytes()).is_err() {
            return;
        }
    }
    let _ = out.flush();
}

fn parse_args(args: &[String]) -> Result<HostRuntimeConfig, String> {
    let mut config = HostRuntimeConfig::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --config".to_string());
                }
                let text = fs::read_to_string(&args[i])
                    .map_err(|e| format!("Failed to read config file: {}", e))?;
                config.kernel = KernelConfig::from_json(&text)
                    .map_err(|e| format!("Invalid config file: {}", e))?;
            }
            "--script" | "-s" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --script".to_string());
                }
                let script_text = fs::read_to_string(&args[i])
                    .map_err(|e| format!("Failed to read script file: {}", e))?;
                config.script = Some(script_text);
                config.echo = true;
            }
            "--store" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --store".to_string());
                }
                config.store = Some(PathBuf::from(&args[i]));
            }
            "--max-ticks" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --max-ticks".to_string());
                }
                config.max_ticks = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid max-ticks value: {}", args[i]))?;
            }
            "--tick-ms" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --tick-ms".to_string());
                }
                config.tick_ms = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid tick-ms value: {}", args[i]))?;
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      Kernel configuration (JSON)");
    eprintln!("  -s, --script <FILE>      Command script; stdin is read when absent");
    eprintln!("  --store <FILE>           Persist the device configuration in FILE");
    eprintln!("  --max-ticks <N>          Maximum ticks to run (0 = unlimited)");
    eprintln!("  --tick-ms <N>            Simulated milliseconds per tick (default 10)");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} --script devosd/scripts/blink.devos", program);
    eprintln!("  {} --store /tmp/devos.json", program);
}
