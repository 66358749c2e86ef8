//! Command-line front end for the bulk firmware uploader. Argument
//! parsing, signal handling and progress/summary printing live here;
//! everything else is `skarab_core`.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use skarab_core::config::{Config, DEFAULT_BURST_LIMIT};
use skarab_core::engine::{BulkSendResult, TransferEngine};
use skarab_core::exitcode::{EX_OK, EX_OSERR, EX_SOFTWARE, EX_UNAVAILABLE, EX_USAGE};
use skarab_core::host::resolve_peer;
use skarab_core::image::{DEFAULT_CHUNK_SIZE, FirmwareImage};
use skarab_core::peer::PeerTable;
use skarab_core::socket_io::UdpSocketIo;
use skarab_core::time::{Clock, SystemClock};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload a firmware image to one or more SKARAB boards over the
/// reliable bulk-transfer protocol.
#[derive(Parser, Debug)]
#[command(name = "skarab-cli", version = VERSION, disable_help_flag = true)]
struct Args {
    /// BIN file to upload
    #[arg(short = 'f', long = "file")]
    file: String,

    /// chunk size in bytes, 64 < N <= 9000
    #[arg(short = 's', long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// retry-burst abort threshold, scaled by peer count
    #[arg(short = 't')]
    burst_scaled: Option<u32>,

    /// retry-burst abort threshold, not scaled (overrides -t)
    #[arg(short = 'T')]
    burst_flat: Option<u32>,

    /// more output (repeatable)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// quiet operation
    #[arg(short = 'q')]
    quiet: bool,

    /// this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,

    /// peer hostnames or addresses, space delimited
    peers: Vec<String>,
}

fn usage(name: &str) {
    println!("usage: {name} -qhvf file [skarab]*");
    println!("-f file   BIN file to upload");
    println!("-s N      chunk size, 64 < N <= 9000 (default {DEFAULT_CHUNK_SIZE})");
    println!("-t N      retry-burst abort threshold, scaled by peer count");
    println!("-T N      retry-burst abort threshold, not scaled");
    println!("-q        quiet operation");
    println!("-v        more output");
    println!("-h        this help");
    println!();
    println!("note: the list of skarabs is space delimited");
}

fn main() {
    let app = std::env::args().next().unwrap_or_else(|| "skarab-cli".into());
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{app}: {e}");
            std::process::exit(EX_USAGE);
        }
    };

    if args.help {
        usage(&app);
        std::process::exit(EX_OK);
    }

    let verbose: i32 = if args.quiet { 0 } else { args.verbose as i32 };

    let config = match Config::new(
        args.chunk_size,
        args.burst_flat
            .or(args.burst_scaled.map(|n| n * args.peers.len().max(1) as u32))
            .unwrap_or(DEFAULT_BURST_LIMIT),
        skarab_core::config::DEFAULT_PROBLEMS_LIMIT,
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{app}: {e}");
            std::process::exit(EX_USAGE);
        }
    };

    let bytes = match std::fs::read(&args.file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{app}: unable to open {}: {e}", args.file);
            std::process::exit(EX_OSERR);
        }
    };

    if verbose > 1 {
        println!(
            "file {} has {} bytes or {} {} byte chunks",
            args.file,
            bytes.len(),
            bytes.len().div_ceil(args.chunk_size),
            args.chunk_size
        );
    }

    let image = match FirmwareImage::new(bytes, args.chunk_size) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("{app}: {e}");
            std::process::exit(EX_USAGE);
        }
    };

    if args.peers.is_empty() {
        eprintln!("{app}: need at least one device to talk to");
        std::process::exit(EX_USAGE);
    }

    let mut addrs: Vec<Ipv4Addr> = Vec::with_capacity(args.peers.len());
    for host in &args.peers {
        match resolve_peer(host) {
            Ok(a) => addrs.push(a),
            Err(e) => {
                eprintln!("{app}: unable to add {host}: {e}");
                std::process::exit(EX_OSERR);
            }
        }
    }

    let clock = SystemClock::new();
    let peer_count = addrs.len();
    let table = match PeerTable::build(addrs, clock.now(), config.retry_interval) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{app}: {e}");
            std::process::exit(EX_USAGE);
        }
    };

    let socket = match UdpSocketIo::bind_ephemeral() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{app}: unable to create socket: {e}");
            std::process::exit(EX_OSERR);
        }
    };

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            cancelled.store(true, Ordering::Relaxed);
        }) {
            eprintln!("{app}: unable to install signal handler: {e}");
        }
    }

    if verbose > 1 {
        println!("attempting to upload to {peer_count} skarabs");
    }

    let mut engine = TransferEngine::new(table, image, socket, clock, config);
    let exit_code = run(&mut engine, &cancelled, verbose, &app);
    std::process::exit(exit_code);
}

/// The outer loop: schedules sends, waits for the socket, drains one ack
/// per iteration, and prints a one-line progress counter at verbose > 0.
fn run(
    engine: &mut TransferEngine<UdpSocketIo, SystemClock>,
    cancelled: &AtomicBool,
    verbose: i32,
    app: &str,
) -> i32 {
    let mut problems: u32 = 0;
    let mut last_second = u64::MAX;

    loop {
        if cancelled.load(Ordering::Relaxed) {
            if verbose > 0 {
                println!();
            }
            eprintln!(
                "{app}: cancelled, {}/{} boards completed",
                engine.complete_count(),
                engine.peer_count()
            );
            return EX_UNAVAILABLE;
        }

        let (result, stall_until) = engine.bulk_send();
        match result {
            BulkSendResult::AllDone => break,
            BulkSendResult::Error => {
                problems += 1;
                if problems > engine.problems_limit() {
                    eprintln!("{app}: too many problems, giving up");
                    return EX_SOFTWARE;
                }
            }
            BulkSendResult::Continue => {}
        }

        let now = engine.now();
        if verbose > 0 {
            let sec = now.sec();
            if sec != last_second {
                print!("\rTX={:7}", engine.totals().sent);
                use std::io::Write;
                let _ = std::io::stdout().flush();
                last_second = sec;
            }
        }

        let wait = stall_until
            .sub(&now)
            .unwrap_or(skarab_core::time::WallClock::ZERO);

        match engine.wait_readable(wait.to_duration()) {
            Ok(true) => {
                engine.drain_one_ack();
            }
            Ok(false) => {
                if engine.record_timeout() {
                    eprintln!(
                        "{app}: too many consecutive timeouts, giving up ({}/{} boards completed)",
                        engine.complete_count(),
                        engine.peer_count()
                    );
                    return EX_SOFTWARE;
                }
            }
            Err(_) => {
                problems += 1;
                if problems > engine.problems_limit() {
                    eprintln!("{app}: too many problems, giving up");
                    return EX_SOFTWARE;
                }
            }
        }
    }

    if verbose > 0 {
        println!("\r");
    }

    let elapsed = engine.now();
    let completed = engine.complete_count();

    if verbose > 0 {
        if verbose > 1 {
            let totals = engine.totals();
            println!("total skarabs: {}", engine.peer_count());
            println!("completed uploads: {completed}");
            println!("significant errors: {problems}");
            println!(
                "required block operations: {}",
                engine.peer_count() * (engine.chunk_count() + 1)
            );
            println!("packets sent: {}", totals.sent);
            println!("packets received: {}", totals.got);
            println!("unusual received packets: {}", totals.weird);
            println!("late received packets: {}", totals.late);
            println!("interruptions and stalls: {}", totals.defer);
            println!("total time: {}.{:06}s", elapsed.sec(), elapsed.usec());
            let micros = elapsed.sec() as f64 * 1_000_000.0 + elapsed.usec() as f64;
            let bits = totals.sent as f64 * ((engine.chunk_count().max(1) as f64) + 8.0) * 8.0;
            println!("send data rate: {:.3}Mb/s", bits / micros);
        } else {
            println!(
                "programmed {completed} of {} skarabs in {}.{:06}s with {problems} problems",
                engine.peer_count(),
                elapsed.sec(),
                elapsed.usec()
            );
        }
    }

    EX_OK
}
