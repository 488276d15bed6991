//! Configuration Module
//!
//! Handles loading server configuration from command-line flags and
//! environment variables, plus the human-readable byte sizes used for the
//! cache capacity.

use std::num::NonZeroUsize;
use std::thread;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 6380;

/// Default sketch width hint.
pub const DEFAULT_COUNTERS: usize = 1 << 20;

/// Default bound of the pending signal queue.
pub const DEFAULT_SIGNAL_BUFFER: usize = 1 << 16;

// == Command Line ==
/// doppio - in-memory key-value cache speaking the Redis protocol
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server port
    #[arg(short = 'p', long, env = "DOPPIO_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Cache capacity of the database, such as 4gb, 500mb, etc.
    #[arg(short = 's', long, env = "DOPPIO_CAPACITY", default_value = "1gb")]
    pub capacity: String,

    /// Run in single-threaded mode (one event loop)
    #[arg(long, env = "DOPPIO_SINGLE_THREADED")]
    pub single_threaded: bool,

    /// Connection handling strategy
    #[arg(long, env = "DOPPIO_MODE", value_enum, default_value_t = ModeArg::Auto)]
    pub mode: ModeArg,

    /// Worker threads (pooled) or event loops (event-loop); defaults to available parallelism
    #[arg(long, env = "DOPPIO_THREADS")]
    pub threads: Option<NonZeroUsize>,

    /// Width hint for the frequency sketch
    #[arg(long, env = "DOPPIO_COUNTERS", default_value_t = DEFAULT_COUNTERS)]
    pub counters: usize,

    /// Maximum number of pending frequency updates before new ones are dropped
    #[arg(long, env = "DOPPIO_SIGNAL_BUFFER", default_value_t = DEFAULT_SIGNAL_BUFFER)]
    pub signal_buffer: usize,

    /// Port for the HTTP admin endpoints (/stats, /health); disabled when unset
    #[arg(long, env = "DOPPIO_ADMIN_PORT")]
    pub admin_port: Option<u16>,
}

/// Requested connection strategy, before `auto` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Auto,
    Pooled,
    EventLoop,
}

/// Resolved connection strategy. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// One task per connection on a multi-threaded runtime with this many workers.
    Pooled { workers: usize },
    /// This many single-threaded readiness loops multiplexing connections.
    EventLoop { loops: usize },
}

impl ServeMode {
    /// Number of OS threads serving connections.
    pub fn threads(&self) -> usize {
        match *self {
            ServeMode::Pooled { workers } => workers,
            ServeMode::EventLoop { loops } => loops,
        }
    }
}

/// Server configuration parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache protocol port
    pub port: u16,
    /// Capacity in cost units (bytes of value data)
    pub capacity: u64,
    /// Connection handling strategy
    pub mode: ServeMode,
    /// Frequency sketch width hint
    pub counters: usize,
    /// Pending signal queue bound
    pub signal_buffer: usize,
    /// Optional HTTP admin port
    pub admin_port: Option<u16>,
}

impl Config {
    /// Resolves parsed arguments into a configuration.
    ///
    /// Fails when the capacity string is not a valid, non-zero byte size.
    pub fn from_args(args: Args) -> Result<Self> {
        let capacity = parse_byte_size(&args.capacity)?;
        if capacity == 0 {
            return Err(Error::InvalidConfig(format!(
                "Invalid cache capacity {}",
                args.capacity
            )));
        }

        let threads = args
            .threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(available_parallelism);

        Ok(Self {
            port: args.port,
            capacity,
            mode: resolve_mode(args.mode, args.single_threaded, threads),
            counters: args.counters.max(1),
            signal_buffer: args.signal_buffer.max(1),
            admin_port: args.admin_port,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let threads = available_parallelism();
        Self {
            port: DEFAULT_PORT,
            capacity: 1_000_000_000,
            mode: resolve_mode(ModeArg::Auto, false, threads),
            counters: DEFAULT_COUNTERS,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
            admin_port: None,
        }
    }
}

fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Picks the connection strategy. A single thread means the event loop,
/// anything else the pooled server unless explicitly requested.
pub fn resolve_mode(mode: ModeArg, single_threaded: bool, threads: usize) -> ServeMode {
    if single_threaded {
        return ServeMode::EventLoop { loops: 1 };
    }
    let threads = threads.max(1);
    match mode {
        ModeArg::Pooled => ServeMode::Pooled { workers: threads },
        ModeArg::EventLoop => ServeMode::EventLoop { loops: threads },
        ModeArg::Auto if threads == 1 => ServeMode::EventLoop { loops: 1 },
        ModeArg::Auto => ServeMode::Pooled { workers: threads },
    }
}

// == Byte Sizes ==
/// Parses a human-readable byte size such as `1gb`, `500 MB`, `1.5GiB` or `4096`.
///
/// Decimal units (`k`, `kb`, `m`, `mb`, ...) are powers of 1000, binary units
/// (`ki`, `kib`, `mi`, `mib`, ...) are powers of 1024.
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let invalid = || Error::InvalidConfig(format!("Invalid cache capacity {}", input));

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "ki" | "kib" => 1 << 10,
        "mi" | "mib" => 1 << 20,
        "gi" | "gib" => 1 << 30,
        "ti" | "tib" => 1 << 40,
        _ => return Err(invalid()),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }
    let fractional: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = fractional * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Formats a byte count with decimal units, e.g. `1.0 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    if bytes < 10 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else if value < 10.0 {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}
