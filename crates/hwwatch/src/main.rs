use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use hwwatch_core::backend::simulated::{SimulatedBackend, DEFAULT_SLOTS};
use hwwatch_core::events::{TriggerEventReceiver, DEFAULT_EVENT_CAPACITY};
use hwwatch_core::parse::parse_address;
use hwwatch_core::symbols::{SymbolTable, KALLSYMS_PATH};
use hwwatch_core::{
    AccessKind, Address, ConfigEndpoint, EndpointError, HwWatchResult, InstallationBackend, WatchConfig,
    WatchService,
};
use hwwatch_utils::{debug, info, init_logging_with, warn, LogLevel, LogSettings};

/// How long the event consumer waits before re-checking for shutdown.
const CONSUMER_POLL: Duration = Duration::from_millis(100);

/// Watch a single memory address for reads and writes with hardware watchpoints.
#[derive(Parser, Debug)]
#[command(name = "hwwatch")]
#[command(version)]
#[command(about = "Watch a single memory address for reads and writes with hardware watchpoints", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true, env = "HWWATCH_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Arm a watch and read control commands from stdin
    Watch(WatchArgs),
    /// Parse an address the way `set` does and print it
    Parse
    {
        /// Address (0x-prefixed hex, 0-prefixed octal, or decimal)
        value: String,
    },
}

#[derive(clap::Args, Debug)]
struct WatchArgs
{
    /// Initial address to watch (0 starts with monitoring disabled)
    #[arg(long, env = "HWWATCH_ADDR", value_parser = parse_address)]
    addr: Option<Address>,

    /// Installation backend. x86 CPUs cannot trap reads alone, so `perf`
    /// reports the read watch as failed there and monitoring stays disabled
    #[arg(long, value_enum, env = "HWWATCH_BACKEND", default_value_t = BackendKind::default())]
    backend: BackendKind,

    /// Only watch accesses made by this process (perf backend, default system-wide)
    #[arg(long)]
    pid: Option<i32>,

    /// Data pages per CPU sample ring (perf backend, power of two)
    #[arg(long, default_value_t = 8)]
    ring_pages: usize,

    /// Ignore accesses made in kernel mode (perf backend)
    #[arg(long, default_value_t = false)]
    user_only: bool,

    /// Concurrent watch resources (simulated backend)
    #[arg(long, default_value_t = DEFAULT_SLOTS)]
    slots: usize,

    /// Events buffered between the trigger context and the logger
    #[arg(long, default_value_t = DEFAULT_EVENT_CAPACITY)]
    event_capacity: usize,

    /// Symbol table used to name stack frames
    #[arg(long, num_args = 0..=1, default_missing_value = KALLSYMS_PATH)]
    kallsyms: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind
{
    /// perf_event hardware breakpoints (Linux)
    Perf,
    /// In-process simulation, accesses injected with `read`/`write`
    Simulated,
}

impl Default for BackendKind
{
    fn default() -> Self
    {
        if cfg!(target_os = "linux") {
            BackendKind::Perf
        } else {
            BackendKind::Simulated
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    // Guard must outlive every log call, including the shutdown messages
    let _log_guard = match init_logging_with(&LogSettings::from_env().with_level(cli.log_level)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands) -> HwWatchResult<()>
{
    match command {
        Commands::Watch(args) => run_watch(&args),
        Commands::Parse { value } => {
            let address = parse_address(&value)?;
            println!("{address:#x} ({})", address.value());
            Ok(())
        }
    }
}

fn run_watch(args: &WatchArgs) -> HwWatchResult<()>
{
    let symbols = args.kallsyms.as_ref().and_then(|path| match SymbolTable::load(path) {
        Ok(table) => {
            info!(path = %path.display(), symbols = table.len(), "symbol table loaded");
            Some(table)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not load symbol table, frames stay unresolved");
            None
        }
    });

    match args.backend {
        BackendKind::Simulated => {
            let backend = Arc::new(SimulatedBackend::with_slots(args.slots));
            serve(Arc::clone(&backend), Some(backend), args, symbols)
        }
        BackendKind::Perf => serve(perf_backend(args)?, None, args, symbols),
    }
}

#[cfg(target_os = "linux")]
fn perf_backend(args: &WatchArgs) -> HwWatchResult<hwwatch_core::prelude::PerfBackend>
{
    use hwwatch_core::prelude::{PerfBackend, PerfConfig};

    PerfBackend::new(PerfConfig {
        pid: args.pid,
        ring_pages: args.ring_pages,
        include_kernel: !args.user_only,
        ..PerfConfig::default()
    })
}

#[cfg(not(target_os = "linux"))]
fn perf_backend(_args: &WatchArgs) -> HwWatchResult<SimulatedBackend>
{
    Err(hwwatch_core::HwWatchError::Unsupported(
        "the perf backend needs Linux, use --backend simulated".to_string(),
    ))
}

fn serve<B>(backend: B, injector: Option<Arc<SimulatedBackend>>, args: &WatchArgs, symbols: Option<SymbolTable>) -> HwWatchResult<()>
where
    B: InstallationBackend + 'static,
{
    if args.backend == BackendKind::Perf && lacks_read_watchpoints(std::env::consts::ARCH) {
        warn!(
            arch = std::env::consts::ARCH,
            "this CPU cannot watch reads alone, the read watch will fail and monitoring stays disabled"
        );
    }

    let config = WatchConfig {
        initial_target: args.addr.unwrap_or(Address::ZERO),
        event_capacity: args.event_capacity,
    };
    let (service, receiver) = WatchService::start_with_channel(backend, &config);

    let consumer_stop = Arc::new(AtomicBool::new(false));
    let consumer = spawn_consumer(receiver, symbols, Arc::clone(&consumer_stop))?;

    let (inputs, input_rx) = mpsc::channel();
    let interrupts = inputs.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupts.send(Input::Interrupt);
    }) {
        warn!(error = %e, "could not install SIGINT handler");
    }
    spawn_stdin_reader(inputs)?;

    let endpoint = service.endpoint();
    let outcome = control_loop(&input_rx, &mut io::stdout(), &endpoint, injector.as_deref(), &service);

    let stats = service.stats();
    service.stop();
    info!(reads = stats.reads, writes = stats.writes, dropped = stats.dropped, "final counters");

    consumer_stop.store(true, Ordering::Release);
    if consumer.join().is_err() {
        warn!("event consumer panicked");
    }
    outcome?;
    Ok(())
}

/// x86 debug registers have no read-only condition, so the kernel refuses
/// `HW_BREAKPOINT_R` there.
fn lacks_read_watchpoints(arch: &str) -> bool
{
    matches!(arch, "x86" | "x86_64")
}

/// Something for the control loop to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input
{
    Line(String),
    /// SIGINT: stop as if `quit` had been typed.
    Interrupt,
    /// stdin closed or failed.
    Eof,
}

/// Read stdin lines on a detached thread so a signal can end the loop while
/// a read is still blocked.
fn spawn_stdin_reader(inputs: Sender<Input>) -> io::Result<()>
{
    thread::Builder::new().name("hwwatch-stdin".to_string()).spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if inputs.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        let _ = inputs.send(Input::Eof);
    })?;
    Ok(())
}

/// Run operator commands until `quit`, end of input, or an interrupt.
fn control_loop<B, W>(
    inputs: &Receiver<Input>,
    out: &mut W,
    endpoint: &ConfigEndpoint<B>,
    injector: Option<&SimulatedBackend>,
    service: &WatchService<B>,
) -> io::Result<()>
where
    B: InstallationBackend,
    W: Write,
{
    for input in inputs {
        let line = match input {
            Input::Line(line) => line,
            Input::Interrupt => {
                info!("interrupted, tearing down");
                break;
            }
            Input::Eof => break,
        };
        let command = match ControlCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "error: {message}")?;
                continue;
            }
        };

        if command == ControlCommand::Quit {
            break;
        }
        let reply = execute(&command, endpoint, injector, service);
        write!(out, "{reply}")?;
        out.flush()?;
    }
    Ok(())
}

fn execute<B: InstallationBackend>(
    command: &ControlCommand,
    endpoint: &ConfigEndpoint<B>,
    injector: Option<&SimulatedBackend>,
    service: &WatchService<B>,
) -> String
{
    match command {
        ControlCommand::Get => endpoint.get(),
        ControlCommand::Set(value) => match endpoint.set(value) {
            Ok(()) => format!("ok {}\n", endpoint.status_line()),
            Err(EndpointError::Parse(e)) => format!("error: {e}\n"),
            Err(EndpointError::Install(e)) => format!("error: {e} (code {})\n", e.code()),
        },
        ControlCommand::Status => format!("{}\n", endpoint.status_line()),
        ControlCommand::Stats => {
            let stats = service.stats();
            format!("reads={} writes={} dropped={}\n", stats.reads, stats.writes, stats.dropped)
        }
        ControlCommand::Access(kind, value) => {
            let Some(backend) = injector else {
                return "error: access injection needs --backend simulated\n".to_string();
            };
            match parse_address(value) {
                Ok(address) => format!("{} handler(s) fired\n", backend.access(address, *kind)),
                Err(e) => format!("error: {e}\n"),
            }
        }
        ControlCommand::Help => HELP.to_string(),
        ControlCommand::Quit => String::new(),
    }
}

const HELP: &str = "\
get              print the watched address
set <addr>       watch <addr> (0 disables)
status           show whether the watch is armed
stats            show event counters
read <addr>      simulate a read (simulated backend)
write <addr>     simulate a write (simulated backend)
quit             tear down and exit
";

/// One line of the stdin control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ControlCommand
{
    Get,
    Set(String),
    Status,
    Stats,
    Access(AccessKind, String),
    Help,
    Quit,
}

impl ControlCommand
{
    /// `Ok(None)` for blank lines.
    fn parse(line: &str) -> Result<Option<Self>, String>
    {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let verb = verb.to_lowercase();
        let command = match (verb.as_str(), rest.is_empty()) {
            ("get", true) => Self::Get,
            ("status", true) => Self::Status,
            ("stats", true) => Self::Stats,
            ("help" | "?", true) => Self::Help,
            ("quit" | "exit", true) => Self::Quit,
            ("set", false) => Self::Set(rest.to_string()),
            ("read", false) => Self::Access(AccessKind::Read, rest.to_string()),
            ("write", false) => Self::Access(AccessKind::Write, rest.to_string()),
            ("set" | "read" | "write", true) => return Err(format!("`{verb}` needs an address")),
            (name, false) if matches!(name, "get" | "status" | "stats" | "help" | "?" | "quit" | "exit") => {
                return Err(format!("`{verb}` takes no arguments"))
            }
            _ => return Err(format!("unknown command `{verb}`, try `help`")),
        };
        Ok(Some(command))
    }
}

fn spawn_consumer(
    receiver: TriggerEventReceiver,
    symbols: Option<SymbolTable>,
    stop: Arc<AtomicBool>,
) -> HwWatchResult<JoinHandle<()>>
{
    let handle = thread::Builder::new().name("hwwatch-events".to_string()).spawn(move || {
        loop {
            match receiver.recv_timeout(CONSUMER_POLL) {
                Ok(event) => {
                    info!(target: "hwwatch::trigger", "{}", event.describe());
                    for (depth, frame) in event.stack.frames().iter().enumerate() {
                        match symbols.as_ref().and_then(|table| table.resolve(*frame)) {
                            Some(symbol) => debug!(target: "hwwatch::trigger", "  #{depth} {frame:#x} {symbol}"),
                            None => debug!(target: "hwwatch::trigger", "  #{depth} {frame:#x}"),
                        }
                    }
                    if event.stack.is_truncated() {
                        debug!(target: "hwwatch::trigger", "  ... (truncated)");
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    })?;
    Ok(handle)
}
