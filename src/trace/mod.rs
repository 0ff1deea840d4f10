//! Trace file adapters
//!
//! Each supported file format is an implementation of [`TraceAdapter`]
//! that reduces the file to a [`TraceData`]: the topology description and
//! the ordered event stream. Adapters are looked up at runtime through an
//! [`AdapterRegistry`], either by name or by sniffing the first line.

pub mod ftrace;
pub mod native;

pub use ftrace::FtraceAdapter;
pub use native::NativeAdapter;

use crate::error::{IdleError, Result};
use crate::event::{Event, EventKind};
use crate::topology::TopologyDescription;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Idle state value reported by the kernel on idle exit
pub const IDLE_EXIT_STATE: i64 = 4_294_967_295;

/// A decoded trace
#[derive(Debug, Clone, Default)]
pub struct TraceData {
    /// Topology and C-state description
    pub description: TopologyDescription,
    /// Events in trace order
    pub events: Vec<Event>,
    /// Event lines that could not be decoded
    pub skipped: usize,
}

/// A trace file format
pub trait TraceAdapter {
    /// Format name used for lookup
    fn name(&self) -> &'static str;

    /// Check the first line of a file
    fn matches(&self, first_line: &str) -> bool;

    /// Decode a whole trace
    fn parse(&self, input: &mut dyn BufRead) -> Result<TraceData>;

    /// Check whether a file is in this format
    fn check_magic(&self, path: &Path) -> Result<bool> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(self.matches(&line))
    }

    /// Decode a trace file
    fn load(&self, path: &Path) -> Result<TraceData> {
        let mut reader = BufReader::new(File::open(path)?);
        self.parse(&mut reader)
    }
}

/// Runtime table of trace formats
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn TraceAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NativeAdapter::new()));
        registry.register(Box::new(FtraceAdapter::new()));
        registry
    }
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Add a format; later registrations with the same name replace earlier ones
    pub fn register(&mut self, adapter: Box<dyn TraceAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        self.adapters.push(adapter);
    }

    /// Registered format names
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Look up a format by name
    pub fn get(&self, name: &str) -> Result<&dyn TraceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
            .ok_or_else(|| IdleError::UnknownAdapter(name.to_string()))
    }

    /// Find the format of a file from its first line
    pub fn detect(&self, path: &Path) -> Result<&dyn TraceAdapter> {
        for adapter in &self.adapters {
            if adapter.check_magic(path)? {
                return Ok(adapter.as_ref());
            }
        }
        Err(IdleError::UnrecognizedTrace(path.display().to_string()))
    }

    /// Detect the format of a file and decode it
    pub fn load(&self, path: &Path) -> Result<TraceData> {
        let adapter = self.detect(path)?;
        log::debug!("Loading {} as {} trace", path.display(), adapter.name());
        adapter.load(path)
    }
}

/// Decode one ftrace-style event line.
///
/// Returns `None` for lines that carry no event of interest and
/// `Some(Err(_))` for event lines that cannot be decoded.
pub fn parse_event_line(line: &str) -> Option<Result<Event>> {
    if let Some(pos) = line.find("cpu_idle:") {
        return Some(parse_idle(line, pos));
    }
    if let Some(pos) = line.find("cpu_frequency:") {
        return Some(parse_freq(line, pos));
    }
    if let Some(pos) = line.find("irq_handler_entry:") {
        return Some(parse_irq(line, pos));
    }
    if let Some(pos) = line.find("ipi_entry:") {
        return Some(parse_ipi(line, pos));
    }
    None
}

/// Decode every event line of a stream, skipping malformed ones
pub(crate) fn parse_event_lines<I>(lines: I) -> Result<(Vec<Event>, usize)>
where
    I: IntoIterator<Item = std::io::Result<String>>,
{
    let mut events = Vec::new();
    let mut skipped = 0;

    for line in lines {
        let line = line?;
        match parse_event_line(&line) {
            Some(Ok(event)) => {
                events.try_reserve(1)?;
                events.push(event);
            }
            Some(Err(e)) => {
                log::warn!("Skipping unrecognized record ({}): {}", e, line.trim());
                skipped += 1;
            }
            None => {}
        }
    }

    Ok((events, skipped))
}

fn malformed(what: &str) -> IdleError {
    IdleError::Parse(format!("malformed {} record", what))
}

/// Timestamp is the last token before the event tag: "... 1234.5678: cpu_idle:"
fn timestamp(line: &str, tag: usize) -> Option<f64> {
    line[..tag]
        .split_whitespace()
        .next_back()?
        .trim_end_matches(':')
        .parse()
        .ok()
}

/// CPU from the "[003]" column
fn bracket_cpu(line: &str) -> Option<u32> {
    let open = line.find('[')?;
    let close = open + line[open..].find(']')?;
    line[open + 1..close].trim().parse().ok()
}

fn field<'a>(payload: &'a str, key: &str) -> Option<&'a str> {
    payload
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix(key)?.strip_prefix('='))
}

fn parse_idle(line: &str, pos: usize) -> Result<Event> {
    let payload = &line[pos + "cpu_idle:".len()..];
    let time = timestamp(line, pos).ok_or_else(|| malformed("cpuidle"))?;
    let state: i64 = field(payload, "state")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("cpuidle"))?;
    let cpu: u32 = field(payload, "cpu_id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("cpuidle"))?;

    let kind = if state == IDLE_EXIT_STATE || state < 0 {
        EventKind::IdleExit
    } else {
        EventKind::IdleEnter(usize::try_from(state).map_err(|_| malformed("cpuidle"))?)
    };
    Ok(Event::new(time, cpu, kind))
}

fn parse_freq(line: &str, pos: usize) -> Result<Event> {
    let payload = &line[pos + "cpu_frequency:".len()..];
    let time = timestamp(line, pos).ok_or_else(|| malformed("cpufreq"))?;
    let khz: u64 = field(payload, "state")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("cpufreq"))?;
    let cpu: u32 = field(payload, "cpu_id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("cpufreq"))?;

    let hz = khz.checked_mul(1000).ok_or_else(|| malformed("cpufreq"))?;
    Ok(Event::freq_change(time, cpu, hz))
}

fn parse_irq(line: &str, pos: usize) -> Result<Event> {
    let payload = &line[pos + "irq_handler_entry:".len()..];
    let time = timestamp(line, pos).ok_or_else(|| malformed("irq_handler_entry"))?;
    let cpu = bracket_cpu(line).ok_or_else(|| malformed("irq_handler_entry"))?;
    let irq: i32 = field(payload, "irq")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("irq_handler_entry"))?;
    let name = field(payload, "name").ok_or_else(|| malformed("irq_handler_entry"))?;

    Ok(Event::irq(time, cpu, irq, name))
}

fn parse_ipi(line: &str, pos: usize) -> Result<Event> {
    let payload = &line[pos + "ipi_entry:".len()..];
    let time = timestamp(line, pos).ok_or_else(|| malformed("ipi_entry"))?;
    let cpu = bracket_cpu(line).ok_or_else(|| malformed("ipi_entry"))?;
    let open = payload.find('(').ok_or_else(|| malformed("ipi_entry"))?;
    let close = payload.rfind(')').filter(|&c| c > open).ok_or_else(|| malformed("ipi_entry"))?;

    Ok(Event::ipi(time, cpu, payload[open + 1..close].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_enter_and_exit() {
        let enter = "          <idle>-0     [001] d..2   102.345678: cpu_idle: state=2 cpu_id=1";
        let event = parse_event_line(enter).unwrap().unwrap();
        assert_eq!(event, Event::idle_enter(102.345678, 1, 2));

        let exit = "          <idle>-0     [001] d..2   102.500000: cpu_idle: state=4294967295 cpu_id=1";
        let event = parse_event_line(exit).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::IdleExit);
    }

    #[test]
    fn test_parse_without_flags_column() {
        let line = "          <idle>-0     [000]    55.000100: cpu_idle: state=1 cpu_id=0";
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(event.timestamp, 55.0001);
    }

    #[test]
    fn test_parse_frequency_in_hz() {
        let line = "     kworker/2:1-60    [002] ....   10.000000: cpu_frequency: state=1200000 cpu_id=2";
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(event, Event::freq_change(10.0, 2, 1_200_000_000));
    }

    #[test]
    fn test_frequency_overflow_is_skipped() {
        let line = "     kworker/2:1-60    [002] ....   10.000000: cpu_frequency: state=18446744073709552 cpu_id=2";
        assert!(matches!(parse_event_line(line), Some(Err(IdleError::Parse(_)))));

        let good = "     kworker/2:1-60    [002] ....   11.000000: cpu_frequency: state=800000 cpu_id=2";
        let lines = vec![Ok(line.to_string()), Ok(good.to_string())];
        let (events, skipped) = parse_event_lines(lines).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(events, vec![Event::freq_change(11.0, 2, 800_000_000)]);
    }

    #[test]
    fn test_parse_interrupts() {
        let irq = "          <idle>-0     [003] d.h2   12.000001: irq_handler_entry: irq=30 name=arch_timer";
        assert_eq!(
            parse_event_line(irq).unwrap().unwrap(),
            Event::irq(12.000001, 3, 30, "arch_timer")
        );

        let ipi = "          <idle>-0     [000] d.h2   12.000002: ipi_entry: (Rescheduling interrupts)";
        assert_eq!(
            parse_event_line(ipi).unwrap().unwrap(),
            Event::ipi(12.000002, 0, "Rescheduling interrupts")
        );
    }

    #[test]
    fn test_unrelated_and_malformed_lines() {
        assert!(parse_event_line("          bash-1234  [000] ....   1.0: sched_switch: prev=bash").is_none());
        let broken = "          <idle>-0     [001] d..2   oops: cpu_idle: state=2 cpu_id=1";
        assert!(matches!(parse_event_line(broken), Some(Err(IdleError::Parse(_)))));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AdapterRegistry::default();
        assert_eq!(registry.names(), vec!["idlestat", "ftrace"]);
        assert_eq!(registry.get("ftrace").unwrap().name(), "ftrace");
        assert!(matches!(registry.get("tracecmd"), Err(IdleError::UnknownAdapter(_))));
    }

    #[test]
    fn test_registry_detect() {
        let dir = tempfile::tempdir().unwrap();
        let ftrace = dir.path().join("ftrace.txt");
        std::fs::write(&ftrace, "# tracer: nop\n#\n").unwrap();
        let unknown = dir.path().join("other.txt");
        std::fs::write(&unknown, "hello\n").unwrap();

        let registry = AdapterRegistry::default();
        assert_eq!(registry.detect(&ftrace).unwrap().name(), "ftrace");
        assert!(matches!(
            registry.detect(&unknown),
            Err(IdleError::UnrecognizedTrace(_))
        ));
    }
}
