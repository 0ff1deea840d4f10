//! # idlescope
//!
//! Idle-state (C-state) and frequency (P-state) residency statistics
//! replayed from kernel power traces. Statistics are kept per CPU, per
//! core and per cluster; a core or cluster is only considered idle when
//! all of its members are.
//!
//! ## Features
//!
//! - **C-states**: residency min/max/avg/total per depth, with early and
//!   late wake-up classification against the target residency
//! - **P-states**: time spent at each frequency, closed on idle entry
//! - **Wake-ups**: which interrupt ended each idle interval
//! - **Baselines**: align the frequency tables of two runs and print deltas
//! - **Trace formats**: ftrace text output and idlestat native files
//!
//! ## Quick Start
//!
//! ```no_run
//! use idlescope::trace::AdapterRegistry;
//! use idlescope::report::{render, ReportRegistry};
//! use idlescope::{analyze, Config};
//! use std::path::Path;
//!
//! # fn main() -> idlescope::Result<()> {
//! let config = Config::load()?;
//! let trace = AdapterRegistry::default().load(Path::new("trace.txt"))?;
//! let analysis = analyze(&trace.description, trace.events, &config.analysis)?;
//!
//! let mut report = ReportRegistry::default().create(&config.report.format)?;
//! render(&analysis, report.as_mut(), &config.report, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod baseline;
pub mod composite;
pub mod config; // Configuration management with TOML persistence
pub mod cstate;
pub mod error;
pub mod event;
pub mod intervals; // Arena of retained idle intervals
pub mod pstate;
pub mod report;
pub mod stats;
pub mod sysfs; // Host topology from /sys
pub mod topology;
pub mod trace; // Trace file formats
pub mod wakeup;

// Re-export main types
pub use analysis::{analyze, Analysis, AnalysisSummary, Analyzer};
pub use composite::{FreqExtremum, DEFAULT_COMPOSITE_FREQ};
pub use config::{AnalysisConfig, Config, ReportConfig, Verbosity};
pub use cstate::{CState, CStateTrack, Residency, MAX_CSTATES};
pub use error::{IdleError, Result};
pub use event::{Event, EventKind};
pub use pstate::{PState, PStateTrack};
pub use stats::DurationStats;
pub use topology::{
    Cluster, ClusterLayout, Core, CoreLayout, Cpu, CpuPlacement, StateDescriptor, Topology,
    TopologyDescription, TopologyLayout,
};
pub use wakeup::{WakeupIrq, WakeupTable};

/// Crate version, written into native trace headers
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
