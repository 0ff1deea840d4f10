//! Replay a synthetic two-CPU trace and print every table
//!
//! Run with: cargo run --example replay

use idlescope::report::{render, DefaultReport};
use idlescope::{
    analyze, AnalysisConfig, CpuPlacement, Event, ReportConfig, StateDescriptor,
    TopologyDescription,
};

fn main() -> idlescope::Result<()> {
    let placements = [0, 1].map(|cpu| CpuPlacement {
        cluster: 0,
        core: 0,
        cpu,
        multi_cpu: true,
    });
    let states = [0, 1]
        .into_iter()
        .flat_map(|cpu| {
            [
                StateDescriptor {
                    cpu,
                    depth: 0,
                    name: "WFI".into(),
                    target_residency: Some(1),
                },
                StateDescriptor {
                    cpu,
                    depth: 1,
                    name: "C2".into(),
                    target_residency: Some(500),
                },
            ]
        })
        .collect();
    let desc = TopologyDescription::from_placements(&placements, states);

    let mut events = Vec::new();
    let mut t = 0.0;
    for round in 0..20u32 {
        let freq = if round % 3 == 0 { 1_800_000_000 } else { 600_000_000 };
        events.push(Event::freq_change(t, 0, freq));
        events.push(Event::freq_change(t, 1, freq));
        events.push(Event::idle_enter(t + 0.001, 0, (round % 2) as usize));
        events.push(Event::idle_enter(t + 0.002, 1, 1));
        events.push(Event::idle_exit(t + 0.004, 1));
        events.push(Event::ipi(t + 0.004, 1, "Rescheduling interrupts"));
        events.push(Event::idle_exit(t + 0.005, 0));
        events.push(Event::irq(t + 0.005, 0, 30, "arch_timer"));
        t += 0.01;
    }

    let config = AnalysisConfig {
        retain_intervals: true,
        ..AnalysisConfig::default()
    };
    let mut analysis = analyze(&desc, events, &config)?;

    let report = ReportConfig {
        frequency: true,
        wakeup: true,
        ..ReportConfig::default()
    };
    render(&analysis, &mut DefaultReport::new(), &report, &mut std::io::stdout())?;

    let both = analysis.overlap(&[0, 1], 1)?;
    println!("cpu0 and cpu1 were both in C2 for {:.0}us", both);
    Ok(())
}
