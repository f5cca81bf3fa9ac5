use crate::activities::burn::ThrusterBurn;
use crate::model::FuelSat;
use kestrel::*;
use std::collections::BTreeMap;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod activities;
mod model;

fn directive(kind: &str, start: Time, args: &[(&str, f64)]) -> ActivityDirective {
    ActivityDirective {
        kind: kind.to_string(),
        start,
        arguments: Value::Map(
            args.iter()
                .map(|(k, v)| (k.to_string(), Value::Real(*v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

fn report(label: &str, results: &SimulationResults) {
    println!("== {label}: {} to {}", results.start, results.end);
    for task in &results.tasks {
        match &task.state {
            TaskState::Failed(failure) => println!("  {} {}: {failure}", task.id, task.name),
            state => println!("  {} {}: {state:?}", task.id, task.name),
        }
    }
    for resource in &results.resources {
        for (time, failure) in &resource.failures {
            println!("  {} failed at {time}: {failure}", resource.name);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let plan_start = Time::from_gregorian_tai_at_midnight(2030, 1, 1);
    let mut baseline = Branch::new(plan_start, SimulationConfig::new().diagnostics(true));
    let sat = FuelSat::new(&mut baseline, 40.0);
    sat.register(&mut baseline);

    let catalog = activities::catalog(sat);
    let plan = [
        directive("burn", plan_start + 10.minutes(), &[("rate", 0.1), ("seconds", 120.0)]),
        directive("downlink", plan_start + 30.minutes(), &[("megabytes", 600.0), ("rate", 2.0)]),
        directive("burn", plan_start + 2.hours(), &[("rate", 0.2), ("seconds", 60.0)]),
    ];
    for d in &plan {
        let id = baseline.schedule_directive(&catalog, d)?;
        info!(task = %id, kind = %d.kind, start = %d.start, "planned");
    }

    baseline.run_until(plan_start + 1.hours())?;

    // What if a long correction burn were added before the second planned burn?
    let mut what_if = baseline.fork();
    what_if.schedule_activity(
        ThrusterBurn {
            sat,
            rate: 0.25,
            duration: 100.seconds(),
        },
        plan_start + 90.minutes(),
    )?;

    let mut branches = [baseline, what_if];
    for result in run_branches(&mut branches) {
        result?;
    }
    let [baseline, what_if] = &branches;

    let fuel = from_cell(sat.fuel);
    info!(
        baseline = baseline.read(&fuel)?,
        what_if = what_if.read(&fuel)?,
        "remaining fuel"
    );
    for segment in baseline.profile(&fuel, plan_start, baseline.now())? {
        println!("  fuel from {}: {:?}", segment.start, segment.dynamics);
    }
    info!(resource = %baseline.describe(&fuel), "diagnostics");

    report("baseline", &baseline.results());
    report("what if", &what_if.results());
    Ok(())
}
