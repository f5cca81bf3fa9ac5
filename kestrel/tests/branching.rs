//! Forking, profiling, kernel-maintained resources, and the boundary value layer.

mod util;

use kestrel::resource::cache::{cache, cache_on_change};
use kestrel::resource::discrete::sampled;
use kestrel::resource::real::greater_than;
use kestrel::*;
use std::collections::BTreeMap;
use util::*;

#[test]
fn parallel_branches_explore_alternatives() -> Result<()> {
    let mut baseline = new_branch();
    let tank = baseline.allocate(LinearIntegrator::new(50.0, 0.0));
    baseline.run_until(seconds(0))?;

    let mut branches: Vec<Branch> = (1..=4)
        .map(|rate| -> Result<Branch> {
            let mut fork = baseline.fork();
            fork.schedule_activity(
                Burn {
                    tank,
                    rate: rate as f64,
                    duration: 5.seconds(),
                },
                seconds(1),
            )?;
            Ok(fork)
        })
        .collect::<Result<_>>()?;

    for result in run_branches(&mut branches) {
        result?;
    }

    let volume = from_cell(tank);
    let finals = branches
        .iter()
        .map(|b| b.read(&volume))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(vec![45.0, 40.0, 35.0, 30.0], finals);
    assert_eq!(Ok(50.0), baseline.read(&volume));
    assert!(baseline.is_quiescent());
    Ok(())
}

#[test]
fn forks_keep_running_inflight_tasks_independently() -> Result<()> {
    let mut parent = new_branch();
    let tank = parent.allocate(LinearIntegrator::new(20.0, 0.0));
    parent.schedule_activity(
        Burn {
            tank,
            rate: 1.0,
            duration: 10.seconds(),
        },
        seconds(0),
    )?;
    parent.run_until(seconds(4))?;
    assert_eq!(Some(seconds(10)), parent.next_event());

    let mut fork = parent.fork();
    fork.schedule_activity(
        Burn {
            tank,
            rate: 0.5,
            duration: 2.seconds(),
        },
        seconds(6),
    )?;
    fork.run_to_quiescence()?;
    parent.run_to_quiescence()?;

    assert_eq!(Ok(10.0), parent.read(&from_cell(tank)));
    assert_eq!(Ok(9.0), fork.read(&from_cell(tank)));
    assert_eq!(
        parent.evaluate_at(&from_cell(tank), seconds(3))?,
        fork.evaluate_at(&from_cell(tank), seconds(3))?
    );
    fork.discard();
    Ok(())
}

#[test]
fn profile_follows_history_and_merges_agreeing_pieces() -> Result<()> {
    let mut branch = new_branch();
    let tank = branch.allocate(LinearIntegrator::new(10.0, 0.0));
    branch.schedule_activity(
        Burn {
            tank,
            rate: 2.0,
            duration: 3.seconds(),
        },
        seconds(1),
    )?;
    // Touches nothing, but still leaves a history point at 2s.
    branch.schedule_activity(activity(|_| Ok(())), seconds(2))?;
    branch.run_until(seconds(6))?;

    let profile = branch.profile(&from_cell(tank), seconds(0), seconds(6))?;
    assert_eq!(
        vec![
            Segment {
                start: seconds(0),
                dynamics: Dynamics::Constant(10.0)
            },
            Segment {
                start: seconds(1),
                dynamics: Dynamics::linear(10.0, -2.0)
            },
            Segment {
                start: seconds(4),
                dynamics: Dynamics::Constant(4.0)
            },
        ],
        profile
    );

    let low = greater_than(&from_cell(tank), 7.0);
    let flags = branch.profile(&low, seconds(0), seconds(6))?;
    let flags: Vec<_> = flags
        .into_iter()
        .map(|s| (s.start, s.dynamics.value()))
        .collect();
    assert_eq!(seconds(0), flags[0].0);
    assert_eq!(Ok(true), flags[0].1);
    assert_eq!(Ok(false), flags[flags.len() - 1].1);
    assert!(
        flags
            .iter()
            .any(|(t, v)| *t > seconds(2) && *t < seconds(3) && *v == Ok(false))
    );
    Ok(())
}

#[test]
fn history_records_every_batch() -> Result<()> {
    let mut branch = new_branch();
    let account = branch.allocate(Accumulator::new(0.0));
    branch.schedule_activity(Deposit { cell: account, amount: 1.0 }, seconds(2))?;
    branch.schedule_activity(Deposit { cell: account, amount: 1.0 }, seconds(5))?;
    branch.run_to_quiescence()?;

    let times: Vec<Time> = branch.history().iter().map(|p| p.time()).collect();
    assert_eq!(vec![seconds(0), seconds(2), seconds(5)], times);
    let deltas: Vec<Duration> = branch.history().iter().map(|p| p.delta()).collect();
    assert_eq!(vec![Duration::ZERO, 2.seconds(), 3.seconds()], deltas);
    Ok(())
}

#[test]
fn sampled_resources_hold_between_samples() -> Result<()> {
    let mut branch = new_branch();
    let tank = branch.allocate(LinearIntegrator::new(0.0, 1.0));
    let volume = from_cell(tank);
    let coarse = sampled(&mut branch, &volume, 10.seconds())?;
    assert!(sampled(&mut branch, &volume, Duration::ZERO).is_err());

    branch.run_until(seconds(25))?;
    assert!(!branch.is_quiescent());
    assert_eq!(Ok(20.0), branch.read(&coarse));
    assert_eq!(Ok(25.0), branch.read(&volume));
    assert_eq!(Ok(10.0), branch.evaluate_at(&coarse, seconds(15))?.data.value());

    let profile = branch.profile(&coarse, seconds(0), seconds(25))?;
    let samples: Vec<_> = profile
        .iter()
        .map(|s| (s.start, s.dynamics.clone()))
        .collect();
    assert_eq!(
        vec![
            (seconds(0), Dynamics::Constant(0.0)),
            (seconds(10), Dynamics::Constant(10.0)),
            (seconds(20), Dynamics::Constant(20.0)),
        ],
        samples
    );

    // Each sample is taken by a fresh task, so no task replays more than one delay.
    assert!(branch.tasks().count() >= 3);
    Ok(())
}

#[test]
fn caches_refresh_after_commits() -> Result<()> {
    let mut branch = new_branch();
    let mode = branch.allocate(Register::new("safe".to_string()));
    let cached = cache_on_change(&mut branch, &from_cell(mode));

    branch.schedule_activity(
        activity(move |ctx| {
            ctx.emit(mode, Some("science".to_string()));
            Ok(())
        }),
        seconds(3),
    )?;
    branch.run_to_quiescence()?;

    assert_eq!(Ok("science".to_string()), branch.read(&cached));
    assert_eq!(
        Ok("safe".to_string()),
        branch.evaluate_at(&cached, seconds(2))?.data.value()
    );
    Ok(())
}

#[test]
fn cache_expiry_is_revalidated() -> Result<()> {
    let mut branch = new_branch();
    let tank = branch.allocate(LinearIntegrator::new(0.0, 1.0));
    let over = greater_than(&from_cell(tank), 5.0);
    let tracking = cache_on_change(&mut branch, &over);
    let frozen = cache(&mut branch, &over, |_, _| false);

    assert_eq!(Ok(false), branch.read(&tracking));
    assert_eq!(Ok(true), branch.evaluate_at(&tracking, seconds(6))?.data.value());

    // A cache that refuses every update keeps its value, but not an expiry it cannot vouch for.
    let stale = branch.evaluate_at(&frozen, seconds(6))?;
    assert_eq!(Ok(false), stale.data.value());
    assert!(stale.expiry.is_never());
    Ok(())
}

#[test]
fn diagnostics_describe_named_resources() -> Result<()> {
    let mut branch = new_branch();
    let tank = branch.allocate(Accumulator::new(3.0));
    let volume = from_cell(tank);
    let cached = cache_on_change(&mut branch, &volume);

    branch.name_resource(&volume, "volume");
    branch.register("cached volume", &cached);
    assert!(branch.diagnostics().is_enabled());
    assert_eq!("cached volume <- [volume]", branch.describe(&cached));

    let quiet = Branch::new(seconds(0), SimulationConfig::new());
    quiet.name_resource(&volume, "volume");
    assert!(quiet.describe(&volume).starts_with("resource@"));
    Ok(())
}

#[test]
fn directives_are_built_from_the_catalog() -> Result<()> {
    let mut branch = new_branch();
    let account = branch.allocate(Accumulator::new(0.0));

    let mut catalog = Catalog::new();
    catalog.register("deposit", move |args: &Value| {
        let amount = args
            .get("amount")
            .and_then(Value::as_real)
            .ok_or_else(|| anyhow!("deposit needs a real amount"))?;
        Ok(Deposit {
            cell: account,
            amount,
        })
    });
    assert_eq!(vec!["deposit"], catalog.kinds().collect::<Vec<_>>());

    let directive = ActivityDirective {
        kind: "deposit".to_string(),
        start: seconds(2),
        arguments: Value::Map(BTreeMap::from([("amount".to_string(), Value::Real(2.5))])),
    };
    let id = branch.schedule_directive(&catalog, &directive)?;

    let unknown = ActivityDirective {
        kind: "withdraw".to_string(),
        ..directive.clone()
    };
    assert!(branch.schedule_directive(&catalog, &unknown).is_err());
    let malformed = ActivityDirective {
        arguments: Value::Int(3),
        ..directive
    };
    assert!(branch.schedule_directive(&catalog, &malformed).is_err());

    branch.run_to_quiescence()?;
    assert_eq!(Ok(2.5), branch.read(&from_cell(account)));
    assert_eq!(
        Some("deposit"),
        branch.results().task(id).map(|t| t.name.as_str())
    );
    Ok(())
}

#[test]
fn results_cross_the_boundary() -> Result<()> {
    let mut branch = new_branch();
    let tank = branch.allocate(LinearIntegrator::new(8.0, 0.0));
    branch.register("volume", &from_cell(tank));
    branch.schedule_activity(
        Burn {
            tank,
            rate: 1.0,
            duration: 2.seconds(),
        },
        seconds(1),
    )?;
    branch.schedule_activity(activity(|ctx| ctx.fail("no comms")), seconds(2))?;
    branch.run_to_quiescence()?;

    let results = branch.results();
    assert_eq!(seconds(3), results.end);
    assert!(results.failed());
    assert_eq!(0, results.pending_tasks().count());

    let volume = results
        .resource("volume")
        .ok_or_else(|| anyhow!("volume was registered"))?;
    assert_eq!(
        vec![
            Dynamics::Constant(Value::Real(8.0)),
            Dynamics::Linear {
                value: Value::Real(8.0),
                rate: Value::Real(-1.0)
            },
            Dynamics::Constant(Value::Real(6.0)),
        ],
        volume
            .segments
            .iter()
            .map(|s| s.dynamics.clone())
            .collect::<Vec<_>>()
    );

    let restored = SimulationResults::from_bytes(&results.to_bytes()?)?;
    assert_eq!(results, restored);

    let value = results.to_value();
    assert_eq!(Some(true), value.get("failed").and_then(Value::as_bool));
    assert_eq!(
        Some(2),
        value.get("tasks").and_then(Value::as_list).map(|t| t.len())
    );
    Ok(())
}
