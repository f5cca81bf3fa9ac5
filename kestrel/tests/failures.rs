//! Failures stay contained: in a task, a cell at one instant, or a resource.

mod util;

use kestrel::resource::real::divide;
use kestrel::*;
use util::*;

#[test]
fn awaiting_a_failed_task_surfaces_the_failure() -> Result<()> {
    let mut branch = new_branch();
    let account = branch.allocate(Accumulator::new(0.0));

    let doomed = branch.schedule_activity(
        activity(|ctx| {
            ctx.defer(2.seconds())?;
            ctx.fail("thruster valve stuck")
        }),
        seconds(0),
    )?;
    let careful = branch.schedule_activity(
        activity(move |ctx| {
            match ctx.await_completion(doomed) {
                Err(Interrupt::Fail(Failure::AwaitedTaskFailed { .. })) => {
                    ctx.emit(account, -1.0);
                }
                other => other?,
            }
            Ok(())
        }),
        seconds(1),
    )?;
    let careless = branch.schedule_activity(
        activity(move |ctx| {
            ctx.await_completion(doomed)?;
            ctx.emit(account, 100.0);
            Ok(())
        }),
        seconds(1),
    )?;
    branch.run_to_quiescence()?;

    assert_eq!(
        &TaskState::Failed(Failure::model("thruster valve stuck")),
        branch.task_state(doomed)?
    );
    assert_eq!(&TaskState::Complete, branch.task_state(careful)?);
    assert_eq!(
        &TaskState::Failed(Failure::AwaitedTaskFailed { task: doomed }),
        branch.task_state(careless)?
    );
    assert_eq!(Ok(-1.0), branch.read(&from_cell(account)));

    let results = branch.results();
    assert!(results.failed());
    assert_eq!(2, results.failed_tasks().count());
    Ok(())
}

#[test]
fn awaiting_a_finished_task_resumes_immediately() -> Result<()> {
    let mut branch = new_branch();
    let quick = branch.schedule_activity(activity(|_| Ok(())), seconds(0))?;
    let late = branch.schedule_activity(
        activity(move |ctx| {
            let before = ctx.now();
            ctx.await_completion(quick)?;
            if ctx.now() != before {
                return ctx.fail("resumed at a different instant");
            }
            Ok(())
        }),
        seconds(4),
    )?;
    branch.run_to_quiescence()?;

    assert_eq!(&TaskState::Complete, branch.task_state(late)?);
    assert_eq!(seconds(4), branch.now());
    Ok(())
}

#[test]
fn awaiting_an_unknown_task_fails() -> Result<()> {
    let mut elsewhere = new_branch();
    let mut stranger = None;
    for _ in 0..3 {
        stranger = Some(elsewhere.schedule_activity(activity(|_| Ok(())), seconds(0))?);
    }
    let stranger = stranger.ok_or_else(|| anyhow!("nothing scheduled"))?;

    let mut branch = new_branch();
    let task = branch.schedule_activity(
        activity(move |ctx| ctx.await_completion(stranger)),
        seconds(0),
    )?;
    branch.run_to_quiescence()?;

    assert_eq!(
        &TaskState::Failed(Failure::UnknownTask { task: stranger }),
        branch.task_state(task)?
    );
    assert!(matches!(
        branch.task_state(stranger),
        Err(KernelError::UnknownTask { .. })
    ));
    Ok(())
}

#[test]
fn model_errors_become_task_failures() -> Result<()> {
    let mut branch = new_branch();
    let task = branch.schedule_activity(
        activity(|ctx| {
            let parsed: i32 = "twelve".parse().context("parsing the burn count")?;
            ctx.defer(Duration::from_seconds(parsed as f64))
        }),
        seconds(0),
    )?;
    let negative = branch.schedule_activity(
        activity(|ctx| ctx.defer(-(1.seconds()))),
        seconds(0),
    )?;
    branch.run_to_quiescence()?;

    match branch.task_state(task)? {
        TaskState::Failed(Failure::Model { reason }) => {
            assert!(reason.starts_with("parsing the burn count"), "{reason}");
        }
        other => bail!("expected a model failure, got {other:?}"),
    }
    assert!(matches!(
        branch.task_state(negative)?,
        TaskState::Failed(Failure::Model { .. })
    ));
    Ok(())
}

#[test]
fn conflicting_sets_fail_one_cell_for_one_instant() -> Result<()> {
    let mut branch = new_branch();
    let mode = branch.allocate(Register::new("idle".to_string()));
    let account = branch.allocate(Accumulator::new(0.0));

    for setting in ["science", "downlink"] {
        branch.schedule_activity(
            activity(move |ctx| {
                ctx.emit(mode, Some(setting.to_string()));
                Ok(())
            }),
            seconds(2),
        )?;
    }
    branch.schedule_activity(Deposit { cell: account, amount: 3.0 }, seconds(2))?;
    branch.run_until(seconds(4))?;

    let mode_res = from_cell(mode);
    let at_conflict = branch.evaluate_at(&mode_res, seconds(2))?;
    assert!(matches!(
        at_conflict.data,
        Dynamics::Failed(Failure::EffectMerge { .. })
    ));
    assert_eq!(Expiry::NOW, at_conflict.expiry);
    assert_eq!(
        Ok("idle".to_string()),
        branch.evaluate_at(&mode_res, seconds(3))?.data.value()
    );
    assert_eq!(Ok("idle".to_string()), branch.read(&mode_res));
    assert_eq!(Ok(3.0), branch.read(&from_cell(account)));

    let results = branch.results();
    assert_eq!(1, results.merge_failures.len());
    assert_eq!(seconds(2), results.merge_failures[0].0);
    assert!(results.defects.is_empty());
    Ok(())
}

#[test]
fn counter_overflow_is_a_merge_failure() -> Result<()> {
    let mut branch = new_branch();
    let count = branch.allocate(Counter::new(i64::MAX - 1));
    branch.schedule_activity(
        activity(move |ctx| {
            ctx.emit(count, 1);
            ctx.emit(count, 1);
            Ok(())
        }),
        seconds(0),
    )?;
    branch.run_to_quiescence()?;

    assert!(matches!(
        branch.read(&from_cell(count)),
        Err(Failure::EffectMerge { .. })
    ));
    assert_eq!(Some(i64::MAX - 1), branch.cell(count).map(|c| c.count));
    Ok(())
}

#[test]
fn overflowing_concurrent_counts_fail_the_merge() -> Result<()> {
    let mut branch = new_branch();
    let count = branch.allocate(Counter::new(0));
    let account = branch.allocate(Accumulator::new(0.0));
    branch.schedule_activity(
        activity(move |ctx| {
            ctx.emit(count, i64::MAX);
            ctx.emit(count, 1);
            ctx.emit(account, 2.0);
            Ok(())
        }),
        seconds(0),
    )?;
    branch.run_to_quiescence()?;

    assert!(matches!(
        branch.read(&from_cell(count)),
        Err(Failure::EffectMerge { .. })
    ));
    assert_eq!(Some(0), branch.cell(count).map(|c| c.count));
    assert_eq!(Ok(2.0), branch.read(&from_cell(account)));
    Ok(())
}

#[test]
fn failed_resources_propagate() -> Result<()> {
    let mut branch = new_branch();
    let fuel = branch.allocate(Accumulator::new(12.0));
    let burns = branch.allocate(Accumulator::new(0.0));
    let per_burn = divide(&from_cell(fuel), &from_cell(burns));
    let tolerant = resource::discrete::recover(&per_burn, |_| f64::INFINITY);

    assert!(branch.evaluate(&per_burn).data.is_failed());
    assert_eq!(Ok(f64::INFINITY), branch.read(&tolerant));

    let reader = per_burn.clone();
    let task = branch.schedule_activity(
        activity(move |ctx| {
            ctx.get(&reader)?;
            Ok(())
        }),
        seconds(0),
    )?;
    branch.schedule_activity(Deposit { cell: burns, amount: 4.0 }, seconds(1))?;
    branch.run_to_quiescence()?;

    assert!(matches!(
        branch.task_state(task)?,
        TaskState::Failed(Failure::Evaluation { .. })
    ));
    assert_eq!(Ok(3.0), branch.read(&per_burn));
    Ok(())
}

#[test]
fn misuse_is_reported_as_kernel_errors() -> Result<()> {
    let mut branch = Branch::new(seconds(10), SimulationConfig::new().step_limit(20));
    let heartbeat = branch.schedule_activity(
        activity(|ctx| loop {
            ctx.defer(1.seconds())?;
        }),
        seconds(10),
    )?;

    assert_eq!(
        Err(KernelError::StepLimitExceeded { limit: 20 }),
        branch.run_to_quiescence()
    );
    assert!(!branch.is_quiescent());
    assert!(matches!(
        branch.task_state(heartbeat)?,
        TaskState::Deferred(_)
    ));

    assert!(matches!(
        branch.schedule_activity(activity(|_| Ok(())), seconds(11)),
        Err(KernelError::ScheduledInPast { .. })
    ));
    let probe = from_cell(branch.allocate(Accumulator::new(1.0)));
    assert!(matches!(
        branch.evaluate_at(&probe, seconds(5)),
        Err(KernelError::QueryBeforeStart { .. })
    ));
    Ok(())
}
