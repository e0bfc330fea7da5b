// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::StepScript;

use anyhow::Result;
use devstrap::{
    action::{ActionOutcome, SideEffect},
    config::{Environment, Platform},
    orchestrator::{Orchestrator, OrchestratorError, RunOptions, RunPhase, StepOutcome},
    package::PackageManager,
    state::StepStatus,
    step::{Flags, StepName},
};
use std::fs;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use simple_test_case::test_case;

#[test_case(Flags::default(); "no flags")]
#[test_case(Flags::default().skip(StepName::Fonts); "skip fonts")]
#[test_case(Flags::default().skip(StepName::Backup).skip(StepName::Repos); "skip backup and repos")]
#[test_case(Flags::default().no_backup(true); "no backup")]
#[test_case(Flags::default().only(StepName::Apps); "apps only")]
#[test_case(Flags::default().only(StepName::Git); "git only")]
#[test_case(Flags::default().dry_run(true).skip(StepName::Ssh); "dry run")]
#[sealed_test]
fn steps_always_run_in_registry_order(flags: Flags) -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    script.orchestrator(flags, RunOptions::default()).run()?;
    let invoked = script.take_invoked();

    let mut sorted = invoked.clone();
    sorted.sort();
    pretty_assertions::assert_eq!(invoked, sorted);

    let position = |step| invoked.iter().position(|name| *name == step);
    if let (Some(devenv), Some(apps)) = (position(StepName::DevEnv), position(StepName::Apps)) {
        assert!(devenv < apps);
    }
    if let Some(backup) = position(StepName::Backup) {
        for (index, step) in invoked.iter().enumerate() {
            if step.mutates_config() {
                assert!(backup < index, "{step} ran before backup");
            }
        }
    }

    Ok(())
}

#[sealed_test]
fn failed_step_does_not_stop_run() -> Result<()> {
    let script = StepScript::new(Platform::Fedora)?;
    script.fail(StepName::Apps);

    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    let summary = orchestrator.run()?;

    assert_eq!(summary.phase, RunPhase::Completed);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.failed_steps(), vec![StepName::Apps]);
    assert_eq!(script.take_invoked(), StepName::ALL.to_vec());
    for step in [StepName::Git, StepName::Cursor, StepName::Repos] {
        assert_eq!(summary.outcome(step), Some(StepOutcome::Succeeded));
    }

    let state = orchestrator.state_store().load(Platform::Fedora)?;
    let state = state.ok_or_else(|| anyhow::anyhow!("run state was not kept"))?;
    assert_eq!(state.status(StepName::Apps), StepStatus::Failed);
    assert_eq!(state.status(StepName::Git), StepStatus::Complete);

    Ok(())
}

#[sealed_test]
fn fail_fast_stops_at_first_failure() -> Result<()> {
    let script = StepScript::new(Platform::Arch)?;
    script.fail(StepName::Apps);

    let options = RunOptions {
        fail_fast: true,
        ..Default::default()
    };
    let orchestrator = script.orchestrator(Flags::default(), options);
    let summary = orchestrator.run()?;

    assert_eq!(summary.phase, RunPhase::Failed);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(
        script.take_invoked(),
        vec![
            StepName::Validate,
            StepName::Backup,
            StepName::DevEnv,
            StepName::Fonts,
            StepName::Apps,
        ]
    );
    for step in [StepName::Git, StepName::Ssh, StepName::Cursor, StepName::Repos] {
        assert_eq!(summary.outcome(step), Some(StepOutcome::NotRun));
    }

    let state = orchestrator.state_store().load(Platform::Arch)?;
    let state = state.ok_or_else(|| anyhow::anyhow!("run state was not kept"))?;
    assert_eq!(state.status(StepName::Apps), StepStatus::Failed);
    assert_eq!(state.status(StepName::Git), StepStatus::Pending);

    Ok(())
}

#[sealed_test]
fn clean_run_clears_state_and_session() -> Result<()> {
    let script = StepScript::new(Platform::MacOs)?;
    script.install(StepName::Apps, &["ripgrep"]);

    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    let summary = orchestrator.run()?;

    assert_eq!(summary.phase, RunPhase::Completed);
    assert_eq!(summary.session_id, None);
    assert_eq!(orchestrator.state_store().load(Platform::MacOs)?, None);
    assert_eq!(orchestrator.rollback_store().load_latest(Platform::MacOs)?, None);

    Ok(())
}

#[sealed_test]
fn clean_run_can_keep_session() -> Result<()> {
    let script = StepScript::new(Platform::MacOs)?;
    script.install(StepName::Apps, &["ripgrep"]);

    let options = RunOptions {
        keep_rollback: true,
        ..Default::default()
    };
    let orchestrator = script.orchestrator(Flags::default(), options);
    let summary = orchestrator.run()?;

    assert_eq!(orchestrator.state_store().load(Platform::MacOs)?, None);
    let session = orchestrator.rollback_store().load_latest(Platform::MacOs)?;
    let session = session.ok_or_else(|| anyhow::anyhow!("session was discarded"))?;
    assert_eq!(summary.session_id, Some(session.session_id));
    assert_eq!(session.installed_packages.len(), 1);

    Ok(())
}

#[sealed_test]
fn missing_config_disables_step() -> Result<()> {
    let script = StepScript::new(Platform::Debian)?.without_config(StepName::Fonts)?;

    let summary = script
        .orchestrator(Flags::default(), RunOptions::default())
        .run()?;

    assert_eq!(summary.outcome(StepName::Fonts), Some(StepOutcome::SkippedDisabled));
    assert!(!script.take_invoked().contains(&StepName::Fonts));

    Ok(())
}

#[sealed_test]
fn dry_run_persists_nothing() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    script.fail(StepName::Ssh);
    script.install(StepName::Apps, &["git"]);

    let orchestrator = script.orchestrator(Flags::default().dry_run(true), RunOptions::default());
    let summary = orchestrator.run()?;

    assert!(summary.dry_run);
    assert_eq!(summary.session_id, None);
    assert_eq!(script.seen_dry_run(), vec![true; StepName::ALL.len()]);
    assert!(!script.env.state_dir.exists());

    Ok(())
}

#[sealed_test]
fn ubuntu_scenario_retries_failed_apps() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    let flags = Flags::default().skip(StepName::Repos);
    script.fail(StepName::Apps);

    let orchestrator = script.orchestrator(flags.clone(), RunOptions::default());
    let summary = orchestrator.run()?;

    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.outcome(StepName::Apps), Some(StepOutcome::Failed));
    assert_eq!(summary.outcome(StepName::Repos), Some(StepOutcome::SkippedDisabled));
    for step in [
        StepName::Validate,
        StepName::Backup,
        StepName::DevEnv,
        StepName::Fonts,
        StepName::Git,
        StepName::Ssh,
        StepName::Cursor,
    ] {
        assert_eq!(summary.outcome(step), Some(StepOutcome::Succeeded), "{step}");
    }
    script.take_invoked();

    let state = orchestrator.state_store().load(Platform::Ubuntu)?;
    let state = state.ok_or_else(|| anyhow::anyhow!("run state was not kept"))?;
    assert_eq!(state.failed_steps(), vec![StepName::Apps]);
    assert_eq!(state.status(StepName::Repos), StepStatus::Pending);

    script.recover(StepName::Apps);
    let orchestrator = script.orchestrator(flags, RunOptions::default());
    let summary = orchestrator.run()?;

    assert_eq!(script.take_invoked(), vec![StepName::Apps]);
    assert_eq!(
        summary.outcome(StepName::Validate),
        Some(StepOutcome::SkippedComplete)
    );
    assert_eq!(summary.outcome(StepName::Apps), Some(StepOutcome::Succeeded));
    assert_eq!(orchestrator.state_store().load(Platform::Ubuntu)?, None);

    Ok(())
}

/// Orchestrator whose fonts step replaces the state directory with a plain
/// file, optionally reporting an installed package first.
fn orchestrator_losing_state_dir(script: &StepScript, install: bool) -> Orchestrator {
    let mut actions = script.actions();
    actions.insert(StepName::Fonts, move |env: &Environment| {
        let _ = fs::remove_dir_all(&env.state_dir);
        let _ = fs::write(&env.state_dir, "not a directory");
        let outcome = ActionOutcome::success("fonts done");
        if install {
            outcome.with_side_effects([SideEffect::InstalledPackage {
                manager: PackageManager::Apt,
                package: "fonts-firacode".into(),
            }])
        } else {
            outcome
        }
    });

    Orchestrator::new(script.env.clone(), actions)
}

#[sealed_test]
fn state_write_failure_aborts_run() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    let result = orchestrator_losing_state_dir(&script, false).run();

    assert!(matches!(result, Err(OrchestratorError::State(_))), "{result:?}");
    assert_eq!(
        script.take_invoked(),
        vec![StepName::Validate, StepName::Backup, StepName::DevEnv]
    );

    Ok(())
}

#[sealed_test]
fn session_write_failure_aborts_run() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    let result = orchestrator_losing_state_dir(&script, true).run();

    assert!(matches!(result, Err(OrchestratorError::Rollback(_))), "{result:?}");
    assert_eq!(
        script.take_invoked(),
        vec![StepName::Validate, StepName::Backup, StepName::DevEnv]
    );

    Ok(())
}
