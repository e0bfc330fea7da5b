// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::StepScript;

use anyhow::Result;
use devstrap::{
    config::Platform,
    orchestrator::{RunOptions, StepOutcome},
    state::{RunState, StepStatus},
    step::{Flags, StepName},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use simple_test_case::test_case;
use std::fs;

// Interrupt the first run right after step `k` by failing step `k + 1` in
// fail-fast mode.
#[test_case(0; "after validate")]
#[test_case(2; "after devenv")]
#[test_case(4; "after apps")]
#[test_case(7; "after cursor")]
#[sealed_test]
fn resume_never_repeats_completed_steps(k: usize) -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    let interrupted = StepName::ALL[k + 1];
    script.fail(interrupted);

    let options = RunOptions {
        fail_fast: true,
        ..Default::default()
    };
    script.orchestrator(Flags::default(), options).run()?;
    pretty_assertions::assert_eq!(script.take_invoked(), StepName::ALL[..=k + 1].to_vec());

    script.recover(interrupted);
    let summary = script.orchestrator(Flags::default(), options).run()?;

    pretty_assertions::assert_eq!(script.take_invoked(), StepName::ALL[k + 1..].to_vec());
    for step in &StepName::ALL[..=k] {
        pretty_assertions::assert_eq!(summary.outcome(*step), Some(StepOutcome::SkippedComplete));
    }

    Ok(())
}

#[sealed_test]
fn no_resume_starts_over() -> Result<()> {
    let script = StepScript::new(Platform::Fedora)?;
    script.fail(StepName::Repos);
    script
        .orchestrator(Flags::default(), RunOptions::default())
        .run()?;
    script.take_invoked();

    let options = RunOptions {
        no_resume: true,
        ..Default::default()
    };
    script.orchestrator(Flags::default(), options).run()?;

    assert_eq!(script.take_invoked(), StepName::ALL.to_vec());

    Ok(())
}

#[sealed_test]
fn no_resume_keeps_earlier_undo_log() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    script.install(StepName::Apps, &["a"]);
    script.fail(StepName::Repos);
    script
        .orchestrator(Flags::default(), RunOptions::default())
        .run()?;

    script.install(StepName::Apps, &["b"]);
    let options = RunOptions {
        no_resume: true,
        ..Default::default()
    };
    let orchestrator = script.orchestrator(Flags::default(), options);
    orchestrator.run()?;

    let session = orchestrator.rollback_store().load_latest(Platform::Ubuntu)?;
    let packages = session
        .map(|session| session.installed_packages)
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.package)
        .collect::<Vec<_>>();
    assert_eq!(packages, vec!["a", "b"]);

    Ok(())
}

#[sealed_test]
fn corrupt_state_starts_fresh() -> Result<()> {
    let script = StepScript::new(Platform::Debian)?;
    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    let store = orchestrator.state_store();
    fs::create_dir_all(store.base_path())?;
    fs::write(store.state_path(Platform::Debian), r#"{ "version": 1, "steps": "#)?;

    assert_eq!(store.load(Platform::Debian)?, None);
    let fresh = store.create(Platform::Debian)?;
    assert_eq!(fresh.status(StepName::Validate), StepStatus::Pending);

    fs::write(store.state_path(Platform::Debian), "garbage")?;
    script.fail(StepName::Git);
    orchestrator.run()?;

    assert_eq!(script.take_invoked(), StepName::ALL.to_vec());

    Ok(())
}

#[sealed_test]
fn resumed_run_keeps_appending_to_session() -> Result<()> {
    let script = StepScript::new(Platform::MacOs)?;
    script.install(StepName::Apps, &["a"]);
    script.fail(StepName::Apps);
    let first = script
        .orchestrator(Flags::default(), RunOptions::default())
        .run()?;

    script.recover(StepName::Apps);
    script.install(StepName::Apps, &["b"]);
    let options = RunOptions {
        keep_rollback: true,
        ..Default::default()
    };
    let orchestrator = script.orchestrator(Flags::default(), options);
    let second = orchestrator.run()?;

    assert_eq!(first.session_id, second.session_id);
    let session = orchestrator.rollback_store().load_latest(Platform::MacOs)?;
    let packages = session
        .map(|session| session.installed_packages)
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.package)
        .collect::<Vec<_>>();
    assert_eq!(packages, vec!["a", "b"]);

    Ok(())
}

#[sealed_test]
fn failed_steps_are_retried() -> Result<()> {
    let script = StepScript::new(Platform::Arch)?;
    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    let mut state = RunState::new(Platform::Arch);
    for step in StepName::ALL {
        state.transition(step, StepStatus::Complete)?;
    }
    state.steps.insert(StepName::Fonts, StepStatus::Failed);
    orchestrator.state_store().save(&state)?;

    orchestrator.run()?;

    assert_eq!(script.take_invoked(), vec![StepName::Fonts]);
    assert_eq!(orchestrator.state_store().load(Platform::Arch)?, None);

    Ok(())
}
