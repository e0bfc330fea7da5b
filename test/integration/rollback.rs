// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RecordingUninstaller, StepScript};

use anyhow::Result;
use devstrap::{
    config::Platform,
    orchestrator::RunOptions,
    step::{Flags, StepName},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;

#[sealed_test]
fn rollback_uninstalls_in_reverse_order() -> Result<()> {
    let script = StepScript::new(Platform::Ubuntu)?;
    script.install(StepName::Apps, &["A", "B", "C"]);
    script.fail(StepName::Repos);

    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    let summary = orchestrator.run()?;
    assert!(summary.session_id.is_some());

    let uninstaller = RecordingUninstaller::default();
    let report = orchestrator.rollback(&uninstaller)?;
    let report = report.ok_or_else(|| anyhow::anyhow!("nothing was rolled back"))?;

    assert_eq!(uninstaller.calls.into_inner(), vec!["C", "B", "A"]);
    assert!(report.is_complete());
    assert_eq!(orchestrator.rollback_store().load_latest(Platform::Ubuntu)?, None);
    assert_eq!(orchestrator.state_store().load(Platform::Ubuntu)?, None);

    Ok(())
}

#[sealed_test]
fn rollback_without_session_is_noop() -> Result<()> {
    let script = StepScript::new(Platform::Windows)?;
    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());

    let uninstaller = RecordingUninstaller::default();
    assert_eq!(orchestrator.rollback(&uninstaller)?, None);
    assert!(uninstaller.calls.into_inner().is_empty());

    Ok(())
}

#[sealed_test]
fn failed_action_side_effects_are_still_recorded() -> Result<()> {
    let script = StepScript::new(Platform::Fedora)?;
    script.install(StepName::Apps, &["neovim"]);
    script.fail(StepName::Apps);

    let orchestrator = script.orchestrator(Flags::default(), RunOptions::default());
    orchestrator.run()?;

    let session = orchestrator.rollback_store().load_latest(Platform::Fedora)?;
    let session = session.ok_or_else(|| anyhow::anyhow!("session was discarded"))?;
    assert_eq!(session.installed_packages.len(), 1);
    assert_eq!(session.installed_packages[0].package, "neovim");

    Ok(())
}
