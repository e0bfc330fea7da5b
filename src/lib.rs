// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resumable development machine bootstrap.
//!
//! Devstrap turns a fresh machine into a working development machine by
//! running a fixed, ordered sequence of __setup steps__: validate
//! configuration, back up files that get edited, prepare the package manager,
//! install fonts and applications, configure Git, generate an SSH key,
//! configure the Cursor editor, and clone repositories.
//!
//! # Resume and Rollback
//!
//! Setup runs are long, touch the network, and fail for boring reasons. So
//! devstrap records the status of every step after it runs. Invoking setup
//! again skips what already completed, and retries what failed. Every
//! reversible side effect of a run, i.e., file backups and newly installed
//! packages, is recorded in a rollback session that can be undone on demand.
//!
//! # Configuration
//!
//! Everything a run does is driven by a directory of JSON files, one per
//! step. See [`config`] for the layout. A step whose file is absent is simply
//! disabled.

pub mod action;
pub mod config;
pub mod marker;
pub mod orchestrator;
pub mod package;
pub mod path;
pub mod persist;
pub mod pool;
pub mod rollback;
pub mod state;
pub mod step;
pub mod syscall;

pub use action::{ActionOutcome, ActionSet, SideEffect, StepAction};
pub use config::{Environment, Platform};
pub use orchestrator::{Orchestrator, RunOptions, RunPhase, RunSummary, StepOutcome};
pub use step::{Flags, StepName, StepRegistry};
