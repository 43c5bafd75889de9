// Neutron Harness: Resource tracking and teardown for Neutron test topologies
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Outcome of a single test, and the summary of a suite.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use time::OffsetDateTime;

use crate::teardown::TeardownReport;

/// Final status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    /// The body failed an assertion (or panicked).
    Failed,
    /// The body, the baseline, or a guard returned an error.
    Error,
    Skipped,
    /// The test is marked as expected to fail, and it did.
    ExpectedFailure,
    /// The test is marked as expected to fail, but it passed.
    UnexpectedSuccess,
}

impl Status {
    /// Returns `true` if the status does not make the suite fail.
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            Status::Passed | Status::Skipped | Status::ExpectedFailure
        )
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Passed => "passed",
            Status::Failed => "FAILED",
            Status::Error => "ERROR",
            Status::Skipped => "skipped",
            Status::ExpectedFailure => "expected failure",
            Status::UnexpectedSuccess => "UNEXPECTED SUCCESS",
        })
    }
}

/// Outcome of a single test, including the result of its teardown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    /// Name of the test case
    pub name: String,
    pub status: Status,
    /// Failure message, skip reason, or the issue of an expected failure.
    pub message: Option<String>,
    /// Backtrace of the panic, if the body panicked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Wall-clock time when the test started
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// Wall-clock time when the teardown finished
    #[serde(with = "time::serde::rfc3339")]
    pub stop: OffsetDateTime,
    /// Teardown failures never change the status; they are only reported here.
    pub teardown: TeardownReport,
}

impl TestOutcome {
    /// Time between start and stop.
    pub fn duration(&self) -> time::Duration {
        self.stop - self.start
    }

    /// Panic if the test failed, errored, or passed unexpectedly. Use this at the end of a
    /// `#[test]` function to surface the outcome to the test runner.
    pub fn check(&self) {
        if !self.status.is_ok() {
            panic!(
                "{} {}: {}\n{}",
                self.name,
                self.status,
                self.message.as_deref().unwrap_or("no message"),
                self.traceback.as_deref().unwrap_or_default()
            );
        }
    }
}

impl Display for TestOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ... {} ({:.3}s)",
            self.name,
            self.status,
            self.duration().as_seconds_f64()
        )?;
        if let Some(msg) = self.message.as_ref() {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Outcomes of all tests of a suite, with counters per status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    pub expected_failures: usize,
    pub unexpected_successes: usize,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteSummary {
    /// Add the outcome of a test.
    pub fn record(&mut self, outcome: TestOutcome) {
        match outcome.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failures += 1,
            Status::Error => self.errors += 1,
            Status::Skipped => self.skipped += 1,
            Status::ExpectedFailure => self.expected_failures += 1,
            Status::UnexpectedSuccess => self.unexpected_successes += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Number of tests run (including skipped ones).
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` if no test failed, errored, or passed unexpectedly.
    pub fn was_successful(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_ok())
    }
}

impl Display for SuiteSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tests: {} passed, {} failed, {} errors, {} skipped, {} expected failures, {} unexpected successes",
            self.total(),
            self.passed,
            self.failures,
            self.errors,
            self.skipped,
            self.expected_failures,
            self.unexpected_successes
        )
    }
}
