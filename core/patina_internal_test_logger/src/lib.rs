//! Logger for host-based unit tests.
//!
//! Echoes every record to stdout and keeps the formatted messages so tests can assert on what was logged. Install it
//! once per test binary with [`init`], typically from a `ctor` in the crate's test module.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{
    io::{self, Write},
    sync::Mutex,
};

use log::Log;

static RECORDS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static LOGGER: TestLogger = TestLogger;

/// Installs the test logger at trace level. Later calls are ignored.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}

#[allow(dead_code)]
#[cfg_attr(test, ctor::ctor)]
fn setup_test_logger() {
    init();
}

/// Every message logged so far, oldest first.
pub fn messages() -> Vec<String> {
    RECORDS.lock().map(|records| records.clone()).unwrap_or_default()
}

/// Number of logged messages starting with `prefix`.
pub fn count_messages(prefix: &str) -> usize {
    RECORDS.lock().map(|records| records.iter().filter(|message| message.starts_with(prefix)).count()).unwrap_or(0)
}

pub struct TestLogger;

impl Log for TestLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let message = record.args().to_string();
        _ = io::stdout().write_fmt(format_args!("{}\n", message));
        if let Ok(mut records) = RECORDS.lock() {
            records.push(message);
        }
    }

    fn flush(&self) {
        _ = io::stdout().flush()
    }
}
