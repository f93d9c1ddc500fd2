use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::store::{Adapter, Mode, Reporter};

#[derive(Clone, Debug, Serialize)]
pub struct Failure {
    pub context: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/**
 * Reporter that remembers the most recent failure for the status indicator
 */
#[derive(Default)]
pub struct StatusBoard {
    last: Mutex<Option<Failure>>,
}

impl StatusBoard {
    pub fn last_failure(&self) -> Option<Failure> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Reporter for StatusBoard {
    fn report(&self, context: &str, error: &Error) {
        error!("Failed to {}: {}", context, error);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Failure {
            context: context.to_string(),
            message: error.to_string(),
            at: Utc::now(),
        });
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub mode: Mode,
    pub connected: bool,
    pub indicator: &'static str,
    pub last_error: Option<Failure>,
}

impl Status {
    pub fn of(adapter: &Adapter, board: &StatusBoard) -> Self {
        let connected = adapter.is_connected();
        let indicator = match (adapter.mode(), connected) {
            (Mode::Remote, true) => "Connected to the North Pole",
            (Mode::Remote, false) => "Offline, the North Pole is not answering",
            (Mode::Local, _) => "Local mode, configure the document store to sync",
        };

        Self {
            mode: adapter.mode(),
            connected,
            indicator,
            last_error: board.last_failure(),
        }
    }
}
