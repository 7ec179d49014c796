//! Replays a recorded field log, one fix per request.
//!
//! The log is JSON lines, one [`LocationData`] per line in the persisted
//! layout (`{"lat":..,"lng":..,"accuracyMeters":..,"timestampMs":..}`).
//! Blank lines and lines starting with `#` are skipped.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LocationData, LocationProvider};
use crate::error::{CoreError, LocationError};

pub struct ReplayProvider {
    fixes: Mutex<VecDeque<LocationData>>,
    permission_granted: bool,
}

impl ReplayProvider {
    pub fn from_fixes(fixes: impl IntoIterator<Item = LocationData>) -> Self {
        Self {
            fixes: Mutex::new(fixes.into_iter().collect()),
            permission_granted: true,
        }
    }

    /// Parse a JSON-lines log.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line is not a valid fix.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CoreError> {
        let mut fixes = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fix: LocationData = serde_json::from_str(line)?;
            fix.validate()?;
            fixes.push(fix);
        }
        Ok(Self::from_fixes(fixes))
    }

    /// Simulate a platform that refuses location access.
    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    pub fn remaining(&self) -> usize {
        self.fixes.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LocationProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn check_permissions(&self) -> bool {
        self.permission_granted
    }

    async fn request_permissions(&self) -> Result<bool, LocationError> {
        if self.permission_granted {
            Ok(true)
        } else {
            Err(LocationError::PermissionDenied)
        }
    }

    async fn current_position(&self) -> Result<LocationData, LocationError> {
        let mut queue = self
            .fixes
            .lock()
            .map_err(|_| LocationError::PositionUnavailable("replay queue poisoned".into()))?;
        queue.pop_front().ok_or(LocationError::StreamEnded)
    }
}
