//! Append-only persistence of day records.
//!
//! Records live in the key-value store under `gps_session:YYYY-MM-DD`. The
//! in-memory copy is authoritative for the running day: a failed write leaves
//! the record marked dirty and it is written again on the next append, so
//! totals shown to the user never depend on the disk being reachable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{GpsSession, RecordSink, SessionTotals};
use crate::clock::{date_key, local_date, Clock};
use crate::error::DatabaseError;
use crate::events::GpsEvent;
use crate::storage::KeyValueStore;

pub const SESSION_KEY_PREFIX: &str = "gps_session:";

pub fn session_key(date: NaiveDate) -> String {
    format!("{SESSION_KEY_PREFIX}{}", date_key(date))
}

/// Where an undecodable day record is moved before it is overwritten.
pub fn corrupt_backup_key(date: NaiveDate, at_ms: i64) -> String {
    format!("{}:corrupt:{at_ms}", session_key(date))
}

struct CachedSession {
    session: GpsSession,
    dirty: bool,
    /// The disk copy could not be read when this entry was created; merge it
    /// in before the first write so nothing on disk is overwritten.
    merge_on_write: bool,
}

pub struct SessionStore {
    kv: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    sessions: BTreeMap<NaiveDate, CachedSession>,
    write_attempts: u32,
}

impl SessionStore {
    pub fn new(kv: Box<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            sessions: BTreeMap::new(),
            write_attempts: 1,
        }
    }

    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    /// The backing store, for records that are not day sessions.
    pub fn kv(&self) -> &dyn KeyValueStore {
        self.kv.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now_ms())
    }

    /// Append `event` to the record for `date` and store `totals` with it.
    ///
    /// Never fails: write errors are logged and retried on the next append.
    pub fn append_event(
        &mut self,
        date: NaiveDate,
        event: GpsEvent,
        totals: SessionTotals,
    ) -> GpsSession {
        let entry = self.entry(date);
        entry.session.push_event(event);
        entry.session.totals = totals;
        entry.dirty = true;
        let snapshot = entry.session.clone();
        self.flush();
        snapshot
    }

    /// Refresh the totals of an existing record. Records are never created
    /// without an event.
    pub fn update_totals(&mut self, date: NaiveDate, totals: SessionTotals) -> Option<GpsSession> {
        if !self.sessions.contains_key(&date) {
            match self.read(date) {
                Ok(Some(session)) => {
                    self.sessions.insert(
                        date,
                        CachedSession {
                            session,
                            dirty: false,
                            merge_on_write: false,
                        },
                    );
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(date = %date, error = %e, "Could not read day record for totals update");
                    return None;
                }
            }
        }

        let entry = self.sessions.get_mut(&date)?;
        if entry.session.totals == totals {
            return Some(entry.session.clone());
        }
        entry.session.totals = totals;
        entry.dirty = true;
        let snapshot = entry.session.clone();
        self.flush();
        Some(snapshot)
    }

    pub fn load_today(&mut self) -> Result<Option<GpsSession>, DatabaseError> {
        let today = self.today();
        self.load_by_date(today)
    }

    pub fn load_by_date(&mut self, date: NaiveDate) -> Result<Option<GpsSession>, DatabaseError> {
        if let Some(entry) = self.sessions.get(&date) {
            return Ok(Some(entry.session.clone()));
        }
        let loaded = self.read(date)?;
        if let Some(session) = &loaded {
            self.sessions.insert(
                date,
                CachedSession {
                    session: session.clone(),
                    dirty: false,
                    merge_on_write: false,
                },
            );
        }
        Ok(loaded)
    }

    /// Wipe today's record. Other days are untouched.
    pub fn clear_today(&mut self) -> Result<NaiveDate, DatabaseError> {
        let today = self.today();
        self.clear_date(today)?;
        Ok(today)
    }

    /// Wipe the record for `date`, in memory and on disk.
    pub fn clear_date(&mut self, date: NaiveDate) -> Result<(), DatabaseError> {
        self.sessions.remove(&date);
        self.kv.kv_delete(&session_key(date))?;
        debug!(date = %date, "Cleared day record");
        Ok(())
    }

    /// Number of day records waiting to be written.
    pub fn pending_writes(&self) -> usize {
        self.sessions.values().filter(|e| e.dirty).count()
    }

    /// Try to write every dirty record. Returns how many are still pending.
    pub fn flush(&mut self) -> usize {
        let kv = self.kv.as_ref();
        let attempts = self.write_attempts;
        let now = self.clock.now_ms();

        for (date, entry) in self.sessions.iter_mut().filter(|(_, e)| e.dirty) {
            if entry.merge_on_write {
                match read_session(kv, *date) {
                    Ok(Some(on_disk)) => entry.session.merge_missing(on_disk),
                    Ok(None) => {}
                    // Undecodable on every read; set it aside so the day can be written.
                    Err(DatabaseError::CorruptRecord { message, .. }) => {
                        match back_up_corrupt(kv, *date, now) {
                            Ok(backup) => warn!(
                                date = %date,
                                backup = %backup,
                                error = %message,
                                "Corrupt day record moved aside"
                            ),
                            Err(e) => {
                                warn!(
                                    date = %date,
                                    error = %e,
                                    "Corrupt day record could not be backed up, write deferred"
                                );
                                continue;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(date = %date, error = %e, "Day record unreadable, write deferred");
                        continue;
                    }
                }
                entry.merge_on_write = false;
            }

            match write_session(kv, &entry.session, attempts) {
                Ok(()) => entry.dirty = false,
                Err(e) => warn!(
                    date = %date,
                    events = entry.session.events.len(),
                    error = %e,
                    "Day record write failed, will retry on next append"
                ),
            }
        }

        self.pending_writes()
    }

    fn entry(&mut self, date: NaiveDate) -> &mut CachedSession {
        let kv = self.kv.as_ref();
        self.sessions.entry(date).or_insert_with(|| match read_session(kv, date) {
            Ok(Some(session)) => CachedSession {
                session,
                dirty: false,
                merge_on_write: false,
            },
            Ok(None) => CachedSession {
                session: GpsSession::new(date),
                dirty: false,
                merge_on_write: false,
            },
            Err(e) => {
                warn!(date = %date, error = %e, "Day record unreadable, starting in memory");
                CachedSession {
                    session: GpsSession::new(date),
                    dirty: false,
                    merge_on_write: true,
                }
            }
        })
    }

    fn read(&self, date: NaiveDate) -> Result<Option<GpsSession>, DatabaseError> {
        read_session(self.kv.as_ref(), date)
    }
}

fn read_session(
    kv: &dyn KeyValueStore,
    date: NaiveDate,
) -> Result<Option<GpsSession>, DatabaseError> {
    let key = session_key(date);
    let Some(raw) = kv.kv_get(&key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| DatabaseError::CorruptRecord {
            key,
            message: e.to_string(),
        })
}

fn back_up_corrupt(
    kv: &dyn KeyValueStore,
    date: NaiveDate,
    at_ms: i64,
) -> Result<String, DatabaseError> {
    let backup = corrupt_backup_key(date, at_ms);
    if let Some(raw) = kv.kv_get(&session_key(date))? {
        kv.kv_set(&backup, &raw)?;
    }
    Ok(backup)
}

impl RecordSink for SessionStore {
    fn record_event(&mut self, date: NaiveDate, event: GpsEvent, totals: SessionTotals) {
        self.append_event(date, event, totals);
    }

    fn record_totals(&mut self, date: NaiveDate, totals: SessionTotals) {
        self.update_totals(date, totals);
    }

    fn record_snapshot(&mut self, key: &str, json: &str) {
        if let Err(e) = self.kv.kv_set(key, json) {
            warn!(key, error = %e, "Failed to save snapshot");
        }
    }

    fn pending_writes(&self) -> usize {
        SessionStore::pending_writes(self)
    }
}

fn write_session(
    kv: &dyn KeyValueStore,
    session: &GpsSession,
    attempts: u32,
) -> Result<(), DatabaseError> {
    let key = session_key(session.date);
    let json = serde_json::to_string(session).map_err(|e| DatabaseError::CorruptRecord {
        key: key.clone(),
        message: e.to_string(),
    })?;

    let mut last_err = None;
    for _ in 0..attempts.max(1) {
        match kv.kv_set(&key, &json) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(DatabaseError::Locked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventType;
    use crate::storage::Database;

    fn store_at(ms: i64) -> SessionStore {
        SessionStore::new(
            Box::new(Database::open_memory().unwrap()),
            Arc::new(ManualClock::new(ms)),
        )
    }

    fn manual(at_ms: i64) -> GpsEvent {
        GpsEvent::new(EventType::Manual, at_ms, None, None)
    }

    #[test]
    fn creates_record_lazily_on_first_event() {
        let mut store = store_at(1_700_000_000_000);
        assert!(store.load_today().unwrap().is_none());

        let today = store.today();
        let totals = SessionTotals {
            travel_minutes: 3.0,
            ..SessionTotals::default()
        };
        let session = store.append_event(
            today,
            GpsEvent::new(EventType::HomeLeave, 1_700_000_000_000, None, None),
            totals,
        );
        assert_eq!(session.events.len(), 1);
        assert_eq!(session.totals, totals);
        assert_eq!(store.pending_writes(), 0);

        let raw = store.kv().kv_get(&session_key(today)).unwrap().unwrap();
        let on_disk: GpsSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk, session);
    }

    #[test]
    fn update_totals_needs_existing_record() {
        let mut store = store_at(0);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(store.update_totals(date, SessionTotals::default()).is_none());
        store.append_event(date, manual(5), SessionTotals::default());
        let totals = SessionTotals {
            work_minutes: 42.0,
            ..SessionTotals::default()
        };
        assert_eq!(store.update_totals(date, totals).unwrap().totals, totals);
    }

    #[test]
    fn clear_today_leaves_other_days() {
        let mut store = store_at(1_700_000_000_000);
        let today = store.today();
        let yesterday = today.pred_opt().unwrap();
        store.append_event(today, manual(1), SessionTotals::default());
        store.append_event(yesterday, manual(0), SessionTotals::default());

        assert_eq!(store.clear_today().unwrap(), today);
        assert!(store.load_today().unwrap().is_none());
        assert!(store.load_by_date(yesterday).unwrap().is_some());
    }

    #[test]
    fn corrupt_record_is_reported() {
        let mut store = store_at(0);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        store.kv().kv_set(&session_key(date), "{not json").unwrap();
        assert!(matches!(
            store.load_by_date(date),
            Err(DatabaseError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn clear_date_removes_only_that_day() {
        let mut store = store_at(1_700_000_000_000);
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        store.append_event(day, manual(1), SessionTotals::default());
        store.clear_date(day).unwrap();
        assert!(store.load_by_date(day).unwrap().is_none());
        assert!(store.kv().kv_get(&session_key(day)).unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_moved_aside_and_overwritten() {
        let now = 1_700_000_000_000;
        let mut store = store_at(now);
        let today = store.today();
        store.kv().kv_set(&session_key(today), "{not json").unwrap();

        let session = store.append_event(today, manual(now), SessionTotals::default());
        assert_eq!(store.pending_writes(), 0);

        let backup = store.kv().kv_get(&corrupt_backup_key(today, now)).unwrap();
        assert_eq!(backup.as_deref(), Some("{not json"));
        assert_eq!(store.load_by_date(today).unwrap(), Some(session));

        store.append_event(today, manual(now + 1), SessionTotals::default());
        let raw = store.kv().kv_get(&session_key(today)).unwrap().unwrap();
        let on_disk: GpsSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.events.len(), 2);
    }
}
