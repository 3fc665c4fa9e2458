use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Retention cap of the notification center.
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    TaskDue,
    TaskCompleted,
    Info,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub reminder_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub task_id: Option<i64>,
    pub reminder_id: Option<i64>,
}

/// Ordered notification records (newest first) with a cached unread count.
#[derive(Debug, Default)]
pub struct NotificationLog {
    records: Vec<NotificationRecord>,
    unread_count: usize,
    last_id: i64,
}

impl NotificationLog {
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn get(&self, id: i64) -> Option<&NotificationRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn add(&mut self, notification: NewNotification) -> NotificationRecord {
        self.add_at(notification, Utc::now())
    }

    pub fn add_at(&mut self, notification: NewNotification, now: DateTime<Utc>) -> NotificationRecord {
        // Ids follow creation time in ms but never repeat within one log.
        let id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;

        let record = NotificationRecord {
            id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            timestamp: now,
            read: false,
            task_id: notification.task_id,
            reminder_id: notification.reminder_id,
        };

        self.records.insert(0, record.clone());
        self.unread_count += 1;
        self.trim();

        record
    }

    pub fn mark_read(&mut self, id: i64) -> bool {
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) if !record.read => {
                record.read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        self.records.iter_mut().for_each(|record| record.read = true);
        self.unread_count = 0;
    }

    pub fn remove(&mut self, id: i64) -> Option<NotificationRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        let removed = self.records.remove(index);

        if !removed.read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }

        Some(removed)
    }

    /// Keeps the newest `MAX_NOTIFICATIONS` records. Returns how many were dropped.
    pub fn trim(&mut self) -> usize {
        if self.records.len() <= MAX_NOTIFICATIONS {
            return 0;
        }

        let dropped = self.records.split_off(MAX_NOTIFICATIONS);
        let unread_dropped = dropped.iter().filter(|record| !record.read).count();
        self.unread_count = self.unread_count.saturating_sub(unread_dropped);

        dropped.len()
    }
}

/// Thread-safe handle shared by the poller and the local API.
#[derive(Debug, Clone, Default)]
pub struct SharedNotificationLog {
    inner: Arc<Mutex<NotificationLog>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationSnapshot {
    pub unread_count: usize,
    pub notifications: Vec<NotificationRecord>,
}

impl SharedNotificationLog {
    fn lock(&self) -> MutexGuard<'_, NotificationLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, notification: NewNotification) -> NotificationRecord {
        self.lock().add(notification)
    }

    pub fn mark_read(&self, id: i64) -> bool {
        self.lock().mark_read(id)
    }

    pub fn mark_all_read(&self) {
        self.lock().mark_all_read();
    }

    pub fn remove(&self, id: i64) -> Option<NotificationRecord> {
        self.lock().remove(id)
    }

    pub fn trim(&self) -> usize {
        self.lock().trim()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().unread_count()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let log = self.lock();
        NotificationSnapshot {
            unread_count: log.unread_count(),
            notifications: log.records().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_NOTIFICATIONS, NewNotification, NotificationKind, NotificationLog};
    use chrono::{Duration, TimeZone, Utc};

    fn info(title: &str) -> NewNotification {
        NewNotification {
            kind: NotificationKind::Info,
            title: title.to_string(),
            message: String::new(),
            task_id: None,
            reminder_id: None,
        }
    }

    fn assert_unread_matches(log: &NotificationLog) {
        let actual = log.records().iter().filter(|record| !record.read).count();
        assert_eq!(log.unread_count(), actual);
    }

    #[test]
    fn add_inserts_unread_at_head() {
        let mut log = NotificationLog::default();
        let first = log.add(info("first"));
        let second = log.add(info("second"));

        assert_eq!(log.records()[0].id, second.id);
        assert_eq!(log.records()[1].id, first.id);
        assert!(!second.read);
        assert_eq!(log.unread_count(), 2);
    }

    #[test]
    fn ids_stay_unique_within_the_same_millisecond() {
        let mut log = NotificationLog::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 0).unwrap();

        let first = log.add_at(info("a"), now);
        let second = log.add_at(info("b"), now);
        let third = log.add_at(info("c"), now - Duration::seconds(1));

        assert_eq!(first.id, now.timestamp_millis());
        assert!(second.id > first.id);
        assert!(third.id > second.id);
    }

    #[test]
    fn mark_read_only_counts_unread_records() {
        let mut log = NotificationLog::default();
        let record = log.add(info("a"));

        assert!(log.mark_read(record.id));
        assert!(!log.mark_read(record.id));
        assert!(!log.mark_read(-1));
        assert_eq!(log.unread_count(), 0);
        assert!(log.get(record.id).expect("record").read);
    }

    #[test]
    fn mark_all_read_is_idempotent() {
        let mut log = NotificationLog::default();
        log.add(info("a"));
        log.add(info("b"));

        log.mark_all_read();
        let before = log.records().to_vec();
        log.mark_all_read();

        assert_eq!(log.unread_count(), 0);
        assert_eq!(log.records(), before.as_slice());
    }

    #[test]
    fn remove_decrements_only_for_unread_records() {
        let mut log = NotificationLog::default();
        let read = log.add(info("read"));
        let unread = log.add(info("unread"));
        log.mark_read(read.id);

        assert!(log.remove(read.id).is_some());
        assert_eq!(log.unread_count(), 1);
        assert!(log.remove(unread.id).is_some());
        assert_eq!(log.unread_count(), 0);
        assert!(log.remove(unread.id).is_none());
    }

    #[test]
    fn fifty_first_record_drops_the_oldest() {
        let mut log = NotificationLog::default();
        let oldest = log.add(info("oldest"));
        (1..MAX_NOTIFICATIONS).for_each(|index| {
            let record = log.add(info(&format!("n{index}")));
            if index % 2 == 0 {
                log.mark_read(record.id);
            }
        });
        assert_eq!(log.records().len(), MAX_NOTIFICATIONS);

        log.add(info("newest"));

        assert_eq!(log.records().len(), MAX_NOTIFICATIONS);
        assert!(log.get(oldest.id).is_none());
        assert_eq!(log.records()[0].title, "newest");
        assert_unread_matches(&log);
        assert_eq!(log.trim(), 0);
    }

    #[test]
    fn unread_count_tracks_records_across_mixed_operations() {
        let mut log = NotificationLog::default();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            let ids = log.records().iter().map(|record| record.id).collect::<Vec<_>>();
            let pick = (!ids.is_empty()).then(|| ids[(seed >> 8) as usize % ids.len()]);

            match seed % 10 {
                0..=4 => {
                    log.add(info("op"));
                }
                5 | 6 => {
                    if let Some(id) = pick {
                        log.mark_read(id);
                    }
                }
                7 => {
                    if let Some(id) = pick {
                        log.remove(id);
                    }
                }
                8 => log.mark_all_read(),
                _ => {
                    log.trim();
                }
            }

            assert_unread_matches(&log);
            assert!(log.records().len() <= MAX_NOTIFICATIONS);
        }
    }
}
