use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp_ms: u64,
}

/// Bounded log of user-visible notices; the oldest is evicted first.
pub struct NoticeBoard {
    capacity: usize,
    inner: Mutex<NoticeLog>,
}

struct NoticeLog {
    next_id: u64,
    notices: VecDeque<Notice>,
}

impl NoticeBoard {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(NoticeLog {
                next_id: 1,
                notices: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn info(&self, title: &str, description: &str) -> Notice {
        self.push(Severity::Info, title, description)
    }

    pub fn destructive(&self, title: &str, description: &str) -> Notice {
        self.push(Severity::Destructive, title, description)
    }

    pub fn push(&self, severity: Severity, title: &str, description: &str) -> Notice {
        match severity {
            Severity::Info => tracing::info!("{}: {}", title, description),
            Severity::Destructive => tracing::warn!("{}: {}", title, description),
        }

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut log = self.inner.lock();
        let notice = Notice {
            id: log.next_id,
            title: title.to_string(),
            description: description.to_string(),
            severity,
            timestamp_ms,
        };
        log.next_id += 1;
        if log.notices.len() == self.capacity {
            log.notices.pop_front();
        }
        log.notices.push_back(notice.clone());
        notice
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notice> {
        self.inner.lock().notices.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<Notice> {
        self.inner.lock().notices.back().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let board = NoticeBoard::new(4);

        let first = board.info("Camera Started", "Ready for detection");
        let second = board.destructive("Camera Error", "Enable camera permission");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(board.latest().unwrap().severity, Severity::Destructive);
    }

    #[test]
    fn test_oldest_notice_is_evicted() {
        let board = NoticeBoard::new(2);

        board.info("a", "1");
        board.info("b", "2");
        board.info("c", "3");

        let titles: Vec<_> = board.recent().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let board = NoticeBoard::new(0);

        board.info("a", "1");
        board.info("b", "2");

        assert_eq!(board.recent().len(), 1);
    }
}
