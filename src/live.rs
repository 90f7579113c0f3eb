use crate::config::ResponseOrdering;
use crate::detection::{Detection, DetectionReport};
use crate::overlay::{Overlay, ScanStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

/// What the live page shows: detection list, overlay and status line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub streaming: bool,
    pub detecting: bool,
    pub status: ScanStatus,
    pub message: String,
    pub detections: Vec<Detection>,
    pub overlay: Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// Older than a response already shown.
    Stale,
    /// The capture session that issued it has ended.
    Inactive,
}

struct LiveState {
    snapshot: LiveSnapshot,
    next_session: u64,
    active_session: Option<u64>,
    newest_applied: Option<u64>,
}

/// Shared live detection state. Writes from a capture session are accepted
/// only while that session is active, so a stopped loop can never repaint.
pub struct LiveView {
    ordering: ResponseOrdering,
    state: Mutex<LiveState>,
    tx: watch::Sender<LiveSnapshot>,
}

impl LiveView {
    pub fn new(ordering: ResponseOrdering) -> Self {
        let snapshot = idle_snapshot(false);
        let (tx, _) = watch::channel(snapshot.clone());
        Self {
            ordering,
            state: Mutex::new(LiveState {
                snapshot,
                next_session: 1,
                active_session: None,
                newest_applied: None,
            }),
            tx,
        }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.state.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.tx.subscribe()
    }

    pub fn set_streaming(&self, streaming: bool) {
        let mut state = self.state.lock();
        state.snapshot.streaming = streaming;
        self.publish(&state);
    }

    /// Starts a capture session and returns its id.
    pub fn begin(&self) -> u64 {
        let mut state = self.state.lock();
        let session = state.next_session;
        state.next_session += 1;
        state.active_session = Some(session);
        state.newest_applied = None;

        state.snapshot.detecting = true;
        set_status(&mut state.snapshot, ScanStatus::Scanning);
        self.publish(&state);
        session
    }

    #[cfg(test)]
    pub fn is_active(&self, session: u64) -> bool {
        self.state.lock().active_session == Some(session)
    }

    /// Replaces detections and overlay with a fresh response.
    pub fn apply(&self, session: u64, seq: u64, report: &DetectionReport) -> Applied {
        let mut state = self.state.lock();
        if state.active_session != Some(session) {
            return Applied::Inactive;
        }
        if self.ordering == ResponseOrdering::LastIssued
            && state.newest_applied.is_some_and(|newest| seq < newest)
        {
            return Applied::Stale;
        }
        state.newest_applied = Some(state.newest_applied.map_or(seq, |n| n.max(seq)));

        state.snapshot.detections = report.detections.clone();
        state.snapshot.overlay = Overlay::from_detections(&report.detections);
        set_status(&mut state.snapshot, ScanStatus::from_report(report));
        self.publish(&state);
        Applied::Updated
    }

    /// Ends the session and clears what it displayed. Returns `false` if it was not active.
    pub fn end(&self, session: u64) -> bool {
        let mut state = self.state.lock();
        if state.active_session != Some(session) {
            return false;
        }
        state.active_session = None;
        state.newest_applied = None;

        let streaming = state.snapshot.streaming;
        state.snapshot = idle_snapshot(streaming);
        self.publish(&state);
        true
    }

    fn publish(&self, state: &LiveState) {
        self.tx.send_replace(state.snapshot.clone());
    }
}

fn idle_snapshot(streaming: bool) -> LiveSnapshot {
    LiveSnapshot {
        streaming,
        message: ScanStatus::Idle.to_string(),
        ..Default::default()
    }
}

fn set_status(snapshot: &mut LiveSnapshot, status: ScanStatus) {
    snapshot.status = status;
    snapshot.message = status.to_string();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(categories: &[&str]) -> DetectionReport {
        DetectionReport::new(
            categories
                .iter()
                .map(|category| Detection {
                    category: category.to_string(),
                    confidence: 0.9,
                    bbox: [1.0, 1.0, 20.0, 20.0],
                })
                .collect(),
        )
    }

    #[test]
    fn test_begin_sets_scanning() {
        let view = LiveView::new(ResponseOrdering::LastArrived);

        view.begin();
        let snapshot = view.snapshot();

        assert!(snapshot.detecting);
        assert_eq!(snapshot.status, ScanStatus::Scanning);
        assert_eq!(snapshot.message, "Scanning...");
    }

    #[test]
    fn test_empty_response_clears_overlay() {
        let view = LiveView::new(ResponseOrdering::LastArrived);
        let session = view.begin();

        view.apply(session, 1, &report(&["can", "straw"]));
        assert_eq!(view.snapshot().overlay.boxes.len(), 2);

        assert_eq!(view.apply(session, 2, &report(&[])), Applied::Updated);
        let snapshot = view.snapshot();

        assert!(snapshot.overlay.is_empty());
        assert!(snapshot.detections.is_empty());
        assert_eq!(snapshot.status, ScanStatus::NoObjects);
        assert_eq!(snapshot.message, "No objects found");
    }

    #[test]
    fn test_last_arrived_accepts_older_response() {
        let view = LiveView::new(ResponseOrdering::LastArrived);
        let session = view.begin();

        view.apply(session, 2, &report(&["can"]));
        let applied = view.apply(session, 1, &report(&["straw", "stick"]));

        assert_eq!(applied, Applied::Updated);
        assert_eq!(view.snapshot().detections.len(), 2);
    }

    #[test]
    fn test_last_issued_drops_older_response() {
        let view = LiveView::new(ResponseOrdering::LastIssued);
        let session = view.begin();

        view.apply(session, 2, &report(&["can"]));
        let applied = view.apply(session, 1, &report(&["straw", "stick"]));

        assert_eq!(applied, Applied::Stale);
        assert_eq!(view.snapshot().detections[0].category, "can");
        assert_eq!(view.apply(session, 3, &report(&[])), Applied::Updated);
    }

    #[test]
    fn test_ended_session_cannot_write() {
        let view = LiveView::new(ResponseOrdering::LastArrived);
        let old = view.begin();
        view.apply(old, 1, &report(&["can"]));

        assert!(view.end(old));
        assert_eq!(view.apply(old, 2, &report(&["can"])), Applied::Inactive);

        let snapshot = view.snapshot();
        assert!(!snapshot.detecting);
        assert!(snapshot.detections.is_empty());
        assert_eq!(snapshot.message, "Start detection");
        assert!(!view.end(old));
    }

    #[test]
    fn test_new_session_rejects_previous_session() {
        let view = LiveView::new(ResponseOrdering::LastArrived);
        let old = view.begin();
        let new = view.begin();

        assert_ne!(old, new);
        assert_eq!(view.apply(old, 1, &report(&["can"])), Applied::Inactive);
        assert!(view.is_active(new));
    }

    #[test]
    fn test_subscribers_see_updates() {
        let view = LiveView::new(ResponseOrdering::LastArrived);
        let mut rx = view.subscribe();

        view.set_streaming(true);
        let session = view.begin();
        view.apply(session, 1, &report(&["battery"]));

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert!(seen.streaming);
        assert_eq!(seen.status, ScanStatus::Detected(1));
    }
}
