//! In-memory transport and manual clock for driving streams in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::application::ports::{Frame, OpenOptions, Scheduler, TimerToken, Transport};

#[derive(Debug, Default)]
struct TransportLog {
    opens: Vec<(String, OpenOptions)>,
    sent: Vec<Frame>,
    closes: usize,
}

/// Records every call; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    pub fn opens(&self) -> usize {
        self.log.lock().opens.len()
    }

    pub fn last_open(&self) -> Option<(String, OpenOptions)> {
        self.log.lock().opens.last().cloned()
    }

    pub fn closes(&self) -> usize {
        self.log.lock().closes
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.log.lock().sent.clone()
    }

    /// Sent text frames parsed as JSON.
    pub fn sent(&self) -> Vec<Value> {
        self.log
            .lock()
            .sent
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// Sent messages with the given `action`.
    pub fn sent_actions(&self, action: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["action"] == action)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.log.lock().sent.clear();
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, url: &str, options: OpenOptions) {
        self.log.lock().opens.push((url.to_string(), options));
    }

    fn send(&mut self, frame: Frame) {
        self.log.lock().sent.push(frame);
    }

    fn close(&mut self) {
        self.log.lock().closes += 1;
    }
}

#[derive(Debug, Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerToken, Duration>,
}

/// Timers that only fire when the test advances time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    pub fn boxed(&self) -> Box<dyn Scheduler> {
        Box::new(self.clone())
    }

    /// Move time forward and return the timers that came due, earliest first.
    pub fn advance(&self, by: Duration) -> Vec<TimerToken> {
        let mut state = self.state.lock();
        state.now += by;
        let now = state.now;
        let mut due: Vec<(Duration, TimerToken)> = state
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(token, at)| (*at, *token))
            .collect();
        due.sort();
        for (_, token) in &due {
            state.timers.remove(token);
        }
        due.into_iter().map(|(_, token)| token).collect()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Scheduler for ManualClock {
    fn set_timer(&mut self, delay: Duration) -> TimerToken {
        let mut state = self.state.lock();
        state.next_id += 1;
        let token = TimerToken::new(state.next_id);
        let at = state.now + delay;
        state.timers.insert(token, at);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        self.state.lock().timers.remove(&token);
    }
}

/// Text frame holding `value` as JSON.
pub fn frame(value: &Value) -> Frame {
    Frame::Text(value.to_string())
}
