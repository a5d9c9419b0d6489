use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Per-IP sliding window for the public playlist endpoint. Best effort:
/// counts live in process memory and reset on restart.
pub struct SlidingWindow {
    max_hits: u32,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl SlidingWindow {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit and reports whether the caller is still within its allowance.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut guard = self.hits.lock().await;
        let entry = guard.entry(ip).or_default();
        entry.retain(|hit| now.duration_since(*hit) < self.window);
        if entry.len() >= self.max_hits as usize {
            return false;
        }
        entry.push(now);
        true
    }
}
