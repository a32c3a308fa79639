//! Re-render coalescing for streaming messages.

use std::time::{Duration, Instant};

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(50);

/// At most one render per interval, with a trailing-edge render for updates
/// that arrive inside the interval so the newest buffer is always shown.
///
/// The throttle only decides; callers pass in `now` and do the rendering.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval: Duration,
    last_render: Option<Instant>,
    pending: bool,
}

impl Default for RenderThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_INTERVAL)
    }
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
            pending: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record an update. Returns true if the caller should render now;
    /// otherwise the render is deferred to [`deadline`](Self::deadline).
    pub fn on_update(&mut self, now: Instant) -> bool {
        match self.last_render {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.rendered(now);
                true
            }
        }
    }

    /// When the deferred render is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_render.map(|last| last + self.interval)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Called when the deadline timer fires. Returns true if the caller
    /// should render now.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(due) if now >= due => {
                self.rendered(now);
                true
            }
            _ => false,
        }
    }

    /// The stream has ended. The caller must render once more regardless of
    /// timing; any pending render is absorbed by it.
    pub fn finish(&mut self, now: Instant) {
        self.rendered(now);
    }

    fn rendered(&mut self, now: Instant) {
        self.last_render = Some(now);
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_update_renders_immediately() {
        let mut throttle = RenderThrottle::default();
        assert!(throttle.on_update(Instant::now()));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_burst_coalesces_to_trailing_render() {
        let start = Instant::now();
        let mut throttle = RenderThrottle::new(ms(50));
        assert!(throttle.on_update(start));
        assert!(!throttle.on_update(start + ms(10)));
        assert!(!throttle.on_update(start + ms(20)));
        assert!(!throttle.on_update(start + ms(49)));
        assert_eq!(throttle.deadline(), Some(start + ms(50)));

        assert!(!throttle.poll(start + ms(30)));
        assert!(throttle.poll(start + ms(50)));
        assert!(!throttle.is_pending());
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_update_after_interval_renders() {
        let start = Instant::now();
        let mut throttle = RenderThrottle::new(ms(50));
        assert!(throttle.on_update(start));
        assert!(throttle.on_update(start + ms(60)));
        assert!(!throttle.on_update(start + ms(70)));
        assert_eq!(throttle.deadline(), Some(start + ms(110)));
    }

    #[test]
    fn test_finish_clears_pending() {
        let start = Instant::now();
        let mut throttle = RenderThrottle::new(ms(50));
        throttle.on_update(start);
        throttle.on_update(start + ms(5));
        assert!(throttle.is_pending());
        throttle.finish(start + ms(6));
        assert!(!throttle.is_pending());
        assert!(!throttle.poll(start + ms(100)));
    }

    #[test]
    fn test_at_most_one_render_per_interval() {
        let start = Instant::now();
        let mut throttle = RenderThrottle::new(ms(50));
        let mut renders = 0;
        for i in 0..100u64 {
            let now = start + ms(i);
            if throttle.on_update(now) || throttle.poll(now) {
                renders += 1;
            }
        }
        assert_eq!(renders, 2);
    }
}
