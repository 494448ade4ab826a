//! Per-frame timing and frame rate logging.

use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Measures how long an operation takes, across repeated invocations.
///
/// Displaying a timer with `{}` prints the number of measurements, their mean and the slowest one,
/// and then starts a new measurement window.
pub struct Timer {
    name: &'static str,
    window: Mutex<Window>,
}

#[derive(Default)]
struct Window {
    total: Duration,
    max: Duration,
    count: u32,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            window: Mutex::new(Window::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes `f` and records the time it takes.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        f()
    }

    /// Starts a measurement that ends when the returned [`TimerGuard`] is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Number of measurements in the current window.
    pub fn count(&self) -> u32 {
        self.lock().count
    }

    fn record(&self, elapsed: Duration) {
        let mut window = self.lock();
        window.total += elapsed;
        window.max = window.max.max(elapsed);
        window.count += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        // A panic while holding the lock cannot leave the window half-updated.
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = std::mem::take(&mut *self.lock());
        let mean_ms = match window.count {
            0 => 0.0,
            n => window.total.as_secs_f64() * 1000.0 / f64::from(n),
        };
        let max_ms = window.max.as_secs_f64() * 1000.0;
        write!(
            f,
            "{}: {}x{:.01}ms (max {:.01}ms)",
            self.name, window.count, mean_ms, max_ms
        )
    }
}

/// Guard returned by [`Timer::start`].
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Logs the frame rate of a loop once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Counts a frame, logging the frame rate and `timers` if a second has passed.
    ///
    /// Logging a timer resets it.
    pub fn tick_with<'a, I: IntoIterator<Item = &'a Timer>>(&mut self, timers: I) {
        self.frames += 1;
        if self.start.elapsed() < Duration::from_secs(1) {
            return;
        }

        let timers = timers
            .into_iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>();
        if timers.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({})", self.name, self.frames, timers.join(", "));
        }

        self.frames = 0;
        self.start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_resets_window() {
        let timer = Timer::new("work");
        timer.time(|| std::thread::sleep(Duration::from_millis(2)));
        {
            let _guard = timer.start();
        }
        assert_eq!(timer.count(), 2);

        let shown = timer.to_string();
        assert!(shown.starts_with("work: 2x"), "{shown}");
        assert_eq!(timer.count(), 0);
        assert_eq!(timer.to_string(), "work: 0x0.0ms (max 0.0ms)");
    }

    #[test]
    fn time_returns_value() {
        let timer = Timer::new("t");
        assert_eq!(timer.time(|| 7), 7);
    }
}
