use std::time::{Duration, Instant};

/// Accumulating wall-clock timer.
#[derive(Debug, Clone)]
pub struct Timer
{
    name: String,
    started: Option<Instant>,
    partial: Duration,
    total: Duration,
}

impl Timer
{
    pub fn new(name: &str) -> Self
    {
        Timer {
            name: name.to_string(),
            started: None,
            partial: Duration::ZERO,
            total: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn is_running(&self) -> bool
    {
        self.started.is_some()
    }

    /// Starts a new partial interval; warns and does nothing if already running.
    pub fn start(&mut self)
    {
        if self.started.is_some() {
            log::warn!("timer {}: started twice", self.name);
        }
        else {
            self.started = Some(Instant::now());
        }
    }

    /// Stops the running interval.
    /// 
    /// Returns the seconds of the interval, zero with a warning if not running.
    pub fn stop(&mut self) -> f64
    {
        match self.started.take() {
            Some(t) => {
                self.partial = t.elapsed();
                self.total += self.partial;
                self.partial.as_secs_f64()
            },
            None => {
                log::warn!("timer {}: stopped without being started", self.name);
                0.
            },
        }
    }

    /// Seconds of the running interval so far, or of the last one if stopped.
    pub fn partial(&self) -> f64
    {
        match self.started {
            Some(t) => t.elapsed().as_secs_f64(),
            None => self.partial.as_secs_f64(),
        }
    }

    /// Seconds accumulated over all the stopped intervals.
    pub fn total(&self) -> f64
    {
        self.total.as_secs_f64()
    }

    pub fn reset(&mut self)
    {
        self.started = None;
        self.partial = Duration::ZERO;
        self.total = Duration::ZERO;
    }
}

//

#[test]
fn test_timer1()
{
    let mut t = Timer::new("test");
    assert_eq!(t.stop(), 0.);

    t.start();
    assert!(t.is_running());
    std::thread::sleep(Duration::from_millis(5));
    let p = t.stop();
    assert!(p >= 0.005);
    assert_eq!(t.partial(), p);

    t.start();
    t.stop();
    assert!(t.total() >= p);

    t.reset();
    assert_eq!(t.total(), 0.);
    assert_eq!(t.name(), "test");
}
