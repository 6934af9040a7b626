use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity at which sleeping sensor threads notice a stop request
const SLEEP_SLICE: Duration = Duration::from_millis(500);

/// What the scheduler should do after a poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Arm the next cycle
    Continue,
    /// A required dependency is gone; stop polling this sensor
    Shutdown,
}

/// A periodically polled sensor
///
/// `poll` runs one full cycle and never panics on collaborator failures;
/// it reports them through the returned outcome.
pub trait Sensor: Send {
    fn name(&self) -> &str;

    fn poll(&mut self) -> PollOutcome;
}

struct Registration {
    sensor: Box<dyn Sensor>,
    interval: Duration,
}

/// Runs each sensor on its own thread with a fixed delay between cycles
///
/// The delay is re-armed after a cycle completes, so a slow cycle pushes the
/// next one back; two cycles of the same sensor never overlap.
pub struct SensorScheduler {
    pending: Vec<Registration>,
    running: Arc<Mutex<bool>>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for SensorScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorScheduler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            running: Arc::new(Mutex::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn add(&mut self, sensor: Box<dyn Sensor>, interval: Duration) {
        info!(
            "Registered sensor {} with poll interval {:?}",
            sensor.name(),
            interval
        );
        self.pending.push(Registration { sensor, interval });
    }

    pub fn sensor_count(&self) -> usize {
        self.pending.len() + self.handles.len()
    }

    /// Shared flag cleared by [`SensorScheduler::stop`] or a signal handler
    pub fn running_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        is_set(&self.running)
    }

    /// Number of sensor threads that have not exited yet
    pub fn active_sensors(&self) -> usize {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Poll every registered sensor exactly once, in registration order
    pub fn run_once(&mut self) -> Vec<(String, PollOutcome)> {
        self.pending
            .iter_mut()
            .map(|registration| {
                let outcome = registration.sensor.poll();
                (registration.sensor.name().to_string(), outcome)
            })
            .collect()
    }

    /// Spawn one thread per registered sensor
    pub fn start(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            *running = true;
        }

        for Registration { sensor, interval } in self.pending.drain(..) {
            let name = sensor.name().to_string();
            let running = Arc::clone(&self.running);
            debug!("Spawning thread for sensor {}", name);
            let handle = thread::spawn(move || sensor_thread(sensor, interval, running));
            self.handles.push((name, handle));
        }
        info!("Started {} sensor threads", self.handles.len());
    }

    /// Signal every sensor thread to stop and wait for them
    ///
    /// A cycle in progress runs to completion first.
    pub fn stop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            *running = false;
        }
        for (name, handle) in self.handles.drain(..) {
            debug!("Waiting for sensor {} to stop", name);
            if handle.join().is_err() {
                error!("Sensor thread {} panicked", name);
            }
        }
        info!("All sensors stopped");
    }
}

fn is_set(flag: &Arc<Mutex<bool>>) -> bool {
    flag.lock().map(|running| *running).unwrap_or(false)
}

fn sensor_thread(mut sensor: Box<dyn Sensor>, interval: Duration, running: Arc<Mutex<bool>>) {
    info!("Sensor {} started", sensor.name());

    while is_set(&running) {
        if sensor.poll() == PollOutcome::Shutdown {
            warn!(
                "Sensor {} lost a required dependency, shutting down",
                sensor.name()
            );
            return;
        }

        // Sleep in slices so a stop request is noticed promptly
        let mut remaining = interval;
        while remaining > Duration::ZERO && is_set(&running) {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    info!("Sensor {} stopped", sensor.name());
}
