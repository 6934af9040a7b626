use crate::alerts::{AlertDispatcher, AlertFactory};
use crate::collectors::IpmiSource;
use crate::config::SelConfig;
use crate::error::{CollectorError, SensorError};
use crate::scheduler::{PollOutcome, Sensor};
use crate::sel::handlers::{build_draft, DeviceType, SensorNumberMap};
use crate::sel::log_tailer::{self, TailPlan, UnseenEntry};
use crate::sel::usage::SelUsageMonitor;
use crate::state::SelStateStore;
use log::{debug, error, info, warn};
use std::path::Path;
use std::time::Instant;

/// Tails the BMC System Event Log and raises server FRU alerts
pub struct SelSensor {
    source: Box<dyn IpmiSource>,
    store: SelStateStore,
    /// Last processed index; authoritative even when the cursor file lags
    cursor: u64,
    /// Set when the last cursor write failed
    cursor_unsaved: bool,
    sensors: SensorNumberMap,
    usage: SelUsageMonitor,
    factory: AlertFactory,
    dispatcher: AlertDispatcher,
}

impl SelSensor {
    pub const NAME: &'static str = "sel";

    /// Open the state store under `cache_dir` and build the sensor number map
    ///
    /// Fails when the state directory is unusable or ipmitool is missing.
    pub fn new(
        source: Box<dyn IpmiSource>,
        cache_dir: &Path,
        config: &SelConfig,
        factory: AlertFactory,
        dispatcher: AlertDispatcher,
    ) -> Result<Self, SensorError> {
        let store = SelStateStore::open(cache_dir)?;
        let cursor = store.cursor().unwrap_or_else(|e| {
            warn!("{}: {}; replaying the whole SEL", Self::NAME, e);
            0
        });
        let sensors = SensorNumberMap::load(source.as_ref())?;
        Ok(Self {
            source,
            store,
            cursor,
            cursor_unsaved: false,
            sensors,
            usage: SelUsageMonitor::new(config),
            factory,
            dispatcher,
        })
    }

    /// Run one cycle as of `now`
    pub fn poll_at(&mut self, now: Instant) -> PollOutcome {
        let result = self
            .process_log()
            .and_then(|()| self.check_usage(now));
        match result {
            Ok(()) => PollOutcome::Continue,
            Err(e) if e.is_terminal() => {
                error!("{}: {}. Dependencies failed, shutting down sensor", Self::NAME, e);
                PollOutcome::Shutdown
            }
            Err(e) => {
                error!("{}: poll cycle aborted: {}", Self::NAME, e);
                PollOutcome::Continue
            }
        }
    }

    /// Fetch (or recover) the buffer, dispatch unseen entries, commit
    fn process_log(&mut self) -> Result<(), CollectorError> {
        if self.cursor_unsaved {
            self.save_cursor();
        }
        let Some(lines) = self.load_buffer()? else {
            return Ok(());
        };

        let plan = log_tailer::plan(log_tailer::parse_buffer(&lines), self.cursor);
        if !plan.cursor_found {
            debug!(
                "SEL cursor {:x} not in log, treating all {} entries as new",
                self.cursor,
                plan.unseen.len()
            );
        }

        self.dispatch(&plan)?;
        self.commit(&plan);
        Ok(())
    }

    /// Lines to process this cycle
    ///
    /// A non-empty pending buffer means the previous cycle never committed;
    /// it is reprocessed instead of fetching. `None` means nothing can be
    /// processed safely this cycle.
    fn load_buffer(&mut self) -> Result<Option<Vec<String>>, CollectorError> {
        match self.store.pending() {
            Ok(lines) if !lines.is_empty() => {
                info!(
                    "{}: resuming {} buffered SEL records from an incomplete cycle",
                    Self::NAME,
                    lines.len()
                );
                return Ok(Some(lines));
            }
            Ok(_) => {}
            Err(e) => {
                error!("{}: cannot read pending SEL buffer: {}", Self::NAME, e);
                return Ok(None);
            }
        }

        let content = self.source.sel_list()?;
        if let Err(e) = self.store.replace_pending(&content) {
            error!(
                "{}: failed to persist SEL buffer, continuing without crash recovery: {}",
                Self::NAME,
                e
            );
        }
        Ok(Some(
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    fn dispatch(&self, plan: &TailPlan) -> Result<(), CollectorError> {
        for unseen in &plan.unseen {
            self.dispatch_entry(unseen)?;
        }
        Ok(())
    }

    fn dispatch_entry(&self, unseen: &UnseenEntry) -> Result<(), CollectorError> {
        let entry = &unseen.entry;
        let Some(device) = DeviceType::parse(&entry.device_type) else {
            return Ok(());
        };
        debug!(
            "SEL entry {:x} ({}) terminal: {}",
            entry.index, entry.device_label, unseen.terminal
        );

        let Some(number) = entry.device_number.as_deref() else {
            warn!("{}: SEL entry {:?} has no sensor number", Self::NAME, entry.device_label);
            return Ok(());
        };
        let Some(sensor_id) = self.sensors.sensor_id(device, number) else {
            warn!(
                "{}: unknown {} sensor number 0x{}, skipping entry {:x}",
                Self::NAME,
                device.as_str(),
                number,
                entry.index
            );
            return Ok(());
        };

        let draft = build_draft(device, entry, sensor_id, unseen.terminal, self.source.as_ref())?;
        if let Some(draft) = draft {
            let alert = self.factory.assemble(draft);
            self.dispatcher.deliver(&alert);
        }
        Ok(())
    }

    /// Advance the cursor, then empty the buffer
    ///
    /// The in-memory cursor always advances. A failed cursor write is
    /// retried at the start of the next cycle; until then a restart may
    /// replay the records of this cycle.
    fn commit(&mut self, plan: &TailPlan) {
        if let Some(index) = plan.next_cursor() {
            self.cursor = index;
            self.save_cursor();
        }
        if let Err(e) = self.store.clear_pending() {
            error!("{}: failed to clear SEL buffer: {}", Self::NAME, e);
        }
    }

    fn save_cursor(&mut self) {
        match self.store.set_cursor(self.cursor) {
            Ok(()) => self.cursor_unsaved = false,
            Err(e) => {
                error!(
                    "{}: failed to persist SEL cursor {:x}: {}",
                    Self::NAME,
                    self.cursor,
                    e
                );
                self.cursor_unsaved = true;
            }
        }
    }

    fn check_usage(&mut self, now: Instant) -> Result<(), CollectorError> {
        match self.usage.check(self.source.as_ref(), now) {
            Ok(true) => {
                self.cursor = 0;
                self.save_cursor();
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                error!("{}: SEL usage check failed: {}", Self::NAME, e);
                Ok(())
            }
        }
    }
}

impl Sensor for SelSensor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn poll(&mut self) -> PollOutcome {
        self.poll_at(Instant::now())
    }
}
