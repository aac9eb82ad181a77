// reporter.rs

use log::*;
use tokio::{
    sync::watch,
    time::{sleep, Duration},
};

use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Running,
}

/// Outcome of a single reporting cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationReport {
    pub connected: bool,
    pub readings: usize,
    pub datagrams_sent: usize,
    pub datagram_errors: usize,
    pub feed: Option<FeedOutcome>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeedOutcome {
    Posted(FeedResponse),
    Failed(String),
}

/// Reads every sensor once per `delay` and hands the readings to the
/// enabled channels. A failing channel is logged and skipped, it does
/// not stop the other channel or the remaining sensors.
pub struct ReportLoop<R, C, F, D> {
    registry: SensorRegistry,
    reader: R,
    connector: C,
    feed: Option<FeedChannel<F>>,
    multicast: Option<MulticastChannel<D>>,
    delay: Duration,
    state: LoopState,
}

impl<R, C, F, D> ReportLoop<R, C, F, D>
where
    R: SensorReader,
    C: Connector,
    F: FeedTransport,
    D: DatagramSender,
{
    pub fn new(registry: SensorRegistry, reader: R, connector: C, delay: Duration) -> Self {
        Self {
            registry,
            reader,
            connector,
            feed: None,
            multicast: None,
            delay,
            state: LoopState::Connecting,
        }
    }

    pub fn with_feed(mut self, feed: Option<FeedChannel<F>>) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_multicast(mut self, multicast: Option<MulticastChannel<D>>) -> Self {
        self.multicast = multicast;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Repeats [`Self::run_once`] until `shutdown` turns true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting main loop...");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.run_once().await;

            info!("Sleeping for {} seconds", self.delay.as_secs());
            tokio::select! {
                _ = sleep(self.delay) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        info!("Shutdown sender gone.");
                        break;
                    }
                }
            }
        }
        info!("Main loop stopped.");
        Ok(())
    }

    pub async fn run_once(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        if let Err(e) = self.connector.ensure_connected().await {
            error!("Network not available: {e:#}");
            self.state = LoopState::Connecting;
            return report;
        }
        if self.state == LoopState::Connecting {
            info!("Network up.");
            self.state = LoopState::Running;
        }
        report.connected = true;

        let readings = match self.reader.read_all() {
            Ok(r) => r,
            Err(e) => {
                error!("Sensor read failed: {e:#}");
                return report;
            }
        };
        report.readings = readings.len();

        let mut payload = FeedPayload::new();
        for m in &readings {
            let record = self.registry.record_for(&m.device_id);
            debug!(
                "Sensor: {id}; Name: {name}; Temp: {raw}; Adjusted: {adj}",
                id = m.device_id,
                name = record.name,
                raw = m.temperature,
                adj = record.adjust(m.temperature),
            );

            if let Some(mcast) = self.multicast.as_mut() {
                match mcast.send(&record, m.temperature) {
                    Ok(()) => report.datagrams_sent += 1,
                    Err(e) => {
                        error!("Multicast send for {} failed: {e:#}", record.name);
                        report.datagram_errors += 1;
                    }
                }
            }

            // the feed gets the unadjusted reading
            payload.insert(&record.name, m.temperature);
        }

        if let Some(feed) = self.feed.as_mut() {
            report.feed = Some(match feed.send(&payload) {
                Ok(resp) => FeedOutcome::Posted(resp),
                Err(e) => {
                    error!("Feed post failed: {e:#}");
                    FeedOutcome::Failed(format!("{e:#}"))
                }
            });
        }

        report
    }
}

// EOF
