use std::{cell::RefCell, collections::BTreeMap, net::SocketAddrV4, rc::Rc, time::Duration};

use esp32feed::*;
use tokio::sync::watch;

const ID1: &str = "0000000000000001";

type Log<T> = Rc<RefCell<Vec<T>>>;

struct FakeReader {
    readings: Vec<Measurement>,
    reads: usize,
    stop_after: Option<(usize, watch::Sender<bool>)>,
    fail: bool,
}

impl FakeReader {
    fn new(readings: &[(&str, f32)]) -> Self {
        Self {
            readings: readings.iter().map(|&(id, t)| Measurement::new(id, t)).collect(),
            reads: 0,
            stop_after: None,
            fail: false,
        }
    }
}

impl SensorReader for FakeReader {
    fn discover(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(self.readings.iter().map(|m| m.device_id.clone()).collect())
    }

    fn read_all(&mut self) -> anyhow::Result<Vec<Measurement>> {
        self.reads += 1;
        if let Some((n, tx)) = &self.stop_after {
            if self.reads >= *n {
                tx.send(true).ok();
            }
        }
        if self.fail {
            bail!("bus error");
        }
        Ok(self.readings.clone())
    }
}

#[derive(Default)]
struct FakeConnector {
    checks: Rc<RefCell<usize>>,
    down_for: usize,
}

impl Connector for FakeConnector {
    async fn ensure_connected(&mut self) -> anyhow::Result<()> {
        *self.checks.borrow_mut() += 1;
        if *self.checks.borrow() <= self.down_for {
            bail!("no association");
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeFeed {
    posts: Log<(String, String, String)>,
    fail: bool,
}

impl FeedTransport for FakeFeed {
    fn post(&mut self, url: &str, api_key: &str, body: &str) -> anyhow::Result<FeedResponse> {
        self.posts.borrow_mut().push((url.into(), api_key.into(), body.into()));
        if self.fail {
            bail!("connection refused");
        }
        Ok(FeedResponse {
            status: 200,
            body: "ok".into(),
        })
    }
}

#[derive(Clone, Default)]
struct FakeUdp {
    sent: Log<(SocketAddrV4, MulticastMessage)>,
    fail_for: Option<String>,
}

impl DatagramSender for FakeUdp {
    fn send(&mut self, dest: SocketAddrV4, payload: &[u8]) -> anyhow::Result<()> {
        let msg: MulticastMessage = serde_json::from_slice(payload)?;
        if self.fail_for.as_deref() == Some(msg.sensor.as_str()) {
            bail!("network unreachable");
        }
        self.sent.borrow_mut().push((dest, msg));
        Ok(())
    }
}

fn scenario_table() -> BTreeMap<String, SensorSettings> {
    BTreeMap::from([
        (
            "default".to_string(),
            SensorSettings {
                name: Some("Def".into()),
                offset: Some(1.0),
            },
        ),
        (
            ID1.to_string(),
            SensorSettings {
                name: Some("Kitchen".into()),
                offset: None,
            },
        ),
    ])
}

fn group() -> SocketAddrV4 {
    SocketAddrV4::new(net::Ipv4Addr::new(239, 1, 1, 1), 5007)
}

fn build(
    reader: FakeReader,
    connector: FakeConnector,
    feed: Option<FakeFeed>,
    udp: Option<FakeUdp>,
) -> ReportLoop<FakeReader, FakeConnector, FakeFeed, FakeUdp> {
    let mut reader = reader;
    let ids = reader.discover().unwrap();
    let registry = SensorRegistry::resolve(&ids, &scenario_table());
    ReportLoop::new(registry, reader, connector, Duration::ZERO)
        .with_feed(feed.map(|f| FeedChannel::new("http://example.com/feed/42", "key", f)))
        .with_multicast(udp.map(|u| MulticastChannel::new(group(), u)))
}

#[tokio::test]
async fn test_scenario_both_channels() {
    let feed = FakeFeed::default();
    let udp = FakeUdp::default();
    let mut rl = build(
        FakeReader::new(&[(ID1, 20.0), ("AAAA", 18.0)]),
        FakeConnector::default(),
        Some(feed.clone()),
        Some(udp.clone()),
    );

    let report = rl.run_once().await;
    assert!(report.connected);
    assert_eq!(report.readings, 2);
    assert_eq!(report.datagrams_sent, 2);
    assert_eq!(report.datagram_errors, 0);
    assert_eq!(
        report.feed,
        Some(FeedOutcome::Posted(FeedResponse {
            status: 200,
            body: "ok".into()
        }))
    );
    assert_eq!(rl.state(), LoopState::Running);

    let sent = udp.sent.borrow();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(dest, _)| *dest == group()));
    assert_eq!(
        sent[0].1,
        MulticastMessage {
            name: "Kitchen".into(),
            sensor: ID1.into(),
            temperature: 21.0,
            offset: 1.0
        }
    );
    assert_eq!(
        sent[1].1,
        MulticastMessage {
            name: "Def".into(),
            sensor: "AAAA".into(),
            temperature: 19.0,
            offset: 1.0
        }
    );

    // feed keeps the raw readings
    let posts = feed.posts.borrow();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "http://example.com/feed/42");
    assert_eq!(posts[0].1, "key");
    let body: serde_json::Value = serde_json::from_str(&posts[0].2).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"data": {"Kitchen": [{"value": 20.0}], "Def": [{"value": 18.0}]}})
    );
}

#[tokio::test]
async fn test_feed_disabled_multicast_only_three_iterations() {
    let (tx, rx) = watch::channel(false);
    let udp = FakeUdp::default();
    let checks = Rc::new(RefCell::new(0));

    let mut reader = FakeReader::new(&[(ID1, 20.0), ("AAAA", 18.0)]);
    reader.stop_after = Some((3, tx));
    let connector = FakeConnector {
        checks: checks.clone(),
        down_for: 0,
    };
    let mut rl = build(reader, connector, None, Some(udp.clone()));

    rl.run(rx).await.unwrap();

    assert_eq!(*checks.borrow(), 3);
    assert_eq!(udp.sent.borrow().len(), 6);
}

#[tokio::test]
async fn test_both_channels_disabled() {
    let mut rl = build(
        FakeReader::new(&[(ID1, 20.0)]),
        FakeConnector::default(),
        None,
        None,
    );
    let report = rl.run_once().await;
    assert_eq!(report.readings, 1);
    assert_eq!(report.datagrams_sent, 0);
    assert_eq!(report.feed, None);
}

#[tokio::test]
async fn test_failed_datagram_does_not_stop_others() {
    let feed = FakeFeed::default();
    let udp = FakeUdp {
        fail_for: Some(ID1.into()),
        ..Default::default()
    };
    let mut rl = build(
        FakeReader::new(&[(ID1, 20.0), ("AAAA", 18.0)]),
        FakeConnector::default(),
        Some(feed.clone()),
        Some(udp.clone()),
    );

    let report = rl.run_once().await;
    assert_eq!(report.datagram_errors, 1);
    assert_eq!(report.datagrams_sent, 1);
    assert_eq!(udp.sent.borrow()[0].1.sensor, "AAAA");
    assert_eq!(feed.posts.borrow().len(), 1);
}

#[tokio::test]
async fn test_failed_feed_is_reported() {
    let feed = FakeFeed {
        fail: true,
        ..Default::default()
    };
    let udp = FakeUdp::default();
    let mut rl = build(
        FakeReader::new(&[(ID1, 20.0)]),
        FakeConnector::default(),
        Some(feed),
        Some(udp.clone()),
    );

    let report = rl.run_once().await;
    assert!(matches!(report.feed, Some(FeedOutcome::Failed(_))));
    assert_eq!(udp.sent.borrow().len(), 1);

    // the next cycle runs normally
    let report = rl.run_once().await;
    assert_eq!(report.datagrams_sent, 1);
}

#[tokio::test]
async fn test_connectivity_failure_skips_iteration() {
    let udp = FakeUdp::default();
    let connector = FakeConnector {
        checks: Rc::new(RefCell::new(0)),
        down_for: 1,
    };
    let mut rl = build(FakeReader::new(&[(ID1, 20.0)]), connector, None, Some(udp.clone()));
    assert_eq!(rl.state(), LoopState::Connecting);

    let report = rl.run_once().await;
    assert!(!report.connected);
    assert_eq!(report.readings, 0);
    assert_eq!(rl.state(), LoopState::Connecting);
    assert!(udp.sent.borrow().is_empty());

    let report = rl.run_once().await;
    assert!(report.connected);
    assert_eq!(rl.state(), LoopState::Running);
    assert_eq!(udp.sent.borrow().len(), 1);
}

#[tokio::test]
async fn test_sensor_read_failure_sends_nothing() {
    let feed = FakeFeed::default();
    let mut reader = FakeReader::new(&[(ID1, 20.0)]);
    reader.fail = true;
    let mut rl = build(reader, FakeConnector::default(), Some(feed.clone()), None);

    let report = rl.run_once().await;
    assert!(report.connected);
    assert_eq!(report.feed, None);
    assert!(feed.posts.borrow().is_empty());
}

#[tokio::test]
async fn test_undiscovered_sensor_uses_default() {
    let udp = FakeUdp::default();
    let registry = SensorRegistry::resolve(&[ID1], &scenario_table());
    let mut rl: ReportLoop<_, _, FakeFeed, _> = ReportLoop::new(
        registry,
        FakeReader::new(&[(ID1, 20.0), ("BBBB", 10.0)]),
        FakeConnector::default(),
        Duration::ZERO,
    )
    .with_multicast(Some(MulticastChannel::new(group(), udp.clone())));

    rl.run_once().await;
    let sent = udp.sent.borrow();
    assert_eq!(sent[1].1.name, "Def");
    assert_eq!(sent[1].1.temperature, 11.0);
}

#[tokio::test]
async fn test_run_with_shutdown_already_set() {
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let checks = Rc::new(RefCell::new(0));
    let connector = FakeConnector {
        checks: checks.clone(),
        down_for: 0,
    };
    let mut rl = build(FakeReader::new(&[(ID1, 20.0)]), connector, None, None);

    rl.run(rx).await.unwrap();
    assert_eq!(*checks.borrow(), 0);
}
