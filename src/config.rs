// config.rs

use std::{collections::BTreeMap, net};

use anyhow::{bail, Context};
use log::*;
use serde::{Deserialize, Serialize};

/// GPIOs the firmware can hand to the one-wire bus on this chip.
#[cfg(feature = "esp32s")]
pub const ONEWIRE_PINS: &[i32] = &[4, 15, 18, 19, 21, 22, 23, 25, 26, 27, 32, 33];
#[cfg(not(feature = "esp32s"))]
pub const ONEWIRE_PINS: &[i32] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 10];

#[cfg(feature = "esp32s")]
pub const DEFAULT_ONEWIRE_PIN: i32 = 15;
#[cfg(not(feature = "esp32s"))]
pub const DEFAULT_ONEWIRE_PIN: i32 = 4;
const DEFAULT_POLL_DELAY: u64 = 10;
const DEFAULT_FEED_BASE_URL: &str = "http://iotplotter.com/api/v2/feed/";
const DEFAULT_MCAST_GROUP: net::Ipv4Addr = net::Ipv4Addr::new(239, 1, 1, 1);
const DEFAULT_MCAST_PORT: u16 = 5007;

/// Key of the sensor table entry that applies to every discovered sensor.
pub const DEFAULT_SENSOR_KEY: &str = "default";

const REDACTED: &str = "<redacted>";

/// Name and calibration override for one sensor, or for all of them
/// when stored under [`DEFAULT_SENSOR_KEY`]. Either field may be left out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f32>,
}

impl SensorSettings {
    pub fn table_from_json(json: &str) -> anyhow::Result<BTreeMap<String, SensorSettings>> {
        serde_json::from_str(json).context("Cannot parse sensor table")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MyConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,

    pub onewire_pin: i32,
    pub delay: u64,

    pub feed_enable: bool,
    pub feed_base_url: String,
    pub feed_id: String,
    pub feed_api_key: String,

    pub mcast_enable: bool,
    pub mcast_group: net::Ipv4Addr,
    pub mcast_port: u16,

    pub sensors: BTreeMap<String, SensorSettings>,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: option_env!("WIFI_SSID").unwrap_or("internet").into(),
            wifi_pass: option_env!("WIFI_PASS").unwrap_or("password").into(),

            onewire_pin: DEFAULT_ONEWIRE_PIN,
            delay: DEFAULT_POLL_DELAY,

            feed_enable: false,
            feed_base_url: option_env!("FEED_BASE_URL")
                .unwrap_or(DEFAULT_FEED_BASE_URL)
                .into(),
            feed_id: option_env!("FEED_ID").unwrap_or("").into(),
            feed_api_key: option_env!("FEED_API_KEY").unwrap_or("").into(),

            mcast_enable: false,
            mcast_group: DEFAULT_MCAST_GROUP,
            mcast_port: DEFAULT_MCAST_PORT,

            sensors: BTreeMap::new(),
        }
    }
}

impl MyConfig {
    /// Config baked in at build time.
    ///
    /// `CONFIG_JSON` holds a whole config (missing fields take defaults).
    /// The single-setting variables propagated by `build.rs` are applied
    /// on top of it; empty ones are skipped.
    pub fn from_env() -> anyhow::Result<Self> {
        let base = option_env!("CONFIG_JSON").unwrap_or("");
        let vars = [
            ("ONEWIRE_PIN", option_env!("ONEWIRE_PIN")),
            ("DELAY", option_env!("DELAY")),
            ("FEED_ENABLE", option_env!("FEED_ENABLE")),
            ("MCAST_ENABLE", option_env!("MCAST_ENABLE")),
            ("MCAST_GROUP", option_env!("MCAST_GROUP")),
            ("MCAST_PORT", option_env!("MCAST_PORT")),
            ("SENSOR_CONFIG", option_env!("SENSOR_CONFIG")),
        ];
        Self::from_vars(base, vars.iter().filter_map(|&(k, v)| v.map(|v| (k, v))))
    }

    pub fn from_vars<'a>(
        base_json: &str,
        vars: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> anyhow::Result<Self> {
        let mut config = if base_json.trim().is_empty() {
            Self::default()
        } else {
            Self::from_json(base_json)?
        };
        for (key, value) in vars {
            config.set_var(key, value)?;
        }
        config.check_onewire_pin()?;
        Ok(config)
    }

    pub fn check_onewire_pin(&self) -> anyhow::Result<()> {
        if !ONEWIRE_PINS.contains(&self.onewire_pin) {
            bail!(
                "gpio{} cannot be used for the one-wire bus, pick one of {ONEWIRE_PINS:?}",
                self.onewire_pin
            );
        }
        Ok(())
    }

    fn set_var(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let bad = || format!("Bad value for {key}: {value:?}");
        match key {
            "ONEWIRE_PIN" => self.onewire_pin = value.parse().with_context(bad)?,
            "DELAY" => self.delay = value.parse().with_context(bad)?,
            "FEED_ENABLE" => self.feed_enable = parse_flag(value).with_context(bad)?,
            "MCAST_ENABLE" => self.mcast_enable = parse_flag(value).with_context(bad)?,
            "MCAST_GROUP" => self.mcast_group = value.parse().with_context(bad)?,
            "MCAST_PORT" => self.mcast_port = value.parse().with_context(bad)?,
            "SENSOR_CONFIG" => self.sensors = SensorSettings::table_from_json(value)?,
            _ => bail!("Unknown config variable {key}"),
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Cannot parse config")
    }

    /// `None` unless both the base URL and the feed id are set.
    pub fn feed_url(&self) -> Option<String> {
        if self.feed_base_url.is_empty() || self.feed_id.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.feed_base_url, self.feed_id))
    }

    /// Feed URL to post to, or `None` when the feed is off.
    /// A feed that is switched on without URL details is turned off here.
    pub fn active_feed_url(&self) -> Option<String> {
        if !self.feed_enable {
            info!("Feed is disabled.");
            return None;
        }
        match self.feed_url() {
            Some(url) => {
                info!("Feed URL: {url}");
                Some(url)
            }
            None => {
                warn!("No feed details, disabling feed");
                None
            }
        }
    }

    pub fn mcast_addr(&self) -> net::SocketAddrV4 {
        net::SocketAddrV4::new(self.mcast_group, self.mcast_port)
    }

    /// Copy that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        c.wifi_pass = REDACTED.into();
        if !c.feed_api_key.is_empty() {
            c.feed_api_key = REDACTED.into();
        }
        c
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("not a boolean"),
    }
}


// EOF
