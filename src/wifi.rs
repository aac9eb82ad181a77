// wifi.rs

/// Keeps the network link up for the reporting loop.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Returns once the link is up, reconnecting first if it was lost.
    async fn ensure_connected(&mut self) -> anyhow::Result<()>;
}

#[cfg(target_os = "espidf")]
pub use esp::*;

#[cfg(target_os = "espidf")]
mod esp {
    use anyhow::Context;
    use embedded_svc::wifi::{ClientConfiguration, Configuration};
    use esp_idf_svc::{
        eventloop::{EspEventLoop, System},
        timer::{EspTimerService, Task},
        wifi::{AsyncWifi, EspWifi, WifiDriver},
    };
    use log::*;

    use super::Connector;
    use crate::MyConfig;

    pub struct WifiConnector<'a> {
        wifi: AsyncWifi<EspWifi<'a>>,
    }

    impl<'a> WifiConnector<'a> {
        pub fn new(
            wifidriver: WifiDriver<'a>,
            sysloop: EspEventLoop<System>,
            timer: EspTimerService<Task>,
        ) -> anyhow::Result<Self> {
            info!("Initializing Wi-Fi...");
            let espwifi = EspWifi::wrap(wifidriver)?;
            let wifi = AsyncWifi::wrap(espwifi, sysloop, timer)?;
            Ok(Self { wifi })
        }

        pub async fn configure(&mut self, config: &MyConfig) -> anyhow::Result<()> {
            info!("WiFi setting credentials...");
            let ssid = config
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("WiFi SSID too long"))?;
            let password = config
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("WiFi password too long"))?;
            self.wifi
                .set_configuration(&Configuration::Client(ClientConfiguration {
                    ssid,
                    password,
                    ..Default::default()
                }))?;

            info!("WiFi driver starting...");
            Box::pin(self.wifi.start()).await?;
            Ok(())
        }

        async fn connect(&mut self) -> anyhow::Result<()> {
            info!("WiFi connecting...");
            Box::pin(self.wifi.connect()).await.context("WiFi connect failed")?;

            info!("WiFi waiting for association...");
            Box::pin(self.wifi.wait_netif_up())
                .await
                .context("WiFi netif did not come up")?;

            let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
            info!("WiFi connected, IP {}", ip_info.ip);
            Ok(())
        }
    }

    impl Connector for WifiConnector<'_> {
        async fn ensure_connected(&mut self) -> anyhow::Result<()> {
            if self.wifi.is_connected()? {
                return Ok(());
            }
            warn!("WiFi link lost, reconnecting...");
            self.connect().await
        }
    }
}

// EOF
