// bin/esp32feed.rs

#![warn(clippy::large_futures)]

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("esp32feed is firmware, build it for an espidf target")
}

#[cfg(target_os = "espidf")]
esp_idf_sys::esp_app_desc!();

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp32feed::*;
    use esp_idf_hal::{
        delay::FreeRtos,
        gpio::{PinDriver, Pull},
        prelude::Peripherals,
    };
    use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, timer::EspTaskTimerService, wifi::WifiDriver};
    use log::*;
    use tokio::sync::watch;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Hello.");
    info!("Starting up esp32feed {FW_VERSION}");

    let config = MyConfig::from_env()?;
    info!("My config:\n{:#?}", config.redacted());

    let sysloop = EspSystemEventLoop::take()?;
    let timer = EspTaskTimerService::new()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let onewire_pin = take_onewire_pin(peripherals.pins, config.onewire_pin)?;
    info!("One-wire bus on gpio{}", config.onewire_pin);
    let mut pin_drv = PinDriver::input_output_od(onewire_pin)?;
    pin_drv.set_pull(Pull::Up)?;
    let mut reader = OneWireReader::new(pin_drv)?;

    let ids = reader.discover()?;
    info!("Found {} sensors", ids.len());
    let registry = SensorRegistry::resolve(&ids, &config.sensors);

    let wifidriver = WifiDriver::new(peripherals.modem, sysloop.clone(), Some(nvs_default_partition))?;

    let feed = config
        .active_feed_url()
        .map(|url| FeedChannel::new(url, config.feed_api_key.clone(), EspHttpFeed));
    let multicast = if config.mcast_enable {
        Some(MulticastChannel::new(config.mcast_addr(), UdpMulticast))
    } else {
        info!("Multicast is disabled.");
        None
    };

    // never sent to, the loop runs until reset
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let res = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async move {
            let mut wifi = WifiConnector::new(wifidriver, sysloop, timer)?;
            Box::pin(wifi.configure(&config)).await?;

            let mut report_loop = ReportLoop::new(
                registry,
                reader,
                wifi,
                Duration::from_secs(config.delay),
            )
            .with_feed(feed)
            .with_multicast(multicast);

            Box::pin(report_loop.run(shutdown_rx)).await
        }));

    if let Err(e) = res {
        error!("Main loop failed: {e:#}");
    }

    // not actually returning from main() but we reboot instead
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

#[cfg(target_os = "espidf")]
fn take_onewire_pin(pins: esp_idf_hal::gpio::Pins, wanted: i32) -> anyhow::Result<esp_idf_hal::gpio::AnyIOPin> {
    use esp_idf_hal::gpio::IOPin;

    #[cfg(feature = "esp32c3")]
    let onew_pins = [
        (pins.gpio0.downgrade(), 0),
        (pins.gpio1.downgrade(), 1),
        (pins.gpio2.downgrade(), 2),
        (pins.gpio3.downgrade(), 3),
        (pins.gpio4.downgrade(), 4),
        (pins.gpio5.downgrade(), 5),
        (pins.gpio6.downgrade(), 6),
        (pins.gpio7.downgrade(), 7),
        (pins.gpio8.downgrade(), 8),
        (pins.gpio10.downgrade(), 10),
    ];

    #[cfg(feature = "esp32s")]
    let onew_pins = [
        (pins.gpio4.downgrade(), 4),
        (pins.gpio15.downgrade(), 15),
        (pins.gpio18.downgrade(), 18),
        (pins.gpio19.downgrade(), 19),
        (pins.gpio21.downgrade(), 21),
        (pins.gpio22.downgrade(), 22),
        (pins.gpio23.downgrade(), 23),
        (pins.gpio25.downgrade(), 25),
        (pins.gpio26.downgrade(), 26),
        (pins.gpio27.downgrade(), 27),
        (pins.gpio32.downgrade(), 32),
        (pins.gpio33.downgrade(), 33),
    ];

    let Some((pin, _)) = onew_pins.into_iter().find(|(_, n)| *n == wanted) else {
        esp32feed::bail!("gpio{wanted} cannot be used for the one-wire bus");
    };
    Ok(pin)
}

// EOF
