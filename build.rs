// build.rs

use std::env;

fn main() -> anyhow::Result<()> {
    // Necessary because of this issue: https://github.com/rust-lang/cargo/issues/9641
    // see also https://github.com/rust-lang/cargo/issues/9554
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }

    // empty values leave the config default in place
    for (var, default) in [
        ("WIFI_SSID", "internet"),
        ("WIFI_PASS", "password"),
        ("FEED_BASE_URL", "http://iotplotter.com/api/v2/feed/"),
        ("FEED_ID", ""),
        ("FEED_API_KEY", ""),
        ("FEED_ENABLE", ""),
        ("MCAST_ENABLE", ""),
        ("MCAST_GROUP", ""),
        ("MCAST_PORT", ""),
        ("DELAY", ""),
        ("ONEWIRE_PIN", ""),
        ("SENSOR_CONFIG", ""),
        ("CONFIG_JSON", ""),
    ] {
        let value = env::var(var).unwrap_or_else(|_| default.into());
        println!("cargo:rustc-env={var}={value}");
        println!("cargo:rerun-if-env-changed={var}");
    }

    Ok(())
}

// EOF
