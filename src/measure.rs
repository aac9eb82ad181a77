// measure.rs

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub device_id: String,
    pub temperature: f32,
}

impl Measurement {
    pub fn new(device_id: impl Into<String>, temperature: f32) -> Self {
        Self {
            device_id: device_id.into(),
            temperature,
        }
    }
}

/// Source of raw temperatures keyed by device id.
pub trait SensorReader {
    /// Ids of the devices present at startup, in bus order.
    fn discover(&mut self) -> anyhow::Result<Vec<String>>;

    /// One fresh raw reading per device, in bus order.
    fn read_all(&mut self) -> anyhow::Result<Vec<Measurement>>;
}

#[cfg(target_os = "espidf")]
pub use onewire::*;

#[cfg(target_os = "espidf")]
mod onewire {
    use std::fmt::Debug;

    use anyhow::anyhow;
    use embedded_hal::digital::{InputPin, OutputPin};
    use esp_idf_hal::delay::{Ets, FreeRtos};
    use log::*;
    use one_wire_bus::{Address, OneWire, OneWireError, SearchState};

    use super::{Measurement, SensorReader};

    /// Device ids are the 64-bit ROM code as 16 hex digits.
    pub fn device_id(address: &Address) -> String {
        format!("{:016X}", address.0)
    }

    pub fn scan_devices<P, E>(one_wire_bus: &mut OneWire<P>) -> Result<Vec<Address>, MeasurementError<E>>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
    {
        let mut found = Vec::new();
        let mut st: SearchState;
        let mut state = None;

        while let Some((device_address, s)) = one_wire_bus.device_search(state, false, &mut Ets)? {
            found.push(device_address);
            st = s;
            state = Some(&st);
        }

        if found.is_empty() {
            Err(MeasurementError::NoDeviceFound)
        } else {
            Ok(found)
        }
    }

    pub fn measure_temperature<P, E>(
        one_wire_bus: &mut OneWire<P>,
    ) -> Result<Vec<Measurement>, MeasurementError<E>>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
    {
        ds18b20::start_simultaneous_temp_measurement(one_wire_bus, &mut Ets)?;
        ds18b20::Resolution::Bits12.delay_for_measurement_time(&mut FreeRtos);

        let mut meas = Vec::new();
        for device_address in scan_devices(one_wire_bus)? {
            FreeRtos::delay_ms(100);

            let sensor = ds18b20::Ds18b20::new::<E>(device_address)?;
            let sensor_data = sensor.read_data(one_wire_bus, &mut Ets)?;
            meas.push(Measurement::new(device_id(&device_address), sensor_data.temperature));
        }
        Ok(meas)
    }

    // When performing a measurement it can happen that no device was found on the one-wire-bus
    // in addition to the bus errors. Therefore we extend the error cases for proper error handling.
    #[derive(Debug)]
    pub enum MeasurementError<E> {
        OneWireError(OneWireError<E>),
        NoDeviceFound,
    }

    impl<E> From<OneWireError<E>> for MeasurementError<E> {
        fn from(value: OneWireError<E>) -> Self {
            MeasurementError::OneWireError(value)
        }
    }

    /// DS18B20 sensors sharing one one-wire bus.
    pub struct OneWireReader<P> {
        bus: OneWire<P>,
    }

    impl<P, E> OneWireReader<P>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
        E: Debug,
    {
        pub fn new(pin: P) -> anyhow::Result<Self> {
            let bus = OneWire::new(pin).map_err(|e| anyhow!("One-wire bus init failed: {e:?}"))?;
            Ok(Self { bus })
        }
    }

    impl<P, E> SensorReader for OneWireReader<P>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
        E: Debug,
    {
        fn discover(&mut self) -> anyhow::Result<Vec<String>> {
            info!("Scanning 1-wire devices...");
            match scan_devices(&mut self.bus) {
                Ok(devs) => {
                    info!("Onewire response:\n{devs:#?}");
                    Ok(devs.iter().map(device_id).collect())
                }
                Err(MeasurementError::NoDeviceFound) => {
                    warn!("No 1-wire devices found");
                    Ok(Vec::new())
                }
                Err(e) => Err(anyhow!("One-wire scan failed: {e:?}")),
            }
        }

        fn read_all(&mut self) -> anyhow::Result<Vec<Measurement>> {
            match measure_temperature(&mut self.bus) {
                Ok(meas) => Ok(meas),
                Err(MeasurementError::NoDeviceFound) => Ok(Vec::new()),
                Err(e) => Err(anyhow!("Temperature measurement failed: {e:?}")),
            }
        }
    }
}

// EOF
