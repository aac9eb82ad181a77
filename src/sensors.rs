// sensors.rs

use std::collections::{BTreeMap, HashMap};

use log::*;

use crate::{SensorSettings, DEFAULT_SENSOR_KEY};

const FALLBACK_NAME_PREFIX: &str = "DefaultSensor";

/// Friendly name and calibration offset of one physical sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorRecord {
    pub id: String,
    pub name: String,
    pub offset: f32,
}

impl SensorRecord {
    pub fn adjust(&self, raw: f32) -> f32 {
        raw + self.offset
    }
}

/// Resolved sensor records, built once at startup and only read after that.
#[derive(Clone, Debug)]
pub struct SensorRegistry {
    records: Vec<SensorRecord>,
    index: HashMap<String, usize>,
    fallback_name: Option<String>,
    fallback_offset: f32,
}

impl SensorRegistry {
    /// Resolve a record for every discovered sensor id, in discovery order.
    ///
    /// Each record starts from the `default` table entry, or from a numbered
    /// `DefaultSensorN` name when the entry has no name. A table entry for
    /// the id itself then replaces the name and the offset independently.
    /// Table entries for ids that were never discovered are ignored.
    pub fn resolve<S: AsRef<str>>(ids: &[S], table: &BTreeMap<String, SensorSettings>) -> Self {
        let default = table.get(DEFAULT_SENSOR_KEY);
        let fallback_name = default.and_then(|d| d.name.clone());
        let fallback_offset = default.and_then(|d| d.offset).unwrap_or(0.0);

        let mut counter = 1;
        let mut records = Vec::with_capacity(ids.len());
        let mut index = HashMap::with_capacity(ids.len());

        for id in ids {
            let id: &str = id.as_ref();
            if index.contains_key(id) {
                warn!("Sensor {id} discovered twice, ignoring the repeat");
                continue;
            }
            info!("Initialising sensor {id} details...");

            let mut name = match &fallback_name {
                Some(n) => n.clone(),
                None => {
                    let n = format!("{FALLBACK_NAME_PREFIX}{counter}");
                    counter += 1;
                    n
                }
            };
            let mut offset = fallback_offset;

            if let Some(specific) = table.get(id) {
                if let Some(n) = &specific.name {
                    name.clone_from(n);
                }
                if let Some(o) = specific.offset {
                    offset = o;
                }
            }

            info!("Sensor {id}; Name: {name}; Offset: {offset}");
            index.insert(id.to_string(), records.len());
            records.push(SensorRecord {
                id: id.to_string(),
                name,
                offset,
            });
        }

        Self {
            records,
            index,
            fallback_name,
            fallback_offset,
        }
    }

    pub fn get(&self, id: &str) -> Option<&SensorRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Record for `id`, falling back to the `default` entry for sensors that
    /// were not present at startup. Without a default name the id is used.
    pub fn record_for(&self, id: &str) -> SensorRecord {
        match self.get(id) {
            Some(r) => r.clone(),
            None => SensorRecord {
                id: id.to_string(),
                name: self.fallback_name.clone().unwrap_or_else(|| id.to_string()),
                offset: self.fallback_offset,
            },
        }
    }

    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}


// EOF
