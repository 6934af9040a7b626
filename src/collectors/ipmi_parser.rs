use crate::events::Attributes;
use std::collections::BTreeMap;

/// Sensor properties read from `sensor get` / `sdr get`
///
/// Identity and live readings get named fields; everything else the BMC
/// reports goes to `static_props`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorProps {
    pub sensor_id: Option<String>,
    pub entity_id: Option<String>,
    pub sensor_reading: Option<String>,
    pub states_asserted: Option<String>,
    pub static_props: Attributes,
}

impl SensorProps {
    pub const SENSOR_ID: &'static str = "Sensor ID";
    pub const ENTITY_ID: &'static str = "Entity ID";
    pub const SENSOR_READING: &'static str = "Sensor Reading";
    pub const STATES_ASSERTED: &'static str = "States Asserted";

    fn from_pairs(mut pairs: Attributes) -> Self {
        Self {
            sensor_id: pairs.remove(Self::SENSOR_ID),
            entity_id: pairs.remove(Self::ENTITY_ID),
            sensor_reading: pairs.remove(Self::SENSOR_READING),
            states_asserted: pairs.remove(Self::STATES_ASSERTED),
            static_props: pairs,
        }
    }

    /// Live readings, which go stale between the event and its processing
    pub fn dynamic(&self) -> Attributes {
        let mut dynamic = Attributes::new();
        if let Some(reading) = &self.sensor_reading {
            dynamic.insert(Self::SENSOR_READING.to_string(), reading.clone());
        }
        if let Some(states) = &self.states_asserted {
            dynamic.insert(Self::STATES_ASSERTED.to_string(), states.clone());
        }
        dynamic
    }

    pub fn is_empty(&self) -> bool {
        self.sensor_reading.is_none()
            && self.states_asserted.is_none()
            && self.static_props.is_empty()
    }
}

/// Parse `sensor get` output
///
/// The first line (`Locating sensor record...`) is skipped. A line with a
/// colon starts a new key; other lines continue the previous value.
pub fn parse_sensor_get(text: &str) -> SensorProps {
    let pairs = collect_pairs(text.lines().skip(1), |line| line.contains(':'));
    SensorProps::from_pairs(pairs)
}

/// Parse `sdr get` output
///
/// Bracketed lines such as `[Lower Non-critical going low ]` never start a
/// key even when they contain a colon.
pub fn parse_sdr_get(text: &str) -> SensorProps {
    let pairs = collect_pairs(text.lines(), |line| {
        line.contains(':') && !line.contains('[') && !line.contains(']')
    });
    SensorProps::from_pairs(pairs)
}

fn collect_pairs<'a>(
    lines: impl Iterator<Item = &'a str>,
    starts_key: impl Fn(&str) -> bool,
) -> Attributes {
    let mut pairs = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if starts_key(line) {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_string();
                pairs.insert(key.clone(), value.trim().to_string());
                current = Some(key);
                continue;
            }
        }
        if let Some(key) = &current {
            if let Some(value) = pairs.get_mut(key) {
                value.push('\n');
                value.push_str(line.trim());
            }
        }
    }
    pairs
}

/// Parse an `sdr type` listing into `(sensor_id, sensor_number)` pairs
///
/// Rows look like `Sys Fan 2B       | 33h | ok  | 29.4 | 5332 RPM`; the
/// sensor number is returned lowercase without the `h` suffix.
pub fn parse_sdr_listing(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('|').map(str::trim);
            let sensor_id = fields.next().filter(|s| !s.is_empty())?;
            let number = fields.next()?;
            let number = number.trim_end_matches(['h', 'H']).to_ascii_lowercase();
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            Some((sensor_id.to_string(), number))
        })
        .collect()
}

/// Parse `sel info` `Key : Value` lines
pub fn parse_sel_info(text: &str) -> Attributes {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
