use rand::Rng;
use serde::Serialize;

/// Connection the watch reports in its `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    WiFi,
    Bluetooth,
}

impl Link {
    pub fn code(self) -> u8 {
        match self {
            Link::WiFi => 0,
            Link::Bluetooth => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Battery {
    pub level: f32,
    pub raw: u16,
    pub charging: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct System {
    pub ram_used: u32,
    pub ram_total: u32,
}

/// One reading, laid out the way the watch's data logger app posts it
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    #[serde(rename = "type")]
    pub link: u8,
    /// Milliseconds since the watch booted
    pub timestamp: u64,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub magnetometer_azimuth: i32,
    pub steps: u32,
    pub activity_mode: u8,
    pub acceleration: Vector3,
    pub battery: Battery,
    pub system: System,
}

/// Slowly drifting state of one simulated watch
#[derive(Debug, Clone)]
pub struct Watch {
    pub device_id: String,
    pub link: Link,
    uptime_ms: u64,
    steps: u32,
    battery_level: f32,
}

const RAM_TOTAL: u32 = 327_680;

impl Watch {
    pub fn new(device_id: String, link: Link) -> Self {
        Self {
            device_id,
            link,
            uptime_ms: 0,
            steps: 0,
            battery_level: 100.0,
        }
    }

    /// Advances the watch by `elapsed_ms` and returns a fresh reading.
    pub fn next_reading(&mut self, rng: &mut impl Rng, elapsed_ms: u64) -> SensorReading {
        self.uptime_ms += elapsed_ms;
        self.steps += rng.gen_range(0..12);
        self.battery_level = (self.battery_level - rng.gen_range(0.0..0.05)).max(0.0);

        let temperature = if rng.gen_bool(0.05) {
            rng.gen_range(-10.0..50.0) // 5% outliers
        } else {
            rng.gen_range(28.0..36.0) // Wrist range
        };

        SensorReading {
            link: self.link.code(),
            timestamp: self.uptime_ms,
            temperature,
            humidity: rng.gen_range(30.0..80.0),
            pressure: rng.gen_range(980.0..1040.0),
            magnetometer_azimuth: rng.gen_range(0..360),
            steps: self.steps,
            activity_mode: rng.gen_range(0..3),
            acceleration: Vector3 {
                x: rng.gen_range(-2.0..2.0),
                y: rng.gen_range(-2.0..2.0),
                z: rng.gen_range(-2.0..2.0),
            },
            battery: Battery {
                level: self.battery_level,
                raw: (self.battery_level * 40.95) as u16,
                charging: rng.gen_bool(0.02),
            },
            system: System {
                ram_used: rng.gen_range(80_000..200_000),
                ram_total: RAM_TOTAL,
            },
        }
    }
}
