//! JSON configuration.
//!
//! Loading order: built-in defaults, then `defaults.json`, then
//! `config.json`, then CLI `POINTER=VALUE` patches. File overlays merge
//! field by field; absent keys keep their current value.

use std::collections::BTreeMap;
use std::path::Path;

use gcode::Generator;
use motion::{Distance, LayoutKind, Limits, MotorLayout, AXES};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A configuration that cannot be used to drive the machine.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Which pulse-timer implementation paces the stepping engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    #[serde(rename = "low_timers_busy_wait")]
    BusyWait,
    #[serde(rename = "low_timers_wait_for")]
    WaitFor,
    #[serde(rename = "low_timers_fake")]
    Fake,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutName {
    #[serde(rename = "corexy")]
    CoreXy,
    #[serde(rename = "cartesian")]
    Cartesian,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorName {
    #[serde(rename = "segments")]
    Segments,
    #[serde(rename = "spline")]
    Spline,
    #[serde(rename = "polyline")]
    Polyline,
}

/// Pin assignment and gain of one stepper channel.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    pub step: i32,
    pub dir: i32,
    pub en: i32,
    pub steps_per_mm: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindleConfig {
    pub pin: i32,
    pub cycle_time_seconds: f64,
    pub duty_min: f64,
    pub duty_max: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub pin: i32,
    pub pullup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base pulse period in microseconds.
    pub tick_duration_us: i64,
    /// Run against in-memory drivers; no hardware required.
    pub simulate_execution: bool,
    /// Epsilon of the path simplifier, in millimeters.
    pub douglas_peucker_marigin: f64,
    pub lowleveltimer: TimerKind,
    pub motion_layout: LayoutName,
    pub step_generator: GeneratorName,
    /// Signed per-axis coordinate scale.
    pub scale: [f64; AXES],
    pub max_accelerations_mm_s2: [f64; AXES],
    pub max_velocity_mm_s: [f64; AXES],
    pub max_no_accel_velocity_mm_s: [f64; AXES],
    pub steppers: Vec<StepperConfig>,
    pub spindles: Vec<SpindleConfig>,
    pub buttons: Vec<ButtonConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tick_duration_us: 50,
            simulate_execution: false,
            douglas_peucker_marigin: 1.0 / 64.0,
            lowleveltimer: TimerKind::BusyWait,
            motion_layout: LayoutName::CoreXy,
            step_generator: GeneratorName::Segments,
            scale: [1.0, 1.0, 1.0, 1.0],
            max_accelerations_mm_s2: [200.0, 200.0, 200.0, 200.0],
            max_velocity_mm_s: [220.0, 220.0, 110.0, 110.0],
            max_no_accel_velocity_mm_s: [2.0, 2.0, 2.0, 2.0],
            steppers: vec![
                StepperConfig { step: 22, dir: 27, en: 10, steps_per_mm: 100.0 },
                StepperConfig { step: 17, dir: 4, en: 10, steps_per_mm: 100.0 },
                StepperConfig { step: 11, dir: 9, en: 10, steps_per_mm: 100.0 },
                StepperConfig { step: 5, dir: 0, en: 10, steps_per_mm: 100.0 },
            ],
            spindles: vec![SpindleConfig {
                pin: 18,
                cycle_time_seconds: 0.1,
                duty_min: 0.0,
                duty_max: 0.1,
            }],
            buttons: vec![
                ButtonConfig { pin: 21, pullup: true },
                ButtonConfig { pin: 20, pullup: true },
                ButtonConfig { pin: 16, pullup: true },
                ButtonConfig { pin: 12, pullup: true },
            ],
        }
    }
}

impl Config {
    /// Builds the effective configuration from defaults, overlay files and
    /// pointer overrides, then validates it.
    pub fn load_overlaid(files: &[&Path], overrides: &[String]) -> Result<Config, ConfigError> {
        let mut value = serde_json::to_value(Config::default())
            .map_err(|e| ConfigError(e.to_string()))?;
        for file in files {
            if !file.exists() {
                continue;
            }
            let text = std::fs::read_to_string(file)
                .map_err(|e| ConfigError(format!("cannot read {}: {}", file.display(), e)))?;
            let overlay: Value = serde_json::from_str(&text)
                .map_err(|e| ConfigError(format!("{} is not valid JSON: {}", file.display(), e)))?;
            merge_values(&mut value, &overlay);
        }
        for patch in overrides {
            apply_override(&mut value, patch)?;
        }
        let config: Config =
            serde_json::from_value(value).map_err(|e| ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration_us <= 0 {
            return Err(ConfigError("tick_duration_us must be positive".into()));
        }
        if self.steppers.is_empty() || self.steppers.len() > AXES {
            return Err(ConfigError(format!(
                "between 1 and {} steppers are supported, got {}",
                AXES,
                self.steppers.len()
            )));
        }
        for (i, stepper) in self.steppers.iter().enumerate() {
            if stepper.steps_per_mm == 0.0 {
                return Err(ConfigError(format!("stepper {} has steps_per_mm 0", i)));
            }
        }
        for (i, scale) in self.scale.iter().enumerate() {
            if *scale == 0.0 {
                return Err(ConfigError(format!("scale is 0 on axis {}", i)));
            }
        }
        for (i, spindle) in self.spindles.iter().enumerate() {
            if spindle.cycle_time_seconds <= 0.0 {
                return Err(ConfigError(format!("spindle {} has a zero cycle time", i)));
            }
            if spindle.duty_min < 0.0
                || spindle.duty_max < spindle.duty_min
                || spindle.duty_max > spindle.cycle_time_seconds
            {
                return Err(ConfigError(format!(
                    "spindle {} duty range [{}, {}] does not fit its {}s cycle",
                    i, spindle.duty_min, spindle.duty_max, spindle.cycle_time_seconds
                )));
            }
        }
        self.validate_pin_assignments()
    }

    /// Every pin serves exactly one purpose. The stepper enable line is the
    /// one exception: it may be a rail shared between steppers, but still
    /// must not collide with any other pin.
    fn validate_pin_assignments(&self) -> Result<(), ConfigError> {
        fn claim(
            taken: &mut BTreeMap<i32, String>,
            pin: i32,
            purpose: String,
        ) -> Result<(), ConfigError> {
            match taken.get(&pin) {
                Some(owner) => Err(ConfigError(format!(
                    "pin {} already taken by {}",
                    pin, owner
                ))),
                None => {
                    taken.insert(pin, purpose);
                    Ok(())
                }
            }
        }

        const ENABLE_RAIL: &str = "the stepper enable rail";
        let mut taken: BTreeMap<i32, String> = BTreeMap::new();
        for (i, stepper) in self.steppers.iter().enumerate() {
            claim(&mut taken, stepper.step, format!("stepper {} step", i))?;
            claim(&mut taken, stepper.dir, format!("stepper {} dir", i))?;
        }
        for stepper in &self.steppers {
            match taken.get(&stepper.en) {
                Some(owner) if owner != ENABLE_RAIL => {
                    return Err(ConfigError(format!(
                        "pin {} already taken by {}",
                        stepper.en, owner
                    )));
                }
                Some(_) => {}
                None => {
                    taken.insert(stepper.en, ENABLE_RAIL.to_string());
                }
            }
        }
        for (i, spindle) in self.spindles.iter().enumerate() {
            claim(&mut taken, spindle.pin, format!("spindle {} pwm", i))?;
        }
        for (i, button) in self.buttons.iter().enumerate() {
            claim(&mut taken, button.pin, format!("button {}", i))?;
        }
        Ok(())
    }

    /// Tick duration in seconds.
    pub fn dt(&self) -> f64 {
        self.tick_duration_us as f64 / 1_000_000.0
    }

    pub fn limits(&self) -> Limits {
        Limits::new(
            Distance(self.max_accelerations_mm_s2),
            Distance(self.max_velocity_mm_s),
            Distance(self.max_no_accel_velocity_mm_s),
        )
    }

    /// The kinematic map implied by the layout and stepper gains. Axes
    /// beyond the configured steppers get a neutral gain of 1.
    pub fn layout(&self) -> Result<MotorLayout, motion::Error> {
        let kind = match self.motion_layout {
            LayoutName::CoreXy => LayoutKind::CoreXY,
            LayoutName::Cartesian => LayoutKind::Cartesian,
        };
        let mut steps_per_mm = [1.0; AXES];
        for (i, stepper) in self.steppers.iter().take(AXES).enumerate() {
            steps_per_mm[i] = stepper.steps_per_mm;
        }
        MotorLayout::new(kind, steps_per_mm, self.scale)
    }

    pub fn generator(&self) -> Generator {
        match self.step_generator {
            GeneratorName::Segments => Generator::Segments,
            GeneratorName::Spline => Generator::Spline,
            GeneratorName::Polyline => Generator::Polyline,
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

/// Field-wise overlay: objects merge recursively, everything else is
/// replaced by the overlay value.
fn merge_values(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_value) in src_map {
                match dst_map.get_mut(key) {
                    Some(dst_value) => merge_values(dst_value, src_value),
                    None => {
                        dst_map.insert(key.clone(), src_value.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Applies one `JSON_POINTER=VALUE` patch. The value is taken as a number
/// when it parses as one, as a string otherwise.
pub fn apply_override(value: &mut Value, patch: &str) -> Result<(), ConfigError> {
    let (pointer, raw) = patch
        .split_once('=')
        .ok_or_else(|| ConfigError(format!("expected POINTER=VALUE, got '{}'", patch)))?;
    let target = value
        .pointer_mut(pointer)
        .ok_or_else(|| ConfigError(format!("unknown configuration path '{}'", pointer)))?;
    *target = match raw.parse::<f64>() {
        Ok(number) => serde_json::json!(number),
        Err(_) => Value::String(raw.to_string()),
    };
    Ok(())
}
