//! Command catalog: semantic intents mapped to wire-level command values.
//!
//! Each builder returns an immutable [`Command`] whose serde representation
//! is the exact JSON object a device expects, e.g. `{"power":true}`.
//! Range limits (brightness 10-100, brightness steps of at most 90) are
//! enforced here, so anything downstream can send a `Command` untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Lowest settable brightness percentage.
pub const MIN_BRIGHTNESS: i32 = 10;

/// Highest settable brightness percentage.
pub const MAX_BRIGHTNESS: i32 = 100;

/// Largest brightness change a single step command may request.
pub const MAX_BRIGHTNESS_STEP: i32 = 90;

/// Step used by `brightness_up()` / `brightness_down()`.
pub const DEFAULT_BRIGHTNESS_STEP: i32 = 10;

/// Fan speed range accepted by `Command::speed`.
pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 6;

// ============================================================================
// Command
// ============================================================================

/// A single one-shot device instruction.
///
/// Serialized externally tagged, which yields one top-level key per command:
///
/// ```
/// use fanlink_core::Command;
///
/// let json = serde_json::to_string(&Command::power_on()).unwrap();
/// assert_eq!(json, r#"{"power":true}"#);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "power")]
    Power(bool),

    #[serde(rename = "speed")]
    Speed(FanSpeed),

    #[serde(rename = "speedDelta")]
    SpeedDelta(i8),

    #[serde(rename = "sleep")]
    Sleep(bool),

    #[serde(rename = "timer")]
    Timer(TimerSetting),

    #[serde(rename = "led")]
    Light(bool),

    #[serde(rename = "brightness")]
    Brightness(Brightness),

    #[serde(rename = "brightnessDelta")]
    BrightnessDelta(BrightnessStep),

    #[serde(rename = "light_mode")]
    LightMode(LightMode),
}

impl Command {
    pub fn power_on() -> Self {
        Self::Power(true)
    }

    pub fn power_off() -> Self {
        Self::Power(false)
    }

    /// Sets an absolute fan speed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidFieldValue` for levels outside 1-6.
    pub fn speed(level: u8) -> DomainResult<Self> {
        FanSpeed::try_from(level).map(Self::Speed)
    }

    pub fn speed_up() -> Self {
        Self::SpeedDelta(1)
    }

    pub fn speed_down() -> Self {
        Self::SpeedDelta(-1)
    }

    pub fn sleep_on() -> Self {
        Self::Sleep(true)
    }

    pub fn sleep_off() -> Self {
        Self::Sleep(false)
    }

    pub fn timer(setting: TimerSetting) -> Self {
        Self::Timer(setting)
    }

    pub fn light_on() -> Self {
        Self::Light(true)
    }

    pub fn light_off() -> Self {
        Self::Light(false)
    }

    /// Sets brightness, clamped to 10-100.
    pub fn brightness(value: i32) -> Self {
        Self::Brightness(Brightness::new(value))
    }

    /// Raises brightness by the default step of 10.
    pub fn brightness_up() -> Self {
        Self::brightness_up_by(DEFAULT_BRIGHTNESS_STEP)
    }

    /// Raises brightness by `delta`; the emitted step is clamped to ±90.
    pub fn brightness_up_by(delta: i32) -> Self {
        Self::BrightnessDelta(BrightnessStep::new(delta))
    }

    /// Lowers brightness by the default step of 10.
    pub fn brightness_down() -> Self {
        Self::brightness_down_by(DEFAULT_BRIGHTNESS_STEP)
    }

    /// Lowers brightness by `delta`; the emitted step is clamped to ±90.
    pub fn brightness_down_by(delta: i32) -> Self {
        Self::BrightnessDelta(BrightnessStep::new(delta.saturating_neg()))
    }

    pub fn color(mode: LightMode) -> Self {
        Self::LightMode(mode)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn on_off(on: bool) -> &'static str {
            if on {
                "on"
            } else {
                "off"
            }
        }

        match self {
            Self::Power(on) => write!(f, "power {}", on_off(*on)),
            Self::Speed(level) => write!(f, "speed {}", level.get()),
            Self::SpeedDelta(delta) => write!(f, "speed {delta:+}"),
            Self::Sleep(on) => write!(f, "sleep {}", on_off(*on)),
            Self::Timer(setting) => write!(f, "timer {setting}"),
            Self::Light(on) => write!(f, "light {}", on_off(*on)),
            Self::Brightness(level) => write!(f, "brightness {}%", level.get()),
            Self::BrightnessDelta(step) => write!(f, "brightness {:+}", step.get()),
            Self::LightMode(mode) => write!(f, "color {mode}"),
        }
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Fan speed level, 1-6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FanSpeed(u8);

impl FanSpeed {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for FanSpeed {
    type Error = DomainError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if (MIN_SPEED..=MAX_SPEED).contains(&level) {
            Ok(Self(level))
        } else {
            Err(DomainError::invalid_field("speed", level, "1-6"))
        }
    }
}

impl From<FanSpeed> for u8 {
    fn from(speed: FanSpeed) -> Self {
        speed.0
    }
}

/// Absolute brightness percentage, always within 10-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "u8")]
pub struct Brightness(u8);

impl Brightness {
    pub fn new(value: i32) -> Self {
        // Clamped range fits in u8.
        Self(value.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<i32> for Brightness {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Brightness> for u8 {
    fn from(level: Brightness) -> Self {
        level.0
    }
}

/// Relative brightness change, always within ±90.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i8")]
pub struct BrightnessStep(i8);

impl BrightnessStep {
    pub fn new(delta: i32) -> Self {
        Self(delta.clamp(-MAX_BRIGHTNESS_STEP, MAX_BRIGHTNESS_STEP) as i8)
    }

    pub fn get(self) -> i8 {
        self.0
    }
}

impl From<i32> for BrightnessStep {
    fn from(delta: i32) -> Self {
        Self::new(delta)
    }
}

impl From<BrightnessStep> for i8 {
    fn from(step: BrightnessStep) -> Self {
        step.0
    }
}

/// Auto-off timer setting.
///
/// The wire encoding is vendor defined: `SixHours` is sent as `4`, not `6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TimerSetting {
    Off,
    OneHour,
    TwoHours,
    ThreeHours,
    SixHours,
}

impl TimerSetting {
    /// Returns the value sent on the wire.
    pub fn wire_value(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::OneHour => 1,
            Self::TwoHours => 2,
            Self::ThreeHours => 3,
            Self::SixHours => 4,
        }
    }

    /// Returns the timer duration in hours (0 when off).
    pub fn hours(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::OneHour => 1,
            Self::TwoHours => 2,
            Self::ThreeHours => 3,
            Self::SixHours => 6,
        }
    }
}

impl TryFrom<u8> for TimerSetting {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::OneHour),
            2 => Ok(Self::TwoHours),
            3 => Ok(Self::ThreeHours),
            4 => Ok(Self::SixHours),
            other => Err(DomainError::invalid_field("timer", other, "0-4")),
        }
    }
}

impl From<TimerSetting> for u8 {
    fn from(setting: TimerSetting) -> Self {
        setting.wire_value()
    }
}

impl fmt::Display for TimerSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            other => write!(f, "{}h", other.hours()),
        }
    }
}

/// Light color temperature preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    Warm,
    Cool,
    Daylight,
}

impl LightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Cool => "cool",
            Self::Daylight => "daylight",
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
