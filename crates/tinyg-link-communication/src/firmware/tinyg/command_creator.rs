//! TinyG Command Creator
//!
//! Builds the JSON-wrapped payloads the link sends. Motion and machine
//! commands travel as `{"gc":"<gcode>"}`; settings as `{"<key>":<value>}`.
//! Nothing here touches the link.

use serde_json::{json, Map, Number, Value};

/// Real-time commands understood outside the G-code stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealTimeCommand {
    /// Feed hold followed by queue flush; cancels a jog in progress
    CancelJog,
}

impl RealTimeCommand {
    /// Wire form of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelJog => "!%",
        }
    }
}

/// Saved machine positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedPosition {
    /// G28.1 / G28
    First,
    /// G30.1 / G30
    Second,
}

impl SavedPosition {
    fn save_code(&self) -> &'static str {
        match self {
            Self::First => "G28.1",
            Self::Second => "G30.1",
        }
    }

    fn return_code(&self) -> &'static str {
        match self {
            Self::First => "G28",
            Self::Second => "G30",
        }
    }
}

/// Target coordinates; absent axes are left out of the command
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Axes {
    /// X coordinate
    pub x: Option<f64>,
    /// Y coordinate
    pub y: Option<f64>,
    /// Z coordinate
    pub z: Option<f64>,
    /// A (rotary) coordinate
    pub a: Option<f64>,
}

impl Axes {
    /// No axes
    pub fn new() -> Self {
        Self::default()
    }

    /// Set X
    pub fn x(mut self, value: f64) -> Self {
        self.x = Some(value);
        self
    }

    /// Set Y
    pub fn y(mut self, value: f64) -> Self {
        self.y = Some(value);
        self
    }

    /// Set Z
    pub fn z(mut self, value: f64) -> Self {
        self.z = Some(value);
        self
    }

    /// Set A
    pub fn a(mut self, value: f64) -> Self {
        self.a = Some(value);
        self
    }

    /// Check if no axis is set
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none() && self.a.is_none()
    }

    fn words(&self) -> Vec<String> {
        [("X", self.x), ("Y", self.y), ("Z", self.z), ("A", self.a)]
            .into_iter()
            .filter_map(|(axis, value)| value.map(|v| format!("{}{:?}", axis, v)))
            .collect()
    }
}

/// Which axes a homing cycle covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HomeAxes {
    /// Home X
    pub x: bool,
    /// Home Y
    pub y: bool,
    /// Home Z
    pub z: bool,
    /// Home A
    pub a: bool,
}

impl HomeAxes {
    /// Home X only
    pub const X: Self = Self { x: true, y: false, z: false, a: false };
    /// Home Y only
    pub const Y: Self = Self { x: false, y: true, z: false, a: false };
    /// Home Z only
    pub const Z: Self = Self { x: false, y: false, z: true, a: false };
    /// Home A only
    pub const A: Self = Self { x: false, y: false, z: false, a: true };
}

/// Travel limits used to clamp rapid moves
///
/// Each linear axis is clamped to `[0, max]`; A only has a floor of zero.
/// A negative max wins over the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineLimits {
    /// X travel
    pub x_max: f64,
    /// Y travel
    pub y_max: f64,
    /// Z travel
    pub z_max: f64,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            x_max: 17.9,
            y_max: 11.8,
            z_max: 6.0,
        }
    }
}

impl MachineLimits {
    /// Clamp every present axis into the machine envelope
    pub fn clamp(&self, axes: Axes) -> Axes {
        Axes {
            x: axes.x.map(|v| v.max(0.0).min(self.x_max)),
            y: axes.y.map(|v| v.max(0.0).min(self.y_max)),
            z: axes.z.map(|v| v.max(0.0).min(self.z_max)),
            a: axes.a.map(|v| v.max(0.0)),
        }
    }
}

/// `{"<key>":<value>}`, with whole numbers written without a fraction
pub(crate) fn setting_line(key: &str, value: f64) -> String {
    let number = if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    };
    let mut body = Map::new();
    body.insert(key.to_string(), number);
    Value::Object(body).to_string()
}

/// `{"<key>":n}`; the bare `n` asks the controller for the current value
pub(crate) fn query_line(key: &str) -> String {
    format!("{{{}:n}}", Value::from(key))
}

/// TinyG command creator
#[derive(Debug, Clone, Default)]
pub struct CommandCreator {
    limits: MachineLimits,
}

impl CommandCreator {
    /// Create a command creator with the default machine limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a command creator clamping rapids to `limits`
    pub fn with_limits(limits: MachineLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to rapid moves
    pub fn limits(&self) -> MachineLimits {
        self.limits
    }

    /// Wrap a G-code line
    pub fn gcode(&self, code: &str) -> String {
        json!({ "gc": code }).to_string()
    }

    /// Home the selected axes (G28.2); `None` if no axis is selected
    pub fn home_axes(&self, axes: HomeAxes) -> Option<String> {
        let words: Vec<&str> = [("X0", axes.x), ("Y0", axes.y), ("Z0", axes.z), ("A0", axes.a)]
            .into_iter()
            .filter_map(|(word, selected)| selected.then_some(word))
            .collect();
        if words.is_empty() {
            return None;
        }
        Some(self.gcode(&format!("G28.2 {}", words.join(" "))))
    }

    /// The machine homing sequence: Z first to clear the work, then X, then Y
    pub fn home_sequence(&self) -> Vec<String> {
        [HomeAxes::Z, HomeAxes::X, HomeAxes::Y]
            .into_iter()
            .filter_map(|axes| self.home_axes(axes))
            .collect()
    }

    /// Declare the current position (G28.3), for axes that cannot be homed
    pub fn set_position(&self, axes: Axes) -> Option<String> {
        self.axis_command("G28.3", axes)
    }

    /// Record the current machine position
    pub fn save_position(&self, slot: SavedPosition) -> String {
        self.gcode(slot.save_code())
    }

    /// Return to a recorded machine position
    pub fn go_to_saved_position(&self, slot: SavedPosition) -> String {
        self.gcode(slot.return_code())
    }

    /// Jog at `feed_rate`
    ///
    /// X and Y move together when both are given; otherwise only the first
    /// present axis of X, Y, Z, A is used.
    pub fn jog(&self, feed_rate: f64, axes: Axes) -> Option<String> {
        let target = match axes {
            Axes {
                x: Some(x),
                y: Some(y),
                ..
            } => Axes::new().x(x).y(y),
            Axes { x: Some(x), .. } => Axes::new().x(x),
            Axes { y: Some(y), .. } => Axes::new().y(y),
            Axes { z: Some(z), .. } => Axes::new().z(z),
            Axes { a: Some(a), .. } => Axes::new().a(a),
            _ => return None,
        };
        self.feed_command(feed_rate, target)
    }

    /// Cancel a jog in progress
    pub fn cancel_jog(&self) -> String {
        RealTimeCommand::CancelJog.as_str().to_string()
    }

    /// Linear feed move (G1) to every present axis
    pub fn move_linear(&self, feed_rate: f64, axes: Axes) -> Option<String> {
        self.feed_command(feed_rate, axes)
    }

    /// Rapid move (G0), clamped to the machine limits
    pub fn move_rapid(&self, axes: Axes) -> Option<String> {
        self.axis_command("G0", self.limits.clamp(axes))
    }

    /// Spindle on, clockwise (M03)
    pub fn spindle_on(&self) -> String {
        self.gcode("M03")
    }

    /// Spindle off (M05)
    pub fn spindle_off(&self) -> String {
        self.gcode("M05")
    }

    /// Ask for the current position (M114)
    pub fn position_report(&self) -> String {
        self.gcode("M114")
    }

    /// Set a controller setting
    pub fn set_setting(&self, key: &str, value: f64) -> String {
        setting_line(&key.to_ascii_lowercase(), value)
    }

    /// Ask the controller to report a setting
    pub fn query_setting(&self, key: &str) -> String {
        query_line(&key.to_ascii_lowercase())
    }

    /// Enable (2) or disable (0) RTS/CTS flow control on the controller
    pub fn flow_control(&self, hardware: bool) -> String {
        json!({ "ex": if hardware { 2 } else { 0 } }).to_string()
    }

    /// Set the automatic status report mode (0 disables reports)
    pub fn status_reports(&self, mode: u8) -> String {
        json!({ "sr": mode }).to_string()
    }

    fn feed_command(&self, feed_rate: f64, axes: Axes) -> Option<String> {
        self.axis_command(&format!("G1 F{}", feed_rate), axes)
    }

    fn axis_command(&self, code: &str, axes: Axes) -> Option<String> {
        if axes.is_empty() {
            return None;
        }
        let mut words = vec![code.to_string()];
        words.extend(axes.words());
        Some(self.gcode(&words.join(" ")))
    }
}
