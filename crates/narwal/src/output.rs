//! Output formatting: detail view, JSON, plain.
//!
//! The detail view is plain text with optional color; structured formats
//! go through serde so scripts see the same field names as the library.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;

use narwal_core::{Activity, LocalSetting, StatusSnapshot};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Wraps `owo-colors` so every call site can ignore `--color`.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            enabled: should_color(mode),
        }
    }

    pub fn good(self, text: &str) -> String {
        if self.enabled {
            text.green().to_string()
        } else {
            text.to_owned()
        }
    }

    pub fn warn(self, text: &str) -> String {
        if self.enabled {
            text.yellow().to_string()
        } else {
            text.to_owned()
        }
    }

    pub fn bad(self, text: &str) -> String {
        if self.enabled {
            text.red().to_string()
        } else {
            text.to_owned()
        }
    }

    pub fn dim(self, text: &str) -> String {
        if self.enabled {
            text.dimmed().to_string()
        } else {
            text.to_owned()
        }
    }

    pub fn label(self, text: &str) -> String {
        if self.enabled {
            text.bold().to_string()
        } else {
            text.to_owned()
        }
    }

    fn battery(self, percent: u8) -> String {
        let text = format!("{percent}%");
        match percent {
            0..=15 => self.bad(&text),
            16..=40 => self.warn(&text),
            _ => self.good(&text),
        }
    }

    fn activity(self, activity: Activity) -> String {
        let text = activity.to_string();
        match activity {
            Activity::Error => self.bad(&text),
            Activity::Cleaning | Activity::Returning => self.good(&text),
            Activity::Paused => self.warn(&text),
            Activity::Idle | Activity::Docked => text,
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => plain_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Status ───────────────────────────────────────────────────────────

fn setting<T: std::fmt::Display + Copy>(value: &LocalSetting<T>, painter: Painter) -> String {
    match value {
        LocalSetting::Unknown => painter.dim("unknown"),
        LocalSetting::LocallySet { value, .. } => {
            format!("{value} {}", painter.dim("(set by this client)"))
        }
    }
}

fn duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m {s:02}s")
    }
}

pub fn status_detail(snapshot: &StatusSnapshot, painter: Painter) -> String {
    let s = &snapshot.status;

    let availability = if snapshot.available {
        painter.good("available")
    } else {
        painter.warn("unavailable")
    };

    let mut power = painter.battery(s.battery_percent);
    if s.charge_complete {
        power.push_str(" (full)");
    } else if s.charging {
        power.push_str(" (charging)");
    }

    let mut lines = vec![
        format!("{}  {} ({availability})", painter.label("Session: "), snapshot.state),
        format!("{}  {}", painter.label("Activity:"), painter.activity(s.activity)),
        format!("{}  {power}", painter.label("Battery: ")),
        format!(
            "{}  {}",
            painter.label("Docked:  "),
            if s.docked { "yes" } else { "no" }
        ),
        format!("{}  {}", painter.label("Fan:     "), setting(&s.fan_speed, painter)),
        format!("{}  {}", painter.label("Mop:     "), setting(&s.mop_humidity, painter)),
        format!(
            "{}  {:.1} m² in {}",
            painter.label("Last job:"),
            s.cleaning_area_m2,
            duration(s.cleaning_seconds)
        ),
    ];

    if !s.firmware_version.is_empty() {
        let mut firmware = s.firmware_version.clone();
        if let Some(target) = s.firmware_target.as_deref().filter(|t| *t != s.firmware_version) {
            firmware = format!("{firmware} → {}", painter.warn(target));
        }
        lines.push(format!("{}  {firmware}", painter.label("Firmware:")));
    }
    if let Some(info) = &s.device_info {
        lines.push(format!("{}  {}", painter.label("Device:  "), info.device_id));
    }
    if let Some(at) = s.updated_at {
        lines.push(format!(
            "{}  {}",
            painter.label("Updated: "),
            painter.dim(&at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use narwal_core::{DeviceStatus, FanSpeed, SessionState};

    use super::*;

    fn plain() -> Painter {
        Painter::new(ColorMode::Never)
    }

    #[test]
    fn duration_formats() {
        assert_eq!(duration(65), "1m 05s");
        assert_eq!(duration(3725), "1h 02m");
    }

    #[test]
    fn status_detail_marks_local_settings() {
        let mut status = DeviceStatus {
            battery_percent: 80,
            docked: false,
            ..DeviceStatus::default()
        };
        status.set_fan_speed(FanSpeed::Strong, chrono::Utc::now());
        let snapshot = StatusSnapshot {
            status: Arc::new(status),
            available: true,
            state: SessionState::Awake,
        };

        let text = status_detail(&snapshot, plain());
        assert!(text.contains("awake (available)"), "{text}");
        assert!(text.contains("80%"), "{text}");
        assert!(text.contains("strong (set by this client)"), "{text}");
        let mop = text.lines().find(|l| l.starts_with("Mop:")).unwrap();
        assert!(mop.ends_with("unknown"), "{mop}");
    }

    #[test]
    fn json_output_uses_library_field_names() {
        let snapshot = StatusSnapshot {
            status: Arc::new(DeviceStatus::default()),
            available: false,
            state: SessionState::Reconnecting,
        };
        let text =
            render_single(OutputFormat::JsonCompact, &snapshot, |_| String::new(), |_| String::new())
                .unwrap();
        assert!(text.contains(r#""available":false"#), "{text}");
        assert!(text.contains(r#""state":"reconnecting""#), "{text}");
    }
}
