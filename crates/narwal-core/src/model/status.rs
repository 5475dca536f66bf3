use std::sync::Arc;

use chrono::{DateTime, Utc};
use narwal_api::{DeviceInfo, FanSpeed, MopHumidity, StatusUpdate, WorkingState};
use serde::Serialize;
use strum::Display;

use crate::session::SessionState;

/// High-level activity derived from the raw working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Activity {
    #[default]
    Idle,
    Cleaning,
    Paused,
    Returning,
    Docked,
    Error,
}

/// A setting the device accepts but never reports back.
///
/// The value is whatever this client last sent, so it is marked as
/// unconfirmed rather than passed off as device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum LocalSetting<T> {
    Unknown,
    LocallySet { value: T, set_at: DateTime<Utc> },
}

impl<T> Default for LocalSetting<T> {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<T: Copy> LocalSetting<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Self::Unknown => None,
            Self::LocallySet { value, .. } => Some(*value),
        }
    }
}

/// Last known device status.
///
/// Mutated only by the session (on decoded broadcasts) and by the facade
/// for locally authoritative settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub battery_percent: u8,
    pub cleaning_area_m2: f64,
    pub cleaning_seconds: u64,
    pub firmware_version: String,
    pub firmware_target: Option<String>,
    pub docked: bool,
    pub charging: bool,
    pub charge_complete: bool,
    pub fan_speed: LocalSetting<FanSpeed>,
    pub mop_humidity: LocalSetting<MopHumidity>,
    pub activity: Activity,

    pub working_state: WorkingState,
    pub paused: bool,
    pub returning: bool,
    pub dock_sub_state: u32,
    pub upgrade_status: Option<u32>,
    pub download_status: Option<u32>,
    pub session_id: Option<String>,
    pub device_timestamp: Option<u64>,
    pub device_info: Option<DeviceInfo>,
    pub updated_at: Option<DateTime<Utc>>,
}

const DOCK_SUB_STATE_DOCKED: u32 = 1;
const DOCK_SUB_STATE_DOCKING: u32 = 2;

impl DeviceStatus {
    /// Merge a partial update; fields the update lacks keep their values.
    pub fn apply(&mut self, update: &StatusUpdate, at: DateTime<Utc>) {
        if let Some(state) = update.working_state {
            self.working_state = state;
        }
        if let Some(paused) = update.paused {
            self.paused = paused;
        }
        if let Some(returning) = update.returning {
            self.returning = returning;
        }
        if let Some(sub_state) = update.dock_sub_state {
            self.dock_sub_state = sub_state;
        }
        if let Some(battery) = update.battery_percent {
            self.battery_percent = battery.min(100);
        }
        if let Some(ref id) = update.session_id {
            self.session_id = Some(id.clone());
        }
        if let Some(ts) = update.device_timestamp {
            self.device_timestamp = Some(ts);
        }
        if let Some(secs) = update.cleaning_seconds {
            self.cleaning_seconds = secs;
        }
        if let Some(cm2) = update.cleaning_area_cm2 {
            self.cleaning_area_m2 = area_m2(cm2);
        }
        if let Some(ref version) = update.firmware_version {
            self.firmware_version.clone_from(version);
        }
        if let Some(ref target) = update.firmware_target {
            self.firmware_target = Some(target.clone());
        }
        if let Some(code) = update.upgrade_status {
            self.upgrade_status = Some(code);
        }
        if let Some(code) = update.download_status {
            self.download_status = Some(code);
        }

        self.derive_flags();
        self.updated_at = Some(at);
    }

    /// Record what `get_device_info` reported.
    pub fn set_device_info(&mut self, info: DeviceInfo, at: DateTime<Utc>) {
        if self.firmware_version.is_empty() {
            if let Some(ref version) = info.firmware_version {
                self.firmware_version.clone_from(version);
            }
        }
        self.device_info = Some(info);
        self.updated_at = Some(at);
    }

    pub fn set_fan_speed(&mut self, value: FanSpeed, at: DateTime<Utc>) {
        self.fan_speed = LocalSetting::LocallySet { value, set_at: at };
    }

    pub fn set_mop_humidity(&mut self, value: MopHumidity, at: DateTime<Utc>) {
        self.mop_humidity = LocalSetting::LocallySet { value, set_at: at };
    }

    fn derive_flags(&mut self) {
        let state = self.working_state;

        self.docked = state.is_on_dock()
            || (state == WorkingState::Standby && self.dock_sub_state == DOCK_SUB_STATE_DOCKED);
        self.charging = state == WorkingState::Docked;
        self.charge_complete = state == WorkingState::Charged;

        let cleaning = state.is_cleaning() && !self.paused;
        let returning = !cleaning
            && (self.returning || self.dock_sub_state == DOCK_SUB_STATE_DOCKING);

        self.activity = if self.paused {
            Activity::Paused
        } else if cleaning {
            Activity::Cleaning
        } else if returning {
            Activity::Returning
        } else if self.docked {
            Activity::Docked
        } else if state == WorkingState::Error {
            Activity::Error
        } else {
            Activity::Idle
        };
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn area_m2(cm2: u64) -> f64 {
    cm2 as f64 / 10_000.0
}

/// What `status()` hands out: the last known status plus availability.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: Arc<DeviceStatus>,
    /// `true` only while the session is `Awake`.
    pub available: bool,
    pub state: SessionState,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base(state: WorkingState, paused: bool, dock_sub_state: u32) -> StatusUpdate {
        StatusUpdate {
            working_state: Some(state),
            paused: Some(paused),
            returning: Some(false),
            dock_sub_state: Some(dock_sub_state),
            ..StatusUpdate::default()
        }
    }

    fn status_after(update: &StatusUpdate) -> DeviceStatus {
        let mut status = DeviceStatus::default();
        status.apply(update, Utc::now());
        status
    }

    #[test]
    fn charging_on_dock() {
        let status = status_after(&base(WorkingState::Docked, false, 1));
        assert!(status.docked);
        assert!(status.charging);
        assert!(!status.charge_complete);
        assert_eq!(status.activity, Activity::Docked);
    }

    #[test]
    fn charged_on_dock() {
        let status = status_after(&base(WorkingState::Charged, false, 0));
        assert!(status.docked);
        assert!(!status.charging);
        assert!(status.charge_complete);
    }

    #[test]
    fn standby_on_dock_counts_as_docked() {
        let status = status_after(&base(WorkingState::Standby, false, 1));
        assert!(status.docked);
        assert_eq!(status.activity, Activity::Docked);

        let status = status_after(&base(WorkingState::Standby, false, 0));
        assert!(!status.docked);
        assert_eq!(status.activity, Activity::Idle);
    }

    #[test]
    fn pause_overrides_cleaning() {
        let status = status_after(&base(WorkingState::Cleaning, true, 0));
        assert_eq!(status.activity, Activity::Paused);
        let status = status_after(&base(WorkingState::CleaningAlt, false, 0));
        assert_eq!(status.activity, Activity::Cleaning);
    }

    #[test]
    fn docking_sub_state_means_returning() {
        let status = status_after(&base(WorkingState::Standby, false, 2));
        assert_eq!(status.activity, Activity::Returning);
        assert!(!status.docked);
    }

    #[test]
    fn error_state() {
        let status = status_after(&base(WorkingState::Error, false, 0));
        assert_eq!(status.activity, Activity::Error);
    }

    #[test]
    fn partial_updates_keep_other_fields() {
        let mut status = DeviceStatus::default();
        status.apply(
            &StatusUpdate {
                battery_percent: Some(80),
                ..base(WorkingState::Cleaning, false, 0)
            },
            Utc::now(),
        );
        status.apply(
            &StatusUpdate {
                cleaning_seconds: Some(300),
                cleaning_area_cm2: Some(125_000),
                ..StatusUpdate::default()
            },
            Utc::now(),
        );

        assert_eq!(status.battery_percent, 80);
        assert_eq!(status.activity, Activity::Cleaning);
        assert_eq!(status.cleaning_seconds, 300);
        assert!((status.cleaning_area_m2 - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn local_settings_carry_provenance() {
        let mut status = DeviceStatus::default();
        assert_eq!(status.fan_speed, LocalSetting::Unknown);

        let at = Utc::now();
        status.set_fan_speed(FanSpeed::Strong, at);
        assert_eq!(status.fan_speed.value(), Some(FanSpeed::Strong));
        assert_eq!(
            status.fan_speed,
            LocalSetting::LocallySet {
                value: FanSpeed::Strong,
                set_at: at
            }
        );

        // A device broadcast never touches locally set values.
        status.apply(&base(WorkingState::Cleaning, false, 0), Utc::now());
        assert_eq!(status.fan_speed.value(), Some(FanSpeed::Strong));
    }

    #[test]
    fn device_info_fills_missing_firmware() {
        let mut status = DeviceStatus::default();
        status.set_device_info(
            DeviceInfo {
                product_key: "pk".into(),
                device_id: "dev".into(),
                firmware_version: Some("v1.0".into()),
            },
            Utc::now(),
        );
        assert_eq!(status.firmware_version, "v1.0");
    }
}
