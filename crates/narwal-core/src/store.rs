// ── Device state cache ──
//
// Readers take whole `Arc` snapshots without locking. Status writes are
// read-copy-update, so two writers racing on the same snapshot both land
// and a reader never observes a half-applied update. A map is stored with
// its model and image together.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use narwal_api::{DeviceIdentity, DeviceInfo, StatusUpdate};

use crate::map::RasterImage;
use crate::model::{DeviceStatus, MapModel};

/// A decoded map together with its rendering.
#[derive(Debug)]
pub struct MapSnapshot {
    pub model: Arc<MapModel>,
    pub image: Arc<RasterImage>,
    /// Increments with every accepted map, starting at 1.
    pub generation: u64,
    pub received_at: DateTime<Utc>,
}

/// Last known device state.
pub struct DeviceStore {
    status: ArcSwap<DeviceStatus>,
    map: ArcSwapOption<MapSnapshot>,
    identity: ArcSwap<DeviceIdentity>,
    map_generation: AtomicU64,
}

impl DeviceStore {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            status: ArcSwap::from_pointee(DeviceStatus::default()),
            map: ArcSwapOption::empty(),
            identity: ArcSwap::from_pointee(identity),
            map_generation: AtomicU64::new(0),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn status(&self) -> Arc<DeviceStatus> {
        self.status.load_full()
    }

    pub fn map(&self) -> Option<Arc<MapSnapshot>> {
        self.map.load_full()
    }

    pub fn identity(&self) -> Arc<DeviceIdentity> {
        self.identity.load_full()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Merge a partial update. Returns the new snapshot, or `None` when
    /// nothing changed.
    pub(crate) fn apply_status(&self, update: &StatusUpdate) -> Option<Arc<DeviceStatus>> {
        self.modify_status(|status, now| status.apply(update, now))
    }

    pub(crate) fn apply_device_info(&self, info: &DeviceInfo) -> Option<Arc<DeviceStatus>> {
        self.modify_status(|status, now| status.set_device_info(info.clone(), now))
    }

    /// Run `f` on a copy of the current status and swap it in if it
    /// differs. `f` runs again on the fresh status if another writer got
    /// there first.
    pub(crate) fn modify_status<F>(&self, f: F) -> Option<Arc<DeviceStatus>>
    where
        F: Fn(&mut DeviceStatus, DateTime<Utc>),
    {
        let now = Utc::now();
        let mut changed = None;
        self.status.rcu(|current| {
            let mut next = DeviceStatus::clone(current);
            f(&mut next, now);

            // `updated_at` always moves, so compare without it.
            let mut unstamped = next.clone();
            unstamped.updated_at = current.updated_at;
            if unstamped == **current {
                changed = None;
                return Arc::clone(current);
            }

            let next = Arc::new(next);
            changed = Some(Arc::clone(&next));
            next
        });
        changed
    }

    pub(crate) fn store_map(&self, model: MapModel, image: RasterImage) -> Arc<MapSnapshot> {
        let generation = self.map_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(MapSnapshot {
            model: Arc::new(model),
            image: Arc::new(image),
            generation,
            received_at: Utc::now(),
        });
        self.map.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// Replace the topic identity. Returns `true` if it changed.
    pub(crate) fn set_identity(&self, identity: DeviceIdentity) -> bool {
        if **self.identity.load() == identity {
            return false;
        }
        self.identity.store(Arc::new(identity));
        true
    }
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore")
            .field("identity", &self.identity.load_full())
            .field("has_map", &self.map.load().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use narwal_api::{FanSpeed, WorkingState};

    use super::*;
    use crate::model::Activity;

    #[test]
    fn partial_update_keeps_other_fields() {
        let store = DeviceStore::new(DeviceIdentity::for_device("robot-1"));
        store
            .apply_status(&StatusUpdate {
                battery_percent: Some(80),
                ..StatusUpdate::default()
            })
            .unwrap();
        store
            .apply_status(&StatusUpdate {
                working_state: Some(WorkingState::Cleaning),
                ..StatusUpdate::default()
            })
            .unwrap();

        let status = store.status();
        assert_eq!(status.battery_percent, 80);
        assert_eq!(status.activity, Activity::Cleaning);
    }

    #[test]
    fn identical_update_is_not_republished() {
        let store = DeviceStore::new(DeviceIdentity::default());
        let update = StatusUpdate {
            battery_percent: Some(55),
            ..StatusUpdate::default()
        };
        assert!(store.apply_status(&update).is_some());
        assert!(store.apply_status(&update).is_none());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = DeviceStore::new(DeviceIdentity::default());
        let before = store.status();
        store.apply_status(&StatusUpdate {
            battery_percent: Some(10),
            ..StatusUpdate::default()
        });
        assert_eq!(before.battery_percent, 0);
        assert_eq!(store.status().battery_percent, 10);
    }

    #[test]
    fn concurrent_writers_keep_both_changes() {
        let store = Arc::new(DeviceStore::new(DeviceIdentity::default()));
        let battery = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500_u32 {
                    store.apply_status(&StatusUpdate {
                        battery_percent: Some(u8::try_from(i % 100 + 1).unwrap()),
                        ..StatusUpdate::default()
                    });
                }
            })
        };
        let fan = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let speed = if i % 2 == 0 { FanSpeed::Quiet } else { FanSpeed::Max };
                    store.modify_status(|s, at| s.set_fan_speed(speed, at));
                }
            })
        };
        battery.join().unwrap();
        fan.join().unwrap();

        let status = store.status();
        assert_eq!(status.battery_percent, 100);
        assert_eq!(status.fan_speed.value(), Some(FanSpeed::Max));
    }

    #[test]
    fn map_generation_increments() {
        let store = DeviceStore::new(DeviceIdentity::default());
        assert!(store.map().is_none());
        let image = crate::map::render(&MapModel::default(), &crate::map::Theme::default());
        let first = store.store_map(MapModel::default(), image.clone());
        let second = store.store_map(MapModel::default(), image);
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(store.map().unwrap().generation, 2);
    }

    #[test]
    fn identity_change_is_reported_once() {
        let store = DeviceStore::new(DeviceIdentity::default());
        let seen = DeviceIdentity::new("QoEsI5qYXO", "robot-9");
        assert!(store.set_identity(seen.clone()));
        assert!(!store.set_identity(seen));
        assert_eq!(store.identity().device_id, "robot-9");
    }
}
