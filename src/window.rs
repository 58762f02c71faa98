//! Per-device sliding windows of recent power readings
//!
//! Each device owns a fixed-capacity ring buffer ordered by arrival (not by
//! timestamp value). The store hands out one lock per device so that
//! append-then-classify is a single atomic step for that device, while
//! different devices never contend beyond the brief map lookup.
//!
//! Memory is bounded two ways:
//! - at most `max_devices` windows; inserting past the cap evicts the
//!   least-recently-updated device
//! - an optional idle TTL; `evict_idle` drops devices that have not reported
//!   within it (the coordinator sweeps periodically)
//!
//! Eviction only unlinks a window from the map. A caller that already
//! holds the window's `Arc` finishes its append and classify on that
//! detached window; the device's next reading starts a fresh one.
//!
//! Window capacity is capped at `MAX_WINDOW_CAPACITY` readings.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MAX_WINDOW_CAPACITY: usize = 100;
pub const DEFAULT_WINDOW_CAPACITY: usize = MAX_WINDOW_CAPACITY;
pub const DEFAULT_MAX_DEVICES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub power_w: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded history for one device, oldest evicted first
#[derive(Debug, Clone)]
pub struct DeviceWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
}

impl DeviceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_WINDOW_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail, evicting the oldest entry when full
    pub fn push(&mut self, power_w: f64, timestamp: DateTime<Utc>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry { power_w, timestamp });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Power values in arrival order (most recent last)
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.power_w).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&WindowEntry> {
        self.entries.back()
    }
}

/// Bounds on how many device windows the store keeps alive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    pub max_devices: usize,
    /// `None` disables idle eviction
    pub idle_ttl: Option<Duration>,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            idle_ttl: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

struct DeviceSlot {
    window: Arc<Mutex<DeviceWindow>>,
    last_seen: Instant,
    last_touch: u64,
}

#[derive(Default)]
struct Devices {
    slots: HashMap<String, DeviceSlot>,
    /// Monotonic counter ordering updates for LRU eviction
    touches: u64,
}

/// Shared store of device windows
pub struct WindowStore {
    capacity: usize,
    policy: EvictionPolicy,
    devices: Mutex<Devices>,
}

impl WindowStore {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity: capacity.clamp(1, MAX_WINDOW_CAPACITY),
            policy: EvictionPolicy {
                max_devices: policy.max_devices.max(1),
                ..policy
            },
            devices: Mutex::new(Devices::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY, EvictionPolicy::default())
    }

    pub fn window_capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading and run `classify` on the updated window
    ///
    /// The device lock is held across both steps, so no other caller can
    /// mutate this device's window between the append and the read.
    pub fn observe<R>(
        &self,
        device_id: &str,
        power_w: f64,
        timestamp: DateTime<Utc>,
        classify: impl FnOnce(&DeviceWindow) -> R,
    ) -> R {
        let window = self.slot(device_id, Instant::now());
        let mut guard = window.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(power_w, timestamp);
        classify(&guard)
    }

    /// Append without classification
    pub fn append(&self, device_id: &str, power_w: f64, timestamp: DateTime<Utc>) {
        self.observe(device_id, power_w, timestamp, |_| ());
    }

    /// Copy of the device's current values, oldest first
    pub fn snapshot(&self, device_id: &str) -> Option<Vec<f64>> {
        let window = {
            let devices = self.lock_devices();
            devices.slots.get(device_id)?.window.clone()
        };
        let guard = window.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.values())
    }

    pub fn device_count(&self) -> usize {
        self.lock_devices().slots.len()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.lock_devices().slots.contains_key(device_id)
    }

    /// Drop windows idle longer than the policy TTL, returning how many were removed
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let Some(ttl) = self.policy.idle_ttl else {
            return 0;
        };

        let mut devices = self.lock_devices();
        let before = devices.slots.len();
        devices
            .slots
            .retain(|_, slot| now.saturating_duration_since(slot.last_seen) <= ttl);
        let evicted = before - devices.slots.len();

        if evicted > 0 {
            log::info!("🧹 Evicted {} idle device windows ({} remain)", evicted, devices.slots.len());
        }
        evicted
    }

    fn slot(&self, device_id: &str, now: Instant) -> Arc<Mutex<DeviceWindow>> {
        let mut devices = self.lock_devices();
        devices.touches += 1;
        let touch = devices.touches;

        if let Some(slot) = devices.slots.get_mut(device_id) {
            slot.last_seen = now;
            slot.last_touch = touch;
            return slot.window.clone();
        }

        if devices.slots.len() >= self.policy.max_devices {
            let oldest = devices
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_touch)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                devices.slots.remove(&oldest);
                log::debug!("Device cap {} reached, evicted window for {}", self.policy.max_devices, oldest);
            }
        }

        let window = Arc::new(Mutex::new(DeviceWindow::new(self.capacity)));
        devices.slots.insert(
            device_id.to_string(),
            DeviceSlot {
                window: window.clone(),
                last_seen: now,
                last_touch: touch,
            },
        );
        window
    }

    fn lock_devices(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
