//! SessionVars: state shared between the event loop and script workers.
//!
//! Three independently guarded stores:
//!
//! - a string → JSON value map scripts use to pass values between
//!   invocations (`setGlobal` / `getGlobal`);
//! - for each script-bound key, the touch ids its `holdpress` calls still
//!   hold down, so the release script can lift exactly those;
//! - the key currently owning the joystick coefficients, so two scripts do
//!   not fight over them.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use super::lock;

#[derive(Debug, Default)]
pub struct SessionVars {
    vars: Mutex<HashMap<String, Value>>,
    touch_seqs: Mutex<HashMap<i64, Vec<u32>>>,
    radial_owner: Mutex<String>,
}

impl SessionVars {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.vars).get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        lock(&self.vars).insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        lock(&self.vars).contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        lock(&self.vars).remove(key)
    }

    pub fn clear(&self) {
        lock(&self.vars).clear();
    }

    // ── Script touches ────────────────────────────────────────────────────────

    pub fn add_touch_seq(&self, key_id: i64, seq_id: u32) {
        lock(&self.touch_seqs).entry(key_id).or_default().push(seq_id);
    }

    /// Removes and returns every touch id held for `key_id`.
    pub fn take_touch_seqs(&self, key_id: i64) -> Vec<u32> {
        lock(&self.touch_seqs).remove(&key_id).unwrap_or_default()
    }

    pub fn touch_seq_count(&self, key_id: i64) -> usize {
        lock(&self.touch_seqs).get(&key_id).map_or(0, Vec::len)
    }

    pub fn has_touch_seqs(&self, key_id: i64) -> bool {
        self.touch_seq_count(key_id) > 0
    }

    /// Removes and returns every held touch id for every key.
    pub fn take_all_touch_seqs(&self) -> Vec<u32> {
        let mut seqs = lock(&self.touch_seqs);
        seqs.drain().flat_map(|(_, ids)| ids).collect()
    }

    pub fn clear_touch_seqs(&self) {
        lock(&self.touch_seqs).clear();
    }

    // ── Radial owner ──────────────────────────────────────────────────────────

    pub fn radial_owner(&self) -> String {
        lock(&self.radial_owner).clone()
    }

    pub fn set_radial_owner(&self, owner: impl Into<String>) {
        *lock(&self.radial_owner) = owner.into();
    }

    /// Clears the owner if it is `owner`; returns whether it was.
    pub fn release_radial_owner(&self, owner: &str) -> bool {
        let mut current = lock(&self.radial_owner);
        if !current.is_empty() && *current == owner {
            current.clear();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_vars_round_trip_json_values() {
        let vars = SessionVars::new();

        vars.set("count", json!(3));
        vars.set("name", json!("boost"));

        assert_eq!(vars.get("count"), Some(json!(3)));
        assert!(vars.has("name"));
        assert_eq!(vars.remove("name"), Some(json!("boost")));
        assert!(!vars.has("name"));
        vars.clear();
        assert_eq!(vars.get("count"), None);
    }

    #[test]
    fn test_touch_seqs_are_grouped_by_key() {
        // Arrange
        let vars = SessionVars::new();
        vars.add_touch_seq(7, 100);
        vars.add_touch_seq(7, 101);
        vars.add_touch_seq(8, 200);

        // Act
        let taken = vars.take_touch_seqs(7);

        // Assert
        assert_eq!(taken, vec![100, 101]);
        assert!(!vars.has_touch_seqs(7));
        assert_eq!(vars.touch_seq_count(8), 1);
    }

    #[test]
    fn test_take_all_empties_every_key() {
        let vars = SessionVars::new();
        vars.add_touch_seq(1, 10);
        vars.add_touch_seq(2, 20);

        let mut all = vars.take_all_touch_seqs();
        all.sort_unstable();

        assert_eq!(all, vec![10, 20]);
        assert!(vars.take_all_touch_seqs().is_empty());
    }

    #[test]
    fn test_radial_owner_release_only_by_owner() {
        let vars = SessionVars::new();
        vars.set_radial_owner("42");

        assert!(!vars.release_radial_owner("7"));
        assert!(vars.release_radial_owner("42"));
        assert_eq!(vars.radial_owner(), "");
        assert!(!vars.release_radial_owner(""));
    }

    #[test]
    fn test_concurrent_touch_registration() {
        // Arrange
        let vars = Arc::new(SessionVars::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let v = Arc::clone(&vars);
                thread::spawn(move || {
                    for i in 0..250 {
                        v.add_touch_seq(t, i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Assert
        assert_eq!(vars.take_all_touch_seqs().len(), 1000);
    }
}
