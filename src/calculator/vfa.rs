use serde::Serialize;

use crate::registry::formulas::vfa_range;
use crate::session::FieldValues;

/// Speeds at which vertical fine artifacts were observed, kept ascending.
///
/// Duplicates are allowed. Every mutation rewrites the avoidance range into
/// the result mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactSpeeds {
    speeds: Vec<u32>,
}

impl ArtifactSpeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speeds(&self) -> &[u32] {
        &self.speeds
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }

    pub fn add(&mut self, speed: u32, result: &mut FieldValues) {
        self.speeds.push(speed);
        self.speeds.sort_unstable();
        self.write_range(result);
    }

    /// Remove the speed at `index` of the sorted list.
    pub fn remove(&mut self, index: usize, result: &mut FieldValues) -> Option<u32> {
        if index >= self.speeds.len() {
            return None;
        }
        let removed = self.speeds.remove(index);
        self.write_range(result);
        Some(removed)
    }

    fn write_range(&self, result: &mut FieldValues) {
        for (key, value) in vfa_range(&self.speeds) {
            result.insert(key, value);
        }
    }
}
