use tagtree_core::ScanUnit;

/// Pending scan units. Units are taken most-recent-first.
#[derive(Debug, Clone, Default)]
pub struct ScanQueue {
    units: Vec<ScanUnit>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit. An identical pending unit is dropped so each unit runs once.
    pub fn push(&mut self, unit: ScanUnit) {
        self.units.retain(|pending| *pending != unit);
        self.units.push(unit);
    }

    /// Take the most recently pushed unit.
    pub fn pop(&mut self) -> Option<ScanUnit> {
        self.units.pop()
    }

    /// Discard pending work and queue `units` in order.
    pub fn replace(&mut self, units: Vec<ScanUnit>) {
        self.units.clear();
        for unit in units {
            self.push(unit);
        }
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, unit: &ScanUnit) -> bool {
        self.units.contains(unit)
    }
}
