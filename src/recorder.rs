//! Step-by-step history of selected results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::elements::DofCode;
use crate::error::{FemError, FemResult};
use crate::system::{ElementId, NodeId};

/// A quantity tracked by the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordKey {
    /// Load factor of the recorded step
    LoadFactor,
    /// Nodal displacement in the node frame
    Dof(NodeId, DofCode),
    /// Named element result, see `Element::value`
    Element(ElementId, String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::LoadFactor => f.write_str("lam"),
            RecordKey::Dof(node, code) => write!(f, "{}:{}", node, code),
            RecordKey::Element(element, name) => write!(f, "{}:{}", element, name),
        }
    }
}

/// Values of all tracked keys at one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub step: usize,
    pub load_factor: f64,
    /// Aligned with `Recorder::keys`; NaN where a value is unavailable
    pub values: Vec<f64>,
}

/// Collects one `Record` per converged step while active
///
/// The load factor is always tracked. Further keys are registered before the
/// first record is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recorder {
    active: bool,
    keys: Vec<RecordKey>,
    records: Vec<Record>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            active: false,
            keys: vec![RecordKey::LoadFactor],
            records: Vec::new(),
        }
    }

    /// Track a nodal displacement
    pub fn track_dof(mut self, node: NodeId, code: DofCode) -> Self {
        self.add_key(RecordKey::Dof(node, code));
        self
    }

    /// Track a named element value
    pub fn track_element(mut self, element: ElementId, name: &str) -> Self {
        self.add_key(RecordKey::Element(element, name.to_string()));
        self
    }

    fn add_key(&mut self, key: RecordKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn keys(&self) -> &[RecordKey] {
        &self.keys
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// True when every record holds one value per key
    pub fn is_consistent(&self) -> bool {
        self.records.iter().all(|r| r.values.len() == self.keys.len())
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn push(&mut self, record: Record) {
        if self.active {
            self.records.push(record);
        }
    }

    fn column(&self, key: &RecordKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// History of one key across all records
    pub fn fetch(&self, key: &RecordKey) -> FemResult<Vec<f64>> {
        let col = self
            .column(key)
            .ok_or_else(|| FemError::InvalidInput(format!("'{}' is not recorded", key)))?;
        Ok(self
            .records
            .iter()
            .map(|r| r.values.get(col).copied().unwrap_or(f64::NAN))
            .collect())
    }

    /// History of a key given by its label, e.g. `"lam"`, `"N2:uy"` or `"E0:axial"`
    pub fn fetch_by_label(&self, label: &str) -> FemResult<Vec<f64>> {
        let key = self
            .keys
            .iter()
            .find(|k| k.to_string() == label)
            .cloned()
            .ok_or_else(|| FemError::InvalidInput(format!("'{}' is not recorded", label)))?;
        self.fetch(&key)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}
