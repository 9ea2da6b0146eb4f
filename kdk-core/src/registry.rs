//! Parameter registry
//!
//! The controller exposes a table of parameters discovered at bring-up.
//! Membership and sizes are fixed once declared; values are filled in by
//! read responses and state-change notifications.
//!
//! Inbound and outbound paths treat bad entries differently:
//! - [`ParameterRegistry::apply_block`] skips only the offending entry of a
//!   value block from the controller.
//! - [`ParameterRegistry::apply_batch`] validates a whole outgoing batch
//!   first and rejects it entirely on any bad entry.

use core::fmt;

use heapless::{FnvIndexMap, Vec};
use kdk_protocol::{params, ParameterBlock, TableEntry, MAX_PAYLOAD_SIZE};

/// Maximum number of parameters the registry can hold (power of two)
pub const MAX_PARAMETERS: usize = 64;

/// Maximum size of a single parameter value
///
/// The largest value a one-entry read response can carry: the payload
/// minus status, table ID, count and the entry's ID and length.
pub const MAX_PARAMETER_SIZE: usize = MAX_PAYLOAD_SIZE - params::BLOCK_OFFSET - 1 - 3;

/// Maximum number of updates in one batch
pub const MAX_BATCH_UPDATES: usize = 16;

/// Metadata tag of parameters read during bring-up
pub const METADATA_INIT_READABLE: u8 = 0x40;

/// Parameter value storage
pub type Value = Vec<u8, MAX_PARAMETER_SIZE>;

/// A batch of parameter updates
pub type UpdateBatch = Vec<ParameterUpdate, MAX_BATCH_UPDATES>;

/// Registry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// No parameter with this ID was declared
    UnknownParameter(u16),
    /// Value length differs from the declared size
    SizeMismatch { id: u16, expected: u8, actual: usize },
    /// Registry capacity exhausted
    RegistryFull,
    /// Declared size exceeds value storage
    ParameterTooLarge { id: u16, size: usize },
    /// Too many updates in one batch
    BatchTooLarge,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownParameter(id) => write!(f, "unknown parameter {:04X}", id),
            RegistryError::SizeMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "parameter {:04X} size mismatch: got={}, exp={}",
                id, actual, expected
            ),
            RegistryError::RegistryFull => write!(f, "parameter registry full"),
            RegistryError::ParameterTooLarge { id, size } => {
                write!(f, "parameter {:04X} too large ({} bytes)", id, size)
            }
            RegistryError::BatchTooLarge => write!(f, "too many updates in batch"),
        }
    }
}

/// A declared device parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub id: u16,
    /// Opaque device-defined tag
    pub metadata: u8,
    /// Declared value size in bytes
    pub size: u8,
    data: Value,
    valued: bool,
}

impl Parameter {
    fn new(entry: TableEntry) -> Result<Self, RegistryError> {
        let mut data = Value::new();
        data.resize(entry.size as usize, 0)
            .map_err(|_| RegistryError::ParameterTooLarge {
                id: entry.id,
                size: entry.size as usize,
            })?;

        Ok(Self {
            id: entry.id,
            metadata: entry.metadata,
            size: entry.size,
            data,
            valued: false,
        })
    }

    /// Current value, empty until the controller has reported one
    pub fn value(&self) -> &[u8] {
        if self.valued {
            &self.data
        } else {
            &[]
        }
    }

    /// Check whether a value has been received
    pub fn has_value(&self) -> bool {
        self.valued
    }

    fn store(&mut self, data: &[u8]) {
        // Callers check the size first
        self.data.copy_from_slice(data);
        self.valued = true;
    }
}

/// A requested parameter change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterUpdate {
    pub id: u16,
    pub data: Value,
}

impl ParameterUpdate {
    /// Create an update from raw bytes
    pub fn new(id: u16, data: &[u8]) -> Result<Self, RegistryError> {
        let data = Value::from_slice(data).map_err(|_| RegistryError::ParameterTooLarge {
            id,
            size: data.len(),
        })?;
        Ok(Self { id, data })
    }

    /// Create a single-byte update
    pub fn byte(id: u16, value: u8) -> Self {
        let mut data = Value::new();
        // One byte always fits
        let _ = data.push(value);
        Self { id, data }
    }
}

/// Outcome of applying an inbound value block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockSummary {
    /// Entries written to the registry
    pub applied: u8,
    /// Entries skipped (unknown ID, size mismatch)
    pub skipped: u8,
    /// The block ended before its declared count
    pub truncated: bool,
}

/// Table of device parameters keyed by ID
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    params: FnvIndexMap<u16, Parameter, MAX_PARAMETERS>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every parameter
    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Number of declared parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Declare a parameter, sized but without a value
    ///
    /// Re-declaring an ID replaces the previous entry.
    pub fn declare(&mut self, entry: TableEntry) -> Result<(), RegistryError> {
        let param = Parameter::new(entry)?;
        self.params
            .insert(entry.id, param)
            .map_err(|_| RegistryError::RegistryFull)?;
        Ok(())
    }

    /// Look up a declared parameter
    pub fn parameter(&self, id: u16) -> Option<&Parameter> {
        self.params.get(&id)
    }

    /// Iterate over declared parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    /// Current value of a parameter
    ///
    /// Unknown or not yet reported parameters yield an empty slice.
    pub fn get(&self, id: u16) -> &[u8] {
        match self.params.get(&id) {
            Some(param) => param.value(),
            None => {
                warn!("PARAM> unknown parameter {:04X}", id);
                &[]
            }
        }
    }

    /// IDs of parameters tagged readable at bring-up
    pub fn init_readable_ids(&self) -> Vec<u16, MAX_PARAMETERS> {
        self.params
            .values()
            .filter(|p| p.metadata == METADATA_INIT_READABLE)
            .map(|p| p.id)
            .collect()
    }

    /// Apply an inbound value block
    ///
    /// Unknown IDs and size mismatches skip just that entry.
    pub fn apply_block(&mut self, block: ParameterBlock<'_>) -> BlockSummary {
        let mut summary = BlockSummary::default();

        for entry in block {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => {
                    warn!("PARAM> value block truncated");
                    summary.truncated = true;
                    break;
                }
            };

            let Some(param) = self.params.get_mut(&entry.id) else {
                warn!("PARAM> unknown parameter {:04X}", entry.id);
                summary.skipped += 1;
                continue;
            };

            if param.size as usize != entry.data.len() {
                warn!(
                    "PARAM> parameter {:04X} size mismatch: got={}, exp={}",
                    entry.id,
                    entry.data.len(),
                    param.size
                );
                summary.skipped += 1;
                continue;
            }

            param.store(entry.data);
            summary.applied += 1;
            trace!("PARAM> GET ID={:04X}, SIZE={}", entry.id, param.size);
        }

        summary
    }

    /// Validate and coalesce an outgoing batch without storing it
    ///
    /// Every update must name a declared parameter with a value of exactly
    /// the declared size; otherwise the first failure is returned. Updates
    /// to the same ID coalesce, last one wins. The result is sorted by ID.
    pub fn prepare_batch(&self, updates: &[ParameterUpdate]) -> Result<UpdateBatch, RegistryError> {
        for update in updates {
            let param = self
                .params
                .get(&update.id)
                .ok_or(RegistryError::UnknownParameter(update.id))?;
            if param.size as usize != update.data.len() {
                return Err(RegistryError::SizeMismatch {
                    id: update.id,
                    expected: param.size,
                    actual: update.data.len(),
                });
            }
        }

        let mut batch = UpdateBatch::new();
        for update in updates {
            match batch.iter_mut().find(|u| u.id == update.id) {
                Some(existing) => existing.data = update.data.clone(),
                None => batch
                    .push(update.clone())
                    .map_err(|_| RegistryError::BatchTooLarge)?,
            }
        }
        batch.sort_unstable_by_key(|u| u.id);
        Ok(batch)
    }

    /// Store the values of a batch returned by [`Self::prepare_batch`]
    pub fn commit_batch(&mut self, batch: &[ParameterUpdate]) {
        for update in batch {
            if let Some(param) = self.params.get_mut(&update.id) {
                param.store(&update.data);
                debug!("PARAM> SET ID={:04X}, SIZE={}", update.id, param.size);
            }
        }
    }

    /// Validate, coalesce and store an outgoing batch
    ///
    /// Nothing is written unless every update is valid.
    pub fn apply_batch(&mut self, updates: &[ParameterUpdate]) -> Result<UpdateBatch, RegistryError> {
        let batch = self.prepare_batch(updates)?;
        self.commit_batch(&batch);
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u16, metadata: u8, size: u8) -> TableEntry {
        TableEntry { id, metadata, size }
    }

    fn registry() -> ParameterRegistry {
        let mut reg = ParameterRegistry::new();
        reg.declare(entry(0x8000, 0xE2, 1)).unwrap();
        reg.declare(entry(0xF000, 0xE2, 1)).unwrap();
        reg.declare(entry(0x8200, 0x40, 4)).unwrap();
        reg.declare(entry(0x8A00, 0x40, 2)).unwrap();
        reg
    }

    #[test]
    fn test_declared_without_value() {
        let reg = registry();
        assert_eq!(reg.len(), 4);
        assert_eq!(reg.get(0x8200), &[] as &[u8]);
        assert!(!reg.parameter(0x8200).unwrap().has_value());
        assert_eq!(reg.get(0x1234), &[] as &[u8]);
    }

    #[test]
    fn test_init_readable_ids() {
        let reg = registry();
        assert_eq!(&reg.init_readable_ids()[..], &[0x8200, 0x8A00]);
    }

    #[test]
    fn test_declare_too_large() {
        let mut reg = ParameterRegistry::new();
        assert_eq!(
            reg.declare(entry(0x8600, 0x62, 243)),
            Err(RegistryError::ParameterTooLarge {
                id: 0x8600,
                size: 243
            })
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_declare_large_values() {
        assert_eq!(MAX_PARAMETER_SIZE, 242);

        let mut reg = ParameterRegistry::new();
        reg.declare(entry(0x9E00, 0x62, 65)).unwrap();
        reg.declare(entry(0x9F00, 0x62, 242)).unwrap();
        assert_eq!(reg.len(), 2);

        let value = [0xA5u8; 242];
        let mut block = std::vec![0x01, 0x00, 0x9F, 242];
        block.extend_from_slice(&value);
        let summary = reg.apply_block(ParameterBlock::new(&block));
        assert_eq!(summary.applied, 1);
        assert_eq!(reg.get(0x9F00), &value[..]);
    }

    #[test]
    fn test_registry_full() {
        let mut reg = ParameterRegistry::new();
        for id in 0..MAX_PARAMETERS as u16 {
            reg.declare(entry(id, 0, 1)).unwrap();
        }
        assert_eq!(
            reg.declare(entry(0xFFFF, 0, 1)),
            Err(RegistryError::RegistryFull)
        );
    }

    #[test]
    fn test_apply_block_skips_only_bad_entries() {
        let mut reg = registry();
        let block = [
            0x04, // count
            0x00, 0x80, 0x01, 0x30, // 8000 = 30
            0x34, 0x12, 0x01, 0x99, // unknown 1234
            0x00, 0xF0, 0x02, 0x32, 0x33, // F000 with wrong size
            0x00, 0x8A, 0x02, 0xAB, 0xCD, // 8A00 = AB CD
        ];
        let summary = reg.apply_block(ParameterBlock::new(&block));

        assert_eq!(
            summary,
            BlockSummary {
                applied: 2,
                skipped: 2,
                truncated: false
            }
        );
        assert_eq!(reg.get(0x8000), &[0x30]);
        assert_eq!(reg.get(0x8A00), &[0xAB, 0xCD]);
        assert_eq!(reg.get(0xF000), &[] as &[u8]);
    }

    #[test]
    fn test_apply_block_truncated_keeps_earlier_entries() {
        let mut reg = registry();
        let block = [0x02, 0x00, 0x80, 0x01, 0x31, 0x00, 0x82, 0x04, 0x01];
        let summary = reg.apply_block(ParameterBlock::new(&block));

        assert!(summary.truncated);
        assert_eq!(summary.applied, 1);
        assert_eq!(reg.get(0x8000), &[0x31]);
    }

    #[test]
    fn test_apply_batch_is_atomic() {
        let mut reg = registry();
        let updates = [
            ParameterUpdate::byte(0x8000, 0x30),
            ParameterUpdate::new(0x8200, &[1, 2, 3]).unwrap(),
        ];

        assert_eq!(
            reg.apply_batch(&updates),
            Err(RegistryError::SizeMismatch {
                id: 0x8200,
                expected: 4,
                actual: 3
            })
        );
        // Nothing written, not even the valid first entry
        assert_eq!(reg.get(0x8000), &[] as &[u8]);
        assert_eq!(reg.get(0x8200), &[] as &[u8]);
    }

    #[test]
    fn test_apply_batch_unknown_id() {
        let mut reg = registry();
        let updates = [
            ParameterUpdate::byte(0xF000, 0x33),
            ParameterUpdate::byte(0xF300, 0x30),
        ];
        assert_eq!(
            reg.apply_batch(&updates),
            Err(RegistryError::UnknownParameter(0xF300))
        );
        assert_eq!(reg.get(0xF000), &[] as &[u8]);
    }

    #[test]
    fn test_apply_batch_coalesces_last_write_wins() {
        let mut reg = registry();
        let updates = [
            ParameterUpdate::byte(0xF000, 0x31),
            ParameterUpdate::byte(0x8000, 0x30),
            ParameterUpdate::byte(0xF000, 0x35),
        ];

        let batch = reg.apply_batch(&updates).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], ParameterUpdate::byte(0x8000, 0x30));
        assert_eq!(batch[1], ParameterUpdate::byte(0xF000, 0x35));
        assert_eq!(reg.get(0xF000), &[0x35]);
    }

    #[test]
    fn test_prepare_batch_leaves_values_alone() {
        let mut reg = registry();
        let batch = reg
            .prepare_batch(&[ParameterUpdate::byte(0x8000, 0x31)])
            .unwrap();
        assert_eq!(reg.get(0x8000), &[] as &[u8]);

        reg.commit_batch(&batch);
        assert_eq!(reg.get(0x8000), &[0x31]);
    }

    #[test]
    fn test_update_too_large() {
        let big = [0u8; MAX_PARAMETER_SIZE + 1];
        assert!(matches!(
            ParameterUpdate::new(0x8600, &big),
            Err(RegistryError::ParameterTooLarge { .. })
        ));
    }
}
