//! Parameter payload formats
//!
//! Parameters are addressed by 16-bit little-endian IDs. Every request made
//! after bring-up carries the 24-bit table identifier the controller issued
//! in its `0x0010` response.
//!
//! ```text
//! read request:   [0x02] TABLE_ID(3) COUNT { ID(2) 0x00 } × COUNT
//! write request:   0x02  TABLE_ID(3) COUNT { ID(2) LEN DATA(LEN) } × COUNT
//! value block:    STATUS TABLE_ID(3) COUNT { ID(2) LEN DATA(LEN) } × COUNT
//! table response: STATUS TABLE_ID(3) ?(2) ?(2) COUNT(2, BE) { ID(2) META SIZE } × COUNT
//! ```
//!
//! The leading `0x02` of a read request is only sent with `0x0910`.

use heapless::Vec;

use crate::frame::{FrameError, MAX_PAYLOAD_SIZE};

/// Owned request payload
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Maximum number of IDs in one read request
pub const MAX_REQUEST_IDS: usize = 80;

/// Offset of the table identifier in a `0x0010` response
pub const TABLE_ID_OFFSET: usize = 2;

/// Offset of the value block (its count byte) in read responses and
/// state-changed notifications
pub const BLOCK_OFFSET: usize = 4;

const TYPED_REQUEST: u8 = 0x02;
const TABLE_COUNT_OFFSET: usize = 8;
const TABLE_ENTRIES_OFFSET: usize = 10;
const TABLE_ENTRY_SIZE: usize = 4;
const BLOCK_ENTRY_HEADER: usize = 3;

/// Opaque 24-bit parameter table identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableId(u32);

impl TableId {
    /// Build from the three on-wire bytes (little-endian)
    pub const fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16)
    }

    /// The three on-wire bytes (little-endian)
    pub const fn to_le_bytes(self) -> [u8; 3] {
        [self.0 as u8, (self.0 >> 8) as u8, (self.0 >> 16) as u8]
    }

    /// Numeric value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Extract the identifier from a `0x0010` response payload
    pub fn from_response(payload: &[u8]) -> Result<Self, FrameError> {
        match payload.get(TABLE_ID_OFFSET..TABLE_ID_OFFSET + 3) {
            Some(&[a, b, c]) => Ok(Self::from_le_bytes([a, b, c])),
            _ => Err(FrameError::Truncated),
        }
    }
}

fn put(buf: &mut Payload, bytes: &[u8]) -> Result<(), FrameError> {
    buf.extend_from_slice(bytes)
        .map_err(|_| FrameError::PayloadTooLarge)
}

fn put_ids(buf: &mut Payload, table_id: TableId, ids: &[u16]) -> Result<(), FrameError> {
    if ids.len() > MAX_REQUEST_IDS {
        return Err(FrameError::TooManyIds);
    }

    put(buf, &table_id.to_le_bytes())?;
    put(buf, &[ids.len() as u8])?;
    for id in ids {
        let [lo, hi] = id.to_le_bytes();
        // Third byte of each entry has only ever been seen as zero
        put(buf, &[lo, hi, 0x00])?;
    }
    Ok(())
}

/// `0x0210` payload: read the bring-up readable parameters
pub fn read_defaults_request(table_id: TableId, ids: &[u16]) -> Result<Payload, FrameError> {
    let mut buf = Payload::new();
    put_ids(&mut buf, table_id, ids)?;
    Ok(buf)
}

/// `0x0910` payload: batch parameter read
pub fn read_request(table_id: TableId, ids: &[u16]) -> Result<Payload, FrameError> {
    let mut buf = Payload::new();
    put(&mut buf, &[TYPED_REQUEST])?;
    put_ids(&mut buf, table_id, ids)?;
    Ok(buf)
}

/// `0x0810` payload: batch parameter write
pub fn write_request<'a, I>(table_id: TableId, entries: I) -> Result<Payload, FrameError>
where
    I: IntoIterator<Item = (u16, &'a [u8])>,
{
    let mut buf = Payload::new();
    put(&mut buf, &[TYPED_REQUEST])?;
    put(&mut buf, &table_id.to_le_bytes())?;
    let count_index = buf.len();
    put(&mut buf, &[0])?;

    let mut count: u8 = 0;
    for (id, data) in entries {
        count = count.checked_add(1).ok_or(FrameError::TooManyIds)?;
        let len = u8::try_from(data.len()).map_err(|_| FrameError::PayloadTooLarge)?;
        let [lo, hi] = id.to_le_bytes();
        put(&mut buf, &[lo, hi, len])?;
        put(&mut buf, data)?;
    }
    buf[count_index] = count;

    Ok(buf)
}

/// `0x0110` payload: request the parameter table
pub fn table_request(table_id: TableId) -> Payload {
    let [a, b, c] = table_id.to_le_bytes();
    let mut buf = Payload::new();
    // Five bytes always fit
    let _ = buf.extend_from_slice(&[a, b, c, 0x00, 0x01]);
    buf
}

/// One `{ID, LEN, DATA}` entry of a value block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry<'a> {
    pub id: u16,
    pub data: &'a [u8],
}

/// Iterator over the entries of a value block
///
/// Yields `Err(FrameError::Truncated)` once if the block ends before the
/// declared count is reached, then stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBlock<'a> {
    count: u8,
    remaining: u8,
    bytes: &'a [u8],
}

impl<'a> ParameterBlock<'a> {
    /// Parse a block starting at its count byte
    pub fn new(block: &'a [u8]) -> Self {
        let (count, bytes) = match block.split_first() {
            Some((&count, rest)) => (count, rest),
            None => (0, &[][..]),
        };
        Self {
            count,
            remaining: count,
            bytes,
        }
    }

    /// Parse the block carried at [`BLOCK_OFFSET`] of a frame payload
    pub fn from_payload(payload: &'a [u8]) -> Self {
        Self::new(payload.get(BLOCK_OFFSET..).unwrap_or(&[]))
    }

    /// Declared entry count
    pub fn count(&self) -> u8 {
        self.count
    }
}

impl<'a> Iterator for ParameterBlock<'a> {
    type Item = Result<BlockEntry<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let bytes = self.bytes;
        let entry = match bytes {
            [lo, hi, len, rest @ ..] => rest.get(..usize::from(*len)).map(|data| {
                let id = u16::from_le_bytes([*lo, *hi]);
                (BlockEntry { id, data }, BLOCK_ENTRY_HEADER + data.len())
            }),
            _ => None,
        };

        match entry {
            Some((entry, consumed)) => {
                self.remaining -= 1;
                self.bytes = &bytes[consumed..];
                Some(Ok(entry))
            }
            None => {
                self.remaining = 0;
                Some(Err(FrameError::Truncated))
            }
        }
    }
}

/// One entry of the parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableEntry {
    pub id: u16,
    /// Opaque tag; `0x40` marks parameters readable at bring-up
    pub metadata: u8,
    /// Value size in bytes
    pub size: u8,
}

/// Parsed `0x0110` response
#[derive(Debug, Clone, Copy)]
pub struct ParameterTable<'a> {
    declared: u16,
    entries: &'a [u8],
}

impl<'a> ParameterTable<'a> {
    pub fn from_payload(payload: &'a [u8]) -> Result<Self, FrameError> {
        let declared = match payload.get(TABLE_COUNT_OFFSET..TABLE_ENTRIES_OFFSET) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
            _ => return Err(FrameError::Truncated),
        };
        Ok(Self {
            declared,
            entries: &payload[TABLE_ENTRIES_OFFSET..],
        })
    }

    /// Entry count announced by the controller
    pub fn declared(&self) -> u16 {
        self.declared
    }

    /// Check whether fewer entries arrived than were announced
    pub fn is_truncated(&self) -> bool {
        self.entries.len() / TABLE_ENTRY_SIZE < self.declared as usize
    }

    /// Complete entries, at most the announced count
    pub fn entries(&self) -> impl Iterator<Item = TableEntry> + 'a {
        self.entries
            .chunks_exact(TABLE_ENTRY_SIZE)
            .take(self.declared as usize)
            .map(|e| TableEntry {
                id: u16::from_le_bytes([e[0], e[1]]),
                metadata: e[2],
                size: e[3],
            })
    }
}
