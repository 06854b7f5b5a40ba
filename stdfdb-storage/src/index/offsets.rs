//! Offset columns.
//!
//! Offsets are stored in the narrowest unsigned width that fits the file
//! size known up front. Compressed inputs have no known decompressed size,
//! so they start at 32 bits. The first offset that does not fit widens the
//! column to 64 bits, copying every earlier value first.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetColumn {
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl OffsetColumn {
    /// Empty column sized for offsets up to `size_hint`
    pub fn for_size(size_hint: Option<u64>) -> Self {
        match size_hint {
            Some(size) if size <= u16::MAX as u64 => OffsetColumn::U16(Vec::new()),
            Some(size) if size <= u32::MAX as u64 => OffsetColumn::U32(Vec::new()),
            Some(_) => OffsetColumn::U64(Vec::new()),
            None => OffsetColumn::U32(Vec::new()),
        }
    }

    pub fn push(&mut self, offset: u64) {
        match self {
            OffsetColumn::U16(values) => {
                if let Ok(v) = u16::try_from(offset) {
                    values.push(v);
                    return;
                }
            }
            OffsetColumn::U32(values) => {
                if let Ok(v) = u32::try_from(offset) {
                    values.push(v);
                    return;
                }
            }
            OffsetColumn::U64(values) => {
                values.push(offset);
                return;
            }
        }
        self.widen();
        if let OffsetColumn::U64(values) = self {
            values.push(offset);
        }
    }

    fn widen(&mut self) {
        let widened: Vec<u64> = match self {
            OffsetColumn::U16(values) => values.iter().map(|v| *v as u64).collect(),
            OffsetColumn::U32(values) => values.iter().map(|v| *v as u64).collect(),
            OffsetColumn::U64(_) => return,
        };
        tracing::debug!(entries = widened.len(), "Widening offset column to 64 bits");
        *self = OffsetColumn::U64(widened);
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        match self {
            OffsetColumn::U16(values) => values.get(index).map(|v| *v as u64),
            OffsetColumn::U32(values) => values.get(index).map(|v| *v as u64),
            OffsetColumn::U64(values) => values.get(index).copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OffsetColumn::U16(values) => values.len(),
            OffsetColumn::U32(values) => values.len(),
            OffsetColumn::U64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per stored offset
    pub fn width(&self) -> usize {
        match self {
            OffsetColumn::U16(_) => 2,
            OffsetColumn::U32(_) => 4,
            OffsetColumn::U64(_) => 8,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_from_size_hint() {
        assert_eq!(OffsetColumn::for_size(Some(60_000)).width(), 2);
        assert_eq!(OffsetColumn::for_size(Some(1 << 20)).width(), 4);
        assert_eq!(OffsetColumn::for_size(Some(1 << 33)).width(), 8);
        assert_eq!(OffsetColumn::for_size(None).width(), 4);
    }

    #[test]
    fn test_widening_keeps_earlier_values() {
        let mut column = OffsetColumn::for_size(Some(1000));
        column.push(6);
        column.push(65_535);
        assert_eq!(column.width(), 2);

        column.push(5_000_000_000);
        assert_eq!(column.width(), 8);
        assert_eq!(column.iter().collect::<Vec<_>>(), vec![6, 65_535, 5_000_000_000]);
    }
}
