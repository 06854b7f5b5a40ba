//! # Offset Index Store
//!
//! Everything the scanner learns about one file, held in memory and queried
//! without touching the stream again. Test records themselves are not kept;
//! only where they live.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        IndexStore                            │
//! │                                                              │
//! │  file_info      [(key, value)]         first write wins      │
//! │  tests          test_id -> TestMeta    (num, name) -> id     │
//! │  offsets        test_id -> TestOffsets (dut/head/site/off)   │
//! │  duts           dut -> DutInfo         (head, site) -> duts  │
//! │  bins           (kind, bin) -> BinInfo                       │
//! │  bin_counts     (kind, head, site, bin) -> count             │
//! │  wafers / pins / pin_groups / part_counts / datalog          │
//! │  dynamic_limits (test_id, dut) -> DynamicLimit               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod offsets;
pub mod persist;
pub mod tables;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stdfdb_core::error::{Error, Result};
use stdfdb_core::types::{BinClass, BinKind, ByteOrder, TestItem};

use crate::format::RecordKind;
use crate::stream::{BlockTable, Compression};

pub use offsets::OffsetColumn;
pub use tables::{
    BinCount, BinInfo, DatalogEntry, DutInfo, DynamicLimit, OffsetRow, PartCount, PinGroup,
    PinInfo, TestMeta, TestOffsets, WaferInfo,
};

/// Index of one scanned STDF file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStore {
    pub(crate) file_id: u32,
    pub(crate) byte_order: ByteOrder,
    pub(crate) compression: Compression,
    pub(crate) file_info: Vec<(String, String)>,
    pub(crate) tests: Vec<TestMeta>,
    pub(crate) test_ids: BTreeMap<(u32, String), u32>,
    pub(crate) offsets: Vec<TestOffsets>,
    pub(crate) duts: Vec<DutInfo>,
    pub(crate) duts_by_site: BTreeMap<(u8, u8), Vec<u32>>,
    pub(crate) bins: BTreeMap<(BinKind, u16), BinInfo>,
    pub(crate) bin_counts: BTreeMap<(BinKind, u8, u8, u16), u32>,
    pub(crate) wafers: Vec<WaferInfo>,
    pub(crate) pins: BTreeMap<u16, PinInfo>,
    pub(crate) pin_groups: BTreeMap<u16, PinGroup>,
    pub(crate) part_counts: Vec<PartCount>,
    pub(crate) dynamic_limits: BTreeMap<(u32, u32), DynamicLimit>,
    pub(crate) datalog: Vec<DatalogEntry>,
    pub(crate) record_counts: BTreeMap<RecordKind, u64>,
    pub(crate) truncated_records: u64,
    /// Spill layout for compressed inputs, kept when the index is persisted
    pub(crate) blocks: Option<BlockTable>,
}

impl IndexStore {
    pub(crate) fn new(file_id: u32, byte_order: ByteOrder, compression: Compression) -> Self {
        Self {
            file_id,
            byte_order,
            compression,
            file_info: Vec::new(),
            tests: Vec::new(),
            test_ids: BTreeMap::new(),
            offsets: Vec::new(),
            duts: Vec::new(),
            duts_by_site: BTreeMap::new(),
            bins: BTreeMap::new(),
            bin_counts: BTreeMap::new(),
            wafers: Vec::new(),
            pins: BTreeMap::new(),
            pin_groups: BTreeMap::new(),
            part_counts: Vec::new(),
            dynamic_limits: BTreeMap::new(),
            datalog: Vec::new(),
            record_counts: BTreeMap::new(),
            truncated_records: 0,
            blocks: None,
        }
    }

    /// Header field, first write wins; empty values are not stored
    pub(crate) fn set_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.is_empty() || self.file_info.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.file_info.push((key, value));
    }

    /// Header field that may be overwritten in place
    pub(crate) fn replace_info(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.file_info.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.file_info.push((key.to_string(), value)),
        }
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Header fields in the order they were first seen
    pub fn file_info(&self) -> &[(String, String)] {
        &self.file_info
    }

    pub fn info(&self, key: &str) -> Option<&str> {
        self.file_info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn tests(&self) -> &[TestMeta] {
        &self.tests
    }

    pub fn test_meta(&self, test_id: u32) -> Option<&TestMeta> {
        self.tests.get(test_id as usize)
    }

    pub fn find_test(&self, test_num: u32, name: &str) -> Option<&TestMeta> {
        self.test_ids
            .get(&(test_num, name.to_string()))
            .and_then(|id| self.test_meta(*id))
    }

    /// All test identities, MPR tests expanded per pin, ordered by number then pin
    pub fn test_items(&self) -> Vec<TestItem> {
        let mut items: Vec<TestItem> = self
            .tests
            .iter()
            .flat_map(|meta| {
                meta.pin_indexes().into_iter().map(move |pin_index| TestItem {
                    test_num: meta.test_num,
                    pin_index,
                    name: meta.name.clone(),
                    kind: meta.kind,
                })
            })
            .collect();
        items.sort();
        items.dedup();
        items
    }

    /// Test metadata for an identity, checking the pin exists
    pub fn resolve(&self, item: &TestItem) -> Result<&TestMeta> {
        let meta = self.find_test(item.test_num, &item.name).ok_or_else(|| Error::Query {
            message: format!("No test {} '{}' in file {}", item.test_num, item.name, self.file_id),
        })?;
        if !meta.pin_indexes().contains(&item.pin_index) {
            return Err(Error::Query {
                message: format!(
                    "Test {} '{}' has no pin {}",
                    item.test_num, item.name, item.pin_index
                ),
            });
        }
        Ok(meta)
    }

    /// Offset entries of one test; empty `heads`/`sites` select everything
    pub fn offset_rows(&self, test_id: u32, heads: &[u8], sites: &[u8]) -> Vec<OffsetRow> {
        let Some(entries) = self.offsets.get(test_id as usize) else {
            return Vec::new();
        };
        (0..entries.len())
            .filter_map(|i| entries.row(i))
            .filter(|row| heads.is_empty() || heads.contains(&row.head))
            .filter(|row| sites.is_empty() || sites.contains(&row.site))
            .collect()
    }

    pub fn entry_count(&self, test_id: u32) -> usize {
        self.offsets.get(test_id as usize).map_or(0, TestOffsets::len)
    }

    pub fn total_entries(&self) -> usize {
        self.offsets.iter().map(TestOffsets::len).sum()
    }

    pub fn duts(&self) -> &[DutInfo] {
        &self.duts
    }

    /// DUT by its 1-based index
    pub fn dut(&self, index: u32) -> Option<&DutInfo> {
        index
            .checked_sub(1)
            .and_then(|i| self.duts.get(i as usize))
    }

    pub fn duts_at(&self, head: u8, site: u8) -> &[u32] {
        self.duts_by_site
            .get(&(head, site))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Heads and sites that tested at least one DUT
    pub fn head_sites(&self) -> Vec<(u8, u8)> {
        self.duts_by_site.keys().copied().collect()
    }

    pub fn bins(&self, kind: BinKind) -> impl Iterator<Item = &BinInfo> {
        self.bins
            .range((kind, 0)..=(kind, u16::MAX))
            .map(|(_, info)| info)
    }

    pub fn bin_info(&self, kind: BinKind, number: u16) -> Option<&BinInfo> {
        self.bins.get(&(kind, number))
    }

    /// DUT counts per bin; `None` head or site means all of them
    pub fn bin_distribution(&self, head: Option<u8>, site: Option<u8>, kind: BinKind) -> Vec<BinCount> {
        let mut totals: BTreeMap<u16, u32> = BTreeMap::new();
        for ((k, h, s, bin), count) in &self.bin_counts {
            if *k != kind || head.is_some_and(|x| x != *h) || site.is_some_and(|x| x != *s) {
                continue;
            }
            *totals.entry(*bin).or_insert(0) += count;
        }
        totals
            .into_iter()
            .map(|(number, count)| {
                let info = self.bin_info(kind, number);
                BinCount {
                    number,
                    name: info.map(|i| i.name.clone()).unwrap_or_default(),
                    class: info.map_or(BinClass::Unknown, |i| i.class),
                    count,
                }
            })
            .collect()
    }

    pub fn wafers(&self) -> &[WaferInfo] {
        &self.wafers
    }

    /// Wafer by its 1-based index
    pub fn wafer(&self, index: u32) -> Option<&WaferInfo> {
        index
            .checked_sub(1)
            .and_then(|i| self.wafers.get(i as usize))
    }

    pub fn pins(&self) -> impl Iterator<Item = &PinInfo> {
        self.pins.values()
    }

    pub fn pin(&self, index: u16) -> Option<&PinInfo> {
        self.pins.get(&index)
    }

    pub fn pin_groups(&self) -> impl Iterator<Item = &PinGroup> {
        self.pin_groups.values()
    }

    pub fn part_counts(&self) -> &[PartCount] {
        &self.part_counts
    }

    /// Per-DUT limit changes of one test, ordered by DUT
    pub fn dynamic_limits(&self, test_id: u32) -> Vec<(u32, DynamicLimit)> {
        self.dynamic_limits
            .range((test_id, 0)..=(test_id, u32::MAX))
            .map(|((_, dut), limit)| (*dut, *limit))
            .collect()
    }

    pub fn dynamic_limit(&self, test_id: u32, dut: u32) -> Option<DynamicLimit> {
        self.dynamic_limits.get(&(test_id, dut)).copied()
    }

    pub fn datalog(&self) -> &[DatalogEntry] {
        &self.datalog
    }

    pub fn record_count(&self, kind: RecordKind) -> u64 {
        self.record_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn record_counts(&self) -> &BTreeMap<RecordKind, u64> {
        &self.record_counts
    }

    /// Records dropped because their body ended early
    pub fn truncated_records(&self) -> u64 {
        self.truncated_records
    }

    pub fn block_table(&self) -> Option<&BlockTable> {
        self.blocks.as_ref()
    }

    pub(crate) fn set_block_table(&mut self, table: Option<BlockTable>) {
        self.blocks = table;
    }
}
