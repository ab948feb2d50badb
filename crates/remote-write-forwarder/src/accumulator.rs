// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch accumulation under a byte bound and an entry bound.
//!
//! Groups are admitted whole: a group that would push the current batch over either bound
//! flushes the batch first and then starts the next one. A group landing in an empty batch is
//! always admitted, even when it alone exceeds a bound, so an oversized group can never stall
//! the forwarder.

use derive_more::Display;

use crate::constants::MAX_BATCH_ENTRIES;
use crate::encoding::{EncodedGroup, EncodedRecord};

/// Why a batch left the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FlushTrigger {
    #[display("interval")]
    Interval,
    #[display("byte_limit")]
    ByteLimit,
    #[display("entry_limit")]
    EntryLimit,
    #[display("shutdown")]
    Shutdown,
}

/// Encoded records handed to a sink in one delivery call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<EncodedRecord>,
    byte_size: usize,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Batch {
            records: Vec::with_capacity(capacity),
            byte_size: 0,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[EncodedRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<EncodedRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

#[derive(Debug)]
pub struct Accumulator {
    batch: Batch,
    max_bytes: usize,
    max_entries: usize,
}

impl Accumulator {
    #[must_use]
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Accumulator {
            batch: Batch::with_capacity(max_entries.min(MAX_BATCH_ENTRIES)),
            max_bytes,
            max_entries,
        }
    }

    /// Admits a group into the current batch.
    ///
    /// Returns the previous batch, and the bound it would have crossed, when the group did not
    /// fit and the batch had to be flushed to make room.
    pub fn admit(&mut self, group: EncodedGroup) -> Option<(Batch, FlushTrigger)> {
        if group.is_empty() {
            return None;
        }

        let flushed = self.overflow(&group).map(|trigger| (self.take(), trigger));

        self.batch.byte_size += group.byte_size;
        self.batch.records.extend(group.records);

        flushed
    }

    /// Empties the accumulator, returning whatever it held.
    pub fn take(&mut self) -> Batch {
        std::mem::replace(
            &mut self.batch,
            Batch::with_capacity(self.max_entries.min(MAX_BATCH_ENTRIES)),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.batch.byte_size
    }

    fn overflow(&self, group: &EncodedGroup) -> Option<FlushTrigger> {
        if self.batch.is_empty() {
            return None;
        }
        if self.batch.byte_size + group.byte_size > self.max_bytes {
            Some(FlushTrigger::ByteLimit)
        } else if self.batch.len() + group.len() > self.max_entries {
            Some(FlushTrigger::EntryLimit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;

    fn group(tag: &str, sizes: &[usize]) -> EncodedGroup {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| EncodedRecord {
                data: Bytes::from(vec![b'x'; *size]),
                partition_key: format!("{tag}{i}"),
            })
            .collect()
    }

    fn keys(batch: &Batch) -> Vec<&str> {
        batch
            .records()
            .iter()
            .map(|r| r.partition_key.as_str())
            .collect()
    }

    #[test]
    fn test_entry_bound_flushes_before_admitting() {
        let mut accumulator = Accumulator::new(1000, 2);

        assert!(accumulator.admit(group("a", &[100])).is_none());
        assert_eq!(accumulator.len(), 1);

        let (flushed, trigger) = accumulator
            .admit(group("b", &[100, 100]))
            .expect("second group overflows max entries");
        assert_eq!(trigger, FlushTrigger::EntryLimit);
        assert_eq!(keys(&flushed), vec!["a0"]);
        assert_eq!(flushed.byte_size(), 100);

        let current = accumulator.take();
        assert_eq!(keys(&current), vec!["b0", "b1"]);
        assert_eq!(current.byte_size(), 200);
        assert!(accumulator.is_empty());
        assert_eq!(accumulator.byte_size(), 0);
    }

    #[test]
    fn test_byte_bound_flushes_before_admitting() {
        let mut accumulator = Accumulator::new(250, 100);

        assert!(accumulator.admit(group("a", &[100, 100])).is_none());
        let (flushed, trigger) = accumulator
            .admit(group("b", &[60]))
            .expect("260 bytes exceeds 250");

        assert_eq!(trigger, FlushTrigger::ByteLimit);
        assert_eq!(flushed.len(), 2);
        assert_eq!(accumulator.byte_size(), 60);
    }

    #[test]
    fn test_exact_fit_does_not_flush() {
        let mut accumulator = Accumulator::new(200, 2);

        assert!(accumulator.admit(group("a", &[100])).is_none());
        assert!(accumulator.admit(group("b", &[100])).is_none());
        assert_eq!(accumulator.len(), 2);
        assert_eq!(accumulator.byte_size(), 200);
    }

    #[test]
    fn test_oversized_group_admitted_whole_into_empty_batch() {
        let mut accumulator = Accumulator::new(1000, 2);

        assert!(accumulator.admit(group("a", &[1; 5])).is_none());
        assert_eq!(accumulator.len(), 5);

        let (flushed, _) = accumulator
            .admit(group("b", &[1]))
            .expect("anything after an oversized batch flushes it");
        assert_eq!(flushed.len(), 5);
        assert_eq!(accumulator.len(), 1);
    }

    #[test]
    fn test_oversized_bytes_admitted_into_empty_batch() {
        let mut accumulator = Accumulator::new(10, 500);

        assert!(accumulator.admit(group("a", &[64])).is_none());
        assert_eq!(accumulator.byte_size(), 64);
    }

    #[test]
    fn test_empty_group_is_ignored() {
        let mut accumulator = Accumulator::new(10, 1);
        assert!(accumulator.admit(group("a", &[10])).is_none());
        assert!(accumulator.admit(EncodedGroup::default()).is_none());
        assert_eq!(accumulator.len(), 1);
    }

    #[test]
    fn test_take_on_empty_accumulator() {
        let mut accumulator = Accumulator::new(10, 1);
        let batch = accumulator.take();
        assert!(batch.is_empty());
        assert_eq!(batch.byte_size(), 0);
    }

    proptest! {
        #[test]
        fn prop_batches_respect_bounds_and_conserve_records(
            groups in prop::collection::vec(prop::collection::vec(1usize..200, 0..8), 0..40),
            max_bytes in 1usize..1000,
            max_entries in 1usize..10,
        ) {
            let mut accumulator = Accumulator::new(max_bytes, max_entries);
            let mut flushed = Vec::new();
            let mut admitted = 0;

            for (i, sizes) in groups.iter().enumerate() {
                admitted += sizes.len();
                let g = group(&format!("g{i}-"), sizes);
                if let Some((batch, _)) = accumulator.admit(g) {
                    flushed.push(batch);
                }
            }
            flushed.push(accumulator.take());

            let total: usize = flushed.iter().map(Batch::len).sum();
            prop_assert_eq!(total, admitted);

            for batch in &flushed {
                prop_assert_eq!(
                    batch.byte_size(),
                    batch.records().iter().map(EncodedRecord::len).sum::<usize>()
                );
                // A batch over a bound must consist of exactly one group.
                if batch.byte_size() > max_bytes || batch.len() > max_entries {
                    let first = batch.records()[0].partition_key.split('-').next();
                    prop_assert!(batch
                        .records()
                        .iter()
                        .all(|r| r.partition_key.split('-').next() == first));
                }
            }
        }
    }
}
