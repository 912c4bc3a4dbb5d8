use pidtrace_shared::EventRecord;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records drained by one [`RingBuffer::consume_batch`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumedBatch {
    pub records: Vec<EventRecord>,
    /// Events overwritten by the producer since the previous call
    pub dropped: u64,
}

impl ConsumedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.dropped == 0
    }
}

#[derive(Debug, Default)]
struct Slot {
    header: AtomicU64,
    timestamp: AtomicU64,
    sequence: AtomicU64,
}

impl Slot {
    fn store(&self, record: &EventRecord) {
        self.header.store(record.packed_header(), Ordering::Relaxed);
        self.timestamp.store(record.timestamp, Ordering::Relaxed);
        self.sequence.store(record.sequence, Ordering::Relaxed);
    }

    fn load(&self) -> Option<EventRecord> {
        EventRecord::from_packed(
            self.header.load(Ordering::Relaxed),
            self.timestamp.load(Ordering::Relaxed),
            self.sequence.load(Ordering::Relaxed),
        )
    }
}

/// Fixed-capacity event ring buffer with a drop-oldest overflow policy.
///
/// One producer calls [`RingBuffer::publish`] while one consumer calls
/// [`RingBuffer::consume_batch`]; both are wait-free. `write_index` and `read_index` grow
/// forever and are masked to address slots, so `write_index - read_index` is the number of
/// unread records and never exceeds the capacity.
///
/// On overflow the producer moves `read_index` forward with an atomic max, and the consumer
/// commits every slot it reads with a compare-exchange on the same cursor. Each position is
/// therefore either consumed or counted as dropped, never both.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Box<[Slot]>,
    mask: u64,
    write_index: AtomicU64,
    read_index: AtomicU64,
    dropped: AtomicU64,
    dropped_reported: AtomicU64,
}

impl RingBuffer {
    /// Create a buffer holding at least `capacity` records. The capacity is rounded up to the
    /// next power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| Slot::default()).collect();

        Self {
            slots,
            mask: capacity as u64 - 1,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            dropped_reported: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of records written but not consumed yet
    pub fn len(&self) -> usize {
        let read = self.read_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Acquire);
        write.saturating_sub(read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of records overwritten before they could be consumed
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Append a record, overwriting the oldest unread one if the buffer is full.
    ///
    /// Must only be called from a single producer at a time.
    pub fn publish(&self, record: EventRecord) {
        let write = self.write_index.load(Ordering::Relaxed);
        let capacity = self.mask + 1;

        if write >= capacity {
            let min_read = write + 1 - capacity;
            let previous = self.read_index.fetch_max(min_read, Ordering::AcqRel);
            if previous < min_read {
                self.dropped
                    .fetch_add(min_read - previous, Ordering::AcqRel);
            }
        }

        self.slots[(write & self.mask) as usize].store(&record);
        self.write_index.store(write + 1, Ordering::Release);
    }

    /// Read up to `max_n` unread records in write order.
    ///
    /// Must only be called from a single consumer at a time. Returns immediately with an empty
    /// batch when nothing is pending.
    pub fn consume_batch(&self, max_n: usize) -> ConsumedBatch {
        let mut records = Vec::with_capacity(max_n.min(self.len()));

        for _ in 0..max_n {
            let read = self.read_index.load(Ordering::Acquire);
            let write = self.write_index.load(Ordering::Acquire);
            if read >= write {
                break;
            }

            let record = self.slots[(read & self.mask) as usize].load();

            // Losing this race means the producer overwrote the slot and already counted it
            // as dropped.
            if self
                .read_index
                .compare_exchange(read, read + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            if let Some(record) = record {
                records.push(record);
            }
        }

        let dropped_total = self.dropped.load(Ordering::Acquire);
        let previously_reported = self.dropped_reported.swap(dropped_total, Ordering::AcqRel);

        ConsumedBatch {
            records,
            dropped: dropped_total.saturating_sub(previously_reported),
        }
    }
}
