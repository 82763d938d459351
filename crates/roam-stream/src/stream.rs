use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use roam_types::SourceAddress;

use crate::clock::Timestamp;
use crate::entry::{EntryId, EventStreamEntry};
use crate::error::{StreamError, StreamResult};

/// The ordered, append-only log of entries produced by one source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "StoredStream")]
pub struct EventStream {
    source: SourceAddress,
    entries: Vec<EventStreamEntry>,
    #[serde(skip)]
    index: HashMap<EntryId, usize>,
}

#[derive(Deserialize)]
struct StoredStream {
    source: SourceAddress,
    entries: Vec<EventStreamEntry>,
}

impl From<StoredStream> for EventStream {
    fn from(stored: StoredStream) -> Self {
        let index = stored
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        Self {
            source: stored.source,
            entries: stored.entries,
            index,
        }
    }
}

impl EventStream {
    /// Create an empty stream for `source`.
    pub fn new(source: SourceAddress) -> Self {
        Self {
            source,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a stream from entries already in append order.
    ///
    /// Duplicates are dropped; entries from another source are rejected.
    pub fn from_entries(
        source: SourceAddress,
        entries: impl IntoIterator<Item = EventStreamEntry>,
    ) -> StreamResult<Self> {
        let mut stream = Self::new(source);
        for entry in entries {
            stream.append(entry)?;
        }
        Ok(stream)
    }

    /// The source that owns this stream.
    pub fn source(&self) -> &SourceAddress {
        &self.source
    }

    /// Append an entry.
    ///
    /// Returns `Ok(true)` if the entry was appended and `Ok(false)` if an
    /// entry with the same id is already present.
    pub fn append(&mut self, entry: EventStreamEntry) -> StreamResult<bool> {
        if entry.source != self.source {
            return Err(StreamError::ForeignSource {
                expected: self.source.clone(),
                actual: entry.source,
            });
        }
        if self.index_of(&entry.id).is_some() {
            return Ok(false);
        }
        self.index.insert(entry.id, self.entries.len());
        self.entries.push(entry);
        Ok(true)
    }

    /// All entries, in append order.
    pub fn entries(&self) -> &[EventStreamEntry] {
        &self.entries
    }

    /// The most recently appended entry.
    pub fn head(&self) -> Option<&EventStreamEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.index_of(id).is_some()
    }

    /// Entries appended after `id`.
    ///
    /// If `id` is not in this stream, every entry is returned.
    pub fn since(&self, id: &EntryId) -> &[EventStreamEntry] {
        match self.index_of(id) {
            Some(pos) => &self.entries[pos + 1..],
            None => &self.entries,
        }
    }

    fn index_of(&self, id: &EntryId) -> Option<usize> {
        self.index.get(id).copied()
    }
}

/// Cursor into one stream, ordered for a min-heap.
struct HeapItem<'a> {
    entry: &'a EventStreamEntry,
    stream: usize,
    offset: usize,
}

impl HeapItem<'_> {
    fn key(&self) -> (&Timestamp, &SourceAddress, usize) {
        (&self.entry.timestamp, &self.entry.source, self.stream)
    }
}

impl PartialEq for HeapItem<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapItem<'_> {}

impl PartialOrd for HeapItem<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other.key().cmp(&self.key())
    }
}

/// Merge several streams into one delivery order.
///
/// Entries are ordered by `(timestamp, source)`, each stream's own order is
/// preserved, and an entry delivered by more than one stream appears once.
pub fn merge_streams(streams: &[EventStream]) -> Vec<EventStreamEntry> {
    let mut heap = BinaryHeap::new();
    for (i, stream) in streams.iter().enumerate() {
        if let Some(entry) = stream.entries.first() {
            heap.push(HeapItem {
                entry,
                stream: i,
                offset: 0,
            });
        }
    }

    let total = streams.iter().map(EventStream::len).sum();
    let mut seen = HashSet::with_capacity(total);
    let mut merged = Vec::with_capacity(total);

    while let Some(item) = heap.pop() {
        if seen.insert(item.entry.id) {
            merged.push(item.entry.clone());
        }
        let next = item.offset + 1;
        if let Some(entry) = streams[item.stream].entries.get(next) {
            heap.push(HeapItem {
                entry,
                stream: item.stream,
                offset: next,
            });
        }
    }

    merged
}
