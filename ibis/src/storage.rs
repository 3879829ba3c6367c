//! Backing storage for typed, byte-aligned arrays (bitvector code words,
//! offset tables, bin bounds): an owned buffer or a memory-mapped region,
//! shareable by reference count, with a copy-on-write path for mutation.
//! The mapped arm uses `memmap2` so a large array can be read straight
//! out of the file instead of copied into the heap first.

use std::{borrow::Cow, marker::PhantomData, sync::Arc};

/// A fixed-width little-endian word storable in a `Storage<T>` array.
pub trait Word: Copy + Send + Sync + 'static {
    const SIZE: usize;
    fn from_le_bytes(bytes: &[u8]) -> Self;
    fn write_le_bytes(self, out: &mut Vec<u8>);
}

impl Word for u32 {
    const SIZE: usize = 4;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes.try_into().expect("4-byte slice"))
    }
    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Word for i32 {
    const SIZE: usize = 4;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        i32::from_le_bytes(bytes.try_into().expect("4-byte slice"))
    }
    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Word for i64 {
    const SIZE: usize = 8;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        i64::from_le_bytes(bytes.try_into().expect("8-byte slice"))
    }
    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Word for f64 {
    const SIZE: usize = 8;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        f64::from_le_bytes(bytes.try_into().expect("8-byte slice"))
    }
    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// A mapped file region plus the byte range within it a `Storage` value views.
pub struct MappedRegion {
    pub mmap: memmap2::Mmap,
}

#[derive(Clone)]
pub enum Storage<T: Word> {
    Owned(Arc<Vec<T>>),
    Mapped {
        region: Arc<MappedRegion>,
        byte_offset: usize,
        len: usize,
        _marker: PhantomData<T>,
    },
}

impl<T: Word> Storage<T> {
    pub fn from_vec(v: Vec<T>) -> Self {
        Storage::Owned(Arc::new(v))
    }

    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn mapped(region: Arc<MappedRegion>, byte_offset: usize, len: usize) -> Self {
        Storage::Mapped {
            region,
            byte_offset,
            len,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::Owned(v) => v.len(),
            Storage::Mapped { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> T {
        match self {
            Storage::Owned(v) => v[i],
            Storage::Mapped {
                region, byte_offset, ..
            } => {
                let start = byte_offset + i * T::SIZE;
                T::from_le_bytes(&region.mmap[start..start + T::SIZE])
            }
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Storage::Owned(v) => (**v).clone(),
            Storage::Mapped { len, .. } => (0..*len).map(|i| self.get(i)).collect(),
        }
    }

    /// A slice when the storage is already owned in memory, or a freshly
    /// materialized buffer when it's backed by a mapped region. Lets callers
    /// that want slice-based scanning avoid caring which arm they hold.
    pub fn as_cow(&self) -> Cow<'_, [T]> {
        match self {
            Storage::Owned(v) => Cow::Borrowed(v.as_slice()),
            Storage::Mapped { .. } => Cow::Owned(self.to_vec()),
        }
    }

    /// Ensure this storage owns a buffer no one else can observe, copying
    /// out of a mapped region or cloning a shared owned buffer as needed,
    /// and return a mutable view of it. Every in-place write path must
    /// call this first.
    pub fn ensure_unique(&mut self) -> &mut Vec<T> {
        if let Storage::Mapped { .. } = self {
            let v = self.to_vec();
            *self = Storage::Owned(Arc::new(v));
        }
        match self {
            Storage::Owned(arc) => {
                if Arc::strong_count(arc) > 1 {
                    *arc = Arc::new((**arc).clone());
                }
                Arc::get_mut(arc).expect("just made unique")
            }
            Storage::Mapped { .. } => unreachable!("converted to Owned above"),
        }
    }
}

impl<T: Word> Default for Storage<T> {
    fn default() -> Self {
        Self::empty()
    }
}
