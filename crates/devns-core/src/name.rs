// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node name storage
//!
//! Most path components are short, so names up to [`NAME_INLINE_MAX`] bytes are
//! kept inside the node itself and only longer names pay for a heap buffer.

use crate::error::{NsError, NsResult};
use crate::fault::{FaultInjector, FaultOp};

/// Longest name accepted for a namespace node.
pub const NAME_MAX: usize = 255;

/// Longest name stored without a heap allocation.
pub const NAME_INLINE_MAX: usize = 47;

/// Encoded name of a node, inline or heap-backed.
///
/// Only [`NameStore::encode`] builds one, so the stored length is always valid.
///
/// ```
/// use devns_core::NameStore;
///
/// let name = NameStore::encode(b"eth0").unwrap();
/// assert_eq!(name.read(), b"eth0");
/// ```
///
/// The representation is not reachable from outside the crate:
///
/// ```compile_fail
/// use devns_core::NameStore;
///
/// let _ = NameStore::Inline { len: 200, buf: [0; 47] };
/// ```
#[derive(Clone)]
pub struct NameStore(Repr);

#[derive(Clone)]
enum Repr {
    Inline { len: u8, buf: [u8; NAME_INLINE_MAX] },
    Heap(Box<[u8]>),
}

impl NameStore {
    /// Validate and store `bytes`.
    pub fn encode(bytes: &[u8]) -> NsResult<Self> {
        Self::encode_with(bytes, None)
    }

    pub(crate) fn encode_with(bytes: &[u8], faults: Option<&FaultInjector>) -> NsResult<Self> {
        if bytes.is_empty() || bytes.len() > NAME_MAX {
            return Err(NsError::InvalidArgument);
        }

        if bytes.len() <= NAME_INLINE_MAX {
            let mut buf = [0u8; NAME_INLINE_MAX];
            buf[..bytes.len()].copy_from_slice(bytes);
            return Ok(NameStore(Repr::Inline {
                len: bytes.len() as u8,
                buf,
            }));
        }

        if let Some(faults) = faults {
            faults.check(FaultOp::NameAlloc)?;
        }
        let mut heap = Vec::new();
        heap.try_reserve_exact(bytes.len()).map_err(|_| NsError::OutOfMemory)?;
        heap.extend_from_slice(bytes);
        Ok(NameStore(Repr::Heap(heap.into_boxed_slice())))
    }

    /// The zero-length name carried only by a tree root.
    pub(crate) fn root() -> Self {
        NameStore(Repr::Inline {
            len: 0,
            buf: [0u8; NAME_INLINE_MAX],
        })
    }

    pub fn read(&self) -> &[u8] {
        match &self.0 {
            Repr::Inline { len, buf } => &buf[..*len as usize],
            Repr::Heap(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.0, Repr::Inline { .. })
    }

    pub fn matches(&self, name: &[u8]) -> bool {
        self.read() == name
    }
}

impl std::fmt::Debug for NameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.read()))
    }
}

impl PartialEq for NameStore {
    fn eq(&self, other: &Self) -> bool {
        self.read() == other.read()
    }
}

impl Eq for NameStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultPolicy, FaultRule};

    #[test]
    fn short_name_is_inline() {
        let name = NameStore::encode(b"0123456789").unwrap();
        assert!(name.is_inline());
        assert_eq!(name.read(), b"0123456789");
        assert_eq!(name.len(), 10);
    }

    #[test]
    fn long_name_is_heap_backed() {
        let bytes = vec![b'x'; 200];
        let name = NameStore::encode(&bytes).unwrap();
        assert!(!name.is_inline());
        assert_eq!(name.read(), bytes.as_slice());
        assert_eq!(name.len(), 200);
    }

    #[test]
    fn threshold_boundary() {
        let at = vec![b'a'; NAME_INLINE_MAX];
        let over = vec![b'a'; NAME_INLINE_MAX + 1];
        assert!(NameStore::encode(&at).unwrap().is_inline());
        let heap = NameStore::encode(&over).unwrap();
        assert!(!heap.is_inline());
        assert_eq!(heap.read(), over.as_slice());
    }

    #[test]
    fn inline_and_heap_compare_by_content() {
        let a = NameStore::encode(b"same").unwrap();
        let b = NameStore(Repr::Heap(b"same".to_vec().into_boxed_slice()));
        assert_eq!(a, b);
        assert!(b.matches(b"same"));
        assert!(!b.matches(b"Same"));
    }

    #[test]
    fn encoded_length_always_matches_input() {
        for len in 1..=NAME_MAX {
            let bytes = vec![b'q'; len];
            let name = NameStore::encode(&bytes).unwrap();
            assert_eq!(name.len(), len);
            assert_eq!(name.is_inline(), len <= NAME_INLINE_MAX);
            assert!(name.matches(&bytes));
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(NameStore::encode(b"").unwrap_err(), NsError::InvalidArgument);
        assert_eq!(
            NameStore::encode(&[b'a'; NAME_MAX + 1]).unwrap_err(),
            NsError::InvalidArgument
        );
        assert!(NameStore::encode(&[b'a'; NAME_MAX]).is_ok());
    }

    #[test]
    fn heap_allocation_failure_is_out_of_memory() {
        let faults = FaultInjector::with_policy(FaultPolicy::single(FaultRule::always(
            FaultOp::NameAlloc,
        )));
        let long = vec![b'z'; 100];
        assert_eq!(
            NameStore::encode_with(&long, Some(&faults)).unwrap_err(),
            NsError::OutOfMemory
        );
        // The inline path never allocates and is unaffected
        assert!(NameStore::encode_with(b"short", Some(&faults)).is_ok());
    }

    #[test]
    fn root_name_is_empty() {
        let root = NameStore::root();
        assert!(root.is_empty());
        assert_eq!(root.read(), b"");
    }
}
