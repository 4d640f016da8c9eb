// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Resumable directory enumeration
//!
//! Each call packs whole `[name_len: u8][type_tag: u8][name]` records into the
//! caller's buffer and hands back the cursor to pass on the next call. The
//! cursor is the sequence number of the last returned entry, so entries can be
//! removed or added between calls without invalidating it.

use tracing::trace;

use crate::error::{NsError, NsResult};
use crate::tree::NamespaceTree;
use crate::types::{NodeId, NodeKind};

/// Bytes preceding the name in every record.
pub const RECORD_HEADER_LEN: usize = 2;

/// Resume point of a directory scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor(u64);

impl Cursor {
    /// Beginning of the directory.
    pub const START: Cursor = Cursor(0);

    pub fn is_start(self) -> bool {
        self == Self::START
    }

    /// Opaque cookie form for callers that keep the cursor outside the process.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Cursor(u64::from_le_bytes(bytes))
    }
}

/// Result of one enumeration call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadDirOutcome {
    /// Whole records written.
    pub records: usize,
    /// Bytes of the buffer those records occupy.
    pub bytes: usize,
    /// Cursor for the next call. Equals the input cursor once the scan is done.
    pub next: Cursor,
}

impl ReadDirOutcome {
    pub fn is_end(&self) -> bool {
        self.records == 0
    }
}

/// Serialise the children of `dir` after `cursor` into `buf`.
pub fn read(
    tree: &NamespaceTree,
    dir: NodeId,
    cursor: Cursor,
    buf: &mut [u8],
) -> NsResult<ReadDirOutcome> {
    let entries = tree.child_entries(dir)?;
    let start = entries.partition_point(|entry| entry.seq <= cursor.0);

    let mut outcome = ReadDirOutcome {
        records: 0,
        bytes: 0,
        next: cursor,
    };
    for entry in &entries[start..] {
        let Some(child) = tree.node(entry.id) else {
            continue;
        };
        let name = child.name();
        let len = RECORD_HEADER_LEN + name.len();
        if outcome.bytes + len > buf.len() {
            if outcome.records == 0 {
                trace!(
                    target: "devns::readdir",
                    dir = %dir,
                    need = len,
                    capacity = buf.len(),
                    "first record does not fit"
                );
                return Err(NsError::NotEnoughBuffer);
            }
            break;
        }

        let record = &mut buf[outcome.bytes..outcome.bytes + len];
        record[0] = name.len() as u8;
        record[1] = child.kind().wire_tag();
        record[RECORD_HEADER_LEN..].copy_from_slice(name);

        outcome.bytes += len;
        outcome.records += 1;
        outcome.next = Cursor(entry.seq);
    }

    trace!(
        target: "devns::readdir",
        dir = %dir,
        records = outcome.records,
        bytes = outcome.bytes,
        next = outcome.next.0
    );
    Ok(outcome)
}

/// One decoded directory record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry<'a> {
    pub name: &'a [u8],
    pub kind: NodeKind,
}

/// Iterator over the records of a filled enumeration buffer.
///
/// Yields `Err(InvalidArgument)` once and then stops if a record is truncated
/// or carries an unknown type tag.
#[derive(Debug)]
pub struct DirentReader<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> DirentReader<'a> {
    /// `buf` should be the first `bytes` bytes of a [`read`] outcome.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }
}

impl<'a> Iterator for DirentReader<'a> {
    type Item = NsResult<DirEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() || self.failed {
            return None;
        }
        let buf: &'a [u8] = self.buf;
        let parsed = match buf {
            &[len, tag, ref rest @ ..] if rest.len() >= len as usize && len > 0 => {
                NodeKind::from_wire_tag(tag).map(|kind| {
                    let (name, tail) = rest.split_at(len as usize);
                    (DirEntry { name, kind }, tail)
                })
            }
            _ => None,
        };
        match parsed {
            Some((entry, tail)) => {
                self.buf = tail;
                Some(Ok(entry))
            }
            None => {
                self.failed = true;
                Some(Err(NsError::InvalidArgument))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{MemVnode, Vnode};
    use std::sync::Arc;

    fn file() -> Arc<dyn Vnode> {
        Arc::new(MemVnode::file())
    }

    fn tree_with(names: &[&[u8]]) -> (NamespaceTree, NodeId) {
        let mut tree = NamespaceTree::new(Arc::new(MemVnode::directory())).unwrap();
        let root = tree.root();
        for name in names {
            tree.link(root, name, file()).unwrap();
        }
        (tree, root)
    }

    fn names_in(buf: &[u8]) -> Vec<Vec<u8>> {
        DirentReader::new(buf).map(|e| e.unwrap().name.to_vec()).collect()
    }

    #[test]
    fn writes_exact_record_layout() {
        let (mut tree, root) = tree_with(&[b"hello.txt"]);
        tree.mkdir(root, b"sub").unwrap();
        let mut buf = [0u8; 64];
        let out = read(&tree, root, Cursor::START, &mut buf).unwrap();
        assert_eq!(out.records, 2);
        assert_eq!(out.bytes, 11 + 5);
        assert_eq!(&buf[..11], b"\x09\x02hello.txt");
        assert_eq!(&buf[11..16], b"\x03\x01sub");
    }

    #[test]
    fn empty_directory_is_immediately_done() {
        let (tree, root) = tree_with(&[]);
        let mut buf = [0u8; 16];
        let out = read(&tree, root, Cursor::START, &mut buf).unwrap();
        assert!(out.is_end());
        assert_eq!(out.next, Cursor::START);
        assert_eq!(out.bytes, 0);
    }

    #[test]
    fn stops_before_record_that_does_not_fit() {
        let (tree, root) = tree_with(&[b"aa", b"bbbbbbbb", b"c"]);
        let mut buf = [0u8; 8];
        let out = read(&tree, root, Cursor::START, &mut buf).unwrap();
        assert_eq!(out.records, 1);
        assert_eq!(out.bytes, 4);

        let mut big = [0u8; 10];
        let out = read(&tree, root, out.next, &mut big).unwrap();
        assert_eq!(names_in(&big[..out.bytes]), vec![b"bbbbbbbb".to_vec()]);
    }

    #[test]
    fn first_record_too_large_is_not_enough_buffer() {
        let (tree, root) = tree_with(&[b"abcdef"]);
        let mut buf = [0xaau8; 7];
        assert_eq!(read(&tree, root, Cursor::START, &mut buf), Err(NsError::NotEnoughBuffer));
        assert!(buf.iter().all(|b| *b == 0xaa));

        let mut zero: [u8; 0] = [];
        assert_eq!(read(&tree, root, Cursor::START, &mut zero), Err(NsError::NotEnoughBuffer));
    }

    #[test]
    fn terminal_cursor_is_stable() {
        let (tree, root) = tree_with(&[b"x"]);
        let mut buf = [0u8; 32];
        let first = read(&tree, root, Cursor::START, &mut buf).unwrap();
        let done = read(&tree, root, first.next, &mut buf).unwrap();
        assert!(done.is_end());
        assert_eq!(done.next, first.next);
        let again = read(&tree, root, done.next, &mut buf).unwrap();
        assert_eq!(again, done);
    }

    #[test]
    fn cursor_survives_removal_of_last_returned_entry() {
        let (mut tree, root) = tree_with(&[b"a", b"b", b"c"]);
        let mut buf = [0u8; 3];
        let out = read(&tree, root, Cursor::START, &mut buf).unwrap();
        assert_eq!(names_in(&buf[..out.bytes]), vec![b"a".to_vec()]);

        let a = tree.lookup(root, b"a").unwrap();
        tree.delete(a).unwrap();

        let mut rest = [0u8; 32];
        let out = read(&tree, root, out.next, &mut rest).unwrap();
        assert_eq!(names_in(&rest[..out.bytes]), vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn entries_added_mid_scan_are_seen_and_removed_are_skipped() {
        let (mut tree, root) = tree_with(&[b"a", b"b", b"c"]);
        let mut buf = [0u8; 3];
        let out = read(&tree, root, Cursor::START, &mut buf).unwrap();

        let b = tree.lookup(root, b"b").unwrap();
        tree.delete(b).unwrap();
        tree.link(root, b"d", file()).unwrap();

        let mut rest = [0u8; 32];
        let out = read(&tree, root, out.next, &mut rest).unwrap();
        assert_eq!(names_in(&rest[..out.bytes]), vec![b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn non_directory_and_unknown_nodes_fail() {
        let (mut tree, root) = tree_with(&[]);
        let f = tree.link(root, b"f", file()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(read(&tree, f, Cursor::START, &mut buf), Err(NsError::WrongType));

        tree.delete(f).unwrap();
        assert_eq!(read(&tree, f, Cursor::START, &mut buf), Err(NsError::NotFound));
    }

    #[test]
    fn cursor_cookie_round_trips() {
        let cursor = Cursor(0x0102_0304_0506_0708);
        assert_eq!(Cursor::from_bytes(cursor.to_bytes()), cursor);
        assert_eq!(Cursor::START.to_bytes(), [0u8; 8]);
        assert!(Cursor::from_bytes([0; 8]).is_start());
    }

    #[test]
    fn reader_rejects_malformed_buffers() {
        let mut reader = DirentReader::new(b"\x05\x02abc");
        assert_eq!(reader.next(), Some(Err(NsError::InvalidArgument)));
        assert_eq!(reader.next(), None);

        let mut reader = DirentReader::new(b"\x01\x09a");
        assert_eq!(reader.next(), Some(Err(NsError::InvalidArgument)));

        let entries: Vec<_> = DirentReader::new(b"\x01\x04l\x02\x03ab").collect();
        assert_eq!(
            entries,
            vec![
                Ok(DirEntry { name: b"l", kind: NodeKind::Symlink }),
                Ok(DirEntry { name: b"ab", kind: NodeKind::Device }),
            ]
        );
    }
}
