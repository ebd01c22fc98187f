use std::io::{self, BufReader, Read};

use parking_lot::Mutex;

use super::{ArchiveValue, BEGIN_BLOCK, END_BLOCK, MAX_NAME_LEN};
use crate::byte_order::ReadCanonical;
use crate::{FsError, FsResult};

const ROOT: usize = 0;

enum NodeKind {
    Value(ArchiveValue),
    Group(Vec<usize>),
}

struct Node {
    name: String,
    kind: NodeKind,
}

/// One open group on the cursor stack.
#[derive(Clone, Copy)]
struct Frame {
    node: usize,
    /// Next child to visit.
    child: usize,
    /// Parent's cursor when this group was entered.
    saved: usize,
}

/// In-memory reader for a binary archive.
///
/// The whole stream is parsed in [`open`](Self::open) into an arena of
/// nodes; navigation afterwards never touches the stream. Typed getters
/// return the caller's default when a key is missing or holds a different
/// type, so reading an older archive never fails on a renamed field.
pub struct BinaryArchiveReader {
    nodes: Vec<Node>,
    cursor: Mutex<Vec<Frame>>,
}

impl BinaryArchiveReader {
    /// Parse an archive until the end of `input`.
    pub fn open(input: impl Read) -> FsResult<Self> {
        let mut input = BufReader::new(input);
        let mut nodes = vec![Node {
            name: String::new(),
            kind: NodeKind::Group(Vec::new()),
        }];
        let mut open_groups = vec![ROOT];

        while let Some(prefix) = read_prefix(&mut input)? {
            let word = u32::from_be_bytes(prefix);
            if word == END_BLOCK {
                if open_groups.len() == 1 {
                    return Err(FsError::InvalidFormat(
                        "end block outside of any group".into(),
                    ));
                }
                open_groups.pop();
                continue;
            }

            // Not an end tag: the word is the high half of the name length.
            let name_len = (u64::from(word) << 32) | u64::from(input.read_u32_be()?);
            if name_len > MAX_NAME_LEN {
                return Err(FsError::InvalidFormat(format!(
                    "archive key length {name_len} exceeds {MAX_NAME_LEN}"
                )));
            }
            let name = String::from_utf8(input.read_bytes(name_len)?)
                .map_err(|_| FsError::InvalidFormat("archive key is not UTF-8".into()))?;

            let tag = input.read_u32_be()?;
            let kind = if tag == BEGIN_BLOCK {
                NodeKind::Group(Vec::new())
            } else {
                NodeKind::Value(ArchiveValue::read_payload(tag, &mut input)?)
            };
            let is_group = matches!(kind, NodeKind::Group(_));

            let index = nodes.len();
            nodes.try_reserve(1).map_err(|_| {
                FsError::OutOfMemory(format!("cannot allocate archive node {index}"))
            })?;
            nodes.push(Node { name, kind });

            let parent = open_groups[open_groups.len() - 1];
            if let NodeKind::Group(children) = &mut nodes[parent].kind {
                children.push(index);
            }
            if is_group {
                open_groups.push(index);
            }
        }

        if open_groups.len() > 1 {
            return Err(FsError::InvalidFormat(format!(
                "stream ended inside {} unterminated group(s)",
                open_groups.len() - 1
            )));
        }

        Ok(Self {
            nodes,
            cursor: Mutex::new(vec![Frame {
                node: ROOT,
                child: 0,
                saved: 0,
            }]),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        Self::open(bytes)
    }

    fn children(&self, node: usize) -> &[usize] {
        match &self.nodes[node].kind {
            NodeKind::Group(children) => children,
            NodeKind::Value(_) => &[],
        }
    }

    /// Find a child of the current group. An empty key selects the child at
    /// the cursor and advances past it.
    fn select(&self, frames: &mut [Frame], key: &str) -> Option<usize> {
        let frame = frames.last_mut()?;
        let children = self.children(frame.node);
        if key.is_empty() {
            let node = *children.get(frame.child)?;
            frame.child += 1;
            return Some(node);
        }
        children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].name == key)
    }

    /// Enter a child group.
    ///
    /// `key` names the group; an empty key enters the child at the cursor.
    /// Fails with [`FsError::NotFound`] if there is no such group.
    pub fn begin_group(&self, key: &str) -> FsResult<()> {
        let mut frames = self.cursor.lock();
        let saved = frames.last().map_or(0, |frame| frame.child);
        let mut lookahead = frames.clone();
        let found = self
            .select(&mut lookahead, key)
            .filter(|&node| matches!(self.nodes[node].kind, NodeKind::Group(_)));
        let Some(node) = found else {
            return Err(FsError::NotFound(format!("archive group {key:?}")));
        };
        frames.push(Frame {
            node,
            child: 0,
            saved,
        });
        Ok(())
    }

    /// Leave the current group.
    ///
    /// The parent's cursor is restored to where it was when the group was
    /// entered and then moved one child forward. After entering the child at
    /// the cursor this steps past that group; after entering a group by name
    /// it steps past whatever child the cursor was on, which is not
    /// necessarily the group itself.
    pub fn end_group(&self) -> FsResult<()> {
        let mut frames = self.cursor.lock();
        if frames.len() == 1 {
            return Err(FsError::InvalidArgument(
                "end_group without a matching begin_group".into(),
            ));
        }
        if let Some(frame) = frames.pop() {
            if let Some(parent) = frames.last_mut() {
                parent.child = frame.saved + 1;
            }
        }
        Ok(())
    }

    /// Name of the current group; empty at the top level.
    pub fn curr_key(&self) -> String {
        let frames = self.cursor.lock();
        frames
            .last()
            .map(|frame| self.nodes[frame.node].name.clone())
            .unwrap_or_default()
    }

    /// Whether the current group has a child the cursor has not passed.
    pub fn has_next_item(&self) -> bool {
        let frames = self.cursor.lock();
        frames
            .last()
            .is_some_and(|frame| frame.child < self.children(frame.node).len())
    }

    /// Name of the child at the cursor, without advancing.
    pub fn next_key(&self) -> Option<String> {
        let frames = self.cursor.lock();
        let frame = frames.last()?;
        let node = *self.children(frame.node).get(frame.child)?;
        Some(self.nodes[node].name.clone())
    }

    /// Depth of the cursor; `0` at the top level.
    pub fn depth(&self) -> usize {
        self.cursor.lock().len() - 1
    }

    /// Raw value of a child, if it is a scalar.
    pub fn value(&self, key: &str) -> Option<ArchiveValue> {
        let mut frames = self.cursor.lock();
        let node = self.select(&mut frames, key)?;
        match &self.nodes[node].kind {
            NodeKind::Value(value) => Some(value.clone()),
            NodeKind::Group(_) => None,
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.value(key) {
            Some(ArchiveValue::String(value)) => value,
            _ => default.to_owned(),
        }
    }

    /// Check that every group was closed and release the tree.
    ///
    /// # Panics
    ///
    /// Panics if `begin_group` and `end_group` calls are not balanced.
    pub fn close(self) {
        let depth = self.depth();
        assert!(
            depth == 0,
            "archive closed with {depth} group(s) still open"
        );
    }
}

macro_rules! typed_getters {
    ($($name:ident => $variant:ident: $ty:ty),* $(,)?) => {
        impl BinaryArchiveReader {
            $(
                /// Value of a child, or `default` if it is missing or holds
                /// another type.
                pub fn $name(&self, key: &str, default: $ty) -> $ty {
                    match self.value(key) {
                        Some(ArchiveValue::$variant(value)) => value,
                        _ => default,
                    }
                }
            )*
        }
    };
}

typed_getters! {
    get_i8 => I8: i8,
    get_i16 => I16: i16,
    get_i32 => I32: i32,
    get_i64 => I64: i64,
    get_u8 => U8: u8,
    get_u16 => U16: u16,
    get_u32 => U32: u32,
    get_u64 => U64: u64,
    get_f32 => F32: f32,
    get_f64 => F64: f64,
    get_bool => Bool: bool,
}

/// Read the next four bytes, or `None` at a clean end of stream.
fn read_prefix(input: &mut impl Read) -> io::Result<Option<[u8; 4]>> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match input.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(Some(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::BinaryArchiveWriter;
    use crate::byte_order::WriteCanonical;

    fn sample() -> BinaryArchiveReader {
        let writer = BinaryArchiveWriter::new(Vec::new());
        writer.set_string("title", "level one").unwrap();
        writer.begin_group("player").unwrap();
        writer.set_f32("speed", 4.5).unwrap();
        writer.set_u8("lives", 3).unwrap();
        writer.end_group().unwrap();
        writer.begin_group("enemy").unwrap();
        writer.set_i32("hp", -1).unwrap();
        writer.end_group().unwrap();
        BinaryArchiveReader::from_bytes(&writer.close().unwrap()).unwrap()
    }

    #[test]
    fn named_navigation() {
        let reader = sample();
        assert_eq!(reader.get_string("title", ""), "level one");
        reader.begin_group("enemy").unwrap();
        assert_eq!(reader.curr_key(), "enemy");
        assert_eq!(reader.get_i32("hp", 0), -1);
        reader.end_group().unwrap();

        reader.begin_group("player").unwrap();
        assert_eq!(reader.get_f32("speed", 0.0), 4.5);
        assert_eq!(reader.get_u8("lives", 0), 3);
        reader.end_group().unwrap();
        assert_eq!(reader.curr_key(), "");
        reader.close();
    }

    #[test]
    fn sequential_navigation() {
        let reader = sample();
        assert_eq!(reader.next_key().as_deref(), Some("title"));
        assert_eq!(reader.get_string("", "?"), "level one");

        reader.begin_group("").unwrap();
        assert_eq!(reader.curr_key(), "player");
        assert_eq!(reader.get_f32("", 0.0), 4.5);
        assert!(reader.has_next_item());
        assert_eq!(reader.get_u8("", 0), 3);
        assert!(!reader.has_next_item());
        reader.end_group().unwrap();

        assert!(reader.has_next_item());
        reader.begin_group("").unwrap();
        assert_eq!(reader.curr_key(), "enemy");
        reader.end_group().unwrap();
        assert!(!reader.has_next_item());
    }

    #[test]
    fn end_group_steps_past_saved_cursor() {
        let reader = sample();
        reader.begin_group("enemy").unwrap();
        reader.end_group().unwrap();
        assert!(reader.has_next_item());
        assert_eq!(reader.next_key().as_deref(), Some("player"));

        reader.begin_group("").unwrap();
        assert_eq!(reader.curr_key(), "player");
        reader.end_group().unwrap();
        assert_eq!(reader.next_key().as_deref(), Some("enemy"));
    }

    #[test]
    fn type_mismatch_returns_default() {
        let reader = sample();
        assert_eq!(reader.get_i64("title", 7), 7);
        reader.begin_group("player").unwrap();
        assert_eq!(reader.get_f64("speed", 1.0), 1.0);
        assert_eq!(reader.get_u16("lives", 9), 9);
        assert!(reader.get_bool("missing", true));
    }

    #[test]
    fn missing_group_is_not_found() {
        let reader = sample();
        assert!(reader.begin_group("boss").unwrap_err().is_not_found());
        assert!(reader.begin_group("title").unwrap_err().is_not_found());
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn unmatched_end_group_is_invalid_argument() {
        let reader = sample();
        assert!(matches!(
            reader.end_group(),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    #[should_panic(expected = "still open")]
    fn close_with_open_group_panics() {
        let reader = sample();
        reader.begin_group("player").unwrap();
        reader.close();
    }

    #[test]
    fn empty_stream_is_empty_archive() {
        let reader = BinaryArchiveReader::from_bytes(&[]).unwrap();
        assert!(!reader.has_next_item());
    }

    #[test]
    fn missing_end_block_is_invalid_format() {
        let mut bytes = Vec::new();
        bytes.write_sized_bytes(b"group").unwrap();
        bytes.write_u32_be(BEGIN_BLOCK).unwrap();
        let err = BinaryArchiveReader::from_bytes(&bytes).err().unwrap();
        assert!(matches!(err, FsError::InvalidFormat(_)));
    }

    #[test]
    fn stray_end_block_is_invalid_format() {
        let mut bytes = Vec::new();
        bytes.write_u32_be(END_BLOCK).unwrap();
        let err = BinaryArchiveReader::from_bytes(&bytes).err().unwrap();
        assert!(matches!(err, FsError::InvalidFormat(_)));
    }

    #[test]
    fn truncated_value_is_invalid_format() {
        let mut bytes = Vec::new();
        bytes.write_sized_bytes(b"n").unwrap();
        bytes.write_u32_be(4).unwrap();
        bytes.extend_from_slice(&[0, 0, 1]);
        let err = BinaryArchiveReader::from_bytes(&bytes).err().unwrap();
        assert!(matches!(err, FsError::InvalidFormat(_)));

        let err = BinaryArchiveReader::from_bytes(&[0, 0]).err().unwrap();
        assert!(matches!(err, FsError::InvalidFormat(_)));
    }
}
