use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sonet_nls::{Codec, TextDecoder};

use crate::error::{ErrorKind, RuntimeError};

#[derive(thiserror::Error, Debug)]
pub enum FileTableError {
    #[error("invalid file handle {0}")]
    InvalidHandle(i64),

    #[error("unsupported integer width {0} (expected 1, 2 or 4)")]
    UnsupportedSize(i64),

    #[error("invalid seek origin {0} (expected 0, 1 or 2)")]
    InvalidOrigin(i64),

    #[error("seek to a negative position")]
    NegativeSeek,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<FileTableError> for RuntimeError {
    fn from(e: FileTableError) -> Self {
        match e {
            FileTableError::InvalidHandle(_) => RuntimeError::new(ErrorKind::InvalidHandle, e.to_string()),
            FileTableError::Io(io) => io.into(),
            _ => RuntimeError::invalid_argument(e.to_string()),
        }
    }
}

pub type Result<T, E = FileTableError> = std::result::Result<T, E>;

/// An open host file plus the line reader built on first text read.
#[derive(Debug)]
pub struct FileEntry {
    file: File,
    // Shares the OS cursor with `file` (try_clone); dropped and resynced
    // before any raw access.
    lines: Option<BufReader<File>>,
}

impl FileEntry {
    fn new(file: File) -> Self {
        Self { file, lines: None }
    }

    fn line_reader(&mut self) -> io::Result<&mut BufReader<File>> {
        let reader = match self.lines.take() {
            Some(r) => r,
            None => BufReader::new(self.file.try_clone()?),
        };
        Ok(self.lines.insert(reader))
    }

    /// Give back bytes the line reader buffered but did not hand out.
    fn raw(&mut self) -> io::Result<&mut File> {
        if let Some(mut reader) = self.lines.take() {
            reader.seek(SeekFrom::Current(0))?;
        }
        Ok(&mut self.file)
    }

    /// Read an unsigned little-endian integer of `size` bytes.
    pub fn read_uint(&mut self, size: i64) -> Result<u32> {
        let file = self.raw()?;
        let v = match size {
            1 => file.read_u8()? as u32,
            2 => file.read_u16::<LittleEndian>()? as u32,
            4 => file.read_u32::<LittleEndian>()?,
            other => return Err(FileTableError::UnsupportedSize(other)),
        };
        Ok(v)
    }

    /// Write the low `size` bytes of `value`, little-endian.
    pub fn write_uint(&mut self, size: i64, value: i64) -> Result<()> {
        let file = self.raw()?;
        match size {
            1 => file.write_u8(value as u8)?,
            2 => file.write_u16::<LittleEndian>(value as u16)?,
            4 => file.write_u32::<LittleEndian>(value as u32)?,
            other => return Err(FileTableError::UnsupportedSize(other)),
        }
        Ok(())
    }

    /// `origin`: 0 = start, 1 = current, 2 = end. Returns the new absolute position.
    pub fn seek(&mut self, offset: i64, origin: i64) -> Result<u64> {
        let pos = match origin {
            0 => SeekFrom::Start(u64::try_from(offset).map_err(|_| FileTableError::NegativeSeek)?),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            other => return Err(FileTableError::InvalidOrigin(other)),
        };
        let file = self.raw()?;
        Ok(file.seek(pos)?)
    }

    /// Read one line (LF, CRLF or bare CR terminated) and decode it.
    /// End of file yields an empty string.
    pub fn read_line(&mut self, codec: &Codec) -> Result<String> {
        let reader = self.line_reader()?;
        let mut bytes = Vec::new();
        loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            match buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(i) => {
                    bytes.extend_from_slice(&buf[..i]);
                    let bare_cr = buf[i] == b'\r';
                    reader.consume(i + 1);
                    if bare_cr && reader.fill_buf()?.first() == Some(&b'\n') {
                        reader.consume(1);
                    }
                    break;
                }
                None => {
                    let n = buf.len();
                    bytes.extend_from_slice(buf);
                    reader.consume(n);
                }
            }
        }
        Ok(codec.decode(&bytes).into_owned())
    }

    /// Encode and write `text`. No line terminator is appended.
    pub fn write_text(&mut self, codec: &Codec, text: &str) -> Result<()> {
        let bytes = codec.encode(text);
        self.raw()?.write_all(&bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.raw()?.flush()?;
        Ok(())
    }
}

/// Small positive integers standing for open host files.
#[derive(Debug, Default)]
pub struct FileTable {
    entries: BTreeMap<i64, FileEntry>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `file` to the smallest unused handle >= 1.
    pub fn open(&mut self, file: File) -> i64 {
        let mut handle = 1;
        for &used in self.entries.keys() {
            if used != handle {
                break;
            }
            handle += 1;
        }
        self.entries.insert(handle, FileEntry::new(file));
        handle
    }

    pub fn get(&mut self, handle: i64) -> Result<&mut FileEntry> {
        if handle < 1 {
            return Err(FileTableError::InvalidHandle(handle));
        }
        self.entries
            .get_mut(&handle)
            .ok_or(FileTableError::InvalidHandle(handle))
    }

    pub fn close(&mut self, handle: i64) -> Result<()> {
        let mut entry = self
            .entries
            .remove(&handle)
            .ok_or(FileTableError::InvalidHandle(handle))?;
        entry.flush()?;
        Ok(())
    }

    pub fn close_all(&mut self) {
        for (handle, mut entry) in std::mem::take(&mut self.entries) {
            if let Err(e) = entry.flush() {
                log::warn!("closing handle {handle}: {e}");
            }
        }
    }

    pub fn is_open(&self, handle: i64) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sonet_nls::Encoding;

    fn temp_file() -> File {
        tempfile::tempfile().unwrap()
    }

    #[test]
    fn handles_reuse_smallest_free_id() {
        let mut t = FileTable::new();
        assert_eq!(t.open(temp_file()), 1);
        assert_eq!(t.open(temp_file()), 2);
        assert_eq!(t.open(temp_file()), 3);
        t.close(2).unwrap();
        t.close(1).unwrap();
        assert_eq!(t.open(temp_file()), 1);
        assert_eq!(t.open(temp_file()), 2);
        assert_eq!(t.open(temp_file()), 4);
    }

    #[test]
    fn handle_allocation_property() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let mut t = FileTable::new();
            let mut open: Vec<i64> = Vec::new();
            for _ in 0..40 {
                if open.is_empty() || rng.gen_bool(0.6) {
                    let expected = (1..).find(|h| !open.contains(h)).unwrap();
                    let h = t.open(temp_file());
                    assert!(h >= 1);
                    assert!(!open.contains(&h));
                    assert_eq!(h, expected);
                    open.push(h);
                } else {
                    let h = open.swap_remove(rng.gen_range(0..open.len()));
                    t.close(h).unwrap();
                }
            }
            assert_eq!(t.len(), open.len());
        }
    }

    #[test]
    fn invalid_handles_are_rejected() {
        let mut t = FileTable::new();
        assert!(matches!(t.get(0), Err(FileTableError::InvalidHandle(0))));
        assert!(matches!(t.get(-3), Err(FileTableError::InvalidHandle(-3))));
        assert!(matches!(t.get(1), Err(FileTableError::InvalidHandle(1))));
        assert!(matches!(t.close(1), Err(FileTableError::InvalidHandle(1))));
        let h = t.open(temp_file());
        t.close(h).unwrap();
        assert!(matches!(t.close(h), Err(FileTableError::InvalidHandle(_))));
    }

    #[test]
    fn close_all_on_empty_and_full_table() {
        let mut t = FileTable::new();
        t.close_all();
        t.open(temp_file());
        t.open(temp_file());
        t.close_all();
        assert!(t.is_empty());
        assert_eq!(t.open(temp_file()), 1);
    }

    #[test]
    fn little_endian_roundtrip_for_every_width() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        for size in [1i64, 2, 4] {
            let max: u64 = 1 << (size * 8);
            for _ in 0..200 {
                let v = rng.gen_range(0..max) as i64;
                let f = t.get(h).unwrap();
                f.seek(0, 0).unwrap();
                f.write_uint(size, v).unwrap();
                f.seek(0, 0).unwrap();
                assert_eq!(f.read_uint(size).unwrap() as i64, v);
            }
        }
    }

    #[test]
    fn bytes_are_little_endian_on_disk() {
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        let f = t.get(h).unwrap();
        f.write_uint(4, 0x0403_0201).unwrap();
        f.seek(0, 0).unwrap();
        let bytes: Vec<u32> = (0..4).map(|_| f.read_uint(1).unwrap()).collect();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn seek_then_read_returns_byte_at_offset() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        let data: Vec<u8> = (0..256).map(|_| rng.gen()).collect();
        let f = t.get(h).unwrap();
        for b in &data {
            f.write_uint(1, *b as i64).unwrap();
        }
        for _ in 0..100 {
            let off = rng.gen_range(0..data.len());
            assert_eq!(f.seek(off as i64, 0).unwrap(), off as u64);
            assert_eq!(f.read_uint(1).unwrap(), data[off] as u32);
        }
    }

    #[test]
    fn seek_origins() {
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        let f = t.get(h).unwrap();
        for b in 0..10 {
            f.write_uint(1, b).unwrap();
        }
        assert_eq!(f.seek(-3, 2).unwrap(), 7);
        assert_eq!(f.seek(1, 1).unwrap(), 8);
        assert_eq!(f.read_uint(1).unwrap(), 8);
        assert!(matches!(f.seek(0, 3), Err(FileTableError::InvalidOrigin(3))));
        assert!(matches!(f.seek(-1, 0), Err(FileTableError::NegativeSeek)));
        assert!(matches!(f.read_uint(3), Err(FileTableError::UnsupportedSize(3))));
        assert!(matches!(f.write_uint(8, 0), Err(FileTableError::UnsupportedSize(8))));
    }

    #[test]
    fn line_reading_handles_all_terminators() {
        let codec = Codec::new(Encoding::ShiftJis);
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        let f = t.get(h).unwrap();
        f.write_text(&codec, "one\ntwo\r\nthree\rfour").unwrap();
        f.seek(0, 0).unwrap();
        assert_eq!(f.read_line(&codec).unwrap(), "one");
        assert_eq!(f.read_line(&codec).unwrap(), "two");
        assert_eq!(f.read_line(&codec).unwrap(), "three");
        assert_eq!(f.read_line(&codec).unwrap(), "four");
        assert_eq!(f.read_line(&codec).unwrap(), "");
        assert_eq!(f.read_line(&codec).unwrap(), "");
    }

    #[test]
    fn binary_access_after_line_read_sees_logical_position() {
        let codec = Codec::new(Encoding::Utf8);
        let mut t = FileTable::new();
        let h = t.open(temp_file());
        let f = t.get(h).unwrap();
        f.write_text(&codec, "ab\ncd").unwrap();
        f.seek(0, 0).unwrap();
        assert_eq!(f.read_line(&codec).unwrap(), "ab");
        // the reader buffered "cd" too; binary reads must not skip it
        assert_eq!(f.read_uint(1).unwrap(), b'c' as u32);
        assert_eq!(f.seek(0, 1).unwrap(), 4);
    }

    #[test]
    fn shiftjis_text_roundtrip_property() {
        let codec = Codec::new(Encoding::ShiftJis);
        let alphabet: Vec<char> = ('a'..='z')
            .chain('0'..='9')
            .chain([' ', '!', '.', ','])
            .chain('\u{3041}'..='\u{3093}')
            .chain('\u{30A1}'..='\u{30F3}')
            .chain("漢字日本語音楽".chars())
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut t = FileTable::new();
        for _ in 0..100 {
            let len = rng.gen_range(0..40);
            let s: String = (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect();
            let h = t.open(temp_file());
            let f = t.get(h).unwrap();
            f.write_text(&codec, &s).unwrap();
            f.write_uint(1, b'\n' as i64).unwrap();
            f.seek(0, 0).unwrap();
            assert_eq!(f.read_line(&codec).unwrap(), s);
            t.close(h).unwrap();
        }
    }
}
