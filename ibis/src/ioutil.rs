//! Reader/Writer backends for index files, and the little-endian
//! primitives the file-format layer (`crate::fileformat`) builds on.
//!
//! In-memory and real-file backends share one trait so the format layer
//! doesn't care which it's writing to. The layout is a forward offset
//! table: a reader activating bitvector `i` seeks straight to
//! `offsets[i]`, it never has to find the end of the file first.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use ibis_base::Result;

pub trait Reader: Read + Seek + Send + Sized {
    fn try_clone_independent(&self) -> std::io::Result<Self>;

    fn pos(&mut self) -> Result<i64> {
        Ok(self.stream_position()? as i64)
    }

    fn seek_to(&mut self, pos: i64) -> Result<()> {
        self.seek(SeekFrom::Start(pos as u64))?;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_u32_vec(&mut self, n: usize) -> Result<Vec<u32>> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.read_u32()?);
        }
        Ok(v)
    }

    fn read_i32_vec(&mut self, n: usize) -> Result<Vec<i32>> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.read_i32()?);
        }
        Ok(v)
    }

    fn read_f64_vec(&mut self, n: usize) -> Result<Vec<f64>> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.read_f64()?);
        }
        Ok(v)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut v = vec![0u8; n];
        self.read_exact(&mut v)?;
        Ok(v)
    }

    /// Advance past `n` padding bytes, as written by `Writer::pad_to_8`.
    fn skip(&mut self, n: i64) -> Result<()> {
        self.seek(SeekFrom::Current(n))?;
        Ok(())
    }
}

pub trait Writer: Write + Seek + Send + Sized {
    type PairedReader: Reader;
    fn try_into_reader(self) -> std::io::Result<Self::PairedReader>;

    fn pos(&mut self) -> Result<i64> {
        Ok(self.stream_position()? as i64)
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_slice(&mut self, vs: &[u32]) -> Result<()> {
        for v in vs {
            self.write_u32(*v)?;
        }
        Ok(())
    }

    fn write_i32_slice(&mut self, vs: &[i32]) -> Result<()> {
        for v in vs {
            self.write_i32(*v)?;
        }
        Ok(())
    }

    fn write_f64_slice(&mut self, vs: &[f64]) -> Result<()> {
        for v in vs {
            self.write_f64(*v)?;
        }
        Ok(())
    }

    /// Zero-pad the stream up to the next multiple of 8 bytes.
    fn pad_to_8(&mut self) -> Result<()> {
        let p = self.pos()?;
        let rem = (8 - (p % 8)) % 8;
        if rem > 0 {
            self.write_all(&vec![0u8; rem as usize])?;
        }
        Ok(())
    }
}

// MemReader / MemWriter: an in-memory backend, e.g. for tests and for
// indexes small enough to keep resident without a backing file.

pub struct MemReader {
    mem: Cursor<Arc<[u8]>>,
}

impl MemReader {
    pub fn new(mem: Arc<[u8]>) -> Self {
        Self {
            mem: Cursor::new(mem),
        }
    }
}

impl From<Vec<u8>> for MemReader {
    fn from(vec: Vec<u8>) -> Self {
        let rc: Arc<[u8]> = Arc::from(vec);
        Self::new(rc)
    }
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.mem.read(buf)
    }
}

impl Seek for MemReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.mem.seek(pos)
    }
}

impl Reader for MemReader {
    fn try_clone_independent(&self) -> std::io::Result<Self> {
        let rc = self.mem.get_ref().clone();
        Ok(Self::new(rc))
    }
}

pub struct MemWriter {
    mem: Cursor<Vec<u8>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self {
            mem: Cursor::new(Vec::new()),
        }
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.mem.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.mem.flush()
    }
}

impl Seek for MemWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.mem.seek(pos)
    }
}

impl Writer for MemWriter {
    type PairedReader = MemReader;
    fn try_into_reader(self) -> std::io::Result<Self::PairedReader> {
        let mem = self.mem.into_inner();
        let rc: Arc<[u8]> = Arc::from(mem);
        Ok(MemReader {
            mem: Cursor::new(rc),
        })
    }
}

// FileReader / FileWriter: a real-file backend for index files on disk.

pub struct FileReader {
    file: BufReader<File>,
    path: PathBuf,
}

impl FileReader {
    pub fn try_open_existing(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let file = BufReader::new(file);
        Ok(Self { file, path })
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Reader for FileReader {
    fn try_clone_independent(&self) -> std::io::Result<Self> {
        FileReader::try_open_existing(&self.path)
    }
}

pub struct FileWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl FileWriter {
    pub fn try_create_non_existing(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let file = BufWriter::new(file);
        Ok(Self { file, path })
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Writer for FileWriter {
    type PairedReader = FileReader;
    fn try_into_reader(self) -> std::io::Result<Self::PairedReader> {
        let Self { mut file, path } = self;
        // Make extra sure we've flushed-and-closed before opening to read.
        file.flush()?;
        let file = file.into_inner()?;
        file.sync_all()?;
        drop(file);
        FileReader::try_open_existing(path)
    }
}
