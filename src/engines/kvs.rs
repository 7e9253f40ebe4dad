use crate::codec::{self, base64_bytes, check_table};
use crate::errors::Result;
use crate::registry::Driver;
use crate::{KvsEngine, KvsError};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::{collections::HashMap, path};

const COMPACTION_THRESHOLD: u64 = 1024 * 1024; // 1MB

type TableIndex = HashMap<Vec<u8>, IndexPos>;

/// The `KvStore` is a log-structured store with a hash index per table.
///
/// Every mutation is appended as one JSON line to `<gen>.log` inside the
/// store directory; the in-memory index maps each key to the line holding
/// its latest value. Iteration order is arbitrary.
pub struct KvStore {
    index: HashMap<Vec<u8>, TableIndex>,
    reader: HashMap<u64, BufReaderWithPos<File>>,
    writer: BufWriterWithPos<File>,

    path: path::PathBuf,
    current_gen: u64,
    uncompacted: u64,
}

impl KvsEngine for KvStore {
    fn name(&self) -> &'static str {
        "kvs"
    }

    fn register(&mut self, table: &[u8]) -> Result<()> {
        let table = check_table(table)?;
        if self.index.contains_key(table) {
            return Ok(());
        }
        let log = KvLog::Register {
            table: table.to_vec(),
        };
        Self::write_log(&mut self.writer, &log)?;
        self.writer.flush()?;
        self.index.insert(table.to_vec(), HashMap::new());
        debug!("kvs table {} registered", codec::display(table));
        Ok(())
    }

    /// Sets the value of a key.
    /// If the key already exists, the previous value will be overwritten.
    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        let keys = self
            .index
            .get_mut(table)
            .ok_or_else(|| KvsError::TableNotFound(codec::display(table).into_owned()))?;
        let log = KvLog::Set {
            table: table.to_vec(),
            key: key.to_vec(),
            value: value.to_vec(),
        };

        let old_pos = self.writer.pos;
        Self::write_log(&mut self.writer, &log)?;
        self.writer.flush()?;
        let cur_pos = self.writer.pos;

        if let Some(old) = keys.insert(key.to_vec(), (self.current_gen, old_pos..cur_pos).into()) {
            self.uncompacted += old.len;
        }

        if self.uncompacted > COMPACTION_THRESHOLD {
            self.compact()?;
        }
        Ok(())
    }

    /// Gets the value of a given key.
    /// If the key does not exist, returns `None`.
    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        let index_pos = match self.index.get(table).and_then(|keys| keys.get(key)) {
            Some(pos) => *pos,
            None => return Ok(None),
        };
        Self::read_value(&mut self.reader, &index_pos).map(Some)
    }

    /// Removes a given key from the store.
    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        let keys = match self.index.get_mut(table) {
            Some(keys) if keys.contains_key(key) => keys,
            _ => return Ok(()),
        };
        let log = KvLog::Remove {
            table: table.to_vec(),
            key: key.to_vec(),
        };
        let old_pos = self.writer.pos;
        Self::write_log(&mut self.writer, &log)?;
        self.writer.flush()?;
        if let Some(old) = keys.remove(key) {
            // the remove record itself is garbage once the key is gone
            self.uncompacted += old.len + (self.writer.pos - old_pos);
        }

        if self.uncompacted > COMPACTION_THRESHOLD {
            self.compact()?;
        }
        Ok(())
    }

    fn count(&mut self, table: &[u8]) -> Result<usize> {
        Ok(self.index.get(table).map_or(0, HashMap::len))
    }

    fn iterate(
        &mut self,
        table: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let KvStore { index, reader, .. } = self;
        let keys = match index.get(table) {
            Some(keys) => keys,
            None => return Ok(()),
        };
        for (key, index_pos) in keys {
            let value = Self::read_value(reader, index_pos)?;
            if !visit(key.as_slice(), value.as_slice()) {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl KvStore {
    /// Opens a `KvStore` in the directory `p`, creating it if needed.
    pub fn open(p: &path::Path) -> Result<KvStore> {
        fs::create_dir_all(p)?;
        if !p.is_dir() {
            return Err(KvsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path must be a dir",
            )));
        }
        let file_path = p.to_path_buf();

        let mut index: HashMap<Vec<u8>, TableIndex> = HashMap::new();
        let mut reader_map: HashMap<u64, BufReaderWithPos<File>> = HashMap::new();
        let mut uncompacted: u64 = 0;
        let gen_list = Self::get_sorted_gen_list(p)?;
        for &gen in &gen_list {
            let file_path = Self::log_file_path(p, gen);
            let mut reader = BufReaderWithPos::new(File::open(&file_path)?)?;
            uncompacted += Self::replay_log_file(gen, &mut reader, &mut index)?;
            reader_map.insert(gen, reader);
        }

        let current_gen = gen_list.last().unwrap_or(&0) + 1;

        let writer = Self::create_log_file(&file_path, current_gen, &mut reader_map)?;
        debug!(
            "kvs opened at {} with {} tables, generation {}",
            file_path.display(),
            index.len(),
            current_gen
        );

        Ok(KvStore {
            index,
            reader: reader_map,
            writer,
            path: file_path,
            current_gen,
            uncompacted,
        })
    }

    /// Driver for the registry.
    pub fn driver() -> Driver {
        Driver {
            name: "kvs",
            default_location: "data/kvs",
            open: open_kvs,
        }
    }

    fn write_log<W: Write>(writer: &mut W, log: &KvLog) -> Result<()> {
        let serialized = log.serialize()?;
        let log_line = format!("{}\n", serialized);
        writer.write_all(log_line.as_bytes())?;
        Ok(())
    }

    fn read_value(
        readers: &mut HashMap<u64, BufReaderWithPos<File>>,
        index_pos: &IndexPos,
    ) -> Result<Vec<u8>> {
        let reader = readers.get_mut(&index_pos.gen).ok_or_else(|| {
            KvsError::Other(format!("log generation {} is missing", index_pos.gen))
        })?;
        reader.seek(SeekFrom::Start(index_pos.pos))?;
        let mut buf = String::new();
        reader.read_line(&mut buf)?;
        match KvLog::deserialize(&buf)? {
            KvLog::Set { value, .. } => Ok(value),
            _ => Err(KvsError::Other(format!(
                "unexpected record at {}:{}",
                index_pos.gen, index_pos.pos
            ))),
        }
    }

    fn log_file_path(p: &path::Path, gen: u64) -> path::PathBuf {
        p.join(format!("{}.log", gen))
    }

    fn get_sorted_gen_list(dir_path: &path::Path) -> Result<Vec<u64>> {
        let mut gen_list: Vec<u64> = std::fs::read_dir(dir_path)?
            .flat_map(|entry| -> Result<_> { Ok(entry?.path()) })
            .filter(|path| path.is_file() && path.extension() == Some("log".as_ref()))
            .flat_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.trim_end_matches(".log"))
                    .map(|name| name.parse::<u64>())
            })
            .flatten()
            .collect();
        gen_list.sort_unstable();
        Ok(gen_list)
    }

    fn create_log_file(
        dir_path: &path::Path,
        gen: u64,
        reader_map: &mut HashMap<u64, BufReaderWithPos<File>>,
    ) -> Result<BufWriterWithPos<File>> {
        let file_path = Self::log_file_path(dir_path, gen);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&file_path)?;
        let writer = BufWriterWithPos::new(file)?;
        if !reader_map.contains_key(&gen) {
            reader_map.insert(gen, BufReaderWithPos::new(File::open(&file_path)?)?);
        }
        Ok(writer)
    }

    fn replay_log_file(
        gen: u64,
        reader: &mut BufReaderWithPos<File>,
        index: &mut HashMap<Vec<u8>, TableIndex>,
    ) -> Result<u64> {
        let mut uncompacted = 0;

        let mut pos = reader.seek(SeekFrom::Start(0))?;

        let mut stream = Deserializer::from_reader(reader).into_iter::<KvLog>();
        while let Some(log) = stream.next() {
            let cur_pos = stream.byte_offset() as u64;
            match log? {
                KvLog::Register { table } => {
                    if index.contains_key(&table) {
                        uncompacted += cur_pos - pos;
                    } else {
                        index.insert(table, HashMap::new());
                    }
                }
                KvLog::Set { table, key, .. } => {
                    let keys = index.entry(table).or_default();
                    if let Some(old) = keys.insert(key, (gen, pos..cur_pos).into()) {
                        uncompacted += old.len;
                    }
                }
                KvLog::Remove { table, key } => {
                    if let Some(old) = index.get_mut(&table).and_then(|keys| keys.remove(&key)) {
                        uncompacted += old.len;
                    }
                    uncompacted += cur_pos - pos;
                }
            }
            // skip the '\n' that terminates every record
            pos = cur_pos + 1;
        }

        Ok(uncompacted)
    }

    fn compact(&mut self) -> Result<()> {
        // for example, if current_gen is 1, then compact_gen is 2 and new_gen is 3
        // after compaction, new commands will be written to gen 3
        let compact_gen = self.current_gen + 1;
        self.current_gen += 2;
        self.writer = Self::create_log_file(&self.path, self.current_gen, &mut self.reader)?;

        let mut compact_writer = Self::create_log_file(&self.path, compact_gen, &mut self.reader)?;
        // the live index keeps pointing at the old generations until the new one is flushed
        let mut compacted: HashMap<Vec<u8>, TableIndex> = HashMap::with_capacity(self.index.len());
        for (table, keys) in &self.index {
            Self::write_log(
                &mut compact_writer,
                &KvLog::Register {
                    table: table.clone(),
                },
            )?;
            let mut new_keys = TableIndex::with_capacity(keys.len());
            for (key, index_pos) in keys {
                let reader = self.reader.get_mut(&index_pos.gen).ok_or_else(|| {
                    KvsError::Other(format!("log generation {} is missing", index_pos.gen))
                })?;
                if reader.pos != index_pos.pos {
                    reader.seek(SeekFrom::Start(index_pos.pos))?;
                }
                let mut buf = String::new();
                reader.read_line(&mut buf)?;
                if !buf.ends_with('\n') {
                    buf.push('\n');
                }
                let offset = compact_writer.pos;
                compact_writer.write_all(buf.as_bytes())?;
                new_keys.insert(key.clone(), (compact_gen, offset..compact_writer.pos).into());
            }
            compacted.insert(table.clone(), new_keys);
        }
        compact_writer.flush()?;
        self.index = compacted;

        let stale_gens: Vec<u64> = self
            .reader
            .keys()
            .filter(|&&gen| gen < compact_gen)
            .cloned()
            .collect();
        for gen in stale_gens {
            self.reader.remove(&gen);
            fs::remove_file(Self::log_file_path(&self.path, gen))?;
        }
        debug!("kvs compacted into generation {}", compact_gen);

        self.uncompacted = 0;
        Ok(())
    }
}

fn open_kvs(path: &path::Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(KvStore::open(path)?))
}

#[derive(Clone, Copy)]
struct IndexPos {
    gen: u64,
    pos: u64,
    len: u64,
}

impl From<(u64, Range<u64>)> for IndexPos {
    fn from((gen, range): (u64, Range<u64>)) -> Self {
        IndexPos {
            gen,
            pos: range.start,
            len: range.end - range.start,
        }
    }
}

#[derive(Serialize, Deserialize)]
enum KvLog {
    Register {
        #[serde(with = "base64_bytes")]
        table: Vec<u8>,
    },
    Set {
        #[serde(with = "base64_bytes")]
        table: Vec<u8>,
        #[serde(with = "base64_bytes")]
        key: Vec<u8>,
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
    },
    Remove {
        #[serde(with = "base64_bytes")]
        table: Vec<u8>,
        #[serde(with = "base64_bytes")]
        key: Vec<u8>,
    },
}

impl KvLog {
    fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self)?)
    }

    fn deserialize(s: &str) -> Result<KvLog> {
        Ok(serde_json::from_str(s)?)
    }
}

struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(BufReaderWithPos {
            reader: BufReader::new(inner),
            pos,
        })
    }

    fn read_line(&mut self, buf: &mut String) -> Result<usize> {
        let n = self.reader.read_line(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}

struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    fn new(mut inner: W) -> Result<Self> {
        let pos = inner.seek(SeekFrom::End(0))?;
        Ok(BufWriterWithPos {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let len = self.writer.write(buf)?;
        self.pos += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write + Seek> Seek for BufWriterWithPos<W> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.pos = self.writer.seek(pos)?;
        Ok(self.pos)
    }
}
