use std::{
    env::current_dir,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    process::exit,
    str::FromStr,
};

use clap::{Parser, Subcommand, ValueEnum};
use gkv::{codec, Driver, Gkv, KvStore, KvsError, MemoryStore, Registry, Result, SledStore};
use log::{debug, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_enum, value_name = "ENGINE", default_value = "kvs")]
    engine: Engine,

    /// Storage location; defaults to a per-engine path under ./data
    #[arg(short, long, value_name = "PATH")]
    path: Option<PathBuf>,

    #[arg(short, long, value_name = "TABLE", default_value = "default")]
    table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Put {
        key: String,
        value: String,
    },
    Get {
        key: String,
    },
    #[command(alias = "rm")]
    Remove {
        key: String,
    },
    Count,
    Scan {
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Engine {
    Kvs,
    Sled,
    Memory,
    Sqlite,
    Rocksdb,
}

impl FromStr for Engine {
    fn from_str(s: &str) -> std::prelude::v1::Result<Self, Self::Err> {
        match s {
            "kvs" => Ok(Engine::Kvs),
            "sled" => Ok(Engine::Sled),
            "memory" => Ok(Engine::Memory),
            "sqlite" => Ok(Engine::Sqlite),
            "rocksdb" => Ok(Engine::Rocksdb),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }

    type Err = String;
}

impl Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Kvs => write!(f, "kvs"),
            Engine::Sled => write!(f, "sled"),
            Engine::Memory => write!(f, "memory"),
            Engine::Sqlite => write!(f, "sqlite"),
            Engine::Rocksdb => write!(f, "rocksdb"),
        }
    }
}

impl Engine {
    fn driver(self) -> Result<Driver> {
        match self {
            Engine::Kvs => Ok(KvStore::driver()),
            Engine::Sled => Ok(SledStore::driver()),
            Engine::Memory => Ok(MemoryStore::driver()),
            #[cfg(feature = "sqlite")]
            Engine::Sqlite => Ok(gkv::SqliteStore::driver()),
            #[cfg(feature = "rocksdb")]
            Engine::Rocksdb => Ok(gkv::RocksStore::driver()),
            #[allow(unreachable_patterns)]
            other => Err(KvsError::Other(format!(
                "gkv was built without the {} engine",
                other
            ))),
        }
    }

    fn persistent(self) -> bool {
        self != Engine::Memory
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        println!("{}", e);
        exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    debug!("gkv startup args: {:?}", args);
    let driver = args.engine.driver()?;
    let location = match args.path {
        Some(ref path) => path.clone(),
        None => current_dir()?.join(driver.default_location),
    };
    let marker = engine_file(&location)?;
    if args.engine.persistent() {
        check_engine(&marker, args.engine)?;
    }

    let mut db = Gkv::new(Registry::with(driver));
    let table = args.table.as_bytes();
    db.open(table, Some(&location))?;
    if args.engine.persistent() {
        fs::write(&marker, format!("{}", args.engine))?;
    }

    match args.command {
        Command::Put { key, value } => {
            debug!("put key: {}, value: {}", key, value);
            db.put(table, key.as_bytes(), value.as_bytes())?;
        }
        Command::Get { key } => {
            debug!("get key: {}", key);
            match db.lookup(table, key.as_bytes())? {
                Some(value) => println!("{}", codec::display(&value)),
                None => println!("Key not found"),
            }
        }
        Command::Remove { key } => {
            debug!("remove key: {}", key);
            db.delete(table, key.as_bytes())?;
        }
        Command::Count => println!("{}", db.count(table)?),
        Command::Scan { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut seen = 0;
            if limit > 0 {
                db.iterate(table, |k, v| {
                    println!("{}\t{}", codec::display(k), codec::display(v));
                    seen += 1;
                    seen < limit
                })?;
            }
        }
    }

    db.close()
}

/// The marker sits beside the storage location, so every store opened
/// under the same directory shares one engine.
fn engine_file(location: &Path) -> Result<PathBuf> {
    let dir = match location.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => current_dir()?,
    };
    Ok(dir.join("engine"))
}

fn check_engine(engine_file: &Path, target_engine: Engine) -> Result<()> {
    match current_engine(engine_file)? {
        None => {
            debug!("No engine file found, starting with {:?}", target_engine);
            Ok(())
        }
        Some(engine) if engine != target_engine => Err(KvsError::Other(format!(
            "Current engine is {}, but you are trying to start {}",
            engine, target_engine
        ))),
        Some(_) => Ok(()),
    }
}

fn current_engine(engine_file: &Path) -> Result<Option<Engine>> {
    if !engine_file.exists() {
        return Ok(None);
    }

    match fs::read_to_string(engine_file)?.trim().parse() {
        Ok(engine) => Ok(Some(engine)),
        Err(e) => {
            warn!("Failed to parse engine file: {}", e);
            Ok(None)
        }
    }
}
