//! Single-slot driver registration.
//!
//! A [`Registry`] remembers exactly one [`Driver`]: the last one registered.
//! Nothing is opened until [`Registry::open`] is called.

use std::env::current_dir;
use std::fmt;
use std::path::Path;

use log::debug;

use crate::{KvsEngine, KvsError, Result};

/// Constructor for a backend instance at a storage location.
pub type OpenFn = fn(&Path) -> Result<Box<dyn KvsEngine>>;

/// A backend factory, as exposed by each adapter's `driver()` function.
#[derive(Clone, Copy)]
pub struct Driver {
    /// Short driver name, e.g. `"sled"`.
    pub name: &'static str,
    /// Location used when the caller passes no path, relative to the current directory.
    pub default_location: &'static str,
    /// Opens the engine. Fails instead of returning a half-initialized instance.
    pub open: OpenFn,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("default_location", &self.default_location)
            .finish()
    }
}

/// Holds the most recently registered driver.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    driver: Option<Driver>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry { driver: None }
    }

    /// Creates a registry with `driver` already registered.
    pub fn with(driver: Driver) -> Self {
        Registry {
            driver: Some(driver),
        }
    }

    /// Registers a driver. Only the last one takes effect.
    pub fn register(&mut self, driver: Driver) {
        if let Some(old) = self.driver.replace(driver) {
            debug!("driver {} replaced by {}", old.name, driver.name);
        }
    }

    /// The registered driver, if any.
    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    /// Name of the registered driver, if any.
    pub fn name(&self) -> Option<&'static str> {
        self.driver.map(|d| d.name)
    }

    /// Instantiates the registered driver at `path`, or at its default
    /// location under the current directory.
    pub fn open(&self, path: Option<&Path>) -> Result<Box<dyn KvsEngine>> {
        let driver = self.driver.ok_or(KvsError::NoDriver)?;
        let engine = match path {
            Some(p) => (driver.open)(p)?,
            None => (driver.open)(&current_dir()?.join(driver.default_location))?,
        };
        debug!("driver {} opened", driver.name);
        Ok(engine)
    }
}
