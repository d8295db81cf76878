//! Public image identifiers
//!
//! An [`ImageId`] is an 8 character token over `[a-z0-9]`. Parsing is the
//! only way to build one from untrusted input, so anything holding an
//! `ImageId` has already passed the shape check.

use crate::{Error, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub const ID_LENGTH: usize = 8;
pub const ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    /// Validate `raw` as an identifier. Case-sensitive: uppercase is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != ID_LENGTH || !raw.bytes().all(|b| ID_ALPHABET.contains(&b)) {
            return Err(Error::MalformedIdentifier);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ImageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

/// Source of fresh identifiers. Uniqueness is not promised; the stores
/// enforce it and the publish path retries on collision.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> ImageId;
}

/// Uniform draws from [`ID_ALPHABET`] using the OS-seeded thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> ImageId {
        let mut rng = thread_rng();
        let token: String = (0..ID_LENGTH)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        ImageId(token)
    }
}

/// Hands out a fixed script of identifiers, then falls back to random ones.
#[derive(Clone, Default)]
pub struct ScriptedIdGenerator {
    script: Arc<Mutex<VecDeque<ImageId>>>,
}

impl ScriptedIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `raw` as the next identifier. Panics on a malformed token since
    /// scripts are written by hand in tests.
    pub fn with_id(self, raw: &str) -> Self {
        let id = ImageId::parse(raw).unwrap_or_else(|_| panic!("bad scripted id {:?}", raw));
        self.script.lock().unwrap().push_back(id);
        self
    }
}

impl IdGenerator for ScriptedIdGenerator {
    fn generate(&self) -> ImageId {
        match self.script.lock().unwrap().pop_front() {
            Some(id) => id,
            None => RandomIdGenerator.generate(),
        }
    }
}
