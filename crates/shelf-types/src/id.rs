//! File identifiers.
//!
//! A [`FileId`] is the only handle a client ever gets for a stored file. It is
//! also used verbatim as the file's name on disk, so the shape is strict:
//! - ASCII letters and digits only
//! - between [`MIN_ID_LEN`] and [`MAX_ID_LEN`] characters
//!
//! Both construction paths ([`FileId::parse`] and [`FileId::generate`])
//! enforce that shape. Code holding a `FileId` can join it onto a directory
//! without further checks.

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Shortest accepted identifier.
pub const MIN_ID_LEN: usize = 6;

/// Longest accepted identifier.
pub const MAX_ID_LEN: usize = 64;

/// Length of identifiers produced by [`FileId::random`].
pub const DEFAULT_ID_LEN: usize = 22;

/// Returns `true` iff `id` is 6 to 64 ASCII letters or digits and nothing else.
///
/// ```
/// use shelf_types::is_valid_id;
///
/// assert!(is_valid_id("abc123"));
/// assert!(!is_valid_id("../etc/passwd"));
/// assert!(!is_valid_id("short"));
/// ```
pub fn is_valid_id(id: &str) -> bool {
    (MIN_ID_LEN..=MAX_ID_LEN).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Identifier of one stored file and its mapping entry.
///
/// Ordering is byte-lexicographic, which for this alphabet sorts digits
/// before upper case before lower case.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Parse an untrusted identifier.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::check(s)?;
        Ok(Self(s.to_string()))
    }

    /// Generate a random identifier of `len` characters.
    ///
    /// Characters are drawn uniformly, with replacement, from `[0-9A-Za-z]`.
    /// The RNG is seeded from OS entropy on every call. Uniqueness is not
    /// guaranteed; callers must check against existing storage.
    pub fn generate(len: usize) -> Result<Self, TypeError> {
        if !(MIN_ID_LEN..=MAX_ID_LEN).contains(&len) {
            return Err(TypeError::InvalidLength {
                min: MIN_ID_LEN,
                max: MAX_ID_LEN,
                actual: len,
            });
        }
        Ok(Self::sample(len))
    }

    /// Generate a random identifier of [`DEFAULT_ID_LEN`] characters.
    pub fn random() -> Self {
        Self::sample(DEFAULT_ID_LEN)
    }

    /// `len` must already be within bounds.
    fn sample(len: usize) -> Self {
        let rng = StdRng::from_entropy();
        Self(
            rng.sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn check(s: &str) -> Result<(), TypeError> {
        if !(MIN_ID_LEN..=MAX_ID_LEN).contains(&s.len()) {
            return Err(TypeError::InvalidId {
                id: s.to_string(),
                reason: format!("length must be {MIN_ID_LEN}..={MAX_ID_LEN}"),
            });
        }
        if let Some(ch) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidId {
                id: s.to_string(),
                reason: format!("contains forbidden character: {ch:?}"),
            });
        }
        Ok(())
    }
}

impl FromStr for FileId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FileId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::check(&s)?;
        Ok(Self(s))
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate identifiers.
///
/// The storage service asks for a fresh candidate on each allocation attempt
/// and checks it against existing files itself.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> FileId;
}

/// Production generator: random identifiers of a fixed length.
#[derive(Clone, Debug)]
pub struct RandomIdGenerator {
    len: usize,
}

impl RandomIdGenerator {
    /// Generator producing identifiers of `len` characters.
    pub fn new(len: usize) -> Result<Self, TypeError> {
        if !(MIN_ID_LEN..=MAX_ID_LEN).contains(&len) {
            return Err(TypeError::InvalidLength {
                min: MIN_ID_LEN,
                max: MAX_ID_LEN,
                actual: len,
            });
        }
        Ok(Self { len })
    }

    pub fn id_len(&self) -> usize {
        self.len
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self {
            len: DEFAULT_ID_LEN,
        }
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> FileId {
        FileId::sample(self.len)
    }
}
