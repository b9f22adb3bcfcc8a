//! Per translation unit indexing fingerprint
//!
//! A [`SourceRecord`] captures what a translation unit looked like the last
//! time it was indexed: the compiler invocation, the primary file's mtime and,
//! for files on disk, the mtime of every file in its include closure.
//!
//! Records built from an editor's unsaved buffer have no stable dependency
//! set. They are a separate variant, so the dependency block is absent in
//! memory and on disk alike.
//!
//! Encoding (little-endian, order significant):
//!
//! ```text
//! args            CompilerArgs encoding
//! last_modified   u64
//! unsaved         u8 (0 or 1)
//! dependencies    u32 count, then [str path, u64 mtime]...   only if unsaved == 0
//! ```

use crate::error::{DecodeError, Error, Result};
use crate::index::args::CompilerArgs;
use crate::index::types::Timestamp;
use crate::utils::{read_str, read_u8, read_u32_le, read_u64_le, write_str, write_u8, write_u32_le, write_u64_le};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Dependency path -> mtime at index time
pub type Dependencies = BTreeMap<PathBuf, Timestamp>;

static NO_DEPENDENCIES: Dependencies = BTreeMap::new();

/// Upper bound on the dependency count accepted when decoding
const MAX_DEPENDENCIES: u32 = 1 << 22;

/// Indexing fingerprint of one translation unit
#[derive(Clone, PartialEq, Eq)]
pub enum SourceRecord {
    /// Indexed from a file on disk
    Saved {
        args: CompilerArgs,
        last_modified: Timestamp,
        dependencies: Dependencies,
    },
    /// Indexed from an in-editor buffer
    Unsaved {
        args: CompilerArgs,
        last_modified: Timestamp,
    },
}

impl SourceRecord {
    pub fn saved(args: CompilerArgs, last_modified: Timestamp, dependencies: Dependencies) -> Self {
        SourceRecord::Saved {
            args,
            last_modified,
            dependencies,
        }
    }

    pub fn unsaved(args: CompilerArgs, last_modified: Timestamp) -> Self {
        SourceRecord::Unsaved {
            args,
            last_modified,
        }
    }

    /// Build from flat fields. With `from_unsaved_file` set, `dependencies`
    /// is discarded.
    pub fn from_parts(
        args: CompilerArgs,
        last_modified: Timestamp,
        dependencies: Dependencies,
        from_unsaved_file: bool,
    ) -> Self {
        if from_unsaved_file {
            Self::unsaved(args, last_modified)
        } else {
            Self::saved(args, last_modified, dependencies)
        }
    }

    pub fn args(&self) -> &CompilerArgs {
        match self {
            SourceRecord::Saved { args, .. } | SourceRecord::Unsaved { args, .. } => args,
        }
    }

    pub fn last_modified(&self) -> Timestamp {
        match self {
            SourceRecord::Saved { last_modified, .. }
            | SourceRecord::Unsaved { last_modified, .. } => *last_modified,
        }
    }

    /// Recorded dependencies; always empty for unsaved records
    pub fn dependencies(&self) -> &Dependencies {
        match self {
            SourceRecord::Saved { dependencies, .. } => dependencies,
            SourceRecord::Unsaved { .. } => &NO_DEPENDENCIES,
        }
    }

    pub fn is_from_unsaved_file(&self) -> bool {
        matches!(self, SourceRecord::Unsaved { .. })
    }

    /// Whether the translation unit has to be parsed again.
    ///
    /// `current_mtime` is the primary file's mtime now; `dependency_mtime`
    /// returns the current mtime of a recorded dependency, or `None` if it can
    /// no longer be found. Unsaved records are always stale.
    pub fn needs_reindex<F>(&self, current_mtime: Timestamp, mut dependency_mtime: F) -> bool
    where
        F: FnMut(&Path) -> Option<Timestamp>,
    {
        match self {
            SourceRecord::Unsaved { .. } => true,
            SourceRecord::Saved {
                last_modified,
                dependencies,
                ..
            } => {
                if current_mtime != *last_modified {
                    return true;
                }
                dependencies
                    .iter()
                    .any(|(path, &recorded)| dependency_mtime(path) != Some(recorded))
            }
        }
    }

    /// Serialize into the table format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf)
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn encode_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.args().encode(writer)?;
        write_u64_le(writer, self.last_modified())?;

        match self {
            SourceRecord::Unsaved { .. } => write_u8(writer, 1)?,
            SourceRecord::Saved { dependencies, .. } => {
                write_u8(writer, 0)?;

                let count = u32::try_from(dependencies.len()).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many dependencies")
                })?;
                write_u32_le(writer, count)?;

                for (path, &mtime) in dependencies {
                    let path = path.to_str().ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            format!("dependency path is not UTF-8: {}", path.display()),
                        )
                    })?;
                    write_str(writer, path)?;
                    write_u64_le(writer, mtime)?;
                }
            }
        }
        Ok(())
    }

    /// Parse the table format. The whole of `bytes` must be one record.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut input = bytes;

        let args = CompilerArgs::decode(&mut input)?;
        let last_modified = read_u64_le(&mut input)?;

        let record = match read_u8(&mut input)? {
            1 => Self::unsaved(args, last_modified),
            0 => {
                let count = read_u32_le(&mut input)?;
                if count > MAX_DEPENDENCIES {
                    return Err(DecodeError::Malformed(format!("dependency count {count}")));
                }

                let mut dependencies = Dependencies::new();
                for _ in 0..count {
                    let path = PathBuf::from(read_str(&mut input)?);
                    let mtime = read_u64_le(&mut input)?;
                    dependencies.insert(path, mtime);
                }
                Self::saved(args, last_modified, dependencies)
            }
            flag => return Err(DecodeError::InvalidFlag(flag)),
        };

        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }
        Ok(record)
    }
}

impl fmt::Debug for SourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRecord")
            .field("args", self.args())
            .field("last_modified", &self.last_modified())
            .field("dependencies", self.dependencies())
            .field("from_unsaved_file", &self.is_from_unsaved_file())
            .finish()
    }
}
