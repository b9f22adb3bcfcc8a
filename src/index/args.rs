use crate::error::DecodeError;
use crate::index::types::Language;
use crate::utils::{read_str, read_u16_le, read_u32_le, write_str, write_u16_le, write_u32_le};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound on the argument count accepted when decoding
const MAX_ARGUMENTS: u32 = 1 << 20;

/// A compiler invocation as recorded for one translation unit.
///
/// Opaque to the reindex logic: it is only compared for equality and
/// carried through the record encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilerArgs {
    pub compiler: PathBuf,
    pub language: Language,
    pub arguments: Vec<String>,
}

impl CompilerArgs {
    /// Build arguments for `source`, detecting its language from the extension
    pub fn new(compiler: impl Into<PathBuf>, source: &Path, arguments: Vec<String>) -> Self {
        let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self {
            compiler: compiler.into(),
            language: Language::from_extension(ext),
            arguments,
        }
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let compiler = self.compiler.to_str().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "compiler path is not UTF-8")
        })?;
        write_str(writer, compiler)?;
        write_u16_le(writer, self.language as u16)?;

        let count = u32::try_from(self.arguments.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many arguments"))?;
        write_u32_le(writer, count)?;
        for arg in &self.arguments {
            write_str(writer, arg)?;
        }
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let compiler = PathBuf::from(read_str(reader)?);
        let language = Language::from_u16(read_u16_le(reader)?);

        let count = read_u32_le(reader)?;
        if count > MAX_ARGUMENTS {
            return Err(DecodeError::Malformed(format!("argument count {count}")));
        }
        let arguments = (0..count)
            .map(|_| read_str(reader))
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            compiler,
            language,
            arguments,
        })
    }
}
