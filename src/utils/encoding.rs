use std::io::{self, Read, Write};

/// Longest byte string `write_bytes` emits and `read_bytes` accepts.
/// A larger length prefix on read is treated as corruption.
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

/// Write a u8
pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> io::Result<()> {
    writer.write_all(&[value])
}

/// Read a u8
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Write a u16 in little-endian format
pub fn write_u16_le<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u16 in little-endian format
pub fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a length-prefixed byte string (u32 length, then bytes)
pub fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    if bytes.len() > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("byte string of {} bytes exceeds {MAX_FIELD_LEN}", bytes.len()),
        ));
    }
    write_u32_le(writer, bytes.len() as u32)?;
    writer.write_all(bytes)
}

/// Read a length-prefixed byte string
pub fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32_le(reader)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "byte string length out of range",
        ));
    }

    // Grow through `take` so a bogus length on a short input fails with
    // UnexpectedEof instead of allocating the full claimed size.
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(buf)
}

/// Write a length-prefixed UTF-8 string
pub fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    write_bytes(writer, value.as_bytes())
}

/// Read a length-prefixed UTF-8 string
pub fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_bytes(reader)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_roundtrip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "/usr/include/stdio.h").unwrap();
        write_str(&mut buf, "").unwrap();

        let mut input = buf.as_slice();
        assert_eq!(read_str(&mut input).unwrap(), "/usr/include/stdio.h");
        assert_eq!(read_str(&mut input).unwrap(), "");
        assert!(input.is_empty());
    }

    #[test]
    fn test_truncated_string_is_eof() {
        let mut buf = Vec::new();
        write_str(&mut buf, "hello").unwrap();
        buf.truncate(buf.len() - 2);

        let err = read_str(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_huge_length_rejected() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, u32::MAX).unwrap();

        let err = read_bytes(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_write_rejected() {
        let big = vec![0u8; MAX_FIELD_LEN + 1];
        let mut buf = Vec::new();

        let err = write_bytes(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());

        let exact = vec![7u8; MAX_FIELD_LEN];
        write_bytes(&mut buf, &exact).unwrap();
        assert_eq!(read_bytes(&mut buf.as_slice()).unwrap().len(), MAX_FIELD_LEN);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[0xff, 0xfe]).unwrap();

        let err = read_str(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
