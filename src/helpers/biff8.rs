//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Reader and writer for the record stream of Excel 97-2003 workbooks (.xls files)
//! Handles the record-based structure with continuation records

use crate::error::SplitterError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use thiserror::Error;

pub(crate) const CONTINUE: u16 = 60;
pub(crate) const SST: u16 = 252;

/// Largest record payload a BIFF8 reader accepts; longer data goes into CONTINUE records.
pub(crate) const MAX_RECORD_SIZE: usize = 8224;

/// Errors specific to BIFF8 record handling
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),

    #[error("Record 0x{0:04X} has {1} bytes, more than a record can hold")]
    RecordSizeError(u16, usize),
}

/// Reader for BIFF8 (Excel 97-2003) binary format
/// Handles the record-based structure with continuation records
pub(crate) struct Biff8Reader {
    buffer: Vec<u8>,
    pointer: usize, // Next read position in buffer
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,  // Current chunk index
    offset: usize, // Offset within current chunk
}

impl Biff8Reader {
    /// Creates a new BIFF8 reader with the given data buffer
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Reads the next record type and prepares for reading record data
    /// Returns None when no more records are available
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SplitterError> {
        if self.pointer + 4 <= self.buffer.len() {
            self.index = 0;
            self.offset = 0;

            let kind = self.get_u16_at(self.pointer)?;
            let size = self.get_u16_at(self.pointer + 2)? as usize;
            let mut lower = self.pointer + 4;
            let mut upper = (lower + size).min(self.buffer.len());
            self.pointer = upper;

            self.chunks.clear();
            self.chunks.push((lower, upper));
            while self.pointer + 4 <= self.buffer.len()
                && self.get_u16_at(self.pointer)? == CONTINUE
            {
                let size = self.get_u16_at(self.pointer + 2)? as usize;
                lower = self.pointer + 4;
                upper = (lower + size).min(self.buffer.len());
                self.pointer = upper;
                self.chunks.push((lower, upper));
            }

            Ok(Some(kind))
        } else {
            Ok(None)
        }
    }

    /// Sets the reader pointer to a specific position
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    /// Reads exactly `length` bytes from the current chunk, returning an error if insufficient data
    fn read_extract(&mut self, length: usize) -> Result<&[u8], SplitterError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Reads up to `length` bytes from the current chunk
    /// Returns the data slice and actual number of bytes read
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index) {
            let source = (*upper).min(*lower + self.offset);
            let target = (*upper).min(source + length);
            let size = target - source;
            if source < *upper {
                if target == *upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    /// Skips `length` bytes, crossing into continuation records when needed
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SplitterError> {
        let mut remaining = length;
        while remaining > 0 {
            let (_, size) = self.read(remaining);
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            remaining -= size;
        }
        Ok(())
    }

    /// Reads a single byte
    pub(crate) fn read_u8(&mut self) -> Result<u8, SplitterError> {
        self.read_extract(1).map(|data| data[0])
    }

    /// Reads a 16-bit unsigned integer
    pub(crate) fn read_u16(&mut self) -> Result<u16, SplitterError> {
        self.read_extract(2).map(to_u16)
    }

    /// Gets a 16-bit unsigned integer from the specified offset from the end
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, SplitterError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                let index = *upper - offset;
                return self.get_u16_at(index);
            } else {
                offset -= *upper - *lower;
            }
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    /// Gets a 16-bit unsigned integer from the specified absolute position
    pub(crate) fn get_u16_at(&self, index: usize) -> Result<u16, SplitterError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::NoEnoughDataError(2))?
        }
    }

    /// Reads a 32-bit unsigned integer
    pub(crate) fn read_u32(&mut self) -> Result<u32, SplitterError> {
        self.read_extract(4).map(to_u32)
    }

    /// Reads a usize value
    pub(crate) fn read_usize(&mut self) -> Result<usize, SplitterError> {
        self.read_extract(4).map(to_usize)
    }

    /// Reads a 64-bit unsigned integer
    pub(crate) fn read_u64(&mut self) -> Result<u64, SplitterError> {
        self.read_extract(8).map(to_u64)
    }

    /// Reads a 64-bit floating point number
    pub(crate) fn read_f64(&mut self) -> Result<f64, SplitterError> {
        self.read_extract(8).map(to_f64)
    }

    /// Reads an RK number (compressed numeric format used in Excel)
    /// RK numbers can store integers or floats with optional percentage formatting
    pub(crate) fn read_rk_number(&mut self) -> Result<String, SplitterError> {
        let value = self.read_u32()?;
        let is_percentage = (value & 0x01) != 0;
        let is_integer = (value & 0x02) != 0;

        let mut value = if is_integer {
            ((value as i32) >> 2) as f64
        } else {
            f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
        };
        if is_percentage {
            value /= 100.0;
        }
        Ok(value.to_string())
    }

    /// Reads a short Unicode string (1-byte length prefix)
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SplitterError> {
        let chars = self.read_u8()? as usize;
        let flag = self.read_u8()?;
        self.read_chars(chars, flag)
    }

    /// Reads a Unicode string (2-byte length prefix)
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SplitterError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        self.read_chars(chars, flag)
    }

    /// Reads a rich extended Unicode string, skipping formatting runs and phonetic data
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SplitterError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let rich_string_count = if (flag & 0x8) > 0 { // is_rich_string
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_count = if (flag & 0x4) > 0 { // contains_phonetic
            self.read_usize()?
        } else {
            0
        };
        let string = self.read_chars(chars, flag)?;
        // Skip rgRun
        self.skip(4 * rich_string_count)?;
        // Skip ExtRst
        self.skip(phonetic_count)?;
        Ok(string)
    }

    /// Reads `chars` characters; character data continued into the next chunk
    /// starts over with its own flag byte.
    fn read_chars(&mut self, chars: usize, flag: u8) -> Result<String, SplitterError> {
        let mut string = String::with_capacity(chars);
        let mut is_high_byte = (flag & 0x1) > 0;
        let mut remaining = chars;
        loop {
            remaining -= self.read_chars_into(remaining, is_high_byte, &mut string);
            if remaining == 0 {
                break;
            }
            is_high_byte = (self.read_u8()? & 0x1) > 0;
        }
        Ok(string)
    }

    /// Reads as many of `chars` characters as the current chunk holds into `content`
    fn read_chars_into(&mut self, chars: usize, is_high_byte: bool, content: &mut String) -> usize {
        let (bytes, actual) = self.read(Self::chars_to_bytes(is_high_byte, chars));
        if is_high_byte {
            let (string, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(bytes);
            content.push_str(&string);
        } else {
            // Compressed strings keep the low byte of each UTF-16 code unit
            content.extend(bytes.iter().map(|byte| char::from(*byte)));
        }
        Self::bytes_to_chars(is_high_byte, actual)
    }

    /// Converts character count to byte count based on encoding
    #[inline]
    fn chars_to_bytes(is_high_byte: bool, chars: usize) -> usize {
        if is_high_byte { chars << 1 } else { chars }
    }

    /// Converts byte count to character count based on encoding
    #[inline]
    fn bytes_to_chars(is_high_byte: bool, bytes: usize) -> usize {
        if is_high_byte { bytes >> 1 } else { bytes }
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

/// Encodes a string as BIFF8 character data.
/// Returns the flag byte (0 compressed, 1 UTF-16), the character count and the bytes.
pub(crate) fn encode_xl_chars(string: &str) -> (u8, usize, Vec<u8>) {
    let units: Vec<u16> = string.encode_utf16().collect();
    if units.iter().all(|unit| *unit <= 0xFF) {
        let bytes = units.iter().map(|unit| *unit as u8).collect();
        (0, units.len(), bytes)
    } else {
        let bytes = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
        (1, units.len(), bytes)
    }
}

/// Appends a ShortXLUnicodeString: `[cch: u8][flag: u8][chars]`.
/// Callers keep `string` under 256 UTF-16 units.
pub(crate) fn write_short_xl_unicode_string(out: &mut Vec<u8>, string: &str) {
    let (flag, chars, bytes) = encode_xl_chars(string);
    out.push(chars as u8);
    out.push(flag);
    out.extend_from_slice(&bytes);
}

/// Writer for a BIFF8 record stream
pub(crate) struct Biff8Writer {
    buffer: Vec<u8>,
}

impl Biff8Writer {
    pub(crate) fn new() -> Biff8Writer {
        Biff8Writer { buffer: Vec::new() }
    }

    /// Stream offset at which the next record starts
    pub(crate) fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Appends one record
    pub(crate) fn write_record(&mut self, kind: u16, data: &[u8]) -> Result<(), Biff8Error> {
        if data.len() > MAX_RECORD_SIZE {
            return Err(Biff8Error::RecordSizeError(kind, data.len()));
        }
        self.buffer.extend_from_slice(&kind.to_le_bytes());
        self.buffer.extend_from_slice(&(data.len() as u16).to_le_bytes());
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Overwrites four bytes at `position`, used for offsets only known after later records
    pub(crate) fn patch_u32(&mut self, position: usize, value: u32) {
        self.buffer[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes the shared string table, spilling into CONTINUE records.
    ///
    /// A string header (`cch`, flag) is never split from its first character. Character
    /// data carried into a CONTINUE record is preceded by a fresh flag byte.
    pub(crate) fn write_shared_strings(
        &mut self,
        total: usize,
        strings: &[String],
    ) -> Result<(), Biff8Error> {
        let mut kind = SST;
        let mut record = Vec::<u8>::with_capacity(MAX_RECORD_SIZE);
        record.extend_from_slice(&(total as u32).to_le_bytes());
        record.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for string in strings {
            let (flag, chars, bytes) = encode_xl_chars(string);
            let unit = if flag == 0 { 1 } else { 2 };
            let first = if chars > 0 { unit } else { 0 };
            if record.len() + 3 + first > MAX_RECORD_SIZE {
                self.write_record(kind, &record)?;
                record.clear();
                kind = CONTINUE;
            }
            record.extend_from_slice(&(chars as u16).to_le_bytes());
            record.push(flag);
            let mut written = 0usize;
            loop {
                let room = (MAX_RECORD_SIZE - record.len()) / unit;
                let take = room.min(chars - written);
                record.extend_from_slice(&bytes[written * unit..(written + take) * unit]);
                written += take;
                if written == chars {
                    break;
                }
                self.write_record(kind, &record)?;
                record.clear();
                kind = CONTINUE;
                record.push(flag);
            }
        }
        self.write_record(kind, &record)
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
