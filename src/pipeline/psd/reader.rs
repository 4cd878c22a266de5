//! Big-endian cursor over a PSD byte slice.
//!
//! Every read is bounds-checked and fails with [`ParseError::Truncated`]
//! naming the section being decoded and the absolute file offset, so a
//! damaged file reports *where* it is damaged rather than panicking.

use crate::error::ParseError;

#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Absolute offset of `buf[0]` in the file, for error messages.
    base: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
            context: "file header",
        }
    }

    /// Name the section subsequent reads belong to.
    pub fn enter(&mut self, context: &'static str) {
        self.context = context;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, needed: usize) -> ParseError {
        ParseError::Truncated {
            context: self.context,
            offset: self.base + self.pos,
            needed,
        }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.take(n).map(|_| ())
    }

    /// Split off the next `n` bytes as an independent reader and advance past them.
    pub fn sub(&mut self, n: usize, context: &'static str) -> Result<Reader<'a>, ParseError> {
        let base = self.base + self.pos;
        let buf = self.take(n)?;
        Ok(Reader {
            buf,
            pos: 0,
            base,
            context,
        })
    }

    /// Look at the next `N` bytes without consuming them.
    pub fn peek<const N: usize>(&self) -> Option<[u8; N]> {
        self.buf
            .get(self.pos..self.pos + N)
            .and_then(|s| s.try_into().ok())
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ParseError> {
        self.array().map(u16::from_be_bytes)
    }

    pub fn i16(&mut self) -> Result<i16, ParseError> {
        self.array().map(i16::from_be_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, ParseError> {
        self.array().map(u32::from_be_bytes)
    }

    pub fn i32(&mut self) -> Result<i32, ParseError> {
        self.array().map(i32::from_be_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, ParseError> {
        self.array().map(u64::from_be_bytes)
    }

    pub fn i64(&mut self) -> Result<i64, ParseError> {
        self.array().map(i64::from_be_bytes)
    }

    pub fn f64(&mut self) -> Result<f64, ParseError> {
        self.array().map(f64::from_be_bytes)
    }

    /// Section length: 4 bytes in PSD, 8 bytes in PSB.
    pub fn length(&mut self, large: bool) -> Result<usize, ParseError> {
        let len = if large { self.u64()? } else { u64::from(self.u32()?) };
        usize::try_from(len).map_err(|_| self.truncated(usize::MAX))
    }

    /// Length-prefixed section as a sub-reader.
    pub fn section(&mut self, large: bool, context: &'static str) -> Result<Reader<'a>, ParseError> {
        self.enter(context);
        let len = self.length(large)?;
        self.sub(len, context)
    }

    /// Pascal string padded so that length byte + text is a multiple of `pad`.
    pub fn pascal_string(&mut self, pad: usize) -> Result<String, ParseError> {
        let len = usize::from(self.u8()?);
        let text = self.take(len)?;
        let used = len + 1;
        let padded = used.div_ceil(pad) * pad;
        self.skip(padded - used)?;
        Ok(text.iter().map(|&b| char::from(b)).collect())
    }

    /// `u32` count of UTF-16BE code units followed by the units.
    pub fn unicode_string(&mut self) -> Result<String, ParseError> {
        let units = self.u32()? as usize;
        let bytes = self.take(units.saturating_mul(2))?;
        let decoded: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let mut s = String::from_utf16_lossy(&decoded);
        while s.ends_with('\0') {
            s.pop();
        }
        Ok(s)
    }

    /// Descriptor key or class id: length-prefixed, where length 0 means four bytes.
    pub fn key(&mut self) -> Result<String, ParseError> {
        let len = self.u32()? as usize;
        let n = if len == 0 { 4 } else { len };
        let bytes = self.take(n)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
