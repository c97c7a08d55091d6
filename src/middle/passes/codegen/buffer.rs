//! 字节缓冲区
//!
//! 写端 [`BytecodeBuffer`] 负责小端序编码和段长度回填；
//! 读端 [`ByteReader`] 是解码时的游标，越界时返回错误而不是 panic。

use super::bytecode::BytecodeError;

/// 编码缓冲区
#[derive(Debug, Default, Clone)]
pub struct BytecodeBuffer {
    bytes: Vec<u8>,
}

impl BytecodeBuffer {
    /// 创建新的缓冲区
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn put_u8(
        &mut self,
        value: u8,
    ) {
        self.bytes.push(value);
    }

    pub fn put_u16(
        &mut self,
        value: u16,
    ) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(
        &mut self,
        value: u32,
    ) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(
        &mut self,
        value: u64,
    ) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(
        &mut self,
        value: i64,
    ) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(
        &mut self,
        value: f64,
    ) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(
        &mut self,
        bytes: &[u8],
    ) {
        self.bytes.extend_from_slice(bytes);
    }

    /// 长度前缀 + 长度，超出 u32 时报错
    pub fn put_len(
        &mut self,
        len: usize,
        what: &'static str,
    ) -> Result<(), BytecodeError> {
        let len = u32::try_from(len).map_err(|_| BytecodeError::Overflow { what })?;
        self.put_u32(len);
        Ok(())
    }

    /// `len:u32 utf8`
    pub fn put_str(
        &mut self,
        s: &str,
    ) -> Result<(), BytecodeError> {
        self.put_len(s.len(), "string length")?;
        self.put_bytes(s.as_bytes());
        Ok(())
    }

    /// 开始一个长度前缀段，返回长度字段的位置
    pub fn begin_section(&mut self) -> usize {
        let at = self.bytes.len();
        self.put_u32(0);
        at
    }

    /// 结束段，把段长度回填到 `at`
    pub fn end_section(
        &mut self,
        at: usize,
        what: &'static str,
    ) -> Result<(), BytecodeError> {
        let payload = self.bytes.len() - at - 4;
        let len = u32::try_from(payload).map_err(|_| BytecodeError::Overflow { what })?;
        self.bytes[at..at + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// 解码游标
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// 在整个文件中的起始偏移，仅用于错误信息
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    pub fn with_base(
        bytes: &'a [u8],
        base: usize,
    ) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
        }
    }

    /// 当前在文件中的偏移
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(
        &mut self,
        n: usize,
    ) -> Result<&'a [u8], BytecodeError> {
        if self.remaining() < n {
            return Err(BytecodeError::Truncated {
                offset: self.offset(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], BytecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn u8(&mut self) -> Result<u8, BytecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, BytecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn u32(&mut self) -> Result<u32, BytecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn u64(&mut self) -> Result<u64, BytecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn i64(&mut self) -> Result<i64, BytecodeError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn f64(&mut self) -> Result<f64, BytecodeError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn str(&mut self) -> Result<String, BytecodeError> {
        let len = self.u32()? as usize;
        let offset = self.offset();
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BytecodeError::InvalidUtf8 { offset })
    }

    /// 读取一个长度前缀段，返回段内容的子游标
    pub fn section(&mut self) -> Result<ByteReader<'a>, BytecodeError> {
        let len = self.u32()? as usize;
        let base = self.offset();
        let payload = self.take(len)?;
        Ok(ByteReader::with_base(payload, base))
    }

    /// 段内容必须被完整消费
    pub fn finish(
        &self,
        what: &'static str,
    ) -> Result<(), BytecodeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BytecodeError::TrailingBytes {
                what,
                offset: self.offset(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_backpatch() {
        let mut buffer = BytecodeBuffer::new();
        let at = buffer.begin_section();
        buffer.put_u16(7);
        buffer.put_str("ab").unwrap();
        buffer.end_section(at, "test").unwrap();
        assert_eq!(&buffer.as_slice()[..4], &8u32.to_le_bytes());

        let bytes = buffer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        let mut section = reader.section().unwrap();
        assert_eq!(section.u16().unwrap(), 7);
        assert_eq!(section.str().unwrap(), "ab");
        assert!(section.finish("test").is_ok());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_read() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert!(matches!(
            reader.u32(),
            Err(BytecodeError::Truncated { offset: 0 })
        ));
    }
}
