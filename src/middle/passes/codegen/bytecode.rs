//! 字节码文件格式
//!
//! 版本 1，全部小端序：
//!
//! ```text
//! header   := magic[4] version:u32 flags:u32 timestamp:u64 checksum:u32   (24 字节)
//! body     := section(globals) section(constants) section(functions)
//! section  := byte_len:u32 payload
//! globals  := count:u32 { str }
//! consts   := count:u32 { tag:u8 value }
//!             tag 0 int(i64) | 1 float(f64) | 2 str | 3 bool(u8) | 4 none
//! funcs    := entry:u32 count:u32 { fn_len:u32 str arity:u16 locals:u32 n:u32 { instr } }
//! instr    := opcode:u8 n:u8 { operand } line:u32
//! operand  := tag:u8 payload
//!             tag 0 int(i64) | 1 float(f64) | 2 const(u32) | 3 target(u32) | 4 resource(u64)
//! str      := len:u32 utf8
//! ```
//!
//! 校验和是 body 的 CRC32，在 body 完整序列化之后计算并回填到头部的 20..24 字节，
//! 头部自身不参与校验。

use smallvec::SmallVec;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::buffer::{ByteReader, BytecodeBuffer};
use super::opcode::Opcode;
use crate::middle::core::ir::Constant;

/// 文件魔数
pub const MAGIC: [u8; 4] = *b"ENTB";
/// 格式版本
pub const VERSION: u32 = 1;
/// 头部长度
pub const HEADER_SIZE: usize = 24;
/// 校验和在头部中的位置
const CHECKSUM_OFFSET: usize = 20;

/// 包含逐条指令的源码行表
pub const FLAG_DEBUG_LINES: u32 = 0x1;
/// 经过优化流水线
pub const FLAG_OPTIMIZED: u32 = 0x2;

/// 字节码编解码错误
#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("bad magic {found:?}, expected {:?}", MAGIC)]
    BadMagic { found: [u8; 4] },

    #[error("unsupported bytecode version {0}")]
    UnsupportedVersion(u32),

    #[error("checksum mismatch: header says {expected:#010x}, body hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("unknown {what} tag {tag} at offset {offset}")]
    BadTag {
        what: &'static str,
        tag: u8,
        offset: usize,
    },

    #[error("invalid utf-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{what} section has trailing bytes at offset {offset}")]
    TrailingBytes { what: &'static str, offset: usize },

    #[error("entry index {entry} out of range ({count} functions)")]
    BadEntry { entry: u32, count: usize },

    #[error("{what} does not fit the encoding")]
    Overflow { what: &'static str },

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 字节码操作数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BytecodeOperand {
    Int(i64),
    Float(f64),
    /// 常量池下标
    Const(u32),
    /// 函数内指令下标
    Target(u32),
    Resource(u64),
}

impl BytecodeOperand {
    fn tag(&self) -> u8 {
        match self {
            BytecodeOperand::Int(_) => 0,
            BytecodeOperand::Float(_) => 1,
            BytecodeOperand::Const(_) => 2,
            BytecodeOperand::Target(_) => 3,
            BytecodeOperand::Resource(_) => 4,
        }
    }
}

impl fmt::Display for BytecodeOperand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            BytecodeOperand::Int(v) => write!(f, "{}", v),
            BytecodeOperand::Float(v) => write!(f, "{:?}", v),
            BytecodeOperand::Const(idx) => write!(f, "#{}", idx),
            BytecodeOperand::Target(idx) => write!(f, "@{}", idx),
            BytecodeOperand::Resource(id) => write!(f, "q{}", id),
        }
    }
}

/// 字节码指令
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeInstruction {
    pub opcode: Opcode,
    pub operands: SmallVec<[BytecodeOperand; 3]>,
}

impl BytecodeInstruction {
    pub fn new(
        opcode: Opcode,
        operands: impl IntoIterator<Item = BytecodeOperand>,
    ) -> Self {
        Self {
            opcode,
            operands: operands.into_iter().collect(),
        }
    }
}

impl fmt::Display for BytecodeInstruction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let operands: Vec<String> = self.operands.iter().map(|o| o.to_string()).collect();
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

/// 字节码函数
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeFunction {
    pub name: String,
    pub arity: u16,
    pub local_count: u32,
    pub instructions: Vec<BytecodeInstruction>,
    /// 与 `instructions` 一一对应的源码行
    pub lines: Vec<u32>,
}

/// 字节码模块
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeModule {
    pub globals: Vec<String>,
    pub constants: Vec<Constant>,
    pub functions: Vec<BytecodeFunction>,
    /// 入口函数在 `functions` 中的下标
    pub entry: u32,
}

impl BytecodeModule {
    /// 入口函数
    pub fn entry_function(&self) -> Option<&BytecodeFunction> {
        self.functions.get(self.entry as usize)
    }

    /// 按名称查找函数
    pub fn function(
        &self,
        name: &str,
    ) -> Option<&BytecodeFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// 文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub flags: u32,
    /// 构建时间（Unix 秒）
    pub timestamp: u64,
    pub checksum: u32,
}

impl FileHeader {
    pub fn new(
        flags: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags,
            timestamp,
            checksum: 0,
        }
    }

    fn encode(
        &self,
        buffer: &mut BytecodeBuffer,
    ) {
        buffer.put_bytes(&self.magic);
        buffer.put_u32(self.version);
        buffer.put_u32(self.flags);
        buffer.put_u64(self.timestamp);
        buffer.put_u32(self.checksum);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, BytecodeError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(reader.take(4)?);
        if magic != MAGIC {
            return Err(BytecodeError::BadMagic { found: magic });
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(BytecodeError::UnsupportedVersion(version));
        }
        Ok(Self {
            magic,
            version,
            flags: reader.u32()?,
            timestamp: reader.u64()?,
            checksum: reader.u32()?,
        })
    }
}

/// 字节码文件
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeFile {
    pub header: FileHeader,
    pub module: BytecodeModule,
}

impl BytecodeFile {
    pub fn new(
        header: FileHeader,
        module: BytecodeModule,
    ) -> Self {
        Self { header, module }
    }

    pub fn has_flag(
        &self,
        flag: u32,
    ) -> bool {
        self.header.flags & flag != 0
    }

    /// 序列化 body（不含头部）
    pub fn encode_body(&self) -> Result<Vec<u8>, BytecodeError> {
        let mut buffer = BytecodeBuffer::new();
        let module = &self.module;

        let at = buffer.begin_section();
        buffer.put_len(module.globals.len(), "global count")?;
        for name in &module.globals {
            buffer.put_str(name)?;
        }
        buffer.end_section(at, "globals section")?;

        let at = buffer.begin_section();
        buffer.put_len(module.constants.len(), "constant count")?;
        for constant in &module.constants {
            encode_constant(&mut buffer, constant)?;
        }
        buffer.end_section(at, "constants section")?;

        let at = buffer.begin_section();
        buffer.put_u32(module.entry);
        buffer.put_len(module.functions.len(), "function count")?;
        for function in &module.functions {
            encode_function(&mut buffer, function)?;
        }
        buffer.end_section(at, "functions section")?;

        Ok(buffer.into_bytes())
    }

    /// 完整序列化；校验和根据 body 重新计算
    pub fn to_bytes(&self) -> Result<Vec<u8>, BytecodeError> {
        let body = self.encode_body()?;
        let mut buffer = BytecodeBuffer::new();
        self.header.encode(&mut buffer);
        buffer.put_bytes(&body);

        let mut bytes = buffer.into_bytes();
        let checksum = crc32fast::hash(&bytes[HEADER_SIZE..]);
        bytes[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    /// 序列化并把校验和写回内存中的头部
    pub fn seal(&mut self) -> Result<Vec<u8>, BytecodeError> {
        let bytes = self.to_bytes()?;
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&bytes[CHECKSUM_OFFSET..HEADER_SIZE]);
        self.header.checksum = u32::from_le_bytes(checksum);
        Ok(bytes)
    }

    /// 解码：先校验魔数与版本，再校验校验和，最后解析 body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BytecodeError> {
        let mut reader = ByteReader::new(bytes);
        let header = FileHeader::decode(&mut reader)?;
        verify_checksum(bytes)?;

        let mut globals_section = reader.section()?;
        let count = globals_section.u32()?;
        let mut globals = Vec::new();
        for _ in 0..count {
            globals.push(globals_section.str()?);
        }
        globals_section.finish("globals")?;

        let mut constants_section = reader.section()?;
        let count = constants_section.u32()?;
        let mut constants = Vec::new();
        for _ in 0..count {
            constants.push(decode_constant(&mut constants_section)?);
        }
        constants_section.finish("constants")?;

        let mut functions_section = reader.section()?;
        let entry = functions_section.u32()?;
        let count = functions_section.u32()?;
        let mut functions = Vec::new();
        for _ in 0..count {
            functions.push(decode_function(&mut functions_section)?);
        }
        functions_section.finish("functions")?;
        reader.finish("body")?;

        if entry as usize >= functions.len() {
            return Err(BytecodeError::BadEntry {
                entry,
                count: functions.len(),
            });
        }

        Ok(Self {
            header,
            module: BytecodeModule {
                globals,
                constants,
                functions,
                entry,
            },
        })
    }

    /// 原子写入：先完整序列化，再写入同目录的临时文件并 persist
    ///
    /// 任何一步失败都不会在 `path` 留下文件。
    pub fn write_to_path(
        &self,
        path: &Path,
    ) -> Result<(), BytecodeError> {
        let bytes = self.to_bytes()?;
        let io_err = |source: std::io::Error| BytecodeError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(path).map_err(|err| io_err(err.error))?;

        debug!("Wrote {} bytes of bytecode to {}", bytes.len(), path.display());
        Ok(())
    }

    /// 反汇编文本
    pub fn disassemble(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BytecodeFile {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let header = &self.header;
        writeln!(f, "--- Header ---")?;
        writeln!(f, "Magic: {}", String::from_utf8_lossy(&header.magic))?;
        writeln!(f, "Version: {}", header.version)?;
        writeln!(f, "Flags: {:#010x}", header.flags)?;
        writeln!(f, "Timestamp: {}", header.timestamp)?;
        writeln!(f, "Checksum: {:#010x}", header.checksum)?;

        writeln!(f, "--- Globals ({}) ---", self.module.globals.len())?;
        for (i, name) in self.module.globals.iter().enumerate() {
            writeln!(f, "  [{}] {}", i, name)?;
        }
        writeln!(f, "--- Constants ({}) ---", self.module.constants.len())?;
        for (i, constant) in self.module.constants.iter().enumerate() {
            writeln!(f, "  [{}] {}", i, constant)?;
        }
        writeln!(f, "--- Functions ({}) ---", self.module.functions.len())?;
        for (i, function) in self.module.functions.iter().enumerate() {
            let entry = if i as u32 == self.module.entry {
                " (entry)"
            } else {
                ""
            };
            writeln!(
                f,
                "{}{}: arity={}, locals={}, instructions={}",
                function.name,
                entry,
                function.arity,
                function.local_count,
                function.instructions.len()
            )?;
            for (j, instr) in function.instructions.iter().enumerate() {
                let line = function.lines.get(j).copied().unwrap_or(0);
                writeln!(f, "  [{:3}] {:<32} ; line {}", j, instr.to_string(), line)?;
            }
        }
        Ok(())
    }
}

/// 校验 body 的 CRC32 与头部记录是否一致
pub fn verify_checksum(bytes: &[u8]) -> Result<(), BytecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(BytecodeError::Truncated {
            offset: bytes.len(),
        });
    }
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&bytes[CHECKSUM_OFFSET..HEADER_SIZE]);
    let expected = u32::from_le_bytes(stored);
    let actual = crc32fast::hash(&bytes[HEADER_SIZE..]);
    if expected == actual {
        Ok(())
    } else {
        Err(BytecodeError::ChecksumMismatch { expected, actual })
    }
}

fn encode_constant(
    buffer: &mut BytecodeBuffer,
    constant: &Constant,
) -> Result<(), BytecodeError> {
    match constant {
        Constant::Int(v) => {
            buffer.put_u8(0);
            buffer.put_i64(*v);
        }
        Constant::Float(v) => {
            buffer.put_u8(1);
            buffer.put_f64(*v);
        }
        Constant::Str(s) => {
            buffer.put_u8(2);
            buffer.put_str(s)?;
        }
        Constant::Bool(b) => {
            buffer.put_u8(3);
            buffer.put_u8(u8::from(*b));
        }
        Constant::None => buffer.put_u8(4),
    }
    Ok(())
}

fn decode_constant(reader: &mut ByteReader<'_>) -> Result<Constant, BytecodeError> {
    let offset = reader.offset();
    match reader.u8()? {
        0 => Ok(Constant::Int(reader.i64()?)),
        1 => Ok(Constant::Float(reader.f64()?)),
        2 => Ok(Constant::Str(reader.str()?)),
        3 => Ok(Constant::Bool(reader.u8()? != 0)),
        4 => Ok(Constant::None),
        tag => Err(BytecodeError::BadTag {
            what: "constant",
            tag,
            offset,
        }),
    }
}

fn encode_function(
    buffer: &mut BytecodeBuffer,
    function: &BytecodeFunction,
) -> Result<(), BytecodeError> {
    let at = buffer.begin_section();
    buffer.put_str(&function.name)?;
    buffer.put_u16(function.arity);
    buffer.put_u32(function.local_count);
    buffer.put_len(function.instructions.len(), "instruction count")?;
    for (idx, instr) in function.instructions.iter().enumerate() {
        buffer.put_u8(instr.opcode as u8);
        let count =
            u8::try_from(instr.operands.len()).map_err(|_| BytecodeError::Overflow {
                what: "operand count",
            })?;
        buffer.put_u8(count);
        for operand in &instr.operands {
            buffer.put_u8(operand.tag());
            match *operand {
                BytecodeOperand::Int(v) => buffer.put_i64(v),
                BytecodeOperand::Float(v) => buffer.put_f64(v),
                BytecodeOperand::Const(idx) | BytecodeOperand::Target(idx) => buffer.put_u32(idx),
                BytecodeOperand::Resource(id) => buffer.put_u64(id),
            }
        }
        buffer.put_u32(function.lines.get(idx).copied().unwrap_or(0));
    }
    buffer.end_section(at, "function section")
}

fn decode_function(reader: &mut ByteReader<'_>) -> Result<BytecodeFunction, BytecodeError> {
    let mut section = reader.section()?;
    let name = section.str()?;
    let arity = section.u16()?;
    let local_count = section.u32()?;
    let count = section.u32()?;

    let mut instructions = Vec::new();
    let mut lines = Vec::new();
    for _ in 0..count {
        let offset = section.offset();
        let byte = section.u8()?;
        let opcode = Opcode::try_from(byte)
            .map_err(|opcode| BytecodeError::UnknownOpcode { opcode, offset })?;
        let n = section.u8()?;
        let mut operands = SmallVec::new();
        for _ in 0..n {
            let offset = section.offset();
            let operand = match section.u8()? {
                0 => BytecodeOperand::Int(section.i64()?),
                1 => BytecodeOperand::Float(section.f64()?),
                2 => BytecodeOperand::Const(section.u32()?),
                3 => BytecodeOperand::Target(section.u32()?),
                4 => BytecodeOperand::Resource(section.u64()?),
                tag => {
                    return Err(BytecodeError::BadTag {
                        what: "operand",
                        tag,
                        offset,
                    })
                }
            };
            operands.push(operand);
        }
        instructions.push(BytecodeInstruction { opcode, operands });
        lines.push(section.u32()?);
    }
    section.finish("function")?;

    Ok(BytecodeFunction {
        name,
        arity,
        local_count,
        instructions,
        lines,
    })
}
