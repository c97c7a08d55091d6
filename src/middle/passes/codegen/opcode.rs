//! 字节码操作码
//!
//! 按功能族划分编码区间，每族占 16 个编码：
//!
//! | 区间 | 族 |
//! |------|----|
//! | 0x00 | 控制 |
//! | 0x10 | 数据 |
//! | 0x20 | 复合/索引 |
//! | 0x30 | 函数调用 |
//! | 0x40 | 跳转 |
//! | 0x50 | 算术 |
//! | 0x60 | 位运算 |
//! | 0x70 | 逻辑 |
//! | 0x80 | 比较 |
//! | 0x90 | 资源操作 |

use std::fmt;

use crate::middle::core::ir::{OpFamily, OpKind};

/// 字节码操作码
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // =====================
    // 控制 (0x00-0x0F)
    // =====================
    Nop = 0x00,
    Halt = 0x01,
    Return = 0x02,
    ReturnValue = 0x03,

    // =====================
    // 数据 (0x10-0x1F)
    // =====================
    LoadConst = 0x10,
    LoadGlobal = 0x11,
    StoreGlobal = 0x12,
    LoadLocal = 0x13,
    StoreLocal = 0x14,
    Pop = 0x15,
    Dup = 0x16,

    // =====================
    // 复合/索引 (0x20-0x2F)
    // =====================
    NewList = 0x20,
    NewObject = 0x21,
    GetField = 0x22,
    SetField = 0x23,
    GetIndex = 0x24,
    SetIndex = 0x25,

    // =====================
    // 函数调用 (0x30-0x3F)
    // =====================
    Call = 0x30,
    CallMethod = 0x31,

    // =====================
    // 跳转 (0x40-0x4F)
    // =====================
    Jmp = 0x40,
    JmpIf = 0x41,
    JmpIfNot = 0x42,

    // =====================
    // 算术 (0x50-0x5F)
    // =====================
    Add = 0x50,
    Sub = 0x51,
    Mul = 0x52,
    Div = 0x53,
    Mod = 0x54,
    Neg = 0x55,

    // =====================
    // 位运算 (0x60-0x6F)
    // =====================
    BitAnd = 0x60,
    BitOr = 0x61,
    BitXor = 0x62,
    Shl = 0x63,
    Shr = 0x64,
    BitNot = 0x65,

    // =====================
    // 逻辑 (0x70-0x7F)
    // =====================
    And = 0x70,
    Or = 0x71,
    Not = 0x72,

    // =====================
    // 比较 (0x80-0x8F)
    // =====================
    Eq = 0x80,
    Ne = 0x81,
    Lt = 0x82,
    Le = 0x83,
    Gt = 0x84,
    Ge = 0x85,

    // =====================
    // 资源操作 (0x90-0x9F)
    // =====================
    AllocResource = 0x90,
    Measure = 0x91,
    CreatePair = 0x92,
    BreakPair = 0x93,
    SwapPair = 0x94,
    MeasurePaired = 0x95,
    JointMeasure = 0x96,
}

impl Opcode {
    /// 功能族，由编码高四位决定
    pub fn family(self) -> OpFamily {
        match (self as u8) >> 4 {
            0x0 => OpFamily::Control,
            0x1 => OpFamily::Data,
            0x2 => OpFamily::Composite,
            0x3 => OpFamily::Function,
            0x4 => OpFamily::Jump,
            0x5 => OpFamily::Arithmetic,
            0x6 => OpFamily::Bitwise,
            0x7 => OpFamily::Logical,
            0x8 => OpFamily::Comparison,
            _ => OpFamily::Resource,
        }
    }

    /// 助记符
    pub fn name(self) -> &'static str {
        OpKind::from(self).mnemonic()
    }
}

impl fmt::Display for Opcode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<OpKind> for Opcode {
    fn from(op: OpKind) -> Self {
        match op {
            OpKind::Nop => Opcode::Nop,
            OpKind::Halt => Opcode::Halt,
            OpKind::Return => Opcode::Return,
            OpKind::ReturnValue => Opcode::ReturnValue,
            OpKind::LoadConst => Opcode::LoadConst,
            OpKind::LoadGlobal => Opcode::LoadGlobal,
            OpKind::StoreGlobal => Opcode::StoreGlobal,
            OpKind::LoadLocal => Opcode::LoadLocal,
            OpKind::StoreLocal => Opcode::StoreLocal,
            OpKind::Pop => Opcode::Pop,
            OpKind::Dup => Opcode::Dup,
            OpKind::NewList => Opcode::NewList,
            OpKind::NewObject => Opcode::NewObject,
            OpKind::GetField => Opcode::GetField,
            OpKind::SetField => Opcode::SetField,
            OpKind::GetIndex => Opcode::GetIndex,
            OpKind::SetIndex => Opcode::SetIndex,
            OpKind::Call => Opcode::Call,
            OpKind::CallMethod => Opcode::CallMethod,
            OpKind::Jump => Opcode::Jmp,
            OpKind::JumpIf => Opcode::JmpIf,
            OpKind::JumpIfNot => Opcode::JmpIfNot,
            OpKind::Add => Opcode::Add,
            OpKind::Sub => Opcode::Sub,
            OpKind::Mul => Opcode::Mul,
            OpKind::Div => Opcode::Div,
            OpKind::Mod => Opcode::Mod,
            OpKind::Neg => Opcode::Neg,
            OpKind::BitAnd => Opcode::BitAnd,
            OpKind::BitOr => Opcode::BitOr,
            OpKind::BitXor => Opcode::BitXor,
            OpKind::Shl => Opcode::Shl,
            OpKind::Shr => Opcode::Shr,
            OpKind::BitNot => Opcode::BitNot,
            OpKind::And => Opcode::And,
            OpKind::Or => Opcode::Or,
            OpKind::Not => Opcode::Not,
            OpKind::Eq => Opcode::Eq,
            OpKind::Ne => Opcode::Ne,
            OpKind::Lt => Opcode::Lt,
            OpKind::Le => Opcode::Le,
            OpKind::Gt => Opcode::Gt,
            OpKind::Ge => Opcode::Ge,
            OpKind::AllocResource => Opcode::AllocResource,
            OpKind::Measure => Opcode::Measure,
            OpKind::CreatePair => Opcode::CreatePair,
            OpKind::BreakPair => Opcode::BreakPair,
            OpKind::SwapPair => Opcode::SwapPair,
            OpKind::MeasurePaired => Opcode::MeasurePaired,
            OpKind::JointMeasure => Opcode::JointMeasure,
        }
    }
}

impl From<Opcode> for OpKind {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Nop => OpKind::Nop,
            Opcode::Halt => OpKind::Halt,
            Opcode::Return => OpKind::Return,
            Opcode::ReturnValue => OpKind::ReturnValue,
            Opcode::LoadConst => OpKind::LoadConst,
            Opcode::LoadGlobal => OpKind::LoadGlobal,
            Opcode::StoreGlobal => OpKind::StoreGlobal,
            Opcode::LoadLocal => OpKind::LoadLocal,
            Opcode::StoreLocal => OpKind::StoreLocal,
            Opcode::Pop => OpKind::Pop,
            Opcode::Dup => OpKind::Dup,
            Opcode::NewList => OpKind::NewList,
            Opcode::NewObject => OpKind::NewObject,
            Opcode::GetField => OpKind::GetField,
            Opcode::SetField => OpKind::SetField,
            Opcode::GetIndex => OpKind::GetIndex,
            Opcode::SetIndex => OpKind::SetIndex,
            Opcode::Call => OpKind::Call,
            Opcode::CallMethod => OpKind::CallMethod,
            Opcode::Jmp => OpKind::Jump,
            Opcode::JmpIf => OpKind::JumpIf,
            Opcode::JmpIfNot => OpKind::JumpIfNot,
            Opcode::Add => OpKind::Add,
            Opcode::Sub => OpKind::Sub,
            Opcode::Mul => OpKind::Mul,
            Opcode::Div => OpKind::Div,
            Opcode::Mod => OpKind::Mod,
            Opcode::Neg => OpKind::Neg,
            Opcode::BitAnd => OpKind::BitAnd,
            Opcode::BitOr => OpKind::BitOr,
            Opcode::BitXor => OpKind::BitXor,
            Opcode::Shl => OpKind::Shl,
            Opcode::Shr => OpKind::Shr,
            Opcode::BitNot => OpKind::BitNot,
            Opcode::And => OpKind::And,
            Opcode::Or => OpKind::Or,
            Opcode::Not => OpKind::Not,
            Opcode::Eq => OpKind::Eq,
            Opcode::Ne => OpKind::Ne,
            Opcode::Lt => OpKind::Lt,
            Opcode::Le => OpKind::Le,
            Opcode::Gt => OpKind::Gt,
            Opcode::Ge => OpKind::Ge,
            Opcode::AllocResource => OpKind::AllocResource,
            Opcode::Measure => OpKind::Measure,
            Opcode::CreatePair => OpKind::CreatePair,
            Opcode::BreakPair => OpKind::BreakPair,
            Opcode::SwapPair => OpKind::SwapPair,
            Opcode::MeasurePaired => OpKind::MeasurePaired,
            Opcode::JointMeasure => OpKind::JointMeasure,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let opcode = match value {
            0x00 => Opcode::Nop,
            0x01 => Opcode::Halt,
            0x02 => Opcode::Return,
            0x03 => Opcode::ReturnValue,
            0x10 => Opcode::LoadConst,
            0x11 => Opcode::LoadGlobal,
            0x12 => Opcode::StoreGlobal,
            0x13 => Opcode::LoadLocal,
            0x14 => Opcode::StoreLocal,
            0x15 => Opcode::Pop,
            0x16 => Opcode::Dup,
            0x20 => Opcode::NewList,
            0x21 => Opcode::NewObject,
            0x22 => Opcode::GetField,
            0x23 => Opcode::SetField,
            0x24 => Opcode::GetIndex,
            0x25 => Opcode::SetIndex,
            0x30 => Opcode::Call,
            0x31 => Opcode::CallMethod,
            0x40 => Opcode::Jmp,
            0x41 => Opcode::JmpIf,
            0x42 => Opcode::JmpIfNot,
            0x50 => Opcode::Add,
            0x51 => Opcode::Sub,
            0x52 => Opcode::Mul,
            0x53 => Opcode::Div,
            0x54 => Opcode::Mod,
            0x55 => Opcode::Neg,
            0x60 => Opcode::BitAnd,
            0x61 => Opcode::BitOr,
            0x62 => Opcode::BitXor,
            0x63 => Opcode::Shl,
            0x64 => Opcode::Shr,
            0x65 => Opcode::BitNot,
            0x70 => Opcode::And,
            0x71 => Opcode::Or,
            0x72 => Opcode::Not,
            0x80 => Opcode::Eq,
            0x81 => Opcode::Ne,
            0x82 => Opcode::Lt,
            0x83 => Opcode::Le,
            0x84 => Opcode::Gt,
            0x85 => Opcode::Ge,
            0x90 => Opcode::AllocResource,
            0x91 => Opcode::Measure,
            0x92 => Opcode::CreatePair,
            0x93 => Opcode::BreakPair,
            0x94 => Opcode::SwapPair,
            0x95 => Opcode::MeasurePaired,
            0x96 => Opcode::JointMeasure,
            other => return Err(other),
        };
        Ok(opcode)
    }
}
