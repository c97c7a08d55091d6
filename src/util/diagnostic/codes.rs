//! 错误码注册表
//!
//! - E01xx: IR 结构错误
//! - E02xx: IR 生成错误
//! - E03xx: 字节码发射错误
//! - W01xx: 优化安全性警告
//! - I01xx: 配置提示

/// 指令操作数数量与操作码不符
pub const ARITY_MISMATCH: &str = "E0101";
/// 函数内基本块标签重复
pub const DUPLICATE_LABEL: &str = "E0102";
/// 基本块缺少或包含多余的终结指令
pub const BAD_TERMINATOR: &str = "E0103";
/// 函数没有任何基本块
pub const EMPTY_FUNCTION: &str = "E0104";
/// 函数重名
pub const DUPLICATE_FUNCTION: &str = "E0105";

/// 无法识别的 AST 节点
pub const UNKNOWN_NODE: &str = "E0201";
/// 引用了未声明的资源
pub const UNKNOWN_RESOURCE: &str = "E0202";
/// 引用了未声明的变量
pub const UNKNOWN_VARIABLE: &str = "E0203";
/// 节点出现在不允许的位置
pub const MISPLACED_NODE: &str = "E0204";

/// 缺少入口函数
pub const MISSING_ENTRY: &str = "E0301";
/// 跳转标签无法解析
pub const UNRESOLVED_LABEL: &str = "E0302";
/// 数值超出字节码编码范围
pub const ENCODING_OVERFLOW: &str = "E0303";
/// 写出字节码文件失败
pub const WRITE_FAILED: &str = "E0304";

/// 资源合并被跳过
pub const UNSAFE_MERGE: &str = "W0101";
/// 指令移动被跳过
pub const UNSAFE_MOVE: &str = "W0102";
/// 指令重排被跳过
pub const UNSAFE_REORDER: &str = "W0103";
/// 跨函数共享被跳过
pub const UNSAFE_SHARE: &str = "W0104";

/// 优化级别被钳制
pub const LEVEL_CLAMPED: &str = "I0101";
