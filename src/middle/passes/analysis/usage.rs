//! 资源使用扫描
//!
//! 只扫描带资源标记的函数，按块顺序逐条检查指令。
//! `CreatePair` 的关联资源是第三个操作数，其余关联操作取第一个操作数。

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::middle::core::ir::{Module, OpKind, ResourceId};

/// 使用点：(函数名, 块标签, 指令下标)
///
/// 派生的 `Ord` 即字典序：先比函数名，再比块标签，最后按数值比较下标。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UseSite {
    pub function: String,
    pub block: String,
    pub index: usize,
}

impl fmt::Display for UseSite {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}#{}", self.function, self.block, self.index)
    }
}

/// 单个关联资源的使用记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceUsageRecord {
    pub resource: ResourceId,
    pub use_count: usize,
    /// 按扫描顺序排列
    pub sites: Vec<UseSite>,
}

impl ResourceUsageRecord {
    fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            use_count: 0,
            sites: Vec::new(),
        }
    }
}

/// 扫描整个模块，按资源首次出现的顺序建立使用记录
pub fn scan_usage(module: &Module) -> IndexMap<ResourceId, ResourceUsageRecord> {
    let mut usage: IndexMap<ResourceId, ResourceUsageRecord> = IndexMap::new();

    for function in module.functions.iter().filter(|f| f.is_resource_bearing) {
        for block in &function.blocks {
            for (index, instr) in block.instructions.iter().enumerate() {
                let Some(resource) = instr.correlated_resource() else {
                    continue;
                };
                let record = usage
                    .entry(resource)
                    .or_insert_with(|| ResourceUsageRecord::new(resource));
                record.use_count += 1;
                record.sites.push(UseSite {
                    function: function.name.clone(),
                    block: block.label.clone(),
                    index,
                });
            }
        }
    }

    usage
}

/// 查找使用点处指令的操作类型
pub fn site_op(
    module: &Module,
    site: &UseSite,
) -> Option<OpKind> {
    module
        .find_function(&site.function)?
        .block(&site.block)?
        .instructions
        .get(site.index)
        .map(|instr| instr.op)
}
