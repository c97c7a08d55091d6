//! 生命周期估计
//!
//! 使用点按 [`UseSite`] 的字典序排序，记录首末两个使用点。
//!
//! 注意：`value` 是使用点数量，不是首末使用点之间的程序顺序跨度。
//! 下游消费者依赖这一口径，这里保持原样。

use indexmap::IndexMap;
use serde::Serialize;

use super::usage::{ResourceUsageRecord, UseSite};
use crate::middle::core::ir::ResourceId;

/// 单个资源的生命周期估计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lifetime {
    pub first: UseSite,
    pub last: UseSite,
    /// 使用点数量（只有一个使用点时为 1）
    pub value: usize,
}

/// 为每个有使用点的资源估计生命周期
pub fn estimate_lifetimes(
    usage: &IndexMap<ResourceId, ResourceUsageRecord>
) -> IndexMap<ResourceId, Lifetime> {
    let mut lifetimes = IndexMap::new();
    for (resource, record) in usage {
        let mut sites: Vec<&UseSite> = record.sites.iter().collect();
        sites.sort();
        let (Some(first), Some(last)) = (sites.first(), sites.last()) else {
            continue;
        };
        lifetimes.insert(
            *resource,
            Lifetime {
                first: (*first).clone(),
                last: (*last).clone(),
                value: sites.len(),
            },
        );
    }
    lifetimes
}
