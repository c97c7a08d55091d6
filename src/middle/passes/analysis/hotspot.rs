//! 热点排序

use indexmap::IndexMap;
use serde::Serialize;

use super::usage::ResourceUsageRecord;
use crate::middle::core::ir::ResourceId;

/// 默认热点阈值：使用次数超过该值即为热点
pub const DEFAULT_HOTSPOT_THRESHOLD: usize = 5;

/// 热点资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub resource: ResourceId,
    pub use_count: usize,
}

/// 按使用次数降序排列热点；次数相同时按资源 id 升序
pub fn rank_hotspots(
    usage: &IndexMap<ResourceId, ResourceUsageRecord>,
    threshold: usize,
) -> Vec<Hotspot> {
    let mut hotspots: Vec<Hotspot> = usage
        .values()
        .filter(|record| record.use_count > threshold)
        .map(|record| Hotspot {
            resource: record.resource,
            use_count: record.use_count,
        })
        .collect();
    hotspots.sort_by(|a, b| {
        b.use_count
            .cmp(&a.use_count)
            .then_with(|| a.resource.cmp(&b.resource))
    });
    hotspots
}
