//! 关联资源分析
//!
//! 只读地遍历 IR，为优化器提供决策依据：
//!
//! - [`usage`]: 每个关联资源的使用记录
//! - [`hotspot`]: 热点排序
//! - [`lifetime`]: 生命周期估计
//! - [`patterns`]: 可插拔的结构模式识别
//!
//! 分析结果不缓存在模块里，每次调用 [`CorrelationAnalyzer::analyze`] 都从头计算。

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub mod hotspot;
pub mod lifetime;
pub mod patterns;
pub mod usage;

pub use hotspot::{rank_hotspots, Hotspot, DEFAULT_HOTSPOT_THRESHOLD};
pub use lifetime::{estimate_lifetimes, Lifetime};
pub use patterns::{
    PairExchangeMatcher, PatternMatcher, PatternTag, RecognizedPattern, TransientPairMatcher,
};
pub use usage::{scan_usage, site_op, ResourceUsageRecord, UseSite};

use crate::middle::core::ir::{Module, ResourceId};
use crate::util::config::AnalysisConfig;

/// 分析结果
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisResult {
    pub usage: IndexMap<ResourceId, ResourceUsageRecord>,
    pub hotspots: Vec<Hotspot>,
    pub lifetimes: IndexMap<ResourceId, Lifetime>,
    pub patterns: Vec<RecognizedPattern>,
}

impl AnalysisResult {
    /// 资源的使用次数；未出现过的资源为 0
    pub fn use_count(
        &self,
        resource: ResourceId,
    ) -> usize {
        self.usage
            .get(&resource)
            .map_or(0, |record| record.use_count)
    }

    /// 是否为热点
    pub fn is_hotspot(
        &self,
        resource: ResourceId,
    ) -> bool {
        self.hotspots.iter().any(|h| h.resource == resource)
    }

    /// 资源的模式标签
    pub fn patterns_of(
        &self,
        resource: ResourceId,
    ) -> impl Iterator<Item = &PatternTag> {
        self.patterns
            .iter()
            .filter(move |p| p.resource == resource)
            .map(|p| &p.tag)
    }
}

/// 关联资源分析器
pub struct CorrelationAnalyzer {
    hotspot_threshold: usize,
    matchers: Vec<Box<dyn PatternMatcher>>,
}

impl CorrelationAnalyzer {
    /// 默认阈值，不注册匹配器
    pub fn new() -> Self {
        Self {
            hotspot_threshold: DEFAULT_HOTSPOT_THRESHOLD,
            matchers: Vec::new(),
        }
    }

    /// 按配置创建
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let analyzer = Self::new().with_threshold(config.hotspot_threshold);
        if config.builtin_patterns {
            analyzer
                .with_matcher(Box::new(TransientPairMatcher))
                .with_matcher(Box::new(PairExchangeMatcher))
        } else {
            analyzer
        }
    }

    /// 设置热点阈值
    pub fn with_threshold(
        mut self,
        threshold: usize,
    ) -> Self {
        self.hotspot_threshold = threshold;
        self
    }

    /// 注册模式匹配器
    pub fn with_matcher(
        mut self,
        matcher: Box<dyn PatternMatcher>,
    ) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn hotspot_threshold(&self) -> usize {
        self.hotspot_threshold
    }

    /// 分析模块
    pub fn analyze(
        &self,
        module: &Module,
    ) -> AnalysisResult {
        let usage = scan_usage(module);
        let hotspots = rank_hotspots(&usage, self.hotspot_threshold);
        let lifetimes = estimate_lifetimes(&usage);

        let mut patterns = Vec::new();
        for record in usage.values() {
            for matcher in &self.matchers {
                for tag in matcher.recognize(record, module) {
                    patterns.push(RecognizedPattern {
                        resource: record.resource,
                        tag,
                    });
                }
            }
        }

        debug!(
            "Analyzed module `{}`: {} resource(s), {} hotspot(s), {} pattern(s)",
            module.name,
            usage.len(),
            hotspots.len(),
            patterns.len()
        );

        AnalysisResult {
            usage,
            hotspots,
            lifetimes,
            patterns,
        }
    }
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CorrelationAnalyzer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let matchers: Vec<&str> = self.matchers.iter().map(|m| m.name()).collect();
        f.debug_struct("CorrelationAnalyzer")
            .field("hotspot_threshold", &self.hotspot_threshold)
            .field("matchers", &matchers)
            .finish()
    }
}
