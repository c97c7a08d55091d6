//! 结构模式识别
//!
//! [`PatternMatcher`] 根据单个资源的有序使用点给出零个或多个模式标签，
//! 不允许有副作用。分析器默认不注册任何匹配器。

use serde::Serialize;
use std::fmt;

use super::usage::{site_op, ResourceUsageRecord};
use crate::middle::core::ir::{Module, OpKind, ResourceId};

/// 模式标签
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternTag {
    /// 创建后恰好一次使用即拆除
    TransientPair,
    /// 参与交换
    PairExchange,
    /// 外部匹配器给出的标签
    Custom(String),
}

impl fmt::Display for PatternTag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PatternTag::TransientPair => write!(f, "transient-pair"),
            PatternTag::PairExchange => write!(f, "pair-exchange"),
            PatternTag::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// 识别出的模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognizedPattern {
    pub resource: ResourceId,
    pub tag: PatternTag,
}

/// 模式匹配器
pub trait PatternMatcher {
    /// 匹配器名称（日志用）
    fn name(&self) -> &'static str;

    /// 识别 `record` 对应资源的模式
    fn recognize(
        &self,
        record: &ResourceUsageRecord,
        module: &Module,
    ) -> Vec<PatternTag>;
}

/// create → 一次关联使用 → break
#[derive(Debug, Default, Clone, Copy)]
pub struct TransientPairMatcher;

impl PatternMatcher for TransientPairMatcher {
    fn name(&self) -> &'static str {
        "transient-pair"
    }

    fn recognize(
        &self,
        record: &ResourceUsageRecord,
        module: &Module,
    ) -> Vec<PatternTag> {
        let ops: Vec<Option<OpKind>> = record
            .sites
            .iter()
            .map(|site| site_op(module, site))
            .collect();
        match ops.as_slice() {
            [Some(OpKind::CreatePair), Some(middle), Some(OpKind::BreakPair)]
                if !matches!(middle, OpKind::CreatePair | OpKind::BreakPair) =>
            {
                vec![PatternTag::TransientPair]
            }
            _ => Vec::new(),
        }
    }
}

/// 资源参与过 `SwapPair`
#[derive(Debug, Default, Clone, Copy)]
pub struct PairExchangeMatcher;

impl PatternMatcher for PairExchangeMatcher {
    fn name(&self) -> &'static str {
        "pair-exchange"
    }

    fn recognize(
        &self,
        record: &ResourceUsageRecord,
        module: &Module,
    ) -> Vec<PatternTag> {
        let swaps = record
            .sites
            .iter()
            .any(|site| site_op(module, site) == Some(OpKind::SwapPair));
        if swaps {
            vec![PatternTag::PairExchange]
        } else {
            Vec::new()
        }
    }
}
