//! 关联资源优化流水线
//!
//! 状态机：`Idle → Level1 → Level2 → Level3 → Done`。
//! 各级只在配置级别不低于自身时运行，按顺序作用于同一个克隆，
//! 输入模块本身从不被修改。
//!
//! 分析结果在第一级之前计算一次，之后各级复用，级与级之间不重新分析。
//! 第二、三级定位指令时总是重新扫描克隆，而不是沿用分析里的下标。
//!
//! 单个变换失败（不安全的合并、移动或重排）只会跳过该变换并报告 `warning`，
//! 流水线总是返回尽力优化后的模块。

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub mod global;
pub mod placement;
pub mod redundancy;

pub use global::{
    AllocationBalancer, LayeredScheduler, NoRebalance, NoSharing, OperationScheduler, PairSharing,
};
pub use placement::{create_distance, settle_break_pair, sink_create_pair, verify_pair_order};
pub use redundancy::{
    apply_merge, check_merge, delete_batch, remove_unused_resources, rewrite_resource_uses,
    MergeCandidate, MergePolicy, NeverMerge, SameEndpointsPolicy,
};

use crate::middle::core::ir::{Module, OpKind, ResourceId};
use crate::middle::passes::analysis::AnalysisResult;
use crate::util::config::{MergePolicyKind, OptimizeConfig};
use crate::util::diagnostic::{codes, Category, Diagnostic, DiagnosticBuilder, DiagnosticSink, Severity};

/// 默认最大关联距离
pub const DEFAULT_MAX_CORRELATION_DISTANCE: usize = 8;

/// 优化级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OptimizationLevel {
    /// 冗余消除
    O1 = 1,
    /// + 放置优化
    O2 = 2,
    /// + 跨函数与全局优化
    O3 = 3,
}

impl OptimizationLevel {
    /// 把任意请求值钳制到最近的合法级别，第二项表示是否发生了钳制
    pub fn clamp(requested: i64) -> (Self, bool) {
        match requested {
            i64::MIN..=0 => (OptimizationLevel::O1, true),
            1 => (OptimizationLevel::O1, false),
            2 => (OptimizationLevel::O2, false),
            3 => (OptimizationLevel::O3, false),
            _ => (OptimizationLevel::O3, true),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    Level1,
    Level2,
    Level3,
    Done,
}

/// 优化安全性错误
///
/// 这些错误从不中止流水线，只转成 `warning` 诊断。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptimizeError {
    #[error("cannot merge {merged} into {into} in `{function}`: {reason}")]
    UnsafeMerge {
        merged: ResourceId,
        into: ResourceId,
        function: String,
        reason: String,
    },

    #[error("cannot move operations on {resource} in `{function}`: {reason}")]
    UnsafeMove {
        resource: ResourceId,
        function: String,
        reason: String,
    },

    #[error("cannot reorder operations in `{function}`: {reason}")]
    UnsafeReorder { function: String, reason: String },

    #[error("cannot share resources across functions: {reason}")]
    UnsafeShare { reason: String },
}

impl OptimizeError {
    pub fn code(&self) -> &'static str {
        match self {
            OptimizeError::UnsafeMerge { .. } => codes::UNSAFE_MERGE,
            OptimizeError::UnsafeMove { .. } => codes::UNSAFE_MOVE,
            OptimizeError::UnsafeReorder { .. } => codes::UNSAFE_REORDER,
            OptimizeError::UnsafeShare { .. } => codes::UNSAFE_SHARE,
        }
    }

    /// 转换为 `warning` 级诊断（模块级位置）
    pub fn to_diagnostic(
        &self,
        source_file: &str,
    ) -> Diagnostic {
        DiagnosticBuilder::new(Severity::Warning, self.code(), self.to_string())
            .category(Category::Optimization)
            .in_file(source_file)
            .suggest("the transformation was skipped; the module is otherwise unchanged")
            .build()
    }
}

/// 优化统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationStats {
    /// 实际运行的级别
    pub level: u8,
    /// 经过的状态序列
    pub states: Vec<PipelineState>,
    pub removed_unused: usize,
    pub merged: usize,
    pub sunk: usize,
    pub settled: usize,
    pub shared: usize,
    pub rebalanced: usize,
    pub reordered: usize,
    /// 因不安全而跳过的变换数
    pub skipped: usize,
}

impl OptimizationStats {
    /// 以 JSON 输出
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 优化结果：尽力优化后的克隆及统计
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub module: Module,
    pub stats: OptimizationStats,
}

/// 优化器
#[derive(Debug)]
pub struct Optimizer {
    requested_level: i64,
    level: OptimizationLevel,
    max_correlation_distance: usize,
    merge_policy: Box<dyn MergePolicy>,
    sharing: Box<dyn PairSharing>,
    balancer: Box<dyn AllocationBalancer>,
    scheduler: Box<dyn OperationScheduler>,
    state: PipelineState,
}

impl Optimizer {
    /// 以请求的级别创建优化器；越界值在运行时钳制并报告
    pub fn new(requested_level: i64) -> Self {
        let (level, _) = OptimizationLevel::clamp(requested_level);
        Self {
            requested_level,
            level,
            max_correlation_distance: DEFAULT_MAX_CORRELATION_DISTANCE,
            merge_policy: Box::new(NeverMerge),
            sharing: Box::new(NoSharing),
            balancer: Box::new(NoRebalance),
            scheduler: Box::new(LayeredScheduler),
            state: PipelineState::Idle,
        }
    }

    /// 按配置创建
    pub fn from_config(config: &OptimizeConfig) -> Self {
        let optimizer =
            Self::new(config.level).with_max_correlation_distance(config.max_correlation_distance);
        match config.merge_policy {
            MergePolicyKind::None => optimizer,
            MergePolicyKind::SameEndpoints => optimizer.with_merge_policy(Box::new(SameEndpointsPolicy)),
        }
    }

    pub fn with_max_correlation_distance(
        mut self,
        distance: usize,
    ) -> Self {
        self.max_correlation_distance = distance;
        self
    }

    pub fn with_merge_policy(
        mut self,
        policy: Box<dyn MergePolicy>,
    ) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_sharing(
        mut self,
        sharing: Box<dyn PairSharing>,
    ) -> Self {
        self.sharing = sharing;
        self
    }

    pub fn with_balancer(
        mut self,
        balancer: Box<dyn AllocationBalancer>,
    ) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn with_scheduler(
        mut self,
        scheduler: Box<dyn OperationScheduler>,
    ) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// 生效的级别
    pub fn level(&self) -> OptimizationLevel {
        self.level
    }

    /// 当前状态
    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(
        &mut self,
        state: PipelineState,
        stats: &mut OptimizationStats,
    ) {
        debug!("Optimizer: {:?} -> {:?}", self.state, state);
        self.state = state;
        stats.states.push(state);
    }

    /// 优化 `module` 的克隆
    pub fn optimize<S: DiagnosticSink>(
        &mut self,
        module: &Module,
        analysis: &AnalysisResult,
        sink: &mut S,
    ) -> OptimizationOutcome {
        let source_file = module.source_file.clone();
        let mut stats = OptimizationStats {
            level: self.level.as_u8(),
            ..OptimizationStats::default()
        };
        self.state = PipelineState::Idle;
        stats.states.push(PipelineState::Idle);

        let (_, clamped) = OptimizationLevel::clamp(self.requested_level);
        if clamped {
            sink.report(
                DiagnosticBuilder::new(
                    Severity::Info,
                    codes::LEVEL_CLAMPED,
                    format!(
                        "optimization level {} is out of range, using {}",
                        self.requested_level,
                        self.level.as_u8()
                    ),
                )
                .category(Category::Config)
                .in_file(source_file.as_str())
                .build(),
            );
        }

        let mut clone = module.clone();

        self.enter(PipelineState::Level1, &mut stats);
        self.run_level1(&mut clone, analysis, &mut stats, sink);

        if self.level >= OptimizationLevel::O2 {
            self.enter(PipelineState::Level2, &mut stats);
            self.run_level2(&mut clone, analysis, &mut stats, sink);
        }

        if self.level >= OptimizationLevel::O3 {
            self.enter(PipelineState::Level3, &mut stats);
            self.run_level3(&mut clone, analysis, &mut stats, sink);
        }

        clone.refresh_resource_flags();
        clone
            .metadata
            .insert("opt.level".to_string(), self.level.as_u8().to_string());
        self.enter(PipelineState::Done, &mut stats);

        debug!(
            "Optimized module `{}` at O{}: removed {}, merged {}, sunk {}, settled {}, reordered {}, skipped {}",
            clone.name,
            stats.level,
            stats.removed_unused,
            stats.merged,
            stats.sunk,
            stats.settled,
            stats.reordered,
            stats.skipped
        );

        OptimizationOutcome {
            module: clone,
            stats,
        }
    }

    fn skip<S: DiagnosticSink>(
        err: OptimizeError,
        source_file: &str,
        stats: &mut OptimizationStats,
        sink: &mut S,
    ) {
        warn!("{}", err);
        stats.skipped += 1;
        sink.report(err.to_diagnostic(source_file));
    }

    fn run_level1<S: DiagnosticSink>(
        &self,
        module: &mut Module,
        analysis: &AnalysisResult,
        stats: &mut OptimizationStats,
        sink: &mut S,
    ) {
        stats.removed_unused = remove_unused_resources(module, analysis);

        let source_file = module.source_file.clone();
        for function in module
            .functions
            .iter_mut()
            .filter(|f| f.is_resource_bearing)
        {
            for candidate in self.merge_policy.candidates(function, analysis) {
                match check_merge(function, candidate, analysis) {
                    Ok(()) => {
                        apply_merge(function, candidate);
                        stats.merged += 1;
                    }
                    Err(err) => Self::skip(err, &source_file, stats, sink),
                }
            }
        }
    }

    fn run_level2<S: DiagnosticSink>(
        &self,
        module: &mut Module,
        analysis: &AnalysisResult,
        stats: &mut OptimizationStats,
        sink: &mut S,
    ) {
        let source_file = module.source_file.clone();
        for &pair in analysis.usage.keys() {
            let Some(function) = module
                .functions
                .iter_mut()
                .find(|f| f.is_resource_bearing && f.find_create_pair(pair).is_some())
            else {
                continue;
            };

            let far = create_distance(function, pair)
                .is_some_and(|distance| distance > self.max_correlation_distance);
            if far {
                match sink_create_pair(function, pair) {
                    Ok(true) => stats.sunk += 1,
                    Ok(false) => {}
                    Err(err) => Self::skip(err, &source_file, stats, sink),
                }
            }

            match settle_break_pair(function, pair) {
                Ok(moved) => stats.settled += moved,
                Err(err) => Self::skip(err, &source_file, stats, sink),
            }
        }
    }

    fn run_level3<S: DiagnosticSink>(
        &self,
        module: &mut Module,
        analysis: &AnalysisResult,
        stats: &mut OptimizationStats,
        sink: &mut S,
    ) {
        let source_file = module.source_file.clone();

        let snapshot = module.clone();
        match self.sharing.share(module, analysis) {
            Ok(shared) => stats.shared += shared,
            Err(err) => {
                *module = snapshot;
                Self::skip(err, &source_file, stats, sink);
            }
        }

        let snapshot = module.clone();
        match self.balancer.rebalance(module, analysis) {
            Ok(rebalanced) => stats.rebalanced += rebalanced,
            Err(err) => {
                *module = snapshot;
                Self::skip(err, &source_file, stats, sink);
            }
        }

        for function in module
            .functions
            .iter_mut()
            .filter(|f| f.is_resource_bearing)
        {
            let snapshot = function.clone();
            match self.scheduler.schedule(function, analysis) {
                Ok(moved) => stats.reordered += moved,
                Err(err) => {
                    *function = snapshot;
                    Self::skip(err, &source_file, stats, sink);
                }
            }
        }
    }
}

/// 模块内的关联操作数量
pub fn correlated_op_count(module: &Module) -> usize {
    module
        .functions
        .iter()
        .flat_map(|f| f.all_instructions())
        .filter(|instr| instr.op.is_correlated())
        .count()
}

/// 模块内某种操作的数量
pub fn op_count(
    module: &Module,
    op: OpKind,
) -> usize {
    module
        .functions
        .iter()
        .flat_map(|f| f.all_instructions())
        .filter(|instr| instr.op == op)
        .count()
}
