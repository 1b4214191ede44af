//! Merge strategy selection.

use kestrel_common::config::MergeConfig;
use kestrel_common::error::KestrelResult;
use tracing::debug;

use crate::adapter::ResultStreamAdapter;
use crate::aggregation::AggregationItem;
use crate::group::MemoryGroupMerger;
use crate::group_stream::GroupByStreamMerger;
use crate::limit::{LimitDecorator, RowNumberBound};
use crate::order::{GroupByItem, OrderByItem};
use crate::stream::StreamMerger;
use crate::Merger;

/// Pagination of the logical statement, in the form its dialect wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT row_count OFFSET offset`.
    Limit {
        offset: Option<u64>,
        row_count: Option<u64>,
    },
    /// `ROWNUM > offset AND ROWNUM <= row_count`, bounds on absolute row numbers.
    RowNumber {
        offset: Option<RowNumberBound>,
        row_count: Option<RowNumberBound>,
    },
    /// `TOP n` over a `ROW_NUMBER() > offset` filter. `top` is the last row number.
    TopAndRowNumber {
        top: Option<u64>,
        offset: Option<RowNumberBound>,
    },
}

impl Pagination {
    pub fn new(offset: Option<u64>, row_count: Option<u64>) -> Self {
        Pagination::Limit { offset, row_count }
    }

    pub fn row_number(offset: Option<RowNumberBound>, row_count: Option<RowNumberBound>) -> Self {
        Pagination::RowNumber { offset, row_count }
    }

    pub fn top_and_row_number(top: Option<u64>, offset: Option<RowNumberBound>) -> Self {
        Pagination::TopAndRowNumber { top, offset }
    }

    fn decorate(self, merger: Box<dyn Merger>) -> LimitDecorator {
        match self {
            Pagination::Limit { offset, row_count } => LimitDecorator::new(merger, offset, row_count),
            Pagination::RowNumber { offset, row_count } => {
                LimitDecorator::row_number(merger, offset, row_count)
            }
            Pagination::TopAndRowNumber { top, offset } => {
                LimitDecorator::top_and_row_number(merger, top, offset)
            }
        }
    }
}

/// Resolved SELECT metadata the mergers need.
#[derive(Debug, Clone, Default)]
pub struct SelectContext {
    pub order_by: Vec<OrderByItem>,
    pub group_by: Vec<GroupByItem>,
    pub aggregations: Vec<AggregationItem>,
    pub pagination: Option<Pagination>,
}

impl SelectContext {
    pub fn with_order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn with_group_by(mut self, items: Vec<GroupByItem>) -> Self {
        self.group_by = items;
        self
    }

    pub fn with_aggregations(mut self, items: Vec<AggregationItem>) -> Self {
        self.aggregations = items;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    fn has_grouping(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }

    /// GROUP BY and ORDER BY name the same columns in the same directions, so
    /// shard results arrive sorted by group key.
    fn group_by_matches_order_by(&self) -> bool {
        !self.group_by.is_empty()
            && self.group_by.len() == self.order_by.len()
            && self
                .group_by
                .iter()
                .zip(&self.order_by)
                .all(|(g, o)| {
                    g.index.is_some()
                        && g.index == o.index
                        && g.direction == o.direction
                        && g.null_ordering == o.null_ordering
                })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Concatenate shard results as they come.
    Iterative,
    /// K-way merge by ORDER BY.
    OrderedStream,
    /// Fold groups while k-way merging by the group key.
    GroupByStream,
    /// Drain everything and group in memory.
    MemoryGroup,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Iterative => "iterative",
            MergeStrategy::OrderedStream => "ordered_stream",
            MergeStrategy::GroupByStream => "group_by_stream",
            MergeStrategy::MemoryGroup => "memory_group",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MergeEngineSelector {
    max_rows_buffered: usize,
}

impl MergeEngineSelector {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            max_rows_buffered: config.max_rows_buffered,
        }
    }

    /// A single shard ran the statement unchanged: its result is already
    /// final unless grouping must be recomputed.
    fn single_shard(shards: usize, ctx: &SelectContext) -> bool {
        shards == 1 && !ctx.has_grouping()
    }

    pub fn strategy(&self, shards: usize, ctx: &SelectContext) -> MergeStrategy {
        if Self::single_shard(shards, ctx) {
            MergeStrategy::Iterative
        } else if ctx.has_grouping() {
            if ctx.group_by_matches_order_by() {
                MergeStrategy::GroupByStream
            } else {
                MergeStrategy::MemoryGroup
            }
        } else if !ctx.order_by.is_empty() {
            MergeStrategy::OrderedStream
        } else {
            MergeStrategy::Iterative
        }
    }

    /// Build the merger for `adapters`. Pagination is applied on top unless a
    /// single shard already produced the final result.
    pub fn select(&self, adapters: Vec<ResultStreamAdapter>, ctx: &SelectContext) -> KestrelResult<Box<dyn Merger>> {
        let shards = adapters.len();
        let strategy = self.strategy(shards, ctx);
        let limited = ctx.pagination.is_some() && !Self::single_shard(shards, ctx);
        debug!(
            "merging {} shard results with {} strategy (limited: {})",
            shards, strategy, limited
        );
        kestrel_observability::record_merge_strategy(strategy.as_str(), shards, limited);

        let merger: Box<dyn Merger> = match strategy {
            MergeStrategy::Iterative => Box::new(StreamMerger::iterative(adapters)),
            MergeStrategy::OrderedStream => Box::new(StreamMerger::ordered(adapters, &ctx.order_by)?),
            MergeStrategy::GroupByStream => {
                Box::new(GroupByStreamMerger::new(adapters, &ctx.group_by, &ctx.aggregations)?)
            }
            MergeStrategy::MemoryGroup => Box::new(MemoryGroupMerger::new(
                adapters,
                &ctx.group_by,
                &ctx.order_by,
                &ctx.aggregations,
                self.max_rows_buffered,
            )?),
        };
        Ok(match ctx.pagination {
            Some(p) if limited => Box::new(p.decorate(merger)),
            _ => merger,
        })
    }
}
