//! `orbit-filters`: compiles optional, nested filter criteria into one
//! boolean selection predicate.
//!
//! # Shape
//!
//! | Layer        | Types                                                        |
//! |--------------|--------------------------------------------------------------|
//! | leaf         | [`AnyOf`], [`NullableAnyOf`], [`TagSet`], [`TimeRange`], [`Equals`], [`Exists`] |
//! | entity       | [`FlowFilter`], [`FlowRunFilter`], [`TaskRunFilter`], [`DeploymentFilter`] |
//! | request      | [`FilterCriteria`]                                           |
//! | output       | [`Predicate`], rendered for SQLite by [`sql::render`]         |
//!
//! Every slot is optional and an absent slot never excludes anything: a
//! completely empty criteria value compiles to [`Predicate::True`].

pub mod columns;
pub mod criteria;
pub mod error;
pub mod filters;
pub mod leaf;
pub mod predicate;
pub mod sql;

pub use criteria::FilterCriteria;
pub use error::{FilterError, Result};
pub use filters::{
    DeploymentFilter, Filter, FlowFilter, FlowRunFilter, StateFilter, TaskRunFilter,
};
pub use leaf::{AnyOf, Equals, Exists, Leaf, NullableAnyOf, TagSet, TimeRange};
pub use predicate::{Column, CompareOp, Predicate, Relation, Subquery, Value};
