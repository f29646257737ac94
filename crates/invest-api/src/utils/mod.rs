//! 공통 유틸리티.

pub mod params;

pub use params::{
    capped_or, in_range_or, parse_query_int, resolve_sort_column, split_csv, AdminListQuery,
    SortOrder,
};
