/// Data layer: table model, loading, and loop discovery.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ProcessTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ProcessTable  │  typed cells per column, numeric / time views
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ discover  │  SP_<tag> + <tag> header pairs → loop list
///   └──────────┘
/// ```

pub mod discover;
pub mod loader;
pub mod model;
