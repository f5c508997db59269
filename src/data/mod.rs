/// Data layer: core types, loading, and experiment selection.
///
/// Architecture:
/// ```text
///  .txt / .dat / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ScanSet / Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  ScanSet  │  rotation + ellipticity loops per experiment
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  --experiments selection → kept experiments
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
