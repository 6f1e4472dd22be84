mod price_bar;
mod metrics;
mod market;
mod snapshot;
pub mod institutional;
pub mod screening;
pub mod watchlist;

pub use price_bar::{OscillatorPoint, PriceBar};
pub use metrics::StockMetrics;
pub use market::{MarketQuote, Valuation};
pub use snapshot::{
    FlowHistoryResponse, KdSeriesResponse, Provenance, ProvenanceStatus, SnapshotProvenance,
    StockSnapshot, WatchlistSnapshotResponse,
};
pub use institutional::{CategoryMap, CategoryMapping, InstitutionalFlowRecord, NetFlowSummary};
pub use screening::{ScanCriteria, ScanHit, ScanResponse};
pub use watchlist::{normalize_ticker, AddWatchlistEntriesRequest, AddWatchlistEntryRequest, WatchlistEntry};
