pub mod cache;
pub mod health;
pub mod scan;
pub mod stocks;
pub mod watchlist;
