//! Crawl pipeline and the per-product timers that drive it.

mod crawl;
mod flight;
mod scheduler;

pub use crawl::{parse_amount, CrawlFailure, CrawlOutcome, Spider, Stage};
pub use flight::{FlightGuard, InFlight};
pub use scheduler::{RegisterError, Scheduler, SchedulerOptions};
