// Native implementations

pub mod feed_service;
pub mod http;
pub mod hub;
pub mod storage_impl;
pub mod store_actor;

pub use feed_service::{FeedService, FeedStatus, PollOutcome};
pub use http::HttpFetcher;
pub use hub::{BroadcastHub, HubEvent, HubEventKind, PublishReport, Subscription};
pub use storage_impl::FileStorage;
pub use store_actor::StoreHandle;
