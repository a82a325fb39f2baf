//! Starchart dataset: canonical normalization, caching and background execution.
mod cache;
mod normalize;
mod normalizer;
mod types;
mod worker;

pub use cache::{CacheKey, CacheStats, Fingerprint};
pub use normalize::normalize_dataset;
pub use normalizer::{
    NormalizeOptions, Normalized, Normalizer, NormalizerSettings, PendingNormalization,
};
pub use types::{
    CanonicalDataset, CanonicalSystem, NormalizationError, PixelSource, ENDPOINT_PIXELS_FIELD,
    ERRORS_FIELD, SECTORS_FIELD, SYSTEMS_FIELD, SYSTEM_GRID_FIELD, SYSTEM_PIXELS_FIELD,
};
pub use worker::{
    EventSink, RequestId, ThreadWorkerFactory, Worker, WorkerError, WorkerEvent, WorkerFactory,
    WorkerReply, WorkerRequest,
};
