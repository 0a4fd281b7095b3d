mod engine;
mod filter;
mod geo;
#[cfg(feature = "http")]
pub mod http;
mod identity;
mod location;
mod request;
pub mod store;

pub use engine::{
    EngineConfig, EngineError, EngineSnapshot, FetchOutcome, LifecycleState, RealtimeStats,
    RefreshOutcome, RequestEngine, ViewKind,
};
#[cfg(feature = "emitter")]
pub use engine::{ViewChange, VIEW_CHANGED};
pub use filter::{
    apply_filters, apply_radius, apply_search, exclude_owner, matches_search, RadiusFilter,
    RequestFilter,
};
pub use geo::{distance_km, Coordinates, EARTH_RADIUS_KM};
pub use identity::{IdentityProvider, SessionIdentity};
pub use location::{FixedLocation, LocationError, LocationProvider};
pub use request::{
    CategorySummary, NewRequest, Request, RequestPatch, RequestStatus, UserId, UserSummary,
};
pub use store::{RequestStore, StoreError, StoreQuery};
