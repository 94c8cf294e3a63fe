mod track;

pub use track::{
    ClickEvent, DimensionCount, EmailContext, GeoCacheEntry, NewClick, TrackDimension, TrackHit,
    TrackIdentity, TrackSnapshot, TrackSummary,
};
