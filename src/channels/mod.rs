//! Outbound REST collaborators. These are thin authenticated clients:
//! send the request, surface the platform's error body upward. Retry,
//! backoff and timeout policy belong to callers and the HTTP stack, not
//! here — a failed upstream call is reported, never replayed.

pub mod docspace;
pub mod workchat;

pub use docspace::DocspaceClient;
pub use workchat::WorkchatClient;
