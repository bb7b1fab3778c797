/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Lobby commands, round expiry and reads.
pub mod lobby_service;
/// Per-viewer projection of lobby snapshots.
pub mod projection;
/// Round deadline watchdog tasks.
pub mod round_timer;
/// Server-Sent Events streaming of lobby state.
pub mod sse_service;
/// Session store connection supervisor.
pub mod storage_supervisor;
