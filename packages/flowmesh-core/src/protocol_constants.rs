//! Fixed protocol constants.
//!
//! These values are part of the wire contract with the graph editor and the
//! deployment tooling; changing them breaks clients.

/// Application name used in client-facing metadata.
pub const APP_NAME: &str = "Flowmesh";

/// Service identifier returned by the health endpoint.
///
/// The editor probes `/health` and expects this exact string to identify a
/// Flowmesh server.
pub const SERVICE_ID: &str = "flowmesh";

/// First port tried when no preferred port is configured.
pub const PORT_SCAN_START: u16 = 49600;

/// Last port tried when no preferred port is configured.
pub const PORT_SCAN_END: u16 = 49610;
