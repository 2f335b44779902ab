//! Engine version and protocol-header compatibility.
//!
//! Peers advertise a protocol tag of the form `sealkit/<major>[.<minor>]` in
//! their message headers. Compatibility is a pure string predicate: same
//! scheme name and same major version. No network I/O happens here.

/// Crate version of the engine, surfaced to the host.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol scheme name.
pub const PROTOCOL_TAG: &str = "sealkit";

/// Protocol major version this engine speaks.
pub const PROTOCOL_MAJOR: u32 = 1;

/// The header value this engine advertises.
pub fn protocol_header() -> String {
    format!("{}/{}", PROTOCOL_TAG, PROTOCOL_MAJOR)
}

/// Whether a remote peer's protocol header is compatible with this engine.
///
/// Accepts `sealkit/<major>` and `sealkit/<major>.<minor>` with a matching
/// major version. Surrounding whitespace is tolerated; anything else is not.
pub fn is_compatible_header(header: &str) -> bool {
    let header = header.trim();
    let Some((tag, version)) = header.split_once('/') else {
        return false;
    };
    if tag != PROTOCOL_TAG {
        return false;
    }
    let major_part = version.split('.').next().unwrap_or(version);
    match major_part.parse::<u32>() {
        Ok(major) => major == PROTOCOL_MAJOR,
        Err(_) => false,
    }
}
