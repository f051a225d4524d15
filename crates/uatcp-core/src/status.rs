//! OPC UA status codes used by the transport and secure-channel layers.
//!
//! Numeric values are taken from OPC UA Part 6 Annex A / Part 4 Table 177.
//! Only the codes this layer can raise or echo are defined; everything above
//! the secure channel carries its own codes.

/// A 32-bit OPC UA status code.
///
/// The top two bits encode severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);

    /// An unrecoverable internal error, e.g. transport I/O failure.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);

    /// The certificate provided as security credentials is malformed.
    pub const BAD_CERTIFICATE_INVALID: StatusCode = StatusCode(0x8012_0000);

    /// A security check failed (signature, decryption, header or
    /// certificate mismatch).
    pub const BAD_SECURITY_CHECKS_FAILED: StatusCode = StatusCode(0x8013_0000);

    /// The message type on the wire is unknown or arrived out of phase.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);

    /// A message exceeded the negotiated size or chunk-count limits.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: StatusCode = StatusCode(0x8080_0000);

    /// The secure channel id refers to no live channel.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: StatusCode = StatusCode(0x8082_0000);

    /// Severity check: the top two bits are zero.
    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Severity check: the top bit is set.
    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
