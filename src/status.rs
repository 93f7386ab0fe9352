/// The closed set of 3-byte ASCII status codes the gateway writes to a
/// client. Exactly one of these is written per accepted connection that
/// progresses past the read phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Backend dialed successfully; the stream becomes a transparent relay.
    Ok,
    /// No `\n` found within the 256-byte handshake window, or a read error
    /// occurred before one was found.
    MalformedRequest,
    /// The token failed to decrypt, or decrypted to something that isn't a
    /// valid `host:port`.
    BadAddress,
    /// Dial failed for a reason other than timeout.
    DialFailed,
    /// All dial attempts timed out.
    DialTimeout,
}

impl StatusCode {
    /// The literal 3-byte ASCII wire form of this status code.
    pub const fn as_bytes(self) -> &'static [u8; 3] {
        match self {
            StatusCode::Ok => b"200",
            StatusCode::MalformedRequest => b"400",
            StatusCode::BadAddress => b"401",
            StatusCode::DialFailed => b"502",
            StatusCode::DialTimeout => b"504",
        }
    }
}
