//! Decoding (and, for tests, re-encoding) of the container engine's
//! multiplexed attach-stream framing.
//!
//! bollard already demultiplexes attach output into `LogOutput`
//! variants internally, so `communicator.rs` never calls `demux`
//! directly against live traffic — this module exists as a standalone,
//! engine-independent decoder matching the wire format described in
//! the glossary, so the round-trip invariant is directly testable
//! without a running engine.

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    Stdout,
    Stderr,
}

/// Walk `buf` as a sequence of 8-byte-header mux frames and return the
/// concatenated `(stdout, stderr)` payloads in arrival order. A
/// trailing fragment shorter than 8 bytes is discarded, and frames
/// whose selector byte is 0 or ≥3 are ignored (header and payload both
/// skipped).
pub fn demux(buf: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LEN <= buf.len() {
        let header = &buf[offset..offset + HEADER_LEN];
        let selector = header[0];
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        offset += HEADER_LEN;

        let end = (offset + len).min(buf.len());
        let payload = &buf[offset..end];
        offset = end;

        match selector {
            1 => stdout.extend_from_slice(payload),
            2 => stderr.extend_from_slice(payload),
            _ => {}
        }
    }

    (stdout, stderr)
}

/// Encode a single mux frame. Used only by tests to build fixtures for
/// `demux`.
pub fn encode_frame(selector: StreamSelector, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(match selector {
        StreamSelector::Stdout => 1,
        StreamSelector::Stderr => 2,
    });
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
