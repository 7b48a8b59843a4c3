//! Integration coverage for `epicbox::demux` through the public API.

use epicbox::demux::{demux, encode_frame, StreamSelector};

#[test]
fn encode_then_demux_recovers_a_realistic_interleaved_session() {
    let mut buf = Vec::new();
    buf.extend(encode_frame(StreamSelector::Stdout, b"compiling...\n"));
    buf.extend(encode_frame(StreamSelector::Stderr, b"warning: unused import\n"));
    buf.extend(encode_frame(StreamSelector::Stdout, b"done\n"));

    let (stdout, stderr) = demux(&buf);
    assert_eq!(stdout, b"compiling...\ndone\n");
    assert_eq!(stderr, b"warning: unused import\n");
}

#[test]
fn empty_buffer_yields_empty_streams() {
    let (stdout, stderr) = demux(&[]);
    assert!(stdout.is_empty());
    assert!(stderr.is_empty());
}
