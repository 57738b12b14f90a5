//! Embedded artifact framing for standalone executables
//!
//! A release build appends the artifact to a copy of the host binary:
//!
//! ```text
//! <host binary bytes>
//! __DROEBC_DATA_START__
//! <u64 little-endian payload length>
//! <artifact bytes>
//! __DROEBC_DATA_END__
//! ```
//!
//! At startup the executable scans backwards from end-of-file for the end
//! marker; absence of the markers means the binary expects an artifact
//! path on its command line.

pub const START_MARKER: &[u8] = b"__DROEBC_DATA_START__";
pub const END_MARKER: &[u8] = b"__DROEBC_DATA_END__";

/// Append an artifact payload to host binary bytes using the framing
/// markers.
pub fn embed_artifact(host_binary: &[u8], artifact_bytes: &[u8]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(host_binary.len() + artifact_bytes.len() + START_MARKER.len() + END_MARKER.len() + 8);
    out.extend_from_slice(host_binary);
    out.extend_from_slice(START_MARKER);
    out.extend_from_slice(&(artifact_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(artifact_bytes);
    out.extend_from_slice(END_MARKER);
    out
}

/// Extract an embedded artifact payload, if present.
///
/// Scans backwards from end-of-file for the end marker, then validates the
/// length prefix and start marker before handing back the payload slice.
/// Returns `None` when the binary carries no embedded data or the framing
/// is inconsistent.
pub fn extract_artifact(binary: &[u8]) -> Option<&[u8]> {
    let end_at = rfind(binary, END_MARKER)?;
    // payload layout before the end marker: start marker, length, payload
    let payload_end = end_at;
    if payload_end < 8 {
        return None;
    }
    // Walk back: we need the length to locate the payload start, and the
    // length sits directly after the start marker.
    let start_at = rfind(&binary[..payload_end], START_MARKER)?;
    let len_at = start_at + START_MARKER.len();
    if len_at + 8 > payload_end {
        return None;
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&binary[len_at..len_at + 8]);
    let len = u64::from_le_bytes(len_bytes) as usize;
    let data_at = len_at + 8;
    if data_at + len != payload_end {
        return None;
    }
    Some(&binary[data_at..payload_end])
}

/// Last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_then_extract() {
        let host = b"\x7fELF fake binary contents".to_vec();
        let artifact = b"DRBC\x01\x00payload".to_vec();
        let combined = embed_artifact(&host, &artifact);
        assert_eq!(extract_artifact(&combined), Some(artifact.as_slice()));
    }

    #[test]
    fn test_plain_binary_has_no_artifact() {
        assert_eq!(extract_artifact(b"just a binary"), None);
    }

    #[test]
    fn test_corrupt_length_rejected() {
        let host = b"host".to_vec();
        let artifact = b"data".to_vec();
        let mut combined = embed_artifact(&host, &artifact);
        // Corrupt the length prefix
        let len_at = host.len() + START_MARKER.len();
        combined[len_at] = 0xFF;
        assert_eq!(extract_artifact(&combined), None);
    }

    #[test]
    fn test_empty_payload() {
        let combined = embed_artifact(b"host", b"");
        assert_eq!(extract_artifact(&combined), Some(&b""[..]));
    }

    #[test]
    fn test_marker_bytes_inside_host_binary() {
        // A host binary that itself contains an end marker earlier in the
        // file must not confuse the backwards scan.
        let mut host = Vec::new();
        host.extend_from_slice(END_MARKER);
        host.extend_from_slice(b"more host bytes");
        let artifact = b"real payload".to_vec();
        let combined = embed_artifact(&host, &artifact);
        assert_eq!(extract_artifact(&combined), Some(artifact.as_slice()));
    }
}
