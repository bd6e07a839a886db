//! Utility functions for minifs

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Percent-encoding set for filenames (includes /, %, and URL delimiters)
const FILENAME_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Longest encoded filename accepted anywhere in the cluster.
///
/// The encoded name is a single on-disk path component, so it must fit the
/// usual 255-byte `NAME_MAX`.
pub const MAX_ENCODED_FILENAME_LEN: usize = 255;

/// Encode a filename for URL path segments and on-disk names
pub fn encode_filename(filename: &str) -> String {
    utf8_percent_encode(filename, FILENAME_ENCODE_SET).to_string()
}

/// Decode a percent-encoded filename
pub fn decode_filename(encoded: &str) -> crate::Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|e| crate::Error::InvalidFilename(format!("{}: {}", encoded, e)))
}

/// Validate a filename (non-empty, bounded once encoded, not a path alias)
pub fn validate_filename(filename: &str) -> crate::Result<()> {
    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(crate::Error::InvalidFilename(filename.to_string()));
    }

    if filename.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidFilename(filename.to_string()));
    }

    let encoded_len = encode_filename(filename).len();
    if encoded_len > MAX_ENCODED_FILENAME_LEN {
        return Err(crate::Error::InvalidFilename(format!(
            "name encodes to {} bytes (max {})",
            encoded_len, MAX_ENCODED_FILENAME_LEN
        )));
    }

    Ok(())
}
