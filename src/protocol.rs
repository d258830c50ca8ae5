/*!
 * RESP Wire Protocol Codec
 *
 * This module implements encoding and decoding for the Redis Serialization
 * Protocol (RESP) as used on the client-facing wire. Requests arrive as
 * arrays of bulk strings; responses are simple strings, bulk strings,
 * arrays, errors, or the null-bulk sentinel.
 *
 * All functions here are pure: the decoder consumes exactly one complete
 * frame that must already be fully present in the supplied buffer and
 * keeps no state between calls. Framing across partial reads is the
 * caller's problem (see net.rs).
 */

/// Encode a simple string response (+OK\r\n)
///
/// Used for status responses like "OK", "PONG", "FULLRESYNC ...".
pub fn resp_simple(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 3);
    v.push(b'+');
    v.extend_from_slice(s.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode a bulk string response ($<len>\r\n<data>\r\n)
///
/// `<len>` is the exact byte length of the payload.
pub fn resp_bulk(s: &str) -> Vec<u8> {
    let len_str = s.len().to_string();
    let mut v = Vec::with_capacity(1 + len_str.len() + 2 + s.len() + 2);
    v.push(b'$');
    v.extend_from_slice(len_str.as_bytes());
    v.extend_from_slice(b"\r\n");
    v.extend_from_slice(s.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode an array response (*<count>\r\n<item1><item2>...)
///
/// Each item is bulk-encoded in order. Used for KEYS and CONFIG GET
/// results.
pub fn resp_array(items: &[String]) -> Vec<u8> {
    let len_str = items.len().to_string();
    let mut out =
        Vec::with_capacity(1 + len_str.len() + 2 + items.iter().map(|i| i.len() + 8).sum::<usize>());
    out.push(b'*');
    out.extend_from_slice(len_str.as_bytes());
    out.extend_from_slice(b"\r\n");
    for item in items {
        out.extend_from_slice(&resp_bulk(item));
    }
    out
}

/// Encode an error response (-<msg>\r\n)
pub fn resp_error(msg: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(msg.len() + 3);
    v.push(b'-');
    v.extend_from_slice(msg.as_bytes());
    v.extend_from_slice(b"\r\n");
    v
}

/// Encode the null-bulk sentinel ($-1\r\n)
///
/// Sent when a key is absent or expired.
pub fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Decode one request array into its elements
///
/// Expects `*<count>\r\n` followed by `<count>` bulk strings, each a
/// `$<len>\r\n` header and `<len>` payload bytes. Returns an empty vector
/// when the input does not begin with a well-formed array header.
///
/// Lenient by policy rather than strict: a payload shorter than its
/// declared length is truncated to the bytes actually present, and input
/// that runs out before `<count>` elements yields the elements parsed so
/// far. Real clients never produce either shape.
pub fn parse_request(data: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    let header = match read_line(data, &mut pos) {
        Some(line) if line.first() == Some(&b'*') => line,
        _ => return out,
    };
    let count = match ascii_int(&header[1..]) {
        Some(n) if n > 0 => n as usize,
        _ => return out,
    };

    out.reserve(count);
    for _ in 0..count {
        // Element header. Exhausted or malformed input ends the request
        // early with a short result.
        let header = match read_line(data, &mut pos) {
            Some(line) if line.first() == Some(&b'$') => line,
            _ => break,
        };
        let declared = match ascii_int(&header[1..]) {
            Some(n) if n >= 0 => n as usize,
            _ => break,
        };

        let avail = data.len().saturating_sub(pos);
        let take = declared.min(avail);
        out.push(String::from_utf8_lossy(&data[pos..pos + take]).into_owned());
        pos += take;

        // Step over the payload terminator when it is present.
        if data[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else if data[pos..].starts_with(b"\n") {
            pos += 1;
        }
    }
    out
}

/// Decode a simple string reply (+...\r\n)
///
/// Returns the text between `+` and the first line terminator, or an
/// empty string when the input is not a simple string. Only used for
/// parsing master replies during the replica handshake.
pub fn parse_simple(data: &[u8]) -> String {
    if data.first() != Some(&b'+') {
        return String::new();
    }
    match data.windows(2).position(|w| w == b"\r\n") {
        Some(end) => String::from_utf8_lossy(&data[1..end]).into_owned(),
        None => String::new(),
    }
}

/// Read one CRLF-terminated line, advancing the cursor past it
///
/// A trailing carriage return is trimmed before the line is returned.
/// Returns None when no line terminator remains in the input.
fn read_line<'a>(data: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = data.get(*pos..)?;
    let nl = rest.iter().position(|&b| b == b'\n')?;
    *pos += nl + 1;
    let mut line = &rest[..nl];
    if let Some((&b'\r', head)) = line.split_last() {
        line = head;
    }
    Some(line)
}

/// Parse a decimal integer field like an array count or bulk length
fn ascii_int(s: &[u8]) -> Option<i64> {
    std::str::from_utf8(s).ok()?.parse::<i64>().ok()
}
