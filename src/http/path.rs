//! Target decoding and path canonicalization.
//!
//! Runs after parsing and before routing: the (already API-narrowed) target
//! is percent-decoded into `decoded_target`, then canonicalized into
//! `normalized_path`. Decode must run first; a percent-encoded dot or slash
//! has to take part in normalization.

use crate::{errors::ErrorKind, http::request::RequestDescriptor};

/// Resolves the descriptor's target into its normalized path.
pub(crate) fn resolve(req: &mut RequestDescriptor, buf: &[u8]) -> Result<(), ErrorKind> {
    debug_assert!(!req.target.is_empty());

    let target = req.target.slice(buf);
    decode(target, &mut req.decoded_target)?;

    let RequestDescriptor {
        decoded_target,
        normalized_path,
        ..
    } = req;
    normalize(decoded_target, normalized_path)
}

/// Percent-decodes `input` into `out`. A `%` must be followed by exactly two
/// hex digits; every other byte copies through. Output never exceeds the
/// input length.
pub(crate) fn decode(input: &[u8], out: &mut Vec<u8>) -> Result<(), ErrorKind> {
    out.clear();

    let mut at = 0;
    while at < input.len() {
        match input[at] {
            b'%' => {
                let high = input
                    .get(at + 1)
                    .and_then(|&b| hex_digit(b))
                    .ok_or(ErrorKind::BadRequestPath)?;
                let low = input
                    .get(at + 2)
                    .and_then(|&b| hex_digit(b))
                    .ok_or(ErrorKind::BadRequestPath)?;

                out.push(high << 4 | low);
                at += 3;
            }
            byte => {
                out.push(byte);
                at += 1;
            }
        }
    }

    Ok(())
}

#[inline(always)]
fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Canonicalizes a slash-separated path with a segment stack. The result
/// always starts with `/`, holds no `.`/`..` segments and no redundant
/// separators, and is idempotent. Popping past the root fails.
pub(crate) fn normalize(input: &[u8], out: &mut Vec<u8>) -> Result<(), ErrorKind> {
    out.clear();

    let mut segments: Vec<&[u8]> = Vec::new();
    for segment in input.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                if segments.pop().is_none() {
                    return Err(ErrorKind::BadRequestPath);
                }
            }
            other => segments.push(other),
        }
    }

    out.push(b'/');
    for (at, segment) in segments.iter().enumerate() {
        if at > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(segment);
    }

    Ok(())
}
