//! Canonical byte encoding of a signed request body.
//!
//! The signer renders the body as JSON with `", "` / `": "` separators and
//! ASCII-only output (`\uXXXX` escapes, surrogate pairs above the BMP),
//! prefixed with the signature version tag. Both sides must agree byte for
//! byte, so the encoding here reproduces that format exactly.

use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

use crate::ActionRequestBody;

/// Signature scheme version, used as `v0:` in the signed bytes and `v0=` in
/// the signature string.
pub const SIGNATURE_VERSION: &str = "v0";

/// `"v0:"` followed by the canonical JSON of `body`.
pub fn canonical_body(body: &ActionRequestBody) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(SIGNATURE_VERSION.as_bytes());
    out.push(b':');
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    body.serialize(&mut serializer)?;
    Ok(out)
}

/// Compact JSON with a space after `,` and `:`, escaping DEL and all
/// non-ASCII. Control characters below 0x20 are escaped by serde_json itself.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\u{7f}' {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
