// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`serde_json::ser::Formatter`] that emits OLPC-style canonical JSON:
//! object keys are ordered lexicographically by their serialized form,
//! strings are normalized to Unicode NFC, and floating point numbers are
//! rejected (canonical JSON has no use for them and TUF metadata never
//! encodes one).
//!
//! `serde_json`'s `Formatter` hooks see bytes in the order the `Serialize`
//! impl emits them, which for maps is whatever order the underlying
//! collection iterates in. To produce a stable byte stream regardless of
//! that iteration order, this formatter buffers each object's entries in
//! memory, sorts them once the object closes, and then writes the sorted
//! form. Arrays are buffered the same way so nested objects still get
//! rewritten correctly before their bytes are flushed to an enclosing
//! container (or the output writer, at the top level).

use serde::Serialize;
use std::io;
use unicode_normalization::UnicodeNormalization;

/// Serializes `value` as canonical JSON and returns the resulting bytes.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(buf)
}

enum Frame {
    Array {
        items: Vec<Vec<u8>>,
        current: Vec<u8>,
    },
    Object {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        current_key: Vec<u8>,
        current_value: Vec<u8>,
        in_value: bool,
    },
}

/// A `serde_json::ser::Formatter` implementation producing OLPC-style
/// canonical JSON output.
#[derive(Default)]
pub struct CanonicalFormatter {
    stack: Vec<Frame>,
}

impl CanonicalFormatter {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn write_raw<W: ?Sized + io::Write>(&mut self, writer: &mut W, bytes: &[u8]) -> io::Result<()> {
        match self.stack.last_mut() {
            None => writer.write_all(bytes),
            Some(Frame::Array { current, .. }) => {
                current.extend_from_slice(bytes);
                Ok(())
            }
            Some(Frame::Object {
                current_key,
                current_value,
                in_value,
                ..
            }) => {
                if *in_value {
                    current_value.extend_from_slice(bytes);
                } else {
                    current_key.extend_from_slice(bytes);
                }
                Ok(())
            }
        }
    }
}

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn write_null<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.write_raw(writer, b"null")
    }

    fn write_bool<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: bool) -> io::Result<()> {
        self.write_raw(writer, if value { b"true" } else { b"false" })
    }

    fn write_i8<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: i8) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_i16<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: i16) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_i32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: i32) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_i64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: i64) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_u8<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: u8) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_u16<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: u16) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_u32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: u32) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_u64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: u64) -> io::Result<()> {
        self.write_raw(writer, value.to_string().as_bytes())
    }

    fn write_f32<W: ?Sized + io::Write>(&mut self, _writer: &mut W, _value: f32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "canonical JSON cannot encode floating point numbers",
        ))
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, _writer: &mut W, _value: f64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "canonical JSON cannot encode floating point numbers",
        ))
    }

    fn write_number_str<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: &str) -> io::Result<()> {
        if value.contains('.') || value.contains('e') || value.contains('E') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "canonical JSON cannot encode floating point numbers",
            ));
        }
        self.write_raw(writer, value.as_bytes())
    }

    fn begin_string<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.write_raw(writer, b"\"")
    }

    fn end_string<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.write_raw(writer, b"\"")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let normalized: String = fragment.nfc().collect();
        self.write_raw(writer, normalized.as_bytes())
    }

    fn write_char_escape<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        char_escape: serde_json::ser::CharEscape,
    ) -> io::Result<()> {
        use serde_json::ser::CharEscape::*;

        let s = match char_escape {
            Quote => "\\\"".to_string(),
            ReverseSolidus => "\\\\".to_string(),
            Solidus => "\\/".to_string(),
            Backspace => "\\b".to_string(),
            FormFeed => "\\f".to_string(),
            LineFeed => "\\n".to_string(),
            CarriageReturn => "\\r".to_string(),
            Tab => "\\t".to_string(),
            AsciiControl(byte) => format!("\\u{:04x}", byte),
        };
        self.write_raw(writer, s.as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.stack.push(Frame::Array {
            items: Vec::new(),
            current: Vec::new(),
        });
        Ok(())
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        _writer: &mut W,
        _first: bool,
    ) -> io::Result<()> {
        Ok(())
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        if let Some(Frame::Array { items, current }) = self.stack.last_mut() {
            items.push(std::mem::take(current));
        }
        Ok(())
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        let items = match self.stack.pop() {
            Some(Frame::Array { items, .. }) => items,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed array")),
        };
        let mut out = Vec::with_capacity(2 + items.iter().map(Vec::len).sum::<usize>() + items.len());
        out.push(b'[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.extend_from_slice(item);
        }
        out.push(b']');
        self.write_raw(writer, &out)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.stack.push(Frame::Object {
            entries: Vec::new(),
            current_key: Vec::new(),
            current_value: Vec::new(),
            in_value: false,
        });
        Ok(())
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        _writer: &mut W,
        _first: bool,
    ) -> io::Result<()> {
        if let Some(Frame::Object { in_value, .. }) = self.stack.last_mut() {
            *in_value = false;
        }
        Ok(())
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        if let Some(Frame::Object { in_value, .. }) = self.stack.last_mut() {
            *in_value = true;
        }
        Ok(())
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        if let Some(Frame::Object {
            entries,
            current_key,
            current_value,
            ..
        }) = self.stack.last_mut()
        {
            entries.push((std::mem::take(current_key), std::mem::take(current_value)));
        }
        Ok(())
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        let mut entries = match self.stack.pop() {
            Some(Frame::Object { entries, .. }) => entries,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed object")),
        };
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.dedup_by(|(a, _), (b, _)| a == b);

        let size = 2 + entries
            .iter()
            .map(|(k, v)| k.len() + v.len() + 1)
            .sum::<usize>();
        let mut out = Vec::with_capacity(size);
        out.push(b'{');
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.extend_from_slice(key);
            out.push(b':');
            out.extend_from_slice(value);
        }
        out.push(b'}');
        self.write_raw(writer, &out)
    }
}
