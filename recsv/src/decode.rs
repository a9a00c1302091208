// SPDX-License-Identifier: Apache-2.0

//! Decoding raw reads whose final character may be split across the read
//! boundary.

use all_asserts::assert_le;
use amplify_derive::Display;
use encoding_rs::{DecoderResult, Encoding, UTF_8};
use simdutf8::basic;
use simdutf8::compat::from_utf8;
use thiserror::Error;

/// The most bytes a boundary split can leave undecoded. UTF-8 needs at most
/// three; multi-byte legacy encodings stay well under this.
pub(crate) const MAX_CARRY: usize = 16;

/// A decode error.
#[derive(Copy, Clone, Debug, Error)]
#[error(
	"{kind} {encoding} byte sequence ({:X?}) at offset {offset}",
	self.bytes()
)]
pub struct DecodeError {
	/// The name of the encoding being decoded.
	pub encoding: &'static str,
	/// The byte offset of the offending sequence within the read buffer.
	pub offset: usize,
	/// The offending byte sequence, padded with zeros.
	pub bytes: [u8; 8],
	/// The number of bytes in the offending sequence.
	pub count: usize,
	/// The error kind.
	pub kind: DecodeErrorKind,
}

#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum DecodeErrorKind {
	/// A byte sequence invalid in the configured encoding.
	#[display("invalid")]
	InvalidSequence,
	/// A character cut off by the end of the stream.
	#[display("incomplete")]
	IncompleteChar,
}

impl DecodeError {
	pub(crate) fn invalid_seq(encoding: &'static Encoding, offset: usize, seq: &[u8]) -> Self {
		Self::new(DecodeErrorKind::InvalidSequence, encoding, offset, seq)
	}

	pub(crate) fn incomplete_char(encoding: &'static Encoding, offset: usize, seq: &[u8]) -> Self {
		Self::new(DecodeErrorKind::IncompleteChar, encoding, offset, seq)
	}

	fn new(kind: DecodeErrorKind, encoding: &'static Encoding, offset: usize, seq: &[u8]) -> Self {
		let mut bytes = [0; 8];
		let count = seq.len().min(bytes.len());
		bytes[..count].copy_from_slice(&seq[..count]);
		Self { encoding: encoding.name(), offset, bytes, count, kind }
	}

	/// The offending byte sequence.
	pub fn bytes(&self) -> &[u8] {
		&self.bytes[..self.count]
	}
}

impl DecodeErrorKind {
	pub fn is_invalid_sequence(&self) -> bool {
		matches!(self, Self::InvalidSequence)
	}

	pub fn is_incomplete_char(&self) -> bool {
		matches!(self, Self::IncompleteChar)
	}
}

/// Decodes raw reads into characters, detaching the undecodable tail that a
/// fixed-size read can cut off mid-character. The tail goes back to the
/// caller to prepend to the next read; an undecodable sequence anywhere
/// before the end of the input is a genuine [`DecodeError`].
pub(crate) struct BoundaryDecoder {
	encoding: &'static Encoding,
}

impl BoundaryDecoder {
	pub fn new(encoding: &'static Encoding) -> Self {
		Self { encoding }
	}

	pub fn encoding(&self) -> &'static Encoding { self.encoding }

	/// Decodes `bytes` onto the end of `out`, returning the trailing bytes of
	/// a character split by the read boundary. The returned slice is empty
	/// when the input decoded completely.
	pub fn decode<'b>(&self, bytes: &'b [u8], out: &mut String) -> Result<&'b [u8], DecodeError> {
		if self.encoding == UTF_8 {
			self.decode_utf8(bytes, out)
		} else {
			self.decode_other(bytes, out)
		}
	}

	fn decode_utf8<'b>(&self, bytes: &'b [u8], out: &mut String) -> Result<&'b [u8], DecodeError> {
		match from_utf8(bytes) {
			Ok(str) => {
				out.push_str(str);
				Ok(&[])
			}
			Err(err) if err.error_len().is_none() => {
				let (valid, tail) = bytes.split_at(err.valid_up_to());
				let valid = basic::from_utf8(valid)
					.expect("data should be valid UTF-8 up to the split");
				out.push_str(valid);
				Ok(tail)
			}
			Err(err) => {
				let start = err.valid_up_to();
				let len = err.error_len().expect("invalid sequences have a length");
				Err(DecodeError::invalid_seq(
					self.encoding,
					start,
					&bytes[start..start + len],
				))
			}
		}
	}

	fn decode_other<'b>(&self, bytes: &'b [u8], out: &mut String) -> Result<&'b [u8], DecodeError> {
		let mut decoder = self.encoding.new_decoder_without_bom_handling();
		let mut read_total = 0;
		loop {
			out.reserve(
				decoder
					.max_utf8_buffer_length_without_replacement(bytes.len() - read_total)
					.unwrap_or(MAX_CARRY),
			);
			let (result, read) =
				decoder.decode_to_string_without_replacement(&bytes[read_total..], out, false);
			read_total += read;
			match result {
				DecoderResult::InputEmpty => break,
				DecoderResult::OutputFull => continue,
				DecoderResult::Malformed(bad, extra) => {
					let end = read_total - extra as usize;
					let start = end - bad as usize;
					return Err(DecodeError::invalid_seq(
						self.encoding,
						start,
						&bytes[start..end],
					));
				}
			}
		}
		// A character split at the boundary sits in the decoder state, not
		// the output; flushing an empty final input tells it apart from a
		// clean end.
		loop {
			let (result, _) = decoder.decode_to_string_without_replacement(&[], out, true);
			match result {
				DecoderResult::InputEmpty => return Ok(&[]),
				DecoderResult::OutputFull => {
					out.reserve(MAX_CARRY);
					continue;
				}
				DecoderResult::Malformed(bad, _) => {
					let tail = &bytes[bytes.len() - bad as usize..];
					assert_le!(
						tail.len(),
						MAX_CARRY,
						"a boundary split should fit the carry buffer"
					);
					return Ok(tail);
				}
			}
		}
	}
}
