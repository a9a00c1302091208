// SPDX-License-Identifier: Apache-2.0

//! Pooled chunks of decoded text and the reader that produces them.
//!
//! Chunks are claimed from a pool, filled with one raw read's worth of
//! decoded characters, and shared by reference between the parser and any
//! column parts sliced out of them. The last handle to release a chunk
//! returns its buffer to the pool.

use std::io::{self, Read};
use std::rc::Rc;
use arrayvec::ArrayVec;
use encoding_rs::Encoding;
use tokio::io::{AsyncRead, AsyncReadExt};
use crate::decode::{BoundaryDecoder, DecodeError, MAX_CARRY};
use crate::error::Result;
use crate::pool::Pool;

/// A structural character reported by the chunk scanner.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Structural {
	Separator,
	Quote,
	Cr,
	Lf,
}

/// The pooled buffer behind [`Chunk`] handles: decoded text plus the two
/// configured structural bytes the scanner matches on.
#[derive(Debug)]
pub(crate) struct ChunkBuf {
	data: String,
	separator: u8,
	quote: u8,
}

impl ChunkBuf {
	fn new(separator: u8, quote: u8) -> Self {
		Self {
			data: String::new(),
			separator,
			quote,
		}
	}

	fn classify(&self, byte: u8) -> Option<Structural> {
		match byte {
			b'\r' => Some(Structural::Cr),
			b'\n' => Some(Structural::Lf),
			_ if byte == self.separator => Some(Structural::Separator),
			_ if byte == self.quote => Some(Structural::Quote),
			_ => None,
		}
	}
}

/// A reference-counted handle to a pooled chunk of decoded characters, with
/// its own structural scan cursor.
///
/// Cloning shares the buffer under a fresh cursor; the parser is the only
/// handle that drives its cursor. Dropping the last handle returns the
/// buffer to its pool.
pub(crate) struct Chunk {
	buf: Option<Rc<ChunkBuf>>,
	pool: Pool<ChunkBuf>,
	pos: usize,
}

impl std::fmt::Debug for Chunk {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Chunk")
			.field("buf", &self.buf)
			.field("pos", &self.pos)
			.finish_non_exhaustive()
	}
}

impl Chunk {
	fn buf(&self) -> &ChunkBuf {
		self.buf
			.as_ref()
			.expect("chunk handle should hold its buffer until dropped")
	}

	/// The decoded text.
	pub fn data(&self) -> &str {
		&self.buf().data
	}

	/// The decoded length in bytes.
	pub fn len(&self) -> usize {
		self.buf().data.len()
	}

	/// Scans forward to the next structural character, skipping runs of
	/// ordinary data, and reports its kind and byte offset. Returns `None`
	/// once the valid region holds no further structural characters. The
	/// cursor only moves forward; [`reset`](Self::reset) rewinds it.
	pub fn next_structural(&mut self) -> Option<(Structural, usize)> {
		let buf = self
			.buf
			.as_ref()
			.expect("chunk handle should hold its buffer until dropped");
		let bytes = buf.data.as_bytes();
		let mut pos = self.pos;
		let mut found = None;
		while pos < bytes.len() {
			let kind = buf.classify(bytes[pos]);
			pos += 1;
			if let Some(kind) = kind {
				found = Some((kind, pos - 1));
				break;
			}
		}
		self.pos = pos;
		found
	}

	/// Rewinds the scan cursor for another pass.
	#[allow(dead_code)]
	pub fn reset(&mut self) {
		self.pos = 0;
	}
}

impl Clone for Chunk {
	fn clone(&self) -> Self {
		Self {
			buf: self.buf.clone(),
			pool: self.pool.clone(),
			pos: 0,
		}
	}
}

impl Drop for Chunk {
	fn drop(&mut self) {
		if let Some(buf) = self.buf.take() {
			self.pool.collect(buf);
		}
	}
}

/// Pulls raw bytes from the source, carries boundary-split bytes between
/// reads, and decodes each filled buffer into a pooled [`Chunk`].
pub(crate) struct ChunkReader<R> {
	source: R,
	decoder: BoundaryDecoder,
	buf: Box<[u8]>,
	carry: ArrayVec<u8, MAX_CARRY>,
	pool: Pool<ChunkBuf>,
	eos: bool,
}

impl<R> ChunkReader<R> {
	pub fn new(
		source: R,
		encoding: &'static Encoding,
		buffer_size: usize,
		separator: u8,
		quote: u8,
	) -> Self {
		// Progress needs at least one fresh byte after the carried prefix.
		let buffer_size = buffer_size.max(MAX_CARRY);
		Self {
			source,
			decoder: BoundaryDecoder::new(encoding),
			buf: vec![0; buffer_size].into_boxed_slice(),
			carry: ArrayVec::new(),
			pool: Pool::new(move || ChunkBuf::new(separator, quote)),
			eos: false,
		}
	}

	/// Copies carried bytes to the buffer front, returning the filled length.
	fn restore_carry(&mut self) -> usize {
		let len = self.carry.len();
		self.buf[..len].copy_from_slice(&self.carry);
		self.carry.clear();
		len
	}

	/// Decodes the filled region into a pooled chunk and stashes the new
	/// boundary carry. A fill short of the buffer's capacity marks the end
	/// of the stream.
	fn finish(&mut self, filled: usize) -> Result<Option<Chunk>> {
		if filled < self.buf.len() {
			self.eos = true;
		}
		if filled == 0 {
			return Ok(None);
		}

		let mut buf = self.pool.claim();
		let chunk = Rc::get_mut(&mut buf).expect("claimed chunk should be uniquely owned");
		chunk.data.clear();
		let leftover = self.decoder.decode(&self.buf[..filled], &mut chunk.data)?;
		if !leftover.is_empty() {
			if self.eos {
				// No further read can complete the character.
				return Err(DecodeError::incomplete_char(
					self.decoder.encoding(),
					filled - leftover.len(),
					leftover,
				)
				.into());
			}
			self.carry
				.try_extend_from_slice(leftover)
				.expect("boundary carry should fit");
		}
		Ok(Some(Chunk {
			buf: Some(buf),
			pool: self.pool.clone(),
			pos: 0,
		}))
	}
}

impl<R: Read> ChunkReader<R> {
	/// Reads and decodes the next chunk, or `None` once the source is
	/// exhausted. Short reads from the source are retried; only a zero-length
	/// read ends the fill early.
	pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
		if self.eos {
			return Ok(None);
		}
		let mut filled = self.restore_carry();
		while filled < self.buf.len() {
			match self.source.read(&mut self.buf[filled..]) {
				Ok(0) => break,
				Ok(count) => filled += count,
				Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
				Err(err) => return Err(err.into()),
			}
		}
		self.finish(filled)
	}
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
	/// The suspending variant of the blocking read, awaiting only at the
	/// source.
	pub async fn next_chunk_async(&mut self) -> Result<Option<Chunk>> {
		if self.eos {
			return Ok(None);
		}
		let mut filled = self.restore_carry();
		while filled < self.buf.len() {
			let count = self.source.read(&mut self.buf[filled..]).await?;
			if count == 0 {
				break;
			}
			filled += count;
		}
		self.finish(filled)
	}
}

#[cfg(test)]
mod test {
	use encoding_rs::UTF_8;
	use super::*;

	fn make(data: &str) -> Chunk {
		let pool = Pool::new(|| ChunkBuf::new(b',', b'"'));
		let mut buf = pool.claim();
		Rc::get_mut(&mut buf).unwrap().data.push_str(data);
		Chunk { buf: Some(buf), pool, pos: 0 }
	}

	fn reader(data: &[u8], buffer_size: usize) -> ChunkReader<&[u8]> {
		ChunkReader::new(data, UTF_8, buffer_size, b',', b'"')
	}

	#[test]
	fn reports_structural_characters_only() {
		let mut chunk = make("ab,c\"d\r\n");
		assert_eq!(chunk.next_structural(), Some((Structural::Separator, 2)));
		assert_eq!(chunk.next_structural(), Some((Structural::Quote, 4)));
		assert_eq!(chunk.next_structural(), Some((Structural::Cr, 6)));
		assert_eq!(chunk.next_structural(), Some((Structural::Lf, 7)));
		assert_eq!(chunk.next_structural(), None);
	}

	#[test]
	fn reset_rewinds_the_cursor() {
		let mut chunk = make("x,y");
		assert_eq!(chunk.next_structural(), Some((Structural::Separator, 1)));
		assert_eq!(chunk.next_structural(), None);
		chunk.reset();
		assert_eq!(chunk.next_structural(), Some((Structural::Separator, 1)));
	}

	#[test]
	fn clone_shares_data_under_a_fresh_cursor() {
		let mut chunk = make("x,y");
		assert!(chunk.next_structural().is_some());
		let mut alias = chunk.clone();
		assert_eq!(alias.data(), "x,y");
		assert_eq!(alias.next_structural(), Some((Structural::Separator, 1)));
	}

	#[test]
	fn recycles_after_the_last_drop() {
		let chunk = make("x");
		let pool = chunk.pool.clone();
		let alias = chunk.clone();
		let ptr = Rc::as_ptr(chunk.buf.as_ref().unwrap());
		drop(chunk);
		drop(alias);
		assert_eq!(Rc::as_ptr(&pool.claim()), ptr);
	}

	#[test]
	fn reassembles_input_across_chunks() {
		let input = "aaaaaaaaaaaaaaaé,b\nccccccccccccc";
		let mut chunks = reader(input.as_bytes(), 16);
		let mut decoded = String::new();
		while let Some(chunk) = chunks.next_chunk().unwrap() {
			decoded.push_str(chunk.data());
		}
		assert_eq!(decoded, input);
	}

	#[test]
	fn signals_end_of_stream_after_a_short_fill() {
		let mut chunks = reader(b"tiny", 16);
		assert!(chunks.next_chunk().unwrap().is_some());
		assert!(chunks.next_chunk().unwrap().is_none());
		assert!(chunks.next_chunk().unwrap().is_none());
	}

	#[test]
	fn rejects_a_character_cut_off_by_the_stream_end() {
		let err = reader(b"caf\xC3", 16).next_chunk().unwrap_err();
		assert_eq!(err.kind(), crate::ErrorKind::Decode);
		assert!(err
			.decode_source()
			.is_some_and(|source| source.kind.is_incomplete_char()));
	}
}
