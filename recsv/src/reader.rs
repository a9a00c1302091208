// SPDX-License-Identifier: Apache-2.0

//! The CSV row state machine and its blocking and suspending drivers.

use std::io::Read;
use encoding_rs::Encoding;
use tokio::io::AsyncRead;
use crate::chunk::{Chunk, ChunkReader, Structural};
use crate::error::{Error, ErrorKind, Result};
use crate::pool::Pool;
use crate::row::{Row, RowBuf};

/// The default raw read buffer size, 64KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Options for one reader instance, fixed for its lifetime.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct Config {
	/// The column separator character. Must be ASCII. Defaults to `,`.
	pub separator: char,
	/// The quote character. Must be ASCII. Defaults to `"`.
	pub quote: char,
	/// Whether quote characters are kept in column values. Defaults to
	/// `false`.
	pub retain_quotes: bool,
	/// The raw read buffer size in bytes. Values below the boundary carry
	/// capacity are raised to it. Defaults to [`DEFAULT_BUFFER_SIZE`].
	pub buffer_size: usize,
}

impl Default for Config {
	fn default() -> Self { Self::new() }
}

impl Config {
	/// Creates the default configuration.
	pub const fn new() -> Self {
		Self {
			separator: ',',
			quote: '"',
			retain_quotes: false,
			buffer_size: DEFAULT_BUFFER_SIZE,
		}
	}

	/// Sets the column separator.
	pub const fn with_separator(mut self, value: char) -> Self {
		self.separator = value;
		self
	}

	/// Sets the quote character.
	pub const fn with_quote(mut self, value: char) -> Self {
		self.quote = value;
		self
	}

	/// Sets whether quote characters are kept in column values.
	pub const fn with_retain_quotes(mut self, value: bool) -> Self {
		self.retain_quotes = value;
		self
	}

	/// Sets the raw read buffer size.
	pub const fn with_buffer_size(mut self, value: usize) -> Self {
		self.buffer_size = value;
		self
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
	/// At a field boundary; not yet known whether the field is quoted.
	Start,
	/// Inside an open quoted field.
	QData,
	/// Just past a closing quote; the next character disambiguates an
	/// escaped quote from a field or row end.
	QDataNext,
	/// Saw CR, awaiting LF.
	End1,
	/// Row complete.
	End2,
}

enum Step {
	/// The current chunk is exhausted; the driver must fetch the next.
	NeedChunk,
	/// The row terminator was consumed.
	RowDone,
}

/// The transition table shared by both drivers. Everything except fetching
/// the next chunk happens here.
struct Parser {
	retain_quotes: bool,
	state: State,
	chunk: Option<Chunk>,
	chunk_start: usize,
	rows_read: u64,
}

impl Parser {
	fn new(retain_quotes: bool) -> Self {
		Self {
			retain_quotes,
			state: State::Start,
			chunk: None,
			chunk_start: 0,
			rows_read: 0,
		}
	}

	fn begin_row(&mut self) {
		self.state = State::Start;
	}

	fn supply(&mut self, chunk: Chunk) {
		self.chunk = Some(chunk);
		self.chunk_start = 0;
	}

	fn malformed(&self, kind: ErrorKind) -> Error {
		Error::malformed(kind, self.rows_read)
	}

	/// Consumes structural characters from the current chunk until the row
	/// completes or the chunk runs out.
	fn step(&mut self, row: &mut Row) -> Result<Step> {
		loop {
			if self.state == State::End2 {
				return Ok(Step::RowDone);
			}
			let next = match self.chunk.as_mut() {
				None => return Ok(Step::NeedChunk),
				Some(chunk) => chunk.next_structural(),
			};
			let Some((kind, offset)) = next else {
				// The unstructured tail belongs to the field in progress.
				let chunk = self
					.chunk
					.take()
					.expect("an exhausted scan implies a current chunk");
				let remain = chunk.len() - self.chunk_start;
				if remain > 0 {
					match self.state {
						// Only a separator or line ending may follow a
						// closing quote, and only LF may follow CR.
						State::QDataNext => {
							return Err(self.malformed(ErrorKind::DataAfterQuote))
						}
						State::End1 => {
							return Err(self.malformed(ErrorKind::BareCarriageReturn))
						}
						_ => row.add_column_data(&chunk, self.chunk_start, remain),
					}
				}
				// Dropping releases the parser's retain; parts keep theirs.
				return Ok(Step::NeedChunk);
			};

			let chunk = self
				.chunk
				.as_ref()
				.expect("a structural character implies a current chunk");
			let start = self.chunk_start;
			match self.state {
				State::Start => match kind {
					Structural::Quote => {
						// The quote must be the field's first character, with
						// nothing already appended from an earlier chunk.
						if offset != start || row.last_column_size() > 0 {
							return Err(self.malformed(ErrorKind::DataBeforeQuote));
						}
						self.chunk_start = if self.retain_quotes { offset } else { offset + 1 };
						self.state = State::QData;
					}
					Structural::Separator => {
						row.add_column_data(chunk, start, offset - start);
						row.end_column();
						self.chunk_start = offset + 1;
					}
					Structural::Cr => {
						row.add_column_data(chunk, start, offset - start);
						self.chunk_start = offset + 1;
						self.state = State::End1;
					}
					Structural::Lf => {
						row.add_column_data(chunk, start, offset - start);
						self.chunk_start = offset + 1;
						self.state = State::End2;
					}
				},
				State::QData => {
					// Quoted content is opaque; only a quote ends the span.
					if kind == Structural::Quote {
						let keep = usize::from(self.retain_quotes);
						row.add_column_data(chunk, start, offset - start + keep);
						self.chunk_start = offset + 1;
						self.state = State::QDataNext;
					}
				}
				State::QDataNext => {
					if offset != start {
						return Err(self.malformed(ErrorKind::DataAfterQuote));
					}
					match kind {
						Structural::Quote => {
							// The second quote opens the next span, so the
							// doubled quote collapses to one in the value.
							self.chunk_start = offset;
							self.state = State::QData;
						}
						Structural::Separator => {
							row.end_column();
							self.chunk_start = offset + 1;
							self.state = State::Start;
						}
						Structural::Cr => {
							self.chunk_start = offset + 1;
							self.state = State::End1;
						}
						Structural::Lf => {
							self.chunk_start = offset + 1;
							self.state = State::End2;
						}
					}
				}
				State::End1 => {
					if kind != Structural::Lf || offset != start {
						return Err(self.malformed(ErrorKind::BareCarriageReturn));
					}
					row.end_column();
					self.chunk_start = offset + 1;
					self.state = State::End2;
				}
				State::End2 => unreachable!("row completion exits before matching"),
			}
		}
	}

	/// End of data: distinguishes a clean end from a row cut short.
	fn finish(&self) -> Result {
		match self.state {
			State::QData => Err(self.malformed(ErrorKind::UnclosedQuote)),
			State::End1 => Err(self.malformed(ErrorKind::BareCarriageReturn)),
			_ => Ok(()),
		}
	}
}

/// A streaming CSV reader over a byte source.
///
/// Rows are advanced one at a time and read through [`current`], which
/// borrows the reader: a row goes back to its pool on the next advance
/// unless retained with [`clone_current`]. Column values slice directly
/// into the decoded chunks; only values spanning chunks are reassembled.
///
/// [`current`]: Self::current
/// [`clone_current`]: Self::clone_current
///
/// ```
/// use recsv::{Config, CsvReader};
///
/// # fn main() -> recsv::Result {
/// let data = "name,code\r\nCountry A,A2 (ISO)\r\n";
/// let mut reader = CsvReader::new(data.as_bytes(), encoding_rs::UTF_8, Config::new())?;
/// while reader.advance()? {
/// 	let row = reader.current().expect("advance returned true");
/// 	println!("{} -> {}", &row[0], &row[1]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct CsvReader<R> {
	chunks: ChunkReader<R>,
	parser: Parser,
	row_pool: Pool<RowBuf>,
	current: Option<Row>,
}

impl<R> std::fmt::Debug for CsvReader<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CsvReader")
			.field("current", &self.current)
			.finish_non_exhaustive()
	}
}

impl<R> CsvReader<R> {
	/// Creates a reader over `source`, decoding text as `encoding`. Fails
	/// when the configured separator or quote is not ASCII.
	pub fn new(source: R, encoding: &'static Encoding, config: Config) -> Result<Self> {
		if !config.separator.is_ascii() {
			return Err(Error::config("separator must be an ASCII character"));
		}
		if !config.quote.is_ascii() {
			return Err(Error::config("quote must be an ASCII character"));
		}
		Ok(Self {
			chunks: ChunkReader::new(
				source,
				encoding,
				config.buffer_size,
				config.separator as u8,
				config.quote as u8,
			),
			parser: Parser::new(config.retain_quotes),
			row_pool: Row::pool(),
			current: None,
		})
	}

	/// The row the last advance produced. `None` before the first advance
	/// and after the end of iteration.
	pub fn current(&self) -> Option<&Row> {
		self.current.as_ref()
	}

	/// An independently-owned handle to the current row, unaffected by
	/// further advances.
	pub fn clone_current(&self) -> Option<Row> {
		self.current.clone()
	}

	/// The number of rows read so far.
	pub fn rows_read(&self) -> u64 {
		self.parser.rows_read
	}

	/// Releases the previous row and stages a fresh one.
	fn begin_advance(&mut self) -> Row {
		self.current = None;
		self.parser.begin_row();
		Row::claim(&self.row_pool)
	}

	/// Publishes a completed row, or signals the end of iteration for a row
	/// that never received a column.
	fn finish_advance(&mut self, row: Row) -> bool {
		if row.is_empty() {
			return false;
		}
		self.parser.rows_read += 1;
		self.current = Some(row);
		true
	}
}

impl<R: Read> CsvReader<R> {
	/// Advances to the next row, returning `false` at the end of the input.
	/// The previous current row is released first.
	pub fn advance(&mut self) -> Result<bool> {
		let mut row = self.begin_advance();
		loop {
			match self.parser.step(&mut row)? {
				Step::RowDone => break,
				Step::NeedChunk => match self.chunks.next_chunk()? {
					Some(chunk) => self.parser.supply(chunk),
					None => {
						self.parser.finish()?;
						break;
					}
				},
			}
		}
		Ok(self.finish_advance(row))
	}
}

impl<R: AsyncRead + Unpin> CsvReader<R> {
	/// The suspending variant of the blocking advance: identical transition
	/// logic, awaiting only while the next chunk of bytes is fetched.
	/// Dropping the future at that point cancels the read; a cancelled
	/// advance leaves the reader mid-row and unusable.
	pub async fn advance_async(&mut self) -> Result<bool> {
		let mut row = self.begin_advance();
		loop {
			match self.parser.step(&mut row)? {
				Step::RowDone => break,
				Step::NeedChunk => match self.chunks.next_chunk_async().await? {
					Some(chunk) => self.parser.supply(chunk),
					None => {
						self.parser.finish()?;
						break;
					}
				},
			}
		}
		Ok(self.finish_advance(row))
	}
}
