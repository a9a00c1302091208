// SPDX-License-Identifier: Apache-2.0

//! Rows of zero-copy columns, pooled and reference-counted like chunks.

use std::fmt::{self, Debug, Formatter};
use std::ops::Index;
use std::rc::Rc;
use once_cell::unsync::OnceCell;
use crate::chunk::Chunk;
use crate::pool::Pool;

/// One contiguous span of a column's text within a single chunk. The chunk
/// handle keeps the span's backing buffer alive and out of the pool.
struct Part {
	chunk: Chunk,
	offset: usize,
	len: usize,
}

impl Part {
	fn as_str(&self) -> &str {
		&self.chunk.data()[self.offset..self.offset + self.len]
	}
}

/// An ordered run of parts forming one field's value.
///
/// A single-part column reads straight out of its chunk; a value crossing
/// chunks is concatenated once and cached until the column is reused.
#[derive(Default)]
struct Column {
	parts: Vec<Part>,
	value: OnceCell<String>,
}

impl Column {
	fn add_part(&mut self, chunk: &Chunk, offset: usize, len: usize) {
		self.value.take();
		self.parts.push(Part {
			chunk: chunk.clone(),
			offset,
			len,
		});
	}

	fn value(&self) -> &str {
		if let [part] = &self.parts[..] {
			return part.as_str();
		}
		self.value
			.get_or_init(|| self.parts.iter().map(Part::as_str).collect())
	}

	fn clear(&mut self) {
		self.parts.clear();
		self.value.take();
	}
}

/// The pooled state behind [`Row`] handles.
pub(crate) struct RowBuf {
	columns: Vec<Column>,
	count: usize,
	last_column_size: usize,
	next_column: bool,
}

impl RowBuf {
	fn new() -> Self {
		Self {
			columns: Vec::new(),
			count: 0,
			last_column_size: 0,
			next_column: true,
		}
	}

	/// Opens the next column if the previous one was ended. Columns and
	/// their part vectors are reused across rows.
	fn open_column(&mut self) {
		if !self.next_column {
			return;
		}
		self.next_column = false;
		if self.count == self.columns.len() {
			self.columns.push(Column::default());
		}
		self.count += 1;
	}

	fn clear(&mut self) {
		for column in &mut self.columns[..self.count] {
			column.clear();
		}
		self.count = 0;
		self.last_column_size = 0;
		self.next_column = true;
	}
}

/// A reference-counted handle to one parsed row.
///
/// The reader's current row is borrowed from the reader, so it cannot be
/// read past the next advance; cloning yields an independently-owned handle
/// whose values stay valid until it is dropped. Dropping the last handle
/// clears the columns, releasing their chunk references, and returns the
/// row to its pool.
pub struct Row {
	buf: Option<Rc<RowBuf>>,
	pool: Pool<RowBuf>,
}

impl Row {
	pub(crate) fn pool() -> Pool<RowBuf> {
		Pool::new(RowBuf::new)
	}

	pub(crate) fn claim(pool: &Pool<RowBuf>) -> Self {
		Self {
			buf: Some(pool.claim()),
			pool: pool.clone(),
		}
	}

	fn buf(&self) -> &RowBuf {
		self.buf
			.as_ref()
			.expect("row handle should hold its buffer until dropped")
	}

	fn buf_mut(&mut self) -> &mut RowBuf {
		Rc::get_mut(
			self.buf
				.as_mut()
				.expect("row handle should hold its buffer until dropped"),
		)
		.expect("a row under assembly should be uniquely owned")
	}

	/// The number of columns in the row.
	pub fn count(&self) -> usize {
		self.buf().count
	}

	/// Returns `true` if the row has no columns.
	pub fn is_empty(&self) -> bool {
		self.count() == 0
	}

	/// The value of the column at `index`, or `None` past the last column.
	pub fn get(&self, index: usize) -> Option<&str> {
		(index < self.count()).then(|| self.buf().columns[index].value())
	}

	/// Iterates over the column values in order.
	pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
		self.buf().columns[..self.count()].iter().map(Column::value)
	}

	/// Appends a chunk span to the current column, opening it first if the
	/// previous column was ended. A zero-length span still opens the column.
	pub(crate) fn add_column_data(&mut self, chunk: &Chunk, offset: usize, len: usize) {
		let buf = self.buf_mut();
		buf.open_column();
		if len == 0 {
			return;
		}
		buf.last_column_size += len;
		let index = buf.count - 1;
		buf.columns[index].add_part(chunk, offset, len);
	}

	/// Ends the current column; the next append opens a new one.
	pub(crate) fn end_column(&mut self) {
		let buf = self.buf_mut();
		buf.next_column = true;
		buf.last_column_size = 0;
	}

	/// The length appended to the current column so far.
	pub(crate) fn last_column_size(&self) -> usize {
		self.buf().last_column_size
	}
}

impl Clone for Row {
	/// Returns a second independent owner of the row's data, keeping it
	/// alive past the reader's next advance.
	fn clone(&self) -> Self {
		Self {
			buf: self.buf.clone(),
			pool: self.pool.clone(),
		}
	}
}

impl Drop for Row {
	fn drop(&mut self) {
		let Some(mut buf) = self.buf.take() else { return };
		if let Some(inner) = Rc::get_mut(&mut buf) {
			inner.clear();
		}
		self.pool.collect(buf);
	}
}

impl Index<usize> for Row {
	type Output = str;

	/// Panics when `index` is past the last column; [`get`](Row::get) is the
	/// fallible form.
	fn index(&self, index: usize) -> &str {
		let count = self.count();
		self.get(index).unwrap_or_else(|| {
			panic!("column index {index} out of range for a row of {count} columns")
		})
	}
}

impl Debug for Row {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.columns()).finish()
	}
}
