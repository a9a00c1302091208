// SPDX-License-Identifier: Apache-2.0

//! A memory-recycling, streaming CSV reader.
//!
//! ## How it works
//!
//! Raw bytes are read into a fixed buffer and decoded into reusable *chunks*
//! of text. When the last reference to a chunk is released, its buffer is
//! returned to a *pool* and claimed again for a later read. A multi-byte
//! character cut off by the fixed-size read is carried over and decoded with
//! the next read, so any supported text encoding survives arbitrary read
//! boundaries; an invalid sequence anywhere else in a buffer is a real
//! decode error.
//!
//! A scanner walks each chunk reporting only the *structural* characters
//! (separator, quote, CR and LF), and the state machine in [`CsvReader`]
//! assembles those into rows. Column values are not copied out of the
//! chunks: a column records `(chunk, offset, length)` *parts*, holding a
//! reference on each chunk, and slices the text back out on demand. Only a
//! value spanning more than one chunk is ever reassembled. Rows are pooled
//! and reference-counted the same way, so steady-state reading allocates
//! next to nothing.
//!
//! Reading is driven one row at a time, blocking or suspending:
//!
//! ```
//! use recsv::{Config, CsvReader};
//!
//! # fn main() -> recsv::Result {
//! let data = "name,code\r\nCountry A,A2 (ISO)\r\nCountry B,AF\r\n";
//! let mut reader = CsvReader::new(data.as_bytes(), encoding_rs::UTF_8, Config::new())?;
//! while reader.advance()? {
//! 	let row = reader.current().expect("advance returned true");
//! 	println!("{} -> {}", &row[0], &row[1]);
//! }
//! # Ok(())
//! # }
//! ```

mod chunk;
mod decode;
mod error;
mod pool;
mod reader;
mod row;

pub use decode::{DecodeError, DecodeErrorKind};
pub use error::{Error, ErrorBox, ErrorKind, Result};
pub use reader::{Config, CsvReader, DEFAULT_BUFFER_SIZE};
pub use row::Row;
