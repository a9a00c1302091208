// SPDX-License-Identifier: Apache-2.0

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::{io, result};
use amplify_derive::Display;
use crate::decode::DecodeError;

pub type ErrorBox = Box<dyn StdError + Send + Sync>;
pub type Result<T = ()> = result::Result<T, Error>;

/// An error raised while advancing the reader.
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	row: Option<u64>,
	source: Option<ErrorBox>,
}

#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
	/// Field data appeared before an opening quote.
	#[display("data before an opening quote")]
	DataBeforeQuote,
	/// A character other than a separator or line ending followed a closing
	/// quote.
	#[display("data after a closing quote")]
	DataAfterQuote,
	/// A carriage return was not followed by a line feed.
	#[display("carriage return without a following line feed")]
	BareCarriageReturn,
	/// The stream ended inside an open quoted field.
	#[display("quoted field still open at end of stream")]
	UnclosedQuote,
	/// The input could not be decoded in the configured encoding.
	#[display("decode failed")]
	Decode,
	/// The byte source failed.
	#[display("IO error")]
	Io,
	/// The reader was configured with unusable settings.
	#[display("invalid configuration")]
	Config,
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let Self { kind, row, source } = self;
		if let Some(row) = row {
			write!(f, "{kind} at row {row}")?;
		} else {
			write!(f, "{kind}")?;
		}
		if let Some(source) = source {
			write!(f, " ({source})")?;
		}
		Ok(())
	}
}

impl StdError for Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		if let Some(ref source) = self.source {
			Some(source.as_ref())
		} else {
			None
		}
	}
}

impl Error {
	/// Creates a malformed-row error raised at `row`.
	pub(crate) fn malformed(kind: ErrorKind, row: u64) -> Self {
		Self { kind, row: Some(row), source: None }
	}

	/// Creates a configuration error.
	pub(crate) fn config(message: &'static str) -> Self {
		Self {
			kind: ErrorKind::Config,
			row: None,
			source: Some(message.into()),
		}
	}

	/// Returns the error kind.
	pub fn kind(&self) -> ErrorKind { self.kind }

	/// Returns the index of the row the reader was assembling when the error
	/// was raised, for malformed-row errors.
	pub fn row(&self) -> Option<u64> { self.row }

	/// Returns the source downcast into a decode error, if possible.
	pub fn decode_source(&self) -> Option<&DecodeError> {
		self.source()?.downcast_ref()
	}
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		Self {
			kind: ErrorKind::Io,
			row: None,
			source: Some(value.into()),
		}
	}
}

impl From<DecodeError> for Error {
	fn from(value: DecodeError) -> Self {
		Self {
			kind: ErrorKind::Decode,
			row: None,
			source: Some(value.into()),
		}
	}
}
