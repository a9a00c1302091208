// SPDX-License-Identifier: Apache-2.0

//! The suspending driver: identical rows to the blocking one, suspending
//! and cancelling only at the chunk fetch.

use pretty_assertions::assert_eq;
use recsv::{Config, CsvReader};
use tokio::io::AsyncWriteExt;

const COUNTRY_CODES: &str = "Country,A2 (ISO)\r\nAfghanistan,AF\r\nAlbania,AL\r\n";

async fn rows_async(input: &str, config: Config) -> Vec<Vec<String>> {
	let mut reader = CsvReader::new(input.as_bytes(), encoding_rs::UTF_8, config).unwrap();
	let mut rows = Vec::new();
	while reader.advance_async().await.unwrap() {
		let row = reader.current().unwrap();
		rows.push(row.columns().map(str::to_owned).collect());
	}
	rows
}

fn rows_blocking(input: &str, config: Config) -> Vec<Vec<String>> {
	let mut reader = CsvReader::new(input.as_bytes(), encoding_rs::UTF_8, config).unwrap();
	let mut rows = Vec::new();
	while reader.advance().unwrap() {
		let row = reader.current().unwrap();
		rows.push(row.columns().map(str::to_owned).collect());
	}
	rows
}

#[tokio::test]
async fn matches_the_blocking_driver() {
	let input = "a,\"b\"\"c\",d\r\nlong field spanning chunks,x\r\n";
	for &size in &[16usize, 64, 64 * 1024] {
		let config = Config::new().with_buffer_size(size);
		assert_eq!(rows_async(input, config).await, rows_blocking(input, config));
	}
}

#[tokio::test]
async fn reads_rows_over_small_buffers() {
	let config = Config::new().with_buffer_size(16);
	let rows = rows_async(COUNTRY_CODES, config).await;
	assert_eq!(rows[1], ["Afghanistan", "AF"]);
	assert_eq!(rows[2], ["Albania", "AL"]);
}

#[tokio::test]
async fn resumes_when_data_arrives() {
	let (client, mut server) = tokio::io::duplex(256);
	let mut reader = CsvReader::new(
		client,
		encoding_rs::UTF_8,
		Config::new().with_buffer_size(16),
	)
	.unwrap();

	let writer = tokio::spawn(async move {
		server.write_all(b"first,row\nsecond,").await.unwrap();
		server.write_all(b"row\n").await.unwrap();
		drop(server);
	});

	assert!(reader.advance_async().await.unwrap());
	assert_eq!(&reader.current().unwrap()[0], "first");
	assert!(reader.advance_async().await.unwrap());
	assert_eq!(&reader.current().unwrap()[1], "row");
	assert!(!reader.advance_async().await.unwrap());
	writer.await.unwrap();
}

#[tokio::test]
async fn cancels_at_the_chunk_fetch() {
	let (client, mut server) = tokio::io::duplex(256);
	let mut reader = CsvReader::new(
		client,
		encoding_rs::UTF_8,
		Config::new().with_buffer_size(16),
	)
	.unwrap();
	// Less than a full buffer with the write end still open: the fill loop
	// has to suspend waiting for more bytes.
	server.write_all(b"a,b\n").await.unwrap();

	tokio::select! {
		biased;
		_ = reader.advance_async() => panic!("the read should suspend on an idle source"),
		_ = std::future::ready(()) => {}
	}
}
