use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chdata_common::{Compression, DataConfig, DataFormat, Result, error::ErrorKind};
use chdata_format::{Column, Value};
use chdata_io::{InputStream, OutputStream, PipedChannel};
use chdata_processor::{DataProcessor, Record};
use chdata_workflow::ThreadPool;

#[derive(Clone, Default)]
struct Sink(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn write_rows(config: &DataConfig, columns: &[Column], rows: &[Vec<Value>]) -> Vec<u8> {
    let sink = Sink::default();
    let mut writer =
        DataProcessor::writer(config.clone(), OutputStream::new(sink.clone()), columns.to_vec())
            .unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.close().unwrap();
    let bytes = sink.0.lock().unwrap().clone();
    bytes
}

fn read_rows(config: &DataConfig, columns: &[Column], bytes: Vec<u8>) -> Result<Vec<Record>> {
    DataProcessor::builder(config.clone())
        .input(InputStream::from_bytes(bytes))
        .columns(columns.to_vec())
        .build()?
        .records()
        .collect()
}

#[test]
fn test_end_to_end_row() {
    let columns = Column::parse("id UInt32, name Nullable(String), tags Array(String)").unwrap();
    assert_eq!(columns.len(), 3);

    let row = vec![
        Value::from(7u32),
        Value::Null,
        Value::Array(vec![Value::from("a"), Value::from("b")]),
    ];
    let config = DataConfig::default();
    let bytes = write_rows(&config, &columns, std::slice::from_ref(&row));
    assert_eq!(
        bytes,
        [7, 0, 0, 0, 1, 2, 1, b'a', 1, b'b'],
        "id, NULL flag, tag count and tags"
    );

    let records = read_rows(&config, &columns, bytes).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].values(), row.as_slice());
    assert_eq!(records[0].value("id").unwrap(), &Value::from(7u32));
}

#[test]
fn test_end_of_stream_at_row_boundary() {
    let columns = Column::parse("a Int32, b String").unwrap();
    let rows: Vec<Vec<Value>> = (0..3)
        .map(|i| vec![Value::from(i), Value::from(format!("row{i}"))])
        .collect();
    let config = DataConfig::default();
    let bytes = write_rows(&config, &columns, &rows);

    let records = read_rows(&config, &columns, bytes.clone()).unwrap();
    assert_eq!(
        records.into_iter().map(Record::into_values).collect::<Vec<_>>(),
        rows
    );

    // Drop the last string: five values can still be read, the sixth cannot.
    let truncated = bytes[..bytes.len() - 5].to_vec();
    let mut reader = DataProcessor::builder(config)
        .input(InputStream::from_bytes(truncated))
        .columns(columns)
        .build()
        .unwrap();
    assert!(reader.next_record().unwrap().is_some());
    assert!(reader.next_record().unwrap().is_some());
    let e = reader.next_record().unwrap_err();
    match e.kind() {
        ErrorKind::StreamCorruption {
            value_index,
            column_index,
            column_count,
            column_name,
        } => {
            assert_eq!(*value_index, 5);
            assert_eq!(*column_index, 1);
            assert_eq!(*column_count, 2);
            assert_eq!(column_name, "b String");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_copy_per_row_policy() {
    let columns = Column::parse("s String").unwrap();
    let rows = vec![vec![Value::from("first")], vec![Value::from("second")]];

    for reuse in [true, false] {
        let config = DataConfig::default().with_reuse_value_wrapper(reuse);
        let bytes = write_rows(&config, &columns, &rows);
        let mut reader = DataProcessor::builder(config)
            .input(InputStream::from_bytes(bytes))
            .columns(columns.clone())
            .build()
            .unwrap();
        let first = reader.next_record().unwrap().unwrap().clone();
        let second = reader.next_record().unwrap().unwrap().clone();
        assert_eq!(first[0], Value::from("first"));
        assert_eq!(second[0], Value::from("second"));
        assert!(reader.next_record().unwrap().is_none());
    }
}

#[test]
fn test_header_defines_columns() {
    let columns =
        Column::parse("k LowCardinality(String), m Map(String, UInt64), t DateTime64(3, 'UTC')")
            .unwrap();
    let config = DataConfig::default().with_format(DataFormat::RowBinaryWithNamesAndTypes);
    let rows = vec![vec![
        Value::from("key"),
        Value::Map(vec![(Value::from("x"), Value::from(1u64))]),
        Value::DateTime(chdata_format::DateTime {
            ticks: 1_700_000_000_123,
            scale: 3,
        }),
    ]];
    let bytes = write_rows(&config, &columns, &rows);

    let mut reader = DataProcessor::reader(config, InputStream::from_bytes(bytes)).unwrap();
    let shown = |columns: &[Column]| columns.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    assert_eq!(shown(reader.columns()), shown(&columns));
    assert!(reader.columns()[0].is_low_cardinality());
    assert_eq!(reader.columns()[2].time_zone(), Some("UTC"));
    let values: Vec<Value> = reader.values().collect::<Result<_>>().unwrap();
    assert_eq!(values, rows[0]);
}

#[test]
fn test_streaming_through_piped_channel() {
    let columns = Column::parse("id UInt64, payload String").unwrap();
    let config = DataConfig::default()
        .with_write_buffer_size(256)
        .with_max_queued_buffers(4)
        .with_write_compression(Compression::Zstd, 3)
        .with_read_compression(Compression::Zstd, 3);

    let (writer, reader) = PipedChannel::create(&config).split();
    let producer_config = config.clone();
    let producer_columns = columns.clone();
    let handle = ThreadPool::global()
        .spawn(move || -> Result<()> {
            let output = OutputStream::from_config(Box::new(writer), &producer_config)?;
            let mut processor = DataProcessor::writer(producer_config, output, producer_columns)?;
            for i in 0..5_000u64 {
                processor.write_record(&[Value::from(i), Value::from(format!("payload {i}"))])?;
            }
            processor.close()
        })
        .unwrap();

    let input = InputStream::from_config(Box::new(reader), &config).unwrap();
    let mut processor = DataProcessor::builder(config)
        .input(input)
        .columns(columns)
        .build()
        .unwrap();
    let mut count = 0u64;
    while let Some(record) = processor.next_record().unwrap() {
        assert_eq!(record[0], Value::from(count));
        assert_eq!(record[1].as_str(), Some(format!("payload {count}").as_str()));
        count += 1;
    }
    assert_eq!(count, 5_000);
    handle.wait(Duration::from_secs(60)).unwrap();
}

#[test]
fn test_failed_producer_surfaces_on_reader() {
    let columns = Column::parse("id UInt8").unwrap();
    let config = DataConfig::default();
    let channel = PipedChannel::create(&config);
    let (reader, handle) = channel
        .write_async(|writer| {
            use std::io::Write;
            writer.write_all(&[1, 2])?;
            Err(chdata_common::error::Error::invalid_operation("producer failed"))
        })
        .unwrap();

    let mut processor = DataProcessor::builder(config)
        .input(InputStream::piped(reader))
        .columns(columns)
        .build()
        .unwrap();
    let outcome: Result<Vec<Record>> = processor.records().collect();
    assert!(outcome.is_err());
    assert!(handle.wait(Duration::from_secs(30)).is_err());
}
