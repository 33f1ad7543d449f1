//! Serializer/deserializer steps and the chains composed from them.
//!
//! A column is encoded by an ordered list of steps. Each step consumes or produces
//! part of the wire representation and either lets the next step continue or
//! declares the value complete. A `Nullable(String)` column, for example, is the
//! chain `[NullFlag, String]`: when the flag says NULL the chain stops before the
//! string step runs.

use std::sync::Arc;

use chdata_common::Result;
use chdata_format::{Column, Value};
use chdata_io::{InputStream, OutputStream};

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The value is incomplete; the next step in the chain runs.
    Continue,
    /// The value is complete; remaining steps are skipped.
    Done,
}

pub trait Deserializer: Send + Sync + 'static {
    /// Decodes the next part of a value from `input` into `value`.
    ///
    /// # Arguments
    ///
    /// - `value` - the holder to fill. It may contain the previous row's value;
    ///   composite holders are cleared and refilled so their allocations are reused.
    /// - `input` - the stream positioned at the encoded bytes.
    fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow>;
}

pub trait Serializer: Send + Sync + 'static {
    /// Encodes the next part of `value` into `output`.
    fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow>;
}

/// Runs deserialization steps in order until one reports [`Flow::Done`].
#[derive(Clone, Default)]
pub struct DeserializerChain {
    steps: Vec<Arc<dyn Deserializer>>,
}

impl DeserializerChain {
    pub fn new() -> DeserializerChain {
        DeserializerChain::default()
    }

    pub fn then(mut self, step: impl Deserializer) -> DeserializerChain {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Deserializer for DeserializerChain {
    fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow> {
        for step in &self.steps {
            if step.deserialize(value, input)? == Flow::Done {
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Runs serialization steps in order until one reports [`Flow::Done`].
#[derive(Clone, Default)]
pub struct SerializerChain {
    steps: Vec<Arc<dyn Serializer>>,
}

impl SerializerChain {
    pub fn new() -> SerializerChain {
        SerializerChain::default()
    }

    pub fn then(mut self, step: impl Serializer) -> SerializerChain {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Serializer for SerializerChain {
    fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow> {
        for step in &self.steps {
            if step.serialize(value, output)? == Flow::Done {
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Continue)
    }
}

/// The deserializer and serializer of one column.
#[derive(Clone)]
pub struct SerDe {
    pub deserializer: Arc<dyn Deserializer>,
    pub serializer: Arc<dyn Serializer>,
}

impl SerDe {
    pub fn new(deserializer: impl Deserializer, serializer: impl Serializer) -> SerDe {
        SerDe {
            deserializer: Arc::new(deserializer),
            serializer: Arc::new(serializer),
        }
    }

    pub fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<()> {
        self.deserializer.deserialize(value, input).map(|_| ())
    }

    pub fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<()> {
        self.serializer.serialize(value, output).map(|_| ())
    }
}

/// Builds the [`SerDe`] of a column for one wire format.
pub trait SerDeProvider: Send + Sync {
    /// Returns the serializer/deserializer pair for `column`.
    ///
    /// Fails with `Unsupported` if the column, or any column nested in it, has a
    /// data type the format cannot encode.
    fn serde(&self, column: &Column) -> Result<SerDe>;
}

/// The one-byte NULL marker in front of a nullable value: 1 means NULL.
pub struct NullFlag;

impl Deserializer for NullFlag {
    fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow> {
        if input.read_byte()? != 0 {
            *value = Value::Null;
            Ok(Flow::Done)
        } else {
            Ok(Flow::Continue)
        }
    }
}

impl Serializer for NullFlag {
    fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow> {
        if value.is_null() {
            output.write_byte(1)?;
            Ok(Flow::Done)
        } else {
            output.write_byte(0)?;
            Ok(Flow::Continue)
        }
    }
}

/// The "use default" marker written before every value in `RowBinaryWithDefaults`:
/// 1 means the server should substitute the column default and no value follows.
pub struct DefaultFlag {
    column: Column,
}

impl DefaultFlag {
    pub fn new(column: Column) -> DefaultFlag {
        DefaultFlag { column }
    }
}

impl Deserializer for DefaultFlag {
    fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow> {
        if input.read_byte()? != 0 {
            *value = self.column.new_value();
            Ok(Flow::Done)
        } else {
            Ok(Flow::Continue)
        }
    }
}

impl Serializer for DefaultFlag {
    fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow> {
        // NULL for a non-nullable column asks for the default instead.
        if value.is_null() && !self.column.is_nullable() {
            output.write_byte(1)?;
            Ok(Flow::Done)
        } else {
            output.write_byte(0)?;
            Ok(Flow::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every value it is asked to serialize and reads a fixed byte.
    struct Probe(Arc<Mutex<Vec<Value>>>);

    impl Serializer for Probe {
        fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow> {
            self.0.lock().unwrap().push(value.clone());
            output.write_byte(0xAB)?;
            Ok(Flow::Done)
        }
    }

    impl Deserializer for Probe {
        fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow> {
            *value = Value::UInt8(input.read_byte()?);
            Ok(Flow::Done)
        }
    }

    fn collect(f: impl FnOnce(&mut OutputStream)) -> Vec<u8> {
        let shared = Arc::new(Mutex::new(Vec::new()));
        let sink = shared.clone();
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
        let mut output = OutputStream::new(Sink(sink));
        f(&mut output);
        output.close().unwrap();
        let bytes = shared.lock().unwrap().clone();
        bytes
    }

    #[test]
    fn test_null_flag_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = SerializerChain::new()
            .then(NullFlag)
            .then(Probe(seen.clone()));
        assert_eq!(chain.len(), 2);

        let bytes = collect(|out| {
            chain.serialize(&Value::Null, out).unwrap();
            chain.serialize(&Value::from(5u8), out).unwrap();
        });
        assert_eq!(bytes, [1, 0, 0xAB]);
        assert_eq!(*seen.lock().unwrap(), vec![Value::from(5u8)]);

        let chain = DeserializerChain::new()
            .then(NullFlag)
            .then(Probe(seen.clone()));
        let mut input = InputStream::from_bytes(bytes);
        let mut value = Value::from(9u8);
        assert_eq!(chain.deserialize(&mut value, &mut input).unwrap(), Flow::Done);
        assert!(value.is_null());
        chain.deserialize(&mut value, &mut input).unwrap();
        assert_eq!(value, Value::UInt8(0xAB));
    }

    #[test]
    fn test_default_flag() {
        let column = Column::of("n", "UInt8").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let serde = SerDe::new(
            DeserializerChain::new()
                .then(DefaultFlag::new(column.clone()))
                .then(Probe(seen.clone())),
            SerializerChain::new()
                .then(DefaultFlag::new(column))
                .then(Probe(seen.clone())),
        );

        let bytes = collect(|out| {
            serde.serialize(&Value::Null, out).unwrap();
            serde.serialize(&Value::from(1u8), out).unwrap();
        });
        assert_eq!(bytes, [1, 0, 0xAB]);

        let mut input = InputStream::from_bytes(bytes);
        let mut value = Value::from(3u8);
        serde.deserialize(&mut value, &mut input).unwrap();
        assert!(value.is_null());
        serde.deserialize(&mut value, &mut input).unwrap();
        assert_eq!(value, Value::UInt8(0xAB));
    }
}
