//! Stream sample packets.
//!
//! Packets arrive on per-stream subscriber sockets as
//! `[2, "streamPacket", [{sampleIntervalSeconds, triggerOffset, samples}]]`,
//! where `samples` is a msgpack extension value tagged with its encoding.

use std::fmt;

use rmpv::Value;

use crate::error::{Error, ProtocolError, SampleFormatError};
use crate::protocol::{self, EXT_INT8_ARRAY};

/// Hardware samples are narrower than the 10 bits users expect.
pub const SAMPLE_SCALE: i16 = 4;

/// Method name used on stream sockets.
pub const STREAM_PACKET_METHOD: &str = "streamPacket";

/// One decoded block of samples from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPacket {
    stream_idx: u16,
    sample_interval_seconds: f64,
    trigger_offset: i64,
    samples: Vec<i16>,
}

impl StreamPacket {
    /// Build a packet from a tagged sample buffer.
    pub fn new(
        stream_idx: u16,
        sample_interval_seconds: f64,
        trigger_offset: i64,
        data_type: i8,
        data: &[u8],
    ) -> Result<Self, SampleFormatError> {
        let samples = decode_samples(data_type, data)?;
        Ok(Self {
            stream_idx,
            sample_interval_seconds,
            trigger_offset,
            samples,
        })
    }

    /// Stream this packet was received on.
    pub fn stream_idx(&self) -> u16 {
        self.stream_idx
    }

    /// Time between consecutive samples.
    pub fn sample_interval_seconds(&self) -> f64 {
        self.sample_interval_seconds
    }

    /// Index of the trigger sample.
    pub fn trigger_offset(&self) -> i64 {
        self.trigger_offset
    }

    /// Widened, scaled samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl fmt::Display for StreamPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream {} packet: {} samples @ {}s, trigger {}",
            self.stream_idx,
            self.samples.len(),
            self.sample_interval_seconds,
            self.trigger_offset
        )
    }
}

/// Decode a tagged sample buffer.
pub fn decode_samples(data_type: i8, data: &[u8]) -> Result<Vec<i16>, SampleFormatError> {
    match data_type {
        EXT_INT8_ARRAY => Ok(data
            .iter()
            .map(|&b| i16::from(b as i8) * SAMPLE_SCALE)
            .collect()),
        tag => Err(SampleFormatError { tag }),
    }
}

/// Decode a raw message from the subscriber socket of `stream_idx`.
pub fn decode_stream_message(stream_idx: u16, data: &[u8]) -> Result<StreamPacket, Error> {
    let notification = protocol::decode_notification(data)?;
    if notification.method != STREAM_PACKET_METHOD {
        return Err(ProtocolError::UnexpectedMethod(notification.method).into());
    }
    let body = notification
        .params
        .first()
        .ok_or_else(|| malformed("missing packet body"))?;

    let interval = protocol::map_get(body, "sampleIntervalSeconds")
        .and_then(protocol::as_number)
        .ok_or_else(|| malformed("missing sampleIntervalSeconds"))?;
    let trigger = protocol::map_get(body, "triggerOffset")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("missing triggerOffset"))?;
    let (tag, buffer) = match protocol::map_get(body, "samples") {
        Some(Value::Ext(tag, buffer)) => (*tag, buffer.as_slice()),
        Some(other) => return Err(malformed(&format!("samples is not tagged: {other}"))),
        None => return Err(malformed("missing samples")),
    };

    Ok(StreamPacket::new(stream_idx, interval, trigger, tag, buffer)?)
}

fn malformed(reason: &str) -> Error {
    ProtocolError::Malformed {
        what: "stream packet",
        reason: reason.to_string(),
    }
    .into()
}

/// Encode a stream packet message the way the device publishes it.
pub fn encode_stream_message(
    sample_interval_seconds: f64,
    trigger_offset: i64,
    data_type: i8,
    data: Vec<u8>,
) -> Result<Vec<u8>, ProtocolError> {
    let body = Value::Map(vec![
        (
            Value::from("sampleIntervalSeconds"),
            Value::F64(sample_interval_seconds),
        ),
        (Value::from("triggerOffset"), Value::from(trigger_offset)),
        (Value::from("samples"), Value::Ext(data_type, data)),
    ]);
    protocol::encode_notification(STREAM_PACKET_METHOD, vec![body])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int8_samples_are_widened_and_scaled() {
        let raw = [(-128i8) as u8, 0, 127];
        let samples = decode_samples(EXT_INT8_ARRAY, &raw).unwrap();
        assert_eq!(samples, vec![-512, 0, 508]);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = decode_samples(5, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, SampleFormatError { tag: 5 });
    }

    #[test]
    fn test_decode_full_message() {
        let bytes = encode_stream_message(1e-6, 128, EXT_INT8_ARRAY, vec![1, 255]).unwrap();
        let packet = decode_stream_message(2, &bytes).unwrap();
        assert_eq!(packet.stream_idx(), 2);
        assert_eq!(packet.sample_interval_seconds(), 1e-6);
        assert_eq!(packet.trigger_offset(), 128);
        assert_eq!(packet.samples(), &[4, -4]);
    }

    #[test]
    fn test_unknown_tag_in_message() {
        let bytes = encode_stream_message(1.0, 0, 9, vec![1]).unwrap();
        let err = decode_stream_message(0, &bytes).unwrap_err();
        assert!(matches!(err, Error::SampleFormat(SampleFormatError { tag: 9 })));
    }

    #[test]
    fn test_wrong_method_on_stream_socket() {
        let bytes = protocol::encode_notification("registerChanged", vec![]).unwrap();
        let err = decode_stream_message(0, &bytes).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::UnexpectedMethod(_))));
    }

    #[test]
    fn test_missing_fields() {
        let body = Value::Map(vec![(Value::from("triggerOffset"), Value::from(0))]);
        let bytes = protocol::encode_notification(STREAM_PACKET_METHOD, vec![body]).unwrap();
        let err = decode_stream_message(0, &bytes).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Malformed { .. })));
    }
}
