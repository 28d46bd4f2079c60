//! Media stream model
//!
//! A `Stream` is created read-only by probing. Selection copies it into the
//! destination list, filling in `primary` and `output`.

use crate::config::{OutputSettings, StreamKind};
use serde::{Deserialize, Serialize};

/// One audio, video or subtitle track of a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Position within the source container
    pub index: u32,
    pub kind: StreamKind,
    /// Source codec identifier (e.g. "hevc", "dts", "subrip")
    pub codec: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,

    // video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdr: Option<bool>,

    // audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    // assigned during selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSettings>,
}

impl Stream {
    /// A stream with only the guaranteed fields known
    pub fn new(index: u32, kind: StreamKind, codec: &str) -> Self {
        Self {
            index,
            kind,
            codec: codec.to_string(),
            language: None,
            title: None,
            bitrate: None,
            width: None,
            height: None,
            framerate: None,
            hdr: None,
            channels: None,
            sample_rate: None,
            primary: None,
            output: None,
        }
    }

    /// Copy of this stream as a destination stream
    pub fn to_destination(&self, primary: bool) -> Self {
        Self {
            primary: Some(primary),
            ..self.clone()
        }
    }

    /// Settings assigned during selection, or pass-through if none were
    pub fn output_settings(&self) -> OutputSettings {
        self.output.clone().unwrap_or_default()
    }

    /// Read a named attribute; `None` means the attribute is absent
    pub fn property(&self, property: StreamProperty) -> Option<PropertyValue<'_>> {
        use PropertyValue::{Bool, Number, Text};
        let output = self.output.as_ref();

        match property {
            StreamProperty::Index => Some(Number(self.index as f64)),
            StreamProperty::Kind => Some(Text(self.kind.as_str())),
            StreamProperty::Codec => Some(Text(&self.codec)),
            StreamProperty::Language => self.language.as_deref().map(Text),
            StreamProperty::Title => self.title.as_deref().map(Text),
            StreamProperty::Bitrate => self.bitrate.map(|b| Number(b as f64)),
            StreamProperty::Width => self.width.map(|w| Number(w as f64)),
            StreamProperty::Height => self.height.map(|h| Number(h as f64)),
            StreamProperty::Framerate => self.framerate.map(Number),
            StreamProperty::Hdr => self.hdr.map(Bool),
            StreamProperty::Channels => self.channels.map(|c| Number(c as f64)),
            StreamProperty::SampleRate => self.sample_rate.map(|r| Number(r as f64)),
            StreamProperty::Primary => self.primary.map(Bool),
            StreamProperty::OutputCodec => output.map(|o| Text(o.codec.as_str())),
            StreamProperty::OutputCrf => output.and_then(|o| o.crf.as_deref()).map(Text),
            StreamProperty::OutputBitrate => output.and_then(|o| o.bitrate.as_deref()).map(Text),
            StreamProperty::OutputSize => output.and_then(|o| o.size.as_deref()).map(Text),
            StreamProperty::OutputPreset => output.and_then(|o| o.preset.as_deref()).map(Text),
            StreamProperty::OutputTune => output.and_then(|o| o.tune.as_deref()).map(Text),
            StreamProperty::OutputTonemap => output.and_then(|o| o.tonemap).map(Bool),
            StreamProperty::OutputSkip => output.and_then(|o| o.skip).map(Bool),
        }
    }
}

/// The closed set of attributes a rule clause may inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProperty {
    Index,
    Kind,
    Codec,
    Language,
    Title,
    Bitrate,
    Width,
    Height,
    Framerate,
    Hdr,
    Channels,
    SampleRate,
    Primary,
    OutputCodec,
    OutputCrf,
    OutputBitrate,
    OutputSize,
    OutputPreset,
    OutputTune,
    OutputTonemap,
    OutputSkip,
}

impl StreamProperty {
    /// Resolve a property name as written in a profile
    ///
    /// Both snake_case and the camelCase spellings of older configs are
    /// accepted. Output settings are addressed as `output.<field>`.
    pub fn parse(name: &str) -> Option<Self> {
        let property = match name {
            "index" => StreamProperty::Index,
            "kind" | "type" => StreamProperty::Kind,
            "codec" => StreamProperty::Codec,
            "language" => StreamProperty::Language,
            "title" => StreamProperty::Title,
            "bitrate" => StreamProperty::Bitrate,
            "width" => StreamProperty::Width,
            "height" => StreamProperty::Height,
            "framerate" => StreamProperty::Framerate,
            "hdr" | "is_hdr" | "isHDR" => StreamProperty::Hdr,
            "channels" => StreamProperty::Channels,
            "sample_rate" | "sampleRate" => StreamProperty::SampleRate,
            "primary" | "is_primary" | "isPrimary" => StreamProperty::Primary,
            "output.codec" => StreamProperty::OutputCodec,
            "output.crf" => StreamProperty::OutputCrf,
            "output.bitrate" => StreamProperty::OutputBitrate,
            "output.size" => StreamProperty::OutputSize,
            "output.preset" => StreamProperty::OutputPreset,
            "output.tune" => StreamProperty::OutputTune,
            "output.tonemap" => StreamProperty::OutputTonemap,
            "output.skip" => StreamProperty::OutputSkip,
            _ => return None,
        };
        Some(property)
    }
}

/// Typed value of a stream attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool),
}

impl PropertyValue<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Number(_) => "number",
            PropertyValue::Text(_) => "string",
            PropertyValue::Bool(_) => "boolean",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_lookup_reads_typed_values() {
        let stream = Stream {
            language: Some("eng".to_string()),
            height: Some(1080),
            hdr: Some(true),
            ..Stream::new(3, StreamKind::Video, "hevc")
        };

        assert_eq!(
            stream.property(StreamProperty::Index),
            Some(PropertyValue::Number(3.0))
        );
        assert_eq!(
            stream.property(StreamProperty::Kind),
            Some(PropertyValue::Text("video"))
        );
        assert_eq!(
            stream.property(StreamProperty::Height),
            Some(PropertyValue::Number(1080.0))
        );
        assert_eq!(
            stream.property(StreamProperty::Hdr),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(stream.property(StreamProperty::Channels), None);
        assert_eq!(stream.property(StreamProperty::Primary), None);
        assert_eq!(stream.property(StreamProperty::OutputCodec), None);
    }

    #[test]
    fn test_output_properties_after_selection() {
        let mut stream = Stream::new(0, StreamKind::Video, "h264").to_destination(true);
        stream.output = Some(OutputSettings {
            codec: "libx265".to_string(),
            crf: Some("20".to_string()),
            ..OutputSettings::default()
        });

        assert_eq!(
            stream.property(StreamProperty::Primary),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(
            stream.property(StreamProperty::OutputCodec),
            Some(PropertyValue::Text("libx265"))
        );
        assert_eq!(
            stream.property(StreamProperty::OutputCrf),
            Some(PropertyValue::Text("20"))
        );
        assert_eq!(stream.property(StreamProperty::OutputSize), None);
    }

    #[test]
    fn test_property_names() {
        assert_eq!(StreamProperty::parse("sampleRate"), Some(StreamProperty::SampleRate));
        assert_eq!(StreamProperty::parse("sample_rate"), Some(StreamProperty::SampleRate));
        assert_eq!(StreamProperty::parse("type"), Some(StreamProperty::Kind));
        assert_eq!(StreamProperty::parse("output.crf"), Some(StreamProperty::OutputCrf));
        assert_eq!(StreamProperty::parse("__proto__"), None);
        assert_eq!(StreamProperty::parse("Height"), None);
    }

    #[test]
    fn test_output_settings_default_to_copy() {
        let stream = Stream::new(1, StreamKind::Audio, "aac");
        assert!(stream.output_settings().is_copy());
    }
}
