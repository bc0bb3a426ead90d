//! Outbound JSON detection messages (spec §4.7, §6).

use super::Rectangle;
use serde::Serialize;

/// `{video_stream, channel, timestamp, rects, dol_id, type}` as spec §6
/// defines it. `#[serde(tag = "type")]` gives the `detect`/`detect_empty`
/// discriminant for free instead of hand-writing a `type` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectMessage {
    Detect {
        video_stream: String,
        channel: usize,
        timestamp: u64,
        rects: Vec<Rectangle>,
        dol_id: u64,
    },
    DetectEmpty {
        video_stream: String,
        channel: usize,
        timestamp: u64,
        dol_id: u64,
    },
}

impl DetectMessage {
    pub fn dol_id(&self) -> u64 {
        match self {
            DetectMessage::Detect { dol_id, .. } | DetectMessage::DetectEmpty { dol_id, .. } => {
                *dol_id
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("DetectMessage fields are all JSON-safe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_message_serializes_with_type_tag() {
        let msg = DetectMessage::Detect {
            video_stream: "rtsp://cam/1".into(),
            channel: 0,
            timestamp: 3,
            rects: vec![Rectangle::new(1, 2, 3, 4)],
            dol_id: 10000,
        };
        let v = msg.to_json();
        assert_eq!(v["type"], "detect");
        assert_eq!(v["dol_id"], 10000);
    }

    #[test]
    fn detect_empty_message_serializes_with_type_tag() {
        let msg = DetectMessage::DetectEmpty {
            video_stream: "rtsp://cam/1".into(),
            channel: 0,
            timestamp: 9,
            dol_id: 10000,
        };
        let v = msg.to_json();
        assert_eq!(v["type"], "detect_empty");
        assert!(v.get("rects").is_none());
    }
}
