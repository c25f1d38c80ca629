/// Serde helper writing optional binary payloads as standard base64 strings.
pub mod base64_opt {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(text) if !text.trim().is_empty() => general_purpose::STANDARD
                .decode(text.trim())
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        #[serde(default, with = "super::base64_opt")]
        image: Option<Vec<u8>>,
    }

    #[test]
    fn encodes_bytes_and_null() {
        let encoded = serde_json::to_string(&Payload {
            image: Some(vec![0xff, 0x00, 0x10]),
        })
        .unwrap();
        assert_eq!(encoded, r#"{"image":"/wAQ"}"#);
        let empty = serde_json::to_string(&Payload { image: None }).unwrap();
        assert_eq!(empty, r#"{"image":null}"#);
    }

    #[test]
    fn missing_or_blank_fields_decode_to_none() {
        let payload: Payload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.image, None);
        let payload: Payload = serde_json::from_str(r#"{"image": ""}"#).unwrap();
        assert_eq!(payload.image, None);
        assert!(serde_json::from_str::<Payload>(r#"{"image": "%%%"}"#).is_err());
    }
}
