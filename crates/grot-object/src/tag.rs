use bstr::{BString, ByteSlice};
use grot_hash::ObjectId;

use crate::{ObjectError, ObjectType};

/// A parsed annotated-tag record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Id of the tagged object.
    pub object: ObjectId,
    /// Type of the tagged object.
    pub obj_type: ObjectType,
    /// Tag name.
    pub tag: BString,
    /// The full tagger line, when present.
    pub tagger: Option<BString>,
    /// Tag message bytes.
    pub message: BString,
}

impl Tag {
    /// Parse tag content (no loose header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut object: Option<ObjectId> = None;
        let mut obj_type: Option<ObjectType> = None;
        let mut tag: Option<BString> = None;
        let mut tagger: Option<BString> = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }
            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space_pos) = line.find_byte(b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::BadObjectData("non-UTF8 object id".into())
                        })?;
                        object = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => obj_type = Some(ObjectType::from_name(value)?),
                    b"tag" => tag = Some(BString::from(value)),
                    b"tagger" => tagger = Some(BString::from(value)),
                    _ => {}
                }
            }
            pos = line_end + 1;
        }

        let object = object.ok_or(ObjectError::MissingTagField { field: "object" })?;
        let obj_type = obj_type.ok_or(ObjectError::MissingTagField { field: "type" })?;
        let tag = tag.ok_or(ObjectError::MissingTagField { field: "tag" })?;
        let message = BString::from(&content[pos.min(content.len())..]);

        Ok(Self {
            object,
            obj_type,
            tag,
            tagger,
            message,
        })
    }
}
