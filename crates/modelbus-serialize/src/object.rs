//! Structured (mesh-like) objects.
//!
//! Wire layout, version 1, all integers little-endian:
//!
//! ```text
//! ┌────────┬─────────┬──────────┬──────────────────┬────────┬──────────────────────────┐
//! │ "MO"   │ version │ vertices │ vertices × 3 f64 │ faces  │ faces × (n u32, n × u32) │
//! │ 2B     │ u16 = 1 │ u32      │ 24B each         │ u32    │ 4B + 4n each             │
//! └────────┴─────────┴──────────┴──────────────────┴────────┴──────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SerializeError};

/// Magic bytes: "MO" (0x4D 0x4F).
pub const OBJECT_MAGIC: [u8; 2] = *b"MO";

/// The layout version written by this crate and the only one it reads.
pub const OBJECT_LAYOUT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 2 + 2 + 4;
const VERTEX_SIZE: usize = 3 * 8;
const INDEX_SIZE: usize = 4;

/// An ordered vertex list and faces made of indices into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredObject {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Vec<u32>>,
}

impl StructuredObject {
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<Vec<u32>>) -> Self {
        Self { vertices, faces }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check that every face is non-empty and references existing vertices.
    pub fn validate(&self) -> Result<()> {
        for (face_index, face) in self.faces.iter().enumerate() {
            check_face(face_index, face, self.vertices.len())?;
        }
        Ok(())
    }

    /// Append the wire form to `dst`.
    ///
    /// Fails only if a count does not fit in `u32`. The object is not
    /// validated; a peer decoding an invalid object gets `MalformedObject`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let vertex_count = count_u32("vertex", self.vertices.len())?;
        let face_count = count_u32("face", self.faces.len())?;

        let index_total: usize = self.faces.iter().map(Vec::len).sum();
        dst.reserve(
            HEADER_SIZE
                + self.vertices.len() * VERTEX_SIZE
                + 4
                + self.faces.len() * INDEX_SIZE
                + index_total * INDEX_SIZE,
        );

        dst.put_slice(&OBJECT_MAGIC);
        dst.put_u16_le(OBJECT_LAYOUT_VERSION);
        dst.put_u32_le(vertex_count);
        for [x, y, z] in &self.vertices {
            dst.put_f64_le(*x);
            dst.put_f64_le(*y);
            dst.put_f64_le(*z);
        }
        dst.put_u32_le(face_count);
        for face in &self.faces {
            dst.put_u32_le(count_u32("face index", face.len())?);
            for index in face {
                dst.put_u32_le(*index);
            }
        }
        Ok(())
    }

    /// Encode into a new buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Decode the wire form. The result owns all of its storage.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = src;

        if buf.remaining() < HEADER_SIZE {
            return Err(malformed(format!(
                "{} bytes is shorter than the {HEADER_SIZE}-byte header",
                src.len()
            )));
        }
        if buf[..2] != OBJECT_MAGIC {
            return Err(malformed("bad magic (expected \"MO\")".to_string()));
        }
        buf.advance(2);
        let version = buf.get_u16_le();
        if version != OBJECT_LAYOUT_VERSION {
            return Err(malformed(format!("unsupported layout version {version}")));
        }

        let vertex_count = buf.get_u32_le() as usize;
        require(buf, vertex_count, VERTEX_SIZE, "vertices")?;
        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertices.push([buf.get_f64_le(), buf.get_f64_le(), buf.get_f64_le()]);
        }

        require(buf, 1, 4, "face count")?;
        let face_count = buf.get_u32_le() as usize;
        require(buf, face_count, INDEX_SIZE, "faces")?;
        let mut faces = Vec::with_capacity(face_count);
        for face_index in 0..face_count {
            require(buf, 1, INDEX_SIZE, "face arity")?;
            let arity = buf.get_u32_le() as usize;
            require(buf, arity, INDEX_SIZE, "face indices")?;
            let face: Vec<u32> = (0..arity).map(|_| buf.get_u32_le()).collect();
            check_face(face_index, &face, vertex_count)?;
            faces.push(face);
        }

        if buf.has_remaining() {
            return Err(malformed(format!(
                "{} trailing bytes after the last face",
                buf.remaining()
            )));
        }

        Ok(Self { vertices, faces })
    }
}

fn check_face(face_index: usize, face: &[u32], vertex_count: usize) -> Result<()> {
    if face.is_empty() {
        return Err(malformed(format!("face {face_index} has no indices")));
    }
    if let Some(bad) = face.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(malformed(format!(
            "face {face_index} references vertex {bad}, but there are only {vertex_count}"
        )));
    }
    Ok(())
}

/// Fail unless `count` records of `size` bytes remain.
fn require(buf: &[u8], count: usize, size: usize, what: &str) -> Result<()> {
    match count.checked_mul(size) {
        Some(needed) if needed <= buf.len() => Ok(()),
        _ => Err(malformed(format!(
            "truncated {what}: {count} × {size} bytes declared, {} available",
            buf.len()
        ))),
    }
}

fn count_u32(what: &str, count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| malformed(format!("{what} count {count} exceeds u32")))
}

fn malformed(reason: String) -> SerializeError {
    SerializeError::MalformedObject(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(face: Vec<u32>) -> StructuredObject {
        StructuredObject::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![face],
        )
    }

    #[test]
    fn triangle_round_trip() {
        let obj = triangle(vec![0, 1, 2]);
        let bytes = obj.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + 3 * 24 + 4 + 4 + 3 * 4);
        assert_eq!(StructuredObject::decode(&bytes).unwrap(), obj);
    }

    #[test]
    fn out_of_range_face_index_rejected() {
        let bytes = triangle(vec![0, 1, 3]).to_bytes().unwrap();
        let err = StructuredObject::decode(&bytes).unwrap_err();
        assert!(matches!(err, SerializeError::MalformedObject(msg) if msg.contains("vertex 3")));
    }

    #[test]
    fn validate_matches_decode() {
        assert!(triangle(vec![0, 1, 2]).validate().is_ok());
        assert!(triangle(vec![0, 1, 3]).validate().is_err());
        assert!(triangle(vec![]).validate().is_err());
    }

    #[test]
    fn mixed_arity_faces() {
        let obj = StructuredObject::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.5],
            ],
            vec![vec![0, 1, 2, 3], vec![0, 2, 3]],
        );
        let decoded = StructuredObject::decode(&obj.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, obj);
        assert_eq!(decoded.face_count(), 2);
    }

    #[test]
    fn empty_object() {
        let obj = StructuredObject::default();
        let bytes = obj.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(StructuredObject::decode(&bytes).unwrap(), obj);
    }

    #[test]
    fn short_input_rejected_before_allocating() {
        let mut buf = BytesMut::new();
        buf.put_slice(&OBJECT_MAGIC);
        buf.put_u16_le(OBJECT_LAYOUT_VERSION);
        buf.put_u32_le(u32::MAX);

        let err = StructuredObject::decode(&buf).unwrap_err();
        assert!(matches!(err, SerializeError::MalformedObject(msg) if msg.contains("truncated vertices")));
    }

    #[test]
    fn every_truncation_is_malformed() {
        let bytes = triangle(vec![0, 1, 2]).to_bytes().unwrap();
        for len in 0..bytes.len() {
            assert!(
                matches!(
                    StructuredObject::decode(&bytes[..len]),
                    Err(SerializeError::MalformedObject(_))
                ),
                "prefix of {len} bytes should fail"
            );
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = BytesMut::from(triangle(vec![0, 1, 2]).to_bytes().unwrap().as_ref());
        bytes.put_u8(0);
        assert!(StructuredObject::decode(&bytes).is_err());
    }

    #[test]
    fn bad_magic_and_version() {
        let mut bytes = triangle(vec![0, 1, 2]).to_bytes().unwrap().to_vec();
        bytes[0] = b'X';
        assert!(StructuredObject::decode(&bytes).is_err());

        let mut bytes = triangle(vec![0, 1, 2]).to_bytes().unwrap().to_vec();
        bytes[2] = 2;
        let err = StructuredObject::decode(&bytes).unwrap_err();
        assert!(matches!(err, SerializeError::MalformedObject(msg) if msg.contains("version 2")));
    }

    #[test]
    fn decoded_object_does_not_borrow_input() {
        let obj = triangle(vec![2, 1, 0]);
        let decoded = {
            let bytes = obj.to_bytes().unwrap().to_vec();
            StructuredObject::decode(&bytes).unwrap()
        };
        assert_eq!(decoded.faces[0], vec![2, 1, 0]);
    }
}
