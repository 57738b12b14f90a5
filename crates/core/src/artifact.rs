//! The bytecode artifact container
//!
//! Self-describing on-disk form: a 4-byte magic, a little-endian u16
//! format version, then the bincode-encoded body. The version is framed
//! outside the body so a reader can reject an unknown layout before it
//! tries to decode anything.
//!
//! # Determinism
//!
//! All tables are vectors in declaration order and the body is encoded
//! with bincode's default (fixed) configuration, so compiling the same
//! source with the same compiler version produces byte-identical
//! artifacts apart from `metadata.created_at`.

use crate::constant::Constant;
use crate::instruction::Instruction;
use crate::schema::{EndpointEntry, ModuleEntry, RecordSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File identifier; first four bytes of every artifact.
pub const MAGIC: [u8; 4] = *b"DRBC";

/// Current artifact layout version.
pub const FORMAT_VERSION: u16 = 1;

/// Error during artifact encoding, decoding, or file I/O.
#[derive(Debug)]
pub enum ArtifactError {
    /// The input does not start with the `DRBC` magic
    BadMagic,
    /// The input is shorter than the fixed header
    Truncated,
    /// Recognized magic but an unsupported layout version
    UnsupportedVersion(u16),
    /// Bincode encoding/decoding failure (original error preserved)
    Encoding(Box<bincode::Error>),
    /// Filesystem failure
    Io(std::io::Error),
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::BadMagic => write!(f, "not a Droe bytecode artifact (bad magic)"),
            ArtifactError::Truncated => write!(f, "artifact is truncated"),
            ArtifactError::UnsupportedVersion(v) => {
                write!(
                    f,
                    "unsupported artifact format version {} (this toolchain reads {})",
                    v, FORMAT_VERSION
                )
            }
            ArtifactError::Encoding(e) => write!(f, "artifact encoding error: {}", e),
            ArtifactError::Io(e) => write!(f, "artifact I/O error: {}", e),
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactError::Encoding(e) => Some(e.as_ref()),
            ArtifactError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bincode::Error> for ArtifactError {
    fn from(e: bincode::Error) -> Self {
        ArtifactError::Encoding(Box::new(e))
    }
}

impl From<std::io::Error> for ArtifactError {
    fn from(e: std::io::Error) -> Self {
        ArtifactError::Io(e)
    }
}

/// Build provenance recorded in every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub source_file: String,
    pub compiler_version: String,
    /// Epoch seconds at emission time
    pub created_at: i64,
}

/// The complete compiled program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub metadata: Metadata,
    pub constants: Vec<Constant>,
    pub record_schemas: Vec<RecordSchema>,
    pub modules: Vec<ModuleEntry>,
    pub endpoints: Vec<EndpointEntry>,
    pub instructions: Vec<Instruction>,
}

impl Artifact {
    /// Serialize to the framed wire form (magic + version + body).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(6 + body.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode the framed wire form, rejecting unknown versions before the
    /// body is touched.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        if bytes.len() < 6 {
            return Err(ArtifactError::Truncated);
        }
        if bytes[0..4] != MAGIC {
            return Err(ArtifactError::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }
        Ok(bincode::deserialize(&bytes[6..])?)
    }

    pub fn write_file(&self, path: &Path) -> Result<(), ArtifactError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_file(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Look up an action by qualified position.
    pub fn action(&self, module: u16, action: u16) -> Option<&crate::schema::ActionEntry> {
        self.modules
            .get(module as usize)
            .and_then(|m| m.actions.get(action as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    fn sample() -> Artifact {
        Artifact {
            metadata: Metadata {
                source_file: "main.droe".to_string(),
                compiler_version: "0.4.2".to_string(),
                created_at: 1_700_000_000,
            },
            constants: vec![Constant::Text("Hello".to_string()), Constant::Int(42)],
            record_schemas: vec![],
            modules: vec![],
            endpoints: vec![],
            instructions: vec![
                Instruction::PushConst(0),
                Instruction::Display,
                Instruction::Halt,
            ],
        }
    }

    #[test]
    fn test_roundtrip() {
        let artifact = sample();
        let bytes = artifact.to_bytes().unwrap();
        let back = Artifact::from_bytes(&bytes).unwrap();
        assert_eq!(artifact, back);
    }

    #[test]
    fn test_reserialize_identical() {
        // load/store cycle must reproduce the exact bytes
        let bytes = sample().to_bytes().unwrap();
        let back = Artifact::from_bytes(&bytes).unwrap();
        assert_eq!(bytes, back.to_bytes().unwrap());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Artifact::from_bytes(&bytes),
            Err(ArtifactError::BadMagic)
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;
        match Artifact::from_bytes(&bytes) {
            Err(ArtifactError::UnsupportedVersion(v)) => assert_eq!(v, 0xFFFF),
            other => panic!("expected UnsupportedVersion, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            Artifact::from_bytes(&[b'D', b'R']),
            Err(ArtifactError::Truncated)
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.drbc");
        let artifact = sample();
        artifact.write_file(&path).unwrap();
        let back = Artifact::read_file(&path).unwrap();
        assert_eq!(artifact, back);
    }
}
