//! Droe Core: the bytecode contract between compiler and virtual machine
//!
//! This crate defines everything the emitter writes and the VM reads. The
//! instruction set is the agreement between the two sides; the artifact
//! format is its serialized form.
//!
//! # Modules
//!
//! - `instruction`: the exhaustive stack-machine instruction set
//! - `constant`: tagged constant-pool values
//! - `schema`: record schemas and the module/action/endpoint tables
//! - `artifact`: the self-describing on-disk container (magic + version +
//!   bincode body) with load/store
//! - `embedded`: framing markers for artifacts appended to a host binary

pub mod artifact;
pub mod constant;
pub mod embedded;
pub mod instruction;
pub mod schema;

pub use artifact::{Artifact, ArtifactError, Metadata, FORMAT_VERSION, MAGIC};
pub use constant::Constant;
pub use embedded::{embed_artifact, extract_artifact, END_MARKER, START_MARKER};
pub use instruction::{HostFn, Instruction};
pub use schema::{
    ActionEntry, DbOpCode, EndpointEntry, FieldAnnotation, FieldSchema, HttpMethod, ModuleEntry,
    ParamEntry, RecordSchema, TypeTag,
};
