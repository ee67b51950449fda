// ABOUTME: Validated domain types shared by every component.
// ABOUTME: Parsing happens at the edge so the core never sees malformed identities.

mod actor;
mod digest;
mod environment_name;
mod image_repository;
mod record_seq;
mod revision;
mod semver;

pub use actor::{Actor, ActorError};
pub use digest::{Digest, DigestError};
pub use environment_name::{EnvironmentName, EnvironmentNameError};
pub use image_repository::{ImageRepository, ParseImageRepositoryError};
pub use record_seq::RecordSeq;
pub use revision::{SourceRevision, SourceRevisionError};
pub use semver::{SemanticVersion, SemanticVersionError};
