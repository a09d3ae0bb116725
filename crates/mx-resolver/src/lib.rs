//! Dependency resolver for Maven and Gradle module metadata.
//!
//! This crate provides:
//! - Coordinate and dependency notation parsing
//! - Maven version ordering
//! - POM and Gradle Module Metadata parsing
//! - A caching, retrying repository client
//! - Graph building with variant selection and conflict resolution
//! - Classpath assembly with verified downloads
//!
//! # Example
//!
//! ```ignore
//! use mx_resolver::{Resolver, ResolverConfig};
//!
//! let config = ResolverConfig::new("/tmp/mx-cache");
//! let resolver = Resolver::new(&config)?;
//! let request = config
//!     .new_request()
//!     .parse_dependency("org.tinylog:slf4j-tinylog:2.7.0-M1")?;
//!
//! let result = resolver.resolve(&request).await?;
//! for path in result.classpath_paths() {
//!     println!("{}", path.display());
//! }
//! ```

pub mod assemble;
pub mod cache;
pub mod checksum;
pub mod component;
pub mod conflict;
pub mod coordinates;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod module_metadata;
pub mod pom;
pub mod repository;
pub mod request;
pub mod resolver;
pub mod retry;
pub mod transport;
pub mod tree;
pub mod variant;
pub mod version;

#[doc(hidden)]
pub mod testing;

pub use assemble::{ResolutionReport, ResolutionResult};
pub use cache::{
    CacheError, FileResolutionCache, IncrementalCache, MemoryResolutionCache, ResolutionKey,
};
pub use checksum::{Checksum, HashAlgorithm};
pub use component::{ComponentMetadata, MetadataFormat, Scope, Variant};
pub use conflict::{Conflict, select_version};
pub use coordinates::{
    Dependency, ExclusionPattern, MavenCoordinates, ModuleKey, RequestedDependency,
    VersionCatalog,
};
pub use error::ResolveError;
pub use fetch::ResolvedArtifact;
pub use graph::{Node, ResolvedGraph};
pub use repository::{CacheLayout, MAVEN_CENTRAL, Repository, RepositoryClient};
pub use request::{LocalModules, ResolutionRequest, Roots};
pub use resolver::{Resolver, ResolverConfig};
pub use retry::RetryPolicy;
pub use transport::{Credentials, HttpTransport, MemoryTransport, Transport, TransportError};
pub use variant::{Platform, select_variant};
pub use version::{MavenVersion, max_version};
