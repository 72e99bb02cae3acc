//! forge
//!
//! Abstraction over the SCM providers that host pull requests
//! (Azure DevOps, GitHub and GitHub Enterprise).
//!
//! # Architecture
//!
//! The `Forge` trait defines the interface the reconciler talks to. The
//! reconciler obtains a forge per target through a [`ForgeFactory`] and
//! never imports a concrete adapter.
//!
//! - Forge operations are invoked only after the branch is pushed
//! - Pull requests are found by identity (source, target, title) and are
//!   never closed or deleted
//! - Forge failures are reported per target and never leak the token
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`http`]: client settings and status mapping shared by adapters
//! - [`github`]: GitHub and GitHub Enterprise via the REST API
//! - [`azure_devops`]: Azure DevOps Services and Server via the REST API
//! - [`mock`]: Mock implementation for deterministic testing
//! - `factory`: Forge selection and creation
//!
//! # Example
//!
//! ```ignore
//! use converge::forge::{create_forge, CreatePrRequest, Forge, HttpSettings};
//!
//! let forge = create_forge(&target, &credentials, &HttpSettings::default())?;
//! let created = forge.create_pr(CreatePrRequest {
//!     head: "feat/code-migration".to_string(),
//!     base: "main".to_string(),
//!     title: "Feat: Code Migration".to_string(),
//!     ..Default::default()
//! }).await?;
//!
//! println!("Created PR #{}: {}", created.pr.number, created.pr.url);
//! ```

pub mod azure_devops;
mod factory;
pub mod github;
pub mod http;
pub mod mock;
mod traits;

pub use factory::{create_forge, ForgeFactory, ProviderForgeFactory};
pub use http::HttpSettings;
pub use mock::MockForge;
pub use traits::*;
