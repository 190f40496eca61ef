//! Pooled, canonicalized URIs.
//!
//! A [`UriPool`] deduplicates every URI it hands out, along with all the
//! component strings and segment arrays behind them, in weakly-referenced
//! pools: equal values are the same instance for as long as anything owns
//! them, and entries vanish once the last owner is dropped. [`Uri`]
//! equality and hashing are therefore pointer-cheap, which is the point —
//! these URIs are built to be used as keys, in bulk.
//!
//! ```
//! use uri_pool::UriPool;
//!
//! let pool = UriPool::new();
//! let a = pool.parse("platform:/resource/proj/model.xmi")?;
//! let b = pool.platform_resource("/proj/model.xmi", true);
//! assert_eq!(a, b); // same instance
//! # Ok::<(), uri_pool::UriError>(())
//! ```

mod chars;
mod components;
mod error;
mod file;
mod parse;
mod platform;
mod pool;
mod uri;

pub use error::UriError;
pub use pool::{PathStyle, UriPool};
pub use uri::{
    Uri, valid_authority, valid_device, valid_opaque_part, valid_query, valid_scheme,
    valid_segment, valid_segments,
};
