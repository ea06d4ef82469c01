//! Dataset preparation and access.
//!
//! The flow from raw images to training batches is:
//!
//! 1. [`DatasetPreparer`] scans a directory, cuts patches (training) or pads
//!    whole images (evaluation), and caches the result as a [`PatchArchive`].
//! 2. [`FusionDataset`] serves normalised `(input, label)` pairs by index.
//! 3. [`PairedLoader`] batches an infrared and a visible dataset together,
//!    keeping sample `i` of one aligned with sample `i` of the other.

pub mod accessor;
pub mod container;
pub mod loader;
pub mod preparer;

pub use accessor::FusionDataset;
pub use container::{ArchiveKind, PatchArchive};
pub use loader::{PairBatch, PairedEpoch, PairedLoader};
pub use preparer::DatasetPreparer;
