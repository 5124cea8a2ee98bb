//! Common imports for anonymization algorithms and backends.

pub use crate::attribute::{Attribute, AttributeKind};
pub use crate::backend::Backend;
pub use crate::config::{AttrMetadata, Config, DataflyTuning, QidType};
pub use crate::error::{Error, Result};
pub use crate::gentree::GenTree;
pub use crate::ncp::normalized_certainty_penalty;
pub use crate::numrange::NumRange;
pub use crate::partition::Partition;
